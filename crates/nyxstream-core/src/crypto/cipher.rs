// ============================================
// File: crates/nyxstream-core/src/crypto/cipher.rs
// ============================================
//! # AEAD Ciphers
//!
//! ## Creation Reason
//! Provides the per-direction authenticated cipher used to seal and open
//! frame blocks, over AES-GCM and ChaCha20-Poly1305.
//!
//! ## Main Functionality
//! - `CipherKind`: Supported algorithms, key sizes and the name registry
//! - `SessionCipher`: One keyed AEAD instance with in-place seal/open
//!
//! ## Block Layout
//! ```text
//! ┌──────────────────────────────┬──────────────────┐
//! │ plaintext / ciphertext (n)   │ tag (16 bytes)   │
//! └──────────────────────────────┴──────────────────┘
//! ```
//! Sealing and opening happen in place; associated data is always empty.
//!
//! ## ⚠️ Important Note for Next Developer
//! - The nonce is supplied by the caller; `SessionCipher` keeps no counter
//! - Every supported cipher has a 12-byte nonce and 16-byte tag
//!
//! ## Last Modified
//! v0.1.0 - Initial cipher implementation

use std::fmt;
use std::str::FromStr;

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use chacha20poly1305::ChaCha20Poly1305;

use super::nonce::NonceSequence;
use super::{MIN_SALT_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::error::{CoreError, Result};

/// AES-192 in GCM mode with the standard 96-bit nonce.
type Aes192Gcm = AesGcm<Aes192, U12>;

// ============================================
// CipherKind
// ============================================

/// Supported AEAD algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherKind {
    /// AES-128-GCM (16-byte key).
    Aes128Gcm,
    /// AES-192-GCM (24-byte key).
    Aes192Gcm,
    /// AES-256-GCM (32-byte key).
    Aes256Gcm,
    /// ChaCha20-Poly1305, IETF variant (32-byte key).
    ChaCha20Poly1305,
}

impl CipherKind {
    /// Every supported kind, in registry order.
    pub const ALL: [Self; 4] = [
        Self::Aes128Gcm,
        Self::Aes192Gcm,
        Self::Aes256Gcm,
        Self::ChaCha20Poly1305,
    ];

    /// Canonical registry name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Aes128Gcm => "AEAD_AES_128_GCM",
            Self::Aes192Gcm => "AEAD_AES_192_GCM",
            Self::Aes256Gcm => "AEAD_AES_256_GCM",
            Self::ChaCha20Poly1305 => "AEAD_CHACHA20_POLY1305",
        }
    }

    /// Required key (and subkey) length in bytes.
    #[must_use]
    pub const fn key_size(self) -> usize {
        match self {
            Self::Aes128Gcm => 16,
            Self::Aes192Gcm => 24,
            Self::Aes256Gcm | Self::ChaCha20Poly1305 => 32,
        }
    }

    /// Salt length: `max(key_size, 16)`.
    #[must_use]
    pub const fn salt_size(self) -> usize {
        let key_size = self.key_size();
        if key_size > MIN_SALT_SIZE {
            key_size
        } else {
            MIN_SALT_SIZE
        }
    }

    /// Tag overhead added to every sealed block.
    #[must_use]
    pub const fn overhead(self) -> usize {
        TAG_SIZE
    }

    /// Nonce length in bytes.
    #[must_use]
    pub const fn nonce_size(self) -> usize {
        NONCE_SIZE
    }

    /// Builds the `KeySize` error for a key of `actual` bytes.
    pub(crate) const fn key_size_error(self, actual: usize) -> CoreError {
        CoreError::KeySize {
            cipher: self.name(),
            expected: match self {
                Self::Aes128Gcm => "16",
                Self::Aes192Gcm => "24",
                Self::Aes256Gcm | Self::ChaCha20Poly1305 => "32",
            },
            actual,
        }
    }

    /// Selects the AES-GCM variant matching a key length.
    #[must_use]
    pub const fn aes_for_key_len(len: usize) -> Option<Self> {
        match len {
            16 => Some(Self::Aes128Gcm),
            24 => Some(Self::Aes192Gcm),
            32 => Some(Self::Aes256Gcm),
            _ => None,
        }
    }

    /// Looks up a cipher by name (case-insensitive, common aliases accepted).
    ///
    /// # Errors
    /// Returns `UnknownCipher` for names outside the registry.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "AEAD_AES_128_GCM" | "AES-128-GCM" => Ok(Self::Aes128Gcm),
            "AEAD_AES_192_GCM" | "AES-192-GCM" => Ok(Self::Aes192Gcm),
            "AEAD_AES_256_GCM" | "AES-256-GCM" => Ok(Self::Aes256Gcm),
            "AEAD_CHACHA20_POLY1305" | "CHACHA20-IETF-POLY1305" | "CHACHA20-POLY1305" => {
                Ok(Self::ChaCha20Poly1305)
            }
            _ => Err(CoreError::UnknownCipher(name.to_string())),
        }
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

// ============================================
// SessionCipher
// ============================================

/// A keyed AEAD instance for one connection direction.
pub enum SessionCipher {
    /// AES-128-GCM instance.
    Aes128Gcm(Aes128Gcm),
    /// AES-192-GCM instance.
    Aes192Gcm(Aes192Gcm),
    /// AES-256-GCM instance.
    Aes256Gcm(Aes256Gcm),
    /// ChaCha20-Poly1305 instance.
    ChaCha20Poly1305(ChaCha20Poly1305),
}

impl SessionCipher {
    /// Builds an AEAD instance of `kind` keyed with `key`.
    ///
    /// # Errors
    /// Returns `KeySize` if `key` does not have the kind's key size.
    pub fn new(kind: CipherKind, key: &[u8]) -> Result<Self> {
        let size_error = || kind.key_size_error(key.len());

        let cipher = match kind {
            CipherKind::Aes128Gcm => {
                Self::Aes128Gcm(Aes128Gcm::new_from_slice(key).map_err(|_| size_error())?)
            }
            CipherKind::Aes192Gcm => {
                Self::Aes192Gcm(Aes192Gcm::new_from_slice(key).map_err(|_| size_error())?)
            }
            CipherKind::Aes256Gcm => {
                Self::Aes256Gcm(Aes256Gcm::new_from_slice(key).map_err(|_| size_error())?)
            }
            CipherKind::ChaCha20Poly1305 => Self::ChaCha20Poly1305(
                ChaCha20Poly1305::new_from_slice(key).map_err(|_| size_error())?,
            ),
        };
        Ok(cipher)
    }

    /// Algorithm of this instance.
    #[must_use]
    pub const fn kind(&self) -> CipherKind {
        match self {
            Self::Aes128Gcm(_) => CipherKind::Aes128Gcm,
            Self::Aes192Gcm(_) => CipherKind::Aes192Gcm,
            Self::Aes256Gcm(_) => CipherKind::Aes256Gcm,
            Self::ChaCha20Poly1305(_) => CipherKind::ChaCha20Poly1305,
        }
    }

    /// Tag overhead in bytes.
    #[must_use]
    pub const fn overhead(&self) -> usize {
        TAG_SIZE
    }

    /// Seals `block[..len - 16]` in place and writes the tag into the last
    /// 16 bytes.
    ///
    /// # Errors
    /// Returns `Encryption` if the block is shorter than the tag.
    pub fn seal_in_place(&self, nonce: &NonceSequence, block: &mut [u8]) -> Result<()> {
        let nonce = nonce.as_bytes();
        match self {
            Self::Aes128Gcm(aead) => seal_detached(aead, nonce, block),
            Self::Aes192Gcm(aead) => seal_detached(aead, nonce, block),
            Self::Aes256Gcm(aead) => seal_detached(aead, nonce, block),
            Self::ChaCha20Poly1305(aead) => seal_detached(aead, nonce, block),
        }
    }

    /// Verifies and decrypts `block` in place. On success the plaintext is
    /// `block[..len - 16]`.
    ///
    /// # Errors
    /// Returns `Authentication` naming `which` block failed. The buffer
    /// contents are unspecified afterwards and must not be used.
    pub fn open_in_place(
        &self,
        nonce: &NonceSequence,
        block: &mut [u8],
        which: &'static str,
    ) -> Result<()> {
        let nonce = nonce.as_bytes();
        match self {
            Self::Aes128Gcm(aead) => open_detached(aead, nonce, block, which),
            Self::Aes192Gcm(aead) => open_detached(aead, nonce, block, which),
            Self::Aes256Gcm(aead) => open_detached(aead, nonce, block, which),
            Self::ChaCha20Poly1305(aead) => open_detached(aead, nonce, block, which),
        }
    }
}

impl fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionCipher({})", self.kind())
    }
}

fn seal_detached<A: AeadInPlace>(aead: &A, nonce: &[u8], block: &mut [u8]) -> Result<()> {
    let split = block
        .len()
        .checked_sub(TAG_SIZE)
        .ok_or_else(|| CoreError::encryption("block shorter than tag"))?;
    let (msg, tag_out) = block.split_at_mut(split);

    let tag = aead
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), &[], msg)
        .map_err(|_| CoreError::encryption("AEAD seal failed"))?;
    tag_out.copy_from_slice(tag.as_slice());
    Ok(())
}

fn open_detached<A: AeadInPlace>(
    aead: &A,
    nonce: &[u8],
    block: &mut [u8],
    which: &'static str,
) -> Result<()> {
    let split = block
        .len()
        .checked_sub(TAG_SIZE)
        .ok_or(CoreError::Authentication { block: which })?;
    let (msg, tag) = block.split_at_mut(split);

    aead.decrypt_in_place_detached(
        GenericArray::from_slice(nonce),
        &[],
        msg,
        GenericArray::from_slice(tag),
    )
    .map_err(|_| CoreError::Authentication { block: which })
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed(kind: CipherKind, plaintext: &[u8]) -> (SessionCipher, Vec<u8>) {
        let cipher = SessionCipher::new(kind, &vec![0x42; kind.key_size()]).unwrap();
        let mut block = plaintext.to_vec();
        block.extend_from_slice(&[0u8; TAG_SIZE]);
        cipher.seal_in_place(&NonceSequence::new(), &mut block).unwrap();
        (cipher, block)
    }

    #[test]
    fn test_registry_names() {
        assert_eq!(CipherKind::from_name("AEAD_AES_128_GCM").unwrap(), CipherKind::Aes128Gcm);
        assert_eq!(CipherKind::from_name("aes-192-gcm").unwrap(), CipherKind::Aes192Gcm);
        assert_eq!(CipherKind::from_name(" Aes-256-Gcm ").unwrap(), CipherKind::Aes256Gcm);
        assert_eq!(
            "chacha20-ietf-poly1305".parse::<CipherKind>().unwrap(),
            CipherKind::ChaCha20Poly1305
        );
        assert!(matches!(
            CipherKind::from_name("rc4-md5"),
            Err(CoreError::UnknownCipher(_))
        ));

        for kind in CipherKind::ALL {
            assert_eq!(CipherKind::from_name(kind.name()).unwrap(), kind);
        }
    }

    #[test]
    fn test_sizes() {
        assert_eq!(CipherKind::Aes128Gcm.salt_size(), 16);
        assert_eq!(CipherKind::Aes192Gcm.salt_size(), 24);
        assert_eq!(CipherKind::Aes256Gcm.salt_size(), 32);
        assert_eq!(CipherKind::ChaCha20Poly1305.salt_size(), 32);
        assert!(CipherKind::ALL.iter().all(|k| k.overhead() == 16 && k.nonce_size() == 12));
    }

    #[test]
    fn test_seal_open_every_kind() {
        for kind in CipherKind::ALL {
            let (cipher, mut block) = sealed(kind, b"Hello, NyxStream!");
            assert_eq!(block.len(), 17 + TAG_SIZE);
            assert_ne!(&block[..17], b"Hello, NyxStream!");

            cipher
                .open_in_place(&NonceSequence::new(), &mut block, "payload")
                .unwrap();
            assert_eq!(&block[..17], b"Hello, NyxStream!");
        }
    }

    #[test]
    fn test_wrong_nonce_fails() {
        let (cipher, mut block) = sealed(CipherKind::Aes128Gcm, b"data");
        let wrong = NonceSequence::new().advanced_by(1);

        let result = cipher.open_in_place(&wrong, &mut block, "length");
        assert!(matches!(
            result,
            Err(CoreError::Authentication { block: "length" })
        ));
    }

    #[test]
    fn test_tampered_block_fails() {
        let (cipher, block) = sealed(CipherKind::ChaCha20Poly1305, b"tamper me");

        for i in 0..block.len() {
            let mut tampered = block.clone();
            tampered[i] ^= 0x01;
            assert!(cipher
                .open_in_place(&NonceSequence::new(), &mut tampered, "payload")
                .is_err());
        }
    }

    #[test]
    fn test_short_block_rejected() {
        let cipher = SessionCipher::new(CipherKind::Aes256Gcm, &[0u8; 32]).unwrap();
        let mut short = [0u8; TAG_SIZE - 1];
        assert!(cipher.seal_in_place(&NonceSequence::new(), &mut short).is_err());
        assert!(cipher
            .open_in_place(&NonceSequence::new(), &mut short, "length")
            .is_err());
    }

    #[test]
    fn test_wrong_key_size() {
        let result = SessionCipher::new(CipherKind::ChaCha20Poly1305, &[0u8; 16]);
        assert!(matches!(result, Err(CoreError::KeySize { actual: 16, .. })));
    }
}
