// ============================================
// File: crates/nyxstream-core/src/crypto/suite.rs
// ============================================
//! # Cipher Suite Factory
//!
//! ## Creation Reason
//! Bundles what a connection needs to key itself: the algorithm, the
//! pre-shared key and the replay cache shared by all connections that use
//! the same key.
//!
//! ## Main Functionality
//! - `CipherSuite::aes_gcm` / `chacha20_poly1305`: Validating constructors
//! - `CipherSuite::from_name`: Registry lookup with optional password KDF
//! - `encrypter` / `decrypter`: Fresh AEAD instance per salt
//!
//! ## ⚠️ Important Note for Next Developer
//! - `encrypter` and `decrypter` derive the SAME subkey for the same salt;
//!   direction separation comes only from each side sending its own salt
//! - Each call returns an independent instance; the caller owns the nonce
//! - Clones share the PSK and the replay cache
//!
//! ## Last Modified
//! v0.1.0 - Initial suite implementation

use std::fmt;
use std::sync::Arc;

use super::cipher::{CipherKind, SessionCipher};
use super::kdf::{derive_subkey, password_to_key};
use super::keys::{PreSharedKey, Salt};
use crate::error::{CoreError, Result};
use crate::replay::{ReplayCache, SaltFilter};

// ============================================
// CipherSuite
// ============================================

/// Algorithm + pre-shared key + replay cache.
///
/// # Example
/// ```
/// use nyxstream_core::crypto::{CipherSuite, Salt};
///
/// let suite = CipherSuite::chacha20_poly1305(&[0xAB; 32]).unwrap();
/// assert_eq!(suite.key_size(), 32);
/// assert_eq!(suite.salt_size(), 32);
///
/// let salt = Salt::random(suite.salt_size()).unwrap();
/// let _sealer = suite.encrypter(&salt).unwrap();
/// ```
#[derive(Clone)]
pub struct CipherSuite {
    kind: CipherKind,
    psk: Arc<PreSharedKey>,
    replay: Arc<dyn ReplayCache>,
}

impl CipherSuite {
    /// Creates a suite for `kind`, requiring the exact key size of that kind.
    ///
    /// # Errors
    /// Returns `KeySize` on a length mismatch.
    pub fn new(kind: CipherKind, psk: &[u8]) -> Result<Self> {
        if psk.len() != kind.key_size() {
            return Err(kind.key_size_error(psk.len()));
        }
        Ok(Self::with_kind(kind, PreSharedKey::from_slice(psk)))
    }

    /// Creates an AES-GCM suite; the key length (16, 24 or 32) selects
    /// AES-128, AES-192 or AES-256.
    ///
    /// # Errors
    /// Returns `KeySize` for any other length.
    pub fn aes_gcm(psk: &[u8]) -> Result<Self> {
        let kind = CipherKind::aes_for_key_len(psk.len()).ok_or(CoreError::KeySize {
            cipher: "AES-GCM",
            expected: "16, 24 or 32",
            actual: psk.len(),
        })?;
        Ok(Self::with_kind(kind, PreSharedKey::from_slice(psk)))
    }

    /// Creates a ChaCha20-Poly1305 suite.
    ///
    /// # Errors
    /// Returns `KeySize` unless `psk` is exactly 32 bytes.
    pub fn chacha20_poly1305(psk: &[u8]) -> Result<Self> {
        Self::new(CipherKind::ChaCha20Poly1305, psk)
    }

    /// Looks up `name` in the registry and builds a suite.
    ///
    /// When `key` is empty the PSK is stretched from `password`.
    ///
    /// # Errors
    /// - `UnknownCipher` for names outside the registry
    /// - `KeySize` if a non-empty `key` has the wrong length
    pub fn from_name(name: &str, key: &[u8], password: &str) -> Result<Self> {
        let kind = CipherKind::from_name(name)?;
        if key.is_empty() {
            let psk = password_to_key(password, kind.key_size());
            return Ok(Self::with_kind(kind, psk));
        }
        Self::new(kind, key)
    }

    fn with_kind(kind: CipherKind, psk: PreSharedKey) -> Self {
        Self {
            kind,
            psk: Arc::new(psk),
            replay: Arc::new(SaltFilter::default()),
        }
    }

    /// Replaces the replay cache (e.g. to share one across suites, or a
    /// deterministic fake in tests).
    #[must_use]
    pub fn with_replay_cache(mut self, replay: Arc<dyn ReplayCache>) -> Self {
        self.replay = replay;
        self
    }

    /// Algorithm of this suite.
    #[must_use]
    pub const fn kind(&self) -> CipherKind {
        self.kind
    }

    /// PSK (and subkey) length in bytes.
    #[must_use]
    pub fn key_size(&self) -> usize {
        self.psk.len()
    }

    /// Salt length: `max(key_size, 16)`.
    #[must_use]
    pub const fn salt_size(&self) -> usize {
        self.kind.salt_size()
    }

    /// Replay cache shared by connections of this suite.
    #[must_use]
    pub fn replay_cache(&self) -> &dyn ReplayCache {
        self.replay.as_ref()
    }

    /// Derives the subkey for `salt` and builds a sealing instance.
    ///
    /// # Errors
    /// Returns `KeyDerivation` or `KeySize` if the subkey cannot be built.
    pub fn encrypter(&self, salt: &Salt) -> Result<SessionCipher> {
        self.derive(salt)
    }

    /// Derives the subkey for `salt` and builds an opening instance.
    ///
    /// # Errors
    /// Returns `KeyDerivation` or `KeySize` if the subkey cannot be built.
    pub fn decrypter(&self, salt: &Salt) -> Result<SessionCipher> {
        self.derive(salt)
    }

    fn derive(&self, salt: &Salt) -> Result<SessionCipher> {
        let subkey = derive_subkey(&self.psk, salt)?;
        SessionCipher::new(self.kind, subkey.as_bytes())
    }
}

impl fmt::Debug for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherSuite")
            .field("kind", &self.kind)
            .field("psk", &self.psk)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{NonceSequence, TAG_SIZE};

    #[test]
    fn test_aes_gcm_key_sizes() {
        assert!(matches!(
            CipherSuite::aes_gcm(&[0u8; 15]),
            Err(CoreError::KeySize { actual: 15, .. })
        ));

        assert_eq!(CipherSuite::aes_gcm(&[0u8; 16]).unwrap().kind(), CipherKind::Aes128Gcm);
        assert_eq!(CipherSuite::aes_gcm(&[0u8; 24]).unwrap().kind(), CipherKind::Aes192Gcm);
        assert_eq!(CipherSuite::aes_gcm(&[0u8; 32]).unwrap().kind(), CipherKind::Aes256Gcm);
        assert!(CipherSuite::aes_gcm(&[0u8; 64]).is_err());
    }

    #[test]
    fn test_chacha_key_sizes() {
        for len in [15, 16, 24, 31, 33] {
            assert!(matches!(
                CipherSuite::chacha20_poly1305(&vec![0u8; len]),
                Err(CoreError::KeySize { .. })
            ));
        }
        assert!(CipherSuite::chacha20_poly1305(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_key_and_salt_size() {
        let suite = CipherSuite::aes_gcm(&[0u8; 16]).unwrap();
        assert_eq!(suite.key_size(), 16);
        assert_eq!(suite.salt_size(), 16);

        let suite = CipherSuite::aes_gcm(&[0u8; 24]).unwrap();
        assert_eq!(suite.key_size(), 24);
        assert_eq!(suite.salt_size(), 24);
    }

    #[test]
    fn test_from_name_with_password() {
        let suite = CipherSuite::from_name("aes-128-gcm", &[], "password").unwrap();
        assert_eq!(suite.kind(), CipherKind::Aes128Gcm);
        assert_eq!(suite.key_size(), 16);

        let suite = CipherSuite::from_name("AEAD_CHACHA20_POLY1305", &[], "password").unwrap();
        assert_eq!(suite.key_size(), 32);
    }

    #[test]
    fn test_from_name_with_key() {
        assert!(CipherSuite::from_name("aes-256-gcm", &[1u8; 32], "").is_ok());
        assert!(matches!(
            CipherSuite::from_name("aes-256-gcm", &[1u8; 16], ""),
            Err(CoreError::KeySize { .. })
        ));
        assert!(matches!(
            CipherSuite::from_name("bf-cfb", &[1u8; 16], ""),
            Err(CoreError::UnknownCipher(_))
        ));
    }

    #[test]
    fn test_encrypter_decrypter_agree_on_same_salt() {
        let suite = CipherSuite::aes_gcm(&[0x11; 32]).unwrap();
        let salt = Salt::random(suite.salt_size()).unwrap();

        let sealer = suite.encrypter(&salt).unwrap();
        let opener = suite.decrypter(&salt).unwrap();

        let mut block = b"symmetric".to_vec();
        block.extend_from_slice(&[0u8; TAG_SIZE]);
        sealer.seal_in_place(&NonceSequence::new(), &mut block).unwrap();
        opener
            .open_in_place(&NonceSequence::new(), &mut block, "payload")
            .unwrap();
        assert_eq!(&block[..9], b"symmetric");
    }

    #[test]
    fn test_different_salts_do_not_interoperate() {
        let suite = CipherSuite::chacha20_poly1305(&[0x22; 32]).unwrap();

        let sealer = suite.encrypter(&Salt::from_vec(vec![1; 32])).unwrap();
        let opener = suite.decrypter(&Salt::from_vec(vec![2; 32])).unwrap();

        let mut block = vec![0u8; 4 + TAG_SIZE];
        sealer.seal_in_place(&NonceSequence::new(), &mut block).unwrap();
        assert!(opener
            .open_in_place(&NonceSequence::new(), &mut block, "payload")
            .is_err());
    }

    #[test]
    fn test_clones_share_replay_cache() {
        let suite = CipherSuite::chacha20_poly1305(&[0x33; 32]).unwrap();
        let clone = suite.clone();

        suite.replay_cache().record(b"shared-salt");
        assert!(clone.replay_cache().check(b"shared-salt"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let suite = CipherSuite::chacha20_poly1305(&[0xAB; 32]).unwrap();
        let printed = format!("{suite:?}");
        assert!(printed.contains("ChaCha20Poly1305"));
        assert!(printed.contains("REDACTED"));
    }
}
