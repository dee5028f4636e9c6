// ============================================
// File: crates/nyxstream-core/src/crypto/kdf.rs
// ============================================
//! # Key Derivation Functions
//!
//! ## Main Functionality
//! - `derive_subkey`: Per-connection subkey from PSK and salt (HKDF-SHA1)
//! - `hkdf_sha1`: Generic HKDF-SHA1 extract-and-expand
//! - `password_to_key`: Stretches a human password into a PSK
//!   (OpenSSL `EVP_BytesToKey` with MD5, one iteration)
//!
//! ## Subkey Derivation
//! ```text
//! subkey = HKDF-SHA1(ikm = PSK, salt = salt, info = "ss-subkey", L = |PSK|)
//! ```
//! Both peers compute the same subkey from the same (PSK, salt) pair, so the
//! two directions of a connection stay independent only because each side
//! sends its own fresh salt.
//!
//! ## Last Modified
//! v0.1.0 - Initial KDF implementation

use hkdf::Hkdf;
use md5::{Digest, Md5};
use sha1::Sha1;
use tracing::trace;
use zeroize::Zeroize;

use super::keys::{PreSharedKey, Salt, Subkey};
use super::SUBKEY_INFO;
use crate::error::{CoreError, Result};

// ============================================
// Subkey Derivation
// ============================================

/// Derives the AEAD subkey for one connection direction.
///
/// # Arguments
/// * `psk` - Pre-shared key of the cipher suite
/// * `salt` - Salt sent (writer) or received (reader) for this direction
///
/// # Returns
/// A subkey with the same length as `psk`.
///
/// # Errors
/// Returns `KeyDerivation` if the requested length exceeds the HKDF limit.
pub fn derive_subkey(psk: &PreSharedKey, salt: &Salt) -> Result<Subkey> {
    trace!(
        key_len = psk.len(),
        salt = %salt.fingerprint(),
        "Deriving subkey"
    );
    let bytes = hkdf_sha1(psk.as_bytes(), salt.as_bytes(), SUBKEY_INFO, psk.len())?;
    Ok(Subkey::from_vec(bytes))
}

/// HKDF-SHA1 extract-and-expand.
///
/// # Errors
/// Returns `KeyDerivation` if `output_len` exceeds 255 * 20 bytes.
pub fn hkdf_sha1(secret: &[u8], salt: &[u8], info: &[u8], output_len: usize) -> Result<Vec<u8>> {
    let hk = Hkdf::<Sha1>::new(Some(salt), secret);

    let mut output = vec![0u8; output_len];
    hk.expand(info, &mut output).map_err(|_| {
        CoreError::key_derivation(format!("HKDF expansion failed for {output_len} bytes"))
    })?;

    Ok(output)
}

// ============================================
// Password Stretching
// ============================================

/// Derives a `key_len`-byte PSK from a password.
///
/// ```text
/// D_1 = MD5(password)
/// D_i = MD5(D_{i-1} || password)
/// key = (D_1 || D_2 || ...)[..key_len]
/// ```
#[must_use]
pub fn password_to_key(password: &str, key_len: usize) -> PreSharedKey {
    let mut key = Vec::with_capacity(key_len + 16);
    let mut prev: Vec<u8> = Vec::new();

    while key.len() < key_len {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(password.as_bytes());
        let block = hasher.finalize();

        key.extend_from_slice(&block);
        prev.zeroize();
        prev = block.to_vec();
    }

    let psk = PreSharedKey::from_slice(&key[..key_len]);
    prev.zeroize();
    key.zeroize();
    psk
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hkdf_sha1_rfc5869_case4() {
        let ikm = [0x0bu8; 11];
        let salt = hex::decode("000102030405060708090a0b0c").unwrap();
        let info = hex::decode("f0f1f2f3f4f5f6f7f8f9").unwrap();

        let okm = hkdf_sha1(&ikm, &salt, &info, 42).unwrap();

        assert_eq!(
            hex::encode(okm),
            "085a01ea1b10f36933068b56efa5ad81a4f14b822f5b091568a9cdd4f155fda2c22e422478d305f3f896"
        );
    }

    #[test]
    fn test_hkdf_sha1_length_limit() {
        let result = hkdf_sha1(b"secret", b"salt", b"info", 255 * 20 + 1);
        assert!(matches!(result, Err(CoreError::KeyDerivation { .. })));
    }

    #[test]
    fn test_derive_subkey_deterministic() {
        let psk = PreSharedKey::from_slice(&[0x42; 32]);
        let salt = Salt::from_vec(vec![0x01; 32]);

        let a = derive_subkey(&psk, &salt).unwrap();
        let b = derive_subkey(&psk, &salt).unwrap();

        assert_eq!(a.as_bytes().len(), 32);
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), psk.as_bytes());
    }

    #[test]
    fn test_derive_subkey_depends_on_salt() {
        let psk = PreSharedKey::from_slice(&[0x42; 16]);

        let a = derive_subkey(&psk, &Salt::from_vec(vec![0x01; 16])).unwrap();
        let b = derive_subkey(&psk, &Salt::from_vec(vec![0x02; 16])).unwrap();

        assert_eq!(a.as_bytes().len(), 16);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_password_to_key_md5_block() {
        // First block is plain MD5 of the password
        let key = password_to_key("password", 16);
        assert_eq!(hex::encode(key.as_bytes()), "5f4dcc3b5aa765d61d8327deb882cf99");

        let key = password_to_key("foobar", 16);
        assert_eq!(hex::encode(key.as_bytes()), "3858f62230ac3c915f300c664312c63f");
    }

    #[test]
    fn test_password_to_key_longer_keys_extend_prefix() {
        let short = password_to_key("foobar", 16);
        let medium = password_to_key("foobar", 24);
        let long = password_to_key("foobar", 32);

        assert_eq!(medium.len(), 24);
        assert_eq!(long.len(), 32);
        assert_eq!(&long.as_bytes()[..16], short.as_bytes());
        assert_eq!(&long.as_bytes()[..24], medium.as_bytes());
        assert_ne!(&long.as_bytes()[16..], short.as_bytes());
    }
}
