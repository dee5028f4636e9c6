// ============================================
// File: crates/nyxstream-core/src/crypto/mod.rs
// ============================================
//! # Cryptography Module
//!
//! ## Creation Reason
//! Centralizes the key schedule and AEAD primitives used by the stream
//! layer, built on audited RustCrypto implementations.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`nonce`]: Little-endian nonce sequencer
//! - [`keys`]: Pre-shared key, salt and subkey types
//! - [`kdf`]: HKDF-SHA1 subkey derivation and password stretching
//! - [`cipher`]: Cipher kinds and the per-direction AEAD instance
//! - [`suite`]: Cipher suite factory (key size, salt size, encrypter/decrypter)
//!
//! ## Key Schedule
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  password ──► EVP_BytesToKey(MD5) ──► PSK   (optional)      │
//! │                                                             │
//! │  PSK + salt ──► HKDF-SHA1(info = "ss-subkey") ──► subkey    │
//! │                                                             │
//! │  subkey + nonce(0, 1, 2, ...) ──► AES-GCM / ChaCha20-Poly1305│
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALL implementations use RustCrypto (audited)
//! - NEVER roll your own crypto
//! - ALL key material implements Zeroize
//! - A (subkey, nonce) pair must never seal twice
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto implementation

pub mod cipher;
pub mod kdf;
pub mod keys;
pub mod nonce;
pub mod suite;

// Re-export primary types at module level
pub use cipher::{CipherKind, SessionCipher};
pub use keys::{PreSharedKey, Salt, Subkey};
pub use nonce::NonceSequence;
pub use suite::CipherSuite;

// ============================================
// Constants
// ============================================

/// Nonce size shared by every supported AEAD, in bytes.
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size shared by every supported AEAD, in bytes.
pub const TAG_SIZE: usize = 16;

/// Minimum salt size; salts are `max(key size, MIN_SALT_SIZE)` bytes.
pub const MIN_SALT_SIZE: usize = 16;

/// HKDF info label for per-connection subkeys.
pub const SUBKEY_INFO: &[u8] = b"ss-subkey";
