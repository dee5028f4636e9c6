// ============================================
// File: crates/nyxstream-core/src/crypto/keys.rs
// ============================================
//! # Key Material Types
//!
//! ## Creation Reason
//! Wraps the byte strings of the key schedule in types with proper
//! security properties (Zeroize on drop, redacted Debug output).
//!
//! ## Main Functionality
//! - `PreSharedKey`: Long-lived secret shared by both peers (KDF input only)
//! - `Salt`: Per-connection, per-direction random value sent in clear
//! - `Subkey`: HKDF output used to key one AEAD instance
//!
//! ## Key Lifecycle
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  PreSharedKey (per cipher suite)                           │
//! │  ├─ Configured once, never used to seal directly           │
//! │  └─ Zeroed when the last suite clone is dropped            │
//! │                                                            │
//! │  Salt (per connection direction)                           │
//! │  ├─ Writer: generated from the OS RNG                      │
//! │  ├─ Reader: received from the peer                         │
//! │  └─ Recorded in the replay cache                           │
//! │                                                            │
//! │  Subkey (per connection direction)                         │
//! │  ├─ HKDF-SHA1(PSK, salt, "ss-subkey")                      │
//! │  └─ Zeroed as soon as the AEAD instance is built           │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Key types MUST implement Zeroize
//! - Salts are public; keys are never logged
//!
//! ## Last Modified
//! v0.1.0 - Initial key type definitions

use std::fmt;
use std::io;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CoreError, Result};

// ============================================
// PreSharedKey
// ============================================

/// Pre-shared key of a cipher suite.
///
/// Length is validated by the suite factory, not here.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PreSharedKey(Vec<u8>);

impl PreSharedKey {
    /// Creates a key by copying `bytes`.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// Returns the raw key bytes.
    ///
    /// # Security Warning
    /// Do not log or persist the returned bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for an empty key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PreSharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PreSharedKey([REDACTED; {}])", self.0.len())
    }
}

// ============================================
// Salt
// ============================================

/// Per-direction salt, transmitted unencrypted ahead of the first frame.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Salt(Vec<u8>);

impl Salt {
    /// Generates `len` random bytes from the OS RNG.
    ///
    /// # Errors
    /// Returns `Io` if the OS RNG is unavailable.
    pub fn random(len: usize) -> Result<Self> {
        let mut bytes = vec![0u8; len];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CoreError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        Ok(Self(bytes))
    }

    /// Wraps salt bytes received from a peer.
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the salt bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Salt length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for an empty salt.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short hex prefix for log lines.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.0[..self.0.len().min(4)])
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt({}...)", self.fingerprint())
    }
}

// ============================================
// Subkey
// ============================================

/// Derived per-direction AEAD key. Same length as the PSK.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Subkey(Vec<u8>);

impl Subkey {
    /// Wraps derived key bytes.
    #[must_use]
    pub(crate) fn from_vec(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Subkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subkey([REDACTED])")
    }
}
