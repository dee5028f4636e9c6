// ============================================
// File: crates/nyxstream-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines error types for the cipher suite, key schedule and the
//! encrypted stream layer.
//!
//! ## Main Functionality
//! - `CoreError`: Primary error enum for core operations
//! - Conversion into `std::io::Error` for the stream APIs
//! - Recovery of a `CoreError` from an `io::Error` (`CoreError::from_io`)
//!
//! ## Error Categories
//! 1. **Setup Errors**: Key size mismatch, unknown cipher name
//! 2. **Crypto Errors**: Key derivation, sealing, authentication failures
//! 3. **Protocol Errors**: Repeated salt, malformed or truncated frames
//! 4. **State Errors**: Direction already failed
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include key material in error messages
//! - Transport errors are passed through untouched, do not wrap them
//! - Every error from a stream direction is fatal to that direction
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for the cipher suite and stream layer.
///
/// # Security Note
/// Messages never contain key material or plaintext.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Setup Errors
    // ========================================

    /// Pre-shared key length does not fit the cipher.
    #[error("Key size error for {cipher}: need {expected} bytes, got {actual}")]
    KeySize {
        /// Cipher that rejected the key
        cipher: &'static str,
        /// Accepted key sizes, human readable
        expected: &'static str,
        /// Length that was supplied
        actual: usize,
    },

    /// Cipher name is not in the registry.
    #[error("Unknown cipher: {0}")]
    UnknownCipher(String),

    // ========================================
    // Cryptographic Errors
    // ========================================

    /// Key derivation failed.
    #[error("Key derivation failed: {reason}")]
    KeyDerivation {
        /// Why derivation failed
        reason: String,
    },

    /// Sealing a frame failed.
    #[error("Encryption failed: {context}")]
    Encryption {
        /// What was being sealed
        context: String,
    },

    /// A sealed block failed its integrity check.
    #[error("Authentication failed: {block} block could not be opened")]
    Authentication {
        /// Which half of the frame failed ("length" or "payload")
        block: &'static str,
    },

    // ========================================
    // Protocol Errors
    // ========================================

    /// Peer presented a salt that was already seen with this key.
    #[error("Repeated salt detected")]
    RepeatedSalt,

    /// Decrypted frame header is out of bounds.
    #[error("Malformed frame: payload length {length} exceeds {max}")]
    MalformedFrame {
        /// Length found in the header
        length: usize,
        /// Maximum payload length
        max: usize,
    },

    /// Transport reached end-of-stream inside a frame or salt.
    #[error("Truncated {what}: expected {expected} bytes, got {actual}")]
    TruncatedFrame {
        /// What was being read ("salt", "length block", "payload block")
        what: &'static str,
        /// Bytes required
        expected: usize,
        /// Bytes received before end-of-stream
        actual: usize,
    },

    // ========================================
    // State Errors
    // ========================================

    /// Direction is unusable after an earlier failure.
    #[error("Stream {direction} direction failed earlier and cannot be reused")]
    DirectionFailed {
        /// "read" or "write"
        direction: &'static str,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// I/O error outside the stream APIs (e.g. OS randomness).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `KeyDerivation` error.
    pub fn key_derivation(reason: impl Into<String>) -> Self {
        Self::KeyDerivation {
            reason: reason.into(),
        }
    }

    /// Creates an `Encryption` error.
    pub fn encryption(context: impl Into<String>) -> Self {
        Self::Encryption {
            context: context.into(),
        }
    }

    /// Creates a `TruncatedFrame` error.
    pub const fn truncated(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::TruncatedFrame {
            what,
            expected,
            actual,
        }
    }

    /// Creates a `DirectionFailed` error.
    pub const fn direction_failed(direction: &'static str) -> Self {
        Self::DirectionFailed { direction }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this is a cryptographic error.
    #[must_use]
    pub const fn is_crypto_error(&self) -> bool {
        matches!(
            self,
            Self::KeyDerivation { .. } | Self::Encryption { .. } | Self::Authentication { .. }
        )
    }

    /// Returns `true` if this is a wire protocol error.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::RepeatedSalt | Self::MalformedFrame { .. } | Self::TruncatedFrame { .. }
        )
    }

    /// Returns `true` if this error might indicate an attack.
    ///
    /// These errors warrant additional logging/monitoring.
    #[must_use]
    pub const fn is_suspicious(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::RepeatedSalt | Self::MalformedFrame { .. }
        )
    }

    /// Maps the error onto the closest `io::ErrorKind`.
    #[must_use]
    pub fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::Authentication { .. } | Self::RepeatedSalt | Self::MalformedFrame { .. } => {
                io::ErrorKind::InvalidData
            }
            Self::TruncatedFrame { .. } => io::ErrorKind::UnexpectedEof,
            Self::DirectionFailed { .. } => io::ErrorKind::BrokenPipe,
            Self::KeySize { .. } | Self::UnknownCipher(_) => io::ErrorKind::InvalidInput,
            Self::Io(e) => e.kind(),
            Self::KeyDerivation { .. } | Self::Encryption { .. } => io::ErrorKind::Other,
        }
    }

    /// Recovers the `CoreError` carried by an `io::Error` produced by
    /// the stream layer, if any.
    ///
    /// Transport errors return `None`.
    #[must_use]
    pub fn from_io(err: &io::Error) -> Option<&Self> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<Self>())
    }
}

// ============================================
// Error Conversions
// ============================================

impl From<CoreError> for io::Error {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => e,
            other => io::Error::new(other.io_kind(), other),
        }
    }
}

// ============================================
// Tests
// ============================================
