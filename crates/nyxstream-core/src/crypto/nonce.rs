// ============================================
// File: crates/nyxstream-core/src/crypto/nonce.rs
// ============================================
//! # Nonce Sequencer
//!
//! Fixed-width little-endian counter used as the AEAD nonce. It starts at
//! zero when a subkey is derived and is advanced once after every seal or
//! open. Each encoder/decoder owns its own sequence.
//!
//! ```text
//! 00 00 00 00 00 00 00 00 00 00 00 00   (frame 0, length block)
//! 01 00 00 00 00 00 00 00 00 00 00 00   (frame 0, payload block)
//! 02 00 00 00 00 00 00 00 00 00 00 00   (frame 1, length block)
//! ```

use std::fmt;

use super::NONCE_SIZE;

/// Little-endian nonce counter with carry, wrapping on overflow.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct NonceSequence {
    bytes: [u8; NONCE_SIZE],
}

impl NonceSequence {
    /// Creates a sequence at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: [0u8; NONCE_SIZE],
        }
    }

    /// Returns the current nonce.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }

    /// Increments the counter by one, carrying into higher bytes.
    pub fn advance(&mut self) {
        for byte in &mut self.bytes {
            *byte = byte.wrapping_add(1);
            if *byte != 0 {
                return;
            }
        }
    }

    /// Returns a copy advanced `steps` times.
    #[must_use]
    pub fn advanced_by(&self, steps: u64) -> Self {
        let mut next = self.clone();
        for _ in 0..steps {
            next.advance();
        }
        next
    }
}

impl fmt::Debug for NonceSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NonceSequence({})", hex::encode(self.bytes))
    }
}
