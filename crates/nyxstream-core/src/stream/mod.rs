// ============================================
// File: crates/nyxstream-core/src/stream/mod.rs
// ============================================
//! # Frame Layer
//!
//! ## Creation Reason
//! Turns a keyed AEAD instance plus an ordered byte transport into a
//! sequence of length-prefixed sealed frames, and back.
//!
//! ## Main Functionality
//! - [`encoder`]: `FrameEncoder` state machine and the `EncryptedWriter` wrapper
//! - [`decoder`]: `FrameDecoder` state machine and the `EncryptedReader` wrapper
//! - `FrameBuffer`: Fixed-capacity scratch buffer shared by both
//!
//! ## Wire Format
//! ```text
//! ┌───────────────────────┬──────────┬───────────────────────┬──────────┐
//! │ len (2 bytes, BE)     │ tag (16) │ payload (len bytes)   │ tag (16) │
//! └───────────────────────┴──────────┴───────────────────────┴──────────┘
//!   sealed with nonce n                sealed with nonce n + 1
//!
//! len ≤ 0x3FFF; the next frame starts at nonce n + 2
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Encoder and decoder own nonce and buffer but NOT the transport; the
//!   transport is passed into every poll so the session connection can
//!   drive both directions over one duplex value
//! - Plaintext is only ever exposed from the scratch buffer after the
//!   block has been authenticated
//!
//! ## Last Modified
//! v0.1.0 - Initial frame layer

use std::fmt;
use std::io;
use std::ops::Range;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

pub mod decoder;
pub mod encoder;

pub use decoder::{EncryptedReader, FrameDecoder};
pub use encoder::{EncryptedWriter, FrameEncoder};

// ============================================
// Constants
// ============================================

/// Largest payload carried by one frame (14-bit length field).
pub const MAX_PAYLOAD_SIZE: usize = 0x3FFF;

/// Size of the plaintext length field.
pub const LENGTH_FIELD_SIZE: usize = 2;

// ============================================
// FrameBuffer
// ============================================

/// Owned scratch buffer sized for one maximum frame.
///
/// ```text
/// [0 .. 2+o)                 header block
/// [2+o .. 2+o+len+o)         payload block
/// ```
pub(crate) struct FrameBuffer {
    bytes: Box<[u8]>,
    overhead: usize,
}

impl FrameBuffer {
    pub(crate) fn new(overhead: usize) -> Self {
        let capacity = LENGTH_FIELD_SIZE + overhead + MAX_PAYLOAD_SIZE + overhead;
        Self {
            bytes: vec![0u8; capacity].into_boxed_slice(),
            overhead,
        }
    }

    /// Length of the sealed header block.
    pub(crate) const fn header_len(&self) -> usize {
        LENGTH_FIELD_SIZE + self.overhead
    }

    /// Length of a whole sealed frame carrying `payload_len` bytes.
    pub(crate) const fn frame_len(&self, payload_len: usize) -> usize {
        self.header_len() + payload_len + self.overhead
    }

    pub(crate) fn header_block_mut(&mut self) -> &mut [u8] {
        let end = self.header_len();
        &mut self.bytes[..end]
    }

    pub(crate) fn payload_block_mut(&mut self, payload_len: usize) -> &mut [u8] {
        let start = self.header_len();
        let end = self.frame_len(payload_len);
        &mut self.bytes[start..end]
    }

    /// Header and payload blocks of one frame, split for sealing.
    pub(crate) fn blocks_mut(&mut self, payload_len: usize) -> (&mut [u8], &mut [u8]) {
        let header_len = self.header_len();
        let block_len = payload_len + self.overhead;
        let (header, rest) = self.bytes.split_at_mut(header_len);
        (header, &mut rest[..block_len])
    }

    /// Plaintext staging area for up to `MAX_PAYLOAD_SIZE` bytes.
    pub(crate) fn payload_region_mut(&mut self) -> &mut [u8] {
        let start = self.header_len();
        &mut self.bytes[start..start + MAX_PAYLOAD_SIZE]
    }

    /// Opened plaintext, `range` relative to the payload start.
    pub(crate) fn payload(&self, range: Range<usize>) -> &[u8] {
        let start = self.header_len();
        &self.bytes[start + range.start..start + range.end]
    }

    /// Raw bytes, `range` relative to the frame start.
    pub(crate) fn frame(&self, range: Range<usize>) -> &[u8] {
        &self.bytes[range]
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("capacity", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

// ============================================
// Transport Helpers
// ============================================

/// Reads until `buf` is full, keeping progress in `filled` across polls.
///
/// Resolves to `false` if the transport reported end-of-stream first.
pub(crate) fn poll_read_exact<R: AsyncRead + ?Sized>(
    cx: &mut Context<'_>,
    mut reader: Pin<&mut R>,
    buf: &mut [u8],
    filled: &mut usize,
) -> Poll<io::Result<bool>> {
    while *filled < buf.len() {
        let mut read_buf = ReadBuf::new(&mut buf[*filled..]);
        ready!(reader.as_mut().poll_read(cx, &mut read_buf))?;
        let n = read_buf.filled().len();
        if n == 0 {
            return Poll::Ready(Ok(false));
        }
        *filled += n;
    }
    Poll::Ready(Ok(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::TAG_SIZE;

    #[test]
    fn test_frame_buffer_layout() {
        let mut buffer = FrameBuffer::new(TAG_SIZE);

        assert_eq!(buffer.header_len(), 18);
        assert_eq!(buffer.frame_len(0), 34);
        assert_eq!(buffer.frame_len(MAX_PAYLOAD_SIZE), 2 + 16 + 16383 + 16);
        assert_eq!(buffer.payload_region_mut().len(), MAX_PAYLOAD_SIZE);

        let (header, payload) = buffer.blocks_mut(11);
        assert_eq!(header.len(), 18);
        assert_eq!(payload.len(), 27);
    }

    #[test]
    fn test_payload_view_matches_staging() {
        let mut buffer = FrameBuffer::new(TAG_SIZE);
        buffer.payload_region_mut()[..5].copy_from_slice(b"hello");

        assert_eq!(buffer.payload(0..5), b"hello");
        assert_eq!(buffer.payload(1..3), b"el");
        assert_eq!(&buffer.frame(18..23)[..], b"hello");
    }
}
