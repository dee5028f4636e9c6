// ============================================
// File: crates/nyxstream-core/src/stream/decoder.rs
// ============================================
//! # Frame Decoder
//!
//! ## Creation Reason
//! Reads sealed frames from the transport, authenticates them and hands the
//! plaintext out as an ordinary byte stream, whatever the caller's buffer
//! size.
//!
//! ## Main Functionality
//! - `FrameDecoder`: Poll-driven opening state machine (transport passed in)
//! - `FrameDecoder::copy_to`: Bulk transfer into any `AsyncWrite`
//! - `EncryptedReader`: `AsyncRead` / `AsyncBufRead` adapter
//!
//! ## State Machine
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//!   ┌──────────────┐ header ok  ┌───────────────┐ payload ok │
//!   │ Length{fill} │──────────►│ Payload{len,  │──────────► Leftover{pos,end}
//!   └──────────────┘            │        fill}  │             (drained by reads)
//!      │ EOF at 0 → end-of-stream└───────────────┘
//!      │ any error ──────────────────────────────────────────► Failed (terminal)
//! ```
//!
//! ## Length Field Handling
//! The opened length is NOT masked with 0x3FFF. A length with either of the
//! two high bits set fails with `MalformedFrame` and the direction is
//! dropped. Conforming encoders never set those bits, so masking would
//! only turn a corrupt peer into a silently misframed stream. Peers that
//! rely on the mask are not interoperable.
//!
//! ## ⚠️ Important Note for Next Developer
//! - The leftover is fully drained before the next frame is read
//! - Partially received blocks survive `Pending`; nothing is re-read
//!
//! ## Last Modified
//! v0.1.0 - Initial decoder

use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::{trace, warn};

use super::{poll_read_exact, FrameBuffer, MAX_PAYLOAD_SIZE};
use crate::crypto::{NonceSequence, SessionCipher};
use crate::error::{CoreError, Result};

// ============================================
// DecodeState
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Receiving the sealed length block.
    Length { filled: usize },
    /// Receiving the sealed payload block of `len` plaintext bytes.
    Payload { len: usize, filled: usize },
    /// Opened plaintext `payload[pos..end]` not yet handed out.
    Leftover { pos: usize, end: usize },
    Failed,
}

// ============================================
// FrameDecoder
// ============================================

/// Opening half of the frame layer.
#[derive(Debug)]
pub struct FrameDecoder {
    cipher: SessionCipher,
    nonce: NonceSequence,
    buffer: FrameBuffer,
    state: DecodeState,
    frames: u64,
}

impl FrameDecoder {
    /// Creates a decoder with a fresh nonce sequence.
    #[must_use]
    pub fn new(cipher: SessionCipher) -> Self {
        let buffer = FrameBuffer::new(cipher.overhead());
        Self {
            cipher,
            nonce: NonceSequence::new(),
            buffer,
            state: DecodeState::Length { filled: 0 },
            frames: 0,
        }
    }

    /// Nonce that the next open will use.
    #[must_use]
    pub const fn nonce(&self) -> &NonceSequence {
        &self.nonce
    }

    /// Number of frames opened so far.
    #[must_use]
    pub const fn frames_opened(&self) -> u64 {
        self.frames
    }

    /// Returns `true` once the decoder has given up.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state == DecodeState::Failed
    }

    /// Decoded plaintext not yet handed out.
    #[must_use]
    pub fn leftover(&self) -> &[u8] {
        match self.state {
            DecodeState::Leftover { pos, end } => self.buffer.payload(pos..end),
            _ => &[],
        }
    }

    /// Marks `amt` leftover bytes as delivered.
    pub fn consume(&mut self, amt: usize) {
        if let DecodeState::Leftover { pos, end } = &mut self.state {
            *pos = (*pos + amt).min(*end);
        }
    }

    fn fail<T>(&mut self, err: io::Error) -> Poll<io::Result<T>> {
        self.state = DecodeState::Failed;
        Poll::Ready(Err(err))
    }

    fn open_length(&mut self) -> Result<usize> {
        let header = self.buffer.header_block_mut();
        if let Err(e) = self.cipher.open_in_place(&self.nonce, header, "length") {
            warn!(frame = self.frames, "Length block failed authentication");
            return Err(e);
        }
        self.nonce.advance();

        let len = usize::from(u16::from_be_bytes([header[0], header[1]]));
        if len > MAX_PAYLOAD_SIZE {
            warn!(len, frame = self.frames, "Frame length out of range");
            return Err(CoreError::MalformedFrame {
                length: len,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(len)
    }

    fn open_payload(&mut self, len: usize) -> Result<()> {
        let block = self.buffer.payload_block_mut(len);
        if let Err(e) = self.cipher.open_in_place(&self.nonce, block, "payload") {
            warn!(len, frame = self.frames, "Payload block failed authentication");
            return Err(e);
        }
        self.nonce.advance();
        self.frames += 1;
        trace!(len, frame = self.frames, "Opened frame");
        Ok(())
    }

    /// Makes decoded plaintext available, reading and opening the next
    /// frame only once the leftover is exhausted.
    ///
    /// Resolves to the number of bytes in [`leftover`](Self::leftover);
    /// zero means a clean end-of-stream at a frame boundary.
    ///
    /// # Errors
    /// - `Authentication` / `MalformedFrame` as `InvalidData`
    /// - `TruncatedFrame` as `UnexpectedEof` when the stream ends mid-frame
    /// - Transport errors untouched
    ///
    /// Every error fails the decoder.
    pub fn poll_frame<R: AsyncRead + ?Sized>(
        &mut self,
        cx: &mut Context<'_>,
        mut reader: Pin<&mut R>,
    ) -> Poll<io::Result<usize>> {
        loop {
            match &mut self.state {
                DecodeState::Failed => {
                    return Poll::Ready(Err(CoreError::direction_failed("read").into()));
                }
                DecodeState::Leftover { pos, end } if *pos < *end => {
                    return Poll::Ready(Ok(*end - *pos));
                }
                DecodeState::Leftover { .. } => {
                    self.state = DecodeState::Length { filled: 0 };
                }
                DecodeState::Length { filled } => {
                    let block = self.buffer.header_block_mut();
                    let expected = block.len();
                    match ready!(poll_read_exact(cx, reader.as_mut(), block, filled)) {
                        Ok(true) => {}
                        Ok(false) if *filled == 0 => return Poll::Ready(Ok(0)),
                        Ok(false) => {
                            let err = CoreError::truncated("length block", expected, *filled);
                            return self.fail(err.into());
                        }
                        Err(e) => return self.fail(e),
                    }

                    match self.open_length() {
                        Ok(len) => self.state = DecodeState::Payload { len, filled: 0 },
                        Err(e) => return self.fail(e.into()),
                    }
                }
                DecodeState::Payload { len, filled } => {
                    let len = *len;
                    let block = self.buffer.payload_block_mut(len);
                    let expected = block.len();
                    match ready!(poll_read_exact(cx, reader.as_mut(), block, filled)) {
                        Ok(true) => {}
                        Ok(false) => {
                            let err = CoreError::truncated("payload block", expected, *filled);
                            return self.fail(err.into());
                        }
                        Err(e) => return self.fail(e),
                    }

                    if let Err(e) = self.open_payload(len) {
                        return self.fail(e.into());
                    }
                    self.state = DecodeState::Leftover { pos: 0, end: len };
                }
            }
        }
    }

    /// Same as [`poll_frame`](Self::poll_frame) but yields the leftover
    /// itself.
    ///
    /// # Errors
    /// See [`poll_frame`](Self::poll_frame).
    pub fn poll_fill_buf<R: AsyncRead + ?Sized>(
        &mut self,
        cx: &mut Context<'_>,
        reader: Pin<&mut R>,
    ) -> Poll<io::Result<&[u8]>> {
        ready!(self.poll_frame(cx, reader))?;
        Poll::Ready(Ok(self.leftover()))
    }

    /// Copies as much decoded plaintext as fits into `buf`.
    ///
    /// Leaves `buf` untouched at end-of-stream.
    ///
    /// # Errors
    /// See [`poll_frame`](Self::poll_frame).
    pub fn poll_read<R: AsyncRead + ?Sized>(
        &mut self,
        cx: &mut Context<'_>,
        reader: Pin<&mut R>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let available = ready!(self.poll_frame(cx, reader))?;
        let n = available.min(buf.remaining());
        buf.put_slice(&self.leftover()[..n]);
        self.consume(n);
        Poll::Ready(Ok(()))
    }

    /// Forwards the leftover and then every decoded frame to `writer`
    /// until `reader` ends cleanly.
    ///
    /// # Returns
    /// Total plaintext bytes written to `writer`.
    ///
    /// # Errors
    /// The first error from `writer`, or the first non-EOF error from the
    /// frame layer.
    pub async fn copy_to<R, W>(&mut self, reader: &mut R, writer: &mut W) -> io::Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut total = 0u64;
        loop {
            let n = poll_fn(|cx| self.poll_frame(cx, Pin::new(&mut *reader))).await?;
            if n == 0 {
                break;
            }
            writer.write_all(self.leftover()).await?;
            self.consume(n);
            total += n as u64;
        }
        writer.flush().await?;
        Ok(total)
    }
}

// ============================================
// EncryptedReader
// ============================================

/// `AsyncRead` adapter that decodes frames from `inner`.
///
/// Expects no salt; this is the bare frame layer over an already keyed
/// cipher.
#[derive(Debug)]
pub struct EncryptedReader<R> {
    inner: R,
    decoder: FrameDecoder,
}

impl<R> EncryptedReader<R> {
    /// Wraps `inner`, opening with `cipher` from nonce zero.
    pub fn new(inner: R, cipher: SessionCipher) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(cipher),
        }
    }

    /// Nonce that the next open will use.
    pub const fn nonce(&self) -> &NonceSequence {
        self.decoder.nonce()
    }

    /// Number of frames opened so far.
    pub const fn frames_opened(&self) -> u64 {
        self.decoder.frames_opened()
    }

    /// Returns the transport. Undelivered plaintext is dropped.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> EncryptedReader<R> {
    /// Decodes everything into `writer`. See [`FrameDecoder::copy_to`].
    ///
    /// # Errors
    /// The first error from either side.
    pub async fn copy_to<W>(&mut self, writer: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.decoder.copy_to(&mut self.inner, writer).await
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for EncryptedReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.decoder.poll_read(cx, Pin::new(&mut this.inner), buf)
    }
}

impl<R: AsyncRead + Unpin> AsyncBufRead for EncryptedReader<R> {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        let this = self.get_mut();
        this.decoder.poll_fill_buf(cx, Pin::new(&mut this.inner))
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        self.get_mut().decoder.consume(amt);
    }
}

// ============================================
// Tests
// ============================================
