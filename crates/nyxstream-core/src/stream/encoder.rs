// ============================================
// File: crates/nyxstream-core/src/stream/encoder.rs
// ============================================
//! # Frame Encoder
//!
//! ## Creation Reason
//! Seals outbound plaintext into frames of at most 16383 bytes and pushes
//! them to the transport without ever sealing the same bytes twice.
//!
//! ## Main Functionality
//! - `FrameEncoder`: Poll-driven sealing state machine (transport passed in)
//! - `FrameEncoder::copy_from`: Bulk transfer from any `AsyncRead`
//! - `EncryptedWriter`: `AsyncWrite` adapter over an owned transport
//!
//! ## Write Flow
//! ```text
//! poll_write(data)
//!   │
//!   ├─ pending sealed bytes? ──► push them out first
//!   │
//!   ├─ stage min(len, 16383) bytes ──► seal length (n) ──► seal payload (n+1)
//!   │
//!   └─ try to push the frame, return Ok(staged)
//!        (a frame still pending is finished by the next write/flush/shutdown)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - At most ONE sealed frame is buffered
//! - After any seal or transport error the encoder refuses further writes;
//!   sealed-but-unsent bytes are discarded, never re-sealed
//!
//! ## Last Modified
//! v0.1.0 - Initial encoder

use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, trace};

use super::{FrameBuffer, MAX_PAYLOAD_SIZE};
use crate::crypto::{NonceSequence, SessionCipher};
use crate::error::{CoreError, Result};

// ============================================
// FrameEncoder
// ============================================

/// Sealing half of the frame layer.
#[derive(Debug)]
pub struct FrameEncoder {
    cipher: SessionCipher,
    nonce: NonceSequence,
    buffer: FrameBuffer,
    /// Unsent sealed bytes are `buffer[pos..end]`.
    pos: usize,
    end: usize,
    frames: u64,
    failed: bool,
}

impl FrameEncoder {
    /// Creates an encoder with a fresh nonce sequence.
    #[must_use]
    pub fn new(cipher: SessionCipher) -> Self {
        let buffer = FrameBuffer::new(cipher.overhead());
        Self {
            cipher,
            nonce: NonceSequence::new(),
            buffer,
            pos: 0,
            end: 0,
            frames: 0,
            failed: false,
        }
    }

    /// Nonce that the next seal will use.
    #[must_use]
    pub const fn nonce(&self) -> &NonceSequence {
        &self.nonce
    }

    /// Number of frames sealed so far.
    #[must_use]
    pub const fn frames_sealed(&self) -> u64 {
        self.frames
    }

    /// Returns `true` while a sealed frame has not fully reached the transport.
    #[must_use]
    pub const fn has_pending(&self) -> bool {
        self.pos < self.end
    }

    /// Returns `true` once the encoder has given up.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.failed
    }

    fn check_usable(&self) -> io::Result<()> {
        if self.failed {
            return Err(CoreError::direction_failed("write").into());
        }
        Ok(())
    }

    /// Seals `len` bytes already staged in the payload region.
    fn seal_staged(&mut self, len: usize) -> Result<()> {
        let length = u16::try_from(len)
            .ok()
            .filter(|&l| usize::from(l) <= MAX_PAYLOAD_SIZE)
            .ok_or_else(|| CoreError::encryption(format!("payload of {len} bytes")))?;

        let (header, payload) = self.buffer.blocks_mut(len);
        header[..2].copy_from_slice(&length.to_be_bytes());

        self.cipher.seal_in_place(&self.nonce, header)?;
        self.nonce.advance();
        self.cipher.seal_in_place(&self.nonce, payload)?;
        self.nonce.advance();

        self.pos = 0;
        self.end = self.buffer.frame_len(len);
        self.frames += 1;
        trace!(len, frame = self.frames, "Sealed frame");
        Ok(())
    }

    /// Copies up to one frame of `data` into the buffer and seals it.
    fn stage(&mut self, data: &[u8]) -> io::Result<usize> {
        let n = data.len().min(MAX_PAYLOAD_SIZE);
        self.buffer.payload_region_mut()[..n].copy_from_slice(&data[..n]);
        if let Err(e) = self.seal_staged(n) {
            self.failed = true;
            return Err(e.into());
        }
        Ok(n)
    }

    /// Pushes any pending sealed bytes into `writer`.
    ///
    /// # Errors
    /// Transport errors are returned untouched; a zero-length write is
    /// reported as `WriteZero`. Either one fails the encoder.
    pub fn poll_drain<W: AsyncWrite + ?Sized>(
        &mut self,
        cx: &mut Context<'_>,
        mut writer: Pin<&mut W>,
    ) -> Poll<io::Result<()>> {
        while self.pos < self.end {
            let pending = self.buffer.frame(self.pos..self.end);
            match ready!(writer.as_mut().poll_write(cx, pending)) {
                Ok(0) => {
                    self.failed = true;
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "transport accepted no bytes of a sealed frame",
                    )));
                }
                Ok(n) => self.pos += n,
                Err(e) => {
                    self.failed = true;
                    return Poll::Ready(Err(e));
                }
            }
        }
        Poll::Ready(Ok(()))
    }

    /// Seals up to 16383 bytes of `data` as one frame.
    ///
    /// Returns the number of plaintext bytes consumed. An empty `data`
    /// produces no frame.
    ///
    /// # Errors
    /// Fails on a failed encoder, on a seal error or on a transport error.
    pub fn poll_write<W: AsyncWrite + ?Sized>(
        &mut self,
        cx: &mut Context<'_>,
        mut writer: Pin<&mut W>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.check_usable()?;
        ready!(self.poll_drain(cx, writer.as_mut()))?;
        if data.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let n = self.stage(data)?;
        if let Poll::Ready(Err(e)) = self.poll_drain(cx, writer) {
            return Poll::Ready(Err(e));
        }
        Poll::Ready(Ok(n))
    }

    /// Drains pending sealed bytes, then flushes `writer`.
    ///
    /// # Errors
    /// Fails on a failed encoder or a transport error.
    pub fn poll_flush<W: AsyncWrite + ?Sized>(
        &mut self,
        cx: &mut Context<'_>,
        mut writer: Pin<&mut W>,
    ) -> Poll<io::Result<()>> {
        self.check_usable()?;
        ready!(self.poll_drain(cx, writer.as_mut()))?;
        writer.poll_flush(cx)
    }

    /// Drains pending sealed bytes, then shuts `writer` down.
    ///
    /// A failed encoder skips the drain so the transport can still be
    /// closed.
    ///
    /// # Errors
    /// Returns transport errors.
    pub fn poll_shutdown<W: AsyncWrite + ?Sized>(
        &mut self,
        cx: &mut Context<'_>,
        mut writer: Pin<&mut W>,
    ) -> Poll<io::Result<()>> {
        if !self.failed {
            ready!(self.poll_drain(cx, writer.as_mut()))?;
        }
        writer.poll_shutdown(cx)
    }

    /// Reads `reader` to end-of-stream, sealing each read as one frame.
    ///
    /// Reads land directly in the scratch buffer. End-of-stream of `reader`
    /// is graceful completion; `writer` is flushed before returning.
    ///
    /// # Returns
    /// Total plaintext bytes consumed from `reader`.
    ///
    /// # Errors
    /// The first error from either side. It fails the encoder; the bytes
    /// consumed before it are logged at debug level.
    pub async fn copy_from<R, W>(&mut self, reader: &mut R, writer: &mut W) -> io::Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.check_usable()?;

        let mut total = 0u64;
        match self.copy_frames(reader, writer, &mut total).await {
            Ok(()) => Ok(total),
            Err(e) => {
                self.failed = true;
                debug!(consumed = total, frames = self.frames, "Bulk copy stopped: {}", e);
                Err(e)
            }
        }
    }

    async fn copy_frames<R, W>(
        &mut self,
        reader: &mut R,
        writer: &mut W,
        total: &mut u64,
    ) -> io::Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        poll_fn(|cx| self.poll_drain(cx, Pin::new(&mut *writer))).await?;

        loop {
            let n = match reader.read(self.buffer.payload_region_mut()).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            self.seal_staged(n)?;
            poll_fn(|cx| self.poll_drain(cx, Pin::new(&mut *writer))).await?;
            *total += n as u64;
        }

        poll_fn(|cx| Pin::new(&mut *writer).poll_flush(cx)).await
    }
}

// ============================================
// EncryptedWriter
// ============================================

/// `AsyncWrite` adapter that frames everything written into `inner`.
///
/// No salt is written; this is the bare frame layer over an already keyed
/// cipher.
#[derive(Debug)]
pub struct EncryptedWriter<W> {
    inner: W,
    encoder: FrameEncoder,
}

impl<W> EncryptedWriter<W> {
    /// Wraps `inner`, sealing with `cipher` from nonce zero.
    pub fn new(inner: W, cipher: SessionCipher) -> Self {
        Self {
            inner,
            encoder: FrameEncoder::new(cipher),
        }
    }

    /// Nonce that the next seal will use.
    pub const fn nonce(&self) -> &NonceSequence {
        self.encoder.nonce()
    }

    /// Number of frames sealed so far.
    pub const fn frames_sealed(&self) -> u64 {
        self.encoder.frames_sealed()
    }

    /// Borrows the transport.
    pub const fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Returns the transport. Pending sealed bytes are dropped.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> EncryptedWriter<W> {
    /// Frames all of `reader` into the transport. See
    /// [`FrameEncoder::copy_from`].
    ///
    /// # Errors
    /// The first error from either side.
    pub async fn copy_from<R>(&mut self, reader: &mut R) -> io::Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.encoder.copy_from(reader, &mut self.inner).await
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for EncryptedWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.encoder.poll_write(cx, Pin::new(&mut this.inner), buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.encoder.poll_flush(cx, Pin::new(&mut this.inner))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.encoder.poll_shutdown(cx, Pin::new(&mut this.inner))
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::crypto::{CipherKind, TAG_SIZE};

    const FRAME_OVERHEAD: usize = 2 + TAG_SIZE + TAG_SIZE;

    fn writer(kind: CipherKind) -> EncryptedWriter<Vec<u8>> {
        let cipher = SessionCipher::new(kind, &vec![0x42; kind.key_size()]).unwrap();
        EncryptedWriter::new(Vec::new(), cipher)
    }

    #[tokio::test]
    async fn test_exactly_one_frame_at_max_payload() {
        let mut w = writer(CipherKind::ChaCha20Poly1305);
        w.write_all(&[0x5A; MAX_PAYLOAD_SIZE]).await.unwrap();
        w.flush().await.unwrap();

        assert_eq!(w.frames_sealed(), 1);
        assert_eq!(w.get_ref().len(), MAX_PAYLOAD_SIZE + FRAME_OVERHEAD);
        assert_eq!(w.nonce(), &NonceSequence::new().advanced_by(2));
    }

    #[tokio::test]
    async fn test_one_byte_over_splits_into_two_frames() {
        let mut w = writer(CipherKind::Aes128Gcm);
        w.write_all(&[0x5A; MAX_PAYLOAD_SIZE + 1]).await.unwrap();
        w.flush().await.unwrap();

        assert_eq!(w.frames_sealed(), 2);
        assert_eq!(
            w.get_ref().len(),
            (MAX_PAYLOAD_SIZE + FRAME_OVERHEAD) + (1 + FRAME_OVERHEAD)
        );
        assert_eq!(w.nonce(), &NonceSequence::new().advanced_by(4));
    }

    #[tokio::test]
    async fn test_nonce_advances_twice_per_frame() {
        let mut w = writer(CipherKind::Aes256Gcm);
        for k in 1..=5u64 {
            w.write_all(b"chunk").await.unwrap();
            assert_eq!(w.nonce(), &NonceSequence::new().advanced_by(2 * k));
        }
    }

    #[tokio::test]
    async fn test_empty_write_produces_nothing() {
        let mut w = writer(CipherKind::ChaCha20Poly1305);
        assert_eq!(w.write(&[]).await.unwrap(), 0);
        w.flush().await.unwrap();

        assert!(w.get_ref().is_empty());
        assert_eq!(w.frames_sealed(), 0);
    }

    #[tokio::test]
    async fn test_length_block_opens_to_big_endian_length() {
        let mut w = writer(CipherKind::ChaCha20Poly1305);
        w.write_all(&[7u8; 300]).await.unwrap();

        let opener =
            SessionCipher::new(CipherKind::ChaCha20Poly1305, &[0x42; 32]).unwrap();
        let mut header = w.get_ref()[..2 + TAG_SIZE].to_vec();
        opener
            .open_in_place(&NonceSequence::new(), &mut header, "length")
            .unwrap();
        assert_eq!(&header[..2], &300u16.to_be_bytes());
    }

    #[tokio::test]
    async fn test_copy_from_reader() {
        let data: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
        let mut w = writer(CipherKind::Aes192Gcm);

        let copied = w.copy_from(&mut &data[..]).await.unwrap();

        assert_eq!(copied, data.len() as u64);
        // Every frame costs 34 bytes on top of its payload
        let frames = w.frames_sealed() as usize;
        assert!(frames >= 3);
        assert_eq!(w.get_ref().len(), data.len() + frames * FRAME_OVERHEAD);
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Yields one chunk, then fails.
    struct FailingSource {
        chunk: Option<Vec<u8>>,
    }

    impl AsyncRead for FailingSource {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.chunk.take() {
                Some(chunk) => {
                    buf.put_slice(&chunk);
                    Poll::Ready(Ok(()))
                }
                None => Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "source reset",
                ))),
            }
        }
    }

    #[tokio::test]
    async fn test_copy_from_source_error_fails_encoder() {
        let cipher = SessionCipher::new(CipherKind::Aes128Gcm, &[9; 16]).unwrap();
        let mut encoder = FrameEncoder::new(cipher);
        let mut source = FailingSource {
            chunk: Some(vec![0xA5; 1_000]),
        };
        let mut sink = Vec::new();

        let err = encoder.copy_from(&mut source, &mut sink).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(err.to_string(), "source reset");

        // The chunk read before the failure was sealed and sent
        assert_eq!(encoder.frames_sealed(), 1);
        assert_eq!(sink.len(), 1_000 + FRAME_OVERHEAD);
        assert!(encoder.is_failed());

        let err = poll_fn(|cx| encoder.poll_write(cx, Pin::new(&mut sink), b"more"))
            .await
            .unwrap_err();
        assert!(matches!(
            CoreError::from_io(&err),
            Some(CoreError::DirectionFailed { direction: "write" })
        ));
        assert_eq!(sink.len(), 1_000 + FRAME_OVERHEAD);
    }

    #[tokio::test]
    async fn test_copy_from_transport_error_is_returned() {
        let cipher = SessionCipher::new(CipherKind::ChaCha20Poly1305, &[3; 32]).unwrap();
        let mut w = EncryptedWriter::new(BrokenPipe, cipher);

        let err = w.copy_from(&mut &b"never arrives"[..]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(w.encoder.is_failed());
    }

    #[tokio::test]
    async fn test_transport_error_fails_encoder() {
        let cipher = SessionCipher::new(CipherKind::ChaCha20Poly1305, &[1; 32]).unwrap();
        let mut w = EncryptedWriter::new(BrokenPipe, cipher);

        let err = w.write_all(b"lost").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(CoreError::from_io(&err).is_none());

        let err = w.write_all(b"again").await.unwrap_err();
        assert!(matches!(
            CoreError::from_io(&err),
            Some(CoreError::DirectionFailed { direction: "write" })
        ));
    }
}
