// ============================================
// File: crates/nyxstream-core/src/conn.rs
// ============================================
//! # Session Connection
//!
//! ## Creation Reason
//! Wraps a raw duplex transport so that it can be used exactly like the
//! plaintext connection it replaces. Keys are set up lazily and
//! independently for each direction, with the salt exchanged in-band.
//!
//! ## Main Functionality
//! - `EncryptedStream`: `AsyncRead + AsyncWrite` over any transport
//! - `copy_to` / `copy_from`: Bulk transfer without an extra copy
//!
//! ## Direction State Machines
//! ```text
//! Read:   Unkeyed{salt, filled} ──salt complete, not replayed──► Ready(decoder)
//!              │                                                    │
//!              └──replayed / truncated / transport error──► Failed ◄┘ (decoder fails)
//!
//! Write:  Unkeyed ──first write──► SendingSalt{salt, written, encoder}
//!                                        │ salt sent, recorded
//!                                        ▼
//!                                   Ready(encoder)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Both directions derive their subkey with the same function; they stay
//!   independent only because each side picks its own salt
//! - The read salt is checked against the replay cache BEFORE any key is
//!   derived
//! - A direction that failed never recovers; discard the connection
//!
//! ## Last Modified
//! v0.1.0 - Initial session connection

use std::future::poll_fn;
use std::io;
use std::mem;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, warn};

use crate::crypto::{CipherSuite, Salt};
use crate::error::{CoreError, Result};
use crate::stream::{poll_read_exact, FrameDecoder, FrameEncoder};

// ============================================
// Direction States
// ============================================

#[derive(Debug)]
enum ReadState {
    Unkeyed { salt: Vec<u8>, filled: usize },
    Ready(FrameDecoder),
    Failed,
}

#[derive(Debug)]
enum WriteState {
    Unkeyed,
    SendingSalt {
        salt: Salt,
        written: usize,
        encoder: FrameEncoder,
    },
    Ready(FrameEncoder),
    Failed,
}

// ============================================
// EncryptedStream
// ============================================

/// Encrypted, authenticated byte stream over a raw transport.
///
/// # Example
/// ```no_run
/// use nyxstream_core::{CipherSuite, EncryptedStream};
/// use tokio::io::AsyncWriteExt;
/// use tokio::net::TcpStream;
///
/// # async fn run() -> std::io::Result<()> {
/// let suite = CipherSuite::chacha20_poly1305(&[0xAB; 32]).expect("32-byte key");
/// let tcp = TcpStream::connect("127.0.0.1:8388").await?;
///
/// let mut stream = EncryptedStream::new(tcp, suite);
/// stream.write_all(b"hello world").await?;
/// stream.flush().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct EncryptedStream<T> {
    inner: T,
    suite: CipherSuite,
    read: ReadState,
    write: WriteState,
}

impl<T> EncryptedStream<T> {
    /// Wraps `inner`. Nothing is sent or received until first use.
    pub fn new(inner: T, suite: CipherSuite) -> Self {
        let salt_size = suite.salt_size();
        Self {
            inner,
            suite,
            read: ReadState::Unkeyed {
                salt: vec![0u8; salt_size],
                filled: 0,
            },
            write: WriteState::Unkeyed,
        }
    }

    /// Cipher suite of this connection.
    pub const fn suite(&self) -> &CipherSuite {
        &self.suite
    }

    /// Borrows the transport.
    pub const fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrows the transport. Writing to it directly corrupts the
    /// stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Returns the transport, dropping all key and buffer state.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Returns `true` once the read direction has been keyed.
    pub const fn is_read_keyed(&self) -> bool {
        matches!(self.read, ReadState::Ready(_))
    }

    /// Returns `true` once the write direction has sent its salt.
    pub const fn is_write_keyed(&self) -> bool {
        matches!(self.write, WriteState::Ready(_))
    }

    fn key_reader(&self, salt: &Salt) -> Result<FrameDecoder> {
        if self.suite.replay_cache().check(salt.as_bytes()) {
            warn!(
                cipher = %self.suite.kind(),
                salt = %salt.fingerprint(),
                "Repeated salt rejected"
            );
            return Err(CoreError::RepeatedSalt);
        }

        let cipher = self.suite.decrypter(salt)?;
        debug!(
            cipher = %self.suite.kind(),
            salt = %salt.fingerprint(),
            "Read direction keyed"
        );
        Ok(FrameDecoder::new(cipher))
    }

    fn key_writer(&self) -> Result<WriteState> {
        let salt = Salt::random(self.suite.salt_size())?;
        let cipher = self.suite.encrypter(&salt)?;
        debug!(
            cipher = %self.suite.kind(),
            salt = %salt.fingerprint(),
            "Write direction keyed"
        );
        Ok(WriteState::SendingSalt {
            salt,
            written: 0,
            encoder: FrameEncoder::new(cipher),
        })
    }
}

impl<T: AsyncRead + Unpin> EncryptedStream<T> {
    /// Receives and checks the peer's salt if not done yet.
    ///
    /// Resolves to `false` if the transport ended cleanly before any salt
    /// byte arrived.
    fn poll_key_reader(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<bool>> {
        let ReadState::Unkeyed { salt, filled } = &mut self.read else {
            return Poll::Ready(match self.read {
                ReadState::Failed => Err(CoreError::direction_failed("read").into()),
                _ => Ok(true),
            });
        };

        let expected = salt.len();
        match ready!(poll_read_exact(cx, Pin::new(&mut self.inner), salt, filled)) {
            Ok(true) => {}
            Ok(false) if *filled == 0 => return Poll::Ready(Ok(false)),
            Ok(false) => {
                let err = CoreError::truncated("salt", expected, *filled);
                self.read = ReadState::Failed;
                return Poll::Ready(Err(err.into()));
            }
            Err(e) => {
                self.read = ReadState::Failed;
                return Poll::Ready(Err(e));
            }
        }

        let salt = Salt::from_vec(mem::take(salt));
        match self.key_reader(&salt) {
            Ok(decoder) => {
                self.read = ReadState::Ready(decoder);
                Poll::Ready(Ok(true))
            }
            Err(e) => {
                self.read = ReadState::Failed;
                Poll::Ready(Err(e.into()))
            }
        }
    }

    /// Decodes everything the peer sends into `writer`.
    ///
    /// # Returns
    /// Total plaintext bytes written.
    ///
    /// # Errors
    /// Replay, authentication and framing errors, or the first error from
    /// `writer`. A clean end-of-stream is not an error.
    pub async fn copy_to<W>(&mut self, writer: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if !poll_fn(|cx| self.poll_key_reader(cx)).await? {
            return Ok(0);
        }
        let ReadState::Ready(decoder) = &mut self.read else {
            return Err(CoreError::direction_failed("read").into());
        };
        decoder.copy_to(&mut self.inner, writer).await
    }
}

impl<T: AsyncWrite + Unpin> EncryptedStream<T> {
    /// Generates and sends our salt if not done yet.
    fn poll_key_writer(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            match &mut self.write {
                WriteState::Ready(_) => return Poll::Ready(Ok(())),
                WriteState::Failed => {
                    return Poll::Ready(Err(CoreError::direction_failed("write").into()));
                }
                WriteState::Unkeyed => match self.key_writer() {
                    Ok(state) => self.write = state,
                    Err(e) => {
                        self.write = WriteState::Failed;
                        return Poll::Ready(Err(e.into()));
                    }
                },
                WriteState::SendingSalt { salt, written, .. } => {
                    while *written < salt.len() {
                        let rest = &salt.as_bytes()[*written..];
                        match ready!(Pin::new(&mut self.inner).poll_write(cx, rest)) {
                            Ok(0) => {
                                self.write = WriteState::Failed;
                                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
                            }
                            Ok(n) => *written += n,
                            Err(e) => {
                                self.write = WriteState::Failed;
                                return Poll::Ready(Err(e));
                            }
                        }
                    }
                    self.suite.replay_cache().record(salt.as_bytes());

                    if let WriteState::SendingSalt { encoder, .. } =
                        mem::replace(&mut self.write, WriteState::Failed)
                    {
                        self.write = WriteState::Ready(encoder);
                    }
                }
            }
        }
    }

    /// Encrypts everything read from `reader` until it ends.
    ///
    /// # Returns
    /// Total plaintext bytes consumed.
    ///
    /// # Errors
    /// The first error from `reader` or the transport.
    pub async fn copy_from<R>(&mut self, reader: &mut R) -> io::Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        poll_fn(|cx| self.poll_key_writer(cx)).await?;
        let WriteState::Ready(encoder) = &mut self.write else {
            return Err(CoreError::direction_failed("write").into());
        };
        encoder.copy_from(reader, &mut self.inner).await
    }
}

// ============================================
// Tokio I/O Traits
// ============================================

impl<T: AsyncRead + Unpin> AsyncRead for EncryptedStream<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !ready!(this.poll_key_reader(cx))? {
            return Poll::Ready(Ok(()));
        }
        let ReadState::Ready(decoder) = &mut this.read else {
            return Poll::Ready(Err(CoreError::direction_failed("read").into()));
        };
        decoder.poll_read(cx, Pin::new(&mut this.inner), buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for EncryptedStream<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_key_writer(cx))?;
        let WriteState::Ready(encoder) = &mut this.write else {
            return Poll::Ready(Err(CoreError::direction_failed("write").into()));
        };
        encoder.poll_write(cx, Pin::new(&mut this.inner), buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match &mut this.write {
            WriteState::Unkeyed => Pin::new(&mut this.inner).poll_flush(cx),
            WriteState::Failed => {
                Poll::Ready(Err(CoreError::direction_failed("write").into()))
            }
            WriteState::SendingSalt { .. } | WriteState::Ready(_) => {
                ready!(this.poll_key_writer(cx))?;
                match &mut this.write {
                    WriteState::Ready(encoder) => encoder.poll_flush(cx, Pin::new(&mut this.inner)),
                    _ => Poll::Ready(Err(CoreError::direction_failed("write").into())),
                }
            }
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if matches!(this.write, WriteState::SendingSalt { .. }) {
            ready!(this.poll_key_writer(cx))?;
        }
        match &mut this.write {
            WriteState::Ready(encoder) => encoder.poll_shutdown(cx, Pin::new(&mut this.inner)),
            _ => Pin::new(&mut this.inner).poll_shutdown(cx),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::crypto::TAG_SIZE;
    use crate::replay::ReplayCache;

    const PSK: [u8; 32] = [0xAB; 32];

    fn suite() -> CipherSuite {
        CipherSuite::chacha20_poly1305(&PSK).unwrap()
    }

    /// Captures the raw wire bytes of one write direction.
    async fn wire_for(suite: CipherSuite, plaintext: &[u8]) -> Vec<u8> {
        let (local, mut remote) = duplex(64 * 1024);
        let mut stream = EncryptedStream::new(local, suite);
        stream.write_all(plaintext).await.unwrap();
        stream.shutdown().await.unwrap();

        let mut wire = Vec::new();
        remote.read_to_end(&mut wire).await.unwrap();
        wire
    }

    /// Feeds raw wire bytes to a fresh reading stream.
    async fn read_wire(suite: CipherSuite, wire: &[u8]) -> io::Result<Vec<u8>> {
        let (mut local, remote) = duplex(64 * 1024);
        local.write_all(wire).await?;
        drop(local);

        let mut stream = EncryptedStream::new(remote, suite);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await?;
        Ok(out)
    }

    #[tokio::test]
    async fn test_hello_world_end_to_end() {
        let sender = suite();
        let receiver = suite();
        let salt_size = sender.salt_size();

        let wire = wire_for(sender, b"hello world").await;
        assert_eq!(wire.len(), salt_size + 2 + TAG_SIZE + 11 + TAG_SIZE);

        let out = read_wire(receiver, &wire).await.unwrap();
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn test_aes_gcm_end_to_end() {
        for len in [16usize, 24, 32] {
            let key = vec![0x5C; len];
            let sender = CipherSuite::aes_gcm(&key).unwrap();
            let receiver = CipherSuite::aes_gcm(&key).unwrap();

            let data = vec![0xE1; 20_000];
            let wire = wire_for(sender, &data).await;
            assert_eq!(wire.len(), len.max(16) + data.len() + 2 * (2 + 2 * TAG_SIZE));
            assert_eq!(read_wire(receiver, &wire).await.unwrap(), data);
        }
    }

    #[tokio::test]
    async fn test_replayed_salt_rejected() {
        let wire = wire_for(suite(), b"replay me").await;
        let receiver = suite();

        assert_eq!(read_wire(receiver.clone(), &wire).await.unwrap(), b"replay me");

        let err = read_wire(receiver, &wire).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(matches!(
            CoreError::from_io(&err),
            Some(CoreError::RepeatedSalt)
        ));
    }

    #[tokio::test]
    async fn test_reflected_salt_rejected() {
        // Our own salt coming back is caught because the writer records it
        let ours = suite();
        let wire = wire_for(ours.clone(), b"echo").await;

        let err = read_wire(ours, &wire).await.unwrap_err();
        assert!(matches!(
            CoreError::from_io(&err),
            Some(CoreError::RepeatedSalt)
        ));
    }

    #[derive(Default)]
    struct RecordingCache {
        checked: Mutex<Vec<Vec<u8>>>,
        recorded: Mutex<HashSet<Vec<u8>>>,
    }

    impl ReplayCache for RecordingCache {
        fn check(&self, salt: &[u8]) -> bool {
            self.checked.lock().push(salt.to_vec());
            false
        }

        fn record(&self, salt: &[u8]) {
            self.recorded.lock().insert(salt.to_vec());
        }
    }

    #[tokio::test]
    async fn test_injected_cache_sees_both_salts() {
        let cache = Arc::new(RecordingCache::default());
        let sender = suite().with_replay_cache(cache.clone());
        let receiver = suite().with_replay_cache(cache.clone());

        let wire = wire_for(sender.clone(), b"x").await;
        read_wire(receiver, &wire).await.unwrap();

        let salt = wire[..sender.salt_size()].to_vec();
        assert!(cache.recorded.lock().contains(&salt));
        assert_eq!(*cache.checked.lock(), vec![salt]);
    }

    #[tokio::test]
    async fn test_empty_first_write_sends_salt() {
        let (local, mut remote) = duplex(1024);
        let mut stream = EncryptedStream::new(local, suite());

        assert_eq!(stream.write(&[]).await.unwrap(), 0);
        assert!(stream.is_write_keyed());
        stream.shutdown().await.unwrap();

        let mut wire = Vec::new();
        remote.read_to_end(&mut wire).await.unwrap();
        assert_eq!(wire.len(), 32);
    }

    #[tokio::test]
    async fn test_eof_before_salt_is_clean() {
        let out = read_wire(suite(), &[]).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_salt() {
        let err = read_wire(suite(), &[0u8; 5]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(matches!(
            CoreError::from_io(&err),
            Some(CoreError::TruncatedFrame { what: "salt", expected: 32, actual: 5 })
        ));
    }

    #[tokio::test]
    async fn test_wrong_key_fails_authentication() {
        let wire = wire_for(suite(), b"secret").await;
        let other = CipherSuite::chacha20_poly1305(&[0xCD; 32]).unwrap();

        let err = read_wire(other, &wire).await.unwrap_err();
        assert!(matches!(
            CoreError::from_io(&err),
            Some(CoreError::Authentication { block: "length" })
        ));
    }

    #[tokio::test]
    async fn test_bidirectional_exchange() {
        let (a, b) = duplex(256);
        let mut client = EncryptedStream::new(a, suite());
        let mut server = EncryptedStream::new(b, suite());

        let server_task = tokio::spawn(async move {
            let mut request = [0u8; 4];
            server.read_exact(&mut request).await.unwrap();
            assert_eq!(&request, b"ping");
            server.write_all(b"pong").await.unwrap();
            server.flush().await.unwrap();
            server
        });

        client.write_all(b"ping").await.unwrap();
        client.flush().await.unwrap();
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"pong");

        let server = server_task.await.unwrap();
        assert!(server.is_read_keyed() && server.is_write_keyed());
        assert!(client.is_read_keyed() && client.is_write_keyed());
    }

    #[tokio::test]
    async fn test_split_directions_run_concurrently() {
        let (a, b) = duplex(64);
        let client = EncryptedStream::new(a, suite());
        let server = EncryptedStream::new(b, suite());

        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 253) as u8).collect();
        let (mut client_rd, mut client_wr) = tokio::io::split(client);
        let (mut server_rd, mut server_wr) = tokio::io::split(server);

        // Both sides send at the same time through a 64-byte pipe
        let to_server = data.clone();
        let client_send = tokio::spawn(async move {
            client_wr.write_all(&to_server).await.unwrap();
            client_wr.shutdown().await.unwrap();
        });
        let to_client = data.clone();
        let server_send = tokio::spawn(async move {
            server_wr.write_all(&to_client).await.unwrap();
            server_wr.shutdown().await.unwrap();
        });

        let mut at_server = Vec::new();
        let mut at_client = Vec::new();
        let (r1, r2) = tokio::join!(
            server_rd.read_to_end(&mut at_server),
            client_rd.read_to_end(&mut at_client)
        );
        r1.unwrap();
        r2.unwrap();
        client_send.await.unwrap();
        server_send.await.unwrap();

        assert_eq!(at_server, data);
        assert_eq!(at_client, data);
    }

    #[tokio::test]
    async fn test_copy_to_rejects_replayed_salt() {
        let wire = wire_for(suite(), b"captured once").await;
        let receiver = suite();
        assert_eq!(read_wire(receiver.clone(), &wire).await.unwrap(), b"captured once");

        let (mut local, remote) = duplex(64 * 1024);
        local.write_all(&wire).await.unwrap();
        drop(local);

        let mut stream = EncryptedStream::new(remote, receiver);
        let mut sink = Vec::new();
        let err = stream.copy_to(&mut sink).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(matches!(
            CoreError::from_io(&err),
            Some(CoreError::RepeatedSalt)
        ));
        assert!(sink.is_empty());
        assert!(!stream.is_read_keyed());

        let err = stream.copy_to(&mut sink).await.unwrap_err();
        assert!(matches!(
            CoreError::from_io(&err),
            Some(CoreError::DirectionFailed { direction: "read" })
        ));
    }

    #[tokio::test]
    async fn test_copy_helpers() {
        let (a, b) = duplex(1024);
        let mut client = EncryptedStream::new(a, suite());
        let mut server = EncryptedStream::new(b, suite());
        let data = vec![0x77u8; 50_000];

        let source = data.clone();
        let sender = tokio::spawn(async move {
            let sent = client.copy_from(&mut &source[..]).await.unwrap();
            client.shutdown().await.unwrap();
            sent
        });

        let mut sink = Vec::new();
        let received = server.copy_to(&mut sink).await.unwrap();

        assert_eq!(sender.await.unwrap(), 50_000);
        assert_eq!(received, 50_000);
        assert_eq!(sink, data);
    }
}
