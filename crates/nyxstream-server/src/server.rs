// ============================================
// File: crates/nyxstream-server/src/server.rs
// ============================================
//! # Tunnel Endpoint
//!
//! ## Creation Reason
//! Runs one side of a fixed-target encrypted TCP tunnel: every accepted
//! connection is relayed to the configured upstream, with the encrypted
//! stream layer on the tunnel side.
//!
//! ## Main Functionality
//! - `Server`: Listener lifecycle, connection limit, graceful shutdown
//! - `Relay`: Per-connection upstream connect and bidirectional copy
//!
//! ## Data Flow
//! ```text
//!   client mode                          server mode
//! ┌──────────┐ plain ┌──────────┐ enc ┌──────────┐ plain ┌──────────┐
//! │   app    │──────►│ endpoint │────►│ endpoint │──────►│ upstream │
//! │          │◄──────│ (client) │◄────│ (server) │◄──────│          │
//! └──────────┘       └──────────┘     └──────────┘       └──────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - There is no address negotiation; the upstream is fixed by config
//! - All connections share one cipher suite and therefore one replay cache
//! - Connections over the limit are accepted and immediately closed
//! - Use tokio::select! for concurrent operations
//!
//! ## Last Modified
//! v0.1.0 - Initial endpoint implementation

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::copy_bidirectional;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use nyxstream_core::{CipherSuite, EncryptedStream, ReplayCache};

use crate::config::{ServerConfig, TunnelMode};
use crate::error::{Result, ServerError};

/// How long shutdown waits for open connections.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================
// Server
// ============================================

/// Tunnel endpoint.
///
/// # Lifecycle
/// 1. Create with `Server::new(config)`
/// 2. Start with `server.run().await` (or `serve` on an existing listener)
/// 3. Shutdown via Ctrl+C or `shutdown()`
pub struct Server {
    /// Endpoint configuration.
    config: ServerConfig,
    /// Cipher suite shared by all connections.
    suite: CipherSuite,
    /// Connection slots.
    limiter: Arc<Semaphore>,
    /// Shutdown flag.
    shutdown: Arc<AtomicBool>,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Creates a new endpoint.
    ///
    /// # Errors
    /// Returns a configuration error if `config` is invalid.
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let suite = config.cipher_suite()?;
        if !suite.replay_cache().is_active() {
            warn!(
                "Replay filter disabled (replay.capacity = 0): repeated salts will be accepted"
            );
        }
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            limiter: Arc::new(Semaphore::new(config.limits.max_connections)),
            config,
            suite,
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        })
    }

    /// Endpoint role.
    #[must_use]
    pub const fn mode(&self) -> TunnelMode {
        self.config.tunnel.mode
    }

    /// Returns `true` if repeated salts are rejected.
    #[must_use]
    pub fn replay_protected(&self) -> bool {
        self.suite.replay_cache().is_active()
    }

    /// Number of connections currently relayed.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.config.limits.max_connections - self.limiter.available_permits()
    }

    /// Binds the configured listen address.
    ///
    /// # Errors
    /// Returns `StartupFailed` if the address cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.tunnel.listen_addr;
        TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::startup_failed(format!("TCP bind on {addr} failed: {e}")))
    }

    /// Runs the endpoint until Ctrl+C or `shutdown()`.
    ///
    /// # Errors
    /// Returns error if the endpoint fails to start.
    pub async fn run(&self) -> Result<()> {
        info!("Starting NyxStream endpoint v{}", env!("CARGO_PKG_VERSION"));

        let listener = self.bind().await?;
        info!(
            mode = %self.mode(),
            cipher = %self.suite.kind(),
            upstream = %self.config.tunnel.upstream_addr,
            "Listening on {}",
            self.config.tunnel.listen_addr
        );

        let mut serve = std::pin::pin!(self.serve(listener));
        tokio::select! {
            result = &mut serve => return result,
            () = self.wait_for_shutdown() => {}
        }

        info!("Shutting down endpoint...");
        self.shutdown();
        serve.await
    }

    /// Accepts and relays connections from `listener` until shutdown.
    ///
    /// # Errors
    /// Currently always returns `Ok`; accept errors are logged and skipped.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut tasks = JoinSet::new();
        let relay = Relay {
            mode: self.mode(),
            suite: self.suite.clone(),
            upstream: self.config.tunnel.upstream_addr.clone(),
            connect_timeout: Duration::from_secs(self.config.limits.connect_timeout_secs),
        };

        while !self.shutdown.load(Ordering::SeqCst) {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Accept loop received shutdown signal");
                    break;
                }
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("Accept error: {}", e);
                            continue;
                        }
                    };

                    let Ok(permit) = Arc::clone(&self.limiter).try_acquire_owned() else {
                        warn!(
                            %peer,
                            limit = self.config.limits.max_connections,
                            "Connection limit reached, closing"
                        );
                        continue;
                    };

                    let relay = relay.clone();
                    let mut conn_shutdown = self.shutdown_tx.subscribe();
                    tasks.spawn(async move {
                        let _permit = permit;
                        tokio::select! {
                            _ = conn_shutdown.recv() => {
                                debug!(%peer, "Connection closed by shutdown");
                            }
                            result = relay.handle(socket, peer) => log_outcome(peer, result),
                        }
                    });
                }
            }
        }

        let drain = async { while tasks.join_next().await.is_some() {} };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            warn!("Connections still open after {:?}, aborting", DRAIN_TIMEOUT);
            tasks.abort_all();
        }

        info!("Endpoint stopped");
        Ok(())
    }

    /// Waits for Ctrl+C.
    async fn wait_for_shutdown(&self) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }

    /// Triggers shutdown programmatically.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("mode", &self.config.tunnel.mode)
            .field("listen_addr", &self.config.tunnel.listen_addr)
            .field("upstream_addr", &self.config.tunnel.upstream_addr)
            .field("cipher", &self.suite.kind())
            .finish_non_exhaustive()
    }
}

fn log_outcome(peer: SocketAddr, result: Result<(u64, u64)>) {
    match result {
        Ok((from_peer, to_peer)) => {
            debug!(%peer, from_peer, to_peer, "Connection finished");
        }
        Err(e) if e.is_suspicious() => warn!(%peer, "Rejected connection: {}", e),
        Err(e) => debug!(%peer, "Connection error: {}", e),
    }
}

// ============================================
// Relay
// ============================================

/// Per-connection relay settings.
#[derive(Clone)]
struct Relay {
    mode: TunnelMode,
    suite: CipherSuite,
    upstream: String,
    connect_timeout: Duration,
}

impl Relay {
    /// Relays `inbound` to the upstream until both sides close.
    ///
    /// Returns `(bytes from peer, bytes to peer)` in plaintext.
    async fn handle(self, inbound: TcpStream, peer: SocketAddr) -> Result<(u64, u64)> {
        let upstream = self.connect().await?;
        debug!(%peer, upstream = %self.upstream, "Relaying connection");

        let counts = match self.mode {
            TunnelMode::Server => {
                let mut tunnel = EncryptedStream::new(inbound, self.suite);
                let mut target = upstream;
                copy_bidirectional(&mut tunnel, &mut target).await?
            }
            TunnelMode::Client => {
                let mut app = inbound;
                let mut tunnel = EncryptedStream::new(upstream, self.suite);
                copy_bidirectional(&mut app, &mut tunnel).await?
            }
        };
        Ok(counts)
    }

    async fn connect(&self) -> Result<TcpStream> {
        let connect = TcpStream::connect(self.upstream.as_str());
        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ServerError::ConnectTimeout {
                addr: self.upstream.clone(),
                secs: self.connect_timeout.as_secs(),
            }),
        }
    }
}

// ============================================
// Tests
// ============================================
