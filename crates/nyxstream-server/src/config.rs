// ============================================
// File: crates/nyxstream-server/src/config.rs
// ============================================
//! # Endpoint Configuration
//!
//! ## Creation Reason
//! Provides configuration management for a tunnel endpoint, loaded from a
//! TOML file and validated before anything binds.
//!
//! ## Main Functionality
//! - `ServerConfig`: Main configuration structure
//! - TOML file loading and parsing
//! - Configuration validation
//! - Cipher suite construction from the `[cipher]` and `[replay]` sections
//!
//! ## Configuration Sections
//! - `tunnel`: Mode (server/client), listen address, upstream address
//! - `cipher`: Method name and secret (base64 key or password)
//! - `replay`: Salt replay cache sizing
//! - `limits`: Connection limit, upstream connect timeout
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [tunnel]
//! mode = "server"
//! listen_addr = "0.0.0.0:8388"
//! upstream_addr = "127.0.0.1:8080"
//!
//! [cipher]
//! method = "AEAD_CHACHA20_POLY1305"
//! password = "correct horse battery staple"
//!
//! [replay]
//! capacity = 1000000
//! slots = 10
//!
//! [limits]
//! max_connections = 1024
//! connect_timeout_secs = 10
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - All config changes require a restart
//! - Exactly one of `cipher.key` / `cipher.password` must be set
//! - Both endpoints of a tunnel MUST use the same method and secret
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::info;

use nyxstream_core::replay::{DEFAULT_CAPACITY, DEFAULT_SLOTS};
use nyxstream_core::{CipherKind, CipherSuite, SaltFilter};

use crate::error::{Result, ServerError};

// ============================================
// ServerConfig
// ============================================

/// Main endpoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Tunnel role and addresses.
    #[serde(default)]
    pub tunnel: TunnelConfig,

    /// Cipher method and secret.
    #[serde(default)]
    pub cipher: CipherConfig,

    /// Replay cache sizing.
    #[serde(default)]
    pub replay: ReplayConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Loads configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Returns error if the content cannot be parsed or validated.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ServerError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns the first invalid or missing field.
    pub fn validate(&self) -> Result<()> {
        self.tunnel.validate()?;
        self.cipher.validate()?;
        self.replay.validate()?;
        self.limits.validate()?;
        Ok(())
    }

    /// Serializes configuration to TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Builds the cipher suite, with a replay cache sized by `[replay]`.
    ///
    /// # Errors
    /// Returns a configuration error if the cipher section is invalid.
    pub fn cipher_suite(&self) -> Result<CipherSuite> {
        let suite = self.cipher.build_suite()?;
        let filter = SaltFilter::new(self.replay.capacity, self.replay.slots);
        Ok(suite.with_replay_cache(Arc::new(filter)))
    }
}

// ============================================
// TunnelConfig
// ============================================

/// Which side of the tunnel this endpoint is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    /// Accepts encrypted connections, forwards plaintext upstream.
    #[default]
    Server,
    /// Accepts plaintext connections, forwards them encrypted upstream.
    Client,
}

impl std::fmt::Display for TunnelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Client => f.write_str("client"),
        }
    }
}

/// Tunnel configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Endpoint role.
    #[serde(default)]
    pub mode: TunnelMode,

    /// TCP listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Fixed `host:port` every accepted connection is relayed to.
    #[serde(default = "default_upstream_addr")]
    pub upstream_addr: String,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8388))
}

fn default_upstream_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl TunnelConfig {
    fn validate(&self) -> Result<()> {
        if self.listen_addr.port() == 0 {
            return Err(ServerError::config_invalid(
                "tunnel.listen_addr",
                "port cannot be 0",
            ));
        }

        let port = self
            .upstream_addr
            .rsplit_once(':')
            .filter(|(host, _)| !host.is_empty())
            .and_then(|(_, port)| port.parse::<u16>().ok());
        match port {
            Some(0) => Err(ServerError::config_invalid(
                "tunnel.upstream_addr",
                "port cannot be 0",
            )),
            Some(_) => Ok(()),
            None => Err(ServerError::config_invalid(
                "tunnel.upstream_addr",
                "must be in host:port form",
            )),
        }
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            mode: TunnelMode::default(),
            listen_addr: default_listen_addr(),
            upstream_addr: default_upstream_addr(),
        }
    }
}

// ============================================
// CipherConfig
// ============================================

/// Cipher configuration section.
#[derive(Clone, Serialize, Deserialize)]
pub struct CipherConfig {
    /// Registry name, e.g. `AEAD_AES_256_GCM` or `chacha20-ietf-poly1305`.
    #[serde(default = "default_method")]
    pub method: String,

    /// Base64 pre-shared key of exactly the method's key size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Password stretched into the pre-shared key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_method() -> String {
    CipherKind::ChaCha20Poly1305.name().to_string()
}

impl CipherConfig {
    fn validate(&self) -> Result<()> {
        let kind = CipherKind::from_name(&self.method)
            .map_err(|e| ServerError::config_invalid("cipher.method", e.to_string()))?;

        match (&self.key, &self.password) {
            (Some(_), Some(_)) => Err(ServerError::config_invalid(
                "cipher",
                "set either key or password, not both",
            )),
            (None, None) => Err(ServerError::config_missing("cipher.key or cipher.password")),
            (None, Some(password)) if password.is_empty() => Err(ServerError::config_invalid(
                "cipher.password",
                "cannot be empty",
            )),
            (None, Some(_)) => Ok(()),
            (Some(_), None) => {
                let key = self.decode_key()?;
                if key.len() != kind.key_size() {
                    return Err(ServerError::config_invalid(
                        "cipher.key",
                        format!(
                            "{} needs {} bytes, got {}",
                            kind,
                            kind.key_size(),
                            key.len()
                        ),
                    ));
                }
                Ok(())
            }
        }
    }

    fn decode_key(&self) -> Result<Vec<u8>> {
        match &self.key {
            Some(encoded) => STANDARD
                .decode(encoded.trim())
                .map_err(|e| ServerError::config_invalid("cipher.key", e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    /// Builds the suite with its default replay cache.
    ///
    /// # Errors
    /// Returns a configuration error for an unknown method or bad key.
    pub fn build_suite(&self) -> Result<CipherSuite> {
        let key = self.decode_key()?;
        let password = self.password.as_deref().unwrap_or_default();
        CipherSuite::from_name(&self.method, &key, password)
            .map_err(|e| ServerError::config_invalid("cipher", e.to_string()))
    }
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            key: None,
            password: None,
        }
    }
}

impl std::fmt::Debug for CipherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherConfig")
            .field("method", &self.method)
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ============================================
// ReplayConfig
// ============================================

/// Replay cache configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Salts remembered per endpoint; 0 disables replay detection.
    #[serde(default = "default_replay_capacity")]
    pub capacity: usize,

    /// Ring slots the capacity is split across.
    #[serde(default = "default_replay_slots")]
    pub slots: usize,
}

fn default_replay_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_replay_slots() -> usize {
    DEFAULT_SLOTS
}

impl ReplayConfig {
    fn validate(&self) -> Result<()> {
        if self.slots == 0 {
            return Err(ServerError::config_invalid(
                "replay.slots",
                "must be greater than 0",
            ));
        }

        if self.capacity != 0 && self.capacity < self.slots {
            return Err(ServerError::config_invalid(
                "replay.capacity",
                "must be 0 or at least the number of slots",
            ));
        }

        Ok(())
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            capacity: default_replay_capacity(),
            slots: default_replay_slots(),
        }
    }
}

// ============================================
// LimitsConfig
// ============================================

/// Resource limits configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrently relayed connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Upstream connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_max_connections() -> usize {
    1024
}

fn default_connect_timeout() -> u64 {
    10
}

impl LimitsConfig {
    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(ServerError::config_invalid(
                "limits.max_connections",
                "must be greater than 0",
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(ServerError::config_invalid(
                "limits.connect_timeout_secs",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Tests
// ============================================
