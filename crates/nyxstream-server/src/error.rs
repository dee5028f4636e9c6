// ============================================
// File: crates/nyxstream-server/src/error.rs
// ============================================
//! # Server Error Types
//!
//! ## Last Modified
//! v0.1.0 - Initial tunnel endpoint errors

use thiserror::Error;

use nyxstream_core::error::CoreError;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server error types.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        /// File that was being loaded
        path: String,
        /// Underlying cause
        reason: String,
    },

    /// A configuration value is out of range or inconsistent.
    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        /// Dotted path of the offending field
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// A required configuration value is absent.
    #[error("Missing required configuration: {field}")]
    ConfigMissing {
        /// Dotted path of the missing field
        field: String,
    },

    /// The endpoint could not start.
    #[error("Server failed to start: {reason}")]
    StartupFailed {
        /// Why startup failed
        reason: String,
    },

    /// Upstream did not accept the connection in time.
    #[error("Connecting to upstream {addr} timed out after {secs}s")]
    ConnectTimeout {
        /// Upstream address
        addr: String,
        /// Timeout that expired
        secs: u64,
    },

    /// Too many connections are being relayed.
    #[error("Connection limit reached: max {limit} connections")]
    ConnectionLimitReached {
        /// Configured maximum
        limit: usize,
    },

    /// Error from the encryption layer.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Creates a `ConfigLoad` error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConfigInvalid` error.
    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConfigMissing` error.
    pub fn config_missing(field: impl Into<String>) -> Self {
        Self::ConfigMissing {
            field: field.into(),
        }
    }

    /// Creates a `StartupFailed` error.
    pub fn startup_failed(reason: impl Into<String>) -> Self {
        Self::StartupFailed {
            reason: reason.into(),
        }
    }

    /// Returns `true` for configuration errors.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. } | Self::ConfigInvalid { .. } | Self::ConfigMissing { .. }
        )
    }

    /// Returns `true` if the endpoint cannot continue.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. }
                | Self::ConfigInvalid { .. }
                | Self::ConfigMissing { .. }
                | Self::StartupFailed { .. }
        )
    }

    /// Returns `true` if this error might indicate an attack on the
    /// encrypted side.
    #[must_use]
    pub fn is_suspicious(&self) -> bool {
        match self {
            Self::Core(e) => e.is_suspicious(),
            Self::Io(e) => CoreError::from_io(e).is_some_and(CoreError::is_suspicious),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServerError::config_load("/etc/nyxstream/config.toml", "file not found");
        assert!(err.to_string().contains("/etc/nyxstream/config.toml"));

        let err = ServerError::ConnectTimeout {
            addr: "10.0.0.1:80".into(),
            secs: 10,
        };
        assert!(err.to_string().contains("10.0.0.1:80"));
    }

    #[test]
    fn test_error_classification() {
        let config_err = ServerError::config_invalid("cipher.key", "wrong length");
        assert!(config_err.is_config_error());
        assert!(config_err.is_fatal());

        assert!(ServerError::config_missing("cipher.key").is_config_error());
        assert!(!ServerError::ConnectionLimitReached { limit: 1 }.is_fatal());
    }

    #[test]
    fn test_suspicious_through_io() {
        let io_err: std::io::Error = CoreError::RepeatedSalt.into();
        assert!(ServerError::Io(io_err).is_suspicious());

        let plain = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(!ServerError::Io(plain).is_suspicious());
        assert!(ServerError::Core(CoreError::Authentication { block: "payload" }).is_suspicious());
    }
}
