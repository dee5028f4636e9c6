// ============================================
// File: crates/nyxstream-server/src/lib.rs
// ============================================
//! # NyxStream Endpoint Library
//!
//! ## Creation Reason
//! Wraps the stream encryption layer of `nyxstream-core` in a deployable
//! TCP tunnel endpoint. Two endpoints, one per side, carry plaintext TCP
//! connections across an untrusted network.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: TOML configuration and validation
//! - [`server`]: Listener, connection limit, relay tasks, shutdown
//! - [`error`]: Endpoint error types
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    NyxStream Endpoint                   │
//! ├─────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐     ┌─────────────┐     ┌───────────┐  │
//! │  │   Config    │────►│   Server    │────►│   Relay   │  │
//! │  └─────────────┘     └──────┬──────┘     └─────┬─────┘  │
//! │                             │                  │        │
//! │                             ▼                  ▼        │
//! │                      ┌─────────────┐   ┌─────────────┐  │
//! │                      │ SaltFilter  │◄──│ Encrypted   │  │
//! │                      │ (shared)    │   │ Stream      │  │
//! │                      └─────────────┘   └─────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Configuration changes require restart (no hot-reload)
//! - Graceful shutdown waits a few seconds for open connections
//!
//! ## Last Modified
//! v0.1.0 - Initial endpoint library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod server;

// Re-export primary types
pub use config::{ServerConfig, TunnelMode};
pub use error::{Result, ServerError};
pub use server::Server;
