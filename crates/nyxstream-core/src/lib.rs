// ============================================
// File: crates/nyxstream-core/src/lib.rs
// ============================================
//! # NyxStream Core - AEAD Stream Encryption Library
//!
//! ## Creation Reason
//! Turns any ordered byte-stream transport into a confidential,
//! integrity-protected channel keyed by a pre-shared secret. This crate is
//! the security backbone of the tunnel.
//!
//! ## Main Functionality
//!
//! ### Crypto Module ([`crypto`])
//! - Cipher kinds and name registry (AES-128/192/256-GCM, ChaCha20-Poly1305)
//! - Key schedule: HKDF-SHA1 subkeys, password stretching
//! - Nonce sequencer and the `CipherSuite` factory
//!
//! ### Stream Module ([`stream`])
//! - Frame encoder/decoder state machines
//! - `EncryptedWriter` / `EncryptedReader` adapters
//!
//! ### Connection ([`conn`])
//! - `EncryptedStream`: salt exchange plus both frame directions, usable as
//!   a drop-in `AsyncRead + AsyncWrite`
//!
//! ### Replay Protection ([`replay`])
//! - `ReplayCache` trait and the bounded `SaltFilter`
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              nyxstream-server                       │
//! │                    │                                │
//! │                    ▼                                │
//! │   nyxstream-core   ◄── You are here                 │
//! │   conn ──► stream ──► crypto                        │
//! │     └────► replay ◄──── crypto::suite               │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Guarantees
//! - **Confidentiality**: AES-GCM or ChaCha20-Poly1305 on every frame
//! - **Integrity**: Length and payload are authenticated separately
//! - **Replay Protection**: Salts are checked before any key is derived
//! - **No forward secrecy**: Compromise of the PSK exposes recorded traffic
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALL cryptographic code uses audited RustCrypto implementations
//! - A (subkey, nonce) pair must never seal twice
//! - Any error is fatal to the affected direction
//! - The wire format is fixed; changes break interoperability
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod conn;
pub mod crypto;
pub mod error;
pub mod replay;
pub mod stream;

// Re-export commonly used items
pub use conn::EncryptedStream;
pub use crypto::{CipherKind, CipherSuite, PreSharedKey, Salt};
pub use error::{CoreError, Result};
pub use replay::{ReplayCache, SaltFilter};
pub use stream::{EncryptedReader, EncryptedWriter, FrameDecoder, FrameEncoder, MAX_PAYLOAD_SIZE};
