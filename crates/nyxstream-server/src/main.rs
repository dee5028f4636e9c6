// ============================================
// File: crates/nyxstream-server/src/main.rs
// ============================================
//! # NyxStream Entry Point
//!
//! ## Creation Reason
//! Main entry point for the NyxStream tunnel endpoint binary.
//! Handles CLI parsing, logging setup, and endpoint startup.
//!
//! ## Main Functionality
//! - CLI argument parsing with clap
//! - Logging initialization with tracing
//! - Configuration loading and validation
//! - Key generation for the `key` cipher setting
//!
//! ## Usage
//! ```bash
//! # Generate a key for the chosen method
//! nyxstream genkey --method AEAD_AES_256_GCM
//!
//! # Start an endpoint
//! nyxstream start --config /etc/nyxstream/config.toml
//!
//! # Check a config file without starting
//! nyxstream validate
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Both endpoints must use the same method and secret
//! - RUST_LOG overrides the configured log level
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nyxstream_core::CipherKind;
use nyxstream_server::{Server, ServerConfig};

const DEFAULT_CONFIG: &str = "/etc/nyxstream/config.toml";

// ============================================
// CLI Definition
// ============================================

/// NyxStream encrypted TCP tunnel
#[derive(Parser, Debug)]
#[command(name = "nyxstream")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a tunnel endpoint
    Start {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },

    /// Generate a random base64 key for a cipher method
    Genkey {
        /// Cipher method name
        #[arg(short, long, default_value = "AEAD_CHACHA20_POLY1305")]
        method: String,
    },
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // `start` initializes logging once the configured level is known
    if !matches!(cli.command, Commands::Start { .. }) {
        init_logging("info");
    }

    let result = match cli.command {
        Commands::Start { config } => cmd_start(config).await,
        Commands::Validate { config } => cmd_validate(config).await,
        Commands::Genkey { method } => cmd_genkey(&method),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Starts the endpoint.
async fn cmd_start(config_path: PathBuf) -> anyhow::Result<()> {
    if !config_path.exists() {
        println!();
        println!("❌ Config file not found: {}", config_path.display());
        println!();
        println!("A cipher key or password is required. Create a config with:");
        println!("  [cipher]");
        println!("  method = \"AEAD_CHACHA20_POLY1305\"");
        println!("  key = \"$(nyxstream genkey)\"");
        println!();
        std::process::exit(1);
    }

    let config = ServerConfig::load(&config_path).await?;
    init_logging(&config.logging.level);

    info!("════════════════════════════════════════");
    info!("Mode:       {}", config.tunnel.mode);
    info!("Listen:     {}", config.tunnel.listen_addr);
    info!("Upstream:   {}", config.tunnel.upstream_addr);
    info!("Cipher:     {}", config.cipher.method);
    info!("════════════════════════════════════════");

    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}

/// Validates configuration file.
async fn cmd_validate(config_path: PathBuf) -> anyhow::Result<()> {
    if !config_path.exists() {
        println!("⚠️  Config file not found: {}", config_path.display());
        return Ok(());
    }

    let config = ServerConfig::load(&config_path).await?;
    let secret = if config.cipher.key.is_some() { "key" } else { "password" };

    println!("✅ Configuration is valid");
    println!();
    println!("Tunnel:");
    println!("   Mode:       {}", config.tunnel.mode);
    println!("   Listen:     {}", config.tunnel.listen_addr);
    println!("   Upstream:   {}", config.tunnel.upstream_addr);
    println!();
    println!("Cipher:");
    println!("   Method:     {}", config.cipher.method);
    println!("   Secret:     {}", secret);
    println!();
    println!("Replay Filter:");
    println!("   Capacity:   {}", config.replay.capacity);
    println!("   Slots:      {}", config.replay.slots);
    println!();
    println!("Limits:");
    println!("   Max Connections:  {}", config.limits.max_connections);
    println!("   Connect Timeout:  {}s", config.limits.connect_timeout_secs);
    println!();

    Ok(())
}

/// Prints a fresh random key for `method`.
fn cmd_genkey(method: &str) -> anyhow::Result<()> {
    let kind = CipherKind::from_name(method)?;
    let mut key = vec![0u8; kind.key_size()];
    OsRng.fill_bytes(&mut key);
    println!("{}", STANDARD.encode(&key));
    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}
