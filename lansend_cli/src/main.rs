use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lansend_core::AppConfig;
use lansend_core::pairing::generate_pin;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

/// LanSend receiver: announces itself on the LAN and accepts files over HTTPS
/// from a paired peer.
#[derive(Parser, Debug)]
#[command(name = "lansend", version, about)]
struct Args {
    /// JSON config file. Defaults to config.json in the user config directory.
    #[arg(long, env = "LANSEND_CONFIG")]
    config: Option<PathBuf>,

    /// HTTPS port to listen on
    #[arg(long, env = "LANSEND_PORT")]
    port: Option<u16>,

    /// UDP port to broadcast device info to
    #[arg(long = "bcast-port", env = "LANSEND_BCAST_PORT")]
    bcast_port: Option<u16>,

    /// Seconds between broadcasts
    #[arg(long = "bcast-interval", env = "LANSEND_BCAST_INTERVAL")]
    bcast_interval: Option<u64>,

    /// PIN a peer must present to pair
    #[arg(long, env = "LANSEND_PIN", conflicts_with = "random_pin")]
    pin: Option<String>,

    /// Generate a random 6-digit PIN for this run
    #[arg(long)]
    random_pin: bool,

    /// Directory where received files are stored
    #[arg(long, env = "LANSEND_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// TLS certificate (PEM)
    #[arg(long, env = "LANSEND_CERTFILE")]
    certfile: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long, env = "LANSEND_KEYFILE")]
    keyfile: Option<PathBuf>,

    /// Name shown to peers
    #[arg(long, env = "LANSEND_ALIAS")]
    alias: Option<String>,

    /// Largest accepted request body in bytes
    #[arg(long, env = "LANSEND_MAX_BODY_BYTES")]
    max_body_bytes: Option<usize>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Config file first, then flags and environment on top
    fn into_config(self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load_from(path)?,
            None => AppConfig::load(),
        };

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(port) = self.bcast_port {
            config.broadcast_port = port;
        }
        if let Some(secs) = self.bcast_interval {
            config.broadcast_interval_secs = secs;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(cert) = self.certfile {
            config.cert_path = cert;
        }
        if let Some(key) = self.keyfile {
            config.key_path = key;
        }
        if let Some(alias) = self.alias {
            config.alias = alias;
        }
        if let Some(max) = self.max_body_bytes {
            config.max_body_bytes = max;
        }

        if self.random_pin {
            config.pin = generate_pin();
        } else if let Some(pin) = self.pin {
            config.pin = pin;
        }
        if config.pin.is_empty() {
            anyhow::bail!("PIN must not be empty");
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env feeds the clap `env` attributes below
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let random_pin = args.random_pin;
    let config = args.into_config()?;
    if random_pin {
        tracing::info!("Pairing PIN for this run: {}", config.pin);
    }
    tracing::info!(
        "Saving received files to {:?}",
        config.output_dir
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Ctrl-C received"),
            Err(e) => tracing::error!("Cannot listen for Ctrl-C: {}", e),
        }
        signal_token.cancel();
    });

    lansend_core::run_receiver(config, shutdown)
        .await
        .context("LanSend receiver failed")
}
