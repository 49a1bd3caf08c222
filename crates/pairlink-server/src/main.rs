//! Pairlink server binary.
//!
//! Runs the matchmaking and signaling relay on a QUIC endpoint. Without a
//! certificate pair it generates a throwaway self-signed certificate, which
//! clients must be configured to trust:
//!
//! ```bash
//! pairlink-server --bind [::]:4433 --cert chain.pem --key key.pem
//! RUST_LOG=pairlink_server=debug pairlink-server
//! ```

use clap::Parser;
use pairlink_server::{DriverConfig, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Anonymous 1:1 matchmaking and WebRTC signaling relay.
#[derive(Parser, Debug)]
#[command(name = "pairlink-server", version)]
struct Args {
    /// Socket address the QUIC endpoint listens on
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: String,

    /// PEM certificate chain; omit to self-sign for development
    #[arg(short, long, requires = "key")]
    cert: Option<String>,

    /// PEM private key for the certificate chain
    #[arg(short, long, requires = "cert")]
    key: Option<String>,

    /// Refuse new connections beyond this count
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log filter applied when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    if args.cert.is_none() {
        tracing::warn!("no certificate configured, self-signing one; clients must trust it");
    }

    let server = Server::bind(ServerRuntimeConfig {
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        driver: DriverConfig { max_connections: args.max_connections, ..Default::default() },
    })?;

    tracing::info!(
        addr = %server.local_addr()?,
        max_connections = args.max_connections,
        "pairlink server up"
    );

    server.run().await?;

    Ok(())
}
