//! Wildmon Relay Server
//!
//! Binary entry point: logging, configuration, and the serve loop.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use wildmon_relay::{RelayConfig, RelayServer, BROADCAST_RATE, DEFAULT_PORT, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind_addr = std::env::var("RELAY_BIND")
        .unwrap_or_else(|_| format!("0.0.0.0:{DEFAULT_PORT}"))
        .parse()
        .context("invalid RELAY_BIND address")?;

    let config = RelayConfig {
        bind_addr,
        ..Default::default()
    };

    tracing::info!("Wildmon Relay Server v{}", VERSION);
    tracing::info!("Broadcast Rate: {} Hz", BROADCAST_RATE);

    let server = RelayServer::new(config);
    server.run().await.context("relay server failed")?;

    Ok(())
}
