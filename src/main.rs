//! Text Relay Server - Entry Point
//!
//! Loads configuration, starts the relay server and runs until Ctrl-C.

use std::env;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use text_relay_server::{RelayServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=text_relay_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("text_relay_server=info")),
        )
        .init();

    // Optional config file path from command line
    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = ServerConfig::load(config_path.as_deref())?;

    let mut server = RelayServer::start(config).await?;
    info!("Accepting clients on {}", server.local_addr());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    server.stop().await;

    Ok(())
}
