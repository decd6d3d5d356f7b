//! Transaction relay (v1)
//!
//! Accepts transfer intents, reserves a nonce and gas price for them, and
//! later signs and broadcasts them through a managed relay API or straight
//! to the chain node.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                      TX RELAY                        │
//!   prepare/confirm   │  ┌────────┐    ┌──────────────┐    ┌──────────────┐  │
//!   ──────────────────┼─▶│  http  │───▶│    relay     │───▶│  broadcast   │──┼──▶ relay API
//!                     │  │ server │    │   service    │    │   router     │──┼──▶ chain node
//!                     │  └────────┘    └──────┬───────┘    └──────────────┘  │
//!                     │                       │                              │
//!                     │           ┌───────────┼────────────┐                 │
//!                     │           ▼           ▼            ▼                 │
//!                     │     ┌─────────┐ ┌──────────┐ ┌────────────┐          │
//!                     │     │  nonce  │ │  store   │ │ blockchain │──────────┼──▶ chain node
//!                     │     │allocator│ │ (+ file) │ │ gas/build/ │          │    (reads)
//!                     │     └─────────┘ └──────────┘ │   sign     │          │
//!                     │                              └────────────┘          │
//!                     │  config · observability · resilience · lifecycle    │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use tx_relay::config::{load_config, RelayConfig};
use tx_relay::lifecycle::{build_service, spawn_background, wait_for_signal, Shutdown};
use tx_relay::net::load_tls_config;
use tx_relay::observability::{logging, metrics};
use tx_relay::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "tx-relay", version, about = "Two-phase blockchain transaction relay")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tx-relay starting");
    match &cli.config {
        Some(path) => tracing::info!(path = %path.display(), chains = config.chains.len(), "Configuration loaded"),
        None => tracing::warn!("No --config given; running with defaults and no chains"),
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let service = build_service(&config).await?;
    let shutdown = Arc::new(Shutdown::new());
    let tasks = spawn_background(service.clone(), &config, &shutdown);

    let signal = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown requested");
        signal.trigger();
    });

    let server = HttpServer::new(config.clone(), service.clone());
    match &config.listener.tls {
        Some(tls) => {
            let tls_config = load_tls_config(tls).await?;
            let addr = config.listener.bind_address.parse()?;
            server.run_tls(addr, tls_config, shutdown.subscribe()).await?;
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");
            server.run(listener, shutdown.subscribe()).await?;
        }
    }

    shutdown
        .drain(tasks, Duration::from_secs(config.timeouts.shutdown_secs))
        .await;
    if let Err(e) = service.persist() {
        tracing::error!(error = %e, "Failed to persist transaction store at shutdown");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
