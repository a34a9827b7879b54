//! Sensorhub server
//!
//! Run with: cargo run -- --config sensorhub.toml
//!
//! Without `--config` the default locations are searched, then defaults plus
//! `SENSORHUB_*` environment overrides apply. `RUST_LOG` overrides the
//! configured log level.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use sensorhub::api::{serve, AppState};
use sensorhub::config::{generate_default_config, Config};
use sensorhub::logging;
use sensorhub::repository::Repositories;

#[derive(Parser)]
#[command(name = "sensorhub")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sensor telemetry service with real-time WebSocket streams")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port
    #[arg(short, long)]
    port: Option<u16>,

    /// Print a commented default config and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    // Config messages go to a provisional subscriber until ours is installed
    let mut config = logging::bootstrap(|| match &args.config {
        Some(path) => Config::load_with_env(path),
        None => Ok(Config::load_default()),
    })?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    logging::init(&config.logging).context("Failed to initialize logging")?;

    tracing::info!("Starting Sensorhub v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        backend = ?config.storage.backend,
        queue_capacity = config.stream.queue_capacity,
        fallback_delay_ms = config.stream.fallback_delay_ms,
        "Stream settings loaded"
    );

    let repos = Repositories::from_config(&config.storage)
        .with_context(|| format!("Failed to open {:?} storage", config.storage.backend))?;

    let state = AppState::new(&repos, &config.stream);
    let hub = state.hub.clone();

    serve(state, &config.server).await?;

    // The listener is closed; give open streams their grace period
    if hub.shutdown().await {
        tracing::info!("All stream sessions closed");
    }

    tracing::info!("Sensorhub stopped");
    Ok(())
}
