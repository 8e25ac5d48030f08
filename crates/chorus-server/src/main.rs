//! # Chorus Server
//!
//! WebSocket chat server: every message a client sends is rendered once and
//! broadcast to all connected clients, and new clients receive the recent
//! history on connect.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! chorus
//!
//! # Run with a config file
//! chorus --config /path/to/chorus.toml
//!
//! # Override through the environment
//! CHORUS_PORT=8080 CHORUS_HUB__QUEUE_CAPACITY=64 chorus
//!
//! # Show the effective configuration
//! chorus --print-config
//! ```

mod cli;
mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chorus=debug,chorus_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = cli::Cli::parse();
    let config = config::Config::load(&cli)?;

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    tracing::info!("Starting Chorus server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
