//! clband server - headless control-plane binary.
//!
//! Runs the ingestion supervisor and execution pipeline as background
//! tasks. No HTTP server, no incoming connections; structured logs to
//! stdout are the only observability surface.
//!
//! # Environment Variables
//! See `Config::from_env` for the full list. At minimum `DATABASE_URL`,
//! `FEED_WS_BASE_URL`, `SYMBOL`, and `VAULT_BASE_URL` matter in practice.

use anyhow::Result;
use clband::application::system::Application;
use clband::config::Config;
use tracing::{info, Level};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "clband server starting");

    let config = Config::from_env()?;
    info!(symbol = %config.symbol, interval = %config.interval, vault_base_url = %config.vault_base_url, "configuration loaded");

    let app = Application::build(config).await?;
    let handle = app.start().await?;
    info!("control plane running; press Ctrl+C to shut down");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    handle.shutdown().await;

    Ok(())
}
