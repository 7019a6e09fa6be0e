//! Query API over the log store.

mod conf;
mod error;
mod params;
mod route;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use spunkless_common::store::PgLogStore;
use spunkless_common::telemetry::{self, shutdown_signal};
use tracing::info;

use crate::conf::ApiConfig;
use crate::state::ApiState;

#[tokio::main]
async fn main() -> Result<()> {
    // Phase 1: scoped subscriber while configuration loads
    let basic_tracing = telemetry::init_tracing_basic("info,api=debug");

    info!("Starting Spunkless query API v{}", env!("CARGO_PKG_VERSION"));

    let config = ApiConfig::load().context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    // Phase 2: global subscriber shaped by config
    drop(basic_tracing);
    telemetry::init_tracing(&config.logging)?;

    info!("Configuration loaded successfully");

    let store = PgLogStore::connect(&config.postgres)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let addr = config.bind_address()?;
    let state = Arc::new(ApiState { config, store });
    let app = route::router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("✓ Query API is ready!");
    info!("  - Logs: http://{}/api/logs", addr);
    info!("  - Stats: http://{}/api/stats", addr);
    info!("  - Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.store.close().await;
    info!("Server shut down gracefully");
    Ok(())
}
