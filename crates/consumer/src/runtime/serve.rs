//! Serve — start the background workers, then serve HTTP until a shutdown signal.

use anyhow::{Context, Result};
use spunkless_common::telemetry::shutdown_signal;
use tokio::task::JoinHandle;
use tracing::info;

use super::boot::Workers;
use crate::route::router;
use crate::state::SharedState;

/// Handles of the spawned background workers.
pub struct Running {
    pub discovery: JoinHandle<()>,
    pub maintainer: Option<JoinHandle<()>>,
}

pub fn spawn_workers(workers: Workers) -> Running {
    let Workers { discovery, maintainer } = workers;
    Running {
        discovery: tokio::spawn(discovery.run()),
        maintainer: maintainer.map(|m| tokio::spawn(m.run())),
    }
}

pub async fn serve(state: SharedState) -> Result<()> {
    let addr = state.config.bind_address()?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("✓ Consumer is ready!");
    info!("  - Health check: http://{}/health", addr);
    info!("  - Stats: http://{}/stats", addr);
    info!("  - Metrics: http://{}/metrics", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("HTTP server drained");
    Ok(())
}
