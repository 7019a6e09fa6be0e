//! Serve — bind the HTTP listener and serve until a shutdown signal.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use spunkless_common::telemetry::shutdown_signal;
use tracing::info;

use crate::route::{router, INGEST_PATH};
use crate::state::SharedState;

pub async fn serve(state: SharedState) -> Result<()> {
    let addr = state.config.bind_address()?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("✓ Producer gateway is ready!");
    info!("  - Ingestion: http://{}{}", addr, INGEST_PATH);
    info!("  - Health check: http://{}/health", addr);
    info!("  - Metrics: http://{}/metrics", addr);

    // Peer addresses feed the host fallback for submissions without one.
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("HTTP server drained");
    Ok(())
}
