use anyhow::{Context, Result};
use producer::conf::ProducerConfig;
use producer::runtime::{boot, serve, stop};
use spunkless_common::telemetry;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Phase 1: scoped subscriber while configuration loads
    let basic_tracing = telemetry::init_tracing_basic("info,producer=debug");

    info!("Starting Spunkless producer v{}", env!("CARGO_PKG_VERSION"));

    let config = ProducerConfig::load().context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    // Phase 2: global subscriber shaped by config
    drop(basic_tracing);
    telemetry::init_tracing(&config.logging)?;

    info!("Configuration loaded successfully");
    info!("Server will bind to: {}", config.server.bind_address);

    let state = boot::boot(config)?;
    let served = serve::serve(state.clone()).await;
    stop::stop(state).await;
    served
}
