use anyhow::{Context, Result};
use consumer::conf::ConsumerConfig;
use consumer::runtime::{boot, serve, stop};
use spunkless_common::telemetry;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Phase 1: scoped subscriber while configuration loads
    let basic_tracing = telemetry::init_tracing_basic("info,consumer=debug");

    info!("Starting Spunkless consumer v{}", env!("CARGO_PKG_VERSION"));

    let config = ConsumerConfig::load().context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    // Phase 2: global subscriber shaped by config
    drop(basic_tracing);
    telemetry::init_tracing(&config.logging)?;

    info!("Configuration loaded successfully");
    info!("Server will bind to: {}", config.server.bind_address);

    let booted = boot::boot(config).await?;
    let state = booted.state;
    let running = serve::spawn_workers(booted.workers);

    let served = serve::serve(state.clone()).await;
    stop::stop(state, running, booted.store).await;
    served
}
