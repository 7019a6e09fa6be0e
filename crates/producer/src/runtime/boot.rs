//! Boot — Kafka clients and shared state.

use std::sync::Arc;

use anyhow::{Context, Result};
use spunkless_common::broker::kafka::{KafkaAdmin, KafkaPublisher};
use tracing::info;

use crate::conf::ProducerConfig;
use crate::state::{ProducerState, SharedState};

pub fn boot(config: ProducerConfig) -> Result<SharedState> {
    info!(brokers = ?config.kafka.brokers, "Connecting to Kafka");

    let admin = KafkaAdmin::new(&config.kafka).context("Failed to create Kafka admin client")?;
    let publisher = KafkaPublisher::new(&config.kafka).context("Failed to create Kafka producer")?;

    let state = Arc::new(ProducerState::new(config, Arc::new(admin), Arc::new(publisher)));
    info!("✓ Producer state initialized");
    Ok(state)
}
