//! Boot — storage, Kafka clients and the wiring between them.

use std::sync::Arc;

use anyhow::{Context, Result};
use spunkless_common::broker::kafka::{KafkaAdmin, KafkaPublisher, KafkaSource};
use spunkless_common::broker::{BrokerError, LogPublisher, MessageSource, TopicAdmin, TopicSpec};
use spunkless_common::store::{LogSink, PartitionManager, PgLogStore};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::activity::ActivityReport;
use crate::conf::ConsumerConfig;
use crate::discovery::{SubscriptionCoordinator, TopicDiscovery};
use crate::ingest::dead_letter::{DeadLetter, LogOnly, TopicDeadLetter};
use crate::ingest::IngestConsumer;
use crate::maintenance::PartitionMaintainer;
use crate::metrics::IngestMetrics;
use crate::state::{ConsumerState, SharedState};

/// The backends a consumer process runs against.
pub struct Seams {
    pub admin: Arc<dyn TopicAdmin>,
    pub source: Arc<dyn MessageSource>,
    pub sink: Arc<dyn LogSink>,
    pub partitions: Arc<dyn PartitionManager>,
    pub activity: Arc<dyn ActivityReport>,
    /// Set when dropped messages go to a dead-letter topic.
    pub dead_letter_publisher: Option<Arc<dyn LogPublisher>>,
}

/// Background tasks, not yet started.
pub struct Workers {
    pub discovery: TopicDiscovery,
    pub maintainer: Option<PartitionMaintainer>,
}

pub struct Booted {
    pub state: SharedState,
    pub workers: Workers,
    pub store: PgLogStore,
}

pub async fn boot(config: ConsumerConfig) -> Result<Booted> {
    info!(host = %config.postgres.host, database = %config.postgres.database, "Connecting to PostgreSQL");
    let store = PgLogStore::connect(&config.postgres)
        .await
        .context("Failed to connect to PostgreSQL")?;
    boot_on(config, store).await
}

/// Finish booting over an open pool. The pool is closed again if any later
/// step fails.
pub async fn boot_on(config: ConsumerConfig, store: PgLogStore) -> Result<Booted> {
    match wire(config, &store).await {
        Ok((state, workers)) => Ok(Booted { state, workers, store }),
        Err(e) => {
            warn!(error = %e, "Boot failed, closing database pool");
            store.close().await;
            Err(e)
        }
    }
}

async fn wire(config: ConsumerConfig, store: &PgLogStore) -> Result<(SharedState, Workers)> {
    let window = store
        .initialize(config.partitions.months_ahead)
        .await
        .context("Failed to initialize database schema")?;
    info!(partitions = window.len(), "✓ Database initialized");

    info!(brokers = ?config.kafka.brokers, group = %config.ingest.group_id, "Connecting to Kafka");
    let admin = Arc::new(KafkaAdmin::new(&config.kafka).context("Failed to create Kafka admin client")?);
    let source = KafkaSource::new(&config.kafka, &config.ingest.group_id).context("Failed to create Kafka consumer")?;

    let dead_letter_publisher: Option<Arc<dyn LogPublisher>> = match &config.ingest.dead_letter_topic {
        Some(topic) => {
            let spec = TopicSpec {
                name: topic.clone(),
                partitions: config.kafka.partitions,
                replication: config.kafka.replication_factor,
            };
            match admin.create_topic(&spec).await {
                Ok(()) | Err(BrokerError::TopicAlreadyExists(_)) => {}
                Err(e) => return Err(e).context("Failed to create dead-letter topic"),
            }
            let publisher: Arc<dyn LogPublisher> =
                Arc::new(KafkaPublisher::new(&config.kafka).context("Failed to create dead-letter producer")?);
            info!(topic = %topic, "Dropped messages will be dead-lettered");
            Some(publisher)
        }
        None => None,
    };

    let pg = Arc::new(store.clone());
    let seams = Seams {
        admin,
        source: Arc::new(source),
        sink: pg.clone(),
        partitions: pg.clone(),
        activity: pg,
        dead_letter_publisher,
    };

    let (state, workers) = assemble(config, seams);
    info!("✓ Consumer state initialized");
    Ok((state, workers))
}

/// Wire shared state and background workers over the given backends.
pub fn assemble(config: ConsumerConfig, seams: Seams) -> (SharedState, Workers) {
    let (shutdown_tx, _) = watch::channel(false);
    let metrics = Arc::new(IngestMetrics::new());

    let dead_letter: Arc<dyn DeadLetter> = match (&config.ingest.dead_letter_topic, &seams.dead_letter_publisher) {
        (Some(topic), Some(publisher)) => Arc::new(TopicDeadLetter::new(Arc::clone(publisher), topic.clone())),
        _ => Arc::new(LogOnly),
    };

    let consumer = Arc::new(IngestConsumer::new(seams.sink, dead_letter, Arc::clone(&metrics)));
    let coordinator = SubscriptionCoordinator::new(seams.source, consumer);
    let subscription = coordinator.subscription();

    let discovery = TopicDiscovery::new(
        seams.admin,
        coordinator,
        config.ingest.topic_prefix.clone(),
        config.discovery_interval(),
        config.scan_timeout(),
        shutdown_tx.subscribe(),
    );

    let maintainer = config.partitions.maintenance_enabled.then(|| {
        PartitionMaintainer::new(
            seams.partitions,
            config.maintenance_interval(),
            config.partitions.months_ahead,
            shutdown_tx.subscribe(),
        )
    });

    let state = Arc::new(ConsumerState {
        config,
        metrics,
        subscription,
        activity: seams.activity,
        dead_letter_publisher: seams.dead_letter_publisher,
        shutdown_tx,
    });

    (state, Workers { discovery, maintainer })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spunkless_common::settings::PostgresConfig;

    #[tokio::test]
    async fn failed_boot_releases_the_pool() {
        let mut config = ConsumerConfig::default();
        config.postgres = PostgresConfig {
            host: "127.0.0.1".into(),
            port: 1,
            acquire_timeout_secs: 1,
            ..Default::default()
        };
        let store = PgLogStore::connect_lazy(&config.postgres);
        let pool = store.pool().clone();

        assert!(boot_on(config, store).await.is_err());
        assert!(pool.is_closed());
    }
}
