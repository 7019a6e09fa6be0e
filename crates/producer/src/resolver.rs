//! Makes sure a service's topic exists before anything is published to it.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use spunkless_common::broker::{BrokerError, TopicAdmin, TopicSpec};
use spunkless_common::settings::KafkaConfig;
use tracing::{debug, info};

pub struct TopicResolver {
    admin: Arc<dyn TopicAdmin>,
    /// Topics confirmed to exist on the broker.
    known: DashSet<String>,
    partitions: i32,
    replication: i32,
    timeout: Duration,
}

impl TopicResolver {
    pub fn new(admin: Arc<dyn TopicAdmin>, config: &KafkaConfig) -> Self {
        Self {
            admin,
            known: DashSet::new(),
            partitions: config.partitions,
            replication: config.replication_factor,
            timeout: config.admin_timeout(),
        }
    }

    /// Ensure `topic` exists, creating it when missing.
    ///
    /// Safe to race: a concurrent creator winning is reported by the broker as
    /// "already exists", which counts as success here.
    pub async fn ensure_topic(&self, topic: &str) -> Result<(), BrokerError> {
        if self.known.contains(topic) {
            return Ok(());
        }

        let existing = self.bounded(self.admin.list_topics()).await?;
        if existing.iter().any(|t| t == topic) {
            debug!(topic, "Topic already present on broker");
            self.known.insert(topic.to_string());
            return Ok(());
        }

        let spec = TopicSpec {
            name: topic.to_string(),
            partitions: self.partitions,
            replication: self.replication,
        };
        match self.bounded(self.admin.create_topic(&spec)).await {
            Ok(()) => info!(topic, partitions = self.partitions, "Created topic for new service"),
            Err(BrokerError::TopicAlreadyExists(_)) => debug!(topic, "Topic created concurrently"),
            Err(e) => return Err(e),
        }

        self.known.insert(topic.to_string());
        Ok(())
    }

    /// Drop a topic from the cache, e.g. after the broker reported it unknown.
    pub fn forget(&self, topic: &str) {
        self.known.remove(topic);
    }

    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, BrokerError>>,
    ) -> Result<T, BrokerError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| BrokerError::Timeout(self.timeout))?
    }
}
