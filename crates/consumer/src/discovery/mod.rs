//! Finds log topics as services start publishing and keeps the
//! consumer subscribed to all of them.

pub mod coordinator;
pub mod topic_set;

use std::sync::Arc;
use std::time::Duration;

use spunkless_common::broker::{BrokerError, TopicAdmin};
use spunkless_common::topic::is_log_topic;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

pub use coordinator::SubscriptionCoordinator;
pub use topic_set::TopicSet;

/// Result of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// No log topic exists on the broker yet.
    NoLogTopics,
    Unchanged,
    Subscribed(Vec<String>),
}

pub struct TopicDiscovery {
    admin: Arc<dyn TopicAdmin>,
    coordinator: SubscriptionCoordinator,
    prefix: String,
    interval: Duration,
    scan_timeout: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl TopicDiscovery {
    pub fn new(
        admin: Arc<dyn TopicAdmin>,
        coordinator: SubscriptionCoordinator,
        prefix: impl Into<String>,
        interval: Duration,
        scan_timeout: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            admin,
            coordinator,
            prefix: prefix.into(),
            interval,
            scan_timeout,
            shutdown_rx,
        }
    }

    pub fn coordinator(&self) -> &SubscriptionCoordinator {
        &self.coordinator
    }

    /// List topics once and subscribe to any new log topic.
    pub async fn scan(&mut self) -> Result<ScanOutcome, BrokerError> {
        let all = time::timeout(self.scan_timeout, self.admin.list_topics())
            .await
            .map_err(|_| BrokerError::Timeout(self.scan_timeout))??;

        let log_topics: Vec<String> = all.into_iter().filter(|t| is_log_topic(t, &self.prefix)).collect();
        if log_topics.is_empty() {
            return Ok(ScanOutcome::NoLogTopics);
        }

        let new_topics = self.coordinator.topics().missing(&log_topics);
        if new_topics.is_empty() {
            return Ok(ScanOutcome::Unchanged);
        }

        info!(count = new_topics.len(), topics = ?new_topics, "Found new log topics");
        self.coordinator.reconcile(new_topics.clone()).await?;
        Ok(ScanOutcome::Subscribed(new_topics))
    }

    /// Scan, logging instead of failing. A failed scan counts as "nothing new".
    async fn tick(&mut self) {
        match self.scan().await {
            Ok(ScanOutcome::NoLogTopics) => warn!("No log topics found, waiting for topics to be created"),
            Ok(ScanOutcome::Unchanged) => debug!("Topic scan: no new topics"),
            Ok(ScanOutcome::Subscribed(topics)) => {
                info!(added = topics.len(), total = self.coordinator.topics().len(), "Subscription updated")
            }
            Err(e) => warn!(error = %e, "Topic scan failed, retrying next tick"),
        }
    }

    /// Run the initial scan, then rescan every interval until shutdown.
    /// Closes the consumer on the way out.
    pub async fn run(mut self) {
        info!(prefix = %self.prefix, interval_secs = self.interval.as_secs(), "Starting topic discovery");

        self.tick().await;

        let mut interval = time::interval_at(time::Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Received shutdown signal, stopping topic discovery");
                        break;
                    }
                }
            }
        }

        self.coordinator.shutdown().await;
    }
}
