//! Owns the subscription and the task consuming from it.
//!
//! The queue client cannot change topics under a running consumer, so every
//! change goes stop, merge, resubscribe to the full set, start.

use std::sync::Arc;

use spunkless_common::broker::{BrokerError, MessageSource};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::topic_set::TopicSet;
use crate::ingest::IngestConsumer;

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct SubscriptionCoordinator {
    topics: TopicSet,
    source: Arc<dyn MessageSource>,
    consumer: Arc<IngestConsumer>,
    running: Option<Running>,
    snapshot_tx: watch::Sender<Vec<String>>,
}

impl SubscriptionCoordinator {
    pub fn new(source: Arc<dyn MessageSource>, consumer: Arc<IngestConsumer>) -> Self {
        let (snapshot_tx, _) = watch::channel(Vec::new());
        Self {
            topics: TopicSet::new(),
            source,
            consumer,
            running: None,
            snapshot_tx,
        }
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    /// Read-only view of the subscribed topics, updated after each reconcile.
    pub fn subscription(&self) -> watch::Receiver<Vec<String>> {
        self.snapshot_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|r| !r.handle.is_finished())
    }

    /// Extend the subscription with `new_topics`.
    ///
    /// The set only changes once the broker accepted the new subscription;
    /// on failure consumption resumes on the previous set and the same topics
    /// show up as new again on the next scan.
    pub async fn reconcile(&mut self, new_topics: Vec<String>) -> Result<usize, BrokerError> {
        let mut next = self.topics.clone();
        let added = next.merge(new_topics);
        if added == 0 {
            return Ok(0);
        }

        if self.running.is_some() {
            info!("Stopping consumer to subscribe to new topics");
            self.stop().await;
        }

        let full = next.to_vec();
        if let Err(e) = self.source.subscribe(&full).await {
            self.start();
            return Err(e);
        }

        for topic in full.iter().filter(|t| !self.topics.contains(t)) {
            info!(topic = %topic, "Subscribed to topic");
        }
        self.topics = next;
        self.snapshot_tx.send_replace(full);
        self.start();
        Ok(added)
    }

    fn start(&mut self) {
        if self.topics.is_empty() || self.running.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&self.consumer).run(Arc::clone(&self.source), cancel.clone()));
        self.running = Some(Running { cancel, handle });
        info!(topics = self.topics.len(), "Consumer started");
    }

    /// Cancel the consumption task and wait for its in-flight message.
    async fn stop(&mut self) {
        if let Some(Running { cancel, handle }) = self.running.take() {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "Consumption task ended abnormally");
            }
        }
    }

    /// Stop consuming, commit acknowledged offsets and leave the group.
    pub async fn shutdown(mut self) {
        self.stop().await;
        match self.source.close().await {
            Ok(()) => info!("Consumer closed"),
            Err(e) => warn!(error = %e, "Failed to close consumer cleanly"),
        }
    }
}
