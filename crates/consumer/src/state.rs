use std::sync::Arc;

use spunkless_common::broker::LogPublisher;
use tokio::sync::watch;

use crate::activity::ActivityReport;
use crate::conf::ConsumerConfig;
use crate::metrics::IngestMetrics;

pub struct ConsumerState {
    pub config: ConsumerConfig,
    pub metrics: Arc<IngestMetrics>,
    /// Subscribed topics as last published by the coordinator.
    pub subscription: watch::Receiver<Vec<String>>,
    pub activity: Arc<dyn ActivityReport>,
    /// Dead-letter producer, kept for the shutdown flush.
    pub dead_letter_publisher: Option<Arc<dyn LogPublisher>>,
    /// Background workers stop once this turns true.
    pub shutdown_tx: watch::Sender<bool>,
}

pub type SharedState = Arc<ConsumerState>;

impl ConsumerState {
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.subscription.borrow().clone()
    }

    /// Signal shutdown to all background workers.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
