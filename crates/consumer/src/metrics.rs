use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

/// Counters for the ingest consumer.
#[derive(Default)]
pub struct IngestMetrics {
    received: AtomicU64,
    persisted: AtomicU64,
    malformed: AtomicU64,
    persist_failed: AtomicU64,
    dead_lettered: AtomicU64,
    persisted_per_topic: RwLock<HashMap<String, u64>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSnapshot {
    pub received: u64,
    pub persisted: u64,
    pub malformed: u64,
    pub persist_failed: u64,
    pub dead_lettered: u64,
    pub by_topic: HashMap<String, u64>,
}

impl IngestSnapshot {
    /// Messages dropped for any reason.
    pub fn dropped(&self) -> u64 {
        self.malformed + self.persist_failed
    }
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persisted(&self, topic: &str) {
        self.persisted.fetch_add(1, Ordering::Relaxed);
        *self.persisted_per_topic.write().entry(topic.to_string()).or_insert(0) += 1;
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persist_failed(&self) {
        self.persist_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            received: self.received.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            persist_failed: self.persist_failed.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            by_topic: self.persisted_per_topic.read().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_tracks_outcomes() {
        let metrics = IngestMetrics::new();
        for _ in 0..4 {
            metrics.record_received();
        }
        metrics.record_persisted("logs-web");
        metrics.record_persisted("logs-web");
        metrics.record_malformed();
        metrics.record_persist_failed();
        metrics.record_dead_lettered();

        let snap = metrics.snapshot();
        assert_eq!(snap.received, 4);
        assert_eq!(snap.persisted, 2);
        assert_eq!(snap.dropped(), 2);
        assert_eq!(snap.dead_lettered, 1);
        assert_eq!(snap.by_topic.get("logs-web"), Some(&2));
    }
}
