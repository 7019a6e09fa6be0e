use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

/// Submission counters for the publish gateway.
#[derive(Default)]
pub struct GatewayMetrics {
    accepted: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    /// Extra attempts beyond the first, summed over all submissions.
    retries: AtomicU64,
    /// Accepted submissions per service.
    accepted_per_service: RwLock<HashMap<String, u64>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewaySnapshot {
    pub accepted: u64,
    pub rejected: u64,
    pub failed: u64,
    pub retries: u64,
    pub by_service: HashMap<String, u64>,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self, service: &str, attempts: u32) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.record_retries(attempts);
        *self.accepted_per_service.write().entry(service.to_string()).or_insert(0) += 1;
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self, attempts: u32) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.record_retries(attempts);
    }

    fn record_retries(&self, attempts: u32) {
        self.retries.fetch_add(u64::from(attempts.saturating_sub(1)), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> GatewaySnapshot {
        GatewaySnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            by_service: self.accepted_per_service.read().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_retries_beyond_first_attempt() {
        let metrics = GatewayMetrics::new();
        metrics.record_accepted("web", 1);
        metrics.record_accepted("web", 3);
        metrics.record_failed(5);
        metrics.record_rejected();

        let snap = metrics.snapshot();
        assert_eq!((snap.accepted, snap.failed, snap.rejected), (2, 1, 1));
        assert_eq!(snap.retries, 6);
        assert_eq!(snap.by_service.get("web"), Some(&2));
    }
}
