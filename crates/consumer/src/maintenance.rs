//! Keeps monthly partitions provisioned ahead of the clock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use spunkless_common::store::{MonthPartition, PartitionManager, StoreError};
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

pub struct PartitionMaintainer {
    manager: Arc<dyn PartitionManager>,
    interval: Duration,
    months_ahead: u32,
    shutdown_rx: watch::Receiver<bool>,
}

impl PartitionMaintainer {
    pub fn new(
        manager: Arc<dyn PartitionManager>,
        interval: Duration,
        months_ahead: u32,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self { manager, interval, months_ahead, shutdown_rx }
    }

    /// Provision the window starting at the current month.
    pub async fn provision_now(&self) -> Result<Vec<MonthPartition>, StoreError> {
        self.manager.provision(Utc::now(), self.months_ahead).await
    }

    /// Re-provision every interval until shutdown. Startup provisioning is
    /// done elsewhere, so the first run is one interval out.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.interval.as_secs(),
            months_ahead = self.months_ahead,
            "Starting partition maintenance"
        );

        let mut interval = time::interval_at(time::Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => match self.provision_now().await {
                    Ok(window) => debug!(
                        first = %window.first().map(ToString::to_string).unwrap_or_default(),
                        last = %window.last().map(ToString::to_string).unwrap_or_default(),
                        "Partitions provisioned"
                    ),
                    Err(e) => warn!(error = %e, "Partition maintenance failed, retrying next interval"),
                },
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Received shutdown signal, stopping partition maintenance");
                        break;
                    }
                }
            }
        }
    }
}
