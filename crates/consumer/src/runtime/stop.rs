//! Stop — wind down workers, commit offsets, release connections.

use std::time::Duration;

use spunkless_common::store::PgLogStore;
use tracing::{info, warn};

use super::serve::Running;
use crate::state::SharedState;

const DEAD_LETTER_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn stop(state: SharedState, running: Running, store: PgLogStore) {
    state.shutdown();

    // Discovery owns the consumer and closes it on exit.
    if let Err(e) = running.discovery.await {
        warn!(error = %e, "Discovery task ended abnormally");
    }
    if let Some(maintainer) = running.maintainer {
        if let Err(e) = maintainer.await {
            warn!(error = %e, "Maintenance task ended abnormally");
        }
    }

    if let Some(publisher) = &state.dead_letter_publisher {
        if let Err(e) = publisher.flush(DEAD_LETTER_FLUSH_TIMEOUT).await {
            warn!(error = %e, "Dead-letter producer flush incomplete");
        }
    }

    store.close().await;

    let metrics = state.metrics.snapshot();
    info!(
        received = metrics.received,
        persisted = metrics.persisted,
        dropped = metrics.dropped(),
        dead_lettered = metrics.dead_lettered,
        "Consumer shut down gracefully"
    );
}
