//! Stop — flush what the producer still holds.

use tracing::{info, warn};

use crate::state::SharedState;

pub async fn stop(state: SharedState) {
    let timeout = state.config.flush_timeout();
    match state.publisher.flush(timeout).await {
        Ok(()) => info!("Producer flushed"),
        Err(e) => warn!(error = %e, timeout_secs = timeout.as_secs(), "Producer flush incomplete"),
    }

    let metrics = state.gateway.metrics().snapshot();
    info!(
        accepted = metrics.accepted,
        rejected = metrics.rejected,
        failed = metrics.failed,
        retries = metrics.retries,
        "Producer shut down gracefully"
    );
}
