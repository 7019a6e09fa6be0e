//! Turns queued messages into stored rows, one message at a time.
//!
//! A bad message never stops the stream: it is logged, counted, handed to
//! the dead-letter hook and acknowledged like any other.

pub mod dead_letter;

use std::sync::Arc;
use std::time::Duration;

use spunkless_common::broker::{InboundMessage, MessageSource};
use spunkless_common::store::LogSink;
use spunkless_common::LogRecord;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::IngestMetrics;
use dead_letter::{DeadLetter, Disposition, DropReason};

/// Pause after a failed receive before polling again.
const RECV_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Persisted(i32),
    Malformed,
    PersistFailed,
}

pub struct IngestConsumer {
    sink: Arc<dyn LogSink>,
    dead_letter: Arc<dyn DeadLetter>,
    metrics: Arc<IngestMetrics>,
}

impl IngestConsumer {
    pub fn new(sink: Arc<dyn LogSink>, dead_letter: Arc<dyn DeadLetter>, metrics: Arc<IngestMetrics>) -> Self {
        Self { sink, dead_letter, metrics }
    }

    pub fn metrics(&self) -> &IngestMetrics {
        &self.metrics
    }

    /// Decode and persist one message. Never fails: every problem ends in a
    /// logged drop.
    pub async fn handle(&self, message: &InboundMessage) -> Outcome {
        self.metrics.record_received();

        let record = match LogRecord::decode(message.payload()) {
            Ok(record) => record,
            Err(e) => {
                error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    raw = %message.payload_lossy(),
                    error = %e,
                    "Dropping malformed message"
                );
                self.metrics.record_malformed();
                self.drop_message(message, DropReason::Malformed(e)).await;
                return Outcome::Malformed;
            }
        };

        debug!(topic = %message.topic, service = %record.service, level = %record.level, "Processing log record");

        match self.sink.insert(&record).await {
            Ok(id) => {
                debug!(id, topic = %message.topic, offset = message.offset, "Stored log record");
                self.metrics.record_persisted(&message.topic);
                Outcome::Persisted(id)
            }
            Err(e) => {
                error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    service = %record.service,
                    timestamp = %record.timestamp,
                    error = %e,
                    "Failed to store log record, dropping it"
                );
                self.metrics.record_persist_failed();
                self.drop_message(message, DropReason::PersistFailed(e)).await;
                Outcome::PersistFailed
            }
        }
    }

    async fn drop_message(&self, message: &InboundMessage, reason: DropReason) {
        match self.dead_letter.dead_letter(message, &reason).await {
            Ok(Disposition::Forwarded { topic }) => {
                self.metrics.record_dead_lettered();
                info!(source = %message.topic, offset = message.offset, dead_letter = %topic, "Dead-lettered message");
            }
            Ok(Disposition::Discarded) => {}
            Err(e) => warn!(topic = %message.topic, offset = message.offset, error = %e, "Dead-letter hook failed"),
        }
    }

    /// Consume from `source` until `cancel` fires.
    ///
    /// Cancellation is only observed between messages, so a message that has
    /// been received is always handled and acknowledged first.
    pub async fn run(self: Arc<Self>, source: Arc<dyn MessageSource>, cancel: CancellationToken) {
        debug!("Consumption loop started");

        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = source.recv() => received,
            };

            match received {
                Ok(message) => {
                    self.handle(&message).await;
                    if let Err(e) = source.ack(&message).await {
                        warn!(topic = %message.topic, offset = message.offset, error = %e, "Failed to store offset");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Receive failed, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECV_BACKOFF) => {}
                    }
                }
            }
        }

        debug!("Consumption loop stopped");
    }
}
