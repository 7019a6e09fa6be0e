//! Where dropped messages go after they are logged.

use std::sync::Arc;

use spunkless_common::broker::{BrokerFuture, InboundMessage, LogPublisher};
use spunkless_common::store::StoreError;
use spunkless_common::RecordError;
use thiserror::Error;
use tracing::debug;

/// Why a message was dropped instead of persisted.
#[derive(Debug, Error)]
pub enum DropReason {
    #[error("malformed payload: {0}")]
    Malformed(#[source] RecordError),

    #[error("persistence failed: {0}")]
    PersistFailed(#[source] StoreError),
}

impl DropReason {
    pub fn kind(&self) -> &'static str {
        match self {
            DropReason::Malformed(_) => "malformed",
            DropReason::PersistFailed(_) => "persist_failed",
        }
    }
}

/// What the hook did with a dropped message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Discarded,
    Forwarded { topic: String },
}

pub trait DeadLetter: Send + Sync {
    fn dead_letter<'a>(&'a self, message: &'a InboundMessage, reason: &'a DropReason) -> BrokerFuture<'a, Disposition>;
}

/// Keeps nothing; the consumer's error log is the only trace.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnly;

impl DeadLetter for LogOnly {
    fn dead_letter<'a>(&'a self, message: &'a InboundMessage, reason: &'a DropReason) -> BrokerFuture<'a, Disposition> {
        Box::pin(async move {
            debug!(topic = %message.topic, offset = message.offset, reason = reason.kind(), "Dropped message discarded");
            Ok(Disposition::Discarded)
        })
    }
}

/// Republishes the raw payload to a side topic, keyed `<source topic>/<reason>`.
pub struct TopicDeadLetter {
    publisher: Arc<dyn LogPublisher>,
    topic: String,
}

impl TopicDeadLetter {
    pub fn new(publisher: Arc<dyn LogPublisher>, topic: impl Into<String>) -> Self {
        Self { publisher, topic: topic.into() }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl DeadLetter for TopicDeadLetter {
    fn dead_letter<'a>(&'a self, message: &'a InboundMessage, reason: &'a DropReason) -> BrokerFuture<'a, Disposition> {
        Box::pin(async move {
            let key = format!("{}/{}", message.topic, reason.kind());
            self.publisher.publish(&self.topic, &key, message.payload()).await?;
            Ok(Disposition::Forwarded { topic: self.topic.clone() })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use spunkless_common::broker::fake::FakeBroker;
    use std::time::Duration;

    /// Records `(topic, key)` for every publish.
    #[derive(Default)]
    struct KeyRecorder(Mutex<Vec<(String, String)>>);

    impl LogPublisher for KeyRecorder {
        fn publish<'a>(&'a self, topic: &'a str, key: &'a str, _payload: &'a [u8]) -> BrokerFuture<'a, ()> {
            self.0.lock().push((topic.to_string(), key.to_string()));
            Box::pin(async { Ok(()) })
        }

        fn flush(&self, _timeout: Duration) -> BrokerFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }
    }

    fn message(payload: &[u8]) -> InboundMessage {
        InboundMessage {
            topic: "logs-web".to_string(),
            partition: 0,
            offset: 7,
            payload: Some(payload.to_vec()),
        }
    }

    fn malformed() -> DropReason {
        DropReason::Malformed(RecordError::NotAnObject)
    }

    #[tokio::test]
    async fn log_only_discards() {
        let disposition = LogOnly.dead_letter(&message(b"garbage"), &malformed()).await.unwrap();
        assert_eq!(disposition, Disposition::Discarded);
    }

    #[tokio::test]
    async fn topic_dead_letter_forwards_raw_payload() {
        let broker = Arc::new(FakeBroker::new());
        broker.add_topic("dead-letter").await;
        let hook = TopicDeadLetter::new(broker.clone(), "dead-letter");

        let disposition = hook.dead_letter(&message(b"{not json"), &malformed()).await.unwrap();

        assert_eq!(disposition, Disposition::Forwarded { topic: "dead-letter".into() });
        assert_eq!(broker.messages("dead-letter").await, vec![b"{not json".to_vec()]);
    }

    #[tokio::test]
    async fn key_carries_source_topic_and_reason() {
        let recorder = Arc::new(KeyRecorder::default());
        let hook = TopicDeadLetter::new(recorder.clone(), "dead-letter");

        hook.dead_letter(&message(b"x"), &malformed()).await.unwrap();
        let persist = DropReason::PersistFailed(StoreError::Connection("pool closed".into()));
        hook.dead_letter(&message(b"{}"), &persist).await.unwrap();

        assert_eq!(
            *recorder.0.lock(),
            vec![
                ("dead-letter".to_string(), "logs-web/malformed".to_string()),
                ("dead-letter".to_string(), "logs-web/persist_failed".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn forwarding_failure_is_reported() {
        let broker = Arc::new(FakeBroker::new());
        let hook = TopicDeadLetter::new(broker.clone(), "dead-letter");

        let err = hook.dead_letter(&message(b"x"), &malformed()).await.unwrap_err();
        assert!(matches!(err, spunkless_common::broker::BrokerError::UnknownTopic(_)));
    }
}
