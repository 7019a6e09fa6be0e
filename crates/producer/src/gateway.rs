//! Validates submissions, stamps them, and publishes them to the
//! service's topic.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use spunkless_common::broker::{BrokerError, LogPublisher};
use spunkless_common::retry::RetryPolicy;
use spunkless_common::{LogRecord, LogSubmission, RecordError};
use thiserror::Error;
use tracing::{debug, error};

use crate::metrics::GatewayMetrics;
use crate::resolver::TopicResolver;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The submission itself is unacceptable; retrying will not help.
    #[error("Rejected submission: {0}")]
    Rejected(#[from] RecordError),

    #[error("Failed to publish to {topic} after {attempts} attempt(s): {source}")]
    Publish {
        topic: String,
        attempts: u32,
        #[source]
        source: BrokerError,
    },
}

/// A submission that reached the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub topic: String,
    pub attempts: u32,
}

pub struct PublishGateway {
    resolver: TopicResolver,
    publisher: Arc<dyn LogPublisher>,
    retry: RetryPolicy,
    /// Bound on one ensure-then-publish attempt.
    attempt_timeout: Duration,
    metrics: Arc<GatewayMetrics>,
}

impl PublishGateway {
    pub fn new(
        resolver: TopicResolver,
        publisher: Arc<dyn LogPublisher>,
        retry: RetryPolicy,
        attempt_timeout: Duration,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            resolver,
            publisher,
            retry,
            attempt_timeout,
            metrics,
        }
    }

    /// Validate an arbitrary JSON body and publish it.
    ///
    /// `origin` is the caller's address, used as `host` when the body has none.
    pub async fn submit(&self, body: Value, origin: Option<String>) -> Result<Accepted, GatewayError> {
        let submission = LogSubmission::from_value(body).inspect_err(|e| {
            debug!(error = %e, "Rejected submission");
            self.metrics.record_rejected();
        })?;

        let record = submission.into_record(Utc::now(), origin);
        self.publish(&record).await
    }

    /// Publish an already-stamped record, ensuring its topic first.
    /// Transient broker failures retry the whole ensure-then-publish step;
    /// an attempt that outlives `attempt_timeout` counts as a timeout.
    pub async fn publish(&self, record: &LogRecord) -> Result<Accepted, GatewayError> {
        let topic = record.topic();
        let payload = record.encode()?;

        let (topic_ref, payload_ref, service) = (&topic, &payload, record.service.as_str());
        let outcome = self
            .retry
            .run("publish", BrokerError::is_transient, |_attempt| async move {
                tokio::time::timeout(self.attempt_timeout, self.attempt(topic_ref, service, payload_ref))
                    .await
                    .map_err(|_| BrokerError::Timeout(self.attempt_timeout))?
            })
            .await;

        match outcome {
            Ok(done) => {
                self.metrics.record_accepted(service, done.attempts);
                debug!(topic = %topic, attempts = done.attempts, "Published log record");
                Ok(Accepted { topic, attempts: done.attempts })
            }
            Err(failed) => {
                self.metrics.record_failed(failed.attempts);
                error!(topic = %topic, attempts = failed.attempts, error = %failed.value, "Failed to publish log record");
                Err(GatewayError::Publish {
                    topic,
                    attempts: failed.attempts,
                    source: failed.value,
                })
            }
        }
    }

    async fn attempt(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.resolver.ensure_topic(topic).await?;
        self.publisher.publish(topic, key, payload).await.inspect_err(|e| {
            if matches!(e, BrokerError::UnknownTopic(_)) {
                self.resolver.forget(topic);
            }
        })
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }

    pub fn resolver(&self) -> &TopicResolver {
        &self.resolver
    }
}
