//! Abstract interface over the message queue.
//!
//! Every component talks to the queue through these traits.
//! `kafka.rs` provides the real rdkafka-backed implementations.
//! `fake.rs` provides an in-memory test double.

pub mod fake;
pub mod kafka;

use std::borrow::Cow;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;

/// Boxed future returned by every broker operation, keeping the traits object-safe.
pub type BrokerFuture<'a, T> = BoxFuture<'a, Result<T, BrokerError>>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Broker operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Topic already exists: {0}")]
    TopicAlreadyExists(String),

    #[error("Broker client error: {0}")]
    Client(String),
}

impl BrokerError {
    /// Errors worth retrying: the broker may come back, or a freshly created
    /// topic may not have propagated yet.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrokerError::Unavailable(_) | BrokerError::Timeout(_) | BrokerError::UnknownTopic(_)
        )
    }
}

/// Topic creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication: i32,
}

/// One message taken off a subscribed topic, detached from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

impl InboundMessage {
    pub fn payload(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }

    /// Payload rendered for logs, invalid UTF-8 replaced.
    pub fn payload_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.payload())
    }
}

/// Administrative interface: topic listing and creation.
pub trait TopicAdmin: Send + Sync {
    fn list_topics(&self) -> BrokerFuture<'_, Vec<String>>;

    /// Create a topic. Fails with [`BrokerError::TopicAlreadyExists`] when it is already there.
    fn create_topic<'a>(&'a self, spec: &'a TopicSpec) -> BrokerFuture<'a, ()>;
}

/// Producer side: append one payload to a topic.
pub trait LogPublisher: Send + Sync {
    fn publish<'a>(&'a self, topic: &'a str, key: &'a str, payload: &'a [u8]) -> BrokerFuture<'a, ()>;

    /// Wait for outstanding deliveries, bounded by `timeout`.
    fn flush(&self, timeout: Duration) -> BrokerFuture<'_, ()>;
}

/// Consumer side: a subscription whose topic set can be replaced wholesale.
pub trait MessageSource: Send + Sync {
    /// Replace the subscription with `topics`.
    fn subscribe<'a>(&'a self, topics: &'a [String]) -> BrokerFuture<'a, ()>;

    /// Wait for the next message. Cancel-safe.
    fn recv(&self) -> BrokerFuture<'_, InboundMessage>;

    /// Mark a message as handled so its offset becomes committable.
    fn ack<'a>(&'a self, message: &'a InboundMessage) -> BrokerFuture<'a, ()>;

    /// Commit what has been acknowledged and leave the group.
    fn close(&self) -> BrokerFuture<'_, ()>;
}
