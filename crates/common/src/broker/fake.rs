//! In-memory broker for deterministic tests.
//!
//! [`FakeBroker`] implements all three broker traits over shared state, so a
//! producer gateway and an ingest consumer can run against the same instance.
//! Every topic is a single partition; a subscription rewinds each topic to
//! its last acknowledged offset, which mirrors group-commit redelivery.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use super::{BrokerError, BrokerFuture, InboundMessage, LogPublisher, MessageSource, TopicAdmin, TopicSpec};

// ── In-memory state ─────────────────────────────────────────────

#[derive(Default)]
struct Inner {
    topics: BTreeMap<String, Vec<Vec<u8>>>,
    subscription: BTreeSet<String>,
    delivered: HashMap<String, usize>,
    committed: HashMap<String, usize>,
    created: Vec<String>,
    list_calls: usize,
    admin_failures: u32,
    publish_failures: u32,
    subscribe_failures: u32,
    closed: bool,
}

impl Inner {
    fn take_failure(counter: &mut u32, what: &str) -> Result<(), BrokerError> {
        if *counter > 0 {
            *counter -= 1;
            return Err(BrokerError::Unavailable(format!("injected {} failure", what)));
        }
        Ok(())
    }

    fn next_message(&mut self) -> Option<InboundMessage> {
        for topic in &self.subscription {
            let Some(log) = self.topics.get(topic) else { continue };
            let position = self.delivered.entry(topic.clone()).or_insert(0);
            if let Some(payload) = log.get(*position) {
                let message = InboundMessage {
                    topic: topic.clone(),
                    partition: 0,
                    offset: *position as i64,
                    payload: Some(payload.clone()),
                };
                *position += 1;
                return Some(message);
            }
        }
        None
    }
}

/// A fake broker for deterministic testing.
pub struct FakeBroker {
    inner: Mutex<Inner>,
    arrivals: Notify,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            arrivals: Notify::new(),
        }
    }

    /// Seed a topic without counting it as a creation.
    pub async fn add_topic(&self, name: &str) {
        self.inner.lock().await.topics.entry(name.to_string()).or_default();
    }

    /// Append raw bytes to a topic, creating it if needed. Used for payloads
    /// no well-behaved producer would emit.
    pub async fn push_raw(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        self.inner.lock().await.topics.entry(topic.to_string()).or_default().push(payload.into());
        self.arrivals.notify_one();
    }

    /// Make the next `count` admin calls fail as unavailable.
    pub async fn fail_admin(&self, count: u32) {
        self.inner.lock().await.admin_failures = count;
    }

    /// Make the next `count` publishes fail as unavailable.
    pub async fn fail_publish(&self, count: u32) {
        self.inner.lock().await.publish_failures = count;
    }

    /// Make the next `count` subscribe calls fail as unavailable, leaving
    /// the current subscription in place.
    pub async fn fail_subscribe(&self, count: u32) {
        self.inner.lock().await.subscribe_failures = count;
    }

    pub async fn topics(&self) -> Vec<String> {
        self.inner.lock().await.topics.keys().cloned().collect()
    }

    pub async fn messages(&self, topic: &str) -> Vec<Vec<u8>> {
        self.inner.lock().await.topics.get(topic).cloned().unwrap_or_default()
    }

    /// Topics created through [`TopicAdmin::create_topic`], in creation order.
    pub async fn created_topics(&self) -> Vec<String> {
        self.inner.lock().await.created.clone()
    }

    pub async fn list_calls(&self) -> usize {
        self.inner.lock().await.list_calls
    }

    /// Current subscription, sorted.
    pub async fn subscription(&self) -> Vec<String> {
        self.inner.lock().await.subscription.iter().cloned().collect()
    }

    /// Next offset the group would resume from on `topic`.
    pub async fn committed(&self, topic: &str) -> usize {
        self.inner.lock().await.committed.get(topic).copied().unwrap_or(0)
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }
}

impl Default for FakeBroker {
    fn default() -> Self {
        Self::new()
    }
}

// ── TopicAdmin ──────────────────────────────────────────────────

impl TopicAdmin for FakeBroker {
    fn list_topics(&self) -> BrokerFuture<'_, Vec<String>> {
        Box::pin(async move {
            // Give concurrent callers a chance to interleave.
            tokio::task::yield_now().await;
            let mut state = self.inner.lock().await;
            state.list_calls += 1;
            Inner::take_failure(&mut state.admin_failures, "admin")?;
            Ok(state.topics.keys().cloned().collect())
        })
    }

    fn create_topic<'a>(&'a self, spec: &'a TopicSpec) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let mut state = self.inner.lock().await;
            Inner::take_failure(&mut state.admin_failures, "admin")?;
            if state.topics.contains_key(&spec.name) {
                return Err(BrokerError::TopicAlreadyExists(spec.name.clone()));
            }
            state.topics.insert(spec.name.clone(), Vec::new());
            state.created.push(spec.name.clone());
            Ok(())
        })
    }
}

// ── LogPublisher ────────────────────────────────────────────────

impl LogPublisher for FakeBroker {
    fn publish<'a>(&'a self, topic: &'a str, _key: &'a str, payload: &'a [u8]) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            {
                let mut state = self.inner.lock().await;
                Inner::take_failure(&mut state.publish_failures, "publish")?;
                let log = state
                    .topics
                    .get_mut(topic)
                    .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;
                log.push(payload.to_vec());
            }
            self.arrivals.notify_one();
            Ok(())
        })
    }

    fn flush(&self, _timeout: Duration) -> BrokerFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

// ── MessageSource ───────────────────────────────────────────────

impl MessageSource for FakeBroker {
    fn subscribe<'a>(&'a self, topics: &'a [String]) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            {
                let mut state = self.inner.lock().await;
                Inner::take_failure(&mut state.subscribe_failures, "subscribe")?;
                let Inner { subscription, delivered, committed, closed, .. } = &mut *state;
                *subscription = topics.iter().cloned().collect();
                delivered.clear();
                for topic in subscription.iter() {
                    delivered.insert(topic.clone(), committed.get(topic).copied().unwrap_or(0));
                }
                *closed = false;
            }
            self.arrivals.notify_one();
            Ok(())
        })
    }

    fn recv(&self) -> BrokerFuture<'_, InboundMessage> {
        Box::pin(async move {
            loop {
                // notify_one leaves a permit when nobody waits, so an arrival
                // between the check and the await still wakes us.
                let arrival = self.arrivals.notified();
                if let Some(message) = self.inner.lock().await.next_message() {
                    return Ok(message);
                }
                arrival.await;
            }
        })
    }

    fn ack<'a>(&'a self, message: &'a InboundMessage) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.inner.lock().await;
            let next = message.offset as usize + 1;
            let committed = state.committed.entry(message.topic.clone()).or_insert(0);
            *committed = (*committed).max(next);
            Ok(())
        })
    }

    fn close(&self) -> BrokerFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.inner.lock().await;
            state.subscription.clear();
            state.closed = true;
            Ok(())
        })
    }
}
