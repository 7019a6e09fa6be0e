//! Rdkafka-backed implementations of the broker traits.

use std::sync::Arc;
use std::time::Duration;

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, info};

use super::{BrokerError, BrokerFuture, InboundMessage, LogPublisher, MessageSource, TopicAdmin, TopicSpec};
use crate::settings::KafkaConfig;

/// Base client configuration shared by admin, producer and consumer.
fn client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", config.brokers.join(","))
        .set("client.id", &config.client_id);
    client
}

/// Map an rdkafka error onto the broker error taxonomy.
pub(crate) fn map_kafka_error(err: KafkaError) -> BrokerError {
    match err.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::MessageTimedOut
            | RDKafkaErrorCode::OperationTimedOut
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::QueueFull
            | RDKafkaErrorCode::LeaderNotAvailable
            | RDKafkaErrorCode::NotLeaderForPartition
            | RDKafkaErrorCode::NetworkException,
        ) => BrokerError::Unavailable(err.to_string()),
        Some(RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic) => {
            BrokerError::UnknownTopic(err.to_string())
        }
        Some(RDKafkaErrorCode::TopicAlreadyExists) => BrokerError::TopicAlreadyExists(err.to_string()),
        _ => BrokerError::Client(err.to_string()),
    }
}

// ── Admin ───────────────────────────────────────────────────────

pub struct KafkaAdmin {
    client: Arc<AdminClient<DefaultClientContext>>,
    timeout: Duration,
}

impl KafkaAdmin {
    pub fn new(config: &KafkaConfig) -> Result<Self, BrokerError> {
        let client: AdminClient<DefaultClientContext> = client_config(config).create().map_err(map_kafka_error)?;
        Ok(Self {
            client: Arc::new(client),
            timeout: config.admin_timeout(),
        })
    }
}

impl TopicAdmin for KafkaAdmin {
    fn list_topics(&self) -> BrokerFuture<'_, Vec<String>> {
        Box::pin(async move {
            let client = Arc::clone(&self.client);
            let timeout = self.timeout;

            // Metadata fetch is a blocking librdkafka call.
            let metadata = tokio::task::spawn_blocking(move || client.inner().fetch_metadata(None, timeout))
                .await
                .map_err(|e| BrokerError::Client(format!("metadata task failed: {}", e)))?
                .map_err(map_kafka_error)?;

            Ok(metadata.topics().iter().map(|t| t.name().to_string()).collect())
        })
    }

    fn create_topic<'a>(&'a self, spec: &'a TopicSpec) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            let topic = NewTopic::new(&spec.name, spec.partitions, TopicReplication::Fixed(spec.replication));
            let options = AdminOptions::new()
                .operation_timeout(Some(self.timeout))
                .request_timeout(Some(self.timeout));

            let results = tokio::time::timeout(self.timeout, self.client.create_topics([&topic], &options))
                .await
                .map_err(|_| BrokerError::Timeout(self.timeout))?
                .map_err(map_kafka_error)?;

            for result in results {
                match result {
                    Ok(name) => info!(topic = %name, partitions = spec.partitions, "Created topic"),
                    Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                        return Err(BrokerError::TopicAlreadyExists(name));
                    }
                    Err((name, code)) => {
                        return Err(map_kafka_error(KafkaError::AdminOp(code)).with_context(&name));
                    }
                }
            }
            Ok(())
        })
    }
}

impl BrokerError {
    fn with_context(self, topic: &str) -> Self {
        match self {
            BrokerError::Unavailable(msg) => BrokerError::Unavailable(format!("{}: {}", topic, msg)),
            BrokerError::Client(msg) => BrokerError::Client(format!("{}: {}", topic, msg)),
            other => other,
        }
    }
}

// ── Producer ────────────────────────────────────────────────────

pub struct KafkaPublisher {
    producer: FutureProducer,
    queue_timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig) -> Result<Self, BrokerError> {
        let producer: FutureProducer = client_config(config)
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .create()
            .map_err(map_kafka_error)?;

        Ok(Self {
            producer,
            queue_timeout: Duration::from_millis(config.message_timeout_ms),
        })
    }
}

impl LogPublisher for KafkaPublisher {
    fn publish<'a>(&'a self, topic: &'a str, key: &'a str, payload: &'a [u8]) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            let record = FutureRecord::to(topic).key(key).payload(payload);
            self.producer
                .send(record, self.queue_timeout)
                .await
                .map(|_| ())
                .map_err(|(err, _)| map_kafka_error(err))
        })
    }

    fn flush(&self, timeout: Duration) -> BrokerFuture<'_, ()> {
        Box::pin(async move {
            let producer = self.producer.clone();
            tokio::task::spawn_blocking(move || producer.flush(timeout))
                .await
                .map_err(|e| BrokerError::Client(format!("flush task failed: {}", e)))?
                .map_err(map_kafka_error)
        })
    }
}

// ── Consumer ────────────────────────────────────────────────────

/// Group consumer. Offsets are stored explicitly after a message is
/// handled and committed in the background by librdkafka.
pub struct KafkaSource {
    consumer: StreamConsumer,
}

impl KafkaSource {
    pub fn new(config: &KafkaConfig, group_id: &str) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = client_config(config)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .create()
            .map_err(map_kafka_error)?;

        Ok(Self { consumer })
    }
}

impl MessageSource for KafkaSource {
    fn subscribe<'a>(&'a self, topics: &'a [String]) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            let names: Vec<&str> = topics.iter().map(String::as_str).collect();
            self.consumer.subscribe(&names).map_err(map_kafka_error)
        })
    }

    fn recv(&self) -> BrokerFuture<'_, InboundMessage> {
        Box::pin(async move {
            let message = self.consumer.recv().await.map_err(map_kafka_error)?;
            Ok(InboundMessage {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                payload: message.payload().map(<[u8]>::to_vec),
            })
        })
    }

    fn ack<'a>(&'a self, message: &'a InboundMessage) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            let mut offsets = TopicPartitionList::new();
            offsets
                .add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
                .map_err(map_kafka_error)?;
            self.consumer.store_offsets(&offsets).map_err(map_kafka_error)
        })
    }

    fn close(&self) -> BrokerFuture<'_, ()> {
        Box::pin(async move {
            // Nothing stored yet is reported as an error; there is nothing to lose.
            if let Err(e) = self.consumer.commit_consumer_state(CommitMode::Sync) {
                debug!(error = %e, "Final commit skipped");
            }
            self.consumer.unsubscribe();
            Ok(())
        })
    }
}
