//! End to end: producer gateway → broker → discovery → ingest → store.

use std::sync::Arc;
use std::time::Duration;

use consumer::conf::ConsumerConfig;
use consumer::runtime::boot::{assemble, Seams};
use consumer::runtime::serve::{spawn_workers, Running};
use consumer::state::SharedState;
use producer::conf::ProducerConfig;
use producer::state::ProducerState;
use serde_json::{json, Value};
use spunkless_common::broker::fake::FakeBroker;
use spunkless_common::store::MemoryLogStore;

struct Pipeline {
    broker: Arc<FakeBroker>,
    store: Arc<MemoryLogStore>,
    producer: ProducerState,
    consumer: SharedState,
    running: Running,
}

impl Pipeline {
    fn start() -> Self {
        let broker = Arc::new(FakeBroker::new());
        let store = Arc::new(MemoryLogStore::provisioned(1));

        let producer = ProducerState::new(ProducerConfig::default(), broker.clone(), broker.clone());

        let (consumer, workers) = assemble(
            ConsumerConfig::default(),
            Seams {
                admin: broker.clone(),
                source: broker.clone(),
                sink: store.clone(),
                partitions: store.clone(),
                activity: store.clone(),
                dead_letter_publisher: None,
            },
        );
        let running = spawn_workers(workers);

        Self { broker, store, producer, consumer, running }
    }

    async fn submit(&self, body: Value) {
        self.producer.gateway.submit(body, None).await.unwrap();
    }

    /// Wait, on paused time, until `count` rows are stored.
    async fn stored(&self, count: usize) {
        while self.store.len() < count {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn shutdown(self) -> Arc<FakeBroker> {
        self.consumer.shutdown();
        self.running.discovery.await.unwrap();
        if let Some(maintainer) = self.running.maintainer {
            maintainer.await.unwrap();
        }
        self.broker
    }
}

#[tokio::test(start_paused = true)]
async fn submitted_log_reaches_the_store() {
    let pipeline = Pipeline::start();

    pipeline
        .submit(json!({
            "service": "auth-service",
            "level": "error",
            "message": "login failed",
            "metadata": { "userId": 42 }
        }))
        .await;
    pipeline.stored(1).await;

    let row = pipeline.store.fetch(1).unwrap();
    assert_eq!(row.service, "auth-service");
    assert_eq!(row.level, "error");
    assert_eq!(row.message, "login failed");
    assert_eq!(row.metadata, Some(json!({ "userId": 42 })));
    assert_eq!(pipeline.consumer.subscribed_topics(), vec!["logs-auth-service".to_string()]);

    let broker = pipeline.shutdown().await;
    assert_eq!(broker.committed("logs-auth-service").await, 1);
    assert!(broker.is_closed().await);
}

#[tokio::test(start_paused = true)]
async fn malformed_message_does_not_block_its_neighbours() {
    let pipeline = Pipeline::start();

    pipeline.submit(json!({ "service": "web", "level": "info", "message": "first" })).await;
    pipeline.broker.push_raw("logs-web", b"{\"service\": \"web\", oops".to_vec()).await;
    pipeline.submit(json!({ "service": "web", "level": "info", "message": "second" })).await;
    pipeline.stored(2).await;

    let messages: Vec<String> = pipeline.store.rows().into_iter().map(|r| r.message).collect();
    assert_eq!(messages, ["first", "second"]);

    let metrics = pipeline.consumer.metrics.snapshot();
    assert_eq!((metrics.received, metrics.persisted, metrics.malformed), (3, 2, 1));

    let broker = pipeline.shutdown().await;
    assert_eq!(broker.committed("logs-web").await, 3);
}

#[tokio::test(start_paused = true)]
async fn late_service_is_picked_up_by_the_next_scan() {
    let pipeline = Pipeline::start();

    pipeline.submit(json!({ "service": "web", "level": "info", "message": "early" })).await;
    pipeline.stored(1).await;

    pipeline.submit(json!({ "service": "billing", "level": "warn", "message": "late" })).await;
    pipeline.stored(2).await;

    assert_eq!(
        pipeline.consumer.subscribed_topics(),
        vec!["logs-billing".to_string(), "logs-web".to_string()]
    );
    assert_eq!(pipeline.store.fetch(2).unwrap().service, "billing");

    pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn legacy_flat_payload_keeps_its_extras() {
    let pipeline = Pipeline::start();

    pipeline
        .broker
        .push_raw(
            "logs-checkout",
            serde_json::to_vec(&json!({
                "timestamp": chrono::Utc::now(),
                "service": "checkout",
                "level": "info",
                "message": "order placed",
                "host": "10.0.0.7",
                "orderId": "A-17",
                "metadata": { "orderId": "ignored", "items": 3 }
            }))
            .unwrap(),
        )
        .await;
    pipeline.stored(1).await;

    let row = pipeline.store.fetch(1).unwrap();
    assert_eq!(row.host.as_deref(), Some("10.0.0.7"));
    assert_eq!(row.metadata, Some(json!({ "orderId": "A-17", "items": 3 })));

    pipeline.shutdown().await;
}
