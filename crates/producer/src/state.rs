use std::sync::Arc;

use spunkless_common::broker::{LogPublisher, TopicAdmin};
use spunkless_common::retry::RetryPolicy;

use crate::conf::ProducerConfig;
use crate::gateway::PublishGateway;
use crate::metrics::GatewayMetrics;
use crate::resolver::TopicResolver;

pub struct ProducerState {
    pub config: ProducerConfig,
    pub gateway: PublishGateway,
    /// Kept for the shutdown flush.
    pub publisher: Arc<dyn LogPublisher>,
}

pub type SharedState = Arc<ProducerState>;

impl ProducerState {
    pub fn new(config: ProducerConfig, admin: Arc<dyn TopicAdmin>, publisher: Arc<dyn LogPublisher>) -> Self {
        let resolver = TopicResolver::new(admin, &config.kafka);
        let gateway = PublishGateway::new(
            resolver,
            Arc::clone(&publisher),
            RetryPolicy::from_config(&config.retry),
            config.retry.attempt_timeout(),
            Arc::new(GatewayMetrics::new()),
        );

        Self { config, gateway, publisher }
    }
}
