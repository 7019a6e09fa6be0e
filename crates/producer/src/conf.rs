use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use spunkless_common::retry::RetryPolicy;
use spunkless_common::settings::{self, KafkaConfig, LoggingConfig, RetryConfig};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProducerConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub request_timeout_secs: u64,
    /// Largest accepted submission body.
    pub body_limit_bytes: usize,
    /// Bound on the producer flush at shutdown.
    pub flush_timeout_secs: u64,
}

impl ProducerConfig {
    /// Load from `producer.toml` and `PRODUCER_*` environment variables.
    pub fn load() -> Result<Self> {
        settings::load_layered("producer", "PRODUCER")
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_address()?;
        if self.server.request_timeout_secs == 0 {
            anyhow::bail!("server.request_timeout_secs must be positive");
        }
        self.kafka.validate()?;
        self.retry.validate()?;

        // A delivery the client is still chasing would outlive the attempt
        // that gave up on it and land as a duplicate.
        if self.kafka.message_timeout_ms > self.retry.attempt_timeout_ms {
            anyhow::bail!(
                "kafka.message_timeout_ms ({}) exceeds retry.attempt_timeout_ms ({})",
                self.kafka.message_timeout_ms,
                self.retry.attempt_timeout_ms
            );
        }
        let worst_case = RetryPolicy::from_config(&self.retry).worst_case(self.retry.attempt_timeout());
        if worst_case >= self.request_timeout() {
            anyhow::bail!(
                "retries may take {:?}, which does not fit in server.request_timeout_secs ({}s)",
                worst_case,
                self.server.request_timeout_secs
            );
        }
        Ok(())
    }

    pub fn bind_address(&self) -> Result<SocketAddr> {
        self.server.bind_address.parse().context("Invalid bind_address")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.server.flush_timeout_secs)
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "0.0.0.0:8000".to_string(),
                request_timeout_secs: 30,
                body_limit_bytes: 1024 * 1024,
                flush_timeout_secs: 10,
            },
            kafka: KafkaConfig {
                client_id: "spunkless-producer".to_string(),
                ..KafkaConfig::default()
            },
            retry: RetryConfig::default(),
            logging: LoggingConfig::for_target("producer"),
        }
    }
}
