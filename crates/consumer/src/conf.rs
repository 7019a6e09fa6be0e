use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use spunkless_common::settings::{self, KafkaConfig, LoggingConfig, PostgresConfig};
use spunkless_common::topic::LOG_TOPIC_PREFIX;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub postgres: PostgresConfig,
    pub ingest: IngestConfig,
    pub partitions: PartitionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    pub group_id: String,
    /// Topics carrying this prefix are subscribed automatically.
    pub topic_prefix: String,
    pub discovery_interval_secs: u64,
    /// Bound on one topic listing during discovery.
    pub scan_timeout_secs: u64,
    /// Dropped payloads are republished here when set.
    #[serde(default)]
    pub dead_letter_topic: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PartitionConfig {
    pub maintenance_enabled: bool,
    pub maintenance_interval_secs: u64,
    /// Months provisioned beyond the current one.
    pub months_ahead: u32,
}

impl ConsumerConfig {
    /// Load from `consumer.toml` and `CONSUMER_*` environment variables.
    pub fn load() -> Result<Self> {
        settings::load_layered("consumer", "CONSUMER")
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_address()?;
        if self.server.request_timeout_secs == 0 {
            anyhow::bail!("server.request_timeout_secs must be positive");
        }
        self.kafka.validate()?;
        self.postgres.validate()?;

        let ingest = &self.ingest;
        if ingest.group_id.trim().is_empty() {
            anyhow::bail!("ingest.group_id must not be empty");
        }
        // Producers always publish under LOG_TOPIC_PREFIX.
        if ingest.topic_prefix != LOG_TOPIC_PREFIX {
            anyhow::bail!(
                "ingest.topic_prefix '{}' does not match the producer's topic prefix '{}'",
                ingest.topic_prefix,
                LOG_TOPIC_PREFIX
            );
        }
        if ingest.discovery_interval_secs == 0 || ingest.scan_timeout_secs == 0 {
            anyhow::bail!("ingest.discovery_interval_secs and ingest.scan_timeout_secs must be positive");
        }
        if let Some(topic) = &ingest.dead_letter_topic {
            if topic.trim().is_empty() {
                anyhow::bail!("ingest.dead_letter_topic must not be empty when set");
            }
            // Otherwise discovery would subscribe to it and re-ingest the drops.
            if topic.starts_with(&ingest.topic_prefix) {
                anyhow::bail!(
                    "ingest.dead_letter_topic '{}' must not start with the log topic prefix '{}'",
                    topic,
                    ingest.topic_prefix
                );
            }
        }

        if self.partitions.maintenance_enabled && self.partitions.maintenance_interval_secs == 0 {
            anyhow::bail!("partitions.maintenance_interval_secs must be positive");
        }
        Ok(())
    }

    pub fn bind_address(&self) -> Result<SocketAddr> {
        self.server.bind_address.parse().context("Invalid bind_address")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.ingest.discovery_interval_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.ingest.scan_timeout_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.partitions.maintenance_interval_secs)
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "0.0.0.0:8001".to_string(),
                request_timeout_secs: 30,
            },
            kafka: KafkaConfig {
                client_id: "spunkless-consumer".to_string(),
                ..KafkaConfig::default()
            },
            postgres: PostgresConfig::default(),
            ingest: IngestConfig {
                group_id: "logs-consumer-group".to_string(),
                topic_prefix: LOG_TOPIC_PREFIX.to_string(),
                discovery_interval_secs: 10,
                scan_timeout_secs: 5,
                dead_letter_topic: None,
            },
            partitions: PartitionConfig {
                maintenance_enabled: true,
                maintenance_interval_secs: 3600,
                months_ahead: 1,
            },
            logging: LoggingConfig::for_target("consumer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ConsumerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.bind_address().unwrap().port(), 8001);
        assert_eq!(config.discovery_interval(), Duration::from_secs(10));
        assert_eq!(config.ingest.group_id, "logs-consumer-group");
    }

    #[test]
    fn dead_letter_topic_must_not_look_like_a_log_topic() {
        let mut config = ConsumerConfig::default();
        config.ingest.dead_letter_topic = Some("logs-dead-letter".to_string());
        assert!(config.validate().is_err());

        config.ingest.dead_letter_topic = Some("dead-letter-logs".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn topic_prefix_must_match_producer() {
        let mut config = ConsumerConfig::default();
        config.ingest.topic_prefix = "applogs-".to_string();
        assert!(config.validate().is_err());

        config.ingest.topic_prefix = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_discovery_interval() {
        let mut config = ConsumerConfig::default();
        config.ingest.discovery_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn disabled_maintenance_ignores_interval() {
        let mut config = ConsumerConfig::default();
        config.partitions.maintenance_enabled = false;
        config.partitions.maintenance_interval_secs = 0;
        config.validate().unwrap();
    }
}
