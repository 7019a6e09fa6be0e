//! Configuration sections shared by every pipeline process and
//! the layered loader each process builds its own config with.
//!
//! Layers, lowest to highest precedence: compiled defaults, optional TOML
//! files, environment variables (`<PREFIX>_<SECTION>__<KEY>`).

use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Load a process configuration.
///
/// `name` picks the config file (`/etc/spunkless/<name>.toml`,
/// `config/<name>.toml`, `crates/<name>/config/<name>.toml`); `env_prefix`
/// scopes the environment overrides, e.g. `PRODUCER_KAFKA__BROKERS`.
pub fn load_layered<T>(name: &str, env_prefix: &str) -> Result<T>
where
    T: Default + Serialize + DeserializeOwned,
{
    dotenvy::dotenv().ok();

    let defaults = config::Config::try_from(&T::default()).context("Failed to serialize default configuration")?;

    let mut builder = config::Config::builder().add_source(defaults);

    for path in [
        format!("/etc/spunkless/{}", name),
        format!("config/{}", name),
        format!("crates/{}/config/{}", name, name),
    ] {
        builder = builder.add_source(config::File::with_name(&path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix(env_prefix)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("kafka.brokers")
            .with_list_parse_key("server.cors_origins")
            .try_parsing(true),
    );

    builder
        .build()
        .context("Failed to build configuration")?
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

// ── Kafka ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub client_id: String,
    /// Partitions for topics created on demand.
    pub partitions: i32,
    pub replication_factor: i32,
    /// Bound on admin operations (list, create).
    pub admin_timeout_ms: u64,
    /// How long the client keeps trying to deliver one message.
    pub message_timeout_ms: u64,
    pub session_timeout_ms: u64,
}

impl KafkaConfig {
    pub fn admin_timeout(&self) -> Duration {
        Duration::from_millis(self.admin_timeout_ms)
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.brokers.iter().all(|b| b.trim().is_empty()) {
            anyhow::bail!("kafka.brokers must name at least one broker");
        }
        if self.partitions < 1 {
            anyhow::bail!("kafka.partitions must be at least 1, got {}", self.partitions);
        }
        if self.replication_factor < 1 {
            anyhow::bail!("kafka.replication_factor must be at least 1, got {}", self.replication_factor);
        }
        if self.admin_timeout_ms == 0 || self.message_timeout_ms == 0 {
            anyhow::bail!("kafka.admin_timeout_ms and kafka.message_timeout_ms must be positive");
        }
        Ok(())
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            client_id: "spunkless".to_string(),
            partitions: 1,
            replication_factor: 1,
            admin_timeout_ms: 5_000,
            message_timeout_ms: 3_000,
            session_timeout_ms: 30_000,
        }
    }
}

// ── Postgres ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl PostgresConfig {
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() || self.database.is_empty() || self.user.is_empty() {
            anyhow::bail!("postgres.host, postgres.database and postgres.user are required");
        }
        if self.max_connections == 0 {
            anyhow::bail!("postgres.max_connections must be positive");
        }
        Ok(())
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "logs".to_string(),
            user: "postgres".to_string(),
            password: "password".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 10,
        }
    }
}

// ── Retry ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Bound on a single attempt, so every attempt gets its turn inside the
    /// caller's own deadline.
    pub attempt_timeout_ms: u64,
}

impl RetryConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.attempt_timeout_ms == 0 {
            anyhow::bail!("retry.attempt_timeout_ms must be positive");
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            anyhow::bail!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.initial_backoff_ms,
                self.max_backoff_ms
            );
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 300,
            max_backoff_ms: 30_000,
            attempt_timeout_ms: 4_000,
        }
    }
}

// ── Logging ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
}

impl LoggingConfig {
    /// Defaults for a process whose crate target is `target`.
    pub fn for_target(target: &str) -> Self {
        Self {
            level: format!("info,{}=debug", target),
            format: LogFormat::Pretty,
            output: LogOutput::Stdout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    File { path: String },
}
