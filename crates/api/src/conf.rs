use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use spunkless_common::settings::{self, LoggingConfig, PostgresConfig};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub postgres: PostgresConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub request_timeout_secs: u64,
    pub body_limit_bytes: usize,
    pub enable_cors: bool,
    /// Allowed origins when CORS is enabled; `*` allows any.
    pub cors_origins: Vec<String>,
}

impl ApiConfig {
    /// Load from `api.toml` and `API_*` environment variables.
    pub fn load() -> Result<Self> {
        settings::load_layered("api", "API")
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_address()?;
        if self.server.request_timeout_secs == 0 {
            anyhow::bail!("server.request_timeout_secs must be positive");
        }
        self.postgres.validate()?;
        Ok(())
    }

    pub fn bind_address(&self) -> Result<SocketAddr> {
        self.server.bind_address.parse().context("Invalid bind_address")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "0.0.0.0:8002".to_string(),
                request_timeout_secs: 30,
                body_limit_bytes: 1024 * 1024,
                enable_cors: true,
                cors_origins: vec!["*".to_string()],
            },
            postgres: PostgresConfig::default(),
            logging: LoggingConfig::for_target("api"),
        }
    }
}
