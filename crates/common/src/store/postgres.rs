//! Postgres-backed log store.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::{debug, info};

use super::{LogSink, MonthPartition, PartitionManager, StoreError};
use crate::record::LogRecord;
use crate::settings::PostgresConfig;

const CREATE_LOGS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS logs (
        id SERIAL,
        timestamp TIMESTAMPTZ NOT NULL,
        service VARCHAR(255) NOT NULL,
        level VARCHAR(50) NOT NULL,
        message TEXT NOT NULL,
        host VARCHAR(255),
        metadata JSONB,
        PRIMARY KEY (id, timestamp)
    ) PARTITION BY RANGE (timestamp)
"#;

const CREATE_INDEXES: [(&str, &str); 3] = [
    (
        "logs_metadata_gin_idx",
        "CREATE INDEX IF NOT EXISTS logs_metadata_gin_idx ON logs USING GIN (metadata)",
    ),
    (
        "logs_message_idx",
        "CREATE INDEX IF NOT EXISTS logs_message_idx ON logs USING GIN (to_tsvector('english', message))",
    ),
    (
        "logs_service_level_idx",
        "CREATE INDEX IF NOT EXISTS logs_service_level_idx ON logs (service, level)",
    ),
];

const INSERT_LOG: &str = r#"
    INSERT INTO logs (timestamp, service, level, message, host, metadata)
    VALUES ($1, $2, $3, $4, $5, $6)
    RETURNING id
"#;

impl PostgresConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }
}

#[derive(Clone)]
pub struct PgLogStore {
    pool: PgPool,
}

impl PgLogStore {
    /// Open a connection pool. Does not touch the schema.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(config.connect_options())
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!(host = %config.host, database = %config.database, "Connected to Postgres");
        Ok(Self { pool })
    }

    /// Pool that only connects on first use.
    pub fn connect_lazy(config: &PostgresConfig) -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_lazy_with(config.connect_options());
        Self { pool }
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the partitioned table, its indexes, and partitions for the
    /// current month plus `months_ahead`. Idempotent.
    pub async fn initialize(&self, months_ahead: u32) -> Result<Vec<MonthPartition>, StoreError> {
        sqlx::query(CREATE_LOGS_TABLE).execute(&self.pool).await?;

        for (name, ddl) in CREATE_INDEXES {
            sqlx::query(ddl).execute(&self.pool).await?;
            debug!(index = name, "Ensured index");
        }

        let partitions = self.ensure_partitions(Utc::now(), months_ahead).await?;
        info!(
            partitions = ?partitions.iter().map(|p| p.table_name()).collect::<Vec<_>>(),
            "Log store initialized"
        );
        Ok(partitions)
    }

    pub async fn ensure_partitions(
        &self,
        from: DateTime<Utc>,
        months_ahead: u32,
    ) -> Result<Vec<MonthPartition>, StoreError> {
        let window = MonthPartition::window(from, months_ahead);
        for partition in &window {
            sqlx::query(&partition.create_sql()).execute(&self.pool).await?;
            debug!(partition = %partition.table_name(), "Ensured partition");
        }
        Ok(window)
    }

    pub async fn insert_record(&self, record: &LogRecord) -> Result<i32, StoreError> {
        sqlx::query_scalar::<_, i32>(INSERT_LOG)
            .bind(record.timestamp)
            .bind(&record.service)
            .bind(&record.level)
            .bind(&record.message)
            .bind(record.host.as_deref())
            .bind(Json(&record.metadata))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify_insert_error(e, record.timestamp))
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Postgres pool closed");
    }
}

impl LogSink for PgLogStore {
    fn insert<'a>(&'a self, record: &'a LogRecord) -> BoxFuture<'a, Result<i32, StoreError>> {
        Box::pin(self.insert_record(record))
    }
}

impl PartitionManager for PgLogStore {
    fn provision(&self, from: DateTime<Utc>, months_ahead: u32) -> BoxFuture<'_, Result<Vec<MonthPartition>, StoreError>> {
        Box::pin(self.ensure_partitions(from, months_ahead))
    }
}

/// SQLSTATE 23514 with "no partition" in the message is Postgres refusing a
/// row no partition accepts; other class 23 codes are plain constraint failures.
fn classify_insert_error(err: sqlx::Error, timestamp: DateTime<Utc>) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
        if code == "23514" && db.message().contains("no partition") {
            return StoreError::MissingPartition(timestamp);
        }
        if code.starts_with("23") {
            return StoreError::Constraint(db.message().to_string());
        }
    }

    if matches!(err, sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)) {
        return StoreError::Connection(err.to_string());
    }

    StoreError::Query(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_classify_as_connection() {
        let now = Utc::now();
        assert!(matches!(classify_insert_error(sqlx::Error::PoolTimedOut, now), StoreError::Connection(_)));
        assert!(matches!(classify_insert_error(sqlx::Error::PoolClosed, now), StoreError::Connection(_)));
        assert!(matches!(classify_insert_error(sqlx::Error::RowNotFound, now), StoreError::Query(_)));
    }

    #[test]
    fn schema_declares_expected_indexes() {
        let names: Vec<&str> = CREATE_INDEXES.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, ["logs_metadata_gin_idx", "logs_message_idx", "logs_service_level_idx"]);
        assert!(CREATE_LOGS_TABLE.contains("PARTITION BY RANGE (timestamp)"));
        assert!(CREATE_LOGS_TABLE.contains("PRIMARY KEY (id, timestamp)"));
    }

    #[test]
    fn connect_options_follow_config() {
        let config = PostgresConfig { host: "db.internal".into(), port: 6543, ..Default::default() };
        let options = config.connect_options();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("logs"));
    }
}
