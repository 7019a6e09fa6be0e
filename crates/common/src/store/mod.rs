//! Durable log storage.
//!
//! Records land in a `logs` table range-partitioned by calendar month.
//! [`PgLogStore`] is the Postgres implementation, [`MemoryLogStore`] an
//! in-memory stand-in that enforces the same partition rule.

pub mod memory;
pub mod partition;
pub mod postgres;
pub mod query;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::record::LogRecord;

pub use memory::MemoryLogStore;
pub use partition::MonthPartition;
pub use postgres::PgLogStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No monthly partition covers the record's timestamp.
    #[error("No partition covers timestamp {0}")]
    MissingPartition(DateTime<Utc>),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Query(#[from] sqlx::Error),
}

/// Write side of the store, as the ingest consumer sees it.
pub trait LogSink: Send + Sync {
    /// Persist one record, returning its assigned id.
    fn insert<'a>(&'a self, record: &'a LogRecord) -> BoxFuture<'a, Result<i32, StoreError>>;
}

/// Partition provisioning, run at startup and by the maintenance task.
pub trait PartitionManager: Send + Sync {
    /// Ensure partitions exist for the month containing `from` and
    /// `months_ahead` months after it. Returns the window that was ensured.
    fn provision(&self, from: DateTime<Utc>, months_ahead: u32) -> BoxFuture<'_, Result<Vec<MonthPartition>, StoreError>>;
}

/// A persisted row.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StoredLog {
    pub id: i32,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub level: String,
    pub message: String,
    pub host: Option<String>,
    pub metadata: Option<Value>,
}
