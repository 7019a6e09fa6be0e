//! In-memory log store for tests.
//!
//! Enforces the same partition rule as Postgres: a record whose month has
//! not been provisioned is rejected with [`StoreError::MissingPartition`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;

use super::query::{LogFilter, ServiceLevelActivity, SortColumn, SortOrder};
use super::{LogSink, MonthPartition, PartitionManager, StoreError, StoredLog};
use crate::record::LogRecord;

#[derive(Default)]
struct Inner {
    rows: Vec<StoredLog>,
    next_id: i32,
    partitions: BTreeSet<MonthPartition>,
    insert_failures: u32,
}

#[derive(Default)]
pub struct MemoryLogStore {
    inner: Mutex<Inner>,
}

impl MemoryLogStore {
    /// Empty store with no partitions; every insert fails until provisioned.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with partitions for the current month and `months_ahead` more.
    pub fn provisioned(months_ahead: u32) -> Self {
        let store = Self::new();
        store.inner.lock().partitions.extend(MonthPartition::window(Utc::now(), months_ahead));
        store
    }

    /// Make the next `count` inserts fail as a lost connection.
    pub fn fail_inserts(&self, count: u32) {
        self.inner.lock().insert_failures = count;
    }

    pub fn partitions(&self) -> Vec<MonthPartition> {
        self.inner.lock().partitions.iter().copied().collect()
    }

    /// All rows in insertion order.
    pub fn rows(&self) -> Vec<StoredLog> {
        self.inner.lock().rows.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fetch(&self, id: i32) -> Option<StoredLog> {
        self.inner.lock().rows.iter().find(|r| r.id == id).cloned()
    }

    /// Apply a listing filter. Search is a case-insensitive substring match on
    /// message and metadata text; paging is ignored.
    pub fn list(&self, filter: &LogFilter) -> Vec<StoredLog> {
        let mut rows: Vec<StoredLog> = self
            .inner
            .lock()
            .rows
            .iter()
            .filter(|row| row_matches(row, filter))
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            let ordering = match filter.sort {
                SortColumn::Timestamp => a.timestamp.cmp(&b.timestamp),
                SortColumn::Service => a.service.cmp(&b.service),
                SortColumn::Level => a.level.cmp(&b.level),
                SortColumn::Id => a.id.cmp(&b.id),
            };
            match filter.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        rows
    }

    /// Rows newer than `since`, grouped by service and level.
    pub fn recent_activity(&self, since: DateTime<Utc>) -> Vec<ServiceLevelActivity> {
        let mut groups: BTreeMap<(String, String), ServiceLevelActivity> = BTreeMap::new();
        for row in self.inner.lock().rows.iter().filter(|r| r.timestamp > since) {
            groups
                .entry((row.service.clone(), row.level.clone()))
                .and_modify(|g| {
                    g.count += 1;
                    g.oldest = g.oldest.min(row.timestamp);
                    g.newest = g.newest.max(row.timestamp);
                })
                .or_insert_with(|| ServiceLevelActivity {
                    service: row.service.clone(),
                    level: row.level.clone(),
                    count: 1,
                    oldest: row.timestamp,
                    newest: row.timestamp,
                });
        }
        groups.into_values().collect()
    }

    fn insert_now(&self, record: &LogRecord) -> Result<i32, StoreError> {
        let mut state = self.inner.lock();

        if state.insert_failures > 0 {
            state.insert_failures -= 1;
            return Err(StoreError::Connection("injected insert failure".to_string()));
        }
        if !state.partitions.contains(&MonthPartition::containing(record.timestamp)) {
            return Err(StoreError::MissingPartition(record.timestamp));
        }

        state.next_id += 1;
        let id = state.next_id;
        state.rows.push(StoredLog {
            id,
            timestamp: record.timestamp,
            service: record.service.clone(),
            level: record.level.clone(),
            message: record.message.clone(),
            host: record.host.clone(),
            metadata: Some(record.metadata.clone().into_value()),
        });
        Ok(id)
    }
}

fn row_matches(row: &StoredLog, filter: &LogFilter) -> bool {
    if filter.service.as_ref().is_some_and(|s| *s != row.service) {
        return false;
    }
    if filter.level.as_ref().is_some_and(|l| *l != row.level) {
        return false;
    }
    if filter.start.is_some_and(|start| row.timestamp < start) {
        return false;
    }
    if filter.end.is_some_and(|end| row.timestamp > end) {
        return false;
    }
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        let metadata = row.metadata.as_ref().map(|m| m.to_string()).unwrap_or_default();
        if !row.message.to_lowercase().contains(&needle) && !metadata.to_lowercase().contains(&needle) {
            return false;
        }
    }
    true
}

impl LogSink for MemoryLogStore {
    fn insert<'a>(&'a self, record: &'a LogRecord) -> BoxFuture<'a, Result<i32, StoreError>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.insert_now(record)
        })
    }
}

impl PartitionManager for MemoryLogStore {
    fn provision(&self, from: DateTime<Utc>, months_ahead: u32) -> BoxFuture<'_, Result<Vec<MonthPartition>, StoreError>> {
        Box::pin(async move {
            let window = MonthPartition::window(from, months_ahead);
            self.inner.lock().partitions.extend(window.iter().copied());
            Ok(window)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Metadata;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn record(service: &str, level: &str, message: &str, timestamp: DateTime<Utc>) -> LogRecord {
        let mut metadata = Metadata::new();
        metadata.insert("requestId", json!(format!("req-{}", message.len())));
        LogRecord {
            timestamp,
            service: service.to_string(),
            level: level.to_string(),
            message: message.to_string(),
            host: None,
            metadata,
        }
    }

    #[tokio::test]
    async fn insert_requires_provisioned_month() {
        let store = MemoryLogStore::new();
        let when = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();

        let err = store.insert(&record("web", "info", "hello", when)).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingPartition(ts) if ts == when));

        store.provision(when, 0).await.unwrap();
        assert_eq!(store.insert(&record("web", "info", "hello", when)).await.unwrap(), 1);
        assert_eq!(store.partitions(), vec![MonthPartition::new(2026, 10).unwrap()]);
    }

    #[tokio::test]
    async fn ids_are_sequential_and_fetchable() {
        let store = MemoryLogStore::provisioned(0);
        let now = Utc::now();
        let first = store.insert(&record("web", "info", "a", now)).await.unwrap();
        let second = store.insert(&record("web", "info", "b", now)).await.unwrap();

        assert_eq!((first, second), (1, 2));
        assert_eq!(store.fetch(2).unwrap().message, "b");
        assert!(store.fetch(3).is_none());
    }

    #[tokio::test]
    async fn injected_failures_do_not_consume_ids() {
        let store = MemoryLogStore::provisioned(0);
        store.fail_inserts(1);
        assert!(matches!(
            store.insert(&record("web", "info", "a", Utc::now())).await,
            Err(StoreError::Connection(_))
        ));
        assert_eq!(store.insert(&record("web", "info", "a", Utc::now())).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_filters_and_orders() {
        let store = MemoryLogStore::provisioned(0);
        let now = Utc::now();
        store.insert(&record("auth-service", "error", "login failed", now - Duration::seconds(2))).await.unwrap();
        store.insert(&record("auth-service", "info", "login ok", now - Duration::seconds(1))).await.unwrap();
        store.insert(&record("billing", "error", "card declined", now)).await.unwrap();

        let errors = store.list(&LogFilter { level: Some("error".into()), ..Default::default() });
        assert_eq!(errors.iter().map(|r| r.service.as_str()).collect::<Vec<_>>(), ["billing", "auth-service"]);

        let auth_errors = store.list(&LogFilter {
            service: Some("auth-service".into()),
            level: Some("error".into()),
            ..Default::default()
        });
        assert_eq!(auth_errors.len(), 1);

        let search = store.list(&LogFilter { search: Some("LOGIN".into()), order: SortOrder::Asc, ..Default::default() });
        assert_eq!(search.iter().map(|r| r.id).collect::<Vec<_>>(), [1, 2]);
    }

    #[tokio::test]
    async fn recent_activity_groups_by_service_and_level() {
        let store = MemoryLogStore::provisioned(0);
        let now = Utc::now();
        store.provision(now - Duration::hours(30), 1).await.unwrap();
        store.insert(&record("web", "info", "a", now - Duration::hours(30))).await.unwrap();
        store.insert(&record("web", "info", "b", now - Duration::minutes(5))).await.unwrap();
        store.insert(&record("web", "info", "c", now)).await.unwrap();
        store.insert(&record("auth-service", "error", "d", now)).await.unwrap();

        let activity = store.recent_activity(now - Duration::hours(24));
        assert_eq!(activity.len(), 2);
        assert_eq!((activity[0].service.as_str(), activity[0].count), ("auth-service", 1));
        assert_eq!((activity[1].service.as_str(), activity[1].count), ("web", 2));
        assert_eq!(activity[1].oldest, now - Duration::minutes(5));
        assert_eq!(activity[1].newest, now);
    }
}
