use chrono::{Duration, Utc};
use futures::future::BoxFuture;
use spunkless_common::store::query::ServiceLevelActivity;
use spunkless_common::store::{MemoryLogStore, PgLogStore, StoreError};

/// Read side behind `GET /stats`: last day's rows grouped by service and level.
pub trait ActivityReport: Send + Sync {
    fn recent_activity(&self) -> BoxFuture<'_, Result<Vec<ServiceLevelActivity>, StoreError>>;
}

impl ActivityReport for PgLogStore {
    fn recent_activity(&self) -> BoxFuture<'_, Result<Vec<ServiceLevelActivity>, StoreError>> {
        Box::pin(PgLogStore::recent_activity(self))
    }
}

impl ActivityReport for MemoryLogStore {
    fn recent_activity(&self) -> BoxFuture<'_, Result<Vec<ServiceLevelActivity>, StoreError>> {
        let rows = MemoryLogStore::recent_activity(self, Utc::now() - Duration::hours(24));
        Box::pin(async move { Ok(rows) })
    }
}
