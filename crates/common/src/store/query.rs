//! Read side of the store: filtered listing, advanced search, aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{Postgres, QueryBuilder};

use super::{PgLogStore, StoreError, StoredLog};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 1000;

const SELECT_LOGS: &str = "SELECT id, timestamp, service, level, message, host, metadata FROM logs WHERE 1=1";
const COUNT_LOGS: &str = "SELECT COUNT(*) FROM logs WHERE 1=1";

/// Levels counted as errors in [`LogStats::top_errors`].
const ERROR_LEVELS: [&str; 4] = ["error", "critical", "alert", "emergency"];

// ── Paging and sorting ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    /// Clamp caller input: page at least 1, limit in `1..=1000`, default 50.
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total_count: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: Page, total_count: i64) -> Self {
        Self {
            page: page.page,
            limit: page.limit,
            total_count,
            total_pages: (total_count + page.limit - 1) / page.limit,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortColumn {
    #[default]
    Timestamp,
    Service,
    Level,
    Id,
}

impl SortColumn {
    /// Unknown columns fall back to `timestamp`.
    pub fn parse(s: &str) -> Self {
        match s {
            "service" => Self::Service,
            "level" => Self::Level,
            "id" => Self::Id,
            _ => Self::Timestamp,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Service => "service",
            Self::Level => "level",
            Self::Id => "id",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

// ── Filters ─────────────────────────────────────────────────────

/// Simple listing filter, one optional value per attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    pub service: Option<String>,
    pub level: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Substring of message or metadata, or full-text match on message.
    pub search: Option<String>,
    pub sort: SortColumn,
    pub order: SortOrder,
    pub page: Page,
}

impl LogFilter {
    fn push_conditions(&self, qb: &mut QueryBuilder<'static, Postgres>) {
        if let Some(service) = &self.service {
            qb.push(" AND service = ").push_bind(service.clone());
        }
        if let Some(level) = &self.level {
            qb.push(" AND level = ").push_bind(level.clone());
        }
        if let Some(start) = self.start {
            qb.push(" AND timestamp >= ").push_bind(start);
        }
        if let Some(end) = self.end {
            qb.push(" AND timestamp <= ").push_bind(end);
        }
        if let Some(search) = &self.search {
            let pattern = format!("%{}%", search);
            qb.push(" AND (message ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR to_tsvector('english', message) @@ plainto_tsquery('english', ")
                .push_bind(search.clone())
                .push(") OR metadata::text ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    pub fn select_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(SELECT_LOGS);
        self.push_conditions(&mut qb);
        qb.push(" ORDER BY ")
            .push(self.sort.as_sql())
            .push(" ")
            .push(self.order.as_sql())
            .push(" LIMIT ")
            .push_bind(self.page.limit)
            .push(" OFFSET ")
            .push_bind(self.page.offset());
        qb
    }

    pub fn count_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(COUNT_LOGS);
        self.push_conditions(&mut qb);
        qb
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Multi-valued search, as posted to `/api/logs/search`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdvancedSearch {
    /// Full-text query against the message.
    pub query: Option<String>,
    pub services: Vec<String>,
    pub levels: Vec<String>,
    pub time_range: TimeRange,
    /// Exact matches on top-level metadata keys, compared as text.
    pub metadata: Map<String, Value>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl AdvancedSearch {
    pub fn page(&self) -> Page {
        Page::new(self.page, self.limit)
    }

    fn push_conditions(&self, qb: &mut QueryBuilder<'static, Postgres>) {
        if let Some(query) = self.query.as_ref().filter(|q| !q.is_empty()) {
            qb.push(" AND to_tsvector('english', message) @@ plainto_tsquery('english', ")
                .push_bind(query.clone())
                .push(")");
        }
        if !self.services.is_empty() {
            qb.push(" AND service = ANY(").push_bind(self.services.clone()).push(")");
        }
        if !self.levels.is_empty() {
            qb.push(" AND level = ANY(").push_bind(self.levels.clone()).push(")");
        }
        if let Some(start) = self.time_range.start {
            qb.push(" AND timestamp >= ").push_bind(start);
        }
        if let Some(end) = self.time_range.end {
            qb.push(" AND timestamp <= ").push_bind(end);
        }
        for (key, value) in &self.metadata {
            qb.push(" AND metadata->>")
                .push_bind(key.clone())
                .push(" = ")
                .push_bind(metadata_text(value));
        }
    }

    pub fn select_query(&self) -> QueryBuilder<'static, Postgres> {
        let page = self.page();
        let mut qb = QueryBuilder::new(SELECT_LOGS);
        self.push_conditions(&mut qb);
        qb.push(" ORDER BY timestamp DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset());
        qb
    }

    pub fn count_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(COUNT_LOGS);
        self.push_conditions(&mut qb);
        qb
    }
}

/// How `metadata->>key` renders a JSON value.
fn metadata_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Aggregates ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatsWindow {
    Hour,
    SixHours,
    #[default]
    Day,
    Week,
    Month,
}

impl StatsWindow {
    /// Unknown windows fall back to 24 hours.
    pub fn parse(s: &str) -> Self {
        match s {
            "1h" => Self::Hour,
            "6h" => Self::SixHours,
            "7d" => Self::Week,
            "30d" => Self::Month,
            _ => Self::Day,
        }
    }

    pub fn interval(&self) -> &'static str {
        match self {
            Self::Hour => "1 hour",
            Self::SixHours => "6 hours",
            Self::Day => "1 day",
            Self::Week => "7 days",
            Self::Month => "30 days",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Hour => "1h",
            Self::SixHours => "6h",
            Self::Day => "24h",
            Self::Week => "7d",
            Self::Month => "30d",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ServiceCount {
    pub service: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct LevelCount {
    pub level: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct HourCount {
    pub hour: DateTime<Utc>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct MessageCount {
    pub message: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub by_service: Vec<ServiceCount>,
    pub by_level: Vec<LevelCount>,
    pub by_hour: Vec<HourCount>,
    pub top_errors: Vec<MessageCount>,
    pub time_range: String,
}

/// Per service and level activity over the last day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ServiceLevelActivity {
    pub service: String,
    pub level: String,
    pub count: i64,
    pub oldest: DateTime<Utc>,
    pub newest: DateTime<Utc>,
}

// ── Execution ───────────────────────────────────────────────────

impl PgLogStore {
    pub async fn list(&self, filter: &LogFilter) -> Result<Paged<StoredLog>, StoreError> {
        let mut select = filter.select_query();
        let mut count = filter.count_query();

        let (data, total) = tokio::try_join!(
            select.build_query_as::<StoredLog>().fetch_all(self.pool()),
            count.build_query_scalar::<i64>().fetch_one(self.pool()),
        )?;

        Ok(Paged { data, pagination: Pagination::new(filter.page, total) })
    }

    pub async fn fetch(&self, id: i32) -> Result<Option<StoredLog>, StoreError> {
        let row = sqlx::query_as::<_, StoredLog>(
            "SELECT id, timestamp, service, level, message, host, metadata FROM logs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn search(&self, search: &AdvancedSearch) -> Result<Paged<StoredLog>, StoreError> {
        let mut select = search.select_query();
        let mut count = search.count_query();

        let (data, total) = tokio::try_join!(
            select.build_query_as::<StoredLog>().fetch_all(self.pool()),
            count.build_query_scalar::<i64>().fetch_one(self.pool()),
        )?;

        Ok(Paged { data, pagination: Pagination::new(search.page(), total) })
    }

    pub async fn stats(&self, window: StatsWindow) -> Result<LogStats, StoreError> {
        let interval = window.interval();

        let by_service = sqlx::query_as::<_, ServiceCount>(
            "SELECT service, COUNT(*) AS count FROM logs \
             WHERE timestamp > NOW() - $1::interval GROUP BY service ORDER BY count DESC",
        )
        .bind(interval)
        .fetch_all(self.pool());

        let by_level = sqlx::query_as::<_, LevelCount>(
            "SELECT level, COUNT(*) AS count FROM logs \
             WHERE timestamp > NOW() - $1::interval GROUP BY level ORDER BY count DESC",
        )
        .bind(interval)
        .fetch_all(self.pool());

        let by_hour = sqlx::query_as::<_, HourCount>(
            "SELECT date_trunc('hour', timestamp) AS hour, COUNT(*) AS count FROM logs \
             WHERE timestamp > NOW() - $1::interval GROUP BY hour ORDER BY hour",
        )
        .bind(interval)
        .fetch_all(self.pool());

        let top_errors = sqlx::query_as::<_, MessageCount>(
            "SELECT message, COUNT(*) AS count FROM logs \
             WHERE level = ANY($1) AND timestamp > NOW() - $2::interval \
             GROUP BY message ORDER BY count DESC LIMIT 10",
        )
        .bind(&ERROR_LEVELS[..])
        .bind(interval)
        .fetch_all(self.pool());

        let (by_service, by_level, by_hour, top_errors) = tokio::try_join!(by_service, by_level, by_hour, top_errors)?;

        Ok(LogStats {
            by_service,
            by_level,
            by_hour,
            top_errors,
            time_range: window.label().to_string(),
        })
    }

    pub async fn distinct_services(&self) -> Result<Vec<String>, StoreError> {
        Ok(sqlx::query_scalar::<_, String>("SELECT DISTINCT service FROM logs ORDER BY service")
            .fetch_all(self.pool())
            .await?)
    }

    pub async fn distinct_levels(&self) -> Result<Vec<String>, StoreError> {
        Ok(sqlx::query_scalar::<_, String>("SELECT DISTINCT level FROM logs ORDER BY level")
            .fetch_all(self.pool())
            .await?)
    }

    pub async fn recent_activity(&self) -> Result<Vec<ServiceLevelActivity>, StoreError> {
        Ok(sqlx::query_as::<_, ServiceLevelActivity>(
            "SELECT service, level, COUNT(*) AS count, MIN(timestamp) AS oldest, MAX(timestamp) AS newest \
             FROM logs WHERE timestamp > NOW() - INTERVAL '24 hours' \
             GROUP BY service, level ORDER BY service, level",
        )
        .fetch_all(self.pool())
        .await?)
    }
}
