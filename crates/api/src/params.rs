//! Query-string parameters and their conversion into store filters.
//!
//! Parsing is lenient the way browsers' query strings need: empty values
//! count as absent, unparseable page numbers fall back to defaults. Only
//! dates are strict, since a silently dropped bound changes the result.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use spunkless_common::store::query::{LogFilter, Page, SortColumn, SortOrder, StatsWindow};

use crate::error::{ApiError, ApiResult};

/// `GET /api/logs`
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListParams {
    pub service: Option<String>,
    pub level: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

impl ListParams {
    pub fn into_filter(self) -> ApiResult<LogFilter> {
        Ok(LogFilter {
            start: parse_date("startDate", present(self.start_date))?,
            end: parse_date("endDate", present(self.end_date))?,
            service: present(self.service),
            level: present(self.level),
            search: present(self.search),
            sort: present(self.sort).map(|s| SortColumn::parse(&s)).unwrap_or_default(),
            order: present(self.order).map(|o| SortOrder::parse(&o)).unwrap_or_default(),
            page: Page::new(parse_number(self.page), parse_number(self.limit)),
        })
    }
}

/// `GET /api/stats`
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatsParams {
    pub time_range: Option<String>,
}

impl StatsParams {
    pub fn window(&self) -> StatsWindow {
        self.time_range.as_deref().map(StatsWindow::parse).unwrap_or_default()
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_number(value: Option<String>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

/// RFC 3339 timestamps, or bare `YYYY-MM-DD` dates taken as UTC midnight.
fn parse_date(name: &str, value: Option<String>) -> ApiResult<Option<DateTime<Utc>>> {
    let Some(raw) = value else { return Ok(None) };

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw.trim()) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Some(dt.and_utc()))
        .ok_or_else(|| ApiError::InvalidRequest(format!("Invalid {}: {}", name, raw)))
}
