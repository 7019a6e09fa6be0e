//! Monthly range partitions of the `logs` table.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};

/// One calendar month, `[first day 00:00 UTC, first day of next month)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthPartition {
    year: i32,
    month: u32,
}

impl MonthPartition {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// The partition a timestamp falls into.
    pub fn containing(timestamp: DateTime<Utc>) -> Self {
        Self {
            year: timestamp.year(),
            month: timestamp.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    /// Inclusive lower bound.
    pub fn start(self) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or(NaiveDate::MIN)
            .and_time(NaiveTime::MIN)
            .and_utc()
    }

    /// Exclusive upper bound.
    pub fn end(self) -> DateTime<Utc> {
        self.next().start()
    }

    pub fn contains(self, timestamp: DateTime<Utc>) -> bool {
        self.start() <= timestamp && timestamp < self.end()
    }

    /// `logs_YYYY_MM`
    pub fn table_name(self) -> String {
        format!("logs_{:04}_{:02}", self.year, self.month)
    }

    pub fn create_sql(self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} PARTITION OF logs FOR VALUES FROM ('{}') TO ('{}')",
            self.table_name(),
            self.start().to_rfc3339(),
            self.end().to_rfc3339(),
        )
    }

    /// The month containing `from` plus `months_ahead` following months.
    pub fn window(from: DateTime<Utc>, months_ahead: u32) -> Vec<Self> {
        let mut current = Self::containing(from);
        let mut months = Vec::with_capacity(months_ahead as usize + 1);
        months.push(current);
        for _ in 0..months_ahead {
            current = current.next();
            months.push(current);
        }
        months
    }
}

impl fmt::Display for MonthPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}
