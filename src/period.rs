//! Reporting period: one calendar month as a half-open interval

use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::fmt;

use crate::error::ReportError;

/// Half-open interval `[start, end)` covering exactly one calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportPeriod {
    pub fn for_month(year: i32, month: u32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| ReportError::Config(format!("invalid month: {}-{:02}", year, month)))?;
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .ok_or_else(|| anyhow!("month after {}-{:02} is out of range", year, month))?;
        Ok(Self { start, end })
    }

    /// The calendar month before the one containing `today`
    pub fn previous_month(today: NaiveDate) -> Result<Self> {
        if today.month() == 1 {
            Self::for_month(today.year() - 1, 12)
        } else {
            Self::for_month(today.year(), today.month() - 1)
        }
    }

    /// Parse `YYYY-MM` (also accepts `MM/YYYY`)
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let parsed = if let Some((year, month)) = value.split_once('-') {
            year.parse::<i32>().ok().zip(month.parse::<u32>().ok())
        } else if let Some((month, year)) = value.split_once('/') {
            year.parse::<i32>().ok().zip(month.parse::<u32>().ok())
        } else {
            None
        };

        let (year, month) = parsed.ok_or_else(|| {
            ReportError::Config(format!("invalid month '{}', expected YYYY-MM", value))
        })?;
        Self::for_month(year, month)
    }

    pub fn year(&self) -> i32 {
        self.start.year()
    }

    pub fn month(&self) -> u32 {
        self.start.month()
    }

    /// Last day included in the period
    pub fn last_day(&self) -> NaiveDate {
        self.end.pred_opt().unwrap_or(self.end)
    }

    pub fn start_timestamp(&self) -> i64 {
        midnight_utc(self.start)
    }

    /// First second after the period
    pub fn end_timestamp(&self) -> i64 {
        midnight_utc(self.end)
    }

    pub fn contains_timestamp(&self, seconds: i64) -> bool {
        seconds >= self.start_timestamp() && seconds < self.end_timestamp()
    }

    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        self.contains_timestamp(instant.timestamp())
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year(), self.month())
    }
}

fn midnight_utc(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}
