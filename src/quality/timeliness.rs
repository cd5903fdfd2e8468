//! Record age checks against a reference date

use crate::data::Cell;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelinessIssue {
    LagExceeded,
    MissingOrInvalidDate,
}

impl TimelinessIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelinessIssue::LagExceeded => "lag_exceeded",
            TimelinessIssue::MissingOrInvalidDate => "missing_or_invalid_date",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinessRow {
    pub row: usize,
    pub issue: TimelinessIssue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Whole days between the record date and the reference date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lag_days: Option<i64>,
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Parse a date or timestamp; RFC 3339 timestamps are converted to UTC
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Flags records older than `max_lag_days` and records whose date is
/// missing or unparseable. Lagging rows come first, then invalid ones.
#[derive(Debug, Clone)]
pub struct TimelinessChecker {
    max_lag_days: i64,
    as_of: NaiveDateTime,
}

impl TimelinessChecker {
    pub fn new(max_lag_days: i64, as_of: NaiveDateTime) -> Self {
        Self { max_lag_days, as_of }
    }

    /// Reference date from config, else now
    pub fn from_reference(max_lag_days: i64, as_of: Option<NaiveDate>) -> Self {
        let as_of = as_of
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_else(|| Utc::now().naive_utc());
        Self::new(max_lag_days, as_of)
    }

    pub fn check(&self, cells: &[Cell]) -> Vec<TimelinessRow> {
        let parsed: Vec<(Option<String>, Option<NaiveDateTime>)> = cells
            .iter()
            .map(|cell| match cell {
                Cell::Text(s) => (Some(s.clone()), parse_date(s)),
                other => (other.render(), None),
            })
            .collect();

        let mut rows: Vec<TimelinessRow> = parsed
            .iter()
            .enumerate()
            .filter_map(|(row, (value, date))| {
                let age = self.as_of.signed_duration_since((*date)?);
                (age.num_seconds() > self.max_lag_days * 86_400).then(|| TimelinessRow {
                    row,
                    issue: TimelinessIssue::LagExceeded,
                    value: value.clone(),
                    lag_days: Some(age.num_days()),
                })
            })
            .collect();

        rows.extend(
            parsed
                .iter()
                .enumerate()
                .filter(|(_, (_, date))| date.is_none())
                .map(|(row, (value, _))| TimelinessRow {
                    row,
                    issue: TimelinessIssue::MissingOrInvalidDate,
                    value: value.clone(),
                    lag_days: None,
                }),
        );
        rows
    }
}
