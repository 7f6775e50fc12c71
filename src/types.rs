//! Value types shared across the extraction pipeline.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::ExtractionError;

/// An inclusive calendar-date range. `start <= end` is enforced at
/// construction and the window is immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ExtractionError> {
        if start > end {
            return Err(ExtractionError::InvalidWindow(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse from a pair of `YYYY-MM-DD` strings, the caller-facing format.
    pub fn parse(start: &str, end: &str) -> Result<Self, ExtractionError> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
                ExtractionError::InvalidWindow(format!("bad date {s:?}: {e}"))
            })
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days covered, inclusive of both endpoints.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Which component comes first in an ambiguous numeric date string.
///
/// Determined per session by probing the host's prefilled dialog values;
/// the host's own formatting may diverge from the browser locale, so this
/// is never assumed from locale alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateEncoding {
    DayFirst,
    MonthFirst,
}

impl DateEncoding {
    pub fn alternate(self) -> Self {
        match self {
            DateEncoding::DayFirst => DateEncoding::MonthFirst,
            DateEncoding::MonthFirst => DateEncoding::DayFirst,
        }
    }
}

/// Which dialog field gets written first. Writing in the wrong order can
/// trip the host's transient "start after end" validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStrategy {
    EndFirst,
    StartFirst,
}

/// One attempt to commit a window under one encoding hypothesis.
#[derive(Debug, Clone)]
pub struct CommitAttempt {
    pub window: DateWindow,
    pub encoding: DateEncoding,
    pub order: OrderStrategy,
}

/// The decoded answer for one retention query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetentionSample {
    /// The time the caller asked about, in seconds.
    pub requested_time: f64,
    /// The time of the nearest decoded curve vertex, in seconds.
    pub actual_time: f64,
    /// Retention at that vertex, percent, one decimal place.
    pub retention_percent: f64,
}

/// Metric cells read from the host's table for one committed window.
/// Values are kept as the host rendered them ("1,234", "0:42", "4.5%").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub views: Option<String>,
    pub average_watch_time: Option<String>,
    pub average_watch_percentage: Option<String>,
    pub click_through_rate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionSample>,
    /// Why retention is absent, when it was requested but could not be
    /// decoded. Never aborts the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_error: Option<String>,
}

/// Everything one orchestration run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub pre: MetricSet,
    pub post: MetricSet,
    pub pre_window: DateWindow,
    pub post_window: DateWindow,
}

/// Orchestration phase, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionPhase {
    MetricSelection,
    PreWindow,
    PostWindow,
    PreRetention,
    PostRetention,
}

impl fmt::Display for ExtractionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionPhase::MetricSelection => "metric selection",
            ExtractionPhase::PreWindow => "PRE window",
            ExtractionPhase::PostWindow => "POST window",
            ExtractionPhase::PreRetention => "PRE retention",
            ExtractionPhase::PostRetention => "POST retention",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_rejects_inverted_range() {
        assert!(DateWindow::parse("2025-10-15", "2025-10-12").is_err());
    }

    #[test]
    fn window_day_count_is_inclusive() {
        let w = DateWindow::parse("2025-10-12", "2025-10-15").unwrap();
        assert_eq!(w.days(), 4);
    }

    #[test]
    fn encoding_alternate_flips() {
        assert_eq!(DateEncoding::DayFirst.alternate(), DateEncoding::MonthFirst);
        assert_eq!(DateEncoding::MonthFirst.alternate(), DateEncoding::DayFirst);
    }
}
