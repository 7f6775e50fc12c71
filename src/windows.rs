//! PRE/POST window arithmetic around a treatment date.
//!
//! The analytics host lags behind real time: the most recent day or two has
//! no finalized data, so the POST window never extends past `today` minus
//! the reporting lag.

use chrono::{Duration as ChronoDuration, NaiveDate};
use tracing::debug;

use crate::errors::ExtractionError;
use crate::types::DateWindow;

/// Days the host's finalized data trails behind the calendar.
pub const REPORTING_LAG_DAYS: i64 = 2;

/// The matched pair of comparison windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    pub pre: DateWindow,
    pub post: DateWindow,
}

/// Compute PRE/POST windows around `treatment`.
///
/// POST covers `treatment..=(today - lag)`. PRE has the same length and ends
/// the day before treatment. When `publish_date` falls inside the PRE window
/// it clamps the PRE start, so the two windows may differ in length.
pub fn plan_windows(
    treatment: NaiveDate,
    today: NaiveDate,
    publish_date: Option<NaiveDate>,
) -> Result<WindowPlan, ExtractionError> {
    let post_end = today - ChronoDuration::days(REPORTING_LAG_DAYS);
    if post_end < treatment {
        return Err(ExtractionError::InvalidWindow(format!(
            "no finalized data after treatment yet: treatment {treatment}, \
             latest finalized day {post_end}"
        )));
    }
    let post = DateWindow::new(treatment, post_end)?;

    let pre_end = treatment - ChronoDuration::days(1);
    let mut pre_start = pre_end - ChronoDuration::days(post.days() - 1);
    if let Some(published) = publish_date {
        if published > pre_end {
            return Err(ExtractionError::InvalidWindow(format!(
                "publish date {published} leaves no days before treatment {treatment}"
            )));
        }
        if published > pre_start {
            debug!(%published, %pre_start, "publish date clamps PRE start");
            pre_start = published;
        }
    }
    let pre = DateWindow::new(pre_start, pre_end)?;

    debug!(%pre, %post, "windows planned");
    Ok(WindowPlan { pre, post })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn windows_match_length_without_clamp() {
        let plan = plan_windows(date("2025-10-12"), date("2025-10-17"), None).unwrap();
        assert_eq!(plan.post, DateWindow::parse("2025-10-12", "2025-10-15").unwrap());
        assert_eq!(plan.pre, DateWindow::parse("2025-10-08", "2025-10-11").unwrap());
        assert_eq!(plan.pre.days(), plan.post.days());
    }

    #[test]
    fn publish_date_clamps_pre_start() {
        let plan = plan_windows(
            date("2025-10-12"),
            date("2025-10-17"),
            Some(date("2025-10-10")),
        )
        .unwrap();
        assert_eq!(plan.pre, DateWindow::parse("2025-10-10", "2025-10-11").unwrap());
        assert!(plan.pre.days() < plan.post.days());
    }

    #[test]
    fn publish_before_pre_window_leaves_it_alone() {
        let plan = plan_windows(
            date("2025-10-12"),
            date("2025-10-17"),
            Some(date("2025-09-01")),
        )
        .unwrap();
        assert_eq!(plan.pre, DateWindow::parse("2025-10-08", "2025-10-11").unwrap());
    }

    #[test]
    fn treatment_too_recent_is_rejected() {
        let err = plan_windows(date("2025-10-16"), date("2025-10-17"), None).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidWindow(_)));
    }

    #[test]
    fn publish_on_or_after_treatment_is_rejected() {
        let err = plan_windows(
            date("2025-10-12"),
            date("2025-10-17"),
            Some(date("2025-10-12")),
        )
        .unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidWindow(_)));
    }
}
