//! Date-encoding and commit-order decisions.
//!
//! A numeric date string like `07/10/2025` is ambiguous between day-first
//! and month-first. The host formats its own dialog values, which may
//! diverge from the browser locale, so the encoding is probed per session
//! from the prefilled values instead of assumed. The probe is a heuristic:
//! when both leading components are 12 or less nothing can be decided, and
//! the configured default applies.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::types::{DateEncoding, DateWindow, OrderStrategy};

static NUMERIC_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\s*[/.\-]\s*(\d{1,2})").expect("static regex"));
static FIRST_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,2}").expect("static regex"));

/// Probe the encoding from the dialog's prefilled values.
///
/// A leading component over 12 can only be a day, which fixes day-first;
/// a second component over 12 likewise fixes month-first. Ambiguous values
/// fall back to `default`.
pub fn detect_encoding(prefilled: &[&str], default: DateEncoding) -> DateEncoding {
    for value in prefilled {
        if let Some(caps) = NUMERIC_DATE_RE.captures(value) {
            let first: u32 = caps[1].parse().unwrap_or(0);
            let second: u32 = caps[2].parse().unwrap_or(0);
            if first > 12 {
                debug!(value, "leading component over 12 fixes day-first");
                return DateEncoding::DayFirst;
            }
            if second > 12 {
                debug!(value, "second component over 12 fixes month-first");
                return DateEncoding::MonthFirst;
            }
        }
    }
    default
}

/// Infer the encoding a rejection message expects, when it echoes back a
/// date whose leading numeral is unambiguous. Heuristic only.
pub fn encoding_from_rejection(messages: &[String]) -> Option<DateEncoding> {
    for message in messages {
        let probed = detect_encoding(&[message.as_str()], DateEncoding::MonthFirst);
        if probed == DateEncoding::DayFirst {
            return Some(DateEncoding::DayFirst);
        }
        // A second-component hit inside detect_encoding also means the
        // message carried an unambiguous date.
        if let Some(caps) = NUMERIC_DATE_RE.captures(message) {
            let second: u32 = caps[2].parse().unwrap_or(0);
            if second > 12 {
                return Some(DateEncoding::MonthFirst);
            }
        }
    }
    None
}

/// Render a date the way the dialog expects it under the given encoding.
pub fn format_date(date: NaiveDate, encoding: DateEncoding) -> String {
    match encoding {
        DateEncoding::DayFirst => format!(
            "{:02}/{:02}/{}",
            date.day(),
            date.month(),
            date.year()
        ),
        DateEncoding::MonthFirst => format!(
            "{:02}/{:02}/{}",
            date.month(),
            date.day(),
            date.year()
        ),
    }
}

/// Render both ends of a window: `(start, end)`.
pub fn format_window(window: &DateWindow, encoding: DateEncoding) -> (String, String) {
    (
        format_date(window.start(), encoding),
        format_date(window.end(), encoding),
    )
}

/// Extract the day-of-month numeral from a rendered date string.
///
/// Prefilled values come back either fully numeric (`07/10/2025`) or
/// partially worded (`16 Oct 2025`); only the day numeral is reliable
/// across both shapes.
pub fn day_component(value: &str, encoding: DateEncoding) -> Option<u32> {
    if let Some(caps) = NUMERIC_DATE_RE.captures(value) {
        let idx = match encoding {
            DateEncoding::DayFirst => 1,
            DateEncoding::MonthFirst => 2,
        };
        return caps.get(idx)?.as_str().parse().ok();
    }
    FIRST_NUMBER_RE
        .find(value)
        .and_then(|m| m.as_str().parse().ok())
}

/// Decide which field to write first, comparing the target window's day
/// numerals against the dialog's prefilled ones.
///
/// Writing the field that expands the range first avoids the transient
/// "start after end" state the host's validation rejects:
/// target entirely at/after prefilled -> end first (expand forward);
/// entirely at/before -> start first (expand backward); overlapping ->
/// start first when the start moved later, else end first.
pub fn choose_order(prefilled: Option<(u32, u32)>, target: (u32, u32)) -> OrderStrategy {
    let (target_start, target_end) = target;
    let Some((prefilled_start, prefilled_end)) = prefilled else {
        return OrderStrategy::EndFirst;
    };
    if target_start >= prefilled_end {
        OrderStrategy::EndFirst
    } else if target_end <= prefilled_start {
        OrderStrategy::StartFirst
    } else if target_start > prefilled_start {
        OrderStrategy::StartFirst
    } else {
        OrderStrategy::EndFirst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DateEncoding, OrderStrategy};

    #[test]
    fn leading_component_over_twelve_fixes_day_first() {
        let enc = detect_encoding(&["16/10/2025", "20/10/2025"], DateEncoding::MonthFirst);
        assert_eq!(enc, DateEncoding::DayFirst);
    }

    #[test]
    fn second_component_over_twelve_fixes_month_first() {
        let enc = detect_encoding(&["10/16/2025"], DateEncoding::DayFirst);
        assert_eq!(enc, DateEncoding::MonthFirst);
    }

    #[test]
    fn ambiguous_values_fall_back_to_default() {
        let enc = detect_encoding(&["01/10/2025", "07/10/2025"], DateEncoding::MonthFirst);
        assert_eq!(enc, DateEncoding::MonthFirst);
        let enc = detect_encoding(&["01/10/2025"], DateEncoding::DayFirst);
        assert_eq!(enc, DateEncoding::DayFirst);
    }

    #[test]
    fn rejection_with_large_leading_numeral_means_day_first() {
        let messages = vec!["Enter a date like 31/12/2025".to_string()];
        assert_eq!(encoding_from_rejection(&messages), Some(DateEncoding::DayFirst));
    }

    #[test]
    fn rejection_without_date_hint_is_inconclusive() {
        let messages = vec!["Invalid date".to_string()];
        assert_eq!(encoding_from_rejection(&messages), None);
    }

    #[test]
    fn formats_both_encodings() {
        let d = NaiveDate::from_ymd_opt(2025, 10, 6).unwrap();
        assert_eq!(format_date(d, DateEncoding::DayFirst), "06/10/2025");
        assert_eq!(format_date(d, DateEncoding::MonthFirst), "10/06/2025");
    }

    #[test]
    fn day_component_handles_numeric_and_worded_shapes() {
        assert_eq!(day_component("07/10/2025", DateEncoding::DayFirst), Some(7));
        assert_eq!(day_component("10/07/2025", DateEncoding::MonthFirst), Some(7));
        assert_eq!(day_component("16 Oct 2025", DateEncoding::DayFirst), Some(16));
        assert_eq!(day_component("", DateEncoding::DayFirst), None);
    }

    #[test]
    fn target_entirely_after_prefilled_is_end_first() {
        assert_eq!(choose_order(Some((1, 7)), (12, 15)), OrderStrategy::EndFirst);
    }

    #[test]
    fn target_entirely_before_prefilled_is_start_first() {
        assert_eq!(choose_order(Some((12, 15)), (1, 7)), OrderStrategy::StartFirst);
    }

    #[test]
    fn overlap_with_later_start_is_start_first() {
        assert_eq!(choose_order(Some((5, 15)), (8, 20)), OrderStrategy::StartFirst);
    }

    #[test]
    fn overlap_with_earlier_start_is_end_first() {
        assert_eq!(choose_order(Some((8, 15)), (5, 12)), OrderStrategy::EndFirst);
    }

    #[test]
    fn missing_prefilled_defaults_to_end_first() {
        assert_eq!(choose_order(None, (5, 12)), OrderStrategy::EndFirst);
    }
}
