//! Curve decoding: answering "what is the retention at time T?" from the
//! parsed curve points and the two axis calibrations.

use tracing::debug;

use crate::chart::axis::AxisCalibration;
use crate::chart::path::ChartPoint;
use crate::errors::ExtractionError;
use crate::types::RetentionSample;

/// Query time for short-form content (chart domain under a minute).
pub const SHORT_FORM_QUERY_SECS: f64 = 3.0;
/// Query time for long-form content.
pub const LONG_FORM_QUERY_SECS: f64 = 30.0;
/// Domain duration below which content counts as short-form.
const SHORT_FORM_THRESHOLD_SECS: f64 = 60.0;

/// The query time appropriate for a chart spanning `domain_max_secs`.
pub fn query_time_for(domain_max_secs: f64) -> f64 {
    if domain_max_secs < SHORT_FORM_THRESHOLD_SECS {
        SHORT_FORM_QUERY_SECS
    } else {
        LONG_FORM_QUERY_SECS
    }
}

/// Decode the retention sample nearest to `query_secs`.
///
/// The target pixel-x comes from the inverse of the time axis' linear map;
/// the closest point by |pixel-x| wins, ties going to the earliest point in
/// sequence order. Both coordinates are mapped back through their axes and
/// rounded to one decimal place.
pub fn decode_at(
    points: &[ChartPoint],
    time_axis: &AxisCalibration,
    percent_axis: &AxisCalibration,
    query_secs: f64,
) -> Result<RetentionSample, ExtractionError> {
    if points.is_empty() {
        return Err(ExtractionError::EmptyCurve);
    }

    let target_x = time_axis.to_pixel(query_secs);
    let mut closest = &points[0];
    let mut min_distance = (points[0].x - target_x).abs();
    for point in &points[1..] {
        let distance = (point.x - target_x).abs();
        if distance < min_distance {
            min_distance = distance;
            closest = point;
        }
    }

    let actual_time = round1(time_axis.to_domain(closest.x));
    let retention_percent = round1(percent_axis.to_domain_inverted(closest.y));
    debug!(
        query_secs,
        actual_time, retention_percent, "decoded retention sample"
    );

    Ok(RetentionSample {
        requested_time: query_secs,
        actual_time,
        retention_percent,
    })
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::axis::{AxisCalibration, AxisKind, AxisTick};

    fn time_axis_0_to(max_label: &str, pixel_max: f64) -> AxisCalibration {
        AxisCalibration::from_ticks(
            AxisKind::Duration,
            &[AxisTick::new("0:00", 0.0), AxisTick::new(max_label, pixel_max)],
        )
        .unwrap()
    }

    fn percent_axis_0_100(pixel_max: f64) -> AxisCalibration {
        AxisCalibration::from_ticks(
            AxisKind::Percentage,
            &[AxisTick::new("100%", 0.0), AxisTick::new("0%", pixel_max)],
        )
        .unwrap()
    }

    #[test]
    fn query_time_policy_follows_domain_length() {
        assert_eq!(query_time_for(45.0), 3.0);
        assert_eq!(query_time_for(59.9), 3.0);
        assert_eq!(query_time_for(60.0), 30.0);
        assert_eq!(query_time_for(245.0), 30.0);
    }

    #[test]
    fn decodes_thirty_seconds_on_245s_chart() {
        // Chart domain 0-245s across pixels 0-500, percent 0-100 across 0-300,
        // curve decreasing linearly from top-left to bottom-right.
        let time_axis = time_axis_0_to("4:05", 500.0);
        let percent_axis = percent_axis_0_100(300.0);
        let points: Vec<ChartPoint> = (0..=100)
            .map(|i| ChartPoint {
                x: i as f64 * 5.0,
                y: i as f64 * 3.0,
            })
            .collect();

        let sample = decode_at(&points, &time_axis, &percent_axis, 30.0).unwrap();
        assert!(
            (sample.actual_time - 30.0).abs() <= 1.0,
            "actual_time {} not within 1s of 30",
            sample.actual_time
        );
        assert_eq!(sample.requested_time, 30.0);
    }

    #[test]
    fn minimum_time_hits_first_point_at_domain_max_retention() {
        let time_axis = time_axis_0_to("4:05", 500.0);
        let percent_axis = percent_axis_0_100(300.0);
        // First point sits at pixel_min on both axes: time 0, retention 100%.
        let points = vec![
            ChartPoint { x: 0.0, y: 0.0 },
            ChartPoint { x: 250.0, y: 150.0 },
        ];
        let sample = decode_at(&points, &time_axis, &percent_axis, 0.0).unwrap();
        assert!((sample.retention_percent - percent_axis.domain_max).abs() < 0.1);
        assert_eq!(sample.actual_time, 0.0);
    }

    #[test]
    fn ties_break_to_first_point_in_sequence() {
        let time_axis = time_axis_0_to("1:40", 100.0);
        let percent_axis = percent_axis_0_100(100.0);
        // Two points equidistant from target x=50.
        let points = vec![
            ChartPoint { x: 40.0, y: 10.0 },
            ChartPoint { x: 60.0, y: 90.0 },
        ];
        let sample = decode_at(&points, &time_axis, &percent_axis, 50.0).unwrap();
        // First point wins: y=10 maps to 90%.
        assert_eq!(sample.retention_percent, 90.0);
    }

    #[test]
    fn rounds_to_one_decimal() {
        let time_axis = time_axis_0_to("1:40", 300.0);
        let percent_axis = percent_axis_0_100(300.0);
        let points = vec![ChartPoint { x: 100.0, y: 100.0 }];
        let sample = decode_at(&points, &time_axis, &percent_axis, 33.0).unwrap();
        assert_eq!(sample.actual_time, 33.3);
        assert_eq!(sample.retention_percent, 66.7);
    }
}
