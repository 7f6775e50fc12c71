//! SVG path parsing for the rendered retention curve.
//!
//! The host draws the curve as a single `M x,y L x,y L x,y ...` path. The
//! initial move-to only affects rendering semantics, not point order, so it
//! is treated as a line-to for sequencing.

use serde::{Deserialize, Serialize};

use crate::errors::ExtractionError;

/// One vertex of the decoded curve, in pixel space. The sequence runs
/// first-to-last along increasing time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub x: f64,
    pub y: f64,
}

/// Parse a move-to/line-to path description into ordered points.
///
/// Malformed segments (non-numeric, wrong arity) are skipped rather than
/// fatal; a curve with any valid points is usable. Zero valid points is
/// [`ExtractionError::EmptyCurve`].
pub fn parse_line_path(d: &str) -> Result<Vec<ChartPoint>, ExtractionError> {
    let points: Vec<ChartPoint> = d
        .replacen('M', "L", 1)
        .split('L')
        .filter_map(parse_segment)
        .collect();

    if points.is_empty() {
        return Err(ExtractionError::EmptyCurve);
    }
    Ok(points)
}

fn parse_segment(segment: &str) -> Option<ChartPoint> {
    let mut parts = segment.trim().split(',');
    let x = parts.next()?.trim().parse::<f64>().ok()?;
    let y = parts.next()?.trim().parse::<f64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(ChartPoint { x, y })
}
