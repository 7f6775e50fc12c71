//! Axis calibration: a linear mapping between rendered pixel offsets and
//! domain values, rebuilt fresh from the currently rendered ticks on every
//! extraction. Never cached across host re-renders, since a re-render can
//! change the pixel geometry.

use serde::{Deserialize, Serialize};

use crate::errors::ExtractionError;

/// What the tick labels on an axis denote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    /// Labels like `"42%"`.
    Percentage,
    /// Clock-format durations like `"1:30"` or `"1:02:45"`, in seconds.
    Duration,
}

/// One rendered tick: its label text and its pixel offset along the axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisTick {
    pub label: String,
    pub pixel: f64,
}

impl AxisTick {
    pub fn new(label: impl Into<String>, pixel: f64) -> Self {
        Self {
            label: label.into(),
            pixel,
        }
    }
}

// Sanity bounds: a retention axis above 150% or a per-video duration above
// two hours means we calibrated against the wrong chart on the page.
const MAX_PLAUSIBLE_PERCENTAGE: f64 = 150.0;
const MAX_PLAUSIBLE_DURATION_SECS: f64 = 7200.0;
const MIN_PLAUSIBLE_DURATION_SECS: f64 = 1.0;

/// Linear pixel-to-domain mapping for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisCalibration {
    pub domain_min: f64,
    pub domain_max: f64,
    pub pixel_min: f64,
    pub pixel_max: f64,
}

impl AxisCalibration {
    /// Calibrate from rendered ticks.
    ///
    /// Min/max are taken over parsed values and pixels independently, not by
    /// tick index, so an inverted axis still calibrates correctly.
    /// Unparseable labels are skipped; at least two distinct parsed values
    /// are required.
    pub fn from_ticks(kind: AxisKind, ticks: &[AxisTick]) -> Result<Self, ExtractionError> {
        if ticks.is_empty() {
            return Err(ExtractionError::ChartNotReady(
                "no axis ticks rendered".into(),
            ));
        }

        let mut values = Vec::with_capacity(ticks.len());
        let mut pixels = Vec::with_capacity(ticks.len());
        for tick in ticks {
            let parsed = match kind {
                AxisKind::Percentage => parse_percentage(&tick.label),
                AxisKind::Duration => parse_clock_duration(&tick.label),
            };
            if let Some(value) = parsed {
                values.push(value);
                pixels.push(tick.pixel);
            }
        }

        let distinct = {
            let mut sorted = values.clone();
            sorted.sort_by(|a, b| a.total_cmp(b));
            sorted.dedup();
            sorted.len()
        };
        if distinct < 2 {
            return Err(ExtractionError::InsufficientCalibrationData(format!(
                "{distinct} distinct parseable tick value(s), need at least 2"
            )));
        }

        let domain_min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let domain_max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let pixel_min = pixels.iter().copied().fold(f64::INFINITY, f64::min);
        let pixel_max = pixels.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        match kind {
            AxisKind::Percentage if domain_max > MAX_PLAUSIBLE_PERCENTAGE => {
                return Err(ExtractionError::InvalidChartGeometry(format!(
                    "percentage axis tops out at {domain_max}%, not a retention chart"
                )));
            }
            AxisKind::Duration
                if domain_max > MAX_PLAUSIBLE_DURATION_SECS
                    || domain_max < MIN_PLAUSIBLE_DURATION_SECS =>
            {
                return Err(ExtractionError::InvalidChartGeometry(format!(
                    "implausible video duration {domain_max}s"
                )));
            }
            _ => {}
        }

        Ok(Self {
            domain_min,
            domain_max,
            pixel_min,
            pixel_max,
        })
    }

    pub fn domain_span(&self) -> f64 {
        self.domain_max - self.domain_min
    }

    pub fn pixel_span(&self) -> f64 {
        self.pixel_max - self.pixel_min
    }

    /// Map a domain value to its pixel offset.
    pub fn to_pixel(&self, domain: f64) -> f64 {
        self.pixel_min + (domain - self.domain_min) * self.pixel_span() / self.domain_span()
    }

    /// Map a pixel offset back to its domain value.
    pub fn to_domain(&self, pixel: f64) -> f64 {
        self.domain_min + (pixel - self.pixel_min) * self.domain_span() / self.pixel_span()
    }

    /// Like `to_domain`, but for axes that grow downward in pixel space
    /// (SVG y grows down while percentages grow up).
    pub fn to_domain_inverted(&self, pixel: f64) -> f64 {
        self.domain_max - (pixel - self.pixel_min) * self.domain_span() / self.pixel_span()
    }
}

/// Parse `"42%"` (or bare `"42"`) as a percentage.
pub fn parse_percentage(label: &str) -> Option<f64> {
    label.trim().trim_end_matches('%').parse::<f64>().ok()
}

/// Parse `"m:ss"` or `"h:mm:ss"` clock text as total seconds.
pub fn parse_clock_duration(label: &str) -> Option<f64> {
    let parts: Vec<&str> = label.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut total = 0.0;
    for part in &parts {
        total = total * 60.0 + part.parse::<f64>().ok()?;
    }
    Some(total)
}
