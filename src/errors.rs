use thiserror::Error;

use crate::types::ExtractionPhase;

/// Errors produced while driving the host page or decoding the chart.
#[derive(Error, Debug)]
pub enum ExtractionError {
    // Chart decoding
    #[error("Chart not ready: {0}")]
    ChartNotReady(String),
    #[error("Insufficient calibration data: {0}")]
    InsufficientCalibrationData(String),
    #[error("Invalid chart geometry: {0}")]
    InvalidChartGeometry(String),
    #[error("Curve contained no decodable points")]
    EmptyCurve,

    // Range controller
    #[error("Date-range surface did not open: {0}")]
    SurfaceDidNotOpen(String),
    #[error("Option not found: {0}")]
    OptionNotFound(String),
    #[error("Date dialog not found: {0}")]
    DialogNotFound(String),
    #[error("Date inputs not found: {0}")]
    InputsNotFound(String),
    #[error("Host rejected the entered dates: {}", .0.join("; "))]
    ValidationRejected(Vec<String>),
    #[error("Committed dates were not applied: {0}")]
    DatesNotApplied(String),
    #[error("Timed out committing the date range: {0}")]
    CommitTimeout(String),

    // Metric table
    #[error("Metric table not ready: {0}")]
    MetricTableNotReady(String),

    // Window arithmetic
    #[error("Invalid date window: {0}")]
    InvalidWindow(String),

    // Host transport
    #[error("Element not found: {0}")]
    ElementNotFound(String),
    #[error("Operation timed out: {0}")]
    Timeout(String),
    #[error("Host error: {0}")]
    HostError(String),
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
    #[error("Extraction cancelled: {0}")]
    Cancelled(String),

    /// Wraps a failure with the orchestration phase it occurred in, so the
    /// caller can tell "never got PRE" apart from "got PRE but POST failed".
    #[error("{phase} failed: {source}")]
    Phase {
        phase: ExtractionPhase,
        #[source]
        source: Box<ExtractionError>,
    },
}

impl ExtractionError {
    /// Tag this error with the orchestration phase it occurred in.
    /// Already-tagged errors keep their original phase.
    pub fn in_phase(self, phase: ExtractionPhase) -> Self {
        match self {
            e @ ExtractionError::Phase { .. } => e,
            other => ExtractionError::Phase {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// The phase annotation, if any.
    pub fn phase(&self) -> Option<ExtractionPhase> {
        match self {
            ExtractionError::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Peels the phase wrapper off, if present.
    pub fn root(&self) -> &ExtractionError {
        match self {
            ExtractionError::Phase { source, .. } => source.root(),
            other => other,
        }
    }
}
