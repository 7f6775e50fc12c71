//! Reconstructing a numeric time-series from the rendered retention chart:
//! axis calibration, path decoding, and nearest-point lookup.

pub mod axis;
pub mod decoder;
pub mod path;
pub mod surface;

pub use axis::{AxisCalibration, AxisKind, AxisTick};
pub use decoder::decode_at;
pub use path::{parse_line_path, ChartPoint};
pub use surface::{extract_retention, read_retention_chart, RetentionChart};
