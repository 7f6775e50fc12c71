//! Before/after video-performance extraction from an analytics web page
//!
//! This crate drives a third-party analytics UI through a Playwright-style
//! page/locator model: the caller supplies PRE and POST date windows, and
//! the [`orchestrator::Extractor`] commits each window to the host's
//! date-range widget, reads the rendered metric table, and decodes the SVG
//! retention chart back into numbers. The live DOM sits behind the
//! [`host::HostBackend`] seam; [`bridge::BridgeBackend`] is the production
//! implementation, talking to a companion browser extension over a local
//! WebSocket.

pub mod bridge;
pub mod chart;
pub mod errors;
pub mod host;
pub mod locator;
pub mod metrics;
pub mod orchestrator;
pub mod poll;
pub mod range;
pub mod reports;
pub mod selector;
#[cfg(test)]
mod tests;
pub mod types;
pub mod windows;

pub use errors::ExtractionError;
pub use host::{HostBackend, HostElement, HostElementImpl, Page};
pub use locator::Locator;
pub use orchestrator::{Extractor, ExtractorConfig};
pub use range::{RangeConfig, RangeController};
pub use selector::Selector;
pub use types::{
    DateWindow, ExtractionPhase, ExtractionResult, MetricSet, RetentionSample,
};
pub use windows::{plan_windows, WindowPlan, REPORTING_LAG_DAYS};
