//! Sequencing one full extraction run: metric selection, the PRE and POST
//! table reads, and the optional retention pass.

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::chart::extract_retention;
use crate::errors::ExtractionError;
use crate::host::Page;
use crate::metrics::{ensure_metrics_selected, read_metric_set};
use crate::range::{RangeConfig, RangeController};
use crate::reports::{switch_report, Report};
use crate::types::{DateWindow, ExtractionPhase, ExtractionResult, MetricSet};

/// Knobs for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Run the retention pass after both table reads. Its failures never
    /// abort the run; they surface as `retention_error` on the metric sets.
    pub include_retention: bool,
    pub range: RangeConfig,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            include_retention: true,
            range: RangeConfig::default(),
        }
    }
}

/// Drives one PRE/POST extraction against a host page.
///
/// All host interaction is sequential; never run two extractions against
/// the same page concurrently.
pub struct Extractor {
    page: Page,
    config: ExtractorConfig,
    cancel: CancellationToken,
}

impl Extractor {
    pub fn new(page: Page) -> Self {
        Self::with_config(page, ExtractorConfig::default())
    }

    pub fn with_config(page: Page, config: ExtractorConfig) -> Self {
        Self {
            page,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token the caller can cancel to stop the run at the next phase
    /// boundary. In-flight host operations are not interrupted.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the full extraction. A PRE-phase failure skips POST entirely;
    /// retention failures are recorded per window instead of aborting.
    #[instrument(level = "info", skip(self), fields(pre = %pre_window, post = %post_window))]
    pub async fn run(
        &self,
        pre_window: DateWindow,
        post_window: DateWindow,
    ) -> Result<ExtractionResult, ExtractionError> {
        let mut controller =
            RangeController::with_config(self.page.clone(), self.config.range.clone());

        self.checkpoint(ExtractionPhase::MetricSelection)?;
        ensure_metrics_selected(&self.page)
            .await
            .map_err(|e| e.in_phase(ExtractionPhase::MetricSelection))?;

        self.checkpoint(ExtractionPhase::PreWindow)?;
        let mut pre = self
            .windowed_read(&mut controller, &pre_window)
            .await
            .map_err(|e| e.in_phase(ExtractionPhase::PreWindow))?;
        info!(window = %pre_window, "PRE metrics read");

        self.checkpoint(ExtractionPhase::PostWindow)?;
        let mut post = self
            .windowed_read(&mut controller, &post_window)
            .await
            .map_err(|e| e.in_phase(ExtractionPhase::PostWindow))?;
        info!(window = %post_window, "POST metrics read");

        if self.config.include_retention {
            self.retention_pass(&mut controller, &pre_window, &mut pre, &post_window, &mut post)
                .await?;
        }

        Ok(ExtractionResult {
            pre,
            post,
            pre_window,
            post_window,
        })
    }

    async fn windowed_read(
        &self,
        controller: &mut RangeController,
        window: &DateWindow,
    ) -> Result<MetricSet, ExtractionError> {
        controller.commit_window(window).await?;
        read_metric_set(&self.page).await
    }

    /// Switch to the retention report, decode both windows, switch back.
    /// Only cancellation escapes this pass; everything else is recorded on
    /// the affected metric set.
    async fn retention_pass(
        &self,
        controller: &mut RangeController,
        pre_window: &DateWindow,
        pre: &mut MetricSet,
        post_window: &DateWindow,
        post: &mut MetricSet,
    ) -> Result<(), ExtractionError> {
        self.checkpoint(ExtractionPhase::PreRetention)?;
        if let Err(e) = switch_report(&self.page, Report::AudienceRetention).await {
            let reason = e.in_phase(ExtractionPhase::PreRetention).to_string();
            warn!(%reason, "retention report unavailable, skipping retention pass");
            pre.retention_error = Some(reason.clone());
            post.retention_error = Some(reason);
            return Ok(());
        }

        self.decode_window(controller, pre_window, pre, ExtractionPhase::PreRetention)
            .await;

        self.checkpoint(ExtractionPhase::PostRetention)?;
        self.decode_window(controller, post_window, post, ExtractionPhase::PostRetention)
            .await;

        if let Err(e) = switch_report(&self.page, Report::TopContent).await {
            warn!(error = %e, "could not switch back to the content report");
        }
        Ok(())
    }

    async fn decode_window(
        &self,
        controller: &mut RangeController,
        window: &DateWindow,
        metrics: &mut MetricSet,
        phase: ExtractionPhase,
    ) {
        let outcome = async {
            controller.commit_window(window).await?;
            extract_retention(&self.page).await
        }
        .await;
        match outcome {
            Ok(Some(sample)) => {
                info!(%window, retention = sample.retention_percent, "retention decoded");
                metrics.retention = Some(sample);
            }
            Ok(None) => {
                metrics.retention_error =
                    Some("chart domain shorter than the query time".into());
            }
            Err(e) => {
                let reason = e.in_phase(phase).to_string();
                warn!(%reason, "retention decoding failed");
                metrics.retention_error = Some(reason);
            }
        }
    }

    fn checkpoint(&self, phase: ExtractionPhase) -> Result<(), ExtractionError> {
        if self.cancel.is_cancelled() {
            return Err(ExtractionError::Cancelled(format!(
                "cancelled before {phase}"
            )));
        }
        Ok(())
    }
}
