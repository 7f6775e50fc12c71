//! Switching the explore page between reports. The retention pass needs the
//! audience-retention report; table reads happen on the top-content report.

use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::errors::ExtractionError;
use crate::host::{HostElement, Page};
use crate::poll::{poll_until, READBACK_POLL_INTERVAL};
use crate::selector::Selector;

const SURFACE_TIMEOUT: Duration = Duration::from_secs(5);
const SWITCH_TIMEOUT: Duration = Duration::from_secs(10);

/// The reports the extraction flow moves between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    TopContent,
    AudienceRetention,
}

impl Report {
    /// The label the host renders for this report.
    pub fn label(self) -> &'static str {
        match self {
            Report::TopContent => "Top content",
            Report::AudienceRetention => "Audience retention",
        }
    }
}

/// Switch the report dropdown to `report`. Idempotent: an already-active
/// report is left alone.
#[instrument(level = "info", skip(page))]
pub async fn switch_report(page: &Page, report: Report) -> Result<(), ExtractionError> {
    let trigger = find_report_trigger(page).await?;
    let current = trigger.text().await?;
    if current.contains(report.label()) {
        debug!(%current, "report already active");
        return Ok(());
    }

    trigger.click().await?;
    let surface = page
        .locator("tp-yt-paper-listbox")
        .visible(true)
        .set_default_timeout(SURFACE_TIMEOUT)
        .wait(None)
        .await
        .map_err(|e| match e {
            ExtractionError::Timeout(msg) => ExtractionError::SurfaceDidNotOpen(msg),
            other => other,
        })?;

    let mut target = None;
    for item in page
        .locator("tp-yt-paper-item")
        .within(surface)
        .all()
        .await?
    {
        if item.text().await?.contains(report.label()) {
            target = Some(item);
            break;
        }
    }
    let target = target.ok_or_else(|| {
        ExtractionError::OptionNotFound(format!("report entry {:?} not listed", report.label()))
    })?;
    target.click().await?;

    // The trigger's readback confirms the switch once the host re-renders.
    let confirmed = poll_until(SWITCH_TIMEOUT, READBACK_POLL_INTERVAL, || async {
        match find_report_trigger(page).await {
            Ok(trigger) => match trigger.text().await {
                Ok(text) if text.contains(report.label()) => Some(Ok(())),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            },
            // Trigger can vanish briefly while the report re-renders.
            Err(_) => None,
        }
    })
    .await
    .unwrap_or_else(|| {
        Err(ExtractionError::Timeout(format!(
            "report readback never showed {:?} within {SWITCH_TIMEOUT:?}",
            report.label()
        )))
    });
    if confirmed.is_ok() {
        info!(report = report.label(), "report switched");
    }
    confirmed
}

/// The report dropdown shares its widget shape with the date-range control;
/// it is told apart by a readback matching a known report label.
async fn find_report_trigger(page: &Page) -> Result<HostElement, ExtractionError> {
    let scopes = [Some(Selector::from("yta-explore-sidebar")), None];
    for scope in scopes {
        let selector = match scope {
            Some(scope) => scope.then(Selector::from("ytcp-dropdown-trigger")),
            None => Selector::from("ytcp-dropdown-trigger"),
        };
        for candidate in page.locator(selector).all().await? {
            let text = candidate.text().await?;
            if is_report_readback(&text) {
                return Ok(candidate);
            }
        }
    }
    Err(ExtractionError::ElementNotFound(
        "report dropdown trigger".into(),
    ))
}

fn is_report_readback(text: &str) -> bool {
    [Report::TopContent, Report::AudienceRetention]
        .iter()
        .any(|report| text.contains(report.label()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readback_recognizes_known_reports() {
        assert!(is_report_readback("Report: Top content"));
        assert!(is_report_readback("Audience retention"));
        assert!(!is_report_readback("Last 28 days"));
    }
}
