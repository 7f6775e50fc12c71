//! Reading the explore table's totals row and keeping the required metric
//! columns selected.
//!
//! The table is header-keyed: column order changes with the host's metric
//! picker state, so cells are matched to columns by header text rather than
//! by position.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::errors::ExtractionError;
use crate::host::{HostElement, Page};
use crate::poll::{poll_until, POLL_INTERVAL};
use crate::selector::Selector;
use crate::types::MetricSet;

const TABLE_TIMEOUT: Duration = Duration::from_secs(10);
const PICKER_TIMEOUT: Duration = Duration::from_secs(5);

/// A metric column: the host's stable checkbox id and the rendered header.
#[derive(Debug, Clone, Copy)]
pub struct MetricColumn {
    pub id: &'static str,
    pub header: &'static str,
}

/// The four columns every extraction needs.
pub const REQUIRED_METRICS: [MetricColumn; 4] = [
    MetricColumn {
        id: "VIEWS",
        header: "Views",
    },
    MetricColumn {
        id: "AVERAGE_WATCH_TIME",
        header: "Average view duration",
    },
    MetricColumn {
        id: "AVERAGE_WATCH_PERCENTAGE",
        header: "Average percentage viewed",
    },
    MetricColumn {
        id: "VIDEO_THUMBNAIL_IMPRESSIONS_VTR",
        header: "Impressions click-through rate",
    },
];

/// Read the totals row of the explore table, keyed by header text.
///
/// Values come back exactly as the host renders them (`"1,234"`, `"4:05"`,
/// `"38.2%"`); parsing them further is the caller's concern.
#[instrument(level = "debug", skip(page))]
pub async fn read_metric_set(page: &Page) -> Result<MetricSet, ExtractionError> {
    let table = wait_for_table(page).await?;
    let headers = header_texts(page, &table).await?;
    if headers.is_empty() {
        return Err(ExtractionError::MetricTableNotReady(
            "table present but headers not rendered".into(),
        ));
    }

    let totals = page
        .locator(".totals-row")
        .within(table.clone())
        .first()
        .await?
        .ok_or_else(|| {
            ExtractionError::MetricTableNotReady("totals row not rendered".into())
        })?;
    let mut cells = Vec::new();
    for cell in page.locator(".cell").within(totals).all().await? {
        cells.push(cell.text().await?.trim().to_string());
    }
    debug!(?headers, ?cells, "totals row scraped");

    Ok(MetricSet {
        views: cell_for(&headers, &cells, REQUIRED_METRICS[0].header),
        average_watch_time: cell_for(&headers, &cells, REQUIRED_METRICS[1].header),
        average_watch_percentage: cell_for(&headers, &cells, REQUIRED_METRICS[2].header),
        click_through_rate: cell_for(&headers, &cells, REQUIRED_METRICS[3].header),
        retention: None,
        retention_error: None,
    })
}

/// Make sure all required metric columns are shown, opening the metric
/// picker only when one is missing. Safe to call repeatedly.
#[instrument(level = "info", skip(page))]
pub async fn ensure_metrics_selected(page: &Page) -> Result<(), ExtractionError> {
    let table = wait_for_table(page).await?;
    let headers = header_texts(page, &table).await?;
    if all_required_present(&headers) {
        debug!("required metric columns already selected");
        return Ok(());
    }
    info!(?headers, "metric columns incomplete, opening picker");

    let trigger = page
        .first_match(&[
            Selector::from("#metric-picker"),
            Selector::from("#add-metric-button"),
        ])
        .await?
        .ok_or_else(|| {
            ExtractionError::ElementNotFound("metric picker trigger".into())
        })?;
    trigger.click().await?;

    let dialog = page
        .locator("ytcp-metric-picker-dialog")
        .visible(true)
        .set_default_timeout(PICKER_TIMEOUT)
        .wait(None)
        .await
        .map_err(|e| match e {
            ExtractionError::Timeout(msg) => ExtractionError::DialogNotFound(msg),
            other => other,
        })?;

    // Deselecting everything first makes the toggles below deterministic.
    if let Some(deselect) = page
        .locator("#deselect-all")
        .within(dialog.clone())
        .first()
        .await?
    {
        deselect.click().await?;
    }

    for metric in REQUIRED_METRICS {
        let checkbox = page
            .locator(Selector::Id(metric.id.into()))
            .within(dialog.clone())
            .first()
            .await?
            .ok_or_else(|| {
                ExtractionError::OptionNotFound(format!(
                    "metric checkbox {} absent from picker",
                    metric.id
                ))
            })?;
        if checkbox.attr("aria-checked").await?.as_deref() != Some("true") {
            checkbox.click().await?;
        }
    }

    let apply = page
        .locator("#apply-button")
        .within(dialog.clone())
        .first()
        .await?
        .ok_or_else(|| {
            ExtractionError::ElementNotFound("metric picker apply control".into())
        })?;
    apply.click().await?;

    if let Err(e) = page
        .locator("ytcp-metric-picker-dialog")
        .visible(true)
        .wait_gone(Some(PICKER_TIMEOUT))
        .await
    {
        warn!(error = %e, "metric picker still visible after apply, continuing");
    }

    // The table re-renders after apply; wait for the new header set.
    let confirmed = poll_until(TABLE_TIMEOUT, POLL_INTERVAL, || async {
        let table = match page.locator("yta-explore-table").first().await {
            Ok(Some(table)) => table,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };
        match header_texts(page, &table).await {
            Ok(headers) if all_required_present(&headers) => Some(Ok(())),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        }
    })
    .await
    .unwrap_or_else(|| {
        Err(ExtractionError::MetricTableNotReady(
            "required columns still missing after picker apply".into(),
        ))
    });
    confirmed
}

async fn wait_for_table(page: &Page) -> Result<HostElement, ExtractionError> {
    page.locator("yta-explore-table")
        .set_default_timeout(TABLE_TIMEOUT)
        .wait(None)
        .await
        .map_err(|e| match e {
            ExtractionError::Timeout(msg) => ExtractionError::MetricTableNotReady(msg),
            other => other,
        })
}

async fn header_texts(
    page: &Page,
    table: &HostElement,
) -> Result<Vec<String>, ExtractionError> {
    let mut out = Vec::new();
    for header in page
        .locator(".header-cell")
        .within(table.clone())
        .all()
        .await?
    {
        out.push(header.text().await?.trim().to_string());
    }
    Ok(out)
}

fn all_required_present(headers: &[String]) -> bool {
    REQUIRED_METRICS
        .iter()
        .all(|metric| headers.iter().any(|h| header_matches(h, metric.header)))
}

/// The cell under the header matching `needle`, if both exist.
fn cell_for(headers: &[String], cells: &[String], needle: &str) -> Option<String> {
    let idx = headers.iter().position(|h| header_matches(h, needle))?;
    cells.get(idx).cloned()
}

/// Headers sometimes carry decorations (sort arrows, info-icon text), so
/// match by case-insensitive containment rather than equality.
fn header_matches(rendered: &str, expected: &str) -> bool {
    rendered.to_lowercase().contains(&expected.to_lowercase())
}
