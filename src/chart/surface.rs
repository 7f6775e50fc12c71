//! Locating the rendered retention chart and scraping its raw geometry
//! (curve path, tick labels, tick pixel offsets) through the host seam.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::chart::axis::{AxisCalibration, AxisKind, AxisTick};
use crate::chart::decoder::{decode_at, query_time_for};
use crate::chart::path::{parse_line_path, ChartPoint};
use crate::errors::ExtractionError;
use crate::host::{HostElement, Page};
use crate::poll::{poll_until, POLL_INTERVAL};
use crate::selector::Selector;
use crate::types::RetentionSample;

const CHART_TIMEOUT: Duration = Duration::from_secs(10);

static TRANSLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"translate\(([^,]+),([^)]+)\)").expect("static regex"));

/// The scraped chart, ready for decoding.
#[derive(Debug, Clone)]
pub struct RetentionChart {
    pub points: Vec<ChartPoint>,
    pub time_axis: AxisCalibration,
    pub percent_axis: AxisCalibration,
}

impl RetentionChart {
    /// Decode the retention sample for this chart's content type (3 s for
    /// short-form, 30 s otherwise). Returns `None` when the query time lies
    /// beyond the calibrated domain; short charts are never extrapolated.
    pub fn sample(&self) -> Result<Option<RetentionSample>, ExtractionError> {
        let query_secs = query_time_for(self.time_axis.domain_max);
        if query_secs > self.time_axis.domain_max {
            debug!(
                query_secs,
                domain_max = self.time_axis.domain_max,
                "query time beyond chart domain, reporting retention absent"
            );
            return Ok(None);
        }
        decode_at(&self.points, &self.time_axis, &self.percent_axis, query_secs).map(Some)
    }
}

/// Wait for the retention chart's SVG and scrape curve and axes.
///
/// Calibration is rebuilt from the currently rendered ticks on every call.
#[instrument(level = "debug", skip(page))]
pub async fn read_retention_chart(page: &Page) -> Result<RetentionChart, ExtractionError> {
    // The retention card embeds its chart next to the player; a bare
    // line-chart match is the fallback for older report layouts.
    let strategies = [
        Selector::from("yta-explore-chart-with-player >> yta-line-chart-base >> tag:svg"),
        Selector::from("yta-line-chart-base >> tag:svg"),
    ];
    let svg = poll_until(CHART_TIMEOUT, POLL_INTERVAL, || async {
        match page.first_match(&strategies).await {
            Ok(found) => found.map(Ok),
            Err(e) => Some(Err(e)),
        }
    })
    .await
    .unwrap_or_else(|| {
        Err(ExtractionError::ChartNotReady(
            "retention chart SVG never appeared".into(),
        ))
    })?;

    let path = page
        .locator(Selector::Class("line-series".into()))
        .within(svg.clone())
        .first()
        .await?
        .ok_or_else(|| {
            ExtractionError::ChartNotReady("curve path not rendered yet".into())
        })?;
    let d = path.attr("d").await?.unwrap_or_default();
    let points = parse_line_path(&d)?;

    let time_ticks = read_axis_ticks(page, &svg, "x axis", TranslateComponent::X).await?;
    let percent_ticks = read_axis_ticks(page, &svg, "y2 axis", TranslateComponent::Y).await?;

    let time_axis = AxisCalibration::from_ticks(AxisKind::Duration, &time_ticks)?;
    let percent_axis = AxisCalibration::from_ticks(AxisKind::Percentage, &percent_ticks)?;
    debug!(
        points = points.len(),
        time_span = time_axis.domain_span(),
        percent_span = percent_axis.domain_span(),
        "retention chart scraped"
    );

    Ok(RetentionChart {
        points,
        time_axis,
        percent_axis,
    })
}

/// Scrape the chart and decode its sample in one step.
pub async fn extract_retention(page: &Page) -> Result<Option<RetentionSample>, ExtractionError> {
    read_retention_chart(page).await?.sample()
}

#[derive(Clone, Copy)]
enum TranslateComponent {
    X,
    Y,
}

async fn read_axis_ticks(
    page: &Page,
    svg: &HostElement,
    axis_class: &str,
    component: TranslateComponent,
) -> Result<Vec<AxisTick>, ExtractionError> {
    let ticks = page
        .locator(Selector::Class(axis_class.into()).then(Selector::Class("tick".into())))
        .within(svg.clone())
        .all()
        .await?;

    let mut out = Vec::with_capacity(ticks.len());
    for tick in &ticks {
        let label = match page
            .locator("tag:text >> tag:tspan")
            .within(tick.clone())
            .first()
            .await?
        {
            Some(tspan) => tspan.text().await?,
            None => continue,
        };
        let transform = tick.attr("transform").await?.unwrap_or_default();
        let Some(pixel) = parse_translate(&transform, component) else {
            warn!(%transform, "tick without a parseable translate, skipping");
            continue;
        };
        out.push(AxisTick::new(label.trim(), pixel));
    }
    Ok(out)
}

fn parse_translate(transform: &str, component: TranslateComponent) -> Option<f64> {
    let caps = TRANSLATE_RE.captures(transform)?;
    let idx = match component {
        TranslateComponent::X => 1,
        TranslateComponent::Y => 2,
    };
    caps.get(idx)?.as_str().trim().parse::<f64>().ok()
}
