//! The date-range controller: a retry-capable state machine that drives the
//! host's validation-heavy date-range widget.
//!
//! One commit runs `Idle -> SurfaceOpen -> OptionSelected -> DialogOpen ->
//! ValuesSet -> Committed -> Verified`, returning to `Idle` on success.
//! `Failed` is reachable from every state. Only `ValidationRejected` is
//! retried, exactly once, with the alternate date encoding.

use std::fmt;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::errors::ExtractionError;
use crate::host::{HostElement, Page};
use crate::poll::{poll_until, READBACK_POLL_INTERVAL};
use crate::range::encoding::{
    choose_order, day_component, detect_encoding, encoding_from_rejection, format_window,
};
use crate::selector::Selector;
use crate::types::{CommitAttempt, DateEncoding, DateWindow, OrderStrategy};

use chrono::Datelike;

/// Explicit knobs for the heuristic parts of the commit flow.
#[derive(Debug, Clone)]
pub struct RangeConfig {
    /// Encoding assumed when the prefilled values are ambiguous.
    pub default_encoding: DateEncoding,
    /// Whether a `ValidationRejected` gets one retry with the alternate
    /// encoding.
    pub retry_alternate_encoding: bool,
    pub surface_timeout: Duration,
    pub dialog_timeout: Duration,
    /// Wait for the dialog to close after commit. Elapsing is tolerated;
    /// some host variants close asynchronously after the readback updates.
    pub commit_close_timeout: Duration,
    pub verify_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            default_encoding: DateEncoding::DayFirst,
            retry_alternate_encoding: true,
            surface_timeout: Duration::from_secs(3),
            dialog_timeout: Duration::from_secs(5),
            commit_close_timeout: Duration::from_secs(5),
            verify_timeout: Duration::from_secs(10),
            poll_interval: crate::poll::POLL_INTERVAL,
        }
    }
}

/// Where the state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    SurfaceOpen,
    OptionSelected,
    DialogOpen,
    ValuesSet,
    Committed,
    Verified,
    Failed,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Drives the host's date-range widget.
pub struct RangeController {
    page: Page,
    config: RangeConfig,
    state: ControllerState,
    /// Encoding the most recent attempt wrote with. The retry flips this
    /// one, which may differ from the default when the prefill probe
    /// overrode it.
    last_attempt_encoding: Option<DateEncoding>,
}

static PERIOD_ENTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d+\s+days|lifetime|custom|since|\d{4}").expect("static regex"));

impl RangeController {
    pub fn new(page: Page) -> Self {
        Self::with_config(page, RangeConfig::default())
    }

    pub fn with_config(page: Page, config: RangeConfig) -> Self {
        Self {
            page,
            config,
            state: ControllerState::Idle,
            last_attempt_encoding: None,
        }
    }

    /// The state the last commit ended in (`Idle` after a success).
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Commit `window` to the host, retrying once with the alternate
    /// encoding if the host rejects the first attempt's format. The retry
    /// encoding comes from the rejection message when it echoes a date,
    /// otherwise it is the opposite of whatever the rejected attempt wrote.
    #[instrument(level = "info", skip(self), fields(window = %window))]
    pub async fn commit_window(&mut self, window: &DateWindow) -> Result<(), ExtractionError> {
        match self.run_attempt(window, None).await {
            Ok(()) => Ok(()),
            Err(ExtractionError::ValidationRejected(messages))
                if self.config.retry_alternate_encoding =>
            {
                let rejected_encoding = self
                    .last_attempt_encoding
                    .unwrap_or(self.config.default_encoding);
                let retry_encoding = encoding_from_rejection(&messages)
                    .unwrap_or_else(|| rejected_encoding.alternate());
                warn!(
                    ?messages,
                    ?retry_encoding,
                    "validation rejected, retrying once with alternate encoding"
                );
                self.run_attempt(window, Some(retry_encoding)).await
            }
            Err(other) => Err(other),
        }
    }

    async fn run_attempt(
        &mut self,
        window: &DateWindow,
        encoding_override: Option<DateEncoding>,
    ) -> Result<(), ExtractionError> {
        self.state = ControllerState::Idle;
        let result = self.attempt_inner(window, encoding_override).await;
        match &result {
            Ok(()) => self.state = ControllerState::Idle,
            Err(_) => self.state = ControllerState::Failed,
        }
        result
    }

    async fn attempt_inner(
        &mut self,
        window: &DateWindow,
        encoding_override: Option<DateEncoding>,
    ) -> Result<(), ExtractionError> {
        // Idle -> SurfaceOpen
        let trigger = self.find_range_trigger().await?;
        let readback_before = trigger.text().await?;
        trigger.click().await?;
        let surface = self.wait_for_range_surface().await?;
        self.transition(ControllerState::SurfaceOpen);

        // SurfaceOpen -> OptionSelected
        let custom = self.find_custom_option(&surface).await?;
        custom.click().await?;
        self.transition(ControllerState::OptionSelected);

        // OptionSelected -> DialogOpen
        let dialog = self.wait_for_visible_dialog().await?;
        self.transition(ControllerState::DialogOpen);

        // DialogOpen -> ValuesSet
        let attempt = self
            .write_window(&dialog, window, encoding_override)
            .await?;
        self.transition(ControllerState::ValuesSet);

        // ValuesSet -> Committed
        self.commit_dialog(&dialog).await?;
        self.transition(ControllerState::Committed);

        // Committed -> Verified
        self.verify_readback(&attempt, &readback_before).await?;
        self.transition(ControllerState::Verified);
        info!(window = %window, "date range committed and verified");
        Ok(())
    }

    fn transition(&mut self, next: ControllerState) {
        debug!(from = %self.state, to = %next, "controller transition");
        self.state = next;
    }

    /// The host has at least two widget layouts for the range control,
    /// depending on which report is active. Probe them in order: the explore
    /// sidebar, the overview time picker, then any trigger on the page whose
    /// readback text is date-like.
    async fn find_range_trigger(&self) -> Result<HostElement, ExtractionError> {
        let scopes = [
            Some(Selector::from("yta-explore-sidebar")),
            Some(Selector::from("yta-time-picker")),
            None,
        ];
        for scope in scopes {
            let selector = match scope {
                Some(scope) => scope.then(Selector::from("ytcp-dropdown-trigger")),
                None => Selector::from("ytcp-dropdown-trigger"),
            };
            let candidates = self.page.locator(selector).all().await?;
            for candidate in candidates {
                let text = candidate.text().await?;
                if is_range_readback(&text) {
                    return Ok(candidate);
                }
            }
        }
        Err(ExtractionError::SurfaceDidNotOpen(
            "no date-range trigger in any known widget layout".into(),
        ))
    }

    /// Wait for a visible selection surface whose entries are date-like,
    /// ignoring superficially similar option lists on the same page.
    async fn wait_for_range_surface(&self) -> Result<HostElement, ExtractionError> {
        let page = self.page.clone();
        poll_until(
            self.config.surface_timeout,
            self.config.poll_interval,
            || {
                let page = page.clone();
                async move {
                    let listboxes = match page
                        .locator("tp-yt-paper-listbox >> visible:true")
                        .all()
                        .await
                    {
                        Ok(found) => found,
                        Err(e) => return Some(Err(e)),
                    };
                    for listbox in listboxes {
                        match surface_is_date_like(&page, &listbox).await {
                            Ok(true) => return Some(Ok(listbox)),
                            Ok(false) => continue,
                            Err(e) => return Some(Err(e)),
                        }
                    }
                    None
                }
            },
        )
        .await
        .unwrap_or_else(|| {
            Err(ExtractionError::SurfaceDidNotOpen(format!(
                "no date-like selection surface within {:?}",
                self.config.surface_timeout
            )))
        })
    }

    /// The entry that enables arbitrary range entry: stable `test-id`
    /// attribute first, displayed text as fallback.
    async fn find_custom_option(
        &self,
        surface: &HostElement,
    ) -> Result<HostElement, ExtractionError> {
        let items = self
            .page
            .locator("tp-yt-paper-item")
            .within(surface.clone())
            .all()
            .await?;
        for item in &items {
            if item.attr("test-id").await?.as_deref() == Some("fixed") {
                return Ok(item.clone());
            }
        }
        for item in &items {
            if item.text().await?.trim().eq_ignore_ascii_case("custom") {
                return Ok(item.clone());
            }
        }
        Err(ExtractionError::OptionNotFound(
            "custom-range entry absent from the selection surface".into(),
        ))
    }

    /// Exactly one *visible* dialog wins; stale dialogs from other report
    /// tabs linger invisibly in the page.
    async fn wait_for_visible_dialog(&self) -> Result<HostElement, ExtractionError> {
        self.page
            .locator("ytcp-date-period-picker")
            .visible(true)
            .wait(Some(self.config.dialog_timeout))
            .await
            .map_err(|e| match e {
                ExtractionError::Timeout(msg) => ExtractionError::DialogNotFound(msg),
                other => other,
            })
    }

    async fn write_window(
        &mut self,
        dialog: &HostElement,
        window: &DateWindow,
        encoding_override: Option<DateEncoding>,
    ) -> Result<CommitAttempt, ExtractionError> {
        let start_input = self.dialog_input(dialog, "start-date").await?;
        let end_input = self.dialog_input(dialog, "end-date").await?;

        let prefilled_start = start_input.value().await?;
        let prefilled_end = end_input.value().await?;
        debug!(%prefilled_start, %prefilled_end, "dialog prefilled values");

        let encoding = encoding_override.unwrap_or_else(|| {
            detect_encoding(
                &[prefilled_start.as_str(), prefilled_end.as_str()],
                self.config.default_encoding,
            )
        });
        self.last_attempt_encoding = Some(encoding);
        let (start_text, end_text) = format_window(window, encoding);

        let prefilled_days = match (
            day_component(&prefilled_start, encoding),
            day_component(&prefilled_end, encoding),
        ) {
            (Some(s), Some(e)) => Some((s, e)),
            _ => None,
        };
        let order = choose_order(prefilled_days, (window.start().day(), window.end().day()));
        debug!(?encoding, ?order, %start_text, %end_text, "writing window");

        match order {
            OrderStrategy::EndFirst => {
                end_input.set_value(&end_text).await?;
                start_input.set_value(&start_text).await?;
            }
            OrderStrategy::StartFirst => {
                start_input.set_value(&start_text).await?;
                end_input.set_value(&end_text).await?;
            }
        }

        let messages = self.validation_messages(dialog).await?;
        if !messages.is_empty() {
            return Err(ExtractionError::ValidationRejected(messages));
        }

        Ok(CommitAttempt {
            window: *window,
            encoding,
            order,
        })
    }

    async fn dialog_input(
        &self,
        dialog: &HostElement,
        field_id: &str,
    ) -> Result<HostElement, ExtractionError> {
        self.page
            .locator(Selector::Id(field_id.into()).then(Selector::Tag("input".into())))
            .within(dialog.clone())
            .first()
            .await?
            .ok_or_else(|| {
                ExtractionError::InputsNotFound(format!("no input under #{field_id}"))
            })
    }

    /// Scan the dialog for validation-error indicators and collect their
    /// messages. Any hit aborts the attempt before commit.
    async fn validation_messages(
        &self,
        dialog: &HostElement,
    ) -> Result<Vec<String>, ExtractionError> {
        let indicator_selectors = [
            Selector::from(".error"),
            Selector::from("attr:role=alert"),
            Selector::from(".validation-error"),
        ];
        let mut messages = Vec::new();
        for selector in indicator_selectors {
            let hits = self
                .page
                .locator(selector)
                .within(dialog.clone())
                .all()
                .await?;
            for hit in hits {
                let text = hit.text().await?.trim().to_string();
                if !text.is_empty() && !messages.contains(&text) {
                    messages.push(text);
                }
            }
        }
        Ok(messages)
    }

    async fn commit_dialog(&self, dialog: &HostElement) -> Result<(), ExtractionError> {
        let apply = self
            .page
            .locator("#apply-button")
            .within(dialog.clone())
            .first()
            .await?
            .ok_or_else(|| {
                ExtractionError::InputsNotFound("dialog has no apply control".into())
            })?;
        apply.click().await?;

        // Tolerated when it elapses: some host variants dismiss the dialog
        // asynchronously after the readback already updated.
        let closed = self
            .page
            .locator("ytcp-date-period-picker")
            .visible(true)
            .wait_gone(Some(self.config.commit_close_timeout))
            .await;
        if let Err(e) = closed {
            warn!(error = %e, "dialog still visible after commit, continuing");
        }
        Ok(())
    }

    /// Poll the control's readback text until it differs from its pre-commit
    /// value, then require both requested day numerals in it.
    ///
    /// A readback that never moved at all is `CommitTimeout` (the host
    /// swallowed the commit); one that changed but lacks a requested day is
    /// `DatesNotApplied` (the host applied something else).
    async fn verify_readback(
        &self,
        attempt: &CommitAttempt,
        readback_before: &str,
    ) -> Result<(), ExtractionError> {
        let changed = poll_until(
            self.config.verify_timeout,
            READBACK_POLL_INTERVAL,
            || async {
                match self.find_range_trigger().await {
                    Ok(trigger) => match trigger.text().await {
                        Ok(text) if text != readback_before => Some(Ok(text)),
                        Ok(_) => None,
                        Err(e) => Some(Err(e)),
                    },
                    // The trigger can momentarily vanish during a re-render.
                    Err(_) => None,
                }
            },
        )
        .await
        .transpose()?;

        let readback = match changed {
            Some(text) => text,
            None => {
                // Unchanged readback is still fine when the window was
                // already applied (recommitting the same range).
                let trigger = self.find_range_trigger().await?;
                trigger.text().await?
            }
        };

        let start_day = attempt.window.start().day().to_string();
        let end_day = attempt.window.end().day().to_string();
        let has_start = readback.contains(&start_day);
        let has_end = readback.contains(&end_day);
        debug!(%readback, %start_day, %end_day, has_start, has_end, "readback verification");

        if has_start && has_end {
            Ok(())
        } else if readback == readback_before {
            Err(ExtractionError::CommitTimeout(format!(
                "readback never updated from {readback_before:?} within {:?}",
                self.config.verify_timeout
            )))
        } else {
            Err(ExtractionError::DatesNotApplied(format!(
                "readback {readback:?} is missing day {} and/or {}",
                start_day, end_day
            )))
        }
    }
}

/// Does this text look like a range control's readback ("12 – 19 Oct 2025",
/// "Since published", "Last 28 days")?
fn is_range_readback(text: &str) -> bool {
    text.contains('\u{2013}') || text.contains("Since") || text.contains("days")
}

/// Does this selection surface list date-period entries rather than some
/// unrelated option set?
async fn surface_is_date_like(
    page: &Page,
    listbox: &HostElement,
) -> Result<bool, ExtractionError> {
    let items = page
        .locator("tp-yt-paper-item")
        .within(listbox.clone())
        .all()
        .await?;
    for item in items {
        if let Some(test_id) = item.attr("test-id").await? {
            if test_id == "fixed" {
                return Ok(true);
            }
        }
        if PERIOD_ENTRY_RE.is_match(&item.text().await?) {
            return Ok(true);
        }
    }
    Ok(false)
}
