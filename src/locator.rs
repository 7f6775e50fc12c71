use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::errors::ExtractionError;
use crate::host::{HostBackend, HostElement};
use crate::poll::{poll_until, POLL_INTERVAL};
use crate::selector::Selector;

// Default timeout if none is specified on the locator itself
const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(10);

/// A high-level API for finding and waiting on host-page elements.
///
/// A locator is a selector plus a default timeout and an optional root
/// element; every wait polls the backend at a fixed interval until the
/// condition resolves or the timeout elapses.
#[derive(Clone)]
pub struct Locator {
    backend: Arc<dyn HostBackend>,
    selector: Selector,
    timeout: Duration,
    root: Option<HostElement>,
}

impl Locator {
    pub(crate) fn new(backend: Arc<dyn HostBackend>, selector: Selector) -> Self {
        Self {
            backend,
            selector,
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            root: None,
        }
    }

    /// Set the default timeout used when a wait gets no explicit one.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Restrict lookup to descendants of the given element.
    pub fn within(mut self, element: HostElement) -> Self {
        self.root = Some(element);
        self
    }

    /// Refine to elements matching a further selector.
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        Locator {
            backend: self.backend.clone(),
            selector: self.selector.clone().then(selector.into()),
            timeout: self.timeout,
            root: self.root.clone(),
        }
    }

    /// Refine by visibility.
    pub fn visible(&self, is_visible: bool) -> Locator {
        self.locator(Selector::Visible(is_visible))
    }

    /// All current matches, without waiting.
    pub async fn all(&self) -> Result<Vec<HostElement>, ExtractionError> {
        self.backend
            .find_all(&self.selector, self.root.as_ref())
            .await
    }

    /// First current match, without waiting.
    pub async fn first(&self) -> Result<Option<HostElement>, ExtractionError> {
        Ok(self.all().await?.into_iter().next())
    }

    /// Wait for a matching element to appear.
    #[instrument(level = "debug", skip(self, timeout))]
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<HostElement, ExtractionError> {
        debug!(selector = %self.selector, "waiting for element");
        let effective = timeout.unwrap_or(self.timeout);
        poll_until(effective, POLL_INTERVAL, || async {
            match self.first().await {
                Ok(found) => found.map(Ok),
                Err(e) => Some(Err(e)),
            }
        })
        .await
        .unwrap_or_else(|| {
            Err(ExtractionError::Timeout(format!(
                "timed out after {effective:?} waiting for element {}",
                self.selector
            )))
        })
    }

    /// Wait for all matches of the selector to be gone (or never present).
    /// Dialog dismissal is observed this way.
    #[instrument(level = "debug", skip(self, timeout))]
    pub async fn wait_gone(&self, timeout: Option<Duration>) -> Result<(), ExtractionError> {
        let effective = timeout.unwrap_or(self.timeout);
        poll_until(effective, POLL_INTERVAL, || async {
            match self.all().await {
                Ok(found) if found.is_empty() => Some(Ok(())),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }
        })
        .await
        .unwrap_or_else(|| {
            Err(ExtractionError::Timeout(format!(
                "timed out after {effective:?} waiting for {} to be gone",
                self.selector
            )))
        })
    }

    /// Wait for exactly the matches that are currently visible; errors if
    /// nothing becomes visible within the timeout.
    pub async fn wait_visible(
        &self,
        timeout: Option<Duration>,
    ) -> Result<HostElement, ExtractionError> {
        self.visible(true).wait(timeout).await
    }

    pub fn selector_string(&self) -> String {
        self.selector.to_string()
    }
}
