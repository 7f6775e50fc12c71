//! The seam between the extraction engine and the host page.
//!
//! Everything the engine consumes from the page goes through these two
//! traits: element lookup by selector, a visibility predicate, fresh
//! text/value/attribute reads, value writes that notify the host's reactive
//! input bindings, and click activation. Backends implement the traits;
//! [`crate::bridge::BridgeBackend`] is the production one, and the test
//! suite carries an in-memory fake.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::ExtractionError;
use crate::selector::Selector;

/// Backend-side element lookup.
///
/// `find_all` is a point-in-time snapshot query with no waiting; the
/// [`crate::locator::Locator`] layer supplies polling and timeouts on top.
#[async_trait]
pub trait HostBackend: Send + Sync {
    async fn find_all(
        &self,
        selector: &Selector,
        root: Option<&HostElement>,
    ) -> Result<Vec<HostElement>, ExtractionError>;
}

/// Backend-specific element implementation.
///
/// `tag`/`id` are snapshots taken at query time; text, value, attributes and
/// visibility are read fresh on every call because the host re-renders
/// asynchronously underneath us.
#[async_trait]
pub trait HostElementImpl: Send + Sync + Debug {
    /// Backend-scoped identity, stable while the element is attached.
    fn handle(&self) -> String;
    fn tag(&self) -> String;
    fn id(&self) -> Option<String>;

    async fn text(&self) -> Result<String, ExtractionError>;
    async fn attr(&self, name: &str) -> Result<Option<String>, ExtractionError>;
    async fn value(&self) -> Result<String, ExtractionError>;

    /// Write a field value in a way the host's reactive bindings observe
    /// (not a bare display-text assignment).
    async fn set_value(&self, value: &str) -> Result<(), ExtractionError>;
    async fn click(&self) -> Result<(), ExtractionError>;

    /// Rendered, non-zero size, not `display:none`.
    async fn is_visible(&self) -> Result<bool, ExtractionError>;

    fn clone_box(&self) -> Box<dyn HostElementImpl>;
}

/// A handle to one element on the host page.
#[derive(Debug)]
pub struct HostElement {
    inner: Box<dyn HostElementImpl>,
}

impl HostElement {
    pub fn new(impl_: impl HostElementImpl + 'static) -> Self {
        Self {
            inner: Box::new(impl_),
        }
    }

    pub fn handle(&self) -> String {
        self.inner.handle()
    }

    pub fn tag(&self) -> String {
        self.inner.tag()
    }

    pub fn id(&self) -> Option<String> {
        self.inner.id()
    }

    pub async fn text(&self) -> Result<String, ExtractionError> {
        self.inner.text().await
    }

    pub async fn attr(&self, name: &str) -> Result<Option<String>, ExtractionError> {
        self.inner.attr(name).await
    }

    pub async fn value(&self) -> Result<String, ExtractionError> {
        self.inner.value().await
    }

    pub async fn set_value(&self, value: &str) -> Result<(), ExtractionError> {
        self.inner.set_value(value).await
    }

    pub async fn click(&self) -> Result<(), ExtractionError> {
        self.inner.click().await
    }

    pub async fn is_visible(&self) -> Result<bool, ExtractionError> {
        self.inner.is_visible().await
    }
}

impl Clone for HostElement {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

/// The main entry point: one exclusively-owned host page.
///
/// Concurrent extraction runs against the same page are unsupported; the
/// page is treated as a single resource for the duration of a run.
#[derive(Clone)]
pub struct Page {
    backend: Arc<dyn HostBackend>,
}

impl Page {
    pub fn new(backend: Arc<dyn HostBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> Arc<dyn HostBackend> {
        self.backend.clone()
    }

    /// Build a locator for the given selector.
    pub fn locator(&self, selector: impl Into<Selector>) -> crate::locator::Locator {
        crate::locator::Locator::new(self.backend.clone(), selector.into())
    }

    /// Try an ordered list of independent lookup strategies, returning the
    /// first that yields a match. This is how unstable host identifiers are
    /// probed: primary identifier first, semantic text match next,
    /// structural fallback last.
    pub async fn first_match(
        &self,
        strategies: &[Selector],
    ) -> Result<Option<HostElement>, ExtractionError> {
        for selector in strategies {
            let found = self.backend.find_all(selector, None).await?;
            if let Some(el) = found.into_iter().next() {
                return Ok(Some(el));
            }
        }
        Ok(None)
    }
}
