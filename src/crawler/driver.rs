//! Page driver abstraction
//!
//! A `PageDriver` hands out `Page` contexts; a `Page` can navigate, wait for
//! selectors, read text and links, and click. The crawl session only talks
//! to these traits, so a headless browser and the bundled static HTML driver
//! are interchangeable. `PagePool` caps how many contexts are open at once
//! across every running job.

use async_trait::async_trait;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// Errors raised by a page driver
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("timed out after {timeout:?} waiting for '{selector}'")]
    SelectorTimeout { selector: String, timeout: Duration },

    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("click on '{selector}' failed: {message}")]
    Click { selector: String, message: String },

    #[error("no document loaded")]
    NoDocument,

    #[error("page context unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for driver operations
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// One open page context
#[async_trait]
pub trait Page: Send {
    /// Navigates to `url` and waits for the document to load
    async fn goto(&mut self, url: &Url) -> DriverResult<()>;

    /// Waits until `selector` matches, or fails with `SelectorTimeout`
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> DriverResult<()>;

    /// Returns true if `selector` currently matches at least one element
    async fn exists(&mut self, selector: &str) -> DriverResult<bool>;

    /// Trimmed text of the first match, or None when nothing matches or the
    /// text is empty
    async fn text(&mut self, selector: &str) -> DriverResult<Option<String>>;

    /// Link targets of up to `limit` matching elements, in document order
    ///
    /// An element contributes its own `href`, or else the `href` of its
    /// first descendant anchor. Values are returned as written in the page.
    async fn hrefs(&mut self, selector: &str, limit: usize) -> DriverResult<Vec<String>>;

    /// Value shown next to the element whose text contains `label`
    async fn labelled_text(&mut self, label: &str) -> DriverResult<Option<String>>;

    /// Clicks the first element matching `selector`
    async fn click(&mut self, selector: &str) -> DriverResult<()>;

    /// Full serialized document
    async fn content(&mut self) -> DriverResult<String>;

    /// URL of the loaded document, after redirects and clicks
    fn location(&self) -> Option<Url>;
}

/// Source of page contexts
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn new_page(&self) -> DriverResult<Box<dyn Page>>;
}

/// Bounded pool of page contexts shared by all sessions
pub struct PagePool {
    driver: Arc<dyn PageDriver>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl PagePool {
    /// Creates a pool allowing `size` open pages at once
    pub fn new(driver: Arc<dyn PageDriver>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            driver,
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Waits for a free slot and opens a page in it
    ///
    /// The slot is released when the returned page is dropped.
    pub async fn acquire(&self) -> DriverResult<PooledPage> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DriverError::Unavailable("page pool is closed".to_string()))?;

        let page = self.driver.new_page().await?;

        Ok(PooledPage {
            page,
            _permit: permit,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Stops handing out pages; pending and future acquires fail
    pub fn close(&self) {
        self.permits.close();
    }
}

/// A page holding a pool slot
pub struct PooledPage {
    page: Box<dyn Page>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledPage {
    type Target = dyn Page;

    fn deref(&self) -> &Self::Target {
        self.page.as_ref()
    }
}

impl DerefMut for PooledPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.page.as_mut()
    }
}
