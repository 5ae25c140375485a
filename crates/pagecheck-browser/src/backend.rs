//! Browser backend abstraction layer
//!
//! The verification engine only talks to a browser through [`BrowserBackend`].
//! [`crate::chrome::ChromeBackend`] drives Chrome over the DevTools protocol;
//! `mock::ScriptedBackend` (feature `mock`) serves an in-memory page for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagecheck_core::{ImageInfo, Locator, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Page-space rectangle in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Snapshot of one element matched by a locator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Position within the locator's match list
    pub index: usize,
    pub tag: String,
    /// Rendered text, trimmed
    pub text: String,
    pub visible: bool,
    #[serde(default)]
    pub bounds: Option<BoundingBox>,
}

/// Console message severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Debug,
    Log,
    Info,
    Warning,
    Error,
}

/// A console message observed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    pub level: ConsoleLevel,
    pub text: String,
    pub observed_at: DateTime<Utc>,
}

impl ConsoleMessage {
    pub fn new(level: ConsoleLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            observed_at: Utc::now(),
        }
    }
}

/// A request the network stack gave up on (DNS failure, refused, blocked)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRequest {
    pub url: String,
    /// DevTools resource type, e.g. `Image` or `Script`
    pub resource_type: String,
    pub error_text: String,
    pub observed_at: DateTime<Utc>,
}

impl FailedRequest {
    pub fn new(
        url: impl Into<String>,
        resource_type: impl Into<String>,
        error_text: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            resource_type: resource_type.into(),
            error_text: error_text.into(),
            observed_at: Utc::now(),
        }
    }

    /// Human-readable description for a broken-resource event
    pub fn descriptor(&self) -> String {
        format!("{} request failed: {}", self.resource_type, self.error_text)
    }
}

/// Area handed to the screenshot primitive
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScreenshotArea {
    FullPage,
    Viewport,
    Clip(BoundingBox),
}

/// Capability set the verification engine needs from a browser
///
/// Element operations address an element by its position in the match list
/// of `locator`; backends re-resolve the locator on every call. Calls carry no
/// timeouts of their own, callers bound them with `tokio::time::timeout`.
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    /// Start loading `url`; returns once the document has committed
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Reload the current document
    async fn reload(&self) -> Result<()>;

    /// Resolve once the network has been quiet for `idle_window`
    async fn wait_for_quiescence(&self, idle_window: Duration) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// All elements currently matching `locator`
    async fn query(&self, locator: &Locator) -> Result<Vec<ElementInfo>>;

    /// Value of attribute `name` on match `index` (None if absent)
    async fn attribute(&self, locator: &Locator, index: usize, name: &str)
        -> Result<Option<String>>;

    async fn set_value(&self, locator: &Locator, index: usize, value: &str) -> Result<()>;

    async fn select_option(&self, locator: &Locator, index: usize, option: &str) -> Result<()>;

    async fn click(&self, locator: &Locator, index: usize) -> Result<()>;

    /// Scroll the window to `viewports` viewport heights from the top
    async fn scroll_to(&self, viewports: f64) -> Result<()>;

    /// PNG bytes of the requested area
    async fn screenshot(&self, area: ScreenshotArea) -> Result<Vec<u8>>;

    /// Inventory of every `<img>` element
    async fn images(&self) -> Result<Vec<ImageInfo>>;

    /// Start buffering console messages; repeated calls are no-ops
    async fn subscribe_console(&self) -> Result<()>;

    /// Take every buffered console message, in arrival order
    async fn drain_console(&self) -> Result<Vec<ConsoleMessage>>;

    /// Take every request that failed at the network level since the last drain
    async fn drain_failed_requests(&self) -> Result<Vec<FailedRequest>>;

    /// Release the browser
    async fn close(&self) -> Result<()>;
}

/// Shared handles forward to the backend they wrap
#[async_trait]
impl<T: BrowserBackend + ?Sized> BrowserBackend for Arc<T> {
    async fn navigate(&self, url: &str) -> Result<()> {
        (**self).navigate(url).await
    }

    async fn reload(&self) -> Result<()> {
        (**self).reload().await
    }

    async fn wait_for_quiescence(&self, idle_window: Duration) -> Result<()> {
        (**self).wait_for_quiescence(idle_window).await
    }

    async fn current_url(&self) -> Result<String> {
        (**self).current_url().await
    }

    async fn query(&self, locator: &Locator) -> Result<Vec<ElementInfo>> {
        (**self).query(locator).await
    }

    async fn attribute(
        &self,
        locator: &Locator,
        index: usize,
        name: &str,
    ) -> Result<Option<String>> {
        (**self).attribute(locator, index, name).await
    }

    async fn set_value(&self, locator: &Locator, index: usize, value: &str) -> Result<()> {
        (**self).set_value(locator, index, value).await
    }

    async fn select_option(&self, locator: &Locator, index: usize, option: &str) -> Result<()> {
        (**self).select_option(locator, index, option).await
    }

    async fn click(&self, locator: &Locator, index: usize) -> Result<()> {
        (**self).click(locator, index).await
    }

    async fn scroll_to(&self, viewports: f64) -> Result<()> {
        (**self).scroll_to(viewports).await
    }

    async fn screenshot(&self, area: ScreenshotArea) -> Result<Vec<u8>> {
        (**self).screenshot(area).await
    }

    async fn images(&self) -> Result<Vec<ImageInfo>> {
        (**self).images().await
    }

    async fn subscribe_console(&self) -> Result<()> {
        (**self).subscribe_console().await
    }

    async fn drain_console(&self) -> Result<Vec<ConsoleMessage>> {
        (**self).drain_console().await
    }

    async fn drain_failed_requests(&self) -> Result<Vec<FailedRequest>> {
        (**self).drain_failed_requests().await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}
