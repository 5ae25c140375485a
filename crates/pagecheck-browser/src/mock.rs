//! In-memory scripted backend
//!
//! `ScriptedBackend` serves a fixed page model instead of a real browser:
//! elements answer to a list of CSS selectors, images carry natural sizes,
//! console errors are replayed on every load once a listener exists, and
//! failed requests are replayed on every load.
//! Every operation is counted so tests can assert what was attempted.

use crate::backend::{
    BoundingBox, BrowserBackend, ConsoleLevel, ConsoleMessage, ElementInfo, FailedRequest,
    ScreenshotArea,
};
use crate::error::{PageCheckError, Result};
use async_trait::async_trait;
use pagecheck_core::{AttributeMatch, ImageInfo, Locator, Selector};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// One element of the scripted page
#[derive(Debug, Clone, Default)]
pub struct MockElement {
    pub tag: String,
    /// CSS selectors this element matches
    pub matches: Vec<String>,
    pub text: String,
    pub attributes: HashMap<String, String>,
    /// CSS selector of the enclosing container, for scoped lookups
    pub container: Option<String>,
    /// Option values for `<select>` elements
    pub options: Vec<String>,
    pub value: String,
    pub visible: bool,
    pub bounds: Option<BoundingBox>,
}

impl MockElement {
    /// Visible element matching its tag name
    pub fn new(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self {
            matches: vec![tag.clone()],
            tag,
            visible: true,
            bounds: Some(BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 100.0,
                height: 20.0,
            }),
            ..Default::default()
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn also_matches(mut self, css: impl Into<String>) -> Self {
        self.matches.push(css.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn inside(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    fn is_match(&self, locator: &Locator) -> bool {
        if let Some(scope) = &locator.scope {
            if self.container.as_deref() != Some(scope.as_str()) {
                return false;
            }
        }

        let text = self.text.trim();
        match &locator.selector {
            Selector::Css { css } => self.matches.iter().any(|m| m == css),
            Selector::Text { text: wanted } => text.contains(wanted.as_str()),
            Selector::CssText { css, text: wanted } => {
                self.matches.iter().any(|m| m == css) && text.contains(wanted.as_str())
            }
            Selector::Attribute {
                css,
                name,
                value,
                mode,
            } => {
                self.matches.iter().any(|m| m == css)
                    && self.attributes.get(name).is_some_and(|actual| match mode {
                        AttributeMatch::Exact => actual == value,
                        AttributeMatch::Contains => actual.contains(value.as_str()),
                    })
            }
        }
    }
}

/// Scripted page contents
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    pub elements: Vec<MockElement>,
    pub images: Vec<ImageInfo>,
    /// Console errors logged by the page on every load
    pub console_errors: Vec<String>,
    /// (url, resource type, error) of requests that fail on every load
    pub failed_requests: Vec<(String, String, String)>,
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Add an `<img>`; `loaded = false` gives it zero natural size
    pub fn image(mut self, src: impl Into<String>, alt: Option<&str>, loaded: bool) -> Self {
        let natural = if loaded { 640 } else { 0 };
        self.images.push(ImageInfo {
            index: self.images.len(),
            src: src.into(),
            alt: alt.map(str::to_string),
            visible: loaded,
            width: if loaded { 640.0 } else { 0.0 },
            height: if loaded { 480.0 } else { 0.0 },
            natural_width: natural,
            natural_height: natural,
        });
        self
    }

    pub fn console_error(mut self, message: impl Into<String>) -> Self {
        self.console_errors.push(message.into());
        self
    }

    pub fn failed_request(
        mut self,
        url: impl Into<String>,
        resource_type: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        self.failed_requests
            .push((url.into(), resource_type.into(), error.into()));
        self
    }
}

/// Operation counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub navigations: usize,
    pub reloads: usize,
    pub queries: usize,
    pub fills: usize,
    pub selects: usize,
    pub clicks: usize,
    pub screenshots: usize,
    pub image_scans: usize,
    pub subscriptions: usize,
    pub closes: usize,
}

#[derive(Debug, Default)]
struct MockState {
    page: MockPage,
    url: Option<String>,
    navigation_failure: Option<String>,
    hang_on_load: bool,
    screenshot_failure: Option<String>,
    hang_on_screenshot: bool,
    image_failure: Option<String>,
    subscribed: bool,
    console: Vec<ConsoleMessage>,
    failed: Vec<FailedRequest>,
    scroll_viewports: f64,
    next_capture: usize,
    /// Human-readable log of side-effecting operations
    actions: Vec<String>,
    counts: CallCounts,
}

/// Backend serving a [`MockPage`]
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    state: Mutex<MockState>,
}

impl ScriptedBackend {
    pub fn new(page: MockPage) -> Self {
        Self {
            state: Mutex::new(MockState {
                page,
                ..Default::default()
            }),
        }
    }

    /// Make navigation fail with `reason` (e.g. connection refused)
    pub fn failing_navigation(self, reason: impl Into<String>) -> Self {
        self.lock_state().navigation_failure = Some(reason.into());
        self
    }

    /// Make loads never reach quiescence
    pub fn hanging(self) -> Self {
        self.lock_state().hang_on_load = true;
        self
    }

    /// Make every screenshot fail with `reason`
    pub fn failing_screenshots(self, reason: impl Into<String>) -> Self {
        self.lock_state().screenshot_failure = Some(reason.into());
        self
    }

    /// Make every screenshot block forever
    pub fn hanging_screenshots(self) -> Self {
        self.lock_state().hang_on_screenshot = true;
        self
    }

    /// Make every image inventory fail with `reason`
    pub fn failing_images(self, reason: impl Into<String>) -> Self {
        self.lock_state().image_failure = Some(reason.into());
        self
    }

    pub fn counts(&self) -> CallCounts {
        self.lock_state().counts.clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.lock_state().actions.clone()
    }

    /// Current value of the first element matching `css`
    pub fn value_of(&self, css: &str) -> Option<String> {
        let locator = Locator::new(Selector::css(css));
        self.lock_state()
            .page
            .elements
            .iter()
            .find(|e| e.is_match(&locator))
            .map(|e| e.value.clone())
    }

    /// Replace the page model, as if the site changed between loads
    pub fn set_page(&self, page: MockPage) {
        self.lock_state().page = page;
    }

    fn lock_state(&self) -> MutexGuard<'_, MockState> {
        // Poisoning only means a test assertion panicked mid-call
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load(&self, url: &str) -> Result<()> {
        let mut state = self.lock_state();
        if let Some(reason) = &state.navigation_failure {
            return Err(PageCheckError::Navigation {
                url: url.to_string(),
                reason: reason.clone(),
            });
        }
        state.url = Some(url.to_string());
        state.scroll_viewports = 0.0;
        for element in &mut state.page.elements {
            element.value.clear();
        }
        if state.subscribed {
            let messages: Vec<ConsoleMessage> = state
                .page
                .console_errors
                .iter()
                .map(|text| ConsoleMessage::new(ConsoleLevel::Error, text.clone()))
                .collect();
            state.console.extend(messages);
        }
        let failures: Vec<FailedRequest> = state
            .page
            .failed_requests
            .iter()
            .map(|(url, kind, error)| FailedRequest::new(url.clone(), kind.clone(), error.clone()))
            .collect();
        state.failed.extend(failures);
        Ok(())
    }

    fn with_element<T>(
        &self,
        locator: &Locator,
        index: usize,
        f: impl FnOnce(&mut MockElement) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.lock_state();
        let element = state
            .page
            .elements
            .iter_mut()
            .filter(|e| e.is_match(locator))
            .nth(index)
            .ok_or_else(|| {
                PageCheckError::Backend(format!("element {} of {} not present", index, locator))
            })?;
        f(element)
    }
}

#[async_trait]
impl BrowserBackend for ScriptedBackend {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.lock_state().counts.navigations += 1;
        self.load(url)
    }

    async fn reload(&self) -> Result<()> {
        let url = {
            let mut state = self.lock_state();
            state.counts.reloads += 1;
            state.url.clone().unwrap_or_else(|| "about:blank".to_string())
        };
        self.load(&url)
    }

    async fn wait_for_quiescence(&self, _idle_window: Duration) -> Result<()> {
        let hang = self.lock_state().hang_on_load;
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.lock_state().url.clone().unwrap_or_default())
    }

    async fn query(&self, locator: &Locator) -> Result<Vec<ElementInfo>> {
        let mut state = self.lock_state();
        state.counts.queries += 1;
        Ok(state
            .page
            .elements
            .iter()
            .filter(|e| e.is_match(locator))
            .enumerate()
            .map(|(index, e)| ElementInfo {
                index,
                tag: e.tag.clone(),
                text: e.text.trim().to_string(),
                visible: e.visible,
                bounds: e.bounds,
            })
            .collect())
    }

    async fn attribute(
        &self,
        locator: &Locator,
        index: usize,
        name: &str,
    ) -> Result<Option<String>> {
        self.with_element(locator, index, |e| Ok(e.attributes.get(name).cloned()))
    }

    async fn set_value(&self, locator: &Locator, index: usize, value: &str) -> Result<()> {
        self.with_element(locator, index, |e| {
            e.value = value.to_string();
            Ok(())
        })?;
        let mut state = self.lock_state();
        state.counts.fills += 1;
        state.actions.push(format!("fill {}={}", locator, value));
        Ok(())
    }

    async fn select_option(&self, locator: &Locator, index: usize, option: &str) -> Result<()> {
        self.with_element(locator, index, |e| {
            if !e.options.iter().any(|o| o == option) {
                return Err(PageCheckError::Backend(format!(
                    "{} has no option {:?}",
                    locator, option
                )));
            }
            e.value = option.to_string();
            Ok(())
        })?;
        let mut state = self.lock_state();
        state.counts.selects += 1;
        state.actions.push(format!("select {}={}", locator, option));
        Ok(())
    }

    async fn click(&self, locator: &Locator, index: usize) -> Result<()> {
        self.with_element(locator, index, |_| Ok(()))?;
        let mut state = self.lock_state();
        state.counts.clicks += 1;
        state.actions.push(format!("click {}", locator));
        Ok(())
    }

    async fn scroll_to(&self, viewports: f64) -> Result<()> {
        self.lock_state().scroll_viewports = viewports;
        Ok(())
    }

    async fn screenshot(&self, area: ScreenshotArea) -> Result<Vec<u8>> {
        let hang = self.lock_state().hang_on_screenshot;
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.lock_state();
        if let Some(reason) = &state.screenshot_failure {
            return Err(PageCheckError::Capture(reason.clone()));
        }
        state.counts.screenshots += 1;
        state.next_capture += 1;
        let area = match area {
            ScreenshotArea::FullPage => "full".to_string(),
            ScreenshotArea::Viewport => format!("viewport@{}", state.scroll_viewports),
            ScreenshotArea::Clip(b) => format!("clip@{},{} {}x{}", b.x, b.y, b.width, b.height),
        };
        Ok(format!("capture-{} {}", state.next_capture, area).into_bytes())
    }

    async fn images(&self) -> Result<Vec<ImageInfo>> {
        let mut state = self.lock_state();
        state.counts.image_scans += 1;
        if let Some(reason) = &state.image_failure {
            return Err(PageCheckError::Backend(reason.clone()));
        }
        Ok(state.page.images.clone())
    }

    async fn subscribe_console(&self) -> Result<()> {
        let mut state = self.lock_state();
        if !state.subscribed {
            state.subscribed = true;
            state.counts.subscriptions += 1;
        }
        Ok(())
    }

    async fn drain_console(&self) -> Result<Vec<ConsoleMessage>> {
        Ok(std::mem::take(&mut self.lock_state().console))
    }

    async fn drain_failed_requests(&self) -> Result<Vec<FailedRequest>> {
        Ok(std::mem::take(&mut self.lock_state().failed))
    }

    async fn close(&self) -> Result<()> {
        self.lock_state().counts.closes += 1;
        Ok(())
    }
}
