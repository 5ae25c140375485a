//! Chrome backend using the Chrome DevTools Protocol
//!
//! `headless_chrome` is a blocking client. Every call runs on tokio's blocking
//! pool so that a harness-level timeout can abandon a stuck call.
//!
//! One listener per tab records network, log and console events as they
//! arrive. Quiescence means no request in flight for the idle window once the
//! document is complete.

use crate::backend::{
    BoundingBox, BrowserBackend, ConsoleLevel, ConsoleMessage, ElementInfo, FailedRequest,
    ScreenshotArea,
};
use crate::error::{PageCheckError, Result};
use crate::script;
use async_trait::async_trait;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Log::LogEntryLevel;
use headless_chrome::protocol::cdp::Network;
use headless_chrome::protocol::cdp::Page::{CaptureScreenshotFormatOption, Viewport};
use headless_chrome::protocol::cdp::Runtime::{ConsoleAPICalledEventTypeOption, RemoteObject};
use headless_chrome::{Browser, LaunchOptions, Tab};
use pagecheck_core::{BrowserSettings, ImageInfo, Locator, RunConfig};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Interval between samples while waiting for quiescence
const QUIESCENCE_POLL: Duration = Duration::from_millis(100);

/// Headroom of the tab's own waits over the harness timeouts
const TAB_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Configuration for browser launch
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run in headless mode (default: true)
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// User agent string
    pub user_agent: Option<String>,
    /// Launch timeout in seconds
    pub launch_timeout_seconds: u64,
    /// Bound on headless_chrome's internal waits (navigation commit, element
    /// lookups). Must exceed the navigation timeout so that a slow load is
    /// reported as a timeout rather than a load failure.
    pub page_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            user_agent: None,
            launch_timeout_seconds: 30,
            page_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&BrowserSettings> for BrowserConfig {
    fn from(settings: &BrowserSettings) -> Self {
        Self {
            headless: settings.headless,
            window_width: settings.window_width,
            window_height: settings.window_height,
            user_agent: settings.user_agent.clone(),
            launch_timeout_seconds: settings.launch_timeout_secs,
            ..Self::default()
        }
    }
}

impl BrowserConfig {
    /// Browser settings of `config`, with tab waits outlasting its timeouts
    pub fn for_run(config: &RunConfig) -> Self {
        let navigation = &config.navigation;
        Self {
            page_timeout: navigation
                .stability_timeout()
                .max(navigation.capture_timeout())
                + TAB_TIMEOUT_MARGIN,
            ..Self::from(&config.browser)
        }
    }
}

/// In-flight request bookkeeping for network quiescence
#[derive(Debug)]
struct RequestLedger {
    /// Request id to URL
    in_flight: HashMap<String, String>,
    last_change: Instant,
}

impl Default for RequestLedger {
    fn default() -> Self {
        Self {
            in_flight: HashMap::new(),
            last_change: Instant::now(),
        }
    }
}

impl RequestLedger {
    fn started(&mut self, request_id: &str, url: &str) {
        self.in_flight.insert(request_id.to_string(), url.to_string());
        self.last_change = Instant::now();
    }

    /// URL of the request if it was being tracked
    fn finished(&mut self, request_id: &str) -> Option<String> {
        let url = self.in_flight.remove(request_id);
        if url.is_some() {
            self.last_change = Instant::now();
        }
        url
    }

    /// Forget everything; the next document starts from a clean slate
    fn reset(&mut self) {
        self.in_flight.clear();
        self.last_change = Instant::now();
    }

    /// How long no request has been pending, `None` while any is
    fn idle_for(&self, now: Instant) -> Option<Duration> {
        if self.in_flight.is_empty() {
            Some(now.saturating_duration_since(self.last_change))
        } else {
            None
        }
    }
}

/// Everything the tab listener records
#[derive(Debug, Default)]
struct PageEvents {
    /// Console messages are kept only once someone subscribed
    console_enabled: bool,
    console: Vec<ConsoleMessage>,
    failed: Vec<FailedRequest>,
    requests: RequestLedger,
}

impl PageEvents {
    fn record(&mut self, event: &Event) {
        match event {
            Event::NetworkRequestWillBeSent(sent) => {
                self.requests
                    .started(&sent.params.request_id, &sent.params.request.url);
            }
            Event::NetworkLoadingFinished(done) => {
                self.requests.finished(&done.params.request_id);
            }
            Event::NetworkLoadingFailed(failed) => {
                let url = self.requests.finished(&failed.params.request_id);
                if let (Some(url), false) = (url, failed.params.canceled.unwrap_or(false)) {
                    self.failed.push(FailedRequest::new(
                        url,
                        format!("{:?}", failed.params.Type),
                        failed.params.error_text.clone(),
                    ));
                }
            }
            Event::RuntimeConsoleAPICalled(called) if self.console_enabled => {
                self.console.push(ConsoleMessage::new(
                    console_level(&called.params.Type),
                    console_text(&called.params.args),
                ));
            }
            Event::LogEntryAdded(added) if self.console_enabled => {
                let entry = &added.params.entry;
                self.console.push(ConsoleMessage::new(
                    log_level(&entry.level),
                    log_text(&entry.text, entry.url.as_deref()),
                ));
            }
            _ => {}
        }
    }
}

type SharedEvents = Arc<Mutex<PageEvents>>;

/// Browser backend driving one Chrome tab
pub struct ChromeBackend {
    /// Underlying browser instance (kept alive for tab lifetime)
    browser: Arc<Mutex<Option<Browser>>>,
    /// Current active tab
    tab: Arc<Tab>,
    events: SharedEvents,
}

#[derive(Deserialize)]
struct Size {
    width: f64,
    height: f64,
}

#[derive(Deserialize)]
struct SelectOutcome {
    found: bool,
    selected: bool,
}

impl ChromeBackend {
    /// Launch a new browser instance
    pub async fn launch() -> Result<Self> {
        Self::launch_with_config(BrowserConfig::default()).await
    }

    /// Launch browser with custom configuration
    pub async fn launch_with_config(config: BrowserConfig) -> Result<Self> {
        info!(
            "Launching browser (headless: {}, size: {}x{})",
            config.headless, config.window_width, config.window_height
        );

        let launch_timeout = Duration::from_secs(config.launch_timeout_seconds);
        let events = SharedEvents::default();
        let sink = Arc::clone(&events);
        let launch = tokio::task::spawn_blocking(move || -> Result<(Browser, Arc<Tab>)> {
            let user_agent_arg: Option<String> =
                config.user_agent.as_ref().map(|ua| format!("--user-agent={}", ua));

            let mut launch_options = LaunchOptions::default_builder()
                .headless(config.headless)
                .window_size(Some((config.window_width, config.window_height)))
                .build()
                .map_err(|e| PageCheckError::BrowserLaunch(e.to_string()))?;

            if let Some(ref ua_arg) = user_agent_arg {
                launch_options.args.push(OsStr::new(ua_arg));
            }

            let browser = Browser::new(launch_options)
                .map_err(|e| PageCheckError::BrowserLaunch(e.to_string()))?;

            let tab = browser
                .new_tab()
                .map_err(|e| PageCheckError::BrowserLaunch(format!("Failed to create tab: {}", e)))?;
            prepare_tab(&tab, config.page_timeout, sink)?;

            Ok((browser, tab))
        });

        let (browser, tab) = tokio::time::timeout(launch_timeout, launch)
            .await
            .map_err(|_| {
                PageCheckError::BrowserLaunch(format!(
                    "browser did not start within {}s",
                    launch_timeout.as_secs()
                ))
            })?
            .map_err(|e| PageCheckError::BrowserLaunch(format!("launch task failed: {}", e)))??;

        info!("Browser launched successfully");
        Ok(Self::from_parts(browser, tab, events))
    }

    /// Connect to an existing browser instance
    ///
    /// # Arguments
    /// * `port` - Chrome DevTools Protocol port (typically 9222)
    pub async fn connect(port: u16) -> Result<Self> {
        info!("Connecting to existing browser on port {}", port);

        let page_timeout = BrowserConfig::default().page_timeout;
        let events = SharedEvents::default();
        let sink = Arc::clone(&events);
        let (browser, tab) = tokio::task::spawn_blocking(move || -> Result<(Browser, Arc<Tab>)> {
            let browser = Browser::connect(format!("http://127.0.0.1:{}", port))
                .map_err(|e| PageCheckError::BrowserLaunch(format!("Failed to connect: {}", e)))?;
            let tab = browser
                .new_tab()
                .map_err(|e| PageCheckError::BrowserLaunch(format!("Failed to create tab: {}", e)))?;
            prepare_tab(&tab, page_timeout, sink)?;
            Ok((browser, tab))
        })
        .await
        .map_err(|e| PageCheckError::BrowserLaunch(format!("connect task failed: {}", e)))??;

        info!("Connected to browser successfully");
        Ok(Self::from_parts(browser, tab, events))
    }

    fn from_parts(browser: Browser, tab: Arc<Tab>, events: SharedEvents) -> Self {
        Self {
            browser: Arc::new(Mutex::new(Some(browser))),
            tab,
            events,
        }
    }

    /// Get reference to the active tab
    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    fn events(&self) -> Result<MutexGuard<'_, PageEvents>> {
        self.events
            .lock()
            .map_err(|_| PageCheckError::Backend("page event buffer poisoned".to_string()))
    }

    /// Run a blocking tab operation on the blocking pool
    async fn with_tab<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| PageCheckError::Backend(format!("{} task failed: {}", op, e)))?
    }

    /// Evaluate a script that returns `JSON.stringify(...)` and decode it
    async fn eval_json<T>(&self, op: &'static str, script: String) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.with_tab(op, move |tab| evaluate_json(tab, &script)).await
    }
}

/// Set the tab's wait bound and route network, log and console events into
/// `events`
fn prepare_tab(tab: &Tab, page_timeout: Duration, events: SharedEvents) -> Result<()> {
    tab.set_default_timeout(page_timeout);

    tab.call_method(Network::Enable {
        max_total_buffer_size: None,
        max_resource_buffer_size: None,
        max_post_data_size: None,
        report_direct_socket_traffic: None,
        enable_durable_messages: None,
    })
    .map_err(|e| PageCheckError::BrowserLaunch(format!("Network.enable failed: {}", e)))?;
    tab.enable_log()
        .map_err(|e| PageCheckError::BrowserLaunch(format!("Log.enable failed: {}", e)))?;
    tab.enable_runtime()
        .map_err(|e| PageCheckError::BrowserLaunch(format!("Runtime.enable failed: {}", e)))?;

    tab.add_event_listener(Arc::new(move |event: &Event| {
        if let Ok(mut events) = events.lock() {
            events.record(event);
        }
    }))
    .map_err(|e| PageCheckError::BrowserLaunch(format!("listener registration failed: {}", e)))?;

    debug!("Tab prepared (wait bound {:?})", page_timeout);
    Ok(())
}

fn evaluate_json<T: DeserializeOwned>(tab: &Tab, script: &str) -> Result<T> {
    let result = tab
        .evaluate(script, false)
        .map_err(|e| PageCheckError::Backend(format!("JavaScript evaluation failed: {}", e)))?;

    let raw = result
        .value
        .as_ref()
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            PageCheckError::Backend(format!(
                "script returned no JSON string ({})",
                result.description.clone().unwrap_or_default()
            ))
        })?;

    Ok(serde_json::from_str(raw)?)
}

fn console_text(args: &[RemoteObject]) -> String {
    args.iter()
        .map(|arg| match &arg.value {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => arg.description.clone().unwrap_or_default(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn console_level(kind: &ConsoleAPICalledEventTypeOption) -> ConsoleLevel {
    match kind {
        ConsoleAPICalledEventTypeOption::Error | ConsoleAPICalledEventTypeOption::Assert => {
            ConsoleLevel::Error
        }
        ConsoleAPICalledEventTypeOption::Warning => ConsoleLevel::Warning,
        ConsoleAPICalledEventTypeOption::Info => ConsoleLevel::Info,
        ConsoleAPICalledEventTypeOption::Debug => ConsoleLevel::Debug,
        _ => ConsoleLevel::Log,
    }
}

/// Browser-generated entries ("Failed to load resource", CSP, CORS)
fn log_level(level: &LogEntryLevel) -> ConsoleLevel {
    match level {
        LogEntryLevel::Error => ConsoleLevel::Error,
        LogEntryLevel::Warning => ConsoleLevel::Warning,
        LogEntryLevel::Info => ConsoleLevel::Info,
        LogEntryLevel::Verbose => ConsoleLevel::Debug,
    }
}

fn log_text(text: &str, url: Option<&str>) -> String {
    match url.filter(|u| !u.is_empty()) {
        Some(url) => format!("{} ({})", text, url),
        None => text.to_string(),
    }
}

#[async_trait]
impl BrowserBackend for ChromeBackend {
    #[instrument(skip(self))]
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating");
        self.events()?.requests.reset();
        let target = url.to_string();
        self.with_tab("navigate", move |tab| {
            tab.navigate_to(&target)
                .and_then(|tab| tab.wait_until_navigated())
                .map(|_| ())
                .map_err(|e| PageCheckError::Navigation {
                    url: target.clone(),
                    reason: e.to_string(),
                })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn reload(&self) -> Result<()> {
        debug!("Reloading");
        self.events()?.requests.reset();
        self.with_tab("reload", |tab| {
            let url = tab.get_url();
            tab.reload(false, None)
                .and_then(|tab| tab.wait_until_navigated())
                .map(|_| ())
                .map_err(|e| PageCheckError::Navigation {
                    url,
                    reason: e.to_string(),
                })
        })
        .await
    }

    async fn wait_for_quiescence(&self, idle_window: Duration) -> Result<()> {
        loop {
            let ready_state: String = self
                .eval_json("ready state", script::READY_STATE.to_string())
                .await?;

            if ready_state == "complete" {
                let (idle, pending) = {
                    let events = self.events()?;
                    (
                        events.requests.idle_for(Instant::now()),
                        events.requests.in_flight.len(),
                    )
                };
                match idle {
                    Some(idle) if idle >= idle_window => {
                        debug!("Network quiescent for {:?}", idle);
                        return Ok(());
                    }
                    Some(_) => {}
                    None => debug!(pending, "Waiting for in-flight requests"),
                }
            }

            tokio::time::sleep(QUIESCENCE_POLL).await;
        }
    }

    async fn current_url(&self) -> Result<String> {
        self.with_tab("url", |tab| Ok(tab.get_url())).await
    }

    #[instrument(skip(self, locator), fields(locator = %locator))]
    async fn query(&self, locator: &Locator) -> Result<Vec<ElementInfo>> {
        self.eval_json("query", script::query(locator)?).await
    }

    async fn attribute(
        &self,
        locator: &Locator,
        index: usize,
        name: &str,
    ) -> Result<Option<String>> {
        self.eval_json("attribute", script::attribute(locator, index, name)?)
            .await
    }

    #[instrument(skip(self, locator, value), fields(locator = %locator))]
    async fn set_value(&self, locator: &Locator, index: usize, value: &str) -> Result<()> {
        let found: bool = self
            .eval_json("set value", script::set_value(locator, index, value)?)
            .await?;
        if !found {
            return Err(PageCheckError::Backend(format!(
                "element {} of {} disappeared before fill",
                index, locator
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, locator), fields(locator = %locator))]
    async fn select_option(&self, locator: &Locator, index: usize, option: &str) -> Result<()> {
        let outcome: SelectOutcome = self
            .eval_json("select", script::select_option(locator, index, option)?)
            .await?;
        match outcome {
            SelectOutcome { found: false, .. } => Err(PageCheckError::Backend(format!(
                "element {} of {} disappeared before select",
                index, locator
            ))),
            SelectOutcome { selected: false, .. } => Err(PageCheckError::Backend(format!(
                "{} has no option {:?}",
                locator, option
            ))),
            _ => Ok(()),
        }
    }

    #[instrument(skip(self, locator), fields(locator = %locator))]
    async fn click(&self, locator: &Locator, index: usize) -> Result<()> {
        let found: bool = self.eval_json("click", script::click(locator, index)?).await?;
        if !found {
            return Err(PageCheckError::Backend(format!(
                "element {} of {} disappeared before click",
                index, locator
            )));
        }
        Ok(())
    }

    async fn scroll_to(&self, viewports: f64) -> Result<()> {
        let _scroll_y: f64 = self
            .eval_json("scroll", script::scroll_to(viewports))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn screenshot(&self, area: ScreenshotArea) -> Result<Vec<u8>> {
        let clip = match area {
            ScreenshotArea::Viewport => None,
            ScreenshotArea::FullPage => {
                let size: Size = self
                    .eval_json("document size", script::DOCUMENT_SIZE.to_string())
                    .await?;
                Some(BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: size.width,
                    height: size.height,
                })
            }
            ScreenshotArea::Clip(bounds) => Some(bounds),
        };

        self.with_tab("screenshot", move |tab| {
            let viewport = clip.map(|b| Viewport {
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
                scale: 1.0,
            });
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, viewport, true)
                .map_err(|e| PageCheckError::Capture(format!("CDP capture failed: {}", e)))
        })
        .await
    }

    async fn images(&self) -> Result<Vec<ImageInfo>> {
        self.eval_json("images", script::IMAGES.to_string()).await
    }

    async fn subscribe_console(&self) -> Result<()> {
        let mut events = self.events()?;
        if !events.console_enabled {
            events.console_enabled = true;
            debug!("Console buffering enabled");
        }
        Ok(())
    }

    async fn drain_console(&self) -> Result<Vec<ConsoleMessage>> {
        Ok(std::mem::take(&mut self.events()?.console))
    }

    async fn drain_failed_requests(&self) -> Result<Vec<FailedRequest>> {
        Ok(std::mem::take(&mut self.events()?.failed))
    }

    async fn close(&self) -> Result<()> {
        info!("Closing browser session");
        let browser = self
            .browser
            .lock()
            .map_err(|_| PageCheckError::Backend("browser handle poisoned".to_string()))?
            .take();

        if browser.is_none() {
            warn!("Browser already closed");
            return Ok(());
        }

        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = tab.close(false) {
                debug!("Tab close failed: {}", e);
            }
            // Dropping the handle terminates the launched process
            drop(browser);
        })
        .await
        .map_err(|e| PageCheckError::Backend(format!("close task failed: {}", e)))
    }
}
