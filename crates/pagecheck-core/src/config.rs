//! Configuration management for PageCheck
//!
//! A run is described by a `pagecheck.toml` file: browser launch settings,
//! navigation timeouts, artifact output, and the declarative verification
//! plan (assertions, interaction steps, captures).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{is_path_segment, AssertionSpec, CaptureRequest, InteractionStep};
use crate::{PageCheckError, Result};

/// Default file name looked up by the CLI
pub const DEFAULT_CONFIG_FILE: &str = "pagecheck.toml";

/// Top-level run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Page under test
    #[serde(default = "default_target_url")]
    pub target_url: String,

    #[serde(default)]
    pub browser: BrowserSettings,

    #[serde(default)]
    pub navigation: NavigationSettings,

    #[serde(default)]
    pub output: OutputSettings,

    /// Run a reload cycle with diagnostics collection enabled
    #[serde(default = "default_true")]
    pub reload_diagnostics: bool,

    #[serde(default)]
    pub assertions: Vec<AssertionSpec>,

    #[serde(default)]
    pub steps: Vec<InteractionStep>,

    #[serde(default)]
    pub captures: Vec<CaptureRequest>,
}

/// Browser launch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_window_width")]
    pub window_width: u32,

    #[serde(default = "default_window_height")]
    pub window_height: u32,

    #[serde(default)]
    pub user_agent: Option<String>,

    /// Seconds allowed for the browser process to come up
    #[serde(default = "default_launch_timeout_secs")]
    pub launch_timeout_secs: u64,
}

/// Navigation and capture timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationSettings {
    /// Upper bound for load + quiescence, in milliseconds
    #[serde(default = "default_stability_timeout_ms")]
    pub stability_timeout_ms: u64,

    /// Network must stay quiet this long to count as idle
    #[serde(default = "default_idle_window_ms")]
    pub idle_window_ms: u64,

    /// Extra grace period after the page is stable
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
}

/// Artifact store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Run-scoped directory name under `artifact_dir`
    #[serde(default = "default_run_label")]
    pub run_label: String,

    /// Also write the report as JSON next to the artifacts
    #[serde(default = "default_true")]
    pub write_report: bool,
}

// Default value providers
fn default_true() -> bool {
    true
}

fn default_target_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_launch_timeout_secs() -> u64 {
    30
}

fn default_stability_timeout_ms() -> u64 {
    30_000
}

fn default_idle_window_ms() -> u64 {
    500
}

fn default_settle_delay_ms() -> u64 {
    1_000
}

fn default_capture_timeout_ms() -> u64 {
    15_000
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("pagecheck-artifacts")
}

fn default_run_label() -> String {
    "latest".to_string()
}

impl RunConfig {
    /// Load configuration from `path`, or use defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| {
            PageCheckError::Config(format!("{}: {}", path.display(), e))
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PageCheckError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default configuration to `path`
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| PageCheckError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the plan for malformed selectors, capture names and run label
    pub fn validate(&self) -> Result<()> {
        if self.target_url.trim().is_empty() {
            return Err(PageCheckError::Config("target_url is empty".to_string()));
        }
        for spec in &self.assertions {
            spec.locator().validate()?;
        }
        for step in &self.steps {
            step.locator().validate()?;
        }
        for capture in &self.captures {
            if capture.name.trim().is_empty() {
                return Err(PageCheckError::Config("capture with empty name".to_string()));
            }
        }
        if !is_path_segment(&self.output.run_label) {
            return Err(PageCheckError::Config(format!(
                "output.run_label '{}' must be a single directory name",
                self.output.run_label
            )));
        }
        Ok(())
    }

    /// Whether the config carries its own verification plan
    pub fn has_plan(&self) -> bool {
        !self.assertions.is_empty() || !self.steps.is_empty() || !self.captures.is_empty()
    }
}

impl NavigationSettings {
    pub fn stability_timeout(&self) -> Duration {
        Duration::from_millis(self.stability_timeout_ms)
    }

    pub fn idle_window(&self) -> Duration {
        Duration::from_millis(self.idle_window_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target_url: default_target_url(),
            browser: BrowserSettings::default(),
            navigation: NavigationSettings::default(),
            output: OutputSettings::default(),
            reload_diagnostics: true,
            assertions: Vec::new(),
            steps: Vec::new(),
            captures: Vec::new(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: default_window_width(),
            window_height: default_window_height(),
            user_agent: None,
            launch_timeout_secs: default_launch_timeout_secs(),
        }
    }
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            stability_timeout_ms: default_stability_timeout_ms(),
            idle_window_ms: default_idle_window_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            capture_timeout_ms: default_capture_timeout_ms(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            run_label: default_run_label(),
            write_report: true,
        }
    }
}
