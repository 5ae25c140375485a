//! Core type definitions for page verification runs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::selector::{Locator, Selector};

// ============================================================================
// Assertions
// ============================================================================

/// What a matched element set must satisfy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectation {
    /// At least one element matches
    #[default]
    Present,
    /// At least one matched element's trimmed text contains `text`
    TextContains { text: String },
    /// At least one matched element's attribute `name` equals `value` exactly
    AttributeEquals { name: String, value: String },
}

/// Declarative description of an expected page condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionSpec {
    /// Human-readable label used in reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub selector: Selector,
    /// Optional scoping container (CSS)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub expect: Expectation,
}

impl AssertionSpec {
    /// Presence check (matched count >= 1)
    pub fn present(selector: Selector) -> Self {
        Self {
            label: None,
            selector,
            scope: None,
            expect: Expectation::Present,
        }
    }

    /// Text containment check
    pub fn text_contains(selector: Selector, text: impl Into<String>) -> Self {
        Self {
            label: None,
            selector,
            scope: None,
            expect: Expectation::TextContains { text: text.into() },
        }
    }

    /// Exact attribute value check
    pub fn attribute_equals(
        selector: Selector,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            label: None,
            selector,
            scope: None,
            expect: Expectation::AttributeEquals {
                name: name.into(),
                value: value.into(),
            },
        }
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn within(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn locator(&self) -> Locator {
        Locator {
            selector: self.selector.clone(),
            scope: self.scope.clone(),
        }
    }

    /// Label for reports, falling back to the selector itself
    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.locator().to_string())
    }
}

/// Outcome of evaluating one AssertionSpec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub label: String,
    pub passed: bool,
    /// Number of elements the selector matched
    pub matched: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl AssertionResult {
    pub fn pass(label: impl Into<String>, matched: usize) -> Self {
        Self {
            label: label.into(),
            passed: true,
            matched,
            message: None,
            evaluated_at: Utc::now(),
        }
    }

    pub fn fail(label: impl Into<String>, matched: usize, message: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            passed: false,
            matched,
            message: Some(message.into()),
            evaluated_at: Utc::now(),
        }
    }
}

// ============================================================================
// Interactions
// ============================================================================

/// Action applied to an interaction target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Set the target's text value
    Fill { value: String },
    /// Fill a date input with today + `offset_days` as YYYY-MM-DD
    FillDate { offset_days: i64 },
    /// Choose the option with this value (or visible label)
    Select { option: String },
    /// Trigger activation
    Click,
}

impl Action {
    /// Resolve the value a fill-like action writes, relative to `today`
    pub fn fill_value(&self, today: DateTime<Utc>) -> Option<String> {
        match self {
            Self::Fill { value } => Some(value.clone()),
            Self::FillDate { offset_days } => Some(
                (today + Duration::days(*offset_days))
                    .format("%Y-%m-%d")
                    .to_string(),
            ),
            Self::Select { .. } | Self::Click => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Fill { .. } | Self::FillDate { .. } => "fill",
            Self::Select { .. } => "select",
            Self::Click => "click",
        }
    }
}

/// One ordered interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub selector: Selector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub action: Action,
    /// Skip rather than fail when the target is absent
    #[serde(default)]
    pub optional: bool,
}

impl InteractionStep {
    pub fn fill(selector: Selector, value: impl Into<String>) -> Self {
        Self::new(selector, Action::Fill { value: value.into() })
    }

    pub fn fill_date(selector: Selector, offset_days: i64) -> Self {
        Self::new(selector, Action::FillDate { offset_days })
    }

    pub fn select(selector: Selector, option: impl Into<String>) -> Self {
        Self::new(selector, Action::Select { option: option.into() })
    }

    pub fn click(selector: Selector) -> Self {
        Self::new(selector, Action::Click)
    }

    fn new(selector: Selector, action: Action) -> Self {
        Self {
            label: None,
            selector,
            scope: None,
            action,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn locator(&self) -> Locator {
        Locator {
            selector: self.selector.clone(),
            scope: self.scope.clone(),
        }
    }

    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.action.name(), self.locator()))
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Kind of passively observed defect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    ConsoleError,
    BrokenResource,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConsoleError => write!(f, "console-error"),
            Self::BrokenResource => write!(f, "broken-resource"),
        }
    }
}

/// Payload of a diagnostic event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DiagnosticDetail {
    ConsoleError { message: String },
    BrokenResource { url: String, descriptor: String },
}

/// A timestamped signal captured passively
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub observed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub detail: DiagnosticDetail,
}

impl DiagnosticEvent {
    pub fn console_error(message: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            observed_at,
            detail: DiagnosticDetail::ConsoleError {
                message: message.into(),
            },
        }
    }

    pub fn broken_resource(url: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            observed_at: Utc::now(),
            detail: DiagnosticDetail::BrokenResource {
                url: url.into(),
                descriptor: descriptor.into(),
            },
        }
    }

    pub fn kind(&self) -> DiagnosticKind {
        match self.detail {
            DiagnosticDetail::ConsoleError { .. } => DiagnosticKind::ConsoleError,
            DiagnosticDetail::BrokenResource { .. } => DiagnosticKind::BrokenResource,
        }
    }
}

impl std::fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            DiagnosticDetail::ConsoleError { message } => {
                write!(f, "[console-error] {}", message)
            }
            DiagnosticDetail::BrokenResource { url, descriptor } => {
                write!(f, "[broken-resource] {} ({})", url, descriptor)
            }
        }
    }
}

/// Snapshot of one `<img>` element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub index: usize,
    pub src: String,
    #[serde(default)]
    pub alt: Option<String>,
    pub visible: bool,
    /// Rendered size in CSS pixels
    pub width: f64,
    pub height: f64,
    pub natural_width: u32,
    pub natural_height: u32,
}

impl ImageInfo {
    /// An image that loaded no content
    pub fn is_broken(&self) -> bool {
        self.natural_width == 0 || self.natural_height == 0
    }

    /// Human-readable element descriptor (alt text when present)
    pub fn descriptor(&self) -> String {
        match self.alt.as_deref().map(str::trim) {
            Some(alt) if !alt.is_empty() => alt.to_string(),
            _ => format!("<img #{}>", self.index),
        }
    }
}

// ============================================================================
// Artifacts
// ============================================================================

/// Area covered by a visual capture
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptureScope {
    /// Entire scrollable area
    #[default]
    FullPage,
    /// Visible area only
    Viewport,
    /// Bounding box of the first located element
    Region { selector: Selector },
}

impl std::fmt::Display for CaptureScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FullPage => write!(f, "full-page"),
            Self::Viewport => write!(f, "viewport"),
            Self::Region { selector } => write!(f, "region {}", selector),
        }
    }
}

/// A requested capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub name: String,
    #[serde(default)]
    pub scope: CaptureScope,
    /// Scroll to this many viewport heights before capturing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_viewports: Option<f64>,
}

impl CaptureRequest {
    pub fn full_page(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: CaptureScope::FullPage,
            scroll_viewports: None,
        }
    }

    pub fn viewport(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: CaptureScope::Viewport,
            scroll_viewports: None,
        }
    }

    pub fn region(name: impl Into<String>, selector: Selector) -> Self {
        Self {
            name: name.into(),
            scope: CaptureScope::Region { selector },
            scroll_viewports: None,
        }
    }

    pub fn scrolled(mut self, viewports: f64) -> Self {
        self.scroll_viewports = Some(viewports);
        self
    }
}

/// Whether `name` can be used as a single file or directory name under the
/// artifact directory
pub fn is_path_segment(name: &str) -> bool {
    let trimmed = name.trim();
    !(trimmed.is_empty()
        || trimmed == "."
        || trimmed.contains("..")
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains('\0'))
}

/// A persisted, write-once visual capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub run_label: String,
    pub scope: CaptureScope,
    /// Location in the artifact store
    pub path: PathBuf,
    pub size_bytes: u64,
    pub captured_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fill_date_offset() {
        let today = Utc.with_ymd_and_hms(2026, 10, 30, 12, 0, 0).unwrap();
        let action = Action::FillDate { offset_days: 3 };
        assert_eq!(action.fill_value(today).as_deref(), Some("2026-11-02"));
        assert_eq!(Action::Click.fill_value(today), None);
    }

    #[test]
    fn test_image_descriptor_falls_back_to_index() {
        let mut image = ImageInfo {
            index: 4,
            src: "http://localhost:3000/hero.jpg".to_string(),
            alt: Some("Milan showroom".to_string()),
            visible: true,
            width: 1920.0,
            height: 800.0,
            natural_width: 0,
            natural_height: 0,
        };
        assert!(image.is_broken());
        assert_eq!(image.descriptor(), "Milan showroom");

        image.alt = Some("  ".to_string());
        assert_eq!(image.descriptor(), "<img #4>");
    }

    #[test]
    fn test_diagnostic_event_serializes_kind() {
        let event = DiagnosticEvent::broken_resource("http://x/a.png", "logo");
        assert_eq!(event.kind(), DiagnosticKind::BrokenResource);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "broken-resource");
        assert_eq!(json["descriptor"], "logo");
    }

    #[test]
    fn test_step_labels() {
        let step = InteractionStep::select(Selector::css("select"), "14:00").optional();
        assert!(step.optional);
        assert_eq!(step.display_label(), "select select");

        let labeled = InteractionStep::click(Selector::css("button")).labeled("Submit");
        assert_eq!(labeled.display_label(), "Submit");
    }

    #[test]
    fn test_assertion_spec_from_toml() {
        let spec: AssertionSpec = toml::from_str(
            r#"
            label = "Name input"
            selector = { kind = "attribute", css = "input", name = "placeholder", value = "Your full name" }
            "#,
        )
        .unwrap();
        assert_eq!(spec.expect, Expectation::Present);
        assert_eq!(spec.display_label(), "Name input");
    }
}
