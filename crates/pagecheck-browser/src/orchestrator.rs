//! Verification run orchestration
//!
//! One run drives one session through a fixed pipeline:
//!
//! ```text
//! open -> settle -> assertions -> captures -> interactions -> captures
//!      -> image inventory -> diagnostics around a reload -> report
//! ```
//!
//! Assertion, interaction, capture and diagnostics failures are recorded or
//! logged and the run continues. Navigation failures, and captures that
//! leave no usable session, abort the run and mark the report incomplete.
//! The session is closed on every path.

use crate::artifacts::{ArtifactStore, ArtifactWriter};
use crate::assertions::AssertionEngine;
use crate::backend::BrowserBackend;
use crate::diagnostics::DiagnosticCollector;
use crate::error::{PageCheckError, Result};
use crate::interactions::InteractionSequencer;
use crate::navigator::Navigator;
use crate::report::RunReport;
use crate::session::PageSession;
use pagecheck_core::{
    AssertionSpec, CaptureRequest, InteractionStep, NavigationSettings, RunConfig,
};
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

/// Everything one run needs to know
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub target_url: String,
    pub run_label: String,
    pub artifact_dir: PathBuf,
    pub navigation: NavigationSettings,
    pub assertions: Vec<AssertionSpec>,
    /// Captures taken before any interaction step runs
    pub initial_captures: Vec<CaptureRequest>,
    pub steps: Vec<InteractionStep>,
    pub captures: Vec<CaptureRequest>,
    /// Wrap diagnostics collection around a page reload
    pub reload_diagnostics: bool,
}

impl RunPlan {
    /// Empty plan against `target_url` with default settings
    pub fn new(target_url: impl Into<String>) -> Self {
        let defaults = RunConfig::default();
        Self {
            target_url: target_url.into(),
            run_label: defaults.output.run_label,
            artifact_dir: defaults.output.artifact_dir,
            navigation: defaults.navigation,
            assertions: Vec::new(),
            initial_captures: Vec::new(),
            steps: Vec::new(),
            captures: Vec::new(),
            reload_diagnostics: defaults.reload_diagnostics,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            target_url: config.target_url.clone(),
            run_label: config.output.run_label.clone(),
            artifact_dir: config.output.artifact_dir.clone(),
            navigation: config.navigation.clone(),
            assertions: config.assertions.clone(),
            initial_captures: Vec::new(),
            steps: config.steps.clone(),
            captures: config.captures.clone(),
            reload_diagnostics: config.reload_diagnostics,
        }
    }

    /// Where this run's artifacts and report land
    pub fn run_dir(&self) -> PathBuf {
        self.artifact_dir.join(&self.run_label)
    }
}

/// Composes the engine components into one verification run
#[derive(Debug, Clone, Default)]
pub struct RunOrchestrator {
    assertions: AssertionEngine,
    sequencer: InteractionSequencer,
}

impl RunOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute `plan` on a freshly acquired backend
    ///
    /// Never fails: session-level errors end up as the report's terminal
    /// error. The backend is released before returning.
    #[instrument(skip(self, backend, plan), fields(url = %plan.target_url, label = %plan.run_label))]
    pub async fn run(&self, backend: Box<dyn BrowserBackend>, plan: &RunPlan) -> RunReport {
        let mut report = RunReport::new(&plan.target_url, &plan.run_label);
        let mut session = PageSession::new(backend, plan.navigation.stability_timeout());

        if let Err(e) = self.drive(&mut session, plan, &mut report).await {
            error!("Run aborted: {}", e);
            report.mark_incomplete(&e);
        }

        if let Err(e) = session.close().await {
            warn!("Failed to close page session: {}", e);
        }

        report.finish();
        info!(
            status = %report.status,
            passed = report.passed_count(),
            failed = report.failed_count(),
            diagnostics = report.diagnostics.len(),
            "Run finished"
        );
        report
    }

    async fn drive(
        &self,
        session: &mut PageSession,
        plan: &RunPlan,
        report: &mut RunReport,
    ) -> Result<()> {
        let navigator = Navigator::new(plan.navigation.idle_window());
        let settle = plan.navigation.settle_delay();

        navigator.open(session, &plan.target_url).await?;
        navigator.wait_settled(session, settle).await?;

        let results = self.assertions.evaluate_all(session, &plan.assertions).await?;
        report.record_assertions(results);

        let writer = ArtifactWriter::new(
            ArtifactStore::new(&plan.artifact_dir),
            &plan.run_label,
            plan.navigation.capture_timeout(),
        );
        self.capture_all(session, &writer, &plan.initial_captures, report)
            .await?;

        if !plan.steps.is_empty() {
            let sequence = self.sequencer.run_recorded(session, &plan.steps).await;
            report.record_interactions(sequence);
        }

        self.capture_all(session, &writer, &plan.captures, report)
            .await?;

        let mut collector = DiagnosticCollector::new();
        match collector.inspect_images(session).await {
            Ok(images) => report.record_images(images),
            Err(e) => warn!("Image inventory failed: {}", e),
        }

        if let Err(e) = collector.start_collecting(session).await {
            continue_unless_fatal("Diagnostics start", e)?;
        }
        if plan.reload_diagnostics {
            navigator.reload(session).await?;
            navigator.wait_settled(session, settle).await?;
        }
        match collector.stop_collecting(session).await {
            Ok(events) => report.record_diagnostics(events),
            Err(e) => continue_unless_fatal("Diagnostics collection", e)?,
        }

        Ok(())
    }

    /// Capture each request; abort only when the session became unusable
    async fn capture_all(
        &self,
        session: &mut PageSession,
        writer: &ArtifactWriter,
        requests: &[CaptureRequest],
        report: &mut RunReport,
    ) -> Result<()> {
        for request in requests {
            match writer.capture_request(session, request).await {
                Ok(artifact) => report.record_artifact(artifact),
                Err(e) => {
                    warn!("Capture '{}' failed: {}", request.name, e);
                    report.record_capture_failure(&request.name, &e);
                    if !session.is_stable() {
                        return Err(e);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Pass through errors that leave no usable session; log the rest
fn continue_unless_fatal(phase: &str, e: PageCheckError) -> Result<()> {
    if e.is_fatal() || matches!(e, PageCheckError::InvalidSessionState { .. }) {
        return Err(e);
    }
    warn!("{} failed, continuing: {}", phase, e);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockElement, MockPage, ScriptedBackend};
    use crate::report::RunStatus;
    use pagecheck_core::{DiagnosticKind, Selector};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn quick_plan(dir: &TempDir) -> RunPlan {
        let mut plan = RunPlan::new("http://localhost:3000");
        plan.artifact_dir = dir.path().to_path_buf();
        plan.navigation.settle_delay_ms = 0;
        plan.navigation.stability_timeout_ms = 200;
        plan
    }

    #[tokio::test]
    async fn test_full_pipeline_order() {
        let temp_dir = TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::new(
            MockPage::new()
                .element(MockElement::new("input").also_matches("#name"))
                .image("http://localhost:3000/hero.jpg", Some("hero"), true)
                .console_error("Failed to load resource"),
        ));

        let mut plan = quick_plan(&temp_dir);
        plan.assertions = vec![AssertionSpec::present(Selector::css("#name"))];
        plan.initial_captures = vec![CaptureRequest::full_page("before")];
        plan.steps = vec![InteractionStep::fill(Selector::css("#name"), "Maria Rossi")];
        plan.captures = vec![CaptureRequest::full_page("after")];

        let report = RunOrchestrator::new()
            .run(Box::new(Arc::clone(&backend)), &plan)
            .await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.passed_count(), 1);
        assert!(report.interactions.as_ref().unwrap().completed());
        let names: Vec<_> = report.artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["before", "after"]);
        assert_eq!(report.images.len(), 1);
        assert_eq!(report.diagnostics_of(DiagnosticKind::ConsoleError).count(), 1);

        let counts = backend.counts();
        assert_eq!(counts.navigations, 1);
        assert_eq!(counts.reloads, 1);
        assert_eq!(counts.closes, 1);
    }

    #[tokio::test]
    async fn test_navigation_failure_marks_incomplete_and_closes() {
        let temp_dir = TempDir::new().unwrap();
        let backend = Arc::new(
            ScriptedBackend::new(MockPage::new()).failing_navigation("net::ERR_NAME_NOT_RESOLVED"),
        );
        let mut plan = quick_plan(&temp_dir);
        plan.assertions = vec![AssertionSpec::present(Selector::css("h1"))];

        let report = RunOrchestrator::new()
            .run(Box::new(Arc::clone(&backend)), &plan)
            .await;

        assert_eq!(report.status, RunStatus::Incomplete);
        assert!(report.terminal_error.unwrap().contains("ERR_NAME_NOT_RESOLVED"));
        assert!(report.assertions.is_empty());
        assert_eq!(backend.counts().closes, 1);
    }

    #[tokio::test]
    async fn test_navigation_timeout_marks_incomplete() {
        let temp_dir = TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::new(MockPage::new()).hanging());
        let plan = quick_plan(&temp_dir);

        let report = RunOrchestrator::new()
            .run(Box::new(Arc::clone(&backend)), &plan)
            .await;

        assert_eq!(report.status, RunStatus::Incomplete);
        assert!(report.terminal_error.unwrap().contains("timed out"));
        assert_eq!(backend.counts().closes, 1);
    }

    #[tokio::test]
    async fn test_capture_failure_does_not_abort() {
        let temp_dir = TempDir::new().unwrap();
        let backend = ScriptedBackend::new(MockPage::new()).failing_screenshots("GPU process gone");
        let mut plan = quick_plan(&temp_dir);
        plan.captures = vec![
            CaptureRequest::full_page("full-page"),
            CaptureRequest::full_page("../outside"),
        ];

        let report = RunOrchestrator::new().run(Box::new(backend), &plan).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert!(report.artifacts.is_empty());
        assert_eq!(report.capture_failures.len(), 2);
        assert!(report.capture_failures[1].error.contains("Invalid artifact name"));
    }

    #[tokio::test]
    async fn test_capture_timeout_aborts_run() {
        let temp_dir = TempDir::new().unwrap();
        let backend = Arc::new(
            ScriptedBackend::new(MockPage::new().console_error("Hydration failed"))
                .hanging_screenshots(),
        );
        let mut plan = quick_plan(&temp_dir);
        plan.navigation.capture_timeout_ms = 50;
        plan.initial_captures = vec![CaptureRequest::full_page("before")];
        plan.steps = vec![InteractionStep::click(Selector::css("button"))];
        plan.captures = vec![CaptureRequest::full_page("after")];

        let report = RunOrchestrator::new()
            .run(Box::new(Arc::clone(&backend)), &plan)
            .await;

        assert_eq!(report.status, RunStatus::Incomplete);
        assert!(report.terminal_error.as_deref().unwrap().contains("timed out"));
        assert_eq!(report.capture_failures.len(), 1);
        assert_eq!(report.capture_failures[0].name, "before");
        assert!(report.interactions.is_none());
        assert!(report.images.is_empty());
        assert!(report.diagnostics.is_empty());

        let counts = backend.counts();
        assert_eq!(counts.image_scans, 0);
        assert_eq!(counts.reloads, 0);
        assert_eq!(counts.closes, 1);
    }

    #[tokio::test]
    async fn test_diagnostics_backend_error_does_not_abort() {
        let temp_dir = TempDir::new().unwrap();
        let backend = Arc::new(
            ScriptedBackend::new(MockPage::new().console_error("Failed to load resource"))
                .failing_images("JavaScript evaluation failed: context destroyed"),
        );
        let plan = quick_plan(&temp_dir);

        let report = RunOrchestrator::new()
            .run(Box::new(Arc::clone(&backend)), &plan)
            .await;

        assert_eq!(report.status, RunStatus::Completed);
        assert!(report.terminal_error.is_none());
        assert!(report.images.is_empty());
        assert_eq!(report.diagnostics_of(DiagnosticKind::ConsoleError).count(), 1);
        assert_eq!(backend.counts().image_scans, 2);
    }

    #[test]
    fn test_only_session_errors_stop_the_run() {
        let lost = PageCheckError::Backend("context destroyed".to_string());
        assert!(continue_unless_fatal("Diagnostics collection", lost).is_ok());

        let unstable = PageCheckError::InvalidSessionState {
            expected: "stable".to_string(),
            actual: "failed".to_string(),
        };
        assert!(continue_unless_fatal("Diagnostics start", unstable).is_err());

        let nav = PageCheckError::Navigation {
            url: "http://localhost:3000".to_string(),
            reason: "net::ERR_CONNECTION_RESET".to_string(),
        };
        assert!(continue_unless_fatal("Diagnostics start", nav).is_err());
    }

    #[test]
    fn test_plan_from_config() {
        let mut config = RunConfig::default();
        config.output.run_label = "nightly".to_string();
        config.captures = vec![CaptureRequest::viewport("hero-section")];

        let plan = RunPlan::from_config(&config);
        assert_eq!(plan.run_label, "nightly");
        assert_eq!(plan.captures.len(), 1);
        assert!(plan.initial_captures.is_empty());
        assert!(plan.run_dir().ends_with("nightly"));
    }
}
