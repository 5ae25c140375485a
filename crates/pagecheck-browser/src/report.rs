//! Run report assembly

use crate::error::{PageCheckError, Result};
use crate::interactions::SequenceReport;
use chrono::{DateTime, Utc};
use pagecheck_core::{Artifact, AssertionResult, DiagnosticEvent, DiagnosticKind, ImageInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// How far a run got
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    /// Every phase ran; individual checks may still have failed
    Completed,
    /// A session-level failure cut the run short
    Incomplete,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Incomplete => write!(f, "incomplete"),
        }
    }
}

/// A capture that did not produce an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFailure {
    pub name: String,
    pub error: String,
}

/// Aggregated output of one verification run
///
/// Results are appended in the order they were produced and never edited
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub target_url: String,
    pub run_label: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// Error that aborted the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_error: Option<String>,
    #[serde(default)]
    pub assertions: Vec<AssertionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactions: Option<SequenceReport>,
    #[serde(default)]
    pub images: Vec<ImageInfo>,
    #[serde(default)]
    pub diagnostics: Vec<DiagnosticEvent>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub capture_failures: Vec<CaptureFailure>,
}

impl RunReport {
    pub fn new(target_url: impl Into<String>, run_label: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            target_url: target_url.into(),
            run_label: run_label.into(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            terminal_error: None,
            assertions: Vec::new(),
            interactions: None,
            images: Vec::new(),
            diagnostics: Vec::new(),
            artifacts: Vec::new(),
            capture_failures: Vec::new(),
        }
    }

    pub fn record_assertions(&mut self, results: impl IntoIterator<Item = AssertionResult>) {
        self.assertions.extend(results);
    }

    pub fn record_interactions(&mut self, sequence: SequenceReport) {
        self.interactions = Some(sequence);
    }

    pub fn record_artifact(&mut self, artifact: Artifact) {
        self.artifacts.push(artifact);
    }

    pub fn record_capture_failure(&mut self, name: impl Into<String>, error: &PageCheckError) {
        self.capture_failures.push(CaptureFailure {
            name: name.into(),
            error: error.to_string(),
        });
    }

    pub fn record_images(&mut self, images: Vec<ImageInfo>) {
        self.images = images;
    }

    pub fn record_diagnostics(&mut self, events: impl IntoIterator<Item = DiagnosticEvent>) {
        self.diagnostics.extend(events);
    }

    /// Stop the run at a session-level failure
    pub fn mark_incomplete(&mut self, error: &PageCheckError) {
        self.status = RunStatus::Incomplete;
        self.terminal_error = Some(error.to_string());
        self.finished_at = Some(Utc::now());
    }

    /// Close the report; an incomplete run stays incomplete
    pub fn finish(&mut self) {
        if self.status == RunStatus::Running {
            self.status = RunStatus::Completed;
        }
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn passed_count(&self) -> usize {
        self.assertions.iter().filter(|a| a.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.assertions.len() - self.passed_count()
    }

    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &DiagnosticEvent> {
        self.diagnostics.iter().filter(move |d| d.kind() == kind)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the JSON record to `path`, creating parent directories
    pub async fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.to_json()?).await?;
        Ok(())
    }

    /// Line-oriented summary for terminals
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Run {} against {} [{}]",
            self.run_label, self.target_url, self.status
        )];
        if let Some(error) = &self.terminal_error {
            lines.push(format!("  aborted: {}", error));
        }

        lines.push(format!(
            "Assertions: {} passed, {} failed",
            self.passed_count(),
            self.failed_count()
        ));
        for result in &self.assertions {
            let mark = if result.passed { "PASS" } else { "FAIL" };
            match &result.message {
                Some(message) if !result.passed => {
                    lines.push(format!("  {} {} ({})", mark, result.label, message))
                }
                _ => lines.push(format!("  {} {} [{} matched]", mark, result.label, result.matched)),
            }
        }

        if let Some(sequence) = &self.interactions {
            lines.push(format!(
                "Interactions: {} applied, {} skipped",
                sequence.applied.len(),
                sequence.skipped.len()
            ));
            for label in &sequence.applied {
                lines.push(format!("  done {}", label));
            }
            for label in &sequence.skipped {
                lines.push(format!("  skip {}", label));
            }
            if let Some(error) = &sequence.aborted {
                lines.push(format!("  aborted: {}", error));
            }
        }

        if !self.images.is_empty() {
            lines.push(format!("Images: {}", self.images.len()));
            for image in &self.images {
                lines.push(format!(
                    "  {} {} visible={} {}x{}{}",
                    image.index,
                    image.descriptor(),
                    image.visible,
                    image.width,
                    image.height,
                    if image.is_broken() { " BROKEN" } else { "" }
                ));
            }
        }

        lines.push(format!("Diagnostics: {}", self.diagnostics.len()));
        for event in &self.diagnostics {
            lines.push(format!("  {}", event));
        }

        lines.push(format!("Artifacts: {}", self.artifacts.len()));
        for artifact in &self.artifacts {
            lines.push(format!(
                "  {} ({}) {}",
                artifact.name,
                artifact.scope,
                artifact.path.display()
            ));
        }
        for failure in &self.capture_failures {
            lines.push(format!("  failed {}: {}", failure.name, failure.error));
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_finish_keeps_incomplete() {
        let mut report = RunReport::new("http://localhost:3000", "latest");
        report.mark_incomplete(&PageCheckError::NavigationTimeout {
            url: "http://localhost:3000".to_string(),
            timeout_ms: 30000,
        });
        report.finish();

        assert_eq!(report.status, RunStatus::Incomplete);
        assert!(report.terminal_error.as_deref().unwrap().contains("30000"));

        let mut ok = RunReport::new("http://localhost:3000", "latest");
        ok.finish();
        assert!(ok.is_complete());
        assert!(ok.finished_at.is_some());
    }

    #[test]
    fn test_summary_lines() {
        let mut report = RunReport::new("http://localhost:3000/book", "booking");
        report.record_assertions([
            AssertionResult::pass("title", 1),
            AssertionResult::fail("shipping", 0, "no elements matched text=\"Free Shipping\""),
        ]);
        report.record_diagnostics([DiagnosticEvent::console_error("Hydration failed", Utc::now())]);
        report.finish();

        let lines = report.summary_lines();
        assert!(lines[0].contains("[completed]"));
        assert!(lines.contains(&"Assertions: 1 passed, 1 failed".to_string()));
        assert!(lines.iter().any(|l| l.contains("FAIL shipping")));
        assert!(lines.iter().any(|l| l.contains("[console-error] Hydration failed")));
        assert_eq!(report.diagnostics_of(DiagnosticKind::ConsoleError).count(), 1);
    }

    #[tokio::test]
    async fn test_write_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("latest").join("report.json");

        let mut report = RunReport::new("http://localhost:3000", "latest");
        report.record_assertions([AssertionResult::pass("title", 1)]);
        report.finish();
        report.write_json(&path).await.unwrap();

        let parsed: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.run_id, report.run_id);
        assert_eq!(parsed.status, RunStatus::Completed);
        assert_eq!(parsed.assertions.len(), 1);
    }
}
