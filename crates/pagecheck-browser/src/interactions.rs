//! Ordered interaction sequencing
//!
//! Steps run strictly in order against the first element their selector
//! matches. A missing target skips an optional step and aborts the sequence
//! otherwise. Side effects of steps that already ran are kept, and a click
//! does not wait for any navigation it may trigger.

use crate::error::{PageCheckError, Result};
use crate::session::PageSession;
use chrono::Utc;
use pagecheck_core::{Action, InteractionStep};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// What a sequencer run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceReport {
    /// Steps reached, including skipped ones and the aborting one
    pub attempted: usize,
    /// Labels of steps applied to the page
    pub applied: Vec<String>,
    /// Labels of optional steps skipped for lack of a target
    pub skipped: Vec<String>,
    /// Error that aborted the sequence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl SequenceReport {
    pub fn completed(&self) -> bool {
        self.aborted.is_none()
    }
}

/// Executes interaction steps against a stable session
#[derive(Debug, Clone, Default)]
pub struct InteractionSequencer;

impl InteractionSequencer {
    pub fn new() -> Self {
        Self
    }

    /// Run `steps` in order, failing fast
    ///
    /// Fails with `TargetNotFound` when a non-optional step has no target;
    /// later steps are never attempted. An empty list always succeeds.
    pub async fn run(
        &self,
        session: &PageSession,
        steps: &[InteractionStep],
    ) -> Result<SequenceReport> {
        let mut report = SequenceReport::default();
        self.execute(session, steps, &mut report).await?;
        Ok(report)
    }

    /// Run `steps` and fold any aborting error into the report
    pub async fn run_recorded(
        &self,
        session: &PageSession,
        steps: &[InteractionStep],
    ) -> SequenceReport {
        let mut report = SequenceReport::default();
        if let Err(e) = self.execute(session, steps, &mut report).await {
            warn!("Interaction sequence aborted: {}", e);
            report.aborted = Some(e.to_string());
        }
        report
    }

    async fn execute(
        &self,
        session: &PageSession,
        steps: &[InteractionStep],
        report: &mut SequenceReport,
    ) -> Result<()> {
        if steps.is_empty() {
            return Ok(());
        }
        session.ensure_stable()?;

        let backend = session.backend();
        for (position, step) in steps.iter().enumerate() {
            report.attempted += 1;
            let label = step.display_label();
            let locator = step.locator();
            locator.validate()?;

            let targets = backend.query(&locator).await?;
            if targets.is_empty() {
                if step.optional {
                    debug!("Skipping optional step {}: no target", label);
                    report.skipped.push(label);
                    continue;
                }
                return Err(PageCheckError::TargetNotFound {
                    step: position,
                    selector: locator.to_string(),
                });
            }
            if targets.len() > 1 {
                debug!("{} matched {} elements, using the first", label, targets.len());
            }
            let index = targets[0].index;

            match &step.action {
                Action::Fill { .. } | Action::FillDate { .. } => {
                    let value = step.action.fill_value(Utc::now()).unwrap_or_default();
                    backend.set_value(&locator, index, &value).await?;
                }
                Action::Select { option } => {
                    backend.select_option(&locator, index, option).await?;
                }
                Action::Click => {
                    backend.click(&locator, index).await?;
                }
            }

            info!("Applied step {}: {}", position, label);
            report.applied.push(label);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockElement, MockPage, ScriptedBackend};
    use crate::navigator::Navigator;
    use pagecheck_core::Selector;
    use std::sync::Arc;
    use std::time::Duration;

    async fn stable_session(page: MockPage) -> (PageSession, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend::new(page));
        let mut session =
            PageSession::new(Box::new(Arc::clone(&backend)), Duration::from_secs(5));
        Navigator::default()
            .open(&mut session, "http://localhost:3000/book")
            .await
            .unwrap();
        (session, backend)
    }

    fn form_page() -> MockPage {
        MockPage::new()
            .element(MockElement::new("input").also_matches("#name"))
            .element(MockElement::new("input").also_matches("#email"))
            .element(MockElement::new("select").with_options(["10:00", "14:00"]))
            .element(MockElement::new("button").text("REQUEST CONSULTATION"))
    }

    #[tokio::test]
    async fn test_empty_sequence_is_noop() {
        let (session, backend) = stable_session(form_page()).await;
        let report = InteractionSequencer::new().run(&session, &[]).await.unwrap();

        assert_eq!(report, SequenceReport::default());
        assert_eq!(backend.counts().queries, 0);
    }

    #[tokio::test]
    async fn test_empty_sequence_needs_no_session() {
        let session = PageSession::new(
            Box::new(ScriptedBackend::new(form_page())),
            Duration::from_secs(5),
        );
        assert!(InteractionSequencer::new().run(&session, &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_required_target_aborts_remaining_steps() {
        let (session, backend) = stable_session(form_page()).await;
        let steps = vec![
            InteractionStep::fill(Selector::css("#name"), "Maria Rossi"),
            InteractionStep::fill(Selector::css("textarea"), "Penthouse in Milan"),
            InteractionStep::click(Selector::css("button")),
        ];

        let err = InteractionSequencer::new()
            .run(&session, &steps)
            .await
            .unwrap_err();

        assert!(matches!(err, PageCheckError::TargetNotFound { step: 1, .. }));
        let counts = backend.counts();
        assert_eq!(counts.fills, 1);
        assert_eq!(counts.clicks, 0);
        // No rollback of the first fill
        assert_eq!(backend.value_of("#name").as_deref(), Some("Maria Rossi"));
    }

    #[tokio::test]
    async fn test_optional_steps_are_skipped() {
        let (session, backend) = stable_session(form_page()).await;
        let steps = vec![
            InteractionStep::fill(Selector::attribute_contains("input", "placeholder", "XXX"), "+39 02 1234 5678")
                .optional()
                .labeled("phone"),
            InteractionStep::fill_date(Selector::attribute("input", "type", "date"), 3).optional(),
            InteractionStep::select(Selector::css("select"), "14:00").optional(),
        ];

        let report = InteractionSequencer::new()
            .run(&session, &steps)
            .await
            .unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0], "phone");
        assert_eq!(report.applied.len(), 1);
        assert_eq!(backend.value_of("select").as_deref(), Some("14:00"));
    }

    #[tokio::test]
    async fn test_run_recorded_keeps_partial_progress() {
        let (session, _backend) = stable_session(form_page()).await;
        let steps = vec![
            InteractionStep::fill(Selector::css("#email"), "maria@example.com"),
            InteractionStep::select(Selector::css("select"), "23:00"),
            InteractionStep::click(Selector::css("button")),
        ];

        let report = InteractionSequencer::new().run_recorded(&session, &steps).await;
        assert!(!report.completed());
        assert_eq!(report.attempted, 2);
        assert_eq!(report.applied.len(), 1);
        assert!(report.aborted.unwrap().contains("23:00"));
    }
}
