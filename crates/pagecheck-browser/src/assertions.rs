//! Assertion evaluation against a stable page
//!
//! Evaluation is read-only: it queries elements, text and attributes, and
//! never touches page state. Specs evaluated one after another are not an
//! atomic snapshot; batch them before any interaction.

use crate::error::{PageCheckError, Result};
use crate::session::PageSession;
use pagecheck_core::{AssertionResult, AssertionSpec, Expectation};
use tracing::{debug, info, warn};

/// Evaluates declarative assertion specs
#[derive(Debug, Clone, Default)]
pub struct AssertionEngine;

impl AssertionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate one spec
    ///
    /// Fails with `InvalidSessionState` unless the session is stable. A
    /// condition that does not hold is a failed [`AssertionResult`], not an
    /// error.
    pub async fn evaluate(
        &self,
        session: &PageSession,
        spec: &AssertionSpec,
    ) -> Result<AssertionResult> {
        session.ensure_stable()?;

        let locator = spec.locator();
        locator.validate()?;
        let label = spec.display_label();

        debug!("Evaluating assertion: {}", label);
        let elements = session.backend().query(&locator).await?;
        let matched = elements.len();

        let result = match &spec.expect {
            Expectation::Present => {
                if matched > 0 {
                    AssertionResult::pass(label, matched)
                } else {
                    AssertionResult::fail(label, 0, format!("no elements matched {}", locator))
                }
            }
            Expectation::TextContains { text } => {
                let expected = text.trim();
                if elements.iter().any(|e| e.text.trim().contains(expected)) {
                    AssertionResult::pass(label, matched)
                } else if matched == 0 {
                    AssertionResult::fail(label, 0, format!("no elements matched {}", locator))
                } else {
                    AssertionResult::fail(
                        label,
                        matched,
                        format!("{} element(s) matched but none contain {:?}", matched, expected),
                    )
                }
            }
            Expectation::AttributeEquals { name, value } => {
                let mut seen = Vec::with_capacity(matched);
                let mut hit = false;
                for element in &elements {
                    let actual = session
                        .backend()
                        .attribute(&locator, element.index, name)
                        .await?;
                    if actual.as_deref() == Some(value.as_str()) {
                        hit = true;
                        break;
                    }
                    seen.push(actual);
                }

                if hit {
                    AssertionResult::pass(label, matched)
                } else if matched == 0 {
                    AssertionResult::fail(label, 0, format!("no elements matched {}", locator))
                } else {
                    AssertionResult::fail(
                        label,
                        matched,
                        format!("expected {}={:?}, found {:?}", name, value, seen),
                    )
                }
            }
        };

        if result.passed {
            info!("Assertion passed: {} ({} matched)", result.label, result.matched);
        } else {
            info!(
                "Assertion failed: {}: {}",
                result.label,
                result.message.as_deref().unwrap_or_default()
            );
        }

        Ok(result)
    }

    /// Evaluate every spec, continuing past individual failures
    ///
    /// Backend or selector errors for one spec become a failed result for
    /// that spec. Only an unusable session aborts the batch.
    pub async fn evaluate_all(
        &self,
        session: &PageSession,
        specs: &[AssertionSpec],
    ) -> Result<Vec<AssertionResult>> {
        let mut results = Vec::with_capacity(specs.len());

        for spec in specs {
            match self.evaluate(session, spec).await {
                Ok(result) => results.push(result),
                Err(e @ PageCheckError::InvalidSessionState { .. }) => return Err(e),
                Err(e) => {
                    warn!("Assertion {} errored: {}", spec.display_label(), e);
                    results.push(AssertionResult::fail(spec.display_label(), 0, e.to_string()));
                }
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockElement, MockPage, ScriptedBackend};
    use crate::navigator::Navigator;
    use pagecheck_core::Selector;
    use std::time::Duration;

    async fn stable_session(page: MockPage) -> PageSession {
        let mut session =
            PageSession::new(Box::new(ScriptedBackend::new(page)), Duration::from_secs(5));
        Navigator::default()
            .open(&mut session, "http://localhost:3000/book")
            .await
            .unwrap();
        session
    }

    fn booking_page() -> MockPage {
        MockPage::new()
            .element(MockElement::new("h1").text("  Request a Consultation "))
            .element(MockElement::new("p").text("By Appointment Only"))
            .element(MockElement::new("input").attr("placeholder", "Your full name"))
            .element(MockElement::new("input").attr("placeholder", "your@email.com"))
    }

    #[tokio::test]
    async fn test_presence_passes_iff_matches() {
        let session = stable_session(booking_page()).await;
        let engine = AssertionEngine::new();

        let found = engine
            .evaluate(&session, &AssertionSpec::present(Selector::css("input")))
            .await
            .unwrap();
        assert!(found.passed);
        assert_eq!(found.matched, 2);

        let missing = engine
            .evaluate(&session, &AssertionSpec::present(Selector::text("Free Shipping")))
            .await
            .unwrap();
        assert!(!missing.passed);
        assert_eq!(missing.matched, 0);
        assert!(missing.message.is_some());
    }

    #[tokio::test]
    async fn test_text_contains_is_case_sensitive() {
        let session = stable_session(booking_page()).await;
        let engine = AssertionEngine::new();

        let exact = AssertionSpec::text_contains(Selector::css("h1"), "Request a Consultation");
        assert!(engine.evaluate(&session, &exact).await.unwrap().passed);

        let wrong_case = AssertionSpec::text_contains(Selector::css("h1"), "request a consultation");
        let result = engine.evaluate(&session, &wrong_case).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.matched, 1);
    }

    #[tokio::test]
    async fn test_attribute_equals_exactly() {
        let session = stable_session(booking_page()).await;
        let engine = AssertionEngine::new();

        let email = AssertionSpec::attribute_equals(Selector::css("input"), "placeholder", "your@email.com");
        let result = engine.evaluate(&session, &email).await.unwrap();
        assert!(result.passed);
        assert_eq!(result.matched, 2);

        let partial = AssertionSpec::attribute_equals(Selector::css("input"), "placeholder", "your@email");
        let result = engine.evaluate(&session, &partial).await.unwrap();
        assert!(!result.passed);
        assert!(result.message.unwrap().contains("your@email.com"));
    }

    #[tokio::test]
    async fn test_requires_stable_session() {
        let session = PageSession::new(
            Box::new(ScriptedBackend::new(booking_page())),
            Duration::from_secs(5),
        );
        let err = AssertionEngine::new()
            .evaluate(&session, &AssertionSpec::present(Selector::css("h1")))
            .await
            .unwrap_err();
        assert!(matches!(err, PageCheckError::InvalidSessionState { .. }));
    }

    #[tokio::test]
    async fn test_evaluate_all_continues_past_failures() {
        let session = stable_session(booking_page()).await;
        let specs = vec![
            AssertionSpec::present(Selector::text("Free Shipping")).labeled("shipping"),
            AssertionSpec::present(Selector::css("")).labeled("broken selector"),
            AssertionSpec::present(Selector::text("By Appointment Only")).labeled("tagline"),
        ];

        let results = AssertionEngine::new()
            .evaluate_all(&session, &specs)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(!results[0].passed);
        assert!(!results[1].passed);
        assert!(results[1].message.as_deref().unwrap().contains("Invalid selector"));
        assert!(results[2].passed);
    }
}
