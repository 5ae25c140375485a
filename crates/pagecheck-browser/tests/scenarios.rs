//! End-to-end runs against the scripted backend

use pagecheck_browser::mock::{MockElement, MockPage, ScriptedBackend};
use pagecheck_browser::{RunOrchestrator, RunPlan, RunStatus};
use pagecheck_core::{AssertionSpec, DiagnosticKind, InteractionStep, Selector};
use std::sync::Arc;
use tempfile::TempDir;

fn plan_for(url: &str, dir: &TempDir) -> RunPlan {
    let mut plan = RunPlan::new(url);
    plan.artifact_dir = dir.path().to_path_buf();
    plan.navigation.settle_delay_ms = 0;
    plan
}

#[tokio::test]
async fn consultation_title_present_and_shipping_absent() {
    let temp_dir = TempDir::new().unwrap();
    let backend = ScriptedBackend::new(
        MockPage::new().element(MockElement::new("h1").text("Request a Consultation")),
    );

    let mut plan = plan_for("http://localhost:3000/book", &temp_dir);
    plan.assertions = vec![
        AssertionSpec::present(Selector::text("Request a Consultation")).labeled("title"),
        AssertionSpec::present(Selector::text("Free Shipping")).labeled("shipping"),
    ];

    let report = RunOrchestrator::new().run(Box::new(backend), &plan).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.assertions.len(), 2);
    assert!(report.assertions[0].passed);
    assert_eq!(report.assertions[0].matched, 1);
    assert!(!report.assertions[1].passed);
    assert_eq!(report.assertions[1].matched, 0);
}

#[tokio::test]
async fn booking_form_fill_and_submit() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::new(
        MockPage::new()
            .element(MockElement::new("input").attr("placeholder", "Your full name"))
            .element(MockElement::new("input").attr("placeholder", "your@email.com"))
            .element(MockElement::new("button").text("REQUEST CONSULTATION")),
    ));

    let mut plan = plan_for("http://localhost:3000/book", &temp_dir);
    plan.steps = vec![
        InteractionStep::fill(
            Selector::attribute("input", "placeholder", "Your full name"),
            "Maria Rossi",
        ),
        InteractionStep::fill(
            Selector::attribute("input", "placeholder", "your@email.com"),
            "maria@example.com",
        ),
        InteractionStep::click(Selector::css_text("button", "REQUEST CONSULTATION")),
    ];

    let report = RunOrchestrator::new()
        .run(Box::new(Arc::clone(&backend)), &plan)
        .await;

    assert_eq!(report.status, RunStatus::Completed);
    let sequence = report.interactions.expect("interactions recorded");
    assert!(sequence.completed());
    assert_eq!(sequence.applied.len(), 3);
    assert!(sequence.skipped.is_empty());

    let counts = backend.counts();
    assert_eq!(counts.fills, 2);
    assert_eq!(counts.clicks, 1);
    assert_eq!(
        backend.actions(),
        vec![
            r#"fill input[placeholder="Your full name"]=Maria Rossi"#.to_string(),
            r#"fill input[placeholder="your@email.com"]=maria@example.com"#.to_string(),
            r#"click button:has-text("REQUEST CONSULTATION")"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn reload_cycle_reports_one_console_error() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::new(
        MockPage::new()
            .element(MockElement::new("h1").text("LAXMI"))
            .image("http://localhost:3000/hero.jpg", Some("Italian living room"), true)
            .console_error("Warning: Text content did not match"),
    ));

    let plan = plan_for("http://localhost:3000", &temp_dir);
    let report = RunOrchestrator::new()
        .run(Box::new(Arc::clone(&backend)), &plan)
        .await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.diagnostics_of(DiagnosticKind::ConsoleError).count(), 1);
    assert_eq!(report.diagnostics_of(DiagnosticKind::BrokenResource).count(), 0);
    assert_eq!(report.diagnostics.len(), 1);

    let counts = backend.counts();
    assert_eq!(counts.reloads, 1);
    assert_eq!(counts.closes, 1);
}
