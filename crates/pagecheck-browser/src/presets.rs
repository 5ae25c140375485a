//! Built-in verification plans

use crate::error::PageCheckError;
use crate::orchestrator::RunPlan;
use pagecheck_core::{AssertionSpec, CaptureRequest, InteractionStep, RunConfig, Selector};
use std::fmt;
use std::str::FromStr;

const CONSULTATION_MESSAGE: &str = "I am interested in furnishing my new penthouse in Milan \
with authentic Italian craftsmanship. Looking for a complete living room and master bedroom design.";

/// A named plan for one page of the site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Landing page: layout captures and diagnostics
    Landing,
    /// Consultation request form
    Booking,
}

impl Preset {
    pub const ALL: [Preset; 2] = [Preset::Landing, Preset::Booking];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Landing => "landing",
            Self::Booking => "booking",
        }
    }

    /// Path of the page under the site's base URL
    pub fn path(&self) -> &'static str {
        match self {
            Self::Landing => "/",
            Self::Booking => "/book",
        }
    }

    /// Build the plan, taking settings and output location from `config`
    pub fn plan(&self, config: &RunConfig) -> RunPlan {
        let mut plan = RunPlan::from_config(config);
        plan.target_url = join_url(&config.target_url, self.path());

        match self {
            Self::Landing => {
                plan.assertions = vec![
                    AssertionSpec::present(Selector::css("section")).labeled("hero section"),
                    AssertionSpec::present(Selector::css("img"))
                        .within("section")
                        .labeled("hero image"),
                ];
                plan.captures = vec![
                    CaptureRequest::full_page("full-page"),
                    CaptureRequest::viewport("hero-section"),
                    CaptureRequest::viewport("services-section").scrolled(2.0),
                ];
                plan.reload_diagnostics = true;
            }
            Self::Booking => {
                plan.assertions = booking_assertions();
                plan.initial_captures = vec![CaptureRequest::full_page("consultation-request")];
                plan.steps = booking_steps();
                plan.captures = vec![CaptureRequest::full_page("consultation-filled")];
                plan.reload_diagnostics = false;
            }
        }

        plan
    }
}

fn booking_assertions() -> Vec<AssertionSpec> {
    vec![
        AssertionSpec::present(Selector::css_text("h1", "Request a Consultation")).labeled("title"),
        AssertionSpec::present(Selector::text("By Appointment Only")).labeled("tagline"),
        AssertionSpec::present(Selector::text("design concierge")).labeled("concierge messaging"),
        AssertionSpec::present(Selector::attribute("input", "placeholder", "Your full name"))
            .labeled("name input"),
        AssertionSpec::present(Selector::attribute("input", "placeholder", "your@email.com"))
            .labeled("email input"),
        AssertionSpec::present(Selector::css_text("button", "REQUEST CONSULTATION"))
            .labeled("submit button"),
        AssertionSpec::present(Selector::text("The Experience")).labeled("experience sidebar"),
        AssertionSpec::present(Selector::text("Share your vision")).labeled("request step"),
        AssertionSpec::present(Selector::text("Personal call from our design concierge"))
            .labeled("connect step"),
        AssertionSpec::present(Selector::text("thelaxmii07@gmail.com")).labeled("contact email"),
    ]
}

fn booking_steps() -> Vec<InteractionStep> {
    vec![
        InteractionStep::fill(
            Selector::attribute("input", "placeholder", "Your full name"),
            "Maria Rossi",
        )
        .labeled("name"),
        InteractionStep::fill(
            Selector::attribute("input", "placeholder", "your@email.com"),
            "maria@example.com",
        )
        .labeled("email"),
        InteractionStep::fill(
            Selector::attribute_contains("input", "placeholder", "XXX"),
            "+39 02 1234 5678",
        )
        .optional()
        .labeled("phone"),
        InteractionStep::fill_date(Selector::attribute("input", "type", "date"), 3)
            .optional()
            .labeled("preferred date"),
        InteractionStep::select(Selector::css("select"), "14:00")
            .optional()
            .labeled("preferred time"),
        InteractionStep::fill(Selector::css("textarea"), CONSULTATION_MESSAGE)
            .optional()
            .labeled("message"),
    ]
}

/// Join a site base URL and an absolute page path
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = PageCheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                PageCheckError::Config(format!(
                    "unknown preset '{}' (expected landing or booking)",
                    s
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagecheck_core::Action;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://localhost:3000", "/book"), "http://localhost:3000/book");
        assert_eq!(join_url("http://localhost:3000/", "/"), "http://localhost:3000/");
        assert_eq!(
            join_url("https://staging.example.com/", "book"),
            "https://staging.example.com/book"
        );
    }

    #[test]
    fn test_parse_preset() {
        assert_eq!("booking".parse::<Preset>().unwrap(), Preset::Booking);
        assert_eq!(" Landing ".parse::<Preset>().unwrap(), Preset::Landing);
        assert!("checkout".parse::<Preset>().is_err());
    }

    #[test]
    fn test_booking_plan() {
        let plan = Preset::Booking.plan(&RunConfig::default());

        assert_eq!(plan.target_url, "http://localhost:3000/book");
        assert_eq!(plan.assertions.len(), 10);
        assert_eq!(plan.steps.len(), 6);
        assert!(plan.steps[..2].iter().all(|s| !s.optional));
        assert!(plan.steps[2..].iter().all(|s| s.optional));
        assert_eq!(plan.steps[3].action, Action::FillDate { offset_days: 3 });
        assert_eq!(plan.initial_captures[0].name, "consultation-request");
        assert_eq!(plan.captures[0].name, "consultation-filled");
        for spec in &plan.assertions {
            spec.locator().validate().unwrap();
        }
    }

    #[test]
    fn test_landing_plan() {
        let mut config = RunConfig::default();
        config.target_url = "http://127.0.0.1:8080/".to_string();
        let plan = Preset::Landing.plan(&config);

        assert_eq!(plan.target_url, "http://127.0.0.1:8080/");
        let names: Vec<_> = plan.captures.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["full-page", "hero-section", "services-section"]);
        assert_eq!(plan.captures[2].scroll_viewports, Some(2.0));
        assert!(plan.reload_diagnostics);
        assert!(plan.steps.is_empty());
    }
}
