//! Page verification engine for PageCheck
//!
//! Drives a browser against a running site, checks that the expected
//! elements are there, fills in forms, captures screenshots and collects
//! console errors and broken images into a [`RunReport`].
//!
//! # Example
//!
//! ```no_run
//! use pagecheck_browser::{ChromeBackend, Preset, RunOrchestrator};
//! use pagecheck_core::RunConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig::default();
//!     let backend = ChromeBackend::launch().await?;
//!
//!     let plan = Preset::Booking.plan(&config);
//!     let report = RunOrchestrator::new().run(Box::new(backend), &plan).await;
//!
//!     for line in report.summary_lines() {
//!         println!("{}", line);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Requirements
//!
//! - Chrome or Chromium installed for [`ChromeBackend`]
//! - For connecting to an existing browser: `chrome --remote-debugging-port=9222`
//!
//! # Architecture
//!
//! - [`backend`]: the capability trait every browser implementation provides
//! - [`chrome`]: DevTools implementation; `mock` (feature `mock`): in-memory
//!   implementation for tests
//! - [`session`], [`navigator`]: page lifecycle and stabilization
//! - [`assertions`], [`interactions`], [`diagnostics`], [`artifacts`]: run phases
//! - [`orchestrator`], [`report`], [`presets`]: composing a run

pub mod artifacts;
pub mod assertions;
pub mod backend;
pub mod chrome;
pub mod diagnostics;
pub mod error;
pub mod interactions;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod navigator;
pub mod orchestrator;
pub mod presets;
pub mod report;
mod script;
pub mod session;

// Re-export commonly used types
pub use artifacts::{ArtifactStore, ArtifactWriter};
pub use assertions::AssertionEngine;
pub use backend::{
    BrowserBackend, ConsoleLevel, ConsoleMessage, ElementInfo, FailedRequest, ScreenshotArea,
};
pub use chrome::{BrowserConfig, ChromeBackend};
pub use diagnostics::DiagnosticCollector;
pub use error::{PageCheckError, Result};
pub use interactions::{InteractionSequencer, SequenceReport};
pub use navigator::Navigator;
pub use orchestrator::{RunOrchestrator, RunPlan};
pub use presets::Preset;
pub use report::{CaptureFailure, RunReport, RunStatus};
pub use session::{PageSession, SessionState};
