//! # pagecheck-core
//!
//! Core types for the PageCheck page-verification harness.
//!
//! A verification run loads one page in a headless browser, evaluates
//! declarative assertions against it, drives form interactions, captures
//! screenshots, and collects passive diagnostics (console errors, broken
//! images). This crate holds the vocabulary shared by the engine and the
//! CLI:
//!
//! - [`Selector`] / [`Locator`]: typed element selection rules
//! - [`AssertionSpec`], [`InteractionStep`], [`CaptureRequest`]: the plan
//! - [`AssertionResult`], [`DiagnosticEvent`], [`Artifact`]: the evidence
//! - [`RunConfig`]: the `pagecheck.toml` file
//! - [`PageCheckError`]: the error taxonomy

pub mod config;
mod error;
pub mod selector;
mod types;

pub use config::{BrowserSettings, NavigationSettings, OutputSettings, RunConfig};
pub use error::{PageCheckError, Result};
pub use selector::{AttributeMatch, Locator, Selector};
pub use types::*;
