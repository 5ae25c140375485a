//! Unified error types for PageCheck

use thiserror::Error;

/// Unified error type for all PageCheck operations
#[derive(Error, Debug)]
pub enum PageCheckError {
    // Navigation errors (fatal to a run)
    #[error("Navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    // Sequencing errors
    #[error("Invalid session state: expected {expected}, found {actual}")]
    InvalidSessionState { expected: String, actual: String },

    #[error("Interaction step {step} target not found: {selector}")]
    TargetNotFound { step: usize, selector: String },

    // Capture errors
    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Invalid artifact name: {0}")]
    InvalidArtifactName(String),

    // Browser collaborator errors
    #[error("Browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("Browser backend error: {0}")]
    Backend(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl PageCheckError {
    /// Session-level failures that leave the page unusable and abort a run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NavigationTimeout { .. } | Self::Navigation { .. } | Self::BrowserLaunch(_)
        )
    }
}

/// Result type alias using PageCheckError
pub type Result<T> = std::result::Result<T, PageCheckError>;
