//! Engine error types - re-exports the unified PageCheckError from pagecheck-core
//!
//! Backend failures from the DevTools client are mapped into the taxonomy at
//! the backend boundary; components above it only see `PageCheckError`.

pub use pagecheck_core::{PageCheckError, Result};
