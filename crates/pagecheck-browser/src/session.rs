//! Page session lifecycle

use crate::backend::BrowserBackend;
use crate::error::{PageCheckError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Lifecycle of a page session
///
/// `Unloaded -> Loading -> Stable -> Loading (reload) -> Stable`, with
/// `Failed` reachable from `Loading` (navigation) or `Stable` (capture
/// timeout) and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unloaded,
    Loading,
    Stable,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unloaded => write!(f, "unloaded"),
            Self::Loading => write!(f, "loading"),
            Self::Stable => write!(f, "stable"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One live connection to a loaded page
///
/// The session exclusively owns its backend handle. Components borrow the
/// session for the duration of a call; only the navigator and the artifact
/// writer take it mutably, since they may change its lifecycle state.
pub struct PageSession {
    id: Uuid,
    url: Option<String>,
    state: SessionState,
    stability_timeout: Duration,
    backend: Box<dyn BrowserBackend>,
}

impl PageSession {
    pub fn new(backend: Box<dyn BrowserBackend>, stability_timeout: Duration) -> Self {
        let id = Uuid::new_v4();
        debug!(session = %id, "Page session created");
        Self {
            id,
            url: None,
            state: SessionState::Unloaded,
            stability_timeout,
            backend,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// URL of the last navigation
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stability_timeout(&self) -> Duration {
        self.stability_timeout
    }

    pub fn is_stable(&self) -> bool {
        self.state == SessionState::Stable
    }

    /// Fail with `InvalidSessionState` unless the page is stable
    pub fn ensure_stable(&self) -> Result<()> {
        if self.is_stable() {
            Ok(())
        } else {
            Err(PageCheckError::InvalidSessionState {
                expected: SessionState::Stable.to_string(),
                actual: self.state.to_string(),
            })
        }
    }

    pub fn backend(&self) -> &dyn BrowserBackend {
        self.backend.as_ref()
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        debug!(session = %self.id, from = %self.state, to = %state, "Session state change");
        self.state = state;
    }

    pub(crate) fn set_url(&mut self, url: &str) {
        self.url = Some(url.to_string());
    }

    /// Release the backend; consumes the session
    pub async fn close(self) -> Result<()> {
        info!(session = %self.id, "Closing page session");
        self.backend.close().await
    }
}

impl fmt::Debug for PageSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageSession")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("state", &self.state)
            .field("stability_timeout", &self.stability_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPage, ScriptedBackend};
    use std::sync::Arc;

    #[test]
    fn test_new_session_is_unloaded() {
        let session = PageSession::new(
            Box::new(ScriptedBackend::new(MockPage::new())),
            Duration::from_secs(5),
        );
        assert_eq!(session.state(), SessionState::Unloaded);
        assert!(session.url().is_none());

        let err = session.ensure_stable().unwrap_err();
        assert!(matches!(
            err,
            PageCheckError::InvalidSessionState { ref actual, .. } if actual == "unloaded"
        ));
    }

    #[tokio::test]
    async fn test_close_releases_backend() {
        let backend = Arc::new(ScriptedBackend::new(MockPage::new()));
        let session = PageSession::new(Box::new(Arc::clone(&backend)), Duration::from_secs(5));
        session.close().await.unwrap();
        assert_eq!(backend.counts().closes, 1);
    }
}
