//! Page loading and stabilization

use crate::error::{PageCheckError, Result};
use crate::session::{PageSession, SessionState};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Loads pages into a session and waits for them to stabilize
///
/// A load is bounded by the session's stability timeout. On timeout the
/// pending backend call is abandoned and the session is marked `Failed`;
/// nothing is retried.
#[derive(Debug, Clone)]
pub struct Navigator {
    /// Network must stay quiet this long to count as idle
    idle_window: Duration,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl Navigator {
    pub fn new(idle_window: Duration) -> Self {
        Self { idle_window }
    }

    /// Load `url` and wait for quiescence
    ///
    /// Valid from `Unloaded`, and from `Stable` when following a navigation
    /// triggered by an interaction.
    pub async fn open(&self, session: &mut PageSession, url: &str) -> Result<()> {
        match session.state() {
            SessionState::Unloaded | SessionState::Stable => {}
            other => {
                return Err(PageCheckError::InvalidSessionState {
                    expected: "unloaded or stable".to_string(),
                    actual: other.to_string(),
                })
            }
        }

        info!("Opening {}", url);
        session.set_url(url);
        self.load(session, url, false).await
    }

    /// Reload the current page; valid only from `Stable`
    pub async fn reload(&self, session: &mut PageSession) -> Result<()> {
        session.ensure_stable()?;
        let url = session.url().unwrap_or_default().to_string();

        info!("Reloading {}", url);
        self.load(session, &url, true).await
    }

    /// Extra grace period after reaching `Stable`
    ///
    /// Network idleness does not guarantee visual completeness (client-side
    /// hydration, deferred rendering), so callers can wait a little longer.
    pub async fn wait_settled(&self, session: &PageSession, extra_delay: Duration) -> Result<()> {
        session.ensure_stable()?;
        if !extra_delay.is_zero() {
            debug!("Settling for {:?}", extra_delay);
            tokio::time::sleep(extra_delay).await;
        }
        Ok(())
    }

    async fn load(&self, session: &mut PageSession, url: &str, reload: bool) -> Result<()> {
        session.set_state(SessionState::Loading);
        let timeout = session.stability_timeout();
        let idle_window = self.idle_window;

        let outcome = {
            let backend = session.backend();
            tokio::time::timeout(timeout, async move {
                if reload {
                    backend.reload().await?;
                } else {
                    backend.navigate(url).await?;
                }
                backend.wait_for_quiescence(idle_window).await
            })
            .await
        };

        match outcome {
            Ok(Ok(())) => {
                session.set_state(SessionState::Stable);
                info!("Page stable: {}", url);
                Ok(())
            }
            Ok(Err(e)) => {
                session.set_state(SessionState::Failed);
                warn!("Navigation to {} failed: {}", url, e);
                Err(match e {
                    nav @ PageCheckError::Navigation { .. } => nav,
                    other => PageCheckError::Navigation {
                        url: url.to_string(),
                        reason: other.to_string(),
                    },
                })
            }
            Err(_elapsed) => {
                session.set_state(SessionState::Failed);
                warn!("Navigation to {} timed out after {:?}", url, timeout);
                Err(PageCheckError::NavigationTimeout {
                    url: url.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPage, ScriptedBackend};
    use std::sync::Arc;

    fn session_for(backend: ScriptedBackend, timeout: Duration) -> PageSession {
        PageSession::new(Box::new(backend), timeout)
    }

    #[tokio::test]
    async fn test_open_reaches_stable() {
        let mut session = session_for(ScriptedBackend::new(MockPage::new()), Duration::from_secs(5));
        let navigator = Navigator::default();

        navigator.open(&mut session, "http://localhost:3000").await.unwrap();
        assert_eq!(session.state(), SessionState::Stable);
        assert_eq!(session.url(), Some("http://localhost:3000"));

        navigator.wait_settled(&session, Duration::from_millis(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_navigation_error_fails_session() {
        let backend = ScriptedBackend::new(MockPage::new())
            .failing_navigation("net::ERR_CONNECTION_REFUSED");
        let mut session = session_for(backend, Duration::from_secs(5));

        let err = Navigator::default()
            .open(&mut session, "http://localhost:3000")
            .await
            .unwrap_err();

        assert!(matches!(err, PageCheckError::Navigation { ref reason, .. } if reason.contains("REFUSED")));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_navigation_timeout_fails_session() {
        let backend = ScriptedBackend::new(MockPage::new()).hanging();
        let mut session = session_for(backend, Duration::from_millis(50));

        let err = Navigator::default()
            .open(&mut session, "http://localhost:3000")
            .await
            .unwrap_err();

        assert!(matches!(err, PageCheckError::NavigationTimeout { timeout_ms: 50, .. }));
        assert_eq!(session.state(), SessionState::Failed);

        // Failed is terminal
        let err = Navigator::default()
            .open(&mut session, "http://localhost:3000")
            .await
            .unwrap_err();
        assert!(matches!(err, PageCheckError::InvalidSessionState { .. }));
    }

    #[tokio::test]
    async fn test_reload_requires_stable() {
        let backend = Arc::new(ScriptedBackend::new(MockPage::new()));
        let mut session = PageSession::new(Box::new(Arc::clone(&backend)), Duration::from_secs(5));
        let navigator = Navigator::default();

        let err = navigator.reload(&mut session).await.unwrap_err();
        assert!(matches!(err, PageCheckError::InvalidSessionState { .. }));
        assert!(navigator
            .wait_settled(&session, Duration::ZERO)
            .await
            .is_err());

        navigator.open(&mut session, "http://localhost:3000/book").await.unwrap();
        navigator.reload(&mut session).await.unwrap();
        assert_eq!(session.state(), SessionState::Stable);
        assert_eq!(backend.counts().reloads, 1);
    }
}
