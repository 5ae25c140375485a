//! Passive diagnostic collection
//!
//! Console messages and failed requests are pushed by the backend at any
//! time; they are only drained when collection stops. Broken images are
//! detected at stop time, after the page has settled, by their zero natural
//! size.

use crate::backend::ConsoleLevel;
use crate::error::Result;
use crate::session::PageSession;
use pagecheck_core::{DiagnosticEvent, ImageInfo};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Aggregates console errors and broken resources for one session
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    /// Session currently being observed
    active: Option<Uuid>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_collecting(&self) -> bool {
        self.active.is_some()
    }

    /// Register listeners on `session`
    ///
    /// Messages buffered before this call are discarded. Calling it again for
    /// the same session is a no-op.
    pub async fn start_collecting(&mut self, session: &PageSession) -> Result<()> {
        if self.active == Some(session.id()) {
            debug!("Diagnostics already collecting for session {}", session.id());
            return Ok(());
        }

        let backend = session.backend();
        backend.subscribe_console().await?;
        let stale = backend.drain_console().await?;
        let stale_failures = backend.drain_failed_requests().await?;
        if !stale.is_empty() || !stale_failures.is_empty() {
            debug!(
                "Discarded {} console messages and {} failed requests from before collection",
                stale.len(),
                stale_failures.len()
            );
        }

        self.active = Some(session.id());
        info!("Diagnostics collection started");
        Ok(())
    }

    /// Finish collection and return events observed since start
    ///
    /// Console errors come first in arrival order, followed by one
    /// `broken-resource` event per image that loaded no content and one per
    /// other failed request. A URL is reported once. A failing broken-image
    /// scan is logged and leaves the other events intact.
    pub async fn stop_collecting(&mut self, session: &PageSession) -> Result<Vec<DiagnosticEvent>> {
        if self.active.take().is_none() {
            warn!("stop_collecting called without an active collection");
            return Ok(Vec::new());
        }

        let backend = session.backend();
        let mut events: Vec<DiagnosticEvent> = backend
            .drain_console()
            .await?
            .into_iter()
            .filter(|message| message.level == ConsoleLevel::Error)
            .map(|message| DiagnosticEvent::console_error(message.text, message.observed_at))
            .collect();

        let mut reported = HashSet::new();
        match backend.images().await {
            Ok(images) => {
                for image in images.iter().filter(|i| i.is_broken()) {
                    if reported.insert(image.src.clone()) {
                        events.push(DiagnosticEvent::broken_resource(
                            image.src.clone(),
                            image.descriptor(),
                        ));
                    }
                }
            }
            Err(e) => warn!("Broken-image scan failed: {}", e),
        }

        match backend.drain_failed_requests().await {
            Ok(failures) => {
                for failed in failures {
                    if reported.insert(failed.url.clone()) {
                        let descriptor = failed.descriptor();
                        events.push(DiagnosticEvent::broken_resource(failed.url, descriptor));
                    }
                }
            }
            Err(e) => warn!("Failed-request drain failed: {}", e),
        }

        info!("Diagnostics collection stopped: {} events", events.len());
        Ok(events)
    }

    /// Snapshot of every image on the page
    pub async fn inspect_images(&self, session: &PageSession) -> Result<Vec<ImageInfo>> {
        session.ensure_stable()?;
        let images = session.backend().images().await?;
        debug!("Found {} images", images.len());
        Ok(images)
    }
}
