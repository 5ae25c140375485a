//! Artifact capture and storage
//!
//! Screenshots are written to `<artifact_dir>/<run-label>/<name>.png`. A name
//! is a key: capturing the same name twice in a run overwrites the earlier
//! file.

use crate::backend::ScreenshotArea;
use crate::error::{PageCheckError, Result};
use crate::session::{PageSession, SessionState};
use chrono::Utc;
use pagecheck_core::{is_path_segment, Artifact, CaptureRequest, CaptureScope, Locator};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

/// File extension of stored captures
const SCREENSHOT_EXTENSION: &str = "png";

/// Filesystem store for named captures
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    base_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory holding one run's artifacts
    pub fn run_dir(&self, run_label: &str) -> PathBuf {
        self.base_dir.join(run_label)
    }

    /// Location of artifact `name` in run `run_label`
    pub fn path_for(&self, run_label: &str, name: &str) -> PathBuf {
        self.run_dir(run_label)
            .join(format!("{}.{}", name, SCREENSHOT_EXTENSION))
    }

    /// Write `data` under `name`, replacing any previous content
    pub async fn write(&self, run_label: &str, name: &str, data: &[u8]) -> Result<PathBuf> {
        validate_name(run_label)?;
        validate_name(name)?;

        let run_dir = self.run_dir(run_label);
        fs::create_dir_all(&run_dir).await.map_err(|e| {
            PageCheckError::Capture(format!(
                "Failed to create artifact directory {}: {}",
                run_dir.display(),
                e
            ))
        })?;

        let file_path = self.path_for(run_label, name);
        fs::write(&file_path, data).await.map_err(|e| {
            PageCheckError::Capture(format!(
                "Failed to write artifact {}: {}",
                file_path.display(),
                e
            ))
        })?;

        debug!("Wrote {} bytes to {}", data.len(), file_path.display());
        Ok(file_path)
    }

    /// Stored artifact files for a run, sorted by path
    pub async fn list(&self, run_label: &str) -> Result<Vec<PathBuf>> {
        let run_dir = self.run_dir(run_label);
        if !run_dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        let mut entries = fs::read_dir(&run_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(SCREENSHOT_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Artifact names become file names; keep them to one path segment
fn validate_name(name: &str) -> Result<()> {
    if !is_path_segment(name) {
        return Err(PageCheckError::InvalidArtifactName(name.to_string()));
    }
    Ok(())
}

/// Captures screenshots of a stable session into an [`ArtifactStore`]
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    store: ArtifactStore,
    run_label: String,
    capture_timeout: Duration,
}

impl ArtifactWriter {
    pub fn new(store: ArtifactStore, run_label: impl Into<String>, capture_timeout: Duration) -> Self {
        Self {
            store,
            run_label: run_label.into(),
            capture_timeout,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn run_label(&self) -> &str {
        &self.run_label
    }

    /// Capture `scope` under `name`
    pub async fn capture(
        &self,
        session: &mut PageSession,
        name: &str,
        scope: CaptureScope,
    ) -> Result<Artifact> {
        let request = CaptureRequest {
            name: name.to_string(),
            scope,
            scroll_viewports: None,
        };
        self.capture_request(session, &request).await
    }

    /// Capture a request, scrolling first if it asks to
    ///
    /// Fails with `Capture` if the session is not stable, the region cannot
    /// be located, the backend fails, or the file cannot be written. A
    /// capture that times out marks the session `Failed`.
    pub async fn capture_request(
        &self,
        session: &mut PageSession,
        request: &CaptureRequest,
    ) -> Result<Artifact> {
        validate_name(&request.name)?;
        session
            .ensure_stable()
            .map_err(|e| PageCheckError::Capture(format!("cannot capture {}: {}", request.name, e)))?;

        info!("Capturing '{}' ({})", request.name, request.scope);
        let data = {
            let backend = session.backend();
            tokio::time::timeout(self.capture_timeout, async {
                if let Some(viewports) = request.scroll_viewports {
                    backend.scroll_to(viewports).await?;
                }
                let area = match &request.scope {
                    CaptureScope::FullPage => ScreenshotArea::FullPage,
                    CaptureScope::Viewport => ScreenshotArea::Viewport,
                    CaptureScope::Region { selector } => {
                        let locator = Locator::new(selector.clone());
                        locator.validate()?;
                        let bounds = backend
                            .query(&locator)
                            .await?
                            .into_iter()
                            .find_map(|e| e.bounds.filter(|b| !b.is_empty()))
                            .ok_or_else(|| {
                                PageCheckError::Capture(format!(
                                    "region {} has no rendered element",
                                    locator
                                ))
                            })?;
                        ScreenshotArea::Clip(bounds)
                    }
                };
                backend.screenshot(area).await
            })
            .await
        };

        let data = match data {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                return Err(match e {
                    capture @ PageCheckError::Capture(_) => capture,
                    other => PageCheckError::Capture(other.to_string()),
                })
            }
            Err(_elapsed) => {
                warn!("Capture '{}' timed out after {:?}", request.name, self.capture_timeout);
                session.set_state(SessionState::Failed);
                return Err(PageCheckError::Capture(format!(
                    "capture '{}' timed out after {}ms",
                    request.name,
                    self.capture_timeout.as_millis()
                )));
            }
        };

        let path = self.store.write(&self.run_label, &request.name, &data).await?;
        info!("Artifact stored: {} ({} bytes)", path.display(), data.len());

        Ok(Artifact {
            name: request.name.clone(),
            run_label: self.run_label.clone(),
            scope: request.scope.clone(),
            path,
            size_bytes: data.len() as u64,
            captured_at: Utc::now(),
        })
    }
}
