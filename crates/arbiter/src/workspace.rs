//! Workspace lifecycle management
//!
//! Every execution attempt gets its own directory `<root>/<uuid>`, owned by a
//! single [`Workspace`] and deleted when that workspace is released. A
//! periodic sweep removes directories left behind by crashed processes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{Config, Language};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("workspace manager is shut down")]
    Closed,
}

type LiveSet = Arc<Mutex<HashSet<Uuid>>>;

/// An ephemeral working directory for one execution attempt
///
/// # Cleanup
///
/// Call [`release()`](Self::release) once the attempt is finished. Dropping an
/// unreleased workspace logs a warning and deletes the directory
/// synchronously, so a panicking or cancelled request still cleans up.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,

    path: PathBuf,

    /// Whether the directory has already been deleted
    released: bool,

    /// Ids of workspaces currently alive, shared with the manager
    live: LiveSet,

    /// Admission permit, returned to the manager on drop
    _permit: Option<OwnedSemaphorePermit>,
}

impl Workspace {
    /// Get the workspace ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the path to the workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the path to a file inside the workspace
    ///
    /// Returns an error if the path contains path traversal attempts.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        if name.is_empty() || name.contains("..") || name.starts_with('/') {
            return Err(WorkspaceError::InvalidPath(format!(
                "path traversal not allowed: {name}"
            )));
        }
        Ok(self.path.join(name))
    }

    /// Write a file into the workspace
    #[instrument(skip(self, content), fields(workspace_id = %self.id))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<(), WorkspaceError> {
        let path = self.file_path(name)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote file to workspace");
        Ok(())
    }

    /// Read a file from the workspace
    pub async fn read_file(&self, name: &str) -> Result<Vec<u8>, WorkspaceError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::read(&path).await?)
    }

    /// Check if a file exists in the workspace
    pub async fn file_exists(&self, name: &str) -> Result<bool, WorkspaceError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    /// Write the submission source under the language's file name
    ///
    /// Returns the file name that was written.
    pub async fn write_source(
        &self,
        language: &Language,
        code: &str,
    ) -> Result<String, WorkspaceError> {
        let name = language.source_name();
        let source = language.prepare_source(code);
        self.write_file(&name, source.as_bytes()).await?;
        Ok(name)
    }

    /// Delete the workspace directory
    ///
    /// Failures are logged and otherwise ignored; the sweep picks up
    /// whatever is left behind.
    #[instrument(skip(self), fields(workspace_id = %self.id))]
    pub async fn release(mut self) {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => debug!("workspace released"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("workspace directory already gone");
            }
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to delete workspace"),
        }
    }

    /// Check if the directory has not been deleted yet
    pub fn is_live(&self) -> bool {
        !self.released
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                workspace_id = %self.id,
                path = %self.path.display(),
                "Workspace dropped without release, deleting it now"
            );
            if let Err(e) = std::fs::remove_dir_all(&self.path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(workspace_id = %self.id, error = %e, "best-effort workspace deletion failed");
            }
        }

        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Result of one sweep over the workspace root
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Workspace directories inspected
    pub scanned: usize,

    /// Directories deleted
    pub removed: usize,

    /// Directories that could not be deleted
    pub failed: usize,
}

/// Creates workspaces and bounds how many exist at once
#[derive(Debug)]
pub struct WorkspaceManager {
    root: PathBuf,

    /// Age after which a directory nobody owns is deleted by the sweep
    retention: Duration,

    capacity: usize,

    /// Admission semaphore, one permit per live workspace
    semaphore: Arc<Semaphore>,

    live: LiveSet,
}

impl WorkspaceManager {
    /// Create a new workspace manager
    pub fn new(root: impl Into<PathBuf>, capacity: usize, retention: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            root: root.into(),
            retention,
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            live: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.workspace_root.clone(),
            config.max_concurrent_executions,
            Duration::from_secs(config.sweep.retention_secs),
        )
    }

    /// Create a fresh workspace
    ///
    /// Waits until fewer than `capacity` workspaces are alive.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<Workspace, WorkspaceError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkspaceError::Closed)?;

        let id = Uuid::new_v4();
        let path = self.root.join(id.to_string());
        tokio::fs::create_dir_all(&path).await?;

        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);

        debug!(workspace_id = %id, ?path, "acquired workspace");

        Ok(Workspace {
            id,
            path,
            released: false,
            live: Arc::clone(&self.live),
            _permit: Some(permit),
        })
    }

    /// Get the root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the number of workspaces that can be acquired without waiting
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get the maximum number of concurrent workspaces
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Delete orphaned workspace directories older than the retention window
    ///
    /// Only UUID-named directories are considered; workspaces alive in this
    /// process are never touched.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn sweep(&self) -> Result<SweepReport, WorkspaceError> {
        let mut report = SweepReport::default();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        while let Some(entry) = entries.next_entry().await? {
            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| Uuid::parse_str(name).ok())
            else {
                continue;
            };
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_dir() {
                continue;
            }
            report.scanned += 1;

            if self.is_live(&id) {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < self.retention {
                continue;
            }

            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => {
                    debug!(workspace_id = %id, age_secs = age.as_secs(), "removed orphaned workspace");
                    report.removed += 1;
                }
                Err(e) => {
                    warn!(workspace_id = %id, error = %e, "failed to remove orphaned workspace");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run [`sweep()`](Self::sweep) every `interval` on a background task
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match manager.sweep().await {
                    Ok(report) if report.removed > 0 || report.failed > 0 => {
                        info!(
                            removed = report.removed,
                            failed = report.failed,
                            "swept orphaned workspaces"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "workspace sweep failed"),
                }
            }
        })
    }

    fn is_live(&self, id: &Uuid) -> bool {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}
