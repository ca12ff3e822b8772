use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::config::CloneConfig;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error("failed to allocate workspace under {root}: {reason}")]
    Allocate { root: String, reason: String },
    #[error("failed to remove workspace {path}: {reason}")]
    Remove { path: String, reason: String },
    #[error("workspace {0} is still in use by a running clone")]
    Busy(String),
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;

// ---------------------------------------------------------------------------
// WorkspaceAllocator
// ---------------------------------------------------------------------------

/// Hands out one private temporary directory per clone target.
///
/// Directories are created under `root` with a random suffix and are not
/// removed on drop; the owner calls [`WorkspaceAllocator::remove`].
#[derive(Debug, Clone)]
pub struct WorkspaceAllocator {
    root: PathBuf,
    prefix: String,
}

impl WorkspaceAllocator {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(cfg: &CloneConfig) -> Self {
        Self::new(cfg.workspace_root(), cfg.workspace_prefix.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh empty directory whose name hints at `label`.
    pub fn allocate(&self, label: &str) -> Result<PathBuf> {
        let alloc_err = |e: std::io::Error| WorkspaceError::Allocate {
            root: self.root.display().to_string(),
            reason: e.to_string(),
        };
        std::fs::create_dir_all(&self.root).map_err(alloc_err)?;

        let prefix = format!("{}{}-", self.prefix, sanitize_label(label));
        let path = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&self.root)
            .map_err(alloc_err)?
            .keep();
        debug!(path = %path.display(), "workspace allocated");
        Ok(path)
    }

    /// Empty an existing workspace so a clone can be retried into it.
    pub fn reset(&self, path: &Path) -> Result<()> {
        self.remove(path)?;
        std::fs::create_dir_all(path).map_err(|e| WorkspaceError::Allocate {
            root: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Remove a workspace. A path that is already gone counts as removed.
    pub fn remove(&self, path: &Path) -> Result<()> {
        match std::fs::remove_dir_all(path) {
            Ok(()) => {
                debug!(path = %path.display(), "workspace removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkspaceError::Remove {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

impl Default for WorkspaceAllocator {
    fn default() -> Self {
        Self::from_config(&CloneConfig::default())
    }
}

/// Directory-name-safe label from a clone URL: its last path segment,
/// without `.git`.
pub fn label_for_url(url: &str) -> String {
    let last = url
        .trim_end_matches('/')
        .rsplit(['/', ':', '\\'])
        .next()
        .unwrap_or("");
    let last = last.trim_end_matches(".git");
    if last.is_empty() {
        "repo".to_string()
    } else {
        sanitize_label(last)
    }
}

fn sanitize_label(name: &str) -> String {
    name.chars()
        .take(48)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .to_lowercase()
}
