//! Scratch space for compression trials.
//!
//! A [`TrialWorkspace`] is a private directory created next to the file being
//! compressed. Every trial encode writes into it, losing trials are discarded
//! as soon as they lose, and the winner is promoted over the original. The
//! directory and anything left in it are removed when the workspace drops.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use mm_core::{Error, Result};

/// Per-call directory holding trial outputs.
///
/// # Example
///
/// ```no_run
/// use mm_av::TrialWorkspace;
///
/// let ws = TrialWorkspace::new(std::path::Path::new("/data/photo.jpg")).unwrap();
/// let trial = ws.trial_path("q70");
/// // ... encode into `trial` ...
/// ws.promote(&trial).unwrap();
/// ```
#[derive(Debug)]
pub struct TrialWorkspace {
    dir: TempDir,
    original: PathBuf,
}

impl TrialWorkspace {
    /// Create a workspace beside `original` so promotion is a same-filesystem
    /// rename.
    pub fn new(original: &Path) -> Result<Self> {
        let parent = match original.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let dir = tempfile::Builder::new()
            .prefix(".mediamill-trials-")
            .tempdir_in(&parent)
            .map_err(|e| {
                Error::Internal(format!(
                    "failed to create trial workspace in {}: {e}",
                    parent.display()
                ))
            })?;

        Ok(Self {
            dir,
            original: original.to_path_buf(),
        })
    }

    /// The file being compressed.
    pub fn original(&self) -> &Path {
        &self.original
    }

    /// Path to the workspace directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a trial labelled `label`, keeping the original's extension
    /// so encoders pick the right container.
    pub fn trial_path(&self, label: &str) -> PathBuf {
        let stem = self
            .original
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "trial".to_string());
        let name = match self.original.extension() {
            Some(ext) => format!("{stem}.{label}.{}", ext.to_string_lossy()),
            None => format!("{stem}.{label}"),
        };
        self.dir.path().join(name)
    }

    /// Delete a trial that lost. Missing files are ignored.
    pub fn discard(&self, trial: &Path) {
        if let Err(e) = std::fs::remove_file(trial) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %trial.display(), error = %e, "Failed to remove trial");
            }
        }
    }

    /// Move the chosen trial over the original and return the original path.
    ///
    /// Tries a rename first, falling back to copy and remove.
    pub fn promote(self, trial: &Path) -> Result<PathBuf> {
        if !trial.exists() {
            return Err(Error::Internal(format!(
                "trial file does not exist: {}",
                trial.display()
            )));
        }

        if std::fs::rename(trial, &self.original).is_err() {
            std::fs::copy(trial, &self.original)?;
            let _ = std::fs::remove_file(trial);
        }

        Ok(self.original.clone())
    }
}
