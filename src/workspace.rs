//! The transient workspace: a private temporary directory holding staged
//! files and compiler outputs for one run.
//!
//! The directory is removed only when [`Workspace::finish`] is called after a
//! successful run. A workspace dropped any other way (an error propagated
//! with `?`, a panic) is retained on disk and its path is logged, so a failed
//! compilation can be inspected afterwards.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{BuildError, Result};

/// Owner identifiers recorded in archive headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Owner {
    pub uid: u64,
    pub gid: u64,
}

/// A per-run temporary directory.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Create a fresh workspace under the system temp directory.
    ///
    /// # Errors
    /// Returns [`BuildError::Io`] if the directory cannot be created.
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("texmail-")
            .tempdir()
            .map_err(|e| BuildError::io("create transient workspace", e))?;
        let path = dir.path().to_path_buf();
        tracing::debug!(path = %path.display(), "created workspace");
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    /// Root of the workspace.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absolute location of a logical (slash-separated) path.
    #[must_use]
    pub fn join(&self, logical: &str) -> PathBuf {
        logical
            .split('/')
            .filter(|c| !c.is_empty())
            .fold(self.path.clone(), |acc, c| acc.join(c))
    }

    /// The uid/gid of the running process, read from the workspace
    /// directory it just created.
    ///
    /// # Errors
    /// Returns [`BuildError::Io`] if the directory cannot be stat'ed.
    pub fn owner(&self) -> Result<Owner> {
        let meta = std::fs::metadata(&self.path)
            .map_err(|e| BuildError::io(format!("stat {}", self.path.display()), e))?;
        Ok(owner_of(&meta))
    }

    /// End a successful run: remove the directory, or keep it when `keep`
    /// is set. Returns the retained path, if any.
    ///
    /// # Errors
    /// Returns [`BuildError::Io`] if removal fails.
    pub fn finish(mut self, keep: bool) -> Result<Option<PathBuf>> {
        let Some(dir) = self.dir.take() else {
            return Ok(None);
        };
        if keep {
            let path = dir.keep();
            tracing::info!(path = %path.display(), "keeping workspace");
            return Ok(Some(path));
        }
        dir.close()
            .map_err(|e| BuildError::io(format!("remove {}", self.path.display()), e))?;
        Ok(None)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.keep();
            tracing::warn!(path = %path.display(), "run did not complete; workspace kept for inspection");
        }
    }
}

#[cfg(unix)]
fn owner_of(meta: &std::fs::Metadata) -> Owner {
    use std::os::unix::fs::MetadataExt as _;
    Owner {
        uid: u64::from(meta.uid()),
        gid: u64::from(meta.gid()),
    }
}

#[cfg(not(unix))]
fn owner_of(_meta: &std::fs::Metadata) -> Owner {
    Owner { uid: 0, gid: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_removes_directory() {
        let ws = Workspace::create().unwrap();
        let path = ws.path().to_path_buf();
        assert!(path.is_dir());
        assert_eq!(ws.finish(false).unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn finish_with_keep_retains_directory() {
        let ws = Workspace::create().unwrap();
        let path = ws.path().to_path_buf();
        let kept = ws.finish(true).unwrap();
        assert_eq!(kept.as_deref(), Some(path.as_path()));
        assert!(path.is_dir());
        std::fs::remove_dir_all(path).unwrap();
    }

    #[test]
    fn dropping_without_finish_retains_directory() {
        let ws = Workspace::create().unwrap();
        let path = ws.path().to_path_buf();
        drop(ws);
        assert!(path.is_dir());
        std::fs::remove_dir_all(path).unwrap();
    }

    #[test]
    fn join_splits_logical_path() {
        let ws = Workspace::create().unwrap();
        assert_eq!(ws.join("figs/a.png"), ws.path().join("figs").join("a.png"));
        ws.finish(false).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn owner_matches_created_file() {
        use std::os::unix::fs::MetadataExt as _;
        let ws = Workspace::create().unwrap();
        let probe = ws.join("probe");
        std::fs::write(&probe, b"x").unwrap();
        let meta = std::fs::metadata(&probe).unwrap();
        let owner = ws.owner().unwrap();
        assert_eq!(owner.uid, u64::from(meta.uid()));
        assert_eq!(owner.gid, u64::from(meta.gid()));
        ws.finish(false).unwrap();
    }
}
