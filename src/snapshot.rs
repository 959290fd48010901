//! Read-only views of one commit: metadata plus an ordered file tree.
//!
//! [`Snapshot`] is the seam between the pipeline and version control.
//! [`GitSnapshot`] resolves a revision through [`texmail_git::GitRepo`];
//! [`MemorySnapshot`] holds everything in memory and backs the tests.

use std::collections::HashMap;
use std::io::{self, Cursor, Read};

use chrono::{DateTime, FixedOffset, Offset, Utc};
use texmail_git::{FileEntry, GitError, GitOid, GitRepo, Signature};

/// Number of hex characters in the short commit id used in file names.
pub const SHORT_ID_LEN: usize = 10;

/// Commit identity and message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitMeta {
    /// Full commit hash.
    pub hash: GitOid,
    /// Author identity and timestamp.
    pub author: Signature,
    /// Full commit message.
    pub message: String,
}

impl CommitMeta {
    /// First [`SHORT_ID_LEN`] hex characters of the hash.
    #[must_use]
    pub fn short_id(&self) -> String {
        self.hash.short(SHORT_ID_LEN)
    }

    /// Author timestamp in the author's own UTC offset.
    ///
    /// Falls back to UTC when the recorded offset is out of range.
    #[must_use]
    pub fn author_time(&self) -> DateTime<FixedOffset> {
        let utc = DateTime::<Utc>::from_timestamp(self.author.time, 0).unwrap_or_default();
        let offset =
            FixedOffset::east_opt(self.author.offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        utc.with_timezone(&offset)
    }

    /// `MM-DD` of the author date, as used in artifact names.
    #[must_use]
    pub fn date_stamp(&self) -> String {
        self.author_time().format("%m-%d").to_string()
    }
}

/// A commit's metadata and its file tree in a stable traversal order.
pub trait Snapshot {
    /// Commit identity and message.
    fn meta(&self) -> &CommitMeta;

    /// Every file path in traversal order. The order is stable for a given
    /// commit and is the order archive entries are written in.
    fn paths(&self) -> &[String];

    /// Open a fresh content stream for `path`.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown paths, or the backend's read failure.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>>;
}

// ---------------------------------------------------------------------------
// GitSnapshot
// ---------------------------------------------------------------------------

/// A [`Snapshot`] of one commit in a git repository.
///
/// The tree is walked once up front; blob content is read lazily in
/// [`Snapshot::open`].
pub struct GitSnapshot<'r> {
    repo: &'r dyn GitRepo,
    meta: CommitMeta,
    paths: Vec<String>,
    blobs: HashMap<String, GitOid>,
}

impl<'r> GitSnapshot<'r> {
    /// Resolve `rev` and index its tree.
    ///
    /// # Errors
    /// Returns [`GitError`] if the revision cannot be resolved or an object
    /// cannot be read.
    pub fn resolve(repo: &'r dyn GitRepo, rev: &str) -> Result<Self, GitError> {
        let oid = repo.rev_parse(rev)?;
        let commit = repo.read_commit(oid)?;
        let files = repo.walk_files(commit.tree_oid)?;
        tracing::debug!(commit = %oid, files = files.len(), "indexed commit tree");

        let paths = files.iter().map(|f| f.path.clone()).collect();
        let blobs = files
            .into_iter()
            .map(|FileEntry { path, oid, .. }| (path, oid))
            .collect();

        Ok(Self {
            repo,
            meta: CommitMeta {
                hash: commit.oid,
                author: commit.author,
                message: commit.message,
            },
            paths,
            blobs,
        })
    }
}

impl Snapshot for GitSnapshot<'_> {
    fn meta(&self) -> &CommitMeta {
        &self.meta
    }

    fn paths(&self) -> &[String] {
        &self.paths
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        let oid = self.blobs.get(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{path} is not in the commit"))
        })?;
        let data = self.repo.read_blob(*oid).map_err(io::Error::other)?;
        Ok(Box::new(Cursor::new(data)))
    }
}

// ---------------------------------------------------------------------------
// MemorySnapshot
// ---------------------------------------------------------------------------

/// An in-memory [`Snapshot`]; files keep their insertion order.
#[derive(Clone, Debug)]
pub struct MemorySnapshot {
    meta: CommitMeta,
    paths: Vec<String>,
    contents: HashMap<String, Vec<u8>>,
}

impl MemorySnapshot {
    /// Empty snapshot with the given metadata.
    #[must_use]
    pub fn new(meta: CommitMeta) -> Self {
        Self {
            meta,
            paths: Vec::new(),
            contents: HashMap::new(),
        }
    }

    /// Append a file (builder style). Re-adding a path replaces its content
    /// but keeps its original position.
    #[must_use]
    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        if self.contents.insert(path.to_owned(), content.into()).is_none() {
            self.paths.push(path.to_owned());
        }
        self
    }
}

impl Snapshot for MemorySnapshot {
    fn meta(&self) -> &CommitMeta {
        &self.meta
    }

    fn paths(&self) -> &[String] {
        &self.paths
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        let data = self.contents.get(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{path} is not in the commit"))
        })?;
        Ok(Box::new(data.as_slice()))
    }
}
