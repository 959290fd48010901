//! Deterministic tar archive of staged source files.
//!
//! Entry headers never depend on wall-clock time or on the staged files'
//! filesystem metadata: mode is fixed, owner ids come from the running
//! process, and every entry carries the commit author time.

use std::fs::File;
use std::io::{self, Read};

use tar::{EntryType, Header};
use tracing::instrument;

use crate::error::{BuildError, Result};
use crate::materialize::StagedFile;
use crate::workspace::{Owner, Workspace};

/// Permission bits recorded for every entry.
pub const ENTRY_MODE: u32 = 0o644;

/// Header fields shared by every entry of one archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryMeta {
    pub owner: Owner,
    /// Seconds since the epoch; the commit author time.
    pub mtime: u64,
}

impl EntryMeta {
    /// Negative author times clamp to the epoch.
    #[must_use]
    pub fn new(owner: Owner, author_time: i64) -> Self {
        Self {
            owner,
            mtime: u64::try_from(author_time).unwrap_or(0),
        }
    }
}

/// Appends staged files to an in-memory tar stream, in call order.
pub struct ArchiveBuilder {
    inner: tar::Builder<Vec<u8>>,
    meta: EntryMeta,
    paths: Vec<String>,
}

impl ArchiveBuilder {
    #[must_use]
    pub fn new(meta: EntryMeta) -> Self {
        Self {
            inner: tar::Builder::new(Vec::new()),
            meta,
            paths: Vec::new(),
        }
    }

    /// Append one staged file.
    ///
    /// The file is reopened from the workspace; its on-disk length must equal
    /// the length measured while staging, and exactly that many bytes must be
    /// copied into the entry.
    ///
    /// # Errors
    /// - [`BuildError::ArchiveLengthMismatch`] on any size disagreement.
    /// - [`BuildError::Io`] if the file cannot be reopened or written.
    #[instrument(skip(self, file), fields(path = %file.path, len = file.len))]
    pub fn append(&mut self, file: &StagedFile) -> Result<()> {
        let context = || format!("archive {}", file.path);
        let handle = File::open(&file.location).map_err(|e| BuildError::io(context(), e))?;
        let on_disk = handle
            .metadata()
            .map_err(|e| BuildError::io(context(), e))?
            .len();
        if on_disk != file.len {
            return Err(BuildError::ArchiveLengthMismatch {
                path: file.path.clone(),
                expected: file.len,
                actual: on_disk,
            });
        }

        let mut header = self.header(file.len).map_err(|e| BuildError::io(context(), e))?;
        let mut reader = CountingReader::new(handle.take(file.len));
        self.inner
            .append_data(&mut header, &file.path, &mut reader)
            .map_err(|e| BuildError::io(context(), e))?;
        if reader.count != file.len {
            return Err(BuildError::ArchiveLengthMismatch {
                path: file.path.clone(),
                expected: file.len,
                actual: reader.count,
            });
        }

        tracing::info!(path = %file.path, "including");
        self.paths.push(file.path.clone());
        Ok(())
    }

    /// Write the end-of-archive marker and return the tar bytes.
    ///
    /// # Errors
    /// Returns [`BuildError::Io`] if the trailer cannot be written.
    pub fn finish(self) -> Result<(Vec<u8>, Vec<String>)> {
        let bytes = self
            .inner
            .into_inner()
            .map_err(|e| BuildError::io("finish archive", e))?;
        Ok((bytes, self.paths))
    }

    fn header(&self, size: u64) -> io::Result<Header> {
        let owner = self.meta.owner;
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(ENTRY_MODE);
        header.set_size(size);
        header.set_mtime(self.meta.mtime);
        header.set_uid(owner.uid);
        header.set_gid(owner.gid);
        header.set_username(&owner.uid.to_string())?;
        header.set_groupname(&owner.gid.to_string())?;
        Ok(header)
    }
}

/// Append every candidate the compiler actually read.
///
/// `candidates` is scanned in order; a candidate is included when its name
/// appears anywhere in `log`. Each included file is reopened from the
/// workspace and its size taken from disk. Returns the included paths.
///
/// # Errors
/// Propagates [`ArchiveBuilder::append`] failures and stat errors.
#[instrument(skip_all, fields(candidates = candidates.len()))]
pub fn augment_from_log(
    archive: &mut ArchiveBuilder,
    workspace: &Workspace,
    candidates: &[String],
    log: &[u8],
) -> Result<Vec<String>> {
    let mut included = Vec::new();
    for path in candidates {
        if !log_mentions(log, path) {
            tracing::debug!(path = %path, "not read by the compiler; skipping");
            continue;
        }
        let location = workspace.join(path);
        let len = std::fs::metadata(&location)
            .map_err(|e| BuildError::io(format!("stat {}", location.display()), e))?
            .len();
        archive.append(&StagedFile {
            path: path.clone(),
            location,
            len,
        })?;
        included.push(path.clone());
    }
    Ok(included)
}

fn log_mentions(log: &[u8], name: &str) -> bool {
    let needle = name.as_bytes();
    !needle.is_empty() && log.windows(needle.len()).any(|w| w == needle)
}

struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R> CountingReader<R> {
    const fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}
