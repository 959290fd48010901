//! gix-backed object reads.

use crate::error::GitError;
use crate::gix_repo::GixRepo;
use crate::refs_impl::{from_gix_oid, to_gix_oid};
use crate::types::{CommitInfo, EntryMode, GitOid, Signature, TreeEntry};

/// Convert a gix `EntryMode` to our `EntryMode`.
fn from_gix_entry_mode(mode: gix::objs::tree::EntryMode) -> EntryMode {
    match mode.kind() {
        gix::objs::tree::EntryKind::Tree => EntryMode::Tree,
        gix::objs::tree::EntryKind::Blob => EntryMode::Blob,
        gix::objs::tree::EntryKind::BlobExecutable => EntryMode::BlobExecutable,
        gix::objs::tree::EntryKind::Link => EntryMode::Link,
        gix::objs::tree::EntryKind::Commit => EntryMode::Commit,
    }
}

pub fn read_blob(repo: &GixRepo, oid: GitOid) -> Result<Vec<u8>, GitError> {
    let mut blob = repo
        .repo
        .find_blob(to_gix_oid(oid))
        .map_err(|e| GitError::NotFound {
            message: format!("blob {oid}: {e}"),
        })?;
    Ok(blob.take_data())
}

pub fn read_tree(repo: &GixRepo, oid: GitOid) -> Result<Vec<TreeEntry>, GitError> {
    let tree = repo
        .repo
        .find_tree(to_gix_oid(oid))
        .map_err(|e| GitError::NotFound {
            message: format!("tree {oid}: {e}"),
        })?;

    let mut entries = Vec::new();
    for result in tree.iter() {
        let entry = result.map_err(|e| GitError::BackendError {
            message: format!("failed to decode tree entry in {oid}: {e}"),
        })?;
        entries.push(TreeEntry {
            name: entry.inner.filename.to_string(),
            mode: from_gix_entry_mode(entry.inner.mode),
            oid: from_gix_oid(entry.inner.oid),
        });
    }
    Ok(entries)
}

pub fn read_commit(repo: &GixRepo, oid: GitOid) -> Result<CommitInfo, GitError> {
    let commit = repo
        .repo
        .find_commit(to_gix_oid(oid))
        .map_err(|e| GitError::NotFound {
            message: format!("commit {oid}: {e}"),
        })?;
    decode_commit(oid, &commit.data)
}

/// Build a [`CommitInfo`] from raw commit object bytes via gix's decoder.
pub(crate) fn decode_commit(oid: GitOid, data: &[u8]) -> Result<CommitInfo, GitError> {
    let malformed = |reason: String| GitError::MalformedCommit {
        oid: oid.to_string(),
        reason,
    };
    let decoded =
        gix::objs::CommitRef::from_bytes(data).map_err(|e| malformed(e.to_string()))?;

    Ok(CommitInfo {
        oid,
        tree_oid: from_gix_oid(&decoded.tree()),
        parents: decoded.parents().map(|id| from_gix_oid(&id)).collect(),
        message: decoded.message.to_string(),
        author: to_signature(decoded.author()).map_err(&malformed)?,
        committer: to_signature(decoded.committer()).map_err(&malformed)?,
    })
}

fn to_signature(sig: gix::actor::SignatureRef<'_>) -> Result<Signature, String> {
    let time = sig
        .time()
        .map_err(|e| format!("signature time {:?}: {e}", sig.time))?;
    Ok(Signature {
        name: sig.name.to_string(),
        email: sig.email.to_string(),
        time: time.seconds,
        offset_minutes: time.offset / 60,
    })
}
