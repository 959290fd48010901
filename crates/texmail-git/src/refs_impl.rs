//! gix-backed revision resolution.

use crate::error::GitError;
use crate::gix_repo::GixRepo;
use crate::types::GitOid;

/// Convert a `gix::ObjectId` (or `&gix::oid`) to a `GitOid`.
pub(crate) fn from_gix_oid(oid: &gix::oid) -> GitOid {
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(oid.as_bytes());
    GitOid::from_bytes(bytes)
}

/// Convert a `GitOid` to a `gix::ObjectId`.
pub(crate) fn to_gix_oid(oid: GitOid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

pub fn rev_parse(repo: &GixRepo, spec: &str) -> Result<GitOid, GitError> {
    let id = repo
        .repo
        .rev_parse_single(spec)
        .map_err(|e| GitError::NotFound {
            message: format!("rev-parse '{spec}': {e}"),
        })?;
    // Peel tags and other commit-ish objects down to the commit.
    let commit = id
        .object()
        .map_err(|e| GitError::NotFound {
            message: format!("object for '{spec}': {e}"),
        })?
        .peel_to_commit()
        .map_err(|e| GitError::NotFound {
            message: format!("'{spec}' does not name a commit: {e}"),
        })?;
    Ok(from_gix_oid(commit.id.as_ref()))
}
