//! The [`GitRepo`] trait: the abstraction boundary between texmail and git.
//!
//! The build pipeline only ever *reads* from a repository: it resolves one
//! revision, decodes the commit, walks its tree, and streams blobs. The trait
//! is object-safe so callers can use `&dyn GitRepo`.
//!
//! | Group       | Methods                                  |
//! |-------------|------------------------------------------|
//! | Rev-parse   | `rev_parse`                              |
//! | Object read | `read_blob`, `read_tree`, `read_commit`  |
//! | Traversal   | `walk_files` (provided)                  |
//! | Config      | `read_config`                            |

use crate::error::GitError;
use crate::types::{CommitInfo, EntryMode, FileEntry, GitOid, TreeEntry};

/// Read-only git access used by the texmail pipeline.
///
/// Implementations may be backed by gix (the preferred backend) or a test
/// double.
pub trait GitRepo {
    /// Resolve a revision specification (`HEAD`, `main~2`, a hex OID, ...)
    /// to a commit OID.
    ///
    /// Returns [`GitError::NotFound`] if the spec cannot be resolved.
    fn rev_parse(&self, spec: &str) -> Result<GitOid, GitError>;

    /// Read the raw contents of a blob object.
    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError>;

    /// Read the entries of a tree object, one level deep, in the order they
    /// are stored in the tree.
    fn read_tree(&self, oid: GitOid) -> Result<Vec<TreeEntry>, GitError>;

    /// Read and decode a commit object.
    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError>;

    /// Read a config value (e.g. `"user.email"`) from the merged
    /// system/global/local configuration. `None` if unset.
    fn read_config(&self, key: &str) -> Result<Option<String>, GitError>;

    /// Recursively list every file below `tree`, depth-first, in git tree
    /// order.
    ///
    /// Subtrees are expanded in place, so `a/x` comes before `b` when the
    /// tree stores `a` before `b`. Gitlinks (submodules) are skipped; their
    /// content is not in this repository.
    fn walk_files(&self, tree: GitOid) -> Result<Vec<FileEntry>, GitError> {
        let mut out = Vec::new();
        walk_into(self, tree, "", &mut out)?;
        Ok(out)
    }
}

fn walk_into<R: GitRepo + ?Sized>(
    repo: &R,
    tree: GitOid,
    prefix: &str,
    out: &mut Vec<FileEntry>,
) -> Result<(), GitError> {
    for entry in repo.read_tree(tree)? {
        let path = if prefix.is_empty() {
            entry.name
        } else {
            format!("{prefix}/{}", entry.name)
        };
        match entry.mode {
            EntryMode::Tree => walk_into(repo, entry.oid, &path, out)?,
            EntryMode::Commit => {
                tracing::debug!(path = %path, "skipping gitlink");
            }
            mode => out.push(FileEntry {
                path,
                mode,
                oid: entry.oid,
            }),
        }
    }
    Ok(())
}
