//! Git snapshot access for texmail.
//!
//! This crate defines the [`GitRepo`] trait, the single interface through
//! which texmail reads commits, trees, and blobs. The build pipeline never
//! imports gix directly; it depends on `texmail-git` and programs against the
//! trait.
//!
//! # Crate layout
//!
//! - [`repo`]: the [`GitRepo`] trait definition.
//! - [`types`]: value types used in trait signatures ([`GitOid`],
//!   [`TreeEntry`], [`CommitInfo`], [`Signature`], etc.).
//! - [`error`]: the [`GitError`] enum returned by all trait methods.

pub mod error;
pub mod repo;
pub mod types;

// gix-backed implementation modules
mod config_impl;
mod gix_repo;
mod objects_impl;
mod refs_impl;

pub use gix_repo::GixRepo;

// Re-export the main trait and commonly used types at the crate root for
// ergonomic imports: `use texmail_git::{GitRepo, GitOid, GitError};`
pub use error::GitError;
pub use repo::GitRepo;
pub use types::{CommitInfo, EntryMode, FileEntry, GitOid, OidParseError, Signature, TreeEntry};
