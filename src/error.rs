//! Build error types.
//!
//! Defines [`BuildError`], the unified error type for every pipeline stage.
//! Every variant is fatal: the pipeline never recovers locally or retries.
//! Messages name the file or program involved so the operator can act on
//! them without extra context.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Unified error type for texmail build operations.
#[derive(Debug, Error)]
pub enum BuildError {
    // -- input errors --------------------------------------------------------
    /// An admitted file could not be read from the commit snapshot.
    #[error("cannot read `{path}` from the commit: {source}")]
    UnreadableFile {
        /// Logical path inside the commit tree.
        path: String,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// The primary document source has no `\documentclass` line.
    #[error("`{path}` has no \\documentclass line; cannot inject the provenance stamp")]
    MissingDocumentClass {
        /// Logical path of the primary document source.
        path: String,
    },

    /// The primary document source was not staged (filtered out or absent).
    #[error("`{path}` is not in the staged tree.\n  To fix: commit it, or check --exclude / allow-list settings")]
    MissingDocumentSource {
        /// Logical path of the primary document source.
        path: String,
    },

    // -- subprocess errors ---------------------------------------------------
    /// An external program could not be started.
    #[error("failed to run `{program}`: {source}")]
    CommandSpawn {
        /// Program name as configured.
        program: String,
        /// Underlying spawn failure.
        #[source]
        source: std::io::Error,
    },

    /// An external program exited with a non-zero status.
    #[error("`{program}` exited with {}\n{output}", code.map_or_else(|| "a signal".to_owned(), |c| format!("code {c}")))]
    CommandFailed {
        /// Program name as configured.
        program: String,
        /// Exit code, `None` if killed by a signal.
        code: Option<i32>,
        /// Tail of the program's combined output.
        output: String,
    },

    // -- filesystem errors ---------------------------------------------------
    /// A filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted (e.g. `"create /tmp/x/main.tex"`).
        context: String,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// The compiler's cross-reference file could not be opened.
    #[error("cannot open cross-reference file {}: {source}", path.display())]
    MissingAuxFile {
        /// Expected location of the `.aux` file.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// An expected compiler output was not produced.
    #[error("expected output {} was not produced", path.display())]
    MissingOutput {
        /// Expected location of the output.
        path: PathBuf,
    },

    // -- protocol errors -----------------------------------------------------
    /// A mail address could not be parsed.
    #[error("invalid mail address {value:?}: {reason}")]
    InvalidAddress {
        /// The raw address text.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The bytes copied into an archive entry did not match its header size.
    #[error("archive entry `{path}`: header says {expected} bytes but {actual} were copied")]
    ArchiveLengthMismatch {
        /// Logical path of the entry.
        path: String,
        /// Size recorded in the header.
        expected: u64,
        /// Bytes actually available/copied.
        actual: u64,
    },

    // -- collaborators -------------------------------------------------------
    /// The git layer failed.
    #[error(transparent)]
    Git(#[from] texmail_git::GitError),

    /// The configuration file was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BuildError {
    /// Wrap an I/O error with a short description of the attempted action.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Convenience alias used across the library.
pub type Result<T, E = BuildError> = std::result::Result<T, E>;
