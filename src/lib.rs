//! texmail library crate.
//!
//! Turns one git commit into a compiled PDF and a deterministic `.tar.gz` of
//! its sources, and packages both into a MIME message. The `texmail` binary
//! is a thin CLI over [`pipeline::run_build`] and [`output`]; the modules are
//! public so integration tests can drive each stage with in-memory snapshots
//! and fake subprocess runners.

pub mod archive;
pub mod compile;
pub mod compress;
pub mod config;
pub mod error;
pub mod filter;
pub mod materialize;
pub mod message;
pub mod output;
pub mod pipeline;
pub mod snapshot;
pub mod telemetry;
pub mod workspace;

pub use error::{BuildError, Result};
