//! One build run: snapshot in, compiled document and compressed archive out.
//!
//! Stages run strictly in order: filter and materialize every path, append to
//! the archive (immediately, or after compilation in release mode), compile,
//! compress. The first error aborts the run and leaves the workspace on disk.

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use tracing::instrument;

use crate::archive::{self, ArchiveBuilder, EntryMeta};
use crate::compile::{CommandRunner, CompilationState, Compiler};
use crate::compress;
use crate::config::BuildConfig;
use crate::error::{BuildError, Result};
use crate::materialize::{Materializer, ProvenanceStamp};
use crate::snapshot::Snapshot;
use crate::workspace::Workspace;

/// Everything a successful run produces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildArtifacts {
    /// Compiled document.
    pub pdf: Vec<u8>,
    /// Gzip-compressed tar archive.
    pub archive_gz: Vec<u8>,
    /// Archive entry paths, in order.
    pub archived_paths: Vec<String>,
    /// Compilation states visited.
    pub states: Vec<CompilationState>,
    /// Set when the workspace was kept on request.
    pub kept_workspace: Option<PathBuf>,
}

/// Run the build for `snapshot` under `config`.
///
/// `stamped_at` is the wall-clock time shown in the provenance stamp.
///
/// # Errors
/// The first [`BuildError`] raised by any stage.
#[instrument(skip_all, fields(commit = %snapshot.meta().hash, release = config.release))]
pub fn run_build(
    config: &BuildConfig,
    snapshot: &dyn Snapshot,
    runner: &dyn CommandRunner,
    stamped_at: DateTime<FixedOffset>,
) -> Result<BuildArtifacts> {
    let meta = snapshot.meta();
    let workspace = Workspace::create()?;
    let mut archive = ArchiveBuilder::new(EntryMeta::new(workspace.owner()?, meta.author.time));

    let stamp = ProvenanceStamp {
        hash: meta.hash,
        stamped_at,
    };
    let materializer =
        Materializer::new(&workspace, config.document_source(), &stamp, config.release);

    let mut staged = Vec::new();
    for path in snapshot.paths() {
        if !config.filter.admits(path) {
            tracing::debug!(path = %path, "excluded");
            continue;
        }
        let file = materializer.stage(snapshot, path)?;
        if !config.release {
            archive.append(&file)?;
        }
        staged.push(file.path);
    }
    tracing::info!(files = staged.len(), "staged commit tree");

    let report = Compiler::new(runner, config, workspace.path()).run()?;
    let pdf = std::fs::read(&report.pdf).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BuildError::MissingOutput {
            path: report.pdf.clone(),
        },
        _ => BuildError::io(format!("read {}", report.pdf.display()), e),
    })?;

    if config.release {
        let log_path = workspace.join(&config.job_file("log"));
        let log = std::fs::read(&log_path)
            .map_err(|e| BuildError::io(format!("read {}", log_path.display()), e))?;
        let bbl = config.job_file("bbl");
        if !staged.contains(&bbl) {
            staged.push(bbl);
        }
        archive::augment_from_log(&mut archive, &workspace, &staged, &log)?;
    }

    let (tar, archived_paths) = archive.finish()?;
    let archive_gz = compress::gzip(&tar)?;
    tracing::info!(
        entries = archived_paths.len(),
        tar_bytes = tar.len(),
        gz_bytes = archive_gz.len(),
        pdf_bytes = pdf.len(),
        "build finished"
    );

    let kept_workspace = workspace.finish(config.keep_workspace)?;
    Ok(BuildArtifacts {
        pdf,
        archive_gz,
        archived_paths,
        states: report.states,
        kept_workspace,
    })
}
