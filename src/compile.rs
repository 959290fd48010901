//! Multi-pass document compilation.
//!
//! The compiler and the bibliography processor are black boxes: only their
//! exit status and the well-known files they leave in the workspace
//! (`<job>.aux`, `<job>.pdf`) are consulted. The pass sequence is an explicit
//! state machine; entering a state performs its action.
//!
//! ```text
//! Init -> FirstPass -> CitationCheck{true}  -> Bibliography -> SecondPass -> FinalPass -> Done
//!                   -> CitationCheck{false} ---------------------------------> FinalPass
//! ```
//!
//! Any failing transition ends in `Failed` and the run returns the error.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use tracing::instrument;

use crate::config::{BuildConfig, CompilerConfig};
use crate::error::{BuildError, Result};

/// Lines of combined subprocess output kept in a [`BuildError::CommandFailed`].
const OUTPUT_TAIL_LINES: usize = 40;

/// Prefix of a cross-reference line recording a citation.
const CITATION_MARKER: &[u8] = b"\\citation";

// ---------------------------------------------------------------------------
// Subprocess seam
// ---------------------------------------------------------------------------

/// Captured result of one subprocess run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Exit code, `None` if terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    /// The last lines of stdout followed by stderr.
    #[must_use]
    pub fn tail(&self) -> String {
        let combined: Vec<&str> = self.stdout.lines().chain(self.stderr.lines()).collect();
        let start = combined.len().saturating_sub(OUTPUT_TAIL_LINES);
        combined[start..].join("\n")
    }
}

/// Runs external programs.
pub trait CommandRunner {
    /// Run `program` with `args` in `cwd` and wait for it.
    ///
    /// # Errors
    /// Returns the spawn failure if the program cannot be started. A program
    /// that starts and exits non-zero is *not* an error here.
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> io::Result<CommandOutput>;
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> io::Result<CommandOutput> {
        let start = Instant::now();
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompilationState {
    Init,
    FirstPass,
    CitationCheck { has_citations: bool },
    Bibliography,
    SecondPass,
    FinalPass,
    Done,
    Failed,
}

impl CompilationState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for CompilationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::FirstPass => write!(f, "first-pass"),
            Self::CitationCheck { has_citations } => {
                write!(f, "citation-check(has_citations={has_citations})")
            }
            Self::Bibliography => write!(f, "bibliography"),
            Self::SecondPass => write!(f, "second-pass"),
            Self::FinalPass => write!(f, "final-pass"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of a successful compilation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileReport {
    /// Every state visited, starting at `Init` and ending at `Done`.
    pub states: Vec<CompilationState>,
    /// Location of the compiled document in the workspace.
    pub pdf: PathBuf,
}

/// Drives the compiler and bibliography processor inside one workspace.
pub struct Compiler<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    programs: &'a CompilerConfig,
    job: &'a str,
    workdir: &'a Path,
}

impl<'a, R: CommandRunner + ?Sized> Compiler<'a, R> {
    #[must_use]
    pub fn new(runner: &'a R, config: &'a BuildConfig, workdir: &'a Path) -> Self {
        Self {
            runner,
            programs: &config.compiler,
            job: &config.job,
            workdir,
        }
    }

    /// Run the machine from `Init` to a terminal state.
    ///
    /// # Errors
    /// - [`BuildError::MissingDocumentSource`] if `<job>.tex` is not in the
    ///   workspace; nothing is invoked in that case.
    /// - Whatever error moved the machine to `Failed`.
    #[instrument(skip(self), fields(job = self.job, workdir = %self.workdir.display()))]
    pub fn run(&self) -> Result<CompileReport> {
        let source = self.workdir.join(format!("{}.tex", self.job));
        if !source.is_file() {
            return Err(BuildError::MissingDocumentSource {
                path: format!("{}.tex", self.job),
            });
        }

        let mut state = CompilationState::Init;
        let mut states = vec![state];
        while !state.is_terminal() {
            match self.advance(state) {
                Ok(next) => {
                    tracing::debug!(from = %state, to = %next, "compilation transition");
                    state = next;
                    states.push(state);
                }
                Err(e) => {
                    states.push(CompilationState::Failed);
                    tracing::error!(at = %state, trace = ?states, "compilation failed");
                    return Err(e);
                }
            }
        }

        Ok(CompileReport {
            states,
            pdf: self.job_path("pdf"),
        })
    }

    /// Perform the action of the state after `state` and return it.
    ///
    /// Terminal states map to themselves.
    ///
    /// # Errors
    /// Any subprocess, cross-reference, or output failure.
    pub fn advance(&self, state: CompilationState) -> Result<CompilationState> {
        use CompilationState as S;
        Ok(match state {
            S::Init => {
                self.compile_pass("first")?;
                S::FirstPass
            }
            S::FirstPass => S::CitationCheck {
                has_citations: self.has_citations()?,
            },
            S::CitationCheck { has_citations: true } => {
                self.invoke(&self.programs.bibliography, &[self.job.to_owned()])?;
                S::Bibliography
            }
            S::Bibliography => {
                self.compile_pass("second")?;
                S::SecondPass
            }
            S::CitationCheck { has_citations: false } | S::SecondPass => {
                self.compile_pass("final")?;
                S::FinalPass
            }
            S::FinalPass => {
                let pdf = self.job_path("pdf");
                if !pdf.is_file() {
                    return Err(BuildError::MissingOutput { path: pdf });
                }
                S::Done
            }
            S::Done => S::Done,
            S::Failed => S::Failed,
        })
    }

    fn compile_pass(&self, pass: &str) -> Result<()> {
        tracing::info!(pass, program = %self.programs.program, "compiling");
        let mut args = self.programs.args.clone();
        args.push(self.job.to_owned());
        self.invoke(&self.programs.program, &args)
    }

    fn invoke(&self, program: &str, args: &[String]) -> Result<()> {
        let output = self
            .runner
            .run(program, args, self.workdir)
            .map_err(|e| BuildError::CommandSpawn {
                program: program.to_owned(),
                source: e,
            })?;
        tracing::debug!(program, code = ?output.code, duration_ms = output.duration_ms, "command finished");
        if output.success {
            Ok(())
        } else {
            Err(BuildError::CommandFailed {
                program: program.to_owned(),
                code: output.code,
                output: output.tail(),
            })
        }
    }

    fn has_citations(&self) -> Result<bool> {
        let path = self.job_path("aux");
        let file = File::open(&path).map_err(|e| BuildError::MissingAuxFile {
            path: path.clone(),
            source: e,
        })?;
        let found = scan_for_citation(BufReader::new(file))
            .map_err(|e| BuildError::io(format!("read {}", path.display()), e))?;
        tracing::debug!(found, "scanned cross-reference file for citations");
        Ok(found)
    }

    fn job_path(&self, extension: &str) -> PathBuf {
        self.workdir.join(format!("{}.{extension}", self.job))
    }
}

fn scan_for_citation<R: BufRead>(mut reader: R) -> io::Result<bool> {
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(false);
        }
        if line.starts_with(CITATION_MARKER) {
            return Ok(true);
        }
    }
}
