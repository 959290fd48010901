//! Build configuration (`texmail.toml` + command-line overrides).
//!
//! [`FileConfig`] mirrors the optional `texmail.toml` at the repository
//! root. [`BuildConfig`] is the immutable, fully resolved configuration that
//! every pipeline stage receives by reference.

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::filter::FilterPolicy;

/// Name of the optional per-repository config file.
pub const CONFIG_FILE_NAME: &str = "texmail.toml";

/// Suffix appended to the subject of release builds.
pub const RELEASE_SUBJECT_SUFFIX: &str = " [arXiv release]";

// ---------------------------------------------------------------------------
// File config
// ---------------------------------------------------------------------------

/// Top-level `texmail.toml` contents.
///
/// Missing fields use defaults. Missing file → all defaults (no error).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// What to stage and how.
    #[serde(default)]
    pub build: BuildSection,

    /// External programs.
    #[serde(default)]
    pub compiler: CompilerConfig,

    /// Message settings.
    #[serde(default)]
    pub mail: MailSection,
}

// ---------------------------------------------------------------------------
// [build]
// ---------------------------------------------------------------------------

/// `[build]` section.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// Job name; the primary document source is `<job>.tex`.
    #[serde(default = "default_job")]
    pub job: String,

    /// Which filter policy selects files from the commit.
    #[serde(default)]
    pub policy: PolicyKind,

    /// Path prefixes rejected by the `exclude-prefix` policy.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Exact paths admitted by the `allow-list` policy. Empty means
    /// `<job>.tex` and `<job>.bib`.
    #[serde(default)]
    pub allow: Vec<String>,

    /// Keep the transient workspace after a successful run.
    #[serde(default)]
    pub keep_workspace: bool,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            job: default_job(),
            policy: PolicyKind::default(),
            exclude: Vec::new(),
            allow: Vec::new(),
            keep_workspace: false,
        }
    }
}

fn default_job() -> String {
    "main".to_owned()
}

/// Filter policy selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Admit everything except configured prefixes.
    #[default]
    ExcludePrefix,
    /// Admit only the configured exact paths.
    AllowList,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExcludePrefix => write!(f, "exclude-prefix"),
            Self::AllowList => write!(f, "allow-list"),
        }
    }
}

// ---------------------------------------------------------------------------
// [compiler]
// ---------------------------------------------------------------------------

/// `[compiler]` section: the document compiler and bibliography processor.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompilerConfig {
    /// Document compiler executable.
    #[serde(default = "default_compiler")]
    pub program: String,

    /// Arguments passed before the job name, in order.
    #[serde(default = "default_compiler_args")]
    pub args: Vec<String>,

    /// Bibliography processor executable, invoked as `<bibliography> <job>`.
    #[serde(default = "default_bibliography")]
    pub bibliography: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: default_compiler(),
            args: default_compiler_args(),
            bibliography: default_bibliography(),
        }
    }
}

fn default_compiler() -> String {
    "pdflatex".to_owned()
}

fn default_compiler_args() -> Vec<String> {
    ["-halt-on-error", "-file-line-error", "-interaction=nonstopmode"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn default_bibliography() -> String {
    "bibtex".to_owned()
}

// ---------------------------------------------------------------------------
// [mail]
// ---------------------------------------------------------------------------

/// `[mail]` section.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MailSection {
    /// Default recipients (`Name <addr>` or bare `addr`).
    #[serde(default)]
    pub to: Vec<String>,

    /// Default subject. Falls back to the working directory name.
    pub subject: Option<String>,

    /// Sender override. Falls back to git `user.name` / `user.email`.
    pub from: Option<String>,

    /// Domain used in `Message-ID`. Falls back to the sender's domain.
    pub message_id_domain: Option<String>,
}

// ---------------------------------------------------------------------------
// Output mode
// ---------------------------------------------------------------------------

/// Where the finished artifacts go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OutputMode {
    /// Write `build-<cid>-<MM>-<DD>.eml` into the working directory.
    #[default]
    EmailFile,
    /// Write the message to stdout.
    EmailStdout,
    /// Write the PDF and `.tar.gz` as separate files, no message.
    Files,
}

// ---------------------------------------------------------------------------
// Resolved config
// ---------------------------------------------------------------------------

/// The resolved configuration for one run.
///
/// Built once by the binary and passed by reference into every stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildConfig {
    /// Release (arXiv) mode: no visible stamp, archive holds only files the
    /// compiler read, `release-` file names.
    pub release: bool,
    /// Job name (`main` → `main.tex`, `main.aux`, `main.pdf`, ...).
    pub job: String,
    /// Which files of the commit are staged.
    pub filter: FilterPolicy,
    /// External programs.
    pub compiler: CompilerConfig,
    /// Keep the transient workspace after success.
    pub keep_workspace: bool,
    /// Where artifacts go.
    pub output: OutputMode,
    /// Message subject, release suffix already applied.
    pub subject: String,
    /// Raw recipient strings (parsed when the message is composed).
    pub recipients: Vec<String>,
    /// Explicit sender, if configured.
    pub from: Option<String>,
    /// Explicit `Message-ID` domain, if configured.
    pub message_id_domain: Option<String>,
}

impl BuildConfig {
    /// Path of the primary document source inside the commit tree.
    #[must_use]
    pub fn document_source(&self) -> String {
        format!("{}.tex", self.job)
    }

    /// Name of a compiler output with the given extension (`"pdf"`, `"aux"`...).
    #[must_use]
    pub fn job_file(&self, extension: &str) -> String {
        format!("{}.{extension}", self.job)
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        let job = default_job();
        Self {
            release: false,
            filter: FilterPolicy::default(),
            compiler: CompilerConfig::default(),
            keep_workspace: false,
            output: OutputMode::default(),
            subject: job.clone(),
            recipients: Vec::new(),
            from: None,
            message_id_domain: None,
            job,
        }
    }
}

/// Command-line values that override the file config.
///
/// Empty vectors and `None` mean "not given on the command line".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    pub release: bool,
    pub allow_list: bool,
    pub exclude: Vec<String>,
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    pub keep_workspace: bool,
    pub output: OutputMode,
}

impl FileConfig {
    /// Merge this file config with command-line overrides.
    ///
    /// Command-line exclusions and recipients are added to the configured
    /// ones. `fallback_subject` is used when neither source sets a subject.
    #[must_use]
    pub fn resolve(self, overrides: Overrides, fallback_subject: &str) -> BuildConfig {
        let build = self.build;

        let policy = if overrides.allow_list {
            PolicyKind::AllowList
        } else {
            build.policy
        };
        let filter = match policy {
            PolicyKind::ExcludePrefix => {
                let mut prefixes = build.exclude;
                prefixes.extend(overrides.exclude);
                FilterPolicy::ExcludePrefixes(prefixes)
            }
            PolicyKind::AllowList if build.allow.is_empty() => {
                FilterPolicy::AllowList(vec![format!("{}.tex", build.job), format!("{}.bib", build.job)])
            }
            PolicyKind::AllowList => FilterPolicy::AllowList(build.allow),
        };

        let mut subject = overrides
            .subject
            .or(self.mail.subject)
            .unwrap_or_else(|| fallback_subject.to_owned());
        if overrides.release {
            subject.push_str(RELEASE_SUBJECT_SUFFIX);
        }

        let mut recipients = self.mail.to;
        recipients.extend(overrides.recipients);

        BuildConfig {
            release: overrides.release,
            job: build.job,
            filter,
            compiler: self.compiler,
            keep_workspace: build.keep_workspace || overrides.keep_workspace,
            output: overrides.output,
            subject,
            recipients,
            from: self.mail.from,
            message_id_domain: self.mail.message_id_domain,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading a texmail configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<std::path::PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl FileConfig {
    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - If the file exists but contains invalid TOML or unknown fields,
    ///   returns a [`ConfigError`] with line-level detail.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
