use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser;

use texmail::compile::ProcessRunner;
use texmail::config::{CONFIG_FILE_NAME, FileConfig, OutputMode, Overrides};
use texmail::message::Mailbox;
use texmail::output::{self, ArtifactNames, MessageTarget};
use texmail::pipeline;
use texmail::snapshot::{GitSnapshot, Snapshot as _};
use texmail::telemetry;
use texmail_git::{GitRepo, GixRepo};

/// Build a LaTeX paper from a git commit and mail it
///
/// Checks out the commit's tree into a temporary directory, stamps the
/// commit hash into the document, compiles it (running the bibliography
/// processor when citations are present) and packages the PDF plus a
/// reproducible source archive into a MIME message.
///
/// OUTPUT:
///
///   build-<cid>-<MM>-<DD>.eml        default
///   stdout                           with --stdout
///   build-<cid>-<MM>-<DD>.pdf and
///   source-<cid>-<MM>-<DD>.tar.gz    with --no-email
///
/// Release builds (--release) hide the visible stamp, archive only the files
/// the compiler actually read, and use `release-` file names.
///
/// Settings can also come from texmail.toml at the repository root.
#[derive(Parser)]
#[command(name = "texmail")]
#[command(version, about)]
struct Cli {
    /// Message subject [default: name of the current directory]
    #[arg(long)]
    subject: Option<String>,

    /// Build an arXiv-ready release
    #[arg(long)]
    release: bool,

    /// Write the message to stdout instead of a file
    #[arg(long, conflicts_with = "no_email")]
    stdout: bool,

    /// Write the PDF and archive as separate files; no message
    #[arg(long)]
    no_email: bool,

    /// Leave out paths starting with PREFIX (repeatable)
    #[arg(short = 'x', long = "exclude", value_name = "PREFIX")]
    exclude: Vec<String>,

    /// Recipient address (repeatable); the sender is copied
    #[arg(long = "to", value_name = "ADDR")]
    to: Vec<String>,

    /// Stage only the allow-listed files (default: <job>.tex and <job>.bib)
    #[arg(long)]
    allow_list: bool,

    /// Commit to build
    #[arg(long, default_value = "HEAD", value_name = "REV")]
    rev: String,

    /// Repository to read from
    #[arg(long, default_value = ".", value_name = "PATH")]
    repo: PathBuf,

    /// Config file [default: <repo root>/texmail.toml]
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Keep the temporary build directory after a successful run
    #[arg(long)]
    keep_workspace: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        let output = if self.no_email {
            OutputMode::Files
        } else if self.stdout {
            OutputMode::EmailStdout
        } else {
            OutputMode::EmailFile
        };
        Overrides {
            release: self.release,
            allow_list: self.allow_list,
            exclude: self.exclude.clone(),
            recipients: self.to.clone(),
            subject: self.subject.clone(),
            keep_workspace: self.keep_workspace,
            output,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _telemetry = telemetry::init();
    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine the working directory")?;
    let repo = GixRepo::open(&cli.repo)
        .with_context(|| format!("cannot open a git repository at {}", cli.repo.display()))?;

    let config_path = cli.config.clone().unwrap_or_else(|| {
        repo.workdir()
            .unwrap_or(cli.repo.as_path())
            .join(CONFIG_FILE_NAME)
    });
    let file_config = FileConfig::load(&config_path)?;
    let fallback_subject = directory_name(&cwd);
    let config = file_config.resolve(cli.overrides(), &fallback_subject);
    tracing::debug!(?config, "resolved configuration");

    // Resolve the sender before compiling so a missing identity fails fast.
    let from = match (config.output, &config.from) {
        (OutputMode::Files, _) => None,
        (_, Some(raw)) => Some(raw.parse::<Mailbox>()?),
        (_, None) => Some(git_sender(&repo)?),
    };

    let snapshot = GitSnapshot::resolve(&repo, &cli.rev)
        .with_context(|| format!("cannot read revision `{}`", cli.rev))?;
    let meta = snapshot.meta().clone();
    tracing::info!(commit = %meta.hash, author = %meta.author, "building");

    let artifacts = pipeline::run_build(
        &config,
        &snapshot,
        &ProcessRunner,
        Local::now().fixed_offset(),
    )?;
    if let Some(path) = &artifacts.kept_workspace {
        tracing::info!(path = %path.display(), "workspace kept");
    }

    let names = ArtifactNames::new(&meta, config.release);
    let Some(from) = from else {
        for path in output::write_files(&cwd, &names, &artifacts)? {
            eprintln!("wrote {}", path.display());
        }
        return Ok(());
    };

    let message = output::compose(
        &config,
        &meta,
        &artifacts,
        &names,
        from,
        Local::now().fixed_offset(),
        &mut rand::rng(),
    )?;
    if config.output == OutputMode::EmailStdout {
        let stdout = std::io::stdout();
        let mut stdout = stdout.lock();
        output::write_message(&message, MessageTarget::Stream(&mut stdout))?;
        stdout.flush().context("cannot flush stdout")?;
    } else if let Some(path) =
        output::write_message(&message, MessageTarget::File(cwd.join(&names.message)))?
    {
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}

/// Sender from git `user.name` / `user.email`.
fn git_sender(repo: &dyn GitRepo) -> Result<Mailbox> {
    let Some(email) = repo.read_config("user.email")? else {
        bail!(
            "no sender address\n  To fix: git config user.email you@example.org\n  \
             or set `from` under [mail] in {CONFIG_FILE_NAME}"
        );
    };
    let raw = match repo.read_config("user.name")? {
        Some(name) if !name.trim().is_empty() => format!("{} <{email}>", name.trim()),
        _ => email,
    };
    Ok(raw.parse()?)
}

fn directory_name(dir: &Path) -> String {
    dir.file_name()
        .map_or_else(|| "paper".to_owned(), |n| n.to_string_lossy().into_owned())
}
