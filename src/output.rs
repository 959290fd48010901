//! Artifact naming, message composition, and writing results to disk or stdout.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use rand::Rng;
use tracing::instrument;

use crate::config::BuildConfig;
use crate::error::{BuildError, Result};
use crate::message::{self, Attachment, EmailMessage, Envelope, Mailbox};
use crate::pipeline::BuildArtifacts;
use crate::snapshot::CommitMeta;

/// File names for one run's artifacts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactNames {
    pub pdf: String,
    pub archive: String,
    pub message: String,
}

impl ArtifactNames {
    /// `<kind>-<cid>-<MM>-<DD>.<ext>`, where `cid` is the short commit id
    /// and the date is the author date in its own offset.
    #[must_use]
    pub fn new(meta: &CommitMeta, release: bool) -> Self {
        let stem = format!("{}-{}", meta.short_id(), meta.date_stamp());
        let (pdf_kind, archive_kind) = if release {
            ("release", "release")
        } else {
            ("build", "source")
        };
        Self {
            pdf: format!("{pdf_kind}-{stem}.pdf"),
            archive: format!("{archive_kind}-{stem}.tar.gz"),
            message: format!("build-{stem}.eml"),
        }
    }
}

/// Assemble the message for a finished build.
///
/// # Errors
/// Returns [`BuildError::InvalidAddress`] for an unparseable recipient.
pub fn compose<'a, G: Rng + ?Sized>(
    config: &BuildConfig,
    meta: &CommitMeta,
    artifacts: &'a BuildArtifacts,
    names: &'a ArtifactNames,
    from: Mailbox,
    now: DateTime<FixedOffset>,
    rng: &mut G,
) -> Result<EmailMessage<'a>> {
    let to = config
        .recipients
        .iter()
        .map(|r| r.parse::<Mailbox>())
        .collect::<Result<Vec<_>>>()?;

    let domain = config
        .message_id_domain
        .clone()
        .or_else(|| Some(from.domain().to_owned()).filter(|d| !d.is_empty()))
        .unwrap_or_else(|| message::FALLBACK_DOMAIN.to_owned());

    let envelope = Envelope::new(from, to, config.subject.clone(), now, &domain, rng);
    Ok(EmailMessage {
        envelope,
        body: message::text_body(meta),
        attachments: vec![
            Attachment {
                content_type: "application/pdf",
                filename: &names.pdf,
                data: &artifacts.pdf,
            },
            Attachment {
                content_type: "application/gzip",
                filename: &names.archive,
                data: &artifacts.archive_gz,
            },
        ],
    })
}

/// Where a composed message goes.
pub enum MessageTarget<'w> {
    /// Create (or truncate) this file.
    File(PathBuf),
    /// Write to an already open stream such as stdout.
    Stream(&'w mut dyn Write),
}

/// Write the compiled document and the archive as separate files in `dir`.
///
/// # Errors
/// Returns [`BuildError::Io`] on any write failure.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn write_files(
    dir: &Path,
    names: &ArtifactNames,
    artifacts: &BuildArtifacts,
) -> Result<Vec<PathBuf>> {
    let pdf = write_file(dir, &names.pdf, &artifacts.pdf)?;
    let archive = write_file(dir, &names.archive, &artifacts.archive_gz)?;
    Ok(vec![pdf, archive])
}

/// Write `message` to `target`. Returns the file path for
/// [`MessageTarget::File`].
///
/// # Errors
/// Returns [`BuildError::Io`] on any write failure.
pub fn write_message(
    message: &EmailMessage<'_>,
    target: MessageTarget<'_>,
) -> Result<Option<PathBuf>> {
    match target {
        MessageTarget::File(path) => {
            let file = File::create(&path)
                .map_err(|e| BuildError::io(format!("create {}", path.display()), e))?;
            message.write_to(&mut BufWriter::new(file))?;
            tracing::info!(path = %path.display(), "wrote message");
            Ok(Some(path))
        }
        MessageTarget::Stream(out) => {
            message.write_to(out)?;
            Ok(None)
        }
    }
}

fn write_file(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, data)
        .map_err(|e| BuildError::io(format!("write {}", path.display()), e))?;
    tracing::info!(path = %path.display(), bytes = data.len(), "wrote");
    Ok(path)
}
