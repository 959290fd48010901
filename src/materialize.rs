//! Copy admitted files from a commit snapshot into the transient workspace.
//!
//! Every file is copied byte-for-byte except the primary document source,
//! which gets a provenance stamp injected right after its `\documentclass`
//! line.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use texmail_git::GitOid;
use tracing::instrument;

use crate::error::{BuildError, Result};
use crate::snapshot::Snapshot;
use crate::workspace::Workspace;

/// Token identifying the line after which the stamp is injected.
const DOCUMENT_CLASS_MARKER: &[u8] = b"documentclass";

/// A file copied into the workspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedFile {
    /// Logical path inside the commit tree.
    pub path: String,
    /// Absolute location inside the workspace.
    pub location: PathBuf,
    /// Exact number of bytes written.
    pub len: u64,
}

/// What gets injected into the primary document source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvenanceStamp {
    /// Commit the document is built from.
    pub hash: GitOid,
    /// Wall-clock time shown on the first page of non-release builds.
    pub stamped_at: DateTime<FixedOffset>,
}

impl ProvenanceStamp {
    /// The injected LaTeX lines, newline-terminated.
    ///
    /// Release builds get only the `%<hash>` comment; other builds also get a
    /// small `<hash8> <time>` annotation in the upper left of page one.
    #[must_use]
    pub fn render(&self, release: bool) -> String {
        let hash = self.hash.to_string();
        let mut out = String::new();
        if !release {
            out.push_str("\\usepackage{atbegshi}\n");
            out.push_str(&format!(
                "\\AtBeginShipoutNext{{\\AtBeginShipoutUpperLeft{{\\put(1.25in,-1in){{\\makebox[0pt][l]{{{{\\tt {} {}}}}}}}}}}}\n",
                &hash[..8],
                self.stamped_at.format("%H:%M:%S\\ %Y-%m-%d"),
            ));
        }
        out.push('%');
        out.push_str(&hash);
        out.push('\n');
        out
    }
}

/// Stages snapshot files into a [`Workspace`].
pub struct Materializer<'a> {
    workspace: &'a Workspace,
    document_source: String,
    injection: String,
}

impl<'a> Materializer<'a> {
    /// `document_source` is the logical path that receives the stamp.
    #[must_use]
    pub fn new(
        workspace: &'a Workspace,
        document_source: String,
        stamp: &ProvenanceStamp,
        release: bool,
    ) -> Self {
        Self {
            workspace,
            document_source,
            injection: stamp.render(release),
        }
    }

    /// Copy `path` out of `snapshot`, creating parent directories as needed.
    ///
    /// # Errors
    /// - [`BuildError::UnreadableFile`] if the snapshot cannot open the path.
    /// - [`BuildError::MissingDocumentClass`] if the primary source has no
    ///   `\documentclass` line.
    /// - [`BuildError::Io`] on workspace write failures.
    #[instrument(skip(self, snapshot), fields(path = path))]
    pub fn stage(&self, snapshot: &dyn Snapshot, path: &str) -> Result<StagedFile> {
        let source = snapshot.open(path).map_err(|e| BuildError::UnreadableFile {
            path: path.to_owned(),
            source: e,
        })?;

        let location = self.workspace.join(path);
        if let Some(parent) = location.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BuildError::io(format!("create {}", parent.display()), e))?;
        }
        let file = File::create(&location)
            .map_err(|e| BuildError::io(format!("create {}", location.display()), e))?;
        let mut out = BufWriter::new(file);
        let copy_context = || format!("copy {path} into the workspace");

        let len = if path == self.document_source {
            let mut reader = BufReader::new(source);
            copy_with_stamp(&mut reader, &mut out, self.injection.as_bytes())
                .map_err(|e| BuildError::io(copy_context(), e))?
                .ok_or_else(|| BuildError::MissingDocumentClass {
                    path: path.to_owned(),
                })?
        } else {
            let mut reader = source;
            io::copy(&mut reader, &mut out).map_err(|e| BuildError::io(copy_context(), e))?
        };
        out.flush().map_err(|e| BuildError::io(copy_context(), e))?;

        tracing::debug!(len, "staged");
        Ok(StagedFile {
            path: path.to_owned(),
            location,
            len,
        })
    }
}

/// Copy `reader` to `out`, inserting `injection` after the first line that
/// contains the document-class marker.
///
/// Returns the total number of bytes written, or `None` if the stream ended
/// before the marker was seen. A marker line without a trailing newline gets
/// one before the injection.
fn copy_with_stamp<R: BufRead, W: Write>(
    reader: &mut R,
    out: &mut W,
    injection: &[u8],
) -> io::Result<Option<u64>> {
    let mut written = 0u64;
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        out.write_all(&line)?;
        written += line.len() as u64;

        if contains(&line, DOCUMENT_CLASS_MARKER) {
            if !line.ends_with(b"\n") {
                out.write_all(b"\n")?;
                written += 1;
            }
            out.write_all(injection)?;
            written += injection.len() as u64;
            break;
        }
    }
    written += io::copy(reader, out)?;
    Ok(Some(written))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{CommitMeta, MemorySnapshot};
    use texmail_git::Signature;

    const HASH: &str = "deadbeefcafef00d0123456789abcdef01234567";

    fn stamp() -> ProvenanceStamp {
        ProvenanceStamp {
            hash: HASH.parse().unwrap(),
            stamped_at: DateTime::parse_from_rfc3339("2024-03-05T14:07:09+01:00").unwrap(),
        }
    }

    fn snapshot(files: &[(&str, &str)]) -> MemorySnapshot {
        let meta = CommitMeta {
            hash: HASH.parse().unwrap(),
            author: Signature {
                name: "A".to_owned(),
                email: "a@b.c".to_owned(),
                time: 0,
                offset_minutes: 0,
            },
            message: String::new(),
        };
        files
            .iter()
            .fold(MemorySnapshot::new(meta), |s, (p, c)| s.with_file(p, *c))
    }

    const DOC: &str = "% line 1\n% line 2\n% line 3\n% line 4\n\\documentclass{article}\n\\begin{document}\nHi\n\\end{document}\n";

    #[test]
    fn render_release_is_hash_comment_only() {
        assert_eq!(stamp().render(true), format!("%{HASH}\n"));
    }

    #[test]
    fn render_draft_has_visible_annotation() {
        let text = stamp().render(false);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "\\usepackage{atbegshi}");
        assert_eq!(
            lines[1],
            "\\AtBeginShipoutNext{\\AtBeginShipoutUpperLeft{\\put(1.25in,-1in){\\makebox[0pt][l]{{\\tt deadbeef 14:07:09\\ 2024-03-05}}}}}"
        );
        assert_eq!(lines[2], format!("%{HASH}"));
    }

    #[test]
    fn stamp_lands_after_document_class_line() {
        for (release, injected) in [(true, 1), (false, 3)] {
            let ws = Workspace::create().unwrap();
            let snap = snapshot(&[("main.tex", DOC)]);
            let m = Materializer::new(&ws, "main.tex".to_owned(), &stamp(), release);
            let staged = m.stage(&snap, "main.tex").unwrap();

            let written = std::fs::read_to_string(&staged.location).unwrap();
            let original: Vec<_> = DOC.lines().collect();
            let lines: Vec<_> = written.lines().collect();
            assert_eq!(lines.len(), original.len() + injected);
            assert_eq!(&lines[..5], &original[..5]);
            assert_eq!(lines[4 + injected], format!("%{HASH}"));
            assert_eq!(&lines[5 + injected..], &original[5..]);
            assert_eq!(staged.len, written.len() as u64);
            ws.finish(false).unwrap();
        }
    }

    #[test]
    fn marker_without_newline_gets_one() {
        let mut out = Vec::new();
        let n = copy_with_stamp(&mut b"\\documentclass{x}".as_slice(), &mut out, b"%h\n")
            .unwrap()
            .unwrap();
        assert_eq!(out, b"\\documentclass{x}\n%h\n");
        assert_eq!(n, out.len() as u64);
    }

    #[test]
    fn only_first_marker_is_stamped() {
        let mut out = Vec::new();
        copy_with_stamp(
            &mut b"\\documentclass{a}\n% documentclass again\n".as_slice(),
            &mut out,
            b"%h\n",
        )
        .unwrap()
        .unwrap();
        assert_eq!(out, b"\\documentclass{a}\n%h\n% documentclass again\n");
    }

    #[test]
    fn missing_document_class_is_fatal() {
        let ws = Workspace::create().unwrap();
        let snap = snapshot(&[("main.tex", "\\begin{document}\n\\end{document}\n")]);
        let m = Materializer::new(&ws, "main.tex".to_owned(), &stamp(), false);
        let err = m.stage(&snap, "main.tex").unwrap_err();
        assert!(matches!(err, BuildError::MissingDocumentClass { ref path } if path == "main.tex"));
        ws.finish(false).unwrap();
    }

    #[test]
    fn other_files_copied_verbatim_with_parents() {
        let ws = Workspace::create().unwrap();
        let body = "\\documentclass appears here but is not rewritten\n";
        let snap = snapshot(&[("sections/intro.tex", body)]);
        let m = Materializer::new(&ws, "main.tex".to_owned(), &stamp(), false);
        let staged = m.stage(&snap, "sections/intro.tex").unwrap();
        assert_eq!(std::fs::read_to_string(&staged.location).unwrap(), body);
        assert_eq!(staged.len, body.len() as u64);
        assert_eq!(staged.location, ws.path().join("sections").join("intro.tex"));
        ws.finish(false).unwrap();
    }

    #[test]
    fn unreadable_file_is_reported() {
        let ws = Workspace::create().unwrap();
        let snap = snapshot(&[]);
        let m = Materializer::new(&ws, "main.tex".to_owned(), &stamp(), false);
        let err = m.stage(&snap, "ghost.tex").unwrap_err();
        assert!(matches!(err, BuildError::UnreadableFile { .. }));
        ws.finish(false).unwrap();
    }
}
