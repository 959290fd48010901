//! End-to-end builds against in-memory and real git snapshots.

mod common;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, FixedOffset};
use rand::SeedableRng;
use rand::rngs::StdRng;

use texmail::BuildError;
use texmail::compile::CompilationState;
use texmail::config::BuildConfig;
use texmail::filter::FilterPolicy;
use texmail::output::{self, ArtifactNames, MessageTarget};
use texmail::pipeline::run_build;
use texmail::snapshot::{CommitMeta, GitSnapshot, MemorySnapshot, Snapshot as _};
use texmail_git::{GitRepo, GixRepo, Signature};

use common::{FakeTex, git, paper_repo, untar_gz};

const HASH: &str = "f00dfacecafebeef0123456789abcdef76543210";

const PAPER: &str = "\
% !TEX program = pdflatex
% Draft paper
% Ada Lovelace
% 2024
\\documentclass{article}
\\usepackage{graphicx}
\\begin{document}
\\includegraphics{figs/plot.pdf}
\\end{document}
";

const CITING_PAPER: &str = "\
\\documentclass{article}
\\begin{document}
As shown by \\cite{knuth84}. \\includegraphics{figs/used.pdf}
\\bibliography{refs}
\\end{document}
";

fn meta() -> CommitMeta {
    CommitMeta {
        hash: HASH.parse().unwrap(),
        author: Signature {
            name: "Ada Lovelace".to_owned(),
            email: "ada@example.org".to_owned(),
            time: 1_700_000_000,
            offset_minutes: 60,
        },
        message: "Draft of section 2\n".to_owned(),
    }
}

fn stamped_at() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2024-05-01T08:30:00+02:00").unwrap()
}

fn draft_snapshot() -> MemorySnapshot {
    MemorySnapshot::new(meta())
        .with_file("main.tex", PAPER)
        .with_file("figs/plot.pdf", "%PDF-figure")
        .with_file("notes/todo.txt", "finish section 3")
        .with_file("refs.bib", "@book{knuth84}")
}

fn exclude(prefixes: &[&str]) -> BuildConfig {
    BuildConfig {
        filter: FilterPolicy::ExcludePrefixes(prefixes.iter().map(|p| (*p).to_owned()).collect()),
        ..BuildConfig::default()
    }
}

// ===========================================================================
// Draft builds
// ===========================================================================

#[test]
fn draft_build_archives_admitted_files_in_order() {
    let tex = FakeTex::default();
    let artifacts = run_build(&exclude(&["notes/"]), &draft_snapshot(), &tex, stamped_at()).unwrap();

    assert_eq!(artifacts.archived_paths, ["main.tex", "figs/plot.pdf", "refs.bib"]);
    assert_eq!(tex.calls(), ["pdflatex", "pdflatex"]);
    assert_eq!(artifacts.states.last(), Some(&CompilationState::Done));
    assert_eq!(artifacts.kept_workspace, None);

    let entries = untar_gz(&artifacts.archive_gz);
    let names: Vec<_> = entries.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(names, artifacts.archived_paths);

    let main = String::from_utf8(entries[0].1.clone()).unwrap();
    let lines: Vec<_> = main.lines().collect();
    let original: Vec<_> = PAPER.lines().collect();
    assert_eq!(lines.len(), original.len() + 3);
    assert_eq!(&lines[..5], &original[..5]);
    assert_eq!(lines[5], "\\usepackage{atbegshi}");
    assert!(lines[6].contains("{\\tt f00dface 08:30:00\\ 2024-05-01}"));
    assert_eq!(lines[7], format!("%{HASH}"));
    assert_eq!(&lines[8..], &original[5..]);

    assert_eq!(entries[1].1, b"%PDF-figure");
    assert!(artifacts.pdf.starts_with(b"%PDF-1.5\n"));
}

#[test]
fn identical_inputs_give_identical_archives() {
    let config = exclude(&["notes/"]);
    let first = run_build(&config, &draft_snapshot(), &FakeTex::default(), stamped_at()).unwrap();
    let second = run_build(&config, &draft_snapshot(), &FakeTex::default(), stamped_at()).unwrap();
    assert_eq!(first.archive_gz, second.archive_gz);
}

#[test]
fn missing_document_class_aborts_before_compiling() {
    let snapshot = MemorySnapshot::new(meta()).with_file("main.tex", "\\begin{document}\n\\end{document}\n");
    let tex = FakeTex::default();
    let err = run_build(&BuildConfig::default(), &snapshot, &tex, stamped_at()).unwrap_err();
    assert!(matches!(err, BuildError::MissingDocumentClass { .. }));
    assert!(tex.calls().is_empty());
}

#[test]
fn filtered_out_document_source_is_reported() {
    let config = BuildConfig {
        filter: FilterPolicy::AllowList(vec!["refs.bib".to_owned()]),
        ..BuildConfig::default()
    };
    let tex = FakeTex::default();
    let err = run_build(&config, &draft_snapshot(), &tex, stamped_at()).unwrap_err();
    assert!(matches!(err, BuildError::MissingDocumentSource { ref path } if path == "main.tex"));
    assert!(tex.calls().is_empty());
}

// ===========================================================================
// Release builds
// ===========================================================================

#[test]
fn release_archives_only_what_the_compiler_read() {
    let snapshot = MemorySnapshot::new(meta())
        .with_file("main.tex", CITING_PAPER)
        .with_file("figs/unused.pdf", "%PDF-unused")
        .with_file("figs/used.pdf", "%PDF-used")
        .with_file("refs.bib", "@book{knuth84}");
    let config = BuildConfig {
        release: true,
        ..BuildConfig::default()
    };
    let tex = FakeTex::default();
    let artifacts = run_build(&config, &snapshot, &tex, stamped_at()).unwrap();

    assert_eq!(tex.calls(), ["pdflatex", "bibtex", "pdflatex", "pdflatex"]);
    assert_eq!(artifacts.archived_paths, ["main.tex", "figs/used.pdf", "main.bbl"]);

    let entries = untar_gz(&artifacts.archive_gz);
    let main = String::from_utf8(entries[0].1.clone()).unwrap();
    assert_eq!(main.lines().count(), CITING_PAPER.lines().count() + 1);
    assert_eq!(main.lines().nth(1), Some(format!("%{HASH}").as_str()));
    assert!(!main.contains("atbegshi"));
    assert!(entries[2].1.starts_with(b"\\begin{thebibliography}"));
}

#[test]
fn release_with_committed_bibliography_archives_it_once() {
    let snapshot = MemorySnapshot::new(meta())
        .with_file("main.tex", CITING_PAPER)
        .with_file("main.bbl", "\\begin{thebibliography}{1}\n\\end{thebibliography}\n")
        .with_file("figs/used.pdf", "%PDF-used");
    let config = BuildConfig {
        release: true,
        ..BuildConfig::default()
    };
    let artifacts = run_build(&config, &snapshot, &FakeTex::default(), stamped_at()).unwrap();

    assert_eq!(artifacts.archived_paths, ["main.tex", "main.bbl", "figs/used.pdf"]);
    let names: Vec<_> = untar_gz(&artifacts.archive_gz).into_iter().map(|(p, _)| p).collect();
    assert_eq!(names, artifacts.archived_paths);
}

// ===========================================================================
// Message
// ===========================================================================

#[test]
fn message_attachments_decode_to_artifacts() {
    let artifacts =
        run_build(&exclude(&["notes/"]), &draft_snapshot(), &FakeTex::default(), stamped_at()).unwrap();
    let names = ArtifactNames::new(&meta(), false);
    let config = BuildConfig {
        recipients: vec!["Charles Babbage <cb@example.org>".to_owned()],
        subject: "analytical engine".to_owned(),
        ..BuildConfig::default()
    };
    let message = output::compose(
        &config,
        &meta(),
        &artifacts,
        &names,
        "Ada Lovelace <ada@example.org>".parse().unwrap(),
        stamped_at(),
        &mut StdRng::seed_from_u64(42),
    )
    .unwrap();

    let mut raw = Vec::new();
    output::write_message(&message, MessageTarget::Stream(&mut raw)).unwrap();
    let text = String::from_utf8(raw).unwrap();

    let (head, body) = text.split_once("\r\n\r\n").unwrap();
    let header_names: Vec<_> = head
        .split("\r\n")
        .map(|l| l.split_once(':').unwrap().0)
        .collect();
    assert_eq!(
        header_names,
        ["From", "To", "Cc", "Subject", "Date", "Message-ID", "MIME-Version", "Content-Type"]
    );
    assert!(head.contains("To: Charles Babbage <cb@example.org>\r\n"));
    assert!(head.contains("Cc: Ada Lovelace <ada@example.org>\r\n"));
    assert!(head.contains("Date: Wed, 01 May 2024 08:30:00 +0200\r\n"));

    let boundary = &message.envelope.boundary;
    let parts: Vec<&str> = body
        .split(&format!("--{boundary}"))
        .filter(|p| !p.trim().is_empty() && *p != "--\r\n")
        .collect();
    assert_eq!(parts.len(), 3);

    assert!(parts[0].contains("Ada Lovelace <ada@example.org>\r\nTue Nov 14 23:13:20 2023 +0100\r\n\r\nDraft of section 2\r\n\r\n"));

    let decode = |part: &str| {
        let (_, payload) = part.split_once("\r\n\r\n").unwrap();
        let lines: Vec<&str> = payload.split("\r\n").filter(|l| !l.is_empty()).collect();
        for line in &lines[..lines.len().saturating_sub(1)] {
            assert_eq!(line.len(), 76);
        }
        STANDARD.decode(lines.concat()).unwrap()
    };
    assert!(parts[1].contains(&format!("filename={}", names.pdf)));
    assert_eq!(decode(parts[1]), artifacts.pdf);
    assert!(parts[2].contains("Content-Type: application/gzip"));
    assert_eq!(decode(parts[2]), artifacts.archive_gz);
}

// ===========================================================================
// Real git snapshot
// ===========================================================================

#[test]
fn git_snapshot_build_uses_tree_order_and_author_date() {
    let dir = paper_repo(&[
        ("main.tex", PAPER),
        ("figs/plot.pdf", "%PDF-figure"),
        ("refs.bib", "@book{knuth84}"),
        ("build/old.pdf", "stale"),
    ]);
    let head = git(dir.path(), &["rev-parse", "HEAD"]);
    let repo = GixRepo::open(dir.path()).unwrap();
    let snapshot = GitSnapshot::resolve(&repo, "HEAD").unwrap();
    assert_eq!(snapshot.meta().hash.to_string(), head);
    assert_eq!(snapshot.meta().message, "Draft of section 2\n");

    let artifacts = run_build(&exclude(&["build/"]), &snapshot, &FakeTex::default(), stamped_at()).unwrap();
    assert_eq!(artifacts.archived_paths, ["figs/plot.pdf", "main.tex", "refs.bib"]);

    let names = ArtifactNames::new(snapshot.meta(), false);
    assert_eq!(names.message, format!("build-{}-11-14.eml", &head[..10]));

    let main = untar_gz(&artifacts.archive_gz)
        .into_iter()
        .find(|(p, _)| p == "main.tex")
        .unwrap();
    assert!(String::from_utf8(main.1).unwrap().contains(&format!("%{head}\n")));
    assert_eq!(repo.read_config("user.email").unwrap().as_deref(), Some("ada@example.org"));
}
