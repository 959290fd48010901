//! Shared helpers for texmail integration tests.
//!
//! Builds run against [`FakeTex`], which mimics what pdflatex and bibtex
//! leave in the workspace without needing a TeX installation.

#![allow(dead_code)]

use std::io::{self, Read};
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use tempfile::TempDir;

use texmail::compile::{CommandOutput, CommandRunner};

/// A stand-in for the TeX toolchain.
///
/// The "compiler" reads `<job>.tex`, writes `<job>.aux` (with a `\citation`
/// line when the source contains `\cite`), a `<job>.log` naming the source,
/// every file of the workspace whose name appears in the source, and
/// `<job>.bbl` if present, and finally `<job>.pdf` whose body is the source
/// text. The "bibliography processor" writes `<job>.bbl`.
#[derive(Default)]
pub struct FakeTex {
    calls: Mutex<Vec<String>>,
}

impl FakeTex {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn compile(job: &str, cwd: &Path) -> io::Result<()> {
        let source = std::fs::read_to_string(cwd.join(format!("{job}.tex")))?;

        let aux = if source.contains("\\cite") {
            "\\relax\n\\citation{knuth84}\n\\bibdata{refs}\n"
        } else {
            "\\relax\n"
        };
        std::fs::write(cwd.join(format!("{job}.aux")), aux)?;

        let mut log = format!("This is pdfTeX (fake)\n(./{job}.tex\n");
        for name in workspace_files(cwd, cwd)? {
            if source.contains(&name) {
                log.push_str(&format!("<./{name}>\n"));
            }
        }
        if cwd.join(format!("{job}.bbl")).is_file() {
            log.push_str(&format!("(./{job}.bbl)\n"));
        }
        std::fs::write(cwd.join(format!("{job}.log")), log)?;

        std::fs::write(cwd.join(format!("{job}.pdf")), format!("%PDF-1.5\n{source}"))
    }
}

impl CommandRunner for FakeTex {
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> io::Result<CommandOutput> {
        self.calls.lock().unwrap().push(program.to_owned());
        let job = args.last().map_or("main", String::as_str);
        match program {
            "pdflatex" => Self::compile(job, cwd)?,
            "bibtex" => std::fs::write(
                cwd.join(format!("{job}.bbl")),
                "\\begin{thebibliography}{1}\n\\end{thebibliography}\n",
            )?,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{other}: not found"),
                ));
            }
        }
        Ok(CommandOutput {
            success: true,
            code: Some(0),
            ..CommandOutput::default()
        })
    }
}

fn workspace_files(root: &Path, dir: &Path) -> io::Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            out.extend(workspace_files(root, &path)?);
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(out)
}

/// Decompress and list `(path, bytes)` of every entry in a `.tar.gz`.
pub fn untar_gz(gz: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut tar = Vec::new();
    flate2::read::GzDecoder::new(gz).read_to_end(&mut tar).unwrap();
    let mut archive = tar::Archive::new(tar.as_slice());
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            let mut body = Vec::new();
            entry.read_to_end(&mut body).unwrap();
            (path, body)
        })
        .collect()
}

/// Run git in `dir` with fixed author and committer dates.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_DATE", "1700000000 -0500")
        .env("GIT_COMMITTER_DATE", "1700000000 -0500")
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_owned()
}

/// A git repository holding a small paper, committed once.
pub fn paper_repo(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    git(dir.path(), &["init", "-q"]);
    git(dir.path(), &["config", "user.email", "ada@example.org"]);
    git(dir.path(), &["config", "user.name", "Ada Lovelace"]);
    git(dir.path(), &["config", "commit.gpgsign", "false"]);
    for (path, content) in files {
        let full = dir.path().join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "Draft of section 2"]);
    dir
}
