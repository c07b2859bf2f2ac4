//! Batch driver: rewrite archives in place, one at a time.
//!
//! Every archive is rewritten into a sibling temporary file which is renamed
//! over the original only after the rewrite succeeded and the data reached
//! the disk. On failure the temporary file is dropped, which deletes it.

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::engine::{RewriteSummary, Rewriter};
use crate::epub::EpubArchive;
use crate::error::{Error, Result};
use crate::transform::MarkerToken;

/// Result of processing one archive that did not fail.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The original file was replaced.
    Rewritten(RewriteSummary),
    /// Nothing needed changing; the file was not touched.
    Untouched,
}

/// Resolve a target into the archives it names: the file itself, or the
/// `.epub` files directly inside a directory, sorted by name.
pub fn discover(target: &Path) -> Result<Vec<PathBuf>> {
    let invalid = |reason: String| Error::Directory {
        path: target.to_path_buf(),
        reason,
    };

    if target.is_file() {
        if !is_epub(target) {
            return Err(invalid("not an .epub file".into()));
        }
        return Ok(vec![target.to_path_buf()]);
    }
    if !target.is_dir() {
        return Err(invalid("no such file or directory".into()));
    }

    let mut archives = Vec::new();
    for entry in fs::read_dir(target).map_err(|e| invalid(e.to_string()))? {
        let path = entry.map_err(|e| invalid(e.to_string()))?.path();
        if path.is_file() && is_epub(&path) {
            archives.push(path);
        }
    }
    archives.sort();
    Ok(archives)
}

fn is_epub(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("epub"))
}

/// Rewrite one archive and atomically replace it on success.
pub fn process(path: &Path, rewriter: &Rewriter) -> Result<Outcome> {
    let mut archive = EpubArchive::open(path)?;
    let prepared = rewriter.prepare(&mut archive, MarkerToken::generate())?;
    if prepared.is_noop() {
        for warning in prepared.warnings() {
            warn!(path = %path.display(), %warning, "part left unchanged");
        }
        debug!(path = %path.display(), "nothing to change");
        return Ok(Outcome::Untouched);
    }
    debug!(path = %path.display(), strategy = ?prepared.strategy(), "writing rewritten archive");

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = tempfile::Builder::new()
        .prefix(".epubimg-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(Error::write_io)?;
    let permissions = fs::metadata(path)?.permissions();

    let mut output = BufWriter::new(temp);
    let summary = prepared.write_to(&mut archive, &mut output)?;
    let temp: NamedTempFile = output
        .into_inner()
        .map_err(|e| Error::write_io(e.into_error()))?;
    temp.as_file().sync_all().map_err(Error::write_io)?;
    temp.as_file().set_permissions(permissions)?;

    temp.persist(path)?;
    Ok(Outcome::Rewritten(summary))
}

/// Per-archive line of a [`BatchReport`].
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveReport {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: ArchiveStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArchiveStatus {
    Rewritten { summary: RewriteSummary },
    Untouched,
    Failed { error: String },
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub archives: Vec<ArchiveReport>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.archives
            .iter()
            .filter(|a| matches!(a.status, ArchiveStatus::Failed { .. }))
            .count()
    }

    pub fn succeeded(&self) -> usize {
        self.archives.len() - self.failed()
    }

    /// True when no archive failed.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Process every archive in order. A failure is recorded and the batch moves
/// on.
pub fn run_archives(archives: &[PathBuf], rewriter: &Rewriter) -> BatchReport {
    let mut report = BatchReport::default();
    for path in archives {
        info!(path = %path.display(), "processing archive");
        let status = match process(path, rewriter) {
            Ok(Outcome::Rewritten(summary)) => ArchiveStatus::Rewritten { summary },
            Ok(Outcome::Untouched) => ArchiveStatus::Untouched,
            Err(e) => {
                error!(path = %path.display(), error = %e, "archive left unchanged");
                ArchiveStatus::Failed {
                    error: e.to_string(),
                }
            }
        };
        report.archives.push(ArchiveReport {
            path: path.clone(),
            status,
        });
    }
    report
}

/// Resolve `target` and process everything it names.
pub fn run(target: &Path, rewriter: &Rewriter) -> Result<BatchReport> {
    let archives = discover(target)?;
    Ok(run_archives(&archives, rewriter))
}

impl std::fmt::Display for ArchiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveStatus::Rewritten { summary } => write!(
                f,
                "rewritten ({} replaced, {} created, {} warnings)",
                summary.replaced.len(),
                summary.created.len(),
                summary.warnings.len()
            ),
            ArchiveStatus::Untouched => f.write_str("unchanged"),
            ArchiveStatus::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}
