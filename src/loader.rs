//! Knowledge directory scanning and document loading.
//!
//! Only files directly inside the directory are considered (no recursion),
//! filtered by file name against the configured include globs. Results are
//! sorted by file name so chunk and record IDs are stable across rebuilds.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::error::{IndexError, Result};
use crate::models::{Document, SourceFile, SourceMetadata};

/// Documents read from one scan, plus files that could not be read.
#[derive(Debug, Default)]
pub struct LoadedCorpus {
    pub files_scanned: usize,
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

pub fn scan_knowledge_dir(dir: &Path, include_globs: &[String]) -> Result<Vec<SourceFile>> {
    if !dir.is_dir() {
        return Err(IndexError::not_found(
            "knowledge directory",
            dir.display().to_string(),
        ));
    }

    let include_set =
        build_globset(include_globs).map_err(|e| IndexError::Config(format!("{e:#}")))?;

    let mut files = Vec::new();
    let walker = WalkDir::new(dir).min_depth(1).max_depth(1);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let filename = entry.file_name().to_string_lossy().to_string();
        if !include_set.is_match(&filename) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(file = %entry.path().display(), error = %e, "cannot stat file");
                continue;
            }
        };

        files.push(SourceFile {
            path: entry.path().to_path_buf(),
            filename,
            byte_size: metadata.len(),
            modified_time: metadata.modified().map(system_time_secs).unwrap_or(0.0),
        });
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.filename.cmp(&b.filename));

    Ok(files)
}

/// Read every matching file. Per-file failures are logged and recorded in
/// [`LoadedCorpus::skipped`]; only a missing directory is an error.
pub fn load_documents(dir: &Path, include_globs: &[String]) -> Result<LoadedCorpus> {
    let files = scan_knowledge_dir(dir, include_globs)?;
    let mut corpus = LoadedCorpus {
        files_scanned: files.len(),
        ..Default::default()
    };

    for file in files {
        match std::fs::read_to_string(&file.path) {
            Ok(content) => corpus.documents.push(Document {
                content,
                metadata: SourceMetadata {
                    source: file.filename,
                    file_path: file.path.display().to_string(),
                    modified_time: file.modified_time,
                },
            }),
            Err(e) => {
                tracing::warn!(file = %file.path.display(), error = %e, "error reading file, skipping");
                corpus.skipped.push(SkippedFile {
                    path: file.path,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(corpus)
}

/// Convert a filesystem timestamp to fractional Unix seconds.
pub fn system_time_secs(time: SystemTime) -> f64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Compile file name include patterns into one matcher.
pub fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid include glob '{}': {}", pattern, e))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| anyhow::anyhow!("invalid include globs: {}", e))
}
