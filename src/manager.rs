//! Index lifecycle: staleness, rebuild, backup, restore and delete.
//!
//! [`IndexManager`] owns one collection inside one storage directory. The
//! storage directory holds whatever the [`VectorIndex`] persists plus the
//! build marker `last_update.txt`, a decimal Unix timestamp written after
//! every successful rebuild.
//!
//! # Rebuild pipeline
//!
//! ```text
//! load *.txt ──► split ──► probe "test" ──► embed (batched)
//!     ──► remove marker ──► replace collection ──► write marker
//! ```
//!
//! The marker is removed before the collection is touched and rewritten only
//! after the replacement succeeds, so a marker never vouches for a
//! collection that was not fully built. It records when the sources were
//! read, not when the build finished: a file saved mid-build is newer than
//! the marker and makes the index stale again.
//!
//! # Concurrency
//!
//! Within a process a `tokio::sync::RwLock` serialises mutations against
//! reads: rebuild, restore and delete take the write half, queries the read
//! half. Across processes, mutations also hold a [`StorageLock`].

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::RwLock;
use walkdir::WalkDir;

use crate::chunk::TextSplitter;
use crate::config::{ChunkingConfig, Config};
use crate::embedding::Embedder;
use crate::error::{IndexError, Result};
use crate::loader::{self, SkippedFile};
use crate::lock::StorageLock;
use crate::models::{ChunkPayload, SourceFile, VectorRecord};
use crate::store::{QueryParams, ScoredRecord, VectorIndex};

/// Build marker file name inside the storage directory.
pub const MARKER_FILE: &str = "last_update.txt";

/// Text embedded once per rebuild to learn the vector size.
pub const PROBE_TEXT: &str = "test";

/// Where the manager reads sources from and writes the index to.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub knowledge_dir: PathBuf,
    pub include_globs: Vec<String>,
    pub storage_path: PathBuf,
    pub collection: String,
    pub chunking: ChunkingConfig,
    pub batch_size: usize,
}

impl IndexSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            knowledge_dir: config.knowledge.dir.clone(),
            include_globs: config.knowledge.include_globs.clone(),
            storage_path: config.index.path.clone(),
            collection: config.index.collection.clone(),
            chunking: config.chunking.clone(),
            batch_size: config.embedding.batch_size.max(1),
        }
    }
}

/// How a rebuild ended.
#[derive(Debug)]
pub enum RebuildOutcome {
    Rebuilt { files: usize, chunks: usize },
    /// The index was fresh and `force` was not set.
    Skipped,
    Failed(IndexError),
}

/// Result of [`IndexManager::rebuild`]. Never an `Err`: failures are
/// carried in [`RebuildOutcome::Failed`] together with the progress made.
#[derive(Debug)]
pub struct RebuildReport {
    pub outcome: RebuildOutcome,
    pub files_scanned: usize,
    pub chunks_produced: usize,
    /// Files that matched but could not be read.
    pub skipped_files: Vec<SkippedFile>,
    pub elapsed: Duration,
}

impl RebuildReport {
    /// `"success"`, `"skipped"` or `"error"`.
    pub fn status(&self) -> &'static str {
        match self.outcome {
            RebuildOutcome::Rebuilt { .. } => "success",
            RebuildOutcome::Skipped => "skipped",
            RebuildOutcome::Failed(_) => "error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RebuildOutcome::Rebuilt { .. })
    }

    pub fn message(&self) -> String {
        match &self.outcome {
            RebuildOutcome::Rebuilt { files, chunks } => format!(
                "Index rebuilt successfully with {} chunks from {} files",
                chunks, files
            ),
            RebuildOutcome::Skipped => "Index is up to date, rebuild skipped".to_string(),
            RebuildOutcome::Failed(e) => format!("Error rebuilding index: {}", e),
        }
    }

    pub fn error(&self) -> Option<&IndexError> {
        match &self.outcome {
            RebuildOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackupReport {
    pub backup_path: PathBuf,
    pub files_copied: usize,
}

#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub restored_from: PathBuf,
    pub files_copied: usize,
}

#[derive(Debug, Clone)]
pub struct DeleteReport {
    pub path: PathBuf,
    /// False when there was nothing to delete.
    pub deleted: bool,
}

/// Status of one collection, as shown by `kidx info`.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionInfo {
    Active {
        name: String,
        record_count: usize,
        vector_size: usize,
    },
    NotFound {
        name: String,
        error: String,
    },
}

impl CollectionInfo {
    pub fn name(&self) -> &str {
        match self {
            Self::Active { name, .. } | Self::NotFound { name, .. } => name,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Active { .. } => "active",
            Self::NotFound { .. } => "not found",
        }
    }
}

pub struct IndexManager {
    settings: IndexSettings,
    splitter: TextSplitter,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    guard: RwLock<()>,
}

impl IndexManager {
    pub fn new(
        settings: IndexSettings,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        let splitter = TextSplitter::from_config(&settings.chunking);
        Self {
            settings,
            splitter,
            embedder,
            index,
            guard: RwLock::new(()),
        }
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    pub fn collection(&self) -> &str {
        &self.settings.collection
    }

    pub fn storage_path(&self) -> &Path {
        &self.settings.storage_path
    }

    pub fn marker_path(&self) -> PathBuf {
        self.settings.storage_path.join(MARKER_FILE)
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Whether the configured collection exists. Index faults count as absent.
    pub async fn collection_exists(&self) -> bool {
        match self.index.get_collection(&self.settings.collection).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                let reason = format!("{e:#}");
                tracing::warn!(collection = %self.settings.collection, error = %reason, "cannot inspect collection");
                false
            }
        }
    }

    /// Last successful build time, if a parseable marker exists.
    pub fn last_build_time(&self) -> Option<f64> {
        let raw = std::fs::read_to_string(self.marker_path()).ok()?;
        raw.trim().parse::<f64>().ok()
    }

    /// True when the collection is missing, the marker is missing or
    /// unparseable, or any source file was modified after the marker.
    pub async fn is_stale(&self) -> bool {
        if !self.collection_exists().await {
            tracing::debug!(collection = %self.settings.collection, "stale: collection missing");
            return true;
        }

        let Some(built_at) = self.last_build_time() else {
            tracing::debug!(marker = %self.marker_path().display(), "stale: no build marker");
            return true;
        };

        let files = match self.knowledge_files() {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(error = %e, "cannot scan knowledge directory for changes");
                return false;
            }
        };

        match files.iter().find(|f| f.modified_time > built_at) {
            Some(changed) => {
                tracing::debug!(file = %changed.filename, "stale: source modified after last build");
                true
            }
            None => false,
        }
    }

    /// Rebuild the collection from the knowledge directory. Unless `force`
    /// is set, a fresh index is left alone.
    pub async fn rebuild(&self, force: bool) -> RebuildReport {
        let started = Instant::now();
        let _guard = self.guard.write().await;

        let mut report = RebuildReport {
            outcome: RebuildOutcome::Skipped,
            files_scanned: 0,
            chunks_produced: 0,
            skipped_files: Vec::new(),
            elapsed: Duration::ZERO,
        };

        report.outcome = match self.rebuild_locked(force, &mut report).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(kind = e.kind(), error = %e, "rebuild failed");
                RebuildOutcome::Failed(e)
            }
        };
        report.elapsed = started.elapsed();

        if report.is_success() {
            tracing::info!(
                collection = %self.settings.collection,
                files = report.files_scanned,
                chunks = report.chunks_produced,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "index rebuilt"
            );
        }
        report
    }

    async fn rebuild_locked(
        &self,
        force: bool,
        report: &mut RebuildReport,
    ) -> Result<RebuildOutcome> {
        if !force && !self.is_stale().await {
            tracing::info!(collection = %self.settings.collection, "index is fresh, skipping rebuild");
            return Ok(RebuildOutcome::Skipped);
        }

        let _lock = StorageLock::acquire(&self.settings.storage_path)?;

        let sources_read_at = SystemTime::now();
        let corpus =
            loader::load_documents(&self.settings.knowledge_dir, &self.settings.include_globs)?;
        report.files_scanned = corpus.files_scanned;
        report.skipped_files = corpus.skipped;

        if corpus.files_scanned == 0 {
            return Err(IndexError::build(
                format!(
                    "No text files found in {}",
                    self.settings.knowledge_dir.display()
                ),
                0,
                0,
            ));
        }
        if corpus.documents.is_empty() {
            return Err(IndexError::build(
                "No documents successfully loaded",
                corpus.files_scanned,
                0,
            ));
        }

        let chunks: Vec<_> = corpus
            .documents
            .iter()
            .flat_map(|doc| self.splitter.split_document(doc))
            .collect();
        report.chunks_produced = chunks.len();
        if chunks.is_empty() {
            return Err(IndexError::build(
                "Documents contain no indexable text",
                corpus.files_scanned,
                0,
            ));
        }
        tracing::debug!(
            documents = corpus.documents.len(),
            chunks = chunks.len(),
            "corpus split"
        );

        let probe = self
            .embedder
            .embed_one(PROBE_TEXT)
            .await
            .with_context(|| format!("embedding probe failed ({})", self.embedder.model_name()))?;
        let vector_size = probe.len();
        if vector_size == 0 {
            return Err(anyhow::anyhow!("embedding probe returned an empty vector").into());
        }

        let mut records = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.settings.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .with_context(|| format!("embedding batch of {} chunks failed", texts.len()))?;
            if vectors.len() != batch.len() {
                return Err(anyhow::anyhow!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )
                .into());
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                if vector.len() != vector_size {
                    return Err(anyhow::anyhow!(
                        "embedding for {} has {} dimensions, probe had {}",
                        chunk.id,
                        vector.len(),
                        vector_size
                    )
                    .into());
                }
                records.push(VectorRecord {
                    id: chunk.id.clone(),
                    vector,
                    payload: ChunkPayload::from(chunk),
                });
            }
        }

        self.remove_marker()?;
        self.index
            .replace_collection(&self.settings.collection, vector_size, &records)
            .await
            .with_context(|| format!("failed to store collection '{}'", self.settings.collection))?;
        self.write_marker(sources_read_at)?;

        Ok(RebuildOutcome::Rebuilt {
            files: corpus.files_scanned,
            chunks: records.len(),
        })
    }

    fn remove_marker(&self) -> Result<()> {
        let path = self.marker_path();
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IndexError::storage(path, e)),
        }
    }

    fn write_marker(&self, built_from: SystemTime) -> Result<()> {
        let dir = &self.settings.storage_path;
        std::fs::create_dir_all(dir).map_err(|e| IndexError::storage(dir, e))?;
        let path = self.marker_path();
        let stamp = loader::system_time_secs(built_from);
        std::fs::write(&path, stamp.to_string()).map_err(|e| IndexError::storage(path, e))
    }

    /// Copy the storage directory to `<storage>_backup_<YYYYMMDD_HHMMSS>`.
    pub async fn backup(&self) -> Result<BackupReport> {
        let storage = &self.settings.storage_path;
        if !storage.is_dir() {
            return Err(IndexError::not_found(
                "index storage",
                storage.display().to_string(),
            ));
        }

        let _guard = self.guard.read().await;
        let _lock = StorageLock::acquire(storage)?;

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let backup_path = sibling_with_suffix(storage, &format!("_backup_{}", stamp));
        if backup_path.exists() {
            return Err(IndexError::storage(
                &backup_path,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "backup already exists"),
            ));
        }

        let files_copied = match copy_dir_recursive(storage, &backup_path) {
            Ok(n) => n,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&backup_path);
                return Err(e);
            }
        };
        tracing::info!(backup = %backup_path.display(), files = files_copied, "backup created");
        Ok(BackupReport {
            backup_path,
            files_copied,
        })
    }

    /// Replace the storage directory with a copy of `backup`.
    ///
    /// The backup is copied to a staging sibling first; the live directory
    /// is only removed once the copy is complete.
    pub async fn restore(&self, backup: &Path) -> Result<RestoreReport> {
        if !backup.is_dir() {
            return Err(IndexError::not_found(
                "backup directory",
                backup.display().to_string(),
            ));
        }

        let _guard = self.guard.write().await;
        let storage = &self.settings.storage_path;
        let _lock = StorageLock::acquire(storage)?;

        let staging = sibling_with_suffix(storage, ".restoring");
        if staging.exists() {
            std::fs::remove_dir_all(&staging).map_err(|e| IndexError::storage(&staging, e))?;
        }

        let files_copied = match copy_dir_recursive(backup, &staging) {
            Ok(n) => n,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staging);
                return Err(e);
            }
        };

        if storage.exists() {
            std::fs::remove_dir_all(storage).map_err(|e| IndexError::storage(storage, e))?;
        }
        std::fs::rename(&staging, storage).map_err(|e| IndexError::storage(storage, e))?;

        tracing::info!(from = %backup.display(), to = %storage.display(), "index restored");
        Ok(RestoreReport {
            restored_from: backup.to_path_buf(),
            files_copied,
        })
    }

    /// Remove the storage directory. Absence is not an error.
    pub async fn delete(&self) -> Result<DeleteReport> {
        let _guard = self.guard.write().await;
        let storage = &self.settings.storage_path;
        let _lock = StorageLock::acquire(storage)?;

        let deleted = if storage.exists() {
            std::fs::remove_dir_all(storage).map_err(|e| IndexError::storage(storage, e))?;
            tracing::info!(path = %storage.display(), "index storage deleted");
            true
        } else {
            false
        };

        Ok(DeleteReport {
            path: storage.clone(),
            deleted,
        })
    }

    /// Describe `collection`, or the configured one. Never fails.
    pub async fn info(&self, collection: Option<&str>) -> CollectionInfo {
        let name = collection.unwrap_or(&self.settings.collection).to_string();
        match self.index.get_collection(&name).await {
            Ok(Some(desc)) => CollectionInfo::Active {
                name,
                record_count: desc.record_count,
                vector_size: desc.vector_size,
            },
            Ok(None) => CollectionInfo::NotFound {
                error: format!("collection '{}' does not exist", name),
                name,
            },
            Err(e) => CollectionInfo::NotFound {
                error: format!("{e:#}"),
                name,
            },
        }
    }

    /// Sorted collection names; empty if the index cannot be read.
    pub async fn list_collections(&self) -> Vec<String> {
        match self.index.list_collections().await {
            Ok(mut names) => {
                names.sort();
                names
            }
            Err(e) => {
                let reason = format!("{e:#}");
                tracing::warn!(error = %reason, "cannot list collections");
                Vec::new()
            }
        }
    }

    /// Source files currently in the knowledge directory.
    pub fn knowledge_files(&self) -> Result<Vec<SourceFile>> {
        loader::scan_knowledge_dir(&self.settings.knowledge_dir, &self.settings.include_globs)
    }

    /// Embed `query` and run it against the collection under the read lock.
    pub async fn search(&self, query: &str, params: &QueryParams) -> Result<Vec<ScoredRecord>> {
        let _guard = self.guard.read().await;
        let vector = self
            .embedder
            .embed_one(query)
            .await
            .context("failed to embed query")?;
        let hits = self
            .index
            .query(&self.settings.collection, &vector, params)
            .await?;
        Ok(hits)
    }
}

/// `vector_db` + `.restoring` → `vector_db.restoring`, in the same parent.
/// A trailing separator on `path` is ignored.
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index".into());
    name.push(suffix);
    path.with_file_name(name)
}

/// Copy `src` into a new directory `dst`. Returns the number of files copied.
/// `dst` must not lie inside `src`.
fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<usize> {
    if dst.starts_with(src) {
        return Err(IndexError::storage(
            dst,
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot copy {} into itself", src.display()),
            ),
        ));
    }
    let mut copied = 0;
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            IndexError::storage(path, std::io::Error::other(e.to_string()))
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| IndexError::storage(entry.path(), std::io::Error::other(e.to_string())))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| IndexError::storage(&target, e))?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| IndexError::storage(&target, e))?;
            copied += 1;
        }
    }
    Ok(copied)
}
