//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the narrow contract the lifecycle manager
//! and retriever depend on, enabling pluggable backends:
//!
//! | Backend | Persistence |
//! |---------|-------------|
//! | [`SqliteIndex`] | `index.sqlite` inside the index storage directory |
//! | [`InMemoryIndex`] | none; used by tests and embedding experiments |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::mmr::maximal_marginal_relevance;
use crate::models::{ChunkPayload, VectorRecord};

/// Similarity metric a collection is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Distance {
    Cosine,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "cosine",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cosine" => Some(Distance::Cosine),
            _ => None,
        }
    }
}

/// What the index knows about one collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionDescription {
    pub name: String,
    pub record_count: usize,
    pub vector_size: usize,
    pub distance: Distance,
}

/// A stored record together with its similarity to a query vector.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub id: String,
    pub score: f32,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// Ranking policy for [`VectorIndex::query`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryParams {
    /// Results returned after re-ranking.
    pub top_k: usize,
    /// Nearest candidates considered before re-ranking.
    pub fetch_k: usize,
    /// MMR lambda in `[0, 1]`; `1.0` disables the diversity penalty.
    pub diversity: f32,
    /// Candidates below this cosine similarity are discarded.
    pub min_score: f32,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            top_k: 5,
            fetch_k: 10,
            diversity: 0.5,
            min_score: 0.3,
        }
    }
}

/// Nearest-neighbour store keyed by collection name.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_collections`](VectorIndex::list_collections) | Names of all collections |
/// | [`get_collection`](VectorIndex::get_collection) | Size and count, `None` if absent |
/// | [`create_collection`](VectorIndex::create_collection) | New empty collection with a fixed vector size |
/// | [`delete_collection`](VectorIndex::delete_collection) | Drop a collection and its records |
/// | [`upsert`](VectorIndex::upsert) | Insert or overwrite records by ID |
/// | [`search`](VectorIndex::search) | Raw cosine-similarity nearest neighbours |
/// | [`replace_collection`](VectorIndex::replace_collection) | Drop, recreate and fill in one step |
/// | [`query`](VectorIndex::query) | Thresholded, MMR re-ranked retrieval |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionDescription>>;

    /// Fails if the collection already exists.
    async fn create_collection(&self, name: &str, vector_size: usize, distance: Distance)
        -> Result<()>;

    /// Returns whether a collection was removed.
    async fn delete_collection(&self, name: &str) -> Result<bool>;

    /// Fails if the collection is missing or a vector has the wrong length.
    async fn upsert(&self, name: &str, records: &[VectorRecord]) -> Result<()>;

    /// Up to `limit` records ordered by descending cosine similarity.
    async fn search(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>>;

    /// Replace a collection wholesale. Backends that can do this atomically
    /// should override the default drop → create → upsert sequence.
    async fn replace_collection(
        &self,
        name: &str,
        vector_size: usize,
        records: &[VectorRecord],
    ) -> Result<()> {
        self.delete_collection(name).await?;
        self.create_collection(name, vector_size, Distance::Cosine)
            .await?;
        self.upsert(name, records).await
    }

    /// Fetch `fetch_k` nearest candidates, drop those under `min_score`,
    /// then pick `top_k` by maximal marginal relevance.
    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        params: &QueryParams,
    ) -> Result<Vec<ScoredRecord>> {
        let mut candidates = self.search(name, vector, params.fetch_k).await?;
        candidates.retain(|c| c.score >= params.min_score);

        let embeddings: Vec<&[f32]> = candidates.iter().map(|c| c.vector.as_slice()).collect();
        let order = maximal_marginal_relevance(vector, &embeddings, params.top_k, params.diversity);

        let mut slots: Vec<Option<ScoredRecord>> = candidates.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|i| slots.get_mut(i).and_then(Option::take))
            .collect())
    }
}

/// Reject records whose vectors do not match the collection's size.
pub(crate) fn check_dimensions(name: &str, vector_size: usize, records: &[VectorRecord]) -> Result<()> {
    if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_size) {
        anyhow::bail!(
            "record {} has {} dimensions, collection '{}' expects {}",
            bad.id,
            bad.vector.len(),
            name,
            vector_size
        );
    }
    Ok(())
}
