//! In-memory [`VectorIndex`] implementation for tests and throwaway indexes.
//!
//! Collections live in a `BTreeMap` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over every record in the collection.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::VectorRecord;

use super::{check_dimensions, CollectionDescription, Distance, ScoredRecord, VectorIndex};

struct StoredCollection {
    vector_size: usize,
    distance: Distance,
    records: Vec<VectorRecord>,
}

/// Volatile index; contents vanish when the value is dropped.
pub struct InMemoryIndex {
    collections: RwLock<BTreeMap<String, StoredCollection>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, StoredCollection>>> {
        self.collections
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, StoredCollection>>> {
        self.collections
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionDescription>> {
        Ok(self.read()?.get(name).map(|c| CollectionDescription {
            name: name.to_string(),
            record_count: c.records.len(),
            vector_size: c.vector_size,
            distance: c.distance,
        }))
    }

    async fn create_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<()> {
        let mut collections = self.write()?;
        if collections.contains_key(name) {
            bail!("collection '{}' already exists", name);
        }
        collections.insert(
            name.to_string(),
            StoredCollection {
                vector_size,
                distance,
                records: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        Ok(self.write()?.remove(name).is_some())
    }

    async fn upsert(&self, name: &str, records: &[VectorRecord]) -> Result<()> {
        let mut collections = self.write()?;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| anyhow!("collection '{}' does not exist", name))?;
        check_dimensions(name, collection.vector_size, records)?;

        for record in records {
            match collection.records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => collection.records.push(record.clone()),
            }
        }
        Ok(())
    }

    async fn search(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        let collections = self.read()?;
        let collection = collections
            .get(name)
            .ok_or_else(|| anyhow!("collection '{}' does not exist", name))?;

        let mut scored: Vec<ScoredRecord> = collection
            .records
            .iter()
            .map(|r| ScoredRecord {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.vector),
                vector: r.vector.clone(),
                payload: r.payload.clone(),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkPayload, SourceMetadata};
    use crate::store::QueryParams;

    fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector,
            payload: ChunkPayload {
                text: format!("text of {}", id),
                metadata: SourceMetadata {
                    source: "a.txt".to_string(),
                    file_path: "knowledge/a.txt".to_string(),
                    modified_time: 0.0,
                },
                start_index: 0,
            },
        }
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let index = InMemoryIndex::new();
        index.create_collection("kb", 2, Distance::Cosine).await.unwrap();
        assert!(index.create_collection("kb", 2, Distance::Cosine).await.is_err());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let index = InMemoryIndex::new();
        index.create_collection("kb", 2, Distance::Cosine).await.unwrap();
        index
            .upsert("kb", &[record("a", vec![1.0, 0.0]), record("b", vec![0.0, 1.0])])
            .await
            .unwrap();
        index.upsert("kb", &[record("a", vec![0.5, 0.5])]).await.unwrap();

        let desc = index.get_collection("kb").await.unwrap().unwrap();
        assert_eq!(desc.record_count, 2);
        assert_eq!(desc.vector_size, 2);
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimensions() {
        let index = InMemoryIndex::new();
        index.create_collection("kb", 3, Distance::Cosine).await.unwrap();
        let err = index.upsert("kb", &[record("a", vec![1.0, 0.0])]).await.unwrap_err();
        assert!(err.to_string().contains("expects 3"));
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let index = InMemoryIndex::new();
        index.create_collection("kb", 2, Distance::Cosine).await.unwrap();
        index
            .upsert(
                "kb",
                &[
                    record("far", vec![0.0, 1.0]),
                    record("near", vec![1.0, 0.1]),
                    record("mid", vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = index.search("kb", &[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
    }

    #[tokio::test]
    async fn test_query_applies_min_score() {
        let index = InMemoryIndex::new();
        index.create_collection("kb", 2, Distance::Cosine).await.unwrap();
        index
            .upsert("kb", &[record("orthogonal", vec![0.0, 1.0])])
            .await
            .unwrap();

        let hits = index
            .query("kb", &[1.0, 0.0], &QueryParams::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_replace_and_delete() {
        let index = InMemoryIndex::new();
        index.create_collection("kb", 2, Distance::Cosine).await.unwrap();
        index.upsert("kb", &[record("old", vec![1.0, 0.0])]).await.unwrap();

        index
            .replace_collection("kb", 3, &[record("new", vec![0.0, 0.0, 1.0])])
            .await
            .unwrap();
        let desc = index.get_collection("kb").await.unwrap().unwrap();
        assert_eq!(desc.vector_size, 3);
        assert_eq!(desc.record_count, 1);

        assert!(index.delete_collection("kb").await.unwrap());
        assert!(!index.delete_collection("kb").await.unwrap());
        assert!(index.list_collections().await.unwrap().is_empty());
    }
}
