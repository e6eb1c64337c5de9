//! Core data models that flow through the build and retrieval pipeline.
//!
//! [`SourceFile`], [`Document`] and [`Chunk`] are recomputed on every
//! rebuild; [`VectorRecord`]s are what the vector index persists.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A text file discovered in the knowledge directory.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub filename: String,
    pub byte_size: u64,
    /// Unix seconds, sub-second precision kept.
    pub modified_time: f64,
}

/// Provenance shared by a document and every chunk cut from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub source: String,
    pub file_path: String,
    pub modified_time: f64,
}

/// Full contents of one source file.
#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub metadata: SourceMetadata,
}

/// A bounded substring of a document; the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic UUIDv5 of `(source, index)`.
    pub id: String,
    pub index: usize,
    pub text: String,
    /// Character offset of `text` within the document content.
    pub start_index: usize,
    pub metadata: SourceMetadata,
}

/// Payload stored next to each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub text: String,
    #[serde(flatten)]
    pub metadata: SourceMetadata,
    pub start_index: usize,
}

impl From<&Chunk> for ChunkPayload {
    fn from(chunk: &Chunk) -> Self {
        Self {
            text: chunk.text.clone(),
            metadata: chunk.metadata.clone(),
            start_index: chunk.start_index,
        }
    }
}

/// A vector plus its payload, as held by a collection.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// A retrieved passage with the file it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributedPassage {
    pub source: String,
    pub text: String,
}
