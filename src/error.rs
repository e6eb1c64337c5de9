//! Error taxonomy for index lifecycle and retrieval operations.
//!
//! Collaborators ([`Embedder`](crate::embedding::Embedder) and
//! [`VectorIndex`](crate::store::VectorIndex)) report failures as
//! [`anyhow::Error`]; the lifecycle manager wraps those into
//! [`IndexError::Provider`] so every caller can branch on a typed value.

use std::path::PathBuf;

/// Result alias used by the loader, manager and retriever.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Every failure an index operation can surface.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A referenced directory, collection or backup does not exist.
    #[error("{kind} not found: {location}")]
    NotFound {
        kind: &'static str,
        location: String,
    },

    /// Settings that cannot be used as given.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A rebuild could not produce a usable index.
    #[error("{message} (files scanned: {files_scanned}, chunks produced: {chunks_produced})")]
    Build {
        message: String,
        files_scanned: usize,
        chunks_produced: usize,
    },

    /// The index could not be made ready for querying.
    #[error("knowledge base unavailable: {reason}")]
    RetrievalUnavailable { reason: String },

    /// Fault raised by the embedding provider or the vector index.
    #[error("provider error: {0:#}")]
    Provider(anyhow::Error),

    /// Filesystem failure while copying or removing index storage.
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another operation holds the storage lock.
    #[error("index storage is locked by another operation: {}", path.display())]
    Locked { path: PathBuf },
}

impl IndexError {
    pub fn not_found(kind: &'static str, location: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            location: location.into(),
        }
    }

    pub fn build(message: impl Into<String>, files_scanned: usize, chunks_produced: usize) -> Self {
        Self::Build {
            message: message.into(),
            files_scanned,
            chunks_produced,
        }
    }

    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Stable short label, used in reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Config(_) => "config",
            Self::Build { .. } => "build",
            Self::RetrievalUnavailable { .. } => "retrieval_unavailable",
            Self::Provider(_) => "provider",
            Self::Storage { .. } => "storage",
            Self::Locked { .. } => "locked",
        }
    }
}

impl From<anyhow::Error> for IndexError {
    fn from(err: anyhow::Error) -> Self {
        Self::Provider(err)
    }
}
