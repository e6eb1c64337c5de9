//! # Knowledge Index
//!
//! A file-backed semantic knowledge index for retrieval-augmented tools.
//!
//! Plain-text files in a knowledge directory are split into overlapping
//! chunks, embedded, and stored in a named collection of a vector index.
//! The index tracks when it was last built, rebuilds itself when sources
//! change, and answers queries with diversity-ranked, source-attributed
//! passages.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  knowledge/ │──▶│ Split+Embed  │──▶│ VectorIndex  │
//! │   *.txt     │   │ (rebuild)    │   │ SQLite / mem │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │
//!                        ┌────────────────────┤
//!                        ▼                    ▼
//!                  ┌───────────┐       ┌────────────┐
//!                  │ Retriever │       │ CLI (kidx) │
//!                  │  MMR top-k│       │ lifecycle  │
//!                  └───────────┘       └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kidx rebuild --force              # build vector_db/ from knowledge/
//! kidx info                         # collection status and source files
//! kidx query "overdraft fees"       # retrieve passages
//! kidx backup                       # copy vector_db/ aside
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed lifecycle and retrieval errors |
//! | [`models`] | Core data types |
//! | [`loader`] | Knowledge directory scanning |
//! | [`chunk`] | Recursive character text splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector index abstraction and backends |
//! | [`mmr`] | Maximal marginal relevance re-ranking |
//! | [`lock`] | Cross-process storage lock |
//! | [`manager`] | Staleness, rebuild, backup, restore, delete |
//! | [`retriever`] | Query-time retrieval and rendering |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod loader;
pub mod lock;
pub mod manager;
pub mod mmr;
pub mod models;
pub mod retriever;
pub mod store;

pub use error::{IndexError, Result};
pub use manager::{IndexManager, IndexSettings};
pub use retriever::{Retrieval, RetrievalParams, Retriever};
