//! TOML configuration.
//!
//! Every section and field has a default, so a missing config file yields a
//! working [`Config`] pointing at `./knowledge` and `./vector_db`.
//!
//! ```toml
//! [knowledge]
//! dir = "knowledge"
//!
//! [index]
//! path = "vector_db"
//! collection = "banking_knowledge"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! top_k = 5
//! fetch_k = 10
//! diversity = 0.5
//! min_score = 0.3
//!
//! [embedding]
//! provider = "hash"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    #[serde(default = "default_knowledge_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            dir: default_knowledge_dir(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_knowledge_dir() -> PathBuf {
    PathBuf::from("knowledge")
}
fn default_include_globs() -> Vec<String> {
    vec!["*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            collection: default_collection(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("vector_db")
}
fn default_collection() -> String {
    "banking_knowledge".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Passages returned after re-ranking.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Nearest candidates fetched before re-ranking.
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    /// MMR lambda: 1.0 ranks purely by similarity, 0.0 purely by diversity.
    #[serde(default = "default_diversity")]
    pub diversity: f32,
    /// Candidates scoring below this cosine similarity are discarded.
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    /// Rebuild before querying when source files changed, not only when
    /// the collection is missing.
    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            fetch_k: default_fetch_k(),
            diversity: default_diversity(),
            min_score: default_min_score(),
            auto_refresh: default_auto_refresh(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_fetch_k() -> usize {
    10
}
fn default_diversity() -> f32 {
    0.5
}
fn default_min_score() -> f32 {
    0.3
}
fn default_auto_refresh() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Output size for the `hash` provider. Other providers report their own.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Read and validate a config file. A missing file is not an error when
/// `allow_missing` is set; defaults are returned instead.
pub fn load_config(path: &Path, allow_missing: bool) -> Result<Config> {
    if allow_missing && !path.exists() {
        tracing::debug!(path = %path.display(), "config file absent, using defaults");
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.index.collection.trim().is_empty() {
        anyhow::bail!("index.collection must not be empty");
    }
    if config.knowledge.include_globs.is_empty() {
        anyhow::bail!("knowledge.include_globs must not be empty");
    }
    crate::loader::build_globset(&config.knowledge.include_globs)
        .context("knowledge.include_globs")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.fetch_k < config.retrieval.top_k {
        anyhow::bail!("retrieval.fetch_k must be >= retrieval.top_k");
    }
    if !(0.0..=1.0).contains(&config.retrieval.diversity) {
        anyhow::bail!("retrieval.diversity must be in [0.0, 1.0]");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.min_score) {
        anyhow::bail!("retrieval.min_score must be in [-1.0, 1.0]");
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0 when set");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "hash" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.provider == "openai" && config.embedding.model.is_none() {
        anyhow::bail!("embedding.model must be specified when provider is 'openai'");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.fetch_k, 10);
        assert!((config.retrieval.diversity - 0.5).abs() < f32::EPSILON);
        assert!((config.retrieval.min_score - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.index.collection, "banking_knowledge");
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [index]
            path = "/var/lib/kb"

            [retrieval]
            min_score = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.index.path, PathBuf::from("/var/lib/kb"));
        assert_eq!(config.index.collection, "banking_knowledge");
        assert!((config.retrieval.min_score - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.fetch_k, 10);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let mut config = Config::default();
        config.chunking.chunk_overlap = 1000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = Config::default();
        config.embedding.provider = "magic".to_string();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("Unknown embedding provider"));
    }

    #[test]
    fn test_invalid_include_glob_rejected() {
        let mut config = Config::default();
        config.knowledge.include_globs = vec!["notes[.txt".to_string()];
        let err = format!("{:#}", validate(&config).unwrap_err());
        assert!(err.contains("knowledge.include_globs"), "{}", err);
        assert!(err.contains("notes[.txt"), "{}", err);
    }

    #[test]
    fn test_fetch_k_below_top_k_rejected() {
        let mut config = Config::default();
        config.retrieval.fetch_k = 2;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_file_allowed() {
        let config = load_config(Path::new("/definitely/not/here.toml"), true).unwrap();
        assert_eq!(config.knowledge.dir, PathBuf::from("knowledge"));
        assert!(load_config(Path::new("/definitely/not/here.toml"), false).is_err());
    }
}
