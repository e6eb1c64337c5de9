//! Query-time retrieval over a managed index.
//!
//! A [`Retriever`] makes sure the collection is ready (rebuilding it when it
//! is missing, or stale with `auto_refresh` on), embeds the query, and
//! returns diversity-ranked passages attributed to their source file.
//!
//! [`Retriever::answer`] is the tool-facing form: it always returns text,
//! turning errors and empty results into readable messages.

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::error::{IndexError, Result};
use crate::manager::IndexManager;
use crate::models::AttributedPassage;
use crate::store::QueryParams;

/// Returned by [`Retriever::answer`] when nothing clears the score threshold.
pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found in the knowledge base.";

const PASSAGE_SEPARATOR: &str = "\n---\n";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub query: QueryParams,
    /// Rebuild a stale index before querying, not only a missing one.
    pub auto_refresh: bool,
}

impl RetrievalParams {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            query: QueryParams {
                top_k: config.top_k,
                fetch_k: config.fetch_k,
                diversity: config.diversity,
                min_score: config.min_score,
            },
            auto_refresh: config.auto_refresh,
        }
    }
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

/// Outcome of a successful query.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    Passages(Vec<AttributedPassage>),
    NoRelevantInformation,
}

pub struct Retriever {
    manager: Arc<IndexManager>,
    params: RetrievalParams,
}

impl Retriever {
    pub fn new(manager: Arc<IndexManager>, params: RetrievalParams) -> Self {
        Self { manager, params }
    }

    pub async fn retrieve(&self, query: &str) -> Result<Retrieval> {
        self.ensure_ready().await?;

        let hits = self.manager.search(query, &self.params.query).await?;
        tracing::debug!(query, hits = hits.len(), "retrieval complete");

        if hits.is_empty() {
            return Ok(Retrieval::NoRelevantInformation);
        }
        Ok(Retrieval::Passages(
            hits.into_iter()
                .map(|hit| AttributedPassage {
                    source: hit.payload.metadata.source,
                    text: hit.payload.text,
                })
                .collect(),
        ))
    }

    /// Retrieve and render as plain text. Never fails.
    pub async fn answer(&self, query: &str) -> String {
        match self.retrieve(query).await {
            Ok(retrieval) => render(&retrieval),
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "query failed");
                format!("Error querying the knowledge base: {}", e)
            }
        }
    }

    async fn ensure_ready(&self) -> Result<()> {
        let needs_rebuild = if !self.manager.collection_exists().await {
            tracing::info!(collection = self.manager.collection(), "collection missing, rebuilding");
            true
        } else if self.params.auto_refresh && self.manager.is_stale().await {
            tracing::info!(collection = self.manager.collection(), "knowledge changed, refreshing index");
            true
        } else {
            false
        };

        if needs_rebuild {
            let report = self.manager.rebuild(false).await;
            if let Some(e) = report.error() {
                return Err(IndexError::RetrievalUnavailable {
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Render passages as `Source/Content` blocks joined by `---` lines.
pub fn render(retrieval: &Retrieval) -> String {
    match retrieval {
        Retrieval::NoRelevantInformation => NO_RELEVANT_INFORMATION.to_string(),
        Retrieval::Passages(passages) => passages
            .iter()
            .map(|p| format!("Source: {}\n\nContent:\n{}\n", p.source, p.text))
            .collect::<Vec<_>>()
            .join(PASSAGE_SEPARATOR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_passages() {
        let retrieval = Retrieval::Passages(vec![
            AttributedPassage {
                source: "a.txt".to_string(),
                text: "First.".to_string(),
            },
            AttributedPassage {
                source: "b.txt".to_string(),
                text: "Second.".to_string(),
            },
        ]);
        assert_eq!(
            render(&retrieval),
            "Source: a.txt\n\nContent:\nFirst.\n\n---\nSource: b.txt\n\nContent:\nSecond.\n"
        );
    }

    #[test]
    fn test_render_no_relevant_information() {
        assert_eq!(
            render(&Retrieval::NoRelevantInformation),
            "No relevant information found in the knowledge base."
        );
    }

    #[test]
    fn test_params_from_config() {
        let params = RetrievalParams::default();
        assert_eq!(params.query, QueryParams::default());
        assert!(params.auto_refresh);
    }
}
