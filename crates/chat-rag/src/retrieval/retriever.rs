//! Distance-thresholded nearest-neighbour retrieval

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::providers::{EmbeddingProvider, VectorStoreProvider};
use crate::types::QueryMatch;

/// Keep matches whose distance is within `threshold` (lower is closer)
pub fn filter_by_distance(matches: Vec<QueryMatch>, threshold: f32) -> Vec<QueryMatch> {
    matches
        .into_iter()
        .filter(|m| m.distance <= threshold)
        .collect()
}

/// Looks up stored documents relevant to a prompt
pub struct Retriever {
    config: RetrievalConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStoreProvider>,
}

impl Retriever {
    pub fn new(
        config: RetrievalConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStoreProvider>,
    ) -> Self {
        Self {
            config,
            embedder,
            store,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Context for `prompt` using the configured result count and threshold
    pub async fn query_context(&self, prompt: &str) -> Result<String> {
        self.query_context_with(prompt, self.config.n_results, self.config.distance_threshold)
            .await
    }

    /// Relevant documents joined by newlines, empty when nothing is close enough
    pub async fn query_context_with(
        &self,
        prompt: &str,
        n_results: usize,
        threshold: f32,
    ) -> Result<String> {
        let matches = self.search(prompt, n_results).await?;
        let relevant = filter_by_distance(matches, threshold);

        tracing::debug!(
            "{} documents within distance {}",
            relevant.len(),
            threshold
        );

        Ok(relevant
            .into_iter()
            .map(|m| m.content)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Raw nearest matches for `prompt`, closest first
    pub async fn search(&self, prompt: &str, n_results: usize) -> Result<Vec<QueryMatch>> {
        if n_results == 0 || self.store.is_empty().await? {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(prompt).await?;
        let matches = self.store.query(&embedding, n_results).await?;

        for m in &matches {
            tracing::debug!(document = %m.id, distance = m.distance, "retrieved");
        }
        Ok(matches)
    }
}
