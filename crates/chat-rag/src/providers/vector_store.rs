//! Vector store provider trait for storing and searching document embeddings

use async_trait::async_trait;
use crate::error::Result;
use crate::types::{QueryMatch, StoredDocument};

/// Trait for document storage and nearest-neighbour search
///
/// Implementations:
/// - `MemoryVectorStore`: ephemeral in-process store
/// - `ChromaVectorStore`: ChromaDB server
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    /// Insert a document, replacing any entry with the same id
    async fn upsert(&self, document: StoredDocument) -> Result<()>;

    /// Nearest documents to `embedding`, closest first, at most `n_results`
    async fn query(&self, embedding: &[f32], n_results: usize) -> Result<Vec<QueryMatch>>;

    /// Content hash stored for `id`, `None` when the id is absent
    async fn content_hash(&self, id: &str) -> Result<Option<String>>;

    /// Get total number of documents stored
    async fn len(&self) -> Result<usize>;

    /// Check if store is empty
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Check if the provider is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
