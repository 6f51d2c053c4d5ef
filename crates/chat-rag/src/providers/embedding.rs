//! Text embedding seam

use async_trait::async_trait;
use crate::error::Result;

/// Turns a document or a prompt into a vector for the store
///
/// Documents and prompts must go through the same provider, or their
/// distances mean nothing.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Whether the model server answers
    async fn health_check(&self) -> Result<bool>;

    fn name(&self) -> &str;
}
