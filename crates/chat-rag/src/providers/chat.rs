//! Chat provider trait for streamed answer generation

use async_trait::async_trait;
use crate::error::Result;
use crate::generation::TokenStream;
use crate::types::ChatMessage;

/// Trait for streamed chat completion
///
/// Implementations:
/// - `OllamaChat`: Local Ollama server (gemma3, llama3, phi3, ...)
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Start generating a reply to `messages`, yielding tokens as they arrive
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<TokenStream>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
