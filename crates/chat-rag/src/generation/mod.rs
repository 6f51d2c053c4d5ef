//! Prompt assembly and the Ollama chat client

pub mod ollama;
pub mod prompt;

pub use ollama::{decode_chat_stream, NdjsonLines, OllamaClient, TokenStream};
pub use prompt::PromptBuilder;
