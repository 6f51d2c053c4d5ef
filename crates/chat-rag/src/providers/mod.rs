//! Provider abstractions for embeddings, chat generation and vector storage
//!
//! The relay and the ingestion pipeline only see these traits, so the Ollama
//! client and either vector store backend can be swapped (or stubbed in tests).

pub mod chat;
pub mod chroma;
pub mod embedding;
pub mod memory;
pub mod ollama;
pub mod vector_store;

pub use chat::ChatProvider;
pub use chroma::ChromaVectorStore;
pub use embedding::EmbeddingProvider;
pub use memory::MemoryVectorStore;
pub use ollama::{OllamaChat, OllamaEmbedder, OllamaProvider};
pub use vector_store::VectorStoreProvider;
