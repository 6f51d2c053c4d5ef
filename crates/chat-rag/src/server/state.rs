//! Application state for the chat server

use std::sync::Arc;

use crate::config::{AppConfig, VectorBackend};
use crate::error::Result;
use crate::ingestion::{Ingestor, OcrEngine, TesseractCli, TextExtractor};
use crate::providers::{
    ChatProvider, ChromaVectorStore, EmbeddingProvider, MemoryVectorStore, OllamaProvider,
    VectorStoreProvider,
};
use crate::retrieval::Retriever;
use crate::storage::ChatDb;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    /// Chat model (Ollama)
    chat: Arc<dyn ChatProvider>,
    /// Document store (in-memory or Chroma)
    vector_store: Arc<dyn VectorStoreProvider>,
    retriever: Retriever,
    ingestor: Ingestor,
    db: ChatDb,
}

/// The pluggable pieces of the state
pub struct Providers {
    pub chat: Arc<dyn ChatProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub vector_store: Arc<dyn VectorStoreProvider>,
    pub ocr: Arc<dyn OcrEngine>,
}

impl Providers {
    /// Ollama for chat and embeddings, the configured vector backend, tesseract OCR
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let (embedder, chat) = OllamaProvider::new(&config.llm)?.split();
        tracing::info!(
            "Ollama client initialized (chat: {}, embeddings: {})",
            config.llm.chat_model,
            config.llm.embed_model
        );

        let vector_store: Arc<dyn VectorStoreProvider> = match config.vector_store.backend {
            VectorBackend::Memory => {
                tracing::info!("Using in-memory vector store");
                Arc::new(MemoryVectorStore::new())
            }
            VectorBackend::Chroma => {
                tracing::info!(
                    "Using Chroma vector store at {} (collection '{}')",
                    config.vector_store.chroma_url,
                    config.retrieval.collection
                );
                Arc::new(ChromaVectorStore::new(
                    config.vector_store.chroma_url.clone(),
                    config.retrieval.collection.clone(),
                )?)
            }
        };

        let ocr = TesseractCli::new(config.ingestion.ocr_language.clone());
        if !ocr.is_available() {
            tracing::warn!("tesseract not found, image and scanned PDF ingestion will fail");
        }

        Ok(Self {
            chat: Arc::new(chat),
            embedder: Arc::new(embedder),
            vector_store,
            ocr: Arc::new(ocr),
        })
    }
}

impl AppState {
    /// Create state from configuration, opening the database on disk
    pub fn new(config: AppConfig) -> Result<Self> {
        let providers = Providers::from_config(&config)?;
        let db = ChatDb::new(&config.storage.database_path)?;
        tracing::info!("Chat database: {}", config.storage.database_path.display());
        db.purge_expired_tokens()?;
        Ok(Self::from_parts(config, providers, db))
    }

    /// Assemble state from already-built providers
    pub fn from_parts(config: AppConfig, providers: Providers, db: ChatDb) -> Self {
        let retriever = Retriever::new(
            config.retrieval.clone(),
            Arc::clone(&providers.embedder),
            Arc::clone(&providers.vector_store),
        );
        let ingestor = Ingestor::new(
            config.ingestion.clone(),
            TextExtractor::new(providers.ocr),
            Arc::clone(&providers.embedder),
            Arc::clone(&providers.vector_store),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                chat: providers.chat,
                vector_store: providers.vector_store,
                retriever,
                ingestor,
                db,
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn chat(&self) -> &Arc<dyn ChatProvider> {
        &self.inner.chat
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStoreProvider> {
        &self.inner.vector_store
    }

    pub fn retriever(&self) -> &Retriever {
        &self.inner.retriever
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.inner.ingestor
    }

    pub fn db(&self) -> &ChatDb {
        &self.inner.db
    }

    /// Ready when the chat model server answers
    pub async fn is_ready(&self) -> bool {
        self.inner.chat.health_check().await.unwrap_or(false)
    }
}
