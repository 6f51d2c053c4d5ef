//! Configuration for the chat relay

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Ten years; keeps cookie `Max-Age` and token expiry in range
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365 * 10;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Ollama/LLM configuration
    pub llm: LlmConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Vector store configuration
    pub vector_store: VectorStoreConfig,
    /// Ingestion configuration
    pub ingestion: IngestionConfig,
    /// SQLite storage configuration
    pub storage: StorageConfig,
    /// Login session configuration
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Load configuration from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Cannot read {}: {}", path.display(), e))
                })?;
                toml::from_str(&raw)
                    .map_err(|e| Error::Config(format!("Invalid {}: {}", path.display(), e)))?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CHAT_RAG_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("CHAT_RAG_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| Error::Config(format!("CHAT_RAG_PORT is not a port: {}", port)))?;
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("CHAT_RAG_MODEL") {
            self.llm.chat_model = model;
        }
        if let Some(model) = lookup("CHAT_RAG_EMBED_MODEL") {
            self.llm.embed_model = model;
        }
        if let Some(dir) = lookup("CHAT_RAG_DOCUMENTS") {
            self.ingestion.documents_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup("CHROMA_URL") {
            self.vector_store.backend = VectorBackend::Chroma;
            self.vector_store.chroma_url = url;
        }
        if let Some(path) = lookup("CHAT_RAG_DATABASE") {
            self.storage.database_path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("server.port must be non-zero".to_string()));
        }
        if self.retrieval.n_results == 0 {
            return Err(Error::Config("retrieval.n_results must be at least 1".to_string()));
        }
        let threshold = self.retrieval.distance_threshold;
        if threshold.is_nan() || threshold < 0.0 {
            return Err(Error::Config(format!(
                "retrieval.distance_threshold must be a non-negative number, got {}",
                threshold
            )));
        }
        if self.llm.chat_model.trim().is_empty() || self.llm.embed_model.trim().is_empty() {
            return Err(Error::Config("llm model names must not be empty".to_string()));
        }
        let ttl = self.auth.session_ttl_hours;
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&ttl) {
            return Err(Error::Config(format!(
                "auth.session_ttl_hours must be between 1 and {}, got {}",
                MAX_SESSION_TTL_HOURS, ttl
            )));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 16MB)
    pub max_upload_size: usize,
    /// Directory served under /static
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            enable_cors: true,
            max_upload_size: 16 * 1024 * 1024,
            static_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/static")),
        }
    }
}

impl ServerConfig {
    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Chat model name
    pub chat_model: String,
    /// Embedding model name
    pub embed_model: String,
    /// Request timeout in seconds (covers the whole streamed answer)
    pub timeout_secs: u64,
    /// Number of stored messages sent along with a new prompt
    pub history_window: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            chat_model: "gemma3:27b".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            timeout_secs: 300,
            history_window: 20,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Augment prompts with retrieved documents
    pub enabled: bool,
    /// Number of nearest documents requested from the store
    pub n_results: usize,
    /// Maximum distance for a document to be used (lower is closer)
    pub distance_threshold: f32,
    /// Collection name
    pub collection: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_results: 5,
            distance_threshold: 1.5,
            collection: "documents".to_string(),
        }
    }
}

/// Vector store backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Ephemeral in-process store
    #[default]
    Memory,
    /// ChromaDB server over HTTP
    Chroma,
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// Backend provider
    pub backend: VectorBackend,
    /// ChromaDB base URL (used when backend = chroma)
    pub chroma_url: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Memory,
            chroma_url: "http://localhost:8000".to_string(),
        }
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Directory walked at startup (optional)
    pub documents_dir: Option<PathBuf>,
    /// Directory where uploaded files are kept
    pub upload_dir: PathBuf,
    /// File extensions picked up by ingestion (lower case, no dot)
    pub extensions: Vec<String>,
    /// Tesseract language code
    pub ocr_language: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            documents_dir: None,
            upload_dir: data_dir().join("uploads"),
            extensions: ["txt", "md", "pdf", "png", "jpg", "jpeg", "tif", "tiff", "bmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ocr_language: "eng".to_string(),
        }
    }
}

impl IngestionConfig {
    /// Whether a file extension is picked up by ingestion
    pub fn accepts_extension(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
    }
}

/// SQLite storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: data_dir().join("app.db"),
        }
    }
}

/// Login session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of a login token in hours
    pub session_ttl_hours: i64,
    /// Name of the session cookie
    pub cookie_name: String,
    /// Minimum password length accepted at registration
    pub min_password_len: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24 * 7,
            cookie_name: "chat_rag_session".to_string(),
            min_password_len: 8,
        }
    }
}

/// Platform data directory for the database and uploads
fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chat-rag")
}
