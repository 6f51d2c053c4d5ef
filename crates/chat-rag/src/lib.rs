//! chat-rag: streaming chat relay for a local Ollama server with document retrieval
//!
//! The server forwards user prompts to an Ollama model, streams the generated tokens
//! back to the browser, and optionally augments each prompt with documents retrieved
//! from an embedding store. Documents are ingested from a directory walk or uploaded
//! files (plain text, PDF, or images through OCR). Chat sessions and messages of
//! registered users are kept in SQLite.

pub mod auth;
pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod types;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use types::{
    chat::{ChatMessage, Role},
    document::{FileType, QueryMatch, StoredDocument},
};
