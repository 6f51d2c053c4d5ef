//! Core types shared by the relay, ingestion and storage layers

pub mod chat;
pub mod document;

pub use chat::{ChatMessage, ChatSession, Role, StoredMessage, User};
pub use document::{FileType, IngestFailure, IngestReport, QueryMatch, StoredDocument};
