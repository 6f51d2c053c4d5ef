//! Persistent chat history
//!
//! Users, chat sessions, messages and login tokens live in one SQLite file.

mod database;

pub use database::{ChatDb, ChatDbStats, DEFAULT_SESSION_NAME};
