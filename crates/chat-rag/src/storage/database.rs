//! SQLite database for users, chat sessions, messages and login tokens

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{ChatSession, StoredMessage, User};

/// Name given to sessions created without one
pub const DEFAULT_SESSION_NAME: &str = "New Chat";

/// Row counts for `/api/info`
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatDbStats {
    pub users: usize,
    pub sessions: usize,
    pub messages: usize,
}

/// SQLite-backed chat history
#[derive(Clone)]
pub struct ChatDb {
    conn: Arc<Mutex<Connection>>,
}

impl ChatDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Database(format!("Failed to open {}: {}", path.display(), e)))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chat_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL DEFAULT 'New Chat',
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chat_sessions_user ON chat_sessions(user_id);

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
                is_user INTEGER NOT NULL,
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);

            -- Tokens are stored as SHA-256 digests
            CREATE TABLE IF NOT EXISTS auth_tokens (
                token_hash TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| Error::Database(format!("Failed to run migrations: {}", e)))?;

        Ok(())
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Insert a user; a taken username is a conflict
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let conn = self.conn.lock();
        let created_at = Utc::now();

        conn.execute(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
            params![username, password_hash, created_at],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref err, _) if err.code == ErrorCode::ConstraintViolation => {
                Error::Conflict(format!("Username '{}' is already taken", username))
            }
            other => other.into(),
        })?;

        Ok(User {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at,
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                "SELECT id, username, password_hash, created_at FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_name(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    // ========================================================================
    // Chat sessions
    // ========================================================================

    /// Create a session for `user_id`, named "New Chat" when `name` is `None`
    pub fn create_session(&self, user_id: i64, name: Option<&str>) -> Result<ChatSession> {
        let conn = self.conn.lock();
        let name = name.unwrap_or(DEFAULT_SESSION_NAME);
        let created_at = Utc::now();

        conn.execute(
            "INSERT INTO chat_sessions (name, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![name, user_id, created_at],
        )?;

        Ok(ChatSession {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            user_id,
            created_at,
        })
    }

    /// Sessions of a user, newest first
    pub fn list_sessions(&self, user_id: i64) -> Result<Vec<ChatSession>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, user_id, created_at FROM chat_sessions
             WHERE user_id = ?1 ORDER BY id DESC",
        )?;
        let sessions = stmt
            .query_map(params![user_id], row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    pub fn get_session(&self, id: i64) -> Result<Option<ChatSession>> {
        let conn = self.conn.lock();
        let session = conn
            .query_row(
                "SELECT id, name, user_id, created_at FROM chat_sessions WHERE id = ?1",
                params![id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Session `id` if it belongs to `user_id`
    ///
    /// Another user's session is reported as not found, same as a missing one.
    pub fn get_user_session(&self, id: i64, user_id: i64) -> Result<ChatSession> {
        match self.get_session(id)? {
            Some(session) if session.user_id == user_id => Ok(session),
            _ => Err(Error::NotFound(format!("Chat session {}", id))),
        }
    }

    pub fn rename_session(&self, id: i64, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE chat_sessions SET name = ?1 WHERE id = ?2",
            params![name, id],
        )?;
        Ok(updated > 0)
    }

    /// Delete a session together with its messages
    pub fn delete_session(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM chat_sessions WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    // ========================================================================
    // Messages
    // ========================================================================

    pub fn add_message(&self, session_id: i64, is_user: bool, content: &str) -> Result<StoredMessage> {
        let conn = self.conn.lock();
        let timestamp = Utc::now();

        conn.execute(
            "INSERT INTO messages (session_id, is_user, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, is_user, content, timestamp],
        )?;

        Ok(StoredMessage {
            id: conn.last_insert_rowid(),
            session_id,
            is_user,
            content: content.to_string(),
            timestamp,
        })
    }

    /// All messages of a session, oldest first
    pub fn list_messages(&self, session_id: i64) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, is_user, content, timestamp FROM messages
             WHERE session_id = ?1 ORDER BY id ASC",
        )?;
        let messages = stmt
            .query_map(params![session_id], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    /// The last `limit` messages of a session, oldest first
    pub fn recent_messages(&self, session_id: i64, limit: usize) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, is_user, content, timestamp FROM messages
             WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let mut messages = stmt
            .query_map(params![session_id, limit as i64], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    // ========================================================================
    // Login tokens
    // ========================================================================

    /// Issue a login token for `user_id` valid for `ttl`
    pub fn create_token(&self, user_id: i64, ttl: Duration) -> Result<String> {
        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let expires_at = (Utc::now() + ttl).timestamp();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO auth_tokens (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![hash_token(&token), user_id, expires_at],
        )?;
        Ok(token)
    }

    /// User owning a live token; an expired token is deleted and yields `None`
    pub fn user_for_token(&self, token: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let token_hash = hash_token(token);

        let found: Option<(i64, i64)> = conn
            .query_row(
                "SELECT user_id, expires_at FROM auth_tokens WHERE token_hash = ?1",
                params![token_hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((user_id, expires_at)) = found else {
            return Ok(None);
        };

        if expires_at <= Utc::now().timestamp() {
            conn.execute("DELETE FROM auth_tokens WHERE token_hash = ?1", params![token_hash])?;
            tracing::debug!("Expired login token for user {} removed", user_id);
            return Ok(None);
        }

        let user = conn
            .query_row(
                "SELECT id, username, password_hash, created_at FROM users WHERE id = ?1",
                params![user_id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn delete_token(&self, token: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM auth_tokens WHERE token_hash = ?1",
            params![hash_token(token)],
        )?;
        Ok(deleted > 0)
    }

    /// Remove every expired token
    pub fn purge_expired_tokens(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM auth_tokens WHERE expires_at <= ?1",
            params![Utc::now().timestamp()],
        )?;
        tracing::debug!("Purged {} expired login tokens", deleted);
        Ok(deleted)
    }

    pub fn stats(&self) -> Result<ChatDbStats> {
        let conn = self.conn.lock();
        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(ChatDbStats {
            users: count("users")?,
            sessions: count("chat_sessions")?,
            messages: count("messages")?,
        })
    }
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: row.get::<_, DateTime<Utc>>(3)?,
    })
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<ChatSession> {
    Ok(ChatSession {
        id: row.get(0)?,
        name: row.get(1)?,
        user_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<StoredMessage> {
    Ok(StoredMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        is_user: row.get(2)?,
        content: row.get(3)?,
        timestamp: row.get(4)?,
    })
}
