//! Routes of the chat server

pub mod account;
pub mod chat;
pub mod sessions;
pub mod upload;

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;

use crate::server::state::AppState;

/// Build all application routes
pub fn app_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Chat
        .route("/", get(chat::index).post(chat::prompt))
        .route("/send_message", post(chat::send_message))
        .route("/chat_history/:session_id", get(chat::chat_history))
        // Sessions
        .route(
            "/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/sessions/:id",
            patch(sessions::rename_session).delete(sessions::delete_session),
        )
        // Accounts
        .route("/register", post(account::register))
        .route("/login", post(account::login))
        .route("/logout", post(account::logout))
        .route("/me", get(account::me))
        // Upload - with larger body limit for documents
        .route(
            "/upload",
            post(upload::upload).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        // Info
        .route("/api/info", get(info))
}

/// GET /api/info
async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.config();
    let documents = state.vector_store().len().await.ok();
    let history = state.db().stats().ok();

    Json(json!({
        "name": "chat-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Streaming chat relay for a local Ollama server with document retrieval",
        "models": {
            "chat": state.chat().model(),
            "embeddings": config.llm.embed_model,
        },
        "retrieval": {
            "enabled": config.retrieval.enabled,
            "n_results": config.retrieval.n_results,
            "distance_threshold": config.retrieval.distance_threshold,
        },
        "vector_store": {
            "backend": state.vector_store().name(),
            "documents": documents,
        },
        "history": history,
        "endpoints": {
            "POST /": "Stream a reply to form field inputText",
            "POST /send_message": "Stream a reply within a chat session",
            "GET /chat_history/:session_id": "Messages of a session",
            "GET|POST /sessions": "List or create chat sessions",
            "PATCH|DELETE /sessions/:id": "Rename or delete a session",
            "POST /register, /login, /logout": "Account handling",
            "POST /upload": "Upload documents for retrieval"
        }
    }))
}
