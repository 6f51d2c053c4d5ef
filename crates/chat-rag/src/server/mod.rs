//! HTTP server for the chat relay

pub mod routes;
pub mod state;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::net::SocketAddr;
use tower_http::{
    compression::{
        predicate::{DefaultPredicate, NotForContentType, Predicate},
        CompressionLayer,
    },
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::types::IngestReport;
use state::AppState;

/// Chat HTTP server
pub struct ChatServer {
    state: AppState,
}

impl ChatServer {
    /// Create a server with Ollama, the configured vector store and the on-disk database
    pub fn new(config: AppConfig) -> Result<Self> {
        Ok(Self {
            state: AppState::new(config)?,
        })
    }

    /// Create a server around existing state
    pub fn with_state(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Ingest the configured documents directory, if any
    pub async fn ingest_documents(&self) -> Result<Option<IngestReport>> {
        let Some(dir) = self.state.config().ingestion.documents_dir.clone() else {
            return Ok(None);
        };
        self.state.ingestor().ingest_directory(&dir).await.map(Some)
    }

    /// Start the server; returns after Ctrl-C once in-flight requests finish
    pub async fn start(self) -> Result<()> {
        let server_config = &self.state.config().server;
        let addr: SocketAddr = server_config
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let router = build_router(self.state.clone());

        tracing::info!("Starting chat server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind {}: {}", addr, e)))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let server_config = state.config().server.clone();

    // Streamed replies are text/plain; compressing them would buffer tokens
    let compression = CompressionLayer::new()
        .compress_when(DefaultPredicate::new().and(NotForContentType::const_new("text/plain")));

    let router = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness))
        .merge(routes::app_routes(server_config.max_upload_size))
        .nest_service("/static", ServeDir::new(&server_config.static_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(compression);

    if server_config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router.layer(cors)
    } else {
        router
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Readiness check endpoint
async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests;
