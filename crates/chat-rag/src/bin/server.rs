//! Chat server binary
//!
//! Run with: cargo run -p chat-rag --bin chat-rag-server
//! Set CHAT_RAG_CONFIG to a TOML file to override the defaults.

use chat_rag::{config::AppConfig, server::ChatServer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_rag=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var_os("CHAT_RAG_CONFIG").map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Chat model: {}", config.llm.chat_model);
    tracing::info!("  - Embedding model: {}", config.llm.embed_model);
    tracing::info!("  - Vector store: {:?}", config.vector_store.backend);
    tracing::info!(
        "  - Retrieval: {} (n_results {}, threshold {})",
        if config.retrieval.enabled { "on" } else { "off" },
        config.retrieval.n_results,
        config.retrieval.distance_threshold
    );
    tracing::info!("  - Database: {}", config.storage.database_path.display());

    let server = ChatServer::new(config)?;

    // Check Ollama
    let ollama_url = &server.state().config().llm.base_url;
    tracing::info!("Checking Ollama at {}...", ollama_url);
    if server.state().is_ready().await {
        tracing::info!("Ollama is running");
    } else {
        tracing::warn!("Ollama not available at {}", ollama_url);
        tracing::warn!("Please start Ollama:");
        tracing::warn!("  1. Start: ollama serve");
        tracing::warn!(
            "  2. Pull models: ollama pull {} && ollama pull {}",
            server.state().config().llm.chat_model,
            server.state().config().llm.embed_model
        );
    }

    match server.ingest_documents().await {
        Ok(Some(report)) => tracing::info!(
            "Documents ready: {} added, {} unchanged, {} failed",
            report.added.len(),
            report.skipped.len(),
            report.failed.len()
        ),
        Ok(None) => tracing::info!("No documents directory configured"),
        Err(e) => tracing::warn!("Document ingestion skipped: {}", e),
    }

    let address = server.state().config().server.address();
    println!("\nServer starting...");
    println!("  Chat: http://{}", address);
    println!("  Health: http://{}/health", address);
    println!("  API Info: http://{}/api/info", address);
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
