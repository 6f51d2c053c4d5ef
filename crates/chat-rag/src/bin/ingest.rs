//! Command-line document ingestion
//!
//! Run with: cargo run -p chat-rag --features cli --bin chat-rag-ingest -- <DIR>

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use chat_rag::config::{AppConfig, VectorBackend};
use chat_rag::ingestion::{IngestOutcome, Ingestor, TextExtractor};
use chat_rag::retrieval::Retriever;
use chat_rag::server::state::Providers;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Walk a directory into the document store.
#[derive(Debug, Parser)]
#[command(name = "chat-rag-ingest", version, about = "Ingest documents for chat-rag retrieval")]
struct Cli {
    /// Directory to walk
    #[arg(value_name = "DIR")]
    dir: PathBuf,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// ChromaDB server URL (switches to the Chroma backend)
    #[arg(long, value_name = "URL")]
    chroma: Option<String>,

    /// Run one retrieval query afterwards and print the context
    #[arg(short, long, value_name = "TEXT")]
    query: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_rag=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.chroma {
        config.vector_store.backend = VectorBackend::Chroma;
        config.vector_store.chroma_url = url;
    }
    if config.vector_store.backend == VectorBackend::Memory {
        println!(
            "{} using the in-memory store, documents are gone when this process exits",
            style("note:").yellow().bold()
        );
    }

    let providers = Providers::from_config(&config)?;
    let ingestor = Ingestor::new(
        config.ingestion.clone(),
        TextExtractor::new(Arc::clone(&providers.ocr)),
        Arc::clone(&providers.embedder),
        Arc::clone(&providers.vector_store),
    );

    let files = ingestor
        .collect_files(&cli.dir)
        .with_context(|| format!("cannot ingest {}", cli.dir.display()))?;

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")?
            .progress_chars("=>-"),
    );

    let (mut added, mut unchanged, mut failed) = (0usize, 0usize, Vec::new());
    for path in &files {
        progress.set_message(path.display().to_string());
        match ingestor.ingest_path(path).await {
            Ok(IngestOutcome::Added) => added += 1,
            Ok(IngestOutcome::Skipped) => unchanged += 1,
            Err(e) => failed.push((path.clone(), e)),
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    println!(
        "{} {} added, {} unchanged, {} failed ({} documents in {})",
        style("done:").green().bold(),
        added,
        unchanged,
        failed.len(),
        providers.vector_store.len().await?,
        providers.vector_store.name()
    );
    for (path, error) in &failed {
        println!("  {} {}: {}", style("failed").red(), path.display(), error);
    }

    if let Some(query) = cli.query {
        let retriever = Retriever::new(
            config.retrieval.clone(),
            Arc::clone(&providers.embedder),
            Arc::clone(&providers.vector_store),
        );
        for m in retriever.search(&query, config.retrieval.n_results).await? {
            let marker = if m.distance <= config.retrieval.distance_threshold {
                style("used").green()
            } else {
                style("dropped").dim()
            };
            println!("  {:>8.4} {} {}", m.distance, marker, m.id);
        }
        let context = retriever.query_context(&query).await?;
        println!("\n{}\n{}", style("Context:").bold(), if context.is_empty() { "(none)" } else { context.as_str() });
    }

    Ok(())
}
