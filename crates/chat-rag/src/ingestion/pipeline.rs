//! Ingestion pipeline: extract, embed, upsert

use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::config::IngestionConfig;
use crate::error::{Error, Result};
use crate::providers::{EmbeddingProvider, VectorStoreProvider};
use crate::types::{IngestFailure, IngestReport, StoredDocument};

use super::parser::TextExtractor;

/// What happened to one ingested file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Written to the store
    Added,
    /// Same id with the same content hash already stored
    Skipped,
}

/// Turns files into stored documents, one document per file
pub struct Ingestor {
    config: IngestionConfig,
    extractor: Arc<TextExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStoreProvider>,
}

impl Ingestor {
    pub fn new(
        config: IngestionConfig,
        extractor: TextExtractor,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStoreProvider>,
    ) -> Self {
        Self {
            config,
            extractor: Arc::new(extractor),
            embedder,
            store,
        }
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Regular files under `dir` with an accepted extension, in path order
    pub fn collect_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(Error::NotFound(format!(
                "Documents directory {} does not exist",
                dir.display()
            )));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let accepted = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| self.config.accepts_extension(ext));
            if accepted {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    /// Ingest every accepted file under `dir`
    ///
    /// A failing file is logged and recorded in the report; the walk goes on.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestReport> {
        let files = self.collect_files(dir)?;
        tracing::info!("Ingesting {} files from {}", files.len(), dir.display());

        let mut report = IngestReport::default();
        for path in files {
            let id = path.to_string_lossy().to_string();
            match self.ingest_path(&path).await {
                Ok(IngestOutcome::Added) => report.added.push(id),
                Ok(IngestOutcome::Skipped) => report.skipped.push(id),
                Err(e) => {
                    tracing::warn!("Error processing {}: {}", id, e);
                    report.failed.push(IngestFailure {
                        path: id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Ingestion finished: {} added, {} unchanged, {} failed",
            report.added.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Ingest one file from disk; the document id is its path
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestOutcome> {
        let data = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.ingest_bytes(&path.to_string_lossy(), &filename, data).await
    }

    /// Ingest file contents under document id `id`
    pub async fn ingest_bytes(&self, id: &str, filename: &str, data: Vec<u8>) -> Result<IngestOutcome> {
        let extractor = Arc::clone(&self.extractor);
        let name = filename.to_string();
        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&name, &data))
            .await
            .map_err(|e| Error::internal(format!("Task join error: {}", e)))??;

        if self.store.content_hash(id).await?.as_deref() == Some(extracted.content_hash.as_str()) {
            tracing::debug!("Unchanged, skipping: {}", id);
            return Ok(IngestOutcome::Skipped);
        }

        let embedding = self.embedder.embed(&extracted.content).await?;

        let mut metadata = HashMap::new();
        metadata.insert("path".to_string(), json!(id));
        metadata.insert("filename".to_string(), json!(filename));
        metadata.insert("content_hash".to_string(), json!(extracted.content_hash));
        metadata.insert("file_type".to_string(), json!(extracted.file_type.as_str()));
        if let Some(pages) = extracted.total_pages {
            metadata.insert("pages".to_string(), json!(pages));
        }
        if extracted.ocr {
            metadata.insert("ocr".to_string(), json!(true));
        }

        self.store
            .upsert(StoredDocument {
                id: id.to_string(),
                content: extracted.content,
                embedding,
                metadata,
            })
            .await?;

        tracing::info!("Document added: {}", id);
        Ok(IngestOutcome::Added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::OcrEngine;
    use crate::providers::MemoryVectorStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoOcr;

    impl OcrEngine for NoOcr {
        fn recognize_image(&self, _data: &[u8], _extension: &str) -> Result<String> {
            Err(Error::extraction("image", "OCR unavailable"))
        }

        fn recognize_pdf(&self, _data: &[u8]) -> Result<String> {
            Err(Error::extraction("pdf", "OCR unavailable"))
        }

        fn is_available(&self) -> bool {
            false
        }

        fn name(&self) -> &str {
            "none"
        }
    }

    /// Embeds text as (length, vowel count)
    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let vowels = text.chars().filter(|c| "aeiou".contains(*c)).count();
            Ok(vec![text.len() as f32, vowels as f32])
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn ingestor() -> (Ingestor, Arc<CountingEmbedder>, Arc<MemoryVectorStore>) {
        let embedder = Arc::new(CountingEmbedder::default());
        let store = Arc::new(MemoryVectorStore::new());
        let ingestor = Ingestor::new(
            IngestionConfig::default(),
            TextExtractor::new(Arc::new(NoOcr)),
            embedder.clone(),
            store.clone(),
        );
        (ingestor, embedder, store)
    }

    #[tokio::test]
    async fn test_ingest_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha document").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/b.md"), "# beta").unwrap();
        std::fs::write(dir.path().join("ignored.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("bad.txt"), [0xffu8, 0xfe]).unwrap();
        std::fs::write(dir.path().join("scan.png"), [0x89u8, 0x50]).unwrap();

        let (ingestor, _, store) = ingestor();
        let report = ingestor.ingest_directory(dir.path()).await.unwrap();

        assert_eq!(report.added.len(), 2);
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed.iter().any(|f| f.path.ends_with("bad.txt")));
        assert!(report.failed.iter().any(|f| f.path.ends_with("scan.png")));
        assert_eq!(store.len().await.unwrap(), 2);

        let id = dir.path().join("a.txt").to_string_lossy().to_string();
        let matches = store.query(&[14.0, 5.0], 1).await.unwrap();
        assert_eq!(matches[0].id, id);
        assert_eq!(matches[0].content, "alpha document");
        assert_eq!(matches[0].metadata["filename"], "a.txt");
        assert_eq!(matches[0].metadata["file_type"], "txt");
        assert_eq!(matches[0].metadata["path"], id.as_str());
    }

    #[tokio::test]
    async fn test_unchanged_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "first version").unwrap();

        let (ingestor, embedder, store) = ingestor();
        assert_eq!(ingestor.ingest_path(&file).await.unwrap(), IngestOutcome::Added);
        assert_eq!(ingestor.ingest_path(&file).await.unwrap(), IngestOutcome::Skipped);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

        std::fs::write(&file, "second version").unwrap();
        assert_eq!(ingestor.ingest_path(&file).await.unwrap(), IngestOutcome::Added);
        assert_eq!(store.len().await.unwrap(), 1);

        let report = ingestor.ingest_directory(dir.path()).await.unwrap();
        assert!(report.added.is_empty());
        assert_eq!(report.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_bytes_rejects_unsupported() {
        let (ingestor, embedder, _) = ingestor();
        let result = ingestor.ingest_bytes("uploads/x.exe", "x.exe", b"MZ".to_vec()).await;
        assert!(matches!(result, Err(Error::UnsupportedFileType(_))));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let (ingestor, _, _) = ingestor();
        let result = ingestor.ingest_directory(Path::new("/definitely/not/here")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
