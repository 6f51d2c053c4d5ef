//! Documents held by the embedding store

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// File types the ingestion pipeline can extract text from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Plain text file
    Txt,
    /// Markdown file
    Markdown,
    /// PDF document (text layer, OCR when scanned)
    Pdf,
    /// Image (OCR) - requires tesseract
    Image,
    /// Unknown file type
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "txt" => Self::Txt,
            "md" => Self::Markdown,
            "pdf" => Self::Pdf,
            "png" | "jpg" | "jpeg" | "bmp" | "tiff" | "tif" => Self::Image,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Markdown => "markdown",
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Unknown => "unknown",
        }
    }
}

/// A document as written to the vector store
///
/// The id is the source path, so re-ingesting a file replaces its entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StoredDocument {
    /// Content hash recorded at ingestion, if any
    pub fn content_hash(&self) -> Option<&str> {
        self.metadata.get("content_hash").and_then(|v| v.as_str())
    }
}

/// One nearest-neighbour result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMatch {
    pub id: String,
    pub content: String,
    /// Distance to the query (lower is closer)
    pub distance: f32,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A file the ingestion pipeline could not add
#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    pub path: String,
    pub error: String,
}

/// Outcome of an ingestion run
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Ids of documents written to the store
    pub added: Vec<String>,
    /// Ids skipped because the same content is already stored
    pub skipped: Vec<String>,
    pub failed: Vec<IngestFailure>,
}
