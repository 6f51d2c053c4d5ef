//! Text extraction by file type

use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::FileType;

use super::ocr::OcrEngine;

/// Text extracted from one file
#[derive(Debug, Clone)]
pub struct ExtractedText {
    /// File type
    pub file_type: FileType,
    /// Extracted text content, trimmed
    pub content: String,
    /// SHA-256 of the content, hex encoded
    pub content_hash: String,
    /// Total pages (PDF only)
    pub total_pages: Option<u32>,
    /// Whether the text came from OCR
    pub ocr: bool,
}

/// Extracts text from plain text, PDF and image files
pub struct TextExtractor {
    ocr: Arc<dyn OcrEngine>,
}

impl TextExtractor {
    pub fn new(ocr: Arc<dyn OcrEngine>) -> Self {
        Self { ocr }
    }

    /// Extract text from `data`, dispatching on the extension of `filename`
    ///
    /// Blocking: PDF parsing and OCR run synchronously.
    pub fn extract(&self, filename: &str, data: &[u8]) -> Result<ExtractedText> {
        let extension = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let file_type = FileType::from_extension(&extension);

        let (content, total_pages, ocr) = match file_type {
            FileType::Txt | FileType::Markdown => (Self::extract_text(filename, data)?, None, false),
            FileType::Pdf => self.extract_pdf(filename, data)?,
            FileType::Image => (self.ocr.recognize_image(data, &extension)?, None, true),
            FileType::Unknown => {
                return Err(Error::UnsupportedFileType(if extension.is_empty() {
                    format!("{} has no extension", filename)
                } else {
                    extension
                }))
            }
        };

        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(Error::extraction(filename, "No text content could be extracted"));
        }

        Ok(ExtractedText {
            file_type,
            content_hash: hash_content(&content),
            content,
            total_pages,
            ocr,
        })
    }

    /// Strict UTF-8 decoding
    fn extract_text(filename: &str, data: &[u8]) -> Result<String> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::extraction(filename, format!("File is not valid UTF-8: {}", e)))?;
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }

    /// Text layer first, OCR when the PDF has none
    fn extract_pdf(&self, filename: &str, data: &[u8]) -> Result<(String, Option<u32>, bool)> {
        let total_pages = lopdf::Document::load_mem(data)
            .ok()
            .map(|doc| doc.get_pages().len() as u32);

        let layer_error = match extract_pdf_with_timeout(data) {
            Ok(text) => {
                let text = cleanup_pdf_text(&text);
                if !text.trim().is_empty() {
                    return Ok((text, total_pages, false));
                }
                "PDF has no text layer".to_string()
            }
            Err(e) => e,
        };

        tracing::info!("{}: {}, trying OCR with {}", filename, layer_error, self.ocr.name());
        match self.ocr.recognize_pdf(data) {
            Ok(text) => Ok((text, total_pages, true)),
            Err(e) => Err(Error::extraction(
                filename,
                format!("{}; OCR fallback failed: {}", layer_error, e),
            )),
        }
    }
}

/// Extract the PDF text layer on a helper thread with a timeout
///
/// pdf-extract can hang on some fonts and panics on some malformed files; both
/// surface as an error string instead of taking the caller down.
fn extract_pdf_with_timeout(data: &[u8]) -> std::result::Result<String, String> {
    use std::sync::mpsc;
    use std::time::Duration;

    let data = data.to_vec();
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        let result = pdf_extract::extract_text_from_mem(&data);
        let _ = tx.send(result.map_err(|e| e.to_string()));
    });

    match rx.recv_timeout(Duration::from_secs(60)) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            tracing::error!("PDF text extraction timed out after 60s");
            Err("PDF text extraction timed out".to_string())
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err("PDF text extraction crashed".to_string())
        }
    }
}

/// Drop NUL characters and blank lines, trim each line, undo common ligatures
fn cleanup_pdf_text(text: &str) -> String {
    text.replace('\0', "")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .replace('\u{00A0}', " ")
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Hash content for deduplication
pub(crate) fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
