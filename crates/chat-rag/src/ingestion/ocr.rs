//! OCR through the external tesseract binary
//!
//! Scanned PDFs are rendered to page images with `pdftoppm` (poppler-utils) first.

use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

/// Optical character recognition engine
///
/// Calls are blocking; async callers run them on the blocking pool.
pub trait OcrEngine: Send + Sync {
    /// Recognise text in one image (`extension` tells the engine the image format)
    fn recognize_image(&self, data: &[u8], extension: &str) -> Result<String>;

    /// Recognise text in every page of an image-only PDF
    fn recognize_pdf(&self, data: &[u8]) -> Result<String>;

    /// Whether the engine can run on this machine
    fn is_available(&self) -> bool;

    /// Get engine name for logging
    fn name(&self) -> &str;
}

/// Tesseract command-line OCR
pub struct TesseractCli {
    language: String,
}

impl TesseractCli {
    /// Create an engine using the given tesseract language code (e.g. "eng", "deu+eng")
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    /// Check if tesseract is installed
    pub fn has_tesseract() -> bool {
        Command::new("tesseract")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Check if pdftoppm is installed
    pub fn has_pdftoppm() -> bool {
        Command::new("pdftoppm")
            .arg("-v")
            .output()
            .map(|_| true) // pdftoppm -v exits non-zero on some versions, existence is enough
            .unwrap_or(false)
    }

    fn run_tesseract(&self, image_path: &Path) -> Result<String> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .args(["stdout", "-l", &self.language])
            .output()
            .map_err(|e| Error::extraction(image_path.display().to_string(), format!("tesseract failed to start: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::extraction(
                image_path.display().to_string(),
                format!("tesseract error: {}", stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("eng")
    }
}

impl OcrEngine for TesseractCli {
    fn recognize_image(&self, data: &[u8], extension: &str) -> Result<String> {
        if !Self::has_tesseract() {
            return Err(Error::extraction(
                format!("image.{}", extension),
                "Image OCR requires tesseract. Install with: apt install tesseract-ocr",
            ));
        }

        let temp_dir = tempfile::tempdir()?;
        let image_path = temp_dir.path().join(format!("input.{}", extension));
        std::fs::write(&image_path, data)?;

        let text = self.run_tesseract(&image_path)?;
        tracing::info!("Image OCR extracted {} characters", text.len());
        Ok(text)
    }

    fn recognize_pdf(&self, data: &[u8]) -> Result<String> {
        if !Self::has_pdftoppm() || !Self::has_tesseract() {
            return Err(Error::extraction(
                "document.pdf",
                "PDF OCR requires pdftoppm and tesseract. Install with: apt install poppler-utils tesseract-ocr",
            ));
        }

        let temp_dir = tempfile::tempdir()?;
        let pdf_path = temp_dir.path().join("input.pdf");
        std::fs::write(&pdf_path, data)?;

        let output = Command::new("pdftoppm")
            .args(["-png", "-r", "150"])
            .arg(&pdf_path)
            .arg(temp_dir.path().join("page"))
            .output()
            .map_err(|e| Error::extraction("document.pdf", format!("pdftoppm failed to start: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::extraction("document.pdf", format!("pdftoppm error: {}", stderr.trim())));
        }

        // pdftoppm zero-pads page numbers, so lexical order is page order
        let mut pages: Vec<_> = std::fs::read_dir(temp_dir.path())?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();
        pages.sort();

        if pages.is_empty() {
            return Err(Error::extraction("document.pdf", "pdftoppm produced no page images"));
        }

        let mut text = String::new();
        for page in &pages {
            let page_text = self.run_tesseract(page)?;
            if !page_text.trim().is_empty() {
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(page_text.trim());
            }
        }

        tracing::info!("OCR extracted {} characters from {} pages", text.len(), pages.len());
        Ok(text)
    }

    fn is_available(&self) -> bool {
        Self::has_tesseract()
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}
