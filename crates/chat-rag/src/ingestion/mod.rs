//! Document ingestion: text extraction (plain text, PDF, OCR) and embedding into the store

pub mod ocr;
mod parser;
mod pipeline;

pub use ocr::{OcrEngine, TesseractCli};
pub use parser::{ExtractedText, TextExtractor};
pub use pipeline::{IngestOutcome, Ingestor};
