//! Document upload

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use sha2::{Digest, Sha256};
use std::time::Instant;

use crate::auth::CurrentUser;
use crate::error::{Error, Result};
use crate::ingestion::IngestOutcome;
use crate::server::state::AppState;

#[derive(Debug, Serialize)]
pub struct AcceptedFile {
    pub filename: String,
    /// Path of the saved copy, also the document id; same bytes, same path
    pub stored_as: String,
    /// "added" or "unchanged"
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RejectedFile {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct UploadResponse {
    pub accepted: Vec<AcceptedFile>,
    pub rejected: Vec<RejectedFile>,
    pub processing_time_ms: u64,
}

/// POST /upload - multipart `file` fields, each saved and ingested
pub async fn upload(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let start = Instant::now();
    let mut response = UploadResponse::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() != Some("file") {
            tracing::debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }

        let original = field.file_name().unwrap_or("").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| Error::BadRequest(format!("Failed to read {}: {}", original, e)))?;

        tracing::info!("Upload from {}: {} ({} bytes)", user.username, original, data.len());

        match store_and_ingest(&state, &original, data.to_vec()).await {
            Ok((stored_as, outcome)) => response.accepted.push(AcceptedFile {
                filename: original,
                stored_as,
                status: match outcome {
                    IngestOutcome::Added => "added",
                    IngestOutcome::Skipped => "unchanged",
                },
            }),
            Err(e) => {
                tracing::warn!("Rejected upload {}: {}", original, e);
                response.rejected.push(RejectedFile {
                    filename: original,
                    error: e.to_string(),
                });
            }
        }
    }

    if response.accepted.is_empty() && response.rejected.is_empty() {
        return Err(Error::BadRequest("No file fields in upload".to_string()));
    }

    response.processing_time_ms = start.elapsed().as_millis() as u64;
    Ok(Json(response))
}

async fn store_and_ingest(state: &AppState, original: &str, data: Vec<u8>) -> Result<(String, IngestOutcome)> {
    let filename = sanitize_filename(original)
        .ok_or_else(|| Error::BadRequest("Missing file name".to_string()))?;

    let extension = Path::new(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    if !state.config().ingestion.accepts_extension(extension) {
        return Err(Error::UnsupportedFileType(if extension.is_empty() {
            filename.clone()
        } else {
            extension.to_string()
        }));
    }

    if data.is_empty() {
        return Err(Error::BadRequest("File is empty".to_string()));
    }

    let upload_dir = state.config().ingestion.upload_dir.clone();
    let target = upload_dir.join(stored_name(&filename, &data));

    let saved = {
        let target = target.clone();
        let data = data.clone();
        tokio::task::spawn_blocking(move || persist_upload(&upload_dir, &target, &data))
            .await
            .map_err(|e| Error::internal(format!("Task join error: {}", e)))?
    };
    saved?;

    let id = target.to_string_lossy().to_string();
    match state.ingestor().ingest_bytes(&id, &filename, data).await {
        Ok(outcome) => Ok((id, outcome)),
        Err(e) => {
            if let Err(remove_err) = tokio::fs::remove_file(&target).await {
                tracing::warn!("Could not remove {}: {}", target.display(), remove_err);
            }
            Err(e)
        }
    }
}

/// `<first 8 hex of sha256(data)>_<filename>`
///
/// Re-uploading identical bytes maps onto the same document id.
fn stored_name(filename: &str, data: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(data));
    format!("{}_{}", &digest[..8], filename)
}

/// Write through a temporary file in `dir`, then move it into place
fn persist_upload(dir: &Path, target: &Path, data: &[u8]) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.persist(target).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Final path component with anything outside `[A-Za-z0-9._-]` replaced by `_`
fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("notes.txt").as_deref(), Some("notes.txt"));
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_filename("C:\\docs\\my report.pdf").as_deref(), Some("my_report.pdf"));
        assert_eq!(sanitize_filename(".hidden.md").as_deref(), Some("hidden.md"));
        assert_eq!(sanitize_filename(""), None);
        assert_eq!(sanitize_filename("dir/"), None);
    }

    #[test]
    fn test_stored_name_follows_content() {
        let a = stored_name("notes.txt", b"same bytes");
        assert_eq!(a, stored_name("notes.txt", b"same bytes"));
        assert_ne!(a, stored_name("notes.txt", b"other bytes"));
        assert!(a.ends_with("_notes.txt"));
        assert_eq!(a.len(), 8 + 1 + "notes.txt".len());
    }

    #[test]
    fn test_persist_upload() {
        let dir = tempfile::tempdir().unwrap();
        let upload_dir = dir.path().join("uploads");
        let target = upload_dir.join("a.txt");
        persist_upload(&upload_dir, &target, b"hello").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello");
        assert_eq!(std::fs::read_dir(&upload_dir).unwrap().count(), 1);
    }
}
