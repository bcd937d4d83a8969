//! File ingestion for prompt attachments.
//!
//! Each `{name, data}` entry is decoded from base64 (optionally wrapped in a
//! `data:<mime>;base64,` URL) and written under the agent's upload
//! directory. Failures are per file and never abort the prompt.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tether_core::UploadedFile;
use tracing::{debug, warn};

use crate::errors::IngestError;

/// Result for one uploaded file.
#[derive(Debug)]
pub enum IngestOutcome {
    /// Written to this path.
    Saved(PathBuf),
    /// Skipped.
    Failed(IngestError),
}

impl IngestOutcome {
    /// Whether the file was written.
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

/// Persists prompt attachments before the task starts.
#[async_trait]
pub trait FileIngestor: Send + Sync + 'static {
    /// Persist `files` into `dir`, one outcome per file in input order.
    async fn ingest(&self, dir: &Path, files: &[UploadedFile]) -> Vec<IngestOutcome>;
}

/// Writes attachments to the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiskFileIngestor;

#[async_trait]
impl FileIngestor for DiskFileIngestor {
    async fn ingest(&self, dir: &Path, files: &[UploadedFile]) -> Vec<IngestOutcome> {
        if files.is_empty() {
            return Vec::new();
        }
        if let Err(err) = tokio::fs::create_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %err, "cannot create upload directory");
            return files
                .iter()
                .map(|_| {
                    IngestOutcome::Failed(IngestError::Io {
                        path: dir.to_path_buf(),
                        source: std::io::Error::new(err.kind(), err.to_string()),
                    })
                })
                .collect();
        }

        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            let outcome = match save_one(dir, file).await {
                Ok(path) => {
                    debug!(path = %path.display(), "saved upload");
                    IngestOutcome::Saved(path)
                }
                Err(err) => {
                    warn!(error = %err, "skipping upload");
                    IngestOutcome::Failed(err)
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

async fn save_one(dir: &Path, file: &UploadedFile) -> Result<PathBuf, IngestError> {
    let raw_name = file.name.as_deref().ok_or(IngestError::MissingField("name"))?;
    let data = file.data.as_deref().ok_or(IngestError::MissingField("data"))?;
    let name = sanitize_name(raw_name)?;
    let bytes = STANDARD
        .decode(strip_data_url(data))
        .map_err(|e| IngestError::InvalidBase64 {
            name: raw_name.to_string(),
            message: e.to_string(),
        })?;
    let path = dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|source| IngestError::Io {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

/// Reduce a client-supplied name to its final path component.
pub fn sanitize_name(name: &str) -> Result<String, IngestError> {
    let normalized = name.replace('\\', "/");
    let last = normalized.rsplit('/').next().unwrap_or_default().trim();
    if last.is_empty() || last == "." || last == ".." {
        return Err(IngestError::InvalidName(name.to_string()));
    }
    Ok(last.to_string())
}

/// Strip a `data:<mime>;base64,` prefix if present.
pub fn strip_data_url(data: &str) -> &str {
    let data = data.trim();
    if data.starts_with("data:") {
        if let Some((_, payload)) = data.split_once(',') {
            return payload;
        }
    }
    data
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
