use std::path::{Path, PathBuf};

use nexus_core::error::AppError;
use nexus_core::models::Record;
use nexus_core::traits::RecordSink;

use crate::ensure_parent;

/// Writes one JSON object per line. Each run replaces the file.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for JsonlSink {
    async fn write(&self, records: &[Record]) -> Result<usize, AppError> {
        let mut out = String::new();
        for record in records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }

        ensure_parent(&self.path).await?;
        tokio::fs::write(&self.path, out).await?;

        tracing::info!(path = %self.path.display(), rows = records.len(), "Saved JSONL");
        Ok(records.len())
    }
}
