use std::path::{Path, PathBuf};

use nexus_core::error::AppError;
use nexus_core::models::Record;
use nexus_core::traits::RecordSink;

use crate::{cell_text, ensure_parent};

/// Writes records to a CSV file, replacing any previous content.
///
/// Columns come from the first record's keys; fields missing from later
/// records are written as empty cells and extra fields are dropped.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn encode(records: &[Record]) -> Result<Vec<u8>, AppError> {
    let Some(first) = records.first() else {
        return Ok(Vec::new());
    };
    let columns: Vec<&String> = first.keys().collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&columns)
        .map_err(|e| AppError::StorageError(format!("CSV header: {e}")))?;
    for record in records {
        let row = columns.iter().map(|c| cell_text(record.get(c.as_str())));
        writer
            .write_record(row)
            .map_err(|e| AppError::StorageError(format!("CSV row: {e}")))?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::StorageError(format!("CSV flush: {e}")))
}

impl RecordSink for CsvSink {
    async fn write(&self, records: &[Record]) -> Result<usize, AppError> {
        if records.is_empty() {
            tracing::warn!(path = %self.path.display(), "No data to save");
            return Ok(0);
        }

        let bytes = encode(records)?;
        ensure_parent(&self.path).await?;
        tokio::fs::write(&self.path, bytes).await?;

        tracing::info!(path = %self.path.display(), rows = records.len(), "Saved CSV");
        Ok(records.len())
    }
}
