use std::path::PathBuf;

use nexus_core::config::{StorageKind, TargetConfig};
use nexus_core::error::AppError;
use nexus_core::models::Record;
use nexus_core::traits::{RecordSink, SinkFactory};

use crate::{CsvSink, JsonlSink, SqliteSink};

/// The sink chosen for one target.
#[derive(Debug, Clone)]
pub enum Sink {
    Csv(CsvSink),
    Jsonl(JsonlSink),
    Sqlite(SqliteSink),
}

impl RecordSink for Sink {
    async fn write(&self, records: &[Record]) -> Result<usize, AppError> {
        match self {
            Sink::Csv(sink) => sink.write(records).await,
            Sink::Jsonl(sink) => sink.write(records).await,
            Sink::Sqlite(sink) => sink.write(records).await,
        }
    }
}

/// Opens the sink described by each target's `storage` section.
///
/// An export override forces every target onto one storage kind; the
/// configured path keeps its stem but takes the new kind's extension.
#[derive(Debug, Clone, Default)]
pub struct StoreFactory {
    export: Option<StorageKind>,
}

impl StoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_export(export: Option<StorageKind>) -> Self {
        Self { export }
    }

    fn destination(&self, target: &TargetConfig) -> (StorageKind, PathBuf) {
        let configured = &target.storage;
        let path = configured.resolved_path(&target.name);
        match self.export {
            Some(kind) if kind != configured.kind => (kind, path.with_extension(kind.extension())),
            _ => (configured.kind, path),
        }
    }
}

impl SinkFactory for StoreFactory {
    type Sink = Sink;

    fn open(&self, target: &TargetConfig) -> Result<Sink, AppError> {
        let (kind, path) = self.destination(target);
        if path.as_os_str().is_empty() {
            return Err(AppError::StorageError(format!(
                "Empty storage path for target '{}'",
                target.name
            )));
        }
        tracing::debug!(target_name = %target.name, ?kind, path = %path.display(), "Opening sink");

        Ok(match kind {
            StorageKind::Csv => Sink::Csv(CsvSink::new(path)),
            StorageKind::Jsonl => Sink::Jsonl(JsonlSink::new(path)),
            StorageKind::Sqlite => Sink::Sqlite(SqliteSink::new(
                path,
                target.name.clone(),
                target.storage.unique_key.clone(),
            )),
        })
    }
}
