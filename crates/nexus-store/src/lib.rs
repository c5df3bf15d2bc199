pub mod csv_sink;
pub mod factory;
pub mod jsonl_sink;
pub mod sqlite_sink;

use std::path::Path;

use nexus_core::error::AppError;
use serde_json::Value;

pub use csv_sink::CsvSink;
pub use factory::{Sink, StoreFactory};
pub use jsonl_sink::JsonlSink;
pub use sqlite_sink::SqliteSink;

/// Render a field for text columns: strings verbatim, null empty, the rest as JSON.
pub(crate) fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Create the parent directory of `path` if it has one.
pub(crate) async fn ensure_parent(path: &Path) -> Result<(), AppError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::StorageError(format!("Cannot create {}: {e}", dir.display()))),
        _ => Ok(()),
    }
}
