use std::path::{Path, PathBuf};

use nexus_core::error::AppError;
use nexus_core::models::Record;
use nexus_core::traits::RecordSink;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::{cell_text, ensure_parent};

/// Appends records to a SQLite table named after the target.
///
/// The table is created with one TEXT column per key of the first record.
/// With a `unique_key`, rows whose value for that key is already stored
/// (including earlier rows of the same batch) are skipped.
#[derive(Debug, Clone)]
pub struct SqliteSink {
    path: PathBuf,
    table: String,
    unique_key: Option<String>,
}

impl SqliteSink {
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>, unique_key: Option<String>) -> Self {
        Self {
            path: path.into(),
            table: table.into(),
            unique_key,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn connect(&self) -> Result<SqlitePool, AppError> {
        ensure_parent(&self.path).await?;
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true);

        SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::StorageError(format!("Failed to open {}: {e}", self.path.display()))
            })
    }

    async fn insert_all(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        columns: &[&String],
        records: &[Record],
    ) -> Result<usize, AppError> {
        let table = quote_ident(&self.table);
        let column_defs = columns
            .iter()
            .map(|c| format!("{} TEXT", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let create = format!("CREATE TABLE IF NOT EXISTS {table} ({column_defs})");
        sqlx::query(&create)
            .execute(&mut **tx)
            .await
            .map_err(storage_error)?;

        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");
        let insert = format!("INSERT INTO {table} ({column_list}) VALUES ({placeholders})");
        let exists = self
            .unique_key
            .as_deref()
            .map(|key| format!("SELECT 1 FROM {table} WHERE {} = ? LIMIT 1", quote_ident(key)));

        let mut inserted = 0;
        for record in records {
            if let (Some(key), Some(sql)) = (self.unique_key.as_deref(), exists.as_deref())
                && let Some(value) = record.get(key)
            {
                let found = sqlx::query(sql)
                    .bind(cell_text(Some(value)))
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(storage_error)?;
                if found.is_some() {
                    tracing::debug!(table = %self.table, key, "Skipping duplicate row");
                    continue;
                }
            }

            let mut query = sqlx::query(&insert);
            for column in columns {
                query = query.bind(cell_text(record.get(column.as_str())));
            }
            query.execute(&mut **tx).await.map_err(storage_error)?;
            inserted += 1;
        }

        Ok(inserted)
    }
}

impl RecordSink for SqliteSink {
    async fn write(&self, records: &[Record]) -> Result<usize, AppError> {
        let Some(first) = records.first() else {
            tracing::warn!(path = %self.path.display(), "No data to save");
            return Ok(0);
        };
        let columns: Vec<&String> = first.keys().collect();

        let pool = self.connect().await?;
        let mut tx = pool.begin().await.map_err(storage_error)?;
        let inserted = self.insert_all(&mut tx, &columns, records).await?;
        tx.commit().await.map_err(storage_error)?;
        pool.close().await;

        tracing::info!(
            path = %self.path.display(),
            table = %self.table,
            rows = inserted,
            skipped = records.len() - inserted,
            "Saved SQLite rows"
        );
        Ok(inserted)
    }
}

fn storage_error(e: sqlx::Error) -> AppError {
    AppError::StorageError(e.to_string())
}

/// Quote an SQL identifier, doubling embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use nexus_core::testutil::record;

    use super::*;

    async fn rows(path: &Path, sql: &str) -> Vec<(String, String)> {
        let pool = SqlitePool::connect_with(SqliteConnectOptions::new().filename(path))
            .await
            .unwrap();
        let rows = sqlx::query_as::<_, (String, String)>(sql)
            .fetch_all(&pool)
            .await
            .unwrap();
        pool.close().await;
        rows
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("title"), "\"title\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[tokio::test]
    async fn creates_database_and_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/books.db");
        let sink = SqliteSink::new(&path, "books", None);

        let written = sink
            .write(&[
                record(&[("title", "Sharp Objects"), ("price", "47.82")]),
                record(&[("title", "Soumission")]),
            ])
            .await
            .unwrap();

        assert_eq!(written, 2);
        let stored = rows(&path, r#"SELECT "title", "price" FROM "books" ORDER BY rowid"#).await;
        assert_eq!(
            stored,
            vec![
                ("Sharp Objects".to_string(), "47.82".to_string()),
                ("Soumission".to_string(), String::new()),
            ]
        );
    }

    #[tokio::test]
    async fn unique_key_skips_existing_and_repeated_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.db");
        let sink = SqliteSink::new(&path, "books", Some("url".into()));

        let first = sink
            .write(&[record(&[("url", "/a"), ("title", "A")])])
            .await
            .unwrap();
        let second = sink
            .write(&[
                record(&[("url", "/a"), ("title", "A again")]),
                record(&[("url", "/b"), ("title", "B")]),
                record(&[("url", "/b"), ("title", "B again")]),
            ])
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 1);
        let stored = rows(&path, r#"SELECT "url", "title" FROM "books" ORDER BY rowid"#).await;
        assert_eq!(
            stored,
            vec![
                ("/a".to_string(), "A".to_string()),
                ("/b".to_string(), "B".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn hostile_table_name_is_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.db");
        let sink = SqliteSink::new(&path, "books; DROP TABLE x", None);

        sink.write(&[record(&[("a", "1"), ("b", "2")])]).await.unwrap();

        let stored = rows(&path, r#"SELECT "a", "b" FROM "books; DROP TABLE x""#).await;
        assert_eq!(stored, vec![("1".to_string(), "2".to_string())]);
    }

    #[tokio::test]
    async fn empty_batch_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("none.db");

        let written = SqliteSink::new(&path, "t", None).write(&[]).await.unwrap();

        assert_eq!(written, 0);
        assert!(!path.exists());
    }
}
