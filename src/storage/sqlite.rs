//! SQLite storage implementation
//!
//! Upserts each record by `(platform, key)` so re-ingesting an item, comment
//! or creator replaces the earlier row.

use crate::model::{Platform, Record};
use crate::storage::columns::{key_column, preferred_columns};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ContentKind, Sink, StorageError, StorageResult};
use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// SQLite storage backend
pub struct SqliteSink {
    conn: Mutex<Connection>,
    platform: Platform,
}

impl SqliteSink {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `platform` - Platform tag written to every row
    pub fn open(path: &Path, platform: Platform) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;
        tracing::info!("Opened database {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            platform,
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory(platform: Platform) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            platform,
        })
    }

    /// Number of rows in the table for `kind`
    pub async fn count(&self, kind: ContentKind) -> StorageResult<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.as_str()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Reads one column of one row, as text
    ///
    /// Only table columns are accepted; SQLite would otherwise read an
    /// unknown quoted name as a string literal.
    pub async fn field(
        &self,
        kind: ContentKind,
        key: &str,
        column: &str,
    ) -> StorageResult<Option<String>> {
        if !preferred_columns(kind).contains(&column) {
            return Err(StorageError::Unsupported(format!(
                "{} has no column {}",
                kind.as_str(),
                column
            )));
        }
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT CAST(\"{}\" AS TEXT) FROM {} WHERE platform = ?1 AND \"{}\" = ?2",
            column,
            kind.as_str(),
            key_column(kind)
        );
        let value = conn
            .query_row(&sql, [self.platform.as_str(), key], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?;
        Ok(value.flatten())
    }
}

/// Builds the upsert statement for a kind
fn upsert_sql(kind: ContentKind) -> String {
    let columns = preferred_columns(kind);
    let names: Vec<String> = std::iter::once("platform")
        .chain(columns.iter().copied())
        .map(|c| format!("\"{}\"", c))
        .collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| **c != key_column(kind))
        .map(|c| format!("\"{0}\" = excluded.\"{0}\"", c))
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(platform, \"{}\") DO UPDATE SET {}",
        kind.as_str(),
        names.join(", "),
        placeholders.join(", "),
        key_column(kind),
        updates.join(", ")
    )
}

fn to_sql_value(value: Option<&Value>) -> SqlValue {
    match value {
        None | Some(Value::Null) => SqlValue::Null,
        Some(Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n
                .as_f64()
                .map(SqlValue::Real)
                .unwrap_or_else(|| SqlValue::Text(n.to_string())),
        },
        Some(Value::String(s)) => SqlValue::Text(s.clone()),
        Some(other) => SqlValue::Text(other.to_string()),
    }
}

#[async_trait]
impl Sink for SqliteSink {
    async fn write(&self, kind: ContentKind, record: &Record) -> StorageResult<()> {
        let sql = upsert_sql(kind);
        let values: Vec<SqlValue> = std::iter::once(SqlValue::Text(self.platform.as_str().to_string()))
            .chain(
                preferred_columns(kind)
                    .iter()
                    .map(|c| to_sql_value(record.get(*c))),
            )
            .collect();

        let conn = self.conn.lock().await;
        conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    async fn paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}
