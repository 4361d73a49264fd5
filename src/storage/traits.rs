//! Storage traits and error types
//!
//! This module defines the trait every sink backend implements and the
//! associated error types.

use crate::model::Record;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported storage operation: {0}")]
    Unsupported(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// The three record families a run produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Contents,
    Comments,
    Creators,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contents => "contents",
            Self::Comments => "comments",
            Self::Creators => "creators",
        }
    }
}

/// A storage backend bound to one run
///
/// File-based backends append; database backends upsert by primary key.
/// Implementations serialize their own I/O so `write` may be called from
/// concurrent tasks.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Persists one flat record of the given kind
    async fn write(&self, kind: ContentKind, record: &Record) -> StorageResult<()>;

    /// Files written so far, one per content kind (empty for databases)
    async fn paths(&self) -> Vec<PathBuf>;
}
