//! Storage module for persisting collected records
//!
//! This module handles everything written during a run:
//! - The `Sink` trait and its four backends (CSV, JSON, SQLite, MySQL)
//! - Preferred column ordering for file exports
//! - `SinkSession`, which binds one sink per run and remembers item context
//!   so comment records can be enriched with their owning item

mod columns;
mod csv_sink;
mod json_sink;
mod relational;
mod schema;
mod sqlite;
mod traits;

pub use columns::{key_column, ordered_fields, preferred_columns};
pub use csv_sink::CsvSink;
pub use json_sink::JsonSink;
pub use relational::MySqlSink;
pub use sqlite::SqliteSink;
pub use traits::{ContentKind, Sink, StorageError, StorageResult};

pub(crate) use csv_sink::UTF8_BOM;
pub(crate) use json_sink::write_atomic;

use crate::config::{OutputConfig, SaveFormat};
use crate::model::{Comment, CrawlMode, Creator, Item, ItemContext, Platform};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Text of one CSV cell
pub(crate) fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `dir/stem.ext`, or `dir/stem_N.ext` with the first free `N` when taken
pub(crate) fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let path = dir.join(format!("{}.{}", stem, ext));
    if !path.exists() {
        return path;
    }
    (1u32..)
        .map(|n| dir.join(format!("{}_{}.{}", stem, n, ext)))
        .find(|p| !p.exists())
        .unwrap_or(path)
}

struct Binding {
    mode: CrawlMode,
    sink: Option<Arc<dyn Sink>>,
}

/// Run-scoped storage session
///
/// The first write (or an explicit `bind`) creates the backend, and every
/// later write within the run goes to that same instance, so file backends
/// produce exactly one file per content kind. `reset` drops the binding so
/// the next run starts fresh files.
pub struct SinkSession {
    format: SaveFormat,
    directory: PathBuf,
    database_path: PathBuf,
    database_url: Option<String>,
    platform: Platform,
    binding: Mutex<Binding>,
    contexts: Mutex<HashMap<String, ItemContext>>,
}

impl SinkSession {
    /// Creates an unbound session
    ///
    /// # Arguments
    ///
    /// * `output` - Format and locations from the `[output]` section
    /// * `platform` - Platform whose records this session stores
    pub fn new(output: &OutputConfig, platform: Platform) -> Self {
        Self {
            format: output.format,
            directory: output.directory.clone(),
            database_path: output.database_path.clone(),
            database_url: output.database_url.clone(),
            platform,
            binding: Mutex::new(Binding {
                mode: CrawlMode::Search,
                sink: None,
            }),
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Binds the backend for a run in `mode`, or returns the one already bound
    pub async fn bind(&self, mode: CrawlMode) -> StorageResult<Arc<dyn Sink>> {
        let mut binding = self.binding.lock().await;
        if let Some(sink) = &binding.sink {
            return Ok(sink.clone());
        }
        binding.mode = mode;
        let sink = self.create(mode).await?;
        binding.sink = Some(sink.clone());
        Ok(sink)
    }

    /// Drops the bound backend and the remembered item context
    pub async fn reset(&self) {
        self.binding.lock().await.sink = None;
        self.contexts.lock().await.clear();
    }

    async fn current(&self) -> StorageResult<Arc<dyn Sink>> {
        let mode = self.binding.lock().await.mode;
        self.bind(mode).await
    }

    async fn create(&self, mode: CrawlMode) -> StorageResult<Arc<dyn Sink>> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let file_dir = self
            .directory
            .join(self.platform.as_str())
            .join(self.format.as_str());

        let sink: Arc<dyn Sink> = match self.format {
            SaveFormat::Csv => Arc::new(CsvSink::new(file_dir, mode, stamp)),
            SaveFormat::Json => Arc::new(JsonSink::new(file_dir, mode, stamp)),
            SaveFormat::Sqlite => Arc::new(SqliteSink::open(&self.database_path, self.platform)?),
            SaveFormat::Mysql => {
                let url = self.database_url.as_deref().ok_or_else(|| {
                    StorageError::Unsupported("mysql output needs database-url".to_string())
                })?;
                Arc::new(MySqlSink::connect(url, self.platform).await?)
            }
        };
        tracing::debug!("Bound {} sink for {} run", self.format.as_str(), mode);
        Ok(sink)
    }

    /// Stores one item and remembers its context for later comments
    pub async fn store_content(&self, item: &Item) -> StorageResult<()> {
        self.contexts
            .lock()
            .await
            .insert(item.item_id.clone(), item.context());
        let sink = self.current().await?;
        sink.write(ContentKind::Contents, &item.to_record()).await
    }

    /// Stores one comment, enriched with its item's context when known
    pub async fn store_comment(&self, comment: &Comment) -> StorageResult<()> {
        let context = self.contexts.lock().await.get(&comment.item_id).cloned();
        let sink = self.current().await?;
        sink.write(ContentKind::Comments, &comment.to_record(context.as_ref()))
            .await
    }

    pub async fn store_creator(&self, creator: &Creator) -> StorageResult<()> {
        let sink = self.current().await?;
        sink.write(ContentKind::Creators, &creator.to_record()).await
    }

    /// Files written by the bound sink; empty when unbound or database-backed
    pub async fn paths(&self) -> Vec<PathBuf> {
        let sink = self.binding.lock().await.sink.clone();
        match sink {
            Some(sink) => sink.paths().await,
            None => Vec::new(),
        }
    }
}
