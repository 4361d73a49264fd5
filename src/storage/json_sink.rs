//! Structured-document backend
//!
//! Each content kind is one JSON array. The array is kept in memory and the
//! whole document is rewritten through a temporary file and a rename after
//! every append, so a crash leaves the previous complete document behind.

use crate::model::{CrawlMode, Record};
use crate::storage::columns::ordered_fields;
use crate::storage::traits::{ContentKind, Sink, StorageResult};
use crate::storage::unique_path;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

struct JsonFile {
    path: PathBuf,
    rows: Vec<Value>,
}

/// Append-only JSON sink
pub struct JsonSink {
    dir: PathBuf,
    mode: CrawlMode,
    stamp: String,
    files: Mutex<HashMap<ContentKind, JsonFile>>,
}

impl JsonSink {
    pub fn new(dir: PathBuf, mode: CrawlMode, stamp: impl Into<String>) -> Self {
        Self {
            dir,
            mode,
            stamp: stamp.into(),
            files: Mutex::new(HashMap::new()),
        }
    }
}

pub(crate) fn write_atomic(path: &Path, rows: &[Value]) -> StorageResult<()> {
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(rows)?;
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl Sink for JsonSink {
    async fn write(&self, kind: ContentKind, record: &Record) -> StorageResult<()> {
        let ordered: Map<String, Value> = ordered_fields(record, kind)
            .into_iter()
            .filter_map(|field| record.get(&field).cloned().map(|v| (field, v)))
            .collect();

        let mut files = self.files.lock().await;
        if !files.contains_key(&kind) {
            std::fs::create_dir_all(&self.dir)?;
            let stem = format!("{}_{}_{}", self.mode, kind.as_str(), self.stamp);
            let path = unique_path(&self.dir, &stem, "json");
            tracing::info!("Writing {} to {}", kind.as_str(), path.display());
            files.insert(
                kind,
                JsonFile {
                    path,
                    rows: Vec::new(),
                },
            );
        }
        let Some(file) = files.get_mut(&kind) else {
            return Ok(());
        };

        file.rows.push(Value::Object(ordered));
        write_atomic(&file.path, &file.rows)
    }

    async fn paths(&self) -> Vec<PathBuf> {
        let files = self.files.lock().await;
        let mut paths: Vec<PathBuf> = files.values().map(|f| f.path.clone()).collect();
        paths.sort();
        paths
    }
}
