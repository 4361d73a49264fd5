//! Delimited-text backend
//!
//! One CSV file per content kind, created on the first write of that kind.
//! The header is taken from the first record's ordered fields; later records
//! are projected onto that header so rows never shift.

use crate::model::{CrawlMode, Record};
use crate::storage::columns::ordered_fields;
use crate::storage::traits::{ContentKind, Sink, StorageResult};
use crate::storage::{cell_text, unique_path};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::Mutex;

pub(crate) const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

struct CsvFile {
    path: PathBuf,
    header: Vec<String>,
    writer: csv::Writer<File>,
}

/// Append-only CSV sink
pub struct CsvSink {
    dir: PathBuf,
    mode: CrawlMode,
    stamp: String,
    files: Mutex<HashMap<ContentKind, CsvFile>>,
}

impl CsvSink {
    /// Creates a sink writing under `dir`
    ///
    /// # Arguments
    ///
    /// * `dir` - Directory the files are created in
    /// * `mode` - Crawl mode, part of every file name
    /// * `stamp` - Run timestamp, part of every file name
    pub fn new(dir: PathBuf, mode: CrawlMode, stamp: impl Into<String>) -> Self {
        Self {
            dir,
            mode,
            stamp: stamp.into(),
            files: Mutex::new(HashMap::new()),
        }
    }

    fn open(&self, kind: ContentKind, record: &Record) -> StorageResult<CsvFile> {
        std::fs::create_dir_all(&self.dir)?;
        let stem = format!("{}_{}_{}", self.mode, kind.as_str(), self.stamp);
        let path = unique_path(&self.dir, &stem, "csv");

        let mut file = File::create(&path)?;
        file.write_all(UTF8_BOM)?;

        let header = ordered_fields(record, kind);
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(&header)?;
        writer.flush()?;

        tracing::info!("Writing {} to {}", kind.as_str(), path.display());
        Ok(CsvFile {
            path,
            header,
            writer,
        })
    }
}

#[async_trait]
impl Sink for CsvSink {
    async fn write(&self, kind: ContentKind, record: &Record) -> StorageResult<()> {
        let mut files = self.files.lock().await;
        if !files.contains_key(&kind) {
            let file = self.open(kind, record)?;
            files.insert(kind, file);
        }
        let Some(file) = files.get_mut(&kind) else {
            return Ok(());
        };

        let row: Vec<String> = file
            .header
            .iter()
            .map(|column| record.get(column).map(cell_text).unwrap_or_default())
            .collect();
        file.writer.write_record(&row)?;
        file.writer.flush()?;
        Ok(())
    }

    async fn paths(&self) -> Vec<PathBuf> {
        let files = self.files.lock().await;
        let mut paths: Vec<PathBuf> = files.values().map(|f| f.path.clone()).collect();
        paths.sort();
        paths
    }
}
