//! Reading and writing comment exports for the filter
//!
//! Works on the CSV and JSON files the storage sinks produce. Filtered
//! output goes next to the source as `<stem>_filtered.<ext>`, in the same
//! format.

use crate::filter::{CommentFilter, FilterMode};
use crate::model::Record;
use crate::storage::{cell_text, write_atomic, StorageError, StorageResult, UTF8_BOM};
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Outcome of filtering one comment file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub total: usize,
    pub kept: usize,
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Reads the records of a CSV or JSON export
///
/// CSV cells are read back as strings.
pub fn load_records(path: &Path) -> StorageResult<Vec<Record>> {
    match extension(path).as_str() {
        "json" => {
            let rows: Vec<Value> = serde_json::from_slice(&std::fs::read(path)?)?;
            Ok(rows
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect())
        }
        "csv" => {
            let bytes = std::fs::read(path)?;
            let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);
            let mut reader = csv::Reader::from_reader(body);
            let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

            let mut records = Vec::new();
            for row in reader.records() {
                let row = row?;
                records.push(
                    header
                        .iter()
                        .zip(row.iter())
                        .map(|(name, cell)| (name.clone(), Value::from(cell)))
                        .collect(),
                );
            }
            Ok(records)
        }
        other => Err(StorageError::Unsupported(format!(
            "cannot read .{} exports: {}",
            other,
            path.display()
        ))),
    }
}

/// Writes `records` to `path` in the format its extension names
pub fn write_records(path: &Path, records: &[Record]) -> StorageResult<()> {
    match extension(path).as_str() {
        "json" => {
            let rows: Vec<Value> = records.iter().cloned().map(Value::Object).collect();
            write_atomic(path, &rows)
        }
        "csv" => {
            let mut file = File::create(path)?;
            file.write_all(UTF8_BOM)?;
            let mut writer = csv::Writer::from_writer(file);
            if let Some(first) = records.first() {
                let header: Vec<&String> = first.keys().collect();
                writer.write_record(&header)?;
                for record in records {
                    let row: Vec<String> = header
                        .iter()
                        .map(|name| record.get(*name).map(cell_text).unwrap_or_default())
                        .collect();
                    writer.write_record(&row)?;
                }
            }
            writer.flush()?;
            Ok(())
        }
        other => Err(StorageError::Unsupported(format!(
            "cannot write .{} exports: {}",
            other,
            path.display()
        ))),
    }
}

/// Filters one comment export and writes the kept records beside it
///
/// # Arguments
///
/// * `path` - CSV or JSON comment file written by a run
/// * `filter` - Rules to apply
/// * `mode` - Which rule decides
pub fn filter_comment_file(
    path: &Path,
    filter: &CommentFilter,
    mode: FilterMode,
) -> StorageResult<FilterReport> {
    let records = load_records(path)?;
    let kept = filter.apply(&records, mode);

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("comments");
    let output = path.with_file_name(format!("{}_filtered.{}", stem, extension(path)));
    write_records(&output, &kept)?;

    tracing::info!(
        "Kept {}/{} comment(s) from {} ({} mode)",
        kept.len(),
        records.len(),
        path.display(),
        mode
    );
    Ok(FilterReport {
        source: path.to_path_buf(),
        output,
        total: records.len(),
        kept: kept.len(),
    })
}
