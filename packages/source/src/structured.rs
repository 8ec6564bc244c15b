//! Structured-record parsing for persisted artifacts.
//!
//! Persisted artifacts come in three shapes: listing envelopes (objects with
//! a `records` collection, or the legacy `accidents` field), merged export
//! files (arrays, or objects with a `cases` collection), and delimited
//! tables with an `index` column. Each is flattened into individual JSON
//! records, and each record is keyed by its [`SourceKey`]. Records without a
//! key are logged and dropped, never staged under a synthetic key.

use std::collections::BTreeSet;
use std::path::Path;

use accident_harvest_models::{SourceKey, SourceKind, StagingRow};
use serde_json::{Map, Value};

use crate::SourceError;

/// Name of the merged export written by [`merge_json_files`].
pub const MERGED_FILE_NAME: &str = "merged_all_cases.json";

/// Object fields that hold a source's record collection, checked in order.
#[must_use]
pub const fn collection_fields(kind: SourceKind) -> &'static [&'static str] {
    match kind {
        SourceKind::AviationSafety => &["records", "accidents"],
        SourceKind::Ntsb => &["cases"],
        SourceKind::Tabular => &[],
    }
}

/// Flattens a decoded JSON document into records.
///
/// An array contributes every element. An object contributes the elements
/// of the first present array-valued collection field, or else itself.
#[must_use]
pub fn records_from_value(value: Value, collection_fields: &[&str]) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut object) => {
            let field = collection_fields
                .iter()
                .find(|field| object.get(**field).is_some_and(Value::is_array));

            match field.and_then(|field| object.remove(*field)) {
                Some(Value::Array(items)) => items,
                _ => vec![Value::Object(object)],
            }
        }
        other => vec![other],
    }
}

fn key_from_value(value: &Value) -> Option<SourceKey> {
    match value {
        Value::String(s) => SourceKey::new(s),
        Value::Number(n) => SourceKey::new(&n.to_string()),
        _ => None,
    }
}

/// Extracts the record's key within its source.
///
/// * listing records: last path segment of `url`
/// * export records: `cm_ntsbNum`
/// * tabular rows: `index`
#[must_use]
pub fn source_key(kind: SourceKind, record: &Value) -> Option<SourceKey> {
    match kind {
        SourceKind::AviationSafety => record
            .get("url")
            .and_then(Value::as_str)
            .and_then(SourceKey::from_url),
        SourceKind::Ntsb => record.get("cm_ntsbNum").and_then(key_from_value),
        SourceKind::Tabular => record.get("index").and_then(key_from_value),
    }
}

/// Keys every record, dropping (and logging) the ones without a key.
#[must_use]
pub fn staging_rows(kind: SourceKind, records: Vec<Value>) -> Vec<StagingRow> {
    let mut rows = Vec::with_capacity(records.len());
    let mut missing = 0_usize;

    for (i, record) in records.into_iter().enumerate() {
        let Some(source_key) = source_key(kind, &record) else {
            log::warn!("{kind}: dropping record {i}, no source key");
            missing += 1;
            continue;
        };

        rows.push(StagingRow {
            source_key,
            origin: kind,
            raw_payload: record,
        });
    }

    if missing > 0 {
        log::warn!("{kind}: {missing} records dropped for a missing source key");
    }

    rows
}

/// Reads a JSON artifact and flattens it into records.
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be read or is not valid JSON.
pub fn read_json_records(path: &Path, kind: SourceKind) -> Result<Vec<Value>, SourceError> {
    let bytes = std::fs::read(path).map_err(|e| SourceError::io(path, e))?;
    let value: Value = serde_json::from_slice(&bytes)?;

    Ok(records_from_value(value, collection_fields(kind)))
}

/// Reads a delimited file with a header row into one JSON object of
/// strings per row.
///
/// # Errors
///
/// Returns [`SourceError::Csv`] if the file cannot be read or parsed.
pub fn read_csv_records(path: &Path) -> Result<Vec<Value>, SourceError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let object: Map<String, Value> = headers
            .iter()
            .zip(row.iter())
            .map(|(header, value)| (header.to_owned(), Value::String(value.to_owned())))
            .collect();
        records.push(Value::Object(object));
    }

    Ok(records)
}

/// Reads a source file into keyed staging rows.
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be read or parsed.
pub fn read_staging_rows(path: &Path, kind: SourceKind) -> Result<Vec<StagingRow>, SourceError> {
    let records = match kind {
        SourceKind::Tabular => read_csv_records(path)?,
        SourceKind::AviationSafety | SourceKind::Ntsb => read_json_records(path, kind)?,
    };

    log::info!("{kind}: read {} records from {}", records.len(), path.display());
    Ok(staging_rows(kind, records))
}

/// Totals from a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Files merged.
    pub files: usize,
    /// Files that could not be read.
    pub failed: usize,
    /// Records in the merged output.
    pub records: usize,
}

/// Merges every `*.json` file with `cases` in its name under `dir` (sorted
/// by name) into a single array written to `output`. Unreadable files are
/// logged and skipped.
///
/// # Errors
///
/// Returns [`SourceError`] if `dir` cannot be listed or `output` cannot be
/// written.
pub fn merge_json_files(dir: &Path, output: &Path) -> Result<MergeReport, SourceError> {
    let entries = std::fs::read_dir(dir).map_err(|e| SourceError::io(dir, e))?;

    let files: BTreeSet<_> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.as_path() != output)
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.contains("cases") && name != MERGED_FILE_NAME)
        })
        .collect();

    log::info!("Found {} JSON files to merge", files.len());

    let mut report = MergeReport::default();
    let mut merged = Vec::new();

    for path in &files {
        match read_json_records(path, SourceKind::Ntsb) {
            Ok(records) => {
                log::debug!("{}: {} records", path.display(), records.len());
                merged.extend(records);
                report.files += 1;
            }
            Err(e) => {
                log::warn!("Skipping {}: {e}", path.display());
                report.failed += 1;
            }
        }
    }

    report.records = merged.len();

    let bytes = serde_json::to_vec_pretty(&merged)?;
    std::fs::write(output, bytes).map_err(|e| SourceError::io(output, e))?;

    log::info!(
        "Merged {} records from {} files into {}",
        report.records,
        report.files,
        output.display()
    );

    Ok(report)
}
