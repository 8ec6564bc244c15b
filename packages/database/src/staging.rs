//! Staging tables, one per source.
//!
//! Every table holds the record's key within its source plus the original
//! record serialized as JSON text. A source's batch is loaded inside its own
//! transaction: either every new row of the batch is committed or none is.
//! Batches of different sources are independent of each other.

use std::collections::BTreeSet;
use std::path::Path;

use accident_harvest_models::{SourceKind, StagingRow};
use duckdb::Connection;

use crate::DbError;

/// Number of rows per INSERT chunk.
const CHUNK_SIZE: usize = 1_000;

/// Opens (or creates) the staging database and ensures the schema exists.
///
/// # Errors
///
/// Returns [`DbError`] if the directory, connection, or schema creation
/// fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    crate::paths::ensure_parent(path)?;

    let conn = Connection::open(path)?;
    create_schema(&conn)?;

    log::debug!("Opened staging database {}", path.display());
    Ok(conn)
}

/// Creates every staging table that does not exist yet.
///
/// # Errors
///
/// Returns [`DbError`] if a statement fails.
pub fn create_schema(conn: &Connection) -> Result<(), DbError> {
    let ddl: String = SourceKind::ALL
        .iter()
        .map(|kind| {
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    source_unique_id TEXT NOT NULL PRIMARY KEY,
                    {payload} TEXT NOT NULL,
                    loaded_at TIMESTAMP NOT NULL DEFAULT current_timestamp
                );\n",
                table = kind.staging_table(),
                payload = kind.payload_column(),
            )
        })
        .collect();

    conn.execute_batch(&ddl)?;
    Ok(())
}

/// Returns the number of rows staged for a source.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn row_count(conn: &Connection, kind: SourceKind) -> Result<u64, DbError> {
    let mut stmt = conn.prepare(&format!("SELECT COUNT(*) FROM {}", kind.staging_table()))?;
    let count: i64 = stmt.query_row([], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Returns the raw payload staged under a key, if any.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn raw_payload(
    conn: &Connection,
    kind: SourceKind,
    source_key: &str,
) -> Result<Option<String>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {} WHERE source_unique_id = ?",
        kind.payload_column(),
        kind.staging_table()
    ))?;

    match stmt.query_row([source_key], |row| row.get(0)) {
        Ok(payload) => Ok(Some(payload)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DbError::DuckDb(e)),
    }
}

/// Result of loading one source's batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub kind: SourceKind,
    /// Rows handed to the loader.
    pub offered: usize,
    /// Rows dropped because an earlier row in the same batch had the same key.
    pub duplicates_in_batch: usize,
    /// Rows actually added to the table.
    pub inserted: u64,
}

/// Loads one source's rows into its staging table.
///
/// Keys already present in the table, and repeated keys within the batch
/// after their first occurrence, are ignored. Rows whose origin is not
/// `kind` are skipped with a warning. The batch runs in a single
/// transaction that is rolled back if any statement fails.
///
/// # Errors
///
/// Returns [`DbError`] if a payload cannot be serialized or any database
/// operation fails. Nothing from this batch is committed in that case.
pub fn load_source(
    conn: &mut Connection,
    kind: SourceKind,
    rows: &[StagingRow],
) -> Result<LoadReport, DbError> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut batch: Vec<(&str, String)> = Vec::with_capacity(rows.len());
    let mut duplicates_in_batch = 0;

    for row in rows {
        if row.origin != kind {
            log::warn!(
                "Skipping {} row {} offered to {kind}",
                row.origin,
                row.source_key
            );
            continue;
        }

        if !seen.insert(row.source_key.as_str()) {
            duplicates_in_batch += 1;
            continue;
        }

        batch.push((row.source_key.as_str(), serde_json::to_string(&row.raw_payload)?));
    }

    if duplicates_in_batch > 0 {
        log::info!(
            "{kind}: {duplicates_in_batch} duplicate keys within the batch, \
             keeping first occurrence"
        );
    }

    let tx = conn.transaction()?;
    let before = row_count(&tx, kind)?;

    for chunk in batch.chunks(CHUNK_SIZE) {
        let mut sql = format!(
            "INSERT INTO {} (source_unique_id, {}) VALUES ",
            kind.staging_table(),
            kind.payload_column()
        );

        for i in 0..chunk.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str("(?, ?)");
        }
        sql.push_str(" ON CONFLICT (source_unique_id) DO NOTHING");

        let mut stmt = tx.prepare(&sql)?;
        let mut param_idx = 1_usize;

        for (key, payload) in chunk {
            stmt.raw_bind_parameter(param_idx, *key)?;
            stmt.raw_bind_parameter(param_idx + 1, payload.as_str())?;
            param_idx += 2;
        }

        stmt.raw_execute()?;
    }

    let after = row_count(&tx, kind)?;
    tx.commit()?;

    let report = LoadReport {
        kind,
        offered: rows.len(),
        duplicates_in_batch,
        inserted: after.saturating_sub(before),
    };

    log::info!(
        "Loaded {} new rows into {} ({} offered)",
        report.inserted,
        kind.staging_table(),
        report.offered
    );

    Ok(report)
}
