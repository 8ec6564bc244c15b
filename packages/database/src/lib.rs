#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! `DuckDB` staging store for harvested accident records.
//!
//! Each source loads into its own staging table keyed by
//! `source_unique_id`. Loads are insert-or-ignore: a key that is already
//! present is never updated, so the first write wins.

pub mod paths;
pub mod staging;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error (e.g., creating the database directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A raw payload could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
