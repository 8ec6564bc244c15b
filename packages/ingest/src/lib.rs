#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Orchestration of harvesting sessions and staging loads.
//!
//! Each public function here backs one CLI subcommand. Sessions build their
//! fetcher, pacer and artifact store from a validated [`HarvestConfig`], run
//! the source's driver, and log a summary.

pub mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use accident_harvest_database::{DbError, paths, staging};
use accident_harvest_models::config::HarvestConfig;
use accident_harvest_models::{RunOutcome, SourceKind};
use accident_harvest_scraper::{HttpFetcher, Pacer, ScrapeError};
use accident_harvest_source::SourceError;
use accident_harvest_source::archive::{ExtractReport, extract_archives};
use accident_harvest_source::aviation_safety::{ListingHarvester, YearReport, YearStatus};
use accident_harvest_source::ntsb::{ExportHarvester, ExportReport};
use accident_harvest_source::progress::ProgressCallback;
use accident_harvest_source::resume::ArtifactStore;
use accident_harvest_source::structured::{MergeReport, merge_json_files, read_staging_rows};
use chrono::NaiveDate;
use duckdb::Connection;

use crate::config::ConfigError;

/// Errors that can end a session.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn pacer(config: &HarvestConfig) -> Pacer {
    Pacer::new(config.delay.clone(), config.cool_down.clone())
}

/// Harvests every configured listing year into `asn_{year}.json`
/// envelopes under the output directory.
///
/// # Errors
///
/// Returns [`IngestError::Scrape`] if the HTTP client cannot be built.
/// Failures within a year are reported in its [`YearReport`] instead.
pub async fn harvest_aviation_safety(
    config: &HarvestConfig,
    progress: Arc<dyn ProgressCallback>,
) -> Result<Vec<YearReport>, IngestError> {
    let source = &config.aviation_safety;
    let fetcher = HttpFetcher::new(
        Duration::from_secs(source.timeout_secs),
        config.proxy.as_deref(),
    )?;

    log::info!(
        "Harvesting listing years {}..={} into {} (resume: {})",
        source.start_year,
        source.end_year,
        config.output_dir.display(),
        source.resume
    );

    let mut harvester = ListingHarvester::new(
        fetcher,
        pacer(config),
        ArtifactStore::new(&config.output_dir),
        source.clone(),
        progress,
    );

    let reports = harvester.harvest_years().await;
    log_year_summary(&reports);
    Ok(reports)
}

fn log_year_summary(reports: &[YearReport]) {
    let mut records = 0;
    let mut dropped = 0;
    let mut aborted = 0;
    let mut skipped = 0;

    for report in reports {
        records += report.records;
        dropped += report.dropped;

        match &report.status {
            YearStatus::AlreadyHarvested => skipped += 1,
            YearStatus::Finished(RunOutcome::EndOfRun) => {}
            YearStatus::Finished(RunOutcome::Aborted { window, reason }) => {
                aborted += 1;
                log::warn!("Year {} aborted at {window}: {reason}", report.year);
            }
        }
    }

    log::info!(
        "Listing harvest done: {} years ({skipped} already harvested, {aborted} aborted), \
         {records} records, {dropped} details dropped",
        reports.len()
    );
}

/// Downloads every configured month up to `today` as
/// `ntsb_{year}_{mm}.zip` under the output directory.
///
/// # Errors
///
/// Returns [`IngestError::Scrape`] if the HTTP client cannot be built.
/// Failed months are reported in the [`ExportReport`] instead.
pub async fn harvest_ntsb(
    config: &HarvestConfig,
    today: NaiveDate,
    progress: Arc<dyn ProgressCallback>,
) -> Result<ExportReport, IngestError> {
    let source = &config.ntsb;
    let fetcher = HttpFetcher::new(
        Duration::from_secs(source.timeout_secs),
        config.proxy.as_deref(),
    )?;

    log::info!(
        "Exporting months {}-01..={}-12 into {} (resume: {})",
        source.start_year,
        source.end_year,
        config.output_dir.display(),
        source.resume
    );

    let mut harvester = ExportHarvester::new(
        fetcher,
        pacer(config),
        ArtifactStore::new(&config.output_dir),
        source.clone(),
        progress,
    );

    let report = harvester.harvest(today).await;

    log::info!(
        "Export done: {} months, {} skipped, {} downloaded, {} failed",
        report.total(),
        report.skipped(),
        report.downloaded(),
        report.failed()
    );

    Ok(report)
}

/// Unpacks the downloaded monthly archives into the extracted directory.
///
/// # Errors
///
/// Returns [`IngestError::Source`] if the output directory cannot be read.
pub fn extract(config: &HarvestConfig) -> Result<ExtractReport, IngestError> {
    let out_dir = paths::extracted_dir(&config.output_dir);
    Ok(extract_archives(&config.output_dir, &out_dir)?)
}

/// Merges the extracted case files into `merged_all_cases.json`.
///
/// # Errors
///
/// Returns [`IngestError::Source`] if the extracted directory cannot be read
/// or the merged file cannot be written.
pub fn merge(config: &HarvestConfig) -> Result<MergeReport, IngestError> {
    let dir = paths::extracted_dir(&config.output_dir);
    Ok(merge_json_files(&dir, &paths::merged_cases_path(&config.output_dir))?)
}

/// Files to load, grouped by source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadInputs {
    pub aviation_safety: Vec<PathBuf>,
    pub ntsb: Vec<PathBuf>,
    pub tabular: Vec<PathBuf>,
}

impl LoadInputs {
    #[must_use]
    pub fn files(&self, kind: SourceKind) -> &[PathBuf] {
        match kind {
            SourceKind::AviationSafety => &self.aviation_safety,
            SourceKind::Ntsb => &self.ntsb,
            SourceKind::Tabular => &self.tabular,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        SourceKind::ALL.iter().all(|kind| self.files(*kind).is_empty())
    }
}

/// Whether `name` is a listing envelope (`asn_{year}.json` or
/// `asn_{year}.partial.json`). Page checkpoints are excluded; their records
/// also end up in the envelope.
fn is_listing_envelope(name: &str) -> bool {
    let Some(stem) = name
        .strip_prefix("asn_")
        .and_then(|rest| rest.strip_suffix(".json"))
    else {
        return false;
    };
    let year = stem.strip_suffix(".partial").unwrap_or(stem);

    !year.is_empty() && year.chars().all(|c| c.is_ascii_digit())
}

/// Collects the artifacts a previous harvest left in the output directory:
/// every listing envelope, and the merged export if it exists.
///
/// # Errors
///
/// Returns [`IngestError::Source`] if the output directory exists but
/// cannot be read.
pub fn default_load_inputs(config: &HarvestConfig) -> Result<LoadInputs, IngestError> {
    let dir = &config.output_dir;
    let mut inputs = LoadInputs::default();

    if dir.is_dir() {
        let entries = std::fs::read_dir(dir).map_err(|source| SourceError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        inputs.aviation_safety = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(is_listing_envelope)
            })
            .collect();
        inputs.aviation_safety.sort();
    }

    let merged = paths::merged_cases_path(dir);
    if merged.is_file() {
        inputs.ntsb.push(merged);
    }

    Ok(inputs)
}

/// Outcome of loading one source.
#[derive(Debug)]
pub struct SourceLoad {
    pub kind: SourceKind,
    pub files: Vec<PathBuf>,
    /// Files that could not be read or parsed and were left out.
    pub skipped_files: Vec<PathBuf>,
    /// An error only when no file could be read or the load itself failed.
    pub result: Result<staging::LoadReport, IngestError>,
}

fn load_one(conn: &mut Connection, kind: SourceKind, files: &[PathBuf]) -> SourceLoad {
    let mut rows = Vec::new();
    let mut skipped_files = Vec::new();
    let mut first_error = None;

    for path in files {
        match read_staging_rows(path, kind) {
            Ok(file_rows) => rows.extend(file_rows),
            Err(e) => {
                log::warn!("{kind}: skipping {}: {e}", path.display());
                skipped_files.push(path.clone());
                first_error.get_or_insert(e);
            }
        }
    }

    let result = match first_error {
        Some(e) if skipped_files.len() == files.len() => Err(IngestError::Source(e)),
        _ => staging::load_source(conn, kind, &rows).map_err(IngestError::from),
    };

    SourceLoad {
        kind,
        files: files.to_vec(),
        skipped_files,
        result,
    }
}

/// Loads every source that has input files. Each source is loaded in its
/// own transaction; a failing source is logged and the others still load.
/// Within a source, an unreadable file is skipped and the rows of the
/// remaining files are still loaded.
pub fn load_staging(conn: &mut Connection, inputs: &LoadInputs) -> Vec<SourceLoad> {
    let mut loads = Vec::new();

    for kind in SourceKind::ALL.iter().copied() {
        let files = inputs.files(kind);
        if files.is_empty() {
            log::debug!("{kind}: nothing to load");
            continue;
        }

        let load = load_one(conn, kind, files);
        if let Err(e) = &load.result {
            log::error!("{kind}: load failed, nothing staged: {e}");
        }

        loads.push(load);
    }

    log_load_summary(conn, &loads);
    loads
}

fn log_load_summary(conn: &Connection, loads: &[SourceLoad]) {
    for load in loads {
        let total = staging::row_count(conn, load.kind)
            .map_or_else(|e| format!("unknown ({e})"), |n| n.to_string());

        match &load.result {
            Ok(report) => log::info!(
                "{}: +{} rows ({} offered, {} duplicate in batch, {} files skipped), \
                 {total} total",
                load.kind.staging_table(),
                report.inserted,
                report.offered,
                report.duplicates_in_batch,
                load.skipped_files.len()
            ),
            Err(_) => log::info!("{}: failed, {total} total", load.kind.staging_table()),
        }
    }
}

/// Opens the staging database at the configured path and loads `inputs`.
///
/// # Errors
///
/// Returns [`IngestError::Db`] if the database cannot be opened. Per-source
/// failures are returned inside the [`SourceLoad`] entries.
pub fn load(config: &HarvestConfig, inputs: &LoadInputs) -> Result<Vec<SourceLoad>, IngestError> {
    let mut conn = staging::open(&config.database_path)?;
    Ok(load_staging(&mut conn, inputs))
}
