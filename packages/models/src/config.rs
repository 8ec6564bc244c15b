//! Harvest configuration.
//!
//! Every value has a default so an empty TOML document is a valid
//! configuration. Loading, environment overrides and validation live in
//! the ingest crate.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Which persisted unit a source uses to decide that work is already done.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResumeGranularity {
    /// Existing artifacts are ignored and overwritten.
    Off,
    /// A whole run (one year) is skipped when its artifact exists.
    #[default]
    Run,
    /// Each window (listing page or export month) is skipped when its
    /// artifact exists.
    Window,
}

/// Bounds for the randomized pause applied before every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    pub min_ms: u64,
    pub max_ms: u64,
    /// Chance of adding an extra long pause, in `[0, 1]`.
    pub long_pause_probability: f64,
    pub long_pause_min_ms: u64,
    pub long_pause_max_ms: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            min_ms: 200,
            max_ms: 500,
            long_pause_probability: 0.1,
            long_pause_min_ms: 1_000,
            long_pause_max_ms: 1_000,
        }
    }
}

impl DelayConfig {
    /// A policy that never sleeps.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            min_ms: 0,
            max_ms: 0,
            long_pause_probability: 0.0,
            long_pause_min_ms: 0,
            long_pause_max_ms: 0,
        }
    }
}

/// Bounds for the cool-down between top-level runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoolDownConfig {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for CoolDownConfig {
    fn default() -> Self {
        Self {
            min_ms: 10_000,
            max_ms: 20_000,
        }
    }
}

/// Settings for the HTML listing source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSourceConfig {
    pub base_url: String,
    /// Path template with `{year}` and `{page}` placeholders.
    pub listing_path: String,
    /// Substring identifying links to detail pages.
    pub detail_marker: String,
    pub start_year: i32,
    pub end_year: i32,
    pub timeout_secs: u64,
    pub resume: ResumeGranularity,
}

impl Default for ListingSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://aviation-safety.net".to_owned(),
            listing_path: "/asndb/year/{year}/{page}".to_owned(),
            detail_marker: "/wikibase/".to_owned(),
            start_year: 2010,
            end_year: 2010,
            timeout_secs: 30,
            resume: ResumeGranularity::Run,
        }
    }
}

/// Settings for the monthly archive export source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSourceConfig {
    pub export_url: String,
    pub origin: String,
    /// Referer template with `{year}` and `{month}` placeholders.
    pub referer_template: String,
    pub start_year: i32,
    pub end_year: i32,
    pub session_id: u64,
    pub result_set_size: u32,
    /// Investigation mode every query is restricted to.
    pub mode: String,
    pub timeout_secs: u64,
    pub resume: ResumeGranularity,
}

impl Default for ArchiveSourceConfig {
    fn default() -> Self {
        Self {
            export_url: "https://data.ntsb.gov/carol-main-public/api/Query/FileExport".to_owned(),
            origin: "https://data.ntsb.gov".to_owned(),
            referer_template:
                "https://data.ntsb.gov/carol-main-public/query-builder?month={month}&year={year}"
                    .to_owned(),
            start_year: 2010,
            end_year: 2025,
            session_id: 227_230,
            result_set_size: 500,
            mode: "Aviation".to_owned(),
            timeout_secs: 60,
            resume: ResumeGranularity::Window,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Directory holding every persisted artifact.
    pub output_dir: PathBuf,
    /// Upstream proxy applied to every request.
    pub proxy: Option<String>,
    /// `DuckDB` file the staging loader writes to.
    pub database_path: PathBuf,
    pub delay: DelayConfig,
    pub cool_down: CoolDownConfig,
    pub aviation_safety: ListingSourceConfig,
    pub ntsb: ArchiveSourceConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
            proxy: None,
            database_path: PathBuf::from("data/staging.duckdb"),
            delay: DelayConfig::default(),
            cool_down: CoolDownConfig::default(),
            aviation_safety: ListingSourceConfig::default(),
            ntsb: ArchiveSourceConfig::default(),
        }
    }
}
