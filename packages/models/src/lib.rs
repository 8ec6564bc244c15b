#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data types for the accident harvesting pipeline.
//!
//! A harvest is described as a sequence of [`HarvestWindow`]s. Each window is
//! fetched into a [`RawPage`], parsed into zero or more
//! [`NormalizedRecord`]s, persisted per [`HarvestRun`] as an intermediate
//! artifact, and finally loaded as [`StagingRow`]s keyed by [`SourceKey`].

pub mod config;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The external source a record was harvested from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceKind {
    /// HTML-paginated public accident listing (Aviation Safety Network).
    AviationSafety,
    /// JSON-API-backed government archive (NTSB CAROL export).
    Ntsb,
    /// Delimited tabular file with an `index` column.
    Tabular,
}

impl SourceKind {
    /// Every source, in staging load order.
    pub const ALL: &[Self] = &[Self::AviationSafety, Self::Ntsb, Self::Tabular];

    /// Name of the staging table this source loads into.
    #[must_use]
    pub const fn staging_table(self) -> &'static str {
        match self {
            Self::AviationSafety => "stg_source1_aviation_safety",
            Self::Ntsb => "stg_source2_ntsb",
            Self::Tabular => "stg_source3_csv",
        }
    }

    /// Name of the raw payload column in this source's staging table.
    #[must_use]
    pub const fn payload_column(self) -> &'static str {
        match self {
            Self::AviationSafety | Self::Ntsb => "raw_json",
            Self::Tabular => "raw_data",
        }
    }
}

/// One unit of pagination work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HarvestWindow {
    /// A page of the year listing (pages start at 1).
    ListingPage {
        /// Calendar year of the listing.
        year: i32,
        /// 1-based page number.
        page: u32,
    },
    /// One calendar month of the archive export.
    Month {
        /// Calendar year.
        year: i32,
        /// Month of the year, 1 through 12.
        month: u32,
    },
}

impl HarvestWindow {
    /// Calendar year this window belongs to.
    #[must_use]
    pub const fn year(&self) -> i32 {
        match self {
            Self::ListingPage { year, .. } | Self::Month { year, .. } => *year,
        }
    }
}

impl fmt::Display for HarvestWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ListingPage { year, page } => write!(f, "{year} page {page}"),
            Self::Month { year, month } => write!(f, "{year}-{month:02}"),
        }
    }
}

/// Classification of a single HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 2xx response with its body.
    Ok(Vec<u8>),
    /// HTTP 404. For the listing source this means "no more pages".
    NotFound,
    /// Non-2xx status, timeout, or connection failure.
    Transient(String),
    /// The response could not be interpreted at all.
    Fatal(String),
}

/// The body returned for a window plus its outcome tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    /// URL that was requested.
    pub url: String,
    /// Outcome of the request.
    pub outcome: FetchOutcome,
}

impl RawPage {
    #[must_use]
    pub fn ok(url: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.to_owned(),
            outcome: FetchOutcome::Ok(body.into()),
        }
    }

    #[must_use]
    pub fn not_found(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            outcome: FetchOutcome::NotFound,
        }
    }

    #[must_use]
    pub fn transient(url: &str, reason: impl Into<String>) -> Self {
        Self {
            url: url.to_owned(),
            outcome: FetchOutcome::Transient(reason.into()),
        }
    }

    #[must_use]
    pub fn fatal(url: &str, reason: impl Into<String>) -> Self {
        Self {
            url: url.to_owned(),
            outcome: FetchOutcome::Fatal(reason.into()),
        }
    }

    /// Returns the body decoded as (lossy) UTF-8 when the fetch succeeded.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        match &self.outcome {
            FetchOutcome::Ok(body) => Some(String::from_utf8_lossy(body).into_owned()),
            _ => None,
        }
    }
}

/// Identifier of a record within its origin source. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceKey(String);

impl SourceKey {
    /// Builds a key from a raw value. Returns `None` when the trimmed value
    /// is empty.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_owned()))
        }
    }

    /// Derives a key from the last non-empty path segment of a URL, ignoring
    /// any query string or fragment.
    ///
    /// ```
    /// use accident_harvest_models::SourceKey;
    ///
    /// let key = SourceKey::from_url("https://aviation-safety.net/wikibase/301234").unwrap();
    /// assert_eq!(key.as_str(), "301234");
    /// ```
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        let without_fragment = url.split('#').next().unwrap_or(url);
        let path = without_fragment.split('?').next().unwrap_or(without_fragment);
        let path = path.split_once("://").map_or(path, |(_, rest)| {
            rest.split_once('/').map_or("", |(_, p)| p)
        });

        path.split('/')
            .rev()
            .find(|segment| !segment.trim().is_empty())
            .and_then(Self::new)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SourceKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value).ok_or_else(|| "source key must not be empty".to_owned())
    }
}

impl From<SourceKey> for String {
    fn from(value: SourceKey) -> Self {
        value.0
    }
}

/// A named field of a normalized accident record.
///
/// The serialized names match the keys downstream reconciliation expects,
/// which is why the aircraft type is stored under `type`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FieldTag {
    Date,
    Time,
    #[serde(rename = "type")]
    #[strum(serialize = "type")]
    AircraftType,
    OwnerOperator,
    Registration,
    Msn,
    YearOfManufacture,
    Fatalities,
    AircraftDamage,
    Location,
    Phase,
    Nature,
    DepartureAirport,
    DestinationAirport,
    ConfidenceRating,
    Narrative,
}

/// A record normalized from a source-specific shape.
///
/// Fields that the source page did not provide are absent from
/// [`fields`](Self::fields); an empty value is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// URL of the page the record was parsed from.
    pub url: String,
    /// Unique identifier within the origin source.
    pub source_key: SourceKey,
    /// Populated fields.
    #[serde(flatten)]
    pub fields: BTreeMap<FieldTag, String>,
    /// Citation targets, in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl NormalizedRecord {
    #[must_use]
    pub fn new(url: &str, source_key: SourceKey) -> Self {
        Self {
            url: url.to_owned(),
            source_key,
            fields: BTreeMap::new(),
            sources: Vec::new(),
        }
    }

    /// Stores a field value. Values that are empty after trimming are
    /// ignored so that absent data never looks like real data.
    pub fn set(&mut self, tag: FieldTag, value: &str) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            self.fields.insert(tag, trimmed.to_owned());
        }
    }

    #[must_use]
    pub fn get(&self, tag: FieldTag) -> Option<&str> {
        self.fields.get(&tag).map(String::as_str)
    }
}

/// How a harvesting run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The source signalled the end of the data set.
    EndOfRun,
    /// A window failed and the remainder of the run was abandoned.
    Aborted {
        /// The window that failed.
        window: HarvestWindow,
        /// Why it failed.
        reason: String,
    },
}

/// The top-level unit of harvesting work (e.g. one listing year).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestRun {
    /// Deterministic identifier of the run (e.g. `"2010"`).
    pub identifier: String,
    /// Windows visited so far, in visiting order.
    pub visited: Vec<HarvestWindow>,
    /// Records accumulated across all visited windows.
    pub records: Vec<NormalizedRecord>,
}

impl HarvestRun {
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            visited: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Registers a window as visited. Returns `false` (and records nothing)
    /// if the window does not strictly follow the last visited one.
    pub fn visit(&mut self, window: HarvestWindow) -> bool {
        if self.visited.last().is_some_and(|last| *last >= window) {
            return false;
        }
        self.visited.push(window);
        true
    }
}

/// The persisted artifact of one listing-source run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestEnvelope {
    pub run_identifier: String,
    pub total_records: usize,
    pub generated_at: DateTime<Utc>,
    pub records: Vec<NormalizedRecord>,
}

impl HarvestEnvelope {
    #[must_use]
    pub fn new(run_identifier: &str, records: Vec<NormalizedRecord>) -> Self {
        Self {
            run_identifier: run_identifier.to_owned(),
            total_records: records.len(),
            generated_at: Utc::now(),
            records,
        }
    }
}

/// The persisted representation of one staged record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRow {
    pub source_key: SourceKey,
    pub origin: SourceKind,
    /// The original record, verbatim.
    pub raw_payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_source_kind_is_listed_once_and_round_trips_its_name() {
        for kind in SourceKind::ALL {
            assert_eq!(kind.to_string().parse::<SourceKind>().unwrap(), *kind);
        }

        let mut unique = SourceKind::ALL.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
        assert_eq!("type".parse::<FieldTag>().unwrap(), FieldTag::AircraftType);
    }

    #[test]
    fn source_key_rejects_blank_values() {
        assert!(SourceKey::new("   ").is_none());
        assert_eq!(SourceKey::new(" WPR26LA036 ").unwrap().as_str(), "WPR26LA036");
    }

    #[test]
    fn source_key_from_url_ignores_trailing_slash_and_query() {
        let key = SourceKey::from_url("https://aviation-safety.net/wikibase/12345/?lang=en#top");
        assert_eq!(key.unwrap().as_str(), "12345");
    }

    #[test]
    fn source_key_from_url_without_path_is_none() {
        assert!(SourceKey::from_url("https://aviation-safety.net/").is_none());
        assert!(SourceKey::from_url("https://aviation-safety.net").is_none());
    }

    #[test]
    fn record_set_skips_empty_values() {
        let mut record =
            NormalizedRecord::new("https://x/wikibase/1", SourceKey::new("1").unwrap());
        record.set(FieldTag::Time, "   ");
        record.set(FieldTag::Date, " Monday 4 January 2010 ");
        assert_eq!(record.get(FieldTag::Time), None);
        assert_eq!(record.get(FieldTag::Date), Some("Monday 4 January 2010"));
    }

    #[test]
    fn record_serializes_fields_flat() {
        let mut record =
            NormalizedRecord::new("https://x/wikibase/7", SourceKey::new("7").unwrap());
        record.set(FieldTag::AircraftType, "Cessna 172");
        record.set(FieldTag::OwnerOperator, "private");

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "Cessna 172");
        assert_eq!(value["owner_operator"], "private");
        assert_eq!(value["source_key"], "7");
        assert!(value.get("sources").is_none());

        let back: NormalizedRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn run_rejects_out_of_order_windows() {
        let mut run = HarvestRun::new("2010");
        assert!(run.visit(HarvestWindow::ListingPage { year: 2010, page: 1 }));
        assert!(run.visit(HarvestWindow::ListingPage { year: 2010, page: 2 }));
        assert!(!run.visit(HarvestWindow::ListingPage { year: 2010, page: 2 }));
        assert!(!run.visit(HarvestWindow::ListingPage { year: 2010, page: 1 }));
        assert_eq!(run.visited.len(), 2);
    }

    #[test]
    fn month_windows_order_by_year_then_month() {
        let a = HarvestWindow::Month { year: 2010, month: 12 };
        let b = HarvestWindow::Month { year: 2011, month: 1 };
        assert!(a < b);
        assert_eq!(a.to_string(), "2010-12");
    }
}
