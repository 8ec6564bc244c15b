//! NTSB CAROL month-by-month export downloader.
//!
//! Every calendar month between the configured start and end year is one
//! [`HarvestWindow::Month`]. For each month the driver posts a date-range
//! query to the export endpoint and saves the returned archive verbatim as
//! `ntsb_{year}_{mm}.zip`. Months whose archive already exists are skipped
//! before any request is made, so re-running only retries months that never
//! produced an artifact.

pub mod query;

use std::path::PathBuf;
use std::sync::Arc;

use accident_harvest_models::config::{ArchiveSourceConfig, ResumeGranularity};
use accident_harvest_models::{FetchOutcome, HarvestWindow};
use accident_harvest_scraper::{FetchRequest, Pacer, PageFetcher};
use chrono::{Datelike as _, NaiveDate};

use crate::progress::ProgressCallback;
use crate::resume::{ArtifactStore, units};

pub use query::ExportQuery;

/// Lists the month windows from January of `start_year` through December of
/// `end_year`, stopping at `today`'s month. Years after `today` produce
/// nothing.
///
/// ```
/// use accident_harvest_source::ntsb::month_windows;
/// use chrono::NaiveDate;
///
/// let today = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
/// assert_eq!(month_windows(2024, 2026, today).len(), 12 + 3);
/// ```
#[must_use]
pub fn month_windows(start_year: i32, end_year: i32, today: NaiveDate) -> Vec<HarvestWindow> {
    let mut windows = Vec::new();

    for year in start_year..=end_year.min(today.year()) {
        let last_month = if year == today.year() {
            today.month()
        } else {
            12
        };

        for month in 1..=last_month {
            windows.push(HarvestWindow::Month { year, month });
        }
    }

    windows
}

/// First and last day of a calendar month. `None` if the month is invalid.
#[must_use]
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };

    Some((first, next.pred_opt()?))
}

/// What happened to a single month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonthOutcome {
    /// An artifact already covered the month; no request was made.
    Skipped,
    /// The archive was downloaded and saved.
    Downloaded {
        /// Size of the archive.
        bytes: usize,
        /// Where it was saved.
        path: PathBuf,
    },
    /// The export failed. No artifact was written.
    Failed {
        /// Why it failed.
        reason: String,
    },
}

/// Outcome of one month window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthReport {
    pub window: HarvestWindow,
    pub outcome: MonthOutcome,
}

/// Summary of an export session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub months: Vec<MonthReport>,
}

impl ExportReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.months.len()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, MonthOutcome::Skipped))
    }

    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.count(|o| matches!(o, MonthOutcome::Downloaded { .. }))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, MonthOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&MonthOutcome) -> bool) -> usize {
        self.months.iter().filter(|m| pred(&m.outcome)).count()
    }
}

/// Downloads monthly export archives.
pub struct ExportHarvester<F: PageFetcher> {
    fetcher: F,
    pacer: Pacer,
    store: ArtifactStore,
    config: ArchiveSourceConfig,
    progress: Arc<dyn ProgressCallback>,
}

impl<F: PageFetcher> ExportHarvester<F> {
    pub fn new(
        fetcher: F,
        pacer: Pacer,
        store: ArtifactStore,
        config: ArchiveSourceConfig,
        progress: Arc<dyn ProgressCallback>,
    ) -> Self {
        Self {
            fetcher,
            pacer,
            store,
            config,
            progress,
        }
    }

    /// Referer the query builder page would send for this month.
    #[must_use]
    pub fn referer(&self, year: i32, month: u32) -> String {
        self.config
            .referer_template
            .replace("{month}", &month.to_string())
            .replace("{year}", &year.to_string())
    }

    /// Builds the export request for one month.
    #[must_use]
    pub fn request(&self, year: i32, month: u32) -> Option<FetchRequest> {
        let (first, last) = month_bounds(year, month)?;
        let query = ExportQuery::for_range(
            first,
            last,
            &self.config.mode,
            self.config.session_id,
            self.config.result_set_size,
        );
        let body = serde_json::to_value(query).ok()?;

        Some(
            FetchRequest::post_json(&self.config.export_url, body)
                .with_header("origin", &self.config.origin)
                .with_header("referer", &self.referer(year, month)),
        )
    }

    /// Downloads every month of the configured span up to `today`.
    pub async fn harvest(&mut self, today: NaiveDate) -> ExportReport {
        let windows = month_windows(self.config.start_year, self.config.end_year, today);
        self.progress.set_total(windows.len() as u64);

        let mut report = ExportReport::default();

        for window in windows {
            let HarvestWindow::Month { year, month } = window else {
                continue;
            };

            self.progress.set_message(format!("NTSB {window}"));
            let outcome = if self.year_complete(year) {
                log::debug!("{window}: year already complete");
                MonthOutcome::Skipped
            } else {
                self.harvest_month(year, month).await
            };
            self.progress.inc(1);

            report.months.push(MonthReport { window, outcome });

            if month == 12 {
                self.mark_year_complete(year, &report);
            }
        }

        self.progress.finish(format!(
            "NTSB: {} downloaded, {} skipped, {} failed of {}",
            report.downloaded(),
            report.skipped(),
            report.failed(),
            report.total()
        ));

        report
    }

    /// Downloads a single month unless its archive already exists.
    pub async fn harvest_month(&mut self, year: i32, month: u32) -> MonthOutcome {
        let window = HarvestWindow::Month { year, month };
        let unit = units::export_month(year, month);

        if self.config.resume == ResumeGranularity::Window && self.store.exists(&unit) {
            log::info!("{window}: {unit} already exists");
            return MonthOutcome::Skipped;
        }

        let Some(request) = self.request(year, month) else {
            return MonthOutcome::Failed {
                reason: format!("invalid month {window}"),
            };
        };

        self.pacer.wait().await;
        let page = self.fetcher.fetch(&request).await;

        let body = match page.outcome {
            FetchOutcome::Ok(body) if body.is_empty() => {
                log::warn!("{window}: export returned an empty body");
                return MonthOutcome::Failed {
                    reason: "empty export body".to_owned(),
                };
            }
            FetchOutcome::Ok(body) => body,
            FetchOutcome::NotFound => {
                log::warn!("{window}: export endpoint returned 404");
                return MonthOutcome::Failed {
                    reason: "not found".to_owned(),
                };
            }
            FetchOutcome::Transient(reason) => {
                log::warn!("{window}: export failed: {reason}");
                return MonthOutcome::Failed { reason };
            }
            FetchOutcome::Fatal(reason) => {
                log::error!("{window}: export failed: {reason}");
                return MonthOutcome::Failed { reason };
            }
        };

        match self.store.write(&unit, &body) {
            Ok(path) => {
                log::info!("{window}: saved {unit} ({} bytes)", body.len());
                self.pacer.wait().await;
                MonthOutcome::Downloaded {
                    bytes: body.len(),
                    path,
                }
            }
            Err(e) => {
                log::error!("{window}: could not save {unit}: {e}");
                MonthOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn year_complete(&self, year: i32) -> bool {
        self.config.resume == ResumeGranularity::Run
            && self.store.exists(&units::export_year_complete(year))
    }

    fn mark_year_complete(&self, year: i32, report: &ExportReport) {
        if self.config.resume != ResumeGranularity::Run {
            return;
        }

        let months: Vec<&MonthReport> = report
            .months
            .iter()
            .filter(|m| m.window.year() == year)
            .collect();

        let complete = months.len() == 12
            && months
                .iter()
                .all(|m| !matches!(m.outcome, MonthOutcome::Failed { .. }));

        if !complete {
            return;
        }

        let unit = units::export_year_complete(year);
        if let Err(e) = self.store.write(&unit, year.to_string().as_bytes()) {
            log::warn!("Could not write {unit}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use accident_harvest_scraper::RequestBody;

    use super::*;
    use crate::progress::null_progress;
    use crate::testing::ScriptedFetcher;

    const EXPORT_URL: &str = "https://carol.test/api/Query/FileExport";

    fn config(start_year: i32, end_year: i32, resume: ResumeGranularity) -> ArchiveSourceConfig {
        ArchiveSourceConfig {
            export_url: EXPORT_URL.to_owned(),
            start_year,
            end_year,
            resume,
            ..ArchiveSourceConfig::default()
        }
    }

    fn harvester<'a>(
        fetcher: &'a ScriptedFetcher,
        dir: &std::path::Path,
        config: ArchiveSourceConfig,
    ) -> ExportHarvester<&'a ScriptedFetcher> {
        ExportHarvester::new(
            fetcher,
            Pacer::disabled(),
            ArtifactStore::new(dir),
            config,
            null_progress(),
        )
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn windows_stop_at_the_current_month() {
        let windows = month_windows(2025, 2025, date(2025, 4, 10));
        assert_eq!(
            windows,
            (1..=4)
                .map(|month| HarvestWindow::Month { year: 2025, month })
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn windows_skip_future_years() {
        let windows = month_windows(2026, 2027, date(2025, 6, 1));
        assert!(windows.is_empty());
    }

    #[test]
    fn windows_are_strictly_increasing() {
        let windows = month_windows(2010, 2012, date(2030, 1, 1));
        assert_eq!(windows.len(), 36);
        assert!(windows.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn month_bounds_handle_leap_years_and_december() {
        assert_eq!(month_bounds(2024, 2), Some((date(2024, 2, 1), date(2024, 2, 29))));
        assert_eq!(month_bounds(2023, 2), Some((date(2023, 2, 1), date(2023, 2, 28))));
        assert_eq!(month_bounds(2024, 12), Some((date(2024, 12, 1), date(2024, 12, 31))));
        assert_eq!(month_bounds(2024, 13), None);
    }

    #[test]
    fn request_carries_month_scoped_query_and_referer() {
        let fetcher = ScriptedFetcher::new();
        let dir = tempfile::tempdir().unwrap();
        let harvester =
            harvester(&fetcher, dir.path(), config(2024, 2024, ResumeGranularity::Window));

        let request = harvester.request(2024, 3).unwrap();

        assert_eq!(request.url, EXPORT_URL);
        assert_eq!(
            request.extra_headers.get("referer").unwrap(),
            "https://data.ntsb.gov/carol-main-public/query-builder?month=3&year=2024"
        );
        assert_eq!(request.extra_headers.get("origin").unwrap(), "https://data.ntsb.gov");

        let RequestBody::PostJson(body) = request.body else {
            panic!("export must be a JSON POST");
        };
        let rules = &body["QueryGroups"][0]["QueryRules"];
        assert_eq!(rules[0]["Values"][0], "2024-03-01");
        assert_eq!(rules[1]["Values"][0], "2024-03-31");
    }

    #[tokio::test]
    async fn transient_failure_leaves_no_artifact_and_is_retried_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::new();
        fetcher.respond(
            EXPORT_URL,
            FetchOutcome::Transient("timed out".to_owned()),
        );

        let mut first =

            harvester(&fetcher, dir.path(), config(2024, 2024, ResumeGranularity::Window));
        let outcome = first.harvest_month(2024, 5).await;

        assert_eq!(
            outcome,
            MonthOutcome::Failed {
                reason: "timed out".to_owned()
            }
        );
        assert!(!dir.path().join("ntsb_2024_05.zip").exists());

        fetcher.respond(EXPORT_URL, FetchOutcome::Ok(b"PK\x03\x04".to_vec()));
        let mut second =
            harvester(&fetcher, dir.path(), config(2024, 2024, ResumeGranularity::Window));
        let outcome = second.harvest_month(2024, 5).await;

        assert!(matches!(outcome, MonthOutcome::Downloaded { bytes: 4, .. }));
        assert_eq!(fetcher.requests().len(), 2);
        assert_eq!(std::fs::read(dir.path().join("ntsb_2024_05.zip")).unwrap(), b"PK\x03\x04");
    }

    #[tokio::test]
    async fn existing_archive_is_skipped_without_a_request() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ntsb_2024_01.zip"), b"PK").unwrap();
        let fetcher = ScriptedFetcher::new();

        let mut harvester =

            harvester(&fetcher, dir.path(), config(2024, 2024, ResumeGranularity::Window));
        let outcome = harvester.harvest_month(2024, 1).await;

        assert_eq!(outcome, MonthOutcome::Skipped);
        assert!(fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn empty_body_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::new();
        fetcher.respond(EXPORT_URL, FetchOutcome::Ok(Vec::new()));

        let mut harvester =

            harvester(&fetcher, dir.path(), config(2024, 2024, ResumeGranularity::Window));
        let outcome = harvester.harvest_month(2024, 2).await;

        assert!(matches!(outcome, MonthOutcome::Failed { .. }));
        assert!(!dir.path().join("ntsb_2024_02.zip").exists());
    }

    #[tokio::test]
    async fn failed_month_does_not_stop_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::new();
        fetcher
            .respond(EXPORT_URL, FetchOutcome::Ok(b"PK1".to_vec()))
            .respond(EXPORT_URL, FetchOutcome::Fatal("reset".to_owned()))
            .respond(EXPORT_URL, FetchOutcome::Ok(b"PK3".to_vec()));

        let mut harvester =

            harvester(&fetcher, dir.path(), config(2025, 2025, ResumeGranularity::Window));
        let report = harvester.harvest(date(2025, 3, 20)).await;

        assert_eq!(report.total(), 3);
        assert_eq!(report.downloaded(), 2);
        assert_eq!(report.failed(), 1);
        assert!(dir.path().join("ntsb_2025_01.zip").is_file());
        assert!(!dir.path().join("ntsb_2025_02.zip").exists());
        assert!(dir.path().join("ntsb_2025_03.zip").is_file());
    }

    #[tokio::test]
    async fn run_granularity_marks_complete_years() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::new();
        for _ in 0..12 {
            fetcher.respond(EXPORT_URL, FetchOutcome::Ok(b"PK".to_vec()));
        }

        let mut first =

            harvester(&fetcher, dir.path(), config(2020, 2020, ResumeGranularity::Run));
        let report = first.harvest(date(2025, 1, 1)).await;
        assert_eq!(report.downloaded(), 12);
        assert!(dir.path().join("ntsb_2020.complete").is_file());

        let again = ScriptedFetcher::new();
        let mut second = harvester(&again, dir.path(), config(2020, 2020, ResumeGranularity::Run));
        let report = second.harvest(date(2025, 1, 1)).await;

        assert_eq!(report.skipped(), 12);
        assert!(again.requests().is_empty());
    }

    #[tokio::test]
    async fn partial_year_is_never_marked_complete() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::new();
        fetcher.respond(EXPORT_URL, FetchOutcome::Ok(b"PK".to_vec()));

        let mut harvester =

            harvester(&fetcher, dir.path(), config(2025, 2025, ResumeGranularity::Run));
        harvester.harvest(date(2025, 12, 31)).await;

        assert!(!dir.path().join("ntsb_2025.complete").exists());
    }
}
