//! Aviation Safety Network year listing harvester.
//!
//! Each year is one [`HarvestRun`]. The driver walks the year's listing
//! pages starting at 1, fetches every linked detail page, and stops at the
//! first page that is missing (404) or links to nothing. A listing page that
//! fails in any other way aborts the year, but the records gathered so far
//! are still written out.

pub mod parse;

use std::path::PathBuf;
use std::sync::Arc;

use accident_harvest_models::config::{ListingSourceConfig, ResumeGranularity};
use accident_harvest_models::{
    FetchOutcome, HarvestEnvelope, HarvestRun, HarvestWindow, NormalizedRecord, RunOutcome,
};
use accident_harvest_scraper::{FetchRequest, Pacer, PageFetcher};

use crate::SourceError;
use crate::progress::ProgressCallback;
use crate::resume::{ArtifactStore, units};

/// How a single year ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearStatus {
    /// The year's envelope already existed; nothing was fetched.
    AlreadyHarvested,
    /// The year was walked until it ended or was aborted.
    Finished(RunOutcome),
}

/// Summary of one harvested year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearReport {
    pub year: i32,
    pub status: YearStatus,
    /// Listing pages visited, including the terminating one.
    pub pages_visited: u32,
    /// Records parsed (or reloaded from page checkpoints).
    pub records: usize,
    /// Detail pages that failed to fetch or parse.
    pub dropped: usize,
    /// Where the envelope was written, if it was.
    pub artifact: Option<PathBuf>,
}

impl YearReport {
    const fn skipped(year: i32) -> Self {
        Self {
            year,
            status: YearStatus::AlreadyHarvested,
            pages_visited: 0,
            records: 0,
            dropped: 0,
            artifact: None,
        }
    }
}

/// Walks year listings and their detail pages.
pub struct ListingHarvester<F: PageFetcher> {
    fetcher: F,
    pacer: Pacer,
    store: ArtifactStore,
    config: ListingSourceConfig,
    progress: Arc<dyn ProgressCallback>,
}

impl<F: PageFetcher> ListingHarvester<F> {
    pub fn new(
        fetcher: F,
        pacer: Pacer,
        store: ArtifactStore,
        config: ListingSourceConfig,
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

    /// URL of one listing page.
    #[must_use]
    pub fn listing_url(&self, year: i32, page: u32) -> String {
        let path = self
            .config
            .listing_path
            .replace("{year}", &year.to_string())
            .replace("{page}", &page.to_string());

        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Harvests every configured year in order, cooling down between years.
    /// A failed year is reported and the next one is still attempted.
    pub async fn harvest_years(&mut self) -> Vec<YearReport> {
        let years: Vec<i32> = (self.config.start_year..=self.config.end_year).collect();
        let mut reports = Vec::with_capacity(years.len());

        for (i, &year) in years.iter().enumerate() {
            let report = self.harvest_year(year).await;
            let fetched = matches!(report.status, YearStatus::Finished(_));
            reports.push(report);

            if fetched && i + 1 < years.len() {
                self.pacer.cool_down().await;
            }
        }

        reports
    }

    /// Harvests one year.
    pub async fn harvest_year(&mut self, year: i32) -> YearReport {
        let run_unit = units::listing_run(year);
        if self.config.resume != ResumeGranularity::Off && self.store.exists(&run_unit) {
            log::info!("Skipping {year}: {run_unit} already exists");
            return YearReport::skipped(year);
        }

        log::info!("Harvesting {year} listing");
        self.progress.set_message(format!("{year}: starting"));

        let mut run = HarvestRun::new(year.to_string());
        let mut dropped = 0;
        let mut page = 1_u32;

        let outcome = loop {
            let window = HarvestWindow::ListingPage { year, page };
            if !run.visit(window) {
                break RunOutcome::Aborted {
                    window,
                    reason: "window visited out of order".to_owned(),
                };
            }

            if let Some(records) = self.load_checkpoint(year, page) {
                log::info!("{window}: reloaded {} records from checkpoint", records.len());
                run.records.extend(records);
                page += 1;
                continue;
            }

            self.pacer.wait().await;
            let url = self.listing_url(year, page);
            let listing = self.fetcher.fetch(&FetchRequest::get(&url)).await;

            let html = match listing.outcome {
                FetchOutcome::Ok(body) => String::from_utf8_lossy(&body).into_owned(),
                FetchOutcome::NotFound => {
                    log::info!("{window}: {url} not found, end of listing");
                    break RunOutcome::EndOfRun;
                }
                FetchOutcome::Transient(reason) | FetchOutcome::Fatal(reason) => {
                    log::warn!("{window}: aborting year, listing {url} failed: {reason}");
                    break RunOutcome::Aborted { window, reason };
                }
            };

            let links =
                parse::parse_listing(&html, &self.config.base_url, &self.config.detail_marker);
            if links.is_empty() {
                log::info!("{window}: no detail links, end of listing");
                break RunOutcome::EndOfRun;
            }

            log::info!("{window}: {} detail links", links.len());
            self.progress.set_total(links.len() as u64);

            let mut page_records = Vec::with_capacity(links.len());
            let mut page_dropped = 0;
            for link in &links {
                match self.fetch_detail(link).await {
                    Some(record) => page_records.push(record),
                    None => page_dropped += 1,
                }
                self.progress.inc(1);
            }

            // An incomplete page is refetched on the next run.
            if page_dropped == 0 {
                self.save_checkpoint(year, page, &page_records);
            } else {
                log::info!("{window}: {page_dropped} details dropped, page not checkpointed");
            }
            dropped += page_dropped;
            run.records.extend(page_records);
            self.progress
                .set_message(format!("{year}: {} records", run.records.len()));
            page += 1;
        };

        let pages_visited = u32::try_from(run.visited.len()).unwrap_or(u32::MAX);
        let records = run.records.len();
        let artifact = self.persist(year, &run, &outcome);

        self.progress.finish(format!(
            "{year}: {records} records, {dropped} dropped, {pages_visited} pages"
        ));

        YearReport {
            year,
            status: YearStatus::Finished(outcome),
            pages_visited,
            records,
            dropped,
            artifact,
        }
    }

    async fn fetch_detail(&mut self, url: &str) -> Option<NormalizedRecord> {
        self.pacer.wait().await;
        let page = self.fetcher.fetch(&FetchRequest::get(url)).await;

        match page.outcome {
            FetchOutcome::Ok(body) => {
                match parse::parse_detail(&String::from_utf8_lossy(&body), url) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        log::warn!("Dropping {url}: {e}");
                        None
                    }
                }
            }
            FetchOutcome::NotFound => {
                log::warn!("Dropping {url}: not found");
                None
            }
            FetchOutcome::Transient(reason) => {
                log::warn!("Dropping {url}: {reason}");
                None
            }
            FetchOutcome::Fatal(reason) => {
                log::error!("Dropping {url}: {reason}");
                None
            }
        }
    }

    fn load_checkpoint(&self, year: i32, page: u32) -> Option<Vec<NormalizedRecord>> {
        if self.config.resume != ResumeGranularity::Window {
            return None;
        }

        let unit = units::listing_page(year, page);
        if !self.store.exists(&unit) {
            return None;
        }

        let parsed = self
            .store
            .read(&unit)
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(SourceError::from));

        match parsed {
            Ok(records) => Some(records),
            Err(e) => {
                log::warn!("Ignoring unreadable checkpoint {unit}: {e}");
                None
            }
        }
    }

    fn save_checkpoint(&self, year: i32, page: u32, records: &[NormalizedRecord]) {
        if self.config.resume != ResumeGranularity::Window {
            return;
        }

        let unit = units::listing_page(year, page);
        let written = serde_json::to_vec(records)
            .map_err(SourceError::from)
            .and_then(|bytes| self.store.write(&unit, &bytes));

        if let Err(e) = written {
            log::warn!("Could not write checkpoint {unit}: {e}");
        }
    }

    fn persist(&self, year: i32, run: &HarvestRun, outcome: &RunOutcome) -> Option<PathBuf> {
        let unit = match outcome {
            RunOutcome::EndOfRun => units::listing_run(year),
            RunOutcome::Aborted { .. } => units::listing_partial_run(year),
        };

        let envelope = HarvestEnvelope::new(&run.identifier, run.records.clone());
        let written = serde_json::to_vec_pretty(&envelope)
            .map_err(SourceError::from)
            .and_then(|bytes| self.store.write(&unit, &bytes));

        match written {
            Ok(path) => {
                log::info!(
                    "Saved {} records for {} to {}",
                    envelope.total_records,
                    run.identifier,
                    path.display()
                );
                Some(path)
            }
            Err(e) => {
                log::error!("Failed to save {unit}: {e}");
                None
            }
        }
    }
}
