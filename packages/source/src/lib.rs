#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Accident data sources.
//!
//! Each source pairs a pagination driver with a record parser:
//!
//! * [`aviation_safety`] walks the HTML year listing page by page and parses
//!   every linked detail page into a [`NormalizedRecord`].
//! * [`ntsb`] walks calendar months and saves each month's export archive.
//!
//! [`resume`] decides which units of work are already done, [`archive`]
//! unpacks and merges downloaded exports, and [`structured`] turns persisted
//! artifacts back into keyed records for the staging loader.
//!
//! [`NormalizedRecord`]: accident_harvest_models::NormalizedRecord

pub mod archive;
pub mod aviation_safety;
pub mod ntsb;
pub mod progress;
pub mod resume;
pub mod structured;

/// Errors that can occur during data source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// I/O error (file read/write).
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// JSON parsing or serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// An archive could not be opened or read.
    #[error("Archive error in {path}: {source}")]
    Archive {
        /// Archive that caused the error.
        path: String,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },
}

impl SourceError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;

    use accident_harvest_models::{FetchOutcome, RawPage};
    use accident_harvest_scraper::{FetchRequest, PageFetcher};

    /// In-memory fetcher that replays queued outcomes per URL and answers
    /// `NotFound` once a URL's queue is empty.
    #[derive(Default)]
    pub struct ScriptedFetcher {
        responses: Mutex<BTreeMap<String, VecDeque<FetchOutcome>>>,
        requests: Mutex<Vec<FetchRequest>>,
    }

    impl ScriptedFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, url: &str, outcome: FetchOutcome) -> &Self {
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_owned())
                .or_default()
                .push_back(outcome);
            self
        }

        pub fn respond_html(&self, url: &str, html: &str) -> &Self {
            self.respond(url, FetchOutcome::Ok(html.as_bytes().to_vec()))
        }

        pub fn requests(&self) -> Vec<FetchRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn requested_urls(&self) -> Vec<String> {
            self.requests().into_iter().map(|r| r.url).collect()
        }
    }

    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&self, request: &FetchRequest) -> RawPage {
            self.requests.lock().unwrap().push(request.clone());

            let outcome = self
                .responses
                .lock()
                .unwrap()
                .get_mut(&request.url)
                .and_then(VecDeque::pop_front)
                .unwrap_or(FetchOutcome::NotFound);

            RawPage {
                url: request.url.clone(),
                outcome,
            }
        }
    }
}
