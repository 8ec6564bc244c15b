#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Rate-limited fetching for accident data sources.
//!
//! Provides the [`PageFetcher`] trait, the reqwest-backed [`HttpFetcher`]
//! ([`http`]), rotating browser-like request headers ([`headers`]) and the
//! randomized delay policy every caller applies before a request
//! ([`pacing`]).
//!
//! Fetchers never retry and never return network failures as errors: every
//! request produces a [`RawPage`] whose [`FetchOutcome`] tells the caller
//! whether the resource exists, is temporarily unavailable, or could not be
//! interpreted at all.
//!
//! [`FetchOutcome`]: accident_harvest_models::FetchOutcome

pub mod headers;
pub mod http;
pub mod pacing;

use std::collections::BTreeMap;

use accident_harvest_models::RawPage;

pub use headers::HeaderProfile;
pub use http::HttpFetcher;
pub use pacing::Pacer;

/// Errors that can occur while setting up a fetcher.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// The HTTP client could not be built.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A header name or value was rejected.
    #[error("Invalid header: {0}")]
    Header(String),
}

/// HTTP method and payload of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Plain `GET`.
    Get,
    /// `POST` with a JSON body.
    PostJson(serde_json::Value),
}

/// A single request issued through a [`PageFetcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Absolute URL to request.
    pub url: String,
    /// Method and payload.
    pub body: RequestBody,
    /// Which browser-like header set to send.
    pub profile: HeaderProfile,
    /// Headers added on top of the profile (e.g. a per-request referer).
    pub extra_headers: BTreeMap<String, String>,
}

impl FetchRequest {
    /// Creates a `GET` request using the document navigation profile.
    #[must_use]
    pub fn get(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            body: RequestBody::Get,
            profile: HeaderProfile::Document,
            extra_headers: BTreeMap::new(),
        }
    }

    /// Creates a JSON `POST` request using the API profile.
    #[must_use]
    pub fn post_json(url: &str, body: serde_json::Value) -> Self {
        Self {
            url: url.to_owned(),
            body: RequestBody::PostJson(body),
            profile: HeaderProfile::Api,
            extra_headers: BTreeMap::new(),
        }
    }

    /// Adds a header on top of the profile headers.
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.extra_headers.insert(key.to_owned(), value.to_owned());
        self
    }
}

/// Issues a request and classifies the response.
///
/// Implementations construct headers and perform the request only: the
/// caller applies the delay policy beforehand and owns any retry decision.
pub trait PageFetcher: Send + Sync {
    /// Fetches a single resource.
    fn fetch(&self, request: &FetchRequest) -> impl std::future::Future<Output = RawPage> + Send;
}

impl<T: PageFetcher + ?Sized> PageFetcher for &T {
    fn fetch(&self, request: &FetchRequest) -> impl std::future::Future<Output = RawPage> + Send {
        (**self).fetch(request)
    }
}
