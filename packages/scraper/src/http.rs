//! reqwest-backed [`PageFetcher`].
//!
//! Classification policy:
//!
//! * HTTP 404 becomes [`FetchOutcome::NotFound`]. It is the listing
//!   source's end-of-data signal, so it is not logged as a failure.
//! * Any other non-2xx status, timeouts and connection failures become
//!   [`FetchOutcome::Transient`] and are logged with the URL and reason.
//!   A connection dropped while the body is being read is a network
//!   failure too.
//! * Responses that cannot be interpreted at all (unparseable status line
//!   or headers, undecodable body, request that could not even be built)
//!   become [`FetchOutcome::Fatal`].
//!
//! [`FetchOutcome::NotFound`]: accident_harvest_models::FetchOutcome::NotFound
//! [`FetchOutcome::Transient`]: accident_harvest_models::FetchOutcome::Transient
//! [`FetchOutcome::Fatal`]: accident_harvest_models::FetchOutcome::Fatal

use std::time::Duration;

use accident_harvest_models::RawPage;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;

use crate::headers::build_headers;
use crate::{FetchRequest, PageFetcher, RequestBody, ScrapeError};

/// Fetcher backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Builds a fetcher with a bounded per-request timeout and an optional
    /// upstream proxy applied to every scheme.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Http`] if the proxy URL is invalid or the
    /// client cannot be built.
    pub fn new(timeout: Duration, proxy: Option<&str>) -> Result<Self, ScrapeError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);

        if let Some(proxy) = proxy {
            log::info!("Routing requests through proxy {proxy}");
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    fn request_headers(request: &FetchRequest) -> Result<HeaderMap, ScrapeError> {
        build_headers(
            request.profile,
            &request.extra_headers,
            &mut rand::thread_rng(),
        )
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> RawPage {
        let url = request.url.as_str();

        let headers = match Self::request_headers(request) {
            Ok(headers) => headers,
            Err(e) => {
                log::error!("Could not build request for {url}: {e}");
                return RawPage::fatal(url, e.to_string());
            }
        };

        let builder = match &request.body {
            RequestBody::Get => self.client.get(url),
            RequestBody::PostJson(body) => self.client.post(url).json(body),
        }
        .headers(headers);

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return classify_send_error(url, &e),
        };

        if let Some(page) = classify_status(url, response.status()) {
            return page;
        }

        match response.bytes().await {
            Ok(body) => RawPage::ok(url, body.to_vec()),
            Err(e) => classify_body_error(url, &e),
        }
    }
}

/// Maps a non-success status to its outcome. Returns `None` for 2xx.
#[must_use]
pub fn classify_status(url: &str, status: StatusCode) -> Option<RawPage> {
    if status.is_success() {
        return None;
    }

    if status == StatusCode::NOT_FOUND {
        log::debug!("{url} returned 404");
        return Some(RawPage::not_found(url));
    }

    log::warn!("HTTP error fetching {url}: {status}");
    Some(RawPage::transient(url, format!("HTTP {status}")))
}

/// Whether hyper rejected the response head as unparseable.
fn is_malformed_response(e: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        if err
            .downcast_ref::<hyper::Error>()
            .is_some_and(hyper::Error::is_parse)
        {
            return true;
        }
        source = err.source();
    }
    false
}

fn classify_send_error(url: &str, e: &reqwest::Error) -> RawPage {
    if e.is_builder() || e.is_decode() || is_malformed_response(e) {
        log::error!("Malformed request or response for {url}: {e}");
        return RawPage::fatal(url, e.to_string());
    }

    let reason = if e.is_timeout() {
        format!("timed out: {e}")
    } else {
        e.to_string()
    };
    log::warn!("Error fetching {url}: {reason}");
    RawPage::transient(url, reason)
}

fn classify_body_error(url: &str, e: &reqwest::Error) -> RawPage {
    if e.is_decode() {
        log::error!("Undecodable response body from {url}: {e}");
        return RawPage::fatal(url, e.to_string());
    }

    log::warn!("Error reading body of {url}: {e}");
    RawPage::transient(url, e.to_string())
}
