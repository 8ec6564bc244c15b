//! Browser-like request headers.
//!
//! Every request draws a fresh client identity from [`USER_AGENTS`]; the
//! identity is never sticky for a session.

use rand::Rng;
use rand::seq::SliceRandom as _;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::ScrapeError;

/// Pool of desktop browser identities.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// The shape of header set to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderProfile {
    /// Top-level page navigation (HTML listing and detail pages).
    Document,
    /// Same-origin `fetch()` of a JSON API.
    Api,
}

impl HeaderProfile {
    /// Static headers for this profile, excluding the client identity. Names
    /// are lowercase as required by [`HeaderName::from_static`].
    #[must_use]
    pub const fn static_headers(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Document => &[
                (
                    "accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
                ),
                ("accept-language", "en-US,en;q=0.9"),
                ("accept-encoding", "gzip, deflate, br"),
                ("dnt", "1"),
                ("upgrade-insecure-requests", "1"),
                ("sec-fetch-dest", "document"),
                ("sec-fetch-mode", "navigate"),
                ("sec-fetch-site", "none"),
                ("cache-control", "max-age=0"),
            ],
            Self::Api => &[
                ("accept", "*/*"),
                ("accept-language", "en-US,en;q=0.5"),
                ("accept-encoding", "gzip, deflate, br"),
                ("content-type", "application/json"),
                ("sec-fetch-dest", "empty"),
                ("sec-fetch-mode", "cors"),
                ("sec-fetch-site", "same-origin"),
            ],
        }
    }
}

/// Picks a client identity at random.
#[must_use]
pub fn random_user_agent(rng: &mut impl Rng) -> &'static str {
    USER_AGENTS.choose(rng).copied().unwrap_or(USER_AGENTS[0])
}

/// Builds the full header map for one request.
///
/// # Errors
///
/// Returns [`ScrapeError::Header`] if an extra header has an invalid name
/// or value.
pub fn build_headers<'a>(
    profile: HeaderProfile,
    extra: impl IntoIterator<Item = (&'a String, &'a String)>,
    rng: &mut impl Rng,
) -> Result<HeaderMap, ScrapeError> {
    let mut map = HeaderMap::new();

    map.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(random_user_agent(rng)),
    );

    for &(key, value) in profile.static_headers() {
        map.insert(
            HeaderName::from_static(key),
            HeaderValue::from_static(value),
        );
    }

    for (key, value) in extra {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| ScrapeError::Header(format!("invalid header name '{key}': {e}")))?;
        let val = HeaderValue::from_str(value)
            .map_err(|e| ScrapeError::Header(format!("invalid header value '{value}': {e}")))?;
        map.insert(name, val);
    }

    Ok(map)
}
