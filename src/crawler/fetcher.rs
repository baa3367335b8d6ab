//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the shared HTTP client with a proper user agent string
//! - GET requests with redirect and timeout limits
//! - Typed error classification driving the frontier's retry policy
//!
//! Politeness (per-host delay and concurrency) is enforced before a URL ever
//! reaches this module, by the frontier's eligibility checks.

use crate::config::UserAgentConfig;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// Maximum redirect hops before a fetch fails
const MAX_REDIRECTS: usize = 10;

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchSuccess {
    /// Final URL after redirects
    pub final_url: String,

    /// HTTP status code
    pub status: u16,

    /// Content-Type header value
    pub content_type: String,

    /// Page body
    pub body: String,
}

/// A typed fetch failure
///
/// # Retry classification
///
/// | Kind | Retriable |
/// |------|-----------|
/// | `Timeout` | yes |
/// | `ConnectionRefused` | yes |
/// | `Http` 5xx | yes |
/// | `Http` 429 | yes, honoring Retry-After when present |
/// | `Http` other 4xx | no |
/// | `TooManyRedirects` | no |
/// | `NotHtml` | no |
/// | `Other` | no |
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timeout")]
    Timeout,

    #[error("Connection refused")]
    ConnectionRefused,

    #[error("HTTP {status}")]
    Http {
        status: u16,
        /// Server-suggested delay from a Retry-After header, when given
        retry_after: Option<Duration>,
    },

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("Not an HTML page: {content_type}")]
    NotHtml { content_type: String },

    #[error("Fetch failed: {0}")]
    Other(String),
}

impl FetchError {
    /// Returns true if the frontier should schedule a retry for this failure
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Timeout | Self::ConnectionRefused => true,
            Self::Http { status, .. } => matches!(*status, 429 | 500..=599),
            Self::TooManyRedirects | Self::NotHtml { .. } | Self::Other(_) => false,
        }
    }

    /// Server-suggested retry delay, if the response carried one
    pub fn server_delay(&self) -> Option<Duration> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Builds the shared HTTP client
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a URL and classifies the outcome
///
/// # Arguments
///
/// * `client` - The shared HTTP client
/// * `url` - The (normalized) URL to fetch
///
/// # Returns
///
/// * `Ok(FetchSuccess)` - A 2xx HTML response
/// * `Err(FetchError)` - A typed failure; see the retry table above
pub async fn fetch(client: &Client, url: &str) -> Result<FetchSuccess, FetchError> {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => return Err(classify_request_error(&e)),
    };

    let status = response.status();
    let final_url = response.url().to_string();

    if !status.is_success() {
        let retry_after = parse_retry_after(&response);
        return Err(FetchError::Http {
            status: status.as_u16(),
            retry_after,
        });
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !content_type.contains("text/html") {
        return Err(FetchError::NotHtml { content_type });
    }

    match response.text().await {
        Ok(body) => Ok(FetchSuccess {
            final_url,
            status: status.as_u16(),
            content_type,
            body,
        }),
        Err(e) => Err(classify_request_error(&e)),
    }
}

/// Maps a reqwest error to a FetchError kind
fn classify_request_error(e: &reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::ConnectionRefused
    } else if e.is_redirect() {
        FetchError::TooManyRedirects
    } else {
        FetchError::Other(e.to_string())
    }
}

/// Parses a Retry-After header given in whole seconds
///
/// The HTTP-date form is rare on 429s and is ignored; the frontier falls back
/// to its own backoff in that case.
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
