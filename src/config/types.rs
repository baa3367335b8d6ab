use serde::Deserialize;
use std::time::Duration;

use crate::state::HostPolicy;

/// Main configuration structure for newsraker
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub extraction: ExtractionConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// URLs the crawl starts from
    #[serde(rename = "seed-urls")]
    pub seed_urls: Vec<String>,

    /// Hosts the crawl is allowed to touch (wildcard `*.` prefix supported)
    #[serde(rename = "allowed-hosts")]
    pub allowed_hosts: Vec<String>,

    /// Minimum delay between request starts to the same host (seconds)
    #[serde(rename = "min-delay-seconds")]
    pub min_delay_seconds: f64,

    /// Maximum simultaneous in-flight requests per host
    #[serde(rename = "max-concurrent-per-host")]
    pub max_concurrent_per_host: u32,

    /// Size of the global fetch worker pool
    #[serde(rename = "global-concurrency", default = "default_global_concurrency")]
    pub global_concurrency: u32,

    /// Failed attempts tolerated for a URL before it becomes terminally Failed
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Base of the exponential retry backoff (seconds)
    #[serde(rename = "backoff-base-seconds", default = "default_backoff_base")]
    pub backoff_base_seconds: f64,

    /// Cap on the retry backoff (seconds)
    #[serde(rename = "backoff-cap-seconds", default = "default_backoff_cap")]
    pub backoff_cap_seconds: f64,

    /// How long to let in-flight fetches finish after a stop signal (seconds)
    #[serde(rename = "drain-timeout-seconds", default = "default_drain_timeout")]
    pub drain_timeout_seconds: u64,

    /// Page budget for a run; 0 means unlimited
    #[serde(rename = "max-pages", default)]
    pub max_pages: u64,
}

fn default_global_concurrency() -> u32 {
    8
}

fn default_backoff_base() -> f64 {
    1.0
}

fn default_backoff_cap() -> f64 {
    300.0
}

fn default_drain_timeout() -> u64 {
    30
}

impl CrawlerConfig {
    /// Derives the per-host politeness policy shared by the frontier and fetch path
    pub fn host_policy(&self) -> HostPolicy {
        HostPolicy {
            min_delay: Duration::from_secs_f64(self.min_delay_seconds),
            max_concurrent: self.max_concurrent_per_host as usize,
        }
    }

    /// Computes the retry backoff for the given attempt number (1-based)
    ///
    /// `backoff(n) = min(base * 2^(n-1), cap)`. A server-suggested delay
    /// (HTTP 429 Retry-After) takes precedence over this at the call site.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_f64.powi(attempt.saturating_sub(1).min(32) as i32);
        let secs = (self.backoff_base_seconds * factor).min(self.backoff_cap_seconds);
        Duration::from_secs_f64(secs)
    }
}

/// Article extraction configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Minimum cleansed text length for a page to count as an article
    #[serde(rename = "min-article-text-length")]
    pub min_article_text_length: usize,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}
