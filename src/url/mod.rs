//! URL handling module for newsraker
//!
//! This module provides URL normalization, host extraction, and allowed-host
//! matching. Every URL entering the frontier passes through [`normalize_url`]
//! first, so the dedup ledger compares canonical forms.

mod matcher;
mod normalize;

use url::Url;

// Re-export main functions
pub use matcher::matches_host_pattern;
pub use normalize::normalize_url;

/// Extracts the host from a URL, lowercased
///
/// Returns `None` for URLs without a host component (which normalization
/// rejects anyway).
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Checks whether a host is covered by the configured allowed-host patterns
///
/// # Arguments
///
/// * `host` - The lowercased host to check
/// * `allowed` - Allowed-host patterns from configuration
pub fn host_is_allowed(host: &str, allowed: &[String]) -> bool {
    allowed
        .iter()
        .any(|pattern| matches_host_pattern(pattern, host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_host() {
        let url = Url::parse("https://News.Example/path").unwrap();
        assert_eq!(extract_host(&url), Some("news.example".to_string()));
    }

    #[test]
    fn test_extract_host_missing() {
        let url = Url::parse("mailto:user@example.com").unwrap();
        assert_eq!(extract_host(&url), None);
    }

    #[test]
    fn test_host_is_allowed_exact() {
        let allowed = vec!["news.example".to_string()];
        assert!(host_is_allowed("news.example", &allowed));
        assert!(!host_is_allowed("other.example", &allowed));
    }

    #[test]
    fn test_host_is_allowed_wildcard() {
        let allowed = vec!["*.news.example".to_string()];
        assert!(host_is_allowed("news.example", &allowed));
        assert!(host_is_allowed("sport.news.example", &allowed));
        assert!(!host_is_allowed("news.other", &allowed));
    }

    #[test]
    fn test_host_is_allowed_multiple_patterns() {
        let allowed = vec!["news.example".to_string(), "archive.example".to_string()];
        assert!(host_is_allowed("archive.example", &allowed));
        assert!(!host_is_allowed("cdn.example", &allowed));
    }
}
