use crate::config::types::{Config, CrawlerConfig, ExtractionConfig, UserAgentConfig};
use crate::url::{extract_host, host_is_allowed};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
///
/// Runs before any fetch; every problem found here is fatal to startup.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_extraction_config(&config.extraction)?;
    validate_user_agent_config(&config.user_agent)?;

    if config.storage.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.seed_urls.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed URL is required".to_string(),
        ));
    }

    if config.allowed_hosts.is_empty() {
        return Err(ConfigError::Validation(
            "at least one allowed host is required".to_string(),
        ));
    }

    for pattern in &config.allowed_hosts {
        validate_host_pattern(pattern)?;
    }

    for seed in &config.seed_urls {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use an http(s) scheme",
                seed
            )));
        }

        let host = extract_host(&url).ok_or_else(|| {
            ConfigError::InvalidUrl(format!("Seed URL '{}' has no host", seed))
        })?;

        if !host_is_allowed(&host, &config.allowed_hosts) {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' is not covered by allowed-hosts",
                seed
            )));
        }
    }

    if config.min_delay_seconds < 0.0 || !config.min_delay_seconds.is_finite() {
        return Err(ConfigError::Validation(format!(
            "min_delay_seconds must be a non-negative number, got {}",
            config.min_delay_seconds
        )));
    }

    if config.max_concurrent_per_host < 1 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_per_host must be >= 1, got {}",
            config.max_concurrent_per_host
        )));
    }

    if config.global_concurrency < 1 || config.global_concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "global_concurrency must be between 1 and 100, got {}",
            config.global_concurrency
        )));
    }

    if config.backoff_base_seconds <= 0.0 || config.backoff_cap_seconds < config.backoff_base_seconds
    {
        return Err(ConfigError::Validation(format!(
            "backoff must satisfy 0 < base <= cap, got base={} cap={}",
            config.backoff_base_seconds, config.backoff_cap_seconds
        )));
    }

    Ok(())
}

/// Validates extraction configuration
fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    if config.min_article_text_length < 1 {
        return Err(ConfigError::Validation(
            "min_article_text_length must be >= 1".to_string(),
        ));
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates a host pattern (supports a single leading `*.` wildcard)
fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Host pattern cannot be empty".to_string(),
        ));
    }

    let host = pattern.strip_prefix("*.").unwrap_or(pattern);

    if host.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Host cannot be empty".to_string(),
        ));
    }

    if !host
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' contains invalid characters",
            host
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.starts_with('-') || host.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot start or end with '.' or '-'",
            host
        )));
    }

    if host.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot contain consecutive dots",
            host
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() || !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::StorageConfig;

    fn valid_config() -> Config {
        Config {
            crawler: CrawlerConfig {
                seed_urls: vec!["https://news.example/index".to_string()],
                allowed_hosts: vec!["news.example".to_string()],
                min_delay_seconds: 1.0,
                max_concurrent_per_host: 2,
                global_concurrency: 8,
                max_retries: 3,
                backoff_base_seconds: 1.0,
                backoff_cap_seconds: 300.0,
                drain_timeout_seconds: 30,
                max_pages: 0,
            },
            extraction: ExtractionConfig {
                min_article_text_length: 400,
            },
            user_agent: UserAgentConfig {
                crawler_name: "newsraker".to_string(),
                crawler_version: "0.2".to_string(),
                contact_url: "https://example.com/crawler".to_string(),
                contact_email: "crawler@example.com".to_string(),
            },
            storage: StorageConfig {
                database_path: "./newsraker.db".to_string(),
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_no_seeds_fails() {
        let mut config = valid_config();
        config.crawler.seed_urls.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_seed_outside_allowed_hosts_fails() {
        let mut config = valid_config();
        config
            .crawler
            .seed_urls
            .push("https://other.example/".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_seed_with_wildcard_allowed_host() {
        let mut config = valid_config();
        config.crawler.allowed_hosts = vec!["*.news.example".to_string()];
        config.crawler.seed_urls = vec!["https://sport.news.example/".to_string()];
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_non_http_seed_fails() {
        let mut config = valid_config();
        config.crawler.seed_urls = vec!["ftp://news.example/".to_string()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_concurrency_fails() {
        let mut config = valid_config();
        config.crawler.max_concurrent_per_host = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_negative_delay_fails() {
        let mut config = valid_config();
        config.crawler.min_delay_seconds = -1.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_backoff_cap_below_base_fails() {
        let mut config = valid_config();
        config.crawler.backoff_base_seconds = 10.0;
        config.crawler.backoff_cap_seconds = 1.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_host_pattern() {
        assert!(validate_host_pattern("news.example").is_ok());
        assert!(validate_host_pattern("*.news.example").is_ok());
        assert!(validate_host_pattern("127.0.0.1:8080").is_ok());

        assert!(validate_host_pattern("").is_err());
        assert!(validate_host_pattern("*.").is_err());
        assert!(validate_host_pattern(".news.example").is_err());
        assert!(validate_host_pattern("news..example").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@domain").is_err());
    }
}
