use crate::UrlError;
use url::Url;

/// List of tracking query parameters to remove during normalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
    "ref",
    "source",
];

/// Normalizes a URL so equivalent URLs compare equal
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or non-http(s)
/// 2. Lowercase the host (the `url` crate already lowercases the scheme)
/// 3. Strip the default port (80 for http, 443 for https)
/// 4. Normalize the path:
///    - Remove dot segments (. and ..)
///    - Collapse duplicate slashes
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 5. Remove the fragment
/// 6. Remove tracking query parameters
/// 7. Sort remaining query parameters alphabetically
/// 8. Remove an empty query string
///
/// Normalization is idempotent: `normalize(normalize(u)) == normalize(u)`.
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(UrlError)` - Failed to parse or normalize the URL
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    // Lowercase the host
    if let Some(host) = url.host_str() {
        let normalized_host = host.to_lowercase();
        url.set_host(Some(&normalized_host))
            .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
    } else {
        return Err(UrlError::MissingHost);
    }

    // Strip the default port; Url::set_port rejects a no-op so only touch
    // explicit defaults
    let default_port = match url.scheme() {
        "http" => 80,
        _ => 443,
    };
    if url.port() == Some(default_port) {
        url.set_port(None)
            .map_err(|_| UrlError::Malformed("Failed to clear default port".to_string()))?;
    }

    // Normalize path
    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    // Remove fragment
    url.set_fragment(None);

    // Filter and sort query parameters
    if url.query().is_some() {
        let filtered_params = filter_and_sort_query_params(&url);

        if filtered_params.is_empty() {
            url.set_query(None);
        } else {
            let query_string = filtered_params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query_string));
        }
    }

    Ok(url)
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let segments: Vec<&str> = path.split('/').collect();
    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in segments {
        match segment {
            // Skip empty segments (from duplicate slashes) and current directory markers
            "" | "." => continue,
            ".." => {
                if !normalized_segments.is_empty() {
                    normalized_segments.pop();
                }
            }
            _ => normalized_segments.push(segment),
        }
    }

    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", normalized_segments.join("/"))
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
