/// Checks if a host matches an allowed-host pattern
///
/// Two pattern forms are supported:
/// 1. Exact match: "news.example" matches only "news.example"
/// 2. Wildcard match: "*.news.example" matches:
///    - "news.example" (the bare host)
///    - "sport.news.example" (single subdomain)
///    - "live.sport.news.example" (nested subdomains)
///
/// Hosts are normalized to lowercase before matching; the function itself is
/// case-sensitive.
///
/// # Arguments
///
/// * `pattern` - The host pattern, optionally starting with "*."
/// * `candidate` - The host to check against the pattern
pub fn matches_host_pattern(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        // Wildcard pattern: matches the base host itself or any subdomain
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        // Exact match only
        candidate == pattern
    }
}
