//! Article extraction ("readability" cleansing)
//!
//! Given fetched HTML, this module isolates the main article content and
//! discards boilerplate. The heuristic: after skipping script/style/nav/ad
//! subtrees, the candidate container with the highest ratio of text length to
//! markup length that clears the configured text-length floor is the article
//! body. Pages where no candidate clears the floor (listing pages, index
//! pages) are reported as not-an-article — a recoverable condition, since
//! their links still feed the frontier.

use crate::config::ExtractionConfig;
use crate::storage::Article;
use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

/// Extraction failures
///
/// None of these are fatal to a crawl; the fetch itself succeeded.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("No article content found (best candidate {best_len} chars, threshold {min_len})")]
    NotArticle { best_len: usize, min_len: usize },

    #[error("No headline found")]
    NoHeadline,
}

/// Class/id substrings that mark a subtree as boilerplate
const NOISE_MARKERS: &[&str] = &[
    "advert",
    "promo",
    "related",
    "share",
    "social",
    "comment",
    "sidebar",
    "breadcrumb",
    "newsletter",
    "subscribe",
    "cookie",
    "banner",
];

/// Class tokens that mark a subtree as an ad slot
const AD_TOKENS: &[&str] = &["ad", "ads", "advertisement"];

/// Tags that never contribute article text
const NOISE_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "aside", "footer", "form", "iframe", "svg", "button",
    "figure",
];

/// File extensions that cannot be article pages (skipped during link discovery)
const BINARY_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".ico", ".webp", ".svg", ".css", ".js", ".pdf", ".zip",
    ".rar", ".gz", ".xz", ".exe", ".mp3", ".mp4", ".avi", ".mov", ".wmv", ".swf", ".flv",
];

/// Extracts an article from fetched HTML
///
/// # Arguments
///
/// * `html` - The raw page HTML
/// * `url` - The normalized URL the page was fetched under (becomes the
///   article key)
/// * `config` - Extraction thresholds
///
/// # Returns
///
/// * `Ok(Article)` - Headline, optional author/date, and cleansed body text
/// * `Err(ExtractError)` - The page is not an article (recoverable)
pub fn extract_article(
    html: &str,
    url: &Url,
    config: &ExtractionConfig,
) -> Result<Article, ExtractError> {
    let document = Html::parse_document(html);

    let body_text = extract_body_text(&document, config.min_article_text_length)?;
    let headline = extract_headline(&document).ok_or(ExtractError::NoHeadline)?;
    let author = extract_author(&document);
    let published_at = extract_published_at(&document);

    Ok(Article {
        url: url.as_str().to_string(),
        headline,
        author,
        body_text,
        published_at,
    })
}

/// Finds the densest text block and returns its cleansed text
fn extract_body_text(document: &Html, min_len: usize) -> Result<String, ExtractError> {
    let candidate_selector =
        Selector::parse("article, main, section, div").expect("static selector");

    let mut best: Option<(f64, usize, String)> = None;
    let mut best_len_seen = 0;

    for candidate in document.select(&candidate_selector) {
        if is_noise_element(&candidate) {
            continue;
        }

        let text = paragraph_text(&candidate);
        let text_len = text.chars().count();
        best_len_seen = best_len_seen.max(text_len);

        if text_len < min_len {
            continue;
        }

        let markup_len = candidate.html().len().max(1);
        let density = text_len as f64 / markup_len as f64;

        let better = match &best {
            // Prefer higher density; on equal density keep the longer text
            Some((best_density, best_text_len, _)) => {
                density > *best_density
                    || (density == *best_density && text_len > *best_text_len)
            }
            None => true,
        };

        if better {
            best = Some((density, text_len, text));
        }
    }

    match best {
        Some((_, _, text)) => Ok(text),
        None => Err(ExtractError::NotArticle {
            best_len: best_len_seen,
            min_len,
        }),
    }
}

/// Collects a container's paragraph text, skipping noise subtrees
///
/// Prefers `<p>` descendants joined by blank lines; a container without
/// paragraphs falls back to its whole cleansed text.
fn paragraph_text(container: &ElementRef<'_>) -> String {
    let p_selector = Selector::parse("p").expect("static selector");

    let paragraphs: Vec<String> = container
        .select(&p_selector)
        .filter(|p| !has_noise_ancestor_within(p, container))
        .map(|p| squash_whitespace(&clean_text(&p)))
        .filter(|t| !t.is_empty())
        .collect();

    if paragraphs.is_empty() {
        squash_whitespace(&clean_text(container))
    } else {
        paragraphs.join("\n\n")
    }
}

/// Recursively collects text under an element, skipping noise subtrees
fn clean_text(element: &ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(element, &mut out);
    out
}

fn collect_text(element: &ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if !is_noise_element(&child_el) {
                collect_text(&child_el, out);
                out.push(' ');
            }
        }
    }
}

/// Checks whether any ancestor of `element`, up to (excluding) `container`,
/// is a noise element
fn has_noise_ancestor_within(element: &ElementRef<'_>, container: &ElementRef<'_>) -> bool {
    for ancestor in element.ancestors() {
        if ancestor.id() == container.id() {
            return false;
        }
        if let Some(ancestor_el) = ElementRef::wrap(ancestor) {
            if is_noise_element(&ancestor_el) {
                return true;
            }
        }
    }
    false
}

/// Checks whether an element roots a boilerplate subtree
fn is_noise_element(element: &ElementRef<'_>) -> bool {
    let tag = element.value().name();
    if NOISE_TAGS.contains(&tag) {
        return true;
    }

    let attr_blob = format!(
        "{} {}",
        element.value().attr("class").unwrap_or(""),
        element.value().attr("id").unwrap_or("")
    )
    .to_lowercase();

    if NOISE_MARKERS.iter().any(|m| attr_blob.contains(m)) {
        return true;
    }

    // "ad" only matches as a whole class/id token; substrings like
    // "header" or "shadow" must not trip it
    attr_blob
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| AD_TOKENS.contains(&token))
}

/// Extracts the headline: primary heading, then og:title, then `<title>`
fn extract_headline(document: &Html) -> Option<String> {
    let h1_selector = Selector::parse("h1").expect("static selector");
    for h1 in document.select(&h1_selector) {
        let text = squash_whitespace(&clean_text(&h1));
        if !text.is_empty() {
            return Some(text);
        }
    }

    if let Some(title) = meta_content(document, "meta[property='og:title']") {
        return Some(title);
    }

    let title_selector = Selector::parse("title").expect("static selector");
    document
        .select(&title_selector)
        .next()
        .map(|el| squash_whitespace(&el.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

/// Extracts the author from recognized byline markers
fn extract_author(document: &Html) -> Option<String> {
    if let Some(author) = meta_content(document, "meta[name='author']") {
        return Some(author);
    }

    for css in ["[rel='author']", "[itemprop='author']", "[class*='byline']"] {
        let selector = Selector::parse(css).expect("static selector");
        if let Some(el) = document.select(&selector).next() {
            let text = squash_whitespace(&el.text().collect::<String>());
            let text = text.strip_prefix("By ").unwrap_or(&text).to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    None
}

/// Extracts the publish date from recognized metadata fields, as RFC 3339 UTC
fn extract_published_at(document: &Html) -> Option<String> {
    let mut raw: Option<String> = None;

    for css in [
        "meta[property='article:published_time']",
        "meta[itemprop='datePublished']",
        "meta[name='date']",
        "meta[name='pubdate']",
    ] {
        if let Some(value) = meta_content(document, css) {
            raw = Some(value);
            break;
        }
    }

    if raw.is_none() {
        let time_selector = Selector::parse("time[datetime]").expect("static selector");
        raw = document
            .select(&time_selector)
            .next()
            .and_then(|el| el.value().attr("datetime"))
            .map(String::from);
    }

    raw.as_deref().and_then(parse_date)
}

/// Parses a date string into RFC 3339 UTC
fn parse_date(raw: &str) -> Option<String> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).to_rfc3339());
    }

    // Bare dates are common in name=date metas
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let dt = date.and_hms_opt(0, 0, 0)?.and_utc();
        return Some(dt.to_rfc3339());
    }

    None
}

/// Reads the content attribute of the first element matching a meta selector
fn meta_content(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| squash_whitespace(s))
        .filter(|s| !s.is_empty())
}

/// Collapses whitespace runs into single spaces and trims
fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts outbound links from fetched HTML
///
/// Runs on every fetched page, article or not, so listing pages still feed
/// the frontier. Resolves relative hrefs against the base URL and drops
/// non-http(s) schemes, fragments, and obvious binary targets.
///
/// # Arguments
///
/// * `html` - The raw page HTML
/// * `base_url` - The base URL for resolving relative links
///
/// # Returns
///
/// Absolute URLs found in the page, in document order
pub fn extract_links(html: &str, base_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let a_selector = Selector::parse("a[href]").expect("static selector");

    let mut links = Vec::new();
    for element in document.select(&a_selector) {
        if element.value().attr("download").is_some() {
            continue;
        }

        if let Some(href) = element.value().attr("href") {
            if let Some(absolute) = resolve_link(href, base_url) {
                links.push(absolute);
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel:, data: schemes
/// - fragment-only links
/// - binary file extensions
/// - non-http(s) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;

    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }

    let path = absolute.path().to_lowercase();
    if BINARY_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return None;
    }

    Some(absolute.to_string())
}
