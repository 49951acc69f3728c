//! URL validation for user input and extractor output.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::core::error::{RelayError, RelayResult};

/// Scheme, then a domain / `localhost` / IPv4 host, optional port, optional path or query.
#[allow(clippy::expect_used)]
pub static URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)^(?:http|ftp)s?://",
        r"(?:(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+(?:[A-Z]{2,6}\.?|[A-Z0-9-]{2,}\.?)|",
        r"localhost|",
        r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})",
        r"(?::\d+)?",
        r"(?:/?|[/?]\S+)$",
    ))
    .expect("url regex")
});

/// Characters that commonly wrap a link pasted into chat text.
const WRAPPING_CHARS: &[char] = &['<', '>', '(', ')', '"', '\'', ',', ';'];

/// Returns true if `candidate` looks like a fetchable URL.
pub fn is_valid_url(candidate: &str) -> bool {
    URL_REGEX.is_match(candidate)
}

/// Pulls every valid URL out of a chat message, in order of appearance.
///
/// Duplicates are dropped and at most `limit` URLs are returned.
pub fn extract_urls(text: &str, limit: usize) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for token in text.split_whitespace() {
        if urls.len() >= limit {
            break;
        }
        let token = token.trim_matches(WRAPPING_CHARS);
        if is_valid_url(token) && !urls.iter().any(|u| u == token) {
            urls.push(token.to_string());
        }
    }
    urls
}

/// Like [`extract_urls`], but parsed. Fails with `InvalidUrl` when the message holds no usable URL.
pub fn parse_urls(text: &str, limit: usize) -> RelayResult<Vec<Url>> {
    let urls: Vec<Url> = extract_urls(text, limit)
        .iter()
        .filter_map(|raw| Url::parse(raw).ok())
        .collect();
    if urls.is_empty() {
        let preview: String = text.trim().chars().take(64).collect();
        return Err(RelayError::InvalidUrl(preview));
    }
    Ok(urls)
}
