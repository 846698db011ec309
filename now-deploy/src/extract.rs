//! Best-effort URL extraction from deployment tool output.
//!
//! The `now` CLI prints the deployment URL somewhere in its log output; this
//! takes the first URL-shaped substring in document order, never the "best"
//! one. Textual extraction only, no structural understanding of the log.

use regex::Regex;

const URL_PATTERN: &str = r#"(?i)https?://[^\s"'<>]+"#;

/// First URL in `text`, normalized, or `None` when nothing URL-shaped
/// appears.
pub fn first_url(text: &str) -> Option<String> {
    let re = Regex::new(URL_PATTERN).ok()?;
    re.find_iter(text)
        .filter_map(|m| normalize(m.as_str()))
        .next()
}

/// Normalizes a URL candidate: trims surrounding whitespace and trailing
/// dots, lowercases scheme and host, drops default ports and a bare trailing
/// slash. Idempotent.
pub fn normalize(raw: &str) -> Option<String> {
    let cleaned = raw.trim().trim_end_matches('.');
    let url = reqwest::Url::parse(cleaned).ok()?;
    let mut rendered = url.to_string();
    if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
        rendered.truncate(rendered.len() - 1);
    }
    Some(rendered)
}
