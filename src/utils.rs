//! Helpers shared by the scrapers, the oracle adapters and the store.
//!
//! - URL validation and link resolution
//! - String truncation for logging
//! - Cleanup of model output before JSON parsing
//! - Database directory preparation

use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Whether `url` can identify an article: non-empty and `http(s)`.
///
/// Rows failing this check are never fetched or summarized.
pub fn is_addressable_url(url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() {
        return false;
    }
    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

/// Resolve a link found on a page against `base`.
///
/// Protocol-relative links (`//host/path`) are forced to `https`.
/// Returns `None` for empty or unresolvable links.
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if let Some(rest) = href.strip_prefix("//") {
        return Url::parse(&format!("https://{rest}")).ok().map(String::from);
    }
    base.join(href).ok().map(String::from)
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a char boundary) with the
/// number of dropped bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Strip a surrounding Markdown code fence (```json ... ```) from model output.
pub fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Make sure the directory holding the database file exists.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_parent_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).await?;
            info!(dir = %parent.display(), "Database directory ready");
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_addressable_url() {
        assert!(is_addressable_url("https://x"));
        assert!(is_addressable_url("http://techcrunch.com/a"));
        assert!(!is_addressable_url(""));
        assert!(!is_addressable_url("   "));
        assert!(!is_addressable_url("not-a-url"));
        assert!(!is_addressable_url("ftp://example.com/file"));
        assert!(!is_addressable_url("mailto:someone@example.com"));
    }

    #[test]
    fn test_resolve_link() {
        let base = Url::parse("https://www.wired.com").unwrap();
        assert_eq!(
            resolve_link(&base, "/story/robots/").as_deref(),
            Some("https://www.wired.com/story/robots/")
        );
        assert_eq!(
            resolve_link(&base, "//media.wired.com/photo.jpg").as_deref(),
            Some("https://media.wired.com/photo.jpg")
        );
        assert_eq!(
            resolve_link(&base, "https://techcrunch.com/a").as_deref(),
            Some("https://techcrunch.com/a")
        );
        assert_eq!(resolve_link(&base, "  "), None);
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let result = truncate_for_log("ééé", 3);
        assert!(result.starts_with('é'));
    }

    #[test]
    fn test_looks_truncated() {
        let result: Result<serde_json::Value, _> = serde_json::from_str(r#"{"articles": ["#);
        assert!(looks_truncated(&result.unwrap_err()));
        let result: Result<serde_json::Value, _> = serde_json::from_str("nope");
        assert!(!looks_truncated(&result.unwrap_err()));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```\n"), "{\"a\":1}");
    }
}
