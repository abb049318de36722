//! Identity resolution: pure functions mapping a raw request URL to its
//! ledger identity, its display label, and its query-agnostic endpoint key.

use overwire_proto::UrlPattern;
use url::Url;

/// Outcome of matching a URL against the pattern list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub is_match: bool,
    pub matched_pattern: Option<String>,
}

impl MatchResult {
    fn miss() -> Self {
        Self {
            is_match: false,
            matched_pattern: None,
        }
    }
}

/// Match a URL against the pattern list: substring containment, enabled
/// patterns only, first match in list order wins.
pub fn matches(url: &str, patterns: &[UrlPattern]) -> MatchResult {
    for pattern in patterns.iter().filter(|p| p.enabled) {
        if url.contains(&pattern.pattern) {
            return MatchResult {
                is_match: true,
                matched_pattern: Some(pattern.pattern.clone()),
            };
        }
    }
    MatchResult::miss()
}

/// Ledger identity for a request URL: the URL with a single trailing slash
/// stripped. No percent-decoding, no query normalization.
pub fn identity(url: &str) -> String {
    url.strip_suffix('/').unwrap_or(url).to_string()
}

/// Human-readable endpoint label: the last non-empty path segment.
///
/// Returns `"root"` when the path has no segments. If the URL does not
/// parse, falls back to naive slash-splitting of the raw string with any
/// query suffix stripped, and `"unknown-endpoint"` when nothing usable
/// remains.
pub fn endpoint_label(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        return parsed
            .path()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .next_back()
            .map_or_else(|| "root".to_string(), ToString::to_string);
    }

    let last = url
        .split('/')
        .filter(|part| !part.is_empty() && !part.contains("://"))
        .next_back()
        .map(|part| part.split('?').next().unwrap_or(part))
        .unwrap_or("");

    if last.is_empty() {
        "unknown-endpoint".to_string()
    } else {
        last.to_string()
    }
}

/// Query-agnostic endpoint key: origin + path, with a single trailing slash
/// stripped. Redirect rules and the override indexes are keyed by this, so
/// every query variant of a path shares one override.
pub fn normalized_key(url: &str) -> String {
    let key = match Url::parse(url) {
        Ok(parsed) => format!("{}{}", parsed.origin().ascii_serialization(), parsed.path()),
        Err(_) => {
            let no_fragment = url.split('#').next().unwrap_or(url);
            no_fragment.split('?').next().unwrap_or(no_fragment).to_string()
        }
    };
    identity(&key)
}
