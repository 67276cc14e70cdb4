//! URL canonicalization and host variants for candidate probing.

use std::net::IpAddr;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("missing host: {0}")]
    MissingHost(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a site URL before any strategy runs.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing (`example.com` -> `https://example.com/`)
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if has_scheme(trimmed) {
        trimmed.to_string()
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("https://{trimmed}")
    };

    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .map(str::to_lowercase)
        .ok_or_else(|| UrlError::MissingHost(trimmed.to_string()))?;
    parsed
        .set_host(Some(&host))
        .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Whether the input starts with `scheme://`.
///
/// Only the text before the first `/`, `?` or `#` can name a scheme, so a
/// URL embedded in the query of a schemeless input does not count.
fn has_scheme(input: &str) -> bool {
    let head = input.split(['/', '?', '#']).next().unwrap_or_default();
    head.len() > 1 && head.ends_with(':') && input[head.len()..].starts_with("//")
}

/// Whether a `www.` variant of this host makes sense (not an IP literal or single label).
fn supports_www(host: &str) -> bool {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    bare.parse::<IpAddr>().is_err() && host.contains('.')
}

/// The `www.`-prefixed form of a host, if it differs from the input.
pub fn www_host(host: &str) -> Option<String> {
    if host.starts_with("www.") || !supports_www(host) { None } else { Some(format!("www.{host}")) }
}

/// Host variants to probe, `www.` first.
///
/// `example.com` -> `[www.example.com, example.com]`,
/// `www.example.com` -> `[www.example.com, example.com]`,
/// IP literals and single-label hosts yield only themselves.
pub fn host_variants(host: &str) -> Vec<String> {
    if let Some(bare) = host.strip_prefix("www.")
        && !bare.is_empty()
    {
        return vec![host.to_string(), bare.to_string()];
    }
    match www_host(host) {
        Some(www) => vec![www, host.to_string()],
        None => vec![host.to_string()],
    }
}

/// Strip scheme prefixes, path, port and surrounding punctuation from a host-ish string.
///
/// Used to build the domain parameter of the lookup service.
pub fn clean_host(input: &str) -> Option<String> {
    let mut s = input.trim();
    for prefix in ["https://", "http://", "//"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest;
        }
    }

    let s = s.split(['/', '?', '#']).next().unwrap_or("");
    let s = match s.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => s,
    };
    let s = s.trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());

    if s.is_empty() { None } else { Some(s.to_lowercase()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_basic() {
        let url = canonicalize("https://example.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("example.com").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn test_canonicalize_schemeless_with_url_in_query() {
        let url = canonicalize("example.com/go?u=https://x.org").unwrap();
        assert_eq!(url.as_str(), "https://example.com/go?u=https://x.org");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_canonicalize_schemeless_with_port() {
        let url = canonicalize("example.com:8080/a").unwrap();
        assert_eq!(url.as_str(), "https://example.com:8080/a");
    }

    #[test]
    fn test_has_scheme() {
        assert!(has_scheme("https://a.com"));
        assert!(has_scheme("ftp://a.com/x"));
        assert!(!has_scheme("a.com/r?next=http://b.com"));
        assert!(!has_scheme("a.com#http://b.com"));
        assert!(!has_scheme("//a.com"));
    }

    #[test]
    fn test_canonicalize_protocol_relative() {
        let url = canonicalize("//cdn.example.com/page").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/page");
    }

    #[test]
    fn test_canonicalize_lowercase_host() {
        let url = canonicalize("https://EXAMPLE.COM").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_canonicalize_remove_fragment_keep_query() {
        let url = canonicalize("https://example.com/path?a=1&b=2#section").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.path(), "/path");
        assert_eq!(url.query(), Some("a=1&b=2"));
    }

    #[test]
    fn test_canonicalize_trim_whitespace() {
        let url = canonicalize("  https://example.com  ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn test_canonicalize_unsupported_scheme() {
        let result = canonicalize("ftp://example.com/file");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_canonicalize_empty() {
        assert!(matches!(canonicalize(""), Err(UrlError::Empty)));
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_canonicalize_garbage() {
        assert!(canonicalize("https://").is_err());
        assert!(canonicalize("not a url at all").is_err());
    }

    #[test]
    fn test_host_variants() {
        assert_eq!(host_variants("example.com"), vec!["www.example.com", "example.com"]);
        assert_eq!(host_variants("www.example.com"), vec!["www.example.com", "example.com"]);
        assert_eq!(host_variants("127.0.0.1"), vec!["127.0.0.1"]);
        assert_eq!(host_variants("localhost"), vec!["localhost"]);
    }

    #[test]
    fn test_www_host() {
        assert_eq!(www_host("example.com").as_deref(), Some("www.example.com"));
        assert_eq!(www_host("www.example.com"), None);
        assert_eq!(www_host("[::1]"), None);
    }

    #[test]
    fn test_clean_host() {
        assert_eq!(clean_host("https://Example.com/path").as_deref(), Some("example.com"));
        assert_eq!(clean_host("http://www.example.com:8080").as_deref(), Some("www.example.com"));
        assert_eq!(clean_host("  .example.com. ").as_deref(), Some("example.com"));
        assert_eq!(clean_host("https://"), None);
    }
}
