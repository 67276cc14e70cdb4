//! Icon link discovery in raw HTML.
//!
//! A single non-validating pass over `<link>` tags; no DOM is built.

use regex::{Captures, Regex};
use std::sync::OnceLock;
use url::Url;

static LINK_TAG: OnceLock<Regex> = OnceLock::new();
static ATTR_REL: OnceLock<Regex> = OnceLock::new();
static ATTR_HREF: OnceLock<Regex> = OnceLock::new();

fn regex(pattern: &'static str, desc: &'static str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid {desc} regex: {err}"))
}

fn capture_first<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    [1, 2, 3].iter().find_map(|idx| caps.get(*idx).map(|m| m.as_str()))
}

/// Preference of a `rel` value; lower wins, `None` means not an icon link.
///
/// 0. exactly `icon` or `shortcut icon`
/// 1. `apple-touch-icon` (and its `-precomposed` form)
/// 2. any other rel list containing `icon`
/// 3. `mask-icon`
fn rel_rank(rel: &str) -> Option<u8> {
    let rel = rel.trim().to_ascii_lowercase();
    let tokens: Vec<&str> = rel.split_whitespace().collect();

    if tokens == ["icon"] || tokens == ["shortcut", "icon"] {
        return Some(0);
    }
    if tokens
        .iter()
        .any(|t| matches!(*t, "apple-touch-icon" | "apple-touch-icon-precomposed"))
    {
        return Some(1);
    }
    if tokens.contains(&"icon") {
        return Some(2);
    }
    if tokens.contains(&"mask-icon") {
        return Some(3);
    }
    None
}

/// Find the best declared icon link in `html` and make it absolute.
///
/// Returns `None` when no icon link is declared, or when the best one is a
/// `data:` URI (nothing to fetch).
pub fn extract_icon_link(html: &str, base_url: &Url) -> Option<String> {
    let link_tag = LINK_TAG.get_or_init(|| regex(r"(?is)<link\b[^>]*>", "link tag"));
    let attr_rel = ATTR_REL.get_or_init(|| {
        regex(r#"(?is)(?:^|\s)rel\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#, "rel attr")
    });
    let attr_href = ATTR_HREF.get_or_init(|| {
        regex(r#"(?is)(?:^|\s)href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#, "href attr")
    });

    let mut best: Option<(u8, &str)> = None;
    for tag in link_tag.find_iter(html) {
        let tag = tag.as_str();
        let Some(rank) = attr_rel.captures(tag).and_then(|c| capture_first(&c)).and_then(rel_rank) else {
            continue;
        };
        let Some(href) = attr_href.captures(tag).and_then(|c| capture_first(&c)).map(str::trim) else {
            continue;
        };
        if href.is_empty() {
            continue;
        }

        if best.is_none_or(|(current, _)| rank < current) {
            best = Some((rank, href));
            if rank == 0 {
                break;
            }
        }
    }

    let (_, href) = best?;
    resolve_href(&href.replace("&amp;", "&"), base_url)
}

/// Make an href absolute against the page URL.
fn resolve_href(href: &str, base_url: &Url) -> Option<String> {
    let lower = href.to_ascii_lowercase();
    if lower.starts_with("data:") {
        return None;
    }
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Some(href.to_string());
    }
    if href.starts_with("//") {
        return Some(format!("https:{href}"));
    }
    base_url.join(href).ok().map(|u| u.to_string())
}
