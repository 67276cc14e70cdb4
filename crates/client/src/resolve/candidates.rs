//! Candidate icon URLs for the well-known-path and lookup-service strategies.

use url::Url;

use crate::fetch::{clean_host, host_variants};

/// Paths probed on every host variant, in order.
pub const WELL_KNOWN_PATHS: &[&str] = &[
    "/favicon.ico",
    "/favicon.png",
    "/assets/favicon.ico",
    "/static/favicon.ico",
    "/images/favicon.ico",
];

const SCHEMES: &[&str] = &["https", "http"];

/// Well-known favicon locations for the site's host.
///
/// Scheme is the outer loop (`https` first), host variant the middle loop
/// (`www.` first), path the inner loop. A non-default port is kept.
pub fn standard_locations(site: &Url) -> Vec<Url> {
    let Some(host) = site.host_str() else {
        return Vec::new();
    };
    let port = site.port().map(|p| format!(":{p}")).unwrap_or_default();
    let variants = host_variants(host);

    let mut out = Vec::with_capacity(SCHEMES.len() * variants.len() * WELL_KNOWN_PATHS.len());
    for scheme in SCHEMES {
        for variant in &variants {
            for path in WELL_KNOWN_PATHS {
                if let Ok(url) = Url::parse(&format!("{scheme}://{variant}{port}{path}")) {
                    out.push(url);
                }
            }
        }
    }
    out
}

/// Lookup-service requests for the site's host, `www.` variant first.
///
/// Each candidate is `service?domain=<host>&sz=<size>`.
pub fn fallback_service_urls(service: &Url, site_host: &str, size: u32) -> Vec<Url> {
    let Some(host) = clean_host(site_host) else {
        return Vec::new();
    };
    let bare = host.strip_prefix("www.").filter(|h| !h.is_empty()).unwrap_or(&host);
    let size = size.to_string();

    host_variants(bare)
        .into_iter()
        .map(|domain| {
            let mut url = service.clone();
            url.query_pairs_mut().append_pair("domain", &domain).append_pair("sz", &size);
            url
        })
        .collect()
}
