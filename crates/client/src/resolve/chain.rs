//! Per-job strategy chain: declared HTML link, well-known paths, lookup service.
//!
//! A failing strategy never fails the job; it is logged and the next one
//! runs. Only cancellation escapes early, and exhausting every strategy
//! yields [`Error::NoIconFound`].

use bytes::Bytes;
use favr_core::Error;
use serde::{Deserialize, Serialize};
use url::Url;

use super::candidates::{fallback_service_urls, standard_locations};
use crate::extract::extract_icon_link;
use crate::fetch::{IconFetcher, Page, www_host};
use crate::tasks::CancelToken;

/// Which strategy produced an icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Html,
    StandardLocations,
    FallbackService,
}

/// Image bytes plus where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIcon {
    pub bytes: Bytes,
    pub content_type: String,
    pub source_url: Url,
    pub strategy: Strategy,
}

#[derive(Clone)]
pub struct StrategyChain {
    fetcher: IconFetcher,
    fallback_service: Url,
    fallback_icon_size: u32,
}

impl StrategyChain {
    pub fn new(fetcher: IconFetcher, fallback_service: Url, fallback_icon_size: u32) -> Self {
        Self { fetcher, fallback_service, fallback_icon_size }
    }

    /// Resolve an icon for an already canonicalized site URL.
    pub async fn run(&self, site: &Url, cancel: &CancelToken) -> Result<ResolvedIcon, Error> {
        if let Some(icon) = self.try_html(site, cancel).await? {
            return Ok(icon);
        }

        for candidate in standard_locations(site) {
            if let Some(icon) = self.try_candidate(&candidate, Strategy::StandardLocations, cancel).await? {
                return Ok(icon);
            }
        }

        let host = site.host_str().unwrap_or_default();
        for candidate in fallback_service_urls(&self.fallback_service, host, self.fallback_icon_size) {
            if let Some(icon) = self.try_candidate(&candidate, Strategy::FallbackService, cancel).await? {
                return Ok(icon);
            }
        }

        tracing::debug!(site = %site, "every strategy exhausted");
        Err(Error::NoIconFound(site.to_string()))
    }

    async fn try_html(&self, site: &Url, cancel: &CancelToken) -> Result<Option<ResolvedIcon>, Error> {
        let Some(page) = self.fetch_page_with_retry(site, cancel).await? else {
            return Ok(None);
        };

        let Some(href) = extract_icon_link(&page.html, &page.final_url) else {
            tracing::debug!(page = %page.final_url, "no icon link declared");
            return Ok(None);
        };

        match Url::parse(&href) {
            Ok(candidate) => self.try_candidate(&candidate, Strategy::Html, cancel).await,
            Err(e) => {
                tracing::debug!(href = %href, error = %e, "declared icon link is not a URL");
                Ok(None)
            }
        }
    }

    /// Fetch the site page; on a transport failure retry once on the `www.` host.
    async fn fetch_page_with_retry(&self, site: &Url, cancel: &CancelToken) -> Result<Option<Page>, Error> {
        cancel.check()?;
        let err = match self.fetcher.fetch_page(site).await {
            Ok(page) => return Ok(Some(page)),
            Err(e) => e,
        };
        if matches!(err, Error::Cancelled) {
            return Err(err);
        }

        let retry = if err.is_transport() { with_www(site) } else { None };
        let Some(retry) = retry else {
            tracing::debug!(site = %site, error = %err, "page fetch failed");
            return Ok(None);
        };

        tracing::debug!(site = %site, retry = %retry, error = %err, "page fetch failed; retrying on www host");
        cancel.check()?;
        match self.fetcher.fetch_page(&retry).await {
            Ok(page) => Ok(Some(page)),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                tracing::debug!(site = %retry, error = %e, "page fetch failed");
                Ok(None)
            }
        }
    }

    async fn try_candidate(
        &self, candidate: &Url, strategy: Strategy, cancel: &CancelToken,
    ) -> Result<Option<ResolvedIcon>, Error> {
        cancel.check()?;
        match self.fetcher.fetch_image(candidate).await {
            Ok(image) => {
                tracing::debug!(candidate = %candidate, ?strategy, bytes = image.bytes.len(), "icon resolved");
                Ok(Some(ResolvedIcon {
                    bytes: image.bytes,
                    content_type: image.content_type,
                    source_url: image.url,
                    strategy,
                }))
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                tracing::debug!(candidate = %candidate, ?strategy, error = %e, "candidate failed");
                Ok(None)
            }
        }
    }
}

fn with_www(site: &Url) -> Option<Url> {
    let host = www_host(site.host_str()?)?;
    let mut url = site.clone();
    url.set_host(Some(&host)).ok()?;
    Some(url)
}
