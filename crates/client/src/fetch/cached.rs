//! Cache-first fetcher used by every strategy.
//!
//! Each request is keyed by method, URL and its fixed header set. A cache hit
//! with a non-empty body returns without network I/O; a successful network
//! response is stored before it is returned.

use std::sync::Arc;

use bytes::Bytes;
use favr_core::cache::hash::compute_cache_key;
use favr_core::{CachedResponse, Error, ResponseCache};
use reqwest::Url;

use super::{FetchResponse, HTML_ACCEPT, HttpTransport, IMAGE_ACCEPT};

/// Image bytes fetched for a candidate URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub url: Url,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Decoded HTML page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Where the page ended up after redirects; relative links resolve against it.
    pub final_url: Url,
    pub html: String,
}

/// Transport plus resolution cache.
#[derive(Clone)]
pub struct IconFetcher {
    transport: Arc<dyn HttpTransport>,
    cache: ResponseCache,
    user_agent: String,
}

impl IconFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, cache: ResponseCache, user_agent: impl Into<String>) -> Self {
        Self { transport, cache, user_agent: user_agent.into() }
    }

    fn cache_key(&self, url: &Url, accept: &str) -> String {
        compute_cache_key("GET", url.as_str(), &format!("{accept}\n{}", self.user_agent))
    }

    /// Fetch `url` as an image.
    ///
    /// Fails unless the response is a 200 with a non-empty body whose
    /// content type starts with `image/`.
    pub async fn fetch_image(&self, url: &Url) -> Result<FetchedImage, Error> {
        let key = self.cache_key(url, IMAGE_ACCEPT);

        if let Some(hit) = self.cache.get(&key).await
            && hit.is_image()
        {
            return Ok(FetchedImage {
                url: url.clone(),
                content_type: hit.content_type.unwrap_or_default(),
                bytes: hit.body,
            });
        }

        let response = self.transport.get(url, IMAGE_ACCEPT).await?;
        let content_type = check_image(&response)?;

        self.cache
            .put(CachedResponse::new(
                key,
                url.as_str(),
                Some(content_type.clone()),
                response.status.as_u16(),
                response.bytes.clone(),
            ))
            .await;

        Ok(FetchedImage { url: url.clone(), content_type, bytes: response.bytes })
    }

    /// Fetch `url` as an HTML page and decode it as UTF-8.
    pub async fn fetch_page(&self, url: &Url) -> Result<Page, Error> {
        let key = self.cache_key(url, HTML_ACCEPT);

        if let Some(hit) = self.cache.get(&key).await {
            let final_url = Url::parse(&hit.url).unwrap_or_else(|_| url.clone());
            return decode_page(final_url, &hit.body);
        }

        let response = self.transport.get(url, HTML_ACCEPT).await?;
        if !response.status.is_success() {
            return Err(Error::HttpError { status: response.status.as_u16(), url: url.to_string() });
        }

        let page = decode_page(response.final_url.clone(), &response.bytes)?;

        self.cache
            .put(CachedResponse::new(
                key,
                response.final_url.as_str(),
                response.content_type,
                response.status.as_u16(),
                response.bytes,
            ))
            .await;

        Ok(page)
    }
}

fn check_image(response: &FetchResponse) -> Result<String, Error> {
    if response.status != reqwest::StatusCode::OK {
        return Err(Error::HttpError { status: response.status.as_u16(), url: response.url.to_string() });
    }
    if response.bytes.is_empty() {
        return Err(Error::InvalidImageData(format!("empty body from {}", response.url)));
    }

    match response.content_type.as_deref().map(str::trim) {
        Some(ct) if ct.to_ascii_lowercase().starts_with("image/") => Ok(ct.to_string()),
        other => Err(Error::InvalidImageData(format!(
            "{} served {}",
            response.url,
            other.unwrap_or("no content type")
        ))),
    }
}

fn decode_page(final_url: Url, body: &[u8]) -> Result<Page, Error> {
    let html = std::str::from_utf8(body)
        .map_err(|e| Error::HtmlParseFailure(format!("{final_url}: {e}")))?
        .to_string();
    Ok(Page { final_url, html })
}
