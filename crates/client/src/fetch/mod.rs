//! HTTP fetch pipeline for page and image requests.
//!
//! ### URL Canonicalization
//! - Trim whitespace, ensure scheme (default: `https`)
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### Request identity
//! - Browser-like `User-Agent` on every request
//! - `Accept` chosen per request kind ([`HTML_ACCEPT`] or [`IMAGE_ACCEPT`])
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//!
//! Non-2xx statuses are returned to the caller, not raised, so the cached
//! fetcher decides what counts as a failed candidate.

pub mod cached;
pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use reqwest::{Client, StatusCode, header};
use std::time::{Duration, Instant};

pub use cached::{FetchedImage, IconFetcher, Page};
pub use self::url::{UrlError, canonicalize, clean_host, host_variants, www_host};

use favr_core::{AppConfig, Error};

/// Accept header for page fetches.
pub const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Accept header for image fetches.
pub const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: desktop Safari)
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Per-request timeout (default: 10s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

impl FetchConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: 5,
        }
    }
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The URL requested
    pub url: Url,
    /// The final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Content-Type header
    pub content_type: Option<String>,
    /// Response body bytes
    pub bytes: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

/// A single HTTP GET.
///
/// The resolver only talks to the network through this trait, so tests can
/// swap in an in-memory transport.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET with the given `Accept` header.
    ///
    /// Returns `Ok` for any HTTP status; `Err` only for transport-level
    /// failures (connect, TLS, timeout, oversized body).
    async fn get(&self, url: &Url, accept: &str) -> Result<FetchResponse, Error>;
}

/// reqwest-backed transport shared by every job of a resolver session.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
    config: FetchConfig,
}

impl ReqwestTransport {
    /// Create a new transport with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::TransportError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    fn too_large(&self, len: usize) -> Error {
        Error::FetchTooLarge(format!("{len} bytes exceeds {}", self.config.max_bytes))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url, accept: &str) -> Result<FetchResponse, Error> {
        let start = Instant::now();

        let response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, accept)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(self.too_large(len as usize));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;

        if bytes.len() > self.config.max_bytes {
            return Err(self.too_large(bytes.len()));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            url = %url,
            final_url = %final_url,
            status = status.as_u16(),
            bytes = bytes.len(),
            fetch_ms,
            "fetched"
        );

        Ok(FetchResponse { url: url.clone(), final_url, status, content_type, bytes, fetch_ms })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(err.to_string())
    } else if err.is_builder() {
        Error::InvalidUrl(err.to_string())
    } else {
        Error::TransportError(err.to_string())
    }
}
