//! In-memory transport for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use favr_core::Error;
use parking_lot::Mutex;
use reqwest::{StatusCode, Url};

use crate::fetch::{FetchResponse, HttpTransport};

#[derive(Clone)]
enum Route {
    Respond { status: u16, content_type: Option<String>, body: Bytes },
    TransportError,
}

/// Route table keyed by normalized URL. Unrouted URLs answer 404.
#[derive(Default)]
pub(crate) struct StubTransport {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

fn normalize(url: &str) -> String {
    Url::parse(url).map(|u| u.to_string()).unwrap_or_else(|_| url.to_string())
}

impl StubTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every request sleeps this long before answering.
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub(crate) fn route_bytes(&self, url: &str, status: u16, content_type: Option<&str>, body: &[u8]) {
        self.routes.lock().insert(
            normalize(url),
            Route::Respond {
                status,
                content_type: content_type.map(str::to_string),
                body: Bytes::copy_from_slice(body),
            },
        );
    }

    pub(crate) fn route_image(&self, url: &str, content_type: &str, body: &[u8]) {
        self.route_bytes(url, 200, Some(content_type), body);
    }

    pub(crate) fn route_page(&self, url: &str, html: &str) {
        self.route_bytes(url, 200, Some("text/html; charset=utf-8"), html.as_bytes());
    }

    pub(crate) fn route_status(&self, url: &str, status: u16) {
        self.route_bytes(url, status, None, b"");
    }

    pub(crate) fn route_transport_error(&self, url: &str) {
        self.routes.lock().insert(normalize(url), Route::TransportError);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of requests observed in flight at once.
    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn get(&self, url: &Url, _accept: &str) -> Result<FetchResponse, Error> {
        let key = url.to_string();
        self.calls.lock().push(key.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let route = self.routes.lock().get(&key).cloned();
        let (status, content_type, body) = match route {
            Some(Route::Respond { status, content_type, body }) => (status, content_type, body),
            Some(Route::TransportError) => return Err(Error::TransportError(format!("connect failed: {key}"))),
            None => (404, None, Bytes::new()),
        };

        Ok(FetchResponse {
            url: url.clone(),
            final_url: url.clone(),
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            content_type,
            bytes: body,
            fetch_ms: 0,
        })
    }
}
