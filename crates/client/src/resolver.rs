//! Resolver session: single and batch resolution, events, shutdown.
//!
//! ### Batch admission
//! - At most `max_concurrency` jobs in flight; once that many are
//!   outstanding, the next target waits for one of them to finish.
//! - Admissions after the first are staggered by `batch_stagger_ms`.
//! - A failed target never aborts the batch.
//!
//! ### Events
//! - Every resolved batch target is published once as [`IconResolved`] on a
//!   broadcast channel, tagged with the batch number from its
//!   [`BatchSummary`]. Nothing is published for failures, and nothing at
//!   all once shutdown has begun.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use favr_core::{AppConfig, Error, ResponseCache};
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use url::Url;

use crate::fetch::{FetchConfig, HttpTransport, IconFetcher, ReqwestTransport, canonicalize};
use crate::resolve::{ResolvedIcon, StrategyChain};
use crate::tasks::{JobHandle, ShutdownReport, TaskManager};

/// One `(id, url)` pair submitted for resolution. The id is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchTarget {
    pub id: String,
    pub url: String,
}

impl FetchTarget {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self { id: id.into(), url: url.into() }
    }
}

/// Published once per successfully resolved batch target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconResolved {
    /// Batch that resolved the target; ids are only unique within a batch.
    pub batch: u64,
    pub id: String,
    pub bytes: Bytes,
    pub content_type: String,
    pub source_url: String,
}

/// Per-batch outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Session-unique batch number, matching [`IconResolved::batch`].
    pub batch: u64,
    pub total: usize,
    pub resolved: usize,
    pub failed: usize,
    pub cancelled: usize,
}

struct Inner {
    chain: StrategyChain,
    tasks: TaskManager,
    events: broadcast::Sender<IconResolved>,
    cache: ResponseCache,
    max_concurrency: usize,
    stagger: Duration,
    shutdown_grace: Duration,
    next_batch: AtomicU64,
}

/// Favicon resolver session. Cloning shares the session.
#[derive(Clone)]
pub struct FaviconResolver {
    inner: Arc<Inner>,
}

impl FaviconResolver {
    /// Create a resolver that fetches over HTTP with reqwest.
    pub fn new(config: &AppConfig, cache: ResponseCache) -> Result<Self, Error> {
        let transport = ReqwestTransport::new(FetchConfig::from_app(config))?;
        Self::with_transport(config, cache, Arc::new(transport))
    }

    /// Create a resolver on top of any transport.
    pub fn with_transport(
        config: &AppConfig, cache: ResponseCache, transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, Error> {
        let fallback_service = Url::parse(&config.fallback_service_url)
            .map_err(|e| Error::InvalidInput(format!("fallback_service_url: {e}")))?;

        let fetcher = IconFetcher::new(transport, cache.clone(), config.user_agent.clone());
        let chain = StrategyChain::new(fetcher, fallback_service, config.fallback_icon_size);
        let (events, _) = broadcast::channel(config.event_buffer.max(1));

        Ok(Self {
            inner: Arc::new(Inner {
                chain,
                tasks: TaskManager::new(),
                events,
                cache,
                max_concurrency: config.max_concurrency.max(1),
                stagger: config.batch_stagger(),
                shutdown_grace: config.shutdown_grace(),
                next_batch: AtomicU64::new(1),
            }),
        })
    }

    /// Receive [`IconResolved`] events from every later batch.
    pub fn subscribe(&self) -> broadcast::Receiver<IconResolved> {
        self.inner.events.subscribe()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    /// Jobs currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.tasks.in_flight()
    }

    /// Resolve one site.
    ///
    /// Schemeless input is treated as `https://`. Exhaustion is
    /// `NoIconFound`; no event is published.
    pub async fn resolve(&self, url: &str) -> Result<ResolvedIcon, Error> {
        let site = canonicalize(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let chain = self.inner.chain.clone();
        let handle = self
            .inner
            .tasks
            .submit(move |cancel| async move { chain.run(&site, &cancel).await })
            .ok_or(Error::ShuttingDown)?;
        handle.join().await
    }

    /// Resolve many targets with the configured concurrency cap.
    pub async fn resolve_batch(&self, targets: Vec<FetchTarget>) -> BatchSummary {
        self.resolve_batch_with(targets, self.inner.max_concurrency).await
    }

    /// Resolve many targets with at most `max_concurrency` jobs in flight.
    pub async fn resolve_batch_with(&self, targets: Vec<FetchTarget>, max_concurrency: usize) -> BatchSummary {
        let batch = self.inner.next_batch.fetch_add(1, Ordering::Relaxed);
        let total = targets.len();
        let max_concurrency = max_concurrency.max(1);
        let mut summary = BatchSummary { batch, total, ..BatchSummary::default() };
        let mut pending = FuturesUnordered::new();

        tracing::info!(batch, total, max_concurrency, "batch started");

        let mut targets = targets.into_iter();
        let mut admitted = 0usize;
        while let Some(target) = targets.next() {
            let site = match canonicalize(&target.url) {
                Ok(site) => site,
                Err(e) => {
                    tracing::debug!(id = %target.id, url = %target.url, error = %e, "skipping invalid target");
                    summary.failed += 1;
                    continue;
                }
            };

            while pending.len() >= max_concurrency {
                if let Some((id, result)) = pending.next().await {
                    let id: String = id;
                    tally(&mut summary, &id, result);
                }
            }

            if admitted > 0 && !self.inner.stagger.is_zero() {
                tokio::time::sleep(self.inner.stagger).await;
            }

            let id = target.id;
            let Some(handle) = self.spawn_batch_job(batch, id.clone(), site) else {
                tracing::debug!(batch, "shutting down; batch admission stopped");
                summary.cancelled += 1;
                for rest in targets.by_ref() {
                    if canonicalize(&rest.url).is_ok() {
                        summary.cancelled += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                break;
            };
            admitted += 1;
            pending.push(async move { (id, handle.join().await) });
        }

        while let Some((id, result)) = pending.next().await {
            tally(&mut summary, &id, result);
        }

        tracing::info!(
            batch,
            total,
            resolved = summary.resolved,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "batch finished"
        );
        summary
    }

    fn spawn_batch_job(&self, batch: u64, id: String, site: Url) -> Option<JobHandle<()>> {
        let chain = self.inner.chain.clone();
        let tasks = self.inner.tasks.clone();
        let events = self.inner.events.clone();

        self.inner.tasks.submit(move |cancel| async move {
            let icon = chain.run(&site, &cancel).await?;
            let event = IconResolved {
                batch,
                id,
                bytes: icon.bytes,
                content_type: icon.content_type,
                source_url: icon.source_url.to_string(),
            };

            // no subscribers is fine; events are fire-and-forget
            let published = tasks.publish(|| {
                let _ = events.send(event);
            });
            if published { Ok(()) } else { Err(Error::Cancelled) }
        })
    }

    /// Cancel all jobs, reject further work, and drop the memory tier.
    ///
    /// Waits at most `shutdown_grace_ms` for jobs to unwind. Idempotent.
    pub async fn shutdown(&self) -> ShutdownReport {
        let report = self.inner.tasks.shutdown_and_cancel_all(self.inner.shutdown_grace).await;
        self.inner.cache.invalidate_memory();
        report
    }
}

fn tally(summary: &mut BatchSummary, id: &str, result: Result<(), Error>) {
    match result {
        Ok(()) => summary.resolved += 1,
        Err(Error::Cancelled | Error::ShuttingDown) => summary.cancelled += 1,
        Err(e) => {
            tracing::debug!(id = %id, error = %e, "target unresolved");
            summary.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::Strategy;
    use crate::testing::StubTransport;
    use tokio::sync::broadcast::error::TryRecvError;

    fn config() -> AppConfig {
        AppConfig { batch_stagger_ms: 0, ..AppConfig::default() }
    }

    fn resolver(stub: &Arc<StubTransport>, config: &AppConfig) -> FaviconResolver {
        FaviconResolver::with_transport(config, ResponseCache::memory_only(1024 * 1024), stub.clone()).unwrap()
    }

    fn route_site(stub: &StubTransport, host: &str, body: &[u8]) {
        stub.route_page(&format!("https://{host}/"), r#"<link rel="icon" href="/icon.png">"#);
        stub.route_image(&format!("https://{host}/icon.png"), "image/png", body);
    }

    #[tokio::test]
    async fn test_schemeless_input_fetches_https_first() {
        let stub = Arc::new(StubTransport::new());
        let result = resolver(&stub, &config()).resolve("example.com").await;

        assert!(matches!(result, Err(Error::NoIconFound(_))));
        assert_eq!(stub.calls()[0], "https://example.com/");
    }

    #[tokio::test]
    async fn test_resolve_returns_bytes_and_source() {
        let stub = Arc::new(StubTransport::new());
        route_site(&stub, "a.com", b"PNG");

        let icon = resolver(&stub, &config()).resolve("https://a.com").await.unwrap();
        assert_eq!(icon.bytes.as_ref(), b"PNG");
        assert_eq!(icon.content_type, "image/png");
        assert_eq!(icon.source_url.as_str(), "https://a.com/icon.png");
        assert_eq!(icon.strategy, Strategy::Html);
    }

    #[tokio::test]
    async fn test_resolve_invalid_url() {
        let stub = Arc::new(StubTransport::new());
        let result = resolver(&stub, &config()).resolve("ftp://a.com/").await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
        assert_eq!(stub.call_count(), 0);
    }

    #[tokio::test]
    async fn test_repeat_resolution_served_from_cache() {
        let stub = Arc::new(StubTransport::new());
        route_site(&stub, "a.com", b"PNG");
        let resolver = resolver(&stub, &config());

        resolver.resolve("a.com").await.unwrap();
        let calls = stub.call_count();
        resolver.resolve("a.com").await.unwrap();
        assert_eq!(stub.call_count(), calls);
    }

    #[tokio::test]
    async fn test_batch_emits_one_event_per_success() {
        let stub = Arc::new(StubTransport::new());
        route_site(&stub, "a.com", b"A");
        route_site(&stub, "b.com", b"B");
        let resolver = resolver(&stub, &config());
        let mut events = resolver.subscribe();

        let summary = resolver
            .resolve_batch(vec![
                FetchTarget::new("1", "a.com"),
                FetchTarget::new("2", "b.com"),
                FetchTarget::new("3", "unresolvable.test"),
                FetchTarget::new("4", ""),
            ])
            .await;
        assert_eq!(summary, BatchSummary { batch: summary.batch, total: 4, resolved: 2, failed: 2, cancelled: 0 });

        let mut got = vec![events.try_recv().unwrap(), events.try_recv().unwrap()];
        got.sort_by(|a, b| a.id.cmp(&b.id));
        assert!(got.iter().all(|e| e.batch == summary.batch));
        assert_eq!(got[0].id, "1");
        assert_eq!(got[0].bytes.as_ref(), b"A");
        assert_eq!(got[1].id, "2");
        assert_eq!(got[1].source_url, "https://b.com/icon.png");
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_exhaustion_emits_nothing() {
        let stub = Arc::new(StubTransport::new());
        let resolver = resolver(&stub, &config());
        let mut events = resolver.subscribe();

        let summary = resolver.resolve_batch(vec![FetchTarget::new("x", "nothing.test")]).await;
        assert_eq!(summary.failed, 1);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_respects_concurrency_cap() {
        let stub = Arc::new(StubTransport::with_delay(Duration::from_millis(10)));
        let config = AppConfig { batch_stagger_ms: 50, ..AppConfig::default() };
        let resolver = resolver(&stub, &config);

        let targets = (0..10).map(|i| FetchTarget::new(i.to_string(), format!("site{i}.test"))).collect();
        let summary = resolver.resolve_batch_with(targets, 3).await;

        assert_eq!(summary.total, 10);
        assert_eq!(summary.failed, 10);
        assert!(stub.peak_in_flight() <= 3, "peak was {}", stub.peak_in_flight());
        assert!(stub.peak_in_flight() >= 2);
        assert_eq!(resolver.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_batch() {
        let stub = Arc::new(StubTransport::with_delay(Duration::from_secs(30)));
        for host in ["a.com", "b.com", "c.com"] {
            route_site(&stub, host, b"late");
        }
        let resolver = resolver(&stub, &config());
        let mut events = resolver.subscribe();

        let batch = {
            let resolver = resolver.clone();
            tokio::spawn(async move {
                resolver
                    .resolve_batch(vec![
                        FetchTarget::new("a", "a.com"),
                        FetchTarget::new("b", "b.com"),
                        FetchTarget::new("c", "c.com"),
                        FetchTarget::new("d", "d.com"),
                        FetchTarget::new("e", "ftp://e.com"),
                    ])
                    .await
            })
        };

        while stub.call_count() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(resolver.in_flight(), 3);

        let report = resolver.shutdown().await;
        assert!(report.drained);
        assert_eq!(report.cancelled, 3);
        assert_eq!(resolver.in_flight(), 0);

        let summary = batch.await.unwrap();
        assert_eq!(summary, BatchSummary { batch: summary.batch, total: 5, resolved: 0, failed: 1, cancelled: 4 });
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        assert!(matches!(resolver.resolve("a.com").await, Err(Error::ShuttingDown)));
        assert_eq!(resolver.shutdown().await.cancelled, 0);
    }

    #[tokio::test]
    async fn test_overlapping_batches_tag_their_own_events() {
        let stub = Arc::new(StubTransport::new());
        route_site(&stub, "a.com", b"A");
        route_site(&stub, "b.com", b"B");
        let resolver = resolver(&stub, &config());
        let mut events = resolver.subscribe();

        let (first, second) = tokio::join!(
            resolver.resolve_batch(vec![FetchTarget::new("1", "a.com")]),
            resolver.resolve_batch(vec![FetchTarget::new("1", "b.com")]),
        );
        assert_ne!(first.batch, second.batch);

        let got = [events.try_recv().unwrap(), events.try_recv().unwrap()];
        let from = |batch: u64| got.iter().find(|e| e.batch == batch).unwrap();
        assert_eq!(from(first.batch).bytes.as_ref(), b"A");
        assert_eq!(from(second.batch).bytes.as_ref(), b"B");
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_does_not_block_jobs() {
        let stub = Arc::new(StubTransport::new());
        let hosts = ["a.com", "b.com", "c.com", "d.com", "e.com"];
        for host in hosts {
            route_site(&stub, host, host.as_bytes());
        }
        let config = AppConfig { event_buffer: 2, ..config() };
        let resolver = resolver(&stub, &config);
        let mut idle = resolver.subscribe();

        let targets = hosts.iter().map(|h| FetchTarget::new(*h, *h)).collect();
        let summary = resolver.resolve_batch(targets).await;
        assert_eq!(summary.resolved, 5);

        assert!(matches!(idle.try_recv(), Err(TryRecvError::Lagged(3))));
        assert!(idle.try_recv().is_ok());
        assert!(idle.try_recv().is_ok());
        assert!(matches!(idle.try_recv(), Err(TryRecvError::Empty)));
    }
}
