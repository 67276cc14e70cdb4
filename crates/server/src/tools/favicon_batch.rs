//! favicon_batch tool implementation.
//!
//! Resolves many `(id, url)` targets with bounded concurrency and collects
//! the resolved icons from the resolver's event channel. Other batches may
//! share the channel and reuse ids, so events are kept only when their batch
//! number matches this batch's summary.

use std::collections::HashSet;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use favr_client::{BatchSummary, FaviconResolver, FetchTarget, IconResolved};
use favr_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use super::json_result;

const MAX_CONCURRENCY: usize = 64;

/// One bookmark to resolve.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchTarget {
    /// Caller-defined identifier, echoed back in results.
    pub id: String,
    /// Site URL.
    pub url: String,
}

/// Input parameters for favicon_batch tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FaviconBatchParams {
    /// Targets to resolve.
    pub targets: Vec<BatchTarget>,

    /// Maximum number of concurrent resolutions (default: server config, max: 64).
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

/// A resolved target.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchIcon {
    pub id: String,
    pub source_url: String,
    pub content_type: String,
    pub size: usize,
    pub data_base64: String,
}

impl From<IconResolved> for BatchIcon {
    fn from(event: IconResolved) -> Self {
        Self {
            id: event.id,
            source_url: event.source_url,
            content_type: event.content_type,
            size: event.bytes.len(),
            data_base64: STANDARD.encode(&event.bytes),
        }
    }
}

/// Batch outcome counts.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchCounts {
    pub total: usize,
    pub resolved: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl From<BatchSummary> for BatchCounts {
    fn from(s: BatchSummary) -> Self {
        Self { total: s.total, resolved: s.resolved, failed: s.failed, cancelled: s.cancelled }
    }
}

/// Output structure for favicon_batch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FaviconBatchOutput {
    /// Resolved icons, in completion order.
    pub icons: Vec<BatchIcon>,
    /// Ids with no icon (failed or cancelled), in input order.
    pub unresolved: Vec<String>,
    pub summary: BatchCounts,
}

/// Implementation of the favicon_batch tool.
pub async fn batch_impl(resolver: &FaviconResolver, params: FaviconBatchParams) -> Result<CallToolResult, McpError> {
    if params.targets.is_empty() {
        return Err(Error::InvalidInput("targets cannot be empty".into()).into());
    }
    if params.max_concurrency == Some(0) {
        return Err(Error::InvalidInput("max_concurrency must be at least 1".into()).into());
    }

    let ids: Vec<String> = params.targets.iter().map(|t| t.id.clone()).collect();
    let targets: Vec<FetchTarget> = params.targets.into_iter().map(|t| FetchTarget::new(t.id, t.url)).collect();

    // subscribe first so no event of this batch is missed
    let mut events = resolver.subscribe();
    let batch = async {
        match params.max_concurrency {
            Some(n) => resolver.resolve_batch_with(targets, n.min(MAX_CONCURRENCY)).await,
            None => resolver.resolve_batch(targets).await,
        }
    };
    tokio::pin!(batch);

    let mut seen: Vec<IconResolved> = Vec::new();
    let summary = loop {
        tokio::select! {
            summary = &mut batch => break summary,
            event = events.recv() => match event {
                Ok(event) => seen.push(event),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "batch event receiver lagged"),
                Err(RecvError::Closed) => break (&mut batch).await,
            },
        }
    };

    loop {
        match events.try_recv() {
            Ok(event) => seen.push(event),
            Err(TryRecvError::Lagged(skipped)) => tracing::warn!(skipped, "batch event receiver lagged"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    let icons: Vec<BatchIcon> = seen
        .into_iter()
        .filter(|event| event.batch == summary.batch)
        .map(BatchIcon::from)
        .collect();

    let resolved: HashSet<&str> = icons.iter().map(|i| i.id.as_str()).collect();
    let unresolved = ids.iter().filter(|id| !resolved.contains(id.as_str())).cloned().collect();

    Ok(json_result(&FaviconBatchOutput { icons, unresolved, summary: summary.into() })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{output, resolver};

    fn target(id: &str, url: &str) -> BatchTarget {
        BatchTarget { id: id.into(), url: url.into() }
    }

    #[tokio::test]
    async fn test_batch_collects_icons() {
        let resolver = resolver();
        let params = FaviconBatchParams {
            targets: vec![target("a", "a.com"), target("b", "b.com"), target("bad", "ftp://c.com")],
            max_concurrency: Some(2),
        };

        let result = batch_impl(&resolver, params).await.unwrap();
        let output: FaviconBatchOutput = output(&result);

        assert_eq!(output.summary.total, 3);
        assert_eq!(output.summary.resolved, 2);
        assert_eq!(output.summary.failed, 1);
        assert_eq!(output.unresolved, vec!["bad".to_string()]);

        let mut ids: Vec<&str> = output.icons.iter().map(|i| i.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(output.icons.iter().all(|i| i.data_base64 == "SUNP"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_batches_with_shared_id_stay_separate() {
        let resolver = resolver();
        let first = FaviconBatchParams { targets: vec![target("1", "a.com")], max_concurrency: None };
        let second = FaviconBatchParams { targets: vec![target("1", "b.com")], max_concurrency: None };

        let (first, second) = tokio::join!(batch_impl(&resolver, first), batch_impl(&resolver, second));
        let first: FaviconBatchOutput = output(&first.unwrap());
        let second: FaviconBatchOutput = output(&second.unwrap());

        for (out, host) in [(&first, "a.com"), (&second, "b.com")] {
            assert_eq!(out.summary.resolved, 1);
            assert_eq!(out.icons.len(), 1, "icons: {:?}", out.icons);
            assert_eq!(out.icons[0].source_url, format!("https://www.{host}/favicon.ico"));
            assert!(out.unresolved.is_empty());
        }
    }

    #[tokio::test]
    async fn test_batch_empty_targets() {
        let resolver = resolver();
        let result = batch_impl(&resolver, FaviconBatchParams::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_batch_invalid_concurrency() {
        let resolver = resolver();
        let params = FaviconBatchParams { targets: vec![target("a", "a.com")], max_concurrency: Some(0) };

        let err = batch_impl(&resolver, params).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
    }
}
