//! cache_purge tool implementation.
//!
//! Purges cache entries entirely, by domain, or by count.

use favr_core::{Error, ResponseCache};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Purge entries whose host is this domain or one of its subdomains.
    pub domain: Option<String>,

    /// Keep only the N most recently used disk entries (LRU purge).
    pub max_entries: Option<usize>,

    /// Purge everything in both tiers.
    #[serde(default)]
    pub all: bool,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted.
    pub deleted: u64,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(cache: &ResponseCache, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    if !params.all && params.domain.is_none() && params.max_entries.is_none() {
        return Err(
            Error::InvalidInput("At least one of all, domain, or max_entries must be specified".to_string()).into(),
        );
    }

    let mut deleted_total = 0u64;

    if params.all {
        deleted_total += cache.purge_all().await?;
    } else {
        if let Some(domain) = params.domain.as_deref().map(str::trim) {
            if domain.is_empty() {
                return Err(Error::InvalidInput("domain cannot be empty".to_string()).into());
            }
            deleted_total += cache.purge_by_domain(domain).await?;
        }

        if let Some(max_entries) = params.max_entries {
            deleted_total += cache.purge_lru(max_entries).await?;
        }
    }

    tracing::info!(deleted = deleted_total, "cache purged");
    Ok(json_result(&CachePurgeOutput { deleted: deleted_total })?)
}
