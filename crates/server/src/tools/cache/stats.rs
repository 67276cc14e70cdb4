//! cache_stats tool implementation.

use favr_core::ResponseCache;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters for the cache_stats tool (none).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatsParams {}

/// Implementation of the cache_stats tool.
pub async fn stats_impl(cache: &ResponseCache, _params: CacheStatsParams) -> Result<CallToolResult, McpError> {
    let stats = cache.stats().await?;
    Ok(json_result(&stats)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{output, resolver};
    use favr_core::CacheStats;

    #[tokio::test]
    async fn test_stats_after_resolve() {
        let resolver = resolver();
        resolver.resolve("example.com").await.unwrap();

        let result = stats_impl(resolver.cache(), CacheStatsParams::default()).await.unwrap();
        let stats: CacheStats = output(&result);
        assert_eq!(stats.memory_entries, 1);
        assert_eq!(stats.memory_bytes, 3);
        assert_eq!(stats.disk_entries, 0);
    }
}
