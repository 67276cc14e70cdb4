//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use crate::tools::cache::{CachePurgeParams, CacheStatsParams, purge_impl, stats_impl};
use crate::tools::favicon_batch::{FaviconBatchParams, batch_impl};
use crate::tools::favicon_resolve::{FaviconResolveParams, resolve_impl};

use favr_client::FaviconResolver;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for mcp-favicon.
#[derive(Clone)]
pub struct FaviconServer {
    resolver: FaviconResolver,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl FaviconServer {
    /// Create a new server handler around a resolver session.
    pub fn new(resolver: FaviconResolver) -> Self {
        Self { resolver, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Resolve the favicon of a website. Tries the icon link declared in the page, then well-known paths, then a public lookup service. Returns the icon base64-encoded."
    )]
    async fn favicon_resolve(&self, params: Parameters<FaviconResolveParams>) -> Result<CallToolResult, McpError> {
        resolve_impl(&self.resolver, params.0).await
    }

    #[tool(
        description = "Resolve favicons for many (id, url) targets with bounded concurrency. Failed targets are listed as unresolved and never abort the batch."
    )]
    async fn favicon_batch(&self, params: Parameters<FaviconBatchParams>) -> Result<CallToolResult, McpError> {
        batch_impl(&self.resolver, params.0).await
    }

    /// Entry and byte counts of the memory and disk cache tiers.
    #[tool(description = "Show entry and byte counts for the memory and disk tiers of the favicon cache.")]
    async fn cache_stats(&self, params: Parameters<CacheStatsParams>) -> Result<CallToolResult, McpError> {
        stats_impl(self.resolver.cache(), params.0).await
    }

    #[tool(description = "Purge favicon cache entries: everything (all), by domain, or down to the N most recently used.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(self.resolver.cache(), params.0).await
    }
}

impl ServerHandler for FaviconServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "mcp-favicon".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
