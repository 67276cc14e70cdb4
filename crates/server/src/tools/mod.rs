//! MCP tool implementations.
//!
//! This module contains all tools exposed by the mcp-favicon server.

pub mod cache;
pub mod favicon_batch;
pub mod favicon_resolve;

pub use favicon_batch::{FaviconBatchOutput, FaviconBatchParams};
pub use favicon_resolve::{FaviconResolveOutput, FaviconResolveParams};

use favr_core::Error;
use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

/// Serialize a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, Error> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
