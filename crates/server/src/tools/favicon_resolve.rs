//! favicon_resolve tool implementation.
//!
//! Resolves the icon of a single site and returns it base64-encoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use favr_client::{FaviconResolver, ResolvedIcon, Strategy};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Input parameters for favicon_resolve tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FaviconResolveParams {
    /// Site URL. A missing scheme defaults to https.
    pub url: String,
}

/// Output structure for favicon_resolve tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FaviconResolveOutput {
    /// The URL as requested.
    pub url: String,
    /// Candidate URL that served the icon.
    pub source_url: String,
    /// Strategy that succeeded: "html", "standard_locations" or "fallback_service".
    pub strategy: String,
    /// Content-Type of the icon response.
    pub content_type: String,
    /// Icon size in bytes.
    pub size: usize,
    /// Icon bytes, standard base64.
    pub data_base64: String,
}

impl FaviconResolveOutput {
    pub fn new(url: impl Into<String>, icon: &ResolvedIcon) -> Self {
        Self {
            url: url.into(),
            source_url: icon.source_url.to_string(),
            strategy: strategy_name(icon.strategy).to_string(),
            content_type: icon.content_type.clone(),
            size: icon.bytes.len(),
            data_base64: STANDARD.encode(&icon.bytes),
        }
    }
}

pub(crate) fn strategy_name(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Html => "html",
        Strategy::StandardLocations => "standard_locations",
        Strategy::FallbackService => "fallback_service",
    }
}

/// Implementation of the favicon_resolve tool.
pub async fn resolve_impl(
    resolver: &FaviconResolver, params: FaviconResolveParams,
) -> Result<CallToolResult, McpError> {
    let icon = resolver.resolve(&params.url).await?;
    tracing::info!(url = %params.url, source = %icon.source_url, strategy = strategy_name(icon.strategy), "favicon resolved");

    Ok(json_result(&FaviconResolveOutput::new(params.url, &icon))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{output, resolver};

    #[tokio::test]
    async fn test_resolve_returns_base64() {
        let resolver = resolver();
        let params = FaviconResolveParams { url: "example.com".into() };

        let result = resolve_impl(&resolver, params).await.unwrap();
        let output: FaviconResolveOutput = output(&result);

        assert_eq!(output.url, "example.com");
        assert_eq!(output.source_url, "https://www.example.com/favicon.ico");
        assert_eq!(output.strategy, "standard_locations");
        assert_eq!(output.content_type, "image/x-icon");
        assert_eq!(output.size, 3);
        assert_eq!(output.data_base64, "SUNP");
    }

    #[tokio::test]
    async fn test_resolve_invalid_url() {
        let resolver = resolver();
        let params = FaviconResolveParams { url: "   ".into() };

        let err = resolve_impl(&resolver, params).await.unwrap_err();
        assert_eq!(err.code.0, -32003);
        assert!(err.message.contains("INVALID_URL"));
    }

    #[tokio::test]
    async fn test_resolve_after_shutdown() {
        let resolver = resolver();
        resolver.shutdown().await;

        let err = resolve_impl(&resolver, FaviconResolveParams { url: "example.com".into() })
            .await
            .unwrap_err();
        assert!(err.message.contains("SHUTTING_DOWN"));
    }

    #[test]
    fn test_strategy_names_match_serde() {
        for strategy in [Strategy::Html, Strategy::StandardLocations, Strategy::FallbackService] {
            let json = serde_json::to_value(strategy).unwrap();
            assert_eq!(json.as_str(), Some(strategy_name(strategy)));
        }
    }
}
