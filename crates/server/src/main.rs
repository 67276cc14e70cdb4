//! mcp-favicon server entry point.
//!
//! Boots the favicon resolver and serves it as MCP tools on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use anyhow::Result;
use favr_client::FaviconResolver;
use favr_core::{AppConfig, CacheDb, ResponseCache};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        db_path = %config.db_path.display(),
        max_concurrency = config.max_concurrency,
        "Starting mcp-favicon server on stdio transport"
    );

    let db = CacheDb::open(&config.db_path).await?;
    let cache = ResponseCache::new(db.clone(), config.memory_cache_bytes, config.disk_cache_bytes);
    let resolver = FaviconResolver::new(&config, cache)?;

    let handler = handler::FaviconServer::new(resolver.clone());
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    let quit = server.waiting().await;

    let report = resolver.shutdown().await;
    if let Err(e) = db.close().await {
        tracing::warn!(error = %e, "failed to close cache database");
    }
    tracing::info!(cancelled = report.cancelled, drained = report.drained, "mcp-favicon server stopped");

    quit?;
    Ok(())
}
