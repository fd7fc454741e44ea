//! critcss-mcp server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use critcss_client::CriticalCssService;
use critcss_core::{AppConfig, ResultStore};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod engine;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(
        cache_dir = %config.cache_dir.display(),
        db_path = %config.db_path.display(),
        max_contexts = config.max_contexts,
        "Starting critcss-mcp server on stdio transport"
    );

    let store = ResultStore::open(&config.db_path).await.context("failed to open result store")?;
    let service = Arc::new(
        CriticalCssService::from_config(&config, engine::launcher(&config))
            .await
            .context("failed to open stylesheet cache")?,
    );
    let gc = config.gc_interval().map(|interval| service.cache().spawn_gc(interval));

    let handler = handler::CritcssServer::new(Arc::clone(&service), store);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    if let Some(gc) = gc {
        gc.abort();
    }
    service.shutdown().await;
    tracing::info!("critcss-mcp server stopped");

    Ok(())
}
