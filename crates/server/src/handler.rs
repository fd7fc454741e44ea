//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.

use std::sync::Arc;

use critcss_client::CriticalCssService;
use critcss_core::ResultStore;
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

use crate::tools::cache::{CacheInvalidateParams, invalidate_impl, stats_impl};
use crate::tools::results::{ResultDeleteParams, ResultGetParams, delete_impl, get_impl};
use crate::tools::{FetchStylesheetParams, GenerateParams, fetch_stylesheet_impl, generate_impl};

/// The main MCP server handler for critcss.
#[derive(Clone)]
pub struct CritcssServer {
    service: Arc<CriticalCssService>,
    store: ResultStore,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl CritcssServer {
    /// Create a new server handler.
    pub fn new(service: Arc<CriticalCssService>, store: ResultStore) -> Self {
        Self { service, store, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Generate critical (above-the-fold) CSS for a page. Give exactly one stylesheet source: css, css_url, or page_css. Returns the CSS, size statistics, and cache provenance."
    )]
    async fn generate_critical_css(&self, params: Parameters<GenerateParams>) -> Result<CallToolResult, McpError> {
        generate_impl(&self.service, &self.store, params.0).await
    }

    #[tool(description = "Fetch a stylesheet through the two-tier cache. Reports memory-hit, disk-hit, or miss-downloaded.")]
    async fn fetch_stylesheet(&self, params: Parameters<FetchStylesheetParams>) -> Result<CallToolResult, McpError> {
        fetch_stylesheet_impl(&self.service, params.0).await
    }

    #[tool(description = "Stylesheet cache statistics: hits per tier, misses, downloads, hit rate, and tier occupancy.")]
    async fn cache_stats(&self) -> Result<CallToolResult, McpError> {
        stats_impl(&self.service).await
    }

    #[tool(description = "Invalidate one cached stylesheet by cache key or URL, or everything with \"*\".")]
    async fn cache_invalidate(&self, params: Parameters<CacheInvalidateParams>) -> Result<CallToolResult, McpError> {
        invalidate_impl(&self.service, params.0).await
    }

    #[tool(description = "Get the stored critical CSS result for a page URL.")]
    async fn critical_css_get(&self, params: Parameters<ResultGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.store, params.0).await
    }

    #[tool(description = "Delete the stored critical CSS result for a page URL.")]
    async fn critical_css_delete(&self, params: Parameters<ResultDeleteParams>) -> Result<CallToolResult, McpError> {
        delete_impl(&self.store, params.0).await
    }
}

impl ServerHandler for CritcssServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "critcss".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Critical CSS extraction. Stylesheets are cached in memory and on disk; results can be stored per page."
                    .into(),
            ),
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
