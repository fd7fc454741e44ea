//! MCP tool implementations.
//!
//! This module contains all tools exposed by the critcss-mcp server. Each tool
//! answers with pretty-printed JSON text content.

pub mod cache;
pub mod fetch_stylesheet;
pub mod generate;
pub mod results;

#[cfg(test)]
pub(crate) mod testing;

use critcss_core::Error;
use rmcp::ErrorData as McpError;
use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

pub use fetch_stylesheet::{FetchStylesheetParams, fetch_stylesheet_impl};
pub use generate::{GenerateParams, generate_impl};

/// Serialize `output` as the tool's text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
