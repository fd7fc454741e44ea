//! cache_stats tool implementation.

use critcss_client::CriticalCssService;
use rmcp::{ErrorData as McpError, model::CallToolResult};

use crate::tools::json_result;

/// Report hit/miss counters and tier occupancy.
pub async fn stats_impl(service: &CriticalCssService) -> Result<CallToolResult, McpError> {
    let stats = service.cache_stats().await?;
    json_result(&stats)
}
