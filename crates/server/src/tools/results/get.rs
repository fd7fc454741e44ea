//! critical_css_get tool implementation.
//!
//! Retrieves the stored critical CSS for a page URL.

use critcss_client::canonicalize;
use critcss_core::{CriticalCssRecord, Error, ResultStore};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters for the critical_css_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResultGetParams {
    /// Page URL the result was generated for.
    pub url: String,
}

/// Output from the critical_css_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResultGetOutput {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CriticalCssRecord>,
}

pub async fn get_impl(store: &ResultStore, params: ResultGetParams) -> Result<CallToolResult, McpError> {
    let url = canonicalize(&params.url).map_err(Error::from)?;
    let result = store.get_result(url.as_str()).await?;
    json_result(&ResultGetOutput { found: result.is_some(), result })
}
