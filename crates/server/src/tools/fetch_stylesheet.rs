//! fetch_stylesheet tool implementation.
//!
//! Resolves a stylesheet URL through the two-tier cache.

use critcss_client::CriticalCssService;
use critcss_core::{Error, Provenance};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Input parameters for fetch_stylesheet.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchStylesheetParams {
    /// Stylesheet URL.
    pub url: String,

    /// Skip the cache lookup and download again.
    #[serde(default)]
    pub force_refresh: bool,

    /// Include the stylesheet text in the output (default: true).
    #[serde(default = "default_true")]
    pub include_content: bool,
}

fn default_true() -> bool {
    true
}

/// Output structure for fetch_stylesheet.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchStylesheetOutput {
    pub url: String,
    pub key: String,
    pub provenance: Provenance,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

pub async fn fetch_stylesheet_impl(
    service: &CriticalCssService, params: FetchStylesheetParams,
) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let fetched = service.fetch_stylesheet(&params.url, params.force_refresh).await?;
    let output = FetchStylesheetOutput {
        size_bytes: fetched.content.len() as u64,
        content: params.include_content.then_some(fetched.content),
        url: fetched.url,
        key: fetched.key,
        provenance: fetched.provenance,
    };
    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{fixture, json_of};
    use critcss_core::ErrorKind;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_fetch_then_hit() {
        let f = fixture().await;
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/site.css");
                then.status(200).body("body{margin:0}");
            })
            .await;
        let params = FetchStylesheetParams { url: server.url("/site.css"), force_refresh: false, include_content: true };

        let first = json_of(&fetch_stylesheet_impl(&f.service, params.clone()).await.unwrap());
        let second = json_of(
            &fetch_stylesheet_impl(&f.service, FetchStylesheetParams { include_content: false, ..params }).await.unwrap(),
        );

        assert_eq!(first["provenance"], "miss-downloaded");
        assert_eq!(first["content"], "body{margin:0}");
        assert_eq!(first["size_bytes"], 14);
        assert_eq!(second["provenance"], "memory-hit");
        assert!(second.get("content").is_none());
        assert_eq!(first["key"], second["key"]);
    }

    #[tokio::test]
    async fn test_empty_stylesheet_error_code() {
        let f = fixture().await;
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/empty.css");
                then.status(200).body("");
            })
            .await;
        let params = FetchStylesheetParams { url: server.url("/empty.css"), force_refresh: false, include_content: true };

        let err = fetch_stylesheet_impl(&f.service, params).await.unwrap_err();
        assert_eq!(err.code.0, ErrorKind::EmptyContent.rpc_code());
    }
}
