//! cache_invalidate tool implementation.
//!
//! Removes one stylesheet (by cache key or URL) or everything with `"*"`.

use critcss_client::CriticalCssService;
use critcss_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters for the cache_invalidate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheInvalidateParams {
    /// Cache key, stylesheet URL, or `"*"` to clear both tiers.
    pub target: String,
}

pub async fn invalidate_impl(
    service: &CriticalCssService, params: CacheInvalidateParams,
) -> Result<CallToolResult, McpError> {
    if params.target.trim().is_empty() {
        return Err(Error::InvalidInput("target cannot be empty".into()).into());
    }
    let report = service.invalidate(&params.target).await?;
    tracing::info!(
        target = %params.target,
        memory_removed = report.memory_removed,
        disk_removed = report.disk_removed,
        "cache invalidated"
    );
    json_result(&report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{fixture, json_of};
    use critcss_core::ErrorKind;

    #[tokio::test]
    async fn test_invalidate_stored_stylesheet() {
        let f = fixture().await;
        let url = "https://cdn.test/site.css";
        let key = critcss_core::stylesheet_key(url);
        f.service.cache().store(&key, url, "a{}").await.unwrap();

        let params = CacheInvalidateParams { target: url.into() };
        let report = json_of(&invalidate_impl(&f.service, params.clone()).await.unwrap());
        assert_eq!(report["memory_removed"], 1);
        assert_eq!(report["disk_removed"], 1);

        let again = json_of(&invalidate_impl(&f.service, params).await.unwrap());
        assert_eq!(again["memory_removed"], 0);
        assert_eq!(again["disk_removed"], 0);
    }

    #[tokio::test]
    async fn test_clear_all_twice() {
        let f = fixture().await;
        for _ in 0..2 {
            let report = json_of(&invalidate_impl(&f.service, CacheInvalidateParams { target: "*".into() }).await.unwrap());
            assert_eq!(report["memory_removed"], 0);
        }
    }

    #[tokio::test]
    async fn test_blank_target_rejected() {
        let f = fixture().await;
        let err = invalidate_impl(&f.service, CacheInvalidateParams { target: " ".into() }).await.unwrap_err();
        assert_eq!(err.code.0, ErrorKind::InvalidInput.rpc_code());
    }
}
