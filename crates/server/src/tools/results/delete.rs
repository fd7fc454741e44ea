//! critical_css_delete tool implementation.

use critcss_client::canonicalize;
use critcss_core::{Error, ResultStore};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters for the critical_css_delete tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResultDeleteParams {
    /// Page URL whose stored result should be removed.
    pub url: String,
}

/// Output from the critical_css_delete tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResultDeleteOutput {
    pub deleted: bool,
}

pub async fn delete_impl(store: &ResultStore, params: ResultDeleteParams) -> Result<CallToolResult, McpError> {
    let url = canonicalize(&params.url).map_err(Error::from)?;
    let deleted = store.delete_result(url.as_str()).await?;
    json_result(&ResultDeleteOutput { deleted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::json_of;
    use critcss_core::CriticalCssRecord;

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = ResultStore::open_in_memory().await.unwrap();
        store.upsert_result(&CriticalCssRecord::new("https://a.test/", "h1{}", 10, 4, None)).await.unwrap();
        let params = ResultDeleteParams { url: "https://a.test/".into() };

        let first = json_of(&delete_impl(&store, params.clone()).await.unwrap());
        let second = json_of(&delete_impl(&store, params).await.unwrap());

        assert_eq!(first["deleted"], true);
        assert_eq!(second["deleted"], false);
    }
}
