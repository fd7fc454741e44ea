//! generate_critical_css tool implementation.
//!
//! Runs the full extraction for one page and optionally persists the result.

use std::time::Duration;

use critcss_client::{CriticalCssService, ExtractionResult, StylesheetSource, Viewport};
use critcss_core::{CriticalCssRecord, Error, ResultStore};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Input parameters for generate_critical_css.
///
/// Exactly one stylesheet source is required: `css`, `css_url` or `page_css`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct GenerateParams {
    /// The page to extract critical CSS for.
    pub url: String,

    /// Stylesheet text to select from.
    #[serde(default)]
    pub css: Option<String>,

    /// Stylesheet URL, resolved through the stylesheet cache.
    #[serde(default)]
    pub css_url: Option<String>,

    /// Use the page's own `<style>` blocks and linked stylesheets.
    #[serde(default)]
    pub page_css: bool,

    /// Viewport width in CSS pixels (default from configuration).
    #[serde(default)]
    pub width: Option<u32>,

    /// Viewport height in CSS pixels (default from configuration).
    #[serde(default)]
    pub height: Option<u32>,

    /// Overall time bound in milliseconds (default from configuration).
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Bypass the stylesheet cache lookup.
    #[serde(default)]
    pub force: bool,

    /// Fetch the stylesheet with the browsing session's credentials.
    #[serde(default)]
    pub requires_credentials: bool,

    /// Persist the result in the result store.
    #[serde(default)]
    pub store: bool,
}

/// Output structure for generate_critical_css.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerateOutput {
    #[serde(flatten)]
    pub result: ExtractionResult,
    /// Whether the result was written to the result store.
    pub stored: bool,
}

fn source_of(params: &GenerateParams) -> Result<StylesheetSource, Error> {
    match (&params.css, &params.css_url, params.page_css) {
        (Some(css), None, false) => Ok(StylesheetSource::Literal(css.clone())),
        (None, Some(url), false) => Ok(StylesheetSource::Url(url.clone())),
        (None, None, true) => Ok(StylesheetSource::PageOwn),
        (None, None, false) => Err(Error::InvalidInput("one of css, css_url or page_css is required".into())),
        _ => Err(Error::InvalidInput("css, css_url and page_css are mutually exclusive".into())),
    }
}

pub async fn generate_impl(
    service: &CriticalCssService, store: &ResultStore, params: GenerateParams,
) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }
    if params.width == Some(0) || params.height == Some(0) {
        return Err(Error::InvalidInput("viewport dimensions must be positive".into()).into());
    }
    if params.timeout_ms == Some(0) {
        return Err(Error::InvalidInput("timeout_ms must be positive".into()).into());
    }

    let mut request = service.request(&params.url, source_of(&params)?);
    let defaults = request.viewport;
    request.viewport =
        Viewport::new(params.width.unwrap_or(defaults.width), params.height.unwrap_or(defaults.height));
    if let Some(ms) = params.timeout_ms {
        request.timeout = Duration::from_millis(ms);
    }
    request.force = params.force;
    request.requires_credentials = params.requires_credentials;

    let result = service.generate(request).await?;

    if params.store {
        let record = CriticalCssRecord::new(
            &result.url,
            &result.critical_css,
            result.stats.original_bytes,
            result.stats.critical_bytes,
            None,
        );
        store.upsert_result(&record).await?;
        tracing::info!(url = %result.url, "critical css stored");
    }

    json_result(&GenerateOutput { result, stored: params.store })
}
