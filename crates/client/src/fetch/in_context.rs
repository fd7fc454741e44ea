//! Stylesheet acquisition inside a browsing context.
//!
//! A page of the context navigates to the resource. If the engine rendered it
//! as a text document its content is taken directly; otherwise the resource is
//! fetched through the context's own networking stack with
//! `credentials: "include"`, so session cookies apply.

use std::time::Duration;

use critcss_core::Error;
use reqwest::Url;
use serde::Deserialize;

use super::unwrap_stylesheet_body;
use crate::render::{BrowsingContext, scripts};

#[derive(Debug, Deserialize)]
struct InContextReply {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    via: Option<String>,
}

/// Read `url` through `context`, bounded by `timeout`.
pub async fn fetch_in_context(context: &dyn BrowsingContext, url: &Url, timeout: Duration) -> Result<String, Error> {
    let timeout_error = || Error::AcquisitionTimeout { url: url.to_string(), timeout_ms: timeout.as_millis() as u64 };

    match tokio::time::timeout(timeout, read(context, url, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(timeout_error()),
    }
}

async fn read(context: &dyn BrowsingContext, url: &Url, timeout: Duration) -> Result<String, Error> {
    let page = context.new_page().await?;

    let result = async {
        if let Err(e) = page.goto(url.as_str(), timeout).await {
            tracing::debug!(url = %url, error = %e, "in-context navigation failed, fetching from blank page");
        }

        let value = page.evaluate(&scripts::in_context_fetch(url.as_str())).await?;
        let reply: InContextReply = serde_json::from_value(value)
            .map_err(|e| Error::Extraction(format!("malformed in-context fetch reply: {e}")))?;

        if let Some(reason) = reply.error {
            return Err(match reply.status {
                Some(status) => Error::HttpStatus { url: url.to_string(), status },
                None => Error::Resolution { url: url.to_string(), reason },
            });
        }

        let raw = reply.text.unwrap_or_default();
        let text = unwrap_stylesheet_body(&raw, None);
        if text.trim().is_empty() {
            return Err(Error::EmptyContent(url.to_string()));
        }

        tracing::debug!(
            url = %url,
            via = reply.via.as_deref().unwrap_or("unknown"),
            bytes = text.len(),
            "fetched stylesheet in context"
        );
        Ok::<String, Error>(text)
    }
    .await;

    if let Err(e) = page.close().await {
        tracing::debug!(error = %e, "failed to close in-context fetch page");
    }
    result
}
