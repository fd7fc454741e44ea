//! Stylesheet acquisition.
//!
//! ### Direct strategy
//! - Plain HTTP GET with a browser User-Agent and `Accept: text/css,*/*;q=0.1`
//! - Connect/DNS failures, 5xx answers and body read errors are retried with
//!   linear backoff (`attempt * backoff`)
//! - Timeouts and 4xx answers are not retried
//!
//! ### In-context strategy
//! Runs inside a browsing context so the request carries the session's
//! cookies; see [`in_context`].
//!
//! [`strategy`] chains the two with explicit fallthrough.

pub mod in_context;
pub mod strategy;
pub mod url;

use std::error::Error as StdError;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use critcss_core::{AppConfig, Error};
use reqwest::{Client, StatusCode, Url, header};
use scraper::{Html, Selector};

pub use strategy::{Acquisition, Strategy};
pub use url::{UrlError, canonicalize, resolve_reference};

const ACCEPT_CSS: &str = "text/css,*/*;q=0.1";

/// Configuration for the direct fetch strategy.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    /// Per-request timeout (default: 15s)
    pub timeout: Duration,
    /// Total attempts including the first (default: 3)
    pub attempts: u32,
    /// Base of the linear backoff (default: 1s)
    pub backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: critcss_core::config::DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(15),
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.fetch_timeout(),
            attempts: config.fetch_attempts,
            backoff: config.retry_backoff(),
        }
    }
}

/// Outcome of one attempt.
enum AttemptError {
    /// Worth another try; `dns` marks name resolution failures.
    Transient { reason: String, dns: bool, status: Option<StatusCode> },
    Fatal(Error),
}

/// HTTP client for the direct strategy.
pub struct StylesheetFetcher {
    http: Client,
    config: FetchConfig,
}

impl StylesheetFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::InvalidInput(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Shared HTTP client, also used for sitemap downloads.
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Fetch a stylesheet with bounded retries.
    pub async fn fetch(&self, url: &Url) -> Result<String, Error> {
        let attempts = self.config.attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.fetch_once(url).await {
                Ok(text) => return Ok(text),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Transient { reason, dns, status }) => {
                    if attempt >= attempts {
                        return Err(exhausted(url, reason, dns, status));
                    }
                    let delay = self.config.backoff * attempt;
                    tracing::warn!(
                        url = %url,
                        attempt,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "stylesheet fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<String, AttemptError> {
        let start = Instant::now();
        let response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, ACCEPT_CSS)
            .send()
            .await
            .map_err(|e| classify_send_error(url, &e, self.config.timeout))?;

        let status = response.status();
        if status.is_server_error() {
            let reason = format!("status {}", status.as_u16());
            return Err(AttemptError::Transient { reason, dns: false, status: Some(status) });
        }
        if !status.is_success() {
            return Err(AttemptError::Fatal(Error::HttpStatus { url: url.to_string(), status: status.as_u16() }));
        }

        let content_type =
            response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(str::to_string);

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::Fatal(timeout_error(url, self.config.timeout))
            } else {
                AttemptError::Transient { reason: format!("failed to read body: {e}"), dns: false, status: None }
            }
        })?;

        let text = unwrap_stylesheet_body(&body, content_type.as_deref());
        if text.trim().is_empty() {
            return Err(AttemptError::Fatal(Error::EmptyContent(url.to_string())));
        }

        tracing::debug!(
            url = %url,
            bytes = text.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched stylesheet"
        );
        Ok(text)
    }
}

fn timeout_error(url: &Url, timeout: Duration) -> Error {
    Error::AcquisitionTimeout { url: url.to_string(), timeout_ms: timeout.as_millis() as u64 }
}

fn classify_send_error(url: &Url, err: &reqwest::Error, timeout: Duration) -> AttemptError {
    if err.is_timeout() {
        return AttemptError::Fatal(timeout_error(url, timeout));
    }
    if err.is_builder() || err.is_redirect() {
        return AttemptError::Fatal(Error::InvalidUrl(format!("{url}: {err}")));
    }
    AttemptError::Transient { reason: error_chain(err), dns: is_dns_failure(err), status: None }
}

fn exhausted(url: &Url, reason: String, dns: bool, status: Option<StatusCode>) -> Error {
    if let Some(status) = status {
        return Error::HttpStatus { url: url.to_string(), status: status.as_u16() };
    }
    let reason = if dns {
        let host = url.host_str().unwrap_or_default();
        format!("could not resolve host {host:?} ({reason}); check the hostname and the network's DNS configuration")
    } else {
        reason
    };
    Error::Resolution { url: url.to_string(), reason }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

fn is_dns_failure(err: &(dyn StdError + 'static)) -> bool {
    let chain = error_chain(err).to_lowercase();
    ["dns error", "failed to lookup address", "name or service not known", "nodename nor servname", "no such host"]
        .iter()
        .any(|needle| chain.contains(needle))
}

static BODY_TEXT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").expect("valid selector"));

fn looks_like_html(body: &str) -> bool {
    let lower: String = body.trim_start().chars().take(16).collect::<String>().to_ascii_lowercase();
    lower.starts_with("<!doctype html") || lower.starts_with("<html")
}

/// Some servers (and engines rendering a text resource) wrap raw text in an
/// HTML document. Return the document's text content in that case.
pub fn unwrap_stylesheet_body(body: &str, content_type: Option<&str>) -> String {
    let is_html_type = content_type.is_some_and(|ct| ct.to_ascii_lowercase().starts_with("text/html"));
    if !is_html_type && !looks_like_html(body) {
        return body.to_string();
    }

    let document = Html::parse_document(body);
    match document.select(&BODY_TEXT).next() {
        Some(body_el) => body_el.text().collect::<String>().trim().to_string(),
        None => document.root_element().text().collect::<String>().trim().to_string(),
    }
}
