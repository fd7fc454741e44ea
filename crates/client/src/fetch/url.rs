//! URL canonicalization so trivially different spellings share a cache key.

use critcss_core::Error;
use url::Url;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL {input}: {reason}")]
    InvalidUrl { input: String, reason: String },
}

impl From<UrlError> for Error {
    fn from(err: UrlError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}

/// Canonicalize a stylesheet or page URL.
///
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (cache-busting parameters select distinct sheets)
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let candidate = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
    let mut parsed =
        Url::parse(&candidate).map_err(|e| UrlError::InvalidUrl { input: trimmed.to_string(), reason: e.to_string() })?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str().map(str::to_lowercase) {
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl { input: trimmed.to_string(), reason: e.to_string() })?;
    }

    parsed.set_fragment(None);
    Ok(parsed)
}

/// Resolve a possibly relative stylesheet reference against the page URL.
pub fn resolve_reference(base: &Url, href: &str) -> Result<Url, UrlError> {
    let joined = base
        .join(href.trim())
        .map_err(|e| UrlError::InvalidUrl { input: href.to_string(), reason: e.to_string() })?;
    canonicalize(joined.as_str())
}
