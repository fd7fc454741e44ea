//! Unified error types for critcss.
//!
//! Every failure carries a stable code (the `Display` prefix and [`ErrorKind`])
//! plus enough context to log and report it without re-deriving anything.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite;

/// Stable error kinds surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidInput,
    InvalidUrl,
    EngineStartup,
    Navigation,
    Resolution,
    AcquisitionTimeout,
    ExtractionTimeout,
    EmptyContent,
    HttpStatus,
    Extraction,
    CacheIo,
    Store,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::InvalidUrl => "INVALID_URL",
            ErrorKind::EngineStartup => "ENGINE_STARTUP",
            ErrorKind::Navigation => "NAVIGATION",
            ErrorKind::Resolution => "RESOLUTION",
            ErrorKind::AcquisitionTimeout => "ACQUISITION_TIMEOUT",
            ErrorKind::ExtractionTimeout => "EXTRACTION_TIMEOUT",
            ErrorKind::EmptyContent => "EMPTY_CONTENT",
            ErrorKind::HttpStatus => "HTTP_STATUS",
            ErrorKind::Extraction => "EXTRACTION",
            ErrorKind::CacheIo => "CACHE_IO",
            ErrorKind::Store => "STORE_ERROR",
        }
    }

    /// JSON-RPC error code used by the MCP surface.
    pub fn rpc_code(&self) -> i32 {
        match self {
            ErrorKind::InvalidInput => -32602,
            ErrorKind::Extraction => -32000,
            ErrorKind::Store => -32002,
            ErrorKind::InvalidUrl => -32003,
            ErrorKind::EngineStartup => -32004,
            ErrorKind::Navigation => -32005,
            ErrorKind::Resolution => -32006,
            ErrorKind::AcquisitionTimeout => -32007,
            ErrorKind::ExtractionTimeout => -32008,
            ErrorKind::EmptyContent => -32009,
            ErrorKind::HttpStatus => -32010,
            ErrorKind::CacheIo => -32011,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the critcss workspace.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., no stylesheet source given).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// URL could not be parsed or uses an unsupported scheme.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// The shared rendering engine could not be started.
    #[error("ENGINE_STARTUP: {0}")]
    EngineStartup(String),

    /// Target page unreachable or answered with a non-success status.
    #[error("NAVIGATION: {url}: {reason}")]
    Navigation { url: String, reason: String },

    /// Name resolution or network failure after exhausting retries.
    #[error("RESOLUTION: {url}: {reason}")]
    Resolution { url: String, reason: String },

    /// Stylesheet acquisition exceeded its time bound.
    #[error("ACQUISITION_TIMEOUT: {url} after {timeout_ms}ms")]
    AcquisitionTimeout { url: String, timeout_ms: u64 },

    /// An in-context operation exceeded its time bound.
    #[error("EXTRACTION_TIMEOUT: {operation} on {url} after {timeout_ms}ms")]
    ExtractionTimeout { operation: String, url: String, timeout_ms: u64 },

    /// Fetched stylesheet content was blank.
    #[error("EMPTY_CONTENT: {0} returned empty stylesheet content")]
    EmptyContent(String),

    /// Stylesheet server answered with a non-success status.
    #[error("HTTP_STATUS: {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    /// The in-page snapshot could not be produced or decoded.
    #[error("EXTRACTION: {0}")]
    Extraction(String),

    /// Disk tier filesystem failure.
    #[error("CACHE_IO: {0}")]
    CacheIo(#[from] std::io::Error),

    /// Result store (SQLite) failure.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::InvalidUrl(_) => ErrorKind::InvalidUrl,
            Error::EngineStartup(_) => ErrorKind::EngineStartup,
            Error::Navigation { .. } => ErrorKind::Navigation,
            Error::Resolution { .. } => ErrorKind::Resolution,
            Error::AcquisitionTimeout { .. } => ErrorKind::AcquisitionTimeout,
            Error::ExtractionTimeout { .. } => ErrorKind::ExtractionTimeout,
            Error::EmptyContent(_) => ErrorKind::EmptyContent,
            Error::HttpStatus { .. } => ErrorKind::HttpStatus,
            Error::Extraction(_) => ErrorKind::Extraction,
            Error::CacheIo(_) => ErrorKind::CacheIo,
            Error::Database(_) | Error::MigrationFailed(_) => ErrorKind::Store,
        }
    }

    /// Message without the code prefix.
    pub fn message(&self) -> String {
        let full = self.to_string();
        let prefix = format!("{}: ", self.kind().as_str());
        match full.strip_prefix(&prefix) {
            Some(rest) => rest.to_string(),
            None => full,
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let kind = err.kind();
        let data = serde_json::json!({ "kind": kind.as_str() });
        McpError { code: ErrorCode(kind.rpc_code()), message: err.to_string().into(), data: Some(data) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::EmptyContent("https://cdn.example.com/site.css".to_string());
        assert!(err.to_string().starts_with("EMPTY_CONTENT"));
        assert!(err.to_string().contains("site.css"));
    }

    #[test]
    fn test_error_kind_matches_prefix() {
        let errors = vec![
            Error::InvalidInput("x".into()),
            Error::EngineStartup("no chrome".into()),
            Error::Navigation { url: "https://a.test".into(), reason: "status 404".into() },
            Error::Resolution { url: "https://a.test".into(), reason: "dns".into() },
            Error::AcquisitionTimeout { url: "https://a.test".into(), timeout_ms: 15000 },
            Error::ExtractionTimeout { operation: "goto".into(), url: "https://a.test".into(), timeout_ms: 1 },
            Error::HttpStatus { url: "https://a.test".into(), status: 403 },
        ];
        for err in errors {
            assert!(err.to_string().starts_with(err.kind().as_str()), "{err}");
        }
    }

    #[test]
    fn test_message_strips_code() {
        let err = Error::InvalidInput("url cannot be empty".into());
        assert_eq!(err.message(), "url cannot be empty");
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::EmptyContent("https://a.test/x.css".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32009);
        assert_eq!(mcp_err.data.unwrap()["kind"], "EMPTY_CONTENT");
    }

    #[test]
    fn test_rpc_codes_are_distinct() {
        let kinds = [
            ErrorKind::InvalidInput,
            ErrorKind::InvalidUrl,
            ErrorKind::EngineStartup,
            ErrorKind::Navigation,
            ErrorKind::Resolution,
            ErrorKind::AcquisitionTimeout,
            ErrorKind::ExtractionTimeout,
            ErrorKind::EmptyContent,
            ErrorKind::HttpStatus,
            ErrorKind::Extraction,
            ErrorKind::CacheIo,
            ErrorKind::Store,
        ];
        let codes: std::collections::HashSet<i32> = kinds.iter().map(|k| k.rpc_code()).collect();
        assert_eq!(codes.len(), kinds.len());
    }
}
