//! Rendering engine abstraction.
//!
//! The session manager only talks to these traits; the chromiumoxide-backed
//! implementation lives behind the `render` feature and tests use an
//! in-crate fake.

#[cfg(feature = "render")]
pub mod chromium;
#[cfg(test)]
pub(crate) mod fake;
pub mod scripts;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use critcss_core::Error;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

#[cfg(feature = "render")]
pub use chromium::{ChromiumEngine, ChromiumLauncher, LaunchOptions};
pub use session::RenderSession;

/// Errors raised by an engine implementation.
#[derive(Debug, ThisError)]
pub enum RenderError {
    /// Failed to launch or connect to the browser.
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// The engine (or its event loop) is gone.
    #[error("browser closed unexpectedly")]
    EngineClosed,

    /// Failed to create or tear down a browsing context or page.
    #[error("context operation failed: {0}")]
    Context(String),

    /// Failed to navigate to URL.
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// Script evaluation failed or returned something unusable.
    #[error("script evaluation failed: {0}")]
    Script(String),

    /// An engine operation exceeded its bound.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, url: String, timeout_ms: u64 },
}

impl From<RenderError> for Error {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Launch(reason) => Error::EngineStartup(reason),
            RenderError::EngineClosed => Error::EngineStartup("browser closed unexpectedly".into()),
            RenderError::Navigation { url, reason } => Error::Navigation { url, reason },
            RenderError::Timeout { operation, url, timeout_ms } => Error::ExtractionTimeout { operation, url, timeout_ms },
            RenderError::Context(reason) | RenderError::Script(reason) => Error::Extraction(reason),
        }
    }
}

/// Browsing context viewport in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1200, height: 800 }
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// What a navigation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationOutcome {
    /// HTTP status of the main document, when the engine can report it.
    pub status: Option<u16>,
    pub final_url: Option<String>,
}

impl NavigationOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_none_or(|status| (200..400).contains(&status))
    }
}

/// A page inside a browsing context.
#[async_trait::async_trait]
pub trait EnginePage: Send + Sync {
    /// Navigate and wait for the load event.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<NavigationOutcome, RenderError>;

    /// Append a `<style>` element tagged with `id`.
    async fn add_style(&self, id: &str, css: &str) -> Result<(), RenderError>;

    /// Remove the `<style>` element tagged with `id`. Missing elements are not an error.
    async fn remove_style(&self, id: &str) -> Result<(), RenderError>;

    /// Evaluate an expression, awaiting promises, and return its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, RenderError>;

    async fn close(&self) -> Result<(), RenderError>;
}

/// An isolated, short-lived browsing session.
#[async_trait::async_trait]
pub trait BrowsingContext: Send + Sync {
    fn viewport(&self) -> Viewport;

    async fn new_page(&self) -> Result<Arc<dyn EnginePage>, RenderError>;

    /// Dispose the context and every page in it.
    async fn close(&self) -> Result<(), RenderError>;
}

/// A running rendering engine process.
#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    async fn new_context(&self, viewport: Viewport) -> Result<Arc<dyn BrowsingContext>, RenderError>;

    /// False once the process or its event loop has died.
    fn is_alive(&self) -> bool;

    async fn close(&self) -> Result<(), RenderError>;
}

/// Starts engines on demand.
#[async_trait::async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Engine>, RenderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_outcome_success() {
        let ok = NavigationOutcome { status: Some(200), final_url: None };
        let redirect = NavigationOutcome { status: Some(304), final_url: None };
        let missing = NavigationOutcome { status: Some(404), final_url: None };
        let unknown = NavigationOutcome { status: None, final_url: None };

        assert!(ok.is_success());
        assert!(redirect.is_success());
        assert!(!missing.is_success());
        assert!(unknown.is_success());
    }

    #[test]
    fn test_render_error_maps_to_taxonomy() {
        use critcss_core::ErrorKind;

        let launch: Error = RenderError::Launch("no chrome".into()).into();
        assert_eq!(launch.kind(), ErrorKind::EngineStartup);

        let nav: Error = RenderError::Navigation { url: "https://a.test".into(), reason: "refused".into() }.into();
        assert_eq!(nav.kind(), ErrorKind::Navigation);

        let timeout: Error =
            RenderError::Timeout { operation: "goto".into(), url: "https://a.test".into(), timeout_ms: 10 }.into();
        assert_eq!(timeout.kind(), ErrorKind::ExtractionTimeout);

        let script: Error = RenderError::Script("boom".into()).into();
        assert_eq!(script.kind(), ErrorKind::Extraction);
    }

    #[test]
    fn test_viewport_display() {
        assert_eq!(Viewport::default().to_string(), "1200x800");
    }
}
