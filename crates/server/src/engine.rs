//! Engine launcher selection.

use std::sync::Arc;

use critcss_client::render::{Engine, EngineLauncher, RenderError};
use critcss_core::AppConfig;

/// Launcher for builds (and tests) without a rendering engine.
///
/// Every launch fails, so extraction requests report `ENGINE_STARTUP` while
/// cache and result tools keep working.
pub struct Unavailable;

#[async_trait::async_trait]
impl EngineLauncher for Unavailable {
    async fn launch(&self) -> Result<Arc<dyn Engine>, RenderError> {
        Err(RenderError::Launch("critcss-mcp was built without the render feature".into()))
    }
}

#[cfg(feature = "render")]
pub fn launcher(config: &AppConfig) -> Arc<dyn EngineLauncher> {
    use critcss_client::{ChromiumLauncher, LaunchOptions};
    Arc::new(ChromiumLauncher::new(LaunchOptions::from(config)))
}

#[cfg(not(feature = "render"))]
pub fn launcher(_config: &AppConfig) -> Arc<dyn EngineLauncher> {
    Arc::new(Unavailable)
}
