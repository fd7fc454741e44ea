//! Headless Chrome/Chromium engine using chromiumoxide.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{BrowserContextId, CloseParams};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use critcss_core::AppConfig;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;

use super::scripts;
use super::{BrowsingContext, Engine, EngineLauncher, EnginePage, NavigationOutcome, RenderError, Viewport};

/// Browser process options.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub executable: Option<PathBuf>,
    pub no_sandbox: bool,
    /// Bound on individual DevTools protocol requests.
    pub request_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self { executable: None, no_sandbox: false, request_timeout: Duration::from_secs(30) }
    }
}

impl From<&AppConfig> for LaunchOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            executable: config.chrome_executable.clone(),
            no_sandbox: config.no_sandbox,
            request_timeout: config.extraction_timeout(),
        }
    }
}

pub struct ChromiumLauncher {
    options: LaunchOptions,
}

impl ChromiumLauncher {
    pub fn new(options: LaunchOptions) -> Self {
        Self { options }
    }
}

#[async_trait::async_trait]
impl EngineLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>, RenderError> {
        let engine = ChromiumEngine::launch(&self.options).await?;
        Ok(Arc::new(engine))
    }
}

/// A running headless browser.
///
/// The CDP handler runs on a background task; when it stops the engine
/// reports itself dead so the session can relaunch.
pub struct ChromiumEngine {
    browser: Arc<Browser>,
    alive: Arc<AtomicBool>,
}

impl ChromiumEngine {
    pub async fn launch(options: &LaunchOptions) -> Result<Self, RenderError> {
        let mut builder = BrowserConfig::builder().request_timeout(options.request_timeout).arg("--disable-gpu");
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        if options.no_sandbox {
            builder = builder.no_sandbox();
        }
        let config = builder.build().map_err(RenderError::Launch)?;

        let (browser, mut handler) =
            Browser::launch(config).await.map_err(|e| RenderError::Launch(e.to_string()))?;

        let alive = Arc::new(AtomicBool::new(true));
        let handler_alive = alive.clone();
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler event error: {e}");
                }
            }
            handler_alive.store(false, Ordering::SeqCst);
            tracing::debug!("browser handler loop ended");
        });

        Ok(Self { browser: Arc::new(browser), alive })
    }
}

#[async_trait::async_trait]
impl Engine for ChromiumEngine {
    async fn new_context(&self, viewport: Viewport) -> Result<Arc<dyn BrowsingContext>, RenderError> {
        if !self.is_alive() {
            return Err(RenderError::EngineClosed);
        }
        let created = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| RenderError::Context(format!("create browser context: {e}")))?;

        Ok(Arc::new(ChromiumContext {
            browser: self.browser.clone(),
            id: created.result.browser_context_id.clone(),
            viewport,
            closed: AtomicBool::new(false),
        }))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), RenderError> {
        if !self.is_alive() {
            return Ok(());
        }
        self.browser.execute(CloseParams::default()).await.map_err(|e| RenderError::Context(e.to_string()))?;
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct ChromiumContext {
    browser: Arc<Browser>,
    id: BrowserContextId,
    viewport: Viewport,
    closed: AtomicBool,
}

#[async_trait::async_trait]
impl BrowsingContext for ChromiumContext {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    async fn new_page(&self) -> Result<Arc<dyn EnginePage>, RenderError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RenderError::Context("browsing context already closed".into()));
        }
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.id.clone())
            .build()
            .map_err(RenderError::Context)?;
        let page = self.browser.new_page(params).await.map_err(|e| RenderError::Context(e.to_string()))?;

        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(self.viewport.width),
            i64::from(self.viewport.height),
            1.0,
            false,
        ))
        .await
        .map_err(|e| RenderError::Context(format!("set viewport: {e}")))?;

        Ok(Arc::new(ChromiumPage { page }))
    }

    async fn close(&self) -> Result<(), RenderError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.browser
            .execute(DisposeBrowserContextParams::new(self.id.clone()))
            .await
            .map_err(|e| RenderError::Context(format!("dispose browser context: {e}")))?;
        Ok(())
    }
}

struct ChromiumPage {
    page: Page,
}

#[derive(Debug, Deserialize)]
struct NavigationInfo {
    status: Option<u16>,
    url: Option<String>,
}

#[async_trait::async_trait]
impl EnginePage for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<NavigationOutcome, RenderError> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(RenderError::Navigation { url: url.to_string(), reason: e.to_string() }),
            Err(_) => {
                return Err(RenderError::Timeout {
                    operation: "navigate".into(),
                    url: url.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }

        let info = self.evaluate(scripts::NAVIGATION_INFO).await?;
        let info: NavigationInfo =
            serde_json::from_value(info).map_err(|e| RenderError::Script(format!("navigation info: {e}")))?;
        Ok(NavigationOutcome { status: info.status, final_url: info.url })
    }

    async fn add_style(&self, id: &str, css: &str) -> Result<(), RenderError> {
        self.evaluate(&scripts::add_style(id, css)).await.map(|_| ())
    }

    async fn remove_style(&self, id: &str) -> Result<(), RenderError> {
        self.evaluate(&scripts::remove_style(id)).await.map(|_| ())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, RenderError> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(RenderError::Script)?;

        let result = self.page.evaluate_expression(params).await.map_err(|e| RenderError::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn close(&self) -> Result<(), RenderError> {
        self.page.clone().close().await.map_err(|e| RenderError::Context(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_options_from_config() {
        let config = AppConfig {
            chrome_executable: Some(PathBuf::from("/opt/chromium/chrome")),
            no_sandbox: true,
            extraction_timeout_ms: 5000,
            ..AppConfig::default()
        };
        let options = LaunchOptions::from(&config);
        assert_eq!(options.executable.as_deref(), Some(std::path::Path::new("/opt/chromium/chrome")));
        assert!(options.no_sandbox);
        assert_eq!(options.request_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    #[ignore = "requires Chrome/Chromium installation"]
    async fn test_chromium_launch_and_close() {
        let engine = ChromiumEngine::launch(&LaunchOptions::default()).await.unwrap();
        assert!(engine.is_alive());
        engine.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires Chrome/Chromium installation"]
    async fn test_style_injection_round_trip() {
        let engine = ChromiumEngine::launch(&LaunchOptions::default()).await.unwrap();
        let context = engine.new_context(Viewport::default()).await.unwrap();
        let page = context.new_page().await.unwrap();

        page.goto("data:text/html,<h1>hi</h1>", Duration::from_secs(10)).await.unwrap();
        page.add_style("t1", "h1{color:red}").await.unwrap();
        let count = page.evaluate("document.querySelectorAll('style[data-critcss]').length").await.unwrap();
        assert_eq!(count, serde_json::json!(1));

        page.remove_style("t1").await.unwrap();
        let count = page.evaluate("document.querySelectorAll('style[data-critcss]').length").await.unwrap();
        assert_eq!(count, serde_json::json!(0));

        context.close().await.unwrap();
        engine.close().await.unwrap();
    }

    async fn critical_for(html: &str, css: &str) -> String {
        let viewport = Viewport::new(1200, 800);
        let engine = ChromiumEngine::launch(&LaunchOptions::default()).await.unwrap();
        let context = engine.new_context(viewport).await.unwrap();
        let page = context.new_page().await.unwrap();
        page.goto(&format!("data:text/html,{html}"), Duration::from_secs(10)).await.unwrap();

        let selection = crate::critical::select_critical(page.as_ref(), css, viewport, Duration::ZERO).await.unwrap();

        context.close().await.unwrap();
        engine.close().await.unwrap();
        selection.css
    }

    #[tokio::test]
    #[ignore = "requires Chrome/Chromium installation"]
    async fn test_below_fold_rules_are_dropped() {
        let html = r#"<header style="height:50px">top</header><p class="below" style="position:absolute;top:2000px">later</p>"#;
        let css = critical_for(html, "header{color:red} .below{color:blue}").await;
        assert!(css.contains("header"), "{css}");
        assert!(!css.contains(".below"), "{css}");
    }

    #[tokio::test]
    #[ignore = "requires Chrome/Chromium installation"]
    async fn test_hidden_elements_do_not_count_as_visible() {
        let html = r#"<header style="height:50px">top</header>
            <div class="gone" style="display:none">a</div>
            <div class="ghost" style="visibility:hidden">b</div>
            <div class="faded" style="opacity:0">c</div>"#;
        let css = critical_for(html, "header{color:red} .gone{color:blue} .ghost{color:blue} .faded{color:blue}").await;
        assert!(css.contains("header"), "{css}");
        for hidden in [".gone", ".ghost", ".faded"] {
            assert!(!css.contains(hidden), "{hidden} kept in {css}");
        }
    }
}
