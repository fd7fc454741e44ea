//! Scriptable in-memory engine for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use super::scripts::PAGE_STYLES;
use super::{BrowsingContext, Engine, EngineLauncher, EnginePage, NavigationOutcome, RenderError, Viewport};

/// What fake pages answer.
#[derive(Debug, Clone)]
pub struct FakeBehavior {
    /// Number of launches that fail before one succeeds.
    pub failed_launches: usize,
    pub nav_status: Option<u16>,
    pub nav_delay: Duration,
    /// Returned for the critical-rule snapshot script.
    pub snapshot: Value,
    /// Returned for the page-own stylesheet listing.
    pub page_styles: Value,
    /// Returned for the in-context stylesheet fetch.
    pub in_context: Value,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            failed_launches: 0,
            nav_status: Some(200),
            nav_delay: Duration::ZERO,
            snapshot: json!({ "visibleElements": 0, "rules": [] }),
            page_styles: json!([]),
            in_context: json!({ "error": "not scripted" }),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeStats {
    contexts_opened: AtomicUsize,
    contexts_closed: AtomicUsize,
    open_now: AtomicUsize,
    max_open: AtomicUsize,
    engines_closed: AtomicUsize,
    styles_added: AtomicUsize,
    styles_removed: AtomicUsize,
    navigations: Mutex<Vec<String>>,
    injected: Mutex<Vec<String>>,
    scripts: Mutex<Vec<String>>,
}

impl FakeStats {
    pub fn contexts_opened(&self) -> usize {
        self.contexts_opened.load(Ordering::SeqCst)
    }

    pub fn contexts_closed(&self) -> usize {
        self.contexts_closed.load(Ordering::SeqCst)
    }

    pub fn max_open_contexts(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn engines_closed(&self) -> usize {
        self.engines_closed.load(Ordering::SeqCst)
    }

    pub fn styles_added(&self) -> usize {
        self.styles_added.load(Ordering::SeqCst)
    }

    pub fn styles_removed(&self) -> usize {
        self.styles_removed.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    /// CSS text of every injected style, in order.
    pub fn injected(&self) -> Vec<String> {
        self.injected.lock().unwrap().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }
}

pub struct FakeLauncher {
    behavior: FakeBehavior,
    stats: Arc<FakeStats>,
    launches: AtomicUsize,
    alive_flags: Mutex<Vec<Arc<AtomicBool>>>,
}

impl FakeLauncher {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self { behavior, stats: Arc::new(FakeStats::default()), launches: AtomicUsize::new(0), alive_flags: Mutex::new(Vec::new()) }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &FakeStats {
        &self.stats
    }

    /// Simulate every launched engine process dying.
    pub fn kill_engines(&self) {
        for flag in self.alive_flags.lock().unwrap().iter() {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait::async_trait]
impl EngineLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>, RenderError> {
        let attempt = self.launches.fetch_add(1, Ordering::SeqCst);
        if attempt < self.behavior.failed_launches {
            return Err(RenderError::Launch("fake launch failure".into()));
        }
        let alive = Arc::new(AtomicBool::new(true));
        self.alive_flags.lock().unwrap().push(alive.clone());
        Ok(Arc::new(FakeEngine { behavior: self.behavior.clone(), stats: self.stats.clone(), alive }))
    }
}

struct FakeEngine {
    behavior: FakeBehavior,
    stats: Arc<FakeStats>,
    alive: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl Engine for FakeEngine {
    async fn new_context(&self, viewport: Viewport) -> Result<Arc<dyn BrowsingContext>, RenderError> {
        if !self.is_alive() {
            return Err(RenderError::EngineClosed);
        }
        self.stats.contexts_opened.fetch_add(1, Ordering::SeqCst);
        let open = self.stats.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_open.fetch_max(open, Ordering::SeqCst);
        Ok(Arc::new(FakeContext { behavior: self.behavior.clone(), stats: self.stats.clone(), viewport }))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), RenderError> {
        self.alive.store(false, Ordering::SeqCst);
        self.stats.engines_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeContext {
    behavior: FakeBehavior,
    stats: Arc<FakeStats>,
    viewport: Viewport,
}

#[async_trait::async_trait]
impl BrowsingContext for FakeContext {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    async fn new_page(&self) -> Result<Arc<dyn EnginePage>, RenderError> {
        Ok(Arc::new(FakePage { behavior: self.behavior.clone(), stats: self.stats.clone() }))
    }

    async fn close(&self) -> Result<(), RenderError> {
        self.stats.open_now.fetch_sub(1, Ordering::SeqCst);
        self.stats.contexts_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePage {
    behavior: FakeBehavior,
    stats: Arc<FakeStats>,
}

#[async_trait::async_trait]
impl EnginePage for FakePage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<NavigationOutcome, RenderError> {
        self.stats.navigations.lock().unwrap().push(url.to_string());
        if self.behavior.nav_delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(RenderError::Timeout {
                operation: "goto".into(),
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(self.behavior.nav_delay).await;
        Ok(NavigationOutcome { status: self.behavior.nav_status, final_url: Some(url.to_string()) })
    }

    async fn add_style(&self, _id: &str, css: &str) -> Result<(), RenderError> {
        self.stats.styles_added.fetch_add(1, Ordering::SeqCst);
        self.stats.injected.lock().unwrap().push(css.to_string());
        Ok(())
    }

    async fn remove_style(&self, _id: &str) -> Result<(), RenderError> {
        self.stats.styles_removed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, RenderError> {
        self.stats.scripts.lock().unwrap().push(expression.to_string());
        if expression.contains("critcssSnapshot") {
            Ok(self.behavior.snapshot.clone())
        } else if expression == PAGE_STYLES {
            Ok(self.behavior.page_styles.clone())
        } else if expression.starts_with("(async (url)") {
            Ok(self.behavior.in_context.clone())
        } else {
            Err(RenderError::Script(format!("unscripted expression: {expression}")))
        }
    }

    async fn close(&self) -> Result<(), RenderError> {
        Ok(())
    }
}
