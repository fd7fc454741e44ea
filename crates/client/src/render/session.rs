//! Shared engine ownership and per-request browsing contexts.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use super::{BrowsingContext, Engine, EngineLauncher, RenderError, Viewport};
use critcss_core::Error;

/// Owns one lazily launched engine and lends out isolated contexts.
///
/// Contexts run concurrently up to `max_contexts`. Every context handed to a
/// [`with_context`](Self::with_context) callback is closed when the callback
/// finishes, fails, or its future is dropped.
pub struct RenderSession {
    launcher: Arc<dyn EngineLauncher>,
    engine: Mutex<Option<Arc<dyn Engine>>>,
    permits: Arc<Semaphore>,
    max_contexts: usize,
}

impl RenderSession {
    pub fn new(launcher: Arc<dyn EngineLauncher>, max_contexts: usize) -> Self {
        let max_contexts = max_contexts.max(1);
        Self { launcher, engine: Mutex::new(None), permits: Arc::new(Semaphore::new(max_contexts)), max_contexts }
    }

    pub fn max_contexts(&self) -> usize {
        self.max_contexts
    }

    /// Launch the engine if it is not running (or has died). Idempotent.
    ///
    /// A launch failure only fails this call; the next call tries again.
    pub async fn ensure_engine_ready(&self) -> Result<Arc<dyn Engine>, Error> {
        let mut guard = self.engine.lock().await;

        if let Some(engine) = guard.as_ref() {
            if engine.is_alive() {
                return Ok(Arc::clone(engine));
            }
            tracing::warn!("rendering engine died, relaunching");
            *guard = None;
        }

        let engine = self.launcher.launch().await.map_err(|e| match e {
            RenderError::Launch(reason) => Error::EngineStartup(reason),
            other => Error::EngineStartup(other.to_string()),
        })?;
        tracing::info!(max_contexts = self.max_contexts, "rendering engine launched");
        *guard = Some(Arc::clone(&engine));
        Ok(engine)
    }

    /// Run `f` with a fresh context sized to `viewport`, then tear it down.
    pub async fn with_context<F, Fut, T>(&self, viewport: Viewport, f: F) -> Result<T, Error>
    where
        F: FnOnce(Arc<dyn BrowsingContext>) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::EngineStartup("render session is shut down".into()))?;

        let engine = self.ensure_engine_ready().await?;
        let context = match engine.new_context(viewport).await {
            Ok(context) => context,
            Err(e) => {
                if !engine.is_alive() {
                    self.forget_engine(&engine).await;
                }
                return Err(e.into());
            }
        };
        tracing::debug!(%viewport, "browsing context opened");

        let guard = ContextGuard { context: Some(Arc::clone(&context)), permit: Some(permit) };
        let result = f(context).await;
        guard.close().await;
        result
    }

    /// Close the shared engine. A later request launches a new one.
    pub async fn shutdown(&self) {
        let engine = self.engine.lock().await.take();
        if let Some(engine) = engine {
            match engine.close().await {
                Ok(()) => tracing::info!("rendering engine closed"),
                Err(e) => tracing::warn!(error = %e, "failed to close rendering engine"),
            }
        }
    }

    async fn forget_engine(&self, dead: &Arc<dyn Engine>) {
        let mut guard = self.engine.lock().await;
        if guard.as_ref().is_some_and(|current| Arc::ptr_eq(current, dead)) {
            *guard = None;
        }
    }
}

/// Closes its context on every exit path.
///
/// The happy path awaits [`ContextGuard::close`]; if the owning future is
/// dropped first, `Drop` hands the close to the runtime instead.
struct ContextGuard {
    context: Option<Arc<dyn BrowsingContext>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl ContextGuard {
    async fn close(mut self) {
        if let Some(context) = self.context.take() {
            close_context(context).await;
        }
        self.permit.take();
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        let permit = self.permit.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    close_context(context).await;
                    drop(permit);
                });
            }
            Err(_) => tracing::warn!("no runtime available to close abandoned browsing context"),
        }
    }
}

async fn close_context(context: Arc<dyn BrowsingContext>) {
    match context.close().await {
        Ok(()) => tracing::debug!("browsing context closed"),
        Err(e) => tracing::warn!(error = %e, "failed to close browsing context"),
    }
}
