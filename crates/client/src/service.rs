//! Critical CSS service: the cache-fronted acquisition and extraction flow.

use std::sync::Arc;
use std::time::Duration;

use critcss_core::cache::is_valid_key;
use critcss_core::{
    AppConfig, CacheStats, Error, InvalidateTarget, InvalidationReport, Provenance, StylesheetCache, stylesheet_key,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::critical::{CriticalSelection, SelectionStats, select_critical};
use crate::fetch::{Acquisition, FetchConfig, StylesheetFetcher, canonicalize, resolve_reference};
use crate::render::{BrowsingContext, EngineLauncher, EnginePage, RenderSession, Viewport, scripts};

/// Where the stylesheet of an extraction comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StylesheetSource {
    /// CSS text supplied by the caller; never cached.
    Literal(String),
    /// A stylesheet URL resolved through the cache.
    Url(String),
    /// The target page's own `<style>` blocks and linked sheets.
    PageOwn,
}

/// One extraction.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub target_url: String,
    pub source: StylesheetSource,
    pub viewport: Viewport,
    pub timeout: Duration,
    /// Skip the cache lookup for the stylesheet (the fetched copy is still stored).
    pub force: bool,
    /// The stylesheet URL needs the browsing session's credentials.
    pub requires_credentials: bool,
}

/// Outcome of [`CriticalCssService::generate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ExtractionResult {
    pub url: String,
    pub critical_css: String,
    pub stats: SelectionStats,
    /// Cache provenance of the stylesheet; absent for literal CSS.
    pub provenance: Option<Provenance>,
    /// Stylesheet URLs that contributed, in order.
    pub stylesheet_urls: Vec<String>,
}

/// A stylesheet resolved through the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FetchedStylesheet {
    pub url: String,
    pub key: String,
    pub content: String,
    pub provenance: Provenance,
}

/// Defaults applied to requests.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub viewport: Viewport,
    pub extraction_timeout: Duration,
    pub settle: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { viewport: Viewport::default(), extraction_timeout: Duration::from_secs(30), settle: Duration::from_secs(1) }
    }
}

impl From<&AppConfig> for ServiceSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            viewport: Viewport::new(config.viewport_width, config.viewport_height),
            extraction_timeout: config.extraction_timeout(),
            settle: config.settle(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum PageStyle {
    Inline { text: String },
    Link { href: String },
}

/// CSS text with where it came from.
struct ResolvedCss {
    css: String,
    provenance: Option<Provenance>,
    urls: Vec<String>,
}

fn provenance_rank(provenance: Provenance) -> u8 {
    match provenance {
        Provenance::MemoryHit => 0,
        Provenance::DiskHit => 1,
        Provenance::MissDownloaded => 2,
    }
}

/// The least favourable of two provenances.
pub fn worst_provenance(current: Option<Provenance>, next: Provenance) -> Provenance {
    match current {
        Some(current) if provenance_rank(current) >= provenance_rank(next) => current,
        _ => next,
    }
}

pub struct CriticalCssService {
    cache: Arc<StylesheetCache>,
    fetcher: StylesheetFetcher,
    session: Arc<RenderSession>,
    settings: ServiceSettings,
}

impl CriticalCssService {
    pub fn new(
        cache: Arc<StylesheetCache>, fetcher: StylesheetFetcher, session: Arc<RenderSession>, settings: ServiceSettings,
    ) -> Self {
        Self { cache, fetcher, session, settings }
    }

    /// Open the cache and wire everything from configuration.
    pub async fn from_config(config: &AppConfig, launcher: Arc<dyn EngineLauncher>) -> Result<Self, Error> {
        let cache = Arc::new(StylesheetCache::open(&config.cache_dir, config.cache_policy()).await?);
        let fetcher = StylesheetFetcher::new(FetchConfig::from(config))?;
        let session = Arc::new(RenderSession::new(launcher, config.max_contexts));
        Ok(Self::new(cache, fetcher, session, ServiceSettings::from(config)))
    }

    pub fn cache(&self) -> &Arc<StylesheetCache> {
        &self.cache
    }

    pub fn session(&self) -> &Arc<RenderSession> {
        &self.session
    }

    pub fn fetcher(&self) -> &StylesheetFetcher {
        &self.fetcher
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// A request carrying the configured defaults.
    pub fn request(&self, target_url: impl Into<String>, source: StylesheetSource) -> ExtractionRequest {
        ExtractionRequest {
            target_url: target_url.into(),
            source,
            viewport: self.settings.viewport,
            timeout: self.settings.extraction_timeout,
            force: false,
            requires_credentials: false,
        }
    }

    /// Resolve a stylesheet URL through the cache, downloading on a miss.
    pub async fn fetch_stylesheet(&self, source_url: &str, force_refresh: bool) -> Result<FetchedStylesheet, Error> {
        self.resolve(source_url, force_refresh, false, None).await
    }

    /// Extract the critical subset of `css` for `target_url`.
    pub async fn extract_critical(
        &self, target_url: &str, css: &str, viewport: Viewport, timeout: Duration,
    ) -> Result<CriticalSelection, Error> {
        if css.trim().is_empty() {
            return Err(Error::InvalidInput("css must not be empty".into()));
        }
        let target = canonicalize(target_url)?;
        let settle = self.settings.settle;

        let work = self.session.with_context(viewport, |context| {
            let target = &target;
            async move {
                let page = context.new_page().await?;
                navigate(page.as_ref(), target, timeout).await?;
                select_critical(page.as_ref(), css, viewport, settle).await
            }
        });

        bounded(work, "extract_critical", &target, timeout).await
    }

    /// Run the full flow for one request.
    pub async fn generate(&self, request: ExtractionRequest) -> Result<ExtractionResult, Error> {
        if let StylesheetSource::Literal(css) = &request.source
            && css.trim().is_empty()
        {
            return Err(Error::InvalidInput("css must not be empty".into()));
        }
        let target = canonicalize(&request.target_url)?;
        let settle = self.settings.settle;
        tracing::info!(url = %target, viewport = %request.viewport, "generating critical css");

        let work = self.session.with_context(request.viewport, |context| {
            let (request, target) = (&request, &target);
            async move {
                let prefetched = match &request.source {
                    StylesheetSource::Literal(css) => {
                        Some(ResolvedCss { css: css.clone(), provenance: None, urls: Vec::new() })
                    }
                    StylesheetSource::Url(url) => {
                        let fetched = self
                            .resolve(url, request.force, request.requires_credentials, Some(context.as_ref()))
                            .await?;
                        Some(ResolvedCss {
                            css: fetched.content,
                            provenance: Some(fetched.provenance),
                            urls: vec![fetched.url],
                        })
                    }
                    StylesheetSource::PageOwn => None,
                };

                let page = context.new_page().await?;
                navigate(page.as_ref(), target, request.timeout).await?;

                let resolved = match prefetched {
                    Some(resolved) => resolved,
                    None => self.page_styles(page.as_ref(), context.as_ref(), target, request).await?,
                };

                let selection = select_critical(page.as_ref(), &resolved.css, request.viewport, settle).await?;
                Ok(ExtractionResult {
                    url: target.to_string(),
                    critical_css: selection.css,
                    stats: selection.stats,
                    provenance: resolved.provenance,
                    stylesheet_urls: resolved.urls,
                })
            }
        });

        let result = bounded(work, "generate", &target, request.timeout).await?;
        tracing::info!(
            url = %result.url,
            critical_bytes = result.stats.critical_bytes,
            reduction = result.stats.reduction_percent,
            provenance = result.provenance.map(|p| p.as_str()).unwrap_or("none"),
            "critical css generated"
        );
        Ok(result)
    }

    pub async fn cache_stats(&self) -> Result<CacheStats, Error> {
        self.cache.stats().await
    }

    /// Invalidate by cache key, stylesheet URL, or `"*"` for everything.
    pub async fn invalidate(&self, target: &str) -> Result<InvalidationReport, Error> {
        let target = match InvalidateTarget::parse(target) {
            InvalidateTarget::All => InvalidateTarget::All,
            InvalidateTarget::Key(key) if is_valid_key(&key) => InvalidateTarget::Key(key),
            InvalidateTarget::Key(url) => InvalidateTarget::Key(stylesheet_key(canonicalize(&url)?.as_str())),
        };
        self.cache.invalidate(&target).await
    }

    pub async fn shutdown(&self) {
        self.session.shutdown().await;
    }

    async fn resolve(
        &self, source_url: &str, force: bool, requires_credentials: bool, context: Option<&dyn BrowsingContext>,
    ) -> Result<FetchedStylesheet, Error> {
        let url = canonicalize(source_url)?;
        let key = stylesheet_key(url.as_str());

        if !force && let Some((entry, provenance)) = self.cache.lookup(&key).await? {
            return Ok(FetchedStylesheet { url: url.to_string(), key, content: entry.content.clone(), provenance });
        }

        let mut acquisition = Acquisition::new(&self.fetcher).requires_credentials(requires_credentials);
        if let Some(context) = context {
            acquisition = acquisition.with_context(context);
        }
        let (content, strategy) = acquisition.run(&url).await?;
        self.cache.record_download();

        if let Err(e) = self.cache.store(&key, url.as_str(), &content).await {
            tracing::warn!(url = %url, error = %e, "failed to cache stylesheet, continuing with fetched copy");
        }
        tracing::debug!(url = %url, strategy = strategy.as_str(), bytes = content.len(), "stylesheet downloaded");

        Ok(FetchedStylesheet { url: url.to_string(), key, content, provenance: Provenance::MissDownloaded })
    }

    async fn page_styles(
        &self, page: &dyn EnginePage, context: &dyn BrowsingContext, target: &Url, request: &ExtractionRequest,
    ) -> Result<ResolvedCss, Error> {
        let value = page.evaluate(scripts::PAGE_STYLES).await?;
        let styles: Vec<PageStyle> =
            serde_json::from_value(value).map_err(|e| Error::Extraction(format!("malformed page stylesheet list: {e}")))?;

        let mut parts = Vec::new();
        let mut provenance = None;
        let mut urls = Vec::new();

        for style in styles {
            match style {
                PageStyle::Inline { text } => {
                    if !text.trim().is_empty() {
                        parts.push(text);
                    }
                }
                PageStyle::Link { href } => {
                    let url = match resolve_reference(target, &href) {
                        Ok(url) => url,
                        Err(e) => {
                            tracing::warn!(href, error = %e, "skipping unusable stylesheet link");
                            continue;
                        }
                    };
                    // A linked sheet we cannot obtain fails the whole request.
                    let fetched = self
                        .resolve(url.as_str(), request.force, request.requires_credentials, Some(context))
                        .await
                        .inspect_err(|e| tracing::warn!(url = %url, error = %e, "page stylesheet unavailable"))?;
                    provenance = Some(worst_provenance(provenance, fetched.provenance));
                    urls.push(fetched.url);
                    parts.push(fetched.content);
                }
            }
        }

        if parts.is_empty() {
            return Err(Error::EmptyContent(format!("{target} (no usable page stylesheets)")));
        }
        tracing::debug!(url = %target, sheets = parts.len(), "collected page stylesheets");
        Ok(ResolvedCss { css: parts.join("\n"), provenance, urls })
    }
}

async fn navigate(page: &dyn EnginePage, target: &Url, timeout: Duration) -> Result<(), Error> {
    let outcome = page.goto(target.as_str(), timeout).await?;
    if !outcome.is_success() {
        let status = outcome.status.unwrap_or_default();
        return Err(Error::Navigation { url: target.to_string(), reason: format!("status {status}") });
    }
    Ok(())
}

async fn bounded<T>(
    work: impl std::future::Future<Output = Result<T, Error>>, operation: &str, target: &Url, timeout: Duration,
) -> Result<T, Error> {
    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(Error::ExtractionTimeout {
            operation: operation.to_string(),
            url: target.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
