//! Sitemap-driven batch regeneration of stored critical CSS.

use std::time::Duration;

use chrono::{DateTime, Utc};
use critcss_core::{CriticalCssRecord, Error, ResultStore};
use futures_util::StreamExt;
use serde::Serialize;

use crate::fetch::canonicalize;
use crate::render::Viewport;
use crate::service::{CriticalCssService, ExtractionRequest, StylesheetSource};
use crate::sitemap::SitemapEntry;

/// Knobs for one batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub source: StylesheetSource,
    pub viewport: Viewport,
    pub timeout: Duration,
    /// Regenerate even when stored results are current. The stylesheet cache
    /// is still used.
    pub force: bool,
    pub dry_run: bool,
    /// Only consider the first `limit` sitemap entries.
    pub limit: Option<usize>,
    pub concurrency: usize,
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub processed: u64,
    pub skipped: u64,
    pub errors: u64,
    pub cache_hits: u64,
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed: {}, skipped: {}, errors: {}, cache hits: {}",
            self.processed, self.skipped, self.errors, self.cache_hits
        )
    }
}

enum Outcome {
    Generated { cache_hit: bool },
    Planned,
    Failed,
}

/// Regenerate every entry whose stored result is stale.
pub async fn regenerate(
    service: &CriticalCssService, store: &ResultStore, entries: &[SitemapEntry], options: &BatchOptions,
) -> Result<BatchSummary, Error> {
    let mut summary = BatchSummary::default();
    let mut due = Vec::new();
    let entries = match options.limit {
        Some(limit) if limit < entries.len() => {
            tracing::info!(limit, total = entries.len(), "limiting batch to leading sitemap entries");
            &entries[..limit]
        }
        _ => entries,
    };

    for entry in entries {
        let url = match canonicalize(&entry.loc) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::warn!(loc = %entry.loc, error = %e, "skipping invalid sitemap URL");
                summary.errors += 1;
                continue;
            }
        };
        if store.needs_regeneration(&url, entry.lastmod, options.force).await? {
            due.push((url, entry.lastmod));
        } else {
            tracing::debug!(url, "stored result is current");
            summary.skipped += 1;
        }
    }

    tracing::info!(due = due.len(), skipped = summary.skipped, dry_run = options.dry_run, "batch planned");

    let outcomes: Vec<Outcome> = futures_util::stream::iter(due)
        .map(|(url, lastmod)| regenerate_one(service, store, url, lastmod, options))
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;

    for outcome in outcomes {
        match outcome {
            Outcome::Generated { cache_hit } => {
                summary.processed += 1;
                if cache_hit {
                    summary.cache_hits += 1;
                }
            }
            Outcome::Planned => summary.processed += 1,
            Outcome::Failed => summary.errors += 1,
        }
    }

    tracing::info!(
        processed = summary.processed,
        skipped = summary.skipped,
        errors = summary.errors,
        cache_hits = summary.cache_hits,
        "batch finished"
    );
    Ok(summary)
}

async fn regenerate_one(
    service: &CriticalCssService, store: &ResultStore, url: String, lastmod: Option<DateTime<Utc>>,
    options: &BatchOptions,
) -> Outcome {
    if options.dry_run {
        tracing::info!(url, "would regenerate");
        return Outcome::Planned;
    }

    let request = ExtractionRequest {
        target_url: url.clone(),
        source: options.source.clone(),
        viewport: options.viewport,
        timeout: options.timeout,
        force: false,
        requires_credentials: false,
    };

    let result = match service.generate(request).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(url, error = %e, "regeneration failed");
            return Outcome::Failed;
        }
    };

    let record = CriticalCssRecord::new(
        &result.url,
        &result.critical_css,
        result.stats.original_bytes,
        result.stats.critical_bytes,
        lastmod,
    );
    if let Err(e) = store.upsert_result(&record).await {
        tracing::warn!(url, error = %e, "failed to store critical css");
        return Outcome::Failed;
    }

    Outcome::Generated { cache_hit: result.provenance.is_some_and(|p| p.is_hit()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchConfig, StylesheetFetcher};
    use crate::render::RenderSession;
    use crate::render::fake::{FakeBehavior, FakeLauncher};
    use crate::service::ServiceSettings;
    use chrono::TimeZone;
    use critcss_core::StylesheetCache;
    use critcss_core::cache::CachePolicy;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    async fn service(behavior: FakeBehavior, dir: &std::path::Path) -> (CriticalCssService, Arc<FakeLauncher>) {
        let cache = Arc::new(StylesheetCache::open(dir, CachePolicy::default()).await.unwrap());
        let fetcher = StylesheetFetcher::new(FetchConfig { attempts: 1, ..FetchConfig::default() }).unwrap();
        let launcher = Arc::new(FakeLauncher::new(behavior));
        let session = Arc::new(RenderSession::new(launcher.clone(), 2));
        let settings = ServiceSettings { settle: Duration::ZERO, ..ServiceSettings::default() };
        (CriticalCssService::new(cache, fetcher, session, settings), launcher)
    }

    fn behavior() -> FakeBehavior {
        FakeBehavior {
            snapshot: json!({
                "visibleElements": 1,
                "rules": [{ "kind": "style", "text": "header{}", "selector": "header", "matched": true }]
            }),
            ..FakeBehavior::default()
        }
    }

    fn options(source: StylesheetSource) -> BatchOptions {
        BatchOptions {
            source,
            viewport: Viewport::default(),
            timeout: Duration::from_secs(5),
            force: false,
            dry_run: false,
            limit: None,
            concurrency: 2,
        }
    }

    fn entry(loc: &str, day: u32) -> SitemapEntry {
        SitemapEntry { loc: loc.into(), lastmod: Some(Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()) }
    }

    #[tokio::test]
    async fn test_regenerates_then_skips_current_pages() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _launcher) = service(behavior(), dir.path()).await;
        let store = ResultStore::open_in_memory().await.unwrap();
        let server = MockServer::start_async().await;
        let css = server
            .mock_async(|when, then| {
                when.method(GET).path("/site.css");
                then.status(200).body("header{} footer{}");
            })
            .await;
        let entries = vec![entry("https://site.test/", 1), entry("https://site.test/blog", 2)];
        let opts = BatchOptions { concurrency: 1, ..options(StylesheetSource::Url(server.url("/site.css"))) };

        let first = regenerate(&service, &store, &entries, &opts).await.unwrap();
        assert_eq!(first.processed, 2);
        assert_eq!(first.errors, 0);
        assert_eq!(css.hits_async().await, 1);

        let stored = store.get_result("https://site.test/blog").await.unwrap().unwrap();
        assert_eq!(stored.css, "header{}");
        assert_eq!(stored.source_last_modified_at(), entries[1].lastmod);

        let second = regenerate(&service, &store, &entries, &opts).await.unwrap();
        assert_eq!(second, BatchSummary { processed: 0, skipped: 2, errors: 0, cache_hits: 0 });

        let forced = regenerate(&service, &store, &entries, &BatchOptions { force: true, ..opts }).await.unwrap();
        assert_eq!(forced, BatchSummary { processed: 2, skipped: 0, errors: 0, cache_hits: 2 });
        assert_eq!(css.hits_async().await, 1);
    }

    #[tokio::test]
    async fn test_cache_hits_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _launcher) = service(behavior(), dir.path()).await;
        let store = ResultStore::open_in_memory().await.unwrap();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/site.css");
                then.status(200).body("header{}");
            })
            .await;
        let opts = BatchOptions { concurrency: 1, ..options(StylesheetSource::Url(server.url("/site.css"))) };
        let entries = vec![entry("https://site.test/a", 1), entry("https://site.test/b", 1)];

        let summary = regenerate(&service, &store, &entries, &opts).await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.cache_hits, 1);
    }

    #[tokio::test]
    async fn test_dry_run_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let (service, launcher) = service(behavior(), dir.path()).await;
        let store = ResultStore::open_in_memory().await.unwrap();
        let entries = vec![entry("https://site.test/1", 1), entry("https://site.test/2", 1), entry("https://site.test/3", 1)];
        let opts = BatchOptions {
            dry_run: true,
            limit: Some(2),
            ..options(StylesheetSource::Literal("header{}".into()))
        };

        let summary = regenerate(&service, &store, &entries, &opts).await.unwrap();

        assert_eq!(summary, BatchSummary { processed: 2, skipped: 0, errors: 0, cache_hits: 0 });
        assert_eq!(launcher.launches(), 0);
        assert!(store.list_results(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_limit_selects_leading_entries_before_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let (service, launcher) = service(behavior(), dir.path()).await;
        let store = ResultStore::open_in_memory().await.unwrap();
        let entries = vec![entry("https://site.test/1", 1), entry("https://site.test/2", 1)];
        let opts = BatchOptions { concurrency: 1, ..options(StylesheetSource::Literal("header{}".into())) };

        regenerate(&service, &store, &entries[..1], &opts).await.unwrap();
        assert_eq!(launcher.launches(), 1);

        // The first entry is current, the second is outside the limit.
        let summary = regenerate(&service, &store, &entries, &BatchOptions { limit: Some(1), ..opts }).await.unwrap();
        assert_eq!(summary, BatchSummary { processed: 0, skipped: 1, errors: 0, cache_hits: 0 });
        assert!(store.get_result("https://site.test/2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _launcher) =
            service(FakeBehavior { nav_status: Some(500), ..behavior() }, dir.path()).await;
        let store = ResultStore::open_in_memory().await.unwrap();
        let entries = vec![entry("https://site.test/", 1), SitemapEntry { loc: "ftp://site.test/x".into(), lastmod: None }];

        let summary =
            regenerate(&service, &store, &entries, &options(StylesheetSource::Literal("header{}".into()))).await.unwrap();

        assert_eq!(summary, BatchSummary { processed: 0, skipped: 0, errors: 2, cache_hits: 0 });
    }
}
