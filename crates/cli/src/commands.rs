//! Subcommand implementations.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use critcss_client::{
    BatchOptions, ChromiumLauncher, CriticalCssService, LaunchOptions, StylesheetSource, Viewport, canonicalize,
    load_sitemap, regenerate,
};
use critcss_core::{AppConfig, CriticalCssRecord, ResultStore};

use crate::{CacheCommand, GenerateArgs, ResultsCommand, SitemapArgs, ViewportArgs};

async fn open_service(config: &AppConfig) -> Result<CriticalCssService> {
    let launcher = Arc::new(ChromiumLauncher::new(LaunchOptions::from(config)));
    CriticalCssService::from_config(config, launcher).await.context("failed to open stylesheet cache")
}

async fn open_store(config: &AppConfig) -> Result<ResultStore> {
    ResultStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open result store at {}", config.db_path.display()))
}

fn viewport(config: &AppConfig, args: &ViewportArgs) -> Viewport {
    Viewport::new(args.width.unwrap_or(config.viewport_width), args.height.unwrap_or(config.viewport_height))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn generate(config: &AppConfig, args: GenerateArgs) -> Result<()> {
    let source = if let Some(url) = args.source.css_url {
        StylesheetSource::Url(url)
    } else if let Some(path) = args.source.css_file {
        let css = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        StylesheetSource::Literal(css)
    } else {
        StylesheetSource::PageOwn
    };

    let service = open_service(config).await?;
    let mut request = service.request(&args.url, source);
    request.viewport = viewport(config, &args.viewport);
    request.force = args.force;
    if let Some(ms) = args.timeout_ms {
        request.timeout = Duration::from_millis(ms);
    }

    let outcome = service.generate(request).await;
    service.shutdown().await;
    let result = outcome?;

    if args.store {
        let store = open_store(config).await?;
        let record = CriticalCssRecord::new(
            &result.url,
            &result.critical_css,
            result.stats.original_bytes,
            result.stats.critical_bytes,
            None,
        );
        store.upsert_result(&record).await?;
    }

    eprintln!(
        "{}: {} -> {} bytes ({}% smaller), {}/{} rules kept, stylesheet {}",
        result.url,
        result.stats.original_bytes,
        result.stats.critical_bytes,
        result.stats.reduction_percent,
        result.stats.kept_rules,
        result.stats.total_rules,
        result.provenance.map(|p| p.as_str()).unwrap_or("supplied"),
    );
    println!("{}", result.critical_css);
    Ok(())
}

pub async fn sitemap(config: &AppConfig, args: SitemapArgs) -> Result<()> {
    let service = open_service(config).await?;
    let store = open_store(config).await?;

    if args.clear_cache {
        let report = service.invalidate("*").await?;
        eprintln!("cleared cache: {} memory, {} disk entries", report.memory_removed, report.disk_removed);
    }

    let entries = load_sitemap(&args.source, service.fetcher().http()).await?;
    let options = BatchOptions {
        source: args.css_url.map(StylesheetSource::Url).unwrap_or(StylesheetSource::PageOwn),
        viewport: viewport(config, &args.viewport),
        timeout: config.extraction_timeout(),
        force: args.force,
        dry_run: args.dry_run,
        limit: args.limit,
        concurrency: args.concurrency,
    };

    let outcome = regenerate(&service, &store, &entries, &options).await;
    service.shutdown().await;
    let summary = outcome?;

    println!("{summary}");
    if args.show_cache_stats {
        print_json(&service.cache_stats().await?)?;
    }
    Ok(())
}

pub async fn cache(config: &AppConfig, command: CacheCommand) -> Result<()> {
    let service = open_service(config).await?;
    match command {
        CacheCommand::Stats => print_json(&service.cache_stats().await?),
        CacheCommand::Clear => print_json(&service.invalidate("*").await?),
        CacheCommand::Bust { target } => print_json(&service.invalidate(&target).await?),
    }
}

pub async fn results(config: &AppConfig, command: ResultsCommand) -> Result<()> {
    let store = open_store(config).await?;
    match command {
        ResultsCommand::List { limit } => {
            for record in store.list_results(limit).await? {
                println!("{}\t{} bytes\t{}", record.url, record.critical_bytes, record.updated_at);
            }
            Ok(())
        }
        ResultsCommand::Get { url } => {
            let url = canonicalize(&url)?;
            let record = store
                .get_result(url.as_str())
                .await?
                .with_context(|| format!("no stored result for {url}"))?;
            println!("{}", record.css);
            Ok(())
        }
        ResultsCommand::Delete { url } => {
            let url = canonicalize(&url)?;
            let deleted = store.delete_result(url.as_str()).await?;
            println!("{}", if deleted { "deleted" } else { "not found" });
            Ok(())
        }
        ResultsCommand::Clear => {
            let removed = store.clear_results().await?;
            println!("removed {removed} results");
            Ok(())
        }
    }
}
