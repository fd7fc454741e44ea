//! critcss command-line interface.
//!
//! One-off extraction, sitemap-driven batch regeneration, and maintenance of
//! the stylesheet cache and result store. Results go to stdout; logs go to
//! stderr.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "critcss")]
#[command(version)]
#[command(about = "Extract above-the-fold critical CSS with a two-tier stylesheet cache")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate critical CSS for one page and print it
    Generate(GenerateArgs),

    /// Regenerate stored results for every stale page of a sitemap
    Sitemap(SitemapArgs),

    /// Inspect or clear the stylesheet cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Inspect or clear stored critical CSS results
    #[command(subcommand)]
    Results(ResultsCommand),
}

#[derive(Args, Debug)]
#[group(id = "stylesheet", required = true, multiple = false)]
struct SourceArgs {
    /// Stylesheet URL, resolved through the cache
    #[arg(long)]
    css_url: Option<String>,

    /// Local stylesheet file
    #[arg(long)]
    css_file: Option<PathBuf>,

    /// Use the page's own styles and linked stylesheets
    #[arg(long)]
    page_css: bool,
}

#[derive(Args, Debug)]
struct ViewportArgs {
    /// Viewport width in CSS pixels
    #[arg(long)]
    width: Option<u32>,

    /// Viewport height in CSS pixels
    #[arg(long)]
    height: Option<u32>,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Page URL
    url: String,

    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    viewport: ViewportArgs,

    /// Overall time bound in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Bypass the stylesheet cache lookup
    #[arg(long)]
    force: bool,

    /// Persist the result in the result store
    #[arg(long)]
    store: bool,
}

#[derive(Args, Debug)]
struct SitemapArgs {
    /// Sitemap URL or local file
    source: String,

    /// Stylesheet URL applied to every page (default: each page's own styles)
    #[arg(long)]
    css_url: Option<String>,

    /// Regenerate even when stored results are current
    #[arg(long)]
    force: bool,

    /// Only report which pages would be regenerated
    #[arg(long)]
    dry_run: bool,

    /// Only consider the first N sitemap entries
    #[arg(long)]
    limit: Option<usize>,

    #[command(flatten)]
    viewport: ViewportArgs,

    /// Pages processed concurrently
    #[arg(long, default_value_t = 2)]
    concurrency: usize,

    /// Clear the stylesheet cache before starting
    #[arg(long)]
    clear_cache: bool,

    /// Print cache statistics when finished
    #[arg(long)]
    show_cache_stats: bool,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Print cache statistics as JSON
    Stats,
    /// Remove every cached stylesheet
    Clear,
    /// Remove one stylesheet by URL or cache key
    Bust { target: String },
}

#[derive(Subcommand, Debug)]
enum ResultsCommand {
    /// List stored results, newest first
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print the stored critical CSS for a page
    Get { url: String },
    /// Delete the stored result for a page
    Delete { url: String },
    /// Delete every stored result
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = critcss_core::AppConfig::load()?;

    match cli.command {
        Command::Generate(args) => commands::generate(&config, args).await,
        Command::Sitemap(args) => commands::sitemap(&config, args).await,
        Command::Cache(cmd) => commands::cache(&config, cmd).await,
        Command::Results(cmd) => commands::results(&config, cmd).await,
    }
}
