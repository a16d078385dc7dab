//! Sumi-Engine main entry point
//!
//! This is the command-line interface for the Sumi-Engine crawler. It crawls
//! the registrable domains of the configured seeds and logs every page.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sumi_engine::config::{load_config_with_hash, Config};
use sumi_engine::crawler::{CrawlEngine, Crawler, Document, Fetcher, HttpFetcher};
use sumi_engine::output::print_statistics;
use sumi_engine::storage::{FrontierQueue, HistoryStore, SqliteFrontierQueue, SqliteHistoryStore};
use sumi_engine::CanonicalUrl;
use tracing_subscriber::EnvFilter;

/// Sumi-Engine: a polite web crawler
///
/// Sumi-Engine crawls the sites named by its seed URLs while respecting
/// robots.txt, per-host politeness delays, and depth and page budgets.
#[derive(Parser, Debug)]
#[command(name = "sumi-engine")]
#[command(version)]
#[command(about = "A polite web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Forget crawl history and queued work from previous runs
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,
}

/// Visits pages on the seeds' registrable domains and logs them
struct SiteCrawler {
    domains: HashSet<String>,
}

impl SiteCrawler {
    fn for_seeds(seeds: &[String]) -> Self {
        let domains = seeds
            .iter()
            .filter_map(|seed| CanonicalUrl::parse(seed, None).ok())
            .map(|url| url.domain().to_string())
            .collect();
        Self { domains }
    }
}

impl Crawler for SiteCrawler {
    fn should_visit(&self, url: &CanonicalUrl) -> bool {
        self.domains.contains(url.domain())
    }

    fn visit(&self, url: &CanonicalUrl, doc: &Document) {
        tracing::info!(
            "[{}] {} {}",
            doc.status_code,
            url,
            doc.title.as_deref().unwrap_or("")
        );
    }

    fn on_content_fetch_error(&self, url: &CanonicalUrl, reason: &str) {
        tracing::warn!("Could not fetch {}: {}", url, reason);
    }

    fn on_empty_queue_timeout(&self) {
        tracing::info!("Nothing left to crawl");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config, cli.fresh).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_engine=info,warn"),
            1 => EnvFilter::new("sumi_engine=debug,info"),
            2 => EnvFilter::new("sumi_engine=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    let crawler = &config.crawler;
    println!("=== Sumi-Engine Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", crawler.threads);
    println!("  Frontier shards: {}", crawler.shard_count());
    println!("  Max depth: {}", crawler.max_depth);
    println!("  Total pages: {}", crawler.total_pages);
    println!("  Politeness delay: {}ms", crawler.politeness_delay);
    println!("  Empty queue wait: {}ms", crawler.empty_queue_wait_time);
    println!("  Respect robots.txt: {}", crawler.respect_robots_txt);
    println!("  Follow redirects: {}", crawler.follow_redirects);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nStorage:");
    match &config.storage.database_path {
        Some(path) => println!("  SQLite: {}", path),
        None => println!("  In-memory"),
    }

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Opens the SQLite stores, optionally discarding earlier state
fn open_sqlite_stores(
    path: &Path,
    shards: usize,
    fresh: bool,
) -> anyhow::Result<(Arc<dyn HistoryStore>, Vec<Arc<dyn FrontierQueue>>)> {
    let history = SqliteHistoryStore::open(path)
        .with_context(|| format!("failed to open history in {}", path.display()))?;
    let frontier = (0..shards)
        .map(|shard| {
            SqliteFrontierQueue::open(path, shard)
                .map(|queue| Arc::new(queue) as Arc<dyn FrontierQueue>)
                .with_context(|| format!("failed to open frontier shard {}", shard))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if fresh {
        let forgotten = history.clear_history(Utc::now())?;
        let mut dropped = 0;
        for queue in &frontier {
            dropped += queue.pop(queue.len()?)?.len();
        }
        tracing::info!(
            "Starting fresh: forgot {} URLs and {} queued entries",
            forgotten,
            dropped
        );
    } else {
        let queued: usize = frontier
            .iter()
            .map(|queue| queue.len())
            .sum::<Result<usize, _>>()?;
        tracing::info!("Resuming with {} queued entries", queued);
    }

    Ok((Arc::new(history), frontier))
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, fresh: bool) -> anyhow::Result<()> {
    tracing::info!("Total seed URLs: {}", config.seeds.len());

    let fetcher: Arc<dyn Fetcher> = Arc::new(
        HttpFetcher::new(&config.user_agent, config.crawler.max_href_length)
            .context("failed to build HTTP client")?,
    );

    let mut builder = CrawlEngine::builder(
        SiteCrawler::for_seeds(&config.seeds),
        config.crawler.clone(),
    )
    .fetcher(fetcher)
    .user_agent(config.user_agent.header_value())
    .robots_config(config.robots.clone());

    if let Some(path) = &config.storage.database_path {
        let (history, frontier) =
            open_sqlite_stores(Path::new(path), config.crawler.shard_count(), fresh)?;
        builder = builder.history(history).frontier(frontier);
    }

    let engine = builder.build()?;
    let crawl = engine.spawn(&config.seeds);

    // First Ctrl-C finishes in-flight pages, the second abandons them
    let controller = engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            controller.stop();
            if tokio::signal::ctrl_c().await.is_ok() {
                controller.shutdown();
            }
        }
    });

    let stats = crawl.await.context("crawl task failed")??;
    print_statistics(&stats);
    Ok(())
}
