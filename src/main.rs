//! leadcrawl main entry point
//!
//! This is the command-line interface for running one public-records collector.

use anyhow::Context;
use clap::Parser;
use leadcrawl::cache::CacheStore;
use leadcrawl::config::{load_config_with_hash, validate, Config};
use leadcrawl::metrics::{print_report, read_sidecar, sidecar_path};
use leadcrawl::Collector;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// leadcrawl: a resumable, rate-limited crawl-and-cache engine
///
/// Crawls one public-records site breadth-first within its base domain,
/// caching every response, and falls back to cached or sample data when
/// live collection is not possible.
#[derive(Parser, Debug)]
#[command(name = "leadcrawl")]
#[command(version)]
#[command(about = "A resumable, rate-limited crawl-and-cache engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG", env = "LEADCRAWL_CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start a fresh crawl, discarding any checkpoint
    #[arg(long, env = "LEADCRAWL_FRESH")]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "sweep_cache"])]
    dry_run: bool,

    /// Show the metrics of the last run and exit
    #[arg(long, conflicts_with_all = ["dry_run", "sweep_cache"])]
    stats: bool,

    /// Remove expired and corrupt cache entries and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    sweep_cache: bool,

    /// Override the maximum number of BFS levels
    #[arg(long, env = "LEADCRAWL_MAX_DEPTH")]
    max_depth: Option<u32>,

    /// Override the maximum number of records
    #[arg(long, env = "LEADCRAWL_MAX_ITEMS")]
    max_items: Option<u64>,

    /// Override the per-run request quota
    #[arg(long, env = "LEADCRAWL_DAILY_QUOTA")]
    daily_quota: Option<u64>,
}

impl Cli {
    /// Applies command-line overrides and re-validates
    fn apply_overrides(&self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(max_depth) = self.max_depth {
            config.crawler.max_depth = max_depth;
        }
        if let Some(max_items) = self.max_items {
            config.crawler.max_items = max_items;
        }
        if let Some(quota) = self.daily_quota {
            config.rate_limit.daily_quota = Some(quota);
        }
        validate(config).context("invalid command-line override")?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    cli.apply_overrides(&mut config)?;

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config).await?;
    } else if cli.sweep_cache {
        handle_sweep_cache(&config).await?;
    } else {
        handle_collect(config, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("leadcrawl=info,warn"),
            1 => EnvFilter::new("leadcrawl=debug,info"),
            2 => EnvFilter::new("leadcrawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // Logs go to stderr so stdout carries only records
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the resolved configuration
fn handle_dry_run(config: &Config) {
    println!("=== leadcrawl Dry Run: {} ===\n", config.collector.name);

    println!("Seeds ({}):", config.collector.seeds.len());
    for seed in &config.collector.seeds {
        println!("  * {}", seed);
    }

    println!("\nCrawler:");
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Max items: {}", config.crawler.max_items);
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);
    match config.crawler.deadline_secs {
        Some(secs) => println!("  Deadline: {}s", secs),
        None => println!("  Deadline: none"),
    }

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_retries);
    println!("  Backoff factor: {}s", config.retry.backoff_factor);
    println!("  Jitter: {}", config.retry.jitter);

    println!("\nRate limit:");
    println!(
        "  Delay: {}-{}ms",
        config.rate_limit.min_delay_ms, config.rate_limit.max_delay_ms
    );
    match config.rate_limit.daily_quota {
        Some(quota) => println!("  Daily quota: {}", quota),
        None => println!("  Daily quota: unlimited"),
    }

    println!("\nCache:");
    println!("  Enabled: {}", config.cache.enabled);
    println!("  Directory: {}", config.cache.dir.join(&config.collector.name).display());
    println!("  TTL: {}s", config.cache.ttl_secs);

    println!("\nFallback:");
    println!(
        "  Error ratio threshold: {:.2} (after {} attempts)",
        config.fallback.error_ratio_threshold, config.fallback.min_attempts
    );

    println!("\nState directory: {}", config.output.state_dir.display());
    println!("User agent: {}", config.user_agent.header_value());

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: prints the metrics sidecar of the last run
async fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let path = sidecar_path(&config.output.state_dir, &config.collector.name);
    let report = read_sidecar(&path)
        .await
        .with_context(|| format!("no readable metrics at {}", path.display()))?;
    print_report(&report);
    Ok(())
}

/// Handles the --sweep-cache mode
async fn handle_sweep_cache(config: &Config) -> anyhow::Result<()> {
    let cache = CacheStore::open(&config.cache.dir, &config.collector.name)
        .with_context(|| format!("cannot open cache under {}", config.cache.dir.display()))?;
    let removed = cache.sweep().await?;
    println!("Removed {} expired cache entries from {}", removed, cache.dir().display());
    Ok(())
}

/// Handles the main collection run
async fn handle_collect(config: Config, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh collection (discarding any checkpoint)");
    } else {
        tracing::info!("Starting collection (will resume from a checkpoint if present)");
    }

    let result = Collector::new(config)?.fresh(fresh).collect().await?;
    let meta = &result.metadata;

    eprintln!(
        "{}: {} record(s), source {}, status {}{}",
        meta.collector,
        result.records.len(),
        meta.source,
        meta.status,
        if meta.partial { " (partial)" } else { "" }
    );
    if let Some(error) = &meta.error {
        eprintln!("  fallback reason: {}", error);
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for record in &result.records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    Ok(())
}
