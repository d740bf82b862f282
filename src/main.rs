//! Catalog Harvester main entry point
//!
//! This is the command-line interface for the catalog harvester service.

use anyhow::Context;
use catalog_harvester::api;
use catalog_harvester::config::{load_config_with_hash, Config, CrawlerConfig};
use catalog_harvester::output::print_job_report;
use catalog_harvester::JobScheduler;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Catalog Harvester: a queue-driven crawler for paginated catalog sites
///
/// Runs crawl jobs submitted over HTTP under concurrency, rate and retry
/// limits, harvesting product records from listing and product pages.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvester")]
#[command(version)]
#[command(about = "A queue-driven crawler for paginated catalog sites", long_about = None)]
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

    /// Validate config and show the effective settings without starting
    #[arg(long, conflicts_with = "submit")]
    dry_run: bool,

    /// Run a single crawl job from a JSON file, print its outcome and exit
    #[arg(long, value_name = "JOB.json", conflicts_with = "dry_run")]
    submit: Option<PathBuf>,
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

    let scheduler = Arc::new(JobScheduler::from_config(&config).context("failed to build scheduler")?);
    scheduler.start().context("failed to start scheduler")?;

    let outcome = match &cli.submit {
        Some(job_path) => handle_submit(&scheduler, job_path).await,
        None => handle_serve(Arc::clone(&scheduler), &config).await,
    };

    scheduler.shutdown().await;
    outcome
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_harvester=info,warn"),
            1 => EnvFilter::new("catalog_harvester=debug,info"),
            2 => EnvFilter::new("catalog_harvester=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective settings
fn handle_dry_run(config: &Config) {
    println!("=== Catalog Harvester Dry Run ===\n");

    let scheduler = &config.scheduler;
    println!("Scheduler:");
    println!("  Max concurrent jobs: {}", scheduler.max_concurrent_jobs);
    println!(
        "  Admission: {} starts per {}ms",
        scheduler.admission_limit(),
        scheduler.admission_window_ms
    );
    println!("  Max attempts: {}", scheduler.max_attempts);
    println!(
        "  Backoff: {}ms base, {}ms jitter",
        scheduler.backoff_base_ms, scheduler.backoff_jitter_ms
    );
    println!("  Job timeout: {}s", scheduler.job_timeout_secs);
    println!(
        "  Retention: {} completed, {} failed",
        scheduler.keep_completed, scheduler.keep_failed
    );

    let session = &config.session;
    println!("\nSession:");
    println!("  Page concurrency: {}", session.page_concurrency);
    println!(
        "  Fan-out: {} cards, {} product links",
        session.card_fanout, session.product_fanout
    );
    println!("  Selector timeout: {}ms", session.selector_timeout_ms);
    println!("  Require EAN: {}", session.require_ean);

    println!("\nDriver:");
    println!("  User agent: {}", config.driver.user_agent);
    println!("  Request timeout: {}s", config.driver.request_timeout_secs);
    for host_override in &config.driver.host_overrides {
        println!("  {} -> {}", host_override.host, host_override.address);
    }

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Blobs: {}", config.storage.blob_dir);

    println!("\nServer:");
    println!("  Bind: {}", config.server.bind);

    println!("\n✓ Configuration is valid");
}

/// Handles the --submit mode: runs one job and reports its outcome
async fn handle_submit(scheduler: &JobScheduler, job_path: &Path) -> anyhow::Result<()> {
    let body = std::fs::read_to_string(job_path)
        .with_context(|| format!("failed to read {}", job_path.display()))?;
    let job_config: CrawlerConfig =
        serde_json::from_str(&body).context("job file is not a crawl configuration")?;

    let submitted = scheduler.submit(job_config)?;
    tracing::info!("Submitted job {}", submitted.id);

    let view = loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(500)) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted; job {} will resume on next start", submitted.id);
                return Ok(());
            }
        }

        let view = scheduler.status(submitted.id)?;
        if view.status.is_terminal() {
            break view;
        }
        tracing::debug!(
            "Job {}: {} pages, {} products",
            view.id,
            view.progress.pages_visited,
            view.progress.products_extracted
        );
    };

    print_job_report(&view);
    println!("{}", serde_json::to_string_pretty(&view)?);

    Ok(())
}

/// Handles the default mode: serves the HTTP API until Ctrl-C
async fn handle_serve(scheduler: Arc<JobScheduler>, config: &Config) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!("Listening on {}", config.server.bind);

    axum::serve(listener, api::router(scheduler))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
            tracing::info!("Received Ctrl-C, shutting down");
        })
        .await
        .context("server error")?;

    Ok(())
}
