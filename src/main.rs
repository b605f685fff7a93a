//! Link-Scraper main entry point
//!
//! This is the command-line interface for the Link-Scraper job pipeline.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use link_scraper::config::{load_config_with_env, Config};
use link_scraper::intake::{submit_url, Submission};
use link_scraper::queue::{JobOptions, JobQueue, MemoryQueue, RedisQueue};
use link_scraper::scrape::Scraper;
use link_scraper::storage::{
    open_storage, Pagination, SqliteStorage, Storage, DEFAULT_LINKS_LIMIT, DEFAULT_PAGES_LIMIT,
};
use link_scraper::worker::{JobEvent, JobProcessor, WorkerPool};
use link_scraper::UrlSafetyFilter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// Link-Scraper: a background link harvester
///
/// Submitted URLs become queued scrape jobs. Workers fetch each page,
/// extract and deduplicate its links, and store them for later browsing.
#[derive(Parser, Debug)]
#[command(name = "link-scraper")]
#[command(version = "1.0.0")]
#[command(about = "A background link harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (environment variables override it)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape URLs in this process and print the results
    Run {
        #[arg(value_name = "URL", required = true)]
        urls: Vec<String>,

        /// Keep results in memory instead of the configured database
        #[arg(long)]
        in_memory: bool,
    },

    /// Process jobs from the Redis queue until interrupted
    Worker,

    /// Create pages and queue them on Redis for a worker
    Submit {
        #[arg(value_name = "URL", required = true)]
        urls: Vec<String>,
    },

    /// Show a page and one page of its links
    Show {
        page_id: i64,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = DEFAULT_LINKS_LIMIT)]
        limit: u32,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List submitted pages, newest first
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = DEFAULT_PAGES_LIMIT)]
        limit: u32,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config =
        load_config_with_env(cli.config.as_deref()).context("Failed to load configuration")?;
    tracing::debug!(
        "Configuration loaded (mode: {}, concurrency: {})",
        config.mode,
        config.queue.concurrency
    );

    match cli.command {
        Command::Run { urls, in_memory } => handle_run(&config, &urls, in_memory).await,
        Command::Worker => handle_worker(&config).await,
        Command::Submit { urls } => handle_submit(&config, &urls).await,
        Command::Show {
            page_id,
            page,
            limit,
            json,
        } => handle_show(&config, page_id, page, limit, json),
        Command::List { page, limit, json } => handle_list(&config, page, limit, json),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` takes precedence over the flags when it is set.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            // Only show errors
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("link_scraper=info,warn"),
                1 => EnvFilter::new("link_scraper=debug,info"),
                2 => EnvFilter::new("link_scraper=trace,debug"),
                _ => EnvFilter::new("trace"),
            }
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_database(config: &Config) -> anyhow::Result<Arc<SqliteStorage>> {
    let path = Path::new(&config.storage.database_path);
    let storage = open_storage(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(storage))
}

fn build_pool<Q: JobQueue + 'static>(
    config: &Config,
    storage: Arc<SqliteStorage>,
    queue: Arc<Q>,
) -> anyhow::Result<WorkerPool<SqliteStorage, Q>> {
    let filter = UrlSafetyFilter::new(config.mode);
    let scraper = Scraper::new(&config.fetch, filter).context("Failed to build HTTP client")?;
    let processor = JobProcessor::new(storage, scraper);
    Ok(WorkerPool::new(processor, queue, config.queue.concurrency))
}

/// Resolves on Ctrl-C; never resolves if the signal cannot be installed
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!("Unable to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Logs job events until the pool drops its sender
fn spawn_event_logger(mut events: broadcast::Receiver<JobEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(JobEvent::Completed {
                    job_id,
                    page_id,
                    links,
                }) => tracing::info!(
                    "Job {} completed: page {} has {} links",
                    job_id,
                    page_id,
                    links
                ),
                Ok(JobEvent::Failed {
                    job_id,
                    page_id,
                    error,
                    attempt,
                    will_retry,
                }) => tracing::info!(
                    "Job {} failed on attempt {} for page {}{}: {}",
                    job_id,
                    attempt,
                    page_id,
                    if will_retry { " (will retry)" } else { "" },
                    error
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event logger skipped {} events", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn submit_all<Q: JobQueue>(
    config: &Config,
    storage: &SqliteStorage,
    queue: &Q,
    urls: &[String],
) -> Vec<Submission> {
    let filter = UrlSafetyFilter::new(config.mode);
    let options = JobOptions::from_config(&config.queue);
    let mut submitted = Vec::new();

    for url in urls {
        match submit_url(storage, queue, filter, url, options).await {
            Ok(submission) => submitted.push(submission),
            Err(e) => eprintln!("✗ {}: {}", url, e),
        }
    }
    submitted
}

/// Handles `run`: scrape the given URLs with an in-process queue
async fn handle_run(config: &Config, urls: &[String], in_memory: bool) -> anyhow::Result<()> {
    let storage = if in_memory {
        Arc::new(SqliteStorage::open_in_memory()?)
    } else {
        open_database(config)?
    };
    let queue = Arc::new(MemoryQueue::new());

    let submitted = submit_all(config, &storage, queue.as_ref(), urls).await;
    if submitted.is_empty() {
        bail!("No valid URLs to scrape");
    }
    queue.close().await;

    let pool = build_pool(config, Arc::clone(&storage), queue)?;
    spawn_event_logger(pool.subscribe());
    let stats = pool.run_until(shutdown_signal()).await;

    println!("=== Link-Scraper Results ===\n");
    for submission in &submitted {
        let Some(page) = storage.find_page(submission.page.id)? else {
            continue;
        };
        println!("[{}] {} ({})", page.id, page.url, page.status);
        if let Some(title) = &page.title {
            println!("  Title: {}", title);
        }
        if let Some(final_url) = &page.final_url {
            println!("  Final URL: {}", final_url);
        }
        println!("  Links: {}", page.link_count);
        if let Some(error) = &page.error {
            println!("  Error: {}", error);
        }
    }
    println!(
        "\n{} completed, {} failed, {} retried attempts",
        stats.completed, stats.failed, stats.retried
    );

    Ok(())
}

/// Handles `worker`: run the pool against Redis
async fn handle_worker(config: &Config) -> anyhow::Result<()> {
    let storage = open_database(config)?;
    let queue = Arc::new(RedisQueue::new(&config.queue.redis_url).context("Invalid Redis URL")?);

    tracing::info!(
        "Worker started with concurrency {} (queue: {})",
        config.queue.concurrency,
        config.queue.redis_url
    );

    let pool = build_pool(config, storage, queue)?;
    spawn_event_logger(pool.subscribe());
    pool.run_until(shutdown_signal()).await;

    Ok(())
}

/// Handles `submit`: queue URLs on Redis
async fn handle_submit(config: &Config, urls: &[String]) -> anyhow::Result<()> {
    let storage = open_database(config)?;
    let queue = RedisQueue::new(&config.queue.redis_url).context("Invalid Redis URL")?;

    let submitted = submit_all(config, &storage, &queue, urls).await;
    for submission in &submitted {
        println!(
            "✓ Queued page {} (job {}): {}",
            submission.page.id, submission.job_id, submission.page.url
        );
    }

    if submitted.len() < urls.len() {
        bail!("{} of {} URLs were rejected", urls.len() - submitted.len(), urls.len());
    }
    Ok(())
}

/// Handles `show`: one page plus a page of its links
fn handle_show(
    config: &Config,
    page_id: i64,
    page: u32,
    limit: u32,
    json: bool,
) -> anyhow::Result<()> {
    let storage = open_database(config)?;
    let pagination = Pagination::new(page, limit)?;

    let Some(record) = storage.find_page(page_id)? else {
        bail!("Page {} not found", page_id);
    };
    let links = storage.find_links(page_id, pagination)?;

    if json {
        let body = serde_json::json!({
            "page": record,
            "links": links.items,
            "pagination": {
                "total": links.total,
                "page": links.page,
                "limit": links.limit,
                "pages": links.pages,
            },
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("Page {}: {}", record.id, record.url);
    println!("  Status: {}", record.status);
    if let Some(title) = &record.title {
        println!("  Title: {}", title);
    }
    if let Some(final_url) = &record.final_url {
        println!("  Final URL: {}", final_url);
    }
    if let Some(error) = &record.error {
        println!("  Error: {}", error);
    }
    println!(
        "\nLinks ({} total, page {}/{}):",
        links.total,
        links.page,
        links.pages.max(1)
    );
    for link in &links.items {
        match &link.name {
            Some(name) => println!("  - {} ({})", name, link.href),
            None => println!("  - {}", link.href),
        }
    }

    Ok(())
}

/// Handles `list`: submitted pages, newest first
fn handle_list(config: &Config, page: u32, limit: u32, json: bool) -> anyhow::Result<()> {
    let storage = open_database(config)?;
    let pages = storage.list_pages(Pagination::new(page, limit)?)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pages)?);
        return Ok(());
    }

    println!(
        "Pages ({} total, page {}/{}):",
        pages.total,
        pages.page,
        pages.pages.max(1)
    );
    for record in &pages.items {
        println!(
            "  [{}] {:<10} {:>5} links  {}",
            record.id,
            record.status.to_string(),
            record.link_count,
            record.url
        );
    }

    Ok(())
}
