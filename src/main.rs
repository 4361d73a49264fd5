//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest content collector.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use sumi_harvest::config::{load_config_with_hash, Config};
use sumi_harvest::crawler::{
    Coordinator, CrawlEvent, CrawlSettings, EventSink, RunSummary, StopSignal,
};
use sumi_harvest::filter::{filter_comment_file, CommentFilter, FilterMode};
use sumi_harvest::platform::PlatformApi;
use sumi_harvest::storage::SinkSession;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a paginated social content collector
///
/// Collects posts, comments and creator profiles by keyword, by item or by
/// creator, signing every request through a logged-in browser page.
#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(version = "1.0.0")]
#[command(about = "A paginated social content collector", long_about = None)]
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

    /// Validate config and show what would be collected without collecting
    #[arg(long)]
    dry_run: bool,

    /// Filter an existing comment export instead of collecting
    #[arg(long, value_name = "FILE")]
    filter_comments: Option<PathBuf>,

    /// Filter mode; overrides `[filter] mode` (keyword, question, high-like, any)
    #[arg(long, value_name = "MODE", value_parser = parse_filter_mode)]
    filter_mode: Option<FilterMode>,
}

fn parse_filter_mode(raw: &str) -> Result<FilterMode, String> {
    match raw {
        "keyword" => Ok(FilterMode::Keyword),
        "question" => Ok(FilterMode::Question),
        "high-like" => Ok(FilterMode::HighLike),
        "any" => Ok(FilterMode::Any),
        other => Err(format!("unknown filter mode: {}", other)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let filter_mode = cli.filter_mode.unwrap_or(config.filter.mode);
    if let Some(path) = &cli.filter_comments {
        return handle_filter(&config, path, filter_mode);
    }

    handle_crawl(config, filter_mode).await
}

/// Filters one comment export and reports where the result went
fn handle_filter(config: &Config, path: &std::path::Path, mode: FilterMode) -> anyhow::Result<()> {
    let filter = CommentFilter::from_config(&config.filter);
    let report = filter_comment_file(path, &filter, mode)
        .with_context(|| format!("failed to filter {}", path.display()))?;
    println!(
        "Kept {} of {} comment(s) ({} mode): {}",
        report.kept,
        report.total,
        mode,
        report.output.display()
    );
    Ok(())
}

/// Runs the configured filter over the comment files of a finished run
fn filter_run_comments(config: &Config, summary: &RunSummary, mode: FilterMode) -> anyhow::Result<()> {
    let comment_files = summary
        .files
        .iter()
        .filter(|p| p.to_string_lossy().contains("_comments_"));
    for path in comment_files {
        handle_filter(config, path, mode)?;
    }
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
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

/// Handles the --dry-run mode: shows what would be collected
fn handle_dry_run(config: &Config) {
    let target = config.collection_target();

    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Collection:");
    println!("  Platform: {}", config.crawler.platform);
    println!("  Mode: {}", target.mode);
    println!("  Max items: {}", target.max_items);
    println!(
        "  Comments: {} (max {} per item, replies {})",
        if target.enable_comments { "on" } else { "off" },
        target.max_comments_per_item,
        if target.enable_sub_comments { "on" } else { "off" }
    );
    println!("  Interval: {}s", config.crawler.crawl_interval_secs);
    println!("  Concurrency: {}", config.crawler.max_concurrency);

    println!("\nOutput:");
    println!("  Format: {}", config.output.format.as_str());
    if config.output.format.is_file_based() {
        println!("  Directory: {}", config.output.directory.display());
    } else {
        println!("  Database: {}", config.output.database_path.display());
    }

    if config.filter.enabled {
        println!("  Comment filter: {} (likes > {})", config.filter.mode, config.filter.min_likes);
    }

    println!("\nSeeds ({}):", target.seeds.len());
    for seed in &target.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main collection run
async fn handle_crawl(config: Config, filter_mode: FilterMode) -> anyhow::Result<()> {
    let (_browser, api) = connect(&config).await?;

    let sink = Arc::new(SinkSession::new(&config.output, config.crawler.platform));
    let (events, rx) = EventSink::channel();
    let stop = StopSignal::new();

    let ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing the current page");
            ctrl_c.stop();
        }
    });
    let printer = tokio::spawn(print_events(rx));

    let coordinator = Coordinator::new(api, sink, CrawlSettings::from_config(&config))
        .with_events(events)
        .with_stop(stop);
    let result = coordinator.run(&config.collection_target()).await;
    drop(coordinator);
    let _ = printer.await;

    match result {
        Ok(summary) => {
            tracing::info!("Collection completed successfully");
            for file in &summary.files {
                println!("  wrote {}", file.display());
            }
            if config.filter.enabled {
                filter_run_comments(&config, &summary, filter_mode)?;
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Collection failed: {}", e);
            Err(e.into())
        }
    }
}

async fn print_events(mut rx: UnboundedReceiver<CrawlEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            CrawlEvent::Progress {
                current,
                total,
                message,
            } => println!("[{}/{}] {}", current, total, message),
            CrawlEvent::CommentProgress {
                item_index,
                total_items,
                comments_so_far,
                max_comments,
            } => tracing::debug!(
                "Item {}/{}: {}/{} comments",
                item_index,
                total_items,
                comments_so_far,
                max_comments
            ),
            CrawlEvent::SigningUnavailable { message } => {
                eprintln!("Signing unavailable ({}); reload the browser page and log in again", message)
            }
            CrawlEvent::Finished(summary) => println!(
                "Done: {} item(s), {} comment(s), {} creator(s), {} skipped, {} blocked{}",
                summary.items_stored,
                summary.comments_stored,
                summary.creators_stored,
                summary.seeds_skipped,
                summary.blocked,
                if summary.stopped { " (stopped)" } else { "" }
            ),
            _ => {}
        }
    }
}

/// Opens the browser, builds the signer and the platform adapter
#[cfg(feature = "browser")]
async fn connect(
    config: &Config,
) -> anyhow::Result<(sumi_harvest::client::browser::BrowserSession, Arc<dyn PlatformApi>)> {
    use sumi_harvest::client::browser::BrowserSession;
    use sumi_harvest::client::{PageSigner, SigningClient};
    use sumi_harvest::platform::{douyin, xhs, DouyinApi, XhsApi};
    use sumi_harvest::Platform;

    let (start_url, api_host, profile) = match config.crawler.platform {
        Platform::Xhs => (xhs::WEB_HOST, xhs::API_HOST, xhs::SIGNER_PROFILE),
        Platform::Douyin => (douyin::API_HOST, douyin::API_HOST, douyin::SIGNER_PROFILE),
    };

    let browser = BrowserSession::launch(&config.browser, start_url).await?;
    let signer = Arc::new(PageSigner::new(
        browser.signing_page(),
        profile,
        config.client.sign_retries,
        config.client.sign_retry_delay(),
    ));

    let dialect: Arc<dyn sumi_harvest::client::ApiDialect> = match config.crawler.platform {
        Platform::Xhs => Arc::new(xhs::XhsDialect),
        Platform::Douyin => Arc::new(douyin::DouyinDialect),
    };
    let client = Arc::new(SigningClient::new(api_host, &config.client, signer, dialect)?);

    client.refresh_session(&browser.cookies().await?).await;
    if config.client.user_agent.is_none() {
        if let Some(user_agent) = browser.user_agent().await {
            client.set_user_agent(user_agent).await;
        }
    }

    let api: Arc<dyn PlatformApi> = match config.crawler.platform {
        Platform::Xhs => Arc::new(XhsApi::new(client)),
        Platform::Douyin => Arc::new(DouyinApi::new(client)),
    };
    Ok((browser, api))
}

#[cfg(not(feature = "browser"))]
async fn connect(_config: &Config) -> anyhow::Result<((), Arc<dyn PlatformApi>)> {
    anyhow::bail!("this binary was built without browser support; rebuild with `--features browser`")
}
