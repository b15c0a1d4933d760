//! Asset-Mirror main entry point
//!
//! This is the command-line interface for the Asset-Mirror game mirroring tool.

use asset_mirror::config::{load_config_with_hash, validate, Config};
use asset_mirror::crawler::{load_links, mirror_all, parse_entry_url, Coordinator};
use asset_mirror::output::{print_batch_summary, print_report};
use asset_mirror::url::mirror_directory;
use clap::Parser;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Asset-Mirror: an incremental same-origin asset mirror
///
/// Asset-Mirror downloads browser games (or any page) together with the
/// stylesheets, scripts, images, media and manifest assets they reference on
/// the same origin. Mirrors are revalidated with entity tags, so running it
/// again only transfers what changed.
#[derive(Parser, Debug)]
#[command(name = "asset-mirror")]
#[command(version)]
#[command(about = "An incremental same-origin asset mirror", long_about = None)]
struct Cli {
    /// Entry URLs to mirror
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// Path to TOML configuration file (built-in defaults when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Links file with one entry URL per line
    #[arg(short, long, value_name = "FILE")]
    links: Option<PathBuf>,

    /// Destination root, overriding the configuration
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Worker pool size, overriding the configuration
    #[arg(short = 'j', long, value_name = "N")]
    concurrency: Option<usize>,

    /// Write a markdown catalog draft from the manifest after each mirror
    #[arg(long)]
    markdown: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate the configuration and show where each entry would be mirrored
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (mut config, config_hash) = match &cli.config {
        Some(path) => {
            let (config, hash) = load_config_with_hash(path)?;
            (config, Some(hash))
        }
        None => (Config::default(), None),
    };

    // Command-line overrides
    if let Some(root) = &cli.output {
        config.output.destination_root = root.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        config.crawler.concurrency = concurrency;
    }
    if let Some(log_file) = &cli.log_file {
        config.output.log_file = Some(log_file.clone());
    }
    validate(&config)?;

    setup_logging(cli.verbose, cli.quiet, config.output.log_file.as_deref())?;

    match (&cli.config, &config_hash) {
        (Some(path), Some(hash)) => {
            tracing::info!("Configuration loaded from {} (hash: {})", path.display(), hash)
        }
        _ => tracing::info!("Using built-in configuration defaults"),
    }

    let urls = collect_entry_urls(&cli)?;
    if urls.is_empty() {
        return Err("no entry URLs given; pass URLs or --links <FILE>".into());
    }

    if cli.dry_run {
        handle_dry_run(&config, &urls)?;
    } else {
        handle_mirror(config, &urls, cli.markdown).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool, log_file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("asset_mirror=info,warn"),
            1 => EnvFilter::new("asset_mirror=debug,info"),
            2 => EnvFilter::new("asset_mirror=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    match log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            subscriber
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => subscriber.with_writer(std::io::stderr).init(),
    }

    Ok(())
}

/// Opens `path` for appending, creating missing parent directories
fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Entry URLs from the command line followed by those of the links file
fn collect_entry_urls(cli: &Cli) -> Result<Vec<Url>, Box<dyn std::error::Error>> {
    let mut urls = Vec::new();

    for raw in &cli.urls {
        urls.push(parse_entry_url(raw)?);
    }

    if let Some(path) = &cli.links {
        let from_file = load_links(path)?;
        tracing::info!("Loaded {} URLs from {}", from_file.len(), path.display());
        for url in from_file {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }

    Ok(urls)
}

/// Handles the --dry-run mode: shows the configuration and mirror layout
fn handle_dry_run(config: &Config, urls: &[Url]) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Asset-Mirror Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.concurrency);
    println!("  Request timeout: {}s", config.crawler.request_timeout);
    println!("  Politeness delay: {}ms", config.crawler.politeness_delay);
    println!(
        "  Retries: {} (backoff base {}ms)",
        config.retry.max_retries, config.retry.backoff_base
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.value);

    println!("\nOutput:");
    println!("  Destination root: {}", config.output.destination_root.display());
    println!("  Metadata file: {}", config.output.metadata_file);
    println!("  Manifest: {}", config.manifest.file_name);

    println!("\nEntry URLs ({}):", urls.len());
    for url in urls {
        let destination = mirror_directory(&config.output.destination_root, url)?;
        println!("  - {}", url);
        println!("    -> {}", destination.display());
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the main mirror operation
async fn handle_mirror(config: Config, urls: &[Url], markdown: bool) -> Result<(), Box<dyn std::error::Error>> {
    let root = config.output.destination_root.clone();
    tracing::info!(
        "Mirroring {} entry URL(s) into {} with {} workers",
        urls.len(),
        root.display(),
        config.crawler.concurrency
    );

    let coordinator = Coordinator::new(config)?;
    let summary = mirror_all(&coordinator, urls, &root, markdown).await;

    for report in &summary.reports {
        print_report(report);
        println!();
    }

    if summary.reports.len() > 1 {
        print_batch_summary(&summary);
    }

    Ok(())
}
