//! Ripple-Crawl main entry point
//!
//! This is the command-line interface for the Ripple-Crawl crawler.

use clap::Parser;
use ripple_crawl::config::{load_config_with_hash, parse_seeds, Config};
use ripple_crawl::output::{dump_graph, dump_lines, load_statistics, print_statistics};
use ripple_crawl::output::{ResultWriter, TableWriter};
use ripple_crawl::queue::{CrawlerQueue, QueueOptions};
use ripple_crawl::Crawler;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Ripple-Crawl: a resumable web crawler
///
/// Ripple-Crawl crawls from seed URLs with pluggable spiders, throttling
/// and capping requests per domain. Its queue is stored in SQLite so an
/// interrupted crawl can be resumed.
#[derive(Parser, Debug)]
#[command(name = "ripple-crawl")]
#[command(version = "1.0.0")]
#[command(about = "A resumable web crawler", long_about = None)]
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

    /// Resume an interrupted crawl
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, ignoring previous state
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "dump", "graph"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "dump", "graph"])]
    stats: bool,

    /// Print the stored queue as `status | depth | url` lines and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "graph"])]
    dump: bool,

    /// Print the stored queue as a JSON job graph and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "dump"])]
    graph: bool,

    /// Also write the rows spiders tabulate from their data to this CSV file
    #[arg(long, value_name = "PATH")]
    table: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.resume {
        config.crawler.resume = true;
    } else if cli.fresh {
        config.crawler.resume = false;
    }

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.dump {
        handle_dump(&config)?;
    } else if cli.graph {
        handle_graph(&config)?;
    } else {
        handle_crawl(config, config_hash, cli.table.as_deref()).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr so results can be piped from stdout.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ripple_crawl=info,warn"),
            1 => EnvFilter::new("ripple_crawl=debug,info"),
            2 => EnvFilter::new("ripple_crawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Ripple-Crawl Dry Run ===\n");

    let crawler = &config.crawler;
    println!("Crawler Configuration:");
    match crawler.max_depth {
        Some(depth) => println!("  Max depth: {}", depth),
        None => println!("  Max depth: unbounded"),
    }
    println!("  Max workers: {}", crawler.max_workers);
    println!("  Domain parallelism: {}", crawler.domain_parallelism);
    for (domain, parallelism) in &crawler.domain_parallelism_overrides {
        println!("    * {}: {}", domain, parallelism);
    }
    println!("  Throttle: {}ms", crawler.throttle);
    println!("  Order: {}", if crawler.lifo { "LIFO" } else { "FIFO" });
    println!("  Visit URLs only once: {}", crawler.visit_urls_only_once);
    println!("  Normalize URLs: {}", crawler.normalize_urls);
    println!("  Resume: {}", crawler.resume);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nFetch:");
    println!("  Timeout: {}s", config.fetch.timeout);
    println!("  Connect timeout: {}s", config.fetch.connect_timeout);
    println!("  Retries: {}", config.fetch.retries);
    println!("  Max redirects: {}", config.fetch.max_redirects);

    println!("\nOutput:");
    println!(
        "  Database: {}",
        config.output.database_path.as_deref().unwrap_or("(in memory)")
    );
    println!(
        "  Results: {}",
        config.output.results_path.as_deref().unwrap_or("(stdout)")
    );

    if config.is_multi_spider() {
        println!("\nSpiders ({}):", config.spiders.len());
        for (name, spider) in &config.spiders {
            println!("  - {} ({:?}, {} seeds)", name, spider.kind, spider.seeds.len());
        }
    } else {
        let kind = config.spider.as_ref().map(|s| s.kind).unwrap_or_default();
        println!("\nSpider: {:?}", kind);
    }

    let seeds = parse_seeds(&config.seeds)?;
    println!("\nSeeds ({}):", seeds.len());
    for seed in &seeds {
        match seed.spider() {
            Some(spider) => println!("  - {} [{}]", seed.url(), spider),
            None => println!("  - {}", seed.url()),
        }
    }

    let spiders = ripple_crawl::SpiderSet::from_config(config)?;
    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start crawling with {} seed URLs",
        spiders.start().len()
    );

    Ok(())
}

/// Opens the configured queue database without altering it
fn open_for_inspection(config: &Config) -> Result<CrawlerQueue, Box<dyn std::error::Error>> {
    let path = config
        .output
        .database_path
        .as_deref()
        .ok_or("output.database-path is not set; there is no stored queue to inspect")?;
    if !Path::new(path).exists() {
        return Err(format!("Database {} does not exist", path).into());
    }

    tracing::info!("Inspecting database {}", path);
    Ok(CrawlerQueue::open(QueueOptions::inspect(path))?)
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let queue = open_for_inspection(config)?;

    // Load statistics
    let stats = load_statistics(&queue)?;

    // Print statistics
    print_statistics(&stats)?;

    Ok(())
}

/// Handles the --dump mode: one line per stored record
fn handle_dump(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let queue = open_for_inspection(config)?;
    let records = queue.dump()?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for line in dump_lines(&records) {
        writeln!(out, "{}", line)?;
    }

    Ok(())
}

/// Handles the --graph mode: the job graph as JSON
fn handle_graph(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let queue = open_for_inspection(config)?;
    let graph = dump_graph(&queue.dump()?);
    println!("{}", serde_json::to_string_pretty(&graph)?);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: String,
    table_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.crawler.resume {
        tracing::info!("Starting crawl (will resume pending jobs)");
    } else {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    }

    let crawler = Crawler::from_config(&config, Some(config_hash))?;
    let with_spider = crawler.spiders().is_multi();

    let sink: Box<dyn Write> = match &config.output.results_path {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(std::io::stdout()),
    };
    let mut results = ResultWriter::new(sink, with_spider)?;
    let mut table = table_path
        .map(TableWriter::<std::fs::File>::create)
        .transpose()?;

    // Stop cleanly on Ctrl-C
    let stopper = crawler.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight jobs");
            stopper.stop();
        }
    });

    let mut stream = crawler.start()?;
    let mut outcome = Ok(());

    while let Some(item) = stream.next().await {
        match item {
            Ok(result) => {
                results.write(&result)?;
                if let Some(table) = table.as_mut() {
                    table.write(crawler.spiders(), &result)?;
                }
            }
            Err(e) => {
                tracing::error!("Crawl failed: {}", e);
                outcome = Err(e);
            }
        }
    }

    results.flush()?;
    if let Some(table) = table.as_mut() {
        table.flush()?;
    }

    let state = crawler.state();
    tracing::info!(
        "Crawl {}: {} results written ({} done, {} failed)",
        state.status,
        results.rows(),
        state.jobs_done,
        state.jobs_failed
    );

    outcome.map_err(Into::into)
}
