mod document;
mod report;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use heapwalk_core::crawler::{CrawlConfig, CrawledSnapshot, Crawler, VisitStrategy};
use heapwalk_core::graph::HeapGraph;
use heapwalk_core::snapshot::Snapshot;
use heapwalk_core::types::Address;
use heapwalk_utils::{debug, info, init_logging_with, LogFormat, LogLevel, LoggingConfig, LoggingError};

use crate::document::load_snapshot;

/// Reconstructs the live object graph of managed heap snapshots.
#[derive(Parser, Debug)]
#[command(name = "heapwalk")]
#[command(version)]
#[command(about = "Reconstructs the live object graph of managed heap snapshots", long_about = None)]
struct Cli
{
    #[command(subcommand)]
    command: Commands,

    /// Visitation strategy: 'table' (side table) or 'header' (header marks)
    #[arg(long, global = true, default_value = "table")]
    strategy: VisitStrategy,

    /// Managed base type whose instances wrap native objects
    #[arg(long, global = true)]
    base_type: Option<String>,

    /// Instance id field on the base type
    #[arg(long, global = true)]
    instance_id_field: Option<String>,

    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (pretty or json); overrides HEAPWALK_LOG_FORMAT
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Log file or directory; overrides HEAPWALK_LOG_FILE
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Crawl a snapshot and print node and edge counts
    Crawl
    {
        /// Path to the snapshot document (JSON)
        snapshot: PathBuf,
        /// Print the crawl output (records and connections) as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show a managed object: type, fields, elements and edges
    Inspect
    {
        /// Path to the snapshot document (JSON)
        snapshot: PathBuf,
        /// Object address (hex format: 0x1000 or decimal)
        address: String,
    },
    /// List the snapshot's type descriptions
    Types
    {
        /// Path to the snapshot document (JSON)
        snapshot: PathBuf,
    },
}

fn main()
{
    let cli = Cli::parse();

    let _guard = match logging_config(&cli).and_then(init_logging_with) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn logging_config(cli: &Cli) -> Result<LoggingConfig, LoggingError>
{
    let mut config = LoggingConfig::from_env();
    if let Some(level) = &cli.log_level {
        config = config.with_level(LogLevel::from_str(level).map_err(LoggingError::InvalidLevel)?);
    }
    if let Some(format) = &cli.log_format {
        config = config.with_format(LogFormat::from_str(format).map_err(LoggingError::InvalidFormat)?);
    }
    if let Some(file) = &cli.log_file {
        config = config.with_file(file.clone());
    }
    Ok(config)
}

fn crawl_config(cli: &Cli) -> CrawlConfig
{
    let mut config = CrawlConfig::default().with_strategy(cli.strategy);
    if let Some(base_type) = &cli.base_type {
        config = config.with_native_base_type(base_type.clone());
    }
    if let Some(field) = &cli.instance_id_field {
        config = config.with_instance_id_field(field.clone());
    }
    config
}

fn run_command(cli: Cli) -> Result<(), Box<dyn Error>>
{
    let config = crawl_config(&cli);
    match cli.command {
        Commands::Crawl { snapshot, json } => {
            let (snapshot, crawled) = load_and_crawl(&snapshot, &config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&crawled)?);
            } else {
                let graph = HeapGraph::materialize(&snapshot, &crawled)?;
                print!("{}", report::crawl_summary(&crawled, &graph));
            }
            Ok(())
        }
        Commands::Inspect { snapshot, address } => {
            let address = parse_address(&address)?;
            let (snapshot, crawled) = load_and_crawl(&snapshot, &config)?;
            let graph = HeapGraph::materialize(&snapshot, &crawled)?;
            print!("{}", report::inspect_object(&snapshot, &graph, address)?);
            Ok(())
        }
        Commands::Types { snapshot } => {
            let snapshot = load_snapshot(&snapshot)?;
            print!("{}", report::type_table(snapshot.vm(), snapshot.types()));
            Ok(())
        }
    }
}

fn load_and_crawl(path: &Path, config: &CrawlConfig) -> Result<(Snapshot, CrawledSnapshot), Box<dyn Error>>
{
    info!("Loading snapshot from {}", path.display());
    let mut snapshot = load_snapshot(path)?;
    debug!(
        "Snapshot has {} segments ({} bytes) and {} types",
        snapshot.heap().segments().len(),
        snapshot.heap().total_bytes(),
        snapshot.types().len()
    );
    let crawled = Crawler::new(config.clone()).crawl(&mut snapshot)?;
    Ok((snapshot, crawled))
}

/// Parse `0x`-prefixed hex or decimal
fn parse_address(text: &str) -> Result<Address, String>
{
    let trimmed = text.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed
        .map(Address::new)
        .map_err(|err| format!("Invalid address '{text}': {err}"))
}
