//! Sluice CLI - talk to a search cluster through the Sluice transport.
//!
//! # Commands
//!
//! - `sluice request <METHOD> <PATH>` - Send one request through the pipeline
//! - `sluice sniff` - Discover cluster nodes and print the pool
//! - `sluice bulk --file <ndjson> --index <name>` - Bulk ingest a document file

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use sluice_config::{Settings, Validate};
use sluice_log::{Level, LogConfig};
use std::path::PathBuf;

mod commands;
mod error;

use commands::{bulk, request, sniff};
use error::CliResult;

/// Sluice - transport and bulk ingestion for search clusters
#[derive(Parser)]
#[command(name = "sluice")]
#[command(version)]
#[command(about = "Send requests, sniff nodes and bulk ingest documents into a search cluster")]
#[command(long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = format!(
    "{}\n  {} sluice -n http://localhost:9200 request GET /_cluster/health\n  {} sluice --config sluice.toml sniff\n  {} sluice bulk --file docs.ndjson --index products --id-field sku",
    "Examples:".bright_cyan().bold(),
    "$".dimmed(),
    "$".dimmed(),
    "$".dimmed(),
))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (JSON or TOML)
    #[arg(short, long, global = true, env = "SLUICE_CONFIG")]
    config: Option<PathBuf>,

    /// Cluster node URL, repeatable; replaces the nodes from the settings
    #[arg(short, long = "node", global = true)]
    nodes: Vec<String>,

    /// More log output, repeat for more
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one request through the pipeline
    #[command(alias = "r")]
    Request(RequestArgs),

    /// Discover cluster nodes and print the pool
    Sniff,

    /// Bulk ingest a newline-delimited JSON file
    #[command(alias = "b")]
    Bulk(BulkArgs),
}

#[derive(Args)]
struct RequestArgs {
    /// HTTP method
    method: String,

    /// Request path, e.g. /_cluster/health
    path: String,

    /// JSON request body
    #[arg(short, long)]
    body: Option<String>,

    /// Do not fail over to other nodes
    #[arg(long)]
    no_retry: bool,
}

/// Bulk action applied to every document.
#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum Action {
    /// Index, replacing existing documents
    Index,
    /// Create, failing on existing documents
    Create,
}

#[derive(Args)]
pub(crate) struct BulkArgs {
    /// Input file, one JSON document per line
    #[arg(short, long)]
    pub file: PathBuf,

    /// Target index
    #[arg(short, long)]
    pub index: Option<String>,

    /// Bulk action
    #[arg(short, long, value_enum, default_value = "index")]
    pub action: Action,

    /// Document field used as the document id
    #[arg(long)]
    pub id_field: Option<String>,

    /// Operations per bulk request
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Bulk requests in flight
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Times one rejected document is sent again
    #[arg(long)]
    pub max_retries: Option<u32>,
}

/// Settings from the file and environment, with `--node` applied.
fn settings(cli: &Cli) -> CliResult<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if !cli.nodes.is_empty() {
        settings.transport.nodes = cli.nodes.clone();
        settings.validate()?;
    }
    Ok(settings)
}

fn init_logging(cli: &Cli) {
    let mut config = LogConfig::from_env();
    if cli.quiet {
        config = config.with_level(Level::Error);
    }
    for _ in 0..cli.verbose {
        config.level = config.level.more_verbose();
    }
    if cli.no_color {
        config.color = false;
    }
    // a subscriber installed by the embedding process stays in place
    let _ = config.init();
}

async fn run(cli: Cli) -> CliResult<()> {
    let settings = settings(&cli)?;
    match cli.command {
        Commands::Request(args) => {
            request::run(
                &settings,
                &args.method,
                &args.path,
                args.body.as_deref(),
                !args.no_retry,
                cli.quiet,
            )
            .await
        }
        Commands::Sniff => sniff::run(&settings, cli.quiet).await,
        Commands::Bulk(args) => bulk::run(&settings, &args, cli.quiet).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    init_logging(&cli);

    if let Err(e) = run(cli).await {
        eprintln!("\n  {} {}\n", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
