//! Obswell Sync - observation well data loader

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use obswell_common::credentials::Credentials;
use obswell_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use obswell_sync::config::{listing_base_url, SyncConfigBuilder};
use obswell_sync::{
    report, CsvFileStore, ObservationStore, PgObservationStore, SyncConfig, SyncMode,
    SyncPipeline,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "obswell-sync")]
#[command(author, version, about = "Sync BC observation well data into a local store")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Write to this CSV file instead of the database
    #[arg(long, global = true, env = "OBSWELL_CSV_PATH")]
    csv: Option<PathBuf>,

    /// Database credentials file
    #[arg(
        long,
        global = true,
        env = "OBSWELL_CREDENTIALS",
        default_value = "credentials.json"
    )]
    credentials: PathBuf,

    /// Directory listing URL
    #[arg(long, global = true)]
    listing_url: Option<String>,

    /// Report output path
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// HTTP timeout in seconds (0 disables it)
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Number of files processed at once
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Print the run summary as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drop the table and load every full-history file
    Reset,
    /// Append unseen rows from every recent-observations file
    Update,
}

impl Command {
    fn mode(&self) -> SyncMode {
        match self {
            Command::Reset => SyncMode::Bulk,
            Command::Update => SyncMode::Incremental,
        }
    }
}

fn build_config(cli: &Cli) -> Result<SyncConfig> {
    let base = SyncConfig::from_env().context("Failed to load configuration from environment")?;
    let mut builder = SyncConfigBuilder::from_config(base);

    if let Some(raw) = &cli.listing_url {
        builder = builder.listing_url(listing_base_url(raw)?);
    }
    if let Some(path) = &cli.report {
        builder = builder.report_path(path.clone());
    }
    if let Some(secs) = cli.timeout_secs {
        builder = builder.http_timeout_secs((secs > 0).then_some(secs));
    }
    if let Some(concurrency) = cli.concurrency {
        builder = builder.concurrency(concurrency);
    }

    builder.build().context("Invalid configuration")
}

async fn open_store(cli: &Cli, config: &SyncConfig) -> Result<Arc<dyn ObservationStore>> {
    if let Some(path) = &cli.csv {
        return Ok(Arc::new(CsvFileStore::new(path.clone())));
    }

    let credentials = Credentials::from_file(&cli.credentials)
        .with_context(|| format!("Failed to load credentials from {}", cli.credentials.display()))?;
    let url = credentials
        .connection_url()
        .context("Failed to build database URL")?;

    let store = PgObservationStore::connect(&url, credentials.schema.clone(), config)
        .await
        .with_context(|| format!("Failed to connect to database at {}", credentials.host))?;

    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(LogLevel::from_verbosity(cli.verbose))
        .output(LogOutput::Console)
        .log_file_prefix("obswell-sync")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env().context("Invalid LOG_* environment")?;
    let _log_guard = init_logging(&log_config)?;

    let config = build_config(&cli)?;
    let store = open_store(&cli, &config).await?;
    info!(store = %store.describe(), listing = %config.listing_url, "Store ready");

    let mode = cli.command.mode();
    let pipeline = SyncPipeline::new(&config, store)?;
    let result = run_and_report(&pipeline, mode, &config, cli.json).await;
    pipeline.store().close().await;
    result
}

async fn run_and_report(
    pipeline: &SyncPipeline,
    mode: SyncMode,
    config: &SyncConfig,
    json: bool,
) -> Result<()> {
    let summary = pipeline
        .run(mode)
        .await
        .context("Sync aborted before any file was processed")?;

    report::write_report(&summary, &config.report_path)
        .await
        .with_context(|| format!("Failed to write report to {}", config.report_path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{}: {} files, {} rows written, {} failed. Report: {}",
            mode.description(),
            summary.outcomes.len(),
            summary.rows_written(),
            summary.failed_files(),
            config.report_path.display()
        );
    }

    Ok(())
}
