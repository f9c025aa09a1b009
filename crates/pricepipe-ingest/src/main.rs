//! Pricepipe - item price ingestion jobs

use anyhow::Result;
use clap::{Parser, ValueEnum};
use pricepipe_common::logging::{init_logging, LogConfig, LogLevel};
use pricepipe_ingest::batch::BatchOrchestrator;
use pricepipe_ingest::config::{PipelineConfig, DEFAULT_DB_CONFIG_PATH};
use pricepipe_ingest::currency::CurrencyJob;
use pricepipe_ingest::{db, view};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "pricepipe")]
#[command(author, version, about = "Item price ingestion jobs")]
struct Cli {
    /// Job to run
    #[arg(long, value_enum, default_value_t = Job::All)]
    job: Job,

    /// Batch files to process instead of the whole intake directory
    #[arg(long, num_args = 0..)]
    files: Vec<String>,

    /// Database connection descriptor (JSON)
    #[arg(long, env = "PRICEPIPE_DB_CONFIG", default_value = DEFAULT_DB_CONFIG_PATH)]
    db_config: PathBuf,

    /// Intake directory for batch files
    #[arg(long)]
    batch_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Job {
    /// Refresh currencies and exchange rates
    Currencies,
    /// Ingest item-price batch files
    Batch,
    /// Create the NOK price view
    View,
    /// currencies, then batch, then view
    All,
}

impl Job {
    fn includes(self, job: Job) -> bool {
        self == Job::All || self == job
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("pricepipe")
        .build()
        .with_env_overrides()?;

    let _guard = init_logging(&log_config)?;

    let mut config = PipelineConfig::load(&cli.db_config)?;
    if let Some(dir) = cli.batch_dir {
        config.batch_dir = dir;
    }

    let files = (!cli.files.is_empty()).then_some(cli.files.as_slice());
    if files.is_some() && !cli.job.includes(Job::Batch) {
        warn!("--files only applies to the batch job and is ignored");
    }

    if cli.job.includes(Job::Currencies) {
        run_currencies(&config).await?;
    }

    if cli.job.includes(Job::Batch) {
        run_batch(&config, files).await?;
    }

    if cli.job.includes(Job::View) {
        run_view(&config).await?;
    }

    info!("Done");
    Ok(())
}

async fn run_currencies(config: &PipelineConfig) -> Result<()> {
    let job = CurrencyJob::connect(config).await?;

    match job.run().await {
        Ok(summary) => info!(
            currencies = ?summary.currencies_upserted,
            rates = ?summary.rates_upserted,
            failed_bases = summary.failed_bases.len(),
            "Currency job finished"
        ),
        Err(e) if e.is_fatal() => return Err(e.into()),
        // A failed refresh leaves the previous rates in place; later jobs can still run
        Err(e) => error!(error = %e, "Currency job was unsuccessful"),
    }

    Ok(())
}

async fn run_batch(config: &PipelineConfig, files: Option<&[String]>) -> Result<()> {
    let mut orchestrator = BatchOrchestrator::connect(config).await?;
    let summary = orchestrator.run(files).await?;

    if summary.failed() > 0 {
        warn!(failed = summary.failed(), "Some batch files were rolled back");
    }

    Ok(())
}

async fn run_view(config: &PipelineConfig) -> Result<()> {
    let pool = db::connect(&config.connection, config.connect_timeout()).await?;
    let result = view::create_nok_view(&pool).await;
    pool.close().await;

    Ok(result?)
}
