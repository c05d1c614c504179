//! Floe CLI: incremental loader for dated files and REST collections.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use floe::pipeline::{orders, products, transactions};
use floe::retry::RetryPolicy;
use floe::sink::PostgresSink;
use floe::source::ApiClient;
use floe::{Config, PipelineError, init_tracing};

#[derive(Debug, Parser)]
#[command(name = "floe", about = "Incremental batch loader")]
struct CliArgs {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "floe.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one pipeline (or all of them) once.
    Run {
        #[arg(value_enum)]
        pipeline: PipelineKind,

        /// Input date for the products pipeline (defaults to today).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PipelineKind {
    Transactions,
    Products,
    Orders,
    All,
}

async fn run_transactions(config: &Config) -> Result<(), PipelineError> {
    transactions::run(config).await.map(|_| ())
}

async fn run_products(config: &Config, date: Option<NaiveDate>) -> Result<(), PipelineError> {
    let date = date.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let mut sink = PostgresSink::connect(&config.database)
        .await
        .map_err(PipelineError::from)?;
    products::run(config, &mut sink, date).await.map(|_| ())
}

async fn run_orders(config: &Config) -> Result<(), PipelineError> {
    let retry = RetryPolicy::from_config(&config.retry);
    let client = ApiClient::new(&config.api, retry).map_err(PipelineError::from)?;
    orders::run(config, &client).await.map(|_| ())
}

async fn run(config: &Config, kind: PipelineKind, date: Option<NaiveDate>) -> Result<(), PipelineError> {
    match kind {
        PipelineKind::Transactions => run_transactions(config).await,
        PipelineKind::Products => run_products(config, date).await,
        PipelineKind::Orders => run_orders(config).await,
        PipelineKind::All => {
            run_transactions(config).await?;
            run_products(config, date).await?;
            run_orders(config).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    let config = match Config::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let Command::Run { pipeline, date } = args.command;
    info!(config = %args.config.display(), pipeline = ?pipeline, "Starting floe");

    match run(&config, pipeline, date).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Pipeline failed: {e}");
            ExitCode::FAILURE
        }
    }
}
