use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use finquery::{FinancialStore, IngestionPipeline};

/// Ingest financial data from a CSV file into the SQLite store.
#[derive(Parser)]
#[command(name = "finquery-ingest", version)]
struct Cli {
    /// Path to the source CSV file
    #[arg(long, default_value = "data/financials.csv")]
    csv: PathBuf,

    /// Path to the SQLite database
    #[arg(long, default_value = "data/financials.db")]
    db: PathBuf,

    /// Keep existing rows instead of resetting the store first
    #[arg(long)]
    no_reset: bool,

    /// Print the detailed ingestion report after the run
    #[arg(long)]
    report: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let store = FinancialStore::open(&cli.db)?;
    let pipeline = IngestionPipeline::new(&cli.csv, !cli.no_reset);

    let result = pipeline.run(&store)?;
    println!("\n{}", result.summary());

    if cli.report {
        println!("\n{}", pipeline.generate_report(&store, &result)?);
    }

    // Partial failure still reports, but the exit code must say so.
    if !result.is_successful() {
        std::process::exit(1);
    }

    Ok(())
}
