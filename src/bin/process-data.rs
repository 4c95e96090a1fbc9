use anyhow::Context;
use clap::Parser;
use person_pipeline::apis::source_for;
use person_pipeline::{logging, process_data, Config};
use std::path::PathBuf;

/// Fetch, validate, anonymize and store person records
#[derive(Parser)]
#[command(name = "process-data")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Drop previously stored persons before writing
    #[arg(long)]
    fresh: bool,
    /// Read records from a saved API response instead of the network
    #[arg(long)]
    input: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    config.storage.fresh |= args.fresh;
    let _guard = logging::init_logging(&config.logging);

    let source = source_for(&config.api, args.input.as_deref()).context("Failed to set up the record source")?;
    let run = process_data(&config, source.as_ref()).await?;
    println!(
        "✅ processed: {}, skipped: {}, duplicates: {}",
        run.processed(),
        run.skipped(),
        run.duplicates
    );
    Ok(())
}
