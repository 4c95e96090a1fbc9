use clap::Parser;
use person_pipeline::{generate_report, logging, Config};
use std::path::PathBuf;

/// Generate the summary report from the stored person records
#[derive(Parser)]
#[command(name = "generate-report")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let _guard = logging::init_logging(&config.logging);

    let report = generate_report(&config)?;
    println!("✅ Report saved as {}", report.path.display());
    Ok(())
}
