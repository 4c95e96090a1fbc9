use anyhow::Context;
use clap::{Parser, Subcommand};
use person_pipeline::apis::source_for;
use person_pipeline::config::{Config, ReportFormat};
use person_pipeline::report::GeneratedReport;
use person_pipeline::types::PipelineRun;
use person_pipeline::{generate_report, logging, process_data};
use std::path::{Path, PathBuf};
use tracing::error;

#[derive(Parser)]
#[command(name = "person_pipeline")]
#[command(about = "Fetch, clean, anonymize and report on person records")]
#[command(version = "0.1.0")]
struct Cli {
    /// TOML configuration file (defaults to pipeline.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, validate, anonymize and store records
    Process(ProcessArgs),
    /// Generate the report from the stored records
    Report(ReportArgs),
    /// Run process then report
    Run {
        #[command(flatten)]
        process: ProcessArgs,
        #[command(flatten)]
        report: ReportArgs,
    },
}

#[derive(clap::Args)]
struct ProcessArgs {
    /// Drop previously stored persons before writing
    #[arg(long)]
    fresh: bool,
    /// Total number of records to fetch
    #[arg(long)]
    quantity: Option<usize>,
    /// Records per API request
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Read records from a saved API response instead of the network
    #[arg(long)]
    input: Option<PathBuf>,
}

#[derive(clap::Args)]
struct ReportArgs {
    #[arg(long, value_enum)]
    format: Option<ReportFormat>,
    /// Directory the report is written to
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl ProcessArgs {
    fn apply(&self, config: &mut Config) {
        config.storage.fresh |= self.fresh;
        if let Some(q) = self.quantity {
            config.api.total_quantity = q;
        }
        if let Some(c) = self.chunk_size {
            config.api.chunk_size = c;
        }
    }
}

impl ReportArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(format) = self.format {
            config.report.format = format;
        }
        if let Some(dir) = &self.output_dir {
            config.report.output_dir = dir.clone();
        }
    }
}

async fn run_process(config: &Config, input: Option<&Path>) -> anyhow::Result<PipelineRun> {
    println!("🔄 Running process stage...");
    let source = source_for(&config.api, input).context("Failed to set up the record source")?;
    let run = process_data(config, source.as_ref()).await.map_err(|e| {
        error!("Process stage failed: {}", e);
        e
    })?;

    println!("\n📊 Pipeline Results for {}:", run.source);
    println!("   Fetched: {}", run.fetched);
    println!("   Processed: {}", run.processed());
    println!("   Skipped: {}", run.skipped());
    println!("   Duplicates: {}", run.duplicates);
    println!("   Database: {}", config.storage.db_path.display());
    Ok(run)
}

fn run_report(config: &Config) -> anyhow::Result<GeneratedReport> {
    println!("📝 Generating report...");
    let report = generate_report(config).map_err(|e| {
        error!("Report stage failed: {}", e);
        e
    })?;
    println!("✅ Report for {} records saved as {}", report.stats.total_records, report.path.display());
    Ok(report)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    let _guard = logging::init_logging(&config.logging);

    match cli.command {
        Commands::Process(args) => {
            args.apply(&mut config);
            config.validate()?;
            run_process(&config, args.input.as_deref()).await?;
        }
        Commands::Report(args) => {
            args.apply(&mut config);
            config.validate()?;
            run_report(&config)?;
        }
        Commands::Run { process, report } => {
            process.apply(&mut config);
            report.apply(&mut config);
            config.validate()?;

            println!("\n📥 Step 1: Processing records...");
            run_process(&config, process.input.as_deref()).await?;
            println!("\n📝 Step 2: Reporting...");
            run_report(&config)?;
            println!("✅ Full pipeline completed successfully!");
        }
    }
    Ok(())
}
