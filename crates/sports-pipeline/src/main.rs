//! CLI entry point for the sports data pipeline.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use sports_pipeline::scheduler::FileTarget;
use sports_pipeline::tasks::CleanTask;
use sports_pipeline::{PipelineConfig, SportsPipeline, TaskOutcome, TracingProgressReporter};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Environment variable holding the object storage bearer token.
const TOKEN_VAR: &str = "SPORTS_STORAGE_TOKEN";

/// Environment variable overriding the SQLite database path.
const DATABASE_VAR: &str = "SPORTS_DATABASE_PATH";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Sports dataset pipeline: download, explore, clean, load, query",
    long_about = "Runs the sports dataset pipeline as a graph of resumable tasks.\n\n\
                  Every task writes one artifact into the work directory; tasks whose\n\
                  artifact already exists are skipped.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  SPORTS_STORAGE_TOKEN    Bearer token for object storage\n  \
                  SPORTS_DATABASE_PATH    SQLite database file (overrides the config file)\n\n\
                  EXAMPLES:\n  \
                  # Build everything\n  \
                  sports-pipeline run\n\n  \
                  # Only produce the cleaned CSV\n  \
                  sports-pipeline run --task clean_data\n\n  \
                  # Clean a local file outside the task graph\n  \
                  sports-pipeline clean --input data.csv --output cleaned.csv"
)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding every artifact (overrides the config file)
    #[arg(short, long, global = true)]
    work_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build tasks, running only what is missing
    Run {
        /// Task to build; repeatable. Defaults to query_data and explore_data.
        #[arg(short, long = "task")]
        tasks: Vec<String>,
    },
    /// Show whether each task's artifact exists
    Status,
    /// Parse and clean a local CSV file
    Clean {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Initialize the tracing subscriber for logging.
fn init_logging(level: &str, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet);

    // Load environment variables from .env file
    dotenv().ok();

    let config = load_config(&args)?;
    debug!("Configuration: {}", serde_json::to_string(&config)?);

    match &args.command {
        Command::Run { tasks } => run(config, tasks, args.quiet),
        Command::Status => status(config),
        Command::Clean { input, output } => clean(&config, input, output),
    }
}

/// Merge the config file, command-line flags and environment overrides.
fn load_config(args: &Args) -> Result<PipelineConfig> {
    let base = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Reading config file {}", path.display()))?;
            PipelineConfig::from_json(&text)
                .with_context(|| format!("Loading config file {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    let mut builder = PipelineConfig::builder().base(base);
    if let Some(work_dir) = &args.work_dir {
        builder = builder.work_dir(work_dir);
    }
    if let Ok(token) = env::var(TOKEN_VAR)
        && !token.is_empty()
    {
        debug!("Using storage token from {}", TOKEN_VAR);
        builder = builder.storage_token(token);
    }
    if let Ok(path) = env::var(DATABASE_VAR)
        && !path.is_empty()
    {
        builder = builder.database_path(path);
    }

    Ok(builder.build()?)
}

fn run(config: PipelineConfig, tasks: &[String], quiet: bool) -> Result<()> {
    let pipeline = if quiet {
        SportsPipeline::new(config)?
    } else {
        SportsPipeline::with_reporter(config, Arc::new(TracingProgressReporter))?
    };

    let roots = pipeline.resolve_tasks(tasks)?;
    let report = pipeline.run(&roots).context("Pipeline build failed")?;

    if !quiet {
        println!();
        println!("{}", "=".repeat(60));
        println!("BUILD COMPLETE ({} ms)", report.duration_ms);
        println!("{}", "=".repeat(60));
        for entry in &report.entries {
            let outcome = match entry.outcome {
                TaskOutcome::Executed => "ran",
                TaskOutcome::Skipped => "up to date",
            };
            println!("  {:<14} {}", entry.task, outcome);
        }
    }
    Ok(())
}

fn status(config: PipelineConfig) -> Result<()> {
    let pipeline = SportsPipeline::new(config)?;
    for status in pipeline.status()? {
        let mark = if status.complete { "x" } else { " " };
        println!("[{}] {:<14} {}", mark, status.task, status.target);
    }
    Ok(())
}

fn clean(config: &PipelineConfig, input: &Path, output: &Path) -> Result<()> {
    if !input.exists() {
        return Err(anyhow!("Input file not found: {}", input.display()));
    }

    let task = CleanTask::new(
        config.schema.clone(),
        config.cleaning.clone(),
        input,
        FileTarget::new(output),
    );
    let summary = task.clean()?;

    println!(
        "{} rows read ({} malformed dropped), {} after z-score, {} after IQR",
        summary.read.rows_read,
        summary.read.rows_dropped,
        summary.cleaning.z_score.rows_after,
        summary.cleaning.rows_out()
    );
    for imputed in &summary.cleaning.imputed {
        println!(
            "  {:<22} {} cells filled",
            imputed.column, imputed.cells_filled
        );
    }
    println!("Cleaned data written to {}", output.display());
    Ok(())
}
