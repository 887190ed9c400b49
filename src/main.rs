//! CLI entry point for the dataset cleaning pipeline.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use datamend::llm::OpenAiConfig;
use datamend::reader::{preview, read_table};
use datamend::{
    CleaningMode, CleaningOrchestrator, CleaningResult, DatasetId, FsArtifactStore, OpenAiProvider,
    PipelineConfig, QaReporter,
};
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// CLI-compatible cleaning mode enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliCleaningMode {
    /// Generate and execute a Python cleaning script
    Script,
    /// Ask the service for cleaned records directly, no script execution
    Direct,
}

/// Rows shown when previewing tables on the terminal.
const PREVIEW_ROWS: usize = 10;

impl From<CliCleaningMode> for CleaningMode {
    fn from(cli: CliCleaningMode) -> Self {
        match cli {
            CliCleaningMode::Script => CleaningMode::Script,
            CliCleaningMode::Direct => CleaningMode::DirectRecords,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "AI-assisted cleaning pipeline for messy tabular data",
    long_about = "Uploads a CSV/TSV file, detects quality issues, generates and executes a\n\
                  cleaning script in a sandboxed subprocess, and reports on the result.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  OPENAI_API_KEY    API key for the generation service\n\n\
                  EXAMPLES:\n  \
                  # Upload, clean, and report in one shot\n  \
                  datamend run -i patients.csv\n\n  \
                  # Step by step\n  \
                  datamend upload -i patients.csv\n  \
                  datamend analyze <id>\n  \
                  datamend clean <id>\n  \
                  datamend report <id>"
)]
struct Args {
    /// Root directory for stored artifacts
    #[arg(long, default_value = "app_data")]
    store_dir: PathBuf,

    /// Script execution timeout in seconds
    #[arg(long, default_value = "300")]
    timeout: u64,

    /// Interpreter used to run generated scripts
    #[arg(long, default_value = "python3")]
    interpreter: String,

    /// How cleaned tables are produced
    #[arg(long, value_enum, default_value = "script")]
    mode: CliCleaningMode,

    /// Model used for analysis and generation
    #[arg(long)]
    model: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a tabular file and print its dataset identifier
    Upload {
        /// Path to the CSV/TSV file
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Profile an uploaded dataset and detect quality issues
    Analyze {
        /// Dataset identifier from `upload`
        id: String,
    },
    /// Generate, validate, and execute a cleaning transform
    Clean {
        /// Dataset identifier from `upload`
        id: String,
    },
    /// Run the final validation-and-cleanup pass over a cleaned dataset
    Master {
        /// Dataset identifier from `upload`
        id: String,
    },
    /// Write a Markdown QA report comparing raw and cleaned tables
    Report {
        /// Dataset identifier from `upload`
        id: String,
    },
    /// Delete every artifact derived from an upload
    Delete {
        /// Dataset identifier from `upload`
        id: String,
    },
    /// Upload, analyze, clean, and report in one invocation
    Run {
        /// Path to the CSV/TSV file
        #[arg(short, long)]
        input: PathBuf,
        /// Also run the final validation-and-cleanup pass
        #[arg(long)]
        master: bool,
    },
}

/// Initialize the tracing subscriber for logging.
fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    // Load environment variables from .env file
    dotenv().ok();

    let config = PipelineConfig::builder()
        .store_dir(&args.store_dir)
        .script_timeout_secs(args.timeout)
        .interpreter(&args.interpreter)
        .cleaning_mode(args.mode.into())
        .build()?;

    let store = Arc::new(FsArtifactStore::new(&config.store_dir)?);

    let mut provider_config = OpenAiConfig::builder();
    if let Some(ref model) = args.model {
        provider_config = provider_config.model(model);
    }
    let provider = Arc::new(OpenAiProvider::from_env(provider_config.build())?);

    let orchestrator = CleaningOrchestrator::new(store.clone(), provider.clone(), config);
    let reporter = QaReporter::new(store, provider);

    match args.command {
        Command::Upload { input } => {
            let id = upload(&orchestrator, &input)?;
            println!("{id}");
            println!("{}", preview(&read_table(&input)?, PREVIEW_ROWS));
        }
        Command::Analyze { id } => {
            let id = DatasetId::parse(&id)?;
            let summary = orchestrator.analyze(id)?;
            println!("{}", serde_json::to_string_pretty(&summary.analysis)?);
        }
        Command::Clean { id } => {
            let id = DatasetId::parse(&id)?;
            let result = orchestrator.clean(id)?;
            print_result(&result);
        }
        Command::Master { id } => {
            let id = DatasetId::parse(&id)?;
            let result = orchestrator.master(id)?;
            print_result(&result);
        }
        Command::Report { id } => {
            let id = DatasetId::parse(&id)?;
            let report = reporter.generate(id)?;
            println!("{}", report.text);
            info!(path = %report.path.display(), "report stored");
        }
        Command::Delete { id } => {
            let id = DatasetId::parse(&id)?;
            orchestrator.delete_artifacts(id)?;
            info!(%id, "deleted");
        }
        Command::Run { input, master } => {
            let id = upload(&orchestrator, &input)?;
            let summary = orchestrator.analyze(id)?;
            info!(issues = summary.analysis.issues.len(), "analysis complete");

            let result = orchestrator.clean(id)?;
            print_result(&result);

            if master {
                let result = orchestrator.master(id)?;
                print_result(&result);
            }

            let report = reporter.generate(id)?;
            println!("report: {}", report.path.display());
        }
    }

    Ok(())
}

fn upload(orchestrator: &CleaningOrchestrator, input: &Path) -> Result<DatasetId> {
    if !input.exists() {
        return Err(anyhow!("input file not found: {}", input.display()));
    }
    Ok(orchestrator.upload(input)?)
}

fn print_result(result: &CleaningResult) {
    if let Some(stdout) = result.stdout.as_deref().filter(|s| !s.trim().is_empty()) {
        println!("script output:\n{}", stdout.trim_end());
    }
    let m = &result.metrics;
    println!(
        "cleaned: {} ({} -> {} rows, {} -> {} columns)",
        result.cleaned_path.display(),
        m.rows_before,
        m.rows_after,
        m.columns_before,
        m.columns_after,
    );
    if let Ok(df) = read_table(&result.cleaned_path) {
        println!("{}", preview(&df, PREVIEW_ROWS));
    }
}
