//! EPM CLI - Command-line interface for EPM Lens
//!
//! Commands:
//! - analyze: Run the full analysis over an event export
//! - validate: Check raw records without analyzing them
//! - model: Print the built-in reference model

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use epm_lens::pipeline::{encode_to_json, LogAnalyzer};
use epm_lens::schema::{IngestReport, LogFilter, RawEventAdapter};
use epm_lens::{AnalysisConfig, AnalysisError, ReferenceModel, VERSION};

/// EPM Lens - process analytics for educational event logs
#[derive(Parser)]
#[command(name = "epm")]
#[command(version = VERSION)]
#[command(about = "Conformance, bottleneck and pattern analysis of learning event logs", long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an event export and write the report
    Analyze {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "json")]
        output_format: OutputFormat,

        /// Reference model JSON (defaults to the built-in course model)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Analysis configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Drop cases with fewer events (after exclusions)
        #[arg(long)]
        min_events: Option<usize>,

        /// Activities to remove before analysis
        #[arg(long, num_args = 1..)]
        exclude: Vec<String>,
    },

    /// Validate raw records
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the built-in reference model
    Model {
        /// Pretty-print the model
        #[arg(long)]
        json_pretty: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<(), EpmCliError> {
    match cli.command {
        Commands::Analyze {
            input,
            output,
            input_format,
            output_format,
            model,
            config,
            min_events,
            exclude,
        } => cmd_analyze(
            &input,
            &output,
            input_format,
            output_format,
            model.as_deref(),
            config.as_deref(),
            min_events,
            exclude,
        ),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Model { json_pretty } => cmd_model(json_pretty),
    }
}

fn read_input(input: &Path) -> Result<String, EpmCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            tracing::warn!("reading events from an interactive terminal; end input with Ctrl-D");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn ingest(input: &Path, input_format: InputFormat) -> Result<IngestReport, EpmCliError> {
    let data = read_input(input)?;
    Ok(match input_format {
        InputFormat::Ndjson => RawEventAdapter::parse_ndjson(&data),
        InputFormat::Json => RawEventAdapter::parse_array(&data)?,
    })
}

#[allow(clippy::too_many_arguments)]
fn cmd_analyze(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    model: Option<&Path>,
    config: Option<&Path>,
    min_events: Option<usize>,
    exclude: Vec<String>,
) -> Result<(), EpmCliError> {
    let model = match model {
        Some(path) => ReferenceModel::from_json(&fs::read_to_string(path)?)?,
        None => ReferenceModel::epm_default(),
    };
    let config = match config {
        Some(path) => AnalysisConfig::from_json(&fs::read_to_string(path)?)?,
        None => AnalysisConfig::default(),
    };

    let mut analyzer = LogAnalyzer::new(model, config);
    if min_events.is_some() || !exclude.is_empty() {
        let filter = LogFilter::new(min_events.unwrap_or(0)).excluding(exclude);
        analyzer = analyzer.with_filter(filter);
    }

    let report = analyzer.run(ingest(input, input_format)?)?;
    let pretty = matches!(output_format, OutputFormat::JsonPretty);
    let output_data = encode_to_json(&report, pretty)?;

    if output.to_string_lossy() == "-" {
        println!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), EpmCliError> {
    let ingest = ingest(input, input_format)?;

    let report = ValidationReport {
        total_records: ingest.total_records,
        valid_records: ingest.accepted(),
        invalid_records: ingest.skipped.len(),
        cases: ingest.log.len(),
        errors: ingest
            .skipped
            .iter()
            .map(|s| ValidationErrorDetail {
                index: s.index,
                line: s.line,
                error: s.reason.clone(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);
        println!("Cases:           {}", report.cases);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                match err.line {
                    Some(line) => println!("  - Line {}: {}", line, err.error),
                    None => println!("  - Record {}: {}", err.index, err.error),
                }
            }
        }
    }

    if report.invalid_records > 0 {
        Err(EpmCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_model(json_pretty: bool) -> Result<(), EpmCliError> {
    let model = ReferenceModel::epm_default();
    let json = if json_pretty {
        model.to_json()?
    } else {
        serde_json::to_string(&model)?
    };
    println!("{}", json);
    Ok(())
}

// Error types

#[derive(Debug)]
enum EpmCliError {
    Io(io::Error),
    Analysis(AnalysisError),
    Json(serde_json::Error),
    ValidationFailed(usize),
}

impl From<io::Error> for EpmCliError {
    fn from(e: io::Error) -> Self {
        EpmCliError::Io(e)
    }
}

impl From<AnalysisError> for EpmCliError {
    fn from(e: AnalysisError) -> Self {
        EpmCliError::Analysis(e)
    }
}

impl From<serde_json::Error> for EpmCliError {
    fn from(e: serde_json::Error) -> Self {
        EpmCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<EpmCliError> for CliError {
    fn from(e: EpmCliError) -> Self {
        match e {
            EpmCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            EpmCliError::Analysis(AnalysisError::EmptyLog) => CliError {
                code: "NO_CASES".to_string(),
                message: AnalysisError::EmptyLog.to_string(),
                hint: Some("Run 'epm validate' or lower --min-events".to_string()),
            },
            EpmCliError::Analysis(AnalysisError::InvalidModel(msg)) => CliError {
                code: "INVALID_MODEL".to_string(),
                message: msg,
                hint: Some("Compare with the output of 'epm model --json-pretty'".to_string()),
            },
            EpmCliError::Analysis(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check input format".to_string()),
            },
            EpmCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            EpmCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    cases: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    error: String,
}
