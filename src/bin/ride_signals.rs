//! Ride Signals CLI - Command-line interface for ride feature extraction
//!
//! Commands:
//! - hrr: Heart-rate recovery windows per ride
//! - mmp: Maximal mean power windows per ride
//! - trimp: Training impulse per ride or per week
//! - calibrate: Athlete max/min HR baselines
//! - schema: Print report columns or the default configuration

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ride_signals::encoder::{to_ndjson, TRIMP_COLUMNS, WEEKLY_TRIMP_COLUMNS};
use ride_signals::pipeline::{aggregate_weekly, extract_features};
use ride_signals::{
    AthleteProcessor, CalibrationState, ComputeError, DataProvider, FeatureEncoder, FeatureReport,
    FeatureTable, Gender, InMemoryProvider, Metric, PipelineConfig, VERSION,
};

/// Ride Signals - HRR, MMP and TRIMP features from per-second ride data
#[derive(Parser)]
#[command(name = "ride-signals")]
#[command(version = VERSION)]
#[command(about = "Extract physiological performance features from ride data", long_about = None)]
struct Cli {
    /// Enable debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Heart-rate recovery: largest HR drop per recovery segment
    Hrr {
        #[command(flatten)]
        io: IoArgs,

        /// Window length in samples (defaults to the configured window)
        #[arg(long)]
        window: Option<usize>,
    },

    /// Maximal mean power at near-maximal heart rate
    Mmp {
        #[command(flatten)]
        io: IoArgs,

        /// Window length in minutes
        #[arg(long, default_value = "5")]
        minutes: usize,

        /// Minimum mean HR as a fraction of max HR
        #[arg(long, default_value = "0.85")]
        hr_threshold: f64,
    },

    /// Training impulse per ride
    Trimp {
        #[command(flatten)]
        io: IoArgs,

        /// Sum per training week instead of per ride
        #[arg(long)]
        weekly: bool,
    },

    /// Estimate athlete max/min HR baselines
    Calibrate {
        #[command(flatten)]
        io: IoArgs,
    },

    /// Print report columns or the default configuration
    Schema {
        #[arg(value_enum)]
        schema_type: SchemaType,
    },
}

#[derive(Args)]
struct IoArgs {
    /// Input file path (use - for stdin)
    #[arg(short, long)]
    input: PathBuf,

    /// Output file path (use - for stdout)
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    /// Input format
    #[arg(long, default_value = "json")]
    input_format: InputFormat,

    /// Output format
    #[arg(long, default_value = "ndjson")]
    output_format: OutputFormat,

    /// Pipeline configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only process this athlete
    #[arg(long)]
    athlete: Option<String>,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one athlete per line)
    Ndjson,
    /// JSON array of athletes (or a single athlete)
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one report per line)
    Ndjson,
    /// JSON array of reports
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    Hrr,
    Mmp,
    Trimp,
    WeeklyTrimp,
    /// Default pipeline configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), RideCliError> {
    match cli.command {
        Commands::Hrr { io, window } => {
            let config = load_config(io.config.as_deref())?;
            let metric = Metric::Hrr {
                window_len: window.unwrap_or(config.hrr.window_len),
            };
            cmd_features(&io, config, metric)
        }

        Commands::Mmp {
            io,
            minutes,
            hr_threshold,
        } => {
            let config = load_config(io.config.as_deref())?;
            let metric = Metric::MaxMeanPower {
                window_minutes: minutes,
                hr_threshold,
            };
            cmd_features(&io, config, metric)
        }

        Commands::Trimp { io, weekly } => cmd_trimp(&io, weekly),

        Commands::Calibrate { io } => cmd_calibrate(&io),

        Commands::Schema { schema_type } => cmd_schema(schema_type),
    }
}

fn cmd_features(io: &IoArgs, config: PipelineConfig, metric: Metric) -> Result<(), RideCliError> {
    let provider = load_provider(io)?;
    let encoder = FeatureEncoder::new();
    let mut reports = Vec::new();

    for result in extract_features(&provider, &config, metric)? {
        let table = match result.outcome {
            Ok(table) => table,
            Err(e) if e.is_calibration_failure() => FeatureTable::new(metric),
            Err(e) => return Err(e.into()),
        };
        reports.push(encoder.encode_table(&result.athlete_id, &table, result.calibration));
    }

    info!(athletes = reports.len(), metric = metric.name(), "extraction finished");
    write_output(&io.output, &format_reports(&reports, &io.output_format)?)
}

fn cmd_trimp(io: &IoArgs, weekly: bool) -> Result<(), RideCliError> {
    let config = load_config(io.config.as_deref())?;
    let provider = load_provider(io)?;
    let encoder = FeatureEncoder::new();
    let mut reports = Vec::new();

    for athlete_id in provider.list_athletes() {
        let mut processor = AthleteProcessor::new(provider.get_athlete(&athlete_id)?, config.clone());
        let rows = match processor.process_trimp() {
            Ok(rows) => rows,
            Err(e) if e.is_calibration_failure() => {
                warn!(%athlete_id, error = %e, "athlete not calibrated");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let report = if weekly {
            encoder.encode_weekly_trimp(&athlete_id, &aggregate_weekly(&rows), processor.state())
        } else {
            encoder.encode_trimp(&athlete_id, &rows, processor.state())
        };
        reports.push(report);
    }

    write_output(&io.output, &format_reports(&reports, &io.output_format)?)
}

fn cmd_calibrate(io: &IoArgs) -> Result<(), RideCliError> {
    let config = load_config(io.config.as_deref())?;
    let provider = load_provider(io)?;
    let mut records = Vec::new();

    for athlete_id in provider.list_athletes() {
        let athlete = provider.get_athlete(&athlete_id)?;
        let gender = athlete.gender;
        let mut processor = AthleteProcessor::new(athlete, config.clone());

        match processor.calibrate() {
            Ok(_) => {}
            Err(e) if e.is_calibration_failure() => {}
            Err(e) => return Err(e.into()),
        }
        records.push(CalibrationRecord {
            athlete_id,
            gender,
            calibration: processor.state(),
        });
    }

    write_output(&io.output, &format_output(&records, &io.output_format)?)
}

fn cmd_schema(schema_type: SchemaType) -> Result<(), RideCliError> {
    let columns: Vec<String> = match schema_type {
        SchemaType::Hrr => Metric::Hrr {
            window_len: PipelineConfig::default().hrr.window_len,
        }
        .columns(),
        SchemaType::Mmp => Metric::MaxMeanPower {
            window_minutes: 5,
            hr_threshold: 0.85,
        }
        .columns(),
        SchemaType::Trimp => TRIMP_COLUMNS.iter().map(|c| c.to_string()).collect(),
        SchemaType::WeeklyTrimp => WEEKLY_TRIMP_COLUMNS.iter().map(|c| c.to_string()).collect(),
        SchemaType::Config => {
            println!("{}", PipelineConfig::default().to_json()?);
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&columns)?);
    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, RideCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), RideCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, RideCliError> {
    match path {
        Some(path) => Ok(PipelineConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn load_provider(io: &IoArgs) -> Result<InMemoryProvider, RideCliError> {
    let input_data = read_input(&io.input)?;
    let mut provider = match io.input_format {
        InputFormat::Ndjson => InMemoryProvider::from_ndjson(&input_data)?,
        InputFormat::Json => InMemoryProvider::from_json(&input_data)?,
    };

    if let Some(athlete_id) = &io.athlete {
        provider.retain_only(athlete_id)?;
    }
    if provider.is_empty() {
        return Err(RideCliError::NoAthletes);
    }
    Ok(provider)
}

fn format_reports(reports: &[FeatureReport], format: &OutputFormat) -> Result<String, RideCliError> {
    match format {
        OutputFormat::Ndjson => Ok(to_ndjson(reports)?),
        _ => format_output(reports, format),
    }
}

fn format_output<T: Serialize>(records: &[T], format: &OutputFormat) -> Result<String, RideCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

// Error types

#[derive(Debug)]
enum RideCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoAthletes,
}

impl From<io::Error> for RideCliError {
    fn from(e: io::Error) -> Self {
        RideCliError::Io(e)
    }
}

impl From<ComputeError> for RideCliError {
    fn from(e: ComputeError) -> Self {
        RideCliError::Compute(e)
    }
}

impl From<serde_json::Error> for RideCliError {
    fn from(e: serde_json::Error) -> Self {
        RideCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RideCliError> for CliError {
    fn from(e: RideCliError) -> Self {
        match e {
            RideCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RideCliError::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::InvalidParameter(_) => {
                        ("INVALID_PARAMETER", "Check command flags and the config file")
                    }
                    ComputeError::AthleteNotFound(_) => {
                        ("ATHLETE_NOT_FOUND", "List athlete ids in the input file")
                    }
                    ComputeError::ParseError(_) | ComputeError::JsonError(_) => {
                        ("PARSE_ERROR", "Ensure input is a JSON array or NDJSON of athletes")
                    }
                    _ => ("COMPUTE_ERROR", "Run with --verbose for details"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            RideCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RideCliError::NoAthletes => CliError {
                code: "NO_ATHLETES".to_string(),
                message: "No athletes found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct CalibrationRecord {
    athlete_id: String,
    gender: Gender,
    calibration: CalibrationState,
}
