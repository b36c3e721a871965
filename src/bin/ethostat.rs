//! Ethostat CLI - Command-line interface for Ethostat
//!
//! Commands:
//! - analyze: Analyze a batch of annotation files and export the summary table
//! - validate: Parse annotation files and report dropped rows
//! - config: Inspect and edit the metrics configuration

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ethostat::config::{LatencyMetric, MetricsConfig, TotalTimeMetric};
use ethostat::types::{session_id_for, IntervalResult, RowIssue, SessionResult};
use ethostat::{AnalysisError, Analyzer, AnnotationLoader, ETHOSTAT_VERSION};

/// Ethostat - Batch analysis of behavioral-event annotations
#[derive(Parser)]
#[command(name = "ethostat")]
#[command(version = ETHOSTAT_VERSION)]
#[command(about = "Compute durations, latencies and total times from annotation files", long_about = None)]
struct Cli {
    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze annotation files and export the summary table
    Analyze {
        /// Annotation files (CSV)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Metrics configuration file (JSON); built-in defaults when absent
        #[arg(long)]
        config: Option<PathBuf>,

        /// Break each session into windows of this many minutes
        #[arg(long)]
        interval_minutes: Option<f64>,

        /// Session length in seconds, overriding the per-file value
        #[arg(long)]
        test_duration: Option<f64>,

        /// Output CSV path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Print the results as JSON instead of the CSV table
        #[arg(long)]
        json: bool,
    },

    /// Parse annotation files and report dropped rows
    Validate {
        /// Annotation files (CSV)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect and edit the metrics configuration
    Config {
        /// Metrics configuration file (JSON)
        #[arg(long, global = true)]
        config: Option<PathBuf>,

        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the configuration (defaults when no file is given)
    Show,

    /// Write the default configuration to the file
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Add a latency metric
    AddLatency {
        /// Metric name (column header)
        #[arg(long)]
        name: String,

        /// Behavior whose first occurrence is measured
        #[arg(long)]
        behavior: String,

        /// Store the metric disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Add a total-time metric
    AddTotalTime {
        /// Metric name (column header)
        #[arg(long)]
        name: String,

        /// Behaviors whose union is measured (comma separated)
        #[arg(long, value_delimiter = ',', required = true)]
        behaviors: Vec<String>,

        /// Store the metric disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Remove a latency metric
    RemoveLatency {
        /// Metric name
        name: String,
    },

    /// Remove a total-time metric
    RemoveTotalTime {
        /// Metric name
        name: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

fn run(cli: Cli) -> Result<(), EthostatCliError> {
    match cli.command {
        Commands::Analyze {
            files,
            config,
            interval_minutes,
            test_duration,
            output,
            json,
        } => cmd_analyze(
            &files,
            config.as_deref(),
            interval_minutes,
            test_duration,
            &output,
            json,
        ),

        Commands::Validate { files, json } => cmd_validate(&files, json),

        Commands::Config { config, action } => cmd_config(config.as_deref(), action),
    }
}

fn cmd_analyze(
    files: &[PathBuf],
    config: Option<&Path>,
    interval_minutes: Option<f64>,
    test_duration: Option<f64>,
    output: &Path,
    json: bool,
) -> Result<(), EthostatCliError> {
    let metrics_config = load_metrics_config(config)?;

    let mut analyzer = Analyzer::with_metrics_config(metrics_config);
    analyzer.set_interval_minutes(interval_minutes)?;
    analyzer.set_test_duration_override(test_duration)?;

    let report = analyzer.load_files(files);
    let failures: Vec<FileFailure> = report
        .failures()
        .map(|(path, e)| FileFailure {
            path: path.to_string(),
            code: e.code().to_string(),
            error: e.to_string(),
        })
        .collect();

    if !report.is_success() {
        return Err(EthostatCliError::NoFilesLoaded(failures.len()));
    }

    if json {
        let analysis = AnalysisReport {
            version: ETHOSTAT_VERSION.to_string(),
            behaviors: analyzer.catalog().snapshot(),
            results: analyzer.results().to_vec(),
            interval_results: analyzer.interval_results().to_vec(),
            failures,
        };
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    let mode = analyzer.default_export_mode();
    if output.to_string_lossy() == "-" {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        analyzer.export_to_writer(&mut handle, mode)?;
        handle.flush()?;
    } else {
        analyzer.export(output, mode)?;
    }

    for failure in &failures {
        eprintln!("Skipped {}: {}", failure.path, failure.error);
    }

    Ok(())
}

fn cmd_validate(files: &[PathBuf], json: bool) -> Result<(), EthostatCliError> {
    let mut reports = Vec::with_capacity(files.len());

    for path in files {
        let parsed = fs::read_to_string(path)
            .map_err(AnalysisError::from)
            .and_then(|content| AnnotationLoader::parse(&content));

        let report = match parsed {
            Ok(set) => FileValidation {
                path: path.display().to_string(),
                session_id: session_id_for(path),
                event_count: set.events().len(),
                has_summary: set.summary().is_some(),
                row_issues: set.row_issues().to_vec(),
                error: None,
            },
            Err(e) => FileValidation {
                path: path.display().to_string(),
                session_id: session_id_for(path),
                event_count: 0,
                has_summary: false,
                row_issues: Vec::new(),
                error: Some(e.to_string()),
            },
        };
        reports.push(report);
    }

    let report = ValidationReport {
        total_files: reports.len(),
        invalid_files: reports.iter().filter(|r| r.error.is_some()).count(),
        dropped_rows: reports.iter().map(|r| r.row_issues.len()).sum(),
        files: reports,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total files:   {}", report.total_files);
        println!("Invalid files: {}", report.invalid_files);
        println!("Dropped rows:  {}", report.dropped_rows);

        for file in &report.files {
            println!();
            match &file.error {
                Some(error) => println!("  [ERR] {}: {}", file.path, error),
                None => println!(
                    "  [OK] {}: {} events, summary: {}",
                    file.path,
                    file.event_count,
                    if file.has_summary { "yes" } else { "no" }
                ),
            }
            for issue in &file.row_issues {
                println!("    - {}", AnalysisError::from(issue));
            }
        }
    }

    if report.invalid_files > 0 || report.dropped_rows > 0 {
        Err(EthostatCliError::ValidationFailed {
            files: report.invalid_files,
            rows: report.dropped_rows,
        })
    } else {
        Ok(())
    }
}

fn cmd_config(path: Option<&Path>, action: ConfigAction) -> Result<(), EthostatCliError> {
    match action {
        ConfigAction::Show => {
            let config = load_metrics_config(path)?;
            println!("{}", config.to_json()?);
            Ok(())
        }

        ConfigAction::Init { force } => {
            let path = path.ok_or(EthostatCliError::ConfigPathRequired)?;
            if path.exists() && !force {
                return Err(EthostatCliError::ConfigExists(path.display().to_string()));
            }
            MetricsConfig::default().save(path)?;
            println!("Wrote default metrics configuration to {}", path.display());
            Ok(())
        }

        ConfigAction::AddLatency {
            name,
            behavior,
            disabled,
        } => {
            let mut metric = LatencyMetric::new(name, behavior);
            if disabled {
                metric = metric.disabled();
            }
            edit_config(path, |config| config.add_latency_metric(metric))
        }

        ConfigAction::AddTotalTime {
            name,
            behaviors,
            disabled,
        } => {
            let mut metric = TotalTimeMetric::new(name, behaviors.iter().map(|b| b.trim()));
            if disabled {
                metric = metric.disabled();
            }
            edit_config(path, |config| config.add_total_time_metric(metric))
        }

        ConfigAction::RemoveLatency { name } => {
            edit_config(path, |config| config.remove_latency_metric(&name).map(|_| ()))
        }

        ConfigAction::RemoveTotalTime { name } => {
            edit_config(path, |config| config.remove_total_time_metric(&name).map(|_| ()))
        }
    }
}

// Helper functions

fn load_metrics_config(path: Option<&Path>) -> Result<MetricsConfig, EthostatCliError> {
    match path {
        Some(path) if path.exists() => Ok(MetricsConfig::load(path)?),
        Some(path) => {
            log::warn!(
                "Metrics configuration {} not found, using defaults",
                path.display()
            );
            Ok(MetricsConfig::default())
        }
        None => Ok(MetricsConfig::default()),
    }
}

/// Load (or default) the configuration at `path`, apply `edit` and save it back
fn edit_config<F>(path: Option<&Path>, edit: F) -> Result<(), EthostatCliError>
where
    F: FnOnce(&mut MetricsConfig) -> Result<(), AnalysisError>,
{
    let path = path.ok_or(EthostatCliError::ConfigPathRequired)?;
    let mut config = load_metrics_config(Some(path))?;
    edit(&mut config)?;
    config.save(path)?;
    println!("{}", config.to_json()?);
    Ok(())
}

// Report types

#[derive(serde::Serialize)]
struct AnalysisReport {
    version: String,
    behaviors: Vec<String>,
    results: Vec<SessionResult>,
    interval_results: Vec<IntervalResult>,
    failures: Vec<FileFailure>,
}

#[derive(serde::Serialize)]
struct FileFailure {
    path: String,
    code: String,
    error: String,
}

#[derive(serde::Serialize)]
struct ValidationReport {
    total_files: usize,
    invalid_files: usize,
    dropped_rows: usize,
    files: Vec<FileValidation>,
}

#[derive(serde::Serialize)]
struct FileValidation {
    path: String,
    session_id: String,
    event_count: usize,
    has_summary: bool,
    row_issues: Vec<RowIssue>,
    error: Option<String>,
}

// Error handling

#[derive(Debug)]
enum EthostatCliError {
    Io(io::Error),
    Analysis(AnalysisError),
    Json(serde_json::Error),
    NoFilesLoaded(usize),
    ValidationFailed { files: usize, rows: usize },
    ConfigPathRequired,
    ConfigExists(String),
}

impl From<io::Error> for EthostatCliError {
    fn from(e: io::Error) -> Self {
        EthostatCliError::Io(e)
    }
}

impl From<AnalysisError> for EthostatCliError {
    fn from(e: AnalysisError) -> Self {
        EthostatCliError::Analysis(e)
    }
}

impl From<serde_json::Error> for EthostatCliError {
    fn from(e: serde_json::Error) -> Self {
        EthostatCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<EthostatCliError> for CliError {
    fn from(e: EthostatCliError) -> Self {
        match e {
            EthostatCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            EthostatCliError::Analysis(e) => {
                let hint = match &e {
                    AnalysisError::Parse(_) | AnalysisError::Validation { .. } => {
                        Some("Run 'ethostat validate' for details".to_string())
                    }
                    AnalysisError::Config(_) | AnalysisError::Json(_) => {
                        Some("Run 'ethostat config show' to inspect the configuration".to_string())
                    }
                    AnalysisError::Io(_) => Some("Check file paths and permissions".to_string()),
                    AnalysisError::Csv(_) => None,
                };
                CliError {
                    code: e.code().to_string(),
                    message: e.to_string(),
                    hint,
                }
            }
            EthostatCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            EthostatCliError::NoFilesLoaded(count) => CliError {
                code: "NO_FILES_LOADED".to_string(),
                message: format!("None of the input files could be loaded ({} failed)", count),
                hint: Some("Run 'ethostat validate' on the inputs".to_string()),
            },
            EthostatCliError::ValidationFailed { files, rows } => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} files failed to parse, {} rows dropped", files, rows),
                hint: Some("Fix the reported rows and retry".to_string()),
            },
            EthostatCliError::ConfigPathRequired => CliError {
                code: "CONFIG_PATH_REQUIRED".to_string(),
                message: "This command needs a configuration file".to_string(),
                hint: Some("Pass --config <path>".to_string()),
            },
            EthostatCliError::ConfigExists(path) => CliError {
                code: "CONFIG_EXISTS".to_string(),
                message: format!("{} already exists", path),
                hint: Some("Use --force to overwrite".to_string()),
            },
        }
    }
}
