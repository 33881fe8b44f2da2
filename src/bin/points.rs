//! Points CLI - Command-line interface for FitBank points ingestion
//!
//! Commands:
//! - ingest: Validate, score and persist a heart-rate or steps batch
//! - validate: Validate a batch without touching the record store
//! - history: Print a participant's persisted records
//! - doctor: Diagnose store, settings and configuration files
//! - schema: Print the accepted request shapes

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use fitbank_points::pipeline::PointsProcessor;
use fitbank_points::schema::PayloadAdapter;
use fitbank_points::settings::{resolve_thresholds, StaticSettings};
use fitbank_points::store::{MemoryRecordStore, RecordStore};
use fitbank_points::types::{BatchResponse, SeriesKind, StoredRecord};
use fitbank_points::{IngestError, PipelineConfig, INGEST_VERSION, PRODUCER_NAME};

/// Points - Wearable sample normalization and zone scoring
#[derive(Parser)]
#[command(name = "points")]
#[command(author = "FitBank Challenge maintainers")]
#[command(version = INGEST_VERSION)]
#[command(about = "Normalize and score wearable heart-rate and step batches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate, score and persist a batch
    Ingest {
        /// Series carried by the batch
        #[arg(value_enum)]
        series: Series,

        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Record store snapshot, created if missing and saved after the batch
        #[arg(long)]
        store: PathBuf,

        /// Settings document holding z1, z2 and z3
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Pipeline configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "json")]
        output_format: OutputFormat,
    },

    /// Validate a batch without persisting it
    Validate {
        #[arg(value_enum)]
        series: Series,

        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a participant's persisted records, newest first
    History {
        #[arg(value_enum)]
        series: Series,

        /// Participant username
        #[arg(short, long)]
        username: String,

        /// Record store snapshot
        #[arg(long)]
        store: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose store, settings and configuration files
    Doctor {
        #[arg(long)]
        store: Option<PathBuf>,

        #[arg(long)]
        settings: Option<PathBuf>,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the accepted request shapes
    Schema {
        #[arg(value_enum)]
        series: Series,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Series {
    /// Heart-rate batch (bpm readings)
    HeartRate,
    /// Steps batch (step counts)
    Steps,
}

impl From<Series> for SeriesKind {
    fn from(series: Series) -> Self {
        match series {
            Series::HeartRate => SeriesKind::HeartRate,
            Series::Steps => SeriesKind::Steps,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// A single JSON request body
    Json,
    /// Newline-delimited JSON (one entry per line)
    Ndjson,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

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

fn run(cli: Cli) -> Result<(), PointsCliError> {
    match cli.command {
        Commands::Ingest {
            series,
            input,
            input_format,
            store,
            settings,
            config,
            output_format,
        } => cmd_ingest(
            series.into(),
            &input,
            input_format,
            &store,
            settings.as_deref(),
            config.as_deref(),
            output_format,
        ),

        Commands::Validate {
            series,
            input,
            input_format,
            json,
        } => cmd_validate(series.into(), &input, input_format, json),

        Commands::History {
            series,
            username,
            store,
            json,
        } => cmd_history(series.into(), &username, &store, json),

        Commands::Doctor {
            store,
            settings,
            config,
            json,
        } => cmd_doctor(store.as_deref(), settings.as_deref(), config.as_deref(), json),

        Commands::Schema { series, json_schema } => cmd_schema(series.into(), json_schema),
    }
}

fn cmd_ingest(
    kind: SeriesKind,
    input: &Path,
    input_format: InputFormat,
    store_path: &Path,
    settings_path: Option<&Path>,
    config_path: Option<&Path>,
    output_format: OutputFormat,
) -> Result<(), PointsCliError> {
    let body = read_body(input, &input_format)?;

    let processor = match config_path {
        Some(path) => PointsProcessor::from_config_json(&fs::read_to_string(path)?)?,
        None => PointsProcessor::new(),
    };
    let settings = load_settings(settings_path)?;
    let store = load_store(store_path)?;

    let response = processor.handle(kind, &body, &store, &settings);

    fs::write(store_path, store.to_json().map_err(IngestError::from)?)?;

    println!("{}", format_response(&response, &output_format)?);

    if response.is_success() {
        Ok(())
    } else {
        Err(PointsCliError::Rejected(response.status))
    }
}

fn cmd_validate(
    kind: SeriesKind,
    input: &Path,
    input_format: InputFormat,
    json: bool,
) -> Result<(), PointsCliError> {
    let body = read_body(input, &input_format)?;
    let value: serde_json::Value = serde_json::from_str(&body)?;

    let failures = PayloadAdapter::validate_entries(&value, kind);
    let total = PayloadAdapter::entry_count(&value, kind);

    let report = ValidationReport {
        series: kind.as_str().to_string(),
        total_entries: total,
        valid_entries: total.saturating_sub(failures.len()),
        invalid_entries: failures.len(),
        errors: failures
            .iter()
            .map(|f| ValidationErrorDetail {
                index: f.index,
                error: f.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report ({})", report.series);
        println!("=================");
        println!("Total entries:   {}", report.total_entries);
        println!("Valid entries:   {}", report.valid_entries);
        println!("Invalid entries: {}", report.invalid_entries);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Entry {}: {}", err.index, err.error);
            }
        }
    }

    if report.invalid_entries > 0 {
        Err(PointsCliError::ValidationFailed(report.invalid_entries))
    } else {
        Ok(())
    }
}

fn cmd_history(kind: SeriesKind, username: &str, store_path: &Path, json: bool) -> Result<(), PointsCliError> {
    let store = MemoryRecordStore::from_json(&fs::read_to_string(store_path)?).map_err(IngestError::from)?;
    let records: Vec<StoredRecord> = store.records_for(kind, username).map_err(IngestError::from)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let total: i64 = records.iter().map(|r| r.points).sum();
    println!("{} history for {}", kind.label(), username);
    println!("Records: {}  Points: {}", records.len(), total);
    for record in &records {
        println!(
            "  {}  {:>6} {}  {} pts",
            record.timestamp.to_rfc3339(),
            record.value,
            kind.value_field(),
            record.points
        );
    }

    Ok(())
}

fn cmd_doctor(
    store: Option<&Path>,
    settings: Option<&Path>,
    config: Option<&Path>,
    json: bool,
) -> Result<(), PointsCliError> {
    let mut checks: Vec<DoctorCheck> = vec![DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} version {}", PRODUCER_NAME, INGEST_VERSION),
    }];

    if let Some(path) = store {
        checks.push(check_file(path, "store", |content| {
            let store = MemoryRecordStore::from_json(content).map_err(|e| e.to_string())?;
            let heart_rate = store.len(SeriesKind::HeartRate).map_err(|e| e.to_string())?;
            let steps = store.len(SeriesKind::Steps).map_err(|e| e.to_string())?;
            Ok((
                CheckStatus::Ok,
                format!("Store snapshot valid ({heart_rate} heart-rate rows, {steps} step rows)"),
            ))
        }));
    }

    if let Some(path) = settings {
        checks.push(check_file(path, "settings", |content| {
            let settings = StaticSettings::from_json(content).map_err(|e| e.to_string())?;
            let resolution = resolve_thresholds(&settings);
            let t = resolution.thresholds;
            if resolution.used_defaults() {
                Ok((
                    CheckStatus::Warning,
                    format!("Zone thresholds fall back to defaults ({}/{}/{})", t.z1, t.z2, t.z3),
                ))
            } else {
                Ok((CheckStatus::Ok, format!("Zone thresholds {}/{}/{}", t.z1, t.z2, t.z3)))
            }
        }));
    }

    if let Some(path) = config {
        checks.push(check_file(path, "config", |content| {
            let config = PipelineConfig::from_json(content).map_err(|e| e.to_string())?;
            Ok((
                CheckStatus::Ok,
                format!(
                    "Max interpolation gap {} min, watermark prefilter {}",
                    config.max_interpolation_gap_minutes,
                    if config.watermark_prefilter { "on" } else { "off" }
                ),
            ))
        }));
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (`--input -` ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: INGEST_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Points Doctor Report");
        println!("====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(PointsCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(kind: SeriesKind, json_schema: bool) -> Result<(), PointsCliError> {
    let field = kind.value_field();

    if json_schema {
        println!("{}", serde_json::to_string_pretty(&input_json_schema(kind))?);
        return Ok(());
    }

    println!("{} batch", kind.label());
    println!();
    println!("1. Parallel lists (single user)");
    println!("   {{ \"username\": string,");
    println!("     \"timestamp\": newline-separated ISO-8601 instants,");
    println!("     \"{field}\": number or newline-separated numeric strings }}");
    println!();
    println!("2. Array of entries (any number of users)");
    println!("   [ {{ \"username\": string, \"timestamp\": ISO-8601, \"{field}\": number or numeric string }} ]");
    println!();
    match kind {
        SeriesKind::HeartRate => {
            println!("Readings are averaged per minute; gaps up to 5 minutes are interpolated.");
            println!("Points per minute: 0 below z1, 1 from z1, 2 from z2, 3 from z3.");
        }
        SeriesKind::Steps => {
            println!("Counts are summed per hour; one point per 200 steps.");
            println!("A resubmitted hour keeps the higher count.");
        }
    }

    Ok(())
}

// Helper functions

fn read_body(input: &Path, format: &InputFormat) -> Result<String, PointsCliError> {
    let data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    match format {
        InputFormat::Json => Ok(data),
        InputFormat::Ndjson => Ok(PayloadAdapter::ndjson_to_value(&data)?.to_string()),
    }
}

fn load_store(path: &Path) -> Result<MemoryRecordStore, PointsCliError> {
    if !path.exists() {
        log::info!("store snapshot {} not found, starting empty", path.display());
        return Ok(MemoryRecordStore::new());
    }
    Ok(MemoryRecordStore::from_json(&fs::read_to_string(path)?).map_err(IngestError::from)?)
}

fn load_settings(path: Option<&Path>) -> Result<StaticSettings, PointsCliError> {
    match path {
        Some(path) => StaticSettings::from_json(&fs::read_to_string(path)?)
            .map_err(|e| PointsCliError::Settings(e.to_string())),
        None => Ok(StaticSettings::new()),
    }
}

fn format_response(response: &BatchResponse, format: &OutputFormat) -> Result<String, PointsCliError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(response)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(response)?),
    }
}

fn check_file(
    path: &Path,
    name: &str,
    inspect: impl FnOnce(&str) -> Result<(CheckStatus, String), String>,
) -> DoctorCheck {
    let (status, message) = if !path.exists() {
        (CheckStatus::Warning, format!("{} file does not exist", name))
    } else {
        match fs::read_to_string(path) {
            Ok(content) => match inspect(&content) {
                Ok(result) => result,
                Err(e) => (CheckStatus::Error, format!("Invalid {} file: {}", name, e)),
            },
            Err(e) => (CheckStatus::Error, format!("Cannot read {} file: {}", name, e)),
        }
    };

    DoctorCheck {
        name: name.to_string(),
        status,
        message,
    }
}

fn input_json_schema(kind: SeriesKind) -> serde_json::Value {
    let field = kind.value_field();
    let reading = serde_json::json!({ "type": ["integer", "number", "string"] });

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": format!("{}.batch", kind.as_str()),
        "oneOf": [
            {
                "type": "object",
                "required": ["username", "timestamp", field],
                "properties": {
                    "username": { "type": "string", "minLength": 1 },
                    "timestamp": { "type": "string", "description": "newline-separated ISO-8601 instants" },
                    field: reading
                }
            },
            {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["username", "timestamp", field],
                    "properties": {
                        "username": { "type": "string", "minLength": 1 },
                        "timestamp": { "type": "string", "format": "date-time" },
                        field: reading
                    }
                }
            }
        ]
    })
}

// Error types

#[derive(Debug)]
enum PointsCliError {
    Io(io::Error),
    Ingest(IngestError),
    Json(serde_json::Error),
    Settings(String),
    Rejected(u16),
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for PointsCliError {
    fn from(e: io::Error) -> Self {
        PointsCliError::Io(e)
    }
}

impl From<IngestError> for PointsCliError {
    fn from(e: IngestError) -> Self {
        PointsCliError::Ingest(e)
    }
}

impl From<serde_json::Error> for PointsCliError {
    fn from(e: serde_json::Error) -> Self {
        PointsCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PointsCliError> for CliError {
    fn from(e: PointsCliError) -> Self {
        match e {
            PointsCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PointsCliError::Ingest(e) => CliError {
                code: "INGEST_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the store snapshot and configuration files".to_string()),
            },
            PointsCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PointsCliError::Settings(msg) => CliError {
                code: "SETTINGS_ERROR".to_string(),
                message: msg,
                hint: Some("Settings must be a flat JSON object".to_string()),
            },
            PointsCliError::Rejected(status) => CliError {
                code: "BATCH_REJECTED".to_string(),
                message: format!("Batch finished with status {}", status),
                hint: Some("Run 'points validate' for details".to_string()),
            },
            PointsCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} entries failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            PointsCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    series: String,
    total_entries: usize,
    valid_entries: usize,
    invalid_entries: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
