//! dlog - Command-line interface for the discrete logger
//!
//! Commands:
//! - run: Replay NDJSON platform signals into a logger (streaming mode)
//! - backup: Run the once-a-day backup check
//! - doctor: Diagnose the log directory and backup state
//! - schema: Print the record or signal schema

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use discrete_logger::backup::BackupOutcome;
use discrete_logger::prefs::{BackupState, JsonFilePreferences};
use discrete_logger::signal::parse_line;
use discrete_logger::store::{ContentStore, FsContentStore};
use discrete_logger::types::{parse_log_contents, CSV_HEADER};
use discrete_logger::{DiscreteLogger, LoggerConfig, LoggerError, LOGGER_VERSION};

/// dlog - Discrete contact logger
#[derive(Parser)]
#[command(name = "dlog")]
#[command(version = LOGGER_VERSION)]
#[command(about = "Log labelled pointer contacts to a durable CSV file", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Root directory of the log store
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// JSON logger configuration (root is overridden by --root)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay NDJSON signals into the log (streaming mode)
    Run {
        #[command(flatten)]
        store: StoreArgs,

        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Run the daily backup check before reading signals
        #[arg(long)]
        backup: bool,
    },

    /// Run the daily backup check
    Backup {
        #[command(flatten)]
        store: StoreArgs,

        /// Check as if today were this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Diagnose the log store
    Doctor {
        #[command(flatten)]
        store: StoreArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// CSV log record
    Record,
    /// NDJSON platform signal
    Signal,
}

fn main() -> ExitCode {
    init_tracing();

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

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "discrete_logger=info,dlog=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<(), DlogError> {
    match cli.command {
        Commands::Run {
            store,
            input,
            backup,
        } => cmd_run(&store, &input, backup),
        Commands::Backup { store, date } => cmd_backup(&store, date),
        Commands::Doctor { store, json } => cmd_doctor(&store, json),
        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn load_config(args: &StoreArgs) -> Result<LoggerConfig, DlogError> {
    let mut config = match &args.config {
        Some(path) => LoggerConfig::from_json(&fs::read_to_string(path)?)?,
        None => LoggerConfig::default(),
    };
    if let Some(root) = &args.root {
        config.root_dir = root.clone();
    }
    config.validate()?;
    Ok(config)
}

fn cmd_run(args: &StoreArgs, input: &Path, backup: bool) -> Result<(), DlogError> {
    let config = load_config(args)?;
    let logger = DiscreteLogger::open(config)?;

    let backup = backup.then(|| logger.check_and_backup(Local::now()));

    let reader: Box<dyn BufRead> = if input.to_string_lossy() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(input)?))
    };

    let mut summary = RunSummary {
        instance_id: logger.instance_id().to_string(),
        signals: 0,
        accepted: 0,
        ignored: 0,
        pending: 0,
        backup,
    };

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let signal = parse_line(&line).map_err(|e| DlogError::Signal {
            line: index + 1,
            message: e.to_string(),
        })?;

        summary.signals += 1;
        if logger.dispatch(signal)? {
            summary.accepted += 1;
        } else {
            summary.ignored += 1;
        }
    }

    logger.flush()?;
    summary.pending = logger.pending_count();
    logger.shutdown();

    tracing::info!(
        signals = summary.signals,
        accepted = summary.accepted,
        pending = summary.pending,
        "replay finished"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_backup(args: &StoreArgs, date: Option<NaiveDate>) -> Result<(), DlogError> {
    let config = load_config(args)?;
    let logger = DiscreteLogger::open(config)?;

    let outcome = match date {
        Some(date) => logger.check_and_backup_on(date),
        None => logger.check_and_backup(Local::now()),
    };
    logger.flush()?;
    logger.shutdown();

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    match outcome {
        BackupOutcome::PrimaryUnavailable | BackupOutcome::WorkerUnavailable => {
            Err(DlogError::BackupFailed)
        }
        _ => Ok(()),
    }
}

fn cmd_doctor(args: &StoreArgs, json: bool) -> Result<(), DlogError> {
    let config = load_config(args)?;
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("discrete-logger {}", LOGGER_VERSION),
    });

    if config.root_dir.is_dir() {
        checks.push(DoctorCheck {
            name: "root".to_string(),
            status: CheckStatus::Ok,
            message: format!("Root directory {}", config.root_dir.display()),
        });
    } else {
        checks.push(DoctorCheck {
            name: "root".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "Root directory {} does not exist yet",
                config.root_dir.display()
            ),
        });
    }

    let store = FsContentStore::new(&config.root_dir);
    checks.push(check_primary_log(&store, &config));
    checks.push(check_last_backup(&config));
    checks.push(check_backups(&store, &config));

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
            message: "stdin is a pipe (replay ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        version: LOGGER_VERSION.to_string(),
        root: config.root_dir.display().to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("dlog Doctor Report");
        println!("==================");
        println!("Version: {}", report.version);
        println!("Root:    {}", report.root);
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(DlogError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_primary_log(store: &FsContentStore, config: &LoggerConfig) -> DoctorCheck {
    let name = "primary_log".to_string();
    let handle = match store.find(&config.log_file_name, &config.log_directory) {
        Ok(Some(handle)) => handle,
        Ok(None) => {
            return DoctorCheck {
                name,
                status: CheckStatus::Warning,
                message: "Primary log does not exist yet".to_string(),
            }
        }
        Err(e) => {
            return DoctorCheck {
                name,
                status: CheckStatus::Error,
                message: e.to_string(),
            }
        }
    };

    match fs::read_to_string(handle.location()) {
        Ok(contents) if contents.is_empty() => DoctorCheck {
            name,
            status: CheckStatus::Ok,
            message: format!("{} is empty", handle),
        },
        Ok(contents) if !contents.starts_with(CSV_HEADER) => DoctorCheck {
            name,
            status: CheckStatus::Error,
            message: format!("{} does not start with the expected header", handle),
        },
        Ok(contents) => match parse_log_contents(&contents) {
            Ok(records) => DoctorCheck {
                name,
                status: CheckStatus::Ok,
                message: format!(
                    "{} ({} bytes, {} records)",
                    handle,
                    contents.len(),
                    records.len()
                ),
            },
            Err(e) => DoctorCheck {
                name,
                status: CheckStatus::Warning,
                message: format!("{} has unreadable records: {}", handle, e),
            },
        },
        Err(e) => DoctorCheck {
            name,
            status: CheckStatus::Error,
            message: format!("Cannot read {}: {}", handle, e),
        },
    }
}

fn check_last_backup(config: &LoggerConfig) -> DoctorCheck {
    let name = "last_backup".to_string();
    let prefs = match JsonFilePreferences::open_strict(config.preferences_path()) {
        Ok(prefs) => prefs,
        Err(e) => {
            return DoctorCheck {
                name,
                status: CheckStatus::Warning,
                message: format!("{} (will be reset on the next backup check)", e),
            }
        }
    };

    match BackupState::new(Arc::new(prefs)).last_backup_date() {
        Ok(Some(date)) => DoctorCheck {
            name,
            status: CheckStatus::Ok,
            message: format!("Last backup check on {}", date),
        },
        Ok(None) => DoctorCheck {
            name,
            status: CheckStatus::Warning,
            message: "No backup check recorded".to_string(),
        },
        Err(e) => DoctorCheck {
            name,
            status: CheckStatus::Warning,
            message: format!("{} (next check will back up)", e),
        },
    }
}

fn check_backups(store: &FsContentStore, config: &LoggerConfig) -> DoctorCheck {
    let name = "backups".to_string();
    match store.list(&config.backup_directory()) {
        Ok(files) => DoctorCheck {
            name,
            status: CheckStatus::Ok,
            message: match files.last() {
                Some(latest) => format!("{} backup file(s), latest {}", files.len(), latest),
                None => "No backup files".to_string(),
            },
        },
        Err(e) => DoctorCheck {
            name,
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), DlogError> {
    match schema_type {
        SchemaType::Record => {
            if json_schema {
                println!("{}", get_record_json_schema());
            } else {
                println!("Record Schema: CSV, one record per line");
                println!();
                println!("{}", CSV_HEADER);
                println!();
                println!("- StartTimestamp: contact start, wall-clock milliseconds (int64)");
                println!("- Duration(ms): contact length in milliseconds (int64, >= 0)");
                println!("- PeakPressure: peak ambient reading while in contact (float)");
                println!("- CustomText: user label, written verbatim (no quoting)");
                println!();
                println!("The header is written once, when the file is first appended to.");
            }
        }
        SchemaType::Signal => {
            if json_schema {
                println!("{}", get_signal_json_schema());
            } else {
                println!("Signal Schema: NDJSON, one object per line, tagged by \"signal\"");
                println!();
                println!("- ambient:     {{ value }}");
                println!("- begin:       {{ id, ts }}");
                println!("- sample:      {{ id, value }}");
                println!("- move:        {{}}");
                println!("- end:         {{ id, ts }}");
                println!("- cancel:      {{ id }}");
                println!("- interactive: {{ on }}");
                println!("- label:       {{ text }}");
            }
        }
    }
    Ok(())
}

fn get_record_json_schema() -> String {
    serde_json::json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "TapEvent",
        "type": "object",
        "required": ["start_timestamp", "duration", "peak_scalar"],
        "properties": {
            "start_timestamp": { "type": "integer" },
            "duration": { "type": "integer", "minimum": 0 },
            "peak_scalar": { "type": "number" },
            "label": { "type": "string" }
        }
    })
    .to_string()
}

fn get_signal_json_schema() -> String {
    let variant = |name: &str, mut properties: serde_json::Value, required: &[&str]| {
        properties["signal"] = serde_json::json!({ "const": name });
        let mut required_fields = vec!["signal"];
        required_fields.extend_from_slice(required);
        serde_json::json!({
            "type": "object",
            "required": required_fields,
            "properties": properties
        })
    };
    let id = serde_json::json!({ "type": "integer" });
    let ts = serde_json::json!({ "type": "integer" });
    let value = serde_json::json!({ "type": "number" });

    serde_json::json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "Signal",
        "oneOf": [
            variant("ambient", serde_json::json!({ "value": value }), &["value"]),
            variant("begin", serde_json::json!({ "id": id, "ts": ts }), &["id", "ts"]),
            variant("sample", serde_json::json!({ "id": id, "value": value }), &["id", "value"]),
            variant("move", serde_json::json!({}), &[]),
            variant("end", serde_json::json!({ "id": id, "ts": ts }), &["id", "ts"]),
            variant("cancel", serde_json::json!({ "id": id }), &["id"]),
            variant("interactive", serde_json::json!({ "on": { "type": "boolean" } }), &["on"]),
            variant("label", serde_json::json!({ "text": { "type": "string" } }), &["text"]),
        ]
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum DlogError {
    Io(io::Error),
    Logger(LoggerError),
    Json(serde_json::Error),
    Signal { line: usize, message: String },
    BackupFailed,
    DoctorFailed,
}

impl From<io::Error> for DlogError {
    fn from(e: io::Error) -> Self {
        DlogError::Io(e)
    }
}

impl From<LoggerError> for DlogError {
    fn from(e: LoggerError) -> Self {
        DlogError::Logger(e)
    }
}

impl From<serde_json::Error> for DlogError {
    fn from(e: serde_json::Error) -> Self {
        DlogError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<DlogError> for CliError {
    fn from(e: DlogError) -> Self {
        match e {
            DlogError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            DlogError::Logger(LoggerError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Names must be single path components; directories must be relative".to_string()),
            },
            DlogError::Logger(e) => CliError {
                code: "LOGGER_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'dlog doctor' for details".to_string()),
            },
            DlogError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            DlogError::Signal { line, message } => CliError {
                code: "SIGNAL_ERROR".to_string(),
                message: format!("line {}: {}", line, message),
                hint: Some("Run 'dlog schema signal' for the expected format".to_string()),
            },
            DlogError::BackupFailed => CliError {
                code: "BACKUP_FAILED".to_string(),
                message: "Backup could not be queued".to_string(),
                hint: Some("The day is still marked; run 'dlog doctor' to inspect the store".to_string()),
            },
            DlogError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct RunSummary {
    instance_id: String,
    signals: usize,
    accepted: usize,
    ignored: usize,
    pending: usize,
    backup: Option<BackupOutcome>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    root: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
