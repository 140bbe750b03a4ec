//! pagevitals CLI - Command-line interface for the page metrics engine
//!
//! Commands:
//! - replay: Replay a recorded page session and print the metric report
//! - validate: Validate trace event schema
//! - doctor: Diagnose engine health and configuration
//! - schema: Print schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use pagevitals::config::VitalsConfig;
use pagevitals::replay::{replay_trace, ReplayOptions, ReplayReport, TraceReplayer};
use pagevitals::schema::{TraceAdapter, TraceEvent, TRACE_SCHEMA_VERSION};
use pagevitals::types::{EntryCategory, MetricName, RawEntry, FIRST_CONTENTFUL_PAINT};
use pagevitals::{ENGINE_VERSION, PRODUCER_NAME};

/// pagevitals - Deterministic compute engine for page performance metrics
#[derive(Parser)]
#[command(name = "pagevitals")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Compute CLS, INP, LCP, FCP, FID and TTFB from recorded page sessions", long_about = None)]
struct Cli {
    /// Enable debug logging and engine warnings
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded page session trace
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "auto")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Engine configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Metrics to compute, comma separated (default: all)
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,

        /// Entry categories the simulated host does not support, comma separated
        #[arg(long, value_delimiter = ',')]
        unsupported: Vec<String>,

        /// Simulate a host without idle callbacks
        #[arg(long)]
        no_idle: bool,

        /// Leave the page visible after the last event
        #[arg(long)]
        keep_visible: bool,

        /// Instance ID for provenance tracking (default: random UUID)
        #[arg(long)]
        instance_id: Option<String>,
    },

    /// Validate trace event schema
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "auto")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose engine health and configuration
    Doctor {
        /// Check a configuration file
        #[arg(long)]
        config: Option<PathBuf>,

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
enum InputFormat {
    /// JSON array if the input starts with `[`, NDJSON otherwise
    Auto,
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON report
    Json,
    /// Pretty-printed JSON report
    JsonPretty,
    /// One metric report per line
    Ndjson,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (pagevitals.trace.v1)
    Trace,
    /// Output schema (replay report)
    Report,
    /// Engine configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

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

fn init_tracing(debug: bool) {
    let default_level = if debug { "pagevitals=debug" } else { "pagevitals=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), PageVitalsCliError> {
    let debug = cli.debug;
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            config,
            metrics,
            unsupported,
            no_idle,
            keep_visible,
            instance_id,
        } => {
            let mut config = match config {
                Some(path) => VitalsConfig::from_json(&fs::read_to_string(path)?)?,
                None => VitalsConfig::default(),
            };
            if !metrics.is_empty() {
                config = config.with_metrics(&parse_metrics(&metrics)?);
            }
            if debug {
                config = config.with_debug(true);
            }

            let mut options = ReplayOptions::default()
                .with_config(config)
                .with_unsupported(&parse_categories(&unsupported)?)
                .with_hide_at_end(!keep_visible);
            options.idle_supported = !no_idle;

            cmd_replay(
                &input,
                &output,
                input_format,
                output_format,
                options,
                instance_id,
            )
        }

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn parse_metrics(names: &[String]) -> Result<Vec<MetricName>, PageVitalsCliError> {
    names
        .iter()
        .map(|name| {
            MetricName::parse(name)
                .ok_or_else(|| PageVitalsCliError::UnknownName(format!("metric {}", name)))
        })
        .collect()
}

fn parse_categories(names: &[String]) -> Result<Vec<EntryCategory>, PageVitalsCliError> {
    names
        .iter()
        .map(|name| {
            EntryCategory::parse(name)
                .ok_or_else(|| PageVitalsCliError::UnknownName(format!("entry category {}", name)))
        })
        .collect()
}

fn read_input(input: &Path) -> Result<String, PageVitalsCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_events(input: &str, format: &InputFormat) -> Result<Vec<TraceEvent>, PageVitalsCliError> {
    let events = match format {
        InputFormat::Auto => TraceAdapter::parse(input)?,
        InputFormat::Ndjson => TraceAdapter::parse_ndjson(input)?,
        InputFormat::Json => TraceAdapter::parse_array(input)?,
    };
    Ok(events)
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    options: ReplayOptions,
    instance_id: Option<String>,
) -> Result<(), PageVitalsCliError> {
    let input_data = read_input(input)?;
    let events = parse_events(&input_data, &input_format)?;

    if events.is_empty() {
        return Err(PageVitalsCliError::NoEvents);
    }

    let report = match instance_id {
        Some(id) => {
            let mut replayer = TraceReplayer::with_instance_id(options, id)?;
            replayer.apply_all(&events)?;
            replayer.finish()
        }
        None => replay_trace(&events, options)?,
    };
    tracing::debug!(
        events = report.events_replayed,
        reports = report.reports.len(),
        "replay finished"
    );

    let output_data = format_output(&report, &output_format)?;

    if output.to_string_lossy() == "-" {
        println!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn format_output(report: &ReplayReport, format: &OutputFormat) -> Result<String, PageVitalsCliError> {
    match format {
        OutputFormat::Json => Ok(report.to_json()?),
        OutputFormat::JsonPretty => Ok(report.to_json_pretty()?),
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for metric in &report.reports {
                lines.push(serde_json::to_string(metric)?);
            }
            Ok(lines.join("\n"))
        }
    }
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    json: bool,
) -> Result<(), PageVitalsCliError> {
    let input_data = read_input(input)?;
    let events = parse_events(&input_data, &input_format)?;

    let results = TraceAdapter::validate_events(&events);

    let report = ValidationReport {
        schema_version: TRACE_SCHEMA_VERSION.to_string(),
        total_events: events.len(),
        valid_events: events.len() - results.len(),
        invalid_events: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                kind: r.kind.to_string(),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report ({})", report.schema_version);
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Event {} ({}): {}", err.index, err.kind, err.error);
            }
        }
    }

    if report.invalid_events > 0 {
        Err(PageVitalsCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

/// Replays a tiny built-in session and checks the paint and shift metrics come out
fn self_test() -> Result<(), String> {
    let events = vec![
        TraceEvent::entry(RawEntry::paint(FIRST_CONTENTFUL_PAINT, 250.0)),
        TraceEvent::entry(RawEntry::layout_shift(300.0, 0.05, false)),
        TraceEvent::Hidden { at: Some(1000.0) },
    ];
    let report = replay_trace(&events, ReplayOptions::default()).map_err(|e| e.to_string())?;
    match (report.metrics.fcp, report.metrics.cls) {
        (Some(fcp), Some(cls)) if fcp == 250.0 && cls == 0.05 => Ok(()),
        (fcp, cls) => Err(format!("unexpected metrics FCP={:?} CLS={:?}", fcp, cls)),
    }
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), PageVitalsCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("pagevitals version {}", ENGINE_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Input schema: {}", TRACE_SCHEMA_VERSION),
    });

    if let Some(config_path) = config {
        if config_path.exists() {
            let check = match fs::read_to_string(config_path) {
                Ok(content) => match VitalsConfig::from_json(&content) {
                    Ok(config) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Config valid ({} metrics enabled)",
                            config.metrics.len()
                        ),
                    },
                    Err(e) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Invalid config: {}", e),
                    },
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read config file: {}", e),
                },
            };
            checks.push(check);
        } else {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Config file does not exist".to_string(),
            });
        }
    }

    checks.push(match self_test() {
        Ok(()) => DoctorCheck {
            name: "self_test".to_string(),
            status: CheckStatus::Ok,
            message: "Built-in session replayed with expected metrics".to_string(),
        },
        Err(e) => DoctorCheck {
            name: "self_test".to_string(),
            status: CheckStatus::Error,
            message: e,
        },
    });

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
            message: "stdin is a pipe (replay with --input - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("pagevitals Doctor Report");
        println!("========================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(PageVitalsCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), PageVitalsCliError> {
    match schema_type {
        SchemaType::Trace => {
            if json_schema {
                println!("{}", serde_json::to_string_pretty(&trace_json_schema())?);
            } else {
                println!("Input Schema: {}", TRACE_SCHEMA_VERSION);
                println!();
                println!("A trace is an ordered list of events tagged by \"type\":");
                println!();
                println!("  navigation          - navigation timing record ({{\"timing\": {{...}}}})");
                println!("  entry               - performance entry ({{\"entry\": {{...}}, \"queued\": false}})");
                println!("  deliver             - deliver queued entries to observers");
                println!("  hidden / visible    - visibility change (optional \"at\")");
                println!("  prerendering_change - prerendered page activated");
                println!("  restore             - page restored from the back/forward cache (optional \"at\")");
                println!("  load                - document load complete");
                println!("  key_down / click    - user input");
                println!("  advance             - move the clock forward ({{\"ms\": 16}})");
                println!("  idle / frame / flush - run idle callbacks, one animation frame, or everything");
                println!();
                println!("Entry categories: {}", category_names().join(", "));
                println!("Input may be NDJSON (one event per line) or a JSON array.");
            }
        }
        SchemaType::Report => {
            if json_schema {
                println!("{}", serde_json::to_string_pretty(&report_json_schema())?);
            } else {
                println!("Output Schema: replay report");
                println!();
                println!("  schema_version   - {}", TRACE_SCHEMA_VERSION);
                println!("  producer         - name, version, instance_id");
                println!("  computed_at_utc  - RFC 3339 timestamp");
                println!("  events_replayed  - number of trace events applied");
                println!("  updates          - number of on_update notifications");
                println!("  reports          - every on_metric notification, in order");
                println!("  metrics          - final values keyed by metric name");
                println!("  skipped          - enabled metrics the host could not support");
                println!();
                println!("Metric names: {}", metric_names().join(", "));
            }
        }
        SchemaType::Config => {
            if json_schema {
                println!("{}", serde_json::to_string_pretty(&config_json_schema())?);
            } else {
                println!("Engine configuration (defaults):");
                println!();
                println!("{}", serde_json::to_string_pretty(&VitalsConfig::default())?);
            }
        }
    }

    Ok(())
}

fn metric_names() -> Vec<&'static str> {
    MetricName::ALL.iter().map(|m| m.as_str()).collect()
}

fn category_names() -> Vec<&'static str> {
    EntryCategory::ALL.iter().map(|c| c.as_str()).collect()
}

fn trace_json_schema() -> serde_json::Value {
    let time = serde_json::json!({ "type": "number", "minimum": 0 });
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": TRACE_SCHEMA_VERSION,
        "description": "Recorded page session event",
        "type": "object",
        "required": ["type"],
        "properties": {
            "type": {
                "type": "string",
                "enum": [
                    "navigation", "entry", "deliver", "hidden", "visible",
                    "prerendering_change", "restore", "load", "key_down",
                    "click", "advance", "idle", "frame", "flush"
                ]
            },
            "at": time,
            "ms": time,
            "queued": { "type": "boolean" },
            "timing": {
                "type": "object",
                "properties": {
                    "start_time": time,
                    "domain_lookup_start": time,
                    "domain_lookup_end": time,
                    "connect_start": time,
                    "connect_end": time,
                    "response_start": time,
                    "response_end": time,
                    "dom_content_loaded_event_end": time,
                    "load_event_end": time,
                    "activation_start": time
                }
            },
            "entry": {
                "type": "object",
                "required": ["category", "start_time"],
                "properties": {
                    "category": { "type": "string", "enum": category_names() },
                    "start_time": time,
                    "duration": time,
                    "value": time,
                    "had_recent_input": { "type": "boolean" },
                    "interaction_id": { "type": "integer", "minimum": 0 },
                    "name": { "type": "string" },
                    "processing_start": time
                }
            }
        }
    })
}

fn report_json_schema() -> serde_json::Value {
    let metric = serde_json::json!({ "type": "number" });
    let values: serde_json::Map<String, serde_json::Value> = metric_names()
        .into_iter()
        .map(|name| (name.to_string(), metric.clone()))
        .collect();
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "pagevitals replay report",
        "type": "object",
        "required": [
            "schema_version", "producer", "computed_at_utc",
            "events_replayed", "updates", "reports", "metrics"
        ],
        "properties": {
            "schema_version": { "type": "string", "const": TRACE_SCHEMA_VERSION },
            "producer": {
                "type": "object",
                "required": ["name", "version", "instance_id"],
                "properties": {
                    "name": { "type": "string" },
                    "version": { "type": "string" },
                    "instance_id": { "type": "string" }
                }
            },
            "computed_at_utc": { "type": "string", "format": "date-time" },
            "events_replayed": { "type": "integer", "minimum": 0 },
            "updates": { "type": "integer", "minimum": 0 },
            "reports": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "value"],
                    "properties": {
                        "name": { "type": "string", "enum": metric_names() },
                        "value": metric
                    }
                }
            },
            "metrics": { "type": "object", "properties": values },
            "skipped": {
                "type": "array",
                "items": { "type": "string", "enum": metric_names() }
            }
        }
    })
}

fn config_json_schema() -> serde_json::Value {
    let time = serde_json::json!({ "type": "number", "minimum": 0 });
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "pagevitals config",
        "type": "object",
        "properties": {
            "debug": { "type": "boolean", "default": false },
            "metrics": {
                "type": "array",
                "items": { "type": "string", "enum": metric_names() }
            },
            "idle_timeout_ms": time,
            "fallback_delay_ms": time,
            "interaction_duration_threshold_ms": time
        }
    })
}

// Error handling

#[derive(Debug)]
enum PageVitalsCliError {
    Io(io::Error),
    Engine(pagevitals::VitalsError),
    Json(serde_json::Error),
    UnknownName(String),
    NoEvents,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for PageVitalsCliError {
    fn from(e: io::Error) -> Self {
        PageVitalsCliError::Io(e)
    }
}

impl From<pagevitals::VitalsError> for PageVitalsCliError {
    fn from(e: pagevitals::VitalsError) -> Self {
        PageVitalsCliError::Engine(e)
    }
}

impl From<serde_json::Error> for PageVitalsCliError {
    fn from(e: serde_json::Error) -> Self {
        PageVitalsCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PageVitalsCliError> for CliError {
    fn from(e: PageVitalsCliError) -> Self {
        match e {
            PageVitalsCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PageVitalsCliError::Engine(e) => {
                let (code, hint) = match &e {
                    pagevitals::VitalsError::InvalidTraceEvent(_) => (
                        "VALIDATION_ERROR",
                        "Run 'pagevitals validate' for details",
                    ),
                    pagevitals::VitalsError::InvalidConfig(_) => (
                        "CONFIG_ERROR",
                        "Run 'pagevitals schema config' for the expected fields",
                    ),
                    _ => (
                        "PARSE_ERROR",
                        "Ensure input matches the pagevitals.trace.v1 schema",
                    ),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            PageVitalsCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PageVitalsCliError::UnknownName(what) => CliError {
                code: "UNKNOWN_NAME".to_string(),
                message: format!("Unknown {}", what),
                hint: Some(format!(
                    "Metrics: {}; categories: {}",
                    metric_names().join(", "),
                    category_names().join(", ")
                )),
            },
            PageVitalsCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            PageVitalsCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            PageVitalsCliError::DoctorFailed => CliError {
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
    schema_version: String,
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    kind: String,
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
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
