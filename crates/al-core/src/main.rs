//! ADC logger CLI.
//!
//! - `run`: interactive logging session (serial device or capture replay)
//! - `parse`: parse telemetry lines and print the result
//! - `config show` / `config validate`
//! - `version`

use al_common::{SessionId, SCHEMA_VERSION};
use al_core::config::{
    load_config, load_config_file, validate_config, ConfigError, ConfigOptions, LoggerConfig,
};
use al_core::exit_codes::ExitCode;
use al_core::log_event;
use al_core::logging::{
    event_names, generate_run_id, init_logging, LogConfig, LogContext, LogFormat, LogLevel, Stage,
};
use al_core::parse::{parse_line, parse_token, SEPARATOR};
use al_core::session::{prompt_sample_count, Session};
use al_core::transport::{LineSource, ReaderSource};
use al_table::{TableConfig, TableWriter};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Interactive ADC data-acquisition logger
#[derive(Parser)]
#[command(name = "adc-logger")]
#[command(author, version, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (default: $XDG_CONFIG_HOME/adc_logger/config.json)
    #[arg(long, global = true, env = "ADC_LOGGER_CONFIG")]
    config: Option<PathBuf>,

    /// Output format for command payloads
    #[arg(long, short = 'f', global = true, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive logging session (default)
    Run(RunArgs),

    /// Parse telemetry lines and print the readings
    Parse(ParseArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Serial device, e.g. /dev/ttyUSB0
    #[arg(long, short = 'p')]
    port: Option<String>,

    /// Serial line speed
    #[arg(long, short = 'b')]
    baud: Option<u32>,

    /// Replay a capture file instead of a serial device ("-" for stdin)
    #[arg(long, short = 'i', conflicts_with_all = ["port", "baud"])]
    input: Option<PathBuf>,

    /// Read prompt answers from a file instead of stdin
    #[arg(long)]
    answers: Option<PathBuf>,

    /// Samples per round (prompted for when absent)
    #[arg(long, short = 'n')]
    samples: Option<NonZeroUsize>,

    /// Directory for the table (default: desktop)
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// Table file name prefix
    #[arg(long)]
    prefix: Option<String>,

    /// Reference column label
    #[arg(long)]
    label: Option<String>,

    /// Wait after opening the serial device, in milliseconds
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Serial read timeout, in milliseconds
    #[arg(long)]
    read_timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// Telemetry lines, e.g. "A436;E1857;D13296;"
    #[arg(required = true)]
    lines: Vec<String>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the resolved configuration
    Show,
    /// Validate a config file (default: the resolved one)
    Validate {
        /// Config file to validate
        path: Option<PathBuf>,
    },
}

// ============================================================================
// Main entry point
// ============================================================================

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = if e.use_stderr() {
                ExitCode::ArgsError
            } else {
                ExitCode::Clean
            };
            std::process::exit(code.as_i32());
        }
    };

    let log_level = LogLevel::from_flags(cli.global.verbose, cli.global.quiet);
    let log_config = LogConfig::from_env(log_level, cli.global.log_format);
    init_logging(&log_config);
    let ctx = LogContext::new(generate_run_id());

    let exit_code = match cli.command {
        None => run_session(&cli.global, &RunArgs::default(), ctx),
        Some(Commands::Run(args)) => run_session(&cli.global, &args, ctx),
        Some(Commands::Parse(args)) => run_parse(&cli.global, &args),
        Some(Commands::Config(args)) => run_config(&cli.global, &args, &ctx),
        Some(Commands::Version) => {
            print_version(&cli.global);
            ExitCode::Clean
        }
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// run
// ============================================================================

fn run_session(global: &GlobalOpts, args: &RunArgs, ctx: LogContext) -> ExitCode {
    let session_id = SessionId::new();
    let ctx = ctx.with_session_id(session_id.0.clone());

    let config = match resolve_run_config(global, args, &ctx) {
        Ok(c) => c,
        Err(e) => return output_config_error(global, &e),
    };

    if args.input.as_deref() == Some(Path::new("-")) && args.answers.is_none() {
        eprintln!("error: --input - reads telemetry from stdin; pass --answers FILE for the prompts");
        return ExitCode::ArgsError;
    }

    let mut answers: Box<dyn BufRead> = match &args.answers {
        Some(path) => match File::open(path) {
            Ok(f) => Box::new(BufReader::new(f)),
            Err(e) => {
                eprintln!("error: cannot open answers file {}: {}", path.display(), e);
                return ExitCode::ArgsError;
            }
        },
        None => Box::new(io::stdin().lock()),
    };
    let mut console = io::stdout();

    let quota = match config.session.samples.and_then(NonZeroUsize::new) {
        Some(n) => n,
        None => match prompt_sample_count(&mut answers, &mut console) {
            Ok(Some(n)) => n,
            Ok(None) => {
                let _ = writeln!(console);
                return ExitCode::Clean;
            }
            Err(e) => return io_failure(&ctx, "reading the sample count", &e),
        },
    };

    let source = match open_source(args, &config, &ctx) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let _ = writeln!(console, "Monitoring started: {}", source.describe());

    let table_config = TableConfig {
        output_dir: config.session.resolved_output_dir(),
        prefix: config.session.file_prefix.clone(),
        quota,
        reference_label: config.session.reference_label.clone(),
    };
    let table = match TableWriter::create(&table_config) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(&e);
        }
    };
    let table_path = table.path().to_path_buf();
    let _ = writeln!(console, "Logging to {}", table_path.display());

    let session = Session::new(source, table, ctx.clone())
        .trap_interrupts(true)
        .with_manifest(&session_id);
    let mut session = match session {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(&e);
        }
    };

    let result = session.run_interactive(&mut answers, &mut console);
    let closed = session.into_parts();

    let code = match result {
        Ok(summary) => {
            let _ = writeln!(
                console,
                "Source closed, file saved: {} ({} rows)",
                table_path.display(),
                summary.rows_written
            );
            ExitCode::from(summary.outcome)
        }
        Err(e) => {
            eprintln!("error: {}", e);
            let message = e.to_string();
            log_event!(
                ctx,
                ERROR,
                event_names::INTERNAL_ERROR,
                Stage::Shutdown,
                "Session failed",
                error = message.as_str()
            );
            ExitCode::from(&e)
        }
    };
    if let Err(e) = closed {
        eprintln!("error: {}", e);
        return ExitCode::from(&e);
    }
    code
}

/// Load the config file and apply `run` flags on top.
fn resolve_run_config(
    global: &GlobalOpts,
    args: &RunArgs,
    ctx: &LogContext,
) -> Result<LoggerConfig, ConfigError> {
    let resolved = load_config(&ConfigOptions {
        config_path: global.config.clone(),
    })?;
    match &resolved.path {
        Some(path) => {
            let path = path.display().to_string();
            log_event!(
                ctx,
                DEBUG,
                event_names::CONFIG_LOADED,
                Stage::Init,
                "Loaded config file",
                path = path.as_str()
            );
        }
        None => log_event!(
            ctx,
            DEBUG,
            event_names::CONFIG_DEFAULT_USED,
            Stage::Init,
            "Using built-in configuration"
        ),
    }

    let mut config = resolved.config;
    let transport = &mut config.transport;
    if let Some(port) = &args.port {
        transport.port = port.clone();
    }
    if let Some(baud) = args.baud {
        transport.baud = baud;
    }
    if let Some(ms) = args.read_timeout_ms {
        transport.read_timeout_ms = ms;
    }
    if let Some(ms) = args.settle_ms {
        transport.settle_ms = ms;
    }

    let session = &mut config.session;
    if let Some(n) = args.samples {
        session.samples = Some(n.get());
    }
    if let Some(dir) = &args.output_dir {
        session.output_dir = Some(dir.clone());
    }
    if let Some(prefix) = &args.prefix {
        session.file_prefix = prefix.clone();
    }
    if let Some(label) = &args.label {
        session.reference_label = label.clone();
    }

    validate_config(&config)?;
    Ok(config)
}

/// Open the capture file, stdin, or serial device.
fn open_source(
    args: &RunArgs,
    config: &LoggerConfig,
    ctx: &LogContext,
) -> Result<Box<dyn LineSource>, ExitCode> {
    let source: Box<dyn LineSource> = match &args.input {
        Some(path) if path == Path::new("-") => {
            Box::new(ReaderSource::new(io::stdin().lock(), "stdin"))
        }
        Some(path) => {
            let file = File::open(path).map_err(|e| {
                eprintln!("error: cannot open capture {}: {}", path.display(), e);
                if e.kind() == io::ErrorKind::PermissionDenied {
                    ExitCode::PermissionError
                } else {
                    ExitCode::ArgsError
                }
            })?;
            Box::new(ReaderSource::new(
                BufReader::new(file),
                path.display().to_string(),
            ))
        }
        None => open_serial(config, ctx)?,
    };

    let describe = source.describe();
    log_event!(
        ctx,
        INFO,
        event_names::TRANSPORT_OPENED,
        Stage::Connect,
        "Line source opened",
        source = describe.as_str()
    );
    Ok(source)
}

#[cfg(unix)]
fn open_serial(config: &LoggerConfig, ctx: &LogContext) -> Result<Box<dyn LineSource>, ExitCode> {
    use al_core::transport::serial::{SerialConfig, SerialPort};

    let settings = &config.transport;
    let mut serial = SerialConfig::new(&settings.port);
    serial.baud = settings.baud;
    serial.read_timeout = Duration::from_millis(settings.read_timeout_ms);

    let port = SerialPort::open(serial).map_err(|e| {
        eprintln!("error: {}", e);
        ExitCode::from(&e)
    })?;

    if settings.settle_ms > 0 {
        log_event!(
            ctx,
            DEBUG,
            event_names::TRANSPORT_SETTLING,
            Stage::Connect,
            "Waiting for the device to boot",
            settle_ms = settings.settle_ms
        );
        std::thread::sleep(Duration::from_millis(settings.settle_ms));
    }
    Ok(Box::new(port))
}

#[cfg(not(unix))]
fn open_serial(_config: &LoggerConfig, _ctx: &LogContext) -> Result<Box<dyn LineSource>, ExitCode> {
    let e = al_core::transport::TransportError::UnsupportedPlatform;
    eprintln!("error: {}", e);
    Err(ExitCode::from(&e))
}

fn io_failure(ctx: &LogContext, what: &str, e: &io::Error) -> ExitCode {
    eprintln!("error: {}: {}", what, e);
    let message = format!("{}: {}", what, e);
    log_event!(
        ctx,
        ERROR,
        event_names::INTERNAL_ERROR,
        Stage::Init,
        "I/O failure",
        error = message.as_str()
    );
    ExitCode::IoError
}

// ============================================================================
// parse
// ============================================================================

fn run_parse(global: &GlobalOpts, args: &ParseArgs) -> ExitCode {
    match global.format {
        OutputFormat::Json => {
            let results: Vec<serde_json::Value> =
                args.lines.iter().map(|line| parse_report(line)).collect();
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "results": results,
            });
            print_json(&response)
        }
        OutputFormat::Human => {
            for line in &args.lines {
                let sample = parse_line(line);
                if sample.is_empty() {
                    println!("{:?} -> (noise)", line);
                } else {
                    println!("{:?} -> {}", line, sample);
                }
            }
            ExitCode::Clean
        }
    }
}

/// Per-line breakdown: final readings plus each token's interpretation.
fn parse_report(line: &str) -> serde_json::Value {
    let sample = parse_line(line);
    let body = line.trim();
    let body = body.strip_suffix(SEPARATOR).unwrap_or(body);
    let tokens: Vec<serde_json::Value> = body
        .split(SEPARATOR)
        .filter(|t| !t.trim().is_empty())
        .map(|token| match parse_token(token) {
            Some((channel, value)) => serde_json::json!({
                "token": token.trim(),
                "channel": channel.to_string(),
                "value": value,
            }),
            None => serde_json::json!({
                "token": token.trim(),
                "channel": null,
                "value": null,
            }),
        })
        .collect();

    serde_json::json!({
        "line": line,
        "a": sample.a,
        "e": sample.e,
        "d": sample.d,
        "valid": !sample.is_empty(),
        "tokens": tokens,
    })
}

// ============================================================================
// config
// ============================================================================

fn run_config(global: &GlobalOpts, args: &ConfigArgs, ctx: &LogContext) -> ExitCode {
    match &args.command {
        ConfigCommands::Show => run_config_show(global, ctx),
        ConfigCommands::Validate { path } => run_config_validate(global, path.as_deref()),
    }
}

fn run_config_show(global: &GlobalOpts, ctx: &LogContext) -> ExitCode {
    let resolved = match load_config(&ConfigOptions {
        config_path: global.config.clone(),
    }) {
        Ok(c) => c,
        Err(e) => return output_config_error(global, &e),
    };
    if resolved.path.is_none() {
        log_event!(
            ctx,
            DEBUG,
            event_names::CONFIG_DEFAULT_USED,
            Stage::Init,
            "No config file found"
        );
    }

    let output_dir = resolved.config.session.resolved_output_dir();
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "source": {
                    "path": resolved.path.as_ref().map(|p| p.display().to_string()),
                    "using_defaults": resolved.path.is_none(),
                },
                "effective_output_dir": output_dir.display().to_string(),
                "config": &resolved.config,
            });
            print_json(&response)
        }
        OutputFormat::Human => {
            let config = &resolved.config;
            match &resolved.path {
                Some(path) => println!("Source: {}", path.display()),
                None => println!("Source: built-in defaults"),
            }
            println!("Schema version: {}", config.schema_version);
            println!();
            println!("[transport]");
            println!("port            = {}", config.transport.port);
            println!("baud            = {}", config.transport.baud);
            println!("read_timeout_ms = {}", config.transport.read_timeout_ms);
            println!("settle_ms       = {}", config.transport.settle_ms);
            println!();
            println!("[session]");
            match config.session.samples {
                Some(n) => println!("samples         = {}", n),
                None => println!("samples         = (prompt)"),
            }
            println!("reference_label = {}", config.session.reference_label);
            println!("output_dir      = {}", output_dir.display());
            println!("file_prefix     = {}", config.session.file_prefix);
            ExitCode::Clean
        }
    }
}

fn run_config_validate(global: &GlobalOpts, path: Option<&Path>) -> ExitCode {
    let result = match path {
        Some(path) => load_config_file(path).and_then(|config| {
            validate_config(&config)?;
            Ok(Some(path.to_path_buf()))
        }),
        None => load_config(&ConfigOptions {
            config_path: global.config.clone(),
        })
        .map(|resolved| resolved.path),
    };

    match result {
        Ok(path) => {
            let shown = path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in defaults".to_string());
            match global.format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "schema_version": SCHEMA_VERSION,
                    "status": "valid",
                    "path": path.map(|p| p.display().to_string()),
                })),
                OutputFormat::Human => {
                    println!("{}: valid", shown);
                    ExitCode::Clean
                }
            }
        }
        Err(e) => output_config_error(global, &e),
    }
}

fn output_config_error(global: &GlobalOpts, error: &ConfigError) -> ExitCode {
    let exit_code = ExitCode::from(error);
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "status": "error",
                "error": {
                    "code": exit_code.as_i32(),
                    "name": exit_code.code_name(),
                    "message": error.to_string(),
                }
            });
            match serde_json::to_string_pretty(&response) {
                Ok(s) => eprintln!("{}", s),
                Err(_) => eprintln!("config error: {}", error),
            }
        }
        OutputFormat::Human => eprintln!("config error: {}", error),
    }
    exit_code
}

// ============================================================================
// version / helpers
// ============================================================================

fn print_version(global: &GlobalOpts) {
    match global.format {
        OutputFormat::Json => {
            let _ = print_json(&serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "adc_logger_version": env!("CARGO_PKG_VERSION"),
                "rust_version": env!("CARGO_PKG_RUST_VERSION"),
            }));
        }
        OutputFormat::Human => {
            println!("adc-logger {}", env!("CARGO_PKG_VERSION"));
            println!("schema version: {}", SCHEMA_VERSION);
        }
    }
}

fn print_json(value: &serde_json::Value) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{}", s);
            ExitCode::Clean
        }
        Err(e) => {
            eprintln!("error: failed to serialize output: {}", e);
            ExitCode::InternalError
        }
    }
}
