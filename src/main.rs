//! FlowRunner CLI Entry Point
//!
//! Provides command-line interface for workflow execution.
//!
//! # Usage
//!
//! ```bash
//! # Execute a workflow
//! flowrunner workflow.json
//!
//! # Seed the execution context
//! flowrunner workflow.json --input '{"score": 70}'
//!
//! # Only report validation issues
//! flowrunner workflow.yaml --validate
//!
//! # Tighten the visit bound
//! flowrunner workflow.json --max-visits 500
//! ```

use std::env;
use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use log::{error, info, warn};

use flowrunner::execution::{LogEntry, PathStatus, RunResult, RunStatus};
use flowrunner::handlers::{ReqwestClient, UnconfiguredAi};
use flowrunner::workflow::{load_workflow, validate};
use flowrunner::{Engine, EngineConfig, ExecutionContext, LogLevel, APP_NAME, VERSION};

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    workflow_path: Option<String>,
    input: Option<String>,
    input_file: Option<String>,
    config_path: Option<String>,
    max_visits: Option<usize>,
    validate_only: bool,
    json: bool,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Visual Workflow Execution Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: flowrunner [OPTIONS] <WORKFLOW_FILE>");
    println!();
    println!("Arguments:");
    println!("  <WORKFLOW_FILE>     Path to workflow JSON or YAML file");
    println!();
    println!("Options:");
    println!("  --input JSON        Initial execution context (JSON object)");
    println!("  --input-file PATH   Read the initial context from a JSON file");
    println!("  --config PATH       Engine configuration (YAML)");
    println!("  --max-visits N      Bound on node visits per run");
    println!("  --validate          Report validation issues and exit");
    println!("  --json              Print the run result as JSON");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  flowrunner onboarding.json");
    println!("  flowrunner onboarding.json --input '{{\"score\": 70}}'");
    println!("  flowrunner onboarding.yaml --config engine.yaml --max-visits 500");
}

/// Returns the value following an option, advancing the cursor.
fn option_value<'a>(args: &'a [String], i: &mut usize, option: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires an argument", option))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--validate" => config.validate_only = true,
            "--json" => config.json = true,
            "--verbose" | "-v" => config.verbose = true,
            "--input" => config.input = Some(option_value(args, &mut i, "--input")?.to_string()),
            "--input-file" => {
                config.input_file = Some(option_value(args, &mut i, "--input-file")?.to_string())
            }
            "--config" => config.config_path = Some(option_value(args, &mut i, "--config")?.to_string()),
            "--max-visits" => {
                let value = option_value(args, &mut i, "--max-visits")?;
                let max_visits = value
                    .parse()
                    .map_err(|_| format!("Invalid max-visits value: {}", value))?;
                config.max_visits = Some(max_visits);
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.workflow_path.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.workflow_path = Some(arg.clone());
            }
        }
        i += 1;
    }

    if config.input.is_some() && config.input_file.is_some() {
        return Err("--input and --input-file are mutually exclusive".to_string());
    }
    Ok(config)
}

/// Builds the initial execution context from `--input` or `--input-file`.
fn initial_context(config: &Config) -> Result<ExecutionContext, Box<dyn std::error::Error>> {
    let raw = match (&config.input, &config.input_file) {
        (Some(inline), _) => inline.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .map_err(|e| format!("Could not read input file '{}': {}", path, e))?,
        (None, None) => return Ok(ExecutionContext::new()),
    };

    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| format!("Input is not valid JSON: {}", e))?;
    if !value.is_object() {
        return Err("Input must be a JSON object".into());
    }
    Ok(ExecutionContext::from_value(value))
}

fn print_entry(entry: &LogEntry) {
    let level = match entry.level {
        LogLevel::Info => "INFO ".blue(),
        LogLevel::Success => "OK   ".green(),
        LogLevel::Error => "ERROR".red().bold(),
    };
    println!(
        "{} {} [{}#{}] {}: {}",
        entry.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
        level,
        entry.kind,
        entry.path_id,
        entry.node_id.bold(),
        entry.message
    );
}

fn print_result(result: &RunResult) {
    println!();
    println!("{}", "Execution Trace:".bold());
    for entry in &result.log {
        print_entry(entry);
    }

    println!("{}", result.timeline.gantt_chart());

    println!("{}", "Paths:".bold());
    for path in &result.paths {
        let status = match &path.status {
            PathStatus::Completed => "completed".green().to_string(),
            PathStatus::Failed(reason) => format!("{} ({})", "failed".red(), reason),
            PathStatus::Aborted => "aborted".yellow().to_string(),
        };
        println!("  path {} ended at '{}': {}", path.path_id, path.last_node, status);
    }

    println!();
    let status = match result.status {
        RunStatus::Succeeded => "SUCCEEDED".green().bold(),
        RunStatus::Aborted => "ABORTED".yellow().bold(),
        _ => "FAILED".red().bold(),
    };
    match &result.reason {
        Some(reason) => println!("Run {}: {}", status, reason),
        None => println!("Run {}", status),
    }
    println!("Node visits: {}", result.visits);
}

/// Main application entry point.
async fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;
    let Some(workflow_path) = config.workflow_path.clone() else {
        print_usage();
        return Err("No workflow file given".into());
    };

    setup_logging(config.verbose);
    if !config.json {
        print_banner();
    }

    // Load workflow
    let workflow = load_workflow(&workflow_path).map_err(|e| {
        error!("Failed to load workflow: {}", e);
        format!("Could not load workflow from '{}': {}", workflow_path, e)
    })?;

    if config.validate_only {
        let issues = validate(&workflow);
        if issues.is_empty() {
            println!("{} '{}' has no issues", "✓".green(), workflow.name);
        }
        for issue in &issues {
            println!("{} {}", "!".yellow(), issue);
        }
        return Ok(issues.is_empty());
    }

    // Engine configuration: file, then command-line overrides
    let mut engine_config = match &config.config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(max_visits) = config.max_visits {
        engine_config = engine_config.with_max_visits(max_visits);
    }

    let input = initial_context(&config)?;
    let engine = Engine::builtin(
        Arc::new(ReqwestClient::new()),
        Arc::new(UnconfiguredAi),
        engine_config,
    );

    let handle = engine.start(workflow, input)?;
    info!("Run {} started (Ctrl-C to cancel)", handle.run_id());

    let token = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted - cancelling run");
            token.cancel();
        }
    });

    let result = handle.wait().await;
    if config.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    Ok(result.succeeded())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
