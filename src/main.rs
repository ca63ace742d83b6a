//! Cimulator CLI Entry Point
//!
//! Provides command-line interface for pipeline validation and simulation.
//!
//! # Usage
//!
//! ```bash
//! # Resolve includes and references, print the merged configuration
//! cimulator validate .gitlab-ci.yml
//!
//! # Simulate a pipeline with one profile from a profile file
//! cimulator simulate .gitlab-ci.yml profiles.yml push_to_main
//!
//! # Write the result as JSON to a file
//! cimulator simulate .gitlab-ci.yml profiles.yml merge_request --format json --output result.json
//!
//! # Fail on remote/project/template includes instead of skipping them
//! cimulator validate .gitlab-ci.yml --strict-includes
//! ```

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use colored::Colorize;
use log::info;
use serde::Serialize;

use cimulator::config::{IncludePolicy, LoaderOptions};
use cimulator::diagnostics::LogSink;
use cimulator::pipeline::{DuplicateJobWarning, NeedsFinding};
use cimulator::rules::EmptyWorkflow;
use cimulator::simulation::{simulate_with, validate_with, Engine, SimulationOptions};
use cimulator::{APP_NAME, VERSION};

/// Subcommand selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Validate,
    Simulate,
}

/// Serialization format of the result document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Yaml,
    Json,
}

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    command: Command,
    ci_file: PathBuf,
    profile_file: Option<PathBuf>,
    profile_name: Option<String>,
    output: Option<PathBuf>,
    format: OutputFormat,
    strict_includes: bool,
    run_empty_workflow: bool,
    verbose: bool,
}

impl Config {
    fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            include_policy: if self.strict_includes {
                IncludePolicy::Reject
            } else {
                IncludePolicy::Skip
            },
            ..LoaderOptions::default()
        }
    }

    fn simulation_options(&self) -> SimulationOptions {
        SimulationOptions {
            loader: self.loader_options(),
            empty_workflow: if self.run_empty_workflow {
                EmptyWorkflow::Run
            } else {
                EmptyWorkflow::Skip
            },
        }
    }
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

/// Prints the application banner to stderr, keeping stdout for the result.
fn print_banner() {
    eprintln!();
    eprintln!("{} v{}", APP_NAME.bold(), VERSION);
    eprintln!("Offline GitLab CI Pipeline Simulator");
    eprintln!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage:");
    println!("  cimulator validate <CI_FILE> [OPTIONS]");
    println!("  cimulator simulate <CI_FILE> <PROFILE_FILE> <PROFILE> [OPTIONS]");
    println!();
    println!("Arguments:");
    println!("  <CI_FILE>             Root pipeline file (e.g. .gitlab-ci.yml)");
    println!("  <PROFILE_FILE>        YAML file mapping profile names to variables");
    println!("  <PROFILE>             Name of the profile to simulate");
    println!();
    println!("Options:");
    println!("  --output PATH         Write the result document to PATH instead of stdout");
    println!("  --format yaml|json    Result document format (default: yaml)");
    println!("  --strict-includes     Fail on include entries that cannot be resolved locally");
    println!("  --run-empty-workflow  Treat a missing workflow rule list as 'run'");
    println!("  --verbose             Enable debug logging");
    println!("  --help                Show this help message");
    println!("  --version             Show version information");
    println!();
    println!("Examples:");
    println!("  cimulator validate .gitlab-ci.yml --output merged.yml");
    println!("  cimulator simulate .gitlab-ci.yml profiles.yml push_to_main --format json");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut command = None;
    let mut positionals: Vec<String> = Vec::new();
    let mut output = None;
    let mut format = OutputFormat::Yaml;
    let mut strict_includes = false;
    let mut run_empty_workflow = false;
    let mut verbose = false;
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
            "--verbose" | "-v" => {
                verbose = true;
            }
            "--strict-includes" => {
                strict_includes = true;
            }
            "--run-empty-workflow" => {
                run_empty_workflow = true;
            }
            "--output" | "-o" => {
                i += 1;
                if i >= args.len() {
                    return Err("--output requires a path argument".to_string());
                }
                output = Some(PathBuf::from(&args[i]));
            }
            "--format" => {
                i += 1;
                if i >= args.len() {
                    return Err("--format requires 'yaml' or 'json'".to_string());
                }
                format = match args[i].as_str() {
                    "yaml" | "yml" => OutputFormat::Yaml,
                    "json" => OutputFormat::Json,
                    other => return Err(format!("Invalid format: {}", other)),
                };
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            "validate" if command.is_none() => command = Some(Command::Validate),
            "simulate" if command.is_none() => command = Some(Command::Simulate),
            _ if command.is_none() => {
                return Err(format!("Unknown command: {}", arg));
            }
            _ => positionals.push(arg.clone()),
        }
        i += 1;
    }

    let command = command.ok_or_else(|| "Missing command: expected 'validate' or 'simulate'".to_string())?;
    let expected = match command {
        Command::Validate => 1,
        Command::Simulate => 3,
    };

    if positionals.len() < expected {
        return Err(match command {
            Command::Validate => "validate requires <CI_FILE>".to_string(),
            Command::Simulate => "simulate requires <CI_FILE> <PROFILE_FILE> <PROFILE>".to_string(),
        });
    }
    if let Some(extra) = positionals.get(expected) {
        return Err(format!("Unexpected argument: {}", extra));
    }

    let mut positionals = positionals.into_iter();
    let ci_file = positionals.next().map(PathBuf::from).unwrap_or_default();
    let profile_file = positionals.next().map(PathBuf::from);
    let profile_name = positionals.next();

    Ok(Config {
        command,
        ci_file,
        profile_file,
        profile_name,
        output,
        format,
        strict_includes,
        run_empty_workflow,
        verbose,
    })
}

/// Serializes the result document to the output file or stdout.
fn write_document<T: Serialize>(
    document: &T,
    format: OutputFormat,
    output: Option<&PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let rendered = match format {
        OutputFormat::Yaml => serde_yaml::to_string(document)?,
        OutputFormat::Json => serde_json::to_string_pretty(document)? + "\n",
    };

    match output {
        Some(path) => {
            fs::write(path, rendered)?;
            info!("Result written to: {}", path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

/// Prints duplicate job warnings to stderr.
fn report_duplicates(warnings: &[DuplicateJobWarning]) {
    for warning in warnings {
        eprintln!("{} {}", "Duplicate:".yellow().bold(), warning);
    }
}

/// Prints unmet `needs` findings to stderr.
fn report_needs(findings: &[NeedsFinding]) {
    for finding in findings {
        let label = if finding.optional {
            "Needs:".yellow()
        } else {
            "Needs:".red()
        };
        eprintln!("{} {}", label.bold(), finding);
    }
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    print_banner();

    if config.strict_includes {
        info!("Include policy: reject unsupported includes");
    }

    match config.command {
        Command::Validate => {
            let report = validate_with(&config.ci_file, &config.loader_options())?;

            write_document(&report.config, config.format, config.output.as_ref())?;
            report_duplicates(&report.duplicate_job_warnings);
        }
        Command::Simulate => {
            let (Some(profile_file), Some(profile_name)) = (&config.profile_file, &config.profile_name) else {
                return Err("simulate requires <PROFILE_FILE> <PROFILE>".into());
            };
            info!("Simulating '{}' with profile '{}'", config.ci_file.display(), profile_name);

            let mut engine = Engine::with_sink(LogSink).with_options(config.simulation_options());
            let summary = simulate_with(&mut engine, &config.ci_file, profile_file, profile_name)?;

            write_document(&summary, config.format, config.output.as_ref())?;
            report_duplicates(&summary.duplicate_job_warnings);
            report_needs(&summary.needs_validation_findings);
        }
    }

    Ok(())
}

/// The single line reported for a failed run.
fn failure_message(error: &dyn std::fmt::Display) -> String {
    format!("{} {}", "Error:".red().bold(), error)
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{}", failure_message(&e));
            ExitCode::FAILURE
        }
    }
}
