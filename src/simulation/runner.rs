//! Top-level Operations
//!
//! `validate` and `simulate` as handed to the command-line front end:
//! load everything from disk, then run the pure core.

use std::path::Path;

use log::info;
use serde_yaml::Mapping;

use crate::config::{load_profile, ConfigLoader, LoaderOptions};
use crate::diagnostics::{EventLog, EventSink};
use crate::error::Result;
use crate::pipeline::model::Pipeline;
use crate::pipeline::validator::{detect_duplicate_jobs, DuplicateJobWarning};

use super::engine::{Engine, SimulationSummary};

/// Result of validating a configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    /// The fully resolved configuration
    pub config: Mapping,
    pub duplicate_job_warnings: Vec<DuplicateJobWarning>,
}

/// Loads and resolves a configuration, reporting duplicate job definitions.
pub fn validate(ci_file: impl AsRef<Path>) -> Result<ValidationReport> {
    validate_with(ci_file, &LoaderOptions::default())
}

pub fn validate_with(ci_file: impl AsRef<Path>, options: &LoaderOptions) -> Result<ValidationReport> {
    let resolved = ConfigLoader::new(*options).load(ci_file)?;
    let pipeline = Pipeline::from_config(&resolved.config);
    let duplicate_job_warnings = detect_duplicate_jobs(&pipeline.jobs, &resolved.sources);

    info!(
        "Configuration valid: {} jobs, {} duplicate definitions",
        pipeline.len(),
        duplicate_job_warnings.len()
    );

    Ok(ValidationReport {
        config: resolved.config,
        duplicate_job_warnings,
    })
}

/// Simulates a pipeline with default options, collecting events in memory.
pub fn simulate(
    ci_file: impl AsRef<Path>,
    profile_file: impl AsRef<Path>,
    profile_name: &str,
) -> Result<SimulationSummary> {
    let mut engine: Engine<EventLog> = Engine::new();
    simulate_with(&mut engine, ci_file, profile_file, profile_name)
}

/// Simulates a pipeline using the engine's options and event sink.
pub fn simulate_with<S: EventSink>(
    engine: &mut Engine<S>,
    ci_file: impl AsRef<Path>,
    profile_file: impl AsRef<Path>,
    profile_name: &str,
) -> Result<SimulationSummary> {
    let resolved = ConfigLoader::new(engine.options().loader).load(ci_file)?;
    let profile = load_profile(profile_file, profile_name)?;
    let pipeline = Pipeline::from_config(&resolved.config);

    Ok(engine.run(&pipeline, &resolved.sources, &profile))
}
