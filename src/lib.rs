//! Cimulator - Offline GitLab CI Pipeline Simulator
//!
//! Answers "which jobs would this pipeline run, and with what variables?"
//! for layered GitLab-style CI definitions, without contacting a CI server.
//!
//! # Architecture
//!
//! The library is organized into these modules:
//!
//! - [`config`]: Include resolution, deep merge, `!reference` tags, profiles
//! - [`pipeline`]: Pipeline model, variable expansion, job expansion, validation
//! - [`rules`]: The `if:` condition language and rule-list evaluation
//! - [`simulation`]: The simulation engine and `validate` / `simulate` operations
//! - [`diagnostics`]: Structured simulation events
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use cimulator::simulate;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let summary = simulate(".gitlab-ci.yml", "profiles.yml", "push_to_main")?;
//!
//!     println!("Workflow runs: {}", summary.workflow_run);
//!     for job in &summary.jobs {
//!         println!("{}: {:?}", job.name, job.script());
//!     }
//!     for finding in &summary.needs_validation_findings {
//!         eprintln!("{}", finding);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod pipeline;
pub mod rules;
pub mod simulation;

// Re-export commonly used types
pub use config::{load, load_profile};
pub use error::{CimulatorError, Result};
pub use pipeline::{JobDefinition, Pipeline};
pub use simulation::{simulate, validate, Engine, SimulationSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Cimulator";
