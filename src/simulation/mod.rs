//! Simulation Module
//!
//! - [`engine`]: Single-pass job selection and variable accumulation
//! - [`runner`]: `validate` / `simulate` entry points reading from disk

pub mod engine;
pub mod runner;

pub use engine::{Engine, SimulationOptions, SimulationSummary};
pub use runner::{simulate, simulate_with, validate, validate_with, ValidationReport};
