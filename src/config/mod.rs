//! Configuration Module
//!
//! Turns a root pipeline file and its local includes into one resolved
//! mapping, and reads simulation profiles.
//!
//! - [`loader`]: Include resolution, deep merge, source tracking
//! - [`reference`]: `!reference` tag resolution
//! - [`profile`]: Simulation profile files

pub mod loader;
pub mod profile;
pub mod reference;

pub use loader::{load, merge_mappings, ConfigLoader, IncludePolicy, LoaderOptions, ResolvedConfig, SourceMap};
pub use profile::{load_profile, ProfileSet};
pub use reference::resolve_references;
