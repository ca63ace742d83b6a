//! Error Types
//!
//! Failures that terminate a `validate` or `simulate` invocation. Malformed
//! rule conditions are not part of this taxonomy: they are downgraded to
//! `false` inside the rule evaluator (see [`crate::rules::ConditionError`]).

use std::path::PathBuf;

/// Errors raised while loading and resolving pipeline or profile documents.
#[derive(Debug, thiserror::Error)]
pub enum CimulatorError {
    /// A file is missing or unreadable.
    #[error("failed to read '{}': {}", .path.display(), .source)]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file is not well-formed YAML, or its top level is not a mapping.
    #[error("failed to parse '{}': {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A `!reference` points at a path that does not exist or cannot be resolved.
    #[error("cannot resolve reference {reference}: {reason}")]
    Reference { reference: String, reason: String },

    /// An include entry has a shape that cannot be resolved offline.
    #[error("unsupported include in '{}': {}", .path.display(), .entry)]
    Include { path: PathBuf, entry: String },

    /// An include chain loops back on itself or exceeds the depth limit.
    #[error("include cycle at '{}': {}", .path.display(), .chain.join(" -> "))]
    IncludeCycle { path: PathBuf, chain: Vec<String> },

    /// The requested simulation profile does not exist.
    #[error("profile '{}' not found (available: {})", .name, .available.join(", "))]
    ProfileNotFound { name: String, available: Vec<String> },
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, CimulatorError>;
