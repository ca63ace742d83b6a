//! Pipeline Module
//!
//! Typed model of a resolved pipeline and the transformations applied to it
//! before and after simulation.
//!
//! - [`model`]: Pipeline, job, rule and need types
//! - [`variables`]: `$NAME` / `${NAME}` expansion
//! - [`jobs`]: `extends` composition and script normalization
//! - [`validator`]: Duplicate job and unmet `needs` detection

pub mod jobs;
pub mod model;
pub mod validator;
pub mod variables;

pub use jobs::expand_all;
pub use model::{JobDefinition, Need, Pipeline, Rule, When};
pub use validator::{detect_duplicate_jobs, validate_needs_dependencies, DuplicateJobWarning, NeedsFinding};
pub use variables::{expand, expand_in_string, Variables};
