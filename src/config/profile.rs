//! Simulation Profiles
//!
//! A profile file maps profile names to the input variables a pipeline
//! would see when triggered in that situation:
//!
//! ```yaml
//! push_to_main:
//!   CI_PIPELINE_SOURCE: push
//!   CI_COMMIT_BRANCH: main
//!
//! merge_request:
//!   variables:
//!     CI_PIPELINE_SOURCE: merge_request_event
//! ```
//!
//! A profile may list its variables directly or under a `variables` key.

use std::path::Path;

use log::{debug, info};
use serde_yaml::{Mapping, Value};

use crate::error::{CimulatorError, Result};
use crate::pipeline::variables::{value_to_string, variables_from_mapping, Variables};

use super::loader::read_document;

/// Named variable sets, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSet {
    profiles: Vec<(String, Variables)>,
}

impl ProfileSet {
    /// Reads a profile file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading simulation profiles from: {}", path.display());

        let document = read_document(path)?;
        let profiles = Self::from_mapping(&document);

        debug!("Found {} profiles: {}", profiles.len(), profiles.names().join(", "));
        Ok(profiles)
    }

    /// Builds profiles from an already parsed mapping.
    ///
    /// Entries whose value is not a mapping are ignored; a null entry is an
    /// empty profile.
    pub fn from_mapping(document: &Mapping) -> Self {
        let profiles = document
            .iter()
            .filter_map(|(key, value)| {
                let variables = match value {
                    Value::Mapping(body) => match body.get("variables") {
                        Some(Value::Mapping(inner)) => variables_from_mapping(inner),
                        _ => variables_from_mapping(body),
                    },
                    Value::Null => Variables::new(),
                    _ => return None,
                };
                Some((value_to_string(key), variables))
            })
            .collect();

        Self { profiles }
    }

    /// Profile names in file order.
    pub fn names(&self) -> Vec<String> {
        self.profiles.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Returns a copy of the named profile's variables.
    pub fn select(&self, name: &str) -> Result<Variables> {
        self.profiles
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, variables)| variables.clone())
            .ok_or_else(|| CimulatorError::ProfileNotFound {
                name: name.to_string(),
                available: self.names(),
            })
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Loads a profile file and selects one profile from it.
pub fn load_profile(path: impl AsRef<Path>, name: &str) -> Result<Variables> {
    ProfileSet::load(path)?.select(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const PROFILES: &str = r#"
push_to_main:
  CI_PIPELINE_SOURCE: push
  CI_COMMIT_BRANCH: main
merge_request:
  variables:
    CI_PIPELINE_SOURCE: merge_request_event
    CI_MERGE_REQUEST_IID: 42
empty:
"#;

    #[test]
    fn test_flat_and_nested_profiles() {
        let document: Mapping = serde_yaml::from_str(PROFILES).unwrap();
        let profiles = ProfileSet::from_mapping(&document);

        assert_eq!(profiles.names(), vec!["push_to_main", "merge_request", "empty"]);

        let push = profiles.select("push_to_main").unwrap();
        assert_eq!(push.get("CI_COMMIT_BRANCH"), Some(&Value::String("main".to_string())));

        let mr = profiles.select("merge_request").unwrap();
        assert_eq!(value_to_string(&mr["CI_MERGE_REQUEST_IID"]), "42");
        assert!(!mr.contains_key("variables"));

        assert!(profiles.select("empty").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_profile_lists_names_in_order() {
        let document: Mapping = serde_yaml::from_str(PROFILES).unwrap();
        let profiles = ProfileSet::from_mapping(&document);

        match profiles.select("nightly") {
            Err(CimulatorError::ProfileNotFound { name, available }) => {
                assert_eq!(name, "nightly");
                assert_eq!(available, vec!["push_to_main", "merge_request", "empty"]);
            }
            other => panic!("expected ProfileNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_load_profile_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profiles.yml");
        fs::write(&path, PROFILES).unwrap();

        let variables = load_profile(&path, "push_to_main").unwrap();
        assert_eq!(variables.get("CI_PIPELINE_SOURCE"), Some(&Value::String("push".to_string())));
    }

    #[test]
    fn test_load_profile_missing_file() {
        let result = load_profile("/nonexistent/profiles.yml", "default");
        assert!(matches!(result, Err(CimulatorError::Load { .. })));
    }
}
