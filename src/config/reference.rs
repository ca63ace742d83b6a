//! Reference Resolution
//!
//! Replaces `!reference [key, key, ...]` tags with the value found at that
//! path in the merged configuration. A reference used as a list element is
//! spliced: a list target is flattened one level into the surrounding list.
//!
//! Targets are resolved before they are substituted, so references may
//! point at content that itself contains references.

use std::borrow::Cow;

use log::debug;
use serde_yaml::{Mapping, Value};

use crate::error::{CimulatorError, Result};
use crate::pipeline::variables::value_to_string;

/// YAML tag marking a reference.
pub const REFERENCE_TAG: &str = "reference";

/// Resolves every reference in the configuration in place.
pub fn resolve_references(config: &mut Mapping) -> Result<()> {
    let root = Value::Mapping(std::mem::take(config));
    let resolved = ReferenceResolver::new(&root).resolve(&root)?;

    if let Value::Mapping(mapping) = resolved {
        *config = mapping;
    }
    Ok(())
}

/// Returns true if the value is a `!reference` tag.
pub fn is_reference(value: &Value) -> bool {
    matches!(value, Value::Tagged(tagged) if tagged.tag == REFERENCE_TAG)
}

struct ReferenceResolver<'a> {
    root: &'a Value,
    in_progress: Vec<Vec<String>>,
}

impl<'a> ReferenceResolver<'a> {
    fn new(root: &'a Value) -> Self {
        Self {
            root,
            in_progress: Vec::new(),
        }
    }

    fn resolve(&mut self, node: &Value) -> Result<Value> {
        match node {
            Value::Tagged(tagged) if tagged.tag == REFERENCE_TAG => self.resolve_reference(&tagged.value),
            Value::Tagged(tagged) => {
                let mut tagged = tagged.clone();
                tagged.value = self.resolve(&tagged.value)?;
                Ok(Value::Tagged(tagged))
            }
            Value::Mapping(mapping) => {
                let mut resolved = Mapping::with_capacity(mapping.len());
                for (key, value) in mapping {
                    resolved.insert(key.clone(), self.resolve(value)?);
                }
                Ok(Value::Mapping(resolved))
            }
            Value::Sequence(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    if is_reference(item) {
                        match self.resolve(item)? {
                            Value::Sequence(spliced) => resolved.extend(spliced),
                            single => resolved.push(single),
                        }
                    } else {
                        resolved.push(self.resolve(item)?);
                    }
                }
                Ok(Value::Sequence(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    /// Looks up a reference path and fully resolves the target.
    fn resolve_reference(&mut self, path_value: &Value) -> Result<Value> {
        let path = reference_path(path_value)?;

        if self.in_progress.contains(&path) {
            return Err(reference_error(&path, "reference cycle"));
        }

        debug!("Resolving reference {}", format_path(&path));

        self.in_progress.push(path.clone());
        let target = self.lookup(&path)?;
        let resolved = self.resolve(&target)?;
        self.in_progress.pop();

        Ok(resolved)
    }

    /// Walks the merged tree along `path`, resolving references met on the way.
    fn lookup(&mut self, path: &[String]) -> Result<Value> {
        let root = self.root;
        let mut current = Cow::Borrowed(root);

        for segment in path {
            if is_reference(&current) {
                let resolved = self.resolve(&current)?;
                current = Cow::Owned(resolved);
            }

            let child = child_of(&current, segment)
                .ok_or_else(|| reference_error(path, &format!("'{}' not found", segment)))?
                .clone();
            current = Cow::Owned(child);
        }

        Ok(current.into_owned())
    }
}

/// Returns the child of a mapping (by key) or a sequence (by index).
fn child_of<'v>(node: &'v Value, segment: &str) -> Option<&'v Value> {
    match node {
        Value::Mapping(mapping) => mapping.get(segment),
        Value::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        Value::Tagged(tagged) => child_of(&tagged.value, segment),
        _ => None,
    }
}

/// Extracts the key path from a reference's sequence value.
fn reference_path(value: &Value) -> Result<Vec<String>> {
    let Value::Sequence(items) = value else {
        return Err(CimulatorError::Reference {
            reference: value_to_string(value),
            reason: "a reference must be a list of keys".to_string(),
        });
    };

    let path: Vec<String> = items
        .iter()
        .filter(|item| matches!(item, Value::String(_) | Value::Number(_) | Value::Bool(_)))
        .map(value_to_string)
        .collect();

    if path.is_empty() || path.len() != items.len() {
        return Err(CimulatorError::Reference {
            reference: value_to_string(value),
            reason: "reference keys must be non-empty scalars".to_string(),
        });
    }

    Ok(path)
}

fn format_path(path: &[String]) -> String {
    format!("[{}]", path.join(", "))
}

fn reference_error(path: &[String], reason: &str) -> CimulatorError {
    CimulatorError::Reference {
        reference: format_path(path),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(text: &str) -> Result<Mapping> {
        let mut config: Mapping = serde_yaml::from_str(text).unwrap();
        resolve_references(&mut config)?;
        Ok(config)
    }

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_whole_field_reference() {
        let config = resolved(
            r#"
template:
  rules:
    - if: '$CI_PIPELINE_SOURCE == "merge_request_event"'
      when: always
    - if: '$CI_PIPELINE_SOURCE == "push"'
      when: manual
job1:
  script: ["echo job1"]
  rules: !reference [template, rules]
"#,
        )
        .unwrap();

        assert_eq!(config["job1"]["rules"], config["template"]["rules"]);
        assert_eq!(config["job1"]["rules"].as_sequence().map(Vec::len), Some(2));
    }

    #[test]
    fn test_list_reference_is_spliced_in_place() {
        let config = resolved(
            r#"
template:
  rules:
    - if: '$CI_PIPELINE_SOURCE == "merge_request_event"'
      when: always
    - if: '$CI_PIPELINE_SOURCE == "push"'
      when: manual
job2:
  rules:
    - if: '$CI_PIPELINE_SOURCE == "web"'
      when: manual
    - !reference [template, rules]
    - if: '$CI_PIPELINE_SOURCE == "schedule"'
      when: on_success
"#,
        )
        .unwrap();

        let expected = yaml(
            r#"
- if: '$CI_PIPELINE_SOURCE == "web"'
  when: manual
- if: '$CI_PIPELINE_SOURCE == "merge_request_event"'
  when: always
- if: '$CI_PIPELINE_SOURCE == "push"'
  when: manual
- if: '$CI_PIPELINE_SOURCE == "schedule"'
  when: on_success
"#,
        );
        assert_eq!(config["job2"]["rules"], expected);
    }

    #[test]
    fn test_scalar_reference_in_list_inserted_once() {
        let config = resolved(
            r#"
.vars:
  image: alpine:3
job:
  script:
    - echo start
    - !reference [.vars, image]
    - echo end
"#,
        )
        .unwrap();

        assert_eq!(config["job"]["script"], yaml("[echo start, 'alpine:3', echo end]"));
    }

    #[test]
    fn test_splice_flattens_only_one_level() {
        let config = resolved(
            r#"
.setup:
  script:
    - [nested, pair]
    - single
job:
  script:
    - first
    - !reference [.setup, script]
"#,
        )
        .unwrap();

        assert_eq!(config["job"]["script"], yaml("[first, [nested, pair], single]"));
    }

    #[test]
    fn test_reference_with_anchored_list() {
        let config = resolved(
            r#"
.files: &filelist
  - src/**/*.py
  - requirements.txt
.template:
  rules:
    - changes: *filelist
      when: always
    - when: manual
job_using_template:
  rules: !reference [.template, rules]
"#,
        )
        .unwrap();

        let expected = yaml(
            r#"
- changes: ["src/**/*.py", "requirements.txt"]
  when: always
- when: manual
"#,
        );
        assert_eq!(config["job_using_template"]["rules"], expected);
    }

    #[test]
    fn test_nested_references_reach_fixed_point() {
        let config = resolved(
            r#"
.a:
  script: [a1, a2]
.b:
  script:
    - !reference [.a, script]
    - b1
job:
  script:
    - !reference [.b, script]
    - own
"#,
        )
        .unwrap();

        assert_eq!(config["job"]["script"], yaml("[a1, a2, b1, own]"));
        assert_eq!(config[".b"]["script"], yaml("[a1, a2, b1]"));
    }

    #[test]
    fn test_path_through_reference() {
        let config = resolved(
            r#"
.base:
  variables:
    A: "1"
.alias: !reference [.base]
job:
  variables: !reference [.alias, variables]
"#,
        )
        .unwrap();

        assert_eq!(config["job"]["variables"], yaml("{A: '1'}"));
    }

    #[test]
    fn test_sequence_index_segment() {
        let config = resolved("steps: [zero, one]\njob: {script: !reference [steps, 1]}").unwrap();
        assert_eq!(config["job"]["script"], yaml("one"));
    }

    #[test]
    fn test_missing_target_fails() {
        let result = resolved("job: {rules: !reference [.missing, rules]}");
        let Err(CimulatorError::Reference { reference, .. }) = result else {
            panic!("expected reference error");
        };
        assert_eq!(reference, "[.missing, rules]");
    }

    #[test]
    fn test_reference_cycle_fails() {
        let result = resolved(".a: {x: !reference [.b, x]}\n.b: {x: !reference [.a, x]}");
        assert!(matches!(result, Err(CimulatorError::Reference { .. })));
    }

    #[test]
    fn test_malformed_reference_fails() {
        assert!(resolved("job: {rules: !reference .template}").is_err());
        assert!(resolved("job: {rules: !reference []}").is_err());
        assert!(resolved("a: {b: 1}\njob: {rules: !reference [a, {b: 1}]}").is_err());
    }

    #[test]
    fn test_other_tags_are_kept() {
        let config = resolved("job: {value: !custom [x]}").unwrap();
        assert!(matches!(config["job"]["value"], Value::Tagged(_)));
    }

    #[test]
    fn test_is_reference() {
        assert!(is_reference(&yaml("!reference [a, b]")));
        assert!(!is_reference(&yaml("[a, b]")));
    }
}
