//! Job Expansion
//!
//! Brings every job into canonical shape before simulation:
//! - `extends` templates are deep-merged underneath the job's own fields
//! - `script`, `before_script` and `after_script` become lists of strings
//!
//! Expansion never fails. Unknown or cyclic templates are reported to the
//! event sink and skipped.

use std::collections::HashMap;

use log::debug;
use serde_yaml::{Mapping, Value};

use crate::config::loader::merge_mappings;
use crate::diagnostics::{EventKind, EventSink, SimulationEvent};

use super::model::JobDefinition;
use super::variables::value_to_string;

/// Fields holding shell command lines.
pub const SCRIPT_FIELDS: &[&str] = &["before_script", "script", "after_script"];

/// Maximum `extends` nesting.
const MAX_EXTENDS_DEPTH: usize = 11;

/// Expands every job, preserving input order.
pub fn expand_all(jobs: &[JobDefinition], sink: &mut dyn EventSink) -> Vec<JobDefinition> {
    let templates: HashMap<&str, &JobDefinition> =
        jobs.iter().map(|job| (job.name.as_str(), job)).collect();

    jobs.iter()
        .map(|job| {
            let mut chain = vec![job.name.clone()];
            let mut body = compose(job, &templates, &mut chain, sink);
            normalize_scripts(&mut body);
            JobDefinition::new(job.name.clone(), body)
        })
        .collect()
}

/// Builds a job body from its templates (in order) plus its own fields.
fn compose(
    job: &JobDefinition,
    templates: &HashMap<&str, &JobDefinition>,
    chain: &mut Vec<String>,
    sink: &mut dyn EventSink,
) -> Mapping {
    let mut composed = Mapping::new();

    for parent in job.extends() {
        if chain.contains(&parent) || chain.len() >= MAX_EXTENDS_DEPTH {
            sink.record(SimulationEvent::new(
                EventKind::TemplateCycle,
                parent.as_str(),
                format!("extends chain {} loops or is too deep", chain.join(" -> ")),
            ));
            continue;
        }

        let Some(template) = templates.get(parent.as_str()) else {
            sink.record(SimulationEvent::new(
                EventKind::TemplateMissing,
                parent.as_str(),
                format!("referenced by '{}'", job.name),
            ));
            continue;
        };

        chain.push(parent.clone());
        let inherited = compose(template, templates, chain, sink);
        chain.pop();

        debug!("Job '{}' inherits from '{}'", job.name, parent);
        merge_mappings(&mut composed, inherited);
    }

    let mut own = job.body.clone();
    own.shift_remove("extends");
    merge_mappings(&mut composed, own);
    composed
}

/// Replaces every script field with its normalized list form.
fn normalize_scripts(body: &mut Mapping) {
    for field in SCRIPT_FIELDS {
        if let Some(value) = body.get_mut(*field) {
            let lines = normalize_script(value);
            *value = Value::Sequence(lines.into_iter().map(Value::String).collect());
        }
    }
}

/// Coerces a script value into an ordered list of command strings.
///
/// A scalar becomes a single line. Nested lists (from anchors or splicing)
/// are flattened. An item YAML parsed as a mapping, such as
/// `- run: echo "x"`, is rendered back to `run: echo "x"`.
///
/// # Example
/// ```
/// use cimulator::pipeline::jobs::normalize_script;
///
/// let value: serde_yaml::Value = serde_yaml::from_str(r#"["make", {run: echo hi}]"#).unwrap();
/// assert_eq!(normalize_script(&value), vec!["make", "run: echo hi"]);
/// ```
pub fn normalize_script(value: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    collect_lines(value, &mut lines);
    lines
}

fn collect_lines(value: &Value, lines: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::Sequence(items) => {
            for item in items {
                collect_lines(item, lines);
            }
        }
        Value::Mapping(mapping) => lines.push(render_mapping_line(mapping)),
        Value::Tagged(tagged) => collect_lines(&tagged.value, lines),
        scalar => lines.push(value_to_string(scalar)),
    }
}

/// Renders a mapping item back into `key: value` text.
fn render_mapping_line(mapping: &Mapping) -> String {
    mapping
        .iter()
        .map(|(key, value)| format!("{}: {}", value_to_string(key), value_to_string(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::EventLog;

    fn job(name: &str, yaml: &str) -> JobDefinition {
        JobDefinition::from_yaml(name, yaml).unwrap()
    }

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_scalar_script_becomes_list() {
        assert_eq!(normalize_script(&yaml("echo hello")), vec!["echo hello"]);
    }

    #[test]
    fn test_script_item_with_colon_stays_text() {
        let value = yaml(
            r#"
- echo "Normal line"
- run: echo "This line has a colon"
- echo "Another normal line"
"#,
        );

        assert_eq!(
            normalize_script(&value),
            vec![
                r#"echo "Normal line""#,
                r#"run: echo "This line has a colon""#,
                r#"echo "Another normal line""#,
            ]
        );
    }

    #[test]
    fn test_nested_script_lists_flatten() {
        let value = yaml("[[a, b], c, [[d]], null, 42]");
        assert_eq!(normalize_script(&value), vec!["a", "b", "c", "d", "42"]);
    }

    #[test]
    fn test_multi_key_item_joins_pairs() {
        let value = yaml("[{a: 1, b: two}]");
        assert_eq!(normalize_script(&value), vec!["a: 1, b: two"]);
    }

    #[test]
    fn test_expand_all_normalizes_every_script_field() {
        let jobs = vec![job(
            "build",
            "before_script: setup\nscript: make\nafter_script: [cleanup]\nimage: rust",
        )];
        let mut log = EventLog::new();

        let expanded = expand_all(&jobs, &mut log);
        let body = &expanded[0].body;

        assert_eq!(body.get("before_script"), Some(&yaml("[setup]")));
        assert_eq!(body.get("script"), Some(&yaml("[make]")));
        assert_eq!(body.get("after_script"), Some(&yaml("[cleanup]")));
        assert_eq!(body.get("image"), Some(&yaml("rust")));
        assert!(log.is_empty());
    }

    #[test]
    fn test_extends_merges_templates_in_order() {
        let jobs = vec![
            job(".base", "image: alpine\nvariables: {A: base, B: base}\ntags: [docker]"),
            job(".deploy", "variables: {B: deploy}\nscript: ./deploy.sh"),
            job("deploy", "extends: [.base, .deploy]\nvariables: {C: own}"),
        ];
        let mut log = EventLog::new();

        let expanded = expand_all(&jobs, &mut log);
        let deploy = &expanded[2];

        assert!(deploy.get("extends").is_none());
        assert_eq!(deploy.get("image"), Some(&yaml("alpine")));
        assert_eq!(deploy.get("variables"), Some(&yaml("{A: base, B: deploy, C: own}")));
        assert_eq!(deploy.get("script"), Some(&yaml("['./deploy.sh']")));
    }

    #[test]
    fn test_extends_is_transitive_and_job_wins() {
        let jobs = vec![
            job(".root", "image: root\nstage: build"),
            job(".middle", "extends: .root\nstage: test"),
            job("leaf", "extends: .middle\nimage: leaf"),
        ];

        let expanded = expand_all(&jobs, &mut EventLog::new());
        let leaf = &expanded[2];

        assert_eq!(leaf.get("image"), Some(&yaml("leaf")));
        assert_eq!(leaf.get("stage"), Some(&yaml("test")));
    }

    #[test]
    fn test_extends_list_replaces_wholesale() {
        let jobs = vec![
            job(".base", "script: [one, two]"),
            job("job", "extends: .base\nscript: [three]"),
        ];

        let expanded = expand_all(&jobs, &mut EventLog::new());
        assert_eq!(expanded[1].get("script"), Some(&yaml("[three]")));
    }

    #[test]
    fn test_missing_template_is_reported() {
        let jobs = vec![job("job", "extends: .ghost\nscript: x")];
        let mut log = EventLog::new();

        let expanded = expand_all(&jobs, &mut log);

        assert_eq!(expanded[0].get("script"), Some(&yaml("[x]")));
        let missing = log.of_kind(&EventKind::TemplateMissing);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].subject, ".ghost");
    }

    #[test]
    fn test_cyclic_extends_terminates() {
        let jobs = vec![
            job(".a", "extends: .b\nimage: a"),
            job(".b", "extends: .a\nimage: b"),
        ];
        let mut log = EventLog::new();

        let expanded = expand_all(&jobs, &mut log);

        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].get("image"), Some(&yaml("a")));
        assert!(!log.of_kind(&EventKind::TemplateCycle).is_empty());
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        let jobs = vec![job("job", "artifacts: {paths: [dist/]}\nretry: 2")];
        let expanded = expand_all(&jobs, &mut EventLog::new());
        assert_eq!(expanded[0].body, jobs[0].body);
    }
}
