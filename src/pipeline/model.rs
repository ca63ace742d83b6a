//! Pipeline Data Model
//!
//! Typed views over the resolved configuration: the pipeline as a whole,
//! its jobs, rules and needs. Job bodies stay as YAML mappings so fields
//! the simulator does not interpret are carried through untouched.
//!
//! # Example YAML Format
//!
//! ```yaml
//! variables:
//!   DEPLOY_ENV: staging
//!
//! workflow:
//!   rules:
//!     - if: '$CI_PIPELINE_SOURCE == "push"'
//!       variables:
//!         PIPELINE: push_pipeline
//!
//! .base:
//!   image: alpine
//!
//! deploy:
//!   extends: .base
//!   script: ./deploy.sh $DEPLOY_ENV
//!   needs:
//!     - build
//!     - job: lint
//!       optional: true
//!   rules:
//!     - if: '$CI_COMMIT_BRANCH == "main"'
//!       when: manual
//!     - when: never
//! ```

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Serialize, Serializer};
use serde_yaml::{Mapping, Value};

use super::variables::{value_to_string, variables_from_value, Variables};

/// Top-level keys that configure the pipeline rather than define jobs.
pub const RESERVED_KEYS: &[&str] = &[
    "default",
    "include",
    "stages",
    "variables",
    "workflow",
    "image",
    "services",
    "cache",
    "before_script",
    "after_script",
];

/// When a selected rule lets a job (or the workflow) run.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum When {
    #[default]
    Always,
    Manual,
    Never,
    OnSuccess,
    OnFailure,
    Delayed,
}

impl FromStr for When {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "always" => Ok(Self::Always),
            "manual" => Ok(Self::Manual),
            "never" => Ok(Self::Never),
            "on_success" => Ok(Self::OnSuccess),
            "on_failure" => Ok(Self::OnFailure),
            "delayed" => Ok(Self::Delayed),
            other => Err(format!("unknown 'when' value: '{}'", other)),
        }
    }
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Always => "always",
            Self::Manual => "manual",
            Self::Never => "never",
            Self::OnSuccess => "on_success",
            Self::OnFailure => "on_failure",
            Self::Delayed => "delayed",
        };
        f.write_str(text)
    }
}

/// A single rule: optional condition, `when` and variables.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Rule {
    /// Condition expression (`if:`); absent means the rule always matches
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Run decision when this rule is selected
    pub when: When,

    /// Variables contributed when this rule is selected
    #[serde(skip_serializing_if = "Mapping::is_empty")]
    pub variables: Mapping,

    /// Other rule keys (`changes`, `exists`, ...) kept verbatim
    #[serde(flatten)]
    pub extra: Mapping,
}

impl Rule {
    /// Creates a rule with the given condition and default `when: always`.
    pub fn new(condition: impl Into<String>) -> Self {
        Self {
            condition: Some(condition.into()),
            ..Self::default()
        }
    }

    /// Creates a rule without condition.
    pub fn unconditional(when: When) -> Self {
        Self {
            when,
            ..Self::default()
        }
    }

    /// Sets the `when` value.
    pub fn with_when(mut self, when: When) -> Self {
        self.when = when;
        self
    }

    /// Adds a rule variable.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables
            .insert(Value::String(name.into()), Value::String(value.into()));
        self
    }

    /// Builds a rule from a YAML rule entry. Returns `None` for non-mappings.
    ///
    /// A non-string `if` is kept as its text and left to the evaluator;
    /// an unknown `when` falls back to `always`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let Value::Mapping(mapping) = value else {
            return None;
        };

        let mut rule = Self::default();
        for (key, value) in mapping {
            match key.as_str() {
                Some("if") if value.is_null() => rule.condition = None,
                Some("if") => rule.condition = Some(value_to_string(value)),
                Some("when") => {
                    rule.when = value_to_string(value).parse().unwrap_or_else(|e: String| {
                        debug!("{}, treating as 'always'", e);
                        When::Always
                    });
                }
                Some("variables") => {
                    if let Value::Mapping(vars) = value {
                        rule.variables = vars.clone();
                    }
                }
                _ => {
                    rule.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Some(rule)
    }

    /// Returns the rule's variables as a variable set.
    pub fn variable_set(&self) -> Variables {
        super::variables::variables_from_mapping(&self.variables)
    }
}

/// Parses a YAML `rules:` list, dropping entries that are not mappings.
///
/// Returns the rules and the number of ignored entries.
pub fn rules_from_value(value: Option<&Value>) -> (Vec<Rule>, usize) {
    let Some(Value::Sequence(items)) = value else {
        return (Vec::new(), 0);
    };

    let rules: Vec<Rule> = items.iter().filter_map(Rule::from_value).collect();
    let ignored = items.len() - rules.len();
    (rules, ignored)
}

/// A dependency of one job on another.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Need {
    /// Name of the job that must run
    pub job: String,
    /// Whether the dependency may be absent
    pub optional: bool,
}

impl Need {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            optional: false,
        }
    }

    pub fn optional(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            optional: true,
        }
    }

    /// Normalizes a `needs:` entry: a bare name or `{job, optional}`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => Some(Self::new(name.clone())),
            Value::Mapping(mapping) => {
                let job = mapping.get("job")?.as_str()?.to_string();
                let optional = mapping
                    .get("optional")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                Some(Self { job, optional })
            }
            _ => None,
        }
    }
}

/// A job entry: its name and its (possibly expanded) YAML body.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDefinition {
    pub name: String,
    pub body: Mapping,
}

impl JobDefinition {
    pub fn new(name: impl Into<String>, body: Mapping) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    /// Parses a job from YAML text. Intended for tests and tooling.
    pub fn from_yaml(name: impl Into<String>, yaml: &str) -> Result<Self, serde_yaml::Error> {
        let body: Mapping = serde_yaml::from_str(yaml)?;
        Ok(Self::new(name, body))
    }

    /// Hidden jobs (names starting with `.`) are templates and never run.
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }

    /// Gets a field of the job body.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    /// Returns the job's rules, skipping malformed entries.
    pub fn rules(&self) -> Vec<Rule> {
        rules_from_value(self.get("rules")).0
    }

    /// Returns true if the job declares a non-empty `rules` list.
    pub fn has_rules(&self) -> bool {
        matches!(self.get("rules"), Some(Value::Sequence(items)) if !items.is_empty())
    }

    /// Returns the job's needs in declaration order.
    pub fn needs(&self) -> Vec<Need> {
        match self.get("needs") {
            Some(Value::Sequence(items)) => items.iter().filter_map(Need::from_value).collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the template names listed under `extends`.
    pub fn extends(&self) -> Vec<String> {
        match self.get("extends") {
            Some(Value::String(name)) => vec![name.clone()],
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the script lines if `script` is already a list of strings.
    pub fn script(&self) -> Vec<String> {
        match self.get("script") {
            Some(Value::Sequence(items)) => items.iter().map(value_to_string).collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![value_to_string(other)],
        }
    }

    /// Returns the job's own `variables:` block.
    pub fn variables(&self) -> Variables {
        variables_from_value(self.get("variables"))
    }
}

/// Serializes jobs as an ordered mapping of name -> body.
pub fn serialize_jobs<S: Serializer>(jobs: &[JobDefinition], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(jobs.iter().map(|job| (&job.name, &job.body)))
}

/// A resolved pipeline split into its parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    /// Top-level `variables:` block
    pub variables: Variables,

    /// `workflow: rules:`; `None` when no rules are declared
    pub workflow_rules: Option<Vec<Rule>>,

    /// Declared stage names
    pub stages: Vec<String>,

    /// Every job entry, hidden templates included, in merged order
    pub jobs: Vec<JobDefinition>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits a resolved configuration into variables, workflow, stages and jobs.
    ///
    /// Non-reserved keys become jobs only when their value is a mapping.
    pub fn from_config(config: &Mapping) -> Self {
        let workflow_rules = match config.get("workflow") {
            Some(Value::Mapping(workflow)) => match workflow.get("rules") {
                Some(rules @ Value::Sequence(_)) => Some(rules_from_value(Some(rules)).0),
                _ => None,
            },
            _ => None,
        };

        let stages = match config.get("stages") {
            Some(Value::Sequence(items)) => items.iter().map(value_to_string).collect(),
            _ => Vec::new(),
        };

        let jobs = config
            .iter()
            .filter_map(|(key, value)| {
                let name = key.as_str()?;
                if RESERVED_KEYS.contains(&name) {
                    return None;
                }
                match value {
                    Value::Mapping(body) => Some(JobDefinition::new(name, body.clone())),
                    _ => None,
                }
            })
            .collect();

        Self {
            variables: variables_from_value(config.get("variables")),
            workflow_rules,
            stages,
            jobs,
        }
    }

    /// Returns the jobs that can be simulated (non-hidden).
    pub fn visible_jobs(&self) -> impl Iterator<Item = &JobDefinition> {
        self.jobs.iter().filter(|j| !j.is_hidden())
    }

    /// Returns the number of job entries, templates included.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if the pipeline has no job entries.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
