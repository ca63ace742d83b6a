//! Variable Expansion
//!
//! Substitutes `$NAME` and `${NAME}` tokens inside strings and nested YAML
//! structures. Expansion is total: an unset variable becomes the empty string
//! and nothing here returns an error.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_yaml::{Mapping, Value};

/// Accumulating variable store: name -> scalar value.
pub type Variables = BTreeMap<String, Value>;

/// Maximum nesting when a variable's value references other variables.
const MAX_EXPANSION_DEPTH: usize = 16;

/// Matches `${NAME}` (tried first) or `$NAME`.
static VARIABLE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("variable token pattern is valid")
});

/// Renders a YAML value as the text used for substitution and comparison.
///
/// Strings are returned verbatim, booleans as `true`/`false`, numbers as
/// written and null as the empty string. Collections render as compact JSON.
///
/// # Example
/// ```
/// use cimulator::pipeline::variables::value_to_string;
/// use serde_yaml::Value;
///
/// assert_eq!(value_to_string(&Value::Bool(true)), "true");
/// assert_eq!(value_to_string(&Value::Null), "");
/// ```
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Tagged(tagged) => value_to_string(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Checks if a string contains a variable token.
pub fn has_variables(text: &str) -> bool {
    VARIABLE_TOKEN.is_match(text)
}

/// Expands every variable token in a string.
///
/// # Example
/// ```
/// use cimulator::pipeline::variables::{expand_in_string, Variables};
/// use serde_yaml::Value;
///
/// let mut vars = Variables::new();
/// vars.insert("NAME".to_string(), Value::String("GitLab".to_string()));
/// assert_eq!(expand_in_string("Hello ${NAME} and $NAME$MISSING!", &vars), "Hello GitLab and GitLab!");
/// ```
pub fn expand_in_string(text: &str, vars: &Variables) -> String {
    let mut stack = Vec::new();
    expand_with_stack(text, vars, &mut stack)
}

fn expand_with_stack(text: &str, vars: &Variables, stack: &mut Vec<String>) -> String {
    if !has_variables(text) {
        return text.to_string();
    }

    VARIABLE_TOKEN
        .replace_all(text, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            resolve_variable(name, vars, stack)
        })
        .into_owned()
}

/// Looks up one variable and expands references inside its value.
fn resolve_variable(name: &str, vars: &Variables, stack: &mut Vec<String>) -> String {
    let Some(value) = vars.get(name) else {
        return String::new();
    };

    // Self-referencing chains collapse to empty
    if stack.iter().any(|n| n == name) || stack.len() >= MAX_EXPANSION_DEPTH {
        return String::new();
    }

    let text = value_to_string(value);
    stack.push(name.to_string());
    let expanded = expand_with_stack(&text, vars, stack);
    stack.pop();
    expanded
}

/// Expands variables in every string inside a YAML structure.
///
/// Mapping keys are left unchanged; sequences keep their order and length;
/// non-string leaves pass through.
pub fn expand(node: &Value, vars: &Variables) -> Value {
    match node {
        Value::String(s) => Value::String(expand_in_string(s, vars)),
        Value::Sequence(items) => Value::Sequence(items.iter().map(|v| expand(v, vars)).collect()),
        Value::Mapping(mapping) => Value::Mapping(expand_mapping(mapping, vars)),
        Value::Tagged(tagged) => {
            let mut tagged = tagged.clone();
            tagged.value = expand(&tagged.value, vars);
            Value::Tagged(tagged)
        }
        other => other.clone(),
    }
}

/// Expands variables in every value of a mapping.
pub fn expand_mapping(mapping: &Mapping, vars: &Variables) -> Mapping {
    mapping
        .iter()
        .map(|(key, value)| (key.clone(), expand(value, vars)))
        .collect()
}

/// Overlays one layer onto the store, replacing keys one level deep.
pub fn overlay(store: &mut Variables, layer: &Variables) {
    for (name, value) in layer {
        store.insert(name.clone(), value.clone());
    }
}

/// Converts a YAML `variables:` mapping into a variable set.
///
/// A value written as `{value: X, description: ...}` contributes `X`.
pub fn variables_from_mapping(mapping: &Mapping) -> Variables {
    mapping
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::Mapping(inner) => inner.get("value").cloned().unwrap_or(Value::Null),
                other => other.clone(),
            };
            (value_to_string(key), value)
        })
        .collect()
}

/// Converts an optional YAML node into a variable set, ignoring non-mappings.
pub fn variables_from_value(value: Option<&Value>) -> Variables {
    match value {
        Some(Value::Mapping(mapping)) => variables_from_mapping(mapping),
        _ => Variables::new(),
    }
}
