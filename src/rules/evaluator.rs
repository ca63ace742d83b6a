//! Rule Evaluation
//!
//! Evaluates `if:` conditions against the variable store and picks the
//! first matching rule of a rule list. Evaluation fails closed: a condition
//! that cannot be lexed, parsed or compiled counts as `false` and is
//! reported as a [`EventKind::ConditionRejected`] event.

use log::debug;
use regex::RegexBuilder;

use crate::diagnostics::{EventKind, EventSink, SimulationEvent};
use crate::pipeline::model::{Rule, When};
use crate::pipeline::variables::{expand, value_to_string, Variables};

use super::ast::{Condition, Operand, Pattern};
use super::parser::{parse_condition, ParseError};

#[derive(Debug, thiserror::Error)]
pub enum ConditionError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("invalid regex /{pattern}/: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// What to do when the workflow declares no rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyWorkflow {
    /// The pipeline runs
    Run,
    /// Treated as "no rule matched": the pipeline does not run
    #[default]
    Skip,
}

/// Result of evaluating a rule list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleOutcome {
    pub should_run: bool,
    /// The first matching rule, if any
    pub triggered_rule: Option<Rule>,
    /// The matching rule's variables, expanded against the store
    pub applied_variables: Variables,
    /// The matching rule's `if:` text
    pub triggered_condition: Option<String>,
}

impl RuleOutcome {
    /// The outcome when no rule matched.
    pub fn no_match() -> Self {
        Self::default()
    }

    /// Returns true if some rule matched.
    pub fn matched(&self) -> bool {
        self.triggered_rule.is_some()
    }
}

/// Evaluates a condition, surfacing lexing, parsing and regex errors.
pub fn try_evaluate_condition(expr: &str, vars: &Variables) -> Result<bool, ConditionError> {
    let condition = parse_condition(expr)?;
    evaluate(&condition, vars)
}

/// Evaluates a condition. Malformed conditions are `false`.
pub fn evaluate_condition(expr: &str, vars: &Variables, sink: &mut dyn EventSink) -> bool {
    match try_evaluate_condition(expr, vars) {
        Ok(result) => result,
        Err(e) => {
            sink.record(SimulationEvent::new(EventKind::ConditionRejected, expr, e.to_string()));
            false
        }
    }
}

fn evaluate(condition: &Condition, vars: &Variables) -> Result<bool, ConditionError> {
    match condition {
        Condition::Or(operands) => {
            for operand in operands {
                if evaluate(operand, vars)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::And(operands) => {
            for operand in operands {
                if !evaluate(operand, vars)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Equals { left, right, negated } => {
            let equal = operand_text(left, vars) == operand_text(right, vars);
            Ok(equal != *negated)
        }
        Condition::Matches { subject, pattern } => {
            let regex = compile(pattern)?;
            Ok(regex.is_match(&operand_text(subject, vars)))
        }
        Condition::Present(operand) => Ok(!operand_text(operand, vars).is_empty()),
    }
}

/// Unset variables and `null` evaluate to the empty string.
fn operand_text(operand: &Operand, vars: &Variables) -> String {
    match operand {
        Operand::Variable(name) => vars.get(name).map(value_to_string).unwrap_or_default(),
        Operand::Literal(text) => text.clone(),
        Operand::Null => String::new(),
    }
}

fn compile(pattern: &Pattern) -> Result<regex::Regex, ConditionError> {
    RegexBuilder::new(&pattern.source)
        .case_insensitive(pattern.flags.contains('i'))
        .multi_line(pattern.flags.contains('m'))
        .dot_matches_new_line(pattern.flags.contains('s'))
        .build()
        .map_err(|source| ConditionError::InvalidPattern {
            pattern: pattern.source.clone(),
            source,
        })
}

/// Returns the outcome of the first rule whose condition holds.
///
/// A rule without `if:` always matches. The matching rule runs unless its
/// `when` is `never`. An empty list, or a list where nothing matches,
/// yields [`RuleOutcome::no_match`].
pub fn evaluate_rules(rules: &[Rule], vars: &Variables, sink: &mut dyn EventSink) -> RuleOutcome {
    for rule in rules {
        let matched = match &rule.condition {
            None => true,
            Some(expr) => evaluate_condition(expr, vars, sink),
        };
        if !matched {
            continue;
        }

        debug!(
            "Rule matched: if={:?}, when={}",
            rule.condition.as_deref().unwrap_or("<none>"),
            rule.when
        );

        let applied_variables = rule
            .variable_set()
            .into_iter()
            .map(|(name, value)| (name, expand(&value, vars)))
            .collect();

        return RuleOutcome {
            should_run: rule.when != When::Never,
            triggered_rule: Some(rule.clone()),
            applied_variables,
            triggered_condition: rule.condition.clone(),
        };
    }

    RuleOutcome::no_match()
}

/// Evaluates the workflow rules. `None` or an empty list follows `policy`.
pub fn evaluate_workflow(
    rules: Option<&[Rule]>,
    vars: &Variables,
    policy: EmptyWorkflow,
    sink: &mut dyn EventSink,
) -> RuleOutcome {
    match rules {
        Some(rules) if !rules.is_empty() => evaluate_rules(rules, vars, sink),
        _ => RuleOutcome {
            should_run: policy == EmptyWorkflow::Run,
            ..RuleOutcome::no_match()
        },
    }
}
