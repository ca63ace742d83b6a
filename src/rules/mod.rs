//! Rules Module
//!
//! The condition language used by `if:` clauses and the evaluation of
//! job and workflow rule lists.
//!
//! - [`lexer`]: Tokens, including `/regex/flags` literals
//! - [`parser`]: Recursive-descent parser producing an [`ast::Condition`]
//! - [`evaluator`]: Condition evaluation and first-match rule selection

pub mod ast;
pub mod evaluator;
pub mod lexer;
pub mod parser;

pub use ast::{Condition, Operand, Pattern};
pub use evaluator::{
    evaluate_condition, evaluate_rules, evaluate_workflow, try_evaluate_condition, ConditionError, EmptyWorkflow,
    RuleOutcome,
};
pub use parser::parse_condition;
