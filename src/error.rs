//! Error taxonomy for the category engine.
//!
//! Build-time failures ([`ValidationError`]) prevent an engine from being
//! compiled at all and are always reported batched. Runtime failures
//! ([`EvalError`]) never abort [`crate::engine::match_event`]; they
//! downgrade the containing predicate to non-firing and are carried as the
//! first-cause payload of a [`crate::value::Value::Error`].

use thiserror::Error;

use crate::value::Kind;

/// A single build-time defect found while compiling rules.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("rule {rule_id} has an empty expression")]
    EmptyExpression { rule_id: u32 },

    #[error("rule {rule_id} calls unknown function '{name}'")]
    UnknownFunction { rule_id: u32, name: String },

    #[error("rule {rule_id} calls '{name}' with {actual} arguments, expected {expected}")]
    ArityMismatch { rule_id: u32, name: String, expected: usize, actual: usize },

    #[error("rule {rule_id} nests quantifiers past the maximum depth of {max_depth}")]
    NestingTooDeep { rule_id: u32, max_depth: usize },

    #[error(
        "rule {rule_id} has an OR-group of {actual} categories, the maximum is {max_width}"
    )]
    OrGroupTooWide { rule_id: u32, actual: usize, max_width: usize },
}

/// A batch of [`ValidationError`]s accumulated across all rules submitted
/// to `compile`. Mirrors the storage engine's practice of returning every
/// defect found rather than failing fast on the first one.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{} validation error(s): {}", .0.len(), join_errors(.0))]
pub struct ValidationErrors(pub Vec<ValidationError>);

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl ValidationErrors {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A runtime failure. Always local: it downgrades the predicate or
/// sub-expression that produced it to a non-firing `Value::Error`/`false`,
/// and never short-circuits the rest of `match_event`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("cannot coerce {from:?} to {to:?}")]
    Coercion { from: Kind, to: Kind },

    #[error("regex pattern failed to compile: {pattern}")]
    RegexCompile { pattern: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("quantifier nesting exceeded the maximum frame depth of {max_depth}")]
    FrameOverflow { max_depth: usize },
}
