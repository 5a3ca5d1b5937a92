//! Tagged operand values for the category engine.
//!
//! Every attribute resolved from an event, every constant in a rule
//! expression, and every intermediate result of arithmetic or a quantifier
//! body is a [`Value`]. The kernel defines a small coercion lattice between
//! kinds and a three-state-like propagation of [`Value::Null`] /
//! [`Value::Undefined`] / [`Value::Error`] through comparisons and
//! arithmetic, so the evaluator never has to special-case missing data at
//! each call site.
//!
//! # Example
//!
//! ```
//! use categoria::value::Value;
//!
//! let a = Value::Int(2);
//! let b = Value::Float(3.5);
//! assert_eq!(a.add(&b), Value::Float(5.5));
//!
//! let missing = Value::Undefined;
//! assert_eq!(missing.add(&a), Value::Undefined);
//! ```

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::EvalError;

/// The kind tag of a [`Value`], used for coercion-target lookups and error
/// messages. Kept separate from `Value` itself so callers can ask "what
/// kind is this" without cloning a potentially large list/string payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Int,
    Float,
    String,
    Bool,
    Time,
    Null,
    Undefined,
    Error,
    List,
}

/// A value flowing through predicate evaluation.
///
/// `Null`, `Undefined`, and `Error` are distinct: `Null` is an explicit
/// JSON/YAML null in the event; `Undefined` is a field that was never
/// present (or the result of an operation that touched one); `Error` is a
/// failed coercion or division by zero, carrying the first cause.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    /// UTC instant. Ordering compares the instant, never a textual or
    /// zone-relative representation.
    Time(DateTime<Utc>),
    Null,
    Undefined,
    Error(Arc<EvalError>),
    List(Vec<Value>),
}

impl Value {
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
            Value::String(_) => Kind::String,
            Value::Bool(_) => Kind::Bool,
            Value::Time(_) => Kind::Time,
            Value::Null => Kind::Null,
            Value::Undefined => Kind::Undefined,
            Value::Error(_) => Kind::Error,
            Value::List(_) => Kind::List,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    fn error(cause: EvalError) -> Value {
        Value::Error(Arc::new(cause))
    }

    /// Attempts to view this value as `f64`, following the coercion lattice
    /// (spec §4.1): bool coerces 1/0, numeric strings parse.
    /// Public numeric view used by the evaluator's aggregate quantifiers
    /// (`sum`/`avg`/`min`/`max`), which skip any element that isn't
    /// numeric rather than erroring the whole aggregate.
    #[must_use]
    pub fn to_f64(&self) -> Option<f64> {
        self.as_f64()
    }

    /// True only for a concrete `Bool(true)` — the single notion of
    /// "fires" used throughout predicate evaluation. `Undefined`/`Error`
    /// and `Bool(false)` are all non-firing.
    #[must_use]
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(if *b { 1 } else { 0 }),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(*t),
            Value::String(s) => parse_time(s),
            _ => None,
        }
    }

    /// Coerces to the requested kind, per the lattice in spec §3. Returns
    /// `Value::Error` when the coercion is not representable.
    #[must_use]
    pub fn coerce(&self, target: Kind) -> Value {
        if self.kind() == target {
            return self.clone();
        }
        match target {
            Kind::Float => self.as_f64().map(Value::Float).unwrap_or_else(|| {
                Value::error(EvalError::Coercion { from: self.kind(), to: target })
            }),
            Kind::Int => self.as_i64().map(Value::Int).unwrap_or_else(|| {
                Value::error(EvalError::Coercion { from: self.kind(), to: target })
            }),
            Kind::Time => self.as_time().map(Value::Time).unwrap_or_else(|| {
                Value::error(EvalError::Coercion { from: self.kind(), to: target })
            }),
            Kind::String => Value::String(self.to_display_string()),
            Kind::Bool => match self {
                Value::Bool(b) => Value::Bool(*b),
                Value::Int(i) => Value::Bool(*i != 0),
                Value::Float(f) => Value::Bool(*f != 0.0),
                _ => Value::error(EvalError::Coercion { from: self.kind(), to: target }),
            },
            _ => Value::error(EvalError::Coercion { from: self.kind(), to: target }),
        }
    }

    fn to_display_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Time(t) => t.to_rfc3339(),
            Value::Null => "null".to_string(),
            _ => String::new(),
        }
    }

    /// Structural equality: always concrete, never propagates `Undefined`.
    /// Backs `PartialEq` (Rust-level comparisons — tests, assertions) and
    /// the literal-null-aware branch of [`Value::eq_null_aware`]. Distinct
    /// from the rule-language [`Value::eq`], which can yield `Undefined`.
    fn structural_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null)
            | (Value::Undefined, Value::Undefined)
            | (Value::Null, Value::Undefined)
            | (Value::Undefined, Value::Null) => true,
            (Value::Null | Value::Undefined, _) | (_, Value::Null | Value::Undefined) => false,
            (Value::Error(_), _) | (_, Value::Error(_)) => false,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.structural_eq(y))
            }
            _ => self.partial_cmp_values(other) == Some(Ordering::Equal),
        }
    }

    /// Rule-language equality (spec §4.1): `Undefined` if either operand is
    /// `Null`/`Undefined`, concrete `Bool` otherwise. A literal `null`
    /// comparand is the one exception to the `Undefined` rule — see
    /// [`Value::eq_null_aware`], which the evaluator calls instead whenever
    /// the DAG shows one side of the comparison is a `Const(Null)` node.
    #[must_use]
    pub fn eq(&self, other: &Value) -> Value {
        if self.is_missing() || other.is_missing() {
            return Value::Undefined;
        }
        Value::Bool(self.structural_eq(other))
    }

    /// Equality aware of whether either *source expression* was the literal
    /// `null` constant, not just whether the resulting value happens to be
    /// missing (spec §4.1: "Undefined if either is Null/Undefined, except
    /// when the other operand is a Null-literal comparand"). The evaluator
    /// derives `self_is_null_literal`/`other_is_null_literal` from the DAG
    /// node shape before values are computed, since that distinction is
    /// lost once both sides are plain [`Value`]s.
    #[must_use]
    pub fn eq_null_aware(
        &self,
        other: &Value,
        self_is_null_literal: bool,
        other_is_null_literal: bool,
    ) -> Value {
        if !self.is_missing() && !other.is_missing() {
            return self.eq(other);
        }
        if self_is_null_literal || other_is_null_literal {
            return Value::Bool(self.is_missing() == other.is_missing());
        }
        Value::Undefined
    }

    /// Ordering comparison, with no literal-null awareness (no exception
    /// applies to `<`/`<=`/`>`/`>=`). Use [`Value::cmp_value_null_aware`]
    /// when the operator may be `Eq`/`Ne`.
    #[must_use]
    pub fn cmp_value(&self, other: &Value, op: CompareOp) -> Value {
        self.cmp_value_null_aware(other, op, false, false)
    }

    /// As [`Value::cmp_value`], but for `Eq`/`Ne` defers to
    /// [`Value::eq_null_aware`] with the caller-supplied literal-null flags.
    /// Ordering operators ignore the flags entirely — the literal-null
    /// exception is specific to equality (spec §4.1).
    #[must_use]
    pub fn cmp_value_null_aware(
        &self,
        other: &Value,
        op: CompareOp,
        self_is_null_literal: bool,
        other_is_null_literal: bool,
    ) -> Value {
        if matches!(self, Value::Error(_)) || matches!(other, Value::Error(_)) {
            return Value::Bool(false);
        }
        if op == CompareOp::Eq || op == CompareOp::Ne {
            let eq = self.eq_null_aware(other, self_is_null_literal, other_is_null_literal);
            return if op == CompareOp::Eq {
                eq
            } else {
                match eq {
                    Value::Bool(b) => Value::Bool(!b),
                    other => other,
                }
            };
        }
        if self.is_missing() || other.is_missing() {
            return Value::Undefined;
        }
        match self.partial_cmp_values(other) {
            Some(ord) => Value::Bool(match op {
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Le => ord != Ordering::Greater,
                CompareOp::Gt => ord == Ordering::Greater,
                CompareOp::Ge => ord != Ordering::Less,
                CompareOp::Eq | CompareOp::Ne => unreachable!(),
            }),
            None => Value::Undefined,
        }
    }

    fn partial_cmp_values(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Time(a), Value::Time(b)) => a.partial_cmp(b),
            (Value::Time(_), _) | (_, Value::Time(_)) => {
                self.as_time()?.partial_cmp(&other.as_time()?)
            }
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }

    /// Numeric binary op dispatch shared by `add`/`sub`/`mul`/`div`.
    fn numeric_binop(
        &self,
        other: &Value,
        int_op: impl Fn(i64, i64) -> Option<i64>,
        float_op: impl Fn(f64, f64) -> f64,
    ) -> Value {
        if matches!(self, Value::Error(_)) || matches!(other, Value::Error(_)) {
            return Value::error(EvalError::Coercion { from: self.kind(), to: Kind::Float });
        }
        if self.is_missing() || other.is_missing() {
            return Value::Undefined;
        }
        if let (Value::Time(a), Value::Time(b)) = (self, other) {
            let nanos = (*a - *b).num_nanoseconds().unwrap_or(0);
            return Value::Int(nanos);
        }
        if let Value::Time(t) = self {
            if let Some(delta) = other.as_i64() {
                return Value::Time(*t + chrono::Duration::nanoseconds(delta));
            }
        }
        match (self.kind(), other.kind()) {
            (Kind::Int, Kind::Int) => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => match int_op(a, b) {
                    Some(r) => Value::Int(r),
                    None => Value::error(EvalError::DivisionByZero),
                },
                _ => Value::error(EvalError::Coercion { from: self.kind(), to: Kind::Int }),
            },
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Value::Float(float_op(a, b)),
                _ => Value::error(EvalError::Coercion { from: self.kind(), to: Kind::Float }),
            },
        }
    }

    #[must_use]
    pub fn add(&self, other: &Value) -> Value {
        self.numeric_binop(other, |a, b| a.checked_add(b), |a, b| a + b)
    }

    #[must_use]
    pub fn sub(&self, other: &Value) -> Value {
        self.numeric_binop(other, |a, b| a.checked_sub(b), |a, b| a - b)
    }

    #[must_use]
    pub fn mul(&self, other: &Value) -> Value {
        self.numeric_binop(other, |a, b| a.checked_mul(b), |a, b| a * b)
    }

    #[must_use]
    pub fn div(&self, other: &Value) -> Value {
        self.numeric_binop(
            other,
            |a, b| if b == 0 { None } else { a.checked_div(b) },
            |a, b| a / b,
        )
    }

    #[must_use]
    pub fn neg(&self) -> Value {
        match self {
            Value::Int(i) => Value::Int(-i),
            Value::Float(f) => Value::Float(-f),
            Value::Null | Value::Undefined => Value::Undefined,
            Value::Error(_) => self.clone(),
            _ => Value::error(EvalError::Coercion { from: self.kind(), to: Kind::Float }),
        }
    }

    /// Kind-prefixed hash so `Int(1)` and `Float(1.0)` collide (numerically
    /// equal constants must land on the same DAG node for CSE to work)
    /// while other kinds never accidentally collide.
    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        match self {
            Value::Int(i) => {
                0u8.hash(&mut hasher);
                (*i as f64).to_bits().hash(&mut hasher);
            }
            Value::Float(f) => {
                0u8.hash(&mut hasher);
                f.to_bits().hash(&mut hasher);
            }
            Value::String(s) => {
                1u8.hash(&mut hasher);
                s.hash(&mut hasher);
            }
            Value::Bool(b) => {
                2u8.hash(&mut hasher);
                b.hash(&mut hasher);
            }
            Value::Time(t) => {
                3u8.hash(&mut hasher);
                t.timestamp_nanos_opt().unwrap_or_default().hash(&mut hasher);
            }
            Value::Null => 4u8.hash(&mut hasher),
            Value::Undefined => 5u8.hash(&mut hasher),
            Value::Error(_) => 6u8.hash(&mut hasher),
            Value::List(items) => {
                7u8.hash(&mut hasher);
                for item in items {
                    item.structural_hash().hash(&mut hasher);
                }
            }
        }
        hasher.finish()
    }
}

/// Tolerant RFC3339-first timestamp parse; falls back to a short list of
/// common date formats before giving up.
fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(DateTime::from_naive_utc_and_offset(date.and_hms_opt(0, 0, 0)?, Utc));
    }
    None
}

/// Duration constructors, spec §4.1: all return nanosecond `Int`s.
#[must_use]
pub fn days(n: i64) -> Value {
    Value::Int(n * 24 * 60 * 60 * 1_000_000_000)
}

#[must_use]
pub fn hours(n: i64) -> Value {
    Value::Int(n * 60 * 60 * 1_000_000_000)
}

#[must_use]
pub fn minutes(n: i64) -> Value {
    Value::Int(n * 60 * 1_000_000_000)
}

#[must_use]
pub fn seconds(n: i64) -> Value {
    Value::Int(n * 1_000_000_000)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.structural_eq(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_float_add_coerces_to_float() {
        assert_eq!(Value::Int(2).add(&Value::Float(3.5)), Value::Float(5.5));
    }

    #[test]
    fn missing_propagates_through_arithmetic() {
        assert_eq!(Value::Undefined.add(&Value::Int(1)), Value::Undefined);
        assert_eq!(Value::Null.add(&Value::Int(1)), Value::Undefined);
    }

    #[test]
    fn division_by_zero_is_error_not_panic() {
        assert!(matches!(Value::Int(1).div(&Value::Int(0)), Value::Error(_)));
    }

    #[test]
    fn general_eq_is_undefined_for_two_independently_missing_operands() {
        // No literal `null` involved on either side (e.g. two attributes
        // that both happen to be absent) — spec §4.1's general rule.
        assert!(matches!(Value::Null.eq(&Value::Null), Value::Undefined));
        assert!(matches!(Value::Undefined.eq(&Value::Null), Value::Undefined));
        assert!(matches!(Value::Undefined.eq(&Value::Undefined), Value::Undefined));
    }

    #[test]
    fn null_literal_comparand_makes_equality_concrete() {
        // `attr == null` with a missing attribute: the literal on the right
        // makes the result a concrete bool, per spec §4.1's exception.
        assert_eq!(Value::Undefined.eq_null_aware(&Value::Null, false, true), Value::Bool(true));
        assert_eq!(Value::Null.eq_null_aware(&Value::Null, false, true), Value::Bool(true));
        // `attr == null` where attr actually resolved to a concrete value.
        assert_eq!(Value::Int(5).eq_null_aware(&Value::Null, false, true), Value::Bool(false));
    }

    #[test]
    fn two_missing_attributes_without_a_null_literal_stay_undefined() {
        assert!(matches!(Value::Undefined.eq_null_aware(&Value::Null, false, false), Value::Undefined));
    }

    #[test]
    fn ordering_against_null_is_undefined() {
        assert!(matches!(
            Value::Int(1).cmp_value(&Value::Null, CompareOp::Lt),
            Value::Undefined
        ));
    }

    #[test]
    fn time_minus_time_is_nanoseconds() {
        let a = Value::Time(
            DateTime::parse_from_rfc3339("2024-01-15T13:00:00Z").unwrap().with_timezone(&Utc),
        );
        let b = Value::Time(
            DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z").unwrap().with_timezone(&Utc),
        );
        assert_eq!(a.sub(&b), Value::Int(3_600_000_000_000));
    }

    #[test]
    fn int_and_float_structural_hash_collide() {
        assert_eq!(Value::Int(1).structural_hash(), Value::Float(1.0).structural_hash());
    }

    #[test]
    fn duration_constructors_are_nanoseconds() {
        assert_eq!(seconds(1), Value::Int(1_000_000_000));
        assert_eq!(minutes(1), seconds(60));
        assert_eq!(hours(1), minutes(60));
        assert_eq!(days(1), hours(24));
    }
}
