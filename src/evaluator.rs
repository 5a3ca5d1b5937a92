//! Predicate Evaluator (spec §4.6): walks the shared expression DAG for
//! one event, caches non-frame-scoped node values, and drives the
//! quantifier frame stack for `forAll`/`forSome`/`filter`/`map`/aggregates.
//!
//! Regex patterns compiled from `Call(RegexpMatch, ...)` nodes are cached
//! per distinct pattern string behind a `RwLock`, since the compiled
//! engine is shared read-only across concurrent `match_event` calls
//! (spec §5) but regex compilation is too expensive to repeat per event.

use std::collections::HashMap;
use std::sync::RwLock;

use regex::Regex;

use crate::error::EvalError;
use crate::expr::{ArithOp, BoolOp, BuiltinFn, ExprDag, Node, NodeId, QuantifierKind};
use crate::resolver::AttributeResolver;
use crate::value::Value;

/// Evaluates the expression DAG against one event via an
/// [`AttributeResolver`]. Immutable and shared across threads; all
/// per-event state lives in the resolver and in a fresh cache built by
/// each call to [`PredicateEvaluator::evaluate`].
pub struct PredicateEvaluator {
    max_frame_depth: usize,
    regex_cache: RwLock<HashMap<String, Regex>>,
}

impl PredicateEvaluator {
    #[must_use]
    pub fn new(max_frame_depth: usize) -> Self {
        PredicateEvaluator { max_frame_depth, regex_cache: RwLock::new(HashMap::new()) }
    }

    /// Evaluates `node` against `resolver`, with a fresh top-level cache.
    /// `frame_depth` starts at 0; while it is 0, non-predicate node values
    /// are memoized per call (spec §4.6 step 2). Caching is suspended
    /// inside any active quantifier frame, since a body subtree's value
    /// depends on the current element binding and would otherwise be
    /// reused incorrectly across iterations.
    pub fn evaluate<R: AttributeResolver>(&self, dag: &ExprDag, node: NodeId, resolver: &R) -> Value {
        let mut cache: HashMap<NodeId, Value> = HashMap::new();
        self.eval(dag, node, resolver, &mut cache, 0)
    }

    fn eval<R: AttributeResolver>(
        &self,
        dag: &ExprDag,
        node_id: NodeId,
        resolver: &R,
        cache: &mut HashMap<NodeId, Value>,
        frame_depth: usize,
    ) -> Value {
        if frame_depth == 0 {
            if let Some(v) = cache.get(&node_id) {
                return v.clone();
            }
        }
        let value = self.eval_uncached(dag, node_id, resolver, cache, frame_depth);
        if frame_depth == 0 {
            cache.insert(node_id, value.clone());
        }
        value
    }

    fn eval_uncached<R: AttributeResolver>(
        &self,
        dag: &ExprDag,
        node_id: NodeId,
        resolver: &R,
        cache: &mut HashMap<NodeId, Value>,
        frame_depth: usize,
    ) -> Value {
        match dag.node(node_id).clone() {
            Node::AttrRef(path) => resolver.resolve(&path),
            Node::Const(v) => v,
            Node::Arith(op, l, r) => {
                let lv = self.eval(dag, l, resolver, cache, frame_depth);
                let rv = self.eval(dag, r, resolver, cache, frame_depth);
                match op {
                    ArithOp::Add => lv.add(&rv),
                    ArithOp::Sub => lv.sub(&rv),
                    ArithOp::Mul => lv.mul(&rv),
                    ArithOp::Div => lv.div(&rv),
                }
            }
            Node::Compare(op, l, r) => {
                let lv = self.eval(dag, l, resolver, cache, frame_depth);
                let rv = self.eval(dag, r, resolver, cache, frame_depth);
                // The AST-level distinction between "a literal null in the
                // rule text" and "a value that merely evaluated to missing"
                // is gone once both sides are plain `Value`s, so it has to
                // be read off the DAG node shape here and threaded through
                // rather than reconstructed in `Value::eq` (spec §4.1).
                let l_is_null_literal = matches!(dag.node(l), Node::Const(Value::Null));
                let r_is_null_literal = matches!(dag.node(r), Node::Const(Value::Null));
                lv.cmp_value_null_aware(&rv, op, l_is_null_literal, r_is_null_literal)
            }
            Node::BoolOp(op, children) => self.eval_bool_op(dag, op, &children, resolver, cache, frame_depth),
            Node::If(c, t, e) => {
                let cv = self.eval(dag, c, resolver, cache, frame_depth);
                match cv {
                    Value::Bool(true) => self.eval(dag, t, resolver, cache, frame_depth),
                    Value::Bool(false) => self.eval(dag, e, resolver, cache, frame_depth),
                    other => other,
                }
            }
            Node::Call(f, args) => self.eval_call(dag, f, &args, resolver, cache, frame_depth),
            Node::Quantifier { kind, array_path, binder, body } => {
                self.eval_quantifier(dag, kind, &array_path, &binder, body, resolver, frame_depth)
            }
        }
    }

    fn eval_bool_op<R: AttributeResolver>(
        &self,
        dag: &ExprDag,
        op: BoolOp,
        children: &[NodeId],
        resolver: &R,
        cache: &mut HashMap<NodeId, Value>,
        frame_depth: usize,
    ) -> Value {
        match op {
            BoolOp::Not => {
                match self.eval(dag, children[0], resolver, cache, frame_depth) {
                    Value::Bool(b) => Value::Bool(!b),
                    Value::Error(e) => Value::Error(e),
                    _ => Value::Undefined,
                }
            }
            BoolOp::And => {
                let mut saw_undefined = false;
                for &child in children {
                    match self.eval(dag, child, resolver, cache, frame_depth) {
                        Value::Bool(false) => return Value::Bool(false),
                        Value::Bool(true) => {}
                        _ => saw_undefined = true,
                    }
                }
                if saw_undefined {
                    Value::Undefined
                } else {
                    Value::Bool(true)
                }
            }
            BoolOp::Or => {
                let mut saw_undefined = false;
                for &child in children {
                    match self.eval(dag, child, resolver, cache, frame_depth) {
                        Value::Bool(true) => return Value::Bool(true),
                        Value::Bool(false) => {}
                        _ => saw_undefined = true,
                    }
                }
                if saw_undefined {
                    Value::Undefined
                } else {
                    Value::Bool(false)
                }
            }
        }
    }

    fn eval_call<R: AttributeResolver>(
        &self,
        dag: &ExprDag,
        f: BuiltinFn,
        args: &[NodeId],
        resolver: &R,
        cache: &mut HashMap<NodeId, Value>,
        frame_depth: usize,
    ) -> Value {
        let values: Vec<Value> =
            args.iter().map(|&a| self.eval(dag, a, resolver, cache, frame_depth)).collect();
        if values.iter().any(Value::is_missing) && !matches!(f, BuiltinFn::Now) {
            return Value::Undefined;
        }
        match f {
            BuiltinFn::RegexpMatch => self.eval_regexp_match(&values),
            BuiltinFn::ContainsAny => {
                let Value::String(hay) = &values[0] else { return Value::Bool(false) };
                Value::Bool(values[1..].iter().any(|needle| match needle {
                    Value::String(n) => hay.contains(n.as_str()),
                    _ => false,
                }))
            }
            BuiltinFn::Abs => match values[0].to_f64() {
                Some(n) => Value::Float(n.abs()),
                None => Value::Undefined,
            },
            BuiltinFn::Ceil => match values[0].to_f64() {
                Some(n) => Value::Int(n.ceil() as i64),
                None => Value::Undefined,
            },
            BuiltinFn::Floor => match values[0].to_f64() {
                Some(n) => Value::Int(n.floor() as i64),
                None => Value::Undefined,
            },
            BuiltinFn::Round => {
                let digits = values.get(1).and_then(Value::to_f64).unwrap_or(0.0) as i32;
                let factor = 10f64.powi(digits);
                match values[0].to_f64() {
                    Some(n) => Value::Float((n * factor).round() / factor),
                    None => Value::Undefined,
                }
            }
            BuiltinFn::Pow => match (values[0].to_f64(), values[1].to_f64()) {
                (Some(b), Some(e)) => Value::Float(b.powf(e)),
                _ => Value::Undefined,
            },
            BuiltinFn::Length => match &values[0] {
                Value::String(s) => Value::Int(s.chars().count() as i64),
                Value::List(items) => Value::Int(items.len() as i64),
                _ => Value::Undefined,
            },
            BuiltinFn::Now => Value::Time(chrono::Utc::now()),
            BuiltinFn::Date => values[0].coerce(crate::value::Kind::Time),
            BuiltinFn::Days => values[0].to_f64().map_or(Value::Undefined, |n| crate::value::days(n as i64)),
            BuiltinFn::Hours => {
                values[0].to_f64().map_or(Value::Undefined, |n| crate::value::hours(n as i64))
            }
            BuiltinFn::Minutes => {
                values[0].to_f64().map_or(Value::Undefined, |n| crate::value::minutes(n as i64))
            }
            BuiltinFn::Seconds => {
                values[0].to_f64().map_or(Value::Undefined, |n| crate::value::seconds(n as i64))
            }
            BuiltinFn::Min => reduce_numeric(&values, f64::min),
            BuiltinFn::Max => reduce_numeric(&values, f64::max),
        }
    }

    fn eval_regexp_match(&self, values: &[Value]) -> Value {
        let (Value::String(pattern), Value::String(text)) = (&values[0], &values[1]) else {
            return Value::Bool(false);
        };
        if let Ok(cache) = self.regex_cache.read() {
            if let Some(re) = cache.get(pattern) {
                return Value::Bool(re.is_match(text));
            }
        }
        match Regex::new(pattern) {
            Ok(re) => {
                let matched = re.is_match(text);
                if let Ok(mut cache) = self.regex_cache.write() {
                    cache.insert(pattern.clone(), re);
                }
                Value::Bool(matched)
            }
            Err(_) => Value::Error(std::sync::Arc::new(EvalError::RegexCompile { pattern: pattern.clone() })),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_quantifier<R: AttributeResolver>(
        &self,
        dag: &ExprDag,
        kind: QuantifierKind,
        array_path: &str,
        binder: &str,
        body: NodeId,
        resolver: &R,
        frame_depth: usize,
    ) -> Value {
        // Resolved Open Question (SPEC_FULL.md §13): a missing or null
        // array yields Undefined, never an empty list/vacuous result.
        let Some(len) = resolver.array_len(array_path) else {
            return Value::Undefined;
        };
        if frame_depth >= self.max_frame_depth {
            return Value::Error(std::sync::Arc::new(EvalError::FrameOverflow {
                max_depth: self.max_frame_depth,
            }));
        }
        match kind {
            QuantifierKind::ForAll if len == 0 => return Value::Bool(true),
            QuantifierKind::ForSome if len == 0 => return Value::Bool(false),
            _ => {}
        }

        let mut numeric_values = Vec::new();
        let mut list_values = Vec::new();
        for (_index, element) in resolver.iter(array_path) {
            let _guard = resolver.frame_scope(binder, element);
            let mut body_cache = HashMap::new();
            let body_value = self.eval(dag, body, resolver, &mut body_cache, frame_depth + 1);

            match kind {
                QuantifierKind::ForAll => {
                    if !body_value.is_true() {
                        return Value::Bool(false);
                    }
                }
                QuantifierKind::ForSome => {
                    if body_value.is_true() {
                        return Value::Bool(true);
                    }
                }
                QuantifierKind::Filter => {
                    if body_value.is_true() {
                        // Filter re-evaluates the binder itself as the
                        // retained element, not the predicate's result.
                        list_values.push(resolver.resolve(binder));
                    }
                }
                QuantifierKind::Map => {
                    if !body_value.is_missing() {
                        list_values.push(body_value);
                    }
                }
                QuantifierKind::Sum
                | QuantifierKind::Count
                | QuantifierKind::Min
                | QuantifierKind::Max
                | QuantifierKind::Avg => {
                    if let Some(n) = body_value.to_f64() {
                        numeric_values.push(n);
                    }
                }
            }
        }

        match kind {
            QuantifierKind::ForAll => Value::Bool(true),
            QuantifierKind::ForSome => Value::Bool(false),
            QuantifierKind::Filter | QuantifierKind::Map => Value::List(list_values),
            QuantifierKind::Sum => {
                if numeric_values.is_empty() {
                    Value::Undefined
                } else {
                    Value::Float(numeric_values.iter().sum())
                }
            }
            QuantifierKind::Count => {
                if numeric_values.is_empty() {
                    Value::Undefined
                } else {
                    Value::Int(numeric_values.len() as i64)
                }
            }
            QuantifierKind::Avg => {
                if numeric_values.is_empty() {
                    Value::Undefined
                } else {
                    Value::Float(numeric_values.iter().sum::<f64>() / numeric_values.len() as f64)
                }
            }
            QuantifierKind::Min => numeric_values
                .into_iter()
                .fold(None, |acc: Option<f64>, n| Some(acc.map_or(n, |a| a.min(n))))
                .map_or(Value::Undefined, Value::Float),
            QuantifierKind::Max => numeric_values
                .into_iter()
                .fold(None, |acc: Option<f64>, n| Some(acc.map_or(n, |a| a.max(n))))
                .map_or(Value::Undefined, Value::Float),
        }
    }
}

fn reduce_numeric(values: &[Value], f: impl Fn(f64, f64) -> f64) -> Value {
    let mut nums = values.iter().filter_map(Value::to_f64);
    match nums.next() {
        Some(first) => Value::Float(nums.fold(first, f)),
        None => Value::Undefined,
    }
}
