//! Top-level engine facade (spec §6): `compile`/`match_event`/
//! `rule_metadata`.
//!
//! Grounded on the teacher's `DatalogEngine` pipeline-method style: a
//! single struct owning every compiled artifact, with one method per
//! external interface and `tracing` spans at the same granularity the
//! teacher instruments its own build/query methods (replacing the
//! teacher's `DATALOG_DEBUG`-gated `eprintln!` diagnostics with structured
//! spans per SPEC_FULL.md §10.2).

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, instrument};

use crate::category::{Category, CategoryAllocator};
use crate::category_engine::builder::{build_filter_table, FilterTable};
use crate::category_engine::runtime::{
    apply_cat_set_masks_batched, apply_default_negatives, MatchState,
};
use crate::error::ValidationErrors;
use crate::evaluator::PredicateEvaluator;
use crate::expr::{ExprDag, NodeId};
use crate::metrics::{BuilderMetrics, EngineMetrics};
use crate::resolver::AttributeResolver;
use crate::rule::{Metadata, Rule, RuleId};

/// One rule as submitted to `compile`: its id, the root of its condition
/// in the caller-supplied [`ExprDag`], and whatever metadata the caller
/// wants echoed back through [`CompiledEngine::rule_metadata`].
#[derive(Debug, Clone)]
pub struct ParsedRule {
    pub rule_id: RuleId,
    pub root: NodeId,
    pub metadata: Metadata,
}

/// Per-`compile()`-call tuning (spec §6 "Options"). Falls back to
/// [`crate::config::Config`]'s defaults when constructed via
/// [`Options::from_config`].
#[derive(Debug, Clone)]
pub struct Options {
    pub or_opt_threshold: u32,
    pub and_opt_threshold: u32,
    pub verbose: bool,
    pub max_frame_depth: usize,
    pub max_or_group_width: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options::from_config(&crate::config::Config::default())
    }
}

impl Options {
    #[must_use]
    pub fn from_config(config: &crate::config::Config) -> Self {
        Options {
            or_opt_threshold: config.thresholds.or_opt_threshold,
            and_opt_threshold: config.thresholds.and_opt_threshold,
            verbose: config.thresholds.verbose,
            max_frame_depth: config.limits.max_frame_depth,
            max_or_group_width: config.limits.max_or_group_width,
        }
    }
}

/// A compiled rule set: the shared expression DAG, the category
/// allocation over it, the bitmask filter table, and per-rule metadata.
/// Immutable and `Send + Sync` once built, so one instance can serve
/// `match_event` calls from many threads concurrently (spec §5).
pub struct CompiledEngine {
    dag: ExprDag,
    allocator: CategoryAllocator,
    filter_table: FilterTable,
    evaluator: PredicateEvaluator,
    metadata: HashMap<RuleId, Metadata>,
    builder_metrics: BuilderMetrics,
    metrics: EngineMetrics,
}

impl CompiledEngine {
    /// Compiles `rules` (already parsed into `dag` by the caller) into a
    /// ready-to-query engine. Returns every validation defect found rather
    /// than failing on the first one (spec §7).
    #[instrument(skip(dag, rules), fields(num_rules = rules.len()))]
    pub fn compile(
        dag: ExprDag,
        rules: Vec<ParsedRule>,
        opts: &Options,
    ) -> Result<CompiledEngine, ValidationErrors> {
        let mut allocator = CategoryAllocator::new();
        let mut compiled_rules = Vec::with_capacity(rules.len());
        let mut metadata = HashMap::with_capacity(rules.len());

        for parsed in &rules {
            let condition = allocator.flatten_condition(&dag, parsed.root);
            compiled_rules.push(Rule { rule_id: parsed.rule_id, condition });
            metadata.insert(parsed.rule_id, parsed.metadata.clone());
        }

        let (filter_table, builder_metrics) = build_filter_table(
            &compiled_rules,
            &allocator,
            opts.or_opt_threshold,
            opts.and_opt_threshold,
            opts.max_or_group_width,
        )?;

        if opts.verbose {
            info!(
                or_sets_inlined = builder_metrics.or_sets_inlined,
                and_or_sets_inlined = builder_metrics.and_or_sets_inlined,
                num_categories = allocator.num_categories(),
                "compiled rule set"
            );
        }

        Ok(CompiledEngine {
            dag,
            allocator,
            filter_table,
            evaluator: PredicateEvaluator::new(opts.max_frame_depth),
            metadata,
            builder_metrics,
            metrics: EngineMetrics::default(),
        })
    }

    /// Evaluates every predicate category against one event, fires the
    /// bitmask filter table, and returns the distinct rules that matched.
    /// Order is not meaningful; the result is deduplicated and sorted by
    /// [`RuleId`] so repeated calls with the same event are
    /// byte-for-byte identical regardless of category evaluation order
    /// (spec §8 "Order-independence").
    #[instrument(skip(self, resolver))]
    pub fn match_event<R: AttributeResolver>(&self, resolver: &R) -> Vec<RuleId> {
        let mut state = MatchState::new(&self.filter_table);
        let mut fired_defaults: HashSet<Category> = HashSet::new();
        let mut fired_categories: Vec<Category> = Vec::new();

        for (&node_id, &category) in self.allocator.node_categories() {
            let value = self.evaluator.evaluate(&self.dag, node_id, resolver);
            if self.allocator.is_default_category(category) {
                // A default predicate's own firing still sets its bit
                // normally; it's only the *absence* of firing that the
                // negative-counterpart pass below needs to know about.
                if value.is_true() {
                    fired_defaults.insert(category);
                    fired_categories.push(category);
                }
            } else if value.is_true() {
                fired_categories.push(category);
            }
        }
        // Runs the batch-of-4 path (spec §4.5) rather than firing
        // categories one at a time, so the scalar-SIMD runtime variant is
        // actually exercised on the hot per-event path.
        apply_cat_set_masks_batched(&self.filter_table, &fired_categories, &mut state);
        apply_default_negatives(&self.filter_table, &fired_defaults, &mut state);

        self.metrics.record_cat_evals(state.num_cat_evals());
        self.metrics.record_rules_matched(state.result.len() as u64);
        self.metrics.record_event();
        debug!(num_matched = state.result.len(), "match_event finished");

        state.result.sort_unstable();
        state.result.dedup();
        state.result
    }

    /// Metadata attached to `rule_id` at `compile()` time, if any.
    #[must_use]
    pub fn rule_metadata(&self, rule_id: RuleId) -> Option<&Metadata> {
        self.metadata.get(&rule_id)
    }

    #[must_use]
    pub fn builder_metrics(&self) -> &BuilderMetrics {
        &self.builder_metrics
    }

    #[must_use]
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BoolOp, Node};
    use crate::value::{CompareOp, Value};
    use std::cell::RefCell;
    use std::collections::HashMap as Map;

    struct MapResolver {
        fields: Map<String, Value>,
        frame: RefCell<Vec<(String, Value)>>,
    }
    struct NoopGuard;
    impl crate::resolver::FrameGuard for NoopGuard {}
    impl AttributeResolver for MapResolver {
        fn resolve(&self, path: &str) -> Value {
            self.fields.get(path).cloned().unwrap_or(Value::Undefined)
        }
        fn array_len(&self, _path: &str) -> Option<usize> {
            None
        }
        fn iter(&self, _path: &str) -> Box<dyn Iterator<Item = (usize, Value)> + '_> {
            Box::new(std::iter::empty())
        }
        fn frame_scope<'a>(&'a self, _binder: &str, _element: Value) -> Box<dyn crate::resolver::FrameGuard + 'a> {
            Box::new(NoopGuard)
        }
    }

    #[test]
    fn s1_both_attributes_present_matches() {
        let mut dag = ExprDag::new();
        let x = dag.intern(Node::AttrRef("x".into()));
        let c100 = dag.intern(Node::Const(Value::Int(100)));
        let p1 = dag.intern(Node::Compare(CompareOp::Lt, x, c100));
        let y = dag.intern(Node::AttrRef("y".into()));
        let p2 = dag.intern(Node::Compare(CompareOp::Lt, y, c100));
        let root = dag.intern(Node::BoolOp(BoolOp::And, vec![p1, p2]));

        let rules = vec![ParsedRule { rule_id: RuleId(0), root, metadata: Metadata::default() }];
        let opts = Options::default();
        let engine = CompiledEngine::compile(dag, rules, &opts).expect("compiles");

        let resolver = MapResolver {
            fields: Map::from([("x".to_string(), Value::Int(1)), ("y".to_string(), Value::Int(1))]),
            frame: RefCell::new(Vec::new()),
        };
        assert_eq!(engine.match_event(&resolver), vec![RuleId(0)]);
    }

    #[test]
    fn s1_missing_attribute_does_not_match() {
        let mut dag = ExprDag::new();
        let x = dag.intern(Node::AttrRef("x".into()));
        let c100 = dag.intern(Node::Const(Value::Int(100)));
        let p1 = dag.intern(Node::Compare(CompareOp::Lt, x, c100));
        let y = dag.intern(Node::AttrRef("y".into()));
        let p2 = dag.intern(Node::Compare(CompareOp::Lt, y, c100));
        let root = dag.intern(Node::BoolOp(BoolOp::And, vec![p1, p2]));

        let rules = vec![ParsedRule { rule_id: RuleId(0), root, metadata: Metadata::default() }];
        let opts = Options::default();
        let engine = CompiledEngine::compile(dag, rules, &opts).expect("compiles");

        let resolver = MapResolver {
            fields: Map::from([("x".to_string(), Value::Int(1))]),
            frame: RefCell::new(Vec::new()),
        };
        assert!(engine.match_event(&resolver).is_empty());
    }

    #[test]
    fn rule_metadata_is_echoed_back() {
        let mut dag = ExprDag::new();
        let x = dag.intern(Node::AttrRef("x".into()));
        let c0 = dag.intern(Node::Const(Value::Int(0)));
        let root = dag.intern(Node::Compare(CompareOp::Gt, x, c0));
        let meta = Metadata { name: Some("positive-x".into()), tags: vec!["demo".into()] };
        let rules = vec![ParsedRule { rule_id: RuleId(7), root, metadata: meta.clone() }];
        let engine = CompiledEngine::compile(dag, rules, &Options::default()).expect("compiles");
        assert_eq!(engine.rule_metadata(RuleId(7)).unwrap().name, meta.name);
        assert!(engine.rule_metadata(RuleId(8)).is_none());
    }

    #[test]
    fn negated_predicate_matches_when_attribute_absent() {
        let mut dag = ExprDag::new();
        let flag = dag.intern(Node::AttrRef("flagged".into()));
        let t = dag.intern(Node::Const(Value::Bool(true)));
        let is_flagged = dag.intern(Node::Compare(CompareOp::Eq, flag, t));
        let root = dag.intern(Node::BoolOp(BoolOp::Not, vec![is_flagged]));

        let rules = vec![ParsedRule { rule_id: RuleId(0), root, metadata: Metadata::default() }];
        let engine = CompiledEngine::compile(dag, rules, &Options::default()).expect("compiles");

        let resolver = MapResolver { fields: Map::new(), frame: RefCell::new(Vec::new()) };
        assert_eq!(engine.match_event(&resolver), vec![RuleId(0)]);
    }
}
