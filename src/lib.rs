//! # categoria
//!
//! A compiled bitmask rule engine (spec §1-2): matches a rule set against
//! streamed events in time proportional to the number of categories that
//! *fire* for an event, not the number of rules registered.
//!
//! ## Pipeline
//!
//! ### Build time
//! ```text
//! ParsedRule (caller-parsed expression tree in a shared ExprDag)
//!     ↓
//! [expr::ExprDag]               → structurally-deduplicated DAG nodes
//!     ↓
//! [category::CategoryAllocator] → one Category per distinct predicate,
//!                                  flattened per-rule AND-of-OR CondTree
//!     ↓
//! [category_engine::builder]    → OR-factoring, AND-factoring, bitmask
//!                                  Filter Table
//!     ↓
//! engine::CompiledEngine
//! ```
//!
//! ### Per event
//! ```text
//! AttributeResolver (caller-supplied event view)
//!     ↓
//! [evaluator::PredicateEvaluator] → evaluates every predicate-shaped node
//!     ↓
//! fired Categories
//!     ↓
//! [category_engine::runtime]      → OR-accumulates into bitmask slots,
//!                                    recurses through synthetic-category
//!                                    cascades, emits each matched rule at
//!                                    most once
//!     ↓
//! Vec<RuleId>
//! ```
//!
//! ## Module organization
//!
//! | Module            | Purpose |
//! |-------------------|---------|
//! | `value`           | Tagged operand kernel: coercion, three-valued comparison, arithmetic |
//! | `expr`            | Shared expression DAG with structural-hash CSE |
//! | `category`        | Predicate → Category allocation, AND-of-OR condition flattening |
//! | `rule`            | Compiled rule identity and metadata |
//! | `category_engine` | Filter Table construction (`builder`) and per-event evaluation (`runtime`) |
//! | `evaluator`        | Predicate Evaluator: DAG walk, quantifier frames, builtin dispatch |
//! | `resolver`         | `AttributeResolver` contract the evaluator queries per event |
//! | `engine`           | `compile`/`match_event`/`rule_metadata` facade |
//! | `config`           | Hierarchical configuration (`figment`: toml + env) |
//! | `error`            | Build-time `ValidationError`s and runtime `EvalError`s |
//! | `metrics`          | Advisory build-time and per-event counters |

pub mod category;
pub mod category_engine;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod metrics;
pub mod resolver;
pub mod rule;
pub mod value;

pub use category::{CatLit, Category, CategoryAllocator, CondTree, OrCond};
pub use category_engine::{build_filter_table, CatSetFilter, CatSetMask, FilterTable, SlotIndex};
pub use config::Config;
pub use engine::{CompiledEngine, Options, ParsedRule};
pub use error::{EvalError, ValidationError, ValidationErrors};
pub use evaluator::PredicateEvaluator;
pub use expr::{ArithOp, BoolOp, BuiltinFn, ExprDag, Node, NodeId, QuantifierKind};
pub use metrics::{BuilderMetrics, EngineMetrics};
pub use resolver::{AttributeResolver, FrameGuard};
pub use rule::{Metadata, Rule, RuleId};
pub use value::{CompareOp, Kind, Value};
