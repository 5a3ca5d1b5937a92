//! Expression DAG Builder.
//!
//! Turns a parsed rule expression into shared [`Node`]s, deduplicating
//! identical subtrees across every rule submitted to the same build via a
//! structural hash (`Map<Hash, NodeId>`), the same technique the teacher
//! lineage uses for cross-rule subplan sharing: canonicalize, hash, dedup.
//! Canonicalization covers two things (spec §4.2): commutative-operand
//! sorting for `AND`/`OR`/`+`/`*`, and constant folding for `Arith`,
//! `Compare`, and all-`Const` `BoolOp` subtrees — both applied in
//! [`ExprDag::intern`] before a node is hashed.
//!
//! The DAG is build-time-only input to [`crate::category`]; it carries no
//! per-event state itself. Per-event node values live in
//! [`crate::evaluator`]'s cache, indexed by [`NodeId`].

mod builtin;

pub use builtin::BuiltinFn;

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::value::{CompareOp, Value};

/// Dense index into [`ExprDag::nodes`]. Arena-style indexing avoids any
/// cyclic ownership and keeps the compiled DAG trivially `Send + Sync`
/// (spec §9 "Interned categories and predicates").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Quantifier kinds over an array attribute, spec §4.2/§4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantifierKind {
    ForAll,
    ForSome,
    Filter,
    Map,
    Sum,
    Count,
    Min,
    Max,
    Avg,
}

/// One node of the shared expression DAG.
#[derive(Debug, Clone)]
pub enum Node {
    AttrRef(String),
    Const(Value),
    Arith(ArithOp, NodeId, NodeId),
    Compare(CompareOp, NodeId, NodeId),
    BoolOp(BoolOp, Vec<NodeId>),
    If(NodeId, NodeId, NodeId),
    Call(BuiltinFn, Vec<NodeId>),
    Quantifier { kind: QuantifierKind, array_path: String, binder: String, body: NodeId },
}

impl Node {
    /// True for nodes that directly produce a boolean used as a rule
    /// condition leaf rather than an intermediate value — i.e. the things
    /// the category allocator (§4.3) turns into predicates.
    #[must_use]
    pub fn is_predicate_shaped(&self) -> bool {
        matches!(
            self,
            Node::Compare(..)
                | Node::Quantifier { kind: QuantifierKind::ForAll | QuantifierKind::ForSome, .. }
                | Node::Call(BuiltinFn::RegexpMatch | BuiltinFn::ContainsAny, _)
        )
    }
}

/// Shared DAG of expression nodes, with structural-hash-based common
/// subexpression elimination across every rule built into the same
/// `ExprDag`.
#[derive(Debug, Default)]
pub struct ExprDag {
    nodes: Vec<Node>,
    by_hash: HashMap<u64, Vec<NodeId>>,
}

impl ExprDag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn structural_hash(&self, node: &Node) -> u64 {
        let mut hasher = DefaultHasher::new();
        match node {
            Node::AttrRef(path) => {
                0u8.hash(&mut hasher);
                path.hash(&mut hasher);
            }
            Node::Const(v) => {
                1u8.hash(&mut hasher);
                v.structural_hash().hash(&mut hasher);
            }
            Node::Arith(op, l, r) => {
                2u8.hash(&mut hasher);
                (*op as u8).hash(&mut hasher);
                // `+`/`*` are commutative (spec §4.2); canonicalize operand
                // order the same way the `BoolOp` arm below does for
                // `AND`/`OR`, so `x+y` and `y+x` share one node.
                if matches!(op, ArithOp::Add | ArithOp::Mul) {
                    let mut pair = [*l, *r];
                    pair.sort_unstable();
                    pair.hash(&mut hasher);
                } else {
                    l.hash(&mut hasher);
                    r.hash(&mut hasher);
                }
            }
            Node::Compare(op, l, r) => {
                3u8.hash(&mut hasher);
                (*op as u8).hash(&mut hasher);
                l.hash(&mut hasher);
                r.hash(&mut hasher);
            }
            Node::BoolOp(op, children) => {
                4u8.hash(&mut hasher);
                (*op as u8).hash(&mut hasher);
                // Commutative-operand canonicalization: AND/OR are sorted
                // by NodeId before hashing so `a && b` and `b && a` share
                // one node once both operands already exist in the DAG.
                let mut sorted = children.clone();
                if *op != BoolOp::Not {
                    sorted.sort_unstable();
                }
                sorted.hash(&mut hasher);
            }
            Node::If(c, t, e) => {
                5u8.hash(&mut hasher);
                c.hash(&mut hasher);
                t.hash(&mut hasher);
                e.hash(&mut hasher);
            }
            Node::Call(f, args) => {
                6u8.hash(&mut hasher);
                f.as_str().hash(&mut hasher);
                args.hash(&mut hasher);
            }
            Node::Quantifier { kind, array_path, binder, body } => {
                7u8.hash(&mut hasher);
                (*kind as u8).hash(&mut hasher);
                array_path.hash(&mut hasher);
                binder.hash(&mut hasher);
                body.hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// Inserts `node`, returning the id of an existing structurally-equal
    /// node if one was already built (CSE), else the id of a fresh one.
    /// Folds to a `Const` first when every operand is itself already a
    /// `Const` (spec §4.2), so `2+3` and `5` intern to the same node.
    pub fn intern(&mut self, node: Node) -> NodeId {
        let node = self.fold_constants(node);
        let hash = self.structural_hash(&node);
        if let Some(candidates) = self.by_hash.get(&hash) {
            for &candidate in candidates {
                if nodes_structurally_equal(&node, self.node(candidate), self) {
                    return candidate;
                }
            }
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.by_hash.entry(hash).or_default().push(id);
        id
    }

    fn as_const(&self, id: NodeId) -> Option<&Value> {
        match self.node(id) {
            Node::Const(v) => Some(v),
            _ => None,
        }
    }

    fn fold_constants(&self, node: Node) -> Node {
        match &node {
            Node::Arith(op, l, r) => {
                if let (Some(lv), Some(rv)) = (self.as_const(*l), self.as_const(*r)) {
                    let folded = match op {
                        ArithOp::Add => lv.add(rv),
                        ArithOp::Sub => lv.sub(rv),
                        ArithOp::Mul => lv.mul(rv),
                        ArithOp::Div => lv.div(rv),
                    };
                    return Node::Const(folded);
                }
            }
            Node::Compare(op, l, r) => {
                if let (Some(lv), Some(rv)) = (self.as_const(*l), self.as_const(*r)) {
                    return Node::Const(lv.cmp_value(rv, *op));
                }
            }
            Node::BoolOp(BoolOp::Not, children) => {
                if let Some(Value::Bool(b)) = self.as_const(children[0]) {
                    return Node::Const(Value::Bool(!b));
                }
            }
            Node::BoolOp(op, children) if *op != BoolOp::Not => {
                let bools: Option<Vec<bool>> = children
                    .iter()
                    .map(|&c| match self.as_const(c) {
                        Some(Value::Bool(b)) => Some(*b),
                        _ => None,
                    })
                    .collect();
                if let Some(bools) = bools {
                    let folded = match op {
                        BoolOp::And => bools.iter().all(|&b| b),
                        BoolOp::Or => bools.iter().any(|&b| b),
                        BoolOp::Not => unreachable!(),
                    };
                    return Node::Const(Value::Bool(folded));
                }
            }
            _ => {}
        }
        node
    }
}

/// `Hash` collisions are possible; confirm true structural equality before
/// reusing a node id for CSE.
fn nodes_structurally_equal(a: &Node, b: &Node, dag: &ExprDag) -> bool {
    match (a, b) {
        (Node::AttrRef(x), Node::AttrRef(y)) => x == y,
        (Node::Const(x), Node::Const(y)) => x.structural_hash() == y.structural_hash(),
        (Node::Arith(op1, l1, r1), Node::Arith(op2, l2, r2)) => {
            if op1 != op2 {
                return false;
            }
            if matches!(op1, ArithOp::Add | ArithOp::Mul) {
                (l1 == l2 && r1 == r2) || (l1 == r2 && r1 == l2)
            } else {
                l1 == l2 && r1 == r2
            }
        }
        (Node::Compare(op1, l1, r1), Node::Compare(op2, l2, r2)) => {
            op1 == op2 && l1 == l2 && r1 == r2
        }
        (Node::BoolOp(op1, c1), Node::BoolOp(op2, c2)) => {
            if op1 != op2 {
                return false;
            }
            if *op1 == BoolOp::Not {
                return c1 == c2;
            }
            let mut s1 = c1.clone();
            let mut s2 = c2.clone();
            s1.sort_unstable();
            s2.sort_unstable();
            s1 == s2
        }
        (Node::If(c1, t1, e1), Node::If(c2, t2, e2)) => c1 == c2 && t1 == t2 && e1 == e2,
        (Node::Call(f1, a1), Node::Call(f2, a2)) => f1 == f2 && a1 == a2,
        (
            Node::Quantifier { kind: k1, array_path: p1, binder: b1, body: bd1 },
            Node::Quantifier { kind: k2, array_path: p2, binder: b2, body: bd2 },
        ) => k1 == k2 && p1 == p2 && b1 == b2 && bd1 == bd2,
        _ => {
            let _ = dag;
            false
        }
    }
}

impl PartialEq for QuantifierKind {
    fn eq(&self, other: &Self) -> bool {
        *self as u8 == *other as u8
    }
}
impl Eq for QuantifierKind {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_subtrees_across_rules_share_one_node() {
        let mut dag = ExprDag::new();
        let a1 = dag.intern(Node::AttrRef("x".into()));
        let c1 = dag.intern(Node::Const(Value::Int(5)));
        let cmp1 = dag.intern(Node::Compare(CompareOp::Lt, a1, c1));

        // Rebuild the identical subtree for a second rule.
        let a2 = dag.intern(Node::AttrRef("x".into()));
        let c2 = dag.intern(Node::Const(Value::Int(5)));
        let cmp2 = dag.intern(Node::Compare(CompareOp::Lt, a2, c2));

        assert_eq!(a1, a2);
        assert_eq!(c1, c2);
        assert_eq!(cmp1, cmp2);
        assert_eq!(dag.len(), 3);
    }

    #[test]
    fn commutative_and_canonicalizes_operand_order() {
        let mut dag = ExprDag::new();
        let a = dag.intern(Node::AttrRef("a".into()));
        let b = dag.intern(Node::AttrRef("b".into()));
        let ab = dag.intern(Node::BoolOp(BoolOp::And, vec![a, b]));
        let ba = dag.intern(Node::BoolOp(BoolOp::And, vec![b, a]));
        assert_eq!(ab, ba);
    }

    #[test]
    fn distinct_constants_are_distinct_nodes() {
        let mut dag = ExprDag::new();
        let c1 = dag.intern(Node::Const(Value::Int(5)));
        let c2 = dag.intern(Node::Const(Value::Int(6)));
        assert_ne!(c1, c2);
    }

    #[test]
    fn commutative_mul_canonicalizes_operand_order() {
        let mut dag = ExprDag::new();
        let a = dag.intern(Node::AttrRef("a".into()));
        let b = dag.intern(Node::AttrRef("b".into()));
        let ab = dag.intern(Node::Arith(ArithOp::Mul, a, b));
        let ba = dag.intern(Node::Arith(ArithOp::Mul, b, a));
        assert_eq!(ab, ba);
    }

    #[test]
    fn non_commutative_sub_does_not_canonicalize() {
        let mut dag = ExprDag::new();
        let a = dag.intern(Node::AttrRef("a".into()));
        let b = dag.intern(Node::AttrRef("b".into()));
        let ab = dag.intern(Node::Arith(ArithOp::Sub, a, b));
        let ba = dag.intern(Node::Arith(ArithOp::Sub, b, a));
        assert_ne!(ab, ba);
    }

    #[test]
    fn constant_arith_folds_to_the_same_node_as_the_literal_result() {
        let mut dag = ExprDag::new();
        let two = dag.intern(Node::Const(Value::Int(2)));
        let three = dag.intern(Node::Const(Value::Int(3)));
        let sum = dag.intern(Node::Arith(ArithOp::Add, two, three));
        let five = dag.intern(Node::Const(Value::Int(5)));
        assert_eq!(sum, five);
        assert_eq!(dag.len(), 3); // two, three, five/sum — no fourth node
    }

    #[test]
    fn constant_compare_folds_to_a_bool_const() {
        let mut dag = ExprDag::new();
        let two = dag.intern(Node::Const(Value::Int(2)));
        let three = dag.intern(Node::Const(Value::Int(3)));
        let lt = dag.intern(Node::Compare(CompareOp::Lt, two, three));
        let truth = dag.intern(Node::Const(Value::Bool(true)));
        assert_eq!(lt, truth);
    }

    #[test]
    fn constant_bool_op_folds_to_a_bool_const() {
        let mut dag = ExprDag::new();
        let t = dag.intern(Node::Const(Value::Bool(true)));
        let f = dag.intern(Node::Const(Value::Bool(false)));
        let and_node = dag.intern(Node::BoolOp(BoolOp::And, vec![t, f]));
        let falsity = dag.intern(Node::Const(Value::Bool(false)));
        assert_eq!(and_node, falsity);
    }
}
