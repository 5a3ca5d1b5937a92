//! Predicate -> Category allocation (spec §4.3).
//!
//! Walks the shared [`crate::expr::ExprDag`] bottom-up, giving every
//! distinct predicate-shaped node a dense [`Category`] id the first time
//! it is seen, and flattening each rule's boolean-composite root into an
//! AND-of-OR-of-(possibly negated) categories (a [`CondTree`]).
//!
//! Grounded on the teacher's `catalog.rs` registration pattern: a
//! `HashMap`-backed interning table with `register_*`/`get_*` accessor
//! pairs, generalized here from string keys to DAG node ids.

use std::collections::HashMap;

use crate::expr::{ExprDag, Node, NodeId};

/// Dense id naming a distinct atomic predicate, a default/negative
/// category, or a synthetic (factored) category (spec §3 "Category").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Category(pub u32);

/// One (possibly negated) category occurrence inside an OR-group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CatLit {
    pub category: Category,
    pub negated: bool,
}

/// An OR-group: at least one member category literal must fire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrCond(pub Vec<CatLit>);

impl OrCond {
    /// Canonical form used to detect recurring OR-groups across rules for
    /// OR-factoring (spec §4.4 step 4): member order doesn't change the
    /// group's meaning, so sort before comparing/hashing.
    #[must_use]
    pub fn canonical(&self) -> OrCond {
        let mut lits = self.0.clone();
        lits.sort_unstable_by_key(|l| (l.category.0, l.negated));
        OrCond(lits)
    }
}

/// A rule's normalized condition: AND of OR-groups (spec §3, §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondTree(pub Vec<OrCond>);

/// Assigns dense category ids to predicate nodes and tracks default/
/// negative category pairs.
#[derive(Debug, Default)]
pub struct CategoryAllocator {
    node_to_category: HashMap<NodeId, Category>,
    next_category: u32,
    /// For each default category, its auto-generated negative counterpart
    /// (spec §4.3 "Default handling", §4.4 negation compilation).
    neg_cats: HashMap<Category, Category>,
    default_cats: Vec<Category>,
}

impl CategoryAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_category(&mut self) -> Category {
        let id = Category(self.next_category);
        self.next_category += 1;
        id
    }

    /// Returns the category for `node`, allocating one the first time this
    /// node id is seen. Two rules that share a DAG node (already CSE'd by
    /// `ExprDag::intern`) therefore always share one category.
    pub fn category_for(&mut self, node: NodeId) -> Category {
        if let Some(&cat) = self.node_to_category.get(&node) {
            return cat;
        }
        let cat = self.fresh_category();
        self.node_to_category.insert(node, cat);
        cat
    }

    /// Registers `node` as a default predicate (an attribute comparison
    /// whose path may not resolve): allocates its negative counterpart
    /// eagerly so the runtime can always look it up.
    pub fn register_default(&mut self, node: NodeId) -> Category {
        let cat = self.category_for(node);
        self.neg_cats.entry(cat).or_insert_with(|| {
            let neg = Category(self.next_category);
            self.next_category += 1;
            neg
        });
        if !self.default_cats.contains(&cat) {
            self.default_cats.push(cat);
        }
        cat
    }

    #[must_use]
    pub fn negative_of(&self, cat: Category) -> Option<Category> {
        self.neg_cats.get(&cat).copied()
    }

    #[must_use]
    pub fn neg_cats_snapshot(&self) -> HashMap<Category, Category> {
        self.neg_cats.clone()
    }

    /// Every predicate node that was allocated a category, keyed by node
    /// id — the per-event evaluator's driving table (spec §4.6 step 3).
    #[must_use]
    pub fn node_categories(&self) -> &HashMap<NodeId, Category> {
        &self.node_to_category
    }

    #[must_use]
    pub fn is_default_category(&self, cat: Category) -> bool {
        self.default_cats.contains(&cat)
    }

    #[must_use]
    pub fn default_categories(&self) -> &[Category] {
        &self.default_cats
    }

    #[must_use]
    pub fn num_categories(&self) -> u32 {
        self.next_category
    }

    /// Flattens a rule's boolean-composite root into AND-of-OR-of-literal
    /// form. `Node::BoolOp(Not, [x])` negates whatever literal `x` reduces
    /// to; nested `And`/`Or` are associatively merged into their parent
    /// group, matching spec §4.3's "flattened into a per-rule CNF-ish
    /// tree".
    pub fn flatten_condition(&mut self, dag: &ExprDag, root: NodeId) -> CondTree {
        let mut ands = Vec::new();
        self.collect_and(dag, root, false, &mut ands);
        CondTree(ands)
    }

    fn collect_and(&mut self, dag: &ExprDag, node: NodeId, negated: bool, out: &mut Vec<OrCond>) {
        match dag.node(node) {
            Node::BoolOp(crate::expr::BoolOp::And, children) if !negated => {
                for &child in children {
                    self.collect_and(dag, child, false, out);
                }
            }
            Node::BoolOp(crate::expr::BoolOp::Or, children) if negated => {
                // De Morgan: NOT(a || b) == NOT(a) && NOT(b)
                for &child in children {
                    self.collect_and(dag, child, true, out);
                }
            }
            Node::BoolOp(crate::expr::BoolOp::Not, children) => {
                self.collect_and(dag, children[0], !negated, out);
            }
            _ => {
                out.push(self.collect_or(dag, node, negated));
            }
        }
    }

    fn collect_or(&mut self, dag: &ExprDag, node: NodeId, negated: bool) -> OrCond {
        let mut lits = Vec::new();
        self.collect_or_into(dag, node, negated, &mut lits);
        OrCond(lits)
    }

    fn collect_or_into(&mut self, dag: &ExprDag, node: NodeId, negated: bool, out: &mut Vec<CatLit>) {
        match dag.node(node) {
            Node::BoolOp(crate::expr::BoolOp::Or, children) if !negated => {
                for &child in children {
                    self.collect_or_into(dag, child, false, out);
                }
            }
            Node::BoolOp(crate::expr::BoolOp::And, children) if negated => {
                for &child in children {
                    self.collect_or_into(dag, child, true, out);
                }
            }
            Node::BoolOp(crate::expr::BoolOp::Not, children) => {
                self.collect_or_into(dag, children[0], !negated, out);
            }
            _ => {
                // A negated leaf needs its negative counterpart fired
                // whenever the underlying predicate did not fire this
                // event — exactly the default-category bookkeeping spec
                // §4.4 describes for NOT ("treat the negation as an OR
                // over negative categories"), so register it the same way
                // as an attribute-missing default predicate.
                let cat = if negated { self.register_default(node) } else { self.category_for(node) };
                out.push(CatLit { category: cat, negated });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BoolOp, Node};
    use crate::value::{CompareOp, Value};

    fn leaf(dag: &mut ExprDag, attr: &str, v: i64) -> NodeId {
        let a = dag.intern(Node::AttrRef(attr.into()));
        let c = dag.intern(Node::Const(Value::Int(v)));
        dag.intern(Node::Compare(CompareOp::Lt, a, c))
    }

    #[test]
    fn shared_predicate_gets_one_category_across_rules() {
        let mut dag = ExprDag::new();
        let p1 = leaf(&mut dag, "x", 100);
        let p2 = leaf(&mut dag, "x", 100); // identical, CSE'd to same node
        assert_eq!(p1, p2);

        let mut alloc = CategoryAllocator::new();
        assert_eq!(alloc.category_for(p1), alloc.category_for(p2));
    }

    #[test]
    fn and_flattens_to_multiple_or_groups() {
        let mut dag = ExprDag::new();
        let p1 = leaf(&mut dag, "x", 100);
        let p2 = leaf(&mut dag, "y", 50);
        let and_node = dag.intern(Node::BoolOp(BoolOp::And, vec![p1, p2]));

        let mut alloc = CategoryAllocator::new();
        let tree = alloc.flatten_condition(&dag, and_node);
        assert_eq!(tree.0.len(), 2);
        assert_eq!(tree.0[0].0.len(), 1);
        assert_eq!(tree.0[1].0.len(), 1);
    }

    #[test]
    fn not_of_or_distributes_to_and_of_negated_literals() {
        let mut dag = ExprDag::new();
        let p1 = leaf(&mut dag, "x", 100);
        let p2 = leaf(&mut dag, "y", 50);
        let or_node = dag.intern(Node::BoolOp(BoolOp::Or, vec![p1, p2]));
        let not_node = dag.intern(Node::BoolOp(BoolOp::Not, vec![or_node]));

        let mut alloc = CategoryAllocator::new();
        let tree = alloc.flatten_condition(&dag, not_node);
        assert_eq!(tree.0.len(), 2);
        assert!(tree.0[0].0[0].negated);
        assert!(tree.0[1].0[0].negated);
    }

    #[test]
    fn default_category_gets_a_negative_counterpart() {
        let mut dag = ExprDag::new();
        let p1 = leaf(&mut dag, "x", 100);
        let mut alloc = CategoryAllocator::new();
        let cat = alloc.register_default(p1);
        assert!(alloc.negative_of(cat).is_some());
        assert_eq!(alloc.default_categories(), &[cat]);
    }
}
