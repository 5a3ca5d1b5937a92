//! Category Engine Builder (spec §4.4): turns every rule's normalized
//! `CondTree` into the compiled Filter Table, applying OR-factoring and
//! AND-factoring when the same group recurs across enough rules.
//!
//! Grounded on the teacher's `optimizer/mod.rs` staged-transformation
//! style (named passes applied to a fixed structure, each documented with
//! the algebraic rule it implements) — here staged over rule conditions
//! instead of a single IR tree.

use std::collections::HashMap;

use crate::category::{CatLit, Category, CategoryAllocator, OrCond};
use crate::error::{ValidationError, ValidationErrors};
use crate::metrics::BuilderMetrics;
use crate::rule::{Rule, RuleId};

/// Index into [`FilterTable::cat_set_filters`] / the per-event
/// `match_mask_array`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(pub u32);

/// One category's contribution to one slot: set `mask`'s bits in
/// `match_mask_array[slot]` when the category fires.
#[derive(Debug, Clone, Copy)]
pub struct CatSetMask {
    pub slot: SlotIndex,
    pub mask: u64,
}

/// What happens when a slot reaches its completion value (`!0u64`):
/// synthetic categories to recursively fire, and rules to emit.
#[derive(Debug, Default)]
pub struct CatSetFilter {
    pub cat_set_masks: Vec<CatSetMask>,
    pub rule_set: Vec<RuleId>,
}

/// The compiled bitmask filter table, spec §3 "Filter Table".
#[derive(Debug, Default)]
pub struct FilterTable {
    pub cat_to_csm: HashMap<Category, Vec<CatSetMask>>,
    pub cat_set_filters: Vec<CatSetFilter>,
    /// Initial value of each slot before any category fires (upper bits
    /// of width < 64 slots are pre-set so the completion sentinel is
    /// always `!0u64`, spec §9).
    pub slot_initial: Vec<u64>,
    pub neg_cats: HashMap<Category, Category>,
    pub default_cat_list: Vec<Category>,
    /// Slots whose completion represents a synthetic category's firing,
    /// not yet wired to that category's own downstream contributions
    /// (those are only known once every consuming rule has been built).
    /// Resolved by `wire_synthetic_completions` at the end of the build.
    pending_synthetic_slots: HashMap<Category, Vec<SlotIndex>>,
}

impl FilterTable {
    fn new_slot(&mut self, width: usize) -> SlotIndex {
        let idx = SlotIndex(self.cat_set_filters.len() as u32);
        self.cat_set_filters.push(CatSetFilter::default());
        self.slot_initial.push(initial_slot_value(width));
        idx
    }

    fn add_csm(&mut self, cat: Category, slot: SlotIndex, mask: u64) {
        self.cat_to_csm.entry(cat).or_default().push(CatSetMask { slot, mask });
    }

    /// Once every rule's own slot has been built (and so `cat_to_csm` holds
    /// every downstream contribution of each synthetic category), connect
    /// each factored slot's completion to fire its synthetic category.
    fn wire_synthetic_completions(&mut self) {
        for (synthetic, slots) in std::mem::take(&mut self.pending_synthetic_slots) {
            let downstream = self.cat_to_csm.get(&synthetic).cloned().unwrap_or_default();
            for slot in slots {
                self.cat_set_filters[slot.0 as usize].cat_set_masks = downstream.clone();
            }
        }
    }
}

fn initial_slot_value(width: usize) -> u64 {
    if width >= 64 {
        0
    } else {
        !0u64 << width
    }
}

/// Resolves a `CatLit` to the concrete category whose *firing* should set
/// this literal's bit: the category itself when positive, its negative
/// counterpart when negated (spec §4.4 negation compilation).
fn firing_category(lit: CatLit, neg_cats: &HashMap<Category, Category>) -> Category {
    if lit.negated {
        *neg_cats
            .get(&lit.category)
            .expect("negated literal without a registered negative category")
    } else {
        lit.category
    }
}

/// Builds the Filter Table for `rules`, whose conditions were produced by
/// `allocator`. Returns build diagnostics via [`BuilderMetrics`].
pub fn build_filter_table(
    rules: &[Rule],
    allocator: &CategoryAllocator,
    or_opt_threshold: u32,
    and_opt_threshold: u32,
    max_or_group_width: usize,
) -> Result<(FilterTable, BuilderMetrics), ValidationErrors> {
    let mut errors = Vec::new();
    for rule in rules {
        if rule.condition.0.len() > max_or_group_width {
            errors.push(ValidationError::OrGroupTooWide {
                rule_id: rule.rule_id.0,
                actual: rule.condition.0.len(),
                max_width: max_or_group_width,
            });
        }
    }
    if !errors.is_empty() {
        return Err(ValidationErrors(errors));
    }

    let mut table = FilterTable {
        neg_cats: allocator.neg_cats_snapshot(),
        default_cat_list: allocator.default_categories().to_vec(),
        ..FilterTable::default()
    };
    let mut metrics = BuilderMetrics::default();
    let mut next_synthetic = allocator.num_categories();

    let mut conditions: Vec<Vec<OrCond>> = rules.iter().map(|r| r.condition.0.clone()).collect();

    or_factor(&mut conditions, or_opt_threshold, &mut table, &mut next_synthetic, &mut metrics);
    and_factor(&mut conditions, and_opt_threshold, &mut table, &mut next_synthetic, &mut metrics);

    for (rule, condition) in rules.iter().zip(conditions.into_iter()) {
        emit_rule_slot(&mut table, rule.rule_id, &condition);
    }

    table.wire_synthetic_completions();

    Ok((table, metrics))
}

/// Step 4 (spec §4.4): replace every OR-group that recurs, verbatim,
/// across at least `or_opt_threshold` rules with a single synthetic
/// category, driven by a one-bit auxiliary slot any member sets.
fn or_factor(
    conditions: &mut [Vec<OrCond>],
    or_opt_threshold: u32,
    table: &mut FilterTable,
    next_synthetic: &mut u32,
    metrics: &mut BuilderMetrics,
) {
    if or_opt_threshold == 0 {
        return;
    }
    let mut occurrences: HashMap<Vec<CatLit>, u32> = HashMap::new();
    for condition in conditions.iter() {
        for or_group in condition {
            if or_group.0.len() <= 1 {
                continue;
            }
            *occurrences.entry(or_group.canonical().0).or_insert(0) += 1;
        }
    }

    let mut synthetic_for: HashMap<Vec<CatLit>, Category> = HashMap::new();
    for (canon, count) in &occurrences {
        if *count < or_opt_threshold {
            continue;
        }
        let synthetic = Category(*next_synthetic);
        *next_synthetic += 1;
        let aux_slot = table.new_slot(1);
        for &lit in canon {
            let cat = firing_category(lit, &table.neg_cats);
            table.add_csm(cat, aux_slot, 1);
        }
        table.pending_synthetic_slots.entry(synthetic).or_default().push(aux_slot);
        synthetic_for.insert(canon.clone(), synthetic);
        metrics.or_sets_inlined += 1;
    }

    for condition in conditions.iter_mut() {
        for or_group in condition.iter_mut() {
            if or_group.0.len() <= 1 {
                continue;
            }
            if let Some(&synthetic) = synthetic_for.get(&or_group.canonical().0) {
                *or_group = OrCond(vec![CatLit { category: synthetic, negated: false }]);
            }
        }
    }
}

/// Step 3 (spec §4.4): extract a shared leading run of OR-groups, common
/// to at least `and_opt_threshold` rules, into a synthetic AND-slot whose
/// completion fires one synthetic category. Greedy longest-prefix-first so
/// a rule is only factored once, by its longest shared prefix.
fn and_factor(
    conditions: &mut [Vec<OrCond>],
    and_opt_threshold: u32,
    table: &mut FilterTable,
    next_synthetic: &mut u32,
    metrics: &mut BuilderMetrics,
) {
    if and_opt_threshold == 0 {
        return;
    }
    let max_len = conditions.iter().map(Vec::len).max().unwrap_or(0);
    let mut factored = vec![false; conditions.len()];

    for prefix_len in (1..=max_len).rev() {
        let mut groups: HashMap<Vec<Vec<CatLit>>, Vec<usize>> = HashMap::new();
        for (idx, condition) in conditions.iter().enumerate() {
            if factored[idx] || condition.len() < prefix_len {
                continue;
            }
            let key: Vec<Vec<CatLit>> =
                condition[..prefix_len].iter().map(|g| g.canonical().0).collect();
            groups.entry(key).or_default().push(idx);
        }

        for (prefix, members) in groups {
            if members.len() < and_opt_threshold as usize {
                continue;
            }
            let synthetic = Category(*next_synthetic);
            *next_synthetic += 1;
            let slot = table.new_slot(prefix.len());
            for (bit, or_group) in prefix.iter().enumerate() {
                for &lit in or_group {
                    let cat = firing_category(lit, &table.neg_cats);
                    table.add_csm(cat, slot, 1u64 << bit);
                }
            }
            table.pending_synthetic_slots.entry(synthetic).or_default().push(slot);
            for &idx in &members {
                conditions[idx].splice(
                    0..prefix_len,
                    std::iter::once(OrCond(vec![CatLit { category: synthetic, negated: false }])),
                );
                factored[idx] = true;
            }
            metrics.and_or_sets_inlined += 1;
        }
    }
}

/// Builds the slot for one rule's (already OR/AND-factored) condition and
/// wires its completion to emit `rule_id`.
fn emit_rule_slot(table: &mut FilterTable, rule_id: RuleId, condition: &[OrCond]) {
    let slot = table.new_slot(condition.len());
    for (bit, or_group) in condition.iter().enumerate() {
        for &lit in &or_group.0 {
            let cat = firing_category(lit, &table.neg_cats);
            table.add_csm(cat, slot, 1u64 << bit);
        }
    }
    table.cat_set_filters[slot.0 as usize].rule_set.push(rule_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::CategoryAllocator;
    use crate::expr::{BoolOp, ExprDag, Node};
    use crate::value::{CompareOp, Value};

    fn leaf(dag: &mut ExprDag, attr: &str, v: i64) -> crate::expr::NodeId {
        let a = dag.intern(Node::AttrRef(attr.into()));
        let c = dag.intern(Node::Const(Value::Int(v)));
        dag.intern(Node::Compare(CompareOp::Lt, a, c))
    }

    #[test]
    fn single_rule_and_conjunction_matches_s1() {
        let mut dag = ExprDag::new();
        let p1 = leaf(&mut dag, "x", 100);
        let p2 = leaf(&mut dag, "y", 100);
        let and_node = dag.intern(Node::BoolOp(BoolOp::And, vec![p1, p2]));

        let mut alloc = CategoryAllocator::new();
        let cond = alloc.flatten_condition(&dag, and_node);
        let rule = Rule { rule_id: RuleId(0), condition: cond };

        let (table, _metrics) =
            build_filter_table(&[rule], &alloc, 1, 1, 64).expect("builds");
        assert_eq!(table.cat_set_filters.len(), 1);
        assert_eq!(table.cat_set_filters[0].rule_set, vec![RuleId(0)]);
    }

    #[test]
    fn recurring_or_group_gets_factored() {
        let mut dag = ExprDag::new();
        let p1 = leaf(&mut dag, "a", 1);
        let p2 = leaf(&mut dag, "b", 2);
        let p3 = leaf(&mut dag, "c", 3);
        let shared_or = dag.intern(Node::BoolOp(BoolOp::Or, vec![p1, p2, p3]));
        let tail1 = leaf(&mut dag, "d", 4);
        let tail2 = leaf(&mut dag, "e", 5);
        let rule1_root = dag.intern(Node::BoolOp(BoolOp::And, vec![shared_or, tail1]));
        let rule2_root = dag.intern(Node::BoolOp(BoolOp::And, vec![shared_or, tail2]));

        let mut alloc = CategoryAllocator::new();
        let c1 = alloc.flatten_condition(&dag, rule1_root);
        let c2 = alloc.flatten_condition(&dag, rule2_root);
        let rules =
            vec![Rule { rule_id: RuleId(0), condition: c1 }, Rule { rule_id: RuleId(1), condition: c2 }];

        let (_table, metrics) = build_filter_table(&rules, &alloc, 1, 0, 64).expect("builds");
        assert!(metrics.or_sets_inlined >= 1);
    }
}
