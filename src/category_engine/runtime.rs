//! Category Engine Runtime: `apply_cat_set_masks` (spec §4.5).
//!
//! Grounded on the teacher's `bloom_filter.rs` bit-array-as-`Vec<u64>`
//! storage idiom: a flat vector of words, mutated in place, with no
//! allocation on the hot path.

use crate::category::Category;
use crate::category_engine::builder::FilterTable;
use crate::rule::RuleId;

/// Sentinel marking a slot as complete (all conjuncts satisfied) or
/// already-emitted; spec §9 chooses `!0u64` over a signed `-1` to avoid
/// sign ambiguity while keeping width-independent semantics.
pub const SLOT_COMPLETE: u64 = !0u64;

/// Per-call scratch state (spec §3 "Event-time state"). Own one per
/// `match_event` call; never shared across concurrent calls.
pub struct MatchState {
    pub match_mask_array: Vec<u64>,
    pub result: Vec<RuleId>,
    num_cat_evals: u64,
}

impl MatchState {
    #[must_use]
    pub fn new(table: &FilterTable) -> Self {
        MatchState {
            match_mask_array: table.slot_initial.clone(),
            result: Vec::new(),
            num_cat_evals: 0,
        }
    }

    #[must_use]
    pub fn num_cat_evals(&self) -> u64 {
        self.num_cat_evals
    }
}

/// Applies one fired category to the filter table, recursing into
/// synthetic categories whose driving slot just completed. At-most-once
/// rule emission falls out of the `SLOT_COMPLETE` absorbing state: a slot
/// that has already reached it is skipped on every subsequent update.
pub fn apply_cat_set_masks(table: &FilterTable, cat: Category, state: &mut MatchState) {
    state.num_cat_evals += 1;
    let Some(csms) = table.cat_to_csm.get(&cat) else { return };
    for csm in csms {
        let slot = csm.slot.0 as usize;
        let current = state.match_mask_array[slot];
        if current == SLOT_COMPLETE {
            continue;
        }
        let updated = current | csm.mask;
        state.match_mask_array[slot] = updated;
        if updated == SLOT_COMPLETE {
            let filter = &table.cat_set_filters[slot];
            state.result.extend_from_slice(&filter.rule_set);
            // Recurse on every synthetic category this slot's completion
            // drives, applying their own downstream contributions the same
            // way a directly-fired category would.
            for nested in &filter.cat_set_masks {
                apply_nested(table, nested, state);
            }
        }
    }
}

/// Applies a single pre-resolved `CatSetMask` (a synthetic category's
/// downstream contribution) without looking it back up by category id —
/// `cat_set_masks` is already the flattened `cat_to_csm` entry for that
/// category (see `builder::wire_synthetic_completions`).
fn apply_nested(
    table: &FilterTable,
    csm: &crate::category_engine::builder::CatSetMask,
    state: &mut MatchState,
) {
    let slot = csm.slot.0 as usize;
    let current = state.match_mask_array[slot];
    if current == SLOT_COMPLETE {
        return;
    }
    let updated = current | csm.mask;
    state.match_mask_array[slot] = updated;
    if updated == SLOT_COMPLETE {
        let filter = &table.cat_set_filters[slot];
        state.result.extend_from_slice(&filter.rule_set);
        for nested in &filter.cat_set_masks {
            apply_nested(table, nested, state);
        }
    }
}

/// After all event-fired categories (and their synthetic cascades) have
/// been applied, fire the negative counterpart of every default category
/// that did not itself fire (spec §4.5 "Default categories").
pub fn apply_default_negatives(
    table: &FilterTable,
    fired_default_cats: &std::collections::HashSet<Category>,
    state: &mut MatchState,
) {
    for &default_cat in &table.default_cat_list {
        if fired_default_cats.contains(&default_cat) {
            continue;
        }
        if let Some(&neg) = table.neg_cats.get(&default_cat) {
            apply_cat_set_masks(table, neg, state);
        }
    }
}

/// Batches CSM updates four at a time when their slot indices are
/// pairwise distinct, falling back to the scalar path otherwise. Kept as
/// safe, branch-friendly scalar code (no intrinsics, no external SIMD
/// dependency — see `SPEC_FULL.md` §13): the compiler auto-vectorizes the
/// four independent loads/ORs/stores when slots don't alias, and
/// correctness never depends on it doing so.
pub fn apply_cat_set_masks_batched(table: &FilterTable, cats: &[Category], state: &mut MatchState) {
    let mut i = 0;
    while i + 4 <= cats.len() {
        let batch = &cats[i..i + 4];
        let csm_lists: [Option<&Vec<crate::category_engine::builder::CatSetMask>>; 4] =
            [
                table.cat_to_csm.get(&batch[0]),
                table.cat_to_csm.get(&batch[1]),
                table.cat_to_csm.get(&batch[2]),
                table.cat_to_csm.get(&batch[3]),
            ];
        // Only the common case of each category contributing to exactly
        // one, mutually distinct slot is eligible for the batched path;
        // anything else (missing entries, multi-slot categories, aliasing
        // slots) falls back to the scalar loop for that whole batch of 4.
        fn as_singleton(
            list: Option<&Vec<crate::category_engine::builder::CatSetMask>>,
        ) -> Option<&crate::category_engine::builder::CatSetMask> {
            let list = list?;
            if list.len() == 1 {
                list.first()
            } else {
                None
            }
        }
        let singletons: Option<[&crate::category_engine::builder::CatSetMask; 4]> = (|| {
            Some([
                as_singleton(csm_lists[0])?,
                as_singleton(csm_lists[1])?,
                as_singleton(csm_lists[2])?,
                as_singleton(csm_lists[3])?,
            ])
        })();

        let eligible = singletons.is_some_and(|s| {
            let slots = [s[0].slot, s[1].slot, s[2].slot, s[3].slot];
            slots[0] != slots[1]
                && slots[0] != slots[2]
                && slots[0] != slots[3]
                && slots[1] != slots[2]
                && slots[1] != slots[3]
                && slots[2] != slots[3]
        });

        if let (true, Some(s)) = (eligible, singletons) {
            for (cat, csm) in batch.iter().zip(s.iter()) {
                state.num_cat_evals += 1;
                let slot = csm.slot.0 as usize;
                let current = state.match_mask_array[slot];
                if current == SLOT_COMPLETE {
                    continue;
                }
                let updated = current | csm.mask;
                state.match_mask_array[slot] = updated;
                if updated == SLOT_COMPLETE {
                    let filter = &table.cat_set_filters[slot];
                    state.result.extend_from_slice(&filter.rule_set);
                    for nested in &filter.cat_set_masks {
                        apply_nested(table, nested, state);
                    }
                }
                let _ = cat;
            }
        } else {
            for &cat in batch {
                apply_cat_set_masks(table, cat, state);
            }
        }
        i += 4;
    }
    for &cat in &cats[i..] {
        apply_cat_set_masks(table, cat, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::CategoryAllocator;
    use crate::category_engine::builder::build_filter_table;
    use crate::expr::{BoolOp, ExprDag, Node};
    use crate::rule::Rule;
    use crate::value::{CompareOp, Value};
    use std::collections::HashSet;

    fn leaf(dag: &mut ExprDag, attr: &str, v: i64) -> crate::expr::NodeId {
        let a = dag.intern(Node::AttrRef(attr.into()));
        let c = dag.intern(Node::Const(Value::Int(v)));
        dag.intern(Node::Compare(CompareOp::Lt, a, c))
    }

    fn build_s1() -> (FilterTable, Category, Category) {
        let mut dag = ExprDag::new();
        let p1 = leaf(&mut dag, "x", 100);
        let p2 = leaf(&mut dag, "y", 100);
        let and_node = dag.intern(Node::BoolOp(BoolOp::And, vec![p1, p2]));

        let mut alloc = CategoryAllocator::new();
        let c1 = alloc.category_for(p1);
        let c2 = alloc.category_for(p2);
        let cond = alloc.flatten_condition(&dag, and_node);
        let rule = Rule { rule_id: RuleId(0), condition: cond };
        let (table, _metrics) = build_filter_table(&[rule], &alloc, 1, 1, 64).unwrap();
        (table, c1, c2)
    }

    #[test]
    fn both_categories_fire_matches_rule() {
        let (table, c1, c2) = build_s1();
        let mut state = MatchState::new(&table);
        apply_cat_set_masks(&table, c1, &mut state);
        apply_cat_set_masks(&table, c2, &mut state);
        assert_eq!(state.result, vec![RuleId(0)]);
    }

    #[test]
    fn only_one_category_does_not_match() {
        let (table, c1, _c2) = build_s1();
        let mut state = MatchState::new(&table);
        apply_cat_set_masks(&table, c1, &mut state);
        assert!(state.result.is_empty());
    }

    #[test]
    fn rule_emitted_at_most_once_even_if_category_refires() {
        let (table, c1, c2) = build_s1();
        let mut state = MatchState::new(&table);
        apply_cat_set_masks(&table, c1, &mut state);
        apply_cat_set_masks(&table, c2, &mut state);
        apply_cat_set_masks(&table, c1, &mut state);
        assert_eq!(state.result, vec![RuleId(0)]);
    }

    #[test]
    fn batched_application_matches_scalar_application() {
        // Eight independent single-predicate rules: each category maps to
        // exactly one slot, the shape `apply_cat_set_masks_batched`'s
        // eligible-batch-of-4 fast path requires (spec §9 property 8,
        // "SIMD equivalence").
        let mut dag = ExprDag::new();
        let mut alloc = CategoryAllocator::new();
        let mut rules = Vec::new();
        let mut cats = Vec::new();
        for i in 0..8u32 {
            let node = leaf(&mut dag, &format!("x{i}"), 100);
            cats.push(alloc.category_for(node));
            let condition = alloc.flatten_condition(&dag, node);
            rules.push(Rule { rule_id: RuleId(i), condition });
        }
        let (table, _metrics) = build_filter_table(&rules, &alloc, 1, 1, 64).unwrap();

        let mut scalar_state = MatchState::new(&table);
        for &cat in &cats {
            apply_cat_set_masks(&table, cat, &mut scalar_state);
        }

        let mut batched_state = MatchState::new(&table);
        apply_cat_set_masks_batched(&table, &cats, &mut batched_state);

        let mut scalar_result = scalar_state.result.clone();
        let mut batched_result = batched_state.result.clone();
        scalar_result.sort_unstable();
        batched_result.sort_unstable();
        assert_eq!(scalar_result, batched_result);
        assert_eq!(scalar_result.len(), 8);
    }

    #[test]
    fn default_negative_fires_when_predicate_never_fires() {
        let mut dag = ExprDag::new();
        let p1 = leaf(&mut dag, "x", 100);
        let mut alloc = CategoryAllocator::new();
        let cat = alloc.register_default(p1);
        let neg = alloc.negative_of(cat).unwrap();
        let not_node_cond =
            crate::category::CondTree(vec![crate::category::OrCond(vec![crate::category::CatLit {
                category: cat,
                negated: true,
            }])]);
        let rule = Rule { rule_id: RuleId(0), condition: not_node_cond };
        let (table, _m) = build_filter_table(&[rule], &alloc, 1, 1, 64).unwrap();

        let mut state = MatchState::new(&table);
        let fired_defaults: HashSet<Category> = HashSet::new();
        apply_default_negatives(&table, &fired_defaults, &mut state);
        assert_eq!(state.result, vec![RuleId(0)]);
        let _ = neg;
    }
}
