//! Counters exposed by the builder and the compiled engine.
//!
//! These are advisory only (spec §5/§9): they never affect which rules
//! match, and implementations may keep them per-thread and fold them in
//! lazily. Kept as a plain struct of `AtomicU64`s rather than behind a
//! metrics-backend trait, since shipping counters anywhere is explicitly
//! an outer concern (spec §1).

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters produced once, at `compile()` time.
#[derive(Debug, Default)]
pub struct BuilderMetrics {
    /// Number of OR-groups replaced by a single synthetic category because
    /// they recurred across at least `or_opt_threshold` rules.
    pub or_sets_inlined: u64,
    /// Number of shared AND-group prefixes factored into a synthetic
    /// AND slot because they recurred across at least `and_opt_threshold`
    /// rules.
    pub and_or_sets_inlined: u64,
}

/// Counters updated on every `match_event` call. Safe to share across
/// threads calling `match_event` on the same compiled engine concurrently.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    num_cat_evals: AtomicU64,
    num_rules_matched: AtomicU64,
    num_events_matched: AtomicU64,
}

impl EngineMetrics {
    pub fn record_cat_evals(&self, n: u64) {
        self.num_cat_evals.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_rules_matched(&self, n: u64) {
        self.num_rules_matched.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_event(&self) {
        self.num_events_matched.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn num_cat_evals(&self) -> u64 {
        self.num_cat_evals.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn num_rules_matched(&self) -> u64 {
        self.num_rules_matched.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn num_events_matched(&self) -> u64 {
        self.num_events_matched.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = EngineMetrics::default();
        m.record_cat_evals(3);
        m.record_cat_evals(4);
        m.record_event();
        assert_eq!(m.num_cat_evals(), 7);
        assert_eq!(m.num_events_matched(), 1);
    }
}
