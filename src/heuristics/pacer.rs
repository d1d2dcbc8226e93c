//! Pacing: throttles mutator allocation against marking progress so a cycle that is falling
//! behind can slow the mutators down rather than let them outrun the collector and force a
//! degenerated GC. Named by the `pacing` config flag (§6) but left undescribed by the rest
//! of the spec; grounded on the same trigger/feedback idiom as [`super::Heuristics`] — a
//! budget that is drained by allocation and refilled by marking progress, with the ratio
//! exposed as a delay multiplier rather than a blocking call (no actual sleeping here; the
//! mutator-side hook decides what to do with the reported factor).

use std::sync::atomic::{AtomicI64, Ordering};

/// A word budget for the current cycle: starts at the heap's total live-plus-slack estimate,
/// is debited by every mutator allocation, and is credited as the marker reports progress
/// (words scanned). When exhausted, [`Pacer::delay_factor`] reports how far over budget the
/// mutators are so an allocation path can back off proportionally.
pub struct Pacer {
    budget_words: AtomicI64,
    starting_budget_words: i64,
}

impl Pacer {
    pub fn new(starting_budget_words: usize) -> Self {
        Pacer {
            budget_words: AtomicI64::new(starting_budget_words as i64),
            starting_budget_words: starting_budget_words as i64,
        }
    }

    /// Resets the budget at the start of a new cycle.
    pub fn restart(&self, starting_budget_words: usize) {
        self.budget_words.store(starting_budget_words as i64, Ordering::Relaxed);
    }

    /// Debits the budget for a mutator allocation of `words`. May go negative: that is what
    /// drives [`Pacer::delay_factor`] above 1.0.
    pub fn report_allocation(&self, words: usize) {
        self.budget_words.fetch_sub(words as i64, Ordering::Relaxed);
    }

    /// Credits the budget as the marker makes progress (mirrors
    /// [`crate::heap::region::Region::increase_live_data`]'s notification point).
    pub fn report_progress(&self, words: usize) {
        self.budget_words.fetch_add(words as i64, Ordering::Relaxed);
    }

    pub fn remaining_words(&self) -> i64 {
        self.budget_words.load(Ordering::Relaxed)
    }

    /// 1.0 when the budget is non-negative (no throttling needed); rises above 1.0 as the
    /// budget goes negative relative to the starting budget, giving the allocation path a
    /// multiplier to scale a backoff delay by.
    pub fn delay_factor(&self) -> f64 {
        let remaining = self.remaining_words();
        if remaining >= 0 || self.starting_budget_words == 0 {
            1.0
        } else {
            1.0 + (-remaining as f64 / self.starting_budget_words as f64)
        }
    }

    pub fn is_paced(&self) -> bool {
        self.remaining_words() < 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_pacer_has_no_delay() {
        let p = Pacer::new(1000);
        assert_eq!(p.delay_factor(), 1.0);
        assert!(!p.is_paced());
    }

    #[test]
    fn overspending_the_budget_increases_delay_factor() {
        let p = Pacer::new(1000);
        p.report_allocation(1500);
        assert!(p.is_paced());
        assert!(p.delay_factor() > 1.0);
    }

    #[test]
    fn marking_progress_credits_the_budget_back() {
        let p = Pacer::new(1000);
        p.report_allocation(1500);
        p.report_progress(1500);
        assert_eq!(p.remaining_words(), 1000);
        assert!(!p.is_paced());
    }

    #[test]
    fn restart_resets_to_a_fresh_budget() {
        let p = Pacer::new(1000);
        p.report_allocation(2000);
        p.restart(500);
        assert_eq!(p.remaining_words(), 500);
    }
}
