//! End-to-end scenario: with a configured wall-clock ceiling between cycles, elapsed time
//! past it triggers a cycle regardless of free space, for every variant but Passive.

use shenandoah_core::heuristics::{Heuristics, TriggerContext};
use shenandoah_core::options::{HeuristicsKind, Options};

fn plenty_of_free_space_ctx(elapsed_ms: u64) -> TriggerContext {
    TriggerContext {
        capacity_words: 1_000_000,
        available_words: 999_999, // nothing else would trigger a cycle here
        bytes_allocated_since_gc_start: 0,
        elapsed_since_last_cycle_ms: elapsed_ms,
        allocation_rate_words_per_ms: 0.0,
    }
}

#[test]
fn guaranteed_interval_fires_regardless_of_free_space_except_for_passive() {
    let mut opts = Options::default();
    opts.guaranteed_gc_interval_ms.set(100);
    let ctx = plenty_of_free_space_ctx(120);

    for kind in [HeuristicsKind::Static, HeuristicsKind::Compact, HeuristicsKind::Adaptive] {
        let h = Heuristics::new(kind);
        assert!(h.should_start_gc(&ctx, &opts), "{kind:?} should honor the guaranteed interval");
    }

    let passive = Heuristics::new(HeuristicsKind::Passive);
    assert!(
        !passive.should_start_gc(&ctx, &opts),
        "Passive never triggers concurrently, guaranteed interval included"
    );
}

#[test]
fn below_the_interval_nothing_fires_when_free_space_is_plentiful() {
    let mut opts = Options::default();
    opts.guaranteed_gc_interval_ms.set(100);
    let ctx = plenty_of_free_space_ctx(50);

    let h = Heuristics::new(HeuristicsKind::Static);
    assert!(!h.should_start_gc(&ctx, &opts));
}
