//! End-to-end scenario: a region with only dead objects is reclaimed as immediate garbage
//! without ever entering the collection set.

use shenandoah_core::heap::region::{AllocKind, RegionState};
use shenandoah_core::heap::Heap;
use shenandoah_core::heuristics::{self, CsetContext, Heuristics};
use shenandoah_core::options::{HeuristicsKind, Options};

#[test]
fn region_with_no_surviving_objects_is_trashed_immediately_with_an_empty_cset() {
    let mut opts = Options::default();
    opts.region_size_bytes.set(1024 * 8);
    let heap = Heap::new(2, opts);
    let region_size_words = heap.region_size_words();

    heap.region(1).make_regular_alloc();
    heap.region(1).allocate(64, 1, AllocKind::MutatorShared).unwrap();
    heap.region(1).allocate(64, 1, AllocKind::MutatorShared).unwrap();
    heap.region(1).allocate(64, 1, AllocKind::MutatorShared).unwrap();
    // init-mark with nothing reachable: no mark bits set, no live data recorded.
    heap.marking().capture_top_at_mark_start(1, heap.region(1).top());

    let selection = heuristics::select_candidates(heap.regions(), region_size_words);
    assert_eq!(heap.region(1).state(), RegionState::Trash);
    assert_eq!(selection.immediate_garbage_words, 192);
    assert!(selection.candidates.is_empty());

    let heuristics = Heuristics::new(HeuristicsKind::Static);
    let ctx = CsetContext { region_size_words, evac_reserve_words: heap.evac_reserve_words() };
    let cset = heuristics.choose_cset(&selection, &ctx, heap.options());
    assert!(cset.is_empty(), "an all-garbage region needs no evacuation work");

    heap.recycle_trash(|| {});
    assert_eq!(heap.region(1).state(), RegionState::EmptyCommitted);
}
