//! C1: Region — a fixed-size contiguous heap slab, bump allocator, and state machine.
//!
//! Grounded on the `policy::immix::block::{Block, BlockState}`: a `#[repr(C)]`
//! struct addressed by index, an explicit state enum with named `make_*` transition
//! methods, and side-table-style atomics (`AtomicUsize`/`AtomicU8`) for the fields multiple
//! threads touch concurrently (`top`, `live_data`, `critical_pins`).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::fatal;
use crate::util::address::Address;

/// Allocation request origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocKind {
    MutatorShared,
    MutatorTlab,
    CollectorShared,
    CollectorGclab,
}

impl AllocKind {
    #[inline]
    pub fn is_mutator(self) -> bool {
        matches!(self, AllocKind::MutatorShared | AllocKind::MutatorTlab)
    }

    #[inline]
    pub fn is_lab(self) -> bool {
        matches!(self, AllocKind::MutatorTlab | AllocKind::CollectorGclab)
    }
}

/// Region state machine. `Hash`/`Eq` so heuristics code can group regions by
/// state cheaply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionState {
    EmptyUncommitted,
    EmptyCommitted,
    Regular,
    HumongousStart,
    HumongousContinuation,
    Cset,
    Pinned,
    PinnedHumongousStart,
    Trash,
}

impl RegionState {
    const fn to_usize(self) -> usize {
        self as usize
    }

    fn from_usize(v: usize) -> Self {
        use RegionState::*;
        match v {
            0 => EmptyUncommitted,
            1 => EmptyCommitted,
            2 => Regular,
            3 => HumongousStart,
            4 => HumongousContinuation,
            5 => Cset,
            6 => Pinned,
            7 => PinnedHumongousStart,
            8 => Trash,
            _ => unreachable!("corrupt region state discriminant {v}"),
        }
    }

    /// Whether `self -> to` is one of the transitions the state machine permits. Encodes
    /// both the positive list and the explicitly forbidden list (the forbidden list is
    /// redundant with "not in the positive list" but we check it first so the panic message
    /// can cite the precise rule it violates).
    fn allows(self, to: RegionState) -> bool {
        use RegionState::*;
        match (self, to) {
            // Explicitly forbidden, kept as early, named rejections.
            (EmptyUncommitted, Trash) | (EmptyCommitted, Trash) => false,
            (Pinned, Trash) | (Pinned, Cset) => false,
            (HumongousStart, Cset) | (HumongousContinuation, Cset) => false,
            (PinnedHumongousStart, Cset) | (PinnedHumongousStart, Trash) => false,

            (EmptyUncommitted, EmptyCommitted) => true,
            (EmptyCommitted, EmptyUncommitted) => true,
            (EmptyCommitted, Regular) => true,
            (EmptyCommitted, HumongousStart) => true,
            (EmptyCommitted, HumongousContinuation) => true,

            (Regular, Cset) => true,
            (Regular, Pinned) => true,
            (Regular, Trash) => true,
            // The evacuation epilogue trashes a cset region once it has been fully
            // evacuated (§4.5: `CollectionSet::clear` doesn't itself transition regions).
            (Cset, Trash) => true,

            (HumongousStart, Pinned) | (HumongousStart, PinnedHumongousStart) => true,
            (HumongousStart, Trash) => true,
            (HumongousContinuation, Trash) => true,

            (Pinned, Regular) => true,
            (PinnedHumongousStart, HumongousStart) => true,

            (Trash, EmptyCommitted) => true,

            (a, b) if a == b => true,
            _ => false,
        }
    }
}

/// A fixed-size contiguous `[bottom, end)` heap slab. Created once at heap initialization;
/// its state mutates for the life of the process, but the region struct is never freed.
pub struct Region {
    pub index: usize,
    bottom: Address,
    end: Address,
    /// Next free word; bump-allocated. Atomic so concurrent allocators can race safely
    /// within this region under `allocate`.
    top: AtomicUsize,
    /// Full-GC compaction target; distinct from `top` so a compacting cycle can compute
    /// where live objects will end up before actually moving them.
    new_top: AtomicUsize,
    /// Upper bound of addresses needing reference-update scanning. Release-store on write,
    /// acquire-load on read.
    update_watermark: AtomicUsize,
    /// Atomic word count of marked-live data.
    live_data: AtomicUsize,
    tlab_allocs: AtomicUsize,
    gclab_allocs: AtomicUsize,
    critical_pins: AtomicUsize,
    /// Packed `RegionState` discriminant. An atomic rather than a plain field so a `Region`
    /// can live in a shared `Vec` and be transitioned through `&self` the same way `top` and
    /// `live_data` are — transitions are still single-writer by convention (heap lock or
    /// safepoint), this only removes the need for exclusive borrows to express that.
    state: AtomicUsize,
    /// True only for the first region of a humongous chain; continuations point back to it
    /// so that "Humongous-continuations reach Trash only via their start region's
    /// reclamation" can be enforced. `-1` (stored as `usize::MAX`) means "not
    /// part of a humongous chain".
    humongous_start_index: AtomicUsize,
    /// When this region last became `Empty-Committed`, for the `uncommit_delay_ms` idle
    /// sweep (§6). `None` whenever the region is in any other state.
    empty_since: Mutex<Option<Instant>>,
}

const NO_HUMONGOUS_START: usize = usize::MAX;

impl Region {
    pub fn new(index: usize, bottom: Address, end: Address) -> Region {
        Region {
            index,
            bottom,
            end,
            top: AtomicUsize::new(bottom.as_usize()),
            new_top: AtomicUsize::new(bottom.as_usize()),
            update_watermark: AtomicUsize::new(bottom.as_usize()),
            live_data: AtomicUsize::new(0),
            tlab_allocs: AtomicUsize::new(0),
            gclab_allocs: AtomicUsize::new(0),
            critical_pins: AtomicUsize::new(0),
            state: AtomicUsize::new(RegionState::EmptyUncommitted.to_usize()),
            humongous_start_index: AtomicUsize::new(NO_HUMONGOUS_START),
            empty_since: Mutex::new(None),
        }
    }

    #[inline]
    pub fn bottom(&self) -> Address {
        self.bottom
    }

    #[inline]
    pub fn end(&self) -> Address {
        self.end
    }

    #[inline]
    pub fn top(&self) -> Address {
        Address::from_usize(self.top.load(Ordering::Acquire))
    }

    #[inline]
    pub fn used_words(&self, word_size: usize) -> usize {
        (self.top() - self.bottom) / word_size
    }

    #[inline]
    pub fn capacity_words(&self, word_size: usize) -> usize {
        (self.end - self.bottom) / word_size
    }

    #[inline]
    pub fn free_words(&self, word_size: usize) -> usize {
        (self.end - self.top()) / word_size
    }

    #[inline]
    pub fn live_data_words(&self) -> usize {
        self.live_data.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn garbage_words(&self, word_size: usize) -> usize {
        self.used_words(word_size).saturating_sub(self.live_data_words())
    }

    #[inline]
    pub fn state(&self) -> RegionState {
        RegionState::from_usize(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.critical_pins.load(Ordering::Acquire) > 0
    }

    #[inline]
    pub fn humongous_start_index(&self) -> Option<usize> {
        match self.humongous_start_index.load(Ordering::Acquire) {
            NO_HUMONGOUS_START => None,
            v => Some(v),
        }
    }

    #[inline]
    pub fn update_watermark(&self) -> Address {
        Address::from_usize(self.update_watermark.load(Ordering::Acquire))
    }

    pub fn set_update_watermark(&self, addr: Address) {
        debug_assert!(addr >= self.bottom && addr <= self.top());
        self.update_watermark.store(addr.as_usize(), Ordering::Release);
    }

    pub fn new_top(&self) -> Address {
        Address::from_usize(self.new_top.load(Ordering::Acquire))
    }

    pub fn set_new_top(&self, addr: Address) {
        self.new_top.store(addr.as_usize(), Ordering::Release);
    }

    pub fn tlab_allocs_words(&self) -> usize {
        self.tlab_allocs.load(Ordering::Relaxed)
    }

    pub fn gclab_allocs_words(&self) -> usize {
        self.gclab_allocs.load(Ordering::Relaxed)
    }

    /// Bump-pointer allocation within `[top, end)`. Aligned to `word_size`. Returns `None`
    /// on insufficient space. Caller holds the heap lock or operates at a safepoint — this
    /// method itself only needs the CAS to be race-free against other threads making the
    /// same promise.
    pub fn allocate(&self, words: usize, word_size: usize, kind: AllocKind) -> Option<Address> {
        let bytes = words * word_size;
        loop {
            let old = self.top.load(Ordering::Acquire);
            let new = old + bytes;
            if new > self.end.as_usize() {
                return None;
            }
            if self
                .top
                .compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                match kind {
                    AllocKind::MutatorTlab => {
                        self.tlab_allocs.fetch_add(words, Ordering::Relaxed);
                    }
                    AllocKind::CollectorGclab => {
                        self.gclab_allocs.fetch_add(words, Ordering::Relaxed);
                    }
                    _ => {}
                }
                return Some(Address::from_usize(old));
            }
        }
    }

    /// Atomic add to the live-data counter. Used by the marker (which separately notifies
    /// the pacer, see [`crate::heuristics::Pacer`]) and by allocators during concurrent
    /// mark for implicit-live bookkeeping of newly allocated data.
    pub fn increase_live_data(&self, words: usize) {
        self.live_data.fetch_add(words, Ordering::Relaxed);
    }

    pub fn reset_live_data(&self) {
        self.live_data.store(0, Ordering::Relaxed);
    }

    /// Increments `critical_pins`; a region with nonzero pins may not be chosen for
    /// evacuation.
    pub fn pin(&self) {
        self.critical_pins.fetch_add(1, Ordering::AcqRel);
    }

    pub fn unpin(&self) {
        let prev = self.critical_pins.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "unpin() called on region {} with no pins", self.index);
    }

    fn transition(&self, to: RegionState) {
        let from = self.state();
        if !from.allows(to) {
            fatal::invalid_transition(self.index, from, to);
        }
        self.state.store(to.to_usize(), Ordering::Release);
        *self.empty_since.lock().unwrap() = (to == RegionState::EmptyCommitted).then(Instant::now);
    }

    /// How long this region has been sitting `Empty-Committed`, if it is one right now.
    pub fn idle_duration(&self) -> Option<Duration> {
        self.empty_since.lock().unwrap().map(|t| t.elapsed())
    }

    pub fn make_committed(&self) {
        self.transition(RegionState::EmptyCommitted);
    }

    pub fn make_uncommitted(&self) {
        self.transition(RegionState::EmptyUncommitted);
    }

    pub fn make_regular_alloc(&self) {
        self.transition(RegionState::Regular);
        self.humongous_start_index.store(NO_HUMONGOUS_START, Ordering::Release);
    }

    pub fn make_humongous_start(&self) {
        self.transition(RegionState::HumongousStart);
        self.humongous_start_index.store(self.index, Ordering::Release);
    }

    pub fn make_humongous_cont(&self, start_index: usize) {
        self.transition(RegionState::HumongousContinuation);
        self.humongous_start_index.store(start_index, Ordering::Release);
    }

    pub fn make_cset(&self) {
        self.transition(RegionState::Cset);
    }

    pub fn make_trash(&self) {
        // Continuations only trash alongside their start region; the collection-set
        // epilogue drives this, so it always supplies the owning start index.
        self.transition(RegionState::Trash);
    }

    pub fn make_pinned(&self) {
        match self.state() {
            RegionState::HumongousStart => self.transition(RegionState::PinnedHumongousStart),
            _ => self.transition(RegionState::Pinned),
        }
    }

    pub fn make_unpinned(&self) {
        match self.state() {
            RegionState::PinnedHumongousStart => self.transition(RegionState::HumongousStart),
            _ => self.transition(RegionState::Regular),
        }
    }

    /// Resets `top = bottom`, clears live data and watermarks; transitions Trash ->
    /// Empty-Committed. Preserves `index`.
    pub fn recycle(&self) {
        self.top.store(self.bottom.as_usize(), Ordering::Release);
        self.new_top.store(self.bottom.as_usize(), Ordering::Release);
        self.update_watermark
            .store(self.bottom.as_usize(), Ordering::Release);
        self.live_data.store(0, Ordering::Relaxed);
        self.tlab_allocs.store(0, Ordering::Relaxed);
        self.gclab_allocs.store(0, Ordering::Relaxed);
        self.transition(RegionState::EmptyCommitted);
        self.humongous_start_index.store(NO_HUMONGOUS_START, Ordering::Release);
    }

    /// `bottom <= update_watermark <= top <= end`.
    #[cfg(debug_assertions)]
    pub fn check_invariants(&self) {
        debug_assert!(self.bottom <= self.update_watermark());
        debug_assert!(self.update_watermark() <= self.top());
        debug_assert!(self.top() <= self.end);
    }
}
