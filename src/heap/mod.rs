//! The region-based heap: owns every region plus the collaborating C1-C5 structures and
//! ties them together behind a single lock/safepoint discipline.

pub mod cancellation;
pub mod collection_set;
pub mod forwarding;
pub mod free_set;
pub mod gc_state;
pub mod heap_lock;
pub mod marking;
pub mod region;
pub mod safepoint;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::GcError;
use crate::heap::cancellation::CancellationFlag;
use crate::heap::collection_set::CollectionSet;
use crate::heap::forwarding::ForwardingTable;
use crate::heap::free_set::{AllocRequest, FreeSet};
use crate::heap::gc_state::GcStateWord;
use crate::heap::heap_lock::HeapLock;
use crate::heap::marking::MarkingContext;
use crate::heap::region::{AllocKind, Region, RegionState};
use crate::heap::safepoint::Safepoint;
use crate::heuristics::pacer::Pacer;
use crate::options::Options;
use crate::util::address::Address;
use crate::util::constants::{humongous_threshold_words, BYTES_IN_WORD};

/// Owns every region and the collaborating structures (C1-C5), plus the process-wide
/// cancellation flag, heap lock, safepoint, and GC state word: global mutable state
/// initialized at heap creation and torn down only at process exit.
pub struct Heap {
    regions: Vec<Region>,
    free_set: Mutex<FreeSet>,
    collection_set: Mutex<CollectionSet>,
    marking: MarkingContext,
    forwarding: ForwardingTable,
    pub gc_state: GcStateWord,
    pub lock: HeapLock,
    pub safepoint: Safepoint,
    pub cancellation: CancellationFlag,
    region_size_words: usize,
    num_regions: usize,
    bytes_allocated_since_gc_start: AtomicU64,
    pacer: Pacer,
    options: Options,
}

impl Heap {
    /// Builds a heap of `num_regions` regions sized by `options.region_size_bytes`, with
    /// every region starting Empty-Uncommitted -> Empty-Committed (ready to allocate). Region
    /// 0 of the addressable word range is reserved as the collection-set biased map's
    /// permanently-zero guard slot; real regions start one region-size above it.
    pub fn new(num_regions: usize, options: Options) -> Self {
        crate::util::logger::try_init();
        let region_size_words = *options.region_size_bytes / BYTES_IN_WORD;
        let regions: Vec<Region> = (0..num_regions)
            .map(|i| {
                let bottom = Address::from_usize((i + 1) * region_size_words);
                let end = Address::from_usize((i + 2) * region_size_words);
                let region = Region::new(i, bottom, end);
                region.make_committed();
                region
            })
            .collect();
        let region_bottoms: Vec<Address> = regions.iter().map(|r| r.bottom()).collect();
        let total_words = (num_regions + 1) * region_size_words;
        let humongous_threshold = humongous_threshold_words(region_size_words);

        log::info!(
            "heap initialized: {num_regions} regions x {region_size_words} words ({} bytes each)",
            *options.region_size_bytes
        );

        let free_set = FreeSet::new(
            num_regions,
            region_size_words,
            humongous_threshold,
            1,
            true,
            *options.elastic_tlab,
        );

        let heap = Heap {
            free_set: Mutex::new(free_set),
            collection_set: Mutex::new(CollectionSet::new(num_regions, region_size_words)),
            marking: MarkingContext::new(
                Address::from_usize(region_size_words),
                total_words,
                num_regions,
                &region_bottoms,
            ),
            forwarding: ForwardingTable::new(Address::from_usize(region_size_words), total_words),
            gc_state: GcStateWord::new(),
            lock: HeapLock::new(),
            safepoint: Safepoint::new(),
            cancellation: CancellationFlag::new(),
            regions,
            region_size_words,
            num_regions,
            bytes_allocated_since_gc_start: AtomicU64::new(0),
            pacer: Pacer::new(num_regions * region_size_words),
            options,
        };
        heap.rebuild_free_set();
        heap
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, index: usize) -> &Region {
        &self.regions[index]
    }

    pub fn num_regions(&self) -> usize {
        self.num_regions
    }

    pub fn region_size_words(&self) -> usize {
        self.region_size_words
    }

    /// Index of the region containing `addr`, under the same one-region guard offset used
    /// by [`CollectionSet::region_bottom_address`] (region 0 starts one region-size above
    /// address zero, so the biased cset map's zero slot is permanently unused).
    #[inline]
    pub fn region_index_of(&self, addr: Address) -> usize {
        addr.as_usize() / self.region_size_words - 1
    }

    /// Lowest address any region occupies and the total addressable word count, including
    /// the one-region guard page below region 0 — the bounds [`ForwardingTable`] and
    /// [`MarkingContext`] are sized to.
    pub fn addressable_base(&self) -> Address {
        Address::from_usize(self.region_size_words)
    }

    pub fn addressable_words(&self) -> usize {
        (self.num_regions + 1) * self.region_size_words
    }

    pub fn marking(&self) -> &MarkingContext {
        &self.marking
    }

    pub fn forwarding(&self) -> &ForwardingTable {
        &self.forwarding
    }

    pub fn collection_set(&self) -> std::sync::MutexGuard<'_, CollectionSet> {
        self.collection_set.lock().unwrap()
    }

    pub fn free_set(&self) -> std::sync::MutexGuard<'_, FreeSet> {
        self.free_set.lock().unwrap()
    }

    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    /// Resets the pacer's budget to full capacity. Called at the start of a cycle, mirroring
    /// [`Heap::rebuild_free_set`]'s per-cycle reset of the free set.
    pub fn restart_pacer(&self) {
        self.pacer.restart(self.capacity_words());
    }

    pub fn capacity_words(&self) -> usize {
        self.num_regions * self.region_size_words
    }

    pub fn evac_reserve_words(&self) -> usize {
        ((self.capacity_words() as f64) * *self.options.evac_reserve_percent / 100.0) as usize
    }

    pub fn bytes_allocated_since_gc_start(&self) -> u64 {
        self.bytes_allocated_since_gc_start.load(Ordering::Relaxed)
    }

    pub fn reset_bytes_allocated_since_gc_start(&self) {
        self.bytes_allocated_since_gc_start.store(0, Ordering::Relaxed);
    }

    /// Allocates through the free-set allocator, taking the heap lock for the duration
    /// (the shared-resource policy serializes free-set mutation behind a single heap lock).
    pub fn allocate(
        &self,
        kind: AllocKind,
        min_words: usize,
        requested_words: usize,
    ) -> Result<Address, GcError> {
        self.allocate_actual(kind, min_words, requested_words).map(|(addr, _)| addr)
    }

    /// Same as [`Heap::allocate`] but also reports how many words the free-set actually
    /// granted — needed by elastic LAB requests (§4.4), where `requested_words` is only an
    /// upper bound and the caller must size its local bump region to what it was really
    /// given, not what it asked for.
    pub fn allocate_actual(
        &self,
        kind: AllocKind,
        min_words: usize,
        requested_words: usize,
    ) -> Result<(Address, usize), GcError> {
        let _guard = self.lock.lock();
        let mut req = AllocRequest::new(kind, min_words, requested_words);
        let addr = self.free_set.lock().unwrap().allocate(&self.regions, &mut req);
        match addr {
            Some(addr) => {
                self.bytes_allocated_since_gc_start
                    .fetch_add((req.actual_words * BYTES_IN_WORD) as u64, Ordering::Relaxed);
                if *self.options.pacing {
                    self.pacer.report_allocation(req.actual_words);
                }
                log::trace!("allocated {} words at {addr:?} (kind {kind:?})", req.actual_words);
                Ok((addr, req.actual_words))
            }
            None => Err(GcError::AllocFailure { mutator: kind.is_mutator() }),
        }
    }

    /// Rebuilds the free set from current region states. Safepoint-only.
    pub fn rebuild_free_set(&self) {
        self.free_set.lock().unwrap().rebuild(&self.regions, self.evac_reserve_words());
    }

    /// Recycles every Trash region back to Empty-Committed, yielding cooperatively between
    /// iterations.
    pub fn recycle_trash(&self, yield_between_iterations: impl FnMut()) {
        self.free_set.lock().unwrap().recycle_trash(&self.regions, yield_between_iterations);
    }

    /// Uncommits every region that has sat `Empty-Committed` for at least
    /// `uncommit_delay_ms` (§6), returning how many were uncommitted. A control-thread
    /// operation; does not touch the free set, which only tracks committed capacity.
    pub fn uncommit_idle_regions(&self) -> usize {
        let delay = std::time::Duration::from_millis(*self.options.uncommit_delay_ms);
        let mut uncommitted = 0;
        for region in &self.regions {
            if region.state() == RegionState::EmptyCommitted
                && region.idle_duration().is_some_and(|idle| idle >= delay)
            {
                region.make_uncommitted();
                uncommitted += 1;
            }
        }
        if uncommitted > 0 {
            log::debug!("uncommitted {uncommitted} idle region(s)");
        }
        uncommitted
    }
}
