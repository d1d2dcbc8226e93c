//! C7: BarrierEngine — the load-reference barrier and the SATB/IU/clone/array-copy write
//! barriers, gated by the global GC state word. Grounded on
//! `plan::concurrent::barrier::SATBBarrierSemantics` for the enqueue/flush shape and
//! `plan::barriers::Barrier` for the write-barrier trait split; the load-reference barrier
//! itself and the mutator-thread evacuation/OOM protocol have no mmtk analogue (mmtk's
//! plans do not run a Shenandoah-style LRB), so they are written directly from §4.7 and
//! cross-checked against the historical Shenandoah barrier sources in
//! `examples/other_examples/`.
//!
//! Design note §9: "prefer a phase-dispatch table over branches in the hot path" — the
//! dispatch here reads as ordered `if`/`else-if` on the GC state bits rather than a literal
//! array-indexed jump table, because the state byte has 5 independent bits (32 possible
//! combinations) but only a handful of them are ever simultaneously meaningful; a real
//! embedding generating code for this would compile the same ordered checks into a jump
//! table via its own JIT, which is out of scope here (§1's compiler exclusion).

use crate::barriers::decorator::{LoadContext, ReferenceDecorator};
use crate::barriers::field_table::FieldTable;
use crate::barriers::gclab::Gclab;
use crate::barriers::oom::EvacOomScope;
use crate::barriers::write_queue::{MarkerQueue, WriteBarrierBuffer};
use crate::heap::gc_state;
use crate::heap::region::AllocKind;
use crate::heap::Heap;
use crate::util::address::{Address, ObjectReference};

/// Per-thread barrier state (§5 "per-thread data... is lock-free"): SATB buffer, IU buffer,
/// and the active GCLAB, bundled the way a real embedding would keep them in
/// thread-local storage reached without locking.
pub struct ThreadLocalBarrierState {
    pub satb: WriteBarrierBuffer,
    pub iu: WriteBarrierBuffer,
    pub gclab: Gclab,
}

const DEFAULT_BUFFER_CAPACITY: usize = 256;

impl ThreadLocalBarrierState {
    pub fn new() -> Self {
        ThreadLocalBarrierState {
            satb: WriteBarrierBuffer::new(DEFAULT_BUFFER_CAPACITY),
            iu: WriteBarrierBuffer::new(DEFAULT_BUFFER_CAPACITY),
            gclab: Gclab::new(),
        }
    }
}

impl Default for ThreadLocalBarrierState {
    fn default() -> Self {
        Self::new()
    }
}

/// Ties the global GC state word to the collection set, forwarding table and marking
/// context it gates, plus the process-wide pieces a barrier needs that no other C1-C6
/// component owns: the simulated field storage ([`FieldTable`]), the evacuation
/// OOM-during-evacuation latch, and the marker sink SATB/IU buffers flush into.
pub struct BarrierEngine<'h> {
    heap: &'h Heap,
    fields: FieldTable,
    oom: EvacOomScope,
    marker_queue: MarkerQueue,
}

impl<'h> BarrierEngine<'h> {
    pub fn new(heap: &'h Heap) -> Self {
        BarrierEngine {
            heap,
            fields: FieldTable::new(heap.addressable_base(), heap.addressable_words()),
            oom: EvacOomScope::new(),
            marker_queue: MarkerQueue::new(),
        }
    }

    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    pub fn oom_scope(&self) -> &EvacOomScope {
        &self.oom
    }

    pub fn marker_queue(&self) -> &MarkerQueue {
        &self.marker_queue
    }

    /// Load-reference barrier (§4.7). `slot`, when supplied, is the field the reference was
    /// loaded from — used for the opportunistic self-fixing install. `referent_size_words` is
    /// the size the mutator-thread evacuation path would need to copy `obj`; a real
    /// embedding gets this from its object model (§6's collaborator contract owns object
    /// layout, not this crate).
    pub fn load_reference(
        &self,
        thread: &mut ThreadLocalBarrierState,
        obj: ObjectReference,
        slot: Option<Address>,
        referent_size_words: usize,
        ctx: LoadContext,
    ) -> ObjectReference {
        if obj.is_null()
            || !self.heap.gc_state.has(gc_state::HAS_FORWARDED)
            || !*self.heap.options().load_ref_barrier
        {
            return obj;
        }

        if !self.heap.collection_set().is_in_address(obj.to_address()) {
            if self.heap.gc_state.has(gc_state::WEAK_ROOTS)
                && (ctx.decorator.is_weak() || ctx.decorator.is_phantom())
            {
                let region_idx = self.heap.region_index_of(obj.to_address());
                let marked = if ctx.decorator.is_phantom() {
                    self.heap.marking().is_marked(obj, region_idx)
                } else {
                    self.heap.marking().is_marked_strong(obj, region_idx)
                };
                if !marked {
                    // Prevents resurrection: a weak/phantom referent not yet known live
                    // while concurrent weak-root processing is underway must not hand the
                    // mutator a pointer to something about to be reclaimed.
                    return ObjectReference::NULL;
                }
            }
            self.keep_alive(thread, obj, ctx);
            return obj;
        }

        let fwd = self.heap.forwarding().get(obj);
        let result = if fwd == obj && self.heap.gc_state.has(gc_state::EVACUATION) {
            self.evacuate_object(thread, obj, referent_size_words)
        } else {
            fwd
        };

        if let Some(slot_addr) = slot {
            if result != obj && *self.heap.options().self_fixing {
                // Opportunistic; a failed CAS here is benign (another thread already fixed
                // the slot, or the field holds a different value entirely by now).
                let _ = self.fields.compare_and_swap(slot_addr, obj, result);
            }
        }
        self.keep_alive(thread, result, ctx);
        result
    }

    /// Keep-alive for weak decorators (§4.7 tail rule): a non-strong, non-peeking load
    /// while `MARKING` is active SATB-enqueues what it loaded, so the object cannot be
    /// reclaimed mid-iteration even though the load itself didn't go through a normal
    /// pre-write path.
    fn keep_alive(&self, thread: &mut ThreadLocalBarrierState, obj: ObjectReference, ctx: LoadContext) {
        if obj.is_null() || ctx.decorator == ReferenceDecorator::Strong || ctx.no_keep_alive {
            return;
        }
        if !self.heap.gc_state.has(gc_state::MARKING) {
            return;
        }
        self.enqueue_satb(thread, obj);
    }

    /// Mutator-thread evacuation (§4.7): allocate from the GCLAB (falling back to the
    /// shared collector partition), "copy" the payload (there is no real payload to move in
    /// this crate — the allocated address stands in for it, see `forwarding.rs`), then race
    /// to install the forwarding pointer. The losing thread's copy is dropped; its GCLAB
    /// bump is unrolled if it was still the lab's frontier, else the space is simply wasted.
    pub fn evacuate_object(
        &self,
        thread: &mut ThreadLocalBarrierState,
        obj: ObjectReference,
        size_words: usize,
    ) -> ObjectReference {
        if self.oom.is_active() {
            return self.heap.forwarding().try_install(obj, obj);
        }

        let copy_addr = thread
            .gclab
            .allocate(self.heap, size_words)
            .or_else(|| self.heap.allocate(AllocKind::CollectorShared, size_words, size_words).ok());

        match copy_addr {
            Some(addr) => {
                let copy = ObjectReference::from_address(addr);
                let winner = self.heap.forwarding().try_install(obj, copy);
                if winner != copy {
                    thread.gclab.unroll_last(addr, size_words);
                }
                winner
            }
            None => {
                // First failure in the scope flips the shared flag; every thread that
                // observes it active (including this one, from here on) proceeds by
                // forwarding the object to itself — the move is skipped, not retried.
                if self.oom.enter() {
                    log::warn!(
                        "evacuation allocation failure for {size_words} words; entering \
                         OOM-during-evacuation scope"
                    );
                }
                self.heap.forwarding().try_install(obj, obj)
            }
        }
    }

    /// SATB pre-write barrier (§4.7): active only while `MARKING` is set and SATB mode is
    /// enabled. Enqueues `old`, the value about to be overwritten, filtered to skip nulls
    /// and already-marked objects.
    pub fn pre_write_satb(&self, thread: &mut ThreadLocalBarrierState, old: ObjectReference) {
        if !self.heap.gc_state.has(gc_state::MARKING) || !*self.heap.options().satb_barrier {
            return;
        }
        self.enqueue_satb(thread, old);
    }

    /// IU pre-write barrier: alternative to SATB, enqueues `new` (the value being written)
    /// instead of the overwritten one. Used directly by stores in IU mode, and by the clone
    /// and array-copy barriers regardless of mode during marking.
    pub fn pre_write_iu(&self, thread: &mut ThreadLocalBarrierState, new: ObjectReference) {
        if !self.heap.gc_state.has(gc_state::MARKING) || !*self.heap.options().iu_barrier {
            return;
        }
        self.enqueue_iu(thread, new);
    }

    /// Simulated heap store: `field := new`. Dispatches to SATB or IU per configuration
    /// (reading the overwritten value out of [`FieldTable`] for SATB, since there is no real
    /// object memory to have loaded it from already), then performs the write.
    pub fn store_reference(&self, thread: &mut ThreadLocalBarrierState, field: Address, new: ObjectReference) {
        if self.heap.gc_state.has(gc_state::MARKING) {
            if *self.heap.options().satb_barrier {
                let old = self.fields.load(field);
                self.pre_write_satb(thread, old);
            } else if *self.heap.options().iu_barrier {
                self.pre_write_iu(thread, new);
            }
        }
        self.fields.store(field, new);
    }

    /// Clone barrier (§4.7): `refs` are the source object's reference fields, walked by the
    /// collaborator's object model. `source_below_watermark` is whether the clone source's
    /// address is below its region's `update_watermark` (release-stored on write,
    /// acquire-loaded here per §5's ordering guarantee). Returns the reference values the
    /// clone should actually be populated with.
    pub fn clone_barrier(
        &self,
        thread: &mut ThreadLocalBarrierState,
        refs: &[ObjectReference],
        source_below_watermark: bool,
        referent_size_words: usize,
    ) -> Vec<ObjectReference> {
        if self.heap.gc_state.is_pass_through() || !*self.heap.options().clone_barrier {
            return refs.to_vec();
        }
        if self.heap.gc_state.has(gc_state::MARKING) {
            if *self.heap.options().iu_barrier {
                for &r in refs {
                    self.enqueue_iu(thread, r);
                }
            }
            return refs.to_vec();
        }
        if self.heap.gc_state.has(gc_state::EVACUATION) {
            if !source_below_watermark {
                return refs.to_vec();
            }
            return refs
                .iter()
                .map(|&r| self.resolve_in_evacuation(thread, r, referent_size_words))
                .collect();
        }
        if self.heap.gc_state.has(gc_state::UPDATEREFS) {
            if !source_below_watermark {
                return refs.to_vec();
            }
            return refs.iter().map(|&r| self.heap.forwarding().get(r)).collect();
        }
        refs.to_vec()
    }

    /// Array-copy barrier (§4.7): copies `new_values` into `dest_slots` one for one. If
    /// `source_below_watermark` is false, the source slice is known to hold only
    /// post-snapshot values and the copy is a raw write with no barrier bookkeeping.
    /// Otherwise: marking mode enqueues the destination-side (incoming) value under IU, or
    /// the slot's prior occupant under SATB; evacuation mode evacuates incoming references
    /// on the fly; update-refs mode rewrites them to their forwardee.
    pub fn array_copy(
        &self,
        thread: &mut ThreadLocalBarrierState,
        dest_slots: &[Address],
        new_values: &[ObjectReference],
        source_below_watermark: bool,
        referent_size_words: usize,
    ) {
        debug_assert_eq!(dest_slots.len(), new_values.len());

        if self.heap.gc_state.is_pass_through() || !source_below_watermark {
            for (&slot, &val) in dest_slots.iter().zip(new_values) {
                self.fields.store(slot, val);
            }
            return;
        }

        for (&slot, &val) in dest_slots.iter().zip(new_values) {
            let final_value = if self.heap.gc_state.has(gc_state::EVACUATION) {
                self.resolve_in_evacuation(thread, val, referent_size_words)
            } else if self.heap.gc_state.has(gc_state::UPDATEREFS) {
                self.heap.forwarding().get(val)
            } else {
                val
            };
            if self.heap.gc_state.has(gc_state::MARKING) {
                if *self.heap.options().iu_barrier {
                    self.enqueue_iu(thread, final_value);
                } else if *self.heap.options().satb_barrier {
                    let old = self.fields.load(slot);
                    self.enqueue_satb(thread, old);
                }
            }
            self.fields.store(slot, final_value);
        }
    }

    /// Shared resolution step used by the clone and array-copy evacuation specializations:
    /// the same cset-check -> forward -> evacuate sequence as the LRB's slow path, without
    /// the self-fixing install (there is no single load site/slot for a bulk operation).
    fn resolve_in_evacuation(
        &self,
        thread: &mut ThreadLocalBarrierState,
        obj: ObjectReference,
        size_words: usize,
    ) -> ObjectReference {
        if obj.is_null() {
            return obj;
        }
        if !self.heap.collection_set().is_in_address(obj.to_address()) {
            return obj;
        }
        let fwd = self.heap.forwarding().get(obj);
        if fwd == obj {
            self.evacuate_object(thread, obj, size_words)
        } else {
            fwd
        }
    }

    /// Mark filter (skip nulls, skip already-marked) shared by SATB and IU enqueue paths;
    /// flushes and submits to the [`MarkerQueue`] when the thread's buffer fills.
    fn enqueue_filtered(&self, buf: &mut WriteBarrierBuffer, obj: ObjectReference) -> Option<Vec<ObjectReference>> {
        if obj.is_null() {
            return None;
        }
        let region_idx = self.heap.region_index_of(obj.to_address());
        if self.heap.marking().is_marked(obj, region_idx) {
            return None;
        }
        if buf.push(obj) {
            Some(buf.take())
        } else {
            None
        }
    }

    fn enqueue_satb(&self, thread: &mut ThreadLocalBarrierState, obj: ObjectReference) {
        if let Some(batch) = self.enqueue_filtered(&mut thread.satb, obj) {
            self.marker_queue.submit(batch);
        }
    }

    fn enqueue_iu(&self, thread: &mut ThreadLocalBarrierState, obj: ObjectReference) {
        if let Some(batch) = self.enqueue_filtered(&mut thread.iu, obj) {
            self.marker_queue.submit(batch);
        }
    }

    /// Flushes both of a thread's buffers unconditionally (end-of-phase drain point, not
    /// gated on reaching capacity).
    pub fn flush(&self, thread: &mut ThreadLocalBarrierState) {
        let satb = thread.satb.take();
        self.marker_queue.submit(satb);
        let iu = thread.iu.take();
        self.marker_queue.submit(iu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::region::AllocKind;
    use crate::options::Options;

    fn heap_with_regions(n: usize) -> Heap {
        let mut opts = Options::default();
        opts.region_size_bytes.set(1024);
        Heap::new(n, opts)
    }

    #[test]
    fn pass_through_when_state_word_is_zero() {
        let heap = heap_with_regions(4);
        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();
        let obj = ObjectReference::from_address(heap.region(0).bottom());
        let result = engine.load_reference(&mut thread, obj, None, 16, LoadContext::strong());
        assert_eq!(result, obj);
    }

    #[test]
    fn null_short_circuits_regardless_of_state() {
        let heap = heap_with_regions(4);
        heap.gc_state.set(gc_state::HAS_FORWARDED | gc_state::EVACUATION);
        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();
        let result = engine.load_reference(
            &mut thread,
            ObjectReference::NULL,
            None,
            16,
            LoadContext::strong(),
        );
        assert!(result.is_null());
    }

    #[test]
    fn object_outside_cset_is_returned_unchanged() {
        let heap = heap_with_regions(4);
        heap.gc_state.set(gc_state::HAS_FORWARDED);
        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();
        let obj = ObjectReference::from_address(heap.region(0).bottom());
        let result = engine.load_reference(&mut thread, obj, None, 16, LoadContext::strong());
        assert_eq!(result, obj);
    }

    #[test]
    fn lrb_disabled_skips_evacuation_even_mid_cycle() {
        let mut opts = Options::default();
        opts.region_size_bytes.set(1024);
        opts.load_ref_barrier.set(false);
        let heap = Heap::new(4, opts);
        heap.region(0).make_regular_alloc();
        let obj_addr = heap.region(0).allocate(16, 1, AllocKind::MutatorShared).unwrap();
        let obj = ObjectReference::from_address(obj_addr);
        heap.collection_set().add(0, 16, 0);
        heap.region(0).make_cset();
        heap.gc_state.set(gc_state::HAS_FORWARDED | gc_state::EVACUATION);

        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();
        let result = engine.load_reference(&mut thread, obj, None, 16, LoadContext::strong());
        assert_eq!(result, obj, "the flag disables the LRB entirely, not just self-fixing");
        assert!(!heap.forwarding().is_forwarded(obj));
    }

    #[test]
    fn lrb_evacuates_on_the_fly_when_evacuation_is_in_progress() {
        let heap = heap_with_regions(4);
        heap.region(0).make_regular_alloc();
        let obj_addr = heap.region(0).allocate(16, 1, AllocKind::MutatorShared).unwrap();
        let obj = ObjectReference::from_address(obj_addr);
        heap.collection_set().add(0, 16, 0);
        heap.region(0).make_cset();
        heap.gc_state.set(gc_state::HAS_FORWARDED | gc_state::EVACUATION);

        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();
        let slot = Address::from_usize(999_999);
        engine.fields.store(slot, obj);

        let result = engine.load_reference(&mut thread, obj, Some(slot), 16, LoadContext::strong());
        assert_ne!(result, obj);
        assert!(heap.forwarding().is_forwarded(obj));
        assert_eq!(heap.forwarding().get(obj), result);
        // Self-fixing install happened.
        assert_eq!(engine.fields.load(slot), result);
    }

    #[test]
    fn lrb_fixed_point_second_application_is_a_no_op() {
        let heap = heap_with_regions(4);
        heap.region(0).make_regular_alloc();
        let obj_addr = heap.region(0).allocate(16, 1, AllocKind::MutatorShared).unwrap();
        let obj = ObjectReference::from_address(obj_addr);
        heap.collection_set().add(0, 16, 0);
        heap.region(0).make_cset();
        heap.gc_state.set(gc_state::HAS_FORWARDED | gc_state::EVACUATION);

        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();
        let first = engine.load_reference(&mut thread, obj, None, 16, LoadContext::strong());
        let second = engine.load_reference(&mut thread, obj, None, 16, LoadContext::strong());
        assert_eq!(first, second);
    }

    #[test]
    fn two_threads_racing_to_evacuate_agree_on_one_winner() {
        let heap = heap_with_regions(4);
        heap.region(0).make_regular_alloc();
        let obj_addr = heap.region(0).allocate(16, 1, AllocKind::MutatorShared).unwrap();
        let obj = ObjectReference::from_address(obj_addr);
        heap.collection_set().add(0, 16, 0);
        heap.region(0).make_cset();

        let engine = BarrierEngine::new(&heap);
        let mut t1 = ThreadLocalBarrierState::new();
        let mut t2 = ThreadLocalBarrierState::new();
        let winner1 = engine.evacuate_object(&mut t1, obj, 16);
        let winner2 = engine.evacuate_object(&mut t2, obj, 16);
        assert_eq!(winner1, winner2);
        assert!(heap.forwarding().is_forwarded(obj));
    }

    #[test]
    fn evacuation_oom_falls_back_to_self_forwarding() {
        let mut opts = Options::default();
        opts.region_size_bytes.set(1024);
        opts.evac_reserve_percent.set(0.0);
        let heap = Heap::new(1, opts);
        heap.region(0).make_regular_alloc();
        let obj_addr = heap.region(0).allocate(16, 1, AllocKind::MutatorShared).unwrap();
        let obj = ObjectReference::from_address(obj_addr);

        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();
        // No collector partition and no room left in the only region: every evacuation
        // allocation must fail.
        let result = engine.evacuate_object(&mut thread, obj, 16);
        assert_eq!(result, obj);
        assert!(engine.oom_scope().is_active());
    }

    #[test]
    fn satb_enqueues_old_value_and_flushes_at_capacity() {
        let heap = heap_with_regions(1);
        heap.gc_state.set(gc_state::MARKING);
        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();
        heap.region(0).make_regular_alloc();

        let old_addr = heap.region(0).allocate(8, 1, AllocKind::MutatorShared).unwrap();
        let old = ObjectReference::from_address(old_addr);
        // Capture TAMS after allocating `old` so it is a normal pre-mark-start object and
        // the enqueue below is exercised via the mark filter, not the implicit-live check.
        heap.marking().capture_top_at_mark_start(0, heap.region(0).top());
        engine.pre_write_satb(&mut thread, old);
        assert_eq!(thread.satb.len(), 1);

        engine.flush(&mut thread);
        assert!(thread.satb.is_empty());
        assert_eq!(engine.marker_queue().drain_all(), vec![old]);
    }

    #[test]
    fn satb_skips_null_and_already_marked() {
        let heap = heap_with_regions(1);
        heap.gc_state.set(gc_state::MARKING);
        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();
        heap.region(0).make_regular_alloc();

        engine.pre_write_satb(&mut thread, ObjectReference::NULL);
        assert!(thread.satb.is_empty());

        let addr = heap.region(0).allocate(8, 1, AllocKind::MutatorShared).unwrap();
        let obj = ObjectReference::from_address(addr);
        // Capture TAMS *after* allocating `obj`, so it is a normal pre-mark-start object and
        // the skip below is exercised via the mark bit, not via the implicit-live check.
        heap.marking().capture_top_at_mark_start(0, heap.region(0).top());
        heap.marking().mark_strong(obj, 0);
        engine.pre_write_satb(&mut thread, obj);
        assert!(thread.satb.is_empty());
    }

    #[test]
    fn store_reference_uses_iu_mode_when_configured() {
        let mut opts = Options::default();
        opts.region_size_bytes.set(1024);
        opts.satb_barrier.set(false);
        opts.iu_barrier.set(true);
        let heap = Heap::new(1, opts);
        heap.gc_state.set(gc_state::MARKING);
        heap.region(0).make_regular_alloc();
        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();

        let field = Address::from_usize(500_000);
        let new_addr = heap.region(0).allocate(8, 1, AllocKind::MutatorShared).unwrap();
        let new_obj = ObjectReference::from_address(new_addr);
        // Capture TAMS after allocating `new_obj` so the IU enqueue below is exercised via
        // the mark filter, not the implicit-live check.
        heap.marking().capture_top_at_mark_start(0, heap.region(0).top());
        engine.store_reference(&mut thread, field, new_obj);

        assert_eq!(engine.fields.load(field), new_obj);
        assert_eq!(thread.iu.len(), 1);
        assert!(thread.satb.is_empty());
    }

    #[test]
    fn keep_alive_enqueues_weak_loads_during_marking() {
        let heap = heap_with_regions(1);
        heap.gc_state.set(gc_state::HAS_FORWARDED | gc_state::MARKING);
        heap.region(0).make_regular_alloc();
        let addr = heap.region(0).allocate(8, 1, AllocKind::MutatorShared).unwrap();
        let obj = ObjectReference::from_address(addr);
        // Past TAMS so the keep-alive enqueue is exercised through the mark filter rather
        // than short-circuited by the implicit-live check.
        heap.marking().capture_top_at_mark_start(0, heap.region(0).top());

        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();
        let result = engine.load_reference(&mut thread, obj, None, 8, LoadContext::weak());
        assert_eq!(result, obj);
        assert_eq!(thread.satb.len(), 1);
    }

    #[test]
    fn weak_roots_hides_unmarked_referents() {
        let heap = heap_with_regions(1);
        heap.gc_state
            .set(gc_state::HAS_FORWARDED | gc_state::WEAK_ROOTS);
        heap.region(0).make_regular_alloc();
        let addr = heap.region(0).allocate(8, 1, AllocKind::MutatorShared).unwrap();
        let obj = ObjectReference::from_address(addr);
        heap.marking().capture_top_at_mark_start(0, heap.region(0).top());

        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();
        let result = engine.load_reference(&mut thread, obj, None, 8, LoadContext::weak());
        assert!(result.is_null());
    }

    #[test]
    fn clone_barrier_rewrites_to_forwardee_during_update_refs_below_watermark() {
        let heap = heap_with_regions(1);
        heap.region(0).make_regular_alloc();
        let ref_addr = heap.region(0).allocate(8, 1, AllocKind::MutatorShared).unwrap();
        let referent = ObjectReference::from_address(ref_addr);
        let copy_addr = heap.region(0).allocate(8, 1, AllocKind::CollectorShared).unwrap();
        let copy = ObjectReference::from_address(copy_addr);
        heap.forwarding().try_install(referent, copy);
        heap.gc_state.set(gc_state::HAS_FORWARDED | gc_state::UPDATEREFS);

        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();
        let rewritten = engine.clone_barrier(&mut thread, &[referent], true, 8);
        assert_eq!(rewritten, vec![copy]);

        let unchanged = engine.clone_barrier(&mut thread, &[referent], false, 8);
        assert_eq!(unchanged, vec![referent]);
    }

    #[test]
    fn clone_barrier_disabled_leaves_references_untouched_during_update_refs() {
        let mut opts = Options::default();
        opts.region_size_bytes.set(1024);
        opts.clone_barrier.set(false);
        let heap = Heap::new(1, opts);
        heap.region(0).make_regular_alloc();
        let ref_addr = heap.region(0).allocate(8, 1, AllocKind::MutatorShared).unwrap();
        let referent = ObjectReference::from_address(ref_addr);
        let copy_addr = heap.region(0).allocate(8, 1, AllocKind::CollectorShared).unwrap();
        let copy = ObjectReference::from_address(copy_addr);
        heap.forwarding().try_install(referent, copy);
        heap.gc_state.set(gc_state::HAS_FORWARDED | gc_state::UPDATEREFS);

        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();
        let result = engine.clone_barrier(&mut thread, &[referent], true, 8);
        assert_eq!(result, vec![referent], "the flag disables forwardee rewriting entirely");
    }

    #[test]
    fn clone_barrier_enqueues_under_marking_iu() {
        let mut opts = Options::default();
        opts.region_size_bytes.set(1024);
        opts.iu_barrier.set(true);
        let heap = Heap::new(2, opts);
        heap.gc_state.set(gc_state::MARKING);
        heap.region(0).make_regular_alloc();
        let addr = heap.region(0).allocate(8, 1, AllocKind::MutatorShared).unwrap();
        let referent = ObjectReference::from_address(addr);
        // Capture TAMS after allocating `referent` so it is a normal pre-mark-start object
        // and the IU enqueue below is exercised via the mark filter, not the implicit-live
        // check (mirrors the SATB sibling test below).
        heap.marking().capture_top_at_mark_start(0, heap.region(0).top());

        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();
        let result = engine.clone_barrier(&mut thread, &[referent], true, 8);
        assert_eq!(result, vec![referent]);
        assert_eq!(thread.iu.len(), 1);
    }

    #[test]
    fn array_copy_skips_barrier_work_above_watermark() {
        let heap = heap_with_regions(1);
        heap.gc_state.set(gc_state::MARKING);
        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();

        let slot = Address::from_usize(800_000);
        let value = ObjectReference::from_address(Address::from_usize(900_000));
        engine.array_copy(&mut thread, &[slot], &[value], false, 8);
        assert_eq!(engine.fields.load(slot), value);
        assert!(thread.satb.is_empty());
        assert!(thread.iu.is_empty());
    }

    #[test]
    fn array_copy_rewrites_references_during_update_refs() {
        let heap = heap_with_regions(1);
        heap.region(0).make_regular_alloc();
        let ref_addr = heap.region(0).allocate(8, 1, AllocKind::MutatorShared).unwrap();
        let referent = ObjectReference::from_address(ref_addr);
        let copy_addr = heap.region(0).allocate(8, 1, AllocKind::CollectorShared).unwrap();
        let copy = ObjectReference::from_address(copy_addr);
        heap.forwarding().try_install(referent, copy);
        heap.gc_state.set(gc_state::HAS_FORWARDED | gc_state::UPDATEREFS);

        let engine = BarrierEngine::new(&heap);
        let mut thread = ThreadLocalBarrierState::new();
        let slot = Address::from_usize(700_000);
        engine.array_copy(&mut thread, &[slot], &[referent], true, 8);
        assert_eq!(engine.fields.load(slot), copy);
    }
}
