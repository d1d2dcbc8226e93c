//! Simulated reference-field storage: a side table standing in for the object fields and
//! roots a real embedding would hold in its own managed memory. This crate has no backing
//! heap (see `forwarding.rs`'s header comment for the same reasoning applied to the
//! forwarding word) so a field that would live inside an object's payload is instead an
//! [`std::sync::atomic::AtomicUsize`] slot addressed by its own [`Address`], independent of
//! the range the heap's regions occupy (fields and roots are mutator-owned storage, not GC
//! bookkeeping, so nothing requires them to fall inside the heap's addressable range).
//!
//! Used by the load-reference barrier's self-fixing install (§4.7 item 4) and by the clone
//! and array-copy barriers, which need somewhere to read "the previous value of this field"
//! from (the old value SATB must enqueue) and somewhere to write the rewritten reference
//! during update-refs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::util::address::{Address, ObjectReference};

pub struct FieldTable {
    slots: RwLock<HashMap<usize, AtomicUsize>>,
}

impl FieldTable {
    /// The `base`/`num_words` parameters are unused sizing hints kept for call-site symmetry
    /// with [`crate::heap::forwarding::ForwardingTable`]; storage itself is sparse.
    pub fn new(_base: Address, _num_words: usize) -> Self {
        FieldTable { slots: RwLock::new(HashMap::new()) }
    }

    fn slot_value(&self, addr: Address, init: usize) -> usize {
        let idx = addr.word_index();
        if let Some(slot) = self.slots.read().unwrap().get(&idx) {
            return slot.load(Ordering::Acquire);
        }
        let mut slots = self.slots.write().unwrap();
        slots.entry(idx).or_insert_with(|| AtomicUsize::new(init)).load(Ordering::Acquire)
    }

    #[inline]
    pub fn load(&self, field: Address) -> ObjectReference {
        ObjectReference::from_address(Address::from_usize(self.slot_value(field, 0)))
    }

    #[inline]
    pub fn store(&self, field: Address, value: ObjectReference) {
        let idx = field.word_index();
        let value = value.to_address().as_usize();
        if let Some(slot) = self.slots.read().unwrap().get(&idx) {
            slot.store(value, Ordering::Release);
            return;
        }
        let mut slots = self.slots.write().unwrap();
        slots.entry(idx).or_insert_with(|| AtomicUsize::new(0)).store(value, Ordering::Release);
    }

    /// Opportunistic CAS used by the load-reference barrier's self-fixing install: a failed
    /// CAS here is benign (another thread already fixed the slot, or rewrote it to something
    /// else entirely), so the return value is purely informational.
    #[inline]
    pub fn compare_and_swap(&self, field: Address, expected: ObjectReference, new: ObjectReference) -> bool {
        let idx = field.word_index();
        let expected = expected.to_address().as_usize();
        let new = new.to_address().as_usize();
        {
            let slots = self.slots.read().unwrap();
            if let Some(slot) = slots.get(&idx) {
                return slot.compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire).is_ok();
            }
        }
        let mut slots = self.slots.write().unwrap();
        slots
            .entry(idx)
            .or_insert_with(|| AtomicUsize::new(0))
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
