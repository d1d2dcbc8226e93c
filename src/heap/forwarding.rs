//! C2: ForwardingSlot — one machine-word header slot per object, overloaded via a low-bit
//! "marked" tag. Racing installs resolve by CAS.
//!
//! Grounded on the `util::object_forwarding::{ForwardingAttempt, WonForwardingAttempt,
//! LostForwardingAttempt}`: a won/lost split so the winner's and loser's obligations (actually
//! copy the object vs. spin and adopt the winner's pointer) are distinct types rather than a
//! single boolean. We don't have a real VM object model to copy through, so the table below
//! owns the header word directly instead of delegating to `VM::VMObjectModel`.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::fatal;
use crate::util::address::{Address, ObjectReference};

const FORWARDED_TAG: usize = 1;

/// Per-object forwarding table. One [`AtomicUsize`] slot per object, indexed by the word
/// index of the object's address. In the real collaborator contract this slot
/// lives inside the object's own header; here it is a side table because this crate does
/// not own real object memory.
pub struct ForwardingTable {
    slots: Vec<AtomicUsize>,
    base_word_index: usize,
}

impl ForwardingTable {
    pub fn new(base: Address, num_words: usize) -> Self {
        ForwardingTable {
            slots: (0..num_words).map(|_| AtomicUsize::new(0)).collect(),
            base_word_index: base.word_index(),
        }
    }

    #[inline]
    fn slot(&self, obj: ObjectReference) -> &AtomicUsize {
        let idx = obj.to_address().word_index() - self.base_word_index;
        &self.slots[idx]
    }

    #[inline]
    pub fn is_forwarded(&self, obj: ObjectReference) -> bool {
        self.slot(obj).load(Ordering::Acquire) & FORWARDED_TAG != 0
    }

    /// CAS `header: normal -> tag|candidate`. On success returns `candidate`; on failure
    /// decodes the now-installed pointer from the loser's winning store and returns it.
    /// Acquire on read, release on successful CAS.
    pub fn try_install(&self, obj: ObjectReference, candidate: ObjectReference) -> ObjectReference {
        let slot = self.slot(obj);
        let tagged = candidate.to_address().as_usize() | FORWARDED_TAG;
        let current = slot.load(Ordering::Acquire);
        if current & FORWARDED_TAG != 0 {
            return decode(current);
        }
        match slot.compare_exchange(current, tagged, Ordering::Release, Ordering::Acquire) {
            Ok(_) => candidate,
            Err(actual) => {
                debug_assert!(
                    actual & FORWARDED_TAG != 0,
                    "lost a forwarding CAS to a non-forwarded value"
                );
                decode(actual)
            }
        }
    }

    /// Unchecked resolution: if forwarded, decode and return; else return `obj`. Tolerates a
    /// tagged-but-null slot (produced by inspection tooling racing a reverted forward) and
    /// returns `obj` in that case rather than asserting — see "Unchecked forwardee
    /// resolution".
    #[inline]
    pub fn get_unchecked(&self, obj: ObjectReference) -> ObjectReference {
        let raw = self.slot(obj).load(Ordering::Acquire);
        if raw & FORWARDED_TAG == 0 {
            return obj;
        }
        let untagged = raw & !FORWARDED_TAG;
        if untagged == 0 {
            return obj;
        }
        decode(raw)
    }

    /// Mutator-path resolution: if forwarded, decode and return; else return `obj`. Asserts
    /// the installed pointer is non-null — no inspector races a mutator during concurrent
    /// evacuation, so a tagged-but-null slot here is a bug, not a benign race.
    #[inline]
    pub fn get(&self, obj: ObjectReference) -> ObjectReference {
        let raw = self.slot(obj).load(Ordering::Acquire);
        if raw & FORWARDED_TAG == 0 {
            return obj;
        }
        let untagged = raw & !FORWARDED_TAG;
        debug_assert!(untagged != 0, "mutator observed a tagged-but-null forwarding slot");
        decode(raw)
    }

    /// Checks the idempotence law `get(get(obj)) == get(obj)`, and that the result
    /// performs no further allocation (trivially true here — `get` never allocates).
    /// Intended for use by evacuation code asserting the no-chaining invariant; panics via
    /// [`fatal::forwarding_chain`] if it is violated.
    pub fn assert_no_chain(&self, obj: ObjectReference) {
        let once = self.get(obj);
        let twice = self.get(once);
        if once != twice {
            fatal::forwarding_chain(obj, once, twice);
        }
    }

    pub fn reset(&self, obj: ObjectReference) {
        self.slot(obj).store(0, Ordering::Release);
    }
}

#[inline]
fn decode(tagged: usize) -> ObjectReference {
    ObjectReference::from_address(Address::from_usize(tagged & !FORWARDED_TAG))
}
