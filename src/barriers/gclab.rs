//! Per-thread GCLAB: an elastic bump buffer the mutator-thread evacuation path copies into,
//! backed by the shared collector partition via [`crate::heap::Heap::allocate`]. Grounded on
//! the `util::alloc::allocators::AllocatorSelector`/bump-pointer-with-slow-path-refill shape
//! used throughout `util::alloc`, specialized to the one elastic knob this crate's GCLAB
//! needs: "downsize to fit the region" (§4.4's LAB rule) rather than a full allocator
//! hierarchy.

use crate::heap::region::AllocKind;
use crate::heap::Heap;
use crate::util::address::Address;

/// Words requested for a fresh GCLAB segment when the current one can't satisfy a bump. The
/// request is itself elastic (§4.4): the free-set may hand back fewer words than this, down
/// to the triggering allocation's own size.
const DESIRED_GCLAB_WORDS: usize = 4096;

pub struct Gclab {
    top: usize,
    limit: usize,
    last_alloc: Option<(usize, usize)>,
}

impl Gclab {
    pub fn new() -> Self {
        Gclab {
            top: 0,
            limit: 0,
            last_alloc: None,
        }
    }

    fn try_bump(&mut self, words: usize) -> Option<Address> {
        if self.top + words > self.limit {
            return None;
        }
        let addr = Address::from_usize(self.top);
        self.last_alloc = Some((self.top, words));
        self.top += words;
        Some(addr)
    }

    /// Bumps `words` out of the current segment; on a miss, refills from the heap's
    /// collector partition (asking for [`DESIRED_GCLAB_WORDS`], accepting anything down to
    /// `words`) and retries once. Returns `None` only when the heap itself has nothing left
    /// to give — the evacuation OOM protocol takes over from there.
    pub fn allocate(&mut self, heap: &Heap, words: usize) -> Option<Address> {
        if let Some(addr) = self.try_bump(words) {
            return Some(addr);
        }
        match heap.allocate_actual(AllocKind::CollectorGclab, words, DESIRED_GCLAB_WORDS.max(words)) {
            Ok((segment_start, granted_words)) => {
                self.top = segment_start.as_usize();
                self.limit = segment_start.as_usize() + granted_words;
                self.try_bump(words)
            }
            Err(_) => None,
        }
    }

    /// Cancels the most recent allocation if it is still the lab's bump frontier (the common
    /// case for a losing evacuation race, which unrolls immediately after losing); a
    /// different allocation has already been taken since, the space is simply wasted per
    /// §4.7's OOM/race protocol.
    pub fn unroll_last(&mut self, addr: Address, words: usize) -> bool {
        if self.last_alloc == Some((addr.as_usize(), words)) && self.top == addr.as_usize() + words {
            self.top = addr.as_usize();
            self.last_alloc = None;
            true
        } else {
            false
        }
    }
}

impl Default for Gclab {
    fn default() -> Self {
        Self::new()
    }
}
