//! Evacuation OOM-during-evacuation protocol (§4.7): a single shared flag. The first thread
//! whose evacuation allocation fails flips it; every thread that then sees it active (or
//! loses the flip race right after a failure of its own) proceeds by installing the original
//! object as its own forwardee instead of moving it. A degenerated GC follows once the
//! current evacuation work drains.
//!
//! Grounded on [`crate::heap::cancellation::CancellationFlag`]'s single-bit, CAS-gated
//! protocol, applied to the narrower "one-shot latch" shape this needs instead of the
//! three-state cancellation machine.

use std::sync::atomic::{AtomicBool, Ordering};

pub struct EvacOomScope(AtomicBool);

impl EvacOomScope {
    pub fn new() -> Self {
        EvacOomScope(AtomicBool::new(false))
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Flips the flag on the first call; returns whether this call was the one that flipped
    /// it (the caller logs/triggers degenerated-GC follow-up only on that first flip).
    pub fn enter(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Cleared once the degenerated cycle that followed has completed and a fresh cycle can
    /// attempt evacuation again.
    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for EvacOomScope {
    fn default() -> Self {
        Self::new()
    }
}
