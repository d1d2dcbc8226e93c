//! The global GC state byte: a single byte with bit flags, read by every barrier.
//! A zero byte means barriers are pass-through. Publication is release-store; mutator
//! observation is acquire when it matters.

use std::sync::atomic::{AtomicU8, Ordering};

pub const HAS_FORWARDED: u8 = 1 << 0;
pub const MARKING: u8 = 1 << 1;
pub const EVACUATION: u8 = 1 << 2;
pub const UPDATEREFS: u8 = 1 << 3;
pub const WEAK_ROOTS: u8 = 1 << 4;

pub struct GcStateWord(AtomicU8);

impl GcStateWord {
    pub fn new() -> Self {
        GcStateWord(AtomicU8::new(0))
    }

    #[inline]
    pub fn raw(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn has(&self, bit: u8) -> bool {
        self.raw() & bit != 0
    }

    /// Fast path used by every barrier: when the whole byte is zero, no bit can be set, so
    /// no slow path is required at all.
    #[inline]
    pub fn is_pass_through(&self) -> bool {
        self.raw() == 0
    }

    pub fn set(&self, bit: u8) {
        self.0.fetch_or(bit, Ordering::AcqRel);
    }

    pub fn clear(&self, bit: u8) {
        self.0.fetch_and(!bit, Ordering::AcqRel);
    }
}

impl Default for GcStateWord {
    fn default() -> Self {
        Self::new()
    }
}
