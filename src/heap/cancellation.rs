//! Cooperative cancellation: a single flag with three states gating cooperative
//! yields in worker loops. Workers check between work units; on observing `Cancelled` they
//! unwind to the nearest rendezvous. The control thread may transition
//! `Cancellable -> Cancelled` atomically; `NotCancellable` pins the flag during critical
//! regions.

use std::sync::atomic::{AtomicU8, Ordering};

const CANCELLABLE: u8 = 0;
const CANCELLED: u8 = 1;
const NOT_CANCELLABLE: u8 = 2;

pub struct CancellationFlag(AtomicU8);

impl CancellationFlag {
    pub fn new() -> Self {
        CancellationFlag(AtomicU8::new(CANCELLABLE))
    }

    /// Atomically transitions `Cancellable -> Cancelled`. No-op (returns `false`) if the
    /// flag is `NotCancellable` (a critical region is pinning it) or already `Cancelled`.
    pub fn cancel(&self) -> bool {
        self.0
            .compare_exchange(CANCELLABLE, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire) == CANCELLED
    }

    /// Pins the flag so `cancel()` cannot succeed until the returned guard is dropped.
    /// Panics if the flag was already cancelled or already pinned — nested critical
    /// regions are a bug, not a valid use of this type.
    pub fn enter_not_cancellable(&self) -> NotCancellableGuard<'_> {
        let prev = self.0.swap(NOT_CANCELLABLE, Ordering::AcqRel);
        assert_eq!(
            prev, CANCELLABLE,
            "entered a not-cancellable region while the flag was {prev} (expected Cancellable)"
        );
        NotCancellableGuard { flag: self }
    }

    pub fn reset(&self) {
        self.0.store(CANCELLABLE, Ordering::Release);
    }
}

impl Default for CancellationFlag {
    fn default() -> Self {
        Self::new()
    }
}

pub struct NotCancellableGuard<'a> {
    flag: &'a CancellationFlag,
}

impl Drop for NotCancellableGuard<'_> {
    fn drop(&mut self) {
        self.flag.0.store(CANCELLABLE, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_succeeds_when_cancellable() {
        let flag = CancellationFlag::new();
        assert!(flag.cancel());
        assert!(flag.is_cancelled());
    }

    #[test]
    fn not_cancellable_blocks_cancellation() {
        let flag = CancellationFlag::new();
        let guard = flag.enter_not_cancellable();
        assert!(!flag.cancel());
        drop(guard);
        assert!(flag.cancel());
    }
}
