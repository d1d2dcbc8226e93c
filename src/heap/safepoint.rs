//! The safepoint mechanism: a call that brings all mutators to a known quiescent state
//! and runs a supplied closure. Region state changes and collection-set mutations are
//! safepoint-only.
//!
//! This crate has no real mutator threads to pause, so `Safepoint` models the minimum
//! needed to make that invariant enforceable and testable: mutators that want to observe
//! safepoints register a handle and call [`Safepoint::poll`] between barrier-free stretches
//! of code; [`Safepoint::run_at_safepoint`] blocks until every registered handle has polled
//! in, runs the closure, then releases them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

pub struct Safepoint {
    requested: AtomicBool,
    registered: AtomicUsize,
    arrived: Mutex<usize>,
    arrived_cond: Condvar,
    released: AtomicBool,
    released_cond: Condvar,
    released_lock: Mutex<()>,
}

impl Safepoint {
    pub fn new() -> Self {
        Safepoint {
            requested: AtomicBool::new(false),
            registered: AtomicUsize::new(0),
            arrived: Mutex::new(0),
            arrived_cond: Condvar::new(),
            released: AtomicBool::new(true),
            released_cond: Condvar::new(),
            released_lock: Mutex::new(()),
        }
    }

    /// Register a mutator handle that must poll in before a safepoint can proceed. Returns
    /// a guard that deregisters on drop (the mutator exited).
    pub fn register(&self) -> MutatorHandle<'_> {
        self.registered.fetch_add(1, Ordering::AcqRel);
        MutatorHandle { safepoint: self }
    }

    /// Called by a registered mutator between units of work. Blocks while a safepoint is in
    /// progress.
    pub fn poll(&self) {
        if !self.requested.load(Ordering::Acquire) {
            return;
        }
        {
            let mut arrived = self.arrived.lock().unwrap();
            *arrived += 1;
            self.arrived_cond.notify_all();
        }
        let guard = self.released_lock.lock().unwrap();
        let _unused = self
            .released_cond
            .wait_while(guard, |_| !self.released.load(Ordering::Acquire))
            .unwrap();
        let mut arrived = self.arrived.lock().unwrap();
        *arrived = arrived.saturating_sub(1);
    }

    /// Requests a safepoint, blocks until every registered mutator has polled in, runs
    /// `f`, then releases them. Single-VM-thread use, matching "short
    /// root-scanning and rendezvous actions require a stop-the-world safepoint".
    pub fn run_at_safepoint<R>(&self, f: impl FnOnce() -> R) -> R {
        self.released.store(false, Ordering::Release);
        self.requested.store(true, Ordering::Release);
        let expected = self.registered.load(Ordering::Acquire);
        {
            let arrived = self.arrived.lock().unwrap();
            let _unused = self
                .arrived_cond
                .wait_while(arrived, |n| *n < expected)
                .unwrap();
        }
        let result = f();
        self.requested.store(false, Ordering::Release);
        self.released.store(true, Ordering::Release);
        self.released_cond.notify_all();
        result
    }
}

impl Default for Safepoint {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MutatorHandle<'a> {
    safepoint: &'a Safepoint,
}

impl Drop for MutatorHandle<'_> {
    fn drop(&mut self) {
        self.safepoint.registered.fetch_sub(1, Ordering::AcqRel);
    }
}
