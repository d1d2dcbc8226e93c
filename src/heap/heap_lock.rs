//! The single heap lock: a recursive monitor serializing free-set mutation,
//! region state transitions outside a safepoint, and TLAB/GCLAB acquisition that extends
//! into a new region.
//!
//! `std::sync::Mutex` is not reentrant, and allocator paths that extend a TLAB into a
//! fresh region while already holding the lock need to re-enter it. We implement the
//! small amount of reentrancy tracking ourselves rather than pull in an extra dependency.

use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

struct LockState {
    owner: Option<ThreadId>,
    depth: usize,
}

pub struct HeapLock {
    state: Mutex<LockState>,
    released: Condvar,
}

impl HeapLock {
    pub fn new() -> Self {
        HeapLock {
            state: Mutex::new(LockState {
                owner: None,
                depth: 0,
            }),
            released: Condvar::new(),
        }
    }

    pub fn lock(&self) -> HeapLockGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    break;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    break;
                }
                Some(_) => {
                    state = self.released.wait(state).unwrap();
                }
            }
        }
        HeapLockGuard { lock: self }
    }
}

impl Default for HeapLock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HeapLockGuard<'a> {
    lock: &'a HeapLock,
}

impl Drop for HeapLockGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock().unwrap();
        debug_assert_eq!(state.owner, Some(thread::current().id()));
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.lock.released.notify_all();
        }
    }
}
