//! Per-thread SATB/IU enqueue buffers and the shared sink marker workers drain them into.
//!
//! Grounded on `plan::concurrent::barrier::SATBBarrierSemantics`'s `VectorQueue` (push,
//! flush-when-full, hand off to a work bucket) — this crate has no scheduler/work-bucket
//! machinery, so the "hand off" side is a plain `Mutex`-guarded sink a marker-worker loop
//! would drain from instead.

use std::sync::Mutex;

use crate::util::address::ObjectReference;

/// A bounded per-thread buffer. SATB enqueues the *old* value of an overwritten field; IU
/// enqueues the *new* value — the same buffer shape serves both, distinguished only by what
/// the caller pushes into it.
pub struct WriteBarrierBuffer {
    buf: Vec<ObjectReference>,
    capacity: usize,
}

impl WriteBarrierBuffer {
    pub fn new(capacity: usize) -> Self {
        WriteBarrierBuffer {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Pushes `obj`; returns whether the buffer is now full (the caller's cue to flush).
    /// Filters nothing itself — the mark-filter (skip null, skip already-marked) is the
    /// barrier engine's job, not the buffer's, so the same type stays reusable for IU too.
    pub fn push(&mut self, obj: ObjectReference) -> bool {
        self.buf.push(obj);
        self.buf.len() >= self.capacity
    }

    /// Drains the buffer for a flush, leaving it empty and ready to fill again.
    pub fn take(&mut self) -> Vec<ObjectReference> {
        std::mem::take(&mut self.buf)
    }
}

/// Stands in for the marker worker's queue/work-bucket: flushed per-thread buffers land
/// here; a marker loop (outside this crate's scope — see §6's collaborator contract) drains
/// it and processes each reference exactly once per the SATB round-trip law, modulo the
/// mark-filter's own dedup.
#[derive(Default)]
pub struct MarkerQueue {
    pending: Mutex<Vec<ObjectReference>>,
}

impl MarkerQueue {
    pub fn new() -> Self {
        MarkerQueue::default()
    }

    pub fn submit(&self, mut batch: Vec<ObjectReference>) {
        if batch.is_empty() {
            return;
        }
        self.pending.lock().unwrap().append(&mut batch);
    }

    pub fn drain_all(&self) -> Vec<ObjectReference> {
        std::mem::take(&mut self.pending.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::address::Address;

    fn obj_at(words: usize) -> ObjectReference {
        ObjectReference::from_address(Address::from_usize(words))
    }

    #[test]
    fn push_reports_full_at_capacity() {
        let mut buf = WriteBarrierBuffer::new(2);
        assert!(!buf.push(obj_at(8)));
        assert!(buf.push(obj_at(16)));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn take_empties_and_is_reusable() {
        let mut buf = WriteBarrierBuffer::new(4);
        buf.push(obj_at(8));
        let drained = buf.take();
        assert_eq!(drained, vec![obj_at(8)]);
        assert!(buf.is_empty());
    }

    #[test]
    fn marker_queue_accumulates_across_submits() {
        let queue = MarkerQueue::new();
        queue.submit(vec![obj_at(8), obj_at(16)]);
        queue.submit(vec![obj_at(24)]);
        let mut drained = queue.drain_all();
        drained.sort();
        assert_eq!(drained, vec![obj_at(8), obj_at(16), obj_at(24)]);
        assert!(queue.is_empty());
    }
}
