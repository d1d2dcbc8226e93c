//! C5: CollectionSet — regions selected for this cycle's evacuation; MT-safe claim
//! iterator; biased membership map for O(1) "in cset" tests on any address.
//!
//! Grounded on the side-metadata-style biased addressing
//! (`util::metadata::side_metadata::global::SideMetadataSpec`, which computes metadata
//! addresses by shifting from a base rather than subtracting it) and
//! `scheduler::work_bucket`'s relaxed-CAS claim-the-next-item pattern for `claim_next`.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::util::address::Address;

/// The collection set is addressed two ways: by region index (the plain byte map) and by
/// arbitrary heap address (the biased map). To answer "is this address in cset?" without a
/// subtraction or a null check on every barrier-hot load, heap region 0 is placed
/// `region_size_words` words above the mapping's true base; slot 0 of the biased map is
/// permanently zero and both the null address and any address below the heap proper land on
/// it.
pub struct CollectionSet {
    cset: Vec<bool>,
    biased: Vec<u8>,
    region_size_words: usize,
    current_index: AtomicUsize,
    garbage_words: usize,
    used_words: usize,
    region_count: usize,
}

impl CollectionSet {
    pub fn new(num_regions: usize, region_size_words: usize) -> Self {
        CollectionSet {
            cset: vec![false; num_regions],
            biased: vec![0u8; num_regions + 1],
            region_size_words,
            current_index: AtomicUsize::new(0),
            garbage_words: 0,
            used_words: 0,
            region_count: 0,
        }
    }

    /// Heap address corresponding to region `index`'s bottom, under the one-region guard
    /// offset described above.
    pub fn region_bottom_address(&self, index: usize) -> Address {
        Address::from_usize((index + 1) * self.region_size_words)
    }

    /// Sets `cset[r]`; transitions happen in [`crate::heap::Heap`] (this type only tracks
    /// membership and derived counters). Must be called at a safepoint by a single thread.
    pub fn add(&mut self, region_index: usize, used_words: usize, live_words: usize) {
        debug_assert!(!self.cset[region_index], "region {region_index} already in cset");
        self.cset[region_index] = true;
        self.biased[region_index + 1] = 1;
        self.garbage_words += used_words.saturating_sub(live_words);
        self.used_words += used_words;
        self.region_count += 1;
    }

    #[inline]
    pub fn is_in_region(&self, region_index: usize) -> bool {
        self.cset[region_index]
    }

    /// O(1) lookup in the biased byte map. Any heap address, and the null address, can be
    /// passed directly: `addr >> log2(region_size)` indexes straight into `biased` with no
    /// subtraction and no branch for null. Addresses throughout this crate are word-granular
    /// (region bounds are built from a word count, not a byte count — see
    /// [`CollectionSet::region_bottom_address`]), so the shift divides by `region_size_words`
    /// alone.
    #[inline]
    pub fn is_in_address(&self, addr: Address) -> bool {
        let slot = addr.as_usize() / self.region_size_words;
        slot < self.biased.len() && self.biased[slot] != 0
    }

    /// MT-safe iterator: relaxed CAS to advance `current_index`. Skips regions not in cset;
    /// when it loses a CAS race it resumes from the winner's index, so concurrent claimers
    /// always partition the cset disjointly.
    pub fn claim_next(&self) -> Option<usize> {
        loop {
            let start = self.current_index.load(Ordering::Relaxed);
            if start >= self.cset.len() {
                return None;
            }
            let mut idx = start;
            while idx < self.cset.len() && !self.cset[idx] {
                idx += 1;
            }
            if idx >= self.cset.len() {
                // Nothing left from `start` on; try to publish that so other claimers don't
                // re-scan the same dead range, but don't treat a lost race here as an error.
                let _ = self.current_index.compare_exchange_weak(
                    start,
                    self.cset.len(),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                );
                return None;
            }
            match self.current_index.compare_exchange_weak(
                start,
                idx + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(idx),
                Err(_) => continue, // another thread moved the cursor; resume from its value
            }
        }
    }

    pub fn garbage_words(&self) -> usize {
        self.garbage_words
    }

    pub fn used_words(&self) -> usize {
        self.used_words
    }

    pub fn region_count(&self) -> usize {
        self.region_count
    }

    /// Safepoint-only: zeros the byte map and counters. Does not itself transition region
    /// states (the evacuation epilogue moves regions to Trash).
    pub fn clear(&mut self) {
        self.cset.iter_mut().for_each(|m| *m = false);
        self.biased.iter_mut().for_each(|m| *m = 0);
        self.current_index.store(0, Ordering::Relaxed);
        self.garbage_words = 0;
        self.used_words = 0;
        self.region_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_address_is_never_in_cset() {
        let mut cset = CollectionSet::new(4, 16);
        for i in 0..4 {
            cset.add(i, 16, 0);
        }
        assert!(!cset.is_in_address(Address::ZERO));
    }

    #[test]
    fn address_lookup_matches_region_membership() {
        let mut cset = CollectionSet::new(4, 16);
        cset.add(2, 16, 4);
        let addr = cset.region_bottom_address(2);
        assert!(cset.is_in_address(addr));
        assert!(!cset.is_in_address(cset.region_bottom_address(1)));
        assert_eq!(cset.garbage_words(), 12);
    }

    #[test]
    fn claim_next_yields_disjoint_regions() {
        let mut cset = CollectionSet::new(8, 16);
        for i in [1, 3, 4, 6] {
            cset.add(i, 16, 0);
        }
        let mut claimed = vec![];
        while let Some(idx) = cset.claim_next() {
            claimed.push(idx);
        }
        claimed.sort_unstable();
        assert_eq!(claimed, vec![1, 3, 4, 6]);
    }

    #[test]
    fn concurrent_claim_next_is_disjoint_and_exhaustive() {
        use std::sync::Arc;
        use std::thread;

        let mut cset = CollectionSet::new(200, 16);
        for i in 0..200 {
            cset.add(i, 16, 0);
        }
        let cset = Arc::new(cset);
        let mut handles = vec![];
        for _ in 0..8 {
            let cset = Arc::clone(&cset);
            handles.push(thread::spawn(move || {
                let mut mine = vec![];
                while let Some(idx) = cset.claim_next() {
                    mine.push(idx);
                }
                mine
            }));
        }
        let mut all: Vec<usize> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..200).collect::<Vec<_>>());
    }
}
