//! C4: FreeSet — bitmap-indexed mutator/collector partition of regions; single and
//! humongous allocation; evacuation reserve.
//!
//! Grounded on the allocator family under `util::alloc` (first-fit scanning with
//! cached bounds) and `policy::immix::immixspace.rs`'s block-list bookkeeping for `used`
//! and `capacity`. The left-to-right mutator / right-to-left collector scan direction and
//! the evacuation-reserve stealing policy follow the same design.

use crate::heap::region::{AllocKind, Region, RegionState};
use crate::util::address::Address;

/// An allocation request. `actual_words` is filled in by [`FreeSet::allocate`] on
/// success.
#[derive(Debug, Clone, Copy)]
pub struct AllocRequest {
    pub kind: AllocKind,
    pub min_words: usize,
    pub requested_words: usize,
    pub actual_words: usize,
}

impl AllocRequest {
    pub fn new(kind: AllocKind, min_words: usize, requested_words: usize) -> Self {
        AllocRequest {
            kind,
            min_words,
            requested_words,
            actual_words: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Partition {
    Mutator,
    Collector,
}

struct PartitionBounds {
    members: Vec<bool>,
    leftmost: Option<usize>,
    rightmost: Option<usize>,
}

impl PartitionBounds {
    fn new(num_regions: usize) -> Self {
        PartitionBounds {
            members: vec![false; num_regions],
            leftmost: None,
            rightmost: None,
        }
    }

    fn clear(&mut self) {
        self.members.iter_mut().for_each(|m| *m = false);
        self.leftmost = None;
        self.rightmost = None;
    }

    fn insert(&mut self, index: usize) {
        self.members[index] = true;
        self.leftmost = Some(self.leftmost.map_or(index, |l| l.min(index)));
        self.rightmost = Some(self.rightmost.map_or(index, |r| r.max(index)));
    }

    fn remove(&mut self, index: usize) {
        self.members[index] = false;
        if self.leftmost == Some(index) {
            self.leftmost = self.members.iter().position(|&m| m);
        }
        if self.rightmost == Some(index) {
            self.rightmost = self.members.iter().rposition(|&m| m);
        }
    }

    fn contains(&self, index: usize) -> bool {
        self.members[index]
    }
}

pub struct FreeSet {
    mutator: PartitionBounds,
    collector: PartitionBounds,
    capacity_words: usize,
    used_words: usize,
    region_size_words: usize,
    humongous_threshold_words: usize,
    object_align_words: usize,
    allow_stealing: bool,
    elastic_tlab: bool,
}

/// Internal fragmentation and external fragmentation of the heap's allocated regions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentationMetrics {
    pub internal: f64,
    pub external: f64,
}

impl FreeSet {
    pub fn new(
        num_regions: usize,
        region_size_words: usize,
        humongous_threshold_words: usize,
        object_align_words: usize,
        allow_stealing: bool,
        elastic_tlab: bool,
    ) -> Self {
        FreeSet {
            mutator: PartitionBounds::new(num_regions),
            collector: PartitionBounds::new(num_regions),
            capacity_words: 0,
            used_words: 0,
            region_size_words,
            humongous_threshold_words,
            object_align_words,
            allow_stealing,
            elastic_tlab,
        }
    }

    pub fn capacity_words(&self) -> usize {
        self.capacity_words
    }

    pub fn used_words(&self) -> usize {
        self.used_words
    }

    pub fn available_words(&self) -> usize {
        self.capacity_words.saturating_sub(self.used_words)
    }

    fn partition(&self, p: Partition) -> &PartitionBounds {
        match p {
            Partition::Mutator => &self.mutator,
            Partition::Collector => &self.collector,
        }
    }

    /// First-fit scan of `partition` over `regions`, honoring the scan direction mandate
    /// (left-to-right for mutator, right-to-left for collector) and the elastic
    /// LAB downsizing rule (gated on `elastic_tlab`, §6): when enabled, a LAB request
    /// settles for `min(available, requested)` words, aligned down to `object_align_words`,
    /// as long as that's at least `min_words`. When disabled, a LAB request is treated like
    /// any other shared request — it must find a region with the full `requested_words`
    /// free, or the region is skipped.
    fn first_fit(&mut self, p: Partition, regions: &[Region], req: &mut AllocRequest) -> Option<Address> {
        let bounds = self.partition(p);
        let (lo, hi) = (bounds.leftmost?, bounds.rightmost?);
        let indices: Box<dyn Iterator<Item = usize>> = match p {
            Partition::Mutator => Box::new(lo..=hi),
            Partition::Collector => Box::new((lo..=hi).rev()),
        };
        for idx in indices {
            if !self.partition(p).contains(idx) {
                continue;
            }
            let region = &regions[idx];
            let free_words = region.free_words(1);
            let words_to_take = if req.kind.is_lab() && self.elastic_tlab {
                let available = align_down(free_words, self.object_align_words);
                if available < req.min_words {
                    continue;
                }
                available.min(req.requested_words)
            } else {
                if free_words < req.requested_words {
                    continue;
                }
                req.requested_words
            };
            if let Some(addr) = region.allocate(words_to_take, 1, req.kind) {
                req.actual_words = words_to_take;
                self.used_words += words_to_take;
                return Some(addr);
            }
        }
        None
    }

    /// Allocate a request. Dispatches to contiguous (humongous) allocation when the request
    /// exceeds the humongous threshold (only valid for shared requests, never a LAB);
    /// otherwise first-fits in the request's partition, falling back to stealing an empty
    /// mutator region for the collector partition when it is exhausted and stealing is
    /// enabled.
    pub fn allocate(&mut self, regions: &[Region], req: &mut AllocRequest) -> Option<Address> {
        if req.kind.is_lab() {
            // A LAB request's `requested_words` is only an elastic upper bound (§4.4); it
            // never spans regions, so clamp it to one region's worth before the humongous
            // check below, which applies only to non-LAB (shared) requests.
            req.requested_words = req.requested_words.min(self.region_size_words);
        } else if req.requested_words > self.humongous_threshold_words {
            return self.allocate_contiguous(regions, req.requested_words).map(|addr| {
                req.actual_words = req.requested_words;
                addr
            });
        }
        let partition = if req.kind.is_mutator() {
            Partition::Mutator
        } else {
            Partition::Collector
        };
        if let Some(addr) = self.first_fit(partition, regions, req) {
            return Some(addr);
        }
        if partition == Partition::Collector && self.allow_stealing && self.steal_region(regions) {
            return self.first_fit(Partition::Collector, regions, req);
        }
        None
    }

    /// Finds `n = ceil(words / region_size_words)` consecutive empty mutator-partition
    /// regions, converts the first to Humongous-Start and the rest to
    /// Humongous-Continuation. The trailing remainder in the last region is waste (a size
    /// of exactly `k*R` leaves zero trailing waste).
    pub fn allocate_contiguous(&mut self, regions: &[Region], words: usize) -> Option<Address> {
        let n = words.div_ceil(self.region_size_words);
        let bounds = &self.mutator;
        let (lo, hi) = (bounds.leftmost?, bounds.rightmost?);
        'search: for start in lo..=hi {
            if start + n > regions.len() {
                break;
            }
            for i in 0..n {
                let idx = start + i;
                if !self.mutator.contains(idx) || regions[idx].state() != RegionState::EmptyCommitted
                {
                    continue 'search;
                }
            }
            for i in 0..n {
                let idx = start + i;
                self.mutator.remove(idx);
                if i == 0 {
                    regions[idx].make_humongous_start();
                } else {
                    regions[idx].make_humongous_cont(start);
                }
                // The whole region is considered used by the humongous object, whether or
                // not the final region's trailing remainder is occupied.
                regions[idx].allocate(self.region_size_words, 1, AllocKind::MutatorShared);
            }
            self.used_words += n * self.region_size_words;
            return Some(regions[start].bottom());
        }
        None
    }

    /// When the collector partition is empty, flip the rightmost completely empty mutator
    /// region to collector and use it.
    fn steal_region(&mut self, regions: &[Region]) -> bool {
        for idx in (0..regions.len()).rev() {
            if self.mutator.contains(idx) && regions[idx].state() == RegionState::EmptyCommitted
                && regions[idx].used_words(1) == 0
            {
                self.mutator.remove(idx);
                self.collector.insert(idx);
                return true;
            }
        }
        false
    }

    /// Clears both bitmaps, then walks all regions: {Empty, Regular-with-capacity, Trash}
    /// join the mutator partition; `capacity` is summed. Then the trailing tail of regions
    /// is flipped to the collector partition until the evacuation reserve is met.
    pub fn rebuild(&mut self, regions: &[Region], evac_reserve_words: usize) {
        self.mutator.clear();
        self.collector.clear();
        self.capacity_words = 0;
        self.used_words = 0;

        for region in regions {
            match region.state() {
                RegionState::EmptyCommitted | RegionState::Trash => {
                    self.mutator.insert(region.index);
                    self.capacity_words += self.region_size_words;
                }
                RegionState::Regular if region.free_words(1) > 0 => {
                    self.mutator.insert(region.index);
                    self.capacity_words += region.free_words(1);
                    self.used_words += region.used_words(1);
                }
                _ => {}
            }
        }

        let mut reserved = 0usize;
        for idx in (0..regions.len()).rev() {
            if reserved >= evac_reserve_words {
                break;
            }
            if self.mutator.contains(idx) {
                let free = match regions[idx].state() {
                    RegionState::EmptyCommitted | RegionState::Trash => self.region_size_words,
                    _ => regions[idx].free_words(1),
                };
                self.mutator.remove(idx);
                self.collector.insert(idx);
                reserved += free;
            }
        }
    }

    /// Iterates all regions, recycling any in Trash state. In a real embedding this takes
    /// the heap lock briefly per region and yields between iterations; the
    /// cooperative yield is modeled by the caller-supplied `yield_between_iterations`
    /// closure so tests can observe it without a real scheduler.
    pub fn recycle_trash(&mut self, regions: &[Region], mut yield_between_iterations: impl FnMut()) {
        for region in regions.iter() {
            if region.state() == RegionState::Trash {
                region.recycle();
                yield_between_iterations();
            }
        }
    }

    /// Internal fragmentation: `1 - sum(u_i^2) / (R * sum(u_i))` over free-partition
    /// regions. External fragmentation: `1 - max_contiguous_free / total_free`.
    pub fn fragmentation(&self, regions: &[Region]) -> FragmentationMetrics {
        let mut sum_u = 0u64;
        let mut sum_u2 = 0u64;
        let mut total_free = 0u64;
        let mut max_contig_free = 0u64;
        let mut run = 0u64;
        for (idx, region) in regions.iter().enumerate() {
            let in_partition = self.mutator.contains(idx) || self.collector.contains(idx);
            if !in_partition {
                run = 0;
                continue;
            }
            let used = region.used_words(1) as u64;
            let free = region.free_words(1) as u64;
            sum_u += used;
            sum_u2 += used * used;
            total_free += free;
            run += free;
            max_contig_free = max_contig_free.max(run);
        }
        let internal = if sum_u == 0 {
            0.0
        } else {
            1.0 - (sum_u2 as f64) / ((self.region_size_words as f64) * (sum_u as f64))
        };
        let external = if total_free == 0 {
            0.0
        } else {
            1.0 - (max_contig_free as f64) / (total_free as f64)
        };
        FragmentationMetrics {
            internal,
            external,
        }
    }

    pub fn is_mutator_region(&self, index: usize) -> bool {
        self.mutator.contains(index)
    }

    pub fn is_collector_region(&self, index: usize) -> bool {
        self.collector.contains(index)
    }
}

#[inline]
fn align_down(v: usize, align: usize) -> usize {
    v - (v % align)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_regions(n: usize, region_size_words: usize) -> Vec<Region> {
        (0..n)
            .map(|i| {
                let mut r = Region::new(
                    i,
                    Address::from_usize(i * region_size_words),
                    Address::from_usize((i + 1) * region_size_words),
                );
                r.make_committed();
                r
            })
            .collect()
    }

    #[test]
    fn capacity_minus_used_matches_free_partition_words() {
        let mut regions = make_regions(4, 128);
        for r in regions.iter_mut() {
            r.make_regular_alloc();
        }
        let mut fs = FreeSet::new(4, 128, 64, 1, true, true);
        fs.rebuild(&regions, 0);
        assert_eq!(fs.capacity_words(), 4 * 128);
        assert_eq!(fs.available_words(), 4 * 128);

        let mut req = AllocRequest::new(AllocKind::MutatorShared, 16, 16);
        let addr = fs.allocate(&regions, &mut req).unwrap();
        assert_eq!(addr, Address::from_usize(0));
        assert_eq!(fs.capacity_words() - fs.used_words(), fs.available_words());
    }

    #[test]
    fn mutator_scans_left_to_right_collector_right_to_left() {
        let mut regions = make_regions(3, 16);
        for r in regions.iter_mut() {
            r.make_regular_alloc();
        }
        let mut fs = FreeSet::new(3, 16, 64, 1, false, true);
        fs.rebuild(&regions, 0);
        let mut req = AllocRequest::new(AllocKind::MutatorShared, 4, 4);
        let addr = fs.allocate(&regions, &mut req).unwrap();
        assert_eq!(addr, Address::from_usize(0)); // region 0, leftmost

        let mut fs2 = FreeSet::new(3, 16, 64, 1, false, true);
        fs2.rebuild(&regions, 48); // reserve everything to collector
        let mut req2 = AllocRequest::new(AllocKind::CollectorShared, 4, 4);
        let addr2 = fs2.allocate(&regions, &mut req2).unwrap();
        assert_eq!(addr2, Address::from_usize(2 * 16)); // region 2, untouched and rightmost
    }

    #[test]
    fn humongous_of_exactly_k_regions_has_zero_waste() {
        let mut regions = make_regions(3, 64);
        let mut fs = FreeSet::new(3, 64, 32, 1, false, true);
        fs.rebuild(&regions, 0);
        let addr = fs.allocate_contiguous(&regions, 128).unwrap();
        assert_eq!(addr, Address::from_usize(0));
        assert_eq!(regions[0].state(), RegionState::HumongousStart);
        assert_eq!(regions[1].state(), RegionState::HumongousContinuation);
        assert_eq!(regions[2].state(), RegionState::EmptyCommitted);
        assert_eq!(fs.used_words(), 128);
    }

    #[test]
    fn one_word_above_threshold_still_spans_the_ceiling_region_count() {
        // threshold = 32 words/region; requesting 33 words must round up to 2 regions,
        // not stay within a single one.
        let mut regions = make_regions(3, 32);
        let mut fs = FreeSet::new(3, 32, 32, 1, false, true);
        fs.rebuild(&regions, 0);
        let mut req = AllocRequest::new(AllocKind::MutatorShared, 33, 33);
        let addr = fs.allocate(&regions, &mut req).unwrap();
        assert_eq!(addr, Address::from_usize(0));
        assert_eq!(regions[0].state(), RegionState::HumongousStart);
        assert_eq!(regions[1].state(), RegionState::HumongousContinuation);
        assert_eq!(regions[2].state(), RegionState::EmptyCommitted);
    }

    #[test]
    fn elastic_tlab_downsizes_a_lab_request_to_fit_whats_left() {
        let mut regions = make_regions(1, 64);
        regions[0].make_regular_alloc();
        regions[0].allocate(48, 1, AllocKind::MutatorShared).unwrap(); // 16 words left
        let mut fs = FreeSet::new(1, 64, 128, 1, false, true);
        fs.rebuild(&regions, 0);
        let mut req = AllocRequest::new(AllocKind::MutatorTlab, 4, 32);
        let addr = fs.allocate(&regions, &mut req).unwrap();
        assert_eq!(addr, Address::from_usize(48));
        assert_eq!(req.actual_words, 16, "elastic_tlab downsizes to the region's remainder");
    }

    #[test]
    fn disabling_elastic_tlab_fails_a_lab_request_that_does_not_fully_fit() {
        let mut regions = make_regions(1, 64);
        regions[0].make_regular_alloc();
        regions[0].allocate(48, 1, AllocKind::MutatorShared).unwrap(); // 16 words left
        let mut fs = FreeSet::new(1, 64, 128, 1, false, false);
        fs.rebuild(&regions, 0);
        let mut req = AllocRequest::new(AllocKind::MutatorTlab, 4, 32);
        assert!(
            fs.allocate(&regions, &mut req).is_none(),
            "with elastic_tlab off a LAB request needs its full size, same as any other"
        );
    }

    #[test]
    fn stealing_converts_rightmost_empty_mutator_region() {
        let mut regions = make_regions(2, 16);
        let mut fs = FreeSet::new(2, 16, 64, 1, true, true);
        fs.rebuild(&regions, 0); // both regions join mutator; collector starts empty
        let mut req = AllocRequest::new(AllocKind::CollectorShared, 4, 4);
        let addr = fs.allocate(&regions, &mut req).unwrap();
        assert_eq!(addr, Address::from_usize(16)); // region 1 stolen (rightmost empty)
        assert!(fs.is_collector_region(1));
    }
}
