//! C6: Heuristics — trigger policy (*should a cycle start now?*) and cset-selection policy
//! (*which regions go in it?*), pluggable as Static / Compact / Adaptive / Passive.
//!
//! Grounded on `plan::global::CommonPlan`'s trigger/selection split and the historical
//! Shenandoah-lineage heuristics classes visible in `examples/other_examples/`: a tagged
//! variant (design note: "avoid open-ended extension; the four policies are the contract")
//! driving a shared candidate-selection framework, with variant-specific trigger and
//! selector functions layered on top.

pub mod pacer;

use std::collections::VecDeque;

use crate::heap::region::{Region, RegionState};
use crate::options::{HeuristicsKind, Options};

const CYCLE_TIME_HISTORY_LEN: usize = 10;

/// A region with live data, not yet committed to a cset: carries the statistics the
/// variant-specific selectors need without re-touching the region.
#[derive(Debug, Clone, Copy)]
pub struct CsetCandidate {
    pub index: usize,
    pub garbage_words: usize,
    pub live_words: usize,
}

/// Output of the shared candidate-selection walk (§4.6 steps 1-2).
#[derive(Debug, Clone)]
pub struct CsetSelection {
    pub candidates: Vec<CsetCandidate>,
    pub immediate_garbage_words: usize,
    pub empty_free_words: usize,
    pub total_garbage_words: usize,
}

impl CsetSelection {
    pub fn immediate_fraction(&self) -> f64 {
        if self.total_garbage_words == 0 {
            0.0
        } else {
            self.immediate_garbage_words as f64 / self.total_garbage_words as f64
        }
    }

    pub fn actual_free_words(&self) -> usize {
        self.immediate_garbage_words + self.empty_free_words
    }
}

/// Walks every region once (§4.6 step 1): empty regions join the free tally; a
/// humongous-start or regular region with no live data is trashed immediately and counted as
/// immediate garbage; an already-trashed region's garbage also counts as immediate; a
/// regular region with live data becomes a cset candidate. Candidates are sorted by
/// descending garbage (step 2); ties keep the region-index order `sort_by` already gives a
/// stable sort, which is as good as any total order the source leaves unspecified.
pub fn select_candidates(regions: &[Region], region_size_words: usize) -> CsetSelection {
    let mut candidates = Vec::new();
    let mut immediate_garbage_words = 0usize;
    let mut empty_free_words = 0usize;
    // Continuations reached via a zero-live start's reclamation (§4.1) are accounted for
    // right there; mark them here so the outer walk below doesn't double-count them when it
    // reaches their own (by-then-Trash) index.
    let mut reclaimed_as_continuation = vec![false; regions.len()];

    for region in regions {
        if reclaimed_as_continuation[region.index] {
            continue;
        }
        match region.state() {
            RegionState::EmptyCommitted | RegionState::EmptyUncommitted => {
                empty_free_words += region_size_words;
            }
            RegionState::HumongousStart if region.live_data_words() == 0 => {
                immediate_garbage_words += region.used_words(1);
                region.make_trash();
                log::debug!("region {} trashed immediately (humongous, no live data)", region.index);
                for cont in regions {
                    if cont.state() == RegionState::HumongousContinuation
                        && cont.humongous_start_index() == Some(region.index)
                    {
                        immediate_garbage_words += cont.used_words(1);
                        cont.make_trash();
                        reclaimed_as_continuation[cont.index] = true;
                        log::debug!(
                            "region {} trashed alongside humongous start {}",
                            cont.index,
                            region.index
                        );
                    }
                }
            }
            RegionState::Regular if region.live_data_words() == 0 => {
                immediate_garbage_words += region.used_words(1);
                region.make_trash();
                log::debug!("region {} trashed immediately (no live data)", region.index);
            }
            RegionState::Trash => {
                immediate_garbage_words += region.garbage_words(1);
            }
            RegionState::Regular => {
                candidates.push(CsetCandidate {
                    index: region.index,
                    garbage_words: region.garbage_words(1),
                    live_words: region.live_data_words(),
                });
            }
            _ => {}
        }
    }

    candidates.sort_by_key(|b| std::cmp::Reverse(b.garbage_words));
    let total_garbage_words =
        immediate_garbage_words + candidates.iter().map(|c| c.garbage_words).sum::<usize>();

    CsetSelection {
        candidates,
        immediate_garbage_words,
        empty_free_words,
        total_garbage_words,
    }
}

/// Inputs the trigger policy needs, gathered by the caller from [`crate::heap::Heap`] and the
/// surrounding runtime (wall-clock and allocation-rate sampling are not this crate's
/// concern — see §6's collaborator contract).
pub struct TriggerContext {
    pub capacity_words: usize,
    pub available_words: usize,
    pub bytes_allocated_since_gc_start: u64,
    pub elapsed_since_last_cycle_ms: u64,
    pub allocation_rate_words_per_ms: f64,
}

/// Inputs the cset-selection policy needs beyond the shared [`CsetSelection`].
pub struct CsetContext {
    pub region_size_words: usize,
    pub evac_reserve_words: usize,
}

/// Tracks the failure-feedback state (`gc_time_penalty`, degenerated/successful streaks) and
/// the recent cycle-time history an Adaptive trigger needs, and dispatches trigger/selection
/// decisions to the configured [`HeuristicsKind`] variant.
pub struct Heuristics {
    kind: HeuristicsKind,
    degenerated_cycles_in_a_row: u32,
    successful_cycles_in_a_row: u32,
    gc_time_penalty: u8,
    cycle_times_ms: VecDeque<u64>,
    /// Result of the most recent post-GC "good progress" check (§7); starts `true` so a
    /// heuristics instance that never calls [`Heuristics::record_cycle_completion`] behaves
    /// exactly as before this check existed.
    last_cycle_made_good_progress: bool,
}

impl Heuristics {
    pub fn new(kind: HeuristicsKind) -> Self {
        Heuristics {
            kind,
            degenerated_cycles_in_a_row: 0,
            successful_cycles_in_a_row: 0,
            gc_time_penalty: 0,
            cycle_times_ms: VecDeque::with_capacity(CYCLE_TIME_HISTORY_LEN),
            last_cycle_made_good_progress: true,
        }
    }

    pub fn kind(&self) -> HeuristicsKind {
        self.kind
    }

    pub fn gc_time_penalty(&self) -> u8 {
        self.gc_time_penalty
    }

    pub fn degenerated_cycles_in_a_row(&self) -> u32 {
        self.degenerated_cycles_in_a_row
    }

    pub fn successful_cycles_in_a_row(&self) -> u32 {
        self.successful_cycles_in_a_row
    }

    pub fn average_cycle_time_ms(&self) -> Option<u64> {
        if self.cycle_times_ms.is_empty() {
            None
        } else {
            Some(self.cycle_times_ms.iter().sum::<u64>() / self.cycle_times_ms.len() as u64)
        }
    }

    /// A successful concurrent cycle: resets the degenerated streak, decays the time
    /// penalty by 1 (floor 0), and folds the cycle's wall-clock time into the truncated
    /// moving history an Adaptive trigger consults.
    pub fn record_successful_cycle(&mut self, cycle_time_ms: u64) {
        self.degenerated_cycles_in_a_row = 0;
        self.successful_cycles_in_a_row += 1;
        self.gc_time_penalty = self.gc_time_penalty.saturating_sub(1);
        if self.cycle_times_ms.len() == CYCLE_TIME_HISTORY_LEN {
            self.cycle_times_ms.pop_front();
        }
        self.cycle_times_ms.push_back(cycle_time_ms);
        log::info!(
            "cycle completed in {cycle_time_ms}ms, gc_time_penalty now {}",
            self.gc_time_penalty
        );
    }

    /// A degenerated (or full) GC: resets the successful streak and bumps the penalty by 10
    /// for the first one in a run, +1 for each additional consecutive one, capped at 100.
    pub fn record_degenerated_cycle(&mut self) {
        self.successful_cycles_in_a_row = 0;
        let bump = if self.degenerated_cycles_in_a_row == 0 { 10 } else { 1 };
        self.degenerated_cycles_in_a_row += 1;
        self.gc_time_penalty = self.gc_time_penalty.saturating_add(bump).min(100);
        log::warn!(
            "degenerated cycle #{} in a row, gc_time_penalty now {}",
            self.degenerated_cycles_in_a_row,
            self.gc_time_penalty
        );
    }

    /// Post-GC "good progress" check (§7): a cycle made good progress if at least
    /// `critical_free_threshold_percent` of capacity is free once it finishes. Records the
    /// outcome alongside the existing degenerated/successful accounting, so a cycle that
    /// failed to free enough memory escalates straight to full GC even on the very first
    /// degenerated cycle, ahead of the `full_gc_threshold` streak counter.
    pub fn record_cycle_completion(
        &mut self,
        degenerated: bool,
        cycle_time_ms: u64,
        available_words: usize,
        capacity_words: usize,
        options: &Options,
    ) {
        self.last_cycle_made_good_progress =
            made_good_progress(available_words, capacity_words, options);
        if !self.last_cycle_made_good_progress {
            log::warn!(
                "cycle did not make good progress: {available_words}/{capacity_words} words free, \
                 critical threshold is {}%",
                *options.critical_free_threshold_percent
            );
        }
        if degenerated {
            self.record_degenerated_cycle();
        } else {
            self.record_successful_cycle(cycle_time_ms);
        }
    }

    pub fn should_promote_to_full_gc(&self, full_gc_threshold: usize) -> bool {
        !self.last_cycle_made_good_progress
            || self.degenerated_cycles_in_a_row as usize >= full_gc_threshold
    }

    /// Should a cycle start now? The guaranteed-interval ceiling (§6) applies ahead of every
    /// variant except Passive, whose whole point is to trigger only on allocation failure.
    pub fn should_start_gc(&self, ctx: &TriggerContext, options: &Options) -> bool {
        if !matches!(self.kind, HeuristicsKind::Passive)
            && *options.guaranteed_gc_interval_ms > 0
            && ctx.elapsed_since_last_cycle_ms >= *options.guaranteed_gc_interval_ms
        {
            return true;
        }
        match self.kind {
            HeuristicsKind::Static => static_trigger(ctx, options),
            HeuristicsKind::Compact => {
                static_trigger(ctx, options) || compact_allocation_trigger(ctx, options)
            }
            HeuristicsKind::Adaptive => self.adaptive_trigger(ctx),
            HeuristicsKind::Passive => false,
        }
    }

    fn adaptive_trigger(&self, ctx: &TriggerContext) -> bool {
        if ctx.allocation_rate_words_per_ms <= 0.0 {
            return false;
        }
        let avg_cycle_time_ms = self.average_cycle_time_ms().unwrap_or(0) as f64;
        let time_to_exhaustion_ms = ctx.available_words as f64 / ctx.allocation_rate_words_per_ms;
        time_to_exhaustion_ms <= avg_cycle_time_ms
    }

    /// Applies the shared candidate-selection framework (§4.6 steps 3-4) then dispatches to
    /// the variant-specific selector on the sorted candidates.
    pub fn choose_cset(
        &self,
        selection: &CsetSelection,
        ctx: &CsetContext,
        options: &Options,
    ) -> Vec<usize> {
        if selection.immediate_fraction() > *options.immediate_threshold_percent / 100.0 {
            log::debug!(
                "immediate garbage fraction {:.2} exceeds threshold; skipping cset selection",
                selection.immediate_fraction()
            );
            return Vec::new();
        }
        match self.kind {
            HeuristicsKind::Static => select_static(&selection.candidates, ctx, options),
            HeuristicsKind::Compact => select_compact(selection, ctx, options),
            HeuristicsKind::Adaptive => select_adaptive(&selection.candidates, ctx, options),
            HeuristicsKind::Passive => select_passive(&selection.candidates, ctx, options),
        }
    }
}

fn garbage_floor_words(ctx: &CsetContext, options: &Options) -> f64 {
    ctx.region_size_words as f64 * *options.garbage_threshold_percent / 100.0
}

/// Post-GC "good progress" check (§7): `available >= capacity * critical_free_threshold%`.
pub fn made_good_progress(available_words: usize, capacity_words: usize, options: &Options) -> bool {
    available_words as f64 >= capacity_words as f64 * *options.critical_free_threshold_percent / 100.0
}

/// Static: trigger when `available < capacity * min_free_threshold%`.
fn static_trigger(ctx: &TriggerContext, options: &Options) -> bool {
    (ctx.available_words as f64) < (ctx.capacity_words as f64) * *options.min_free_threshold_percent / 100.0
}

/// Compact's extra trigger: `bytes_allocated > capacity * allocation_threshold%`.
fn compact_allocation_trigger(ctx: &TriggerContext, options: &Options) -> bool {
    (ctx.bytes_allocated_since_gc_start as f64)
        > (ctx.capacity_words as f64) * *options.allocation_threshold_percent / 100.0
}

/// Static's cset: every candidate above the per-region garbage minimum, full stop.
fn select_static(candidates: &[CsetCandidate], ctx: &CsetContext, options: &Options) -> Vec<usize> {
    let floor = garbage_floor_words(ctx, options);
    candidates
        .iter()
        .filter(|c| c.garbage_words as f64 > floor)
        .map(|c| c.index)
        .collect()
}

/// Compact: Static's filter, capped at 3/4 of `actual_free` (words).
fn select_compact(selection: &CsetSelection, ctx: &CsetContext, options: &Options) -> Vec<usize> {
    let floor = garbage_floor_words(ctx, options);
    let budget = (selection.actual_free_words() as f64 * 0.75) as usize;
    let mut chosen = Vec::new();
    let mut used = 0usize;
    for c in &selection.candidates {
        if (c.garbage_words as f64) <= floor {
            continue;
        }
        if used + c.garbage_words > budget {
            break;
        }
        used += c.garbage_words;
        chosen.push(c.index);
    }
    chosen
}

/// Adaptive: greedy by descending garbage (candidates arrive pre-sorted) until the
/// evacuation reserve's live-word budget is hit — the cost of a cset region is the live data
/// that must be copied out of it, not its garbage.
fn select_adaptive(candidates: &[CsetCandidate], ctx: &CsetContext, options: &Options) -> Vec<usize> {
    let floor = garbage_floor_words(ctx, options);
    let mut chosen = Vec::new();
    let mut live_budget_used = 0usize;
    for c in candidates {
        if (c.garbage_words as f64) <= floor {
            continue;
        }
        if live_budget_used + c.live_words > ctx.evac_reserve_words {
            continue;
        }
        live_budget_used += c.live_words;
        chosen.push(c.index);
    }
    chosen
}

/// Passive never triggers concurrently; when a cycle does run (allocation failure) its cset
/// must free at least the evacuation reserve, scaled by the evac-waste multiplier.
fn select_passive(candidates: &[CsetCandidate], ctx: &CsetContext, options: &Options) -> Vec<usize> {
    let floor = garbage_floor_words(ctx, options);
    let target = ctx.evac_reserve_words as f64 * *options.evac_waste;
    let mut chosen = Vec::new();
    let mut garbage_freed = 0.0;
    for c in candidates {
        if garbage_freed >= target {
            break;
        }
        if (c.garbage_words as f64) <= floor {
            continue;
        }
        garbage_freed += c.garbage_words as f64;
        chosen.push(c.index);
    }
    chosen
}
