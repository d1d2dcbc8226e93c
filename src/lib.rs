//! A region-based concurrent garbage collector core: free-set allocator, collection-set
//! selection, pluggable heuristics, and a load/store barrier state machine.
//!
//! Logically, this crate has four layers:
//! * [`util`]: address arithmetic and fundamental size constants.
//! * [`heap`]: the region-partitioned heap itself — [`heap::region`], [`heap::forwarding`],
//!   [`heap::marking`], [`heap::free_set`], [`heap::collection_set`], plus the
//!   [`heap::heap_lock`], [`heap::safepoint`] and [`heap::cancellation`] coordination
//!   primitives, and the global [`heap::gc_state`] word that gates every barrier.
//! * [`heuristics`]: the trigger policy (should a cycle start now?) and cset-selection
//!   policy (which regions go in it?), pluggable as Static / Compact / Adaptive / Passive.
//! * [`barriers`]: the load-reference barrier and the SATB/IU/clone/array-copy write
//!   barriers that mediate mutator-collector interaction during a cycle.
//!
//! [`options`] carries every runtime-tunable knob; [`error`] carries the transient/fatal
//! error split used throughout.

pub mod barriers;
pub mod error;
pub mod heap;
pub mod heuristics;
pub mod options;
pub mod util;
