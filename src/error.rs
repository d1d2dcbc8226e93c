//! Error kinds split into transient and fatal: transient kinds are ordinary values the
//! caller reacts to (never a panic), fatal kinds abort the process with a diagnostic dump.
//! `Option`-returning allocators for expected failure, `panic!`/`debug_assert!` for
//! violated invariants, rather than routing "can't happen" states through `Result`.

use std::fmt;

use crate::heap::region::RegionState;
use crate::util::address::ObjectReference;

/// Transient conditions the trigger policy or caller reacts to. Never a bug by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcError {
    /// Allocation could not be satisfied even after a full GC. Surfaces to the embedding
    /// runtime as an out-of-memory signal.
    AllocFailure { mutator: bool },
    /// A collector allocation failed mid-evacuation. Handled by the OOM-during-evacuation
    /// protocol in [`crate::barriers`]; surfaces as cancellation plus a degenerated-GC
    /// trigger.
    EvacFailure,
    /// Cooperative cancellation observed. Not an error: a signal to unwind to the nearest
    /// rendezvous.
    Cancelled,
}

impl fmt::Display for GcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcError::AllocFailure { mutator } => {
                write!(f, "allocation failure (mutator={mutator})")
            }
            GcError::EvacFailure => write!(f, "evacuation allocation failure"),
            GcError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for GcError {}

/// Diagnostic dump assembled for a fatal kind before aborting. Fatal kinds (an invalid
/// region transition, a forwarding chain) indicate a collector bug, not a recoverable
/// runtime condition, so there is no `Result` to return — only a panic with enough
/// context to debug the crash.
pub mod fatal {
    use super::*;

    /// A region state transition not permitted by the state machine. Fatal.
    #[track_caller]
    pub fn invalid_transition(region_index: usize, from: RegionState, to: RegionState) -> ! {
        panic!(
            "invalid region state transition: region {region_index} {from:?} -> {to:?} is not \
             permitted by the Region state machine"
        );
    }

    /// Observing forwardee-of-forwardee during concurrent evacuation. Fatal.
    #[track_caller]
    pub fn forwarding_chain(
        object: ObjectReference,
        first_hop: ObjectReference,
        second_hop: ObjectReference,
    ) -> ! {
        panic!(
            "forwarding chain detected during concurrent evacuation: {object:?} -> {first_hop:?} \
             -> {second_hop:?}; get(get(obj)) must equal get(obj) outside full-GC relocation"
        );
    }
}
