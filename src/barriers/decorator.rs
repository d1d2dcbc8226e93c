//! Reference decorators and the per-load context flags the load-reference barrier and the
//! keep-alive hook need. Grounded on `vm::edge_shape`/the decorator constants mmtk's
//! `util::options` plumbing threads through its `*_EDGE` slot kinds, collapsed here to the
//! three kinds the spec actually distinguishes.

/// Strength of the reference a load is resolving. Phantom and weak decorators can observe
/// `null` out of a load that a strong decorator never would (see
/// [`super::engine::BarrierEngine::load_reference`]'s concurrent-weak-roots step).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceDecorator {
    Strong,
    Weak,
    Phantom,
}

impl ReferenceDecorator {
    #[inline]
    pub fn is_weak(self) -> bool {
        matches!(self, ReferenceDecorator::Weak)
    }

    #[inline]
    pub fn is_phantom(self) -> bool {
        matches!(self, ReferenceDecorator::Phantom)
    }
}

/// Per-call context a load site supplies to the load-reference barrier: which decorator is
/// loading, and whether this is a `no-keep-alive` peek (a read that must not itself extend
/// the object's lifetime, e.g. a reference-queue poll inspecting a dead referent).
#[derive(Debug, Clone, Copy)]
pub struct LoadContext {
    pub decorator: ReferenceDecorator,
    pub no_keep_alive: bool,
}

impl LoadContext {
    pub const fn strong() -> Self {
        LoadContext {
            decorator: ReferenceDecorator::Strong,
            no_keep_alive: false,
        }
    }

    pub const fn weak() -> Self {
        LoadContext {
            decorator: ReferenceDecorator::Weak,
            no_keep_alive: false,
        }
    }

    pub const fn phantom() -> Self {
        LoadContext {
            decorator: ReferenceDecorator::Phantom,
            no_keep_alive: false,
        }
    }

    pub const fn no_keep_alive(mut self) -> Self {
        self.no_keep_alive = true;
        self
    }
}
