//! `Address` and `ObjectReference`: zero-cost newtypes for arithmetic over the simulated
//! heap. A transparent wrapper that keeps address arithmetic in one place instead of
//! passing bare `usize` around the crate.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// An address into the simulated heap. Not a real pointer — there is no backing memory,
/// only the bookkeeping a collector core needs (regions, bitmaps, forwarding table) indexed
/// by address.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Address(usize);

impl Address {
    pub const ZERO: Address = Address(0);

    #[inline(always)]
    pub const fn from_usize(v: usize) -> Self {
        Address(v)
    }

    #[inline(always)]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    #[inline(always)]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub const fn align_down(self, align: usize) -> Address {
        Address(self.0 & !(align - 1))
    }

    #[inline(always)]
    pub const fn align_up(self, align: usize) -> Address {
        Address((self.0 + align - 1) & !(align - 1))
    }

    #[inline(always)]
    pub const fn is_aligned_to(self, align: usize) -> bool {
        self.0 & (align - 1) == 0
    }

    /// Index of the word containing this address, counting from address zero. Addresses
    /// throughout this crate are already word-granular (every allocator path uses a
    /// `word_size` of one word, not one byte — see [`crate::heap::region::Region::allocate`]),
    /// so this is the identity; it exists so side-table code (forwarding, marking) reads as
    /// "index by word" rather than by a raw, unitless integer.
    #[inline(always)]
    pub const fn word_index(self) -> usize {
        self.0
    }
}

impl Add<usize> for Address {
    type Output = Address;
    #[inline(always)]
    fn add(self, rhs: usize) -> Address {
        Address(self.0 + rhs)
    }
}

impl AddAssign<usize> for Address {
    #[inline(always)]
    fn add_assign(&mut self, rhs: usize) {
        self.0 += rhs;
    }
}

impl Sub<usize> for Address {
    type Output = Address;
    #[inline(always)]
    fn sub(self, rhs: usize) -> Address {
        Address(self.0 - rhs)
    }
}

impl SubAssign<usize> for Address {
    #[inline(always)]
    fn sub_assign(&mut self, rhs: usize) {
        self.0 -= rhs;
    }
}

/// Address - Address = byte distance between them.
impl Sub<Address> for Address {
    type Output = usize;
    #[inline(always)]
    fn sub(self, rhs: Address) -> usize {
        self.0 - rhs.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A reference to an object header. Distinct from [`Address`] so that barrier code cannot
/// accidentally treat an arbitrary address as an object, and so forwarding/marking APIs read
/// naturally ("mark this object", not "mark this address").
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ObjectReference(Address);

impl ObjectReference {
    pub const NULL: ObjectReference = ObjectReference(Address::ZERO);

    #[inline(always)]
    pub const fn from_address(addr: Address) -> Self {
        ObjectReference(addr)
    }

    #[inline(always)]
    pub const fn to_address(self) -> Address {
        self.0
    }

    #[inline(always)]
    pub const fn is_null(self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Debug for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectReference({:?})", self.0)
    }
}
