use std::fmt;
use std::ops::{Deref, DerefMut};

use parking_lot::MappedMutexGuard;

use crate::cell::Cell;

/// A writable slot returned by the define-mode operations.
///
/// Either a plain borrow into a container the base slot uniquely owns
/// (copy-on-write has already run), or a lock guard when the slot lives
/// behind a ref indirection, a property table or a collection.
///
/// Contract: assign through the lval, then drop it before invoking any
/// other member operation on the same base. Guarded lvals hold a lock, so
/// violating this can deadlock rather than corrupt.
pub enum Lval<'a> {
    Slot(&'a mut Cell),
    Guard(MappedMutexGuard<'a, Cell>),
}

impl fmt::Debug for Lval<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl Deref for Lval<'_> {
    type Target = Cell;

    fn deref(&self) -> &Cell {
        match self {
            Lval::Slot(c) => c,
            Lval::Guard(g) => g,
        }
    }
}

impl DerefMut for Lval<'_> {
    fn deref_mut(&mut self) -> &mut Cell {
        match self {
            Lval::Slot(c) => c,
            Lval::Guard(g) => g,
        }
    }
}

impl Lval<'_> {
    /// Replace the slot's value.
    pub fn assign(&mut self, value: Cell) {
        **self = value;
    }
}
