use std::fmt;
use std::sync::Arc;

use num_traits::ToPrimitive;
use parking_lot::{Mutex, MutexGuard};

use crate::arrays::ArrayData;
use crate::objects::{ClassData, ObjectData};
use crate::strings::StrData;

mod display;
mod error;

pub use error::VmError;

/// A tagged value slot. This is the uniform currency of the member core:
/// base slots, keys, scratch cells, array elements and object properties
/// all hold `Cell`s.
///
/// `Uninit` and `Null` are treated identically by member operations.
/// `Ref` is a one-level shared indirection that entry points resolve on
/// entry. `Class` is never a legal base; meeting one aborts.
#[derive(Clone)]
pub enum Cell {
    Uninit,
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    /// An interned string pinned by the process-global cache.
    StaticStr(StrData),
    Str(StrData),
    Array(Arc<ArrayData>),
    Object(Arc<ObjectData>),
    Resource(Arc<ResourceData>),
    Ref(RefData),
    Class(Arc<ClassData>),
}

/// An opaque external resource handle. The member core only ever coerces
/// it (to its id) or rejects it.
#[derive(Debug)]
pub struct ResourceData {
    pub id: i64,
}

/// A one-level shared mutable slot: the target of by-reference bindings.
#[derive(Clone)]
pub struct RefData {
    inner: Arc<Mutex<Cell>>,
}

impl RefData {
    pub fn new(cell: Cell) -> RefData {
        RefData {
            inner: Arc::new(Mutex::new(cell)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Cell> {
        self.inner.lock()
    }

    /// Clone the referent out.
    pub fn snapshot(&self) -> Cell {
        self.inner.lock().clone()
    }

    /// Overwrite the referent.
    pub fn rebind(&self, cell: Cell) {
        *self.inner.lock() = cell;
    }

    pub fn ptr_eq(&self, other: &RefData) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

static NULL_SENTINEL: Cell = Cell::Null;

/// The immutable null cell returned by read misses.
pub fn null_sentinel() -> &'static Cell {
    &NULL_SENTINEL
}

/// A number in the language's two-rail numeric model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i64),
    Dbl(f64),
}

impl Num {
    pub fn to_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Dbl(d) => d,
        }
    }

    pub fn into_cell(self) -> Cell {
        match self {
            Num::Int(i) => Cell::Int(i),
            Num::Dbl(d) => Cell::Double(d),
        }
    }
}

impl Cell {
    pub fn string(s: &str) -> Cell {
        Cell::Str(StrData::from_str(s))
    }

    pub fn empty_array() -> Cell {
        Cell::Array(Arc::new(ArrayData::new()))
    }

    pub fn array(data: ArrayData) -> Cell {
        Cell::Array(Arc::new(data))
    }

    /// Both `Uninit` and `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Uninit | Cell::Null)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Cell::Str(_) | Cell::StaticStr(_))
    }

    pub fn as_str_data(&self) -> Option<&StrData> {
        match self {
            Cell::Str(s) | Cell::StaticStr(s) => Some(s),
            _ => None,
        }
    }

    /// Language truthiness: null-ish, false, 0, 0.0, "", "0" and the empty
    /// array are falsy; everything else is truthy.
    pub fn to_bool(&self) -> bool {
        match self {
            Cell::Uninit | Cell::Null => false,
            Cell::Bool(b) => *b,
            Cell::Int(i) => *i != 0,
            Cell::Double(d) => *d != 0.0,
            Cell::Str(s) | Cell::StaticStr(s) => {
                let bytes = s.data();
                !(bytes.is_empty() || bytes == b"0")
            }
            Cell::Array(a) => !a.is_empty(),
            Cell::Object(_) => true,
            Cell::Resource(_) => true,
            Cell::Ref(r) => r.snapshot().to_bool(),
            Cell::Class(_) => true,
        }
    }

    pub fn to_i64(&self) -> i64 {
        match self {
            Cell::Uninit | Cell::Null => 0,
            Cell::Bool(b) => *b as i64,
            Cell::Int(i) => *i,
            Cell::Double(d) => d.to_i64().unwrap_or(0),
            Cell::Str(s) | Cell::StaticStr(s) => s.to_int64(),
            Cell::Array(a) => {
                if a.is_empty() {
                    0
                } else {
                    1
                }
            }
            Cell::Object(_) => 1,
            Cell::Resource(r) => r.id,
            Cell::Ref(r) => r.snapshot().to_i64(),
            Cell::Class(_) => 0,
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Cell::Double(d) => *d,
            Cell::Str(s) | Cell::StaticStr(s) => s.to_number().to_f64(),
            other => other.to_i64() as f64,
        }
    }

    /// Numeric coercion for arithmetic: strings parse their numeric
    /// prefix, doubles stay doubles, everything else goes through the
    /// integer rail.
    pub fn to_number(&self) -> Num {
        match self {
            Cell::Double(d) => Num::Dbl(*d),
            Cell::Str(s) | Cell::StaticStr(s) => s.to_number(),
            other => Num::Int(other.to_i64()),
        }
    }

    /// Resolve a one-level `Ref` indirection by cloning the referent out;
    /// non-refs clone as-is.
    pub fn unboxed(&self) -> Cell {
        match self {
            Cell::Ref(r) => r.snapshot(),
            other => other.clone(),
        }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::Uninit
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Uninit, Cell::Uninit) => true,
            (Cell::Null, Cell::Null) => true,
            (Cell::Bool(a), Cell::Bool(b)) => a == b,
            (Cell::Int(a), Cell::Int(b)) => a == b,
            (Cell::Double(a), Cell::Double(b)) => a == b,
            (Cell::Str(a) | Cell::StaticStr(a), Cell::Str(b) | Cell::StaticStr(b)) => a == b,
            (Cell::Array(a), Cell::Array(b)) => a == b,
            (Cell::Object(a), Cell::Object(b)) => Arc::ptr_eq(a, b),
            (Cell::Resource(a), Cell::Resource(b)) => Arc::ptr_eq(a, b),
            (Cell::Ref(a), Cell::Ref(b)) => a.ptr_eq(b),
            (Cell::Class(a), Cell::Class(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Uninit => f.write_str("Uninit"),
            Cell::Null => f.write_str("Null"),
            Cell::Bool(b) => write!(f, "Bool({})", b),
            Cell::Int(i) => write!(f, "Int({})", i),
            Cell::Double(d) => write!(f, "Double({})", d),
            Cell::StaticStr(s) => write!(f, "StaticStr({:?})", s),
            Cell::Str(s) => write!(f, "Str({:?})", s),
            Cell::Array(a) => write!(f, "Array({:?})", a),
            Cell::Object(o) => write!(f, "Object({}#{})", o.class().name(), o.id()),
            Cell::Resource(r) => write!(f, "Resource(#{})", r.id),
            Cell::Ref(_) => f.write_str("Ref(..)"),
            Cell::Class(c) => write!(f, "Class({})", c.name()),
        }
    }
}

/// A base slot held a tag that can never legally reach the slow dispatch:
/// `Class`, or a `Ref` nested inside a `Ref`. This is a VM bug, not a
/// user error.
pub fn unknown_base_type(base: &Cell) -> ! {
    panic!("unknown base type: {:?}", base);
}

// Compile-time assertion that Cell is Send + Sync
const _: fn() = || {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Cell>();
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_uninit_are_both_empty_ish() {
        assert!(Cell::Uninit.is_null());
        assert!(Cell::Null.is_null());
        assert!(!Cell::Bool(false).is_null());
    }

    #[test]
    fn zero_string_is_falsy() {
        assert!(!Cell::string("0").to_bool());
        assert!(!Cell::string("").to_bool());
        assert!(Cell::string("00").to_bool());
        assert!(Cell::string("x").to_bool());
    }

    #[test]
    fn numeric_coercions() {
        assert_eq!(Cell::string(" 12abc").to_i64(), 12);
        assert_eq!(Cell::Bool(true).to_i64(), 1);
        assert_eq!(Cell::Double(3.9).to_i64(), 3);
        assert_eq!(Cell::string("1.5").to_number(), Num::Dbl(1.5));
        assert_eq!(Cell::string("7").to_number(), Num::Int(7));
    }

    #[test]
    fn ref_unboxes_to_its_referent() {
        let r = Cell::Ref(RefData::new(Cell::Int(9)));
        assert_eq!(r.unboxed(), Cell::Int(9));
        assert_eq!(r.to_i64(), 9);
    }
}
