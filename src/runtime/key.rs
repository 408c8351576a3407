use crate::arrays::ArrayKey;
use crate::cell::Cell;
use crate::runtime::{Vm, diag};
use crate::strings::{StrData, static_empty_string};
use crate::symbol::Symbol;

/// A member key as it arrives from the caller: the interpreter's generic
/// shape plus the two specializations hot call sites use.
#[derive(Debug, Clone)]
pub enum Key {
    Int(i64),
    Str(StrData),
    Any(Cell),
}

impl Key {
    pub fn int(i: i64) -> Key {
        Key::Int(i)
    }

    pub fn str(s: &str) -> Key {
        Key::Str(StrData::from_str(s))
    }

    pub fn any(cell: Cell) -> Key {
        Key::Any(cell)
    }

    /// Materialize the key as a cell (for diagnostics and the subscript
    /// protocol, which takes a generic offset).
    pub fn to_cell(&self) -> Cell {
        match self {
            Key::Int(i) => Cell::Int(*i),
            Key::Str(s) => Cell::Str(s.clone()),
            Key::Any(c) => c.clone(),
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{}", i),
            Key::Str(s) => write!(f, "{}", s),
            Key::Any(c) => write!(f, "{}", c.to_string_value()),
        }
    }
}

/// Fold a string key to its canonical array key: strictly-integer strings
/// become the integer, everything else stays a string key.
pub fn canonical_str_key(s: &StrData) -> ArrayKey {
    match s.strictly_integer() {
        Some(n) => ArrayKey::Int(n),
        None => ArrayKey::Str(s.clone()),
    }
}

/// Canonicalize a key for array indexing. `None` means the key kind is
/// illegal (array/object/class); the "Illegal offset type" warning has
/// already been raised and the caller picks the verb's fallback.
///
/// A raw integer key is used as-is; null keys index the empty-string key;
/// bool/double/resource coerce to the integer rail.
pub fn to_array_key(vm: &mut Vm, key: &Key) -> Option<ArrayKey> {
    match key {
        Key::Int(i) => Some(ArrayKey::Int(*i)),
        Key::Str(s) => Some(canonical_str_key(s)),
        Key::Any(cell) => match cell {
            Cell::Uninit | Cell::Null => Some(ArrayKey::Str(static_empty_string())),
            Cell::Bool(b) => Some(ArrayKey::Int(*b as i64)),
            Cell::Int(i) => Some(ArrayKey::Int(*i)),
            Cell::Double(_) | Cell::Resource(_) => Some(ArrayKey::Int(cell.to_i64())),
            Cell::Str(s) | Cell::StaticStr(s) => Some(canonical_str_key(s)),
            Cell::Ref(r) => {
                // Keys are evaluated before the member op and never stay
                // boxed; tolerate a stray ref by reading through it.
                debug_assert!(false, "boxed member key");
                let inner = r.snapshot();
                to_array_key(vm, &Key::Any(inner))
            }
            Cell::Array(_) | Cell::Object(_) | Cell::Class(_) => {
                vm.raise_warning(diag::ILLEGAL_OFFSET_TYPE);
                None
            }
        },
    }
}

/// Coerce a key to a string offset for reads: integers pass through,
/// strings take the base-10 cast, anything else raises the offset-cast
/// notice and goes through the integer coercion.
pub fn to_string_offset(vm: &mut Vm, key: &Key) -> i64 {
    match key {
        Key::Int(i) => *i,
        Key::Str(s) => s.to_int64(),
        Key::Any(Cell::Int(i)) => *i,
        Key::Any(Cell::Str(s) | Cell::StaticStr(s)) => s.to_int64(),
        Key::Any(cell) => {
            vm.raise_notice(diag::STRING_OFFSET_CAST);
            cell.to_i64()
        }
    }
}

/// Integer cast for the string-write path: no notice, plain coercion.
pub fn cast_key_to_int(key: &Key) -> i64 {
    match key {
        Key::Int(i) => *i,
        Key::Str(s) => s.to_int64(),
        Key::Any(cell) => cell.to_i64(),
    }
}

/// Stringify a key into a property name.
pub fn prop_name(key: &Key) -> Symbol {
    match key {
        Key::Str(s) => Symbol::intern(&s.to_string_lossy()),
        Key::Int(i) => Symbol::intern(&i.to_string()),
        Key::Any(cell) => Symbol::intern(&cell.to_string_value()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_integer_strings_fold_to_int_keys() {
        let mut vm = Vm::new();
        assert_eq!(
            to_array_key(&mut vm, &Key::str("10")),
            Some(ArrayKey::Int(10))
        );
        assert_eq!(
            to_array_key(&mut vm, &Key::str("010")),
            Some(ArrayKey::str("010"))
        );
        assert_eq!(
            to_array_key(&mut vm, &Key::str(" 10")),
            Some(ArrayKey::str(" 10"))
        );
        assert_eq!(
            to_array_key(&mut vm, &Key::str("10a")),
            Some(ArrayKey::str("10a"))
        );
    }

    #[test]
    fn null_keys_index_the_empty_string() {
        let mut vm = Vm::new();
        assert_eq!(
            to_array_key(&mut vm, &Key::Any(Cell::Null)),
            Some(ArrayKey::str(""))
        );
    }

    #[test]
    fn container_keys_are_illegal() {
        let mut vm = Vm::new();
        assert_eq!(to_array_key(&mut vm, &Key::Any(Cell::empty_array())), None);
        let diags = vm.take_diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, diag::ILLEGAL_OFFSET_TYPE);
    }

    #[test]
    fn string_offset_cast_notice_fires_for_exotic_keys() {
        let mut vm = Vm::new();
        assert_eq!(to_string_offset(&mut vm, &Key::Any(Cell::Double(2.9))), 2);
        assert_eq!(vm.take_diagnostics()[0].message, diag::STRING_OFFSET_CAST);
        // Int and string keys cast silently.
        assert_eq!(to_string_offset(&mut vm, &Key::str("3")), 3);
        assert!(vm.take_diagnostics().is_empty());
    }
}
