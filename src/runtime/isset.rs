use std::sync::Arc;

use crate::arrays::ArrayData;
use crate::cell::{Cell, VmError, unknown_base_type};
use crate::collections;
use crate::objects::{self, ObjectData};
use crate::runtime::key::{self, Key};
use crate::runtime::{Vm, diag};
use crate::strings::StrData;
use crate::trace::trace_log;

use super::elem::{array_ref_shuffle, ref_object};

/// `isset($base[$key])` / `empty($base[$key])`.
///
/// On non-containers the key is absent: isset is false and empty is
/// true, so the answer is just `use_empty`.
pub fn isset_empty_elem(
    vm: &mut Vm,
    use_empty: bool,
    base: &mut Cell,
    key: &Key,
) -> Result<bool, VmError> {
    if let Cell::Array(a) = &*base {
        return Ok(isset_empty_elem_array(vm, use_empty, a, key));
    }
    if let Cell::Ref(r) = &*base {
        let r = r.clone();
        if let Some(obj) = ref_object(&r) {
            return isset_empty_elem_object(vm, use_empty, &obj, key);
        }
        let mut inner = r.lock();
        return isset_empty_elem_cell(vm, use_empty, &mut inner, key);
    }
    isset_empty_elem_cell(vm, use_empty, base, key)
}

fn isset_empty_elem_cell(
    vm: &mut Vm,
    use_empty: bool,
    base: &mut Cell,
    key: &Key,
) -> Result<bool, VmError> {
    match &*base {
        Cell::Uninit
        | Cell::Null
        | Cell::Bool(_)
        | Cell::Int(_)
        | Cell::Double(_)
        | Cell::Resource(_) => Ok(use_empty),
        Cell::Str(s) | Cell::StaticStr(s) => Ok(isset_empty_elem_string(use_empty, s, key)),
        Cell::Array(a) => Ok(isset_empty_elem_array(vm, use_empty, a, key)),
        Cell::Object(o) => isset_empty_elem_object(vm, use_empty, &o.clone(), key),
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(base),
    }
}

fn isset_empty_elem_array(vm: &mut Vm, use_empty: bool, arr: &ArrayData, key: &Key) -> bool {
    let hit = key::to_array_key(vm, key).and_then(|k| arr.get(&k).cloned());
    match hit {
        Some(cell) if !matches!(cell, Cell::Uninit) => {
            if use_empty {
                !cell.to_bool()
            } else {
                !cell.is_null()
            }
        }
        _ => use_empty,
    }
}

/// The string-index presence check tolerates leading whitespace before
/// the strictly-integer test; container-ish keys simply report absence.
fn isset_empty_elem_string(use_empty: bool, s: &StrData, key: &Key) -> bool {
    let x = match key {
        Key::Int(i) => *i,
        Key::Any(Cell::Int(i)) => *i,
        other => {
            let cell = other.to_cell();
            let bad = match &cell {
                Cell::Str(k) | Cell::StaticStr(k) => {
                    let trimmed: Vec<u8> = {
                        let bytes = k.data();
                        let start = bytes
                            .iter()
                            .position(|&b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
                            .unwrap_or(bytes.len());
                        bytes[start..].to_vec()
                    };
                    StrData::from_bytes(trimmed).strictly_integer().is_none()
                }
                Cell::Array(_) | Cell::Object(_) | Cell::Resource(_) => true,
                _ => false,
            };
            if bad {
                return use_empty;
            }
            cell.to_i64()
        }
    };
    if x < 0 || x >= s.size() as i64 {
        return use_empty;
    }
    if !use_empty {
        return true;
    }
    !Cell::StaticStr(s.get_char(x as usize)).to_bool()
}

fn isset_empty_elem_object(
    vm: &mut Vm,
    use_empty: bool,
    obj: &Arc<ObjectData>,
    key: &Key,
) -> Result<bool, VmError> {
    if obj.is_collection() {
        if use_empty {
            collections::empty(vm, obj, key)
        } else {
            collections::isset(vm, obj, key)
        }
    } else {
        let offset = key.to_cell();
        if use_empty {
            objects::obj_offset_empty(vm, obj, &offset)
        } else {
            objects::obj_offset_isset(vm, obj, &offset)
        }
    }
}

/// `unset($base[$key])`.
pub fn unset_elem(vm: &mut Vm, base: &mut Cell, key: &Key) -> Result<(), VmError> {
    if matches!(&*base, Cell::Array(_)) {
        return unset_elem_array(vm, base, key);
    }
    if let Cell::Ref(r) = &*base {
        let r = r.clone();
        if let Some(obj) = ref_object(&r) {
            return unset_elem_object(vm, &obj, key);
        }
        let mut inner = r.lock();
        return unset_elem_cell(vm, &mut inner, key);
    }
    unset_elem_cell(vm, base, key)
}

fn unset_elem_cell(vm: &mut Vm, base: &mut Cell, key: &Key) -> Result<(), VmError> {
    match &*base {
        Cell::Uninit
        | Cell::Null
        | Cell::Bool(_)
        | Cell::Int(_)
        | Cell::Double(_)
        | Cell::Resource(_) => Ok(()),
        Cell::Str(_) | Cell::StaticStr(_) => Err(vm.raise_error(diag::CANT_UNSET_STRING)),
        Cell::Array(_) => unset_elem_array(vm, base, key),
        Cell::Object(o) => unset_elem_object(vm, &o.clone(), key),
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(base),
    }
}

fn unset_elem_array(vm: &mut Vm, base: &mut Cell, key: &Key) -> Result<(), VmError> {
    // Illegal key kinds have warned already and unset nothing.
    let Some(k) = key::to_array_key(vm, key) else {
        return Ok(());
    };
    let Cell::Array(a) = &*base else {
        unreachable!()
    };
    if Arc::strong_count(a) > 1 {
        if !a.exists(&k) {
            return Ok(());
        }
        trace_log!("cow", "copying shared array for unset");
        let old = Arc::as_ptr(a);
        let mut copy = ArrayData::clone(a);
        copy.delete(&k);
        array_ref_shuffle(base, old, Arc::new(copy));
    } else {
        let Cell::Array(a) = base else { unreachable!() };
        Arc::make_mut(a).delete(&k);
    }
    Ok(())
}

fn unset_elem_object(vm: &mut Vm, obj: &Arc<ObjectData>, key: &Key) -> Result<(), VmError> {
    if obj.is_collection() {
        collections::unset(vm, obj, key)
    } else {
        objects::obj_offset_unset(vm, obj, &key.to_cell())
    }
}
