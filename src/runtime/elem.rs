use std::sync::Arc;

use parking_lot::{MappedMutexGuard, MutexGuard};

use crate::arrays::{ArrayData, ArrayKey};
use crate::cell::{Cell, RefData, VmError, null_sentinel, unknown_base_type};
use crate::collections;
use crate::objects::{self, ObjectData, storage_symbol};
use crate::runtime::key::{self, Key};
use crate::runtime::lval::Lval;
use crate::runtime::{Vm, diag};
use crate::strings::{MAX_SIZE, StrData, static_empty_string};
use crate::trace::trace_log;

/// `$result = $base[$key]`: read an element.
///
/// The returned borrow may point into the base's container, at the shared
/// null sentinel, or at the caller's scratch cell; it is valid until the
/// next member op on the same base.
pub fn elem<'a>(
    vm: &mut Vm,
    warn: bool,
    base: &'a mut Cell,
    key: &Key,
    scratch: &'a mut Cell,
) -> Result<&'a Cell, VmError> {
    if matches!(&*base, Cell::Array(_)) {
        let Cell::Array(a) = &*base else {
            unreachable!()
        };
        return elem_array(vm, warn, a, key);
    }
    elem_slow(vm, warn, base, key, scratch)
}

fn elem_slow<'a>(
    vm: &mut Vm,
    warn: bool,
    base: &'a mut Cell,
    key: &Key,
    scratch: &'a mut Cell,
) -> Result<&'a Cell, VmError> {
    if let Cell::Ref(r) = &*base {
        let r = r.clone();
        // Object referents are read outside the ref lock so subscript
        // handlers can re-enter member ops.
        if let Some(obj) = ref_object(&r) {
            *scratch = elem_object_value(vm, warn, &obj, key)?;
            return Ok(scratch);
        }
        let value = {
            let mut inner = r.lock();
            let mut inner_scratch = Cell::Uninit;
            elem_cell(vm, warn, &mut inner, key, &mut inner_scratch)?.clone()
        };
        *scratch = value;
        return Ok(scratch);
    }
    elem_cell(vm, warn, base, key, scratch)
}

fn elem_cell<'a>(
    vm: &mut Vm,
    warn: bool,
    base: &'a mut Cell,
    key: &Key,
    scratch: &'a mut Cell,
) -> Result<&'a Cell, VmError> {
    match &*base {
        Cell::Uninit | Cell::Null => Ok(null_sentinel()),
        Cell::Bool(b) => {
            if *b {
                Ok(elem_scalar(vm))
            } else {
                Ok(null_sentinel())
            }
        }
        Cell::Int(_) | Cell::Double(_) | Cell::Resource(_) => Ok(elem_scalar(vm)),
        Cell::Str(s) | Cell::StaticStr(s) => elem_string(vm, warn, s, key, scratch),
        Cell::Array(a) => elem_array(vm, warn, a, key),
        Cell::Object(o) => {
            *scratch = elem_object_value(vm, warn, &o.clone(), key)?;
            Ok(scratch)
        }
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(base),
    }
}

fn elem_array<'a>(
    vm: &mut Vm,
    warn: bool,
    arr: &'a ArrayData,
    key: &Key,
) -> Result<&'a Cell, VmError> {
    let k = key::to_array_key(vm, key);
    let hit = k.as_ref().and_then(|k| arr.get(k));
    match hit {
        // A stored Uninit counts as absent.
        Some(cell) if !matches!(cell, Cell::Uninit) => Ok(cell),
        _ => {
            if warn && let Some(k) = k {
                vm.raise_notice(format!("{}: {}", diag::UNDEFINED_INDEX, k));
            }
            Ok(null_sentinel())
        }
    }
}

fn elem_scalar(vm: &mut Vm) -> &'static Cell {
    if vm.strict_syntax() {
        vm.raise_warning(diag::CANNOT_USE_SCALAR_AS_ARRAY);
    }
    null_sentinel()
}

fn elem_string<'a>(
    vm: &mut Vm,
    warn: bool,
    s: &StrData,
    key: &Key,
    scratch: &'a mut Cell,
) -> Result<&'a Cell, VmError> {
    let offset = key::to_string_offset(vm, key);
    if offset < 0 || offset >= s.size() as i64 {
        if warn && vm.strict_syntax() {
            vm.raise_warning(diag::OUT_OF_BOUNDS);
        }
        *scratch = Cell::StaticStr(static_empty_string());
    } else {
        *scratch = Cell::StaticStr(s.get_char(offset as usize));
    }
    Ok(scratch)
}

fn elem_object_value(
    vm: &mut Vm,
    warn: bool,
    obj: &Arc<ObjectData>,
    key: &Key,
) -> Result<Cell, VmError> {
    if obj.is_collection() {
        if warn {
            collections::at(vm, obj, key)
        } else {
            Ok(collections::get(vm, obj, key)?.unwrap_or(Cell::Null))
        }
    } else {
        objects::obj_offset_get(vm, obj, &key.to_cell())
    }
}

/// `$base[$key]` as a define-mode lvalue: absent keys are created, empty
/// bases vivify to arrays, and copy-on-write has run before the lval is
/// handed out.
pub fn elem_d<'a>(
    vm: &mut Vm,
    warn: bool,
    reffy: bool,
    base: &'a mut Cell,
    key: &Key,
    scratch: &'a mut Cell,
) -> Result<Lval<'a>, VmError> {
    if matches!(&*base, Cell::Array(_)) {
        return elem_d_array(vm, warn, base, key, scratch);
    }
    if matches!(&*base, Cell::Ref(_)) {
        return elem_d_ref(vm, warn, reffy, base, key, scratch);
    }
    elem_d_cell(vm, warn, reffy, base, key, scratch)
}

fn elem_d_cell<'a>(
    vm: &mut Vm,
    warn: bool,
    reffy: bool,
    base: &'a mut Cell,
    key: &Key,
    scratch: &'a mut Cell,
) -> Result<Lval<'a>, VmError> {
    match &*base {
        Cell::Uninit | Cell::Null => elem_d_emptyish(vm, warn, base, key, scratch),
        Cell::Bool(b) => {
            if *b {
                Ok(elem_d_scalar(vm, scratch))
            } else {
                elem_d_emptyish(vm, warn, base, key, scratch)
            }
        }
        Cell::Int(_) | Cell::Double(_) | Cell::Resource(_) => Ok(elem_d_scalar(vm, scratch)),
        Cell::Str(s) | Cell::StaticStr(s) => {
            if s.is_empty() {
                elem_d_emptyish(vm, warn, base, key, scratch)
            } else {
                Err(vm.raise_error(diag::OP_NOT_SUPPORTED_STRING))
            }
        }
        Cell::Array(_) => elem_d_array(vm, warn, base, key, scratch),
        Cell::Object(o) => elem_d_object(vm, reffy, o.clone(), key, scratch),
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(base),
    }
}

/// Auto-vivification: replace the empty-ish base with a fresh array and
/// retry as an array define.
pub(crate) fn elem_d_emptyish<'a>(
    vm: &mut Vm,
    warn: bool,
    base: &'a mut Cell,
    key: &Key,
    scratch: &'a mut Cell,
) -> Result<Lval<'a>, VmError> {
    trace_log!("promote", "vivifying empty base to array for key {}", key);
    *base = Cell::empty_array();
    elem_d_array(vm, warn, base, key, scratch)
}

fn elem_d_scalar<'a>(vm: &mut Vm, scratch: &'a mut Cell) -> Lval<'a> {
    vm.raise_warning(diag::CANNOT_USE_SCALAR_AS_ARRAY);
    *scratch = Cell::Uninit;
    Lval::Slot(scratch)
}

pub(crate) fn elem_d_array<'a>(
    vm: &mut Vm,
    warn: bool,
    base: &'a mut Cell,
    key: &Key,
    scratch: &'a mut Cell,
) -> Result<Lval<'a>, VmError> {
    let Some(k) = key::to_array_key(vm, key) else {
        // Illegal key: the assignment target is a black hole.
        *scratch = Cell::Uninit;
        return Ok(Lval::Slot(scratch));
    };
    let Cell::Array(a) = base else { unreachable!() };
    let defined = !warn || a.exists(&k);
    if Arc::strong_count(a) > 1 {
        trace_log!("cow", "copying shared array for define lval");
    }
    if !defined {
        vm.raise_notice(format!("{}: {}", diag::UNDEFINED_INDEX, k));
    }
    Ok(Lval::Slot(Arc::make_mut(a).lval(k)))
}

fn elem_d_object<'a>(
    vm: &mut Vm,
    reffy: bool,
    obj: Arc<ObjectData>,
    key: &Key,
    scratch: &'a mut Cell,
) -> Result<Lval<'a>, VmError> {
    if obj.is_collection() {
        if reffy {
            return Err(vm.raise_error(diag::COLLECTION_BYREF));
        }
        let obj = pin_object(scratch, obj);
        return Ok(Lval::Guard(collections::at_lval(vm, obj, key)?));
    }
    if obj.class().is_array_object() {
        // The array-object adapter routes define-mode reads into its
        // internal storage array, silently auto-creating entries.
        let Some(k) = key::to_array_key(vm, key) else {
            *scratch = Cell::Uninit;
            return Ok(Lval::Slot(scratch));
        };
        let obj = pin_object(scratch, obj);
        let guard = obj.prop_d(vm, None, storage_symbol(), false)?;
        return Ok(Lval::Guard(MappedMutexGuard::map(guard, move |cell| {
            if !matches!(cell, Cell::Array(_)) {
                *cell = Cell::empty_array();
            }
            let Cell::Array(a) = cell else { unreachable!() };
            Arc::make_mut(a).lval(k)
        })));
    }
    *scratch = objects::obj_offset_get(vm, &obj, &key.to_cell())?;
    Ok(Lval::Slot(scratch))
}

fn elem_d_ref<'a>(
    vm: &mut Vm,
    warn: bool,
    reffy: bool,
    base: &'a mut Cell,
    key: &Key,
    scratch: &'a mut Cell,
) -> Result<Lval<'a>, VmError> {
    let Cell::Ref(r) = &*base else { unreachable!() };
    if let Some(obj) = ref_object(r) {
        return elem_d_object(vm, reffy, obj, key, scratch);
    }
    let mut inner = r.lock();
    match &mut *inner {
        Cell::Uninit | Cell::Null => {
            trace_log!("promote", "vivifying empty ref target to array");
            *inner = Cell::empty_array();
        }
        Cell::Bool(b) => {
            if *b {
                drop(inner);
                return Ok(elem_d_scalar(vm, scratch));
            }
            *inner = Cell::empty_array();
        }
        Cell::Int(_) | Cell::Double(_) | Cell::Resource(_) => {
            drop(inner);
            return Ok(elem_d_scalar(vm, scratch));
        }
        Cell::Str(s) | Cell::StaticStr(s) => {
            if s.is_empty() {
                *inner = Cell::empty_array();
            } else {
                return Err(vm.raise_error(diag::OP_NOT_SUPPORTED_STRING));
            }
        }
        Cell::Array(_) => {}
        Cell::Object(_) => unreachable!("object referents handled above"),
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(&inner),
    }
    let Some(k) = key::to_array_key(vm, key) else {
        drop(inner);
        *scratch = Cell::Uninit;
        return Ok(Lval::Slot(scratch));
    };
    {
        let Cell::Array(a) = &mut *inner else {
            unreachable!()
        };
        let defined = !warn || a.exists(&k);
        if !defined {
            vm.raise_notice(format!("{}: {}", diag::UNDEFINED_INDEX, k));
        }
        // Run copy-on-write and entry creation now; the guard map below
        // must be infallible.
        Arc::make_mut(a).lval(k.clone());
    }
    Ok(Lval::Guard(MutexGuard::map(inner, move |cell| {
        let Cell::Array(a) = cell else { unreachable!() };
        Arc::make_mut(a).lval(k)
    })))
}

/// `$base[$key]` as an unset-mode lvalue: nothing is created and nothing
/// vivifies; absent targets come back as the scratch cell set to Uninit.
pub fn elem_u<'a>(
    vm: &mut Vm,
    base: &'a mut Cell,
    key: &Key,
    scratch: &'a mut Cell,
) -> Result<Lval<'a>, VmError> {
    if matches!(&*base, Cell::Ref(_)) {
        return elem_u_ref(vm, base, key, scratch);
    }
    match &*base {
        Cell::Uninit
        | Cell::Null
        | Cell::Bool(_)
        | Cell::Int(_)
        | Cell::Double(_)
        | Cell::Resource(_) => {
            *scratch = Cell::Uninit;
            Ok(Lval::Slot(scratch))
        }
        Cell::Str(_) | Cell::StaticStr(_) => Err(vm.raise_error(diag::OP_NOT_SUPPORTED_STRING)),
        Cell::Array(_) => elem_u_array(vm, base, key, scratch),
        Cell::Object(o) => elem_u_object(vm, o.clone(), key, scratch),
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(base),
    }
}

fn elem_u_array<'a>(
    vm: &mut Vm,
    base: &'a mut Cell,
    key: &Key,
    scratch: &'a mut Cell,
) -> Result<Lval<'a>, VmError> {
    let k = key::to_array_key(vm, key);
    let Cell::Array(a) = base else { unreachable!() };
    match k {
        Some(k) if a.exists(&k) => Ok(Lval::Slot(Arc::make_mut(a).lval(k))),
        _ => {
            *scratch = Cell::Uninit;
            Ok(Lval::Slot(scratch))
        }
    }
}

fn elem_u_object<'a>(
    vm: &mut Vm,
    obj: Arc<ObjectData>,
    key: &Key,
    scratch: &'a mut Cell,
) -> Result<Lval<'a>, VmError> {
    if obj.is_collection() {
        let obj = pin_object(scratch, obj);
        return Ok(Lval::Guard(collections::at_lval(vm, obj, key)?));
    }
    *scratch = objects::obj_offset_get(vm, &obj, &key.to_cell())?;
    Ok(Lval::Slot(scratch))
}

fn elem_u_ref<'a>(
    vm: &mut Vm,
    base: &'a mut Cell,
    key: &Key,
    scratch: &'a mut Cell,
) -> Result<Lval<'a>, VmError> {
    let Cell::Ref(r) = &*base else { unreachable!() };
    if let Some(obj) = ref_object(r) {
        return elem_u_object(vm, obj, key, scratch);
    }
    if matches!(&*r.lock(), Cell::Str(_) | Cell::StaticStr(_)) {
        return Err(vm.raise_error(diag::OP_NOT_SUPPORTED_STRING));
    }
    let k = key::to_array_key(vm, key);
    let mut inner = r.lock();
    if matches!(&*inner, Cell::Ref(_) | Cell::Class(_)) {
        unknown_base_type(&inner);
    }
    let hit = match (&k, &*inner) {
        (Some(k), Cell::Array(a)) => a.exists(k),
        _ => false,
    };
    if !hit {
        drop(inner);
        *scratch = Cell::Uninit;
        return Ok(Lval::Slot(scratch));
    }
    let Some(k) = k else { unreachable!() };
    {
        let Cell::Array(a) = &mut *inner else {
            unreachable!()
        };
        Arc::make_mut(a).lval(k.clone());
    }
    Ok(Lval::Guard(MutexGuard::map(inner, move |cell| {
        let Cell::Array(a) = cell else { unreachable!() };
        Arc::make_mut(a).lval(k)
    })))
}

/// `$base[]` as a define-mode lvalue: appends a null element and returns
/// its slot.
pub fn new_elem<'a>(
    vm: &mut Vm,
    reffy: bool,
    base: &'a mut Cell,
    scratch: &'a mut Cell,
) -> Result<Lval<'a>, VmError> {
    if matches!(&*base, Cell::Ref(_)) {
        return new_elem_ref(vm, reffy, base, scratch);
    }
    match &*base {
        Cell::Uninit | Cell::Null => {
            *base = Cell::empty_array();
            new_elem_array(base)
        }
        Cell::Bool(b) => {
            if *b {
                Ok(new_elem_invalid(vm, scratch))
            } else {
                *base = Cell::empty_array();
                new_elem_array(base)
            }
        }
        Cell::Int(_) | Cell::Double(_) | Cell::Resource(_) => Ok(new_elem_invalid(vm, scratch)),
        Cell::Str(s) | Cell::StaticStr(s) => {
            if s.is_empty() {
                *base = Cell::empty_array();
                new_elem_array(base)
            } else {
                Ok(new_elem_invalid(vm, scratch))
            }
        }
        Cell::Array(_) => new_elem_array(base),
        Cell::Object(o) => new_elem_object(vm, o.clone(), scratch),
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(base),
    }
}

fn new_elem_invalid<'a>(vm: &mut Vm, scratch: &'a mut Cell) -> Lval<'a> {
    vm.raise_warning(diag::CANNOT_USE_SCALAR_AS_ARRAY);
    *scratch = Cell::Uninit;
    Lval::Slot(scratch)
}

fn new_elem_array(base: &mut Cell) -> Result<Lval<'_>, VmError> {
    let Cell::Array(a) = base else { unreachable!() };
    Ok(Lval::Slot(Arc::make_mut(a).lval_append()))
}

fn new_elem_object<'a>(
    vm: &mut Vm,
    obj: Arc<ObjectData>,
    scratch: &'a mut Cell,
) -> Result<Lval<'a>, VmError> {
    if obj.is_collection() {
        return Err(vm.raise_error(diag::NEWELEM_LVAL_READ));
    }
    *scratch = objects::obj_offset_get(vm, &obj, &Cell::Null)?;
    Ok(Lval::Slot(scratch))
}

fn new_elem_ref<'a>(
    vm: &mut Vm,
    _reffy: bool,
    base: &'a mut Cell,
    scratch: &'a mut Cell,
) -> Result<Lval<'a>, VmError> {
    let Cell::Ref(r) = &*base else { unreachable!() };
    if let Some(obj) = ref_object(r) {
        return new_elem_object(vm, obj, scratch);
    }
    let mut inner = r.lock();
    match &mut *inner {
        Cell::Uninit | Cell::Null => *inner = Cell::empty_array(),
        Cell::Bool(b) => {
            if *b {
                drop(inner);
                return Ok(new_elem_invalid(vm, scratch));
            }
            *inner = Cell::empty_array();
        }
        Cell::Int(_) | Cell::Double(_) | Cell::Resource(_) => {
            drop(inner);
            return Ok(new_elem_invalid(vm, scratch));
        }
        Cell::Str(s) | Cell::StaticStr(s) => {
            if s.is_empty() {
                *inner = Cell::empty_array();
            } else {
                drop(inner);
                return Ok(new_elem_invalid(vm, scratch));
            }
        }
        Cell::Array(_) => {}
        Cell::Object(_) => unreachable!("object referents handled above"),
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(&inner),
    }
    let idx = {
        let Cell::Array(a) = &mut *inner else {
            unreachable!()
        };
        let arr = Arc::make_mut(a);
        arr.lval_append();
        arr.append_index() - 1
    };
    Ok(Lval::Guard(MutexGuard::map(inner, move |cell| {
        let Cell::Array(a) = cell else { unreachable!() };
        Arc::make_mut(a).lval(ArrayKey::Int(idx))
    })))
}

/// `$base[$key] = $value`.
///
/// Returns the one-character result string when the base was a non-empty
/// string (that string, not the RHS, is the expression value); `None`
/// otherwise. On failure paths the RHS cell is overwritten with null when
/// `set_result` is true, and the value-carrying error is raised when it is
/// false.
pub fn set_elem(
    vm: &mut Vm,
    set_result: bool,
    base: &mut Cell,
    key: &Key,
    value: &mut Cell,
) -> Result<Option<StrData>, VmError> {
    if matches!(&*base, Cell::Array(_)) {
        set_elem_array(vm, set_result, base, key, value)?;
        return Ok(None);
    }
    if let Cell::Ref(r) = &*base {
        let r = r.clone();
        if let Some(obj) = ref_object(&r) {
            set_elem_object(vm, &obj, key, value)?;
            return Ok(None);
        }
        let mut inner = r.lock();
        return set_elem_cell(vm, set_result, &mut inner, key, value);
    }
    set_elem_cell(vm, set_result, base, key, value)
}

fn set_elem_cell(
    vm: &mut Vm,
    set_result: bool,
    base: &mut Cell,
    key: &Key,
    value: &mut Cell,
) -> Result<Option<StrData>, VmError> {
    match &*base {
        Cell::Uninit | Cell::Null => {
            set_elem_emptyish(vm, set_result, base, key, value)?;
            Ok(None)
        }
        Cell::Bool(b) => {
            if *b {
                set_elem_scalar(vm, set_result, value)?;
            } else {
                set_elem_emptyish(vm, set_result, base, key, value)?;
            }
            Ok(None)
        }
        Cell::Int(_) | Cell::Double(_) | Cell::Resource(_) => {
            set_elem_scalar(vm, set_result, value)?;
            Ok(None)
        }
        Cell::Str(_) | Cell::StaticStr(_) => set_elem_string(vm, set_result, base, key, value),
        Cell::Array(_) => {
            set_elem_array(vm, set_result, base, key, value)?;
            Ok(None)
        }
        Cell::Object(o) => {
            set_elem_object(vm, &o.clone(), key, value)?;
            Ok(None)
        }
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(base),
    }
}

fn set_elem_emptyish(
    vm: &mut Vm,
    set_result: bool,
    base: &mut Cell,
    key: &Key,
    value: &mut Cell,
) -> Result<(), VmError> {
    trace_log!("promote", "vivifying empty base to array for set");
    *base = Cell::empty_array();
    set_elem_array(vm, set_result, base, key, value)
}

fn set_elem_scalar(vm: &mut Vm, set_result: bool, value: &mut Cell) -> Result<(), VmError> {
    vm.raise_warning(diag::CANNOT_USE_SCALAR_AS_ARRAY);
    if !set_result {
        return Err(VmError::invalid_set(Cell::Null));
    }
    *value = Cell::Null;
    Ok(())
}

fn set_elem_array(
    vm: &mut Vm,
    set_result: bool,
    base: &mut Cell,
    key: &Key,
    value: &mut Cell,
) -> Result<(), VmError> {
    let Some(k) = key::to_array_key(vm, key) else {
        // The assignment failed, so the expression value is null rather
        // than the RHS.
        if !set_result {
            return Err(VmError::invalid_set(Cell::Null));
        }
        *value = Cell::Null;
        return Ok(());
    };
    let Cell::Array(a) = &*base else {
        unreachable!()
    };
    if Arc::strong_count(a) > 1 {
        trace_log!("cow", "copying shared array for set");
        let old = Arc::as_ptr(a);
        let mut copy = ArrayData::clone(a);
        copy.put(k, value.clone());
        array_ref_shuffle(base, old, Arc::new(copy));
    } else {
        let Cell::Array(a) = base else { unreachable!() };
        Arc::make_mut(a).put(k, value.clone());
    }
    Ok(())
}

fn set_elem_string(
    vm: &mut Vm,
    set_result: bool,
    base: &mut Cell,
    key: &Key,
    value: &mut Cell,
) -> Result<Option<StrData>, VmError> {
    let base_len = {
        let Some(s) = base.as_str_data() else {
            unreachable!()
        };
        s.size() as i64
    };
    if base_len == 0 {
        // Legacy quirk, preserved: an empty string silently becomes an
        // array and the set retries there.
        set_elem_emptyish(vm, set_result, base, key, value)?;
        if !set_result {
            return Err(VmError::invalid_set(value.clone()));
        }
        return Ok(None);
    }

    let x = key::cast_key_to_int(key);
    if x < 0 || x >= MAX_SIZE {
        vm.raise_warning(format!("{}: {}", diag::ILLEGAL_STRING_OFFSET, x));
        if !set_result {
            return Err(VmError::invalid_set(Cell::Null));
        }
        *value = Cell::Null;
        return Ok(None);
    }

    // First byte of the stringified RHS; an empty RHS writes NUL.
    let byte = value
        .to_string_value()
        .into_bytes()
        .first()
        .copied()
        .unwrap_or(0);
    let idx = x as usize;

    if x < base_len {
        let (Cell::Str(s) | Cell::StaticStr(s)) = base else {
            unreachable!()
        };
        if !s.has_multiple_refs() {
            // Sole owner of the buffer: modify in place.
            s.set_byte(idx, byte);
        } else {
            let mut bytes = s.data().to_vec();
            bytes[idx] = byte;
            *base = Cell::Str(StrData::from_bytes(bytes));
        }
    } else {
        let Some(s) = base.as_str_data() else {
            unreachable!()
        };
        let mut bytes = Vec::with_capacity(idx + 1);
        bytes.extend_from_slice(s.data());
        bytes.resize(idx, b' ');
        bytes.push(byte);
        *base = Cell::Str(StrData::from_bytes(bytes));
    }

    Ok(Some(StrData::from_bytes(if byte == 0 {
        Vec::new()
    } else {
        vec![byte]
    })))
}

fn set_elem_object(
    vm: &mut Vm,
    obj: &Arc<ObjectData>,
    key: &Key,
    value: &Cell,
) -> Result<(), VmError> {
    if obj.is_collection() {
        collections::set(vm, obj, key, value.clone())
    } else {
        objects::obj_offset_set(vm, obj, &key.to_cell(), value)
    }
}

/// `$base[] = $value`.
pub fn set_new_elem(
    vm: &mut Vm,
    set_result: bool,
    base: &mut Cell,
    value: &mut Cell,
) -> Result<(), VmError> {
    if let Cell::Ref(r) = &*base {
        let r = r.clone();
        if let Some(obj) = ref_object(&r) {
            return set_new_elem_object(vm, &obj, value);
        }
        let mut inner = r.lock();
        return set_new_elem_cell(vm, set_result, &mut inner, value);
    }
    set_new_elem_cell(vm, set_result, base, value)
}

fn set_new_elem_cell(
    vm: &mut Vm,
    set_result: bool,
    base: &mut Cell,
    value: &mut Cell,
) -> Result<(), VmError> {
    match &*base {
        Cell::Uninit | Cell::Null => set_new_elem_emptyish(base, value),
        Cell::Bool(b) => {
            if *b {
                set_elem_scalar(vm, set_result, value)
            } else {
                set_new_elem_emptyish(base, value)
            }
        }
        Cell::Int(_) | Cell::Double(_) | Cell::Resource(_) => {
            set_elem_scalar(vm, set_result, value)
        }
        Cell::Str(s) | Cell::StaticStr(s) => {
            if s.is_empty() {
                set_new_elem_emptyish(base, value)
            } else {
                Err(vm.raise_error(diag::NEWELEM_NOT_SUPPORTED_STRING))
            }
        }
        Cell::Array(_) => {
            set_new_elem_array(base, value);
            Ok(())
        }
        Cell::Object(o) => set_new_elem_object(vm, &o.clone(), value),
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(base),
    }
}

fn set_new_elem_emptyish(base: &mut Cell, value: &mut Cell) -> Result<(), VmError> {
    let mut a = ArrayData::new();
    a.push(value.clone());
    *base = Cell::array(a);
    Ok(())
}

fn set_new_elem_array(base: &mut Cell, value: &mut Cell) {
    let Cell::Array(a) = &*base else {
        unreachable!()
    };
    if Arc::strong_count(a) > 1 {
        trace_log!("cow", "copying shared array for append");
        let old = Arc::as_ptr(a);
        let mut copy = ArrayData::clone(a);
        copy.push(value.clone());
        array_ref_shuffle(base, old, Arc::new(copy));
    } else {
        let Cell::Array(a) = base else { unreachable!() };
        Arc::make_mut(a).push(value.clone());
    }
}

fn set_new_elem_object(vm: &mut Vm, obj: &Arc<ObjectData>, value: &mut Cell) -> Result<(), VmError> {
    if obj.is_collection() {
        collections::append(vm, obj, value.clone())
    } else {
        objects::obj_offset_append(vm, obj, value)
    }
}

/// Install a freshly produced array into the base slot, releasing the old
/// one. If the slot was rebound underneath the copy (possible only
/// when the base was reached through a reference): then the new array is
/// released instead and the rebound value wins.
pub(crate) fn array_ref_shuffle(slot: &mut Cell, old: *const ArrayData, new: Arc<ArrayData>) {
    match slot {
        Cell::Array(cur) if std::ptr::eq(Arc::as_ptr(cur), old) => *cur = new,
        _ => {
            trace_log!("shuffle", "base rebound during copy; releasing new array");
            drop(new);
        }
    }
}

/// Clone an object referent out of a ref slot, so handler calls and
/// collection locks run without the ref lock held.
pub(crate) fn ref_object(r: &RefData) -> Option<Arc<ObjectData>> {
    match &*r.lock() {
        Cell::Object(o) => Some(o.clone()),
        _ => None,
    }
}

/// Park an object handle in the caller's scratch cell so borrows into the
/// object can outlive the ref indirection it came from.
pub(crate) fn pin_object<'a>(scratch: &'a mut Cell, obj: Arc<ObjectData>) -> &'a Arc<ObjectData> {
    *scratch = Cell::Object(obj);
    match &*scratch {
        Cell::Object(o) => o,
        _ => unreachable!(),
    }
}
