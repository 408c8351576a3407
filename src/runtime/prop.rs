use std::sync::Arc;

use crate::cell::{Cell, VmError, null_sentinel, unknown_base_type};
use crate::objects::{ClassData, ObjectData, stdclass};
use crate::runtime::key::{self, Key};
use crate::runtime::lval::Lval;
use crate::runtime::{Vm, diag};
use crate::trace::trace_log;

use super::elem::{pin_object, ref_object};

/// `$result = $base->$name`: read a property. `warn` adds the
/// non-object / undefined-property notices.
pub fn prop<'a>(
    vm: &mut Vm,
    warn: bool,
    ctx: Option<&Arc<ClassData>>,
    base: &'a mut Cell,
    name: &Key,
    scratch: &'a mut Cell,
) -> Result<&'a Cell, VmError> {
    let Some(obj) = prop_pre_read(vm, warn, base) else {
        return Ok(null_sentinel());
    };
    *scratch = obj.read_prop(vm, ctx, key::prop_name(name), warn)?;
    Ok(scratch)
}

/// Fast-path flavor when the base is already known to be an object.
pub fn prop_obj(
    vm: &mut Vm,
    warn: bool,
    ctx: Option<&Arc<ClassData>>,
    obj: &Arc<ObjectData>,
    name: &Key,
) -> Result<Cell, VmError> {
    obj.read_prop(vm, ctx, key::prop_name(name), warn)
}

/// `$base->$name` as a define-mode lvalue: empty-ish bases vivify to a
/// fresh default object, missing properties are created as null.
pub fn prop_d<'a>(
    vm: &mut Vm,
    warn: bool,
    ctx: Option<&Arc<ClassData>>,
    base: &'a mut Cell,
    name: &Key,
    scratch: &'a mut Cell,
) -> Result<Lval<'a>, VmError> {
    let obj = match prop_pre_define(vm, warn, base) {
        Some(obj) => obj,
        None => {
            // Non-promotable base: the target reads as null and writes
            // through it vanish.
            *scratch = Cell::Null;
            return Ok(Lval::Slot(scratch));
        }
    };
    let sym = key::prop_name(name);
    let obj = pin_object(scratch, obj);
    Ok(Lval::Guard(obj.prop_d(vm, ctx, sym, warn)?))
}

/// `$base->$name` as an unset-mode lvalue: no vivification, no warnings.
pub fn prop_u<'a>(
    vm: &mut Vm,
    ctx: Option<&Arc<ClassData>>,
    base: &'a mut Cell,
    name: &Key,
    scratch: &'a mut Cell,
) -> Result<Lval<'a>, VmError> {
    let Some(obj) = prop_pre_read(vm, false, base) else {
        *scratch = Cell::Null;
        return Ok(Lval::Slot(scratch));
    };
    let sym = key::prop_name(name);
    let obj = pin_object(scratch, obj);
    Ok(Lval::Guard(obj.prop_d(vm, ctx, sym, false)?))
}

/// `$base?->$name`: a null-ish base short-circuits to null with no
/// diagnostic; any other non-object warns.
pub fn null_safe_prop<'a>(
    vm: &mut Vm,
    ctx: Option<&Arc<ClassData>>,
    base: &'a mut Cell,
    name: &Key,
    scratch: &'a mut Cell,
) -> Result<&'a Cell, VmError> {
    match base.unboxed() {
        Cell::Uninit | Cell::Null => Ok(null_sentinel()),
        Cell::Object(obj) => {
            *scratch = obj.read_prop(vm, ctx, key::prop_name(name), false)?;
            Ok(scratch)
        }
        Cell::Class(_) | Cell::Ref(_) => unknown_base_type(base),
        _ => {
            vm.raise_notice(diag::NON_OBJECT_PROPERTY);
            Ok(null_sentinel())
        }
    }
}

/// Read-mode base dispatch: the object to read from, or `None` when the
/// base is not an object (warned when `warn`).
fn prop_pre_read(vm: &mut Vm, warn: bool, base: &Cell) -> Option<Arc<ObjectData>> {
    match base.unboxed() {
        Cell::Object(obj) => Some(obj),
        Cell::Class(_) | Cell::Ref(_) => unknown_base_type(base),
        _ => {
            if warn {
                vm.raise_notice(diag::NON_OBJECT_PROPERTY);
            }
            None
        }
    }
}

/// Define-mode base dispatch: vivifies empty-ish bases to a default
/// object (through a ref indirection when present), warns and yields
/// `None` for non-promotable bases.
fn prop_pre_define(vm: &mut Vm, warn: bool, base: &mut Cell) -> Option<Arc<ObjectData>> {
    if let Cell::Ref(r) = &*base {
        let r = r.clone();
        if let Some(obj) = ref_object(&r) {
            return Some(obj);
        }
        let mut inner = r.lock();
        if matches!(&*inner, Cell::Ref(_) | Cell::Class(_)) {
            unknown_base_type(&inner);
        }
        return prop_pre_define_cell(vm, warn, &mut inner);
    }
    prop_pre_define_cell(vm, warn, base)
}

fn prop_pre_define_cell(vm: &mut Vm, warn: bool, base: &mut Cell) -> Option<Arc<ObjectData>> {
    match &*base {
        Cell::Object(obj) => Some(obj.clone()),
        Cell::Uninit | Cell::Null => Some(promote_to_stdclass(vm, base)),
        Cell::Bool(false) => Some(promote_to_stdclass(vm, base)),
        Cell::Str(s) | Cell::StaticStr(s) if s.is_empty() => Some(promote_to_stdclass(vm, base)),
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(base),
        _ => {
            if warn {
                vm.raise_notice(diag::NON_OBJECT_PROPERTY);
            }
            None
        }
    }
}

/// Auto-vivification to the default object class. The bare property
/// define only warns in the strict dialect; the Set/SetOp/IncDec paths
/// warn unconditionally at their call sites.
fn promote_to_stdclass(vm: &mut Vm, base: &mut Cell) -> Arc<ObjectData> {
    trace_log!("promote", "vivifying empty base to default object");
    let obj = ObjectData::new(stdclass());
    *base = Cell::Object(obj.clone());
    if vm.strict_syntax() {
        vm.raise_warning(diag::CREATING_DEFAULT_OBJECT);
    }
    obj
}

/// `$base->$name = $value`.
pub fn set_prop(
    vm: &mut Vm,
    set_result: bool,
    ctx: Option<&Arc<ClassData>>,
    base: &mut Cell,
    name: &Key,
    value: &mut Cell,
) -> Result<(), VmError> {
    if let Cell::Ref(r) = &*base {
        let r = r.clone();
        if let Some(obj) = ref_object(&r) {
            return set_prop_obj(vm, ctx, &obj, name, value);
        }
        let mut inner = r.lock();
        return set_prop_cell(vm, set_result, ctx, &mut inner, name, value);
    }
    set_prop_cell(vm, set_result, ctx, base, name, value)
}

fn set_prop_cell(
    vm: &mut Vm,
    set_result: bool,
    ctx: Option<&Arc<ClassData>>,
    base: &mut Cell,
    name: &Key,
    value: &mut Cell,
) -> Result<(), VmError> {
    match &*base {
        Cell::Object(o) => set_prop_obj(vm, ctx, &o.clone(), name, value),
        Cell::Uninit | Cell::Null => set_prop_stdclass(vm, base, name, value),
        Cell::Bool(b) => {
            if *b {
                set_prop_null(vm, set_result, value)
            } else {
                set_prop_stdclass(vm, base, name, value)
            }
        }
        Cell::Str(s) | Cell::StaticStr(s) => {
            if s.is_empty() {
                set_prop_stdclass(vm, base, name, value)
            } else {
                set_prop_null(vm, set_result, value)
            }
        }
        Cell::Int(_) | Cell::Double(_) | Cell::Array(_) | Cell::Resource(_) => {
            set_prop_null(vm, set_result, value)
        }
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(base),
    }
}

fn set_prop_null(vm: &mut Vm, set_result: bool, value: &mut Cell) -> Result<(), VmError> {
    vm.raise_warning(diag::NON_OBJECT_PROPERTY);
    if !set_result {
        return Err(VmError::invalid_set(Cell::Null));
    }
    *value = Cell::Null;
    Ok(())
}

fn set_prop_stdclass(
    vm: &mut Vm,
    base: &mut Cell,
    name: &Key,
    value: &mut Cell,
) -> Result<(), VmError> {
    trace_log!("promote", "vivifying empty base to default object for set");
    let obj = ObjectData::new(stdclass());
    obj.set_prop(vm, None, key::prop_name(name), value.clone())?;
    *base = Cell::Object(obj);
    vm.raise_warning(diag::CREATING_DEFAULT_OBJECT);
    Ok(())
}

/// Fast-path flavor when the base is already known to be an object.
pub fn set_prop_obj(
    vm: &mut Vm,
    ctx: Option<&Arc<ClassData>>,
    obj: &Arc<ObjectData>,
    name: &Key,
    value: &mut Cell,
) -> Result<(), VmError> {
    obj.set_prop(vm, ctx, key::prop_name(name), value.clone())
}

/// `unset($base->$name)`: a no-op on non-objects.
pub fn unset_prop(
    vm: &mut Vm,
    ctx: Option<&Arc<ClassData>>,
    base: &mut Cell,
    name: &Key,
) -> Result<(), VmError> {
    match base.unboxed() {
        Cell::Object(obj) => unset_prop_obj(vm, ctx, &obj, name),
        _ => Ok(()),
    }
}

/// Fast-path flavor when the base is already known to be an object.
pub fn unset_prop_obj(
    vm: &mut Vm,
    ctx: Option<&Arc<ClassData>>,
    obj: &Arc<ObjectData>,
    name: &Key,
) -> Result<(), VmError> {
    obj.unset_prop(vm, ctx, key::prop_name(name))
}

/// `isset($base->$name)` / `empty($base->$name)`.
pub fn isset_empty_prop(
    use_empty: bool,
    ctx: Option<&Arc<ClassData>>,
    base: &mut Cell,
    name: &Key,
) -> bool {
    match base.unboxed() {
        Cell::Object(obj) => isset_empty_prop_obj(use_empty, ctx, &obj, name),
        _ => use_empty,
    }
}

/// Fast-path flavor when the base is already known to be an object.
pub fn isset_empty_prop_obj(
    use_empty: bool,
    ctx: Option<&Arc<ClassData>>,
    obj: &Arc<ObjectData>,
    name: &Key,
) -> bool {
    let sym = key::prop_name(name);
    if use_empty {
        obj.prop_empty(ctx, sym)
    } else {
        obj.prop_isset(ctx, sym)
    }
}
