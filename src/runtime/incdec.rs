use std::sync::Arc;

use crate::cell::{Cell, Num, VmError, unknown_base_type};
use crate::collections;
use crate::objects::{ClassData, ObjectData, stdclass};
use crate::runtime::key::{self, Key};
use crate::runtime::{Vm, diag};
use crate::strings::StrData;

use super::elem::{elem_d_array, ref_object};

/// Pre/post increment and decrement. The `O` variants promote signed
/// overflow to a double; the plain ones wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    PreInc,
    PostInc,
    PreDec,
    PostDec,
    PreIncO,
    PostIncO,
    PreDecO,
    PostDecO,
}

impl IncDecOp {
    fn is_pre(self) -> bool {
        matches!(
            self,
            IncDecOp::PreInc | IncDecOp::PreDec | IncDecOp::PreIncO | IncDecOp::PreDecO
        )
    }

    fn is_inc(self) -> bool {
        matches!(
            self,
            IncDecOp::PreInc | IncDecOp::PostInc | IncDecOp::PreIncO | IncDecOp::PostIncO
        )
    }

    fn checks_overflow(self) -> bool {
        matches!(
            self,
            IncDecOp::PreIncO | IncDecOp::PostIncO | IncDecOp::PreDecO | IncDecOp::PostDecO
        )
    }
}

/// Alphanumeric string increment: "a" -> "b", "z" -> "aa", "a9" -> "b0".
/// Carrying stops at the first non-alphanumeric character.
fn increment_string(bytes: &[u8]) -> Vec<u8> {
    if bytes.is_empty() {
        return b"1".to_vec();
    }
    let mut out = bytes.to_vec();
    let mut pos = out.len();
    loop {
        if pos == 0 {
            let prepend = match out[0] {
                b'a'..=b'z' => b'a',
                b'A'..=b'Z' => b'A',
                b'0'..=b'9' => b'1',
                _ => return out,
            };
            out.insert(0, prepend);
            return out;
        }
        pos -= 1;
        match out[pos] {
            c @ (b'a'..=b'y' | b'A'..=b'Y' | b'0'..=b'8') => {
                out[pos] = c + 1;
                return out;
            }
            b'z' => out[pos] = b'a',
            b'Z' => out[pos] = b'A',
            b'9' => out[pos] = b'0',
            _ => return out,
        }
    }
}

/// Whole-string numeric interpretation (leading/trailing whitespace
/// tolerated); `None` for anything that is not purely a number.
fn numeric_string(s: &StrData) -> Option<Num> {
    let text = s.to_string_lossy();
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(i) = t.parse::<i64>() {
        return Some(Num::Int(i));
    }
    t.parse::<f64>().ok().map(Num::Dbl)
}

fn step_null(op: IncDecOp) -> Option<Cell> {
    // Incrementing null gives 1; decrementing null leaves it null.
    if op.is_inc() { Some(Cell::Int(1)) } else { None }
}

fn step_int(op: IncDecOp, i: i64) -> Cell {
    let delta: i64 = if op.is_inc() { 1 } else { -1 };
    if op.checks_overflow() {
        match i.checked_add(delta) {
            Some(v) => Cell::Int(v),
            None => Cell::Double(i as f64 + delta as f64),
        }
    } else {
        Cell::Int(i.wrapping_add(delta))
    }
}

fn step_string(op: IncDecOp, s: &StrData) -> Option<Cell> {
    match numeric_string(s) {
        Some(Num::Int(i)) => Some(step_int(op, i)),
        Some(Num::Dbl(d)) => Some(Cell::Double(if op.is_inc() { d + 1.0 } else { d - 1.0 })),
        None => {
            if op.is_inc() {
                Some(Cell::Str(StrData::from_bytes(increment_string(s.data()))))
            } else {
                // Non-numeric strings do not decrement.
                None
            }
        }
    }
}

/// Apply the step to `cell`, writing the expression's value into `dest`
/// (pre: the new value; post: the old one).
pub fn inc_dec_body(op: IncDecOp, cell: &mut Cell, dest: &mut Cell) {
    let stepped = match &*cell {
        Cell::Int(i) => Some(step_int(op, *i)),
        Cell::Uninit | Cell::Null => step_null(op),
        Cell::Double(d) => Some(Cell::Double(if op.is_inc() { d + 1.0 } else { d - 1.0 })),
        Cell::Str(s) | Cell::StaticStr(s) => step_string(op, s),
        // Bools and containers are untouched by ++/--.
        _ => None,
    };
    let Some(stepped) = stepped else {
        *dest = cell.clone();
        return;
    };
    if op.is_pre() {
        *cell = stepped;
        *dest = cell.clone();
    } else {
        *dest = cell.clone();
        *cell = stepped;
    }
}

/// `++$base[$key]` and friends; `dest` receives the expression value.
pub fn incdec_elem(
    vm: &mut Vm,
    op: IncDecOp,
    base: &mut Cell,
    key: &Key,
    dest: &mut Cell,
) -> Result<(), VmError> {
    if let Cell::Ref(r) = &*base {
        let r = r.clone();
        if let Some(obj) = ref_object(&r) {
            return incdec_elem_object(vm, op, &obj, key, dest);
        }
        let mut inner = r.lock();
        return incdec_elem_cell(vm, op, &mut inner, key, dest);
    }
    incdec_elem_cell(vm, op, base, key, dest)
}

fn incdec_elem_cell(
    vm: &mut Vm,
    op: IncDecOp,
    base: &mut Cell,
    key: &Key,
    dest: &mut Cell,
) -> Result<(), VmError> {
    match &*base {
        Cell::Uninit | Cell::Null => incdec_elem_emptyish(vm, op, base, key, dest),
        Cell::Bool(b) => {
            if *b {
                incdec_scalar(vm, dest);
                Ok(())
            } else {
                incdec_elem_emptyish(vm, op, base, key, dest)
            }
        }
        Cell::Int(_) | Cell::Double(_) | Cell::Resource(_) => {
            incdec_scalar(vm, dest);
            Ok(())
        }
        Cell::Str(s) | Cell::StaticStr(s) => {
            if s.is_empty() {
                incdec_elem_emptyish(vm, op, base, key, dest)
            } else {
                Err(vm.raise_error(diag::INCDEC_NOT_SUPPORTED))
            }
        }
        Cell::Array(_) => incdec_elem_array(vm, op, base, key, dest),
        Cell::Object(o) => incdec_elem_object(vm, op, &o.clone(), key, dest),
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(base),
    }
}

fn incdec_elem_emptyish(
    vm: &mut Vm,
    op: IncDecOp,
    base: &mut Cell,
    key: &Key,
    dest: &mut Cell,
) -> Result<(), VmError> {
    *base = Cell::empty_array();
    incdec_elem_array(vm, op, base, key, dest)
}

fn incdec_scalar(vm: &mut Vm, dest: &mut Cell) {
    vm.raise_warning(diag::CANNOT_USE_SCALAR_AS_ARRAY);
    *dest = Cell::Null;
}

fn incdec_elem_array(
    vm: &mut Vm,
    op: IncDecOp,
    base: &mut Cell,
    key: &Key,
    dest: &mut Cell,
) -> Result<(), VmError> {
    let warn = vm.more_warnings();
    let mut scratch = Cell::Uninit;
    let mut lv = elem_d_array(vm, warn, base, key, &mut scratch)?;
    inc_dec_body(op, &mut lv, dest);
    Ok(())
}

fn incdec_elem_object(
    vm: &mut Vm,
    op: IncDecOp,
    obj: &Arc<ObjectData>,
    key: &Key,
    dest: &mut Cell,
) -> Result<(), VmError> {
    if obj.is_collection() {
        let mut lv = collections::at_rw(vm, obj, key)?;
        inc_dec_body(op, &mut lv, dest);
        return Ok(());
    }
    // Subscript-protocol objects step a scratch copy; the stepped value is
    // not written back (legacy behavior, preserved).
    let mut tmp = crate::objects::obj_offset_get(vm, obj, &key.to_cell())?;
    inc_dec_body(op, &mut tmp, dest);
    Ok(())
}

/// `++$base[]` and friends.
pub fn incdec_new_elem(
    vm: &mut Vm,
    op: IncDecOp,
    base: &mut Cell,
    dest: &mut Cell,
) -> Result<(), VmError> {
    if let Cell::Ref(r) = &*base {
        let r = r.clone();
        if let Some(obj) = ref_object(&r) {
            return incdec_new_elem_object(vm, op, &obj, dest);
        }
        let mut inner = r.lock();
        return incdec_new_elem_cell(vm, op, &mut inner, dest);
    }
    incdec_new_elem_cell(vm, op, base, dest)
}

fn incdec_new_elem_cell(
    vm: &mut Vm,
    op: IncDecOp,
    base: &mut Cell,
    dest: &mut Cell,
) -> Result<(), VmError> {
    match &*base {
        Cell::Uninit | Cell::Null => incdec_new_elem_emptyish(op, base, dest),
        Cell::Bool(b) => {
            if *b {
                incdec_scalar(vm, dest);
                Ok(())
            } else {
                incdec_new_elem_emptyish(op, base, dest)
            }
        }
        Cell::Int(_) | Cell::Double(_) | Cell::Resource(_) => {
            incdec_scalar(vm, dest);
            Ok(())
        }
        Cell::Str(s) | Cell::StaticStr(s) => {
            if s.is_empty() {
                incdec_new_elem_emptyish(op, base, dest)
            } else {
                Err(vm.raise_error(diag::NEWELEM_NOT_SUPPORTED_STRING))
            }
        }
        Cell::Array(_) => {
            incdec_new_elem_array(op, base, dest);
            Ok(())
        }
        Cell::Object(o) => incdec_new_elem_object(vm, op, &o.clone(), dest),
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(base),
    }
}

fn incdec_new_elem_emptyish(op: IncDecOp, base: &mut Cell, dest: &mut Cell) -> Result<(), VmError> {
    *base = Cell::empty_array();
    incdec_new_elem_array(op, base, dest);
    Ok(())
}

fn incdec_new_elem_array(op: IncDecOp, base: &mut Cell, dest: &mut Cell) {
    let Cell::Array(a) = base else { unreachable!() };
    let slot = Arc::make_mut(a).lval_append();
    inc_dec_body(op, slot, dest);
}

fn incdec_new_elem_object(
    vm: &mut Vm,
    op: IncDecOp,
    obj: &Arc<ObjectData>,
    dest: &mut Cell,
) -> Result<(), VmError> {
    if obj.is_collection() {
        return Err(vm.raise_error(diag::NEWELEM_LVAL_READ));
    }
    let mut tmp = crate::objects::obj_offset_get(vm, obj, &Cell::Null)?;
    inc_dec_body(op, &mut tmp, dest);
    Ok(())
}

/// `++$base->$name` and friends.
pub fn incdec_prop(
    vm: &mut Vm,
    op: IncDecOp,
    ctx: Option<&Arc<ClassData>>,
    base: &mut Cell,
    name: &Key,
    dest: &mut Cell,
) -> Result<(), VmError> {
    if let Cell::Ref(r) = &*base {
        let r = r.clone();
        if let Some(obj) = ref_object(&r) {
            return incdec_prop_obj(vm, op, ctx, &obj, name, dest);
        }
        let mut inner = r.lock();
        return incdec_prop_cell(vm, op, ctx, &mut inner, name, dest);
    }
    incdec_prop_cell(vm, op, ctx, base, name, dest)
}

fn incdec_prop_cell(
    vm: &mut Vm,
    op: IncDecOp,
    ctx: Option<&Arc<ClassData>>,
    base: &mut Cell,
    name: &Key,
    dest: &mut Cell,
) -> Result<(), VmError> {
    match &*base {
        Cell::Object(o) => incdec_prop_obj(vm, op, ctx, &o.clone(), name, dest),
        Cell::Uninit | Cell::Null => incdec_prop_stdclass(vm, op, base, name, dest),
        Cell::Bool(b) => {
            if *b {
                incdec_prop_null(vm, dest);
                Ok(())
            } else {
                incdec_prop_stdclass(vm, op, base, name, dest)
            }
        }
        Cell::Str(s) | Cell::StaticStr(s) => {
            if s.is_empty() {
                incdec_prop_stdclass(vm, op, base, name, dest)
            } else {
                incdec_prop_null(vm, dest);
                Ok(())
            }
        }
        Cell::Int(_) | Cell::Double(_) | Cell::Array(_) | Cell::Resource(_) => {
            incdec_prop_null(vm, dest);
            Ok(())
        }
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(base),
    }
}

fn incdec_prop_null(vm: &mut Vm, dest: &mut Cell) {
    vm.raise_warning(diag::INCDEC_PROP_NON_OBJECT);
    *dest = Cell::Null;
}

fn incdec_prop_stdclass(
    vm: &mut Vm,
    op: IncDecOp,
    base: &mut Cell,
    name: &Key,
    dest: &mut Cell,
) -> Result<(), VmError> {
    let obj = ObjectData::new(stdclass());
    *base = Cell::Object(obj.clone());
    vm.raise_warning(diag::CREATING_DEFAULT_OBJECT);

    // The vivified property receives the expression value, not the
    // stepped one (legacy behavior, preserved).
    let mut tmp = Cell::Null;
    inc_dec_body(op, &mut tmp, dest);
    obj.set_prop(vm, None, key::prop_name(name), dest.clone())?;
    Ok(())
}

/// Fast-path flavor when the base is already known to be an object.
pub fn incdec_prop_obj(
    vm: &mut Vm,
    op: IncDecOp,
    ctx: Option<&Arc<ClassData>>,
    obj: &Arc<ObjectData>,
    name: &Key,
    dest: &mut Cell,
) -> Result<(), VmError> {
    let mut lv = obj.prop_d(vm, ctx, key::prop_name(name), false)?;
    inc_dec_body(op, &mut lv, dest);
    Ok(())
}
