use std::sync::Arc;

use crate::cell::{Cell, Num, VmError, unknown_base_type};
use crate::collections;
use crate::objects::{self, ObjectData, stdclass};
use crate::runtime::key::{self, Key};
use crate::runtime::{Vm, diag};
use crate::strings::StrData;

use super::elem::{elem_d_array, ref_object};

/// The compound-assignment operators. The `O` variants promote integer
/// overflow to a double instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpOp {
    PlusEqual,
    MinusEqual,
    MulEqual,
    DivEqual,
    ModEqual,
    ConcatEqual,
    PowEqual,
    AndEqual,
    OrEqual,
    XorEqual,
    SlEqual,
    SrEqual,
    PlusEqualO,
    MinusEqualO,
    MulEqualO,
}

fn wrapping(op: SetOpOp, a: i64, b: i64) -> i64 {
    match op {
        SetOpOp::PlusEqual => a.wrapping_add(b),
        SetOpOp::MinusEqual => a.wrapping_sub(b),
        SetOpOp::MulEqual => a.wrapping_mul(b),
        _ => unreachable!(),
    }
}

fn overflowing(op: SetOpOp, a: i64, b: i64) -> Num {
    let (checked, dbl) = match op {
        SetOpOp::PlusEqualO => (a.checked_add(b), a as f64 + b as f64),
        SetOpOp::MinusEqualO => (a.checked_sub(b), a as f64 - b as f64),
        SetOpOp::MulEqualO => (a.checked_mul(b), a as f64 * b as f64),
        _ => unreachable!(),
    };
    match checked {
        Some(v) => Num::Int(v),
        None => Num::Dbl(dbl),
    }
}

fn float_op(op: SetOpOp, a: f64, b: f64) -> f64 {
    match op {
        SetOpOp::PlusEqual | SetOpOp::PlusEqualO => a + b,
        SetOpOp::MinusEqual | SetOpOp::MinusEqualO => a - b,
        SetOpOp::MulEqual | SetOpOp::MulEqualO => a * b,
        _ => unreachable!(),
    }
}

fn int_pow(base: i64, exp: u32) -> Num {
    let mut acc: i64 = 1;
    for _ in 0..exp {
        match acc.checked_mul(base) {
            Some(v) => acc = v,
            None => return Num::Dbl((base as f64).powi(exp as i32)),
        }
    }
    Num::Int(acc)
}

/// Apply `lhs op= rhs` in place with the language's coercion rules.
pub fn setop_body(vm: &mut Vm, lhs: &mut Cell, op: SetOpOp, rhs: &Cell) -> Result<(), VmError> {
    use SetOpOp::*;

    match op {
        ConcatEqual => {
            let mut s = lhs.to_string_value();
            s.push_str(&rhs.to_string_value());
            *lhs = Cell::Str(StrData::from_str(&s));
            return Ok(());
        }
        PlusEqual if matches!(lhs, Cell::Array(_)) || matches!(rhs, Cell::Array(_)) => {
            // + on two arrays is union; mixing an array with anything else
            // has no defined result.
            let (Cell::Array(la), Cell::Array(rb)) = (&mut *lhs, rhs) else {
                return Err(vm.raise_error(diag::UNSUPPORTED_OPERAND));
            };
            let rb = rb.clone();
            let arr = Arc::make_mut(la);
            for (k, v) in rb.iter() {
                if !arr.exists(k) {
                    arr.put(k.clone(), v.clone());
                }
            }
            return Ok(());
        }
        _ if matches!(lhs, Cell::Array(_)) || matches!(rhs, Cell::Array(_)) => {
            return Err(vm.raise_error(diag::UNSUPPORTED_OPERAND));
        }
        _ => {}
    }

    let l = lhs.to_number();
    let r = rhs.to_number();
    let result = match op {
        PlusEqual | MinusEqual | MulEqual => match (l, r) {
            (Num::Int(a), Num::Int(b)) => Num::Int(wrapping(op, a, b)),
            _ => Num::Dbl(float_op(op, l.to_f64(), r.to_f64())),
        },
        PlusEqualO | MinusEqualO | MulEqualO => match (l, r) {
            (Num::Int(a), Num::Int(b)) => overflowing(op, a, b),
            _ => Num::Dbl(float_op(op, l.to_f64(), r.to_f64())),
        },
        DivEqual => {
            if matches!(r, Num::Int(0)) || r.to_f64() == 0.0 {
                vm.raise_warning(diag::DIVISION_BY_ZERO);
                *lhs = Cell::Bool(false);
                return Ok(());
            }
            match (l, r) {
                (Num::Int(a), Num::Int(b)) if a % b == 0 && !(a == i64::MIN && b == -1) => {
                    Num::Int(a / b)
                }
                _ => Num::Dbl(l.to_f64() / r.to_f64()),
            }
        }
        ModEqual => {
            let b = rhs.to_i64();
            if b == 0 {
                vm.raise_warning(diag::DIVISION_BY_ZERO);
                *lhs = Cell::Bool(false);
                return Ok(());
            }
            Num::Int(lhs.to_i64().checked_rem(b).unwrap_or(0))
        }
        PowEqual => {
            let exp = rhs.to_i64();
            match (l, r) {
                (Num::Int(a), Num::Int(_)) if exp >= 0 && exp <= u32::MAX as i64 => {
                    int_pow(a, exp as u32)
                }
                _ => Num::Dbl(l.to_f64().powf(r.to_f64())),
            }
        }
        AndEqual => Num::Int(lhs.to_i64() & rhs.to_i64()),
        OrEqual => Num::Int(lhs.to_i64() | rhs.to_i64()),
        XorEqual => Num::Int(lhs.to_i64() ^ rhs.to_i64()),
        SlEqual => {
            let shift = rhs.to_i64();
            if (0..64).contains(&shift) {
                Num::Int(lhs.to_i64().wrapping_shl(shift as u32))
            } else {
                Num::Int(0)
            }
        }
        SrEqual => {
            let shift = rhs.to_i64();
            let a = lhs.to_i64();
            if (0..64).contains(&shift) {
                Num::Int(a.wrapping_shr(shift as u32))
            } else {
                Num::Int(if a < 0 { -1 } else { 0 })
            }
        }
        ConcatEqual => unreachable!(),
    };
    *lhs = result.into_cell();
    Ok(())
}

/// `$result = ($base[$key] op= $rhs)`.
pub fn setop_elem(
    vm: &mut Vm,
    op: SetOpOp,
    base: &mut Cell,
    key: &Key,
    rhs: &Cell,
) -> Result<Cell, VmError> {
    if let Cell::Ref(r) = &*base {
        let r = r.clone();
        if let Some(obj) = ref_object(&r) {
            return setop_elem_object(vm, op, &obj, key, rhs);
        }
        let mut inner = r.lock();
        return setop_elem_cell(vm, op, &mut inner, key, rhs);
    }
    setop_elem_cell(vm, op, base, key, rhs)
}

fn setop_elem_cell(
    vm: &mut Vm,
    op: SetOpOp,
    base: &mut Cell,
    key: &Key,
    rhs: &Cell,
) -> Result<Cell, VmError> {
    match &*base {
        Cell::Uninit | Cell::Null => setop_elem_emptyish(vm, op, base, key, rhs),
        Cell::Bool(b) => {
            if *b {
                Ok(setop_scalar(vm))
            } else {
                setop_elem_emptyish(vm, op, base, key, rhs)
            }
        }
        Cell::Int(_) | Cell::Double(_) | Cell::Resource(_) => Ok(setop_scalar(vm)),
        Cell::Str(s) | Cell::StaticStr(s) => {
            if s.is_empty() {
                setop_elem_emptyish(vm, op, base, key, rhs)
            } else {
                Err(vm.raise_error(diag::SETOP_NOT_SUPPORTED_STRING))
            }
        }
        Cell::Array(_) => setop_elem_array(vm, op, base, key, rhs),
        Cell::Object(o) => setop_elem_object(vm, op, &o.clone(), key, rhs),
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(base),
    }
}

fn setop_elem_emptyish(
    vm: &mut Vm,
    op: SetOpOp,
    base: &mut Cell,
    key: &Key,
    rhs: &Cell,
) -> Result<Cell, VmError> {
    *base = Cell::empty_array();
    setop_elem_array(vm, op, base, key, rhs)
}

fn setop_scalar(vm: &mut Vm) -> Cell {
    vm.raise_warning(diag::CANNOT_USE_SCALAR_AS_ARRAY);
    Cell::Null
}

fn setop_elem_array(
    vm: &mut Vm,
    op: SetOpOp,
    base: &mut Cell,
    key: &Key,
    rhs: &Cell,
) -> Result<Cell, VmError> {
    let warn = vm.more_warnings();
    let mut scratch = Cell::Uninit;
    let mut lv = elem_d_array(vm, warn, base, key, &mut scratch)?;
    setop_body(vm, &mut lv, op, rhs)?;
    Ok((*lv).clone())
}

fn setop_elem_object(
    vm: &mut Vm,
    op: SetOpOp,
    obj: &Arc<ObjectData>,
    key: &Key,
    rhs: &Cell,
) -> Result<Cell, VmError> {
    if obj.is_collection() {
        let mut lv = collections::at_rw(vm, obj, key)?;
        setop_body(vm, &mut lv, op, rhs)?;
        return Ok((*lv).clone());
    }
    // Subscript-protocol objects do the read-modify-write on a scratch
    // value, then store it back (non-reffy).
    let offset = key.to_cell();
    let mut tmp = objects::obj_offset_get(vm, obj, &offset)?;
    setop_body(vm, &mut tmp, op, rhs)?;
    objects::obj_offset_set(vm, obj, &offset, &tmp)?;
    Ok(tmp)
}

/// `$result = ($base[] op= $rhs)`.
pub fn setop_new_elem(
    vm: &mut Vm,
    op: SetOpOp,
    base: &mut Cell,
    rhs: &Cell,
) -> Result<Cell, VmError> {
    if let Cell::Ref(r) = &*base {
        let r = r.clone();
        if let Some(obj) = ref_object(&r) {
            return setop_new_elem_object(vm, op, &obj, rhs);
        }
        let mut inner = r.lock();
        return setop_new_elem_cell(vm, op, &mut inner, rhs);
    }
    setop_new_elem_cell(vm, op, base, rhs)
}

fn setop_new_elem_cell(
    vm: &mut Vm,
    op: SetOpOp,
    base: &mut Cell,
    rhs: &Cell,
) -> Result<Cell, VmError> {
    match &*base {
        Cell::Uninit | Cell::Null => setop_new_elem_emptyish(vm, op, base, rhs),
        Cell::Bool(b) => {
            if *b {
                Ok(setop_scalar(vm))
            } else {
                setop_new_elem_emptyish(vm, op, base, rhs)
            }
        }
        Cell::Int(_) | Cell::Double(_) | Cell::Resource(_) => Ok(setop_scalar(vm)),
        Cell::Str(s) | Cell::StaticStr(s) => {
            if s.is_empty() {
                setop_new_elem_emptyish(vm, op, base, rhs)
            } else {
                Err(vm.raise_error(diag::NEWELEM_NOT_SUPPORTED_STRING))
            }
        }
        Cell::Array(_) => setop_new_elem_array(vm, op, base, rhs),
        Cell::Object(o) => setop_new_elem_object(vm, op, &o.clone(), rhs),
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(base),
    }
}

fn setop_new_elem_emptyish(
    vm: &mut Vm,
    op: SetOpOp,
    base: &mut Cell,
    rhs: &Cell,
) -> Result<Cell, VmError> {
    *base = Cell::empty_array();
    setop_new_elem_array(vm, op, base, rhs)
}

fn setop_new_elem_array(
    vm: &mut Vm,
    op: SetOpOp,
    base: &mut Cell,
    rhs: &Cell,
) -> Result<Cell, VmError> {
    let Cell::Array(a) = base else { unreachable!() };
    let slot = Arc::make_mut(a).lval_append();
    setop_body(vm, slot, op, rhs)?;
    Ok(slot.clone())
}

fn setop_new_elem_object(
    vm: &mut Vm,
    op: SetOpOp,
    obj: &Arc<ObjectData>,
    rhs: &Cell,
) -> Result<Cell, VmError> {
    if obj.is_collection() {
        return Err(vm.raise_error(diag::NEWELEM_LVAL_READ));
    }
    let mut tmp = objects::obj_offset_get(vm, obj, &Cell::Null)?;
    setop_body(vm, &mut tmp, op, rhs)?;
    objects::obj_offset_append(vm, obj, &tmp)?;
    Ok(tmp)
}

/// `$result = ($base->$name op= $rhs)`.
pub fn setop_prop(
    vm: &mut Vm,
    op: SetOpOp,
    ctx: Option<&Arc<crate::objects::ClassData>>,
    base: &mut Cell,
    name: &Key,
    rhs: &Cell,
) -> Result<Cell, VmError> {
    if let Cell::Ref(r) = &*base {
        let r = r.clone();
        if let Some(obj) = ref_object(&r) {
            return setop_prop_obj(vm, op, ctx, &obj, name, rhs);
        }
        let mut inner = r.lock();
        return setop_prop_cell(vm, op, ctx, &mut inner, name, rhs);
    }
    setop_prop_cell(vm, op, ctx, base, name, rhs)
}

fn setop_prop_cell(
    vm: &mut Vm,
    op: SetOpOp,
    ctx: Option<&Arc<crate::objects::ClassData>>,
    base: &mut Cell,
    name: &Key,
    rhs: &Cell,
) -> Result<Cell, VmError> {
    match &*base {
        Cell::Object(o) => setop_prop_obj(vm, op, ctx, &o.clone(), name, rhs),
        Cell::Uninit | Cell::Null => setop_prop_stdclass(vm, op, base, name, rhs),
        Cell::Bool(b) => {
            if *b {
                Ok(setop_prop_null(vm))
            } else {
                setop_prop_stdclass(vm, op, base, name, rhs)
            }
        }
        Cell::Str(s) | Cell::StaticStr(s) => {
            if s.is_empty() {
                setop_prop_stdclass(vm, op, base, name, rhs)
            } else {
                Ok(setop_prop_null(vm))
            }
        }
        Cell::Int(_) | Cell::Double(_) | Cell::Array(_) | Cell::Resource(_) => {
            Ok(setop_prop_null(vm))
        }
        Cell::Ref(_) | Cell::Class(_) => unknown_base_type(base),
    }
}

fn setop_prop_null(vm: &mut Vm) -> Cell {
    vm.raise_warning(diag::ASSIGN_PROP_NON_OBJECT);
    Cell::Null
}

fn setop_prop_stdclass(
    vm: &mut Vm,
    op: SetOpOp,
    base: &mut Cell,
    name: &Key,
    rhs: &Cell,
) -> Result<Cell, VmError> {
    let obj = ObjectData::new(stdclass());
    *base = Cell::Object(obj.clone());
    vm.raise_warning(diag::CREATING_DEFAULT_OBJECT);

    let mut tmp = Cell::Null;
    setop_body(vm, &mut tmp, op, rhs)?;
    obj.set_prop(vm, None, key::prop_name(name), tmp.clone())?;
    Ok(tmp)
}

/// Fast-path flavor when the base is already known to be an object.
pub fn setop_prop_obj(
    vm: &mut Vm,
    op: SetOpOp,
    ctx: Option<&Arc<crate::objects::ClassData>>,
    obj: &Arc<ObjectData>,
    name: &Key,
    rhs: &Cell,
) -> Result<Cell, VmError> {
    let mut lv = obj.prop_d(vm, ctx, key::prop_name(name), false)?;
    setop_body(vm, &mut lv, op, rhs)?;
    Ok((*lv).clone())
}
