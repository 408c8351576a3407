//! Member-access runtime core of the Tsubame VM.
//!
//! This crate implements the primitive operations an interpreter or JIT
//! invokes for `base[key]` and `base->name` expressions over a uniform
//! tagged-value model: reads, define-mode lvalue reads, writes, appends,
//! compound assignment, increment/decrement, isset/empty and unset, with
//! the full set of legacy coercion and warning rules, copy-on-write of
//! shared containers, auto-vivification of empty bases, and one-level ref
//! indirection resolved at every entry point.
//!
//! Entry points take the VM context (diagnostic sink + runtime flags), a
//! mutable base slot, a key, and a caller-owned scratch cell used to
//! materialize transient results. Read results may alias the container,
//! the scratch cell or the shared null sentinel, and are valid until the
//! next member op on the same base; define-mode results are [`Lval`]s the
//! caller assigns through before touching the base again.

pub mod arrays;
pub mod cell;
pub mod collections;
pub mod objects;
pub mod runtime;
pub mod strings;
pub mod symbol;

pub(crate) mod trace;


pub use arrays::{ArrayData, ArrayKey};
pub use cell::{Cell, RefData, ResourceData, VmError, null_sentinel};
pub use collections::{CollectionData, map_class, new_map, new_vector, vector_class};
pub use objects::{ClassData, ObjectData, SubscriptHandler, Visibility, stdclass};
pub use runtime::elem::{elem, elem_d, elem_u, new_elem, set_elem, set_new_elem};
pub use runtime::incdec::{
    IncDecOp, inc_dec_body, incdec_elem, incdec_new_elem, incdec_prop, incdec_prop_obj,
};
pub use runtime::isset::{isset_empty_elem, unset_elem};
pub use runtime::key::Key;
pub use runtime::lval::Lval;
pub use runtime::prop::{
    isset_empty_prop, isset_empty_prop_obj, null_safe_prop, prop, prop_d, prop_obj, prop_u,
    set_prop, set_prop_obj, unset_prop, unset_prop_obj,
};
pub use runtime::setop::{
    SetOpOp, setop_body, setop_elem, setop_new_elem, setop_prop, setop_prop_obj,
};
pub use runtime::{DiagLevel, Diagnostic, Vm, diag};
pub use strings::StrData;
pub use symbol::Symbol;
