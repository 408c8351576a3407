use tsubame::{
    ArrayData, ArrayKey, Cell, IncDecOp, Key, ObjectData, SetOpOp, Vm, incdec_elem,
    incdec_new_elem, incdec_prop, set_elem, setop_elem, setop_new_elem, setop_prop, stdclass,
};

fn int_array(values: &[i64]) -> Cell {
    let mut a = ArrayData::new();
    for v in values {
        a.push(Cell::Int(*v));
    }
    Cell::array(a)
}

#[test]
fn setop_add_updates_in_place_and_returns_the_result() {
    let mut vm = Vm::new();
    let mut base = int_array(&[5]);
    let got = setop_elem(
        &mut vm,
        SetOpOp::PlusEqual,
        &mut base,
        &Key::int(0),
        &Cell::Int(3),
    )
    .unwrap();
    assert_eq!(got, Cell::Int(8));

    let mut scratch = Cell::Uninit;
    let now = tsubame::elem(&mut vm, false, &mut base, &Key::int(0), &mut scratch).unwrap();
    assert_eq!(now, &Cell::Int(8));
}

#[test]
fn setop_concat_stringifies_both_sides() {
    let mut vm = Vm::new();
    let mut base = int_array(&[7]);
    let got = setop_elem(
        &mut vm,
        SetOpOp::ConcatEqual,
        &mut base,
        &Key::int(0),
        &Cell::string("x"),
    )
    .unwrap();
    assert_eq!(got.to_string_value(), "7x");
}

#[test]
fn setop_on_missing_key_starts_from_null() {
    let mut vm = Vm::new();
    let mut base = Cell::Null;
    let got = setop_elem(
        &mut vm,
        SetOpOp::PlusEqual,
        &mut base,
        &Key::str("n"),
        &Cell::Int(4),
    )
    .unwrap();
    assert_eq!(got, Cell::Int(4));
    assert!(matches!(base, Cell::Array(_)));
    // No undefined-index notice unless the more-warnings build is on.
    assert!(vm.take_diagnostics().is_empty());

    let mut vm = Vm::with_flags(false, true);
    let mut base = Cell::Null;
    setop_elem(
        &mut vm,
        SetOpOp::PlusEqual,
        &mut base,
        &Key::str("n"),
        &Cell::Int(4),
    )
    .unwrap();
    assert_eq!(vm.take_diagnostics()[0].message, "Undefined index: n");
}

#[test]
fn setop_on_scalar_base_warns_and_yields_null() {
    let mut vm = Vm::new();
    let mut base = Cell::Int(9);
    let got = setop_elem(
        &mut vm,
        SetOpOp::PlusEqual,
        &mut base,
        &Key::int(0),
        &Cell::Int(1),
    )
    .unwrap();
    assert_eq!(got, Cell::Null);
    assert_eq!(base, Cell::Int(9));
    assert_eq!(
        vm.take_diagnostics()[0].message,
        "Cannot use a scalar value as an array"
    );
}

#[test]
fn setop_on_nonempty_string_base_is_fatal() {
    let mut vm = Vm::new();
    let mut base = Cell::string("abc");
    let err = setop_elem(
        &mut vm,
        SetOpOp::PlusEqual,
        &mut base,
        &Key::int(0),
        &Cell::Int(1),
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot use assign-op operators with overloaded objects nor string offsets"
    );
}

#[test]
fn division_by_zero_warns_and_produces_false() {
    let mut vm = Vm::new();
    let mut base = int_array(&[10]);
    let got = setop_elem(
        &mut vm,
        SetOpOp::DivEqual,
        &mut base,
        &Key::int(0),
        &Cell::Int(0),
    )
    .unwrap();
    assert_eq!(got, Cell::Bool(false));
    assert_eq!(vm.take_diagnostics()[0].message, "Division by zero");
}

#[test]
fn integer_division_promotes_when_inexact() {
    let mut vm = Vm::new();
    let mut base = int_array(&[7]);
    let got = setop_elem(
        &mut vm,
        SetOpOp::DivEqual,
        &mut base,
        &Key::int(0),
        &Cell::Int(2),
    )
    .unwrap();
    assert_eq!(got, Cell::Double(3.5));

    let mut base = int_array(&[8]);
    let got = setop_elem(
        &mut vm,
        SetOpOp::DivEqual,
        &mut base,
        &Key::int(0),
        &Cell::Int(2),
    )
    .unwrap();
    assert_eq!(got, Cell::Int(4));
}

#[test]
fn overflow_variants_promote_to_double() {
    let mut vm = Vm::new();
    let mut base = int_array(&[i64::MAX]);
    let got = setop_elem(
        &mut vm,
        SetOpOp::PlusEqualO,
        &mut base,
        &Key::int(0),
        &Cell::Int(1),
    )
    .unwrap();
    assert_eq!(got, Cell::Double(i64::MAX as f64 + 1.0));

    // The plain variant wraps.
    let mut base = int_array(&[i64::MAX]);
    let got = setop_elem(
        &mut vm,
        SetOpOp::PlusEqual,
        &mut base,
        &Key::int(0),
        &Cell::Int(1),
    )
    .unwrap();
    assert_eq!(got, Cell::Int(i64::MIN));
}

#[test]
fn setop_new_elem_appends_and_applies() {
    let mut vm = Vm::new();
    let mut base = int_array(&[1]);
    let got = setop_new_elem(&mut vm, SetOpOp::ConcatEqual, &mut base, &Cell::string("t")).unwrap();
    assert_eq!(got.to_string_value(), "t");
    let Cell::Array(a) = &base else { unreachable!() };
    assert_eq!(a.len(), 2);
    assert_eq!(a.get(&ArrayKey::Int(1)).unwrap().to_string_value(), "t");
}

#[test]
fn array_plus_is_union() {
    let mut vm = Vm::new();
    let mut inner = ArrayData::new();
    inner.put(ArrayKey::str("a"), Cell::Int(1));
    let mut outer = ArrayData::new();
    outer.put(ArrayKey::Int(0), Cell::array(inner));
    let mut base = Cell::array(outer);

    let mut rhs = ArrayData::new();
    rhs.put(ArrayKey::str("a"), Cell::Int(99));
    rhs.put(ArrayKey::str("b"), Cell::Int(2));

    let got = setop_elem(
        &mut vm,
        SetOpOp::PlusEqual,
        &mut base,
        &Key::int(0),
        &Cell::array(rhs),
    )
    .unwrap();
    let Cell::Array(a) = got else { unreachable!() };
    // Union keeps the left side's entries.
    assert_eq!(a.get(&ArrayKey::str("a")), Some(&Cell::Int(1)));
    assert_eq!(a.get(&ArrayKey::str("b")), Some(&Cell::Int(2)));
}

#[test]
fn incdec_pre_and_post_differ_only_in_dest() {
    let mut vm = Vm::new();
    let mut base = Cell::Null;
    let mut value = Cell::Int(5);
    set_elem(&mut vm, true, &mut base, &Key::str("n"), &mut value).unwrap();

    let mut dest = Cell::Uninit;
    incdec_elem(&mut vm, IncDecOp::PostInc, &mut base, &Key::str("n"), &mut dest).unwrap();
    assert_eq!(dest, Cell::Int(5));
    let mut scratch = Cell::Uninit;
    assert_eq!(
        tsubame::elem(&mut vm, false, &mut base, &Key::str("n"), &mut scratch).unwrap(),
        &Cell::Int(6)
    );

    let mut dest = Cell::Uninit;
    incdec_elem(&mut vm, IncDecOp::PreInc, &mut base, &Key::str("n"), &mut dest).unwrap();
    assert_eq!(dest, Cell::Int(7));
    let mut scratch = Cell::Uninit;
    assert_eq!(
        tsubame::elem(&mut vm, false, &mut base, &Key::str("n"), &mut scratch).unwrap(),
        &Cell::Int(7)
    );
}

#[test]
fn incdec_overflow_behavior() {
    let mut vm = Vm::new();
    let mut base = int_array(&[i64::MAX]);
    let mut dest = Cell::Uninit;
    incdec_elem(&mut vm, IncDecOp::PreIncO, &mut base, &Key::int(0), &mut dest).unwrap();
    assert_eq!(dest, Cell::Double(i64::MAX as f64 + 1.0));

    let mut base = int_array(&[i64::MAX]);
    let mut dest = Cell::Uninit;
    incdec_elem(&mut vm, IncDecOp::PreInc, &mut base, &Key::int(0), &mut dest).unwrap();
    assert_eq!(dest, Cell::Int(i64::MIN));
}

#[test]
fn incdec_on_null_element_increments_to_one_but_does_not_decrement() {
    let mut vm = Vm::new();
    let mut base = Cell::Null;
    let mut dest = Cell::Uninit;
    incdec_elem(&mut vm, IncDecOp::PreInc, &mut base, &Key::str("a"), &mut dest).unwrap();
    assert_eq!(dest, Cell::Int(1));

    let mut dest = Cell::Uninit;
    incdec_elem(&mut vm, IncDecOp::PreDec, &mut base, &Key::str("b"), &mut dest).unwrap();
    assert_eq!(dest, Cell::Null);
}

#[test]
fn alphanumeric_strings_increment_like_counters() {
    let mut vm = Vm::new();
    for (seed, expect) in [("a", "b"), ("z", "aa"), ("Az", "Ba"), ("a9", "b0")] {
        let mut a = ArrayData::new();
        a.put(ArrayKey::Int(0), Cell::string(seed));
        let mut base = Cell::array(a);
        let mut dest = Cell::Uninit;
        incdec_elem(&mut vm, IncDecOp::PreInc, &mut base, &Key::int(0), &mut dest).unwrap();
        assert_eq!(dest.to_string_value(), expect, "seed {seed:?}");
    }
}

#[test]
fn incdec_new_elem_appends_then_steps() {
    let mut vm = Vm::new();
    let mut base = int_array(&[9]);
    let mut dest = Cell::Uninit;
    incdec_new_elem(&mut vm, IncDecOp::PreInc, &mut base, &mut dest).unwrap();
    // The appended slot starts null, so the step lands on 1.
    assert_eq!(dest, Cell::Int(1));
    let Cell::Array(a) = &base else { unreachable!() };
    assert_eq!(a.get(&ArrayKey::Int(1)), Some(&Cell::Int(1)));
}

#[test]
fn incdec_on_nonempty_string_base_is_fatal() {
    let mut vm = Vm::new();
    let mut base = Cell::string("abc");
    let mut dest = Cell::Uninit;
    let err = incdec_elem(&mut vm, IncDecOp::PreInc, &mut base, &Key::int(0), &mut dest)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot increment/decrement overloaded objects nor string offsets"
    );
}

#[test]
fn setop_prop_and_incdec_prop_on_objects() {
    let mut vm = Vm::new();
    let mut base = Cell::Object(ObjectData::new(stdclass()));
    let got = setop_prop(
        &mut vm,
        SetOpOp::PlusEqual,
        None,
        &mut base,
        &Key::str("n"),
        &Cell::Int(10),
    )
    .unwrap();
    assert_eq!(got, Cell::Int(10));

    let mut dest = Cell::Uninit;
    incdec_prop(
        &mut vm,
        IncDecOp::PostInc,
        None,
        &mut base,
        &Key::str("n"),
        &mut dest,
    )
    .unwrap();
    assert_eq!(dest, Cell::Int(10));

    let mut scratch = Cell::Uninit;
    let now = tsubame::prop(&mut vm, false, None, &mut base, &Key::str("n"), &mut scratch).unwrap();
    assert_eq!(now, &Cell::Int(11));
}

#[test]
fn setop_prop_on_scalar_warns_assign_wording() {
    let mut vm = Vm::new();
    let mut base = Cell::Int(1);
    let got = setop_prop(
        &mut vm,
        SetOpOp::PlusEqual,
        None,
        &mut base,
        &Key::str("n"),
        &Cell::Int(1),
    )
    .unwrap();
    assert_eq!(got, Cell::Null);
    assert_eq!(
        vm.take_diagnostics()[0].message,
        "Attempt to assign property of non-object"
    );

    let mut dest = Cell::Uninit;
    incdec_prop(
        &mut vm,
        IncDecOp::PreInc,
        None,
        &mut base,
        &Key::str("n"),
        &mut dest,
    )
    .unwrap();
    assert_eq!(dest, Cell::Null);
    assert_eq!(
        vm.take_diagnostics()[0].message,
        "Attempt to increment/decrement property of non-object"
    );
}
