use tsubame::{
    ArrayKey, Cell, DiagLevel, Key, RefData, Vm, elem, elem_d, elem_u, isset_empty_elem, new_elem,
    set_elem, set_new_elem, unset_elem,
};

fn array_of(entries: Vec<(ArrayKey, Cell)>) -> Cell {
    let mut a = tsubame::ArrayData::new();
    for (k, v) in entries {
        a.put(k, v);
    }
    Cell::array(a)
}

#[test]
fn read_hit_returns_the_stored_value() {
    let mut vm = Vm::new();
    let mut base = array_of(vec![(ArrayKey::str("a"), Cell::Int(1))]);
    let mut scratch = Cell::Uninit;
    let got = elem(&mut vm, true, &mut base, &Key::str("a"), &mut scratch).unwrap();
    assert_eq!(got, &Cell::Int(1));
    assert!(vm.take_diagnostics().is_empty());
}

#[test]
fn undefined_index_notice_on_warning_read() {
    let mut vm = Vm::new();
    let mut base = array_of(vec![(ArrayKey::str("a"), Cell::Int(1))]);
    let mut scratch = Cell::Uninit;
    let got = elem(&mut vm, true, &mut base, &Key::str("b"), &mut scratch).unwrap();
    assert_eq!(got, &Cell::Null);

    let diags = vm.take_diagnostics();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].level, DiagLevel::Notice);
    assert_eq!(diags[0].message, "Undefined index: b");

    // No notice when the caller did not ask for warnings.
    let mut scratch = Cell::Uninit;
    let got = elem(&mut vm, false, &mut base, &Key::str("b"), &mut scratch).unwrap();
    assert_eq!(got, &Cell::Null);
    assert!(vm.take_diagnostics().is_empty());
}

#[test]
fn autovivify_through_define_lval() {
    let mut vm = Vm::new();
    let mut base = Cell::Uninit;
    {
        let mut scratch = Cell::Uninit;
        let mut lv = elem_d(&mut vm, true, false, &mut base, &Key::str("x"), &mut scratch).unwrap();
        *lv = Cell::Int(7);
    }
    assert_eq!(
        base,
        array_of(vec![(ArrayKey::str("x"), Cell::Int(7))])
    );
    let diags = vm.take_diagnostics();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].message, "Undefined index: x");

    // warn=false vivifies silently.
    let mut vm = Vm::new();
    let mut base = Cell::Null;
    let mut scratch = Cell::Uninit;
    elem_d(&mut vm, false, false, &mut base, &Key::str("x"), &mut scratch).unwrap();
    assert!(vm.take_diagnostics().is_empty());
}

#[test]
fn false_and_empty_string_bases_also_vivify() {
    for seed in [Cell::Bool(false), Cell::string("")] {
        let mut vm = Vm::new();
        let mut base = seed;
        let mut value = Cell::Int(3);
        set_elem(&mut vm, true, &mut base, &Key::int(0), &mut value).unwrap();
        assert_eq!(base, array_of(vec![(ArrayKey::Int(0), Cell::Int(3))]));
    }
}

#[test]
fn true_bool_base_blocks_promotion() {
    let mut vm = Vm::new();
    let mut base = Cell::Bool(true);
    let mut value = Cell::Int(3);
    set_elem(&mut vm, true, &mut base, &Key::int(0), &mut value).unwrap();
    assert_eq!(base, Cell::Bool(true));
    assert_eq!(value, Cell::Null);
    assert_eq!(
        vm.take_diagnostics()[0].message,
        "Cannot use a scalar value as an array"
    );
}

#[test]
fn cow_on_shared_array() {
    let mut vm = Vm::new();
    let mut a = array_of(vec![
        (ArrayKey::Int(0), Cell::Int(0)),
        (ArrayKey::Int(1), Cell::Int(1)),
        (ArrayKey::Int(2), Cell::Int(2)),
    ]);
    let b = a.clone();

    let mut value = Cell::Int(9);
    set_elem(&mut vm, true, &mut a, &Key::int(1), &mut value).unwrap();

    assert_eq!(
        a,
        array_of(vec![
            (ArrayKey::Int(0), Cell::Int(0)),
            (ArrayKey::Int(1), Cell::Int(9)),
            (ArrayKey::Int(2), Cell::Int(2)),
        ])
    );
    assert_eq!(
        b,
        array_of(vec![
            (ArrayKey::Int(0), Cell::Int(0)),
            (ArrayKey::Int(1), Cell::Int(1)),
            (ArrayKey::Int(2), Cell::Int(2)),
        ])
    );
    let Cell::Array(arc_a) = &a else { unreachable!() };
    let Cell::Array(arc_b) = &b else { unreachable!() };
    assert_eq!(std::sync::Arc::strong_count(arc_a), 1);
    assert_eq!(std::sync::Arc::strong_count(arc_b), 1);
}

#[test]
fn set_on_scalar_base_throws_carrying_null_when_result_unused() {
    let mut vm = Vm::new();
    let mut base = Cell::Int(42);
    let mut value = Cell::Int(5);
    let err = set_elem(&mut vm, false, &mut base, &Key::int(0), &mut value).unwrap_err();
    assert!(err.is_invalid_set());
    assert_eq!(err.into_set_payload(), Some(Cell::Null));
    assert_eq!(base, Cell::Int(42));
    let diags = vm.take_diagnostics();
    assert_eq!(diags[0].level, DiagLevel::Warning);
    assert_eq!(diags[0].message, "Cannot use a scalar value as an array");
}

#[test]
fn illegal_offset_type_nulls_the_rhs() {
    let mut vm = Vm::new();
    let mut base = array_of(vec![(ArrayKey::Int(0), Cell::Int(0))]);
    let mut value = Cell::Int(5);
    let key = Key::any(Cell::empty_array());
    set_elem(&mut vm, true, &mut base, &key, &mut value).unwrap();
    assert_eq!(value, Cell::Null);
    assert_eq!(vm.take_diagnostics()[0].message, "Illegal offset type");

    // With set_result=false it raises the value-carrying error instead.
    let mut value = Cell::Int(5);
    let err = set_elem(&mut vm, false, &mut base, &key, &mut value).unwrap_err();
    assert_eq!(err.into_set_payload(), Some(Cell::Null));
}

#[test]
fn append_assigns_the_next_integer_index() {
    let mut vm = Vm::new();
    let mut base = Cell::Null;
    let mut v1 = Cell::Int(10);
    set_new_elem(&mut vm, true, &mut base, &mut v1).unwrap();
    let mut v2 = Cell::Int(20);
    set_new_elem(&mut vm, true, &mut base, &mut v2).unwrap();
    assert_eq!(
        base,
        array_of(vec![
            (ArrayKey::Int(0), Cell::Int(10)),
            (ArrayKey::Int(1), Cell::Int(20)),
        ])
    );
}

#[test]
fn new_elem_lval_appends_null_and_is_writable() {
    let mut vm = Vm::new();
    let mut base = array_of(vec![(ArrayKey::Int(0), Cell::Int(1))]);
    {
        let mut scratch = Cell::Uninit;
        let mut lv = new_elem(&mut vm, false, &mut base, &mut scratch).unwrap();
        assert_eq!(&*lv, &Cell::Null);
        *lv = Cell::Int(2);
    }
    assert_eq!(
        base,
        array_of(vec![
            (ArrayKey::Int(0), Cell::Int(1)),
            (ArrayKey::Int(1), Cell::Int(2)),
        ])
    );
}

#[test]
fn unset_then_isset_round_trip() {
    let mut vm = Vm::new();
    let mut base = array_of(vec![
        (ArrayKey::str("a"), Cell::Int(1)),
        (ArrayKey::str("b"), Cell::Null),
    ]);

    assert!(isset_empty_elem(&mut vm, false, &mut base, &Key::str("a")).unwrap());
    // Stored null: absent for isset, empty for empty.
    assert!(!isset_empty_elem(&mut vm, false, &mut base, &Key::str("b")).unwrap());
    assert!(isset_empty_elem(&mut vm, true, &mut base, &Key::str("b")).unwrap());

    unset_elem(&mut vm, &mut base, &Key::str("a")).unwrap();
    assert!(!isset_empty_elem(&mut vm, false, &mut base, &Key::str("a")).unwrap());
    assert_eq!(base, array_of(vec![(ArrayKey::str("b"), Cell::Null)]));
}

#[test]
fn unset_on_scalar_bases_is_a_no_op() {
    let mut vm = Vm::new();
    for seed in [Cell::Null, Cell::Bool(true), Cell::Int(3), Cell::Double(1.5)] {
        let mut base = seed.clone();
        unset_elem(&mut vm, &mut base, &Key::int(0)).unwrap();
        assert_eq!(base, seed);
    }
    assert!(vm.take_diagnostics().is_empty());
}

#[test]
fn elem_u_does_not_create_missing_entries() {
    let mut vm = Vm::new();
    let mut base = array_of(vec![(ArrayKey::str("a"), Cell::Int(1))]);
    {
        let mut scratch = Cell::Uninit;
        let lv = elem_u(&mut vm, &mut base, &Key::str("missing"), &mut scratch).unwrap();
        assert_eq!(&*lv, &Cell::Uninit);
    }
    assert_eq!(base, array_of(vec![(ArrayKey::str("a"), Cell::Int(1))]));
}

#[test]
fn ref_bases_unbox_transparently() {
    let mut vm = Vm::new();
    let r = RefData::new(array_of(vec![(ArrayKey::str("k"), Cell::Int(5))]));
    let mut base = Cell::Ref(r.clone());

    let mut scratch = Cell::Uninit;
    let got = elem(&mut vm, true, &mut base, &Key::str("k"), &mut scratch)
        .unwrap()
        .clone();
    assert_eq!(got, Cell::Int(5));

    let mut value = Cell::Int(6);
    set_elem(&mut vm, true, &mut base, &Key::str("k"), &mut value).unwrap();
    assert_eq!(
        r.snapshot(),
        array_of(vec![(ArrayKey::str("k"), Cell::Int(6))])
    );

    // Define lval through the ref writes into the referent.
    {
        let mut scratch = Cell::Uninit;
        let mut lv = elem_d(&mut vm, false, false, &mut base, &Key::str("k2"), &mut scratch)
            .unwrap();
        *lv = Cell::Int(7);
    }
    assert_eq!(
        r.snapshot(),
        array_of(vec![
            (ArrayKey::str("k"), Cell::Int(6)),
            (ArrayKey::str("k2"), Cell::Int(7)),
        ])
    );
}

#[test]
fn ref_to_null_vivifies_inside_the_referent() {
    let mut vm = Vm::new();
    let r = RefData::new(Cell::Null);
    let mut base = Cell::Ref(r.clone());
    let mut value = Cell::Int(1);
    set_elem(&mut vm, true, &mut base, &Key::str("x"), &mut value).unwrap();
    assert!(matches!(base, Cell::Ref(_)));
    assert_eq!(
        r.snapshot(),
        array_of(vec![(ArrayKey::str("x"), Cell::Int(1))])
    );
}

#[test]
fn strict_mode_warns_on_scalar_reads() {
    let mut vm = Vm::with_flags(true, false);
    let mut base = Cell::Int(5);
    let mut scratch = Cell::Uninit;
    let got = elem(&mut vm, false, &mut base, &Key::int(0), &mut scratch).unwrap();
    assert_eq!(got, &Cell::Null);
    assert_eq!(
        vm.take_diagnostics()[0].message,
        "Cannot use a scalar value as an array"
    );

    // Outside strict mode the same read is silent.
    let mut vm = Vm::new();
    let mut scratch = Cell::Uninit;
    elem(&mut vm, false, &mut base, &Key::int(0), &mut scratch).unwrap();
    assert!(vm.take_diagnostics().is_empty());
}
