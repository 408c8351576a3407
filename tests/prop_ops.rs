use tsubame::{
    Cell, ClassData, DiagLevel, Key, ObjectData, RefData, Symbol, Visibility, Vm,
    isset_empty_prop, null_safe_prop, prop, prop_d, set_prop, stdclass, unset_prop,
};

fn fresh_object() -> (Vm, Cell) {
    let vm = Vm::new();
    let obj = ObjectData::new(stdclass());
    (vm, Cell::Object(obj))
}

#[test]
fn read_and_write_a_dynamic_property() {
    let (mut vm, mut base) = fresh_object();
    let mut value = Cell::Int(5);
    set_prop(&mut vm, true, None, &mut base, &Key::str("n"), &mut value).unwrap();

    let mut scratch = Cell::Uninit;
    let got = prop(&mut vm, true, None, &mut base, &Key::str("n"), &mut scratch).unwrap();
    assert_eq!(got, &Cell::Int(5));
    assert!(vm.take_diagnostics().is_empty());
}

#[test]
fn warning_read_of_a_missing_property_notices() {
    let (mut vm, mut base) = fresh_object();
    let mut scratch = Cell::Uninit;
    let got = prop(&mut vm, true, None, &mut base, &Key::str("nope"), &mut scratch).unwrap();
    assert_eq!(got, &Cell::Null);
    let diags = vm.take_diagnostics();
    assert_eq!(diags[0].message, "Undefined property: stdclass::$nope");

    // Silent without warn.
    let mut scratch = Cell::Uninit;
    prop(&mut vm, false, None, &mut base, &Key::str("nope"), &mut scratch).unwrap();
    assert!(vm.take_diagnostics().is_empty());
}

#[test]
fn set_prop_on_null_vivifies_a_default_object() {
    let mut vm = Vm::new();
    let mut base = Cell::Null;
    let mut value = Cell::Int(1);
    set_prop(&mut vm, true, None, &mut base, &Key::str("x"), &mut value).unwrap();

    let Cell::Object(obj) = &base else {
        panic!("expected an object, got {:?}", base)
    };
    assert_eq!(obj.class().name(), "stdclass");
    assert!(obj.prop_isset(None, Symbol::intern("x")));
    let diags = vm.take_diagnostics();
    assert_eq!(diags[0].level, DiagLevel::Warning);
    assert_eq!(diags[0].message, "Creating default object from empty value");
}

#[test]
fn set_prop_on_true_bool_warns_and_nulls_the_rhs() {
    let mut vm = Vm::new();
    let mut base = Cell::Bool(true);
    let mut value = Cell::Int(1);
    set_prop(&mut vm, true, None, &mut base, &Key::str("x"), &mut value).unwrap();
    assert_eq!(base, Cell::Bool(true));
    assert_eq!(value, Cell::Null);
    assert_eq!(
        vm.take_diagnostics()[0].message,
        "Cannot access property on non-object"
    );

    // With the result unused, the value-carrying error fires instead.
    let mut value = Cell::Int(1);
    let err = set_prop(&mut vm, false, None, &mut base, &Key::str("x"), &mut value).unwrap_err();
    assert_eq!(err.into_set_payload(), Some(Cell::Null));
}

#[test]
fn array_bases_never_promote_for_properties() {
    let mut vm = Vm::new();
    let mut base = Cell::empty_array();
    let mut value = Cell::Int(1);
    set_prop(&mut vm, true, None, &mut base, &Key::str("x"), &mut value).unwrap();
    assert!(matches!(base, Cell::Array(_)));
    assert_eq!(
        vm.take_diagnostics()[0].message,
        "Cannot access property on non-object"
    );
}

#[test]
fn bare_define_vivification_warns_only_in_strict_mode() {
    let mut vm = Vm::new();
    let mut base = Cell::Null;
    let mut scratch = Cell::Uninit;
    {
        let mut lv = prop_d(&mut vm, false, None, &mut base, &Key::str("p"), &mut scratch).unwrap();
        *lv = Cell::Int(2);
    }
    assert!(matches!(base, Cell::Object(_)));
    assert!(vm.take_diagnostics().is_empty());

    let mut vm = Vm::with_flags(true, false);
    let mut base = Cell::Null;
    let mut scratch = Cell::Uninit;
    prop_d(&mut vm, false, None, &mut base, &Key::str("p"), &mut scratch).unwrap();
    assert_eq!(
        vm.take_diagnostics()[0].message,
        "Creating default object from empty value"
    );
}

#[test]
fn null_safe_prop_short_circuits_null_bases_silently() {
    let mut vm = Vm::new();
    let mut base = Cell::Null;
    let mut scratch = Cell::Uninit;
    let got = null_safe_prop(&mut vm, None, &mut base, &Key::str("foo"), &mut scratch).unwrap();
    assert_eq!(got, &Cell::Null);
    assert_eq!(base, Cell::Null);
    assert!(vm.take_diagnostics().is_empty());
}

#[test]
fn null_safe_prop_warns_for_other_non_objects() {
    let mut vm = Vm::new();
    let mut base = Cell::Int(3);
    let mut scratch = Cell::Uninit;
    let got = null_safe_prop(&mut vm, None, &mut base, &Key::str("foo"), &mut scratch).unwrap();
    assert_eq!(got, &Cell::Null);
    assert_eq!(
        vm.take_diagnostics()[0].message,
        "Cannot access property on non-object"
    );
}

#[test]
fn isset_empty_and_unset_prop() {
    let (mut vm, mut base) = fresh_object();
    let mut value = Cell::Int(0);
    set_prop(&mut vm, true, None, &mut base, &Key::str("z"), &mut value).unwrap();

    assert!(isset_empty_prop(false, None, &mut base, &Key::str("z")));
    // 0 is falsy, so empty() is true even though isset() is.
    assert!(isset_empty_prop(true, None, &mut base, &Key::str("z")));

    unset_prop(&mut vm, None, &mut base, &Key::str("z")).unwrap();
    assert!(!isset_empty_prop(false, None, &mut base, &Key::str("z")));

    // Unset on a non-object is a quiet no-op.
    let mut scalar = Cell::Int(1);
    unset_prop(&mut vm, None, &mut scalar, &Key::str("z")).unwrap();
    assert!(vm.take_diagnostics().is_empty());
}

#[test]
fn visibility_is_enforced_through_the_ctx_class() {
    let mut vm = Vm::new();
    let class = ClassData::new("Account")
        .declare("balance", Visibility::Private)
        .into_arc();
    let obj = ObjectData::new(class.clone());
    let mut base = Cell::Object(obj);

    let mut value = Cell::Int(100);
    set_prop(
        &mut vm,
        true,
        Some(&class),
        &mut base,
        &Key::str("balance"),
        &mut value,
    )
    .unwrap();

    // Inside the class: readable.
    let mut scratch = Cell::Uninit;
    let got = prop(
        &mut vm,
        false,
        Some(&class),
        &mut base,
        &Key::str("balance"),
        &mut scratch,
    )
    .unwrap();
    assert_eq!(got, &Cell::Int(100));

    // Outside: fatal on read, false on isset.
    let mut scratch = Cell::Uninit;
    let err = prop(
        &mut vm,
        false,
        None,
        &mut base,
        &Key::str("balance"),
        &mut scratch,
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot access private property Account::$balance"
    );
    assert!(!isset_empty_prop(false, None, &mut base, &Key::str("balance")));
}

#[test]
fn prop_ops_resolve_ref_bases() {
    let mut vm = Vm::new();
    let r = RefData::new(Cell::Null);
    let mut base = Cell::Ref(r.clone());
    let mut value = Cell::Int(9);
    set_prop(&mut vm, true, None, &mut base, &Key::str("v"), &mut value).unwrap();

    // The promotion happened inside the referent; the outer slot is still
    // the ref.
    assert!(matches!(base, Cell::Ref(_)));
    let Cell::Object(obj) = r.snapshot() else {
        panic!("referent should be an object")
    };
    assert_eq!(
        obj.read_prop(&mut vm, None, Symbol::intern("v"), false).unwrap(),
        Cell::Int(9)
    );
}

#[test]
fn objects_share_identity_across_aliases() {
    let (mut vm, mut base) = fresh_object();
    let alias = base.clone();
    let mut value = Cell::Int(1);
    set_prop(&mut vm, true, None, &mut base, &Key::str("shared"), &mut value).unwrap();

    let mut alias = alias;
    let mut scratch = Cell::Uninit;
    let got = prop(
        &mut vm,
        false,
        None,
        &mut alias,
        &Key::str("shared"),
        &mut scratch,
    )
    .unwrap();
    assert_eq!(got, &Cell::Int(1));
}

#[test]
fn numeric_property_names_stringify() {
    let mut vm = Vm::new();
    let mut base = Cell::Object(ObjectData::new(stdclass()));
    let mut value = Cell::Int(4);
    set_prop(&mut vm, true, None, &mut base, &Key::int(12), &mut value).unwrap();
    let mut scratch = Cell::Uninit;
    let got = prop(&mut vm, false, None, &mut base, &Key::str("12"), &mut scratch).unwrap();
    assert_eq!(got, &Cell::Int(4));
}
