use finc::ast::BinOp;
use finc::sema::{FnTy, StructTy, Ty};

fn int() -> Ty {
    Ty::primitive("int")
}

fn float() -> Ty {
    Ty::primitive("float")
}

fn array(elem: Ty, fixed: bool) -> Ty {
    Ty::Array {
        elem: Box::new(elem),
        fixed,
    }
}

fn pointer(pointee: Ty) -> Ty {
    Ty::Pointer(Box::new(pointee))
}

fn generic(name: &str) -> Ty {
    Ty::Generic {
        name: name.to_string(),
        constraint: None,
    }
}

#[test]
fn assignability_is_reflexive() {
    let samples = [
        int(),
        float(),
        pointer(int()),
        array(int(), true),
        array(float(), false),
        generic("T"),
        Ty::Function(FnTy::new(vec![int()], float())),
        Ty::Struct(StructTy::new("Point")),
    ];
    for ty in &samples {
        assert!(ty.is_assignable_to(ty), "{ty} should assign to itself");
    }
}

#[test]
fn everything_assigns_to_auto() {
    let auto = Ty::primitive("auto");
    for ty in [int(), pointer(float()), Ty::Struct(StructTy::new("S"))] {
        assert!(ty.is_assignable_to(&auto));
    }
}

#[test]
fn numeric_widening_is_one_way() {
    assert!(int().is_assignable_to(&float()));
    assert!(!float().is_assignable_to(&int()));
}

#[test]
fn array_widening_is_one_way() {
    assert!(array(int(), true).is_assignable_to(&array(int(), false)));
    assert!(!array(int(), false).is_assignable_to(&array(int(), true)));
    assert!(!array(float(), true).is_assignable_to(&array(int(), false)));
}

#[test]
fn void_pointer_is_compatible_both_ways() {
    let void_ptr = pointer(Ty::primitive("void"));
    assert!(void_ptr.is_assignable_to(&pointer(int())));
    assert!(pointer(int()).is_assignable_to(&void_ptr));
    // The pointee relation recurses, so only genuinely incompatible
    // pointees are rejected.
    assert!(!pointer(float()).is_assignable_to(&pointer(int())));
}

#[test]
fn pointer_assignability_recurses_into_pointees() {
    assert!(pointer(int()).is_assignable_to(&pointer(generic("T"))));
    assert!(pointer(pointer(int())).is_assignable_to(&pointer(pointer(int()))));
}

#[test]
fn castability_is_looser_than_assignability() {
    assert!(float().is_castable_to(&int()));
    assert!(pointer(int()).is_castable_to(&pointer(float())));
    assert!(pointer(int()).is_castable_to(&Ty::primitive("long")));
    assert!(generic("T").is_castable_to(&int()));
    assert!(!Ty::primitive("string").is_castable_to(&pointer(int())));
}

#[test]
fn struct_equality_ignores_bodies() {
    let mut a = StructTy::new("Point");
    a.define_field("x", int(), true);
    let b = StructTy::new("Point");
    assert!(Ty::Struct(a).equals(&Ty::Struct(b)));
}

#[test]
fn struct_equality_compares_generic_args() {
    let a = StructTy::with_args("Box", vec![int()]);
    let b = StructTy::with_args("Box", vec![float()]);
    assert!(!Ty::Struct(a.clone()).equals(&Ty::Struct(b)));
    assert!(Ty::Struct(a.clone()).equals(&Ty::Struct(a)));
}

#[test]
fn substitution_reaches_nested_types() {
    let mapping = std::collections::HashMap::from([("T".to_string(), int())]);
    let ty = pointer(array(generic("T"), false));
    assert_eq!(ty.substitute(&mapping).to_string(), "&[int]");

    let fn_ty = Ty::Function(FnTy::new(vec![generic("T")], generic("T")));
    assert_eq!(fn_ty.substitute(&mapping).to_string(), "fun(int) -> int");
}

#[test]
fn instantiation_substitutes_every_registry() {
    let mut boxed = StructTy::with_args("Box", vec![generic("T")]);
    boxed.define_field("value", generic("T"), true);
    boxed.define_field("next", pointer(generic("T")), false);
    boxed.define_method("get", generic("T"));
    boxed.define_operator(BinOp::Add, generic("T"));
    boxed.add_constructor(FnTy::new(vec![generic("T")], Ty::Struct(boxed.head())));

    let concrete = boxed.instantiate(&[int()]).expect("arity matches");
    assert_eq!(Ty::Struct(concrete.clone()).to_string(), "Box<int>");

    let mut rendered = Vec::new();
    for info in concrete.fields.values() {
        rendered.push(info.ty.to_string());
    }
    for ret in concrete.methods.values() {
        rendered.push(ret.to_string());
    }
    for ret in concrete.operators.values() {
        rendered.push(ret.to_string());
    }
    for ctor in &concrete.constructors {
        rendered.push(Ty::Function(ctor.clone()).to_string());
    }
    for text in rendered {
        assert!(!text.contains('T'), "residual generic in {text}");
    }
}

#[test]
fn instantiation_rejects_wrong_arity() {
    let boxed = StructTy::with_args("Box", vec![generic("T")]);
    assert!(boxed.instantiate(&[]).is_none());
    assert!(boxed.instantiate(&[int(), float()]).is_none());
}

#[test]
fn conformance_is_structural() {
    let mut iface = StructTy::new("Printable");
    iface.is_interface = true;
    iface.define_method("print", Ty::primitive("void"));

    // No declared relationship to the interface, only a matching shape.
    let mut doc = StructTy::new("Doc");
    doc.define_method("print", Ty::primitive("void"));
    assert!(doc.implements(&iface));

    let empty = StructTy::new("Empty");
    assert!(!empty.implements(&iface));
}

#[test]
fn conformance_covers_operators_constructors_and_destructors() {
    let mut iface = StructTy::new("Contract");
    iface.is_interface = true;
    iface.define_operator(BinOp::Add, Ty::primitive("void"));
    iface.add_constructor(FnTy::new(vec![int()], Ty::Struct(iface.head())));
    iface.has_destructor = true;

    let mut full = StructTy::new("Full");
    full.define_operator(BinOp::Add, int());
    full.add_constructor(FnTy::new(vec![int()], Ty::Struct(full.head())));
    full.has_destructor = true;
    assert!(full.implements(&iface));

    let mut no_dtor = full.clone();
    no_dtor.has_destructor = false;
    assert!(!no_dtor.implements(&iface));

    let mut wrong_ctor = full.clone();
    wrong_ctor.constructors.clear();
    wrong_ctor.add_constructor(FnTy::new(vec![float()], Ty::Struct(wrong_ctor.head())));
    assert!(!wrong_ctor.implements(&iface));
}

#[test]
fn field_lookup_walks_parents() {
    let mut base = StructTy::new("Base");
    base.define_field("id", int(), true);
    let mut derived = StructTy::new("Derived");
    derived.parents.push(Ty::Struct(base));

    let (owner, info) = derived.field("id").expect("inherited field");
    assert_eq!(owner.name, "Base");
    assert!(info.is_public);
    assert!(derived.field("missing").is_none());
}

#[test]
fn unwrap_struct_peels_wrappers() {
    let point = StructTy::new("Point");
    let wrapped = pointer(Ty::SelfTy(Box::new(Ty::Struct(point.clone()))));
    assert_eq!(wrapped.unwrap_struct().unwrap().name, "Point");

    let constrained = Ty::Generic {
        name: "T".to_string(),
        constraint: Some(Box::new(Ty::Struct(point))),
    };
    assert_eq!(constrained.unwrap_struct().unwrap().name, "Point");

    assert!(int().unwrap_struct().is_none());
}

#[test]
fn rendering_matches_the_canonical_forms() {
    assert_eq!(int().to_string(), "int");
    assert_eq!(pointer(int()).to_string(), "&int");
    assert_eq!(array(int(), false).to_string(), "[int]");
    assert_eq!(array(int(), true).to_string(), "[int; fixed]");
    assert_eq!(
        Ty::Struct(StructTy::with_args("Box", vec![int()])).to_string(),
        "Box<int>"
    );
    let mut sig = FnTy::new(vec![int()], Ty::primitive("void"));
    sig.vararg = true;
    assert_eq!(Ty::Function(sig).to_string(), "fun(int, ...) -> void");
}
