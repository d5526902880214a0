use finc::diag::Diagnostics;
use finc::macros::MacroExpander;
use finc::sema::{self, ScopeArena};

fn analyze(src: &str) -> Vec<String> {
    let (mut program, parse_diags) = finc::parse_source(src);
    if !parse_diags.is_empty() {
        let mut out = String::new();
        for diag in parse_diags {
            out.push_str(&format!(
                "{:?}: {} ({}..{})\n",
                diag.level, diag.message, diag.span.start, diag.span.end
            ));
        }
        panic!("expected parse success, got diagnostics:\n{out}");
    }
    let mut diags = Diagnostics::default();
    let mut expander = MacroExpander::new(&mut diags);
    expander.expand_program(&mut program);
    let mut arena = ScopeArena::new();
    let _ = sema::analyze_program(&program, &mut arena, &mut diags);
    let mut out = Vec::new();
    for diag in diags.into_vec() {
        out.push(format!("{:?}: {}", diag.level, diag.message));
    }
    out.sort();
    out
}

fn assert_diags(src: &str, expected: &[&str]) {
    let actual = analyze(src);
    let mut expected_sorted: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    expected_sorted.sort();
    assert_eq!(actual, expected_sorted);
}

fn global_symbol_type(src: &str, name: &str) -> String {
    let (program, parse_diags) = finc::parse_source(src);
    assert!(parse_diags.is_empty(), "parse failed: {parse_diags:?}");
    let mut arena = ScopeArena::new();
    let mut diags = Diagnostics::default();
    let analysis = sema::analyze_program(&program, &mut arena, &mut diags);
    assert!(!diags.has_errors(), "unexpected errors: {:?}", diags.into_vec());
    arena
        .resolve(analysis.global_scope, name)
        .unwrap_or_else(|| panic!("no symbol {name}"))
        .ty
        .to_string()
}

#[test]
fn struct_literal_checks_cleanly() {
    let src = r#"
struct Point { x <int>, y <int> }
let p = Point { x: 10, y: 20 };
"#;
    assert_diags(src, &[]);
    assert_eq!(global_symbol_type(src, "p"), "Point");
}

#[test]
fn generic_function_call_with_turbofish() {
    let src = r#"
fun id<T>(v: <T>) <T> { return v; }
let r = id::<int>(5);
"#;
    assert_diags(src, &[]);
    assert_eq!(global_symbol_type(src, "r"), "int");
}

#[test]
fn field_resolves_through_parent_chain() {
    let src = r#"
struct A { pub inherited_field <int> }
struct B : A { }
let b = B { };
let x <int> = b.inherited_field;
"#;
    assert_diags(src, &[]);
}

#[test]
fn break_outside_loop_is_rejected() {
    let src = r#"
fun f() { break; }
"#;
    assert_diags(src, &["Error: 'break' used outside of loop"]);
}

#[test]
fn break_inside_loop_is_fine() {
    let src = r#"
fun g() { while (true) { break; } }
"#;
    assert_diags(src, &[]);
}

#[test]
fn continue_outside_loop_is_rejected() {
    let src = r#"
fun f() { continue; }
"#;
    assert_diags(src, &["Error: 'continue' used outside of loop"]);
}

#[test]
fn initializer_type_mismatch_names_both_types() {
    let src = r#"
let p <int> = "hello";
"#;
    assert_diags(src, &["Error: type mismatch: expected 'int', got 'string'"]);
}

#[test]
fn int_widens_to_float_but_not_back() {
    assert_diags("let f <float> = 1;", &[]);
    assert_diags(
        "let i <int> = 1.5;",
        &["Error: type mismatch: expected 'int', got 'float'"],
    );
}

#[test]
fn fixed_array_widens_to_dynamic_but_not_back() {
    assert_diags("let a <[int]> = [1, 2, 3];", &[]);
    assert_diags(
        r#"
fun f(xs <[int]>) {
    let c <[int; 2]> = xs;
}
"#,
        &["Error: type mismatch: expected '[int; fixed]', got '[int]'"],
    );
}

#[test]
fn empty_array_literal_has_no_element_type() {
    assert_diags(
        "let a <[int]> = [];",
        &["Error: cannot infer the element type of an empty array literal"],
    );
}

#[test]
fn undefined_variable_is_reported() {
    assert_diags("let x = y;", &["Error: undefined variable 'y'"]);
}

#[test]
fn undefined_type_reports_once_without_cascades() {
    assert_diags("let p <Unknown> = 3;", &["Error: undefined type 'Unknown'"]);
}

#[test]
fn private_field_is_sealed_from_outside() {
    let src = r#"
struct S { priv secret <int> }
let s = S { };
let v <int> = s.secret;
"#;
    assert_diags(
        src,
        &["Error: cannot access private field 'secret' of struct 'S'"],
    );
}

#[test]
fn private_field_is_reachable_from_methods() {
    let src = r#"
struct S {
    priv secret <int>,
    fun get() <int> { return self.secret; }
    fun bare() <int> { return secret; }
}
"#;
    assert_diags(src, &[]);
}

#[test]
fn missing_return_path_is_reported() {
    let src = r#"
fun f(c <bool>) <int> { if (c) { return 1; } }
"#;
    assert_diags(
        src,
        &["Error: function 'f' is missing a return statement on some paths"],
    );
}

#[test]
fn both_branches_returning_is_complete() {
    let src = r#"
fun f(c <bool>) <int> { if (c) { return 1; } else { return 2; } }
"#;
    assert_diags(src, &[]);
}

#[test]
fn return_type_is_checked() {
    let src = r#"
fun f() <int> { return "nope"; }
"#;
    assert_diags(src, &["Error: type mismatch: expected 'int', got 'string'"]);
}

#[test]
fn interface_conformance_is_checked_on_parents() {
    let ok = r#"
interface Printable { fun print() <void>; }
struct Doc : Printable { fun print() <void> { } }
"#;
    assert_diags(ok, &[]);

    let broken = r#"
interface Printable { fun print() <void>; }
struct Broken : Printable { }
"#;
    assert_diags(
        broken,
        &["Error: struct 'Broken' does not implement interface 'Printable'"],
    );
}

#[test]
fn destructor_requirement_propagates() {
    let src = r#"
interface Droppable { ~Self(); }
struct Leaky : Droppable { }
"#;
    assert_diags(
        src,
        &["Error: struct 'Leaky' does not implement interface 'Droppable'"],
    );
}

#[test]
fn parent_must_be_struct_or_interface() {
    let src = r#"
struct S : int { }
"#;
    assert_diags(
        src,
        &["Error: parent type 'int' is not a struct or interface"],
    );
}

#[test]
fn recursive_member_requires_indirection() {
    assert_diags(
        "struct Node { next <Node> }",
        &["Error: recursive struct member 'next' must be a pointer"],
    );
    assert_diags("struct Node { next <&Node> }", &[]);
}

#[test]
fn assignment_to_immutable_is_rejected() {
    let src = r#"
const k <int> = 1;
k = 2;
"#;
    assert_diags(src, &["Error: cannot assign to immutable variable 'k'"]);
}

#[test]
fn assignment_target_must_be_lvalue() {
    let src = r#"
fun f() { 1 = 2; }
"#;
    assert_diags(src, &["Error: invalid assignment target"]);
}

#[test]
fn delete_requires_a_pointer() {
    assert_diags(
        r#"
fun f() { let x <int> = 1; delete x; }
"#,
        &["Error: cannot delete non-pointer type 'int'"],
    );
    assert_diags(
        r#"
fun g() { let p <&int> = null; delete p; }
"#,
        &[],
    );
}

#[test]
fn null_is_compatible_with_any_pointer() {
    assert_diags("let p <&int> = null;", &[]);
}

#[test]
fn invalid_cast_is_reported() {
    let src = r#"
fun f(s <string>) {
    let p <&int> = cast<&int>(s);
}
"#;
    assert_diags(src, &["Error: invalid cast from 'string' to '&int'"]);
}

#[test]
fn primitive_casts_are_allowed() {
    assert_diags("let f <float> = cast<float>(3);", &[]);
}

#[test]
fn dereferencing_non_pointer_fails() {
    let src = r#"
fun f(x <int>) { let y <int> = *x; }
"#;
    assert_diags(src, &["Error: cannot dereference non-pointer type 'int'"]);
}

#[test]
fn address_of_and_deref_round_trip() {
    let src = r#"
fun f(x <int>) {
    let p <&int> = &x;
    let y <int> = *p;
}
"#;
    assert_diags(src, &[]);
}

#[test]
fn call_arity_is_checked() {
    let src = r#"
fun add(a <int>, b <int>) <int> { return a + b; }
let r <int> = add(1);
"#;
    assert_diags(src, &["Error: function 'add' expects 2 arguments, got 1"]);
}

#[test]
fn vararg_signatures_skip_arity_checks() {
    let src = r#"
define printf(fmt <string>, ...) <int>;
fun f() { printf("a", 1, 2, 3); }
"#;
    assert_diags(src, &[]);
}

#[test]
fn enum_members_are_flat_symbols() {
    let src = r#"
enum Color { Red, Green = 2, Blue }
let c <Color> = Red;
"#;
    assert_diags(src, &[]);
}

#[test]
fn enum_initializer_must_be_int() {
    assert_diags(
        r#"enum E { A = "x" }"#,
        &["Error: type mismatch: expected 'int', got 'string'"],
    );
}

#[test]
fn operator_overload_takes_precedence() {
    let src = r#"
struct Vec2 {
    pub x <float>,
    pub y <float>,
    operator + (o <Vec2>) <Vec2> { return Vec2 { x: x + o.x, y: y + o.y }; }
}
fun f(a <Vec2>, b <Vec2>) {
    let c <Vec2> = a + b;
}
"#;
    assert_diags(src, &[]);
}

#[test]
fn methods_use_implicit_receiver() {
    let src = r#"
struct Counter {
    priv n <int>,
    fun bump() <int> { n = n + 1; return n; }
}
fun f(c <Counter>) {
    let v <int> = c.bump();
}
"#;
    assert_diags(src, &[]);
}

#[test]
fn method_call_on_primitive_is_rejected() {
    let src = r#"
fun f(x <int>) { x.bump(); }
"#;
    assert_diags(src, &["Error: type 'int' does not have methods"]);
}

#[test]
fn unknown_method_is_reported() {
    let src = r#"
struct S { fun a() <void> { } }
fun f(s <S>) { s.b(); }
"#;
    assert_diags(src, &["Error: method 'b' not found on type 'S'"]);
}

#[test]
fn static_method_calls_resolve_through_the_type() {
    let src = r#"
struct MathUtil { static fun zero() <int> { return 0; } }
let z <int> = MathUtil::zero();
"#;
    assert_diags(src, &[]);
}

#[test]
fn constructors_are_invoked_by_type_name() {
    let src = r#"
struct Point {
    x <int>,
    y <int>,
    Self(x <int>, y <int>) { }
}
let p <Point> = Point(1, 2);
let bad <Point> = Point(1);
"#;
    assert_diags(src, &["Error: function 'Point' expects 2 arguments, got 1"]);
}

#[test]
fn self_call_reaches_own_constructor() {
    let src = r#"
struct Point {
    x <int>,
    y <int>,
    Self(x <int>, y <int>) { }
    static fun origin() <Point> { return Self(0, 0); }
}
"#;
    assert_diags(src, &[]);
}

#[test]
fn lambdas_produce_function_types() {
    let src = r#"
let add = fun (a <int>, b <int>) <int> => a + b;
let r <int> = add(3, 4);
"#;
    assert_diags(src, &[]);
    assert_eq!(
        global_symbol_type(
            "let add = fun (a <int>, b <int>) <int> => a + b;",
            "add"
        ),
        "fun(int, int) -> int"
    );
}

#[test]
fn lambda_body_is_checked_against_return_type() {
    let src = r#"
let bad = fun (a <int>) <int> => "nope";
"#;
    assert_diags(src, &["Error: type mismatch: expected 'int', got 'string'"]);
}

#[test]
fn super_resolves_the_first_parent() {
    let src = r#"
struct Base { pub id <int> }
struct Derived : Base {
    fun base_ref() <Base> { return super; }
}
"#;
    assert_diags(src, &[]);
}

#[test]
fn super_without_parent_is_an_error() {
    let src = r#"
struct Lone {
    fun f() <void> { super(); }
}
"#;
    assert_diags(src, &["Error: struct 'Lone' has no parent"]);
}

#[test]
fn generic_struct_constraint_is_enforced() {
    let src = r#"
interface Shape { fun area() <float>; }
struct Circle { fun area() <float> { return 1.0; } }
struct Blob { }
struct Holder<T: Shape> { v <T> }
let ok = Holder::<Circle> { v: Circle { } };
let bad = Holder::<Blob> { v: Blob { } };
"#;
    assert_diags(
        src,
        &["Error: type 'Blob' does not implement interface 'Shape'"],
    );
}

#[test]
fn unknown_struct_literal_field_is_reported() {
    let src = r#"
struct Point { x <int>, y <int> }
let p = Point { z: 1 };
"#;
    assert_diags(src, &["Error: unknown field 'z' on struct 'Point'"]);
}

#[test]
fn ternary_branches_must_agree() {
    assert_diags("let t <int> = true ? 1 : 2;", &[]);
    assert_diags(
        "let t <int> = true ? 1 : \"two\";",
        &["Error: type mismatch: expected 'int', got 'string'"],
    );
}

#[test]
fn logical_operators_force_bool_operands() {
    let src = r#"
fun f(a <bool>) {
    let x <bool> = a && 1;
}
"#;
    assert_diags(src, &["Error: type mismatch: expected 'bool', got 'int'"]);
}

#[test]
fn comparisons_yield_bool() {
    assert_diags("let b <bool> = 1 < 2;", &[]);
}

#[test]
fn new_expression_yields_a_pointer() {
    let src = r#"
struct Point { x <int>, y <int> }
let p <&Point> = new Point { x: 1, y: 2 };
"#;
    assert_diags(src, &[]);
}

#[test]
fn auto_variables_take_the_initializer_type() {
    assert_eq!(global_symbol_type("let n <auto> = 4;", "n"), "int");
    assert_eq!(
        global_symbol_type("let s <auto> = \"hi\";", "s"),
        "string"
    );
}

#[test]
fn sizeof_is_always_int() {
    assert_diags("let a <int> = sizeof(<int>);", &[]);
    assert_diags("let b <int> = sizeof(3 + 4);", &[]);
}

#[test]
fn foreach_binds_the_loop_variable() {
    let src = r#"
fun sum(xs <[int]>) <int> {
    let total <int> = 0;
    foreach (x <int> in xs) { total = total + x; }
    return total;
}
"#;
    assert_diags(src, &[]);
}

#[test]
fn try_catch_binds_the_catch_variable() {
    let src = r#"
fun risky() <int> {
    try { blame "bad"; } catch (e <string>) { let m <string> = e; }
    return 0;
}
"#;
    assert_diags(src, &[]);
}

#[test]
fn blame_satisfies_return_paths() {
    let src = r#"
fun fail() <int> { blame "always"; }
"#;
    assert_diags(src, &[]);
}

#[test]
fn functions_are_visible_to_recursive_calls() {
    let src = r#"
fun fact(n <int>) <int> {
    if (n < 1) { return 1; } else { return n * fact(n - 1); }
}
"#;
    assert_diags(src, &[]);
}

#[test]
fn macro_calls_expand_before_analysis() {
    let src = r#"
macro twice(x) { x + x; }
let y <int> = $twice(3);
"#;
    assert_diags(src, &[]);
}

#[test]
fn statement_macros_splice_their_body() {
    let src = r#"
macro setup() {
    let a <int> = 1;
    let b <int> = a + 1;
}
fun f() <int> { $setup(); return b; }
"#;
    assert_diags(src, &[]);
}

#[test]
fn undefined_macro_is_reported() {
    assert_diags(
        "fun f() { $nope(); }",
        &["Error: undefined macro 'nope'"],
    );
}

#[test]
fn macro_arity_is_checked() {
    let src = r#"
macro twice(x) { x + x; }
let y <int> = $twice(1, 2);
"#;
    assert_diags(src, &["Error: macro 'twice' expects 1 arguments, got 2"]);
}

#[test]
fn quote_blocks_are_permissively_typed() {
    let src = r#"
fun f() {
    let q = quote { let inner <int> = 1; };
}
"#;
    assert_diags(src, &[]);
}

#[test]
fn indexing_checks_the_index_type() {
    let src = r#"
fun f(xs <[int]>) {
    let a <int> = xs[0];
    let b <int> = xs["one"];
}
"#;
    assert_diags(src, &["Error: type mismatch: expected 'int', got 'string'"]);
}

#[test]
fn errors_accumulate_across_the_walk() {
    let src = r#"
let a <int> = "one";
let b <float> = "two";
fun f() { break; }
"#;
    assert_diags(
        src,
        &[
            "Error: type mismatch: expected 'int', got 'string'",
            "Error: type mismatch: expected 'float', got 'string'",
            "Error: 'break' used outside of loop",
        ],
    );
}
