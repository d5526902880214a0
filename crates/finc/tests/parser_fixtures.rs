use finc::ast::{ExprKind, Lit, StmtKind, TypeExprKind};

fn parse_ok(src: &str) -> finc::ast::Program {
    let (program, diags) = finc::parse_source(src);
    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
    program
}

fn parse_fails(src: &str) {
    let (_, diags) = finc::parse_source(src);
    assert!(!diags.is_empty(), "expected diagnostics for: {src}");
}

#[test]
fn parses_variable_declarations() {
    let program = parse_ok("let x <int> = 1; const y <float> = 2.0; let z = 3;");
    assert_eq!(program.stmts.len(), 3);
    let StmtKind::Var(decl) = &program.stmts[0].kind else {
        panic!("expected a variable declaration");
    };
    assert_eq!(decl.name.name, "x");
    assert!(decl.is_mutable);
    assert!(decl.ty.is_some());
    let StmtKind::Var(decl) = &program.stmts[1].kind else {
        panic!("expected a variable declaration");
    };
    assert!(!decl.is_mutable);
    let StmtKind::Var(decl) = &program.stmts[2].kind else {
        panic!("expected a variable declaration");
    };
    assert!(decl.ty.is_none());
}

#[test]
fn parses_function_declarations() {
    let program = parse_ok("fun add<T>(a: <T>, b <T>) <T> { return a; }");
    let StmtKind::Fun(decl) = &program.stmts[0].kind else {
        panic!("expected a function");
    };
    assert_eq!(decl.name.name, "add");
    assert_eq!(decl.generics.len(), 1);
    assert_eq!(decl.params.len(), 2);
    assert!(decl.ret.is_some());
    assert!(decl.body.is_some());
}

#[test]
fn parses_struct_declarations() {
    let src = r#"
struct Vec2 : Base, Printable {
    pub x <float>,
    priv y <float> = 0.0,
    fun len() <float> { return x; }
    static fun zero() <Vec2> { return Vec2 { }; }
    operator + (o <Vec2>) <Vec2> { return o; }
    Self(x <float>) { }
    ~Self() { }
}
"#;
    let program = parse_ok(src);
    let StmtKind::Struct(decl) = &program.stmts[0].kind else {
        panic!("expected a struct");
    };
    assert_eq!(decl.name.name, "Vec2");
    assert_eq!(decl.parents.len(), 2);
    assert_eq!(decl.members.len(), 2);
    assert!(decl.members[0].is_public);
    assert!(!decl.members[1].is_public);
    assert!(decl.members[1].default.is_some());
    assert_eq!(decl.methods.len(), 2);
    assert!(decl.methods[1].is_static);
    assert_eq!(decl.operators.len(), 1);
    assert_eq!(decl.constructors.len(), 1);
    assert!(decl.destructor.is_some());
}

#[test]
fn parses_interfaces_as_signatures() {
    let src = r#"
interface Printable {
    fun print() <void>;
    operator == (o <Self>) <bool>;
    Self(tag <int>);
    ~Self();
}
"#;
    let program = parse_ok(src);
    let StmtKind::Interface(decl) = &program.stmts[0].kind else {
        panic!("expected an interface");
    };
    assert_eq!(decl.methods.len(), 1);
    assert!(decl.methods[0].body.is_none());
    assert_eq!(decl.operators.len(), 1);
    assert!(decl.operators[0].body.is_none());
    assert_eq!(decl.constructors.len(), 1);
    assert!(decl.destructor.is_some());
}

#[test]
fn parses_enum_define_and_imports() {
    let src = r#"
enum Color { Red, Green = 2, Blue }
define printf(fmt <string>, ...) <int>;
import std.io;
import "util.fin";
import "lib" as l;
import { Vec, len } from "collections";
"#;
    let program = parse_ok(src);
    assert_eq!(program.stmts.len(), 6);

    let StmtKind::Enum(decl) = &program.stmts[0].kind else {
        panic!("expected an enum");
    };
    assert_eq!(decl.values.len(), 3);
    assert!(decl.values[1].1.is_some());

    let StmtKind::Define(decl) = &program.stmts[1].kind else {
        panic!("expected a define");
    };
    assert!(decl.is_vararg);
    assert_eq!(decl.params.len(), 1);

    let StmtKind::Import(decl) = &program.stmts[2].kind else {
        panic!("expected an import");
    };
    assert!(decl.is_package);
    assert_eq!(decl.source, "std.io");

    let StmtKind::Import(decl) = &program.stmts[3].kind else {
        panic!("expected an import");
    };
    assert!(!decl.is_package);

    let StmtKind::Import(decl) = &program.stmts[4].kind else {
        panic!("expected an import");
    };
    assert_eq!(decl.alias.as_ref().map(|a| a.name.as_str()), Some("l"));

    let StmtKind::Import(decl) = &program.stmts[5].kind else {
        panic!("expected an import");
    };
    assert_eq!(decl.targets.len(), 2);
}

#[test]
fn parses_pointer_array_and_function_types() {
    let program = parse_ok("let a <&&int> = null; let b <[&int; 4]> = null; let c <fun(int, float) <bool>> = null;");
    let StmtKind::Var(decl) = &program.stmts[0].kind else {
        panic!();
    };
    assert_eq!(decl.ty.as_ref().unwrap().pointer_depth(), 2);
    let StmtKind::Var(decl) = &program.stmts[1].kind else {
        panic!();
    };
    let TypeExprKind::Array { size, .. } = &decl.ty.as_ref().unwrap().kind else {
        panic!("expected an array type");
    };
    assert!(size.is_some());
    let StmtKind::Var(decl) = &program.stmts[2].kind else {
        panic!();
    };
    assert!(matches!(
        decl.ty.as_ref().unwrap().kind,
        TypeExprKind::Function { .. }
    ));
}

#[test]
fn distinguishes_calls_struct_literals_and_turbofish() {
    let src = r#"
fun f() {
    g(1, 2);
    g::<int>(1);
    Point { x: 1 };
    Box::<int> { v: 1 };
    Type::method(3);
}
"#;
    let program = parse_ok(src);
    let StmtKind::Fun(decl) = &program.stmts[0].kind else {
        panic!();
    };
    let stmts = &decl.body.as_ref().unwrap().stmts;
    let kinds: Vec<&ExprKind> = stmts
        .iter()
        .map(|stmt| match &stmt.kind {
            StmtKind::Expr(expr) => &expr.kind,
            other => panic!("expected expression statement, got {other:?}"),
        })
        .collect();
    assert!(matches!(kinds[0], ExprKind::Call { generic_args, .. } if generic_args.is_empty()));
    assert!(matches!(kinds[1], ExprKind::Call { generic_args, .. } if generic_args.len() == 1));
    assert!(matches!(kinds[2], ExprKind::StructLit { generic_args, .. } if generic_args.is_empty()));
    assert!(matches!(kinds[3], ExprKind::StructLit { generic_args, .. } if generic_args.len() == 1));
    assert!(matches!(kinds[4], ExprKind::StaticCall { .. }));
}

#[test]
fn parses_control_flow_statements() {
    let src = r#"
fun f(xs <[int]>) <int> {
    for (let i <int> = 0; i < 3; i = i + 1) { continue; }
    foreach (x <int> in xs) { break; }
    while (true) { }
    try { blame "oops"; } catch (e <string>) { }
    if (true) { } else if (false) { } else { }
    delete null;
    return 0;
}
"#;
    let program = parse_ok(src);
    let StmtKind::Fun(decl) = &program.stmts[0].kind else {
        panic!();
    };
    assert_eq!(decl.body.as_ref().unwrap().stmts.len(), 7);
}

#[test]
fn parses_lambdas_and_macros() {
    let src = r#"
macro log(x) { x; }
let f = fun (a <int>) <int> => a;
let g = fun (a <int>) <int> { return a; };
let h = $log(1);
let q = quote { let x <int> = 1; };
"#;
    let program = parse_ok(src);
    assert!(matches!(&program.stmts[0].kind, StmtKind::Macro(_)));
    for idx in [1, 2] {
        let StmtKind::Var(decl) = &program.stmts[idx].kind else {
            panic!();
        };
        assert!(matches!(
            decl.init.as_ref().unwrap().kind,
            ExprKind::Lambda { .. }
        ));
    }
    let StmtKind::Var(decl) = &program.stmts[3].kind else {
        panic!();
    };
    assert!(matches!(
        decl.init.as_ref().unwrap().kind,
        ExprKind::MacroCall { .. }
    ));
    let StmtKind::Var(decl) = &program.stmts[4].kind else {
        panic!();
    };
    assert!(matches!(
        decl.init.as_ref().unwrap().kind,
        ExprKind::Quote { .. }
    ));
}

#[test]
fn parses_literals_and_operator_precedence() {
    let program = parse_ok("let x = 1 + 2 * 3;");
    let StmtKind::Var(decl) = &program.stmts[0].kind else {
        panic!();
    };
    let ExprKind::Binary { op, right, .. } = &decl.init.as_ref().unwrap().kind else {
        panic!("expected a binary expression");
    };
    assert_eq!(*op, finc::ast::BinOp::Add);
    assert!(matches!(right.kind, ExprKind::Binary { .. }));

    let program = parse_ok(r#"let y = 'c'; let s = "text"; let n = null; let b = false;"#);
    let StmtKind::Var(decl) = &program.stmts[0].kind else {
        panic!();
    };
    assert!(matches!(
        decl.init.as_ref().unwrap().kind,
        ExprKind::Literal(Lit::Char('c'))
    ));
}

#[test]
fn recovers_from_malformed_statements() {
    let (program, diags) = finc::parse_source("let = ; fun ok() { }");
    assert!(!diags.is_empty());
    assert!(
        program
            .stmts
            .iter()
            .any(|stmt| matches!(&stmt.kind, StmtKind::Fun(decl) if decl.name.name == "ok"))
    );
}

#[test]
fn rejects_stray_tokens() {
    parse_fails("let x <int> = ;");
    parse_fails("struct { }");
}
