use std::fs;
use std::path::{Path, PathBuf};

use finc::diag::Diagnostics;
use finc::loader::ModuleLoader;
use finc::sema::{self, ScopeArena};

struct Fixture {
    dir: PathBuf,
}

impl Fixture {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("finc-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create fixture dir");
        Self { dir }
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture subdir");
        }
        fs::write(path, content).expect("write fixture");
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

fn analyze_in(dir: &Path, src: &str, package_root: bool) -> (bool, Vec<String>) {
    let (program, parse_diags) = finc::parse_source(src);
    assert!(parse_diags.is_empty(), "parse failed: {parse_diags:?}");
    let mut arena = ScopeArena::new();
    let mut diags = Diagnostics::default();
    let mut loader = ModuleLoader::new(dir);
    if package_root {
        loader.add_search_path(dir);
    }
    let analysis = sema::analyze_with_loader(&program, &mut arena, &mut diags, &mut loader, None, false);
    let failed = analysis.has_error || diags.has_errors();
    let mut messages: Vec<String> = diags
        .into_vec()
        .into_iter()
        .map(|d| format!("{:?}: {}", d.level, d.message))
        .collect();
    messages.sort();
    (failed, messages)
}

const LIB_SRC: &str = r#"
fun answer() <int> { return 42; }
let count <int> = 7;
struct Vec2 { pub x <int>, pub y <int> }
"#;

#[test]
fn named_imports_copy_symbols_and_types() {
    let fx = Fixture::new("named");
    fx.write("lib.fin", LIB_SRC);
    let (failed, messages) = analyze_in(
        &fx.dir,
        r#"
import { answer, Vec2 } from "lib";
let x <int> = answer();
let v = Vec2 { x: 1, y: 2 };
"#,
        false,
    );
    assert!(!failed, "unexpected diagnostics: {messages:?}");
}

#[test]
fn aliased_imports_bind_a_namespace() {
    let fx = Fixture::new("aliased");
    fx.write("lib.fin", LIB_SRC);
    let (failed, messages) = analyze_in(
        &fx.dir,
        r#"
import "lib" as l;
let n <int> = l.count;
"#,
        false,
    );
    assert!(!failed, "unexpected diagnostics: {messages:?}");
}

#[test]
fn default_alias_comes_from_the_file_stem() {
    let fx = Fixture::new("stem");
    fx.write("util.fin", "let flag <bool> = true;\n");
    let (failed, messages) = analyze_in(
        &fx.dir,
        r#"
import "util.fin";
let f <bool> = util.flag;
"#,
        false,
    );
    assert!(!failed, "unexpected diagnostics: {messages:?}");
}

#[test]
fn package_imports_resolve_through_search_paths() {
    let fx = Fixture::new("package");
    fx.write("std/io.fin", "let version <int> = 1;\n");
    let (failed, messages) = analyze_in(
        &fx.dir,
        r#"
import std.io;
let v <int> = io.version;
"#,
        true,
    );
    assert!(!failed, "unexpected diagnostics: {messages:?}");
}

#[test]
fn missing_exports_are_reported() {
    let fx = Fixture::new("missing-export");
    fx.write("lib.fin", LIB_SRC);
    let (failed, messages) = analyze_in(
        &fx.dir,
        r#"
import { nope } from "lib";
"#,
        false,
    );
    assert!(failed);
    assert!(
        messages
            .iter()
            .any(|m| m.contains("module 'lib' does not export 'nope'")),
        "got: {messages:?}"
    );
}

#[test]
fn unresolved_modules_fail_the_import() {
    let fx = Fixture::new("unresolved");
    let (failed, messages) = analyze_in(&fx.dir, r#"import "ghost";"#, false);
    assert!(failed);
    assert!(
        messages
            .iter()
            .any(|m| m.contains("failed to load module 'ghost'")),
        "got: {messages:?}"
    );
}

#[test]
fn modules_with_semantic_errors_yield_no_bindings() {
    let fx = Fixture::new("bad-module");
    fx.write("bad.fin", "let broken <int> = \"oops\";\n");
    let (failed, messages) = analyze_in(&fx.dir, r#"import "bad" as b;"#, false);
    assert!(failed);
    assert!(
        messages
            .iter()
            .any(|m| m.contains("type mismatch: expected 'int', got 'string'")),
        "got: {messages:?}"
    );
    assert!(
        messages
            .iter()
            .any(|m| m.contains("failed to load module 'bad'")),
        "got: {messages:?}"
    );
}

#[test]
fn import_cycles_are_detected() {
    let fx = Fixture::new("cycle");
    fx.write("a.fin", "import \"b\";\nlet a_val <int> = 1;\n");
    fx.write("b.fin", "import \"a\";\nlet b_val <int> = 2;\n");
    let (failed, messages) = analyze_in(&fx.dir, r#"import "a";"#, false);
    assert!(failed);
    assert!(
        messages.iter().any(|m| m.contains("import cycle detected")),
        "got: {messages:?}"
    );
}

#[test]
fn repeated_imports_reuse_the_cached_scope() {
    let fx = Fixture::new("memoized");
    fx.write("lib.fin", LIB_SRC);
    let (failed, messages) = analyze_in(
        &fx.dir,
        r#"
import "lib" as l1;
import "lib" as l2;
let a <int> = l1.count;
let b <int> = l2.count;
"#,
        false,
    );
    assert!(!failed, "unexpected diagnostics: {messages:?}");
}
