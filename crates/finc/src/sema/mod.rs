pub mod check;
pub mod scope;
pub mod types;

use std::path::Path;

use crate::ast::Program;
use crate::diag::Diagnostics;
use crate::loader::ModuleLoader;

pub use check::Analyzer;
pub use scope::{ScopeArena, ScopeId, Symbol};
pub use types::{FieldInfo, FnTy, StructTy, Ty};

pub struct Analysis {
    pub global_scope: ScopeId,
    pub has_error: bool,
}

pub fn analyze_program(
    program: &Program,
    arena: &mut ScopeArena,
    diags: &mut Diagnostics,
) -> Analysis {
    let mut analyzer = Analyzer::new(arena, diags, false);
    analyzer.analyze(program);
    Analysis {
        global_scope: analyzer.global_scope(),
        has_error: analyzer.has_error(),
    }
}

pub fn analyze_with_loader(
    program: &Program,
    arena: &mut ScopeArena,
    diags: &mut Diagnostics,
    loader: &mut ModuleLoader,
    path: Option<&Path>,
    debug: bool,
) -> Analysis {
    let mut analyzer = Analyzer::new(arena, diags, debug);
    analyzer.set_loader(loader);
    if let Some(path) = path {
        analyzer.set_path(path);
    }
    analyzer.analyze(program);
    Analysis {
        global_scope: analyzer.global_scope(),
        has_error: analyzer.has_error(),
    }
}
