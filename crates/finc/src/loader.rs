use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::diag::Diagnostics;
use crate::lexer;
use crate::macros::MacroExpander;
use crate::parser::Parser;
use crate::preprocessor::Preprocessor;
use crate::sema::check::Analyzer;
use crate::sema::scope::{ScopeArena, ScopeId};
use crate::span::Span;

/// Resolves import paths, runs the full front-end pipeline on each module
/// exactly once, and hands out the analyzed global scope per resolved file.
pub struct ModuleLoader {
    base_dir: PathBuf,
    search_paths: Vec<PathBuf>,
    cache: HashMap<PathBuf, ScopeId>,
    visiting: HashSet<PathBuf>,
}

impl ModuleLoader {
    pub fn new(base: &Path) -> Self {
        let base_dir = if base.is_dir() {
            base.to_path_buf()
        } else {
            base.parent().unwrap_or_else(|| Path::new(".")).to_path_buf()
        };
        Self {
            base_dir,
            search_paths: Vec::new(),
            cache: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    pub fn add_search_path(&mut self, path: &Path) {
        if path.is_dir() {
            self.search_paths.push(path.to_path_buf());
        }
    }

    pub fn load_module(
        &mut self,
        arena: &mut ScopeArena,
        diags: &mut Diagnostics,
        raw_import: &str,
        is_package: bool,
    ) -> Option<ScopeId> {
        let Some(full_path) = self.resolve_path(raw_import, is_package) else {
            return None;
        };
        let key = normalize_path(&full_path);

        if let Some(scope) = self.cache.get(&key) {
            return Some(*scope);
        }
        if self.visiting.contains(&key) {
            diags.error_at_path(key.clone(), Span::default(), "import cycle detected");
            return None;
        }
        self.visiting.insert(key.clone());

        let src = match fs::read_to_string(&key) {
            Ok(src) => src,
            Err(err) => {
                diags.error_at_path(
                    key.clone(),
                    Span::default(),
                    format!("failed to read module: {err}"),
                );
                self.visiting.remove(&key);
                return None;
            }
        };

        let src = Preprocessor::new().process(&src);

        let mut module_diags = Diagnostics::default();
        let tokens = lexer::lex(&src, &mut module_diags);
        let mut parser = Parser::new(&tokens, &mut module_diags);
        let mut program = parser.parse_program();
        if module_diags.has_errors() {
            merge_with_path(diags, module_diags, &key);
            self.visiting.remove(&key);
            return None;
        }

        let mut expander = MacroExpander::new(&mut module_diags);
        expander.expand_program(&mut program);

        let (scope, had_error) = {
            let mut analyzer = Analyzer::new(&mut *arena, &mut *diags, false);
            analyzer.set_path(&key);
            analyzer.set_loader(self);
            analyzer.analyze(&program);
            (analyzer.global_scope(), analyzer.has_error())
        };
        merge_with_path(diags, module_diags, &key);

        self.visiting.remove(&key);
        if had_error {
            return None;
        }

        self.cache.insert(key, scope);
        Some(scope)
    }

    fn resolve_path(&self, raw_import: &str, is_package: bool) -> Option<PathBuf> {
        // Package form: dots become path separators, looked up in the search
        // paths only.
        if is_package {
            let rel = raw_import.replace('.', "/");
            for base in &self.search_paths {
                if let Some(found) = check_candidates(&base.join(&rel)) {
                    return Some(found);
                }
            }
            return None;
        }

        if let Some(found) = check_candidates(&self.base_dir.join(raw_import)) {
            return Some(found);
        }
        let as_path = Path::new(raw_import);
        if as_path.is_absolute() {
            if let Some(found) = check_candidates(as_path) {
                return Some(found);
            }
        }
        for base in &self.search_paths {
            if let Some(found) = check_candidates(&base.join(raw_import)) {
                return Some(found);
            }
        }
        None
    }
}

// A candidate resolves as given, with a .fin extension, as dir/index.fin,
// or as dir/dir.fin.
fn check_candidates(path: &Path) -> Option<PathBuf> {
    if path.exists() && !path.is_dir() {
        return Some(path.to_path_buf());
    }
    let mut with_ext = path.as_os_str().to_owned();
    with_ext.push(".fin");
    let with_ext = PathBuf::from(with_ext);
    if with_ext.exists() {
        return Some(with_ext);
    }
    let index = path.join("index.fin");
    if index.exists() {
        return Some(index);
    }
    if let Some(name) = path.file_name() {
        let mut self_name = name.to_owned();
        self_name.push(".fin");
        let self_file = path.join(self_name);
        if self_file.exists() {
            return Some(self_file);
        }
    }
    None
}

fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn merge_with_path(diags: &mut Diagnostics, module_diags: Diagnostics, path: &Path) {
    let tagged = module_diags
        .into_vec()
        .into_iter()
        .map(|mut diag| {
            if diag.path.is_none() {
                diag.path = Some(path.to_path_buf());
            }
            diag
        })
        .collect();
    diags.extend(tagged);
}
