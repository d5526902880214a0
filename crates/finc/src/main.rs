use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use finc::diag::{Diag, Level};
use finc::loader::ModuleLoader;
use finc::macros::MacroExpander;
use finc::preprocessor::Preprocessor;
use finc::sema;
use finc::sema::scope::ScopeArena;

const USAGE: &str = "usage: finc [--dump-ast] [--debug] [-I DIR] <file.fin>";

fn main() {
    let mut args = env::args().skip(1);
    let mut dump_ast = false;
    let mut debug = false;
    let mut search_paths: Vec<PathBuf> = Vec::new();
    let mut path = None;

    while let Some(arg) = args.next() {
        if arg == "--dump-ast" {
            dump_ast = true;
            continue;
        }
        if arg == "--debug" {
            debug = true;
            continue;
        }
        if arg == "-I" {
            if let Some(dir) = args.next() {
                search_paths.push(PathBuf::from(dir));
            } else {
                eprintln!("-I expects a directory");
                eprintln!("{USAGE}");
                return;
            }
            continue;
        }
        if path.is_none() {
            path = Some(arg);
        } else {
            eprintln!("unexpected argument: {arg}");
            eprintln!("{USAGE}");
            return;
        }
    }

    let path = match path {
        Some(p) => p,
        None => {
            eprintln!("{USAGE}");
            return;
        }
    };

    let src = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("failed to read {path}: {err}");
            process::exit(1);
        }
    };

    let src = Preprocessor::new().process(&src);

    let (mut program, parse_diags) = finc::parse_source(&src);
    if !parse_diags.is_empty() {
        print_diags(&parse_diags, &path);
        process::exit(1);
    }

    let mut diags = finc::diag::Diagnostics::default();
    let mut expander = MacroExpander::new(&mut diags);
    expander.expand_program(&mut program);

    if dump_ast {
        println!("{:#?}", program);
    }

    let mut arena = ScopeArena::new();
    let mut loader = ModuleLoader::new(Path::new(&path));
    for dir in &search_paths {
        loader.add_search_path(dir);
    }
    if let Ok(env_paths) = env::var("FIN_PATH") {
        for dir in env_paths.split(':').filter(|d| !d.is_empty()) {
            loader.add_search_path(Path::new(dir));
        }
    }

    let analysis = sema::analyze_with_loader(
        &program,
        &mut arena,
        &mut diags,
        &mut loader,
        Some(Path::new(&path)),
        debug,
    );

    let had_errors = diags.has_errors();
    print_diags(&diags.into_vec(), &path);
    if analysis.has_error || had_errors {
        process::exit(1);
    }
}

fn print_diags(diags: &[Diag], default_path: &str) {
    for diag in diags {
        let level = match diag.level {
            Level::Error => "error",
            Level::Warning => "warning",
        };
        let path = diag
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| default_path.to_string());
        eprintln!(
            "{level}: {} [{path}:{}..{}]",
            diag.message, diag.span.start, diag.span.end
        );
    }
}
