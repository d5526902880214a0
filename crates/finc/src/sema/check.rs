use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ast::{
    Block, Expr, ExprKind, FnDecl, Ident, ImportDecl, LambdaBody, Lit, OperatorDecl, Param,
    Program, SizeofArg, Stmt, StmtKind, StructDecl, TypeExpr, TypeExprKind, UnOp, VarDecl,
};
use crate::ast::BinOp;
use crate::diag::Diagnostics;
use crate::loader::ModuleLoader;
use crate::span::Span;

use super::scope::{ScopeArena, ScopeId, Symbol};
use super::types::{FnTy, StructTy, Ty};

const BUILTIN_PRIMITIVES: &[&str] = &[
    "int", "float", "void", "bool", "string", "auto", "char", "long", "double", "short", "uint",
    "ulong", "ushort", "noret",
];

#[derive(Clone, Default)]
struct AnalysisContext {
    in_loop: bool,
    current_return: Option<Ty>,
}

pub struct Analyzer<'a> {
    arena: &'a mut ScopeArena,
    diags: &'a mut Diagnostics,
    loader: Option<&'a mut ModuleLoader>,
    path: Option<PathBuf>,
    debug: bool,
    global: ScopeId,
    current: ScopeId,
    ctx: AnalysisContext,
    struct_ctx: Option<StructTy>,
    has_error: bool,
}

impl<'a> Analyzer<'a> {
    pub fn new(arena: &'a mut ScopeArena, diags: &'a mut Diagnostics, debug: bool) -> Self {
        let global = arena.alloc(None);
        for name in BUILTIN_PRIMITIVES {
            arena.define_type(global, name, Ty::primitive(name));
        }
        Self {
            arena,
            diags,
            loader: None,
            path: None,
            debug,
            global,
            current: global,
            ctx: AnalysisContext::default(),
            struct_ctx: None,
            has_error: false,
        }
    }

    pub fn set_loader(&mut self, loader: &'a mut ModuleLoader) {
        self.loader = Some(loader);
    }

    pub fn set_path(&mut self, path: &Path) {
        self.path = Some(path.to_path_buf());
    }

    pub fn global_scope(&self) -> ScopeId {
        self.global
    }

    pub fn has_error(&self) -> bool {
        self.has_error
    }

    pub fn analyze(&mut self, program: &Program) {
        for stmt in &program.stmts {
            self.check_stmt(stmt);
        }
    }

    // --- Core helpers ---

    fn enter_scope(&mut self) {
        self.current = self.arena.alloc(Some(self.current));
    }

    fn exit_scope(&mut self) {
        if let Some(parent) = self.arena.parent(self.current) {
            self.current = parent;
        }
    }

    fn error<S: Into<String>>(&mut self, span: Span, message: S) {
        self.has_error = true;
        match &self.path {
            Some(path) => self.diags.error_at_path(path.clone(), span, message),
            None => self.diags.error(span, message),
        }
    }

    fn check_assignable(&mut self, span: Span, actual: &Ty, expected: &Ty) -> bool {
        if actual.is_assignable_to(expected) {
            true
        } else {
            self.error(
                span,
                format!("type mismatch: expected '{expected}', got '{actual}'"),
            );
            false
        }
    }

    fn check_constraint(&mut self, span: Span, actual: &Ty, constraint: &Ty) {
        if let (Ty::Struct(iface), Ty::Struct(actual_struct)) = (constraint, actual) {
            if !actual_struct.implements(iface) {
                self.error(
                    span,
                    format!("type '{actual}' does not implement interface '{constraint}'"),
                );
            }
        }
    }

    fn resolve_type_expr(&mut self, node: &TypeExpr) -> Option<Ty> {
        match &node.kind {
            TypeExprKind::Pointer(inner) => {
                let pointee = self.resolve_type_expr(inner)?;
                Some(Ty::Pointer(Box::new(pointee)))
            }
            TypeExprKind::Array { elem, size } => {
                let elem_ty = self.resolve_type_expr(elem)?;
                if let Some(size) = size {
                    if let Some(size_ty) = self.check_expr(size) {
                        if !size_ty.is_assignable_to(&Ty::primitive("int")) {
                            self.error(size.span, "array size must be an integer");
                        }
                    }
                }
                Some(Ty::Array {
                    elem: Box::new(elem_ty),
                    fixed: size.is_some(),
                })
            }
            TypeExprKind::Function { params, ret } => {
                let mut param_tys = Vec::new();
                for param in params {
                    param_tys.push(self.resolve_type_expr(param)?);
                }
                let ret_ty = match ret {
                    Some(ret) => self.resolve_type_expr(ret)?,
                    None => Ty::primitive("void"),
                };
                Some(Ty::Function(FnTy::new(param_tys, ret_ty)))
            }
            TypeExprKind::Named { name, generics } => {
                let Some(base) = self.arena.resolve_type(self.current, &name.name).cloned() else {
                    self.error(name.span, format!("undefined type '{}'", name.name));
                    return None;
                };
                if generics.is_empty() {
                    return Some(base);
                }
                let mut args = Vec::new();
                for (i, generic) in generics.iter().enumerate() {
                    let Some(arg) = self.resolve_type_expr(generic) else {
                        continue;
                    };
                    if let Ty::Struct(def) = &base {
                        let constraint = match def.generic_args.get(i) {
                            Some(Ty::Generic {
                                constraint: Some(c), ..
                            }) => Some(c.as_ref().clone()),
                            _ => None,
                        };
                        if let Some(constraint) = constraint {
                            self.check_constraint(generic.span, &arg, &constraint);
                        }
                    }
                    args.push(arg);
                }
                match base {
                    Ty::Struct(def) => match def.instantiate(&args) {
                        Some(instantiated) => Some(Ty::Struct(instantiated)),
                        None => {
                            self.error(node.span, "generic argument count mismatch");
                            Some(Ty::Struct(def))
                        }
                    },
                    _ => Some(Ty::Struct(StructTy::with_args(&name.name, args))),
                }
            }
        }
    }

    // --- Declarations ---

    fn check_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Var(decl) => self.check_var_decl(decl),
            StmtKind::Fun(decl) => self.check_fn_decl(decl),
            StmtKind::Struct(decl) => self.check_struct_decl(decl, stmt.span),
            StmtKind::Interface(decl) => self.check_interface_decl(decl),
            StmtKind::Enum(decl) => self.check_enum_decl(decl),
            StmtKind::Define(decl) => self.check_define_decl(decl),
            StmtKind::Import(decl) => self.check_import(decl, stmt.span),
            StmtKind::Macro(decl) => {
                self.arena
                    .define_macro(self.current, &decl.name.name, decl.clone());
            }
            StmtKind::Block(block) => self.check_block(block),
            StmtKind::Return { value } => self.check_return(stmt.span, value.as_ref()),
            StmtKind::Expr(expr) => {
                self.check_expr(expr);
            }
            StmtKind::If {
                cond,
                then_block,
                else_branch,
            } => {
                self.check_expr(cond);
                self.check_block(then_block);
                if let Some(else_branch) = else_branch {
                    self.check_stmt(else_branch);
                }
            }
            StmtKind::While { cond, body } => {
                let prev_loop = self.ctx.in_loop;
                self.ctx.in_loop = true;
                self.check_expr(cond);
                self.check_block(body);
                self.ctx.in_loop = prev_loop;
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                let prev_loop = self.ctx.in_loop;
                self.ctx.in_loop = true;
                self.enter_scope();
                if let Some(init) = init {
                    self.check_stmt(init);
                }
                if let Some(cond) = cond {
                    self.check_expr(cond);
                }
                if let Some(step) = step {
                    self.check_expr(step);
                }
                self.check_block(body);
                self.exit_scope();
                self.ctx.in_loop = prev_loop;
            }
            StmtKind::Foreach {
                var,
                var_ty,
                iter,
                body,
            } => {
                let prev_loop = self.ctx.in_loop;
                self.ctx.in_loop = true;
                self.enter_scope();
                if let Some(ty) = self.resolve_type_expr(var_ty) {
                    self.arena.define(
                        self.current,
                        Symbol {
                            name: var.name.clone(),
                            ty,
                            is_mutable: false,
                            is_initialized: true,
                        },
                    );
                }
                self.check_expr(iter);
                self.check_block(body);
                self.exit_scope();
                self.ctx.in_loop = prev_loop;
            }
            StmtKind::Break => {
                if !self.ctx.in_loop {
                    self.error(stmt.span, "'break' used outside of loop");
                }
            }
            StmtKind::Continue => {
                if !self.ctx.in_loop {
                    self.error(stmt.span, "'continue' used outside of loop");
                }
            }
            StmtKind::Delete { expr } => {
                if let Some(ty) = self.check_expr(expr) {
                    if !matches!(ty, Ty::Pointer(_)) {
                        self.error(expr.span, format!("cannot delete non-pointer type '{ty}'"));
                    }
                }
            }
            StmtKind::TryCatch {
                try_block,
                catch_var,
                catch_ty,
                catch_block,
            } => {
                self.check_block(try_block);
                self.enter_scope();
                if let Some(ty) = self.resolve_type_expr(catch_ty) {
                    self.arena.define(
                        self.current,
                        Symbol {
                            name: catch_var.name.clone(),
                            ty,
                            is_mutable: false,
                            is_initialized: true,
                        },
                    );
                }
                self.check_block(catch_block);
                self.exit_scope();
            }
            StmtKind::Blame { expr } => {
                self.check_expr(expr);
            }
        }
    }

    fn check_var_decl(&mut self, decl: &VarDecl) {
        let declared = match &decl.ty {
            Some(node) => match self.resolve_type_expr(node) {
                Some(ty) => ty,
                None => return,
            },
            None => Ty::primitive("auto"),
        };

        let mut ty = declared;
        if let Some(init) = &decl.init {
            if let Some(init_ty) = self.check_expr(init) {
                if ty.is_auto() {
                    if self.debug {
                        eprintln!("[sema] inferred '{init_ty}' for '{}'", decl.name.name);
                    }
                    ty = init_ty;
                } else {
                    self.check_assignable(init.span, &init_ty, &ty);
                }
            }
        }

        self.arena.define(
            self.current,
            Symbol {
                name: decl.name.name.clone(),
                ty,
                is_mutable: decl.is_mutable,
                is_initialized: decl.init.is_some(),
            },
        );
    }

    fn check_fn_decl(&mut self, decl: &FnDecl) {
        if self.debug {
            eprintln!("[sema] analyzing function '{}'", decl.name.name);
        }
        let prev_ret = self.ctx.current_return.take();
        let enclosing = self.current;
        self.enter_scope();

        for gp in &decl.generics {
            let constraint = gp
                .constraint
                .as_ref()
                .and_then(|c| self.resolve_type_expr(c))
                .map(Box::new);
            self.arena.define_type(
                self.current,
                &gp.name.name,
                Ty::Generic {
                    name: gp.name.name.clone(),
                    constraint,
                },
            );
        }

        let (param_tys, has_self) = self.declare_params(&decl.params);

        // Methods without an explicit receiver get a mutable `self` binding.
        if self.struct_ctx.is_some() && !decl.is_static && !has_self {
            if let Some(self_ty) = self.arena.resolve_type(self.current, "Self").cloned() {
                self.arena.define(
                    self.current,
                    Symbol {
                        name: "self".to_string(),
                        ty: self_ty,
                        is_mutable: true,
                        is_initialized: true,
                    },
                );
            }
        }

        let ret_ty = decl
            .ret
            .as_ref()
            .and_then(|node| self.resolve_type_expr(node))
            .unwrap_or_else(|| Ty::primitive("void"));
        self.ctx.current_return = Some(ret_ty.clone());

        // Registered in the enclosing scope before the body is analyzed so
        // that recursive calls and later siblings can resolve the name.
        self.arena.define(
            enclosing,
            Symbol {
                name: decl.name.name.clone(),
                ty: Ty::Function(FnTy::new(param_tys, ret_ty.clone())),
                is_mutable: false,
                is_initialized: true,
            },
        );

        if let Some(body) = &decl.body {
            self.check_block(body);
            let skip_check = ret_ty.is_void()
                || matches!(&ret_ty, Ty::Primitive(name) if name == "noret");
            if !skip_check && !block_returns(body) {
                self.error(
                    decl.span,
                    format!(
                        "function '{}' is missing a return statement on some paths",
                        decl.name.name
                    ),
                );
            }
        }

        self.exit_scope();
        self.ctx.current_return = prev_ret;
    }

    fn declare_params(&mut self, params: &[Param]) -> (Vec<Ty>, bool) {
        let mut param_tys = Vec::new();
        let mut has_self = false;
        for param in params {
            if param.name.name == "self" {
                has_self = true;
            }
            if let Some(default) = &param.default {
                self.check_expr(default);
            }
            if let Some(ty) = self.resolve_type_expr(&param.ty) {
                self.arena.define(
                    self.current,
                    Symbol {
                        name: param.name.name.clone(),
                        ty: ty.clone(),
                        is_mutable: false,
                        is_initialized: true,
                    },
                );
                param_tys.push(ty);
            }
        }
        (param_tys, has_self)
    }

    fn check_struct_decl(&mut self, decl: &StructDecl, span: Span) {
        if self.debug {
            eprintln!("[sema] analyzing struct '{}'", decl.name.name);
        }
        let enclosing = self.current;
        // Visible immediately, for self-reference and forward reference.
        self.arena.define_type(
            enclosing,
            &decl.name.name,
            Ty::Struct(StructTy::new(&decl.name.name)),
        );
        self.enter_scope();

        let mut struct_ty = StructTy::new(&decl.name.name);

        for gp in &decl.generics {
            let constraint = gp
                .constraint
                .as_ref()
                .and_then(|c| self.resolve_type_expr(c))
                .map(Box::new);
            let gen_ty = Ty::Generic {
                name: gp.name.name.clone(),
                constraint,
            };
            self.arena
                .define_type(self.current, &gp.name.name, gen_ty.clone());
            struct_ty.generic_args.push(gen_ty);
        }

        self.arena.define_type(
            self.current,
            "Self",
            Ty::SelfTy(Box::new(Ty::Struct(struct_ty.head()))),
        );
        // Refresh the forward declaration so self-references see the generic
        // parameter list.
        self.arena
            .define_type(enclosing, &decl.name.name, Ty::Struct(struct_ty.head()));

        for parent_node in &decl.parents {
            if let Some(parent_ty) = self.resolve_type_expr(parent_node) {
                if matches!(parent_ty, Ty::Struct(_)) {
                    struct_ty.parents.push(parent_ty);
                } else {
                    self.error(
                        parent_node.span,
                        format!("parent type '{parent_ty}' is not a struct or interface"),
                    );
                }
            }
        }

        // Pass 1: signatures only, so members and methods can reference each
        // other regardless of declaration order.
        let head = Ty::Struct(struct_ty.head());
        for member in &decl.members {
            let Some(member_ty) = self.resolve_type_expr(&member.ty) else {
                continue;
            };
            if member_ty.equals(&head) && member.ty.pointer_depth() == 0 {
                self.error(
                    member.span,
                    format!(
                        "recursive struct member '{}' must be a pointer",
                        member.name.name
                    ),
                );
            }
            struct_ty.define_field(&member.name.name, member_ty, member.is_public);
        }
        for method in &decl.methods {
            let ret = method
                .ret
                .as_ref()
                .and_then(|node| self.resolve_type_expr(node))
                .unwrap_or_else(|| Ty::primitive("void"));
            struct_ty.define_method(&method.name.name, ret);
        }
        for op in &decl.operators {
            let ret = op
                .ret
                .as_ref()
                .and_then(|node| self.resolve_type_expr(node))
                .unwrap_or_else(|| Ty::primitive("void"));
            struct_ty.define_operator(op.op, ret);
        }
        for ctor in &decl.constructors {
            self.enter_scope();
            let mut params = Vec::new();
            for param in &ctor.params {
                if let Some(ty) = self.resolve_type_expr(&param.ty) {
                    params.push(ty);
                }
            }
            self.exit_scope();
            struct_ty.add_constructor(FnTy::new(params, Ty::Struct(struct_ty.head())));
        }

        // Republish the completed signatures before any body runs.
        self.arena
            .define_type(enclosing, &decl.name.name, Ty::Struct(struct_ty.clone()));
        self.arena.define_type(
            self.current,
            "Self",
            Ty::SelfTy(Box::new(Ty::Struct(struct_ty.clone()))),
        );

        // Pass 2: bodies.
        let prev_struct = self.struct_ctx.take();
        self.struct_ctx = Some(struct_ty.clone());

        for member in &decl.members {
            if let Some(default) = &member.default {
                if let Some(default_ty) = self.check_expr(default) {
                    let expected = struct_ty
                        .field(&member.name.name)
                        .map(|(_, info)| info.ty.clone());
                    if let Some(expected) = expected {
                        self.check_assignable(default.span, &default_ty, &expected);
                    }
                }
            }
        }
        for method in &decl.methods {
            self.check_fn_decl(method);
        }
        for op in &decl.operators {
            self.check_operator_body(op, &struct_ty);
        }
        for ctor in &decl.constructors {
            self.enter_scope();
            for param in &ctor.params {
                if let Some(ty) = self.resolve_type_expr(&param.ty) {
                    self.arena.define(
                        self.current,
                        Symbol {
                            name: param.name.name.clone(),
                            ty,
                            is_mutable: false,
                            is_initialized: true,
                        },
                    );
                }
            }
            self.define_self_symbol(&struct_ty);
            if let Some(body) = &ctor.body {
                self.check_block(body);
            }
            self.exit_scope();
        }
        if let Some(dtor) = &decl.destructor {
            struct_ty.has_destructor = true;
            self.enter_scope();
            self.define_self_symbol(&struct_ty);
            if let Some(body) = &dtor.body {
                self.check_block(body);
            }
            self.exit_scope();
        }

        self.arena
            .define_type(enclosing, &decl.name.name, Ty::Struct(struct_ty.clone()));

        for parent in struct_ty.parents.clone() {
            if let Ty::Struct(p) = parent {
                if p.is_interface && !struct_ty.implements(&p) {
                    self.error(
                        span,
                        format!(
                            "struct '{}' does not implement interface '{}'",
                            decl.name.name, p.name
                        ),
                    );
                }
            }
        }

        self.struct_ctx = prev_struct;
        self.exit_scope();
    }

    fn define_self_symbol(&mut self, struct_ty: &StructTy) {
        self.arena.define(
            self.current,
            Symbol {
                name: "self".to_string(),
                ty: Ty::Struct(struct_ty.clone()),
                is_mutable: true,
                is_initialized: true,
            },
        );
    }

    fn check_operator_body(&mut self, op: &OperatorDecl, struct_ty: &StructTy) {
        self.enter_scope();
        for gp in &op.generics {
            let constraint = gp
                .constraint
                .as_ref()
                .and_then(|c| self.resolve_type_expr(c))
                .map(Box::new);
            self.arena.define_type(
                self.current,
                &gp.name.name,
                Ty::Generic {
                    name: gp.name.name.clone(),
                    constraint,
                },
            );
        }
        for param in &op.params {
            if let Some(ty) = self.resolve_type_expr(&param.ty) {
                self.arena.define(
                    self.current,
                    Symbol {
                        name: param.name.name.clone(),
                        ty,
                        is_mutable: false,
                        is_initialized: true,
                    },
                );
            }
        }
        self.define_self_symbol(struct_ty);

        let ret_ty = op
            .ret
            .as_ref()
            .and_then(|node| self.resolve_type_expr(node))
            .unwrap_or_else(|| Ty::primitive("void"));

        if let Some(body) = &op.body {
            let prev_ret = self.ctx.current_return.take();
            self.ctx.current_return = Some(ret_ty);
            self.check_block(body);
            self.ctx.current_return = prev_ret;
        }
        self.exit_scope();
    }

    fn check_interface_decl(&mut self, decl: &StructDecl) {
        let enclosing = self.current;
        let mut iface = StructTy::new(&decl.name.name);
        iface.is_interface = true;
        self.arena
            .define_type(enclosing, &decl.name.name, Ty::Struct(iface.head()));
        self.enter_scope();

        for gp in &decl.generics {
            let constraint = gp
                .constraint
                .as_ref()
                .and_then(|c| self.resolve_type_expr(c))
                .map(Box::new);
            self.arena.define_type(
                self.current,
                &gp.name.name,
                Ty::Generic {
                    name: gp.name.name.clone(),
                    constraint,
                },
            );
        }
        self.arena
            .define_type(self.current, "Self", Ty::Struct(iface.head()));

        for member in &decl.members {
            self.resolve_type_expr(&member.ty);
        }
        for method in &decl.methods {
            self.enter_scope();
            for param in &method.params {
                self.resolve_type_expr(&param.ty);
            }
            let ret = method
                .ret
                .as_ref()
                .and_then(|node| self.resolve_type_expr(node))
                .unwrap_or_else(|| Ty::primitive("void"));
            iface.define_method(&method.name.name, ret);
            self.exit_scope();
        }
        for op in &decl.operators {
            self.enter_scope();
            for param in &op.params {
                self.resolve_type_expr(&param.ty);
            }
            let ret = op
                .ret
                .as_ref()
                .and_then(|node| self.resolve_type_expr(node))
                .unwrap_or_else(|| Ty::primitive("void"));
            iface.define_operator(op.op, ret);
            self.exit_scope();
        }
        for ctor in &decl.constructors {
            self.enter_scope();
            let mut params = Vec::new();
            for param in &ctor.params {
                if let Some(ty) = self.resolve_type_expr(&param.ty) {
                    params.push(ty);
                }
            }
            self.exit_scope();
            iface.add_constructor(FnTy::new(params, Ty::Struct(iface.head())));
        }
        if decl.destructor.is_some() {
            iface.has_destructor = true;
        }

        self.arena
            .define_type(enclosing, &decl.name.name, Ty::Struct(iface));
        self.exit_scope();
    }

    fn check_enum_decl(&mut self, decl: &crate::ast::EnumDecl) {
        let enum_ty = Ty::Primitive(decl.name.name.clone());
        self.arena
            .define_type(self.current, &decl.name.name, enum_ty.clone());

        for (member, init) in &decl.values {
            if let Some(init) = init {
                if let Some(init_ty) = self.check_expr(init) {
                    self.check_assignable(init.span, &init_ty, &Ty::primitive("int"));
                }
            }
            self.arena.define(
                self.current,
                Symbol {
                    name: member.name.clone(),
                    ty: enum_ty.clone(),
                    is_mutable: false,
                    is_initialized: true,
                },
            );
        }
    }

    fn check_define_decl(&mut self, decl: &crate::ast::DefineDecl) {
        let Some(ret_ty) = decl
            .ret
            .as_ref()
            .map(|node| self.resolve_type_expr(node))
            .unwrap_or_else(|| Some(Ty::primitive("void")))
        else {
            return;
        };

        let mut params = Vec::new();
        for param in &decl.params {
            if let Some(ty) = self.resolve_type_expr(&param.ty) {
                params.push(ty);
            }
        }

        let mut sig = FnTy::new(params, ret_ty);
        sig.vararg = decl.is_vararg;
        self.arena.define(
            self.current,
            Symbol {
                name: decl.name.name.clone(),
                ty: Ty::Function(sig),
                is_mutable: false,
                is_initialized: true,
            },
        );
    }

    fn check_import(&mut self, decl: &ImportDecl, span: Span) {
        let Some(loader) = self.loader.as_deref_mut() else {
            return;
        };
        let module_scope = loader.load_module(
            &mut *self.arena,
            &mut *self.diags,
            &decl.source,
            decl.is_package,
        );
        let Some(module_scope) = module_scope else {
            self.error(span, format!("failed to load module '{}'", decl.source));
            return;
        };

        // Named imports copy the selected bindings into this scope.
        if !decl.targets.is_empty() {
            for target in &decl.targets {
                let mut found = false;
                if let Some(sym) = self.arena.resolve(module_scope, &target.name).cloned() {
                    self.arena.define(self.current, sym);
                    found = true;
                }
                if let Some(ty) = self.arena.resolve_type(module_scope, &target.name).cloned() {
                    self.arena.define_type(self.current, &target.name, ty);
                    found = true;
                }
                if !found {
                    self.error(
                        target.span,
                        format!(
                            "module '{}' does not export '{}'",
                            decl.source, target.name
                        ),
                    );
                }
            }
            return;
        }

        let alias = match &decl.alias {
            Some(ident) => ident.name.clone(),
            None if decl.is_package => decl
                .source
                .rsplit('.')
                .next()
                .unwrap_or(&decl.source)
                .to_string(),
            None => Path::new(&decl.source)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| decl.source.clone()),
        };
        if self.debug {
            eprintln!("[sema] module '{}' bound as '{alias}'", decl.source);
        }
        self.arena.define(
            self.current,
            Symbol {
                name: alias.clone(),
                ty: Ty::Namespace {
                    name: alias,
                    scope: module_scope,
                },
                is_mutable: false,
                is_initialized: true,
            },
        );
    }

    // --- Statements ---

    fn check_block(&mut self, block: &Block) {
        self.enter_scope();
        for stmt in &block.stmts {
            self.check_stmt(stmt);
        }
        self.exit_scope();
    }

    fn check_return(&mut self, span: Span, value: Option<&Expr>) {
        match value {
            Some(expr) => {
                let value_ty = self.check_expr(expr);
                if let (Some(value_ty), Some(expected)) =
                    (value_ty, self.ctx.current_return.clone())
                {
                    self.check_assignable(expr.span, &value_ty, &expected);
                }
            }
            None => {
                if let Some(expected) = self.ctx.current_return.clone() {
                    self.check_assignable(span, &Ty::primitive("void"), &expected);
                }
            }
        }
    }

    // --- Expressions ---

    fn check_expr(&mut self, expr: &Expr) -> Option<Ty> {
        match &expr.kind {
            ExprKind::Literal(lit) => Some(match lit {
                Lit::Int(_) => Ty::primitive("int"),
                Lit::Float(_) => Ty::primitive("float"),
                Lit::Str(_) => Ty::primitive("string"),
                Lit::Char(_) => Ty::primitive("char"),
                Lit::Bool(_) => Ty::primitive("bool"),
                Lit::Null => Ty::Pointer(Box::new(Ty::primitive("void"))),
            }),
            ExprKind::Ident(ident) => self.check_ident(ident),
            ExprKind::Binary { op, left, right } => self.check_binary(*op, left, right),
            ExprKind::Unary { op, expr: inner } => self.check_unary(expr.span, *op, inner),
            ExprKind::Call {
                name,
                generic_args,
                args,
            } => self.check_call(expr.span, name, generic_args, args),
            ExprKind::MethodCall { recv, name, args } => self.check_method_call(recv, name, args),
            ExprKind::StaticCall { ty, name, args } => self.check_static_call(ty, name, args),
            ExprKind::Member { object, name } => self.check_member(object, name),
            ExprKind::StructLit {
                name,
                generic_args,
                fields,
            } => self.check_struct_lit(expr.span, name, generic_args, fields),
            ExprKind::New {
                ty,
                args,
                init_fields,
            } => {
                for arg in args {
                    self.check_expr(arg);
                }
                for (_, value) in init_fields {
                    self.check_expr(value);
                }
                let allocated = self.resolve_type_expr(ty)?;
                Some(Ty::Pointer(Box::new(allocated)))
            }
            ExprKind::ArrayLit(items) => self.check_array_lit(expr.span, items),
            ExprKind::Index { base, index } => self.check_index(base, index),
            ExprKind::Cast { ty, expr: inner } => self.check_cast(expr.span, ty, inner),
            ExprKind::Sizeof(arg) => {
                match arg {
                    SizeofArg::Type(node) => {
                        self.resolve_type_expr(node);
                    }
                    SizeofArg::Expr(inner) => {
                        self.check_expr(inner);
                    }
                }
                Some(Ty::primitive("int"))
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.check_expr(cond);
                let then_ty = self.check_expr(then_expr);
                let else_ty = self.check_expr(else_expr);
                if let (Some(then_ty), Some(else_ty)) = (&then_ty, &else_ty) {
                    self.check_assignable(else_expr.span, else_ty, then_ty);
                }
                then_ty
            }
            ExprKind::Lambda { params, ret, body } => self.check_lambda(params, ret.as_ref(), body),
            ExprKind::Super {
                parent,
                args,
                init_fields,
            } => self.check_super(expr.span, parent.as_ref(), args, init_fields),
            ExprKind::MacroCall { args, .. } => {
                for arg in args {
                    self.check_expr(arg);
                }
                Some(Ty::primitive("auto"))
            }
            ExprKind::MacroInvoke { body, .. } => {
                self.check_block(body);
                Some(Ty::primitive("void"))
            }
            ExprKind::Quote { body } => {
                self.check_block(body);
                Some(Ty::primitive("auto"))
            }
        }
    }

    fn check_ident(&mut self, ident: &Ident) -> Option<Ty> {
        if let Some(ty) = self
            .arena
            .resolve(self.current, &ident.name)
            .map(|sym| sym.ty.clone())
        {
            return Some(ty);
        }
        // Inside a struct body, a bare name may be `self.name` sugar.
        if let Some(field_ty) = self
            .struct_ctx
            .as_ref()
            .and_then(|ctx| ctx.field(&ident.name))
            .map(|(_, info)| info.ty.clone())
        {
            return Some(field_ty);
        }
        self.error(ident.span, format!("undefined variable '{}'", ident.name));
        None
    }

    fn check_binary(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Option<Ty> {
        if op.is_assignment() {
            let is_lvalue = matches!(
                &left.kind,
                ExprKind::Ident(_)
                    | ExprKind::Member { .. }
                    | ExprKind::Index { .. }
                    | ExprKind::Unary {
                        op: UnOp::Deref,
                        ..
                    }
            );
            if !is_lvalue {
                self.error(left.span, "invalid assignment target");
            } else if let ExprKind::Ident(ident) = &left.kind {
                let immutable = self
                    .arena
                    .resolve(self.current, &ident.name)
                    .map(|sym| !sym.is_mutable)
                    .unwrap_or(false);
                if immutable {
                    self.error(
                        ident.span,
                        format!("cannot assign to immutable variable '{}'", ident.name),
                    );
                }
            }
            let left_ty = self.check_expr(left);
            let right_ty = self.check_expr(right);
            if let (Some(left_ty), Some(right_ty)) = (&left_ty, &right_ty) {
                self.check_assignable(right.span, right_ty, left_ty);
            }
            return left_ty;
        }

        let left_ty = self.check_expr(left);
        let right_ty = self.check_expr(right);

        // An operator overload on the left operand's struct takes precedence
        // over the built-in rules.
        if let Some(ret) = left_ty
            .as_ref()
            .and_then(|ty| ty.unwrap_struct())
            .and_then(|s| s.operator_ret(op))
            .cloned()
        {
            return Some(ret);
        }

        if op.is_logical() {
            let bool_ty = Ty::primitive("bool");
            if let Some(left_ty) = &left_ty {
                self.check_assignable(left.span, left_ty, &bool_ty);
            }
            if let Some(right_ty) = &right_ty {
                self.check_assignable(right.span, right_ty, &bool_ty);
            }
            return Some(bool_ty);
        }

        if op.is_comparison() {
            if let (Some(left_ty), Some(right_ty)) = (&left_ty, &right_ty) {
                self.check_assignable(right.span, right_ty, left_ty);
            }
            return Some(Ty::primitive("bool"));
        }

        if let (Some(left_inner), Some(right_inner)) = (&left_ty, &right_ty) {
            if !self.check_assignable(right.span, right_inner, left_inner) {
                return None;
            }
        }
        left_ty
    }

    fn check_unary(&mut self, span: Span, op: UnOp, inner: &Expr) -> Option<Ty> {
        let inner_ty = self.check_expr(inner)?;
        match op {
            UnOp::Ref => Some(Ty::Pointer(Box::new(inner_ty))),
            UnOp::Deref => match inner_ty {
                Ty::Pointer(pointee) => Some(*pointee),
                other => {
                    self.error(
                        span,
                        format!("cannot dereference non-pointer type '{other}'"),
                    );
                    None
                }
            },
            UnOp::Neg | UnOp::Not => Some(inner_ty),
        }
    }

    fn check_call_args(&mut self, span: Span, callee: &str, sig: &FnTy, args: &[Expr]) {
        if !sig.vararg && args.len() != sig.params.len() {
            self.error(
                span,
                format!(
                    "function '{callee}' expects {} arguments, got {}",
                    sig.params.len(),
                    args.len()
                ),
            );
        }
        for (i, arg) in args.iter().enumerate() {
            let arg_ty = self.check_expr(arg);
            if let (Some(arg_ty), Some(param_ty)) = (arg_ty, sig.params.get(i)) {
                let param_ty = param_ty.clone();
                self.check_assignable(arg.span, &arg_ty, &param_ty);
            }
        }
    }

    fn check_call(
        &mut self,
        span: Span,
        name: &Ident,
        generic_args: &[TypeExpr],
        args: &[Expr],
    ) -> Option<Ty> {
        // A `Self(...)` call inside a struct body targets the first declared
        // constructor of the enclosing struct.
        if name.name == "Self" {
            let Some(struct_ctx) = self.struct_ctx.clone() else {
                self.error(name.span, "'Self' used outside of a struct");
                return None;
            };
            let sig = struct_ctx
                .constructors
                .first()
                .cloned()
                .unwrap_or_else(|| FnTy::new(Vec::new(), Ty::Struct(struct_ctx.head())));
            self.check_call_args(span, &struct_ctx.name, &sig, args);
            return Some(Ty::Struct(struct_ctx));
        }

        // A name bound to a type is a constructor call.
        if let Some(ty) = self.arena.resolve_type(self.current, &name.name).cloned() {
            if let Ty::Struct(s) = &ty {
                let sig = s
                    .constructors
                    .first()
                    .cloned()
                    .unwrap_or_else(|| FnTy::new(Vec::new(), Ty::Struct(s.head())));
                self.check_call_args(span, &name.name, &sig, args);
                return Some(ty);
            }
            self.error(name.span, format!("type '{ty}' cannot be constructed"));
            return None;
        }

        let Some(sym_ty) = self
            .arena
            .resolve(self.current, &name.name)
            .map(|sym| sym.ty.clone())
        else {
            self.error(name.span, format!("undefined function '{}'", name.name));
            for arg in args {
                self.check_expr(arg);
            }
            return None;
        };
        let Ty::Function(mut sig) = sym_ty else {
            self.error(name.span, format!("'{}' is not a function", name.name));
            return None;
        };

        if !generic_args.is_empty() {
            let mut resolved = Vec::new();
            for node in generic_args {
                if let Some(ty) = self.resolve_type_expr(node) {
                    resolved.push(ty);
                }
            }
            let names = generic_names_in(&sig);
            if resolved.len() != names.len() {
                self.error(span, "generic argument count mismatch");
            } else {
                let mapping: HashMap<String, Ty> =
                    names.into_iter().zip(resolved).collect();
                sig = sig.substitute(&mapping);
            }
        }

        self.check_call_args(span, &name.name, &sig, args);
        Some((*sig.ret).clone())
    }

    fn check_method_call(&mut self, recv: &Expr, name: &Ident, args: &[Expr]) -> Option<Ty> {
        let recv_ty = self.check_expr(recv)?;
        let lookup = recv_ty
            .unwrap_struct()
            .map(|s| s.method_ret(&name.name).cloned());
        for arg in args {
            self.check_expr(arg);
        }
        match lookup {
            None => {
                self.error(
                    recv.span,
                    format!("type '{recv_ty}' does not have methods"),
                );
                None
            }
            Some(None) => {
                self.error(
                    name.span,
                    format!("method '{}' not found on type '{recv_ty}'", name.name),
                );
                None
            }
            Some(Some(ret)) => Some(ret),
        }
    }

    fn check_static_call(&mut self, ty: &TypeExpr, name: &Ident, args: &[Expr]) -> Option<Ty> {
        let target = self.resolve_type_expr(ty)?;
        let lookup = target
            .unwrap_struct()
            .and_then(|s| s.method_ret(&name.name).cloned());
        for arg in args {
            self.check_expr(arg);
        }
        match lookup {
            Some(ret) => Some(ret),
            None => {
                self.error(
                    name.span,
                    format!("method '{}' not found on type '{target}'", name.name),
                );
                None
            }
        }
    }

    fn check_member(&mut self, object: &Expr, name: &Ident) -> Option<Ty> {
        let obj_ty = self.check_expr(object)?;

        if let Ty::Namespace {
            name: ns_name,
            scope,
        } = &obj_ty
        {
            let found = self
                .arena
                .resolve(*scope, &name.name)
                .map(|sym| sym.ty.clone());
            let ns_name = ns_name.clone();
            return match found {
                Some(ty) => Some(ty),
                None => {
                    self.error(
                        name.span,
                        format!("module '{ns_name}' has no export '{}'", name.name),
                    );
                    None
                }
            };
        }

        let Some(s) = obj_ty.unwrap_struct() else {
            self.error(object.span, format!("type '{obj_ty}' has no fields"));
            return None;
        };
        let field = s
            .field(&name.name)
            .map(|(owner, info)| (owner.head(), info.ty.clone(), info.is_public));
        let Some((owner, field_ty, is_public)) = field else {
            self.error(
                name.span,
                format!("unknown field '{}' on type '{obj_ty}'", name.name),
            );
            return None;
        };

        // Private fields are reachable only from methods of the owning struct.
        let inside_owner = self
            .struct_ctx
            .as_ref()
            .map(|ctx| ctx.same_instantiation(&owner))
            .unwrap_or(false);
        if !is_public && !inside_owner {
            self.error(
                name.span,
                format!(
                    "cannot access private field '{}' of struct '{}'",
                    name.name, owner.name
                ),
            );
        }
        Some(field_ty)
    }

    fn check_struct_lit(
        &mut self,
        span: Span,
        name: &Ident,
        generic_args: &[TypeExpr],
        fields: &[(Ident, Expr)],
    ) -> Option<Ty> {
        let Some(base) = self.arena.resolve_type(self.current, &name.name).cloned() else {
            self.error(name.span, format!("undefined struct '{}'", name.name));
            for (_, value) in fields {
                self.check_expr(value);
            }
            return None;
        };
        let Ty::Struct(base_struct) = base else {
            self.error(name.span, format!("'{}' is not a struct", name.name));
            return None;
        };

        let struct_ty = if generic_args.is_empty() {
            base_struct
        } else {
            let mut resolved = Vec::new();
            for (i, node) in generic_args.iter().enumerate() {
                let Some(arg) = self.resolve_type_expr(node) else {
                    continue;
                };
                let constraint = match base_struct.generic_args.get(i) {
                    Some(Ty::Generic {
                        constraint: Some(c), ..
                    }) => Some(c.as_ref().clone()),
                    _ => None,
                };
                if let Some(constraint) = constraint {
                    self.check_constraint(node.span, &arg, &constraint);
                }
                resolved.push(arg);
            }
            match base_struct.instantiate(&resolved) {
                Some(instantiated) => instantiated,
                None => {
                    self.error(span, "generic argument count mismatch");
                    base_struct
                }
            }
        };

        for (field_name, value) in fields {
            let value_ty = self.check_expr(value);
            let expected = struct_ty
                .field(&field_name.name)
                .map(|(_, info)| info.ty.clone());
            match (value_ty, expected) {
                (Some(value_ty), Some(expected)) => {
                    self.check_assignable(value.span, &value_ty, &expected);
                }
                (_, None) => {
                    self.error(
                        field_name.span,
                        format!(
                            "unknown field '{}' on struct '{}'",
                            field_name.name, struct_ty.name
                        ),
                    );
                }
                _ => {}
            }
        }

        Some(Ty::Struct(struct_ty))
    }

    fn check_array_lit(&mut self, span: Span, items: &[Expr]) -> Option<Ty> {
        if items.is_empty() {
            self.error(span, "cannot infer the element type of an empty array literal");
            return None;
        }
        let Some(elem_ty) = self.check_expr(&items[0]) else {
            for item in &items[1..] {
                self.check_expr(item);
            }
            return None;
        };
        for item in &items[1..] {
            if let Some(item_ty) = self.check_expr(item) {
                self.check_assignable(item.span, &item_ty, &elem_ty);
            }
        }
        Some(Ty::Array {
            elem: Box::new(elem_ty),
            fixed: true,
        })
    }

    fn check_index(&mut self, base: &Expr, index: &Expr) -> Option<Ty> {
        if let Some(index_ty) = self.check_expr(index) {
            self.check_assignable(index.span, &index_ty, &Ty::primitive("int"));
        }
        let base_ty = self.check_expr(base)?;
        match base_ty {
            Ty::Array { elem, .. } => Some(*elem),
            Ty::Pointer(pointee) => match *pointee {
                Ty::Array { elem, .. } => Some(*elem),
                other => Some(other),
            },
            other => {
                self.error(base.span, format!("cannot index type '{other}'"));
                None
            }
        }
    }

    fn check_cast(&mut self, span: Span, ty: &TypeExpr, inner: &Expr) -> Option<Ty> {
        let source = self.check_expr(inner);
        let target = self.resolve_type_expr(ty)?;
        if let Some(source) = source {
            if !source.is_castable_to(&target) {
                self.error(span, format!("invalid cast from '{source}' to '{target}'"));
            }
        }
        Some(target)
    }

    fn check_lambda(
        &mut self,
        params: &[Param],
        ret: Option<&TypeExpr>,
        body: &LambdaBody,
    ) -> Option<Ty> {
        self.enter_scope();
        let (param_tys, _) = self.declare_params(params);
        let ret_ty = ret
            .and_then(|node| self.resolve_type_expr(node))
            .unwrap_or_else(|| Ty::primitive("void"));

        let prev_ret = self.ctx.current_return.take();
        self.ctx.current_return = Some(ret_ty.clone());
        match body {
            LambdaBody::Block(block) => {
                self.check_block(block);
            }
            LambdaBody::Expr(expr) => {
                if let Some(expr_ty) = self.check_expr(expr) {
                    self.check_assignable(expr.span, &expr_ty, &ret_ty);
                }
            }
        }
        self.ctx.current_return = prev_ret;
        self.exit_scope();

        Some(Ty::Function(FnTy::new(param_tys, ret_ty)))
    }

    fn check_super(
        &mut self,
        span: Span,
        parent: Option<&Ident>,
        args: &[Expr],
        init_fields: &[(Ident, Expr)],
    ) -> Option<Ty> {
        for arg in args {
            self.check_expr(arg);
        }
        for (_, value) in init_fields {
            self.check_expr(value);
        }

        let Some(struct_ctx) = self.struct_ctx.clone() else {
            self.error(span, "'super' used outside of a struct");
            return None;
        };
        let parent_ty = match parent {
            Some(ident) => struct_ctx
                .parents
                .iter()
                .find(|p| p.to_string() == ident.name)
                .cloned()
                .or_else(|| self.arena.resolve_type(self.current, &ident.name).cloned()),
            None => struct_ctx.parents.first().cloned(),
        };
        match parent_ty {
            Some(ty) => Some(ty),
            None => {
                self.error(span, format!("struct '{}' has no parent", struct_ctx.name));
                None
            }
        }
    }
}

fn generic_names_in(sig: &FnTy) -> Vec<String> {
    let mut names = Vec::new();
    for param in &sig.params {
        collect_generic_names(param, &mut names);
    }
    collect_generic_names(&sig.ret, &mut names);
    names
}

fn collect_generic_names(ty: &Ty, out: &mut Vec<String>) {
    match ty {
        Ty::Generic { name, .. } => {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        Ty::Pointer(inner) | Ty::SelfTy(inner) => collect_generic_names(inner, out),
        Ty::Array { elem, .. } => collect_generic_names(elem, out),
        Ty::Function(f) => {
            for param in &f.params {
                collect_generic_names(param, out);
            }
            collect_generic_names(&f.ret, out);
        }
        Ty::Struct(s) => {
            for arg in &s.generic_args {
                collect_generic_names(arg, out);
            }
        }
        _ => {}
    }
}

// A return anywhere inside a block completes the whole block; this is
// reachability-insensitive on purpose.
pub(crate) fn block_returns(block: &Block) -> bool {
    block.stmts.iter().any(stmt_returns)
}

fn stmt_returns(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return { .. } | StmtKind::Blame { .. } => true,
        StmtKind::Block(block) => block_returns(block),
        StmtKind::If {
            then_block,
            else_branch: Some(else_branch),
            ..
        } => block_returns(then_block) && stmt_returns(else_branch),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_source;

    fn first_fn_body(src: &str) -> Block {
        let (program, diags) = parse_source(src);
        assert!(diags.is_empty(), "parse failed: {diags:?}");
        for stmt in program.stmts {
            if let StmtKind::Fun(decl) = stmt.kind {
                return decl.body.expect("function has a body");
            }
        }
        panic!("no function in source");
    }

    #[test]
    fn plain_return_completes() {
        let body = first_fn_body("fun f() <int> { return 1; }");
        assert!(block_returns(&body));
    }

    #[test]
    fn if_without_else_is_incomplete() {
        let body = first_fn_body("fun f(c <bool>) <int> { if (c) { return 1; } }");
        assert!(!block_returns(&body));
    }

    #[test]
    fn if_with_both_branches_completes() {
        let body =
            first_fn_body("fun f(c <bool>) <int> { if (c) { return 1; } else { return 2; } }");
        assert!(block_returns(&body));
    }

    #[test]
    fn early_return_completes_regardless_of_reachability() {
        let body = first_fn_body("fun f(c <bool>) <int> { return 1; let x <int> = 2; }");
        assert!(block_returns(&body));
    }

    #[test]
    fn blame_counts_as_return() {
        let body = first_fn_body("fun f() <int> { blame \"boom\"; }");
        assert!(block_returns(&body));
    }
}
