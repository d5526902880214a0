use std::collections::HashMap;

use crate::ast::{
    Block, Expr, ExprKind, Ident, LambdaBody, Program, SizeofArg, Stmt, StmtKind, StructDecl,
};
use crate::diag::Diagnostics;

const MAX_EXPANSIONS: usize = 1024;

/// AST-level macro expansion, run between parsing and semantic analysis.
/// `$name(args)` calls in statement position splice the macro body in; in
/// expression position the body must be a single expression statement.
pub struct MacroExpander<'a> {
    macros: HashMap<String, crate::ast::MacroDecl>,
    diags: &'a mut Diagnostics,
    expansions: usize,
}

impl<'a> MacroExpander<'a> {
    pub fn new(diags: &'a mut Diagnostics) -> Self {
        Self {
            macros: HashMap::new(),
            diags,
            expansions: 0,
        }
    }

    pub fn expand_program(&mut self, program: &mut Program) {
        self.expand_stmts(&mut program.stmts);
    }

    fn expand_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        let mut i = 0;
        while i < stmts.len() {
            if let StmtKind::Macro(decl) = &stmts[i].kind {
                self.macros.insert(decl.name.name.clone(), decl.clone());
                i += 1;
                continue;
            }

            let call = match &stmts[i].kind {
                StmtKind::Expr(Expr {
                    kind: ExprKind::MacroCall { name, args },
                    ..
                }) => Some((name.clone(), args.clone())),
                _ => None,
            };
            if let Some((name, args)) = call {
                match self.expand_to_stmts(&name, &args) {
                    Some(replacement) => {
                        // Re-scan from the same index: the spliced body may
                        // itself contain macro calls.
                        stmts.splice(i..i + 1, replacement);
                        continue;
                    }
                    None => {
                        i += 1;
                        continue;
                    }
                }
            }

            self.expand_stmt(&mut stmts[i]);
            i += 1;
        }
    }

    fn expand_to_stmts(&mut self, name: &Ident, args: &[Expr]) -> Option<Vec<Stmt>> {
        let decl = self.lookup(name, args)?;
        let mapping = param_mapping(&decl, args);
        let mut body = decl.body.clone();
        substitute_block(&mut body, &mapping);
        Some(body.stmts)
    }

    fn expand_to_expr(&mut self, name: &Ident, args: &[Expr]) -> Option<Expr> {
        let decl = self.lookup(name, args)?;
        if let [Stmt {
            kind: StmtKind::Expr(body_expr),
            ..
        }] = &decl.body.stmts[..]
        {
            let mapping = param_mapping(&decl, args);
            let mut out = body_expr.clone();
            substitute_expr(&mut out, &mapping);
            Some(out)
        } else {
            self.diags.error(
                name.span,
                format!("macro '{}' does not expand to an expression", name.name),
            );
            None
        }
    }

    fn lookup(&mut self, name: &Ident, args: &[Expr]) -> Option<crate::ast::MacroDecl> {
        if self.expansions >= MAX_EXPANSIONS {
            self.diags.error(name.span, "macro expansion limit reached");
            return None;
        }
        let Some(decl) = self.macros.get(&name.name).cloned() else {
            self.diags
                .error(name.span, format!("undefined macro '{}'", name.name));
            return None;
        };
        if args.len() != decl.params.len() {
            self.diags.error(
                name.span,
                format!(
                    "macro '{}' expects {} arguments, got {}",
                    name.name,
                    decl.params.len(),
                    args.len()
                ),
            );
            return None;
        }
        self.expansions += 1;
        Some(decl)
    }

    fn expand_stmt(&mut self, stmt: &mut Stmt) {
        match &mut stmt.kind {
            StmtKind::Var(decl) => {
                if let Some(init) = &mut decl.init {
                    self.expand_expr(init);
                }
            }
            StmtKind::Fun(decl) => {
                if let Some(body) = &mut decl.body {
                    self.expand_block(body);
                }
            }
            StmtKind::Struct(decl) | StmtKind::Interface(decl) => self.expand_struct(decl),
            StmtKind::Enum(decl) => {
                for (_, init) in &mut decl.values {
                    if let Some(init) = init {
                        self.expand_expr(init);
                    }
                }
            }
            StmtKind::Define(_) | StmtKind::Import(_) | StmtKind::Macro(_) => {}
            StmtKind::Block(block) => self.expand_block(block),
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    self.expand_expr(value);
                }
            }
            StmtKind::Expr(expr) => self.expand_expr(expr),
            StmtKind::If {
                cond,
                then_block,
                else_branch,
            } => {
                self.expand_expr(cond);
                self.expand_block(then_block);
                if let Some(else_branch) = else_branch {
                    self.expand_stmt(else_branch);
                }
            }
            StmtKind::While { cond, body } => {
                self.expand_expr(cond);
                self.expand_block(body);
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.expand_stmt(init);
                }
                if let Some(cond) = cond {
                    self.expand_expr(cond);
                }
                if let Some(step) = step {
                    self.expand_expr(step);
                }
                self.expand_block(body);
            }
            StmtKind::Foreach { iter, body, .. } => {
                self.expand_expr(iter);
                self.expand_block(body);
            }
            StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Delete { expr } => self.expand_expr(expr),
            StmtKind::TryCatch {
                try_block,
                catch_block,
                ..
            } => {
                self.expand_block(try_block);
                self.expand_block(catch_block);
            }
            StmtKind::Blame { expr } => self.expand_expr(expr),
        }
    }

    fn expand_struct(&mut self, decl: &mut StructDecl) {
        for member in &mut decl.members {
            if let Some(default) = &mut member.default {
                self.expand_expr(default);
            }
        }
        for method in &mut decl.methods {
            if let Some(body) = &mut method.body {
                self.expand_block(body);
            }
        }
        for op in &mut decl.operators {
            if let Some(body) = &mut op.body {
                self.expand_block(body);
            }
        }
        for ctor in &mut decl.constructors {
            if let Some(body) = &mut ctor.body {
                self.expand_block(body);
            }
        }
        if let Some(dtor) = &mut decl.destructor {
            if let Some(body) = &mut dtor.body {
                self.expand_block(body);
            }
        }
    }

    fn expand_block(&mut self, block: &mut Block) {
        self.expand_stmts(&mut block.stmts);
    }

    fn expand_expr(&mut self, expr: &mut Expr) {
        match &mut expr.kind {
            ExprKind::Literal(_) | ExprKind::Ident(_) => {}
            ExprKind::Binary { left, right, .. } => {
                self.expand_expr(left);
                self.expand_expr(right);
            }
            ExprKind::Unary { expr: inner, .. } => self.expand_expr(inner),
            ExprKind::Call { args, .. } => {
                for arg in args {
                    self.expand_expr(arg);
                }
            }
            ExprKind::MethodCall { recv, args, .. } => {
                self.expand_expr(recv);
                for arg in args {
                    self.expand_expr(arg);
                }
            }
            ExprKind::StaticCall { args, .. } => {
                for arg in args {
                    self.expand_expr(arg);
                }
            }
            ExprKind::Member { object, .. } => self.expand_expr(object),
            ExprKind::StructLit { fields, .. } => {
                for (_, value) in fields {
                    self.expand_expr(value);
                }
            }
            ExprKind::New {
                args, init_fields, ..
            } => {
                for arg in args {
                    self.expand_expr(arg);
                }
                for (_, value) in init_fields {
                    self.expand_expr(value);
                }
            }
            ExprKind::ArrayLit(items) => {
                for item in items {
                    self.expand_expr(item);
                }
            }
            ExprKind::Index { base, index } => {
                self.expand_expr(base);
                self.expand_expr(index);
            }
            ExprKind::Cast { expr: inner, .. } => self.expand_expr(inner),
            ExprKind::Sizeof(arg) => {
                if let SizeofArg::Expr(inner) = arg {
                    self.expand_expr(inner);
                }
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.expand_expr(cond);
                self.expand_expr(then_expr);
                self.expand_expr(else_expr);
            }
            ExprKind::Lambda { body, .. } => match body {
                LambdaBody::Block(block) => self.expand_block(block),
                LambdaBody::Expr(inner) => self.expand_expr(inner),
            },
            ExprKind::Super {
                args, init_fields, ..
            } => {
                for arg in args {
                    self.expand_expr(arg);
                }
                for (_, value) in init_fields {
                    self.expand_expr(value);
                }
            }
            ExprKind::MacroCall { args, .. } => {
                for arg in args {
                    self.expand_expr(arg);
                }
            }
            ExprKind::MacroInvoke { body, .. } => self.expand_block(body),
            // Quoted fragments are inert until spliced; nothing to rewrite.
            ExprKind::Quote { .. } => {}
        }

        let call = match &expr.kind {
            ExprKind::MacroCall { name, args } => Some((name.clone(), args.clone())),
            _ => None,
        };
        if let Some((name, args)) = call {
            if let Some(replacement) = self.expand_to_expr(&name, &args) {
                *expr = replacement;
                // The spliced body may itself call macros.
                self.expand_expr(expr);
            }
        }
    }
}

fn param_mapping(decl: &crate::ast::MacroDecl, args: &[Expr]) -> HashMap<String, Expr> {
    decl.params
        .iter()
        .map(|p| p.name.clone())
        .zip(args.iter().cloned())
        .collect()
}

// Name-based substitution into a cloned body, with no scope hygiene: a macro
// body that names a caller binding captures it.
fn substitute_block(block: &mut Block, mapping: &HashMap<String, Expr>) {
    for stmt in &mut block.stmts {
        substitute_stmt(stmt, mapping);
    }
}

fn substitute_stmt(stmt: &mut Stmt, mapping: &HashMap<String, Expr>) {
    match &mut stmt.kind {
        StmtKind::Var(decl) => {
            if let Some(init) = &mut decl.init {
                substitute_expr(init, mapping);
            }
        }
        StmtKind::Fun(decl) => {
            if let Some(body) = &mut decl.body {
                substitute_block(body, mapping);
            }
        }
        StmtKind::Struct(_)
        | StmtKind::Interface(_)
        | StmtKind::Enum(_)
        | StmtKind::Define(_)
        | StmtKind::Import(_)
        | StmtKind::Macro(_) => {}
        StmtKind::Block(block) => substitute_block(block, mapping),
        StmtKind::Return { value } => {
            if let Some(value) = value {
                substitute_expr(value, mapping);
            }
        }
        StmtKind::Expr(expr) => substitute_expr(expr, mapping),
        StmtKind::If {
            cond,
            then_block,
            else_branch,
        } => {
            substitute_expr(cond, mapping);
            substitute_block(then_block, mapping);
            if let Some(else_branch) = else_branch {
                substitute_stmt(else_branch, mapping);
            }
        }
        StmtKind::While { cond, body } => {
            substitute_expr(cond, mapping);
            substitute_block(body, mapping);
        }
        StmtKind::For {
            init,
            cond,
            step,
            body,
        } => {
            if let Some(init) = init {
                substitute_stmt(init, mapping);
            }
            if let Some(cond) = cond {
                substitute_expr(cond, mapping);
            }
            if let Some(step) = step {
                substitute_expr(step, mapping);
            }
            substitute_block(body, mapping);
        }
        StmtKind::Foreach { iter, body, .. } => {
            substitute_expr(iter, mapping);
            substitute_block(body, mapping);
        }
        StmtKind::Break | StmtKind::Continue => {}
        StmtKind::Delete { expr } => substitute_expr(expr, mapping),
        StmtKind::TryCatch {
            try_block,
            catch_block,
            ..
        } => {
            substitute_block(try_block, mapping);
            substitute_block(catch_block, mapping);
        }
        StmtKind::Blame { expr } => substitute_expr(expr, mapping),
    }
}

fn substitute_expr(expr: &mut Expr, mapping: &HashMap<String, Expr>) {
    if let ExprKind::Ident(ident) = &expr.kind {
        if let Some(replacement) = mapping.get(&ident.name) {
            *expr = replacement.clone();
            return;
        }
    }
    match &mut expr.kind {
        ExprKind::Literal(_) | ExprKind::Ident(_) => {}
        ExprKind::Binary { left, right, .. } => {
            substitute_expr(left, mapping);
            substitute_expr(right, mapping);
        }
        ExprKind::Unary { expr: inner, .. } => substitute_expr(inner, mapping),
        ExprKind::Call { args, .. } => {
            for arg in args {
                substitute_expr(arg, mapping);
            }
        }
        ExprKind::MethodCall { recv, args, .. } => {
            substitute_expr(recv, mapping);
            for arg in args {
                substitute_expr(arg, mapping);
            }
        }
        ExprKind::StaticCall { args, .. } => {
            for arg in args {
                substitute_expr(arg, mapping);
            }
        }
        ExprKind::Member { object, .. } => substitute_expr(object, mapping),
        ExprKind::StructLit { fields, .. } => {
            for (_, value) in fields {
                substitute_expr(value, mapping);
            }
        }
        ExprKind::New {
            args, init_fields, ..
        } => {
            for arg in args {
                substitute_expr(arg, mapping);
            }
            for (_, value) in init_fields {
                substitute_expr(value, mapping);
            }
        }
        ExprKind::ArrayLit(items) => {
            for item in items {
                substitute_expr(item, mapping);
            }
        }
        ExprKind::Index { base, index } => {
            substitute_expr(base, mapping);
            substitute_expr(index, mapping);
        }
        ExprKind::Cast { expr: inner, .. } => substitute_expr(inner, mapping),
        ExprKind::Sizeof(arg) => {
            if let SizeofArg::Expr(inner) = arg {
                substitute_expr(inner, mapping);
            }
        }
        ExprKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            substitute_expr(cond, mapping);
            substitute_expr(then_expr, mapping);
            substitute_expr(else_expr, mapping);
        }
        ExprKind::Lambda { body, .. } => match body {
            LambdaBody::Block(block) => substitute_block(block, mapping),
            LambdaBody::Expr(inner) => substitute_expr(inner, mapping),
        },
        ExprKind::Super {
            args, init_fields, ..
        } => {
            for arg in args {
                substitute_expr(arg, mapping);
            }
            for (_, value) in init_fields {
                substitute_expr(value, mapping);
            }
        }
        ExprKind::MacroCall { args, .. } => {
            for arg in args {
                substitute_expr(arg, mapping);
            }
        }
        ExprKind::MacroInvoke { body, .. } => substitute_block(body, mapping),
        ExprKind::Quote { body } => substitute_block(body, mapping),
    }
}
