use crate::ast::*;
use crate::diag::Diagnostics;
use crate::span::Span;
use crate::token::{Keyword, Punct, Token, TokenKind};

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    diags: &'a mut Diagnostics,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], diags: &'a mut Diagnostics) -> Self {
        Self { tokens, pos: 0, diags }
    }

    pub fn parse_program(&mut self) -> Program {
        let mut stmts = Vec::new();
        while !self.at_eof() {
            match self.parse_stmt() {
                Some(stmt) => stmts.push(stmt),
                None => self.sync_to_next_stmt(),
            }
        }
        Program { stmts }
    }

    fn parse_stmt(&mut self) -> Option<Stmt> {
        let start = self.peek_span();

        if self.eat_keyword(Keyword::Let).is_some() {
            return self.parse_var_decl(true, start);
        }
        if self.eat_keyword(Keyword::Const).is_some() {
            return self.parse_var_decl(false, start);
        }
        if self.at_keyword(Keyword::Fun) && !self.lambda_ahead() {
            self.advance();
            let decl = self.parse_fn_decl(false, false)?;
            let span = start.merge(self.prev_span());
            return Some(Stmt { kind: StmtKind::Fun(decl), span });
        }
        if self.eat_keyword(Keyword::Struct).is_some() {
            let decl = self.parse_struct_decl(false)?;
            let span = start.merge(self.prev_span());
            return Some(Stmt { kind: StmtKind::Struct(decl), span });
        }
        if self.eat_keyword(Keyword::Interface).is_some() {
            let decl = self.parse_struct_decl(true)?;
            let span = start.merge(self.prev_span());
            return Some(Stmt { kind: StmtKind::Interface(decl), span });
        }
        if self.eat_keyword(Keyword::Enum).is_some() {
            let decl = self.parse_enum_decl()?;
            let span = start.merge(self.prev_span());
            return Some(Stmt { kind: StmtKind::Enum(decl), span });
        }
        if self.eat_keyword(Keyword::Define).is_some() {
            let decl = self.parse_define_decl()?;
            let span = start.merge(self.prev_span());
            return Some(Stmt { kind: StmtKind::Define(decl), span });
        }
        if self.eat_keyword(Keyword::Import).is_some() {
            let decl = self.parse_import_decl()?;
            let span = start.merge(self.prev_span());
            return Some(Stmt { kind: StmtKind::Import(decl), span });
        }
        if self.eat_keyword(Keyword::Macro).is_some() {
            let decl = self.parse_macro_decl()?;
            let span = start.merge(self.prev_span());
            return Some(Stmt { kind: StmtKind::Macro(decl), span });
        }
        if self.at_punct(Punct::LBrace) {
            let block = self.parse_block()?;
            let span = block.span;
            return Some(Stmt { kind: StmtKind::Block(block), span });
        }
        if self.eat_keyword(Keyword::Return).is_some() {
            let value = if self.at_punct(Punct::Semicolon) {
                None
            } else {
                Some(self.parse_expr())
            };
            self.expect_punct(Punct::Semicolon);
            let span = start.merge(self.prev_span());
            return Some(Stmt { kind: StmtKind::Return { value }, span });
        }
        if self.eat_keyword(Keyword::If).is_some() {
            return self.parse_if_stmt(start);
        }
        if self.eat_keyword(Keyword::While).is_some() {
            self.expect_punct(Punct::LParen);
            let cond = self.parse_expr();
            self.expect_punct(Punct::RParen);
            let body = self.parse_block()?;
            let span = start.merge(self.prev_span());
            return Some(Stmt { kind: StmtKind::While { cond, body }, span });
        }
        if self.eat_keyword(Keyword::For).is_some() {
            return self.parse_for_stmt(start);
        }
        if self.eat_keyword(Keyword::Foreach).is_some() {
            self.expect_punct(Punct::LParen);
            let var = self.expect_ident();
            let var_ty = self.parse_type_annotation();
            self.expect_keyword(Keyword::In);
            let iter = self.parse_expr();
            self.expect_punct(Punct::RParen);
            let body = self.parse_block()?;
            let span = start.merge(self.prev_span());
            return Some(Stmt {
                kind: StmtKind::Foreach { var, var_ty, iter, body },
                span,
            });
        }
        if self.eat_keyword(Keyword::Break).is_some() {
            self.expect_punct(Punct::Semicolon);
            let span = start.merge(self.prev_span());
            return Some(Stmt { kind: StmtKind::Break, span });
        }
        if self.eat_keyword(Keyword::Continue).is_some() {
            self.expect_punct(Punct::Semicolon);
            let span = start.merge(self.prev_span());
            return Some(Stmt { kind: StmtKind::Continue, span });
        }
        if self.eat_keyword(Keyword::Delete).is_some() {
            let expr = self.parse_expr();
            self.expect_punct(Punct::Semicolon);
            let span = start.merge(self.prev_span());
            return Some(Stmt { kind: StmtKind::Delete { expr }, span });
        }
        if self.eat_keyword(Keyword::Try).is_some() {
            let try_block = self.parse_block()?;
            self.expect_keyword(Keyword::Catch);
            self.expect_punct(Punct::LParen);
            let catch_var = self.expect_ident();
            let catch_ty = self.parse_type_annotation();
            self.expect_punct(Punct::RParen);
            let catch_block = self.parse_block()?;
            let span = start.merge(self.prev_span());
            return Some(Stmt {
                kind: StmtKind::TryCatch {
                    try_block,
                    catch_var,
                    catch_ty,
                    catch_block,
                },
                span,
            });
        }
        if self.eat_keyword(Keyword::Blame).is_some() {
            let expr = self.parse_expr();
            self.expect_punct(Punct::Semicolon);
            let span = start.merge(self.prev_span());
            return Some(Stmt { kind: StmtKind::Blame { expr }, span });
        }

        let expr = self.parse_expr();
        self.expect_punct(Punct::Semicolon);
        let span = start.merge(self.prev_span());
        Some(Stmt { kind: StmtKind::Expr(expr), span })
    }

    fn parse_var_decl(&mut self, is_mutable: bool, start: Span) -> Option<Stmt> {
        let name = self.expect_ident();
        let ty = if self.at_punct(Punct::Lt) {
            Some(self.parse_type_annotation())
        } else {
            None
        };
        let init = if self.eat_punct(Punct::Assign).is_some() {
            Some(self.parse_expr())
        } else {
            None
        };
        self.expect_punct(Punct::Semicolon);
        let span = start.merge(self.prev_span());
        Some(Stmt {
            kind: StmtKind::Var(VarDecl {
                name,
                is_mutable,
                ty,
                init,
            }),
            span,
        })
    }

    fn parse_if_stmt(&mut self, start: Span) -> Option<Stmt> {
        self.expect_punct(Punct::LParen);
        let cond = self.parse_expr();
        self.expect_punct(Punct::RParen);
        let then_block = self.parse_block()?;
        let else_branch = if self.eat_keyword(Keyword::Else).is_some() {
            if self.at_keyword(Keyword::If) {
                let else_start = self.peek_span();
                self.advance();
                Some(Box::new(self.parse_if_stmt(else_start)?))
            } else {
                let block = self.parse_block()?;
                let span = block.span;
                Some(Box::new(Stmt { kind: StmtKind::Block(block), span }))
            }
        } else {
            None
        };
        let span = start.merge(self.prev_span());
        Some(Stmt {
            kind: StmtKind::If {
                cond,
                then_block,
                else_branch,
            },
            span,
        })
    }

    fn parse_for_stmt(&mut self, start: Span) -> Option<Stmt> {
        self.expect_punct(Punct::LParen);
        let init = if self.eat_punct(Punct::Semicolon).is_some() {
            None
        } else {
            let init_start = self.peek_span();
            if self.eat_keyword(Keyword::Let).is_some() {
                Some(Box::new(self.parse_var_decl(true, init_start)?))
            } else if self.eat_keyword(Keyword::Const).is_some() {
                Some(Box::new(self.parse_var_decl(false, init_start)?))
            } else {
                let expr = self.parse_expr();
                self.expect_punct(Punct::Semicolon);
                let span = init_start.merge(self.prev_span());
                Some(Box::new(Stmt { kind: StmtKind::Expr(expr), span }))
            }
        };
        let cond = if self.at_punct(Punct::Semicolon) {
            None
        } else {
            Some(self.parse_expr())
        };
        self.expect_punct(Punct::Semicolon);
        let step = if self.at_punct(Punct::RParen) {
            None
        } else {
            Some(self.parse_expr())
        };
        self.expect_punct(Punct::RParen);
        let body = self.parse_block()?;
        let span = start.merge(self.prev_span());
        Some(Stmt {
            kind: StmtKind::For { init, cond, step, body },
            span,
        })
    }

    fn parse_fn_decl(&mut self, is_static: bool, is_public: bool) -> Option<FnDecl> {
        let start = self.prev_span();
        let name = self.expect_ident();
        let generics = if self.at_punct(Punct::Lt) {
            self.parse_generic_params()
        } else {
            Vec::new()
        };
        let (params, _) = self.parse_params(false);
        let ret = if self.at_punct(Punct::Lt) {
            Some(self.parse_type_annotation())
        } else {
            None
        };
        let body = if self.at_punct(Punct::LBrace) {
            Some(self.parse_block()?)
        } else {
            self.expect_punct(Punct::Semicolon);
            None
        };
        let span = start.merge(self.prev_span());
        Some(FnDecl {
            name,
            generics,
            params,
            ret,
            body,
            is_static,
            is_public,
            span,
        })
    }

    fn parse_generic_params(&mut self) -> Vec<GenericParam> {
        let mut out = Vec::new();
        self.expect_punct(Punct::Lt);
        if !self.at_punct(Punct::Gt) {
            loop {
                let name = self.expect_ident();
                let constraint = if self.eat_punct(Punct::Colon).is_some() {
                    Some(self.parse_type())
                } else {
                    None
                };
                out.push(GenericParam { name, constraint });
                if self.eat_punct(Punct::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect_punct(Punct::Gt);
        out
    }

    fn parse_params(&mut self, allow_vararg: bool) -> (Vec<Param>, bool) {
        let mut params = Vec::new();
        let mut is_vararg = false;
        self.expect_punct(Punct::LParen);
        if !self.at_punct(Punct::RParen) {
            loop {
                if allow_vararg && self.eat_punct(Punct::Ellipsis).is_some() {
                    is_vararg = true;
                    break;
                }
                let param_start = self.peek_span();
                let name = self.expect_ident();
                let _ = self.eat_punct(Punct::Colon);
                let ty = self.parse_type_annotation();
                let default = if self.eat_punct(Punct::Assign).is_some() {
                    Some(self.parse_expr())
                } else {
                    None
                };
                let span = param_start.merge(self.prev_span());
                params.push(Param { name, ty, default, span });
                if self.eat_punct(Punct::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen);
        (params, is_vararg)
    }

    fn parse_struct_decl(&mut self, is_interface: bool) -> Option<StructDecl> {
        let name = self.expect_ident();
        let generics = if self.at_punct(Punct::Lt) {
            self.parse_generic_params()
        } else {
            Vec::new()
        };
        let mut parents = Vec::new();
        if self.eat_punct(Punct::Colon).is_some() {
            loop {
                parents.push(self.parse_type());
                if self.eat_punct(Punct::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect_punct(Punct::LBrace);

        let mut members = Vec::new();
        let mut methods = Vec::new();
        let mut operators = Vec::new();
        let mut constructors = Vec::new();
        let mut destructor = None;

        while !self.at_punct(Punct::RBrace) && !self.at_eof() {
            while self.eat_punct(Punct::Comma).is_some() || self.eat_punct(Punct::Semicolon).is_some() {}
            if self.at_punct(Punct::RBrace) || self.at_eof() {
                break;
            }

            let mut is_public = false;
            if self.eat_keyword(Keyword::Pub).is_some() {
                is_public = true;
            } else {
                let _ = self.eat_keyword(Keyword::Priv);
            }

            let is_static = self.eat_keyword(Keyword::Static).is_some();

            if self.eat_keyword(Keyword::Fun).is_some() {
                if let Some(decl) = self.parse_fn_decl(is_static, is_public) {
                    methods.push(decl);
                } else {
                    self.sync_to_next_stmt();
                }
                continue;
            }
            if is_static {
                self.error_here("expected 'fun' after 'static'");
                self.sync_to_next_stmt();
                continue;
            }
            if self.eat_keyword(Keyword::Operator).is_some() {
                if let Some(decl) = self.parse_operator_decl(is_interface) {
                    operators.push(decl);
                } else {
                    self.sync_to_next_stmt();
                }
                continue;
            }
            if self.at_keyword(Keyword::SelfUpper) {
                let ctor_start = self.peek_span();
                self.advance();
                let (params, _) = self.parse_params(false);
                let body = if self.at_punct(Punct::LBrace) {
                    self.parse_block()
                } else {
                    self.expect_punct(Punct::Semicolon);
                    None
                };
                let span = ctor_start.merge(self.prev_span());
                constructors.push(CtorDecl { params, body, span });
                continue;
            }
            if self.at_punct(Punct::Tilde) {
                let dtor_start = self.peek_span();
                self.advance();
                self.expect_keyword(Keyword::SelfUpper);
                self.expect_punct(Punct::LParen);
                self.expect_punct(Punct::RParen);
                let body = if self.at_punct(Punct::LBrace) {
                    self.parse_block()
                } else {
                    self.expect_punct(Punct::Semicolon);
                    None
                };
                let span = dtor_start.merge(self.prev_span());
                destructor = Some(DtorDecl { body, span });
                continue;
            }

            let member_start = self.peek_span();
            let member_name = self.expect_ident();
            if member_name.name.is_empty() {
                // The offending token must go, or this loop would not advance.
                self.advance();
                self.sync_to_next_stmt();
                continue;
            }
            let ty = self.parse_type_annotation();
            let default = if self.eat_punct(Punct::Assign).is_some() {
                Some(self.parse_expr())
            } else {
                None
            };
            let span = member_start.merge(self.prev_span());
            members.push(MemberDecl {
                name: member_name,
                ty,
                is_public,
                default,
                span,
            });
        }
        self.expect_punct(Punct::RBrace);

        Some(StructDecl {
            name,
            generics,
            parents,
            members,
            methods,
            operators,
            constructors,
            destructor,
        })
    }

    fn parse_operator_decl(&mut self, is_interface: bool) -> Option<OperatorDecl> {
        let start = self.prev_span();
        let op = match self.peek_kind() {
            TokenKind::Punct(Punct::Plus) => BinOp::Add,
            TokenKind::Punct(Punct::Minus) => BinOp::Sub,
            TokenKind::Punct(Punct::Star) => BinOp::Mul,
            TokenKind::Punct(Punct::Slash) => BinOp::Div,
            TokenKind::Punct(Punct::Percent) => BinOp::Mod,
            TokenKind::Punct(Punct::EqEq) => BinOp::Eq,
            TokenKind::Punct(Punct::NotEq) => BinOp::NotEq,
            TokenKind::Punct(Punct::Lt) => BinOp::Lt,
            TokenKind::Punct(Punct::LtEq) => BinOp::LtEq,
            TokenKind::Punct(Punct::Gt) => BinOp::Gt,
            TokenKind::Punct(Punct::GtEq) => BinOp::GtEq,
            _ => {
                self.error_here("expected an overloadable operator");
                return None;
            }
        };
        self.advance();
        let generics = if self.at_punct(Punct::Lt) {
            self.parse_generic_params()
        } else {
            Vec::new()
        };
        let (params, _) = self.parse_params(false);
        let ret = if self.at_punct(Punct::Lt) {
            Some(self.parse_type_annotation())
        } else {
            None
        };
        let body = if is_interface || !self.at_punct(Punct::LBrace) {
            self.expect_punct(Punct::Semicolon);
            None
        } else {
            self.parse_block()
        };
        let span = start.merge(self.prev_span());
        Some(OperatorDecl {
            op,
            generics,
            params,
            ret,
            body,
            span,
        })
    }

    fn parse_enum_decl(&mut self) -> Option<EnumDecl> {
        let name = self.expect_ident();
        self.expect_punct(Punct::LBrace);
        let mut values = Vec::new();
        while !self.at_punct(Punct::RBrace) && !self.at_eof() {
            let member = self.expect_ident();
            if member.name.is_empty() {
                break;
            }
            let init = if self.eat_punct(Punct::Assign).is_some() {
                Some(self.parse_expr())
            } else {
                None
            };
            values.push((member, init));
            if self.eat_punct(Punct::Comma).is_none() {
                break;
            }
        }
        self.expect_punct(Punct::RBrace);
        Some(EnumDecl { name, values })
    }

    fn parse_define_decl(&mut self) -> Option<DefineDecl> {
        let name = self.expect_ident();
        let (params, is_vararg) = self.parse_params(true);
        let ret = if self.at_punct(Punct::Lt) {
            Some(self.parse_type_annotation())
        } else {
            None
        };
        self.expect_punct(Punct::Semicolon);
        Some(DefineDecl {
            name,
            params,
            ret,
            is_vararg,
        })
    }

    fn parse_import_decl(&mut self) -> Option<ImportDecl> {
        if self.eat_punct(Punct::LBrace).is_some() {
            let mut targets = Vec::new();
            if !self.at_punct(Punct::RBrace) {
                loop {
                    targets.push(self.expect_ident());
                    if self.eat_punct(Punct::Comma).is_none() {
                        break;
                    }
                }
            }
            self.expect_punct(Punct::RBrace);
            self.expect_keyword(Keyword::From);
            let source = self.expect_string();
            self.expect_punct(Punct::Semicolon);
            return Some(ImportDecl {
                source,
                is_package: false,
                targets,
                alias: None,
            });
        }

        if let TokenKind::String(_) = self.peek_kind() {
            let source = self.expect_string();
            let alias = if self.eat_keyword(Keyword::As).is_some() {
                Some(self.expect_ident())
            } else {
                None
            };
            self.expect_punct(Punct::Semicolon);
            return Some(ImportDecl {
                source,
                is_package: false,
                targets: Vec::new(),
                alias,
            });
        }

        let mut source = self.expect_ident().name;
        while self.eat_punct(Punct::Dot).is_some() {
            source.push('.');
            source.push_str(&self.expect_ident().name);
        }
        let alias = if self.eat_keyword(Keyword::As).is_some() {
            Some(self.expect_ident())
        } else {
            None
        };
        self.expect_punct(Punct::Semicolon);
        Some(ImportDecl {
            source,
            is_package: true,
            targets: Vec::new(),
            alias,
        })
    }

    fn parse_macro_decl(&mut self) -> Option<MacroDecl> {
        let start = self.prev_span();
        let name = self.expect_ident();
        let mut params = Vec::new();
        self.expect_punct(Punct::LParen);
        if !self.at_punct(Punct::RParen) {
            loop {
                params.push(self.expect_ident());
                if self.eat_punct(Punct::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen);
        let body = self.parse_block()?;
        let span = start.merge(self.prev_span());
        Some(MacroDecl {
            name,
            params,
            body,
            span,
        })
    }

    fn parse_block(&mut self) -> Option<Block> {
        let start = self.peek_span();
        self.expect_punct(Punct::LBrace);
        let mut stmts = Vec::new();
        while !self.at_punct(Punct::RBrace) && !self.at_eof() {
            match self.parse_stmt() {
                Some(stmt) => stmts.push(stmt),
                None => self.sync_to_next_stmt(),
            }
        }
        self.expect_punct(Punct::RBrace);
        let span = start.merge(self.prev_span());
        Some(Block { stmts, span })
    }

    // --- Expressions ---

    pub fn parse_expr(&mut self) -> Expr {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Expr {
        let left = self.parse_ternary();
        let op = match self.peek_kind() {
            TokenKind::Punct(Punct::Assign) => BinOp::Assign,
            TokenKind::Punct(Punct::PlusAssign) => BinOp::AddAssign,
            TokenKind::Punct(Punct::MinusAssign) => BinOp::SubAssign,
            TokenKind::Punct(Punct::StarAssign) => BinOp::MulAssign,
            TokenKind::Punct(Punct::SlashAssign) => BinOp::DivAssign,
            _ => return left,
        };
        self.advance();
        let right = self.parse_assign();
        let span = left.span.merge(right.span);
        Expr {
            kind: ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        }
    }

    fn parse_ternary(&mut self) -> Expr {
        let cond = self.parse_or();
        if self.eat_punct(Punct::Question).is_none() {
            return cond;
        }
        let then_expr = self.parse_expr();
        self.expect_punct(Punct::Colon);
        let else_expr = self.parse_ternary();
        let span = cond.span.merge(else_expr.span);
        Expr {
            kind: ExprKind::Ternary {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        }
    }

    fn parse_or(&mut self) -> Expr {
        let mut left = self.parse_and();
        while self.eat_punct(Punct::OrOr).is_some() {
            let right = self.parse_and();
            let span = left.span.merge(right.span);
            left = Expr {
                kind: ExprKind::Binary {
                    op: BinOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            };
        }
        left
    }

    fn parse_and(&mut self) -> Expr {
        let mut left = self.parse_equality();
        while self.eat_punct(Punct::AndAnd).is_some() {
            let right = self.parse_equality();
            let span = left.span.merge(right.span);
            left = Expr {
                kind: ExprKind::Binary {
                    op: BinOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            };
        }
        left
    }

    fn parse_equality(&mut self) -> Expr {
        let mut left = self.parse_comparison();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Punct(Punct::EqEq) => BinOp::Eq,
                TokenKind::Punct(Punct::NotEq) => BinOp::NotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison();
            let span = left.span.merge(right.span);
            left = Expr {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            };
        }
        left
    }

    fn parse_comparison(&mut self) -> Expr {
        let mut left = self.parse_additive();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Punct(Punct::Lt) => BinOp::Lt,
                TokenKind::Punct(Punct::LtEq) => BinOp::LtEq,
                TokenKind::Punct(Punct::Gt) => BinOp::Gt,
                TokenKind::Punct(Punct::GtEq) => BinOp::GtEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive();
            let span = left.span.merge(right.span);
            left = Expr {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            };
        }
        left
    }

    fn parse_additive(&mut self) -> Expr {
        let mut left = self.parse_multiplicative();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Punct(Punct::Plus) => BinOp::Add,
                TokenKind::Punct(Punct::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative();
            let span = left.span.merge(right.span);
            left = Expr {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            };
        }
        left
    }

    fn parse_multiplicative(&mut self) -> Expr {
        let mut left = self.parse_unary();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Punct(Punct::Star) => BinOp::Mul,
                TokenKind::Punct(Punct::Slash) => BinOp::Div,
                TokenKind::Punct(Punct::Percent) => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary();
            let span = left.span.merge(right.span);
            left = Expr {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            };
        }
        left
    }

    fn parse_unary(&mut self) -> Expr {
        let start = self.peek_span();
        let op = match self.peek_kind() {
            TokenKind::Punct(Punct::Minus) => Some(UnOp::Neg),
            TokenKind::Punct(Punct::Bang) => Some(UnOp::Not),
            TokenKind::Punct(Punct::Amp) => Some(UnOp::Ref),
            TokenKind::Punct(Punct::Star) => Some(UnOp::Deref),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.parse_unary();
            let span = start.merge(expr.span);
            return Expr {
                kind: ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
                span,
            };
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_primary();
        loop {
            if self.eat_punct(Punct::Dot).is_some() {
                let name = self.expect_ident();
                if self.at_punct(Punct::LParen) {
                    let args = self.parse_call_args();
                    let span = expr.span.merge(self.prev_span());
                    expr = Expr {
                        kind: ExprKind::MethodCall {
                            recv: Box::new(expr),
                            name,
                            args,
                        },
                        span,
                    };
                } else {
                    let span = expr.span.merge(name.span);
                    expr = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            name,
                        },
                        span,
                    };
                }
                continue;
            }
            if self.eat_punct(Punct::LBracket).is_some() {
                let index = self.parse_expr();
                self.expect_punct(Punct::RBracket);
                let span = expr.span.merge(self.prev_span());
                expr = Expr {
                    kind: ExprKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                };
                continue;
            }
            break;
        }
        expr
    }

    fn parse_primary(&mut self) -> Expr {
        let start = self.peek_span();

        match self.peek_kind().clone() {
            TokenKind::Int(v) => {
                self.advance();
                return Expr {
                    kind: ExprKind::Literal(Lit::Int(v)),
                    span: start,
                };
            }
            TokenKind::Float(v) => {
                self.advance();
                return Expr {
                    kind: ExprKind::Literal(Lit::Float(v)),
                    span: start,
                };
            }
            TokenKind::String(v) => {
                self.advance();
                return Expr {
                    kind: ExprKind::Literal(Lit::Str(v)),
                    span: start,
                };
            }
            TokenKind::Char(v) => {
                self.advance();
                return Expr {
                    kind: ExprKind::Literal(Lit::Char(v)),
                    span: start,
                };
            }
            TokenKind::Bool(v) => {
                self.advance();
                return Expr {
                    kind: ExprKind::Literal(Lit::Bool(v)),
                    span: start,
                };
            }
            TokenKind::Null => {
                self.advance();
                return Expr {
                    kind: ExprKind::Literal(Lit::Null),
                    span: start,
                };
            }
            _ => {}
        }

        if self.eat_punct(Punct::LParen).is_some() {
            let expr = self.parse_expr();
            self.expect_punct(Punct::RParen);
            return expr;
        }

        if self.eat_punct(Punct::LBracket).is_some() {
            let mut items = Vec::new();
            if !self.at_punct(Punct::RBracket) {
                loop {
                    items.push(self.parse_expr());
                    if self.eat_punct(Punct::Comma).is_none() {
                        break;
                    }
                }
            }
            self.expect_punct(Punct::RBracket);
            let span = start.merge(self.prev_span());
            return Expr {
                kind: ExprKind::ArrayLit(items),
                span,
            };
        }

        if self.eat_keyword(Keyword::New).is_some() {
            let ty = self.parse_type();
            let mut args = Vec::new();
            let mut init_fields = Vec::new();
            if self.at_punct(Punct::LParen) {
                args = self.parse_call_args();
            } else if self.at_punct(Punct::LBrace) {
                init_fields = self.parse_field_inits();
            }
            let span = start.merge(self.prev_span());
            return Expr {
                kind: ExprKind::New {
                    ty,
                    args,
                    init_fields,
                },
                span,
            };
        }

        if self.eat_keyword(Keyword::Cast).is_some() {
            let ty = self.parse_type_annotation();
            self.expect_punct(Punct::LParen);
            let expr = self.parse_expr();
            self.expect_punct(Punct::RParen);
            let span = start.merge(self.prev_span());
            return Expr {
                kind: ExprKind::Cast {
                    ty,
                    expr: Box::new(expr),
                },
                span,
            };
        }

        if self.eat_keyword(Keyword::Sizeof).is_some() {
            self.expect_punct(Punct::LParen);
            let arg = if self.at_punct(Punct::Lt) {
                SizeofArg::Type(self.parse_type_annotation())
            } else {
                SizeofArg::Expr(Box::new(self.parse_expr()))
            };
            self.expect_punct(Punct::RParen);
            let span = start.merge(self.prev_span());
            return Expr {
                kind: ExprKind::Sizeof(arg),
                span,
            };
        }

        if self.eat_keyword(Keyword::Fun).is_some() {
            let (params, _) = self.parse_params(false);
            let ret = if self.at_punct(Punct::Lt) {
                Some(self.parse_type_annotation())
            } else {
                None
            };
            let body = if self.eat_punct(Punct::FatArrow).is_some() {
                LambdaBody::Expr(Box::new(self.parse_expr()))
            } else {
                match self.parse_block() {
                    Some(block) => LambdaBody::Block(block),
                    None => LambdaBody::Expr(Box::new(Expr {
                        kind: ExprKind::Literal(Lit::Null),
                        span: start,
                    })),
                }
            };
            let span = start.merge(self.prev_span());
            return Expr {
                kind: ExprKind::Lambda { params, ret, body },
                span,
            };
        }

        if self.eat_keyword(Keyword::Super).is_some() {
            let parent = if self.eat_punct(Punct::ColonColon).is_some() {
                Some(self.expect_ident())
            } else {
                None
            };
            let mut args = Vec::new();
            let mut init_fields = Vec::new();
            if self.at_punct(Punct::LParen) {
                args = self.parse_call_args();
            } else if self.at_punct(Punct::LBrace) {
                init_fields = self.parse_field_inits();
            }
            let span = start.merge(self.prev_span());
            return Expr {
                kind: ExprKind::Super {
                    parent,
                    args,
                    init_fields,
                },
                span,
            };
        }

        if self.eat_keyword(Keyword::Quote).is_some() {
            let body = self.parse_block().unwrap_or(Block {
                stmts: Vec::new(),
                span: start,
            });
            let span = start.merge(self.prev_span());
            return Expr {
                kind: ExprKind::Quote { body },
                span,
            };
        }

        if self.eat_keyword(Keyword::SelfUpper).is_some() {
            let name = Ident {
                name: "Self".to_string(),
                span: start,
            };
            let args = if self.at_punct(Punct::LParen) {
                self.parse_call_args()
            } else {
                Vec::new()
            };
            let span = start.merge(self.prev_span());
            return Expr {
                kind: ExprKind::Call {
                    name,
                    generic_args: Vec::new(),
                    args,
                },
                span,
            };
        }

        if self.eat_punct(Punct::Dollar).is_some() {
            let name = self.expect_ident();
            if self.at_punct(Punct::LBrace) {
                let body = self.parse_block().unwrap_or(Block {
                    stmts: Vec::new(),
                    span: start,
                });
                let span = start.merge(self.prev_span());
                return Expr {
                    kind: ExprKind::MacroInvoke { name, body },
                    span,
                };
            }
            let args = if self.at_punct(Punct::LParen) {
                self.parse_call_args()
            } else {
                Vec::new()
            };
            let span = start.merge(self.prev_span());
            return Expr {
                kind: ExprKind::MacroCall { name, args },
                span,
            };
        }

        if let TokenKind::Ident(_) = self.peek_kind() {
            let name = self.expect_ident();

            if self.at_punct(Punct::ColonColon) {
                // Name::<T>(...), Name::<T> { ... }, or Name::method(...)
                self.advance();
                if self.at_punct(Punct::Lt) {
                    let generic_args = self.parse_generic_args();
                    if self.at_punct(Punct::LBrace) && self.struct_lit_ahead() {
                        let fields = self.parse_field_inits();
                        let span = start.merge(self.prev_span());
                        return Expr {
                            kind: ExprKind::StructLit {
                                name,
                                generic_args,
                                fields,
                            },
                            span,
                        };
                    }
                    let args = self.parse_call_args();
                    let span = start.merge(self.prev_span());
                    return Expr {
                        kind: ExprKind::Call {
                            name,
                            generic_args,
                            args,
                        },
                        span,
                    };
                }
                let method = self.expect_ident();
                let args = self.parse_call_args();
                let span = start.merge(self.prev_span());
                let ty = TypeExpr {
                    kind: TypeExprKind::Named {
                        name: name.clone(),
                        generics: Vec::new(),
                    },
                    span: name.span,
                };
                return Expr {
                    kind: ExprKind::StaticCall {
                        ty,
                        name: method,
                        args,
                    },
                    span,
                };
            }

            if self.at_punct(Punct::LParen) {
                let args = self.parse_call_args();
                let span = start.merge(self.prev_span());
                return Expr {
                    kind: ExprKind::Call {
                        name,
                        generic_args: Vec::new(),
                        args,
                    },
                    span,
                };
            }

            if self.at_punct(Punct::LBrace) && self.struct_lit_ahead() {
                let fields = self.parse_field_inits();
                let span = start.merge(self.prev_span());
                return Expr {
                    kind: ExprKind::StructLit {
                        name,
                        generic_args: Vec::new(),
                        fields,
                    },
                    span,
                };
            }

            let span = name.span;
            return Expr {
                kind: ExprKind::Ident(name),
                span,
            };
        }

        self.error_here("expected an expression");
        self.advance();
        Expr {
            kind: ExprKind::Literal(Lit::Null),
            span: start,
        }
    }

    fn parse_call_args(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        self.expect_punct(Punct::LParen);
        if !self.at_punct(Punct::RParen) {
            loop {
                args.push(self.parse_expr());
                if self.eat_punct(Punct::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen);
        args
    }

    fn parse_field_inits(&mut self) -> Vec<(Ident, Expr)> {
        let mut fields = Vec::new();
        self.expect_punct(Punct::LBrace);
        while !self.at_punct(Punct::RBrace) && !self.at_eof() {
            let name = self.expect_ident();
            if name.name.is_empty() {
                break;
            }
            self.expect_punct(Punct::Colon);
            let value = self.parse_expr();
            fields.push((name, value));
            if self.eat_punct(Punct::Comma).is_none() {
                break;
            }
        }
        self.expect_punct(Punct::RBrace);
        fields
    }

    fn parse_generic_args(&mut self) -> Vec<TypeExpr> {
        let mut args = Vec::new();
        self.expect_punct(Punct::Lt);
        if !self.at_punct(Punct::Gt) {
            loop {
                args.push(self.parse_type());
                if self.eat_punct(Punct::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect_punct(Punct::Gt);
        args
    }

    // --- Types ---

    fn parse_type_annotation(&mut self) -> TypeExpr {
        self.expect_punct(Punct::Lt);
        let ty = self.parse_type();
        self.expect_punct(Punct::Gt);
        ty
    }

    fn parse_type(&mut self) -> TypeExpr {
        let start = self.peek_span();

        if self.eat_punct(Punct::Amp).is_some() {
            let inner = self.parse_type();
            let span = start.merge(inner.span);
            return TypeExpr {
                kind: TypeExprKind::Pointer(Box::new(inner)),
                span,
            };
        }

        if self.eat_punct(Punct::LBracket).is_some() {
            let elem = self.parse_type();
            let size = if self.eat_punct(Punct::Semicolon).is_some() {
                Some(Box::new(self.parse_expr()))
            } else {
                None
            };
            self.expect_punct(Punct::RBracket);
            let span = start.merge(self.prev_span());
            return TypeExpr {
                kind: TypeExprKind::Array {
                    elem: Box::new(elem),
                    size,
                },
                span,
            };
        }

        if self.eat_keyword(Keyword::Fun).is_some() {
            let mut params = Vec::new();
            self.expect_punct(Punct::LParen);
            if !self.at_punct(Punct::RParen) {
                loop {
                    params.push(self.parse_type());
                    if self.eat_punct(Punct::Comma).is_none() {
                        break;
                    }
                }
            }
            self.expect_punct(Punct::RParen);
            let ret = if self.at_punct(Punct::Lt) {
                Some(Box::new(self.parse_type_annotation()))
            } else {
                None
            };
            let span = start.merge(self.prev_span());
            return TypeExpr {
                kind: TypeExprKind::Function { params, ret },
                span,
            };
        }

        if self.eat_keyword(Keyword::SelfUpper).is_some() {
            return TypeExpr {
                kind: TypeExprKind::Named {
                    name: Ident {
                        name: "Self".to_string(),
                        span: start,
                    },
                    generics: Vec::new(),
                },
                span: start,
            };
        }

        let name = self.expect_ident();
        let generics = if self.at_punct(Punct::Lt) {
            self.parse_generic_args()
        } else {
            Vec::new()
        };
        let span = start.merge(self.prev_span());
        TypeExpr {
            kind: TypeExprKind::Named { name, generics },
            span,
        }
    }

    // --- Token helpers ---

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.tokens[self.tokens.len() - 1])
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_nth(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn peek_span(&self) -> Span {
        self.peek().span
    }

    fn prev_span(&self) -> Span {
        if self.pos == 0 {
            return self.peek_span();
        }
        self.tokens[self.pos - 1].span
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn at_punct(&self, punct: Punct) -> bool {
        matches!(self.peek_kind(), TokenKind::Punct(p) if *p == punct)
    }

    fn eat_punct(&mut self, punct: Punct) -> Option<Span> {
        if self.at_punct(punct) {
            let span = self.peek_span();
            self.advance();
            Some(span)
        } else {
            None
        }
    }

    fn expect_punct(&mut self, punct: Punct) -> Span {
        if let Some(span) = self.eat_punct(punct) {
            span
        } else {
            self.error_here(&format!("expected '{}'", punct_text(punct)));
            self.peek_span()
        }
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(k) if *k == kw)
    }

    fn eat_keyword(&mut self, kw: Keyword) -> Option<Span> {
        if self.at_keyword(kw) {
            let span = self.peek_span();
            self.advance();
            Some(span)
        } else {
            None
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Span {
        if let Some(span) = self.eat_keyword(kw) {
            span
        } else {
            self.error_here("unexpected token");
            self.peek_span()
        }
    }

    fn expect_ident(&mut self) -> Ident {
        if let TokenKind::Ident(name) = self.peek_kind() {
            let ident = Ident {
                name: name.clone(),
                span: self.peek_span(),
            };
            self.advance();
            ident
        } else {
            self.error_here("expected an identifier");
            Ident {
                name: String::new(),
                span: self.peek_span(),
            }
        }
    }

    fn expect_string(&mut self) -> String {
        if let TokenKind::String(value) = self.peek_kind() {
            let value = value.clone();
            self.advance();
            value
        } else {
            self.error_here("expected a string literal");
            String::new()
        }
    }

    // A `fun` token starts a lambda when followed by '(' instead of a name.
    fn lambda_ahead(&self) -> bool {
        matches!(self.peek_nth(1), TokenKind::Punct(Punct::LParen))
    }

    fn struct_lit_ahead(&self) -> bool {
        if !self.at_punct(Punct::LBrace) {
            return false;
        }
        match self.peek_nth(1) {
            TokenKind::Punct(Punct::RBrace) => true,
            TokenKind::Ident(_) => matches!(self.peek_nth(2), TokenKind::Punct(Punct::Colon)),
            _ => false,
        }
    }

    fn error_here(&mut self, msg: &str) {
        let span = self.peek_span();
        self.diags.error(span, msg);
    }

    fn sync_to_next_stmt(&mut self) {
        while !self.at_eof() {
            if self.eat_punct(Punct::Semicolon).is_some() {
                return;
            }
            if self.at_punct(Punct::RBrace) {
                return;
            }
            match self.peek_kind() {
                TokenKind::Keyword(
                    Keyword::Let
                    | Keyword::Const
                    | Keyword::Fun
                    | Keyword::Struct
                    | Keyword::Interface
                    | Keyword::Enum
                    | Keyword::Import
                    | Keyword::Define
                    | Keyword::Macro
                    | Keyword::If
                    | Keyword::While
                    | Keyword::For
                    | Keyword::Foreach
                    | Keyword::Return,
                ) => return,
                _ => self.advance(),
            }
        }
    }
}

fn punct_text(punct: Punct) -> &'static str {
    match punct {
        Punct::LParen => "(",
        Punct::RParen => ")",
        Punct::LBracket => "[",
        Punct::RBracket => "]",
        Punct::LBrace => "{",
        Punct::RBrace => "}",
        Punct::Comma => ",",
        Punct::Semicolon => ";",
        Punct::Colon => ":",
        Punct::ColonColon => "::",
        Punct::Dot => ".",
        Punct::Ellipsis => "...",
        Punct::Arrow => "->",
        Punct::FatArrow => "=>",
        Punct::Assign => "=",
        Punct::PlusAssign => "+=",
        Punct::MinusAssign => "-=",
        Punct::StarAssign => "*=",
        Punct::SlashAssign => "/=",
        Punct::EqEq => "==",
        Punct::NotEq => "!=",
        Punct::Lt => "<",
        Punct::LtEq => "<=",
        Punct::Gt => ">",
        Punct::GtEq => ">=",
        Punct::AndAnd => "&&",
        Punct::OrOr => "||",
        Punct::Plus => "+",
        Punct::Minus => "-",
        Punct::Star => "*",
        Punct::Slash => "/",
        Punct::Percent => "%",
        Punct::Amp => "&",
        Punct::Bang => "!",
        Punct::Question => "?",
        Punct::Tilde => "~",
        Punct::Dollar => "$",
    }
}
