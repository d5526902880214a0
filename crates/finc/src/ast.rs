use crate::span::Span;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum StmtKind {
    Var(VarDecl),
    Fun(FnDecl),
    Struct(StructDecl),
    Interface(StructDecl),
    Enum(EnumDecl),
    Define(DefineDecl),
    Import(ImportDecl),
    Macro(MacroDecl),
    Block(Block),
    Return {
        value: Option<Expr>,
    },
    Expr(Expr),
    If {
        cond: Expr,
        then_block: Block,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Block,
    },
    Foreach {
        var: Ident,
        var_ty: TypeExpr,
        iter: Expr,
        body: Block,
    },
    Break,
    Continue,
    Delete {
        expr: Expr,
    },
    TryCatch {
        try_block: Block,
        catch_var: Ident,
        catch_ty: TypeExpr,
        catch_block: Block,
    },
    Blame {
        expr: Expr,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: Ident,
    pub is_mutable: bool,
    pub ty: Option<TypeExpr>,
    pub init: Option<Expr>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FnDecl {
    pub name: Ident,
    pub generics: Vec<GenericParam>,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub body: Option<Block>,
    pub is_static: bool,
    pub is_public: bool,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenericParam {
    pub name: Ident,
    pub constraint: Option<TypeExpr>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeExpr,
    pub default: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: Ident,
    pub generics: Vec<GenericParam>,
    pub parents: Vec<TypeExpr>,
    pub members: Vec<MemberDecl>,
    pub methods: Vec<FnDecl>,
    pub operators: Vec<OperatorDecl>,
    pub constructors: Vec<CtorDecl>,
    pub destructor: Option<DtorDecl>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemberDecl {
    pub name: Ident,
    pub ty: TypeExpr,
    pub is_public: bool,
    pub default: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperatorDecl {
    pub op: BinOp,
    pub generics: Vec<GenericParam>,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub body: Option<Block>,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CtorDecl {
    pub params: Vec<Param>,
    pub body: Option<Block>,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DtorDecl {
    pub body: Option<Block>,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: Ident,
    pub values: Vec<(Ident, Option<Expr>)>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DefineDecl {
    pub name: Ident,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub is_vararg: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImportDecl {
    pub source: String,
    pub is_package: bool,
    pub targets: Vec<Ident>,
    pub alias: Option<Ident>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MacroDecl {
    pub name: Ident,
    pub params: Vec<Ident>,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Lit),
    Ident(Ident),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    Call {
        name: Ident,
        generic_args: Vec<TypeExpr>,
        args: Vec<Expr>,
    },
    MethodCall {
        recv: Box<Expr>,
        name: Ident,
        args: Vec<Expr>,
    },
    StaticCall {
        ty: TypeExpr,
        name: Ident,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        name: Ident,
    },
    StructLit {
        name: Ident,
        generic_args: Vec<TypeExpr>,
        fields: Vec<(Ident, Expr)>,
    },
    New {
        ty: TypeExpr,
        args: Vec<Expr>,
        init_fields: Vec<(Ident, Expr)>,
    },
    ArrayLit(Vec<Expr>),
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Cast {
        ty: TypeExpr,
        expr: Box<Expr>,
    },
    Sizeof(SizeofArg),
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Lambda {
        params: Vec<Param>,
        ret: Option<TypeExpr>,
        body: LambdaBody,
    },
    Super {
        parent: Option<Ident>,
        args: Vec<Expr>,
        init_fields: Vec<(Ident, Expr)>,
    },
    MacroCall {
        name: Ident,
        args: Vec<Expr>,
    },
    MacroInvoke {
        name: Ident,
        body: Block,
    },
    Quote {
        body: Block,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Lit {
    Int(i64),
    Float(f64),
    Str(String),
    Char(char),
    Bool(bool),
    Null,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SizeofArg {
    Type(TypeExpr),
    Expr(Box<Expr>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LambdaBody {
    Block(Block),
    Expr(Box<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinOp {
    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            BinOp::Assign
                | BinOp::AddAssign
                | BinOp::SubAssign
                | BinOp::MulAssign
                | BinOp::DivAssign
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::NotEq | BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Assign => "=",
            BinOp::AddAssign => "+=",
            BinOp::SubAssign => "-=",
            BinOp::MulAssign => "*=",
            BinOp::DivAssign => "/=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    Ref,
    Deref,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TypeExprKind {
    Named {
        name: Ident,
        generics: Vec<TypeExpr>,
    },
    Pointer(Box<TypeExpr>),
    Array {
        elem: Box<TypeExpr>,
        size: Option<Box<Expr>>,
    },
    Function {
        params: Vec<TypeExpr>,
        ret: Option<Box<TypeExpr>>,
    },
}

impl TypeExpr {
    pub fn pointer_depth(&self) -> usize {
        match &self.kind {
            TypeExprKind::Pointer(inner) => 1 + inner.pointer_depth(),
            _ => 0,
        }
    }
}
