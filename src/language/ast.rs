use crate::language::{
    bitvector::{Bitvector, Mask},
    span::Span,
    static_env::StaticEnv,
    types::Ty,
};
use std::fmt;

pub type Identifier = String;

/// Source dialect of a subprogram. V0 keeps the legacy rule that assigning
/// to an unbound name declares it; V1 rejects it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Version {
    V0,
    V1,
}

/// A fully type-checked program together with the checker's static view.
#[derive(Clone, Debug)]
pub struct Program {
    pub decls: Vec<Decl>,
    pub static_env: StaticEnv,
}

#[derive(Clone, Debug)]
pub enum Decl {
    Func(FuncDecl),
    GlobalStorage(GlobalDecl),
    Type(TypeDecl),
}

#[derive(Clone, Debug)]
pub struct FuncDecl {
    pub name: Identifier,
    pub version: Version,
    /// Named (type) parameters, in declaration order.
    pub parameters: Vec<Identifier>,
    /// Positional arguments.
    pub args: Vec<TypedArg>,
    pub return_type: Option<Ty>,
    pub body: SubprogramBody,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct TypedArg {
    pub name: Identifier,
    pub ty: Ty,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum SubprogramBody {
    Statements(Stmt),
    Primitive,
}

#[derive(Clone, Debug)]
pub struct GlobalDecl {
    pub kind: GlobalKind,
    pub name: Identifier,
    pub ty: Option<Ty>,
    pub initializer: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlobalKind {
    Var,
    Let,
    Constant,
    Config,
}

#[derive(Clone, Debug)]
pub struct TypeDecl {
    pub name: Identifier,
    pub ty: Ty,
    pub supertype: Option<Identifier>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum Literal {
    Bool(bool),
    Int(i128),
    Real(f64),
    Str(String),
    Bits(Bitvector),
}

#[derive(Clone, Debug)]
pub enum Expr {
    Literal(Literal, Span),
    Var(Identifier, Span),
    Binop {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Unop {
        op: UnOp,
        operand: Box<Expr>,
        span: Span,
    },
    Cond {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
        span: Span,
    },
    Slice {
        base: Box<Expr>,
        slices: Vec<Slice>,
        span: Span,
    },
    Call {
        name: Identifier,
        args: Vec<Expr>,
        named_args: Vec<(Identifier, Expr)>,
        span: Span,
    },
    GetArray {
        base: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    /// Tuple projection with a compile-time index.
    GetItem {
        base: Box<Expr>,
        index: usize,
        span: Span,
    },
    GetField {
        base: Box<Expr>,
        field: Identifier,
        span: Span,
    },
    /// Concatenation of several bitvector-valued fields of a record,
    /// first field most significant.
    GetFields {
        base: Box<Expr>,
        fields: Vec<Identifier>,
        span: Span,
    },
    Record {
        name: Identifier,
        fields: Vec<(Identifier, Expr)>,
        span: Span,
    },
    Concat(Vec<Expr>, Span),
    Tuple(Vec<Expr>, Span),
    Unknown(Box<Ty>, Span),
    Pattern {
        expr: Box<Expr>,
        pattern: Box<Pattern>,
        span: Span,
    },
    AsType {
        expr: Box<Expr>,
        ty: Box<Ty>,
        span: Span,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    // short-circuit boolean forms, desugared by the evaluator
    BoolAnd,
    BoolOr,
    BoolImpl,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    DivRm,
    Mod,
    Shl,
    Shr,
    Pow,
    RDiv,
    // strict bitvector forms
    And,
    Or,
    Xor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BNot,
}

#[derive(Clone, Debug)]
pub enum Slice {
    /// `x[i]` — one bit.
    Single(Expr),
    /// `x[hi:lo]`.
    Range(Expr, Expr),
    /// `x[lo +: len]`.
    Length(Expr, Expr),
    /// `x[factor *: len]`.
    Scaled(Expr, Expr),
}

#[derive(Clone, Debug)]
pub enum LExpr {
    Discard(Span),
    Var(Identifier, Span),
    Slice {
        base: Box<LExpr>,
        slices: Vec<Slice>,
        span: Span,
    },
    SetArray {
        base: Box<LExpr>,
        index: Box<Expr>,
        span: Span,
    },
    SetField {
        base: Box<LExpr>,
        field: Identifier,
        span: Span,
    },
    /// Destructure a bitvector into several fields of a record; the
    /// `(offset, length)` pairs locating each field's bits in the source
    /// come from the type checker.
    SetFields {
        base: Box<LExpr>,
        fields: Vec<Identifier>,
        slices: Vec<(usize, usize)>,
        span: Span,
    },
    Destructuring(Vec<LExpr>, Span),
    Concat {
        parts: Vec<LExpr>,
        widths: Option<Vec<usize>>,
        span: Span,
    },
}

#[derive(Clone, Debug)]
pub enum Pattern {
    All(Span),
    Any(Vec<Pattern>, Span),
    Not(Box<Pattern>, Span),
    Single(Expr),
    Geq(Expr),
    Leq(Expr),
    Range(Expr, Expr, Span),
    Mask(Mask, Span),
    Tuple(Vec<Pattern>, Span),
}

#[derive(Clone, Debug)]
pub enum Stmt {
    Pass(Span),
    Seq(Box<Stmt>, Box<Stmt>),
    Decl {
        kind: LocalDeclKind,
        item: LocalDeclItem,
        initializer: Option<Expr>,
        span: Span,
    },
    Assign {
        lhs: LExpr,
        rhs: Expr,
        span: Span,
    },
    Call {
        name: Identifier,
        args: Vec<Expr>,
        named_args: Vec<(Identifier, Expr)>,
        span: Span,
    },
    Return(Option<Expr>, Span),
    Cond {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    Case {
        discriminant: Expr,
        arms: Vec<CaseArm>,
        otherwise: Option<Box<Stmt>>,
        span: Span,
    },
    Assert(Expr, Span),
    While {
        cond: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    Repeat {
        body: Box<Stmt>,
        cond: Expr,
        span: Span,
    },
    For {
        index: Identifier,
        start: Expr,
        end: Expr,
        direction: ForDirection,
        body: Box<Stmt>,
        span: Span,
    },
    Throw(Option<(Expr, Option<Ty>)>, Span),
    Try {
        body: Box<Stmt>,
        catchers: Vec<Catcher>,
        otherwise: Option<Box<Stmt>>,
        span: Span,
    },
    Print {
        args: Vec<Expr>,
        newline: bool,
        span: Span,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalDeclKind {
    Var,
    Let,
    Constant,
}

#[derive(Clone, Debug)]
pub enum LocalDeclItem {
    Discard,
    Var(Identifier),
    Typed(Box<LocalDeclItem>, Box<Ty>),
    Tuple(Vec<LocalDeclItem>),
}

#[derive(Clone, Debug)]
pub struct CaseArm {
    pub pattern: Pattern,
    pub body: Stmt,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForDirection {
    Up,
    Down,
}

#[derive(Clone, Debug)]
pub struct Catcher {
    pub binder: Option<Identifier>,
    pub ty: Ty,
    pub body: Stmt,
    pub span: Span,
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal(_, span)
            | Expr::Var(_, span)
            | Expr::Concat(_, span)
            | Expr::Tuple(_, span)
            | Expr::Unknown(_, span) => *span,
            Expr::Binop { span, .. }
            | Expr::Unop { span, .. }
            | Expr::Cond { span, .. }
            | Expr::Slice { span, .. }
            | Expr::Call { span, .. }
            | Expr::GetArray { span, .. }
            | Expr::GetItem { span, .. }
            | Expr::GetField { span, .. }
            | Expr::GetFields { span, .. }
            | Expr::Record { span, .. }
            | Expr::Pattern { span, .. }
            | Expr::AsType { span, .. } => *span,
        }
    }

    /// True when evaluation cannot touch the environment: no calls, no
    /// slices, no allocation of mutable state. Used to commit conditional
    /// expressions without a branching event.
    pub fn is_simple(&self) -> bool {
        match self {
            Expr::Literal(..) | Expr::Var(..) => true,
            Expr::Unop { operand, .. } => operand.is_simple(),
            Expr::Binop { lhs, rhs, .. } => lhs.is_simple() && rhs.is_simple(),
            Expr::Cond {
                cond,
                then_branch,
                else_branch,
                ..
            } => cond.is_simple() && then_branch.is_simple() && else_branch.is_simple(),
            Expr::GetItem { base, .. } | Expr::GetField { base, .. } => base.is_simple(),
            Expr::Tuple(items, _) => items.iter().all(Expr::is_simple),
            _ => false,
        }
    }
}

impl LExpr {
    pub fn span(&self) -> Span {
        match self {
            LExpr::Discard(span) | LExpr::Var(_, span) | LExpr::Destructuring(_, span) => *span,
            LExpr::Slice { span, .. }
            | LExpr::SetArray { span, .. }
            | LExpr::SetField { span, .. }
            | LExpr::SetFields { span, .. }
            | LExpr::Concat { span, .. } => *span,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(true) => write!(f, "TRUE"),
            Literal::Bool(false) => write!(f, "FALSE"),
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Real(v) => write!(f, "{v:?}"),
            Literal::Str(v) => write!(f, "\"{v}\""),
            Literal::Bits(v) => write!(f, "{v}"),
        }
    }
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::BoolAnd => "&&",
            BinOp::BoolOr => "||",
            BinOp::BoolImpl => "-->",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "DIV",
            BinOp::DivRm => "DIVRM",
            BinOp::Mod => "MOD",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Pow => "^",
            BinOp::RDiv => "/",
            BinOp::And => "AND",
            BinOp::Or => "OR",
            BinOp::Xor => "EOR",
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(lit, _) => write!(f, "{lit}"),
            Expr::Var(name, _) => write!(f, "{name}"),
            Expr::Binop { op, lhs, rhs, .. } => write!(f, "({lhs} {op} {rhs})"),
            Expr::Unop { op, operand, .. } => match op {
                UnOp::Neg => write!(f, "(- {operand})"),
                UnOp::Not => write!(f, "(! {operand})"),
                UnOp::BNot => write!(f, "(NOT {operand})"),
            },
            Expr::Cond {
                cond,
                then_branch,
                else_branch,
                ..
            } => write!(f, "(if {cond} then {then_branch} else {else_branch})"),
            Expr::Slice { base, slices, .. } => {
                write!(f, "{base}[")?;
                write_slices(f, slices)?;
                write!(f, "]")
            }
            Expr::Call {
                name,
                args,
                named_args,
                ..
            } => {
                write!(f, "{name}(")?;
                let mut first = true;
                for arg in args {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{arg}")?;
                }
                for (n, arg) in named_args {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{n}: {arg}")?;
                }
                write!(f, ")")
            }
            Expr::GetArray { base, index, .. } => write!(f, "{base}[{index}]"),
            Expr::GetItem { base, index, .. } => write!(f, "{base}.item{index}"),
            Expr::GetField { base, field, .. } => write!(f, "{base}.{field}"),
            Expr::GetFields { base, fields, .. } => {
                write!(f, "{base}.[")?;
                for (idx, field) in fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, "]")
            }
            Expr::Record { name, fields, .. } => {
                write!(f, "{name} {{")?;
                for (idx, (field, value)) in fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}: {value}")?;
                }
                write!(f, "}}")
            }
            Expr::Concat(parts, _) => {
                write!(f, "[")?;
                for (idx, part) in parts.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{part}")?;
                }
                write!(f, "]")
            }
            Expr::Tuple(items, _) => {
                write!(f, "(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Expr::Unknown(ty, _) => write!(f, "UNKNOWN: {ty}"),
            Expr::Pattern { expr, pattern, .. } => write!(f, "{expr} IN {pattern}"),
            Expr::AsType { expr, ty, .. } => write!(f, "{expr} AS {ty}"),
        }
    }
}

fn write_slices(f: &mut fmt::Formatter<'_>, slices: &[Slice]) -> fmt::Result {
    for (idx, slice) in slices.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        match slice {
            Slice::Single(e) => write!(f, "{e}")?,
            Slice::Range(hi, lo) => write!(f, "{hi}:{lo}")?,
            Slice::Length(lo, len) => write!(f, "{lo}+:{len}")?,
            Slice::Scaled(factor, len) => write!(f, "{factor}*:{len}")?,
        }
    }
    Ok(())
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::All(_) => write!(f, "-"),
            Pattern::Any(ps, _) => {
                write!(f, "{{")?;
                for (idx, p) in ps.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, "}}")
            }
            Pattern::Not(p, _) => write!(f, "!{p}"),
            Pattern::Single(e) => write!(f, "{e}"),
            Pattern::Geq(e) => write!(f, ">= {e}"),
            Pattern::Leq(e) => write!(f, "<= {e}"),
            Pattern::Range(lo, hi, _) => write!(f, "{lo}..{hi}"),
            Pattern::Mask(mask, _) => write!(f, "{mask}"),
            Pattern::Tuple(ps, _) => {
                write!(f, "(")?;
                for (idx, p) in ps.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
        }
    }
}
