use crate::language::{
    ast::{
        BinOp, Catcher, Decl, Expr, ForDirection, FuncDecl, GlobalDecl, GlobalKind, LExpr,
        Literal, LocalDeclItem, LocalDeclKind, Pattern, Program, Stmt, SubprogramBody, TypeDecl,
        TypedArg, Version,
    },
    bitvector::Bitvector,
    span::Span,
    static_env::StaticEnv,
    types::Ty,
};
use crate::runtime::{
    error::EvalResult, native::NativeBackend, value::NativeValue, Config, Interpreter,
};

pub fn sp() -> Span {
    Span::default()
}

pub fn int(value: i128) -> Expr {
    Expr::Literal(Literal::Int(value), sp())
}

pub fn boolean(value: bool) -> Expr {
    Expr::Literal(Literal::Bool(value), sp())
}

pub fn bits(text: &str) -> Expr {
    Expr::Literal(Literal::Bits(Bitvector::parse(text).expect("bit literal")), sp())
}

pub fn var(name: &str) -> Expr {
    Expr::Var(name.into(), sp())
}

pub fn binop(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binop {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        span: sp(),
    }
}

pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    binop(BinOp::Add, lhs, rhs)
}

pub fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call {
        name: name.into(),
        args,
        named_args: Vec::new(),
        span: sp(),
    }
}

pub fn get_field(base: Expr, field: &str) -> Expr {
    Expr::GetField {
        base: Box::new(base),
        field: field.into(),
        span: sp(),
    }
}

pub fn record(ty: &str, fields: Vec<(&str, Expr)>) -> Expr {
    Expr::Record {
        name: ty.into(),
        fields: fields
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect(),
        span: sp(),
    }
}

pub fn cond_expr(cond: Expr, then_branch: Expr, else_branch: Expr) -> Expr {
    Expr::Cond {
        cond: Box::new(cond),
        then_branch: Box::new(then_branch),
        else_branch: Box::new(else_branch),
        span: sp(),
    }
}

pub fn in_pattern(expr: Expr, pattern: Pattern) -> Expr {
    Expr::Pattern {
        expr: Box::new(expr),
        pattern: Box::new(pattern),
        span: sp(),
    }
}

/// Right-fold a statement list into `Seq`.
pub fn seq(stmts: Vec<Stmt>) -> Stmt {
    let mut iter = stmts.into_iter().rev();
    let mut acc = match iter.next() {
        Some(last) => last,
        None => return Stmt::Pass(sp()),
    };
    for stmt in iter {
        acc = Stmt::Seq(Box::new(stmt), Box::new(acc));
    }
    acc
}

pub fn assign(name: &str, rhs: Expr) -> Stmt {
    assign_to(LExpr::Var(name.into(), sp()), rhs)
}

pub fn assign_to(lhs: LExpr, rhs: Expr) -> Stmt {
    Stmt::Assign { lhs, rhs, span: sp() }
}

pub fn ret(value: Expr) -> Stmt {
    Stmt::Return(Some(value), sp())
}

pub fn decl_var(name: &str, init: Expr) -> Stmt {
    Stmt::Decl {
        kind: LocalDeclKind::Var,
        item: LocalDeclItem::Var(name.into()),
        initializer: Some(init),
        span: sp(),
    }
}

/// `var name: ty;` — no initialiser, so the base value applies.
pub fn decl_typed(name: &str, ty: Ty) -> Stmt {
    Stmt::Decl {
        kind: LocalDeclKind::Var,
        item: LocalDeclItem::Typed(Box::new(LocalDeclItem::Var(name.into())), Box::new(ty)),
        initializer: None,
        span: sp(),
    }
}

pub fn if_stmt(cond: Expr, then_branch: Stmt) -> Stmt {
    Stmt::Cond {
        cond,
        then_branch: Box::new(then_branch),
        else_branch: None,
        span: sp(),
    }
}

pub fn for_stmt(index: &str, start: Expr, end: Expr, body: Stmt) -> Stmt {
    Stmt::For {
        index: index.into(),
        start,
        end,
        direction: ForDirection::Up,
        body: Box::new(body),
        span: sp(),
    }
}

pub fn throw(exception_ty: &str, fields: Vec<(&str, Expr)>) -> Stmt {
    Stmt::Throw(
        Some((
            record(exception_ty, fields),
            Some(Ty::Named(exception_ty.into())),
        )),
        sp(),
    )
}

pub fn rethrow() -> Stmt {
    Stmt::Throw(None, sp())
}

pub fn catcher(ty: &str, binder: Option<&str>, body: Stmt) -> Catcher {
    Catcher {
        binder: binder.map(Into::into),
        ty: Ty::Named(ty.into()),
        body,
        span: sp(),
    }
}

pub fn try_stmt(body: Stmt, catchers: Vec<Catcher>) -> Stmt {
    Stmt::Try {
        body: Box::new(body),
        catchers,
        otherwise: None,
        span: sp(),
    }
}

/// An integer-returning, argument-less subprogram.
pub fn func(name: &str, body: Stmt) -> Decl {
    func_full(name, Version::V1, Vec::new(), Vec::new(), Some(Ty::integer()), body)
}

pub fn procedure(name: &str, body: Stmt) -> Decl {
    func_full(name, Version::V1, Vec::new(), Vec::new(), None, body)
}

pub fn func_returning(name: &str, return_type: Ty, body: Stmt) -> Decl {
    func_full(name, Version::V1, Vec::new(), Vec::new(), Some(return_type), body)
}

pub fn func_full(
    name: &str,
    version: Version,
    parameters: Vec<&str>,
    args: Vec<(&str, Ty)>,
    return_type: Option<Ty>,
    body: Stmt,
) -> Decl {
    Decl::Func(FuncDecl {
        name: name.into(),
        version,
        parameters: parameters.into_iter().map(Into::into).collect(),
        args: args
            .into_iter()
            .map(|(arg_name, ty)| TypedArg {
                name: arg_name.into(),
                ty,
                span: sp(),
            })
            .collect(),
        return_type,
        body: SubprogramBody::Statements(body),
        span: sp(),
    })
}

pub fn global_var(name: &str, init: Expr) -> Decl {
    Decl::GlobalStorage(GlobalDecl {
        kind: GlobalKind::Var,
        name: name.into(),
        ty: None,
        initializer: Some(init),
        span: sp(),
    })
}

pub fn exception_type(name: &str, fields: Vec<(&str, Ty)>) -> Decl {
    Decl::Type(TypeDecl {
        name: name.into(),
        ty: Ty::Exception(
            fields
                .into_iter()
                .map(|(field, ty)| (field.into(), ty))
                .collect(),
        ),
        supertype: None,
        span: sp(),
    })
}

pub fn program(decls: Vec<Decl>) -> Program {
    Program {
        decls,
        static_env: StaticEnv::new(),
    }
}

pub fn run_program(program: &Program) -> EvalResult<NativeValue> {
    let mut interpreter = Interpreter::new(NativeBackend::new(), Config::default());
    interpreter.run(program, Vec::new())
}

/// Wrap a `main` body and run it on the native backend.
pub fn run_main(body: Stmt) -> EvalResult<NativeValue> {
    run_program(&program(vec![func("main", body)]))
}
