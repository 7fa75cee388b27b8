use crate::language::{
    ast::{
        BinOp, Catcher, Decl, Expr, ForDirection, FuncDecl, GlobalDecl, Identifier, LExpr,
        Literal, LocalDeclItem, Pattern, Program, Slice, Stmt, SubprogramBody, UnOp, Version,
    },
    bitvector::Bitvector,
    span::Span,
    types::{ArrayLength, IntConstraint, IntConstraints, Ty},
};
use crate::runtime::{
    backend::{Backend, PrimitiveRun},
    environment::{AssignTarget, Env, FuncEntry, GlobalEnv, LocalEnv, Lookup, Scope},
    error::{EvalError, EvalResult},
    trace::{NoTrace, RuleTracer, SemanticsRule},
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::mem;
use std::rc::Rc;

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Iteration budget for loops whose condition is undetermined.
    pub unroll: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self { unroll: 16 }
    }
}

/// Result of evaluating a fragment: either a value with the updated
/// environment, or an ASL exception in flight. `Throwing(None, _)` is a
/// bare `throw;` looking for its enclosing catcher.
#[derive(Debug)]
pub enum Out<T, V> {
    Val(T),
    Throwing(Option<ThrownValue<V>>, Env<V>),
}

/// An exception payload together with its dynamic type and the identifier
/// the throw site wrote it to, for read-effect emission at the catcher.
#[derive(Clone, Debug)]
pub struct ThrownValue<V> {
    pub value: V,
    pub name: Identifier,
    pub scope: Scope,
    pub ty: Ty,
}

#[derive(Debug)]
pub enum Control<V> {
    Continuing(Env<V>),
    Returning(Vec<V>, GlobalEnv<V>),
}

/// A returned value tagged with the identifier and scope it was written
/// under, so the caller can emit the matching read effect.
#[derive(Clone, Debug)]
pub struct ReadFrom<V> {
    pub value: V,
    pub name: Identifier,
    pub scope: Scope,
}

/// Unwrap a `Val`, or pass a pending exception straight through.
macro_rules! proceed {
    ($out:expr) => {
        match $out {
            Out::Val(value) => value,
            Out::Throwing(exc, env) => return Ok(Out::Throwing(exc, env)),
        }
    };
}

pub struct Interpreter<B: Backend> {
    backend: B,
    config: Config,
    tracer: Box<dyn RuleTracer>,
    primitives: HashMap<Identifier, PrimitiveRun<B>>,
    primitive_decls: Vec<FuncDecl>,
    version: Version,
    thrown_counter: usize,
}

impl<B: Backend> Interpreter<B> {
    pub fn new(backend: B, config: Config) -> Self {
        Self::with_tracer(backend, config, Box::new(NoTrace))
    }

    pub fn with_tracer(backend: B, config: Config, tracer: Box<dyn RuleTracer>) -> Self {
        let mut primitives = HashMap::new();
        let mut primitive_decls = Vec::new();
        for primitive in B::primitives() {
            primitives.insert(primitive.decl.name.clone(), primitive.run);
            primitive_decls.push(primitive.decl);
        }
        Self {
            backend,
            config,
            tracer,
            primitives,
            primitive_decls,
            version: Version::V1,
            thrown_counter: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn trace(&mut self, rule: SemanticsRule) {
        self.tracer.on_rule(rule);
    }

    /// Build the global environment and evaluate `main`, which must take
    /// nothing and return exactly one value.
    pub fn run(
        &mut self,
        program: &Program,
        seed: Vec<(Identifier, B::Value)>,
    ) -> EvalResult<B::Value> {
        let genv = self.build_genv(program, seed)?;
        let (shape_ok, main_span) = {
            let entry =
                genv.funcs
                    .get("main")
                    .ok_or_else(|| EvalError::UndefinedIdentifier {
                        name: "main".into(),
                        span: Span::default(),
                    })?;
            let decl = &entry.decl;
            (
                decl.args.is_empty() && decl.parameters.is_empty() && decl.return_type.is_some(),
                decl.span,
            )
        };
        if !shape_ok {
            return Err(EvalError::MismatchedReturnValue {
                name: "main".into(),
                span: main_span,
            });
        }
        let env = Env::new(LocalEnv::new(Scope::Global { init: false }), genv);
        match self.eval_call(main_span, "main", env, &[], &[])? {
            Out::Val((mut reads, _env)) => {
                if reads.len() != 1 {
                    return Err(EvalError::MismatchedReturnValue {
                        name: "main".into(),
                        span: main_span,
                    });
                }
                let returned = reads.remove(0);
                self.backend
                    .on_read_identifier(&returned.name, &returned.scope, &returned.value);
                Ok(returned.value)
            }
            Out::Throwing(Some(thrown), _env) => Err(EvalError::UncaughtException {
                message: format!(
                    "{}: {}",
                    thrown.ty,
                    self.backend.debug_value(&thrown.value)
                ),
            }),
            Out::Throwing(None, _env) => Err(EvalError::UncaughtException {
                message: "rethrow outside of any exception handler".into(),
            }),
        }
    }

    /// Create global storage in declaration-dependency order and register
    /// the function table, primitives first. Seeded identifiers keep their
    /// seed value; their declared initialisers are skipped.
    fn build_genv(
        &mut self,
        program: &Program,
        seed: Vec<(Identifier, B::Value)>,
    ) -> EvalResult<GlobalEnv<B::Value>> {
        let mut static_env = program.static_env.clone();
        for decl in &program.decls {
            if let Decl::Type(td) = decl {
                static_env.declare_type(td.name.clone(), td.ty.clone(), td.supertype.clone());
                if let Ty::Enum(labels) = &td.ty {
                    for (position, label) in labels.iter().enumerate() {
                        static_env
                            .constants
                            .entry(label.clone())
                            .or_insert(position as i128);
                    }
                }
            }
        }

        let mut funcs = BTreeMap::new();
        for decl in self.primitive_decls.clone() {
            funcs.insert(decl.name.clone(), FuncEntry::new(decl));
        }
        for decl in &program.decls {
            if let Decl::Func(fd) = decl {
                funcs.insert(fd.name.clone(), FuncEntry::new(fd.clone()));
            }
        }

        let genv = GlobalEnv::new(static_env, funcs);
        let mut env = Env::new(LocalEnv::new(Scope::Global { init: true }), genv);
        for (name, value) in seed {
            self.backend
                .on_write_identifier(&name, &Scope::Global { init: true }, &value);
            env.declare_global(name, value);
        }

        let globals: Vec<&GlobalDecl> = program
            .decls
            .iter()
            .filter_map(|decl| match decl {
                Decl::GlobalStorage(g) => Some(g),
                _ => None,
            })
            .collect();
        for global in init_order(&globals)? {
            if env.global.storage.contains_key(&global.name) {
                continue;
            }
            let (value, next_env) = match &global.initializer {
                Some(init) => match self.eval_expr(env, init)? {
                    Out::Val(result) => result,
                    Out::Throwing(Some(thrown), _env) => {
                        return Err(EvalError::UncaughtException {
                            message: format!(
                                "{}: {}",
                                thrown.ty,
                                self.backend.debug_value(&thrown.value)
                            ),
                        })
                    }
                    Out::Throwing(None, _env) => {
                        return Err(EvalError::UncaughtException {
                            message: "rethrow outside of any exception handler".into(),
                        })
                    }
                },
                None => {
                    let ty = global
                        .ty
                        .as_ref()
                        .ok_or(EvalError::TypeInferenceNeeded { span: global.span })?;
                    let value = self.base_value(&env, ty, global.span)?;
                    (value, env)
                }
            };
            env = next_env;
            self.backend
                .on_write_identifier(&global.name, &Scope::Global { init: true }, &value);
            env.declare_global(global.name.clone(), value);
        }
        Ok(env.global)
    }

    // ----- expressions ------------------------------------------------

    fn eval_expr(
        &mut self,
        env: Env<B::Value>,
        e: &Expr,
    ) -> EvalResult<Out<(B::Value, Env<B::Value>), B::Value>> {
        match e {
            Expr::Literal(literal, _) => {
                self.trace(SemanticsRule::Literal);
                let v = self.backend.v_of_literal(literal);
                Ok(Out::Val((v, env)))
            }
            Expr::Var(name, span) => match env.find(name) {
                Lookup::Local(v) => {
                    self.trace(SemanticsRule::VarLocal);
                    self.backend.on_read_identifier(name, &env.local.scope, &v);
                    Ok(Out::Val((v, env)))
                }
                Lookup::Global(v) => {
                    self.trace(SemanticsRule::VarGlobal);
                    self.backend.on_read_identifier(name, &env.global_scope(), &v);
                    Ok(Out::Val((v, env)))
                }
                Lookup::NotFound => Err(EvalError::UndefinedIdentifier {
                    name: name.clone(),
                    span: *span,
                }),
            },
            Expr::Binop { op, lhs, rhs, span } => match op {
                BinOp::BoolAnd => {
                    self.trace(SemanticsRule::BinopAnd);
                    let (lv, env) = proceed!(self.eval_expr(env, lhs)?);
                    if self.backend.choice(*span, &lv)? {
                        self.eval_expr(env, rhs)
                    } else {
                        let v = self.backend.v_of_literal(&Literal::Bool(false));
                        Ok(Out::Val((v, env)))
                    }
                }
                BinOp::BoolOr => {
                    self.trace(SemanticsRule::BinopOr);
                    let (lv, env) = proceed!(self.eval_expr(env, lhs)?);
                    if self.backend.choice(*span, &lv)? {
                        let v = self.backend.v_of_literal(&Literal::Bool(true));
                        Ok(Out::Val((v, env)))
                    } else {
                        self.eval_expr(env, rhs)
                    }
                }
                BinOp::BoolImpl => {
                    self.trace(SemanticsRule::BinopImpl);
                    let (lv, env) = proceed!(self.eval_expr(env, lhs)?);
                    if self.backend.choice(*span, &lv)? {
                        self.eval_expr(env, rhs)
                    } else {
                        let v = self.backend.v_of_literal(&Literal::Bool(true));
                        Ok(Out::Val((v, env)))
                    }
                }
                _ => {
                    self.trace(SemanticsRule::Binop);
                    let (lv, env) = proceed!(self.eval_expr(env, lhs)?);
                    let (rv, env) = proceed!(self.eval_expr(env, rhs)?);
                    let v = self.backend.binop(*span, *op, &lv, &rv)?;
                    Ok(Out::Val((v, env)))
                }
            },
            Expr::Unop { op, operand, span } => {
                self.trace(SemanticsRule::Unop);
                let (v, env) = proceed!(self.eval_expr(env, operand)?);
                let v = self.backend.unop(*span, *op, &v)?;
                Ok(Out::Val((v, env)))
            }
            Expr::Cond {
                cond,
                then_branch,
                else_branch,
                span,
            } => {
                let (cv, env) = proceed!(self.eval_expr(env, cond)?);
                if then_branch.is_simple() && else_branch.is_simple() {
                    self.trace(SemanticsRule::CondSimple);
                    let tv = self.eval_expr_sef(&env, then_branch)?;
                    let fv = self.eval_expr_sef(&env, else_branch)?;
                    let v = self.backend.ternary(*span, &cv, tv, fv)?;
                    Ok(Out::Val((v, env)))
                } else {
                    self.trace(SemanticsRule::CondBranch);
                    if self.backend.choice(*span, &cv)? {
                        self.eval_expr(env, then_branch)
                    } else {
                        self.eval_expr(env, else_branch)
                    }
                }
            }
            Expr::Slice { base, slices, span } => {
                self.trace(SemanticsRule::Slice);
                let (bv, env) = proceed!(self.eval_expr(env, base)?);
                let (positions, env) = proceed!(self.eval_slices(env, slices)?);
                let v = self.backend.read_from_bitvector(*span, &bv, &positions)?;
                Ok(Out::Val((v, env)))
            }
            Expr::Call {
                name,
                args,
                named_args,
                span,
            } => {
                self.trace(SemanticsRule::CallExpr);
                let (reads, env) = proceed!(self.eval_call(*span, name, env, args, named_args)?);
                for read in &reads {
                    self.backend
                        .on_read_identifier(&read.name, &read.scope, &read.value);
                }
                let mut reads = reads;
                match reads.len() {
                    0 => Err(EvalError::MismatchedReturnValue {
                        name: name.clone(),
                        span: *span,
                    }),
                    1 => {
                        let read = reads.remove(0);
                        Ok(Out::Val((read.value, env)))
                    }
                    _ => {
                        let values = reads.into_iter().map(|read| read.value).collect();
                        let v = self.backend.create_vector(values);
                        Ok(Out::Val((v, env)))
                    }
                }
            }
            Expr::GetArray { base, index, span } => {
                self.trace(SemanticsRule::GetArray);
                let (av, env) = proceed!(self.eval_expr(env, base)?);
                let (iv, env) = proceed!(self.eval_expr(env, index)?);
                let position = self
                    .backend
                    .v_to_int(&iv)
                    .and_then(|raw| usize::try_from(raw).ok())
                    .ok_or_else(|| EvalError::UnsupportedExpr {
                        expr: index.to_string(),
                        span: *span,
                    })?;
                let v = self.backend.get_index(*span, position, &av)?;
                Ok(Out::Val((v, env)))
            }
            Expr::GetItem { base, index, span } => {
                self.trace(SemanticsRule::GetItem);
                let (bv, env) = proceed!(self.eval_expr(env, base)?);
                let v = self.backend.get_index(*span, *index, &bv)?;
                Ok(Out::Val((v, env)))
            }
            Expr::GetField { base, field, span } => {
                self.trace(SemanticsRule::GetField);
                let (bv, env) = proceed!(self.eval_expr(env, base)?);
                let v = self.backend.get_field(*span, field, &bv)?;
                Ok(Out::Val((v, env)))
            }
            Expr::GetFields { base, fields, span } => {
                self.trace(SemanticsRule::GetFields);
                let (rv, env) = proceed!(self.eval_expr(env, base)?);
                let mut parts = Vec::with_capacity(fields.len());
                for field in fields {
                    parts.push(self.backend.get_field(*span, field, &rv)?);
                }
                let v = self.backend.concat_bitvectors(*span, parts)?;
                Ok(Out::Val((v, env)))
            }
            Expr::Record { fields, .. } => {
                self.trace(SemanticsRule::RecordExpr);
                let mut env = env;
                let mut values = Vec::with_capacity(fields.len());
                for (field, init) in fields {
                    let (v, next) = proceed!(self.eval_expr(env, init)?);
                    env = next;
                    values.push((field.clone(), v));
                }
                let v = self.backend.create_record(values);
                Ok(Out::Val((v, env)))
            }
            Expr::Concat(parts, span) => {
                self.trace(SemanticsRule::Concat);
                let mut env = env;
                let mut values = Vec::with_capacity(parts.len());
                for part in parts {
                    let (v, next) = proceed!(self.eval_expr(env, part)?);
                    env = next;
                    values.push(v);
                }
                let v = self.backend.concat_bitvectors(*span, values)?;
                Ok(Out::Val((v, env)))
            }
            Expr::Tuple(items, _) => {
                self.trace(SemanticsRule::TupleExpr);
                let mut env = env;
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let (v, next) = proceed!(self.eval_expr(env, item)?);
                    env = next;
                    values.push(v);
                }
                let v = self.backend.create_vector(values);
                Ok(Out::Val((v, env)))
            }
            Expr::Unknown(ty, span) => {
                self.trace(SemanticsRule::Unknown);
                let witness = self.base_value(&env, ty, *span)?;
                let v = self.backend.v_unknown_of_type(ty, witness)?;
                Ok(Out::Val((v, env)))
            }
            Expr::Pattern {
                expr,
                pattern,
                span,
            } => {
                self.trace(SemanticsRule::PatternIn);
                let (v, env) = proceed!(self.eval_expr(env, expr)?);
                let matched = self.eval_pattern(&env, *span, &v, pattern)?;
                Ok(Out::Val((matched, env)))
            }
            Expr::AsType { expr, ty, span } => {
                self.trace(SemanticsRule::TypeAssertion);
                let (v, env) = proceed!(self.eval_expr(env, expr)?);
                let ok = self.is_val_of_type(&env, &v, ty, *span)?;
                if self.backend.choice(*span, &ok)? {
                    Ok(Out::Val((v, env)))
                } else {
                    Err(EvalError::MismatchType {
                        value: self.backend.debug_value(&v),
                        expected: ty.to_string(),
                        span: *span,
                    })
                }
            }
        }
    }

    /// Same evaluator on a scratch environment; a throw here means the
    /// type checker mislabelled the expression as side-effect-free.
    fn eval_expr_sef(&mut self, env: &Env<B::Value>, e: &Expr) -> EvalResult<B::Value> {
        match self.eval_expr(env.clone(), e)? {
            Out::Val((v, _env)) => Ok(v),
            Out::Throwing(..) => Err(EvalError::UnexpectedSideEffect {
                message: format!("`{e}` threw an exception"),
                span: e.span(),
            }),
        }
    }

    fn eval_slices(
        &mut self,
        mut env: Env<B::Value>,
        slices: &[Slice],
    ) -> EvalResult<Out<(Vec<(B::Value, B::Value)>, Env<B::Value>), B::Value>> {
        let mut positions = Vec::with_capacity(slices.len());
        for slice in slices {
            match slice {
                Slice::Single(position) => {
                    let (pv, next) = proceed!(self.eval_expr(env, position)?);
                    env = next;
                    let one = self.backend.v_of_int(1);
                    positions.push((pv, one));
                }
                Slice::Range(hi, lo) => {
                    let (hv, next) = proceed!(self.eval_expr(env, hi)?);
                    env = next;
                    let (lv, next) = proceed!(self.eval_expr(env, lo)?);
                    env = next;
                    let span = hi.span();
                    let diff = self.backend.binop(span, BinOp::Sub, &hv, &lv)?;
                    let one = self.backend.v_of_int(1);
                    let length = self.backend.binop(span, BinOp::Add, &diff, &one)?;
                    positions.push((lv, length));
                }
                Slice::Length(lo, length) => {
                    let (lv, next) = proceed!(self.eval_expr(env, lo)?);
                    env = next;
                    let (lenv, next) = proceed!(self.eval_expr(env, length)?);
                    env = next;
                    positions.push((lv, lenv));
                }
                Slice::Scaled(factor, length) => {
                    let (fv, next) = proceed!(self.eval_expr(env, factor)?);
                    env = next;
                    let (lenv, next) = proceed!(self.eval_expr(env, length)?);
                    env = next;
                    let start = self
                        .backend
                        .binop(factor.span(), BinOp::Mul, &fv, &lenv)?;
                    positions.push((start, lenv));
                }
            }
        }
        Ok(Out::Val((positions, env)))
    }

    /// Runtime type membership; boolean-valued so a symbolic backend can
    /// keep the answer undetermined.
    fn is_val_of_type(
        &mut self,
        env: &Env<B::Value>,
        v: &B::Value,
        ty: &Ty,
        span: Span,
    ) -> EvalResult<B::Value> {
        match ty {
            Ty::Int(IntConstraints::Unconstrained) => {
                Ok(self.backend.v_of_literal(&Literal::Bool(true)))
            }
            Ty::Int(IntConstraints::UnderConstrained) => {
                Err(EvalError::UnrespectedParserInvariant { span })
            }
            Ty::Bits(width) => {
                let expected = self.eval_expr_sef(env, width)?;
                let actual = self.backend.bitvector_length(span, v)?;
                self.backend.binop(span, BinOp::Eq, &actual, &expected)
            }
            Ty::Int(IntConstraints::WellConstrained(constraints)) => {
                let mut acc = self.backend.v_of_literal(&Literal::Bool(false));
                for constraint in constraints {
                    let matched = match constraint {
                        IntConstraint::Exact(e) => {
                            let ev = self.eval_expr_sef(env, e)?;
                            self.backend.binop(span, BinOp::Eq, v, &ev)?
                        }
                        IntConstraint::Range(lo, hi) => {
                            let lov = self.eval_expr_sef(env, lo)?;
                            let hiv = self.eval_expr_sef(env, hi)?;
                            let above = self.backend.binop(span, BinOp::Le, &lov, v)?;
                            let below = self.backend.binop(span, BinOp::Le, v, &hiv)?;
                            self.backend.binop(span, BinOp::BoolAnd, &above, &below)?
                        }
                    };
                    acc = self.backend.binop(span, BinOp::BoolOr, &acc, &matched)?;
                }
                Ok(acc)
            }
            _ => Err(EvalError::TypeInferenceNeeded { span }),
        }
    }

    // ----- patterns ---------------------------------------------------

    fn eval_pattern(
        &mut self,
        env: &Env<B::Value>,
        span: Span,
        v: &B::Value,
        pattern: &Pattern,
    ) -> EvalResult<B::Value> {
        match pattern {
            Pattern::All(_) => {
                self.trace(SemanticsRule::PatAll);
                Ok(self.backend.v_of_literal(&Literal::Bool(true)))
            }
            Pattern::Any(patterns, _) => {
                self.trace(SemanticsRule::PatAny);
                let mut acc = self.backend.v_of_literal(&Literal::Bool(false));
                for p in patterns {
                    let matched = self.eval_pattern(env, span, v, p)?;
                    acc = self.backend.binop(span, BinOp::BoolOr, &acc, &matched)?;
                }
                Ok(acc)
            }
            Pattern::Not(p, _) => {
                self.trace(SemanticsRule::PatNot);
                let inner = self.eval_pattern(env, span, v, p)?;
                self.backend.unop(span, UnOp::Not, &inner)
            }
            Pattern::Single(e) => {
                self.trace(SemanticsRule::PatSingle);
                let ev = self.eval_expr_sef(env, e)?;
                self.backend.binop(span, BinOp::Eq, v, &ev)
            }
            Pattern::Geq(e) => {
                self.trace(SemanticsRule::PatGeq);
                let ev = self.eval_expr_sef(env, e)?;
                self.backend.binop(span, BinOp::Ge, v, &ev)
            }
            Pattern::Leq(e) => {
                self.trace(SemanticsRule::PatLeq);
                let ev = self.eval_expr_sef(env, e)?;
                self.backend.binop(span, BinOp::Le, v, &ev)
            }
            Pattern::Range(lo, hi, _) => {
                self.trace(SemanticsRule::PatRange);
                let lov = self.eval_expr_sef(env, lo)?;
                let hiv = self.eval_expr_sef(env, hi)?;
                let above = self.backend.binop(span, BinOp::Ge, v, &lov)?;
                let below = self.backend.binop(span, BinOp::Le, v, &hiv)?;
                self.backend.binop(span, BinOp::BoolAnd, &above, &below)
            }
            Pattern::Mask(mask, _) => {
                self.trace(SemanticsRule::PatMask);
                let set = self
                    .backend
                    .v_of_literal(&Literal::Bits(mask.set_bits().clone()));
                let unset = self
                    .backend
                    .v_of_literal(&Literal::Bits(mask.unset_bits().clone()));
                let v_set = self.backend.binop(span, BinOp::And, v, &set)?;
                let v_not = self.backend.unop(span, UnOp::BNot, v)?;
                let v_unset = self.backend.binop(span, BinOp::And, &v_not, &unset)?;
                let masked = self.backend.binop(span, BinOp::Or, &v_set, &v_unset)?;
                let want = self.backend.binop(span, BinOp::Or, &set, &unset)?;
                self.backend.binop(span, BinOp::Eq, &masked, &want)
            }
            Pattern::Tuple(patterns, _) => {
                self.trace(SemanticsRule::PatTuple);
                let mut acc = self.backend.v_of_literal(&Literal::Bool(true));
                for (position, p) in patterns.iter().enumerate() {
                    let element = self.backend.get_index(span, position, v)?;
                    let matched = self.eval_pattern(env, span, &element, p)?;
                    acc = self.backend.binop(span, BinOp::BoolAnd, &acc, &matched)?;
                }
                Ok(acc)
            }
        }
    }

    // ----- left-hand sides --------------------------------------------

    fn eval_lexpr(
        &mut self,
        le: &LExpr,
        mut env: Env<B::Value>,
        v: B::Value,
    ) -> EvalResult<Out<Env<B::Value>, B::Value>> {
        match le {
            LExpr::Discard(_) => {
                self.trace(SemanticsRule::LeDiscard);
                Ok(Out::Val(env))
            }
            LExpr::Var(name, span) => {
                self.trace(SemanticsRule::LeVar);
                match env.assign(name, v.clone()) {
                    AssignTarget::Local => {
                        let scope = env.local.scope.clone();
                        self.backend.on_write_identifier(name, &scope, &v);
                        Ok(Out::Val(env))
                    }
                    AssignTarget::Global => {
                        let scope = env.global_scope();
                        self.backend.on_write_identifier(name, &scope, &v);
                        Ok(Out::Val(env))
                    }
                    AssignTarget::NotFound => {
                        if self.version == Version::V0 {
                            env.local.declare(name.clone(), v.clone());
                            let scope = env.local.scope.clone();
                            self.backend.on_write_identifier(name, &scope, &v);
                            Ok(Out::Val(env))
                        } else {
                            Err(EvalError::UndefinedIdentifier {
                                name: name.clone(),
                                span: *span,
                            })
                        }
                    }
                }
            }
            LExpr::Slice { base, slices, span } => {
                self.trace(SemanticsRule::LeSlice);
                let base_expr = expr_of_lexpr(base);
                let (current, env) = proceed!(self.eval_expr(env, &base_expr)?);
                let (positions, env) = proceed!(self.eval_slices(env, slices)?);
                let updated = self
                    .backend
                    .write_to_bitvector(*span, &current, &positions, &v)?;
                self.eval_lexpr(base, env, updated)
            }
            LExpr::SetArray { base, index, span } => {
                self.trace(SemanticsRule::LeSetArray);
                let base_expr = expr_of_lexpr(base);
                let (current, env) = proceed!(self.eval_expr(env, &base_expr)?);
                let (iv, env) = proceed!(self.eval_expr(env, index)?);
                let position = self
                    .backend
                    .v_to_int(&iv)
                    .and_then(|raw| usize::try_from(raw).ok())
                    .ok_or_else(|| EvalError::UnsupportedExpr {
                        expr: index.to_string(),
                        span: *span,
                    })?;
                let updated = self.backend.set_index(*span, position, v, &current)?;
                self.eval_lexpr(base, env, updated)
            }
            LExpr::SetField { base, field, span } => {
                self.trace(SemanticsRule::LeSetField);
                let base_expr = expr_of_lexpr(base);
                let (current, env) = proceed!(self.eval_expr(env, &base_expr)?);
                let updated = self.backend.set_field(*span, field, v, &current)?;
                self.eval_lexpr(base, env, updated)
            }
            LExpr::SetFields {
                base,
                fields,
                slices,
                span,
            } => {
                self.trace(SemanticsRule::LeSetFields);
                if fields.len() != slices.len() {
                    return Err(EvalError::TypeInferenceNeeded { span: *span });
                }
                let base_expr = expr_of_lexpr(base);
                let (mut current, env) = proceed!(self.eval_expr(env, &base_expr)?);
                for (field, &(offset, length)) in fields.iter().zip(slices.iter()) {
                    let position = vec![(
                        self.backend.v_of_int(offset as i128),
                        self.backend.v_of_int(length as i128),
                    )];
                    let part = self.backend.read_from_bitvector(*span, &v, &position)?;
                    current = self.backend.set_field(*span, field, part, &current)?;
                }
                self.eval_lexpr(base, env, current)
            }
            LExpr::Destructuring(items, span) => {
                self.trace(SemanticsRule::LeDestructuring);
                for (position, item) in items.iter().enumerate() {
                    let element = self.backend.get_index(*span, position, &v)?;
                    env = proceed!(self.eval_lexpr(item, env, element)?);
                }
                Ok(Out::Val(env))
            }
            LExpr::Concat {
                parts,
                widths,
                span,
            } => {
                self.trace(SemanticsRule::LeConcat);
                let widths = widths
                    .as_ref()
                    .ok_or(EvalError::TypeInferenceNeeded { span: *span })?;
                if widths.len() != parts.len() {
                    return Err(EvalError::TypeInferenceNeeded { span: *span });
                }
                let mut offsets = Vec::with_capacity(widths.len());
                let mut offset = 0usize;
                for width in widths.iter().rev() {
                    offsets.push(offset);
                    offset += width;
                }
                offsets.reverse();
                for ((part, &width), &offset) in
                    parts.iter().zip(widths.iter()).zip(offsets.iter())
                {
                    let position = vec![(
                        self.backend.v_of_int(offset as i128),
                        self.backend.v_of_int(width as i128),
                    )];
                    let piece = self.backend.read_from_bitvector(*span, &v, &position)?;
                    env = proceed!(self.eval_lexpr(part, env, piece)?);
                }
                Ok(Out::Val(env))
            }
        }
    }

    // ----- statements -------------------------------------------------

    fn eval_stmt(
        &mut self,
        env: Env<B::Value>,
        stmt: &Stmt,
    ) -> EvalResult<Out<Control<B::Value>, B::Value>> {
        match stmt {
            Stmt::Pass(_) => {
                self.trace(SemanticsRule::Pass);
                Ok(Out::Val(Control::Continuing(env)))
            }
            Stmt::Seq(first, second) => {
                self.trace(SemanticsRule::Seq);
                match proceed!(self.eval_stmt(env, first)?) {
                    Control::Continuing(env) => self.eval_stmt(env, second),
                    returning @ Control::Returning(..) => Ok(Out::Val(returning)),
                }
            }
            Stmt::Decl {
                item, initializer, span, ..
            } => {
                self.trace(SemanticsRule::Decl);
                match (initializer, item) {
                    (Some(init), item) => {
                        let (v, env) = proceed!(self.eval_expr(env, init)?);
                        let env = self.bind_decl_item(env, item, v, *span)?;
                        Ok(Out::Val(Control::Continuing(env)))
                    }
                    (None, LocalDeclItem::Typed(inner, ty)) => {
                        let v = self.base_value(&env, ty, *span)?;
                        let env = self.bind_decl_item(env, inner, v, *span)?;
                        Ok(Out::Val(Control::Continuing(env)))
                    }
                    (None, LocalDeclItem::Discard) => Ok(Out::Val(Control::Continuing(env))),
                    (None, LocalDeclItem::Var(_) | LocalDeclItem::Tuple(_)) => {
                        Err(EvalError::TypeInferenceNeeded { span: *span })
                    }
                }
            }
            Stmt::Assign { lhs, rhs, span } => {
                if let (
                    LExpr::Destructuring(items, _),
                    Expr::Call {
                        name,
                        args,
                        named_args,
                        span: call_span,
                    },
                ) = (lhs, rhs)
                {
                    if items.iter().all(|item| matches!(item, LExpr::Var(..))) {
                        self.trace(SemanticsRule::AssignCall);
                        let (reads, mut env) =
                            proceed!(self.eval_call(*call_span, name, env, args, named_args)?);
                        if reads.len() != items.len() {
                            return Err(EvalError::BadArity {
                                name: "tuple construction".into(),
                                expected: items.len(),
                                received: reads.len(),
                                span: *span,
                            });
                        }
                        for (item, read) in items.iter().zip(reads) {
                            self.backend
                                .on_read_identifier(&read.name, &read.scope, &read.value);
                            env = proceed!(self.eval_lexpr(item, env, read.value)?);
                        }
                        return Ok(Out::Val(Control::Continuing(env)));
                    }
                }
                self.trace(SemanticsRule::Assign);
                let (v, env) = proceed!(self.eval_expr(env, rhs)?);
                let env = proceed!(self.eval_lexpr(lhs, env, v)?);
                Ok(Out::Val(Control::Continuing(env)))
            }
            Stmt::Call {
                name,
                args,
                named_args,
                span,
            } => {
                self.trace(SemanticsRule::CallStmt);
                let (reads, env) = proceed!(self.eval_call(*span, name, env, args, named_args)?);
                if !reads.is_empty() {
                    return Err(EvalError::MismatchedReturnValue {
                        name: name.clone(),
                        span: *span,
                    });
                }
                Ok(Out::Val(Control::Continuing(env)))
            }
            Stmt::Return(None, _) => {
                self.trace(SemanticsRule::ReturnNone);
                Ok(Out::Val(Control::Returning(Vec::new(), env.global)))
            }
            Stmt::Return(Some(e), _) => match e {
                Expr::Tuple(items, _) => {
                    self.trace(SemanticsRule::ReturnTuple);
                    let mut env = env;
                    let mut values = Vec::with_capacity(items.len());
                    for (position, item) in items.iter().enumerate() {
                        let (v, next) = proceed!(self.eval_expr(env, item)?);
                        env = next;
                        let name = format!("return-{position}");
                        let scope = env.local.scope.clone();
                        self.backend.on_write_identifier(&name, &scope, &v);
                        values.push(v);
                    }
                    Ok(Out::Val(Control::Returning(values, env.global)))
                }
                single => {
                    self.trace(SemanticsRule::ReturnOne);
                    let (v, env) = proceed!(self.eval_expr(env, single)?);
                    let scope = env.local.scope.clone();
                    self.backend.on_write_identifier("return-0", &scope, &v);
                    Ok(Out::Val(Control::Returning(vec![v], env.global)))
                }
            },
            Stmt::Cond {
                cond,
                then_branch,
                else_branch,
                span,
            } => {
                self.trace(SemanticsRule::CondStmt);
                let (cv, env) = proceed!(self.eval_expr(env, cond)?);
                if self.backend.choice(*span, &cv)? {
                    self.eval_block(env, then_branch)
                } else {
                    match else_branch {
                        Some(branch) => self.eval_block(env, branch),
                        None => Ok(Out::Val(Control::Continuing(env))),
                    }
                }
            }
            Stmt::Case {
                discriminant,
                arms,
                otherwise,
                ..
            } => {
                self.trace(SemanticsRule::CaseStmt);
                let (dv, env) = proceed!(self.eval_expr(env, discriminant)?);
                for arm in arms {
                    let matched = self.eval_pattern(&env, arm.span, &dv, &arm.pattern)?;
                    if self.backend.choice(arm.span, &matched)? {
                        return self.eval_block(env, &arm.body);
                    }
                }
                match otherwise {
                    Some(stmt) => self.eval_block(env, stmt),
                    None => Ok(Out::Val(Control::Continuing(env))),
                }
            }
            Stmt::Assert(e, span) => {
                self.trace(SemanticsRule::Assert);
                let (v, env) = proceed!(self.eval_expr(env, e)?);
                if self.backend.choice(*span, &v)? {
                    Ok(Out::Val(Control::Continuing(env)))
                } else {
                    Err(EvalError::AssertionFailed {
                        expr: e.to_string(),
                        span: *span,
                    })
                }
            }
            Stmt::While { cond, body, span } => {
                self.trace(SemanticsRule::While);
                let mut env = env;
                env.local.tick_push(self.config.unroll);
                self.eval_loop(true, env, cond, body, *span)
            }
            Stmt::Repeat { body, cond, span } => {
                self.trace(SemanticsRule::Repeat);
                match proceed!(self.eval_block(env, body)?) {
                    Control::Continuing(mut env) => {
                        env.local.tick_push_bis(self.config.unroll);
                        self.eval_loop(false, env, cond, body, *span)
                    }
                    returning @ Control::Returning(..) => Ok(Out::Val(returning)),
                }
            }
            Stmt::For {
                index,
                start,
                end,
                direction,
                body,
                span,
            } => {
                self.trace(SemanticsRule::For);
                let start_v = self.eval_expr_sef(&env, start)?;
                let end_v = self.eval_expr_sef(&env, end)?;
                let metered = self.backend.is_undetermined(&start_v)
                    || self.backend.is_undetermined(&end_v);
                let mut env = env;
                env.local.declare(index.clone(), start_v.clone());
                let scope = env.local.scope.clone();
                self.backend.on_write_identifier(index, &scope, &start_v);
                if metered {
                    env.local.tick_push(self.config.unroll);
                }
                self.eval_for(env, index, *direction, start_v, end_v, body, metered, *span)
            }
            Stmt::Throw(None, _) => {
                self.trace(SemanticsRule::Rethrow);
                Ok(Out::Throwing(None, env))
            }
            Stmt::Throw(Some((e, Some(ty))), _span) => {
                self.trace(SemanticsRule::Throw);
                let (v, env) = proceed!(self.eval_expr(env, e)?);
                self.thrown_counter += 1;
                let name = format!("thrown-{}", self.thrown_counter);
                let scope = Scope::Global { init: false };
                self.backend.on_write_identifier(&name, &scope, &v);
                Ok(Out::Throwing(
                    Some(ThrownValue {
                        value: v,
                        name,
                        scope,
                        ty: ty.clone(),
                    }),
                    env,
                ))
            }
            Stmt::Throw(Some((_, None)), span) => {
                Err(EvalError::TypeInferenceNeeded { span: *span })
            }
            Stmt::Try {
                body,
                catchers,
                otherwise,
                span,
            } => {
                self.trace(SemanticsRule::Try);
                let outer_local = env.local.clone();
                match self.eval_block(env, body)? {
                    Out::Val(ctrl) => Ok(Out::Val(ctrl)),
                    Out::Throwing(None, thrown_env) => Ok(Out::Throwing(None, thrown_env)),
                    Out::Throwing(Some(thrown), thrown_env) => {
                        // A throw from this very scope keeps its bindings;
                        // one escaping a callee keeps only its globals.
                        let catch_env = if thrown_env.local.scope == outer_local.scope {
                            thrown_env
                        } else {
                            Env::new(outer_local, thrown_env.global)
                        };
                        self.eval_catchers(catch_env, catchers, otherwise.as_deref(), thrown, *span)
                    }
                }
            }
            Stmt::Print { args, newline, .. } => {
                self.trace(SemanticsRule::Print);
                let mut rendered = String::new();
                for arg in args {
                    let v = self.eval_expr_sef(&env, arg)?;
                    rendered.push_str(&self.backend.debug_value(&v));
                }
                if *newline {
                    println!("{rendered}");
                } else {
                    print!("{rendered}");
                }
                Ok(Out::Val(Control::Continuing(env)))
            }
        }
    }

    fn bind_decl_item(
        &mut self,
        mut env: Env<B::Value>,
        item: &LocalDeclItem,
        v: B::Value,
        span: Span,
    ) -> EvalResult<Env<B::Value>> {
        match item {
            LocalDeclItem::Discard => Ok(env),
            LocalDeclItem::Var(name) => {
                env.local.declare(name.clone(), v.clone());
                let scope = env.local.scope.clone();
                self.backend.on_write_identifier(name, &scope, &v);
                Ok(env)
            }
            LocalDeclItem::Typed(inner, _) => self.bind_decl_item(env, inner, v, span),
            LocalDeclItem::Tuple(items) => {
                for (position, item) in items.iter().enumerate() {
                    let element = self.backend.get_index(span, position, &v)?;
                    env = self.bind_decl_item(env, item, element, span)?;
                }
                Ok(env)
            }
        }
    }

    /// Run a statement in a nested scope: bindings created inside die at
    /// the end, global updates survive.
    fn eval_block(
        &mut self,
        env: Env<B::Value>,
        stmt: &Stmt,
    ) -> EvalResult<Out<Control<B::Value>, B::Value>> {
        self.eval_block_with(env, None, stmt)
    }

    fn eval_block_with(
        &mut self,
        mut env: Env<B::Value>,
        binding: Option<(&str, B::Value)>,
        stmt: &Stmt,
    ) -> EvalResult<Out<Control<B::Value>, B::Value>> {
        self.trace(SemanticsRule::Block);
        let outer = env.local.clone();
        if let Some((name, value)) = binding {
            env.local.declare(name.to_string(), value.clone());
            let scope = env.local.scope.clone();
            self.backend.on_write_identifier(name, &scope, &value);
        }
        match self.eval_stmt(env, stmt)? {
            Out::Val(Control::Continuing(mut inner)) => {
                inner.local = LocalEnv::pop_scope(&outer, inner.local);
                Ok(Out::Val(Control::Continuing(inner)))
            }
            other => Ok(other),
        }
    }

    // ----- loops ------------------------------------------------------

    fn eval_loop(
        &mut self,
        is_while: bool,
        mut env: Env<B::Value>,
        cond: &Expr,
        body: &Stmt,
        span: Span,
    ) -> EvalResult<Out<Control<B::Value>, B::Value>> {
        loop {
            let (cv, next) = proceed!(self.eval_expr(env, cond)?);
            env = next;
            let cv = if is_while {
                cv
            } else {
                self.backend.unop(span, UnOp::Not, &cv)?
            };
            let undetermined = self.backend.is_undetermined(&cv);
            if !self.backend.choice(span, &cv)? {
                env.local.tick_pop();
                return Ok(Out::Val(Control::Continuing(env)));
            }
            if undetermined && env.local.tick_decr() {
                self.backend
                    .warn("loop unrolling budget exhausted; continuing past the loop");
                env.local.tick_pop();
                return Ok(Out::Val(Control::Continuing(env)));
            }
            match proceed!(self.eval_block(env, body)?) {
                Control::Continuing(next) => env = next,
                returning @ Control::Returning(..) => return Ok(Out::Val(returning)),
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_for(
        &mut self,
        mut env: Env<B::Value>,
        index: &str,
        direction: ForDirection,
        mut current: B::Value,
        end: B::Value,
        body: &Stmt,
        metered: bool,
        span: Span,
    ) -> EvalResult<Out<Control<B::Value>, B::Value>> {
        loop {
            let keep_op = match direction {
                ForDirection::Up => BinOp::Le,
                ForDirection::Down => BinOp::Ge,
            };
            let keep = self.backend.binop(span, keep_op, &current, &end)?;
            let exit = !self.backend.choice(span, &keep)?;
            let exhausted = !exit && metered && env.local.tick_decr();
            if exhausted {
                self.backend
                    .warn("loop unrolling budget exhausted; continuing past the loop");
            }
            if exit || exhausted {
                if metered {
                    env.local.tick_pop();
                }
                env.local.remove(index);
                return Ok(Out::Val(Control::Continuing(env)));
            }
            match proceed!(self.eval_block(env, body)?) {
                Control::Continuing(next) => env = next,
                returning @ Control::Returning(..) => return Ok(Out::Val(returning)),
            }
            let step_op = match direction {
                ForDirection::Up => BinOp::Add,
                ForDirection::Down => BinOp::Sub,
            };
            let one = self.backend.v_of_int(1);
            current = self.backend.binop(span, step_op, &current, &one)?;
            env.assign(index, current.clone());
            let scope = env.local.scope.clone();
            self.backend.on_write_identifier(index, &scope, &current);
        }
    }

    // ----- exception handling -----------------------------------------

    fn eval_catchers(
        &mut self,
        env: Env<B::Value>,
        catchers: &[Catcher],
        otherwise: Option<&Stmt>,
        thrown: ThrownValue<B::Value>,
        _span: Span,
    ) -> EvalResult<Out<Control<B::Value>, B::Value>> {
        let selected = catchers
            .iter()
            .find(|catcher| env.global.static_env.type_satisfies(&thrown.ty, &catcher.ty));
        match selected {
            Some(catcher) => {
                let result = match &catcher.binder {
                    Some(binder) => {
                        self.trace(SemanticsRule::CatchNamed);
                        self.backend
                            .on_read_identifier(&thrown.name, &thrown.scope, &thrown.value);
                        self.eval_block_with(
                            env,
                            Some((binder.as_str(), thrown.value.clone())),
                            &catcher.body,
                        )?
                    }
                    None => {
                        self.trace(SemanticsRule::Catch);
                        self.eval_block(env, &catcher.body)?
                    }
                };
                Ok(rethrow_implicit(thrown, result))
            }
            None => match otherwise {
                Some(stmt) => {
                    self.trace(SemanticsRule::CatchOtherwise);
                    let result = self.eval_block(env, stmt)?;
                    Ok(rethrow_implicit(thrown, result))
                }
                None => Ok(Out::Throwing(Some(thrown), env)),
            },
        }
    }

    // ----- calls ------------------------------------------------------

    /// Evaluate a subprogram call. Returns the values tagged with their
    /// `return-<i>` identifiers in the callee scope; the caller's local
    /// environment is preserved and its global replaced by the callee's.
    fn eval_call(
        &mut self,
        span: Span,
        name: &str,
        mut env: Env<B::Value>,
        args: &[Expr],
        named_args: &[(Identifier, Expr)],
    ) -> EvalResult<Out<(Vec<ReadFrom<B::Value>>, Env<B::Value>), B::Value>> {
        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            let (v, next) = proceed!(self.eval_expr(env, arg)?);
            env = next;
            arg_values.push(v);
        }

        let (decl, instance) = {
            let entry = env
                .global
                .funcs
                .get(name)
                .ok_or_else(|| EvalError::UndefinedIdentifier {
                    name: name.to_string(),
                    span,
                })?;
            (Rc::clone(&entry.decl), entry.next_instance())
        };
        if decl.args.len() != arg_values.len() {
            return Err(EvalError::BadArity {
                name: name.to_string(),
                expected: decl.args.len(),
                received: arg_values.len(),
                span,
            });
        }

        // Named-argument values, in the callee's declaration order.
        let mut named_values = Vec::new();
        for parameter in &decl.parameters {
            if let Some((_, e)) = named_args.iter().find(|(n, _)| n == parameter) {
                let (v, next) = proceed!(self.eval_expr(env, e)?);
                env = next;
                named_values.push((parameter.clone(), v));
            }
        }

        let call_scope = Scope::Local {
            name: name.to_string(),
            instance,
        };
        match &decl.body {
            SubprogramBody::Primitive => {
                self.trace(SemanticsRule::PrimitiveCall);
                let run = *self
                    .primitives
                    .get(name)
                    .ok_or_else(|| EvalError::UndefinedIdentifier {
                        name: name.to_string(),
                        span,
                    })?;
                let results = run(&mut self.backend, span, arg_values)?;
                let mut reads = Vec::with_capacity(results.len());
                for (position, value) in results.into_iter().enumerate() {
                    let id = format!("return-{position}");
                    self.backend.on_write_identifier(&id, &call_scope, &value);
                    reads.push(ReadFrom {
                        value,
                        name: id,
                        scope: call_scope.clone(),
                    });
                }
                Ok(Out::Val((reads, env)))
            }
            SubprogramBody::Statements(body) => {
                self.trace(SemanticsRule::Call);
                let caller_local =
                    mem::replace(&mut env.local, LocalEnv::new(call_scope.clone()));
                for (arg, value) in decl.args.iter().zip(arg_values) {
                    env.local.declare(arg.name.clone(), value.clone());
                    let scope = env.local.scope.clone();
                    self.backend.on_write_identifier(&arg.name, &scope, &value);
                }
                for (parameter, value) in named_values {
                    // Already bound when the parameter doubles as an
                    // argument name.
                    if !env.local.contains(&parameter) {
                        env.local.declare(parameter.clone(), value.clone());
                        let scope = env.local.scope.clone();
                        self.backend
                            .on_write_identifier(&parameter, &scope, &value);
                    }
                }
                let saved_version = self.version;
                self.version = decl.version;
                let out = self.eval_stmt(env, body);
                self.version = saved_version;
                match out? {
                    Out::Val(Control::Continuing(callee_env)) => Ok(Out::Val((
                        Vec::new(),
                        Env::new(caller_local, callee_env.global),
                    ))),
                    Out::Val(Control::Returning(values, global)) => {
                        let reads = values
                            .into_iter()
                            .enumerate()
                            .map(|(position, value)| ReadFrom {
                                value,
                                name: format!("return-{position}"),
                                scope: call_scope.clone(),
                            })
                            .collect();
                        Ok(Out::Val((reads, Env::new(caller_local, global))))
                    }
                    Out::Throwing(exc, thrown_env) => Ok(Out::Throwing(exc, thrown_env)),
                }
            }
        }
    }

    // ----- base values ------------------------------------------------

    /// The canonical default inhabitant of a type, used for declarations
    /// without an initialiser and as the shape witness for `UNKNOWN`.
    fn base_value(
        &mut self,
        env: &Env<B::Value>,
        ty: &Ty,
        span: Span,
    ) -> EvalResult<B::Value> {
        let structure = env.global.static_env.get_structure(ty, span)?;
        match &structure {
            Ty::Bool => Ok(self.backend.v_of_literal(&Literal::Bool(false))),
            Ty::Real => Ok(self.backend.v_of_literal(&Literal::Real(0.0))),
            Ty::String => Ok(self.backend.v_of_literal(&Literal::Str(String::new()))),
            Ty::Int(IntConstraints::Unconstrained) => Ok(self.backend.v_of_int(0)),
            Ty::Int(IntConstraints::UnderConstrained) => {
                Err(EvalError::UnrespectedParserInvariant { span })
            }
            Ty::Int(IntConstraints::WellConstrained(constraints)) => {
                if constraints.is_empty() {
                    return Err(EvalError::UnrespectedParserInvariant { span });
                }
                // Pick the inhabitant of minimal absolute value; the first
                // constraint wins ties.
                let mut best: Option<i128> = None;
                for constraint in constraints {
                    let candidate = match constraint {
                        IntConstraint::Exact(e) => Some(self.concrete_int(env, e)?),
                        IntConstraint::Range(lo, hi) => {
                            let lo = self.concrete_int(env, lo)?;
                            let hi = self.concrete_int(env, hi)?;
                            if lo > hi {
                                None
                            } else if lo <= 0 && 0 <= hi {
                                Some(0)
                            } else if lo > 0 {
                                Some(lo)
                            } else {
                                Some(hi)
                            }
                        }
                    };
                    if let Some(value) = candidate {
                        if best.map_or(true, |current| value.abs() < current.abs()) {
                            best = Some(value);
                        }
                    }
                }
                match best {
                    Some(value) => Ok(self.backend.v_of_int(value)),
                    None => Err(EvalError::BaseValueEmptyType {
                        ty: structure.to_string(),
                        span,
                    }),
                }
            }
            Ty::Bits(width) => {
                let width = self.concrete_width(env, width)?;
                Ok(self
                    .backend
                    .v_of_literal(&Literal::Bits(Bitvector::zeros(width))))
            }
            Ty::Enum(labels) => {
                let first = labels
                    .first()
                    .ok_or(EvalError::TypeInferenceNeeded { span })?;
                let value = env
                    .global
                    .static_env
                    .constants
                    .get(first)
                    .copied()
                    .ok_or(EvalError::TypeInferenceNeeded { span })?;
                Ok(self.backend.v_of_int(value))
            }
            Ty::Tuple(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.base_value(env, item, span)?);
                }
                Ok(self.backend.create_vector(values))
            }
            Ty::Record(fields) | Ty::Exception(fields) => {
                let mut values = Vec::with_capacity(fields.len());
                for (field, field_ty) in fields {
                    values.push((field.clone(), self.base_value(env, field_ty, span)?));
                }
                Ok(self.backend.create_record(values))
            }
            Ty::Array(length, elem) => {
                let count = match length {
                    ArrayLength::EnumBound(_, count) => *count,
                    ArrayLength::Expr(e) => {
                        let raw = self.concrete_int(env, e)?;
                        usize::try_from(raw).map_err(|_| EvalError::UnsupportedExpr {
                            expr: e.to_string(),
                            span: e.span(),
                        })?
                    }
                };
                let element = self.base_value(env, elem, span)?;
                Ok(self.backend.create_vector(vec![element; count]))
            }
            Ty::Named(_) => Err(EvalError::TypeInferenceNeeded { span }),
        }
    }

    fn concrete_int(&mut self, env: &Env<B::Value>, e: &Expr) -> EvalResult<i128> {
        let v = self.eval_expr_sef(env, e)?;
        self.backend
            .v_to_int(&v)
            .ok_or_else(|| EvalError::UnsupportedExpr {
                expr: e.to_string(),
                span: e.span(),
            })
    }

    fn concrete_width(&mut self, env: &Env<B::Value>, e: &Expr) -> EvalResult<usize> {
        let raw = self.concrete_int(env, e)?;
        usize::try_from(raw).map_err(|_| EvalError::UnsupportedExpr {
            expr: e.to_string(),
            span: e.span(),
        })
    }
}

/// Rewrite a bare `throw;` escaping a handler into a rethrow of the
/// exception that handler caught.
fn rethrow_implicit<T, V>(thrown: ThrownValue<V>, out: Out<T, V>) -> Out<T, V> {
    match out {
        Out::Throwing(None, env) => Out::Throwing(Some(thrown), env),
        other => other,
    }
}

/// The read counterpart of an assignable location.
fn expr_of_lexpr(le: &LExpr) -> Expr {
    match le {
        LExpr::Var(name, span) => Expr::Var(name.clone(), *span),
        LExpr::Slice { base, slices, span } => Expr::Slice {
            base: Box::new(expr_of_lexpr(base)),
            slices: slices.clone(),
            span: *span,
        },
        LExpr::SetArray { base, index, span } => Expr::GetArray {
            base: Box::new(expr_of_lexpr(base)),
            index: index.clone(),
            span: *span,
        },
        LExpr::SetField { base, field, span } => Expr::GetField {
            base: Box::new(expr_of_lexpr(base)),
            field: field.clone(),
            span: *span,
        },
        LExpr::SetFields {
            base, fields, span, ..
        } => Expr::GetFields {
            base: Box::new(expr_of_lexpr(base)),
            fields: fields.clone(),
            span: *span,
        },
        LExpr::Discard(_) | LExpr::Destructuring(..) | LExpr::Concat { .. } => {
            unreachable!("write-only left-hand side read back")
        }
    }
}

/// Order global declarations so every initialiser's dependencies come
/// first. Cycles are a type-checker guarantee violation.
fn init_order<'a>(globals: &[&'a GlobalDecl]) -> EvalResult<Vec<&'a GlobalDecl>> {
    let index: BTreeMap<&str, usize> = globals
        .iter()
        .enumerate()
        .map(|(position, global)| (global.name.as_str(), position))
        .collect();
    let mut state = vec![0u8; globals.len()];
    let mut order = Vec::with_capacity(globals.len());
    for position in 0..globals.len() {
        visit_global(position, globals, &index, &mut state, &mut order)?;
    }
    Ok(order)
}

fn visit_global<'a>(
    position: usize,
    globals: &[&'a GlobalDecl],
    index: &BTreeMap<&str, usize>,
    state: &mut [u8],
    order: &mut Vec<&'a GlobalDecl>,
) -> EvalResult<()> {
    match state[position] {
        2 => return Ok(()),
        1 => {
            return Err(EvalError::UnrespectedParserInvariant {
                span: globals[position].span,
            })
        }
        _ => {}
    }
    state[position] = 1;
    let mut deps = BTreeSet::new();
    if let Some(init) = &globals[position].initializer {
        free_vars(init, &mut deps);
    }
    for dep in deps {
        if let Some(&target) = index.get(dep.as_str()) {
            if target != position {
                visit_global(target, globals, index, state, order)?;
            }
        }
    }
    state[position] = 2;
    order.push(globals[position]);
    Ok(())
}

fn free_vars(e: &Expr, acc: &mut BTreeSet<String>) {
    match e {
        Expr::Literal(..) => {}
        Expr::Var(name, _) => {
            acc.insert(name.clone());
        }
        Expr::Binop { lhs, rhs, .. } => {
            free_vars(lhs, acc);
            free_vars(rhs, acc);
        }
        Expr::Unop { operand, .. } => free_vars(operand, acc),
        Expr::Cond {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            free_vars(cond, acc);
            free_vars(then_branch, acc);
            free_vars(else_branch, acc);
        }
        Expr::Slice { base, slices, .. } => {
            free_vars(base, acc);
            for slice in slices {
                free_vars_slice(slice, acc);
            }
        }
        Expr::Call {
            args, named_args, ..
        } => {
            for arg in args {
                free_vars(arg, acc);
            }
            for (_, arg) in named_args {
                free_vars(arg, acc);
            }
        }
        Expr::GetArray { base, index, .. } => {
            free_vars(base, acc);
            free_vars(index, acc);
        }
        Expr::GetItem { base, .. }
        | Expr::GetField { base, .. }
        | Expr::GetFields { base, .. } => free_vars(base, acc),
        Expr::Record { fields, .. } => {
            for (_, value) in fields {
                free_vars(value, acc);
            }
        }
        Expr::Concat(parts, _) => {
            for part in parts {
                free_vars(part, acc);
            }
        }
        Expr::Tuple(items, _) => {
            for item in items {
                free_vars(item, acc);
            }
        }
        Expr::Unknown(ty, _) => free_vars_ty(ty, acc),
        Expr::Pattern { expr, pattern, .. } => {
            free_vars(expr, acc);
            free_vars_pattern(pattern, acc);
        }
        Expr::AsType { expr, ty, .. } => {
            free_vars(expr, acc);
            free_vars_ty(ty, acc);
        }
    }
}

fn free_vars_slice(slice: &Slice, acc: &mut BTreeSet<String>) {
    match slice {
        Slice::Single(e) => free_vars(e, acc),
        Slice::Range(a, b) | Slice::Length(a, b) | Slice::Scaled(a, b) => {
            free_vars(a, acc);
            free_vars(b, acc);
        }
    }
}

fn free_vars_pattern(pattern: &Pattern, acc: &mut BTreeSet<String>) {
    match pattern {
        Pattern::All(_) | Pattern::Mask(..) => {}
        Pattern::Any(patterns, _) | Pattern::Tuple(patterns, _) => {
            for p in patterns {
                free_vars_pattern(p, acc);
            }
        }
        Pattern::Not(p, _) => free_vars_pattern(p, acc),
        Pattern::Single(e) | Pattern::Geq(e) | Pattern::Leq(e) => free_vars(e, acc),
        Pattern::Range(lo, hi, _) => {
            free_vars(lo, acc);
            free_vars(hi, acc);
        }
    }
}

fn free_vars_ty(ty: &Ty, acc: &mut BTreeSet<String>) {
    match ty {
        Ty::Bool | Ty::Real | Ty::String | Ty::Enum(_) | Ty::Named(_) => {}
        Ty::Int(IntConstraints::Unconstrained)
        | Ty::Int(IntConstraints::UnderConstrained) => {}
        Ty::Int(IntConstraints::WellConstrained(constraints)) => {
            for constraint in constraints {
                match constraint {
                    IntConstraint::Exact(e) => free_vars(e, acc),
                    IntConstraint::Range(lo, hi) => {
                        free_vars(lo, acc);
                        free_vars(hi, acc);
                    }
                }
            }
        }
        Ty::Bits(width) => free_vars(width, acc),
        Ty::Tuple(items) => {
            for item in items {
                free_vars_ty(item, acc);
            }
        }
        Ty::Array(length, elem) => {
            if let ArrayLength::Expr(e) = length {
                free_vars(e, acc);
            }
            free_vars_ty(elem, acc);
        }
        Ty::Record(fields) | Ty::Exception(fields) => {
            for (_, field_ty) in fields {
                free_vars_ty(field_ty, acc);
            }
        }
    }
}
