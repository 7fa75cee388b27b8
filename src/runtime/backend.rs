use crate::language::{
    ast::{BinOp, FuncDecl, Identifier, Literal, UnOp},
    span::Span,
    types::Ty,
};
use crate::runtime::{environment::Scope, error::EvalResult};
use std::fmt;

/// The value algebra and effect surface the evaluator is parameterised
/// over. The evaluator threads `&mut self` through every step in source
/// order, so a backend observes operations exactly in evaluation order;
/// the hooks below are its window onto identifier traffic, branch commits
/// and warnings. Swapping the backend swaps the value domain without
/// touching the evaluator.
pub trait Backend {
    type Value: Clone + fmt::Debug;

    fn v_of_literal(&mut self, literal: &Literal) -> Self::Value;

    fn v_of_int(&mut self, value: i128) -> Self::Value;

    /// Concrete integer reading; `None` when the value is not (or not yet)
    /// a determined integer.
    fn v_to_int(&self, value: &Self::Value) -> Option<i128>;

    fn binop(
        &mut self,
        span: Span,
        op: BinOp,
        lhs: &Self::Value,
        rhs: &Self::Value,
    ) -> EvalResult<Self::Value>;

    fn unop(&mut self, span: Span, op: UnOp, operand: &Self::Value) -> EvalResult<Self::Value>;

    /// Extract the given `(start, length)` fields of a bitvector and
    /// concatenate them, first field most significant.
    fn read_from_bitvector(
        &mut self,
        span: Span,
        value: &Self::Value,
        positions: &[(Self::Value, Self::Value)],
    ) -> EvalResult<Self::Value>;

    /// Read-modify-write of the given fields from `src`.
    fn write_to_bitvector(
        &mut self,
        span: Span,
        dst: &Self::Value,
        positions: &[(Self::Value, Self::Value)],
        src: &Self::Value,
    ) -> EvalResult<Self::Value>;

    fn bitvector_length(&mut self, span: Span, value: &Self::Value) -> EvalResult<Self::Value>;

    fn get_index(&mut self, span: Span, index: usize, value: &Self::Value)
        -> EvalResult<Self::Value>;

    fn set_index(
        &mut self,
        span: Span,
        index: usize,
        element: Self::Value,
        value: &Self::Value,
    ) -> EvalResult<Self::Value>;

    fn get_field(&mut self, span: Span, name: &str, value: &Self::Value)
        -> EvalResult<Self::Value>;

    fn set_field(
        &mut self,
        span: Span,
        name: &str,
        element: Self::Value,
        value: &Self::Value,
    ) -> EvalResult<Self::Value>;

    fn create_record(&mut self, fields: Vec<(Identifier, Self::Value)>) -> Self::Value;

    fn create_vector(&mut self, elements: Vec<Self::Value>) -> Self::Value;

    fn concat_bitvectors(&mut self, span: Span, parts: Vec<Self::Value>)
        -> EvalResult<Self::Value>;

    /// A don't-care value of the given type. The evaluator hands over a
    /// base-value witness that fixes every concrete dimension (widths,
    /// lengths, field layout); a concrete backend may return it as-is, a
    /// symbolic one freshens it.
    fn v_unknown_of_type(&mut self, ty: &Ty, witness: Self::Value) -> EvalResult<Self::Value>;

    fn is_undetermined(&self, value: &Self::Value) -> bool;

    fn debug_value(&self, value: &Self::Value) -> String;

    /// Materialise a boolean and record the branch commit.
    fn choice(&mut self, span: Span, value: &Self::Value) -> EvalResult<bool>;

    /// Committed selection between two side-effect-free alternatives.
    fn ternary(
        &mut self,
        span: Span,
        cond: &Self::Value,
        on_true: Self::Value,
        on_false: Self::Value,
    ) -> EvalResult<Self::Value>;

    fn warn(&mut self, message: &str);

    fn on_read_identifier(&mut self, name: &str, scope: &Scope, value: &Self::Value);

    fn on_write_identifier(&mut self, name: &str, scope: &Scope, value: &Self::Value);

    /// Subprograms implemented by the backend. Their declarations are
    /// prepended to the program's function table by the driver.
    fn primitives() -> Vec<Primitive<Self>>
    where
        Self: Sized;
}

/// A backend-implemented subprogram: its declaration (with
/// `SubprogramBody::Primitive`) and its runtime.
pub struct Primitive<B: Backend> {
    pub decl: FuncDecl,
    pub run: PrimitiveRun<B>,
}

pub type PrimitiveRun<B> =
    fn(&mut B, Span, Vec<<B as Backend>::Value>) -> EvalResult<Vec<<B as Backend>::Value>>;
