use crate::language::span::Span;
use thiserror::Error;

pub type EvalResult<T> = Result<T, EvalError>;

/// Fatal evaluation failures. ASL-level exceptions are not errors; they
/// propagate through the evaluator's throwing states instead.
#[derive(Clone, Debug, Error)]
pub enum EvalError {
    #[error("undefined identifier `{name}`")]
    UndefinedIdentifier { name: String, span: Span },
    #[error("value {value} does not match type {expected}")]
    MismatchType {
        value: String,
        expected: String,
        span: Span,
    },
    #[error("the type checker left no usable annotation here")]
    TypeInferenceNeeded { span: Span },
    #[error("cannot evaluate to a concrete value: {expr}")]
    UnsupportedExpr { expr: String, span: Span },
    #[error("{name} expected {expected} values but received {received}")]
    BadArity {
        name: String,
        expected: usize,
        received: usize,
        span: Span,
    },
    #[error("assertion failed: {expr}")]
    AssertionFailed { expr: String, span: Span },
    #[error("unexpected side effect: {message}")]
    UnexpectedSideEffect { message: String, span: Span },
    #[error("type {ty} has no inhabitant to use as a base value")]
    BaseValueEmptyType { ty: String, span: Span },
    #[error("parser invariant violated")]
    UnrespectedParserInvariant { span: Span },
    #[error("`{name}` does not return exactly one value")]
    MismatchedReturnValue { name: String, span: Span },
    #[error("uncaught exception: {message}")]
    UncaughtException { message: String },
}

impl EvalError {
    pub fn span(&self) -> Option<Span> {
        match self {
            EvalError::UndefinedIdentifier { span, .. }
            | EvalError::MismatchType { span, .. }
            | EvalError::TypeInferenceNeeded { span }
            | EvalError::UnsupportedExpr { span, .. }
            | EvalError::BadArity { span, .. }
            | EvalError::AssertionFailed { span, .. }
            | EvalError::UnexpectedSideEffect { span, .. }
            | EvalError::BaseValueEmptyType { span, .. }
            | EvalError::UnrespectedParserInvariant { span }
            | EvalError::MismatchedReturnValue { span, .. } => Some(*span),
            EvalError::UncaughtException { .. } => None,
        }
    }
}
