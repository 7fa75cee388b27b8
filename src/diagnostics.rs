use crate::runtime::error::EvalError;
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct EvalDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("{label}")]
    span: SourceSpan,
    message: String,
    label: String,
}

impl EvalDiagnostic {
    pub fn from_error(src: NamedSource<String>, err: &EvalError) -> Self {
        let span = err
            .span()
            .map(|span| SourceSpan::from((span.start, span.len())))
            .unwrap_or_else(|| SourceSpan::from((0, 0)));
        Self {
            src,
            span,
            message: err.to_string(),
            label: label_for(err).to_string(),
        }
    }
}

fn label_for(err: &EvalError) -> &'static str {
    match err {
        EvalError::UndefinedIdentifier { .. } => "not defined here",
        EvalError::MismatchType { .. } => "type mismatch",
        EvalError::TypeInferenceNeeded { .. } => "missing annotation",
        EvalError::UnsupportedExpr { .. } => "not concrete at run time",
        EvalError::BadArity { .. } => "wrong number of values",
        EvalError::AssertionFailed { .. } => "asserted here",
        EvalError::UnexpectedSideEffect { .. } => "side effect observed",
        EvalError::BaseValueEmptyType { .. } => "empty type",
        EvalError::UnrespectedParserInvariant { .. } => "invariant violated",
        EvalError::MismatchedReturnValue { .. } => "wrong return shape",
        EvalError::UncaughtException { .. } => "escaped to the top level",
    }
}

/// Render a fatal error against its source text.
pub fn emit_eval_error(source_name: &str, source: &str, err: &EvalError) {
    let named = NamedSource::new(source_name.to_string(), source.to_string());
    let diagnostic = EvalDiagnostic::from_error(named, err);
    eprintln!("{:?}", Report::new(diagnostic));
}

/// Fallback when no source text is available.
pub fn report_eval_error(err: &EvalError) {
    eprintln!("Evaluation error: {err}");
}
