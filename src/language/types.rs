use crate::language::ast::{Expr, Identifier};
use std::fmt;

/// Type annotations as elaborated by the type checker. Widths and integer
/// constraints stay as expressions so that backends may keep them symbolic.
#[derive(Clone, Debug)]
pub enum Ty {
    Bool,
    Real,
    String,
    Int(IntConstraints),
    Bits(Box<Expr>),
    Enum(Vec<Identifier>),
    Tuple(Vec<Ty>),
    Array(ArrayLength, Box<Ty>),
    Record(Vec<(Identifier, Ty)>),
    Exception(Vec<(Identifier, Ty)>),
    Named(Identifier),
}

#[derive(Clone, Debug)]
pub enum IntConstraints {
    Unconstrained,
    WellConstrained(Vec<IntConstraint>),
    UnderConstrained,
}

#[derive(Clone, Debug)]
pub enum IntConstraint {
    Exact(Expr),
    Range(Expr, Expr),
}

#[derive(Clone, Debug)]
pub enum ArrayLength {
    Expr(Box<Expr>),
    EnumBound(Identifier, usize),
}

impl Ty {
    pub fn integer() -> Self {
        Ty::Int(IntConstraints::Unconstrained)
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Bool => write!(f, "boolean"),
            Ty::Real => write!(f, "real"),
            Ty::String => write!(f, "string"),
            Ty::Int(IntConstraints::Unconstrained) => write!(f, "integer"),
            Ty::Int(IntConstraints::UnderConstrained) => write!(f, "integer {{-}}"),
            Ty::Int(IntConstraints::WellConstrained(cs)) => {
                write!(f, "integer {{")?;
                for (idx, c) in cs.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    match c {
                        IntConstraint::Exact(e) => write!(f, "{e}")?,
                        IntConstraint::Range(lo, hi) => write!(f, "{lo}..{hi}")?,
                    }
                }
                write!(f, "}}")
            }
            Ty::Bits(width) => write!(f, "bits({width})"),
            Ty::Enum(labels) => {
                write!(f, "enumeration {{")?;
                for (idx, label) in labels.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{label}")?;
                }
                write!(f, "}}")
            }
            Ty::Tuple(items) => {
                write!(f, "(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Ty::Array(length, elem) => match length {
                ArrayLength::Expr(e) => write!(f, "array [{e}] of {elem}"),
                ArrayLength::EnumBound(name, _) => write!(f, "array [{name}] of {elem}"),
            },
            Ty::Record(fields) => write_fields(f, "record", fields),
            Ty::Exception(fields) => write_fields(f, "exception", fields),
            Ty::Named(name) => write!(f, "{name}"),
        }
    }
}

fn write_fields(
    f: &mut fmt::Formatter<'_>,
    keyword: &str,
    fields: &[(Identifier, Ty)],
) -> fmt::Result {
    write!(f, "{keyword} {{")?;
    for (idx, (name, ty)) in fields.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{name}: {ty}")?;
    }
    write!(f, "}}")
}
