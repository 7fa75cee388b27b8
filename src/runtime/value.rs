use crate::language::{ast::Identifier, bitvector::Bitvector};
use std::fmt;

/// Concrete value domain of the native backend.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeValue {
    Bool(bool),
    Int(i128),
    Real(f64),
    Str(String),
    Bits(Bitvector),
    Record(Vec<(Identifier, NativeValue)>),
    Vector(Vec<NativeValue>),
}

impl NativeValue {
    pub fn kind(&self) -> &'static str {
        match self {
            NativeValue::Bool(_) => "boolean",
            NativeValue::Int(_) => "integer",
            NativeValue::Real(_) => "real",
            NativeValue::Str(_) => "string",
            NativeValue::Bits(_) => "bitvector",
            NativeValue::Record(_) => "record",
            NativeValue::Vector(_) => "vector",
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            NativeValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NativeValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bits(&self) -> Option<&Bitvector> {
        match self {
            NativeValue::Bits(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Bool(true) => write!(f, "TRUE"),
            NativeValue::Bool(false) => write!(f, "FALSE"),
            NativeValue::Int(v) => write!(f, "{v}"),
            NativeValue::Real(v) => write!(f, "{v:?}"),
            NativeValue::Str(v) => write!(f, "{v}"),
            NativeValue::Bits(v) => write!(f, "{v}"),
            NativeValue::Record(fields) => {
                write!(f, "{{")?;
                for (idx, (name, value)) in fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
            NativeValue::Vector(items) => {
                write!(f, "(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}
