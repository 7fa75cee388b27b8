use crate::language::{
    ast::{BinOp, Expr, FuncDecl, Identifier, Literal, SubprogramBody, TypedArg, UnOp, Version},
    bitvector::Bitvector,
    span::Span,
    types::Ty,
};
use crate::runtime::{
    backend::{Backend, Primitive},
    environment::Scope,
    error::{EvalError, EvalResult},
    value::NativeValue,
};

/// The concrete interpreter backend: plain values, strict operators, no
/// undetermined values. Warnings go to stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }

    fn op_mismatch(
        span: Span,
        op: BinOp,
        lhs: &NativeValue,
        rhs: &NativeValue,
    ) -> EvalError {
        EvalError::MismatchType {
            value: format!("{lhs} {op} {rhs}"),
            expected: "operands this operator accepts".into(),
            span,
        }
    }

    fn arith(span: Span, op: BinOp, a: i128, b: i128) -> EvalResult<i128> {
        let overflow = || EvalError::MismatchType {
            value: format!("{a} {op} {b}"),
            expected: "a result within the native integer range".into(),
            span,
        };
        match op {
            BinOp::Add => a.checked_add(b).ok_or_else(overflow),
            BinOp::Sub => a.checked_sub(b).ok_or_else(overflow),
            BinOp::Mul => a.checked_mul(b).ok_or_else(overflow),
            BinOp::Div => {
                if b == 0 || a % b != 0 {
                    Err(EvalError::MismatchType {
                        value: format!("{a} DIV {b}"),
                        expected: "an exact nonzero division".into(),
                        span,
                    })
                } else {
                    Ok(a / b)
                }
            }
            BinOp::DivRm | BinOp::Mod => {
                if b == 0 {
                    return Err(EvalError::MismatchType {
                        value: format!("{a} {op} {b}"),
                        expected: "a nonzero divisor".into(),
                        span,
                    });
                }
                let quotient = a.div_euclid(b);
                let remainder = a - quotient * b;
                Ok(if matches!(op, BinOp::DivRm) {
                    quotient
                } else {
                    remainder
                })
            }
            BinOp::Shl => u32::try_from(b)
                .ok()
                .and_then(|shift| a.checked_shl(shift))
                .ok_or_else(overflow),
            BinOp::Shr => u32::try_from(b)
                .ok()
                .and_then(|shift| a.checked_shr(shift))
                .ok_or_else(overflow),
            BinOp::Pow => u32::try_from(b)
                .ok()
                .and_then(|exp| a.checked_pow(exp))
                .ok_or_else(overflow),
            _ => unreachable!(),
        }
    }

    fn values_equal(span: Span, lhs: &NativeValue, rhs: &NativeValue) -> EvalResult<bool> {
        match (lhs, rhs) {
            (NativeValue::Bool(a), NativeValue::Bool(b)) => Ok(a == b),
            (NativeValue::Int(a), NativeValue::Int(b)) => Ok(a == b),
            (NativeValue::Real(a), NativeValue::Real(b)) => Ok(a == b),
            (NativeValue::Str(a), NativeValue::Str(b)) => Ok(a == b),
            (NativeValue::Bits(a), NativeValue::Bits(b)) if a.len() == b.len() => Ok(a == b),
            (NativeValue::Vector(a), NativeValue::Vector(b)) if a.len() == b.len() => {
                for (x, y) in a.iter().zip(b.iter()) {
                    if !Self::values_equal(span, x, y)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (NativeValue::Record(a), NativeValue::Record(b)) if a.len() == b.len() => {
                for ((na, va), (nb, vb)) in a.iter().zip(b.iter()) {
                    if na != nb || !Self::values_equal(span, va, vb)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Err(Self::op_mismatch(span, BinOp::Eq, lhs, rhs)),
        }
    }

    fn positions_to_usize(
        &self,
        span: Span,
        positions: &[(NativeValue, NativeValue)],
    ) -> EvalResult<Vec<(usize, usize)>> {
        positions
            .iter()
            .map(|(start, length)| {
                let start = self
                    .v_to_int(start)
                    .and_then(|v| usize::try_from(v).ok())
                    .ok_or_else(|| EvalError::UnsupportedExpr {
                        expr: format!("slice offset {start}"),
                        span,
                    })?;
                let length = self
                    .v_to_int(length)
                    .and_then(|v| usize::try_from(v).ok())
                    .ok_or_else(|| EvalError::UnsupportedExpr {
                        expr: format!("slice width {length}"),
                        span,
                    })?;
                Ok((start, length))
            })
            .collect()
    }

    fn bits_of(span: Span, value: &NativeValue, width_hint: usize) -> EvalResult<Bitvector> {
        match value {
            NativeValue::Bits(bv) => Ok(bv.clone()),
            // Integers slice as their two's-complement expansion.
            NativeValue::Int(n) => Ok(Bitvector::from_int(*n, width_hint)),
            other => Err(EvalError::MismatchType {
                value: other.to_string(),
                expected: "a bitvector".into(),
                span,
            }),
        }
    }
}

impl Backend for NativeBackend {
    type Value = NativeValue;

    fn v_of_literal(&mut self, literal: &Literal) -> NativeValue {
        match literal {
            Literal::Bool(v) => NativeValue::Bool(*v),
            Literal::Int(v) => NativeValue::Int(*v),
            Literal::Real(v) => NativeValue::Real(*v),
            Literal::Str(v) => NativeValue::Str(v.clone()),
            Literal::Bits(v) => NativeValue::Bits(v.clone()),
        }
    }

    fn v_of_int(&mut self, value: i128) -> NativeValue {
        NativeValue::Int(value)
    }

    fn v_to_int(&self, value: &NativeValue) -> Option<i128> {
        value.as_int()
    }

    fn binop(
        &mut self,
        span: Span,
        op: BinOp,
        lhs: &NativeValue,
        rhs: &NativeValue,
    ) -> EvalResult<NativeValue> {
        use NativeValue::*;
        match (op, lhs, rhs) {
            (BinOp::Eq, _, _) => Self::values_equal(span, lhs, rhs).map(Bool),
            (BinOp::Ne, _, _) => Self::values_equal(span, lhs, rhs).map(|eq| Bool(!eq)),
            (
                BinOp::Add
                | BinOp::Sub
                | BinOp::Mul
                | BinOp::Div
                | BinOp::DivRm
                | BinOp::Mod
                | BinOp::Shl
                | BinOp::Shr
                | BinOp::Pow,
                Int(a),
                Int(b),
            ) => Self::arith(span, op, *a, *b).map(Int),
            (BinOp::Add, Real(a), Real(b)) => Ok(Real(a + b)),
            (BinOp::Sub, Real(a), Real(b)) => Ok(Real(a - b)),
            (BinOp::Mul, Real(a), Real(b)) => Ok(Real(a * b)),
            (BinOp::RDiv, Real(a), Real(b)) => {
                if *b == 0.0 {
                    Err(EvalError::MismatchType {
                        value: format!("{a} / {b}"),
                        expected: "a nonzero divisor".into(),
                        span,
                    })
                } else {
                    Ok(Real(a / b))
                }
            }
            (BinOp::Lt, Int(a), Int(b)) => Ok(Bool(a < b)),
            (BinOp::Le, Int(a), Int(b)) => Ok(Bool(a <= b)),
            (BinOp::Gt, Int(a), Int(b)) => Ok(Bool(a > b)),
            (BinOp::Ge, Int(a), Int(b)) => Ok(Bool(a >= b)),
            (BinOp::Lt, Real(a), Real(b)) => Ok(Bool(a < b)),
            (BinOp::Le, Real(a), Real(b)) => Ok(Bool(a <= b)),
            (BinOp::Gt, Real(a), Real(b)) => Ok(Bool(a > b)),
            (BinOp::Ge, Real(a), Real(b)) => Ok(Bool(a >= b)),
            // Strict boolean forms; the evaluator desugars the
            // short-circuit sources, these serve internal disjunctions.
            (BinOp::BoolAnd, Bool(a), Bool(b)) => Ok(Bool(*a && *b)),
            (BinOp::BoolOr, Bool(a), Bool(b)) => Ok(Bool(*a || *b)),
            (BinOp::BoolImpl, Bool(a), Bool(b)) => Ok(Bool(!*a || *b)),
            (BinOp::And, Bits(a), Bits(b)) => a
                .and(b)
                .map(Bits)
                .ok_or_else(|| Self::op_mismatch(span, op, lhs, rhs)),
            (BinOp::Or, Bits(a), Bits(b)) => a
                .or(b)
                .map(Bits)
                .ok_or_else(|| Self::op_mismatch(span, op, lhs, rhs)),
            (BinOp::Xor, Bits(a), Bits(b)) => a
                .xor(b)
                .map(Bits)
                .ok_or_else(|| Self::op_mismatch(span, op, lhs, rhs)),
            (BinOp::Add, Bits(a), Bits(b)) if a.len() == b.len() => {
                let sum = a.to_uint().zip(b.to_uint()).map(|(x, y)| x + y);
                match sum {
                    Some(sum) => Ok(Bits(Bitvector::from_int(sum, a.len()))),
                    None => Err(Self::op_mismatch(span, op, lhs, rhs)),
                }
            }
            _ => Err(Self::op_mismatch(span, op, lhs, rhs)),
        }
    }

    fn unop(&mut self, span: Span, op: UnOp, operand: &NativeValue) -> EvalResult<NativeValue> {
        match (op, operand) {
            (UnOp::Neg, NativeValue::Int(v)) => {
                v.checked_neg()
                    .map(NativeValue::Int)
                    .ok_or_else(|| EvalError::MismatchType {
                        value: format!("- {v}"),
                        expected: "a result within the native integer range".into(),
                        span,
                    })
            }
            (UnOp::Neg, NativeValue::Real(v)) => Ok(NativeValue::Real(-v)),
            (UnOp::Not, NativeValue::Bool(v)) => Ok(NativeValue::Bool(!v)),
            (UnOp::BNot, NativeValue::Bits(v)) => Ok(NativeValue::Bits(v.not())),
            (_, other) => Err(EvalError::MismatchType {
                value: other.to_string(),
                expected: "an operand this operator accepts".into(),
                span,
            }),
        }
    }

    fn read_from_bitvector(
        &mut self,
        span: Span,
        value: &NativeValue,
        positions: &[(NativeValue, NativeValue)],
    ) -> EvalResult<NativeValue> {
        let positions = self.positions_to_usize(span, positions)?;
        let width_hint = positions
            .iter()
            .map(|&(offset, length)| offset + length)
            .max()
            .unwrap_or(0);
        let bits = Self::bits_of(span, value, width_hint)?;
        bits.extract_slices(&positions)
            .map(NativeValue::Bits)
            .ok_or_else(|| EvalError::MismatchType {
                value: value.to_string(),
                expected: format!("a bitvector covering {width_hint} bits"),
                span,
            })
    }

    fn write_to_bitvector(
        &mut self,
        span: Span,
        dst: &NativeValue,
        positions: &[(NativeValue, NativeValue)],
        src: &NativeValue,
    ) -> EvalResult<NativeValue> {
        let positions = self.positions_to_usize(span, positions)?;
        let dst_bits = match dst {
            NativeValue::Bits(bv) => bv,
            other => {
                return Err(EvalError::MismatchType {
                    value: other.to_string(),
                    expected: "a bitvector destination".into(),
                    span,
                })
            }
        };
        let total: usize = positions.iter().map(|&(_, length)| length).sum();
        let src_bits = Self::bits_of(span, src, total)?;
        dst_bits
            .write_slices(&positions, &src_bits)
            .map(NativeValue::Bits)
            .ok_or_else(|| EvalError::MismatchType {
                value: src.to_string(),
                expected: format!("{total} bits matching the written fields"),
                span,
            })
    }

    fn bitvector_length(&mut self, span: Span, value: &NativeValue) -> EvalResult<NativeValue> {
        match value {
            NativeValue::Bits(bv) => Ok(NativeValue::Int(bv.len() as i128)),
            other => Err(EvalError::MismatchType {
                value: other.to_string(),
                expected: "a bitvector".into(),
                span,
            }),
        }
    }

    fn get_index(
        &mut self,
        span: Span,
        index: usize,
        value: &NativeValue,
    ) -> EvalResult<NativeValue> {
        match value {
            NativeValue::Vector(items) => {
                items
                    .get(index)
                    .cloned()
                    .ok_or_else(|| EvalError::MismatchType {
                        value: value.to_string(),
                        expected: format!("a vector of more than {index} elements"),
                        span,
                    })
            }
            other => Err(EvalError::MismatchType {
                value: other.to_string(),
                expected: "a vector".into(),
                span,
            }),
        }
    }

    fn set_index(
        &mut self,
        span: Span,
        index: usize,
        element: NativeValue,
        value: &NativeValue,
    ) -> EvalResult<NativeValue> {
        match value {
            NativeValue::Vector(items) if index < items.len() => {
                let mut items = items.clone();
                items[index] = element;
                Ok(NativeValue::Vector(items))
            }
            other => Err(EvalError::MismatchType {
                value: other.to_string(),
                expected: format!("a vector of more than {index} elements"),
                span,
            }),
        }
    }

    fn get_field(&mut self, span: Span, name: &str, value: &NativeValue) -> EvalResult<NativeValue> {
        match value {
            NativeValue::Record(fields) => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| EvalError::MismatchType {
                    value: value.to_string(),
                    expected: format!("a record with field `{name}`"),
                    span,
                }),
            other => Err(EvalError::MismatchType {
                value: other.to_string(),
                expected: "a record".into(),
                span,
            }),
        }
    }

    fn set_field(
        &mut self,
        span: Span,
        name: &str,
        element: NativeValue,
        value: &NativeValue,
    ) -> EvalResult<NativeValue> {
        match value {
            NativeValue::Record(fields) => {
                let mut fields = fields.clone();
                match fields.iter_mut().find(|(field, _)| field == name) {
                    Some((_, slot)) => {
                        *slot = element;
                        Ok(NativeValue::Record(fields))
                    }
                    None => Err(EvalError::MismatchType {
                        value: value.to_string(),
                        expected: format!("a record with field `{name}`"),
                        span,
                    }),
                }
            }
            other => Err(EvalError::MismatchType {
                value: other.to_string(),
                expected: "a record".into(),
                span,
            }),
        }
    }

    fn create_record(&mut self, fields: Vec<(Identifier, NativeValue)>) -> NativeValue {
        NativeValue::Record(fields)
    }

    fn create_vector(&mut self, elements: Vec<NativeValue>) -> NativeValue {
        NativeValue::Vector(elements)
    }

    fn concat_bitvectors(
        &mut self,
        span: Span,
        parts: Vec<NativeValue>,
    ) -> EvalResult<NativeValue> {
        let bits: Vec<Bitvector> = parts
            .iter()
            .map(|part| match part {
                NativeValue::Bits(bv) => Ok(bv.clone()),
                other => Err(EvalError::MismatchType {
                    value: other.to_string(),
                    expected: "a bitvector".into(),
                    span,
                }),
            })
            .collect::<EvalResult<_>>()?;
        Ok(NativeValue::Bits(Bitvector::concat(&bits)))
    }

    fn v_unknown_of_type(&mut self, _ty: &Ty, witness: NativeValue) -> EvalResult<NativeValue> {
        Ok(witness)
    }

    fn is_undetermined(&self, _value: &NativeValue) -> bool {
        false
    }

    fn debug_value(&self, value: &NativeValue) -> String {
        value.to_string()
    }

    fn choice(&mut self, span: Span, value: &NativeValue) -> EvalResult<bool> {
        value.as_bool().ok_or_else(|| EvalError::MismatchType {
            value: value.to_string(),
            expected: "boolean".into(),
            span,
        })
    }

    fn ternary(
        &mut self,
        span: Span,
        cond: &NativeValue,
        on_true: NativeValue,
        on_false: NativeValue,
    ) -> EvalResult<NativeValue> {
        if self.choice(span, cond)? {
            Ok(on_true)
        } else {
            Ok(on_false)
        }
    }

    fn warn(&mut self, message: &str) {
        eprintln!("warning: {message}");
    }

    fn on_read_identifier(&mut self, _name: &str, _scope: &Scope, _value: &NativeValue) {}

    fn on_write_identifier(&mut self, _name: &str, _scope: &Scope, _value: &NativeValue) {}

    fn primitives() -> Vec<Primitive<Self>> {
        vec![
            primitive("UInt", &[("x", bits_arg("N"))], &["N"], prim_uint),
            primitive("SInt", &[("x", bits_arg("N"))], &["N"], prim_sint),
            primitive("Len", &[("x", bits_arg("N"))], &["N"], prim_len),
            primitive("Abs", &[("x", Ty::integer())], &[], prim_abs),
            primitive(
                "Min",
                &[("a", Ty::integer()), ("b", Ty::integer())],
                &[],
                prim_min,
            ),
            primitive(
                "Max",
                &[("a", Ty::integer()), ("b", Ty::integer())],
                &[],
                prim_max,
            ),
        ]
    }
}

fn bits_arg(width_param: &str) -> Ty {
    Ty::Bits(Box::new(Expr::Var(width_param.into(), Span::default())))
}

fn primitive(
    name: &str,
    args: &[(&str, Ty)],
    parameters: &[&str],
    run: fn(&mut NativeBackend, Span, Vec<NativeValue>) -> EvalResult<Vec<NativeValue>>,
) -> Primitive<NativeBackend> {
    Primitive {
        decl: FuncDecl {
            name: name.into(),
            version: Version::V1,
            parameters: parameters.iter().map(|p| (*p).into()).collect(),
            args: args
                .iter()
                .map(|(arg_name, ty)| TypedArg {
                    name: (*arg_name).into(),
                    ty: ty.clone(),
                    span: Span::default(),
                })
                .collect(),
            return_type: Some(Ty::integer()),
            body: SubprogramBody::Primitive,
            span: Span::default(),
        },
        run,
    }
}

fn one_bits(span: Span, mut args: Vec<NativeValue>) -> EvalResult<Bitvector> {
    match args.pop() {
        Some(NativeValue::Bits(bv)) if args.is_empty() => Ok(bv),
        other => Err(EvalError::MismatchType {
            value: other.map(|v| v.to_string()).unwrap_or_default(),
            expected: "a single bitvector argument".into(),
            span,
        }),
    }
}

fn prim_uint(
    _backend: &mut NativeBackend,
    span: Span,
    args: Vec<NativeValue>,
) -> EvalResult<Vec<NativeValue>> {
    let bv = one_bits(span, args)?;
    let value = bv.to_uint().ok_or_else(|| EvalError::MismatchType {
        value: bv.to_string(),
        expected: "a bitvector of at most 127 bits".into(),
        span,
    })?;
    Ok(vec![NativeValue::Int(value)])
}

fn prim_sint(
    _backend: &mut NativeBackend,
    span: Span,
    args: Vec<NativeValue>,
) -> EvalResult<Vec<NativeValue>> {
    let bv = one_bits(span, args)?;
    let value = bv.to_sint().ok_or_else(|| EvalError::MismatchType {
        value: bv.to_string(),
        expected: "a bitvector of at most 127 bits".into(),
        span,
    })?;
    Ok(vec![NativeValue::Int(value)])
}

fn prim_len(
    _backend: &mut NativeBackend,
    span: Span,
    args: Vec<NativeValue>,
) -> EvalResult<Vec<NativeValue>> {
    let bv = one_bits(span, args)?;
    Ok(vec![NativeValue::Int(bv.len() as i128)])
}

fn two_ints(span: Span, args: &[NativeValue]) -> EvalResult<(i128, i128)> {
    match args {
        [NativeValue::Int(a), NativeValue::Int(b)] => Ok((*a, *b)),
        _ => Err(EvalError::MismatchType {
            value: args
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            expected: "two integer arguments".into(),
            span,
        }),
    }
}

fn prim_abs(
    _backend: &mut NativeBackend,
    span: Span,
    args: Vec<NativeValue>,
) -> EvalResult<Vec<NativeValue>> {
    match args.as_slice() {
        [NativeValue::Int(v)] => Ok(vec![NativeValue::Int(v.abs())]),
        _ => Err(EvalError::MismatchType {
            value: args
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            expected: "one integer argument".into(),
            span,
        }),
    }
}

fn prim_min(
    _backend: &mut NativeBackend,
    span: Span,
    args: Vec<NativeValue>,
) -> EvalResult<Vec<NativeValue>> {
    let (a, b) = two_ints(span, &args)?;
    Ok(vec![NativeValue::Int(a.min(b))])
}

fn prim_max(
    _backend: &mut NativeBackend,
    span: Span,
    args: Vec<NativeValue>,
) -> EvalResult<Vec<NativeValue>> {
    let (a, b) = two_ints(span, &args)?;
    Ok(vec![NativeValue::Int(a.max(b))])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn be() -> NativeBackend {
        NativeBackend::new()
    }

    fn sp() -> Span {
        Span::default()
    }

    #[test]
    fn integer_division_forms() {
        let mut b = be();
        let v = |n| NativeValue::Int(n);
        assert_eq!(b.binop(sp(), BinOp::Div, &v(6), &v(3)).unwrap(), v(2));
        assert!(b.binop(sp(), BinOp::Div, &v(7), &v(3)).is_err());
        assert!(b.binop(sp(), BinOp::Div, &v(7), &v(0)).is_err());
        assert_eq!(b.binop(sp(), BinOp::DivRm, &v(-7), &v(2)).unwrap(), v(-4));
        assert_eq!(b.binop(sp(), BinOp::Mod, &v(-7), &v(2)).unwrap(), v(1));
    }

    #[test]
    fn equality_requires_comparable_kinds() {
        let mut b = be();
        let ok = b
            .binop(
                sp(),
                BinOp::Eq,
                &NativeValue::Int(1),
                &NativeValue::Int(1),
            )
            .unwrap();
        assert_eq!(ok, NativeValue::Bool(true));
        assert!(b
            .binop(
                sp(),
                BinOp::Eq,
                &NativeValue::Int(1),
                &NativeValue::Bool(true)
            )
            .is_err());
    }

    #[test]
    fn bitvector_reads_and_writes() {
        let mut b = be();
        let bv = NativeValue::Bits(Bitvector::parse("11001010").unwrap());
        let lo = (NativeValue::Int(0), NativeValue::Int(4));
        let out = b.read_from_bitvector(sp(), &bv, &[lo.clone()]).unwrap();
        assert_eq!(out, NativeValue::Bits(Bitvector::parse("1010").unwrap()));
        let ones = NativeValue::Bits(Bitvector::parse("1111").unwrap());
        let out = b.write_to_bitvector(sp(), &bv, &[lo], &ones).unwrap();
        assert_eq!(
            out,
            NativeValue::Bits(Bitvector::parse("11001111").unwrap())
        );
    }

    #[test]
    fn uint_and_sint_primitives() {
        let mut b = be();
        let bits = vec![NativeValue::Bits(Bitvector::parse("1111").unwrap())];
        assert_eq!(
            prim_uint(&mut b, sp(), bits.clone()).unwrap(),
            vec![NativeValue::Int(15)]
        );
        assert_eq!(
            prim_sint(&mut b, sp(), bits).unwrap(),
            vec![NativeValue::Int(-1)]
        );
    }
}
