use crate::language::{
    ast::Identifier,
    span::Span,
    types::Ty,
};
use crate::runtime::error::{EvalError, EvalResult};
use std::collections::BTreeMap;

/// The read-only view produced by the type checker: constant values for
/// enumeration labels, and declared named types with their optional
/// supertype. The evaluator consults it for structure resolution and for
/// catcher selection; it never writes to it.
#[derive(Clone, Debug, Default)]
pub struct StaticEnv {
    pub constants: BTreeMap<Identifier, i128>,
    pub declared_types: BTreeMap<Identifier, DeclaredType>,
}

#[derive(Clone, Debug)]
pub struct DeclaredType {
    pub ty: Ty,
    pub supertype: Option<Identifier>,
}

impl StaticEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_type(&mut self, name: impl Into<Identifier>, ty: Ty, supertype: Option<Identifier>) {
        self.declared_types
            .insert(name.into(), DeclaredType { ty, supertype });
    }

    pub fn declare_constant(&mut self, name: impl Into<Identifier>, value: i128) {
        self.constants.insert(name.into(), value);
    }

    /// Resolve `Named` chains down to the underlying structure. Unknown
    /// names mean the checker did not elaborate the type.
    pub fn get_structure(&self, ty: &Ty, span: Span) -> EvalResult<Ty> {
        let mut current = ty;
        let mut seen: Vec<&str> = Vec::new();
        loop {
            match current {
                Ty::Named(name) => {
                    if seen.contains(&name.as_str()) {
                        return Err(EvalError::TypeInferenceNeeded { span });
                    }
                    seen.push(name.as_str());
                    match self.declared_types.get(name) {
                        Some(decl) => current = &decl.ty,
                        None => return Err(EvalError::TypeInferenceNeeded { span }),
                    }
                }
                other => return Ok(other.clone()),
            }
        }
    }

    /// Whether a value of dynamic type `actual` is acceptable where
    /// `expected` is declared. Named types match by name or by walking the
    /// declared-supertype chain; exceptions are always thrown and caught
    /// under their declared names, so no structural fallback is needed.
    pub fn type_satisfies(&self, actual: &Ty, expected: &Ty) -> bool {
        let (Ty::Named(actual_name), Ty::Named(expected_name)) = (actual, expected) else {
            return false;
        };
        let mut current = actual_name;
        let mut hops = 0;
        loop {
            if current == expected_name {
                return true;
            }
            hops += 1;
            if hops > self.declared_types.len() {
                return false;
            }
            match self
                .declared_types
                .get(current)
                .and_then(|decl| decl.supertype.as_ref())
            {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }
}
