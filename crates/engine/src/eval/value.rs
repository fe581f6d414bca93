use betrace_common::span::AttrValue;
use betrace_dsl::CmpOp;

use super::EvalError;

/// Runtime value of an expression. Null marks absence (a missing attribute
/// or parent id) and is deliberately permissive: comparisons against it are
/// false, never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn from_attr(attr: &AttrValue) -> Self {
        match attr {
            AttrValue::Bool(b) => Self::Bool(*b),
            AttrValue::Int(i) => Self::Int(*i),
            AttrValue::Float(f) => Self::Float(*f),
            AttrValue::String(s) => Self::Str(s.clone()),
        }
    }

    /// Null is false, booleans are themselves, any other present value is
    /// true. This is what makes `span.attributes["k"] and ...` a presence
    /// check.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
        }
    }
}

pub fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool, EvalError> {
    use Value::*;

    match (lhs, rhs) {
        (Null, _) | (_, Null) => Ok(false),
        (Int(a), Int(b)) => Ok(cmp_ord(op, a.cmp(b))),
        (Float(a), Float(b)) => Ok(cmp_f64(op, *a, *b)),
        (Int(a), Float(b)) => Ok(cmp_f64(op, *a as f64, *b)),
        (Float(a), Int(b)) => Ok(cmp_f64(op, *a, *b as f64)),
        (Str(a), Str(b)) => Ok(cmp_ord(op, a.cmp(b))),
        (Bool(a), Bool(b)) => match op {
            CmpOp::Eq => Ok(a == b),
            CmpOp::Ne => Ok(a != b),
            _ => Err(EvalError::TypeMismatch(format!(
                "'{}' is not defined for booleans",
                op.as_str()
            ))),
        },
        (a, b) => Err(EvalError::TypeMismatch(format!(
            "cannot compare {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn cmp_ord(op: CmpOp, ord: std::cmp::Ordering) -> bool {
    match op {
        CmpOp::Eq => ord.is_eq(),
        CmpOp::Ne => ord.is_ne(),
        CmpOp::Lt => ord.is_lt(),
        CmpOp::Le => ord.is_le(),
        CmpOp::Gt => ord.is_gt(),
        CmpOp::Ge => ord.is_ge(),
    }
}

fn cmp_f64(op: CmpOp, a: f64, b: f64) -> bool {
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_comparisons_are_false_not_errors() {
        for op in [CmpOp::Eq, CmpOp::Ne, CmpOp::Lt, CmpOp::Gt] {
            assert_eq!(compare(op, &Value::Null, &Value::Int(1)), Ok(false));
            assert_eq!(compare(op, &Value::Str("x".into()), &Value::Null), Ok(false));
            assert_eq!(compare(op, &Value::Null, &Value::Null), Ok(false));
        }
    }

    #[test]
    fn int_float_promotion() {
        assert_eq!(compare(CmpOp::Gt, &Value::Int(3), &Value::Float(2.5)), Ok(true));
        assert_eq!(compare(CmpOp::Eq, &Value::Float(2.0), &Value::Int(2)), Ok(true));
    }

    #[test]
    fn string_number_mismatch_is_an_error() {
        assert!(compare(CmpOp::Eq, &Value::Str("5".into()), &Value::Int(5)).is_err());
        assert!(compare(CmpOp::Lt, &Value::Int(1), &Value::Str("2".into())).is_err());
    }

    #[test]
    fn string_ordering_is_lexicographic() {
        assert_eq!(
            compare(CmpOp::Lt, &Value::Str("abc".into()), &Value::Str("abd".into())),
            Ok(true)
        );
    }

    #[test]
    fn bool_supports_equality_only() {
        assert_eq!(
            compare(CmpOp::Eq, &Value::Bool(true), &Value::Bool(true)),
            Ok(true)
        );
        assert!(compare(CmpOp::Lt, &Value::Bool(true), &Value::Bool(false)).is_err());
    }

    #[test]
    fn nan_ordering_is_false() {
        assert_eq!(
            compare(CmpOp::Lt, &Value::Float(f64::NAN), &Value::Float(1.0)),
            Ok(false)
        );
        assert_eq!(
            compare(CmpOp::Eq, &Value::Float(f64::NAN), &Value::Float(f64::NAN)),
            Ok(false)
        );
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(Value::Bool(true).truthy());
        assert!(Value::Int(0).truthy());
        assert!(Value::Str(String::new()).truthy());
    }
}
