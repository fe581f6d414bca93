mod evaluator;
mod value;

pub use evaluator::{ClauseFiring, Decision, EvalInput, Evaluator};
pub use value::Value;

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    TypeMismatch(String),
    TraceTooLarge { spans: usize, limit: usize },
    DeadlineExceeded,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch(detail) => write!(f, "type mismatch: {detail}"),
            Self::TraceTooLarge { spans, limit } => {
                write!(f, "trace has {spans} spans, evaluation limit is {limit}")
            }
            Self::DeadlineExceeded => write!(f, "evaluation deadline exceeded"),
        }
    }
}

impl std::error::Error for EvalError {}
