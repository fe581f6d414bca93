use std::fmt;

use betrace_dsl::DslError;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Rule source failed to parse or validate; includes limit violations.
    Rule(DslError),
    DuplicateId(String),
    NotFound(String),
    /// Active-rule cap reached.
    Capacity(usize),
    /// Could not serialize with other operations on the same rule id within
    /// the lock budget. Stores are guaranteed consistent; retry with
    /// back-off.
    Busy(String),
    DeadlineExceeded,
    /// Durable store failure. The triggering operation has been rolled back.
    Storage(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rule(e) => write!(f, "{e}"),
            Self::DuplicateId(id) => write!(f, "rule '{id}' already exists"),
            Self::NotFound(id) => write!(f, "rule '{id}' not found"),
            Self::Capacity(max) => write!(f, "active rule cap of {max} reached"),
            Self::Busy(id) => write!(f, "rule '{id}' is busy, retry later"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
            Self::Storage(msg) => write!(f, "storage: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<DslError> for EngineError {
    fn from(e: DslError) -> Self {
        Self::Rule(e)
    }
}
