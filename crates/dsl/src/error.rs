use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum DslError {
    /// Malformed input. Carries the 1-based position of the offending token.
    Parse {
        line: u32,
        col: u32,
        message: String,
    },
    /// A static-validation failure after a syntactically valid parse.
    Semantic { message: String },
    /// Input exceeds one of the hard limits.
    LimitExceeded { what: &'static str, limit: usize },
}

impl DslError {
    pub fn parse_at(line: u32, col: u32, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            col,
            message: message.into(),
        }
    }
}

impl fmt::Display for DslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { line, col, message } => {
                write!(f, "parse error at {line}:{col}: {message}")
            }
            Self::Semantic { message } => write!(f, "invalid rule: {message}"),
            Self::LimitExceeded { what, limit } => {
                write!(f, "{what} exceeds limit of {limit}")
            }
        }
    }
}

impl std::error::Error for DslError {}
