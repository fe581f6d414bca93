pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod semantic;
pub mod token;

pub use ast::{Clause, CmpOp, Expr, Literal, RuleAst, SpanField};
pub use error::DslError;
pub use parser::{is_enum_const, parse};
pub use semantic::{validate, RuleInfo};

/// Hard parser limits. Exceeding any of them fails with
/// [`DslError::LimitExceeded`] rather than consuming unbounded resources.
pub const MAX_SOURCE_BYTES: usize = 64 * 1024;
pub const MAX_AST_DEPTH: usize = 256;
pub const MAX_IDENT_BYTES: usize = 512;
pub const MAX_STRING_BYTES: usize = 1024 * 1024;

/// Parse and statically validate in one step.
pub fn compile(source: &str) -> Result<(RuleAst, RuleInfo), DslError> {
    let rule = parse(source)?;
    let info = validate(&rule)?;
    Ok((rule, info))
}
