use crate::ast::{Clause, Expr, RuleAst};
use crate::error::DslError;

/// Result of the static-validation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleInfo {
    /// True when the rule references `trace.*` or carries a `count` clause.
    pub trace_scoped: bool,
    /// Span names referenced by selectors, in first-use order.
    pub selectors: Vec<String>,
}

/// Static checks after a successful parse. The parser already enforces the
/// structural rules with source positions; this pass validates what only the
/// whole tree can show and classifies the rule's scope.
pub fn validate(rule: &RuleAst) -> Result<RuleInfo, DslError> {
    let mut selectors = Vec::new();
    walk(&rule.when, Position::Predicate, &mut selectors)?;
    for clause in &rule.clauses {
        match clause {
            Clause::Always(e) | Clause::Never(e) => {
                walk(e, Position::Predicate, &mut selectors)?;
            }
            Clause::Count { pattern, bound, .. } => {
                walk(pattern, Position::Predicate, &mut selectors)?;
                if *bound < 0 {
                    return Err(DslError::Semantic {
                        message: "count bound must be a non-negative integer".into(),
                    });
                }
            }
        }
    }

    Ok(RuleInfo {
        trace_scoped: rule.is_trace_scoped(),
        selectors,
    })
}

#[derive(Clone, Copy, PartialEq)]
enum Position {
    /// Decided as a boolean: block top level, `and`/`or`/`not` operands,
    /// trace-method and `count` patterns, `where` filters.
    Predicate,
    /// Read as a value: comparison operands.
    Value,
}

fn walk(expr: &Expr, pos: Position, selectors: &mut Vec<String>) -> Result<(), DslError> {
    match expr {
        Expr::Literal(_) => {
            if pos == Position::Predicate {
                return Err(DslError::Semantic {
                    message: "a literal is not a predicate".into(),
                });
            }
            Ok(())
        }
        Expr::Path { segments, filter } => {
            if pos == Position::Predicate {
                let name = segments.join(".");
                if !selectors.contains(&name) {
                    selectors.push(name);
                }
            } else if filter.is_some() {
                return Err(DslError::Semantic {
                    message: "'.where' filter cannot be used as a value".into(),
                });
            }
            if let Some(f) = filter {
                walk(f, Position::Predicate, selectors)?;
            }
            Ok(())
        }
        Expr::SpanField(_) | Expr::Attr(_) | Expr::TraceId => Ok(()),
        Expr::Compare { lhs, rhs, .. } => {
            walk(lhs, Position::Value, selectors)?;
            walk(rhs, Position::Value, selectors)
        }
        Expr::And(a, b) | Expr::Or(a, b) => {
            walk(a, Position::Predicate, selectors)?;
            walk(b, Position::Predicate, selectors)
        }
        Expr::Not(inner) => walk(inner, Position::Predicate, selectors),
        Expr::TraceHas(p) | Expr::TraceCount(p) | Expr::TraceAll(p) => {
            walk(p, Position::Predicate, selectors)
        }
    }
}
