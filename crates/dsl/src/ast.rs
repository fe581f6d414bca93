use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanField {
    Name,
    Service,
    Duration,
    Status,
    Kind,
    ParentId,
}

impl SpanField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Service => "service",
            Self::Duration => "duration",
            Self::Status => "status",
            Self::Kind => "kind",
            Self::ParentId => "parent_id",
        }
    }
}

/// Closed expression node set; the evaluator dispatches by tag in a single
/// pass. Compiled ASTs are immutable and shared by reference across workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    /// A dotted identifier chain that is not a `span.*`/`trace.*` built-in.
    /// In boolean position it selects spans by name (with an optional
    /// `.where` filter); in value position it reads a field or attribute of
    /// the subject span, or names an enum constant when ALL-UPPERCASE.
    Path {
        segments: Vec<String>,
        filter: Option<Box<Expr>>,
    },
    SpanField(SpanField),
    /// `span.attributes["key"]`; a missing key evaluates to null.
    Attr(String),
    TraceId,
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    TraceHas(Box<Expr>),
    TraceCount(Box<Expr>),
    TraceAll(Box<Expr>),
}

impl Expr {
    pub fn path(segments: &[&str]) -> Self {
        Self::Path {
            segments: segments.iter().map(|s| s.to_string()).collect(),
            filter: None,
        }
    }

    pub fn references_trace(&self) -> bool {
        match self {
            Self::TraceId | Self::TraceHas(_) | Self::TraceCount(_) | Self::TraceAll(_) => true,
            Self::Literal(_) | Self::SpanField(_) | Self::Attr(_) => false,
            Self::Path { filter, .. } => filter.as_deref().is_some_and(Self::references_trace),
            Self::Compare { lhs, rhs, .. } => lhs.references_trace() || rhs.references_trace(),
            Self::And(a, b) | Self::Or(a, b) => a.references_trace() || b.references_trace(),
            Self::Not(inner) => inner.references_trace(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
        }
    }
}

// Rendering is for violation metadata and logs, not for re-parsing; it
// omits grouping parentheses.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::Path { segments, filter } => {
                write!(f, "{}", segments.join("."))?;
                if let Some(inner) = filter {
                    write!(f, ".where({inner})")?;
                }
                Ok(())
            }
            Self::SpanField(field) => write!(f, "span.{}", field.as_str()),
            Self::Attr(key) => write!(f, "span.attributes[\"{key}\"]"),
            Self::TraceId => write!(f, "trace.id"),
            Self::Compare { op, lhs, rhs } => write!(f, "{lhs} {} {rhs}", op.as_str()),
            Self::And(a, b) => write!(f, "{a} and {b}"),
            Self::Or(a, b) => write!(f, "{a} or {b}"),
            Self::Not(inner) => write!(f, "not {inner}"),
            Self::TraceHas(p) => write!(f, "trace.has({p})"),
            Self::TraceCount(p) => write!(f, "trace.count({p})"),
            Self::TraceAll(p) => write!(f, "trace.all({p})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    Always(Expr),
    Never(Expr),
    Count {
        pattern: Expr,
        op: CmpOp,
        bound: i64,
    },
}

/// A parsed rule: one trigger predicate plus one or more assertion clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleAst {
    pub when: Expr,
    pub clauses: Vec<Clause>,
}

impl RuleAst {
    /// Trace-scoped rules reference `trace.*` or carry a `count` clause and
    /// can only be decided against an accumulated trace context.
    pub fn is_trace_scoped(&self) -> bool {
        if self.when.references_trace() {
            return true;
        }
        self.clauses.iter().any(|c| match c {
            Clause::Count { .. } => true,
            Clause::Always(e) | Clause::Never(e) => e.references_trace(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_only_rule_is_span_scoped() {
        let rule = RuleAst {
            when: Expr::path(&["payment"]),
            clauses: vec![Clause::Always(Expr::Compare {
                op: CmpOp::Gt,
                lhs: Box::new(Expr::SpanField(SpanField::Duration)),
                rhs: Box::new(Expr::Literal(Literal::Int(100))),
            })],
        };
        assert!(!rule.is_trace_scoped());
    }

    #[test]
    fn trace_has_makes_rule_trace_scoped() {
        let rule = RuleAst {
            when: Expr::path(&["payment"]),
            clauses: vec![Clause::Always(Expr::TraceHas(Box::new(Expr::path(&[
                "fraud-check",
            ]))))],
        };
        assert!(rule.is_trace_scoped());
    }

    #[test]
    fn count_clause_makes_rule_trace_scoped() {
        let rule = RuleAst {
            when: Expr::path(&["checkout"]),
            clauses: vec![Clause::Count {
                pattern: Expr::path(&["retry"]),
                op: CmpOp::Le,
                bound: 3,
            }],
        };
        assert!(rule.is_trace_scoped());
    }

    #[test]
    fn trace_reference_inside_where_filter_detected() {
        let expr = Expr::Path {
            segments: vec!["payment".into()],
            filter: Some(Box::new(Expr::TraceHas(Box::new(Expr::path(&["x"]))))),
        };
        assert!(expr.references_trace());
    }
}
