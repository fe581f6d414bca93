use std::time::Instant;

use betrace_common::span::Span;
use betrace_dsl::{is_enum_const, Clause, Expr, Literal, SpanField};

use super::value::{self, Value};
use super::EvalError;
use crate::accumulator::TraceContext;
use crate::rules::CompiledRule;

/// Everything one evaluation needs. The firing timestamp and the deadline
/// are supplied by the caller; the evaluator itself never reads a clock
/// except to enforce the deadline.
pub struct EvalInput<'a> {
    pub span: &'a Span,
    pub trace: Option<&'a TraceContext>,
    pub deadline: Option<Instant>,
}

impl<'a> EvalInput<'a> {
    pub fn span_only(span: &'a Span) -> Self {
        Self {
            span,
            trace: None,
            deadline: None,
        }
    }
}

/// One failed assertion clause, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClauseFiring {
    pub clause: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Match(Vec<ClauseFiring>),
    NoMatch,
    Error(EvalError),
}

/// Deterministic function from (compiled rule, span, optional trace
/// context) to a decision. Evaluation errors are values, not panics; the
/// engine counts them against the rule.
#[derive(Debug, Clone)]
pub struct Evaluator {
    max_trace_spans: usize,
}

impl Evaluator {
    pub fn new(max_trace_spans: usize) -> Self {
        Self { max_trace_spans }
    }

    pub fn evaluate(&self, rule: &CompiledRule, input: &EvalInput) -> Decision {
        match self.decide(rule, input) {
            Ok(Some(firings)) => Decision::Match(firings),
            Ok(None) => Decision::NoMatch,
            Err(e) => Decision::Error(e),
        }
    }

    fn decide(
        &self,
        rule: &CompiledRule,
        input: &EvalInput,
    ) -> Result<Option<Vec<ClauseFiring>>, EvalError> {
        if rule.trace_scoped {
            if let Some(trace) = input.trace {
                if trace.len() > self.max_trace_spans {
                    return Err(EvalError::TraceTooLarge {
                        spans: trace.len(),
                        limit: self.max_trace_spans,
                    });
                }
            }
        }

        if !self.eval_predicate(&rule.ast.when, input.span, input)? {
            return Ok(None);
        }

        let mut firings = Vec::new();
        for (i, clause) in rule.ast.clauses.iter().enumerate() {
            check_deadline(input)?;
            match clause {
                Clause::Always(expr) => {
                    if !self.eval_predicate(expr, input.span, input)? {
                        firings.push(ClauseFiring {
                            clause: format!("always[{i}]"),
                            detail: format!("expected {expr}"),
                        });
                    }
                }
                Clause::Never(expr) => {
                    if self.eval_predicate(expr, input.span, input)? {
                        firings.push(ClauseFiring {
                            clause: format!("never[{i}]"),
                            detail: format!("observed {expr}"),
                        });
                    }
                }
                Clause::Count { pattern, op, bound } => {
                    let observed = self.count_matching(pattern, input)?;
                    if !value::compare(*op, &Value::Int(observed), &Value::Int(*bound))? {
                        firings.push(ClauseFiring {
                            clause: format!("count[{i}]"),
                            detail: format!(
                                "count({pattern}) is {observed}, expected {} {bound}",
                                op.as_str()
                            ),
                        });
                    }
                }
            }
        }

        Ok(if firings.is_empty() {
            None
        } else {
            Some(firings)
        })
    }

    fn eval_predicate(
        &self,
        expr: &Expr,
        subject: &Span,
        input: &EvalInput,
    ) -> Result<bool, EvalError> {
        match expr {
            Expr::Path { segments, filter } => {
                if subject.name != segments.join(".") {
                    return Ok(false);
                }
                match filter {
                    Some(inner) => self.eval_predicate(inner, subject, input),
                    None => Ok(true),
                }
            }
            Expr::Compare { op, lhs, rhs } => {
                let l = self.eval_value(lhs, subject, input)?;
                let r = self.eval_value(rhs, subject, input)?;
                value::compare(*op, &l, &r)
            }
            Expr::And(a, b) => {
                Ok(self.eval_predicate(a, subject, input)? && self.eval_predicate(b, subject, input)?)
            }
            Expr::Or(a, b) => {
                Ok(self.eval_predicate(a, subject, input)? || self.eval_predicate(b, subject, input)?)
            }
            Expr::Not(inner) => Ok(!self.eval_predicate(inner, subject, input)?),
            Expr::TraceHas(pattern) => {
                for span in trace_spans(input) {
                    check_deadline(input)?;
                    if self.eval_predicate(pattern, span, input)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Expr::TraceAll(pattern) => {
                for span in trace_spans(input) {
                    check_deadline(input)?;
                    if !self.eval_predicate(pattern, span, input)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            other => Ok(self.eval_value(other, subject, input)?.truthy()),
        }
    }

    fn eval_value(
        &self,
        expr: &Expr,
        subject: &Span,
        input: &EvalInput,
    ) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(Literal::Int(v)) => Ok(Value::Int(*v)),
            Expr::Literal(Literal::Float(v)) => Ok(Value::Float(*v)),
            Expr::Literal(Literal::Str(s)) => Ok(Value::Str(s.clone())),
            Expr::SpanField(field) => Ok(span_field(subject, *field)),
            Expr::Attr(key) => Ok(subject
                .attribute(key)
                .map(Value::from_attr)
                .unwrap_or(Value::Null)),
            Expr::TraceId => Ok(Value::Str(subject.trace_id.clone())),
            Expr::Path { segments, filter } => {
                if filter.is_some() {
                    // rejected statically; stay total regardless
                    return Err(EvalError::TypeMismatch(
                        "'.where' filter has no value".into(),
                    ));
                }
                Ok(resolve_bare_path(subject, segments))
            }
            Expr::TraceCount(pattern) => Ok(Value::Int(self.count_matching(pattern, input)?)),
            other => Ok(Value::Bool(self.eval_predicate(other, subject, input)?)),
        }
    }

    fn count_matching(&self, pattern: &Expr, input: &EvalInput) -> Result<i64, EvalError> {
        let mut n = 0i64;
        for span in trace_spans(input) {
            check_deadline(input)?;
            if self.eval_predicate(pattern, span, input)? {
                n += 1;
            }
        }
        Ok(n)
    }
}

fn trace_spans<'a>(input: &'a EvalInput) -> &'a [Span] {
    input.trace.map(|t| t.spans()).unwrap_or(&[])
}

fn check_deadline(input: &EvalInput) -> Result<(), EvalError> {
    if let Some(deadline) = input.deadline {
        if Instant::now() >= deadline {
            return Err(EvalError::DeadlineExceeded);
        }
    }
    Ok(())
}

fn span_field(span: &Span, field: SpanField) -> Value {
    match field {
        SpanField::Name => Value::Str(span.name.clone()),
        SpanField::Service => Value::Str(span.service.clone()),
        SpanField::Duration => Value::Int(span.duration_ns()),
        SpanField::Status => Value::Str(span.status.as_str().to_string()),
        SpanField::Kind => Value::Str(span.kind.as_str().to_string()),
        SpanField::ParentId => span
            .parent_span_id
            .as_ref()
            .map(|p| Value::Str(p.clone()))
            .unwrap_or(Value::Null),
    }
}

/// A bare identifier chain in value position: an ALL-UPPERCASE single
/// segment is an enum constant, a single segment naming a span field reads
/// that field, anything else is an attribute lookup (missing key → null).
fn resolve_bare_path(span: &Span, segments: &[String]) -> Value {
    if segments.len() == 1 {
        let name = segments[0].as_str();
        if is_enum_const(name) {
            return Value::Str(name.to_string());
        }
        match name {
            "name" => return Value::Str(span.name.clone()),
            "service" => return Value::Str(span.service.clone()),
            "duration" => return Value::Int(span.duration_ns()),
            "status" => return Value::Str(span.status.as_str().to_string()),
            "kind" => return Value::Str(span.kind.as_str().to_string()),
            "parent_id" => {
                return span
                    .parent_span_id
                    .as_ref()
                    .map(|p| Value::Str(p.clone()))
                    .unwrap_or(Value::Null);
            }
            _ => {}
        }
    }
    let key = segments.join(".");
    span.attribute(&key)
        .map(Value::from_attr)
        .unwrap_or(Value::Null)
}
