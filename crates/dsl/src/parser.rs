use crate::ast::{Clause, CmpOp, Expr, Literal, RuleAst, SpanField};
use crate::error::DslError;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};
use crate::{MAX_AST_DEPTH, MAX_SOURCE_BYTES};

/// Parse one rule. Total over arbitrary input: every failure is a
/// `DslError`, never a panic, and the hard limits bound work and memory.
pub fn parse(source: &str) -> Result<RuleAst, DslError> {
    if source.len() > MAX_SOURCE_BYTES {
        return Err(DslError::LimitExceeded {
            what: "source length",
            limit: MAX_SOURCE_BYTES,
        });
    }
    let tokens = Lexer::tokenize(source)?;
    Parser::new(tokens).parse_rule()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn current(&self) -> &Token {
        // The token stream always ends with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn bump(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.current().kind == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, DslError> {
        if self.current().kind == kind {
            Ok(self.bump())
        } else {
            Err(self.error_here(format!(
                "expected {}, found {}",
                kind.describe(),
                self.current().kind.describe()
            )))
        }
    }

    fn error_here(&self, message: impl Into<String>) -> DslError {
        let tok = self.current();
        DslError::parse_at(tok.line, tok.col, message)
    }

    fn parse_rule(&mut self) -> Result<RuleAst, DslError> {
        self.expect(TokenKind::KwWhen)?;
        self.expect(TokenKind::LBrace)?;
        let when = self.parse_expr()?;
        self.expect(TokenKind::RBrace)?;

        let mut clauses = Vec::new();
        loop {
            match &self.current().kind {
                TokenKind::KwAlways => {
                    self.bump();
                    self.expect(TokenKind::LBrace)?;
                    clauses.push(Clause::Always(self.parse_expr()?));
                    self.expect(TokenKind::RBrace)?;
                }
                TokenKind::KwNever => {
                    self.bump();
                    self.expect(TokenKind::LBrace)?;
                    clauses.push(Clause::Never(self.parse_expr()?));
                    self.expect(TokenKind::RBrace)?;
                }
                TokenKind::KwCount => {
                    self.bump();
                    clauses.push(self.parse_count_clause()?);
                }
                _ => break,
            }
        }

        if clauses.is_empty() {
            return Err(self.error_here("expected 'always', 'never' or 'count' clause"));
        }
        self.expect(TokenKind::Eof)?;

        Ok(RuleAst { when, clauses })
    }

    fn parse_count_clause(&mut self) -> Result<Clause, DslError> {
        self.expect(TokenKind::LParen)?;
        let pattern = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;

        let op = self
            .comparison_op()
            .ok_or_else(|| self.error_here("expected comparison operator after 'count(...)'"))?;

        let bound = match &self.current().kind {
            TokenKind::Int(v) => {
                let v = *v;
                self.bump();
                v
            }
            _ => {
                return Err(self.error_here("count bound must be a non-negative integer"));
            }
        };
        if bound < 0 {
            return Err(self.error_here("count bound must be a non-negative integer"));
        }

        Ok(Clause::Count { pattern, op, bound })
    }

    fn parse_expr(&mut self) -> Result<Expr, DslError> {
        self.depth += 1;
        if self.depth > MAX_AST_DEPTH {
            return Err(DslError::LimitExceeded {
                what: "expression depth",
                limit: MAX_AST_DEPTH,
            });
        }
        let result = self.parse_or();
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<Expr, DslError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&TokenKind::KwOr) {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, DslError> {
        let mut lhs = self.parse_unary()?;
        while self.eat(&TokenKind::KwAnd) {
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, DslError> {
        // `not` chains are flattened iteratively so adversarial input cannot
        // drive parser recursion beyond the expression-depth limit.
        let mut nots = 0usize;
        while self.eat(&TokenKind::KwNot) {
            nots += 1;
            if nots > MAX_AST_DEPTH {
                return Err(DslError::LimitExceeded {
                    what: "expression depth",
                    limit: MAX_AST_DEPTH,
                });
            }
        }
        let mut expr = self.parse_comparison()?;
        for _ in 0..nots {
            expr = Expr::Not(Box::new(expr));
        }
        Ok(expr)
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match &self.current().kind {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::Ne => CmpOp::Ne,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::Le => CmpOp::Le,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::Ge => CmpOp::Ge,
            _ => return None,
        };
        self.bump();
        Some(op)
    }

    fn parse_comparison(&mut self) -> Result<Expr, DslError> {
        let lhs = self.parse_operand()?;
        let op_tok = self.current().clone();
        let Some(op) = self.comparison_op() else {
            return Ok(lhs);
        };
        let rhs = self.parse_operand()?;

        for side in [&lhs, &rhs] {
            if matches!(side, Expr::Path { filter: Some(_), .. }) {
                return Err(DslError::parse_at(
                    op_tok.line,
                    op_tok.col,
                    "'.where' filter cannot be used as a comparison operand",
                ));
            }
        }
        if let (Some(a), Some(b)) = (static_class(&lhs), static_class(&rhs)) {
            if a != b {
                return Err(DslError::parse_at(
                    op_tok.line,
                    op_tok.col,
                    "type mismatch: cannot compare string and number",
                ));
            }
        }

        Ok(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_operand(&mut self) -> Result<Expr, DslError> {
        match &self.current().kind {
            TokenKind::Int(v) => {
                let v = *v;
                self.bump();
                Ok(Expr::Literal(Literal::Int(v)))
            }
            TokenKind::Float(v) => {
                let v = *v;
                self.bump();
                Ok(Expr::Literal(Literal::Float(v)))
            }
            TokenKind::Str(_) => {
                let TokenKind::Str(s) = self.bump().kind else {
                    unreachable!()
                };
                Ok(Expr::Literal(Literal::Str(s)))
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) if name == "span" && self.peek_kind(1) == &TokenKind::Dot => {
                self.bump();
                self.bump();
                self.parse_span_member()
            }
            TokenKind::Ident(name) if name == "trace" && self.peek_kind(1) == &TokenKind::Dot => {
                self.bump();
                self.bump();
                self.parse_trace_member()
            }
            TokenKind::Ident(_) => self.parse_path(),
            other => Err(self.error_here(format!(
                "expected expression, found {}",
                other.describe()
            ))),
        }
    }

    fn parse_span_member(&mut self) -> Result<Expr, DslError> {
        let tok = self.bump();
        let TokenKind::Ident(member) = tok.kind else {
            return Err(DslError::parse_at(
                tok.line,
                tok.col,
                format!("expected span field, found {}", tok.kind.describe()),
            ));
        };
        match member.as_str() {
            "name" => Ok(Expr::SpanField(SpanField::Name)),
            "service" => Ok(Expr::SpanField(SpanField::Service)),
            "duration" => Ok(Expr::SpanField(SpanField::Duration)),
            "status" => Ok(Expr::SpanField(SpanField::Status)),
            "kind" => Ok(Expr::SpanField(SpanField::Kind)),
            "parent_id" => Ok(Expr::SpanField(SpanField::ParentId)),
            "attributes" => {
                self.expect(TokenKind::LBracket)?;
                let key_tok = self.bump();
                let TokenKind::Str(key) = key_tok.kind else {
                    return Err(DslError::parse_at(
                        key_tok.line,
                        key_tok.col,
                        "attribute key must be a string literal",
                    ));
                };
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::Attr(key))
            }
            other => Err(DslError::parse_at(
                tok.line,
                tok.col,
                format!("unknown span field '{other}'"),
            )),
        }
    }

    fn parse_trace_member(&mut self) -> Result<Expr, DslError> {
        let tok = self.bump();
        let member = match &tok.kind {
            TokenKind::Ident(name) => name.clone(),
            // `count` lexes as a keyword but is also a trace method.
            TokenKind::KwCount => "count".to_string(),
            other => {
                return Err(DslError::parse_at(
                    tok.line,
                    tok.col,
                    format!("expected trace member, found {}", other.describe()),
                ));
            }
        };
        match member.as_str() {
            "id" => Ok(Expr::TraceId),
            "has" | "count" | "all" => {
                self.expect(TokenKind::LParen)?;
                let pattern = Box::new(self.parse_expr()?);
                self.expect(TokenKind::RParen)?;
                Ok(match member.as_str() {
                    "has" => Expr::TraceHas(pattern),
                    "count" => Expr::TraceCount(pattern),
                    _ => Expr::TraceAll(pattern),
                })
            }
            other => Err(DslError::parse_at(
                tok.line,
                tok.col,
                format!("unknown trace member '{other}'"),
            )),
        }
    }

    fn parse_path(&mut self) -> Result<Expr, DslError> {
        let tok = self.bump();
        let TokenKind::Ident(first) = tok.kind else {
            unreachable!("parse_path is only entered on an identifier")
        };
        let mut segments = vec![first];
        let mut filter = None;

        while self.current().kind == TokenKind::Dot {
            match self.peek_kind(1) {
                TokenKind::Ident(_) => {
                    self.bump();
                    let TokenKind::Ident(seg) = self.bump().kind else {
                        unreachable!()
                    };
                    segments.push(seg);
                }
                TokenKind::KwWhere => {
                    self.bump();
                    self.bump();
                    self.expect(TokenKind::LParen)?;
                    filter = Some(Box::new(self.parse_expr()?));
                    self.expect(TokenKind::RParen)?;
                    break;
                }
                other => {
                    return Err(self.error_here(format!(
                        "expected identifier after '.', found {}",
                        other.describe()
                    )));
                }
            }
        }

        Ok(Expr::Path { segments, filter })
    }
}

/// Statically known type class of an operand, for the homogeneity check.
fn static_class(expr: &Expr) -> Option<TypeClass> {
    match expr {
        Expr::Literal(Literal::Int(_)) | Expr::Literal(Literal::Float(_)) => Some(TypeClass::Num),
        Expr::Literal(Literal::Str(_)) => Some(TypeClass::Str),
        Expr::Path {
            segments, filter, ..
        } if filter.is_none() && segments.len() == 1 && is_enum_const(&segments[0]) => {
            Some(TypeClass::Str)
        }
        _ => None,
    }
}

#[derive(PartialEq)]
enum TypeClass {
    Num,
    Str,
}

/// ALL-UPPERCASE bare identifiers (`ERROR`, `CLIENT`) are enum constants
/// that compare as strings.
pub fn is_enum_const(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_example_rule() {
        let src = r#"
when   { checkout.where(amount > 1000) }
always { fraud-check }
never  { payment.where(status == "failed") }
"#;
        let rule = parse(src).unwrap();
        assert_eq!(rule.clauses.len(), 2);
        match &rule.when {
            Expr::Path { segments, filter } => {
                assert_eq!(segments, &["checkout"]);
                assert!(filter.is_some());
            }
            other => panic!("unexpected when: {other:?}"),
        }
        assert!(matches!(&rule.clauses[0], Clause::Always(Expr::Path { segments, .. }) if segments == &["fraud-check"]));
        assert!(matches!(&rule.clauses[1], Clause::Never(_)));
    }

    #[test]
    fn dotted_selector_with_duration_comparison() {
        let rule =
            parse("when { http.request.where(span.duration > 1s) } always { error.logged }")
                .unwrap();
        match &rule.when {
            Expr::Path { segments, filter } => {
                assert_eq!(segments, &["http", "request"]);
                match filter.as_deref() {
                    Some(Expr::Compare { op, lhs, rhs }) => {
                        assert_eq!(*op, CmpOp::Gt);
                        assert_eq!(**lhs, Expr::SpanField(SpanField::Duration));
                        assert_eq!(**rhs, Expr::Literal(Literal::Int(1_000_000_000)));
                    }
                    other => panic!("unexpected filter: {other:?}"),
                }
            }
            other => panic!("unexpected when: {other:?}"),
        }
    }

    #[test]
    fn count_clause() {
        let rule = parse("when { checkout } count(retry) <= 3").unwrap();
        assert!(matches!(
            &rule.clauses[0],
            Clause::Count {
                op: CmpOp::Le,
                bound: 3,
                ..
            }
        ));
    }

    #[test]
    fn count_bound_must_be_integer() {
        let err = parse("when { checkout } count(retry) <= 1.5").unwrap_err();
        assert!(err.to_string().contains("non-negative integer"));
    }

    #[test]
    fn trace_methods() {
        let rule = parse(
            "when { payment } always { trace.has(fraud-check) } never { trace.count(retry) > 3 }",
        )
        .unwrap();
        assert!(matches!(&rule.clauses[0], Clause::Always(Expr::TraceHas(_))));
        assert!(rule.is_trace_scoped());
    }

    #[test]
    fn span_attributes_index() {
        let rule = parse(r#"when { payment.where(span.attributes["user.id"] == "u-1") } always { audit }"#)
            .unwrap();
        match &rule.when {
            Expr::Path { filter, .. } => match filter.as_deref() {
                Some(Expr::Compare { lhs, .. }) => {
                    assert_eq!(**lhs, Expr::Attr("user.id".into()));
                }
                other => panic!("unexpected filter: {other:?}"),
            },
            other => panic!("unexpected when: {other:?}"),
        }
    }

    #[test]
    fn unknown_span_field_rejected() {
        let err = parse("when { payment.where(span.latency > 1) } always { x }").unwrap_err();
        assert!(err.to_string().contains("unknown span field"));
    }

    #[test]
    fn missing_assertion_clause_rejected() {
        let err = parse("when { payment }").unwrap_err();
        assert!(err.to_string().contains("expected 'always'"));
    }

    #[test]
    fn operator_precedence_and_binds_tighter_than_or() {
        let rule = parse("when { a or b and c } always { x }").unwrap();
        match &rule.when {
            Expr::Or(lhs, rhs) => {
                assert!(matches!(**lhs, Expr::Path { .. }));
                assert!(matches!(**rhs, Expr::And(_, _)));
            }
            other => panic!("unexpected when: {other:?}"),
        }
    }

    #[test]
    fn not_binds_tighter_than_and() {
        let rule = parse("when { not a and b } always { x }").unwrap();
        match &rule.when {
            Expr::And(lhs, _) => assert!(matches!(**lhs, Expr::Not(_))),
            other => panic!("unexpected when: {other:?}"),
        }
    }

    #[test]
    fn deep_not_chain_hits_depth_limit_without_overflow() {
        let src = format!("when {{ {}x }} always {{ y }}", "not ".repeat(100_00));
        match parse(&src).unwrap_err() {
            DslError::LimitExceeded { what, .. } => assert_eq!(what, "expression depth"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn nesting_100_levels_parses() {
        let mut inner = "payment".to_string();
        for _ in 0..100 {
            inner = format!("({inner} and fraud-check)");
        }
        let src = format!("when {{ {inner} }} always {{ approved }}");
        assert!(parse(&src).is_ok());
    }

    #[test]
    fn nesting_300_levels_hits_limit() {
        let mut inner = "payment".to_string();
        for _ in 0..300 {
            inner = format!("({inner} and fraud-check)");
        }
        let src = format!("when {{ {inner} }} always {{ approved }}");
        match parse(&src).unwrap_err() {
            DslError::LimitExceeded { what, .. } => assert_eq!(what, "expression depth"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn source_length_limit() {
        let src = format!("when {{ {} }} always {{ x }}", "a".repeat(70 * 1024));
        match parse(&src).unwrap_err() {
            DslError::LimitExceeded { what, .. } => assert_eq!(what, "source length"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn string_number_mismatch_rejected_statically() {
        let err = parse(r#"when { payment.where(amount > "high") } always { x }"#).unwrap_err();
        assert!(err.to_string().contains("type mismatch"));
    }

    #[test]
    fn enum_const_compares_as_string() {
        assert!(parse("when { payment.where(status == ERROR) } always { x }").is_ok());
        let err = parse("when { payment.where(5 == ERROR) } always { x }").unwrap_err();
        assert!(err.to_string().contains("type mismatch"));
    }

    #[test]
    fn where_filter_not_allowed_in_comparison() {
        let err = parse("when { payment.where(a == 1) == 5 } always { x }").unwrap_err();
        assert!(err.to_string().contains("comparison operand"));
    }

    #[test]
    fn error_carries_line_and_column() {
        let err = parse("when {\n  payment ==\n} always { x }").unwrap_err();
        match err {
            DslError::Parse { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn garbage_inputs_fail_cleanly() {
        for src in [
            "",
            "}{",
            "when",
            "when {",
            "when { } always { x }",
            "always { x }",
            "when { a } always",
            "when { a } always { }",
            "when { a.b. } always { x }",
            "when { (a } always { x }",
            "when { a == } always { x }",
            "when { \"unterminated } always { x }",
            "when { a } garbage { x }",
        ] {
            assert!(parse(src).is_err(), "should fail: {src:?}");
        }
    }
}
