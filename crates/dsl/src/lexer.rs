use crate::error::DslError;
use crate::token::{keyword, Token, TokenKind};
use crate::{MAX_IDENT_BYTES, MAX_STRING_BYTES};

/// Character-level scanner. Operates on decoded chars so identifiers and
/// string literals accept any Unicode letter without slicing through a
/// multi-byte sequence.
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn tokenize(src: &'a str) -> Result<Vec<Token>, DslError> {
        let mut lexer = Self::new(src);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut it = self.src[self.pos..].chars();
        it.next();
        it.next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn error(&self, line: u32, col: u32, message: impl Into<String>) -> DslError {
        DslError::parse_at(line, col, message)
    }

    pub fn next_token(&mut self) -> Result<Token, DslError> {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }

        let (line, col) = (self.line, self.col);
        let Some(ch) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                line,
                col,
            });
        };

        let kind = match ch {
            '"' => self.lex_string()?,
            '0'..='9' => self.lex_number()?,
            c if c.is_alphabetic() => self.lex_ident()?,
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            '.' => self.single(TokenKind::Dot),
            ',' => self.single(TokenKind::Comma),
            '=' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::EqEq
                } else {
                    return Err(self.error(line, col, "expected '==', found lone '='"));
                }
            }
            '!' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Ne
                } else {
                    return Err(self.error(line, col, "expected '!=', found lone '!'"));
                }
            }
            '<' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            other => {
                return Err(self.error(line, col, format!("unexpected character {other:?}")));
            }
        };

        Ok(Token { kind, line, col })
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    /// Double-quoted string. The only escape is `\"`; raw newlines and any
    /// Unicode pass through unchanged.
    fn lex_string(&mut self) -> Result<TokenKind, DslError> {
        let (line, col) = (self.line, self.col);
        self.advance(); // opening quote
        let mut out = String::new();
        loop {
            match self.advance() {
                None => return Err(self.error(line, col, "unterminated string literal")),
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('"') => out.push('"'),
                    Some(other) => {
                        return Err(self.error(
                            self.line,
                            self.col,
                            format!("unsupported escape sequence '\\{other}'"),
                        ));
                    }
                    None => return Err(self.error(line, col, "unterminated string literal")),
                },
                Some(ch) => out.push(ch),
            }
            if out.len() > MAX_STRING_BYTES {
                return Err(DslError::LimitExceeded {
                    what: "string literal length",
                    limit: MAX_STRING_BYTES,
                });
            }
        }
        Ok(TokenKind::Str(out))
    }

    fn lex_number(&mut self) -> Result<TokenKind, DslError> {
        let (line, col) = (self.line, self.col);
        let mut digits = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            digits.push(self.advance().unwrap());
        }

        let mut is_float = false;
        if self.peek() == Some('.') && matches!(self.peek_second(), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            digits.push(self.advance().unwrap());
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                digits.push(self.advance().unwrap());
            }
        }

        // Duration suffix: desugared to integer nanoseconds at lex time.
        let mut suffix = String::new();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            suffix.push(self.advance().unwrap());
        }

        if suffix.is_empty() {
            return if is_float {
                let v: f64 = digits
                    .parse()
                    .map_err(|_| self.error(line, col, "malformed number literal"))?;
                Ok(TokenKind::Float(v))
            } else {
                let v: i64 = digits
                    .parse()
                    .map_err(|_| self.error(line, col, "integer literal too large"))?;
                Ok(TokenKind::Int(v))
            };
        }

        let factor: i64 = match suffix.as_str() {
            "ns" => 1,
            "us" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            _ => {
                return Err(self.error(line, col, format!("invalid duration suffix '{suffix}'")));
            }
        };

        let ns = if is_float {
            let v: f64 = digits
                .parse()
                .map_err(|_| self.error(line, col, "malformed number literal"))?;
            let scaled = v * factor as f64;
            if !scaled.is_finite() || scaled.abs() >= i64::MAX as f64 {
                return Err(self.error(line, col, "duration literal overflows"));
            }
            scaled.round() as i64
        } else {
            let v: i64 = digits
                .parse()
                .map_err(|_| self.error(line, col, "integer literal too large"))?;
            v.checked_mul(factor)
                .ok_or_else(|| self.error(line, col, "duration literal overflows"))?
        };

        Ok(TokenKind::Int(ns))
    }

    /// Identifier: first char any Unicode letter, then letters, digits, `_`,
    /// and interior `-`.
    fn lex_ident(&mut self) -> Result<TokenKind, DslError> {
        let mut name = String::new();
        name.push(self.advance().unwrap());
        loop {
            match self.peek() {
                Some(c) if c.is_alphanumeric() || c == '_' => {
                    name.push(self.advance().unwrap());
                }
                Some('-')
                    if matches!(self.peek_second(), Some(c) if c.is_alphanumeric() || c == '_') =>
                {
                    name.push(self.advance().unwrap());
                }
                _ => break,
            }
            if name.len() > MAX_IDENT_BYTES {
                return Err(DslError::LimitExceeded {
                    what: "identifier length",
                    limit: MAX_IDENT_BYTES,
                });
            }
        }
        Ok(keyword(&name).unwrap_or(TokenKind::Ident(name)))
    }
}
