#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    KwWhen,
    KwAlways,
    KwNever,
    KwAnd,
    KwOr,
    KwNot,
    KwWhere,
    KwCount,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Int(v) => format!("integer {v}"),
            Self::Float(v) => format!("number {v}"),
            Self::Str(_) => "string literal".into(),
            Self::KwWhen => "'when'".into(),
            Self::KwAlways => "'always'".into(),
            Self::KwNever => "'never'".into(),
            Self::KwAnd => "'and'".into(),
            Self::KwOr => "'or'".into(),
            Self::KwNot => "'not'".into(),
            Self::KwWhere => "'where'".into(),
            Self::KwCount => "'count'".into(),
            Self::EqEq => "'=='".into(),
            Self::Ne => "'!='".into(),
            Self::Lt => "'<'".into(),
            Self::Le => "'<='".into(),
            Self::Gt => "'>'".into(),
            Self::Ge => "'>='".into(),
            Self::LParen => "'('".into(),
            Self::RParen => "')'".into(),
            Self::LBrace => "'{'".into(),
            Self::RBrace => "'}'".into(),
            Self::LBracket => "'['".into(),
            Self::RBracket => "']'".into(),
            Self::Dot => "'.'".into(),
            Self::Comma => "','".into(),
            Self::Eof => "end of input".into(),
        }
    }
}

/// A lexed token with its 1-based source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub col: u32,
}

pub fn keyword(name: &str) -> Option<TokenKind> {
    match name {
        "when" => Some(TokenKind::KwWhen),
        "always" => Some(TokenKind::KwAlways),
        "never" => Some(TokenKind::KwNever),
        "and" => Some(TokenKind::KwAnd),
        "or" => Some(TokenKind::KwOr),
        "not" => Some(TokenKind::KwNot),
        "where" => Some(TokenKind::KwWhere),
        "count" => Some(TokenKind::KwCount),
        _ => None,
    }
}
