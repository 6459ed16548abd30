/// Byte range of a token or expression in the query source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub const fn empty() -> Self {
        Span { start: 0, end: 0 }
    }

    /// Smallest span covering both operands.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn contains(self, pos: usize) -> bool {
        pos >= self.start && pos <= self.end
    }

    pub fn len(self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// One lexical token with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    /// Integer literal: decimal, `0x…` hex, or `0b…` binary
    Int(i64),

    /// Float literal: decimal point and/or scientific exponent
    Float(f64),

    /// String literal in `'…'` or `"…"`, escapes resolved (`r`-prefixed
    /// literals skip escape processing)
    Str(String),

    /// Regex literal, `re'…'`
    Regex(String),

    /// Identifier: field name, function name, or custom operator word
    Word(String),

    // Keywords, folded case-insensitively
    True,
    False,
    Null,
    And,
    Or,
    Not,
    TypeOf,
    As,
    Exists,

    /// The current value, `_`
    This,

    // Structure
    /// Any-child wildcard (`*`, also multiplication)
    Star,
    /// Descendant wildcard (`**`)
    DoubleStar,
    /// Path step (`.`)
    Dot,
    /// Unpack (`...`)
    Ellipsis,
    Comma,
    Colon,
    /// Truthiness postfix (`?`)
    Question,
    /// Length prefix (`#`)
    Hash,
    /// Bitwise complement (`~`)
    Tilde,

    // Arithmetic
    Plus,
    Minus,
    Slash,
    Percent,

    // Bitwise
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,

    // Comparison (`=` lexes as `==`)
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// Regex match (`=~`)
    MatchOp,
    /// Regex non-match (`!~`)
    NotMatchOp,

    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    /// End of input
    Eof,
}

impl TokenKind {
    /// Short human-readable description for parse errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Int(v) => format!("number {}", v),
            TokenKind::Float(v) => format!("number {}", v),
            TokenKind::Str(s) => format!("string '{}'", s),
            TokenKind::Regex(s) => format!("regex re'{}'", s),
            TokenKind::Word(w) => format!("word '{}'", w),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Not => "not",
            TokenKind::TypeOf => "typeof",
            TokenKind::As => "as",
            TokenKind::Exists => "exists",
            TokenKind::This => "_",
            TokenKind::Star => "*",
            TokenKind::DoubleStar => "**",
            TokenKind::Dot => ".",
            TokenKind::Ellipsis => "...",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Question => "?",
            TokenKind::Hash => "#",
            TokenKind::Tilde => "~",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Amp => "&",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::Shl => "<<",
            TokenKind::Shr => ">>",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::MatchOp => "=~",
            TokenKind::NotMatchOp => "!~",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            _ => "?",
        }
    }
}
