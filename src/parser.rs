//! Pratt parser over the token buffer.
//!
//! Prefix parselets cover literals, grouping, implicit-self subscripts and
//! sub-selects, words (fields, wildcards, calls), and unary operators;
//! infix parselets cover the binary operator ladder, paths, subscripts,
//! sub-selects, casts, the short-circuit logicals, and the postfix family.
//! A generic word parselet lets any identifier act as a custom infix or
//! postfix operator: the infix reading is tried first and the parser
//! backtracks to the postfix reading when no right-hand side parses.
//!
//! After parsing, the expression runs through the evaluator's compilation
//! phase, which folds purely-constant trees and surfaces warnings.

use crate::ast::{BinOp, CastTarget, Expr, Span, Token, TokenKind, UnaryOp};
use crate::env::Environment;
use crate::error::Error;
use crate::evaluator;
use crate::lexer::Lexer;
use crate::transient::Re;
use crate::value::Value;

// Precedence ladder, low to high. The logic level splits in two so that
// 'and' binds tighter than 'or'.
const NONE: u8 = 0;
const LOGIC_OR: u8 = 1;
const LOGIC_AND: u8 = 2;
const EQUALITY: u8 = 3;
const COMPARISON: u8 = 4;
const BITWISE: u8 = 5;
const TERM: u8 = 6;
const PRODUCT: u8 = 7;
const CAST: u8 = 8;
const UNARY: u8 = 9;
const POST_UNARY: u8 = 10;
const SUBSCRIPT: u8 = 11;
const SUBEXPR: u8 = 12;
const PATH: u8 = 13;

/// Strict fails on the first error; Relaxed turns end-of-input failures
/// into a best-effort tree for completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Strict,
    Relaxed,
}

pub struct Parser<'e> {
    tokens: Vec<Token>,
    pos: usize,
    env: &'e Environment,
    mode: ParseMode,
}

/// Tokenizes, parses, and constant-folds a query in strict mode.
pub fn compile(env: &Environment, source: &str) -> Result<Expr, Error> {
    Parser::new(env, source)?.parse()
}

impl<'e> Parser<'e> {
    pub fn new(env: &'e Environment, source: &str) -> Result<Self, Error> {
        Self::with_mode(env, source, ParseMode::Strict)
    }

    pub fn with_mode(env: &'e Environment, source: &str, mode: ParseMode) -> Result<Self, Error> {
        let tokens = Lexer::tokenize(source)?;
        Ok(Parser {
            tokens,
            pos: 0,
            env,
            mode,
        })
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.kind()) == std::mem::discriminant(kind)
    }

    fn expect(&mut self, expected: TokenKind) -> Result<(), Error> {
        if self.check(&expected) {
            self.advance();
            return Ok(());
        }
        // A relaxed parse pretends the input was closed properly so the
        // tree stays usable for completion.
        if self.mode == ParseMode::Relaxed && matches!(self.kind(), TokenKind::Eof) {
            return Ok(());
        }
        Err(self.error(format!(
            "expected {}, got {}",
            expected.describe(),
            self.kind().describe()
        )))
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parser {
            message: message.into(),
            span: self.span(),
        }
    }

    /// Parses the whole input as one expression, enforcing EOF and
    /// running the compile-phase fold (strict mode only).
    pub fn parse(&mut self) -> Result<Expr, Error> {
        let expr = self.parse_expr(NONE)?;
        if self.mode == ParseMode::Relaxed {
            return Ok(expr);
        }
        if !matches!(self.kind(), TokenKind::Eof) {
            return Err(Error::ExpectedEof { span: self.span() });
        }
        evaluator::fold(self.env, expr)
    }

    fn parse_expr(&mut self, min_prec: u8) -> Result<Expr, Error> {
        let mut left = self.parse_prefix()?;
        loop {
            let Some(prec) = self.infix_precedence() else {
                break;
            };
            if prec <= min_prec {
                break;
            }
            left = self.parse_infix(left, prec)?;
        }
        Ok(left)
    }

    fn infix_precedence(&self) -> Option<u8> {
        Some(match self.kind() {
            TokenKind::Or => LOGIC_OR,
            TokenKind::And => LOGIC_AND,
            TokenKind::EqEq
            | TokenKind::NotEq
            | TokenKind::MatchOp
            | TokenKind::NotMatchOp => EQUALITY,
            TokenKind::Lt | TokenKind::LtEq | TokenKind::Gt | TokenKind::GtEq => COMPARISON,
            TokenKind::Amp
            | TokenKind::Pipe
            | TokenKind::Caret
            | TokenKind::Shl
            | TokenKind::Shr => BITWISE,
            TokenKind::Plus | TokenKind::Minus => TERM,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => PRODUCT,
            TokenKind::As | TokenKind::Word(_) => CAST,
            TokenKind::Question | TokenKind::Exists | TokenKind::Ellipsis => POST_UNARY,
            TokenKind::LBracket => SUBSCRIPT,
            TokenKind::LBrace => SUBEXPR,
            TokenKind::Dot => PATH,
            _ => return None,
        })
    }

    fn parse_prefix(&mut self) -> Result<Expr, Error> {
        let span = self.span();
        match self.kind().clone() {
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr::Const {
                    value: Value::int(v),
                    span,
                })
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr::Const {
                    value: Value::float(v),
                    span,
                })
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Const {
                    value: Value::str(s),
                    span,
                })
            }
            TokenKind::Regex(pattern) => {
                self.advance();
                let re = Re::compile(&pattern).map_err(|e| Error::Parser {
                    message: e.to_string(),
                    span,
                })?;
                Ok(Expr::Const {
                    value: Value::transient(re),
                    span,
                })
            }
            TokenKind::True | TokenKind::False => {
                let value = matches!(self.kind(), TokenKind::True);
                self.advance();
                Ok(Expr::Const {
                    value: Value::bool(value),
                    span,
                })
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Const {
                    value: Value::null(),
                    span,
                })
            }
            TokenKind::This => {
                self.advance();
                Ok(Expr::This { span })
            }
            TokenKind::Star => {
                self.advance();
                Ok(Expr::AnyChild { span })
            }
            TokenKind::DoubleStar => {
                self.advance();
                Ok(Expr::Wildcard { span })
            }
            TokenKind::Word(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    self.parse_call(name, span)
                } else {
                    Ok(Expr::field(name, span))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr(NONE)?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            // Implicit-self subscript and sub-select prefixes.
            TokenKind::LBracket => {
                self.advance();
                let index = self.parse_expr(NONE)?;
                let end = self.span();
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::Subscript {
                    base: Box::new(Expr::This { span }),
                    index: Box::new(index),
                    span: span.merge(end),
                })
            }
            TokenKind::LBrace => {
                self.advance();
                let pred = self.parse_expr(NONE)?;
                let end = self.span();
                self.expect(TokenKind::RBrace)?;
                Ok(Expr::SubExpr {
                    base: Box::new(Expr::This { span }),
                    pred: Box::new(pred),
                    span: span.merge(end),
                })
            }
            TokenKind::Minus => self.parse_unary(UnaryOp::Neg, span),
            TokenKind::Tilde => self.parse_unary(UnaryOp::BitNot, span),
            TokenKind::Not => self.parse_unary(UnaryOp::Not, span),
            TokenKind::Hash => self.parse_unary(UnaryOp::Len, span),
            TokenKind::TypeOf => self.parse_unary(UnaryOp::TypeOf, span),
            TokenKind::Eof if self.mode == ParseMode::Relaxed => {
                // Best-effort hole where an expression should start; the
                // completion layer anchors on it.
                Ok(Expr::field("", span))
            }
            other => Err(self.error(format!("unexpected {} in expression", other.describe()))),
        }
    }

    fn parse_unary(&mut self, op: UnaryOp, span: Span) -> Result<Expr, Error> {
        self.advance();
        let sub = self.parse_expr(UNARY)?;
        let span = span.merge(sub.span());
        Ok(Expr::Unary {
            op,
            sub: Box::new(sub),
            span,
        })
    }

    fn parse_call(&mut self, name: String, span: Span) -> Result<Expr, Error> {
        self.advance(); // consume '('
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr(NONE)?);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        let end = self.span();
        self.expect(TokenKind::RParen)?;

        // Functions resolve case-insensitively at compile time and are
        // cached on the node.
        let Some(func) = self.env.function(&name) else {
            if self.mode == ParseMode::Relaxed {
                return Ok(Expr::field(name, span));
            }
            return Err(Error::UnknownFunction(name));
        };
        Ok(Expr::Call {
            name,
            func,
            args,
            span: span.merge(end),
        })
    }

    fn parse_infix(&mut self, left: Expr, prec: u8) -> Result<Expr, Error> {
        let span = left.span();
        match self.kind().clone() {
            TokenKind::Dot => {
                self.advance();
                let right = self.parse_expr(PATH)?;
                let span = span.merge(right.span());
                Ok(Expr::Path {
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                })
            }
            TokenKind::LBracket => {
                self.advance();
                let index = self.parse_expr(NONE)?;
                let end = self.span();
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::Subscript {
                    base: Box::new(left),
                    index: Box::new(index),
                    span: span.merge(end),
                })
            }
            TokenKind::LBrace => {
                self.advance();
                let pred = self.parse_expr(NONE)?;
                let end = self.span();
                self.expect(TokenKind::RBrace)?;
                Ok(Expr::SubExpr {
                    base: Box::new(left),
                    pred: Box::new(pred),
                    span: span.merge(end),
                })
            }
            TokenKind::Question => {
                let end = self.span();
                self.advance();
                Ok(Expr::Unary {
                    op: UnaryOp::Truthy,
                    sub: Box::new(left),
                    span: span.merge(end),
                })
            }
            TokenKind::Exists => {
                let end = self.span();
                self.advance();
                Ok(Expr::Exists {
                    sub: Box::new(left),
                    span: span.merge(end),
                })
            }
            TokenKind::Ellipsis => {
                let end = self.span();
                self.advance();
                Ok(Expr::Unpack {
                    sub: Box::new(left),
                    span: span.merge(end),
                })
            }
            TokenKind::As => {
                self.advance();
                let target = self.parse_cast_target()?;
                let end = self.span();
                self.advance();
                Ok(Expr::Cast {
                    target,
                    sub: Box::new(left),
                    span: span.merge(end),
                })
            }
            TokenKind::And => {
                self.advance();
                let right = self.parse_expr(LOGIC_AND)?;
                let span = span.merge(right.span());
                Ok(Expr::And {
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                })
            }
            TokenKind::Or => {
                self.advance();
                let right = self.parse_expr(LOGIC_OR)?;
                let span = span.merge(right.span());
                Ok(Expr::Or {
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                })
            }
            TokenKind::Word(name) => self.parse_word_operator(left, name),
            kind => {
                let Some(op) = binary_op(&kind) else {
                    return Err(self.error(format!(
                        "unexpected {} in operator position",
                        kind.describe()
                    )));
                };
                self.advance();
                let right = self.parse_expr(prec)?;
                let span = span.merge(right.span());
                Ok(Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                    operand_types: Default::default(),
                    span,
                })
            }
        }
    }

    fn parse_cast_target(&mut self) -> Result<CastTarget, Error> {
        match self.kind() {
            TokenKind::Word(w) => CastTarget::from_word(w)
                .ok_or_else(|| self.error(format!("unknown cast target '{}'", w))),
            TokenKind::Null => Ok(CastTarget::Null),
            other => Err(self.error(format!(
                "expected cast target after 'as', got {}",
                other.describe()
            ))),
        }
    }

    /// Custom operator word: try the infix reading first, and fall back
    /// to the postfix reading when no right-hand expression parses.
    fn parse_word_operator(&mut self, left: Expr, name: String) -> Result<Expr, Error> {
        let span = left.span();
        let word_span = self.span();
        let saved = self.pos;
        self.advance();

        match self.parse_expr(CAST) {
            Ok(right) => {
                let span = span.merge(right.span());
                Ok(Expr::WordBinary {
                    name,
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                })
            }
            Err(_) => {
                self.pos = saved;
                self.advance();
                Ok(Expr::WordUnary {
                    name,
                    sub: Box::new(left),
                    span: span.merge(word_span),
                })
            }
        }
    }
}

fn binary_op(kind: &TokenKind) -> Option<BinOp> {
    Some(match kind {
        TokenKind::Plus => BinOp::Add,
        TokenKind::Minus => BinOp::Sub,
        TokenKind::Star => BinOp::Mul,
        TokenKind::Slash => BinOp::Div,
        TokenKind::Percent => BinOp::Mod,
        TokenKind::EqEq => BinOp::Eq,
        TokenKind::NotEq => BinOp::Ne,
        TokenKind::MatchOp => BinOp::Match,
        TokenKind::NotMatchOp => BinOp::NotMatch,
        TokenKind::Lt => BinOp::Lt,
        TokenKind::LtEq => BinOp::Le,
        TokenKind::Gt => BinOp::Gt,
        TokenKind::GtEq => BinOp::Ge,
        TokenKind::Amp => BinOp::BitAnd,
        TokenKind::Pipe => BinOp::BitOr,
        TokenKind::Caret => BinOp::BitXor,
        TokenKind::Shl => BinOp::Shl,
        TokenKind::Shr => BinOp::Shr,
        _ => return None,
    })
}
