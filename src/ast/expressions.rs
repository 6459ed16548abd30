use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64};
use std::sync::Arc;

use crate::ast::{BinOp, CastTarget, Span, UnaryOp};
use crate::functions::Function;
use crate::value::OwnedValue;

/// Sentinel for a [`Expr::Field`] whose string handle has not been
/// resolved against the pool interner yet.
pub const HANDLE_UNRESOLVED: u32 = u32::MAX;

/// Broad shape of an expression node, used by diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Field,
    Path,
    Subexpr,
    Subscript,
    Value,
}

/// One node of a compiled expression tree.
///
/// Trees are immutable after compile; the only interior mutability is the
/// per-node counters (field hits, cached string handles, comparator
/// operand flags), all atomics so a compiled expression can be shared
/// read-only across threads.
#[derive(Debug)]
pub enum Expr {
    /// `**`: every descendant of the current node, itself included,
    /// depth-first
    Wildcard { span: Span },

    /// `*`: every immediate child of the current node
    AnyChild { span: Span },

    /// `_`: the current value
    This { span: Span },

    /// Named child of the current node. The interner handle is resolved
    /// once and cached; the hit counter feeds diagnostics.
    Field {
        name: String,
        handle: AtomicU32,
        hits: AtomicU64,
        span: Span,
    },

    /// Folded constant
    Const { value: OwnedValue, span: Span },

    /// Folded constant sequence
    MultiConst { values: Vec<OwnedValue>, span: Span },

    /// `l.r`: evaluate `r` against every usable value of `l`
    Path {
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },

    /// `l[index]`
    Subscript {
        base: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },

    /// `l{pred}`: forward values of `l` for which `pred` is truthy
    SubExpr {
        base: Box<Expr>,
        pred: Box<Expr>,
        span: Span,
    },

    /// Function call; the function is resolved case-insensitively at
    /// parse time and cached here.
    Call {
        name: String,
        func: Arc<dyn Function>,
        args: Vec<Expr>,
        span: Span,
    },

    /// `x...`: expand a transient into its element sequence
    Unpack { sub: Box<Expr>, span: Span },

    Unary {
        op: UnaryOp,
        sub: Box<Expr>,
        span: Span,
    },

    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        /// Operand-type bits observed by comparisons, for diagnostics
        operand_types: AtomicU8,
        span: Span,
    },

    /// Custom postfix operator word, resolved at evaluation by the
    /// operand's transient meta-type
    WordUnary {
        name: String,
        sub: Box<Expr>,
        span: Span,
    },

    /// Custom infix operator word (`a within b`)
    WordBinary {
        name: String,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },

    /// Short-circuit `and`, Lua semantics
    And {
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },

    /// Short-circuit `or`, Lua semantics
    Or {
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },

    /// `x as word`
    Cast {
        target: CastTarget,
        sub: Box<Expr>,
        span: Span,
    },

    /// Postfix `exists`
    Exists { sub: Box<Expr>, span: Span },
}

impl Expr {
    /// Builds a field node with an unresolved handle cache.
    pub fn field(name: impl Into<String>, span: Span) -> Expr {
        Expr::Field {
            name: name.into(),
            handle: AtomicU32::new(HANDLE_UNRESOLVED),
            hits: AtomicU64::new(0),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Expr::Wildcard { span }
            | Expr::AnyChild { span }
            | Expr::This { span }
            | Expr::Field { span, .. }
            | Expr::Const { span, .. }
            | Expr::MultiConst { span, .. }
            | Expr::Path { span, .. }
            | Expr::Subscript { span, .. }
            | Expr::SubExpr { span, .. }
            | Expr::Call { span, .. }
            | Expr::Unpack { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::WordUnary { span, .. }
            | Expr::WordBinary { span, .. }
            | Expr::And { span, .. }
            | Expr::Or { span, .. }
            | Expr::Cast { span, .. }
            | Expr::Exists { span, .. } => *span,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Expr::Field { .. } | Expr::Wildcard { .. } | Expr::AnyChild { .. } => Category::Field,
            Expr::Path { .. } => Category::Path,
            Expr::SubExpr { .. } => Category::Subexpr,
            Expr::Subscript { .. } => Category::Subscript,
            _ => Category::Value,
        }
    }

    /// Pre-order traversal over this node and every descendant.
    pub fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Wildcard { .. }
            | Expr::AnyChild { .. }
            | Expr::This { .. }
            | Expr::Field { .. }
            | Expr::Const { .. }
            | Expr::MultiConst { .. } => {}
            Expr::Path { left, right, .. }
            | Expr::Binary { left, right, .. }
            | Expr::WordBinary { left, right, .. }
            | Expr::And { left, right, .. }
            | Expr::Or { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::Subscript { base, index, .. } => {
                base.visit(f);
                index.visit(f);
            }
            Expr::SubExpr { base, pred, .. } => {
                base.visit(f);
                pred.visit(f);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.visit(f);
                }
            }
            Expr::Unpack { sub, .. }
            | Expr::Unary { sub, .. }
            | Expr::WordUnary { sub, .. }
            | Expr::Cast { sub, .. }
            | Expr::Exists { sub, .. } => sub.visit(f),
        }
    }

    /// Indented tree dump, what the REPL prints under `/verbose`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, 0);
        out
    }

    fn dump_into(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        match self {
            Expr::Wildcard { .. } => out.push_str("Wildcard **\n"),
            Expr::AnyChild { .. } => out.push_str("AnyChild *\n"),
            Expr::This { .. } => out.push_str("This _\n"),
            Expr::Field { name, .. } => {
                out.push_str(&format!("Field {}\n", name));
            }
            Expr::Const { value, .. } => {
                out.push_str(&format!("Const {}\n", value));
            }
            Expr::MultiConst { values, .. } => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                out.push_str(&format!("MultiConst [{}]\n", parts.join(", ")));
            }
            Expr::Path { left, right, .. } => {
                out.push_str("Path .\n");
                left.dump_into(out, depth + 1);
                right.dump_into(out, depth + 1);
            }
            Expr::Subscript { base, index, .. } => {
                out.push_str("Subscript []\n");
                base.dump_into(out, depth + 1);
                index.dump_into(out, depth + 1);
            }
            Expr::SubExpr { base, pred, .. } => {
                out.push_str("SubExpr {}\n");
                base.dump_into(out, depth + 1);
                pred.dump_into(out, depth + 1);
            }
            Expr::Call { name, args, .. } => {
                out.push_str(&format!("Call {}\n", name));
                for arg in args {
                    arg.dump_into(out, depth + 1);
                }
            }
            Expr::Unpack { sub, .. } => {
                out.push_str("Unpack ...\n");
                sub.dump_into(out, depth + 1);
            }
            Expr::Unary { op, sub, .. } => {
                out.push_str(&format!("Unary {}\n", op.name()));
                sub.dump_into(out, depth + 1);
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                out.push_str(&format!("Binary {}\n", op.name()));
                left.dump_into(out, depth + 1);
                right.dump_into(out, depth + 1);
            }
            Expr::WordUnary { name, sub, .. } => {
                out.push_str(&format!("WordUnary {}\n", name));
                sub.dump_into(out, depth + 1);
            }
            Expr::WordBinary {
                name, left, right, ..
            } => {
                out.push_str(&format!("WordBinary {}\n", name));
                left.dump_into(out, depth + 1);
                right.dump_into(out, depth + 1);
            }
            Expr::And { left, right, .. } => {
                out.push_str("And\n");
                left.dump_into(out, depth + 1);
                right.dump_into(out, depth + 1);
            }
            Expr::Or { left, right, .. } => {
                out.push_str("Or\n");
                left.dump_into(out, depth + 1);
                right.dump_into(out, depth + 1);
            }
            Expr::Cast { target, sub, .. } => {
                out.push_str(&format!("Cast as {}\n", target.name()));
                sub.dump_into(out, depth + 1);
            }
            Expr::Exists { sub, .. } => {
                out.push_str("Exists\n");
                sub.dump_into(out, depth + 1);
            }
        }
    }
}
