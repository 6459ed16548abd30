//! Post-evaluation diagnostics and caret completion.
//!
//! `Field` nodes count their hits and comparison nodes record the operand
//! types they saw, both through per-node atomics; this module reads those
//! counters back out after evaluation has unwound and aggregates them
//! across expressions. Completion parses the query in relaxed mode and
//! anchors on the field node under the caret.

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use crate::ast::{Expr, Span};
use crate::env::Environment;
use crate::parser::{ParseMode, Parser};
use crate::value::{Value, ValueKind};

// Operand-type bits recorded by comparison nodes.
pub const T_NULL: u8 = 1 << 0;
pub const T_BOOL: u8 = 1 << 1;
pub const T_INT: u8 = 1 << 2;
pub const T_FLOAT: u8 = 1 << 3;
pub const T_STRING: u8 = 1 << 4;
pub const T_MODEL: u8 = 1 << 5;
pub const T_TRANSIENT: u8 = 1 << 6;
pub const T_UNDEF: u8 = 1 << 7;

/// The bit recorded for one comparison operand.
pub fn type_bit(value: &Value<'_>) -> u8 {
    match value.kind() {
        ValueKind::Undef => T_UNDEF,
        ValueKind::Null => T_NULL,
        ValueKind::Bool(_) => T_BOOL,
        ValueKind::Int(_) => T_INT,
        ValueKind::Float(_) => T_FLOAT,
        ValueKind::Str(_) => T_STRING,
        ValueKind::Transient(_) => T_TRANSIENT,
        ValueKind::Node(_) | ValueKind::Overlay(_) => T_MODEL,
    }
}

/// Names of the recorded operand types, for reporting.
pub fn type_bit_names(bits: u8) -> Vec<&'static str> {
    let table = [
        (T_NULL, "null"),
        (T_BOOL, "bool"),
        (T_INT, "int"),
        (T_FLOAT, "float"),
        (T_STRING, "string"),
        (T_MODEL, "model"),
        (T_TRANSIENT, "transient"),
        (T_UNDEF, "undef"),
    ];
    table
        .iter()
        .filter(|(bit, _)| bits & bit != 0)
        .map(|(_, name)| *name)
        .collect()
}

/// Per-field hit counts read from one expression tree.
pub fn field_hits(expr: &Expr) -> HashMap<String, u64> {
    let mut hits = HashMap::new();
    expr.visit(&mut |node| {
        if let Expr::Field { name, hits: h, .. } = node {
            *hits.entry(name.clone()).or_insert(0) += h.load(Ordering::Relaxed);
        }
    });
    hits
}

/// Comparator operand-type flags per comparison node span.
pub fn comparator_flags(expr: &Expr) -> Vec<(Span, u8)> {
    let mut out = Vec::new();
    expr.visit(&mut |node| {
        if let Expr::Binary {
            op, operand_types, ..
        } = node
        {
            if op.is_comparison() {
                out.push((node.span(), operand_types.load(Ordering::Relaxed)));
            }
        }
    });
    out
}

/// Aggregates per-expression statistics across many evaluations.
#[derive(Default)]
pub struct Diagnostics {
    hits: Mutex<HashMap<String, u64>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one expression's field counters into the aggregate map.
    pub fn aggregate(&self, expr: &Expr) {
        let mut hits = self.hits.lock();
        for (name, count) in field_hits(expr) {
            *hits.entry(name).or_insert(0) += count;
        }
    }

    pub fn hits(&self) -> HashMap<String, u64> {
        self.hits.lock().clone()
    }
}

/// Proposes completions for the field at `caret` in `source`: every
/// dynamic interner string matching the field's case-insensitive prefix.
pub fn complete(env: &Environment, source: &str, caret: usize) -> Vec<String> {
    let Ok(mut parser) = Parser::with_mode(env, source, ParseMode::Relaxed) else {
        return Vec::new();
    };
    let Ok(expr) = parser.parse() else {
        return Vec::new();
    };

    // Narrowest field node whose span covers the caret.
    let mut anchor: Option<(Span, String)> = None;
    expr.visit(&mut |node| {
        if let Expr::Field { name, .. } = node {
            let span = node.span();
            if span.contains(caret) {
                let narrower = match &anchor {
                    Some((best, _)) => span.len() <= best.len(),
                    None => true,
                };
                if narrower {
                    anchor = Some((span, name.clone()));
                }
            }
        }
    });
    let Some((_, prefix)) = anchor else {
        return Vec::new();
    };

    let prefix = prefix.to_lowercase();
    let mut out: Vec<String> = env
        .strings()
        .dynamic_strings()
        .into_iter()
        .filter(|s| s.to_lowercase().starts_with(&prefix))
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_bits_name_themselves() {
        assert_eq!(type_bit(&Value::int(1)), T_INT);
        assert_eq!(type_bit(&Value::null()), T_NULL);
        assert_eq!(type_bit_names(T_INT | T_STRING), vec!["int", "string"]);
    }
}
