//! # Caraway Query Language - Abstract Syntax Tree
//!
//! This module defines the token stream and the compiled expression tree
//! for the Caraway query language, a JSONPath-like language with filters,
//! arithmetic, wildcards, casts, and user-defined functions over columnar
//! document pools.
//!
//! ## Architecture Overview
//!
//! - **[tokens]** - Lexical tokens with byte-range spans
//! - **[operators]** - Unary/binary operator and cast-target tags
//! - **[expressions]** - The expression tree the evaluator walks
//!
//! ## Core Concepts
//!
//! ### Paths and wildcards
//!
//! ```text
//! sub.a            // named steps
//! **.a             // every descendant named 'a'
//! c[range(0,2)...] // subscript driven by an unpacked range
//! ```
//!
//! ### Sub-selects
//!
//! ```text
//! items{price > 100}   // forward values whose predicate holds
//! ```
//!
//! ### Evaluation model
//!
//! Each node exposes `evaluate(ctx, current, emit)`; results stream
//! through the emitter callback, which can stop the evaluation
//! cooperatively. Every evaluation emits at least one value: producers
//! that found nothing emit a single terminal null (undef during the
//! compilation phase).
pub mod expressions;
pub mod operators;
pub mod tokens;

pub use expressions::{Category, Expr, HANDLE_UNRESOLVED};
pub use operators::{BinOp, CastTarget, UnaryOp};
pub use tokens::{Span, Token, TokenKind};
