pub mod arena;
pub mod ast;
pub mod diag;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod json;
pub mod lexer;
pub mod model;
pub mod ops;
pub mod parser;
pub mod strings;
pub mod transient;
pub mod value;

pub use ast::{BinOp, CastTarget, Expr, Span, Token, TokenKind, UnaryOp};
pub use env::{DebugHook, Environment, TraceEntry, Warning};
pub use error::Error;
pub use evaluator::{evaluate_root, EvalContext, Phase};
pub use functions::Function;
pub use json::{parse_document, value_to_json};
pub use lexer::Lexer;
pub use model::{ModelPool, Node, NodeAddr};
pub use parser::{compile, ParseMode, Parser};
pub use strings::{StrHandle, StringPool};
pub use transient::{IRange, Re, Transient};
pub use value::{Emitter, Flow, NodeRef, OwnedValue, Value, ValueKind};
