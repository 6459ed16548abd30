use std::io;

use crate::ast::Span;

/// Errors surfaced by compilation, evaluation, and pool serialization.
#[derive(Debug)]
pub enum Error {
    /// Tokenization or parsing failed; carries the source location
    Parser { message: String, span: Span },

    /// An operator or cast encountered an unsupported combination
    InvalidType(String),

    /// Compile-time structural error (e.g. subscripting a value that
    /// cannot be subscripted)
    InvalidExpression(String),

    /// Trailing input after the top-level expression
    ExpectedEof { span: Span },

    /// Evaluation was requested against an absent root
    NullModel,

    /// Serialization failure
    Io(io::Error),

    /// Division or modulo by zero
    DivisionByZero,

    /// A function was called with the wrong number of arguments
    ArgumentCount {
        function: &'static str,
        expected: &'static str,
        got: usize,
    },

    /// A function argument had the wrong type
    ArgumentType {
        function: &'static str,
        message: String,
    },

    /// A function argument produced the wrong number of values
    ArgumentValueCount {
        function: &'static str,
        index: usize,
    },

    /// Call to a function the environment does not know
    UnknownFunction(String),

    /// An operator was applied to operand types it has no overload for
    InvalidOperands {
        operator: &'static str,
        operands: String,
    },

    /// A transient meta-type lacks the requested operation
    Unimplemented { type_name: String, operator: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parser { message, span } => {
                write!(f, "Parse error at byte {}: {}", span.start, message)
            }
            Error::InvalidType(msg) => write!(f, "Invalid type: {}", msg),
            Error::InvalidExpression(msg) => write!(f, "Invalid expression: {}", msg),
            Error::ExpectedEof { span } => {
                write!(f, "Expected end of input at byte {}", span.start)
            }
            Error::NullModel => write!(f, "No document to evaluate against"),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::DivisionByZero => write!(f, "Division by zero"),
            Error::ArgumentCount {
                function,
                expected,
                got,
            } => write!(
                f,
                "{}() expects {} argument(s), got {}",
                function, expected, got
            ),
            Error::ArgumentType { function, message } => {
                write!(f, "{}(): {}", function, message)
            }
            Error::ArgumentValueCount { function, index } => write!(
                f,
                "{}(): argument {} must produce exactly one value",
                function, index
            ),
            Error::UnknownFunction(name) => write!(f, "Unknown function: {}", name),
            Error::InvalidOperands { operator, operands } => {
                write!(f, "Operator '{}' cannot be applied to {}", operator, operands)
            }
            Error::Unimplemented { type_name, operator } => {
                write!(f, "Type '{}' does not implement '{}'", type_name, operator)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
