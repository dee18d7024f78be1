use snafu::Snafu;

use crate::types::PrimitiveType;

pub type CompileResult<T> = Result<T, CompileError>;

/* Internal means the compiler broke its own invariants; the rest are faults in the input. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lexical,
    Syntax,
    Semantic,
    Symbol,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
    #[snafu(display("unrecognised character '{ch}'"))]
    UnknownCharacter { ch: char },

    #[snafu(display("malformed operator '{text}'"))]
    MalformedOperator { text: String },

    #[snafu(display("malformed integer literal '{text}'"))]
    MalformedLiteral { text: String },

    #[snafu(display("integer literal {text} does not fit in 64 bits"))]
    LiteralOutOfRange { text: String },

    #[snafu(display("expected {expected}, got {found}"))]
    UnexpectedToken { expected: String, found: String },

    #[snafu(display("incompatible types {left} and {right}"))]
    IncompatibleTypes {
        left: PrimitiveType,
        right: PrimitiveType,
    },

    #[snafu(display("condition must be a comparison, got {found}"))]
    NotAComparison { found: String },

    #[snafu(display("{message}"))]
    Semantic { message: String },

    #[snafu(display("no pointer type for {ty}"))]
    NoPointerType { ty: PrimitiveType },

    #[snafu(display("cannot dereference {ty}"))]
    NotAPointer { ty: PrimitiveType },

    #[snafu(display("'{name}' is already declared"))]
    DuplicateSymbol { name: String },

    #[snafu(display("'{name}' is not declared"))]
    UndeclaredSymbol { name: String },

    #[snafu(display("out of scratch registers"))]
    RegisterExhausted,

    #[snafu(display("scratch register {index} is already free"))]
    RegisterAlreadyFree { index: usize },

    #[snafu(display("no scratch register with index {index}"))]
    InvalidRegister { index: usize },

    #[snafu(display("{op} reached code generation in an invalid position"))]
    InvalidOperation { op: String },

    #[snafu(display("{ty} has no storage size"))]
    UnsizedType { ty: PrimitiveType },
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::UnknownCharacter { .. }
            | CompileError::MalformedOperator { .. }
            | CompileError::MalformedLiteral { .. }
            | CompileError::LiteralOutOfRange { .. } => ErrorKind::Lexical,
            CompileError::UnexpectedToken { .. } => ErrorKind::Syntax,
            CompileError::IncompatibleTypes { .. }
            | CompileError::NotAComparison { .. }
            | CompileError::Semantic { .. }
            | CompileError::NoPointerType { .. }
            | CompileError::NotAPointer { .. } => ErrorKind::Semantic,
            CompileError::DuplicateSymbol { .. } | CompileError::UndeclaredSymbol { .. } => {
                ErrorKind::Symbol
            }
            CompileError::RegisterExhausted
            | CompileError::RegisterAlreadyFree { .. }
            | CompileError::InvalidRegister { .. }
            | CompileError::InvalidOperation { .. }
            | CompileError::UnsizedType { .. } => ErrorKind::Internal,
        }
    }
}
