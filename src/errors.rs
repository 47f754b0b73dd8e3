use std::fmt::{self, Display, Formatter};

use thiserror::Error;

/// Error raised while lexing or recursive-descent parsing an S-expression
/// program (`(head arg1 arg2 …)`), a type expression, or a grammar file.
#[derive(Debug, Error, Clone)]
pub enum TermParseErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEos,
    #[error("unexpected character {found:?}")]
    UnexpectedChar { found: char },
    #[error("missing closing parenthesis")]
    MissingRParen,
    #[error("a variable index must be a non-negative integer, found {found:?}")]
    BadVariableIndex { found: String },
    #[error("empty application has no head")]
    EmptyApplication,
}

/// A [`TermParseErrorKind`] annotated with the offending byte offset.
#[derive(Debug, Clone)]
pub struct TermParseError {
    /// Byte offset into the source string where the error was detected.
    pub offset: usize,
    /// Detailed categorization of the error.
    pub kind: TermParseErrorKind,
}

impl TermParseError {
    #[must_use]
    pub fn new(offset: usize, kind: TermParseErrorKind) -> Self {
        Self { offset, kind }
    }
}

impl Display for TermParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.kind, self.offset)
    }
}

impl std::error::Error for TermParseError {}

/// Error raised while parsing an arrow-type expression
/// (`t1 -> t2 -> ... -> r`, including sums `a|b|c` and polymorphic
/// placeholders `'name[a|b|c]` / `'name`).
#[derive(Debug, Error, Clone)]
pub enum TypeParseErrorKind {
    #[error("empty type expression")]
    Empty,
    #[error("polymorphic name '{name}' used before declaration (declared: {declared})")]
    UndeclaredPolymorphicName { name: String, declared: String },
    #[error("polymorphic placeholder '{name}' is missing its '[...]' declaration")]
    MissingSumDeclaration { name: String },
}

/// A [`TypeParseErrorKind`] annotated with the offending type-expression text.
#[derive(Debug, Clone)]
pub struct TypeParseError {
    /// The full type-expression string being parsed when the error occurred.
    pub type_expr: String,
    pub kind: TypeParseErrorKind,
}

impl TypeParseError {
    #[must_use]
    pub fn new(type_expr: impl Into<String>, kind: TypeParseErrorKind) -> Self {
        Self {
            type_expr: type_expr.into(),
            kind,
        }
    }
}

impl Display for TypeParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} (in {:?})", self.kind, self.type_expr)
    }
}

impl std::error::Error for TypeParseError {}

/// A DSL provider is missing a required attribute, or declares its schema
/// inconsistently (spec.md §7, "DSL schema error").
#[derive(Debug, Error, Clone)]
#[error("DSL schema error: {detail}")]
pub struct DslSchemaError {
    pub detail: String,
}

impl DslSchemaError {
    #[must_use]
    pub fn missing_attribute(name: &str) -> Self {
        Self {
            detail: format!("provider is missing required attribute `{name}`"),
        }
    }
}

/// The DFTA assigns two different types to the same state (spec.md §7,
/// "Type check error").
#[derive(Debug, Error, Clone)]
#[error(
    "type conflict for state {state}: expected `{expected}`, found `{found}` via transition `{letter}`"
)]
pub struct TypeCheckError {
    pub state: String,
    pub letter: String,
    pub expected: String,
    pub found: String,
}

/// The loop manager attempted to redirect an oversized derivation but found
/// no admissible target, or the derivation's key already existed (spec.md
/// §7, "Loop contradiction").
#[derive(Debug, Error, Clone)]
pub enum LoopContradictionError {
    #[error("automaton already accepts unboundedly large trees: cannot add loops")]
    AlreadyUnbounded,
    #[error("automaton is not specialized (a state has more than one head letter): cannot add loops")]
    NotSpecialized,
    #[error("rule for ({letter}, {args:?}) already exists in the looped automaton")]
    KeyAlreadyExists { letter: String, args: Vec<String> },
    #[error(
        "no mergeable state of type `{result_type}` and family `{letter}` exists to redirect ({letter}, {args:?})"
    )]
    NoMergeTarget {
        letter: String,
        args: Vec<String>,
        result_type: String,
    },
}

/// A DSL callable raised an error that was not in the provider's
/// `skip_exceptions` set, so it aborts the run (spec.md §7, "Evaluator
/// fatal" — "a contract with the DSL author").
#[derive(Debug, Error, Clone)]
#[error("evaluating `{program}` on input #{input_index} of type `{input_type}` failed: {message}")]
pub struct EvaluatorFatalError {
    pub program: String,
    pub input_type: String,
    pub input_index: usize,
    pub message: String,
}

/// Top-level error type for the pruning pipeline.
#[derive(Debug, Error)]
pub enum PruneError {
    #[error(transparent)]
    TermParse(#[from] TermParseError),
    #[error(transparent)]
    TypeParse(#[from] TypeParseError),
    #[error(transparent)]
    DslSchema(#[from] DslSchemaError),
    #[error(transparent)]
    TypeCheck(#[from] TypeCheckError),
    #[error(transparent)]
    LoopContradiction(#[from] LoopContradictionError),
    #[error(transparent)]
    EvaluatorFatal(#[from] EvaluatorFatalError),
    #[error("failed to load DSL provider `{path}`: {message}")]
    ProviderLoad { path: String, message: String },
    #[error("I/O error writing `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
