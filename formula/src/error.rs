#![deny(warnings)]

use lexers::LexError;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("missing closing parenthesis")]
    MissingCParen,
    #[error("missing opening parenthesis")]
    MissingOParen,
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("no overload of '{name}' takes {params} parameter(s) and {args} argument(s)")]
    ArityMismatch {
        name: String,
        params: usize,
        args: usize,
    },
    #[error("comparisons can't be chained")]
    ChainedComparison,
    #[error("invalid integer parameter '{0}'")]
    InvalidParameter(String),
    #[error("'{0}' is not a variable")]
    NotAVariable(String),
    #[error("invalid differentiation order {0}")]
    InvalidOrder(i64),
    #[error("variable '{0}' multiply defined")]
    DuplicateVariable(String),
    #[error("invalid variable name '{0}'")]
    InvalidVariableName(String),
}

/// A grammar violation plus the token closest to where it was detected.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("{kind} near {near}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub near: String,
}

impl ParseError {
    pub fn new<S: Into<String>>(kind: ParseErrorKind, near: S) -> Self {
        ParseError {
            kind,
            near: near.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum ResolutionError {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("invalid variable position {pos}, formula has {len} variable(s)")]
    InvalidPosition { pos: usize, len: usize },
    #[error("'{0}' is not a parameter of the formula")]
    NotAParameter(String),
    #[error("'{0}' is already a variable of the formula")]
    AlreadyVariable(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub struct CycleError {
    pub chain: Vec<String>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "cyclic dependency: {}", self.chain.join(" -> "))
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum EvaluationError {
    #[error("function '{name}' failed with status {status}")]
    Status { name: String, status: i32 },
    #[error("function '{0}' is not differentiable")]
    NotDifferentiable(String),
    #[error("'{0}' can only be evaluated once expanded")]
    Unexpanded(String),
    #[error("can't load '{symbol}': {reason}")]
    Link { symbol: String, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("'{0}' is already declared")]
    AlreadyDeclared(String),
    #[error("invalid function name '{0}'")]
    InvalidName(String),
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid formula '{formula}': {source}")]
    Lex { formula: String, source: LexError },
    #[error("invalid formula '{formula}': {source}")]
    Parse { formula: String, source: ParseError },
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
