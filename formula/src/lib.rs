//! Compile math formulas into expression trees that can be evaluated,
//! differentiated symbolically, rendered back to text and linked to
//! other named formulas through a `FunctionRegistry`.

pub use ast::{BinOp, CmpOp, LogicOp, Node, Scope, VariableTable};
pub use builtins::{Arity, BuiltinRegistry, Func, StdFn};
pub use derivative::differentiate;
pub use error::{
    CycleError, EngineError, EvaluationError, ParseError, ParseErrorKind, RegistryError,
    ResolutionError, Result,
};
pub use evaluator::{
    compile, compile_with_registry, compile_with_variables, compile_with_variables_and_registry,
    Evaluator, VariableKey,
};
pub use functions::{
    check_cyclic, promote_parameters_to_variables, resolve_dependencies, ExternalFunction,
    FunctionRegistry, LegacyFn, LegacyFunction, NativeFunction,
};
pub use parser::{parse, parse_with, FormulaParser};
pub use render::render;

mod ast;
mod builtins;
mod derivative;
pub mod error;
mod evaluator;
mod functions;
#[cfg(feature = "dynlink-eval")]
pub mod native;
pub mod parser;
mod render;


#[cfg(test)]
mod evaluator_test;
#[cfg(test)]
mod parser_test;
