#![deny(warnings)]

use crate::ast::{Node, Scope, VariableTable};
use crate::builtins::BuiltinRegistry;
use crate::derivative;
use crate::error::{EngineError, ResolutionError, Result};
use crate::functions::{self, FunctionRegistry};
use crate::parser;
use crate::render;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Selects a variable of an evaluator, by position or by name.
pub trait VariableKey {
    fn position(&self, variables: &VariableTable) -> std::result::Result<usize, ResolutionError>;
}

impl VariableKey for usize {
    fn position(&self, variables: &VariableTable) -> std::result::Result<usize, ResolutionError> {
        if *self >= variables.len() {
            return Err(ResolutionError::InvalidPosition {
                pos: *self,
                len: variables.len(),
            });
        }
        Ok(*self)
    }
}

impl VariableKey for &str {
    fn position(&self, variables: &VariableTable) -> std::result::Result<usize, ResolutionError> {
        variables
            .position(self)
            .ok_or_else(|| ResolutionError::UnknownVariable(self.to_string()))
    }
}

impl VariableKey for String {
    fn position(&self, variables: &VariableTable) -> std::result::Result<usize, ResolutionError> {
        self.as_str().position(variables)
    }
}

/// A compiled formula together with the current value of its variables.
///
/// Cloning is a deep copy, give each thread its own clone.
#[derive(Clone)]
pub struct Evaluator {
    root: Node,
    variables: VariableTable,
    values: Vec<f64>,
    functions: Option<Arc<FunctionRegistry>>,
}

impl Evaluator {
    /// Compile `formula` using `builtins`. Variables are `variables` when
    /// given, any other free identifier being a parameter, otherwise they
    /// are discovered in first-use order. Calls to unknown functions are
    /// registry references when `functions` is given.
    ///
    /// The evaluator doesn't keep `functions`, see `with_functions`.
    pub fn build(
        formula: &str,
        variables: Option<&[String]>,
        builtins: &BuiltinRegistry,
        functions: Option<&FunctionRegistry>,
    ) -> Result<Evaluator> {
        let tokens = lexers::tokenize(formula).map_err(|source| EngineError::Lex {
            formula: formula.to_string(),
            source,
        })?;
        let (root, variables) = parser::parse_with(builtins, tokens, variables, functions)
            .map_err(|source| EngineError::Parse {
                formula: formula.to_string(),
                source,
            })?;
        log::debug!("compiled '{}' with variables {:?}", formula, variables.names());
        Ok(Evaluator::from_parts(root, variables, None))
    }

    pub(crate) fn from_parts(
        root: Node,
        variables: VariableTable,
        functions: Option<Arc<FunctionRegistry>>,
    ) -> Evaluator {
        let values = vec![0.0; variables.len()];
        Evaluator {
            root,
            variables,
            values,
            functions,
        }
    }

    /// A formula with no variables always evaluating to `value`.
    pub fn constant(value: f64) -> Evaluator {
        Evaluator::from_parts(Node::Literal(value), VariableTable::new(), None)
    }

    /// Attach the registry used to resolve names at evaluation time.
    pub fn with_functions(mut self, functions: Arc<FunctionRegistry>) -> Evaluator {
        self.functions = Some(functions);
        self
    }

    pub fn functions(&self) -> Option<&Arc<FunctionRegistry>> {
        self.functions.as_ref()
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    fn scope<'a>(&'a self, values: &'a [f64]) -> Scope<'a> {
        Scope::new(values, self.functions.as_deref())
    }

    pub fn value(&self) -> Result<f64> {
        self.root.eval(&self.scope(&self.values))
    }

    /// Evaluate with some variables overridden, the stored values are kept.
    pub fn value_with(&self, overrides: &HashMap<String, f64>) -> Result<f64> {
        let mut values = self.values.clone();
        for (name, value) in overrides {
            values[name.position(&self.variables)?] = *value;
        }
        self.root.eval(&self.scope(&values))
    }

    pub fn set_variable<K: VariableKey>(&mut self, key: K, value: f64) -> Result<()> {
        let index = key.position(&self.variables)?;
        self.values[index] = value;
        Ok(())
    }

    pub fn set_variable_at(&mut self, index: usize, value: f64) -> Result<()> {
        self.set_variable(index, value)
    }

    pub fn variable_value<K: VariableKey>(&self, key: K) -> Result<f64> {
        Ok(self.values[key.position(&self.variables)?])
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.names().to_vec()
    }

    pub fn number_of_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn parameter_names(&self) -> HashSet<String> {
        self.root.parameters()
    }

    /// Derivative w.r.t. one of the variables, same variables and values.
    pub fn differentiate<K: VariableKey>(&self, key: K) -> Result<Evaluator> {
        let index = key.position(&self.variables)?;
        let root = derivative::differentiate(&self.root, index, &self.scope(&self.values))?;
        log::debug!("d({})/d{} = {:?}", self, self.variables.names()[index], root);
        Ok(Evaluator {
            root,
            variables: self.variables.clone(),
            values: self.values.clone(),
            functions: self.functions.clone(),
        })
    }

    pub fn check_cyclic_dependency(&self) -> Result<()> {
        if let Some(registry) = self.functions.as_deref() {
            let mut in_progress = Vec::new();
            for name in self.root.dependencies() {
                functions::check_cyclic(&name, registry, &mut in_progress)?;
            }
        }
        Ok(())
    }

    /// Copy of this evaluator with every registry reference inlined.
    pub fn resolve_dependencies(&self) -> Result<Evaluator> {
        self.check_cyclic_dependency()?;
        let root = functions::resolve_dependencies(&self.root, &self.scope(&self.values))?;
        Ok(Evaluator {
            root,
            variables: self.variables.clone(),
            values: self.values.clone(),
            functions: self.functions.clone(),
        })
    }

    /// Turn some parameters into new trailing variables. They start with
    /// the value the registry gives them, 0 when it has none.
    pub fn promote_parameters(&self, names: &[String]) -> Result<Evaluator> {
        let (root, variables) =
            functions::promote_parameters_to_variables(&self.root, &self.variables, names)?;
        let mut values = self.values.clone();
        for name in names {
            let value = match Node::Parameter(name.clone()).eval(&self.scope(&[])) {
                Err(EngineError::Resolution(ResolutionError::UnknownParameter(_))) => 0.0,
                value => value?,
            };
            values.push(value);
        }
        Ok(Evaluator {
            root,
            variables,
            values,
            functions: self.functions.clone(),
        })
    }

    /// Formula text, `overrides` renames variables and parameters.
    pub fn render(&self, overrides: &HashMap<String, String>) -> String {
        render::render(&self.root, &self.variables, overrides)
    }
}

impl fmt::Display for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.render(&HashMap::new()))
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("formula", &self.to_string())
            .field("variables", &self.variables.names())
            .field("values", &self.values)
            .finish()
    }
}

/// Compile `formula` discovering its variables.
pub fn compile(formula: &str) -> Result<Evaluator> {
    Evaluator::build(formula, None, BuiltinRegistry::global(), None)
}

/// Compile `formula` with the given variables, other identifiers being
/// parameters.
pub fn compile_with_variables(variables: &[String], formula: &str) -> Result<Evaluator> {
    Evaluator::build(formula, Some(variables), BuiltinRegistry::global(), None)
}

pub fn compile_with_registry(formula: &str, functions: &Arc<FunctionRegistry>) -> Result<Evaluator> {
    Ok(Evaluator::build(formula, None, BuiltinRegistry::global(), Some(functions.as_ref()))?
        .with_functions(functions.clone()))
}

pub fn compile_with_variables_and_registry(
    variables: &[String],
    formula: &str,
    functions: &Arc<FunctionRegistry>,
) -> Result<Evaluator> {
    Ok(
        Evaluator::build(formula, Some(variables), BuiltinRegistry::global(), Some(functions.as_ref()))?
            .with_functions(functions.clone()),
    )
}
