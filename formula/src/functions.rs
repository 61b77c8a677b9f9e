#![deny(warnings)]

use crate::ast::{Node, Scope, VariableTable};
use crate::builtins::{BuiltinRegistry, Func};
use crate::error::{CycleError, EngineError, EvaluationError, RegistryError, ResolutionError};
use crate::evaluator::Evaluator;
use lexers::{FormulaToken, Lexeme};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::os::raw::c_int;
use std::sync::Arc;

/// A callable with a fixed number of real arguments.
#[derive(Clone)]
pub struct NativeFunction {
    arity: usize,
    call: Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>,
}

impl NativeFunction {
    pub fn new<F>(arity: usize, call: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        NativeFunction {
            arity,
            call: Arc::new(call),
        }
    }

    pub fn unary(f: fn(f64) -> f64) -> Self {
        NativeFunction::new(1, move |args| f(args[0]))
    }

    pub fn binary(f: fn(f64, f64) -> f64) -> Self {
        NativeFunction::new(2, move |args| f(args[0], args[1]))
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn call(&self, args: &[f64]) -> f64 {
        (self.call)(args)
    }
}

/// `double f(const double* args, int nargs, int* status)`
pub type LegacyFn = unsafe extern "C" fn(*const f64, c_int, *mut c_int) -> f64;

/// A C function reporting failures through a status out-parameter.
#[derive(Clone)]
pub struct LegacyFunction {
    arity: usize,
    call: LegacyFn,
    // whatever must outlive 'call', eg: the library it was loaded from
    _owner: Option<Arc<dyn Any + Send + Sync>>,
}

impl LegacyFunction {
    /// # Safety
    ///
    /// `call` must read at most `nargs` values from `args` and write only
    /// to `status`.
    pub unsafe fn new(arity: usize, call: LegacyFn) -> Self {
        LegacyFunction {
            arity,
            call,
            _owner: None,
        }
    }

    pub fn owned_by<T: Any + Send + Sync>(mut self, owner: Arc<T>) -> Self {
        self._owner = Some(owner);
        self
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn call(&self, name: &str, args: &[f64]) -> Result<f64, EvaluationError> {
        let mut status: c_int = 0;
        let value = unsafe { (self.call)(args.as_ptr(), args.len() as c_int, &mut status) };
        if status != 0 {
            log::warn!("{} failed with status {}", name, status);
            return Err(EvaluationError::Status {
                name: name.to_string(),
                status,
            });
        }
        Ok(value)
    }
}

/// Anything that can be referenced by name from a formula.
#[derive(Clone)]
pub enum ExternalFunction {
    Formula(Evaluator),
    Constant(f64),
    Native(NativeFunction),
    Legacy(LegacyFunction),
}

impl ExternalFunction {
    pub fn arity(&self) -> usize {
        match self {
            ExternalFunction::Formula(evaluator) => evaluator.number_of_variables(),
            ExternalFunction::Constant(_) => 0,
            ExternalFunction::Native(f) => f.arity(),
            ExternalFunction::Legacy(f) => f.arity(),
        }
    }

    fn dependencies(&self) -> Vec<String> {
        match self {
            ExternalFunction::Formula(evaluator) => evaluator.root().dependencies(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Debug for ExternalFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExternalFunction::Formula(evaluator) => write!(f, "Formula({})", evaluator),
            ExternalFunction::Constant(value) => write!(f, "Constant({})", value),
            ExternalFunction::Native(n) => write!(f, "Native/{}", n.arity()),
            ExternalFunction::Legacy(l) => write!(f, "Legacy/{}", l.arity()),
        }
    }
}

/// Named functions shared by the formulas that reference them.
///
/// Populate it first, then wrap it in an `Arc` and hand it to evaluators.
/// Formulas stored here don't hold the registry, it's passed along
/// whenever they're evaluated through it.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    order: Vec<String>,
    functions: HashMap<String, ExternalFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        FunctionRegistry::default()
    }

    pub fn register(&mut self, name: &str, function: ExternalFunction) -> Result<(), RegistryError> {
        let builtins = BuiltinRegistry::global();
        if builtins.contains(name) || !is_identifier(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if self.functions.contains_key(name) {
            return Err(RegistryError::AlreadyDeclared(name.to_string()));
        }
        log::debug!("registering {} = {:?}", name, function);
        self.order.push(name.to_string());
        self.functions.insert(name.to_string(), function);
        Ok(())
    }

    /// Compile `formula` against this registry and register it under `name`,
    /// variables are discovered in first-use order.
    pub fn register_formula(&mut self, name: &str, formula: &str) -> Result<(), EngineError> {
        let evaluator = Evaluator::build(formula, None, BuiltinRegistry::global(), Some(self))?;
        Ok(self.register(name, ExternalFunction::Formula(evaluator))?)
    }

    pub fn register_formula_with_variables(
        &mut self,
        name: &str,
        variables: &[String],
        formula: &str,
    ) -> Result<(), EngineError> {
        let evaluator =
            Evaluator::build(formula, Some(variables), BuiltinRegistry::global(), Some(self))?;
        Ok(self.register(name, ExternalFunction::Formula(evaluator))?)
    }

    pub fn register_constant(&mut self, name: &str, value: f64) -> Result<(), RegistryError> {
        self.register(name, ExternalFunction::Constant(value))
    }

    pub fn get(&self, name: &str) -> Option<&ExternalFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|n| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn check_cyclic(&self, name: &str) -> Result<(), CycleError> {
        check_cyclic(name, self, &mut Vec::new())
    }

    /// Evaluate the function `name` at `args`.
    pub fn call(&self, name: &str, args: &[f64]) -> Result<f64, EngineError> {
        invoke(&Scope::new(&[], Some(self)), name, args)
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.order.iter()).finish()
    }
}

/// Depth first walk over the names `name` references, failing with the
/// offending chain if one of them leads back to a name in `in_progress`.
pub fn check_cyclic(
    name: &str,
    registry: &FunctionRegistry,
    in_progress: &mut Vec<String>,
) -> Result<(), CycleError> {
    if let Some(start) = in_progress.iter().position(|n| n == name) {
        let mut chain = in_progress[start..].to_vec();
        chain.push(name.to_string());
        return Err(CycleError { chain });
    }
    let dependencies = match registry.get(name) {
        Some(function) => function.dependencies(),
        None => return Ok(()),
    };
    in_progress.push(name.to_string());
    for dependency in dependencies.iter() {
        check_cyclic(dependency, registry, in_progress)?;
    }
    in_progress.pop();
    Ok(())
}

fn is_identifier(name: &str) -> bool {
    matches!(
        lexers::tokenize(name).as_deref(),
        Ok([Lexeme {
            token: FormulaToken::Identifier(_),
            ..
        }])
    )
}

fn check_arity(name: &str, expected: usize, got: usize) -> Result<(), ResolutionError> {
    if expected != got {
        return Err(ResolutionError::ArityMismatch {
            name: name.to_string(),
            expected,
            got,
        });
    }
    Ok(())
}

pub(crate) fn invoke(scope: &Scope, name: &str, args: &[f64]) -> Result<f64, EngineError> {
    let function = scope
        .functions()
        .and_then(|functions| functions.get(name))
        .ok_or_else(|| ResolutionError::UnknownFunction(name.to_string()))?;
    check_arity(name, function.arity(), args.len())?;
    match function {
        ExternalFunction::Formula(evaluator) => {
            let frame = scope.enter(name)?;
            evaluator.root().eval(&scope.callee(args, &frame))
        }
        ExternalFunction::Constant(value) => Ok(*value),
        ExternalFunction::Native(f) => Ok(f.call(args)),
        ExternalFunction::Legacy(f) => Ok(f.call(name, args)?),
    }
}

pub(crate) fn parameter_value(scope: &Scope, name: &str) -> Result<f64, EngineError> {
    match scope.functions().and_then(|functions| functions.get(name)) {
        Some(function) if function.arity() == 0 => invoke(scope, name, &[]),
        _ => Err(ResolutionError::UnknownParameter(name.to_string()).into()),
    }
}

/// Inline every registry reference of `node`.
///
/// Calls to formulas are replaced by their bodies with the arguments
/// substituted, constants become literals and native functions become
/// direct calls. Parameters the registry doesn't know are left alone.
pub fn resolve_dependencies(node: &Node, scope: &Scope) -> Result<Node, EngineError> {
    node.transform(&mut |node| match node {
        Node::External(name, args) => Some(resolve_call(name, args, scope)),
        Node::Parameter(name) => match scope.functions().and_then(|f| f.get(name)) {
            Some(function) if function.arity() == 0 => Some(resolve_call(name, &[], scope)),
            _ => None,
        },
        _ => None,
    })
}

fn resolve_call(name: &str, args: &[Node], scope: &Scope) -> Result<Node, EngineError> {
    let function = scope
        .functions()
        .and_then(|functions| functions.get(name))
        .ok_or_else(|| ResolutionError::UnknownFunction(name.to_string()))?;
    check_arity(name, function.arity(), args.len())?;
    let args = args
        .iter()
        .map(|arg| resolve_dependencies(arg, scope))
        .collect::<Result<Vec<Node>, EngineError>>()?;
    Ok(match function {
        ExternalFunction::Constant(value) => Node::Literal(*value),
        ExternalFunction::Native(f) => {
            Node::Call(Func::Native(name.to_string(), f.clone()), Vec::new(), args)
        }
        ExternalFunction::Legacy(f) => {
            Node::Call(Func::Legacy(name.to_string(), f.clone()), Vec::new(), args)
        }
        ExternalFunction::Formula(evaluator) => {
            let frame = scope.enter(name)?;
            log::debug!("inlining {}", name);
            // arguments are resolved already, only the body's own references remain
            let body = evaluator.root().substitute(&args, scope)?;
            resolve_dependencies(&body, &scope.callee(scope.values(), &frame))?
        }
    })
}

/// Turn the parameters listed in `names` into variables appended to
/// `table`, in the order given.
pub fn promote_parameters_to_variables(
    node: &Node,
    table: &VariableTable,
    names: &[String],
) -> Result<(Node, VariableTable), EngineError> {
    let parameters = node.parameters();
    let mut promoted = table.clone();
    let mut indices = HashMap::new();
    for name in names {
        if table.position(name).is_some() || indices.contains_key(name) {
            return Err(ResolutionError::AlreadyVariable(name.to_string()).into());
        }
        if !parameters.contains(name) {
            return Err(ResolutionError::NotAParameter(name.to_string()).into());
        }
        indices.insert(name.clone(), promoted.push(name));
    }
    let node = node.transform(&mut |node| match node {
        Node::Parameter(name) => indices.get(name).map(|i| Ok(Node::Variable(*i))),
        _ => None,
    })?;
    Ok((node, promoted))
}

///////////////////////////////////////////////////////////////////////////////
