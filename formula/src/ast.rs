#![deny(warnings)]

use crate::builtins::{Func, StdFn};
use crate::derivative;
use crate::error::{CycleError, EngineError, ResolutionError};
use crate::functions::{self, FunctionRegistry};
use std::collections::HashSet;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LogicOp {
    And,
    Or,
    Not,
}

/// Expression tree of a compiled formula.
///
/// Variables are positions into the value buffer of the evaluator owning
/// the tree, they never hold values themselves.
#[derive(Clone, PartialEq, Debug)]
pub enum Node {
    Literal(f64),
    Variable(usize),
    /// Free identifier resolved through the function registry.
    Parameter(String),
    Negate(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    /// Evaluates to 1 when the comparison holds, 0 otherwise.
    Comparison(CmpOp, Box<Node>, Box<Node>),
    /// `And`/`Or` take two or more operands, `Not` takes one.
    Logical(LogicOp, Vec<Node>),
    Conditional(Box<Node>, Box<Node>, Box<Node>),
    /// Builtin application: function, leading integer params, arguments.
    Call(Func, Vec<i64>, Vec<Node>),
    /// Call to a named function looked up in the registry.
    External(String, Vec<Node>),
}

/// Names of the variables of a formula, their position is their index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VariableTable {
    names: Vec<String>,
}

impl VariableTable {
    pub fn new() -> Self {
        VariableTable { names: Vec::new() }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(|n| n.as_str())
    }

    // index of 'name', appending it if it's new
    pub(crate) fn register(&mut self, name: &str) -> usize {
        match self.position(name) {
            Some(index) => index,
            None => self.push(name),
        }
    }

    pub(crate) fn push(&mut self, name: &str) -> usize {
        self.names.push(name.to_string());
        self.names.len() - 1
    }
}

/// Link of the chain of registry functions being evaluated.
#[derive(Debug)]
pub struct CallFrame<'a> {
    name: &'a str,
    parent: Option<&'a CallFrame<'a>>,
}

/// Everything a tree needs to be evaluated: variable values, the registry
/// used to resolve names and the registry calls in progress.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    values: &'a [f64],
    functions: Option<&'a FunctionRegistry>,
    caller: Option<&'a CallFrame<'a>>,
}

impl<'a> Scope<'a> {
    pub fn new(values: &'a [f64], functions: Option<&'a FunctionRegistry>) -> Self {
        Scope {
            values,
            functions,
            caller: None,
        }
    }

    pub fn values(&self) -> &'a [f64] {
        self.values
    }

    pub fn functions(&self) -> Option<&'a FunctionRegistry> {
        self.functions
    }

    pub fn variable(&self, index: usize) -> Result<f64, ResolutionError> {
        self.values
            .get(index)
            .copied()
            .ok_or(ResolutionError::InvalidPosition {
                pos: index,
                len: self.values.len(),
            })
    }

    /// Push `name` on the call chain, failing if it's already being called.
    pub(crate) fn enter<'b>(&self, name: &'b str) -> Result<CallFrame<'b>, CycleError>
    where
        'a: 'b,
    {
        let mut frame = self.caller;
        while let Some(f) = frame {
            if f.name == name {
                return Err(self.cycle_from(name));
            }
            frame = f.parent;
        }
        Ok(CallFrame {
            name,
            parent: self.caller,
        })
    }

    // the calls from the outermost 'name' down to the current one, then 'name'
    fn cycle_from(&self, name: &str) -> CycleError {
        let mut chain = vec![name.to_string()];
        let mut frame = self.caller;
        while let Some(f) = frame {
            chain.push(f.name.to_string());
            frame = f.parent;
        }
        chain.reverse();
        let start = chain.iter().position(|n| n == name).unwrap_or(0);
        CycleError {
            chain: chain.split_off(start),
        }
    }

    pub(crate) fn callee<'b>(&self, values: &'b [f64], frame: &'b CallFrame<'b>) -> Scope<'b>
    where
        'a: 'b,
    {
        Scope {
            values,
            functions: self.functions,
            caller: Some(frame),
        }
    }
}

fn truth(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl CmpOp {
    pub fn apply(&self, l: f64, r: f64) -> bool {
        match self {
            CmpOp::Lt => l < r,
            CmpOp::Le => l <= r,
            CmpOp::Gt => l > r,
            CmpOp::Ge => l >= r,
            CmpOp::Eq => l == r,
            CmpOp::Ne => l != r,
        }
    }
}

impl Node {
    pub fn eval(&self, scope: &Scope) -> Result<f64, EngineError> {
        Ok(match self {
            Node::Literal(value) => *value,
            Node::Variable(index) => scope.variable(*index)?,
            Node::Parameter(name) => functions::parameter_value(scope, name)?,
            Node::Negate(child) => -child.eval(scope)?,
            Node::Binary(op, l, r) => {
                let (l, r) = (l.eval(scope)?, r.eval(scope)?);
                match op {
                    BinOp::Add => l + r,
                    BinOp::Sub => l - r,
                    BinOp::Mul => l * r,
                    BinOp::Div => l / r,
                    BinOp::Pow => l.powf(r),
                }
            }
            Node::Comparison(op, l, r) => truth(op.apply(l.eval(scope)?, r.eval(scope)?)),
            Node::Logical(LogicOp::And, operands) => {
                for operand in operands {
                    if operand.eval(scope)? == 0.0 {
                        return Ok(0.0);
                    }
                }
                1.0
            }
            Node::Logical(LogicOp::Or, operands) => {
                for operand in operands {
                    if operand.eval(scope)? != 0.0 {
                        return Ok(1.0);
                    }
                }
                0.0
            }
            Node::Logical(LogicOp::Not, operands) => match operands.first() {
                Some(operand) => truth(operand.eval(scope)? == 0.0),
                None => 1.0,
            },
            Node::Conditional(cond, then, otherwise) => {
                if cond.eval(scope)? != 0.0 {
                    then.eval(scope)?
                } else {
                    otherwise.eval(scope)?
                }
            }
            Node::Call(Func::Diff, params, args) => {
                derivative::expand_diff(params, args, scope)?.eval(scope)?
            }
            Node::Call(func, params, args) => {
                let values = eval_all(args, scope)?;
                func.eval(params, &values)?
            }
            Node::External(name, args) => {
                let values = eval_all(args, scope)?;
                functions::invoke(scope, name, &values)?
            }
        })
    }

    /// If the value of the tree changes with the variable at `index`.
    pub fn depends_on(&self, index: usize) -> bool {
        match self {
            Node::Literal(_) | Node::Parameter(_) => false,
            Node::Variable(i) => *i == index,
            Node::Negate(child) => child.depends_on(index),
            Node::Binary(_, l, r) | Node::Comparison(_, l, r) => {
                l.depends_on(index) || r.depends_on(index)
            }
            Node::Conditional(c, a, b) => {
                c.depends_on(index) || a.depends_on(index) || b.depends_on(index)
            }
            Node::Logical(_, args) | Node::Call(_, _, args) | Node::External(_, args) => {
                args.iter().any(|arg| arg.depends_on(index))
            }
        }
    }

    /// Rebuild the tree top-down, `f` can replace a whole subtree by
    /// returning `Some`, otherwise children are visited.
    pub(crate) fn transform<F>(&self, f: &mut F) -> Result<Node, EngineError>
    where
        F: FnMut(&Node) -> Option<Result<Node, EngineError>>,
    {
        if let Some(replaced) = f(self) {
            return replaced;
        }
        Ok(match self {
            Node::Literal(_) | Node::Variable(_) | Node::Parameter(_) => self.clone(),
            Node::Negate(child) => Node::Negate(Box::new(child.transform(f)?)),
            Node::Binary(op, l, r) => {
                Node::Binary(*op, Box::new(l.transform(f)?), Box::new(r.transform(f)?))
            }
            Node::Comparison(op, l, r) => {
                Node::Comparison(*op, Box::new(l.transform(f)?), Box::new(r.transform(f)?))
            }
            Node::Conditional(c, a, b) => Node::Conditional(
                Box::new(c.transform(f)?),
                Box::new(a.transform(f)?),
                Box::new(b.transform(f)?),
            ),
            Node::Logical(op, args) => Node::Logical(*op, transform_all(args, f)?),
            Node::Call(func, params, args) => {
                Node::Call(func.clone(), params.clone(), transform_all(args, f)?)
            }
            Node::External(name, args) => Node::External(name.clone(), transform_all(args, f)?),
        })
    }

    pub(crate) fn visit<F: FnMut(&Node)>(&self, f: &mut F) {
        f(self);
        match self {
            Node::Literal(_) | Node::Variable(_) | Node::Parameter(_) => (),
            Node::Negate(child) => child.visit(f),
            Node::Binary(_, l, r) | Node::Comparison(_, l, r) => {
                l.visit(f);
                r.visit(f);
            }
            Node::Conditional(c, a, b) => {
                c.visit(f);
                a.visit(f);
                b.visit(f);
            }
            Node::Logical(_, args) | Node::Call(_, _, args) | Node::External(_, args) => {
                args.iter().for_each(|arg| arg.visit(f))
            }
        }
    }

    pub fn parameters(&self) -> HashSet<String> {
        let mut names = HashSet::new();
        self.visit(&mut |node| {
            if let Node::Parameter(name) = node {
                names.insert(name.clone());
            }
        });
        names
    }

    /// Registry names referenced by calls and parameters, in first-use order.
    pub fn dependencies(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        self.visit(&mut |node| match node {
            Node::Parameter(name) | Node::External(name, _) => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            _ => (),
        });
        names
    }

    /// Replace every variable `i` by `args[i]`.
    ///
    /// The tree lives in the variable space of a callee, `args` in the one
    /// of `caller`. An embedded `diff` whose variable isn't mapped to a
    /// plain caller variable is expanded at the values `args` take in
    /// `caller`.
    pub(crate) fn substitute(&self, args: &[Node], caller: &Scope) -> Result<Node, EngineError> {
        self.transform(&mut |node| match node {
            Node::Variable(i) => Some(args.get(*i).cloned().ok_or_else(|| {
                ResolutionError::InvalidPosition {
                    pos: *i,
                    len: args.len(),
                }
                .into()
            })),
            Node::Call(Func::Diff, params, diff_args) => {
                Some(substitute_diff(params, diff_args, args, caller))
            }
            _ => None,
        })
    }

    pub(crate) fn add(l: Node, r: Node) -> Node {
        match (&l, &r) {
            (Node::Literal(a), Node::Literal(b)) => Node::Literal(a + b),
            (Node::Literal(z), _) if *z == 0.0 => r,
            (_, Node::Literal(z)) if *z == 0.0 => l,
            _ => Node::Binary(BinOp::Add, Box::new(l), Box::new(r)),
        }
    }

    pub(crate) fn sub(l: Node, r: Node) -> Node {
        match (&l, &r) {
            (Node::Literal(a), Node::Literal(b)) => Node::Literal(a - b),
            (Node::Literal(z), _) if *z == 0.0 => Node::neg(r),
            (_, Node::Literal(z)) if *z == 0.0 => l,
            _ => Node::Binary(BinOp::Sub, Box::new(l), Box::new(r)),
        }
    }

    pub(crate) fn mul(l: Node, r: Node) -> Node {
        match (&l, &r) {
            (Node::Literal(a), Node::Literal(b)) => Node::Literal(a * b),
            (Node::Literal(z), _) | (_, Node::Literal(z)) if *z == 0.0 => Node::Literal(0.0),
            (Node::Literal(o), _) if *o == 1.0 => r,
            (_, Node::Literal(o)) if *o == 1.0 => l,
            (Node::Literal(m), _) if *m == -1.0 => Node::neg(r),
            (_, Node::Literal(m)) if *m == -1.0 => Node::neg(l),
            _ => Node::Binary(BinOp::Mul, Box::new(l), Box::new(r)),
        }
    }

    pub(crate) fn div(l: Node, r: Node) -> Node {
        match (&l, &r) {
            (Node::Literal(a), Node::Literal(b)) => Node::Literal(a / b),
            (Node::Literal(z), _) if *z == 0.0 => Node::Literal(0.0),
            (_, Node::Literal(o)) if *o == 1.0 => l,
            _ => Node::Binary(BinOp::Div, Box::new(l), Box::new(r)),
        }
    }

    pub(crate) fn pow(l: Node, r: Node) -> Node {
        match (&l, &r) {
            (Node::Literal(a), Node::Literal(b)) => Node::Literal(a.powf(*b)),
            (_, Node::Literal(z)) if *z == 0.0 => Node::Literal(1.0),
            (_, Node::Literal(o)) if *o == 1.0 => l,
            _ => Node::Binary(BinOp::Pow, Box::new(l), Box::new(r)),
        }
    }

    pub(crate) fn neg(child: Node) -> Node {
        match child {
            Node::Literal(v) => Node::Literal(-v),
            Node::Negate(inner) => *inner,
            _ => Node::Negate(Box::new(child)),
        }
    }

    pub(crate) fn call(f: StdFn, args: Vec<Node>) -> Node {
        Node::Call(Func::Std(f), Vec::new(), args)
    }
}

fn transform_all<F>(args: &[Node], f: &mut F) -> Result<Vec<Node>, EngineError>
where
    F: FnMut(&Node) -> Option<Result<Node, EngineError>>,
{
    args.iter().map(|arg| arg.transform(f)).collect()
}

fn eval_all(args: &[Node], scope: &Scope) -> Result<Vec<f64>, EngineError> {
    args.iter().map(|arg| arg.eval(scope)).collect()
}

fn substitute_diff(
    params: &[i64],
    diff_args: &[Node],
    args: &[Node],
    caller: &Scope,
) -> Result<Node, EngineError> {
    if let [expr, Node::Variable(v)] = diff_args {
        if let Some(Node::Variable(k)) = args.get(*v) {
            let aliased = args
                .iter()
                .enumerate()
                .any(|(j, arg)| j != *v && arg.depends_on(*k));
            if !aliased {
                let expr = expr.substitute(args, caller)?;
                return Ok(Node::Call(Func::Diff, params.to_vec(), vec![expr, Node::Variable(*k)]));
            }
        }
    }
    let values = eval_all(args, caller)?;
    let callee = Scope::new(&values, caller.functions());
    derivative::expand_diff(params, diff_args, &callee)?.substitute(args, caller)
}

///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{BinOp, Node, Scope, VariableTable};

    fn var(i: usize) -> Node {
        Node::Variable(i)
    }

    #[test]
    fn simplifying_constructors() {
        assert_eq!(Node::add(Node::Literal(0.0), var(0)), var(0));
        assert_eq!(Node::mul(var(1), Node::Literal(0.0)), Node::Literal(0.0));
        assert_eq!(Node::mul(Node::Literal(1.0), var(1)), var(1));
        assert_eq!(Node::neg(Node::neg(var(2))), var(2));
        assert_eq!(Node::sub(Node::Literal(0.0), var(0)), Node::Negate(Box::new(var(0))));
        assert_eq!(Node::pow(var(0), Node::Literal(1.0)), var(0));
        assert_eq!(
            Node::div(var(0), var(1)),
            Node::Binary(BinOp::Div, Box::new(var(0)), Box::new(var(1)))
        );
    }

    #[test]
    fn depends_on() {
        let tree = Node::Binary(
            BinOp::Mul,
            Box::new(var(0)),
            Box::new(Node::Parameter("a".to_string())),
        );
        assert!(tree.depends_on(0));
        assert!(!tree.depends_on(1));
        assert_eq!(tree.dependencies(), vec!["a".to_string()]);
    }

    #[test]
    fn substitute() {
        let tree = Node::Binary(BinOp::Add, Box::new(var(0)), Box::new(var(1)));
        let values = [2.0, 3.0];
        let scope = Scope::new(&values, None);
        let swapped = tree.substitute(&[var(1), Node::Literal(5.0)], &scope).unwrap();
        assert_eq!(swapped.eval(&scope).unwrap(), 8.0);
        assert!(tree.substitute(&[var(1)], &scope).is_err());
    }

    #[test]
    fn call_chain() {
        let scope = Scope::new(&[], None);
        let f = scope.enter("f").unwrap();
        let in_f = scope.callee(&[], &f);
        let g = in_f.enter("g").unwrap();
        let in_g = in_f.callee(&[], &g);
        let err = in_g.enter("f").unwrap_err();
        assert_eq!(err.chain, vec!["f", "g", "f"]);
        assert!(in_g.enter("h").is_ok());
        // the chain starts at the repeated call, not at the outermost one
        assert_eq!(in_g.enter("g").unwrap_err().chain, vec!["g", "g"]);
        let h = in_g.enter("h").unwrap();
        let in_h = in_g.callee(&[], &h);
        assert_eq!(in_h.enter("g").unwrap_err().chain, vec!["g", "h", "g"]);
    }

    #[test]
    fn variable_table() {
        let mut table = VariableTable::new();
        assert_eq!(table.register("x"), 0);
        assert_eq!(table.register("y"), 1);
        assert_eq!(table.register("x"), 0);
        assert_eq!(table.name(1), Some("y"));
        assert_eq!(table.len(), 2);
    }
}
