#![deny(warnings)]

use crate::ast::{BinOp, Node, Scope};
use crate::builtins::{Func, StdFn};
use crate::error::{EngineError, EvaluationError, ResolutionError};
use crate::functions::ExternalFunction;

/// Derivative of `node` w.r.t. the variable at `wrt`.
///
/// Rules that depend on the data (`min`, `max`, conditionals, calls to
/// registry formulas) are decided with the values held by `scope`.
pub fn differentiate(node: &Node, wrt: usize, scope: &Scope) -> Result<Node, EngineError> {
    if !node.depends_on(wrt) {
        return Ok(Node::Literal(0.0));
    }
    Ok(match node {
        Node::Literal(_) | Node::Parameter(_) => Node::Literal(0.0),
        Node::Variable(i) => Node::Literal(if *i == wrt { 1.0 } else { 0.0 }),
        Node::Negate(child) => Node::neg(differentiate(child, wrt, scope)?),
        Node::Binary(op, l, r) => {
            let (l, r) = (l.as_ref(), r.as_ref());
            let (dl, dr) = (differentiate(l, wrt, scope)?, differentiate(r, wrt, scope)?);
            match op {
                BinOp::Add => Node::add(dl, dr),
                BinOp::Sub => Node::sub(dl, dr),
                BinOp::Mul => Node::add(Node::mul(dl, r.clone()), Node::mul(l.clone(), dr)),
                BinOp::Div if !r.depends_on(wrt) => Node::div(dl, r.clone()),
                BinOp::Div => Node::div(
                    Node::sub(Node::mul(dl, r.clone()), Node::mul(l.clone(), dr)),
                    Node::pow(r.clone(), Node::Literal(2.0)),
                ),
                BinOp::Pow => power_rule(l, r, dl, dr, wrt),
            }
        }
        // piecewise constant
        Node::Comparison(..) | Node::Logical(..) => Node::Literal(0.0),
        Node::Conditional(cond, then, otherwise) => {
            if cond.eval(scope)? != 0.0 {
                differentiate(then, wrt, scope)?
            } else {
                differentiate(otherwise, wrt, scope)?
            }
        }
        Node::Call(Func::Diff, params, args) => {
            differentiate(&expand_diff(params, args, scope)?, wrt, scope)?
        }
        Node::Call(Func::Std(f), params, args) => {
            let mut total = Node::Literal(0.0);
            for (i, arg) in args.iter().enumerate() {
                if !arg.depends_on(wrt) {
                    continue;
                }
                let partial = f.partial(params, args, i, scope)?;
                total = Node::add(total, Node::mul(partial, differentiate(arg, wrt, scope)?));
            }
            total
        }
        Node::Call(func, _, _) => {
            return Err(EvaluationError::NotDifferentiable(func.name().to_string()).into())
        }
        Node::External(name, args) => external(name, args, wrt, scope)?,
    })
}

fn power_rule(l: &Node, r: &Node, dl: Node, dr: Node, wrt: usize) -> Node {
    let ln = |x: &Node| Node::call(StdFn::Ln, vec![x.clone()]);
    if !r.depends_on(wrt) {
        // r * l^(r-1) * dl
        let exponent = Node::sub(r.clone(), Node::Literal(1.0));
        Node::mul(Node::mul(r.clone(), Node::pow(l.clone(), exponent)), dl)
    } else if !l.depends_on(wrt) {
        // l^r * ln(l) * dr
        Node::mul(Node::mul(Node::pow(l.clone(), r.clone()), ln(l)), dr)
    } else {
        // l^r * (dr * ln(l) + r * dl / l)
        let inner = Node::add(
            Node::mul(dr, ln(l)),
            Node::div(Node::mul(r.clone(), dl), l.clone()),
        );
        Node::mul(Node::pow(l.clone(), r.clone()), inner)
    }
}

// chain rule through a registry function, partial derivatives of formulas
// are taken at the values the arguments currently have
fn external(name: &str, args: &[Node], wrt: usize, scope: &Scope) -> Result<Node, EngineError> {
    let functions = scope
        .functions()
        .ok_or_else(|| ResolutionError::UnknownFunction(name.to_string()))?;
    let function = functions
        .get(name)
        .ok_or_else(|| ResolutionError::UnknownFunction(name.to_string()))?;
    if function.arity() != args.len() {
        return Err(ResolutionError::ArityMismatch {
            name: name.to_string(),
            expected: function.arity(),
            got: args.len(),
        }
        .into());
    }
    let evaluator = match function {
        ExternalFunction::Constant(_) => return Ok(Node::Literal(0.0)),
        ExternalFunction::Formula(evaluator) => evaluator,
        ExternalFunction::Native(_) | ExternalFunction::Legacy(_) => {
            return Err(EvaluationError::NotDifferentiable(name.to_string()).into())
        }
    };
    let values = args
        .iter()
        .map(|arg| arg.eval(scope))
        .collect::<Result<Vec<f64>, EngineError>>()?;
    let frame = scope.enter(name)?;
    let callee = scope.callee(&values, &frame);
    let mut total = Node::Literal(0.0);
    for (i, arg) in args.iter().enumerate() {
        if !arg.depends_on(wrt) {
            continue;
        }
        let partial = differentiate(evaluator.root(), i, &callee)?.substitute(args, scope)?;
        total = Node::add(total, Node::mul(partial, differentiate(arg, wrt, scope)?));
    }
    log::trace!("d{}/d#{} = {:?}", name, wrt, total);
    Ok(total)
}

/// Replace `diff<n>(expr, var)` by the `n`-th derivative of `expr`.
pub(crate) fn expand_diff(params: &[i64], args: &[Node], scope: &Scope) -> Result<Node, EngineError> {
    let order = params.first().copied().unwrap_or(1);
    match args {
        [expr, Node::Variable(var)] if order >= 1 => {
            let mut derivative = expr.clone();
            for _ in 0..order {
                if let Node::Literal(_) = derivative {
                    return Ok(Node::Literal(0.0));
                }
                derivative = differentiate(&derivative, *var, scope)?;
            }
            Ok(derivative)
        }
        _ => Err(EvaluationError::NotDifferentiable("diff".to_string()).into()),
    }
}

///////////////////////////////////////////////////////////////////////////////
