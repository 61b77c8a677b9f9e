#![deny(warnings)]

use crate::ast::{Node, Scope};
use crate::error::{EngineError, EvaluationError, RegistryError};
use crate::functions::{LegacyFunction, NativeFunction};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::f64::consts;
use std::fmt;
use std::sync::Arc;

mod libm {
    #[link(name = "m")]
    extern "C" {
        pub fn erf(x: f64) -> f64;
        pub fn erfc(x: f64) -> f64;
        pub fn tgamma(x: f64) -> f64;
        pub fn lgamma(x: f64) -> f64;
    }
}

fn erf(x: f64) -> f64 {
    unsafe { libm::erf(x) }
}

fn erfc(x: f64) -> f64 {
    unsafe { libm::erfc(x) }
}

fn tgamma(x: f64) -> f64 {
    unsafe { libm::tgamma(x) }
}

fn lgamma(x: f64) -> f64 {
    unsafe { libm::lgamma(x) }
}

/// Functions known to the engine, evaluated and differentiated in place.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StdFn {
    Exp,
    Exp2,
    Expm1,
    Cbrt,
    Abs,
    Sqrt,
    Ln,
    Log,
    Log10,
    Log2,
    Log1p,
    Cosh,
    Sinh,
    Tanh,
    Acosh,
    Asinh,
    Atanh,
    Sin,
    Cos,
    Tan,
    Acos,
    Asin,
    Atan,
    Erf,
    Erfc,
    TGamma,
    LGamma,
    Heaviside,
    Hypot,
    Atan2,
    Min,
    Max,
    Power,
}

impl StdFn {
    pub fn name(&self) -> &'static str {
        match self {
            StdFn::Exp => "exp",
            StdFn::Exp2 => "exp2",
            StdFn::Expm1 => "expm1",
            StdFn::Cbrt => "cbrt",
            StdFn::Abs => "abs",
            StdFn::Sqrt => "sqrt",
            StdFn::Ln => "ln",
            StdFn::Log => "log",
            StdFn::Log10 => "log10",
            StdFn::Log2 => "log2",
            StdFn::Log1p => "log1p",
            StdFn::Cosh => "cosh",
            StdFn::Sinh => "sinh",
            StdFn::Tanh => "tanh",
            StdFn::Acosh => "acosh",
            StdFn::Asinh => "asinh",
            StdFn::Atanh => "atanh",
            StdFn::Sin => "sin",
            StdFn::Cos => "cos",
            StdFn::Tan => "tan",
            StdFn::Acos => "acos",
            StdFn::Asin => "asin",
            StdFn::Atan => "atan",
            StdFn::Erf => "erf",
            StdFn::Erfc => "erfc",
            StdFn::TGamma => "tgamma",
            StdFn::LGamma => "lgamma",
            StdFn::Heaviside => "H",
            StdFn::Hypot => "hypot",
            StdFn::Atan2 => "atan2",
            StdFn::Min => "min",
            StdFn::Max => "max",
            StdFn::Power => "power",
        }
    }

    // arguments are checked against the registry entry at parse time
    pub fn eval(&self, params: &[i64], args: &[f64]) -> f64 {
        let x = args.first().copied().unwrap_or(f64::NAN);
        let y = args.get(1).copied().unwrap_or(f64::NAN);
        match self {
            StdFn::Exp => x.exp(),
            StdFn::Exp2 => x.exp2(),
            StdFn::Expm1 => x.exp_m1(),
            StdFn::Cbrt => x.cbrt(),
            StdFn::Abs => x.abs(),
            StdFn::Sqrt => x.sqrt(),
            StdFn::Ln | StdFn::Log => x.ln(),
            StdFn::Log10 => x.log10(),
            StdFn::Log2 => x.log2(),
            StdFn::Log1p => x.ln_1p(),
            StdFn::Cosh => x.cosh(),
            StdFn::Sinh => x.sinh(),
            StdFn::Tanh => x.tanh(),
            StdFn::Acosh => x.acosh(),
            StdFn::Asinh => x.asinh(),
            StdFn::Atanh => x.atanh(),
            StdFn::Sin => x.sin(),
            StdFn::Cos => x.cos(),
            StdFn::Tan => x.tan(),
            StdFn::Acos => x.acos(),
            StdFn::Asin => x.asin(),
            StdFn::Atan => x.atan(),
            StdFn::Erf => erf(x),
            StdFn::Erfc => erfc(x),
            StdFn::TGamma => tgamma(x),
            StdFn::LGamma => lgamma(x),
            StdFn::Heaviside => {
                if x < 0.0 {
                    0.0
                } else {
                    1.0
                }
            }
            StdFn::Hypot => x.hypot(y),
            StdFn::Atan2 => x.atan2(y),
            StdFn::Min => args.iter().skip(1).fold(x, |a, &item| a.min(item)),
            StdFn::Max => args.iter().skip(1).fold(x, |a, &item| a.max(item)),
            StdFn::Power => x.powf(params.first().copied().unwrap_or(1) as f64),
        }
    }

    /// Partial derivative of the function w.r.t. its `i`-th argument,
    /// expressed in terms of the argument nodes.
    pub fn partial(
        &self,
        params: &[i64],
        args: &[Node],
        i: usize,
        scope: &Scope,
    ) -> Result<Node, EngineError> {
        let u = || args[0].clone();
        let v = || args[1].clone();
        let call = |f: StdFn, x: Node| Node::call(f, vec![x]);
        let square = |x: Node| Node::pow(x, Node::Literal(2.0));
        Ok(match self {
            StdFn::Exp | StdFn::Expm1 => call(StdFn::Exp, u()),
            StdFn::Exp2 => Node::mul(Node::Literal(consts::LN_2), call(StdFn::Exp2, u())),
            StdFn::Cbrt => Node::div(
                Node::Literal(1.0),
                Node::mul(Node::Literal(3.0), square(call(StdFn::Cbrt, u()))),
            ),
            StdFn::Abs => Node::Conditional(
                Box::new(Node::Comparison(
                    crate::ast::CmpOp::Ge,
                    Box::new(u()),
                    Box::new(Node::Literal(0.0)),
                )),
                Box::new(Node::Literal(1.0)),
                Box::new(Node::Literal(-1.0)),
            ),
            StdFn::Sqrt => Node::div(
                Node::Literal(1.0),
                Node::mul(Node::Literal(2.0), call(StdFn::Sqrt, u())),
            ),
            StdFn::Ln | StdFn::Log => Node::div(Node::Literal(1.0), u()),
            StdFn::Log10 => Node::div(Node::Literal(1.0), Node::mul(u(), Node::Literal(consts::LN_10))),
            StdFn::Log2 => Node::div(Node::Literal(1.0), Node::mul(u(), Node::Literal(consts::LN_2))),
            StdFn::Log1p => Node::div(Node::Literal(1.0), Node::add(Node::Literal(1.0), u())),
            StdFn::Cosh => call(StdFn::Sinh, u()),
            StdFn::Sinh => call(StdFn::Cosh, u()),
            StdFn::Tanh => Node::sub(Node::Literal(1.0), square(call(StdFn::Tanh, u()))),
            StdFn::Acosh => Node::div(
                Node::Literal(1.0),
                call(StdFn::Sqrt, Node::sub(square(u()), Node::Literal(1.0))),
            ),
            StdFn::Asinh => Node::div(
                Node::Literal(1.0),
                call(StdFn::Sqrt, Node::add(square(u()), Node::Literal(1.0))),
            ),
            StdFn::Atanh => Node::div(Node::Literal(1.0), Node::sub(Node::Literal(1.0), square(u()))),
            StdFn::Sin => call(StdFn::Cos, u()),
            StdFn::Cos => Node::neg(call(StdFn::Sin, u())),
            StdFn::Tan => Node::add(Node::Literal(1.0), square(call(StdFn::Tan, u()))),
            StdFn::Acos => Node::neg(Node::div(
                Node::Literal(1.0),
                call(StdFn::Sqrt, Node::sub(Node::Literal(1.0), square(u()))),
            )),
            StdFn::Asin => Node::div(
                Node::Literal(1.0),
                call(StdFn::Sqrt, Node::sub(Node::Literal(1.0), square(u()))),
            ),
            StdFn::Atan => Node::div(Node::Literal(1.0), Node::add(Node::Literal(1.0), square(u()))),
            StdFn::Erf | StdFn::Erfc => {
                let gauss = Node::mul(
                    Node::Literal(2.0 / consts::PI.sqrt()),
                    call(StdFn::Exp, Node::neg(square(u()))),
                );
                if *self == StdFn::Erf {
                    gauss
                } else {
                    Node::neg(gauss)
                }
            }
            StdFn::TGamma | StdFn::LGamma => {
                return Err(EvaluationError::NotDifferentiable(self.name().to_string()).into())
            }
            StdFn::Heaviside => Node::Literal(0.0),
            StdFn::Hypot => Node::div(
                if i == 0 { u() } else { v() },
                Node::call(StdFn::Hypot, vec![u(), v()]),
            ),
            StdFn::Atan2 => {
                let norm = Node::add(square(u()), square(v()));
                if i == 0 {
                    Node::div(v(), norm)
                } else {
                    Node::neg(Node::div(u(), norm))
                }
            }
            StdFn::Min | StdFn::Max => {
                // follow whichever argument is selected at the current values
                let mut chosen = 0;
                let mut best = args[0].eval(scope)?;
                for (k, arg) in args.iter().enumerate().skip(1) {
                    let value = arg.eval(scope)?;
                    let better = match self {
                        StdFn::Min => value < best,
                        _ => value > best,
                    };
                    if better {
                        chosen = k;
                        best = value;
                    }
                }
                Node::Literal(if chosen == i { 1.0 } else { 0.0 })
            }
            StdFn::Power => {
                let n = params.first().copied().unwrap_or(1);
                match n {
                    0 => Node::Literal(0.0),
                    1 => Node::Literal(1.0),
                    _ => Node::mul(
                        Node::Literal(n as f64),
                        Node::Call(Func::Std(StdFn::Power), vec![n - 1], vec![u()]),
                    ),
                }
            }
        })
    }
}

/// A user supplied function taking integer parameters and real arguments.
pub struct CustomFunction {
    name: String,
    eval: Box<dyn Fn(&[i64], &[f64]) -> f64 + Send + Sync>,
}

impl CustomFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn eval(&self, params: &[i64], args: &[f64]) -> f64 {
        (self.eval)(params, args)
    }
}

/// What a `Call` node applies to its arguments.
#[derive(Clone)]
pub enum Func {
    Std(StdFn),
    /// `diff<n>(expr, var)`, expanded symbolically when evaluated.
    Diff,
    Custom(Arc<CustomFunction>),
    /// Native callables from a function registry, produced by inlining.
    Native(String, NativeFunction),
    Legacy(String, LegacyFunction),
}

impl Func {
    pub fn name(&self) -> &str {
        match self {
            Func::Std(f) => f.name(),
            Func::Diff => "diff",
            Func::Custom(f) => f.name(),
            Func::Native(name, _) | Func::Legacy(name, _) => name,
        }
    }

    pub fn eval(&self, params: &[i64], args: &[f64]) -> Result<f64, EngineError> {
        match self {
            Func::Std(f) => Ok(f.eval(params, args)),
            Func::Custom(f) => Ok(f.eval(params, args)),
            Func::Native(_, f) => Ok(f.call(args)),
            Func::Legacy(name, f) => Ok(f.call(name, args)?),
            Func::Diff => Err(EvaluationError::Unexpanded("diff".to_string()).into()),
        }
    }
}

impl PartialEq for Func {
    fn eq(&self, other: &Func) -> bool {
        match (self, other) {
            (Func::Std(a), Func::Std(b)) => a == b,
            (Func::Diff, Func::Diff) => true,
            (Func::Custom(a), Func::Custom(b)) => Arc::ptr_eq(a, b) || a.name == b.name,
            (Func::Native(a, _), Func::Native(b, _)) => a == b,
            (Func::Legacy(a, _), Func::Legacy(b, _)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Func::Std(s) => write!(f, "Std({:?})", s),
            Func::Diff => write!(f, "Diff"),
            Func::Custom(c) => write!(f, "Custom({})", c.name),
            Func::Native(name, _) => write!(f, "Native({})", name),
            Func::Legacy(name, _) => write!(f, "Legacy({})", name),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match *self {
            Arity::Exactly(m) => n == m,
            Arity::AtLeast(m) => n >= m,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Builtin {
    pub func: Func,
    pub arity: Arity,
    pub params: usize,
}

/// Table of the functions and constants the parser recognizes by name.
pub struct BuiltinRegistry {
    functions: HashMap<String, Vec<Builtin>>,
    constants: HashMap<String, f64>,
}

static GLOBAL: Lazy<BuiltinRegistry> = Lazy::new(BuiltinRegistry::standard);

const STANDARD: &[(&str, StdFn, Arity, usize)] = &[
    ("exp", StdFn::Exp, Arity::Exactly(1), 0),
    ("exp2", StdFn::Exp2, Arity::Exactly(1), 0),
    ("expm1", StdFn::Expm1, Arity::Exactly(1), 0),
    ("cbrt", StdFn::Cbrt, Arity::Exactly(1), 0),
    ("abs", StdFn::Abs, Arity::Exactly(1), 0),
    ("sqrt", StdFn::Sqrt, Arity::Exactly(1), 0),
    ("ln", StdFn::Ln, Arity::Exactly(1), 0),
    ("log", StdFn::Log, Arity::Exactly(1), 0),
    ("log10", StdFn::Log10, Arity::Exactly(1), 0),
    ("log2", StdFn::Log2, Arity::Exactly(1), 0),
    ("log1p", StdFn::Log1p, Arity::Exactly(1), 0),
    ("cosh", StdFn::Cosh, Arity::Exactly(1), 0),
    ("sinh", StdFn::Sinh, Arity::Exactly(1), 0),
    ("tanh", StdFn::Tanh, Arity::Exactly(1), 0),
    ("acosh", StdFn::Acosh, Arity::Exactly(1), 0),
    ("asinh", StdFn::Asinh, Arity::Exactly(1), 0),
    ("atanh", StdFn::Atanh, Arity::Exactly(1), 0),
    ("sin", StdFn::Sin, Arity::Exactly(1), 0),
    ("cos", StdFn::Cos, Arity::Exactly(1), 0),
    ("tan", StdFn::Tan, Arity::Exactly(1), 0),
    ("acos", StdFn::Acos, Arity::Exactly(1), 0),
    ("asin", StdFn::Asin, Arity::Exactly(1), 0),
    ("atan", StdFn::Atan, Arity::Exactly(1), 0),
    ("erf", StdFn::Erf, Arity::Exactly(1), 0),
    ("erfc", StdFn::Erfc, Arity::Exactly(1), 0),
    ("tgamma", StdFn::TGamma, Arity::Exactly(1), 0),
    ("lgamma", StdFn::LGamma, Arity::Exactly(1), 0),
    ("H", StdFn::Heaviside, Arity::Exactly(1), 0),
    ("Heavyside", StdFn::Heaviside, Arity::Exactly(1), 0),
    ("hypot", StdFn::Hypot, Arity::Exactly(2), 0),
    ("atan2", StdFn::Atan2, Arity::Exactly(2), 0),
    ("min", StdFn::Min, Arity::AtLeast(2), 0),
    ("max", StdFn::Max, Arity::AtLeast(2), 0),
    ("power", StdFn::Power, Arity::Exactly(1), 1),
];

// CODATA 2018
const PHYSICAL_CONSTANTS: &[(&str, &str, f64)] = &[
    ("AtomicMassConstant", "mu", 1.660_539_066_60e-27),
    ("AvogadroConstant", "Na", 6.022_140_76e23),
    ("BoltzmannConstant", "kb", 1.380_649e-23),
    ("ConductanceQuantum", "G0", 7.748_091_729e-5),
    ("ElectricConstant", "e0", 8.854_187_812_8e-12),
    ("ElectronMass", "me", 9.109_383_701_5e-31),
    ("ElectronVolt", "eV", 1.602_176_634e-19),
    ("ElementaryCharge", "e", 1.602_176_634e-19),
    ("FaradayConstant", "F", 96_485.332_12),
    ("FineStructureConstant", "a", 7.297_352_569_3e-3),
    ("MolarGasConstant", "R", 8.314_462_618),
    ("StefanBoltzmannConstant", "s", 5.670_374_419e-8),
];

impl BuiltinRegistry {
    pub fn empty() -> Self {
        BuiltinRegistry {
            functions: HashMap::new(),
            constants: HashMap::new(),
        }
    }

    /// The standard math library plus `diff` and the `Cste::` constants.
    pub fn standard() -> Self {
        let mut registry = BuiltinRegistry::empty();
        let entries = STANDARD
            .iter()
            .map(|&(name, f, arity, params)| (name, Func::Std(f), arity, params))
            .chain(std::iter::once(("diff", Func::Diff, Arity::Exactly(2), 0)))
            .chain(std::iter::once(("diff", Func::Diff, Arity::Exactly(2), 1)));
        for (name, func, arity, params) in entries {
            let registered = registry.register(name, func, arity, params);
            debug_assert!(registered.is_ok(), "duplicate builtin '{}'", name);
        }
        for &(long, short, value) in PHYSICAL_CONSTANTS {
            for name in [long, short].iter() {
                let registered = registry.register_constant(&format!("Cste::{}", name), value);
                debug_assert!(registered.is_ok(), "duplicate constant 'Cste::{}'", name);
            }
        }
        log::debug!(
            "standard builtins: {} functions, {} constants",
            registry.functions.len(),
            registry.constants.len()
        );
        registry
    }

    /// Process wide standard registry used by the plain `compile*` functions.
    pub fn global() -> &'static BuiltinRegistry {
        &GLOBAL
    }

    pub fn register(
        &mut self,
        name: &str,
        func: Func,
        arity: Arity,
        params: usize,
    ) -> Result<(), RegistryError> {
        if self.constants.contains_key(name) {
            return Err(RegistryError::AlreadyDeclared(name.to_string()));
        }
        let overloads = self.functions.entry(name.to_string()).or_default();
        if overloads
            .iter()
            .any(|b| b.arity == arity && b.params == params)
        {
            return Err(RegistryError::AlreadyDeclared(name.to_string()));
        }
        overloads.push(Builtin {
            func,
            arity,
            params,
        });
        Ok(())
    }

    /// Register a function that can be called but not differentiated.
    pub fn register_function<F>(
        &mut self,
        name: &str,
        arity: Arity,
        params: usize,
        eval: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&[i64], &[f64]) -> f64 + Send + Sync + 'static,
    {
        let custom = CustomFunction {
            name: name.to_string(),
            eval: Box::new(eval),
        };
        log::debug!("registering builtin {}<{}>/{:?}", name, params, arity);
        self.register(name, Func::Custom(Arc::new(custom)), arity, params)
    }

    pub fn register_constant(&mut self, name: &str, value: f64) -> Result<(), RegistryError> {
        if self.functions.contains_key(name) || self.constants.contains_key(name) {
            return Err(RegistryError::AlreadyDeclared(name.to_string()));
        }
        self.constants.insert(name.to_string(), value);
        Ok(())
    }

    pub fn lookup(&self, name: &str, params: usize, args: usize) -> Option<&Func> {
        self.functions
            .get(name)?
            .iter()
            .find(|b| b.params == params && b.arity.accepts(args))
            .map(|b| &b.func)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name) || self.constants.contains_key(name)
    }

    pub fn is_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// If `name<...>` should be read as an integer parameter block.
    pub fn takes_parameters(&self, name: &str) -> bool {
        self.functions
            .get(name)
            .map(|overloads| overloads.iter().any(|b| b.params > 0))
            .unwrap_or(false)
    }

    pub fn constant(&self, name: &str) -> Option<f64> {
        self.constants.get(name).copied()
    }
}

///////////////////////////////////////////////////////////////////////////////
