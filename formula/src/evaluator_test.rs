use crate::builtins::{Arity, BuiltinRegistry};
use crate::error::{EngineError, EvaluationError, ResolutionError};
use crate::evaluator::{compile, compile_with_variables, Evaluator};
use std::collections::HashMap;

fn vars(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn eval(formula: &str) -> f64 {
    compile(formula).unwrap().value().unwrap()
}

#[test]
fn arithmetic() {
    fuzzy_eq!(eval("3+4*2/-(1-5)^2^3"), 2.9998779296875);
    fuzzy_eq!(eval("sin(0.345)^2 + cos(0.345)^2"), 1.0);
    fuzzy_eq!(eval("2^-3"), 0.125);
    fuzzy_eq!(eval("-2^3"), -8.0);
    fuzzy_eq!(eval("-2^-3"), -0.125);
    fuzzy_eq!(eval("-2^2"), -4.0);
    fuzzy_eq!(eval("(-2)^2"), 4.0);
    fuzzy_eq!(eval("2^3^2"), 512.0);
    fuzzy_eq!(eval("10 - 4 - 3"), 3.0);
    fuzzy_eq!(eval("12 / 2 / 3"), 2.0);
    fuzzy_eq!(eval("power<3>(2) + power<-1>(4)"), 8.25);
    fuzzy_eq!(eval(".5e1 + 1."), 6.0);
}

#[test]
fn builtin_functions() {
    fuzzy_eq!(eval("exp(ln(3))"), 3.0);
    fuzzy_eq!(eval("log(100)"), 100f64.ln());
    fuzzy_eq!(eval("log10(1000) + log2(8)"), 6.0);
    fuzzy_eq!(eval("cbrt(-27)"), -3.0);
    fuzzy_eq!(eval("hypot(3, 4)"), 5.0);
    fuzzy_eq!(eval("atan2(1, 1)"), std::f64::consts::FRAC_PI_4);
    fuzzy_eq!(eval("min(3, 1, 2) + max(3, 1, 2)"), 4.0);
    fuzzy_eq!(eval("abs(-2.5)"), 2.5);
    fuzzy_eq!(eval("tgamma(5)"), 24.0);
    fuzzy_eq!(eval("lgamma(5)"), 24f64.ln());
    fuzzy_eq!(eval("erf(0) + erfc(0)"), 1.0);
    fuzzy_eq!(eval("Cste::e / Cste::ElementaryCharge"), 1.0);
}

#[test]
fn heaviside() {
    let mut e = compile_with_variables(&vars(&["x"]), "H(x)").unwrap();
    for &(x, h) in &[(-1.0, 0.0), (0.0, 1.0), (2.0, 1.0)] {
        e.set_variable("x", x).unwrap();
        assert_eq!(e.value().unwrap(), h);
    }
    fuzzy_eq!(eval("Heavyside(-0.5)"), 0.0);
}

#[test]
fn min_times_variable() {
    let mut e = compile("min(x,y)*x").unwrap();
    e.set_variable("x", 1.5).unwrap();
    e.set_variable("y", 2.54).unwrap();
    fuzzy_eq!(e.value().unwrap(), 2.25);
}

#[test]
fn comparisons_and_logic() {
    fuzzy_eq!(eval("1 < 2"), 1.0);
    fuzzy_eq!(eval("2 <= 1"), 0.0);
    fuzzy_eq!(eval("1 == 1 && 2 != 3"), 1.0);
    fuzzy_eq!(eval("0 || 0.5"), 1.0);
    fuzzy_eq!(eval("!0 + !3"), 1.0);
    fuzzy_eq!(eval("1 > 2 ? 10 : 20"), 20.0);
    fuzzy_eq!(eval("2 > 1 ? 10 : 20"), 10.0);
}

#[test]
fn short_circuit() {
    // 'p' has no value anywhere, only the branches taken evaluate it
    let mut e = compile_with_variables(&vars(&["x"]), "x > 0 || p").unwrap();
    e.set_variable("x", 1.0).unwrap();
    assert_eq!(e.value().unwrap(), 1.0);
    e.set_variable("x", -1.0).unwrap();
    assert_eq!(
        e.value(),
        Err(EngineError::from(ResolutionError::UnknownParameter("p".to_string())))
    );

    let mut e = compile_with_variables(&vars(&["x"]), "x > 0 ? x : p").unwrap();
    e.set_variable("x", 3.0).unwrap();
    assert_eq!(e.value().unwrap(), 3.0);
}

#[test]
fn non_finite_results() {
    let mut e = compile("1/x").unwrap();
    assert_eq!(e.value().unwrap(), f64::INFINITY);
    e.set_variable(0, -2.0).unwrap();
    assert_eq!(e.value().unwrap(), -0.5);
    assert!(eval("sqrt(-1)").is_nan());
}

#[test]
fn variables() {
    let mut e = compile_with_variables(&vars(&["x", "y"]), "x - y").unwrap();
    assert_eq!(e.number_of_variables(), 2);
    assert_eq!(e.variable_names(), vars(&["x", "y"]));
    e.set_variable("x", 5.0).unwrap();
    e.set_variable_at(1, 2.0).unwrap();
    assert_eq!(e.variable_value("y").unwrap(), 2.0);
    assert_eq!(e.variable_value(0).unwrap(), 5.0);
    fuzzy_eq!(e.value().unwrap(), 3.0);

    assert_eq!(
        e.set_variable(2, 1.0),
        Err(EngineError::from(ResolutionError::InvalidPosition { pos: 2, len: 2 }))
    );
    assert_eq!(
        e.set_variable("z", 1.0),
        Err(EngineError::from(ResolutionError::UnknownVariable("z".to_string())))
    );
    assert_eq!(
        e.set_variable("y".to_string(), 1.0),
        Ok(())
    );
}

#[test]
fn value_with_keeps_state() {
    let mut e = compile("x * y").unwrap();
    e.set_variable("x", 2.0).unwrap();
    e.set_variable("y", 3.0).unwrap();
    let mut overrides = HashMap::new();
    overrides.insert("y".to_string(), 10.0);
    fuzzy_eq!(e.value_with(&overrides).unwrap(), 20.0);
    fuzzy_eq!(e.value().unwrap(), 6.0);

    overrides.insert("nope".to_string(), 1.0);
    assert_eq!(
        e.value_with(&overrides),
        Err(EngineError::from(ResolutionError::UnknownVariable("nope".to_string())))
    );
}

#[test]
fn parameters() {
    let e = compile_with_variables(&vars(&["x"]), "a*x^2 + b*x + c").unwrap();
    let mut names: Vec<String> = e.parameter_names().into_iter().collect();
    names.sort();
    assert_eq!(names, vars(&["a", "b", "c"]));
    assert!(compile("a*x").unwrap().parameter_names().is_empty());
}

#[test]
fn constant_evaluator() {
    let e = Evaluator::constant(3.5);
    assert_eq!(e.number_of_variables(), 0);
    assert_eq!(e.value().unwrap(), 3.5);
    assert_eq!(e.to_string(), "3.5");
}

#[test]
fn clones_are_independent() {
    let mut a = compile("x + 1").unwrap();
    a.set_variable("x", 1.0).unwrap();
    let mut b = a.clone();
    b.set_variable("x", 10.0).unwrap();
    assert_eq!(a.value().unwrap(), 2.0);
    assert_eq!(b.value().unwrap(), 11.0);
}

#[test]
fn clones_across_threads() {
    let e = compile("x * x").unwrap();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let mut e = e.clone();
            std::thread::spawn(move || {
                e.set_variable("x", i as f64).unwrap();
                e.value().unwrap()
            })
        })
        .collect();
    let results: Vec<f64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results, vec![0.0, 1.0, 4.0, 9.0]);
}

#[test]
fn malformed_number_is_an_error() {
    match compile_with_variables(&vars(&["x"]), "2e*x") {
        Err(EngineError::Parse { formula, .. }) => assert_eq!(formula, "2e*x"),
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn display() {
    assert_eq!(compile("2*x+1").unwrap().to_string(), "2 * x + 1");
    assert_eq!(compile("-(a+b)^2").unwrap().to_string(), "-(a + b) ** 2");
    let e = compile_with_variables(&vars(&["x"]), "a*x").unwrap();
    let mut overrides = HashMap::new();
    overrides.insert("x".to_string(), "y[0]".to_string());
    overrides.insert("a".to_string(), "A".to_string());
    assert_eq!(e.render(&overrides), "A * y[0]");
}

#[test]
fn custom_builtins() {
    let mut builtins = BuiltinRegistry::standard();
    builtins
        .register_function("scale", Arity::Exactly(1), 1, |p, a| a[0] * p[0] as f64)
        .unwrap();
    builtins
        .register_function("sum", Arity::AtLeast(1), 0, |_, a| a.iter().sum())
        .unwrap();
    builtins
        .register_function("table", Arity::Exactly(1), 2, |p, a| (10 * p[0] + p[1]) as f64 + a[0])
        .unwrap();
    builtins.register_constant("two", 2.0).unwrap();
    assert!(builtins.register_constant("sin", 1.0).is_err());

    let mut e = Evaluator::build("scale<3>(x) + sum(x, two, 1)", None, &builtins, None).unwrap();
    e.set_variable("x", 2.0).unwrap();
    fuzzy_eq!(e.value().unwrap(), 11.0);
    assert_eq!(e.to_string(), "scale<3>(x) + sum(x, 2, 1)");
    let mut t = Evaluator::build("table<4,-2>(x)", None, &builtins, None).unwrap();
    t.set_variable("x", 0.5).unwrap();
    fuzzy_eq!(t.value().unwrap(), 38.5);
    assert_eq!(t.to_string(), "table<4,-2>(x)");
    assert_eq!(
        e.differentiate("x").unwrap_err(),
        EngineError::from(EvaluationError::NotDifferentiable("scale".to_string()))
    );
    // the standard table doesn't see them
    assert!(compile("scale<3>(x)").is_err());
}
