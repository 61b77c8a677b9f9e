use crate::ast::{BinOp, CmpOp, LogicOp, Node, VariableTable};
use crate::builtins::{Func, StdFn};
use crate::error::{EngineError, ParseErrorKind};
use crate::evaluator::compile;
use crate::functions::FunctionRegistry;
use crate::parser::parse;
use crate::render::render;
use std::collections::HashMap;

fn auto(formula: &str) -> (Node, VariableTable) {
    parse(lexers::tokenize(formula).unwrap(), None, None).unwrap()
}

fn declared(variables: &[&str], formula: &str) -> (Node, VariableTable) {
    let variables: Vec<String> = variables.iter().map(|v| v.to_string()).collect();
    parse(lexers::tokenize(formula).unwrap(), Some(&variables), None).unwrap()
}

fn fails(formula: &str) -> ParseErrorKind {
    parse(lexers::tokenize(formula).unwrap(), None, None)
        .unwrap_err()
        .kind
}

fn num(n: f64) -> Node {
    Node::Literal(n)
}

fn var(i: usize) -> Node {
    Node::Variable(i)
}

fn bin(op: BinOp, l: Node, r: Node) -> Node {
    Node::Binary(op, Box::new(l), Box::new(r))
}

#[test]
fn precedence() {
    let (root, _) = auto("3+4*2/-(1-5)^2^3");
    let expected = bin(
        BinOp::Add,
        num(3.0),
        bin(
            BinOp::Div,
            bin(BinOp::Mul, num(4.0), num(2.0)),
            Node::Negate(Box::new(bin(
                BinOp::Pow,
                bin(BinOp::Sub, num(1.0), num(5.0)),
                bin(BinOp::Pow, num(2.0), num(3.0)),
            ))),
        ),
    );
    assert_eq!(root, expected);
}

#[test]
fn unary_minus_and_power() {
    let (root, _) = auto("-2^3");
    assert_eq!(root, Node::Negate(Box::new(bin(BinOp::Pow, num(2.0), num(3.0)))));
    let (root, _) = auto("2^-3");
    assert_eq!(root, bin(BinOp::Pow, num(2.0), Node::Negate(Box::new(num(3.0)))));
    let (root, _) = auto("+x");
    assert_eq!(root, var(0));
    let (root, _) = auto("x - -y");
    assert_eq!(root, bin(BinOp::Sub, var(0), Node::Negate(Box::new(var(1)))));
}

#[test]
fn logic_and_conditionals() {
    let (root, vars) = auto("a && b || !c");
    assert_eq!(vars.names(), &["a", "b", "c"]);
    assert_eq!(
        root,
        Node::Logical(
            LogicOp::Or,
            vec![
                Node::Logical(LogicOp::And, vec![var(0), var(1)]),
                Node::Logical(LogicOp::Not, vec![var(2)]),
            ]
        )
    );
    let (root, _) = auto("a && b && c");
    assert_eq!(root, Node::Logical(LogicOp::And, vec![var(0), var(1), var(2)]));
    let (root, _) = auto("a ? b : c ? d : e");
    assert_eq!(
        root,
        Node::Conditional(
            Box::new(var(0)),
            Box::new(var(1)),
            Box::new(Node::Conditional(
                Box::new(var(2)),
                Box::new(var(3)),
                Box::new(var(4))
            ))
        )
    );
    let (root, _) = auto("x <= 2");
    assert_eq!(root, Node::Comparison(CmpOp::Le, Box::new(var(0)), Box::new(num(2.0))));
}

#[test]
fn variable_discovery() {
    let (root, vars) = auto("y*x + z*y");
    assert_eq!(vars.names(), &["y", "x", "z"]);
    assert_eq!(
        root,
        bin(
            BinOp::Add,
            bin(BinOp::Mul, var(0), var(1)),
            bin(BinOp::Mul, var(2), var(0))
        )
    );
}

#[test]
fn declared_variables_and_parameters() {
    let (root, vars) = declared(&["x", "t"], "a*x + b");
    assert_eq!(vars.names(), &["x", "t"]);
    assert_eq!(
        root,
        bin(
            BinOp::Add,
            bin(BinOp::Mul, Node::Parameter("a".to_string()), var(0)),
            Node::Parameter("b".to_string())
        )
    );
    assert_eq!(root.parameters().len(), 2);
}

#[test]
fn calls() {
    let (root, _) = auto("power<3>(x)");
    assert_eq!(root, Node::Call(Func::Std(StdFn::Power), vec![3], vec![var(0)]));
    let (root, _) = auto("power<-2>(x)");
    assert_eq!(root, Node::Call(Func::Std(StdFn::Power), vec![-2], vec![var(0)]));
    let (root, _) = auto("max(x, 1, 2)");
    assert_eq!(
        root,
        Node::Call(Func::Std(StdFn::Max), vec![], vec![var(0), num(1.0), num(2.0)])
    );
    let (root, _) = auto("H(x) + Heavyside(x)");
    assert_eq!(
        root,
        bin(
            BinOp::Add,
            Node::Call(Func::Std(StdFn::Heaviside), vec![], vec![var(0)]),
            Node::Call(Func::Std(StdFn::Heaviside), vec![], vec![var(0)])
        )
    );
    // '<' after a plain variable is a comparison
    let (root, _) = auto("x<2");
    assert_eq!(root, Node::Comparison(CmpOp::Lt, Box::new(var(0)), Box::new(num(2.0))));
}

#[test]
fn constants() {
    let (root, vars) = auto("Cste::R * T");
    assert_eq!(vars.names(), &["T"]);
    assert_eq!(root, bin(BinOp::Mul, num(8.314_462_618), var(0)));
    let (root, _) = auto("Cste::MolarGasConstant");
    assert_eq!(root, num(8.314_462_618));
}

#[test]
fn diff_calls() {
    let (root, _) = auto("diff(x**2, x)");
    assert_eq!(
        root,
        Node::Call(
            Func::Diff,
            vec![],
            vec![bin(BinOp::Pow, var(0), num(2.0)), var(0)]
        )
    );
    let (root, _) = auto("diff<2>(sin(x), x)");
    assert!(matches!(root, Node::Call(Func::Diff, ref p, _) if p == &[2]));

    let variables = vec!["x".to_string()];
    let err = parse(lexers::tokenize("diff(x, a)").unwrap(), Some(&variables), None).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::NotAVariable("a".to_string()));
    assert_eq!(fails("diff<0>(x, x)"), ParseErrorKind::InvalidOrder(0));
    assert_eq!(fails("diff<65>(x, x)"), ParseErrorKind::InvalidOrder(65));
    assert_eq!(
        fails("diff<100000000000>(x, x)"),
        ParseErrorKind::InvalidOrder(100_000_000_000)
    );
    assert_eq!(
        fails("diff(x, 2)"),
        ParseErrorKind::NotAVariable("diff".to_string())
    );
}

#[test]
fn syntax_errors() {
    assert_eq!(fails("(x"), ParseErrorKind::MissingCParen);
    assert_eq!(fails("sin(x"), ParseErrorKind::MissingCParen);
    assert_eq!(fails("x)"), ParseErrorKind::MissingOParen);
    assert_eq!(fails("x +"), ParseErrorKind::UnexpectedEnd);
    assert_eq!(fails("x ? 1"), ParseErrorKind::UnexpectedEnd);
    assert_eq!(fails(""), ParseErrorKind::UnexpectedEnd);
    assert_eq!(fails("a < b < c"), ParseErrorKind::ChainedComparison);
    assert_eq!(fails("2 3"), ParseErrorKind::UnexpectedToken("3".to_string()));
    assert_eq!(fails("2e*x"), ParseErrorKind::UnexpectedToken("e".to_string()));
    assert_eq!(fails("power<x>(2)"), ParseErrorKind::InvalidParameter("x".to_string()));
    assert_eq!(fails("power<1.5>(2)"), ParseErrorKind::InvalidParameter("1.5".to_string()));
}

#[test]
fn function_errors() {
    assert_eq!(fails("foo(x)"), ParseErrorKind::UnknownFunction("foo".to_string()));
    assert_eq!(
        fails("sin(x, y)"),
        ParseErrorKind::ArityMismatch {
            name: "sin".to_string(),
            params: 0,
            args: 2
        }
    );
    assert_eq!(
        fails("power(x)"),
        ParseErrorKind::ArityMismatch {
            name: "power".to_string(),
            params: 0,
            args: 1
        }
    );
    assert_eq!(
        fails("min(x)"),
        ParseErrorKind::ArityMismatch {
            name: "min".to_string(),
            params: 0,
            args: 1
        }
    );
    assert_eq!(fails("sin + 1"), ParseErrorKind::InvalidVariableName("sin".to_string()));
}

#[test]
fn declared_variable_errors() {
    let tokens = || lexers::tokenize("x").unwrap();
    let twice = vec!["x".to_string(), "x".to_string()];
    let err = parse(tokens(), Some(&twice), None).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::DuplicateVariable("x".to_string()));
    for bad in &["sin", "2x", "a b", "", "x+"] {
        let variables = vec![bad.to_string()];
        let err = parse(tokens(), Some(&variables), None).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidVariableName(bad.to_string()));
    }
}

#[test]
fn error_location() {
    let err = parse(lexers::tokenize("1 + )").unwrap(), None, None).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::MissingOParen);
    assert_eq!(err.near, "')' at position 4");
    assert_eq!(err.to_string(), "missing opening parenthesis near ')' at position 4");
    let err = parse(lexers::tokenize("1 +").unwrap(), None, None).unwrap_err();
    assert_eq!(err.near, "end of formula");
}

#[test]
fn lex_errors_keep_formula() {
    match compile("x & y") {
        Err(EngineError::Lex { formula, .. }) => assert_eq!(formula, "x & y"),
        other => panic!("expected a lex error, got {:?}", other),
    }
    match compile("x $ y") {
        Err(EngineError::Lex { .. }) => (),
        other => panic!("expected a lex error, got {:?}", other),
    }
    match compile("(1 + 2") {
        Err(EngineError::Parse { formula, source }) => {
            assert_eq!(formula, "(1 + 2");
            assert_eq!(source.kind, ParseErrorKind::MissingCParen);
        }
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn registry_references() {
    let mut registry = FunctionRegistry::new();
    registry.register_constant("k", 2.0).unwrap();
    let declared = vec!["x".to_string()];
    let tokens = lexers::tokenize("f(x, 1) * k").unwrap();
    let (root, vars) = parse(tokens, Some(&declared), Some(&registry)).unwrap();
    assert_eq!(vars.names(), &["x"]);
    assert_eq!(
        root,
        bin(
            BinOp::Mul,
            Node::External("f".to_string(), vec![var(0), num(1.0)]),
            Node::Parameter("k".to_string())
        )
    );
    assert_eq!(root.dependencies(), vec!["f".to_string(), "k".to_string()]);
    // discovered variables keep their first-use order whatever the registry holds
    let tokens = lexers::tokenize("k * x").unwrap();
    let (root, vars) = parse(tokens, None, Some(&registry)).unwrap();
    assert_eq!(vars.names(), &["k", "x"]);
    assert_eq!(root, bin(BinOp::Mul, var(0), var(1)));
    // builtins still win over the registry
    let tokens = lexers::tokenize("sin(x)").unwrap();
    let (root, _) = parse(tokens, None, Some(&registry)).unwrap();
    assert_eq!(root, Node::Call(Func::Std(StdFn::Sin), vec![], vec![var(0)]));
}

#[test]
fn render_parses_back() {
    let formulas = [
        "3+4*2/-(1-5)^2^3",
        "-2^2",
        "(-2)^2",
        "2^-3",
        "(a+b)*(c-d)/e",
        "a - (b - c)",
        "a / (b / c)",
        "a - b - c",
        "x**y**z",
        "(x**y)**z",
        "-x**2",
        "a ? b : c",
        "(a ? b : c) ? d : e",
        "a ? (b ? c : d) : e",
        "!(a < b) && c",
        "(a || b) && c",
        "(a < b) == c",
        "-(-x)",
        "min(x, y, 3)*power<2>(x)",
        "diff<2>(sin(x)*x, x)",
        "atan2(y, x) - hypot(x, -y)",
        "Cste::R * T",
        "1e-7 * x + 2.5e10",
        "1e999 * x",
    ];
    for formula in formulas.iter() {
        let (root, vars) = auto(formula);
        let text = render(&root, &vars, &HashMap::new());
        let (again, again_vars) = auto(&text);
        assert_eq!(root, again, "'{}' rendered as '{}'", formula, text);
        assert_eq!(vars.names(), again_vars.names());
    }
}

#[test]
fn render_text() {
    let show = |formula: &str| {
        let (root, vars) = auto(formula);
        render(&root, &vars, &HashMap::new())
    };
    assert_eq!(show("2*x+1"), "2 * x + 1");
    assert_eq!(show("(a+b)*c"), "(a + b) * c");
    assert_eq!(show("a-(b+c)"), "a - (b + c)");
    assert_eq!(show("x^2"), "x ** 2");
    assert_eq!(show("power<3>(x)"), "power<3>(x)");
    assert_eq!(show("a<b ? 1 : 2"), "a < b ? 1 : 2");

    let (root, vars) = declared(&["x"], "a*x");
    let mut overrides = HashMap::new();
    overrides.insert("x".to_string(), "y[0]".to_string());
    overrides.insert("a".to_string(), "A".to_string());
    overrides.insert("unused".to_string(), "U".to_string());
    assert_eq!(render(&root, &vars, &overrides), "A * y[0]");
}
