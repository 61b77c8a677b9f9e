#![deny(warnings)]

use crate::ast::{BinOp, CmpOp, LogicOp, Node, VariableTable};
use std::collections::HashMap;

#[derive(PartialEq, Debug, Clone, Copy)]
enum Assoc {
    Left,
    Right,
    None,
}

// binding power of the construct at the root of 'node', same table the
// parser descends through
fn precedence(node: &Node) -> (usize, Assoc) {
    match node {
        Node::Conditional(..) => (1, Assoc::Right),
        Node::Logical(LogicOp::Or, _) => (2, Assoc::Left),
        Node::Logical(LogicOp::And, _) => (3, Assoc::Left),
        Node::Comparison(..) => (4, Assoc::None),
        Node::Binary(BinOp::Add, ..) | Node::Binary(BinOp::Sub, ..) => (5, Assoc::Left),
        Node::Binary(BinOp::Mul, ..) | Node::Binary(BinOp::Div, ..) => (6, Assoc::Left),
        Node::Negate(_) | Node::Logical(LogicOp::Not, _) => (7, Assoc::Right),
        Node::Binary(BinOp::Pow, ..) => (8, Assoc::Right),
        _ => (9, Assoc::None),
    }
}

fn binop_str(op: &BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Pow => "**",
    }
}

fn cmpop_str(op: &CmpOp) -> &'static str {
    match op {
        CmpOp::Lt => "<",
        CmpOp::Le => "<=",
        CmpOp::Gt => ">",
        CmpOp::Ge => ">=",
        CmpOp::Eq => "==",
        CmpOp::Ne => "!=",
    }
}

fn literal(value: f64) -> String {
    if value.is_nan() {
        "(0 / 0)".to_string()
    } else if value.is_infinite() {
        // overflows back to an infinite literal when parsed
        if value > 0.0 { "1e999" } else { "(-1e999)" }.to_string()
    } else if value.is_sign_negative() {
        format!("({})", value)
    } else {
        format!("{}", value)
    }
}

struct Printer<'a> {
    variables: &'a VariableTable,
    overrides: &'a HashMap<String, String>,
}

impl<'a> Printer<'a> {
    fn name(&self, name: &str) -> String {
        self.overrides
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    fn args(&self, args: &[Node]) -> String {
        args.iter()
            .map(|arg| self.print(arg).0)
            .collect::<Vec<String>>()
            .join(", ")
    }

    // wrap 'child' in parens when it binds looser than its parent needs
    fn operand(&self, child: &Node, min_prec: usize) -> String {
        let (text, (prec, _)) = self.print(child);
        if prec < min_prec {
            format!("({})", text)
        } else {
            text
        }
    }

    fn print(&self, node: &Node) -> (String, (usize, Assoc)) {
        let (prec, assoc) = precedence(node);
        let text = match node {
            Node::Literal(value) => literal(*value),
            Node::Variable(index) => match self.variables.name(*index) {
                Some(name) => self.name(name),
                None => format!("_{}", index),
            },
            Node::Parameter(name) => self.name(name),
            Node::Negate(child) => format!("-{}", self.operand(child, prec)),
            Node::Logical(LogicOp::Not, args) => match args.first() {
                Some(arg) => format!("!{}", self.operand(arg, prec)),
                None => "!0".to_string(),
            },
            Node::Binary(op, l, r) => {
                let (lhs, rhs) = (self.print(l), self.print(r));
                let lh = if prec > (lhs.1).0 || (prec == (lhs.1).0 && assoc != Assoc::Left) {
                    format!("({})", lhs.0)
                } else {
                    lhs.0
                };
                let rh = if prec > (rhs.1).0 || (prec == (rhs.1).0 && assoc != Assoc::Right) {
                    format!("({})", rhs.0)
                } else {
                    rhs.0
                };
                format!("{} {} {}", lh, binop_str(op), rh)
            }
            Node::Comparison(op, l, r) => format!(
                "{} {} {}",
                self.operand(l, prec + 1),
                cmpop_str(op),
                self.operand(r, prec + 1)
            ),
            Node::Logical(op, args) => {
                let op = if *op == LogicOp::And { " && " } else { " || " };
                args.iter()
                    .map(|arg| self.operand(arg, prec + 1))
                    .collect::<Vec<String>>()
                    .join(op)
            }
            Node::Conditional(c, a, b) => format!(
                "{} ? {} : {}",
                self.operand(c, prec + 1),
                self.print(a).0,
                self.print(b).0
            ),
            Node::Call(func, params, args) => {
                if params.is_empty() {
                    format!("{}({})", func.name(), self.args(args))
                } else {
                    let params = params
                        .iter()
                        .map(|p| p.to_string())
                        .collect::<Vec<String>>()
                        .join(",");
                    format!("{}<{}>({})", func.name(), params, self.args(args))
                }
            }
            Node::External(name, args) => format!("{}({})", name, self.args(args)),
        };
        (text, (prec, assoc))
    }
}

/// Infix text of `node` that parses back to the same tree, variables and
/// parameters found in `overrides` are printed with their replacement name.
pub fn render(node: &Node, variables: &VariableTable, overrides: &HashMap<String, String>) -> String {
    Printer {
        variables,
        overrides,
    }
    .print(node)
    .0
}

///////////////////////////////////////////////////////////////////////////////
