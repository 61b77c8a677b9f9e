#![deny(warnings)]

use crate::ast::{BinOp, CmpOp, LogicOp, Node, VariableTable};
use crate::builtins::{BuiltinRegistry, Func};
use crate::error::{ParseError, ParseErrorKind};
use crate::functions::FunctionRegistry;
use lexers::{FormulaToken, Lexeme, Op, Punct, Scanner};

/* Grammar:
 *
 *  conditional    := logical_or [ "?" conditional ":" conditional ] ;
 *  logical_or     := logical_and { "||" logical_and } ;
 *  logical_and    := comparison { "&&" comparison } ;
 *  comparison     := additive [ ( "<" | "<=" | ">" | ">=" | "==" | "!=" ) additive ] ;
 *  additive       := multiplicative { ( "+" | "-" ) multiplicative } ;
 *  multiplicative := unary { ( "*" | "/" ) unary } ;
 *  unary          := ( "-" | "+" | "!" ) unary | power ;
 *  power          := primary [ "**" unary ] ;
 *  primary        := NUMBER | "(" conditional ")"
 *                  | IDENTIFIER [ "<" INT { "," INT } ">" ] "(" [ args ] ")"
 *                  | IDENTIFIER ;
 *  args           := conditional { "," conditional } ;
 *
 */

pub struct FormulaParser<'a> {
    scanner: Scanner<std::vec::IntoIter<Lexeme>>,
    builtins: &'a BuiltinRegistry,
    functions: Option<&'a FunctionRegistry>,
    variables: VariableTable,
    // variables were given up-front, unknown identifiers are parameters
    declared: bool,
}

pub type NodeResult = Result<Node, ParseError>;

/// Highest order accepted for `diff<n>`.
pub const MAX_DIFF_ORDER: i64 = 64;

fn token_is(lexeme: &Lexeme, expected: &FormulaToken) -> bool {
    &lexeme.token == expected
}

impl<'a> FormulaParser<'a> {
    pub fn new(
        tokens: Vec<Lexeme>,
        builtins: &'a BuiltinRegistry,
        known_variables: Option<&[String]>,
        functions: Option<&'a FunctionRegistry>,
    ) -> Result<Self, ParseError> {
        let mut variables = VariableTable::new();
        if let Some(names) = known_variables {
            for name in names {
                if !is_valid_variable(name, builtins) {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidVariableName(name.clone()),
                        name.as_str(),
                    ));
                }
                if variables.position(name).is_some() {
                    return Err(ParseError::new(
                        ParseErrorKind::DuplicateVariable(name.clone()),
                        name.as_str(),
                    ));
                }
                variables.push(name);
            }
        }
        Ok(FormulaParser {
            scanner: Scanner::new(tokens.into_iter()),
            builtins,
            functions,
            variables,
            declared: known_variables.is_some(),
        })
    }

    fn accept(&mut self, expected: &[FormulaToken]) -> Option<FormulaToken> {
        let backtrack = self.scanner.pos();
        if let Some(lexeme) = self.scanner.next() {
            if expected.iter().any(|e| token_is(&lexeme, e)) {
                self.scanner.ignore();
                return Some(lexeme.token);
            }
        }
        self.scanner.set_pos(backtrack);
        None
    }

    fn accept_op(&mut self, ops: &[Op]) -> Option<Op> {
        let expected: Vec<FormulaToken> = ops.iter().map(|op| FormulaToken::Operator(*op)).collect();
        match self.accept(&expected) {
            Some(FormulaToken::Operator(op)) => Some(op),
            _ => None,
        }
    }

    fn accept_punct(&mut self, punct: Punct) -> bool {
        self.accept(&[FormulaToken::Punct(punct)]).is_some()
    }

    fn consume_punct(&mut self, punct: Punct, missing: ParseErrorKind) -> Result<(), ParseError> {
        if self.accept_punct(punct) {
            return Ok(());
        }
        Err(self.error(missing))
    }

    fn next_token(&mut self) -> Option<FormulaToken> {
        let token = self.scanner.next().map(|l| l.token);
        self.scanner.ignore();
        token
    }

    fn near(&mut self) -> String {
        match self.scanner.peek() {
            Some(lexeme) => format!("'{}' at position {}", lexeme.token, lexeme.pos),
            None => "end of formula".to_string(),
        }
    }

    fn error(&mut self, kind: ParseErrorKind) -> ParseError {
        let near = self.near();
        ParseError::new(kind, near)
    }

    // error for a token that can't start/continue an expression
    fn unexpected(&mut self) -> ParseError {
        match self.scanner.peek().map(|l| l.token) {
            None => self.error(ParseErrorKind::UnexpectedEnd),
            Some(FormulaToken::Punct(Punct::CParen)) => self.error(ParseErrorKind::MissingOParen),
            Some(token) => self.error(ParseErrorKind::UnexpectedToken(token.to_string())),
        }
    }

    pub fn parse(mut self) -> Result<(Node, VariableTable), ParseError> {
        let root = self.conditional()?;
        if self.scanner.peek().is_some() {
            return Err(self.unexpected());
        }
        Ok((root, self.variables))
    }
}

impl<'a> FormulaParser<'a> {
    fn conditional(&mut self) -> NodeResult {
        let cond = self.logical_or()?;
        if self.accept_op(&[Op::Question]).is_none() {
            return Ok(cond);
        }
        let then = self.conditional()?;
        if self.accept_op(&[Op::Colon]).is_none() {
            return Err(self.unexpected());
        }
        let otherwise = self.conditional()?;
        Ok(Node::Conditional(
            Box::new(cond),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn logical_or(&mut self) -> NodeResult {
        let mut operands = vec![self.logical_and()?];
        while self.accept_op(&[Op::Or]).is_some() {
            operands.push(self.logical_and()?);
        }
        Ok(match operands.len() {
            1 => operands.remove(0),
            _ => Node::Logical(LogicOp::Or, operands),
        })
    }

    fn logical_and(&mut self) -> NodeResult {
        let mut operands = vec![self.comparison()?];
        while self.accept_op(&[Op::And]).is_some() {
            operands.push(self.comparison()?);
        }
        Ok(match operands.len() {
            1 => operands.remove(0),
            _ => Node::Logical(LogicOp::And, operands),
        })
    }

    fn comparison(&mut self) -> NodeResult {
        const COMPARISONS: &[Op] = &[
            Op::Less,
            Op::LessEqual,
            Op::Greater,
            Op::GreaterEqual,
            Op::Equal,
            Op::NotEqual,
        ];
        let lhs = self.additive()?;
        let op = match self.accept_op(COMPARISONS) {
            Some(op) => op,
            None => return Ok(lhs),
        };
        let rhs = self.additive()?;
        if self.scanner.peek().map_or(false, |l| {
            COMPARISONS.iter().any(|c| token_is(&l, &FormulaToken::Operator(*c)))
        }) {
            return Err(self.error(ParseErrorKind::ChainedComparison));
        }
        let op = match op {
            Op::Less => CmpOp::Lt,
            Op::LessEqual => CmpOp::Le,
            Op::Greater => CmpOp::Gt,
            Op::GreaterEqual => CmpOp::Ge,
            Op::Equal => CmpOp::Eq,
            _ => CmpOp::Ne,
        };
        Ok(Node::Comparison(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> NodeResult {
        let mut expr = self.multiplicative()?;
        while let Some(op) = self.accept_op(&[Op::Plus, Op::Minus]) {
            let rhs = self.multiplicative()?;
            let op = if op == Op::Plus { BinOp::Add } else { BinOp::Sub };
            expr = Node::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn multiplicative(&mut self) -> NodeResult {
        let mut expr = self.unary()?;
        while let Some(op) = self.accept_op(&[Op::Times, Op::Divide]) {
            let rhs = self.unary()?;
            let op = if op == Op::Times { BinOp::Mul } else { BinOp::Div };
            expr = Node::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn unary(&mut self) -> NodeResult {
        match self.accept_op(&[Op::Minus, Op::Plus, Op::Not]) {
            Some(Op::Minus) => Ok(Node::Negate(Box::new(self.unary()?))),
            Some(Op::Not) => Ok(Node::Logical(LogicOp::Not, vec![self.unary()?])),
            Some(_) => self.unary(),
            None => self.power(),
        }
    }

    fn power(&mut self) -> NodeResult {
        let base = self.primary()?;
        if self.accept_op(&[Op::Power]).is_some() {
            let exponent = self.unary()?;
            return Ok(Node::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> NodeResult {
        match self.scanner.peek().map(|l| l.token) {
            Some(FormulaToken::Number(n)) => {
                self.next_token();
                Ok(Node::Literal(n))
            }
            Some(FormulaToken::Punct(Punct::OParen)) => {
                self.next_token();
                let expr = self.conditional()?;
                self.consume_punct(Punct::CParen, ParseErrorKind::MissingCParen)?;
                Ok(expr)
            }
            Some(FormulaToken::Identifier(id)) => {
                self.next_token();
                self.identifier(id)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn identifier(&mut self, id: String) -> NodeResult {
        if let Some(index) = self.variables.position(&id) {
            if self.declared {
                log::trace!("'{}' is declared variable #{}", id, index);
                return Ok(Node::Variable(index));
            }
        }
        let opens_params = self.builtins.takes_parameters(&id)
            && self.scanner.peek().map_or(false, |l| {
                token_is(&l, &FormulaToken::Operator(Op::Less))
            });
        let opens_args = self.scanner.peek().map_or(false, |l| {
            token_is(&l, &FormulaToken::Punct(Punct::OParen))
        });
        if opens_params || opens_args {
            return self.call(id);
        }
        if let Some(value) = self.builtins.constant(&id) {
            log::trace!("'{}' is a constant", id);
            return Ok(Node::Literal(value));
        }
        if self.builtins.is_function(&id) {
            return Err(self.error(ParseErrorKind::InvalidVariableName(id)));
        }
        if self.declared {
            log::trace!("'{}' is a parameter", id);
            return Ok(Node::Parameter(id));
        }
        let index = self.variables.register(&id);
        log::trace!("'{}' is variable #{}", id, index);
        Ok(Node::Variable(index))
    }

    fn params(&mut self) -> Result<Vec<i64>, ParseError> {
        let mut params = Vec::new();
        if self.accept_op(&[Op::Less]).is_none() {
            return Ok(params);
        }
        loop {
            let negative = self.accept_op(&[Op::Minus]).is_some();
            match self.scanner.peek().map(|l| l.token) {
                Some(FormulaToken::Number(n)) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                    self.next_token();
                    params.push(if negative { -(n as i64) } else { n as i64 });
                }
                Some(token) => {
                    return Err(self.error(ParseErrorKind::InvalidParameter(token.to_string())))
                }
                None => return Err(self.error(ParseErrorKind::UnexpectedEnd)),
            }
            if self.accept_op(&[Op::Greater]).is_some() {
                return Ok(params);
            }
            if !self.accept_punct(Punct::Comma) {
                return Err(self.unexpected());
            }
        }
    }

    fn args(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut args = Vec::new();
        self.consume_punct(Punct::OParen, ParseErrorKind::MissingOParen)?;
        if self.accept_punct(Punct::CParen) {
            return Ok(args);
        }
        loop {
            args.push(self.conditional()?);
            if self.accept_punct(Punct::CParen) {
                return Ok(args);
            }
            if !self.accept_punct(Punct::Comma) {
                return Err(match self.scanner.peek() {
                    None => self.error(ParseErrorKind::MissingCParen),
                    Some(_) => self.unexpected(),
                });
            }
        }
    }

    fn call(&mut self, name: String) -> NodeResult {
        let params = self.params()?;
        let args = self.args()?;
        if let Some(func) = self.builtins.lookup(&name, params.len(), args.len()) {
            log::trace!("'{}' is builtin {:?}", name, func);
            let func = func.clone();
            if func == Func::Diff {
                return self.diff(params, args);
            }
            return Ok(Node::Call(func, params, args));
        }
        if self.builtins.is_function(&name) {
            return Err(self.error(ParseErrorKind::ArityMismatch {
                name,
                params: params.len(),
                args: args.len(),
            }));
        }
        if self.functions.is_some() && params.is_empty() {
            // arity is checked once the registry is complete
            log::trace!("'{}' is a registry function", name);
            return Ok(Node::External(name, args));
        }
        Err(self.error(ParseErrorKind::UnknownFunction(name)))
    }

    fn diff(&mut self, params: Vec<i64>, args: Vec<Node>) -> NodeResult {
        if let Some(&order) = params.first() {
            if !(1..=MAX_DIFF_ORDER).contains(&order) {
                return Err(self.error(ParseErrorKind::InvalidOrder(order)));
            }
        }
        match args.get(1) {
            Some(Node::Variable(_)) => Ok(Node::Call(Func::Diff, params, args)),
            Some(Node::Parameter(name)) => Err(self.error(ParseErrorKind::NotAVariable(name.clone()))),
            _ => Err(self.error(ParseErrorKind::NotAVariable("diff".to_string()))),
        }
    }
}

fn is_valid_variable(name: &str, builtins: &BuiltinRegistry) -> bool {
    let lexemes = match lexers::tokenize(name) {
        Ok(lexemes) => lexemes,
        Err(_) => return false,
    };
    matches!(lexemes.as_slice(), [Lexeme { token: FormulaToken::Identifier(_), .. }])
        && !builtins.contains(name)
}

/// Parse `tokens` into a tree using the standard builtins.
pub fn parse(
    tokens: Vec<Lexeme>,
    known_variables: Option<&[String]>,
    functions: Option<&FunctionRegistry>,
) -> Result<(Node, VariableTable), ParseError> {
    parse_with(BuiltinRegistry::global(), tokens, known_variables, functions)
}

pub fn parse_with(
    builtins: &BuiltinRegistry,
    tokens: Vec<Lexeme>,
    known_variables: Option<&[String]>,
    functions: Option<&FunctionRegistry>,
) -> Result<(Node, VariableTable), ParseError> {
    FormulaParser::new(tokens, builtins, known_variables, functions)?.parse()
}
