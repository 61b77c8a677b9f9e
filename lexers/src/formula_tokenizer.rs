#![deny(warnings)]

use crate::helpers;
use crate::scanner::Scanner;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Op {
    Plus,
    Minus,
    Times,
    Divide,
    Power,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    And,
    Or,
    Not,
    Question,
    Colon,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Punct {
    OParen,
    CParen,
    Comma,
}

#[derive(Clone, PartialEq, Debug)]
pub enum FormulaToken {
    Number(f64),
    Identifier(String),
    Operator(Op),
    Punct(Punct),
}

/// A token plus the char offset where it starts in the formula.
#[derive(Clone, PartialEq, Debug)]
pub struct Lexeme {
    pub token: FormulaToken,
    pub pos: usize,
}

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum LexError {
    #[error("unterminated operator '{op}' at position {pos}")]
    UnterminatedOperator { op: String, pos: usize },
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },
}

impl Op {
    fn from_lexeme(op: &str) -> Option<Op> {
        Some(match op {
            "+" => Op::Plus,
            "-" => Op::Minus,
            "*" => Op::Times,
            "/" => Op::Divide,
            "**" | "^" => Op::Power,
            "<" => Op::Less,
            "<=" => Op::LessEqual,
            ">" => Op::Greater,
            ">=" => Op::GreaterEqual,
            "==" => Op::Equal,
            "!=" => Op::NotEqual,
            "&&" => Op::And,
            "||" => Op::Or,
            "!" => Op::Not,
            "?" => Op::Question,
            ":" => Op::Colon,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Plus => "+",
            Op::Minus => "-",
            Op::Times => "*",
            Op::Divide => "/",
            Op::Power => "**",
            Op::Less => "<",
            Op::LessEqual => "<=",
            Op::Greater => ">",
            Op::GreaterEqual => ">=",
            Op::Equal => "==",
            Op::NotEqual => "!=",
            Op::And => "&&",
            Op::Or => "||",
            Op::Not => "!",
            Op::Question => "?",
            Op::Colon => ":",
        }
    }
}

impl fmt::Display for FormulaToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FormulaToken::Number(n) => write!(f, "{}", n),
            FormulaToken::Identifier(id) => write!(f, "{}", id),
            FormulaToken::Operator(op) => write!(f, "{}", op.as_str()),
            FormulaToken::Punct(Punct::OParen) => write!(f, "("),
            FormulaToken::Punct(Punct::CParen) => write!(f, ")"),
            FormulaToken::Punct(Punct::Comma) => write!(f, ","),
        }
    }
}

pub struct FormulaTokenizer<I: Iterator<Item = char>> {
    src: Scanner<I>,
    failed: bool,
}

impl<I: Iterator<Item = char>> FormulaTokenizer<I> {
    pub fn new(source: I) -> Self {
        FormulaTokenizer {
            src: Scanner::new(source),
            failed: false,
        }
    }

    fn get_token(&mut self) -> Option<Result<Lexeme, LexError>> {
        self.src.ignore_ws(); // discard whatever came before and spaces
        let pos = self.src.offset();
        let token = if let Some(op) = helpers::scan_formula_op(&mut self.src) {
            match op.as_ref() {
                "(" => FormulaToken::Punct(Punct::OParen),
                ")" => FormulaToken::Punct(Punct::CParen),
                "," => FormulaToken::Punct(Punct::Comma),
                _ => match Op::from_lexeme(&op) {
                    Some(op) => FormulaToken::Operator(op),
                    None => return Some(Err(LexError::UnterminatedOperator { op, pos })),
                },
            }
        } else if let Some(id) = helpers::scan_identifier(&mut self.src) {
            FormulaToken::Identifier(id)
        } else if let Some(num) = helpers::scan_number(&mut self.src) {
            match num.parse::<f64>() {
                Ok(n) => FormulaToken::Number(n),
                Err(_) => {
                    let ch = num.chars().next().unwrap_or('?');
                    return Some(Err(LexError::UnexpectedChar { ch, pos }));
                }
            }
        } else {
            let ch = self.src.next()?;
            return Some(Err(LexError::UnexpectedChar { ch, pos }));
        };
        Some(Ok(Lexeme { token, pos }))
    }
}

impl<I: Iterator<Item = char>> Iterator for FormulaTokenizer<I> {
    type Item = Result<Lexeme, LexError>;
    fn next(&mut self) -> Option<Self::Item> {
        // stop after the first error, the rest of the input is meaningless
        if self.failed {
            return None;
        }
        let token = self.get_token();
        self.failed = matches!(token, Some(Err(_)));
        token
    }
}

/// Split a formula into lexemes, failing on the first malformed one.
pub fn tokenize(text: &str) -> Result<Vec<Lexeme>, LexError> {
    FormulaTokenizer::new(text.chars()).collect()
}

///////////////////////////////////////////////////////////////////////////////
