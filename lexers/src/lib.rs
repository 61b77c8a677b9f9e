mod formula_tokenizer;
mod helpers;
mod scanner;

pub use formula_tokenizer::{tokenize, FormulaToken, FormulaTokenizer, LexError, Lexeme, Op, Punct};
pub use scanner::Scanner;

pub use helpers::scan_formula_op;
pub use helpers::scan_identifier;
pub use helpers::scan_number;
