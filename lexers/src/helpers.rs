#![deny(warnings)]

use crate::scanner::Scanner;

/*
 * The caller of these function is expected to setup the scanner for a
 * clear start, ie: call scanner.ignore() to start fresh
 */

const DIGITS: &str = "0123456789";

// scan numbers like [0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)? or \.[0-9]+(...)?
// A sign is never part of the number, '-' is always an operator.
pub fn scan_number<I: Iterator<Item = char>>(scanner: &mut Scanner<I>) -> Option<String> {
    let backtrack = scanner.pos();
    if scanner.skip_all_chars(DIGITS) {
        // optional fractional part, digits after the dot are optional too
        if scanner.accept_char('.') {
            scanner.skip_all_chars(DIGITS);
        }
    } else if !(scanner.accept_char('.') && scanner.skip_all_chars(DIGITS)) {
        scanner.set_pos(backtrack);
        return None;
    }
    // check for exponent part, a dangling 'e' or 'e-' is left for the caller
    let backtrack = scanner.pos();
    if scanner.accept_any_char("Ee").is_some() {
        scanner.accept_any_char("+-"); // exponent sign is optional
        if !scanner.skip_all_chars(DIGITS) {
            scanner.set_pos(backtrack);
        }
    }
    Some(scanner.extract_string())
}

// accept two-char operators first, then single char ones
pub fn scan_formula_op<I: Iterator<Item = char>>(scanner: &mut Scanner<I>) -> Option<String> {
    if scanner.accept_any_char("<>=!").is_some() {
        // accept '<', '>', '!', '<=', '>=', '==', '!='
        scanner.accept_char('=');
        Some(scanner.extract_string())
    } else if scanner.accept_char('*') {
        // accept '*', '**'
        scanner.accept_char('*');
        Some(scanner.extract_string())
    } else if let Some(c) = scanner.accept_any_char("&|") {
        // accept '&&', '||', a lone '&' or '|' is returned as is
        scanner.accept_char(c);
        Some(scanner.extract_string())
    } else if scanner.accept_any_char("+-/^?:(),").is_some() {
        Some(scanner.extract_string())
    } else {
        None
    }
}

// scan [a-zA-Z_][a-zA-Z0-9_]*(::[a-zA-Z_][a-zA-Z0-9_]*)*
pub fn scan_identifier<I: Iterator<Item = char>>(scanner: &mut Scanner<I>) -> Option<String> {
    let alfa = concat!("abcdefghijklmnopqrstuvwxyz", "ABCDEFGHIJKLMNOPQRSTUVWXYZ_");
    let alnum = concat!(
        "0123456789",
        "abcdefghijklmnopqrstuvwxyz",
        "ABCDEFGHIJKLMNOPQRSTUVWXYZ_"
    );
    scanner.accept_any_char(alfa)?;
    scanner.skip_all_chars(alnum);
    loop {
        let backtrack = scanner.pos();
        if scanner.accept_char(':')
            && scanner.accept_char(':')
            && scanner.accept_any_char(alfa).is_some()
        {
            scanner.skip_all_chars(alnum);
        } else {
            scanner.set_pos(backtrack);
            break;
        }
    }
    Some(scanner.extract_string())
}

///////////////////////////////////////////////////////////////////////////////
