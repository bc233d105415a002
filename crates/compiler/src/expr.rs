//! Infix to postfix conversion.
//!
//! Expressions are tokenized on whitespace and on boundaries between
//! name characters and operator characters, then reordered with the
//! shunting-yard algorithm. The result is evaluable with a single operand
//! stack.

use crate::error::ExprError;
use patchlang_common::{Operator, Token, Value};

/// Operator spellings made of symbol characters, longest first.
const SYMBOLS: [&str; 19] = [
    "//", "<=", ">=", "==", "!=", "<<", ">>", "<", ">", "+", "-", "*", "/", "%", "&", "|", "~",
    "^", "`",
];

/// Compile an infix expression into postfix tokens.
///
/// # Errors
///
/// Returns [`ExprError`] for empty input, unbalanced parentheses,
/// unterminated strings or arrays, unknown operator symbols, and
/// expressions whose operators and operands do not reduce to one value.
pub fn to_postfix(text: &str) -> Result<Vec<Token>, ExprError> {
    let words = split_expression(text)?;
    if words.is_empty() {
        return Err(ExprError::Empty);
    }

    let mut output: Vec<Token> = Vec::new();
    let mut stack: Vec<Pending> = Vec::new();
    let mut prev = Prev::Start;
    let mut i = 0;

    while i < words.len() {
        let word = words[i].as_str();
        match word {
            "(" => {
                stack.push(Pending::Open);
                prev = Prev::Open;
            }
            ")" => {
                loop {
                    match stack.pop() {
                        Some(Pending::Op(op)) => output.push(emit(op)),
                        Some(Pending::Open) => break,
                        None => return Err(ExprError::UnbalancedParen),
                    }
                }
                prev = Prev::Operand;
            }
            _ => match Operator::from_symbol(word) {
                Some(Operator::Sub) if prev != Prev::Operand => {
                    let folded = words
                        .get(i + 1)
                        .and_then(|next| Value::parse_number(next))
                        .map(negate);
                    match folded {
                        Some(literal) => {
                            output.push(Token::Literal(literal));
                            i += 1;
                            prev = Prev::Operand;
                        }
                        None => {
                            output.push(Token::Literal(Value::Integer(0)));
                            stack.push(Pending::Op(Operator::Neg));
                            prev = Prev::Operator;
                        }
                    }
                }
                Some(op) if op.is_prefix() => {
                    stack.push(Pending::Op(op));
                    prev = Prev::Operator;
                }
                Some(op) => {
                    while let Some(&Pending::Op(top)) = stack.last() {
                        let outranks = top.precedence() > op.precedence()
                            || (top.precedence() == op.precedence() && !op.is_right_associative());
                        if !outranks {
                            break;
                        }
                        output.push(emit(top));
                        stack.pop();
                    }
                    stack.push(Pending::Op(op));
                    prev = Prev::Operator;
                }
                None => {
                    output.push(Token::value(word));
                    prev = Prev::Operand;
                }
            },
        }
        i += 1;
    }

    while let Some(pending) = stack.pop() {
        match pending {
            Pending::Op(op) => output.push(emit(op)),
            Pending::Open => return Err(ExprError::UnbalancedParen),
        }
    }

    check_arity(&output)?;
    Ok(output)
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Op(Operator),
    Open,
}

/// What the previous word was, for recognizing unary minus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prev {
    Start,
    Open,
    Operator,
    Operand,
}

fn emit(op: Operator) -> Token {
    match op {
        Operator::Neg => Token::Op(Operator::Sub),
        other => Token::Op(other),
    }
}

fn negate(value: Value) -> Value {
    match value {
        Value::Integer(n) => n
            .checked_neg()
            .map(Value::Integer)
            .unwrap_or(Value::Float(-(n as f64))),
        Value::Float(x) => Value::Float(-x),
        other => other,
    }
}

/// Simulate stack depth so malformed expressions fail at compile time.
fn check_arity(postfix: &[Token]) -> Result<(), ExprError> {
    let mut depth = 0usize;
    for token in postfix {
        match token {
            Token::Op(op) if op.is_prefix() => {
                if depth < 1 {
                    return Err(ExprError::Malformed);
                }
            }
            Token::Op(_) => {
                if depth < 2 {
                    return Err(ExprError::Malformed);
                }
                depth -= 1;
            }
            _ => depth += 1,
        }
    }
    if depth == 1 {
        Ok(())
    } else {
        Err(ExprError::Malformed)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '?' | '.' | '\'' | '"' | '[' | ']')
}

/// Split an expression into words. Quoted strings and bracketed arrays
/// are atomic; parentheses are always words of their own.
pub(crate) fn split_expression(text: &str) -> Result<Vec<String>, ExprError> {
    let chars: Vec<char> = text.chars().collect();
    let mut words = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '(' || c == ')' {
            words.push(c.to_string());
            i += 1;
        } else if is_name_char(c) {
            let start = i;
            while i < chars.len() && is_name_char(chars[i]) {
                i = match chars[i] {
                    '"' => skip_string(&chars, i)?,
                    '[' => skip_array(&chars, i)?,
                    _ => i + 1,
                };
            }
            words.push(chars[start..i].iter().collect());
        } else {
            let start = i;
            while i < chars.len()
                && !is_name_char(chars[i])
                && !chars[i].is_whitespace()
                && chars[i] != '('
                && chars[i] != ')'
            {
                i += 1;
            }
            split_operator_run(&chars[start..i], &mut words)?;
        }
    }

    Ok(words)
}

/// Index just past the quote that closes the string opening at `open`.
fn skip_string(chars: &[char], open: usize) -> Result<usize, ExprError> {
    chars[open + 1..]
        .iter()
        .position(|&c| c == '"')
        .map(|close| open + close + 2)
        .ok_or(ExprError::UnterminatedString)
}

/// Index just past the bracket that closes the array opening at `open`.
fn skip_array(chars: &[char], open: usize) -> Result<usize, ExprError> {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '"' => {
                i = skip_string(chars, i)?;
                continue;
            }
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(ExprError::UnterminatedArray)
}

/// Split a run such as `*-` or `<=-` into operator symbols, longest match first.
fn split_operator_run(run: &[char], words: &mut Vec<String>) -> Result<(), ExprError> {
    let run: String = run.iter().collect();
    let mut rest = run.as_str();
    while !rest.is_empty() {
        let symbol = SYMBOLS
            .iter()
            .find(|symbol| rest.starts_with(*symbol))
            .ok_or_else(|| ExprError::UnknownOperator(rest.to_string()))?;
        words.push(symbol.to_string());
        rest = &rest[symbol.len()..];
    }
    Ok(())
}
