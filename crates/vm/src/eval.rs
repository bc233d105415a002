//! Postfix expression evaluation.
//!
//! Operands are resolved through a caller-supplied closure, so the
//! evaluator itself knows nothing about scoping. Integral float operands
//! are normalized to integers before every operator applies.

use crate::error::RuntimeError;
use patchlang_common::{Operator, Token, Value};

/// Evaluate a compiled postfix expression.
///
/// # Errors
///
/// Returns [`RuntimeError`] when an operand fails to resolve, when an
/// operator rejects its operands, or when the expression does not reduce
/// to exactly one value.
pub fn evaluate<F>(postfix: &[Token], mut resolve: F) -> Result<Value, RuntimeError>
where
    F: FnMut(&Token) -> Result<Value, RuntimeError>,
{
    let mut stack: Vec<Value> = Vec::new();
    for token in postfix {
        match token {
            Token::Op(op) if op.is_prefix() => {
                let a = pop(&mut stack, *op)?;
                stack.push(unary(*op, a)?);
            }
            Token::Op(op) => {
                let b = pop(&mut stack, *op)?;
                let a = pop(&mut stack, *op)?;
                stack.push(binary(*op, a, b)?);
            }
            operand => stack.push(resolve(operand)?),
        }
    }

    let count = stack.len();
    match stack.pop() {
        Some(value) if count == 1 => Ok(value),
        _ => Err(RuntimeError::InvalidExpression { count }),
    }
}

fn pop(stack: &mut Vec<Value>, op: Operator) -> Result<Value, RuntimeError> {
    stack.pop().ok_or_else(|| RuntimeError::StackUnderflow {
        op: op.symbol().to_string(),
    })
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn float(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(x) => x,
        }
    }
}

fn number(value: &Value) -> Option<Num> {
    match value {
        Value::Integer(n) => Some(Num::Int(*n)),
        Value::Float(x) => Some(Num::Float(*x)),
        _ => None,
    }
}

fn mismatch(op: Operator, a: &Value, b: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        op: op.symbol().to_string(),
        left: a.type_name(),
        right: b.type_name(),
    }
}

fn unsupported(op: Operator, a: &Value) -> RuntimeError {
    RuntimeError::UnsupportedOperand {
        op: op.symbol().to_string(),
        kind: a.type_name(),
    }
}

fn overflow(op: Operator) -> RuntimeError {
    RuntimeError::Overflow {
        op: op.symbol().to_string(),
    }
}

/// Reject NaN and infinite results.
fn checked_float(op: Operator, x: f64) -> Result<Value, RuntimeError> {
    if x.is_nan() {
        Err(RuntimeError::MathDomain {
            op: op.symbol().to_string(),
            value: "NaN".to_string(),
        })
    } else if x.is_infinite() {
        Err(overflow(op))
    } else {
        Ok(Value::Float(x))
    }
}

/// Apply a binary operator.
pub fn binary(op: Operator, a: Value, b: Value) -> Result<Value, RuntimeError> {
    let a = a.normalized();
    let b = b.normalized();

    match op {
        Operator::And => return Ok(Value::from(a.is_truthy() && b.is_truthy())),
        Operator::Or => return Ok(Value::from(a.is_truthy() || b.is_truthy())),
        Operator::Eq => return Ok(Value::from(a == b)),
        Operator::Ne => return Ok(Value::from(a != b)),
        Operator::Index => return index(a, b),
        Operator::Add if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) => {
            return Ok(Value::String(format!("{a}{b}")));
        }
        _ => {}
    }

    let (Some(x), Some(y)) = (number(&a), number(&b)) else {
        return Err(mismatch(op, &a, &b));
    };

    match op {
        Operator::Lt => Ok(Value::from(x.float() < y.float())),
        Operator::Gt => Ok(Value::from(x.float() > y.float())),
        Operator::Le => Ok(Value::from(x.float() <= y.float())),
        Operator::Ge => Ok(Value::from(x.float() >= y.float())),
        Operator::Add => arith(op, x, y, i64::checked_add, |p, q| p + q),
        Operator::Sub => arith(op, x, y, i64::checked_sub, |p, q| p - q),
        Operator::Mul => arith(op, x, y, i64::checked_mul, |p, q| p * q),
        Operator::Div => {
            if y.float() == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            checked_float(op, x.float() / y.float())
        }
        Operator::FloorDiv => floor_div(x, y),
        Operator::Mod => modulo(op, x, y, &a, &b),
        Operator::Pow => power(x, y),
        Operator::BitAnd
        | Operator::BitOr
        | Operator::Xor
        | Operator::Shl
        | Operator::Shr => {
            let (Num::Int(p), Num::Int(q)) = (x, y) else {
                return Err(mismatch(op, &a, &b));
            };
            bitwise(op, p, q)
        }
        _ => Err(mismatch(op, &a, &b)),
    }
}

fn arith(
    op: Operator,
    x: Num,
    y: Num,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    match (x, y) {
        (Num::Int(p), Num::Int(q)) => int_op(p, q).map(Value::Integer).ok_or_else(|| overflow(op)),
        _ => checked_float(op, float_op(x.float(), y.float())),
    }
}

fn floor_div(x: Num, y: Num) -> Result<Value, RuntimeError> {
    match (x, y) {
        (Num::Int(_), Num::Int(0)) => Err(RuntimeError::DivisionByZero),
        (Num::Int(p), Num::Int(q)) => {
            let quotient = p
                .checked_div(q)
                .ok_or_else(|| overflow(Operator::FloorDiv))?;
            if p % q != 0 && ((p < 0) != (q < 0)) {
                Ok(Value::Integer(quotient - 1))
            } else {
                Ok(Value::Integer(quotient))
            }
        }
        _ if y.float() == 0.0 => Err(RuntimeError::DivisionByZero),
        _ => checked_float(Operator::FloorDiv, (x.float() / y.float()).floor()),
    }
}

/// Integer remainder taking the sign of the divisor.
fn modulo(op: Operator, x: Num, y: Num, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let (Num::Int(p), Num::Int(q)) = (x, y) else {
        return Err(mismatch(op, a, b));
    };
    if q == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    let mut r = p.checked_rem(q).ok_or_else(|| overflow(op))?;
    if r != 0 && ((r < 0) != (q < 0)) {
        r += q;
    }
    Ok(Value::Integer(r))
}

fn power(x: Num, y: Num) -> Result<Value, RuntimeError> {
    match (x, y) {
        (Num::Int(p), Num::Int(q)) if q >= 0 => u32::try_from(q)
            .ok()
            .and_then(|e| p.checked_pow(e))
            .map(Value::Integer)
            .ok_or_else(|| overflow(Operator::Pow)),
        _ => checked_float(Operator::Pow, x.float().powf(y.float())),
    }
}

fn bitwise(op: Operator, p: i64, q: i64) -> Result<Value, RuntimeError> {
    let shift = || u32::try_from(q).ok();
    let result = match op {
        Operator::BitAnd => Some(p & q),
        Operator::BitOr => Some(p | q),
        Operator::Xor => Some(p ^ q),
        Operator::Shl => shift().and_then(|s| p.checked_shl(s)),
        Operator::Shr => shift().and_then(|s| p.checked_shr(s)),
        _ => None,
    };
    result.map(Value::Integer).ok_or_else(|| overflow(op))
}

fn index(a: Value, b: Value) -> Result<Value, RuntimeError> {
    let Value::Integer(i) = b else {
        return Err(mismatch(Operator::Index, &a, &b));
    };
    let out_of_range = |len| RuntimeError::IndexOutOfRange { index: i, len };
    let at = usize::try_from(i).ok();
    match a {
        Value::List(items) => at
            .and_then(|at| items.get(at).cloned())
            .ok_or_else(|| out_of_range(items.len())),
        Value::String(text) => at
            .and_then(|at| text.chars().nth(at))
            .map(|c| Value::String(c.to_string()))
            .ok_or_else(|| out_of_range(text.chars().count())),
        other => Err(mismatch(Operator::Index, &other, &b)),
    }
}

/// Apply a prefix operator.
pub fn unary(op: Operator, a: Value) -> Result<Value, RuntimeError> {
    let a = a.normalized();
    match op {
        Operator::Not => Ok(Value::from(!a.is_truthy())),
        Operator::Neg => binary(Operator::Sub, Value::Integer(0), a),
        Operator::Str => Ok(Value::String(a.to_string())),
        Operator::Int => Ok(Value::Integer(a.as_int()?)),
        Operator::Float => Ok(Value::Float(a.as_float()?)),
        Operator::Len => match &a {
            Value::List(items) => Ok(Value::Integer(items.len() as i64)),
            Value::String(text) => Ok(Value::Integer(text.chars().count() as i64)),
            other => Err(unsupported(op, other)),
        },
        Operator::Lower | Operator::Upper => match &a {
            Value::String(text) if op == Operator::Lower => Ok(Value::String(text.to_lowercase())),
            Value::String(text) => Ok(Value::String(text.to_uppercase())),
            other => Err(unsupported(op, other)),
        },
        _ => {
            let x = number(&a).ok_or_else(|| unsupported(op, &a))?;
            maths(op, x)
        }
    }
}

fn maths(op: Operator, x: Num) -> Result<Value, RuntimeError> {
    let domain = |value: f64| RuntimeError::MathDomain {
        op: op.symbol().to_string(),
        value: Value::Float(value).normalized().to_string(),
    };
    match op {
        Operator::Abs => match x {
            Num::Int(n) => n.checked_abs().map(Value::Integer).ok_or_else(|| overflow(op)),
            Num::Float(f) => Ok(Value::Float(f.abs())),
        },
        Operator::Round => {
            let rounded = x.float().round_ties_even();
            if rounded.is_finite() && rounded.abs() < i64::MAX as f64 {
                Ok(Value::Integer(rounded as i64))
            } else {
                Err(overflow(op))
            }
        }
        Operator::Sin => checked_float(op, x.float().to_radians().sin()),
        Operator::Cos => checked_float(op, x.float().to_radians().cos()),
        Operator::Tan => checked_float(op, x.float().to_radians().tan()),
        Operator::Asin | Operator::Acos => {
            let ratio = x.float();
            if !(-1.0..=1.0).contains(&ratio) {
                return Err(domain(ratio));
            }
            let radians = if op == Operator::Asin {
                ratio.asin()
            } else {
                ratio.acos()
            };
            checked_float(op, radians.to_degrees())
        }
        Operator::Atan => checked_float(op, x.float().atan().to_degrees()),
        _ => Err(RuntimeError::StackUnderflow {
            op: op.symbol().to_string(),
        }),
    }
}
