//! Runtime value representation for Patchlang.
//!
//! Values are what variables, attributes, globals and the evaluation
//! stack hold.

use crate::error::ValueError;
use std::fmt;

/// Identity of an entity in the scene tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Signed 64-bit integer.
    Integer(i64),
    /// IEEE 754 64-bit float.
    Float(f64),
    /// Text.
    String(String),
    /// Ordered, heterogeneous collection.
    List(Vec<Value>),
    /// Handle to an entity.
    Reference(EntityId),
}

// Numbers compare by magnitude across Integer and Float, so `1 == 1.0`
// holds in scripts. Floats compare bitwise with each other, keeping Eq
// lawful for the NaN case the evaluator never produces.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits() || a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Reference(a), Value::Reference(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Value {
    /// Short lowercase name of the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Reference(_) => "reference",
        }
    }

    /// Truthiness: false iff the value is the zero or empty value of its type.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Integer(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Reference(_) => true,
        }
    }

    /// Convert an integral float to an Integer. Other values are returned unchanged.
    pub fn normalized(self) -> Value {
        match self {
            Value::Float(x) if is_integral(x) => Value::Integer(x as i64),
            other => other,
        }
    }

    /// Parse a numeric literal as written in script source.
    ///
    /// Integral results are always `Integer`, so `3.0` and `3e0` both
    /// yield `Integer(3)`. Words such as `inf` or `nan` are not numbers.
    pub fn parse_number(text: &str) -> Option<Value> {
        let bytes = text.as_bytes();
        let leading = match bytes.first()? {
            b'-' | b'+' | b'.' => bytes.get(1).copied(),
            b => Some(*b),
        };
        let leading = match leading {
            Some(b'.') if matches!(bytes[0], b'-' | b'+') => bytes.get(2).copied(),
            other => other,
        };
        if !leading.is_some_and(|b| b.is_ascii_digit()) {
            return None;
        }
        if let Ok(n) = text.parse::<i64>() {
            return Some(Value::Integer(n));
        }
        let x: f64 = text.parse().ok()?;
        Some(Value::Float(x).normalized())
    }

    /// Coerce to an integer. Floats truncate toward zero; strings must
    /// hold an integer literal.
    pub fn as_int(&self) -> Result<i64, ValueError> {
        match self {
            Value::Integer(n) => Ok(*n),
            Value::Float(x) if x.is_finite() && x.abs() < i64::MAX as f64 => Ok(x.trunc() as i64),
            Value::String(s) => s.trim().parse().map_err(|_| self.conversion("integer")),
            _ => Err(self.conversion("integer")),
        }
    }

    /// Coerce to a float.
    pub fn as_float(&self) -> Result<f64, ValueError> {
        match self {
            Value::Integer(n) => Ok(*n as f64),
            Value::Float(x) => Ok(*x),
            Value::String(s) => s.trim().parse().map_err(|_| self.conversion("float")),
            _ => Err(self.conversion("float")),
        }
    }

    /// Borrow the elements if this value is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Coerce to a list. Non-list values become a single-element list.
    pub fn into_list(self) -> Vec<Value> {
        match self {
            Value::List(items) => items,
            other => vec![other],
        }
    }

    /// Coerce to an entity id. Integers are accepted as raw ids.
    pub fn as_entity(&self) -> Result<EntityId, ValueError> {
        match self {
            Value::Reference(id) => Ok(*id),
            Value::Integer(n) if *n >= 0 => Ok(EntityId(*n as u64)),
            _ => Err(self.conversion("reference")),
        }
    }

    fn conversion(&self, target: &'static str) -> ValueError {
        ValueError::Conversion {
            value: self.to_string(),
            target,
        }
    }
}

fn is_integral(x: f64) -> bool {
    x.is_finite() && x.fract() == 0.0 && x.abs() < i64::MAX as f64
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(x) if is_integral(*x) => write!(f, "{x:.1}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Reference(id) => write!(f, "{id}"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Integer(i64::from(b))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Value::Reference(id)
    }
}
