//! Tokens and operators.
//!
//! Every word of a compiled instruction is classified once, at compile
//! time, into a [`Token`]. The runtime never re-splits source text.

use crate::value::Value;
use std::fmt;

/// An expression operator.
///
/// Binary operators take two operands from the evaluation stack; prefix
/// operators (`not`, unary minus and the named functions) take one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    BitAnd,
    BitOr,
    Xor,
    Shl,
    Shr,
    Mul,
    Div,
    FloorDiv,
    Mod,
    /// Unary minus marker. Exists only inside the expression compiler;
    /// compiled output carries `0 x -` instead.
    Neg,
    Len,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Lower,
    Upper,
    Abs,
    Round,
    Int,
    Float,
    Str,
    Pow,
    /// Subscript, written as a backtick: ``list`2``.
    Index,
}

/// All operators that can appear in source text.
pub const ALL_OPERATORS: [Operator; 36] = [
    Operator::And,
    Operator::Or,
    Operator::Not,
    Operator::Eq,
    Operator::Ne,
    Operator::Lt,
    Operator::Gt,
    Operator::Le,
    Operator::Ge,
    Operator::Add,
    Operator::Sub,
    Operator::BitAnd,
    Operator::BitOr,
    Operator::Xor,
    Operator::Shl,
    Operator::Shr,
    Operator::Mul,
    Operator::Div,
    Operator::FloorDiv,
    Operator::Mod,
    Operator::Len,
    Operator::Sin,
    Operator::Cos,
    Operator::Tan,
    Operator::Asin,
    Operator::Acos,
    Operator::Atan,
    Operator::Lower,
    Operator::Upper,
    Operator::Abs,
    Operator::Round,
    Operator::Int,
    Operator::Float,
    Operator::Str,
    Operator::Pow,
    Operator::Index,
];

impl Operator {
    /// The canonical source spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Not => "not",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::BitAnd => "&",
            Operator::BitOr => "|",
            Operator::Xor => "~",
            Operator::Shl => "<<",
            Operator::Shr => ">>",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::FloorDiv => "//",
            Operator::Mod => "%",
            Operator::Neg => "neg",
            Operator::Len => "len",
            Operator::Sin => "sin",
            Operator::Cos => "cos",
            Operator::Tan => "tan",
            Operator::Asin => "arcsin",
            Operator::Acos => "arccos",
            Operator::Atan => "arctan",
            Operator::Lower => "lower",
            Operator::Upper => "upper",
            Operator::Abs => "abs",
            Operator::Round => "round",
            Operator::Int => "int",
            Operator::Float => "float",
            Operator::Str => "str",
            Operator::Pow => "^",
            Operator::Index => "`",
        }
    }

    /// Look up an operator by its source spelling. `xor` is accepted as
    /// an alias for `~`.
    pub fn from_symbol(symbol: &str) -> Option<Operator> {
        if symbol == "xor" {
            return Some(Operator::Xor);
        }
        ALL_OPERATORS.iter().copied().find(|op| op.symbol() == symbol)
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Operator::And | Operator::Or => 0,
            Operator::Not => 1,
            Operator::Eq
            | Operator::Ne
            | Operator::Lt
            | Operator::Gt
            | Operator::Le
            | Operator::Ge => 2,
            Operator::Add
            | Operator::Sub
            | Operator::BitAnd
            | Operator::BitOr
            | Operator::Xor
            | Operator::Shl
            | Operator::Shr => 3,
            Operator::Mul | Operator::Div | Operator::FloorDiv | Operator::Mod => 4,
            Operator::Neg => 5,
            Operator::Len
            | Operator::Sin
            | Operator::Cos
            | Operator::Tan
            | Operator::Asin
            | Operator::Acos
            | Operator::Atan
            | Operator::Lower
            | Operator::Upper
            | Operator::Abs
            | Operator::Round
            | Operator::Int
            | Operator::Float
            | Operator::Str => 6,
            Operator::Pow | Operator::Index => 7,
        }
    }

    /// True for operators that take a single operand written after them.
    pub fn is_prefix(self) -> bool {
        matches!(
            self,
            Operator::Not
                | Operator::Neg
                | Operator::Len
                | Operator::Sin
                | Operator::Cos
                | Operator::Tan
                | Operator::Asin
                | Operator::Acos
                | Operator::Atan
                | Operator::Lower
                | Operator::Upper
                | Operator::Abs
                | Operator::Round
                | Operator::Int
                | Operator::Float
                | Operator::Str
        )
    }

    pub fn is_right_associative(self) -> bool {
        self == Operator::Pow
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One classified word of an instruction or postfix expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Number or short inline string.
    Literal(Value),
    /// Reference into the static string table (`'N` in source).
    Static(usize),
    /// Bracketed array literal; elements resolve individually.
    Array(Vec<Token>),
    /// Variable name, label, keyword or bare word.
    Name(String),
    /// `key=value` argument of a function call or `instance`.
    Assign { name: String, value: Box<Token> },
    /// Operator in a postfix expression.
    Op(Operator),
}

impl Token {
    /// Classify a word in operand position. Operator spellings stay names.
    pub fn operand(word: &str) -> Token {
        if let Some((name, value)) = split_assignment(word) {
            return Token::Assign {
                name: name.to_string(),
                value: Box::new(Token::operand(value)),
            };
        }
        Token::value(word)
    }

    /// Classify a word of a compiled postfix expression.
    pub fn postfix(word: &str) -> Token {
        match Operator::from_symbol(word) {
            Some(op) if op != Operator::Neg => Token::Op(op),
            _ => Token::value(word),
        }
    }

    /// Classify a word as a value: number, string, static, array or name.
    pub fn value(word: &str) -> Token {
        if let Some(number) = Value::parse_number(word) {
            return Token::Literal(number);
        }
        if word.starts_with('"') {
            return Token::Literal(Value::String(word.trim_matches('"').to_string()));
        }
        if let Some(index) = word.strip_prefix('\'').and_then(|n| n.parse().ok()) {
            return Token::Static(index);
        }
        if word.starts_with('[') {
            return Token::Array(split_array(word).into_iter().map(Token::value).collect());
        }
        Token::Name(word.to_string())
    }

    /// The variable name, if this token is a plain name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Token::Name(name) => Some(name),
            _ => None,
        }
    }

    /// True for integer and float literals.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Token::Literal(Value::Integer(_) | Value::Float(_)))
    }
}

/// Split `key=value` where `key` is a plain identifier. Compound
/// modifiers such as `+=` and comparisons such as `==` are not assignments.
fn split_assignment(word: &str) -> Option<(&str, &str)> {
    let (name, value) = word.split_once('=')?;
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '?' || c == '.');
    (plain && !value.is_empty() && !value.starts_with('=')).then_some((name, value))
}

/// True for names the compiler invents: expression temporaries (`_t0_`)
/// and repeat counters (`_r1spin_main_`). These never outlive a call frame.
pub fn is_temporary(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() > 3
        && bytes[0] == b'_'
        && matches!(bytes[1], b't' | b'r')
        && bytes[2].is_ascii_digit()
        && name.ends_with('_')
}

/// Split the inside of an array literal on top-level commas.
pub fn split_array(word: &str) -> Vec<&str> {
    let inner = word.strip_prefix('[').unwrap_or(word);
    let inner = inner.strip_suffix(']').unwrap_or(inner);
    if inner.is_empty() {
        return Vec::new();
    }
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '[' if !quoted => depth += 1,
            ']' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                items.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&inner[start..]);
    items
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(Value::String(s)) => write!(f, "\"{s}\""),
            Token::Literal(value) => write!(f, "{value}"),
            Token::Static(index) => write!(f, "'{index}"),
            Token::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Token::Name(name) => write!(f, "{name}"),
            Token::Assign { name, value } => write!(f, "{name}={value}"),
            Token::Op(op) => write!(f, "{op}"),
        }
    }
}
