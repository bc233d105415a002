//! Error types for the Patchlang compiler.

use thiserror::Error;

/// Errors produced while converting an infix expression to postfix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// Nothing to compile.
    #[error("empty expression")]
    Empty,

    /// A `(` without `)` or the reverse.
    #[error("unbalanced parenthesis")]
    UnbalancedParen,

    /// A `"` without a closing quote.
    #[error("unterminated string literal")]
    UnterminatedString,

    /// A `[` without a matching `]`.
    #[error("unterminated array literal")]
    UnterminatedArray,

    /// A run of operator characters that is not a known operator.
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    /// Operators and operands do not combine into a single value.
    #[error("operands and operators do not balance")]
    Malformed,
}

/// Errors that abort compilation of a script.
///
/// Every variant names the script it was raised in; line numbers are
/// 1-based within that script.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The script source could not be read.
    #[error("{script}: cannot read script: {message}")]
    Source { script: String, message: String },

    /// A closing directive with nothing open.
    #[error("{script}:{line}: '{keyword}' without an open block")]
    UnmatchedCloser {
        script: String,
        line: usize,
        keyword: String,
    },

    /// A closing directive for a different kind of block.
    #[error("{script}:{line}: '{keyword}' cannot close '{open}' opened on line {opened}")]
    MismatchedCloser {
        script: String,
        line: usize,
        keyword: String,
        open: &'static str,
        opened: usize,
    },

    /// A block still open at the end of the script.
    #[error("{script}:{line}: '{construct}' is never closed")]
    Unclosed {
        script: String,
        line: usize,
        construct: &'static str,
    },

    /// A `loop` body that never yields.
    #[error("{script}:{line}: loop body contains no wait")]
    InfiniteLoop { script: String, line: usize },

    /// A `def` inside another function body.
    #[error("{script}:{line}: function definitions cannot nest")]
    NestedFunction { script: String, line: usize },

    /// `elif` or `else` after the chain's `else`.
    #[error("{script}:{line}: '{keyword}' after else")]
    BranchAfterElse {
        script: String,
        line: usize,
        keyword: String,
    },

    /// A directive that needs an operand was given none.
    #[error("{script}:{line}: '{directive}' requires an operand")]
    MissingOperand {
        script: String,
        line: usize,
        directive: &'static str,
    },

    /// Parentheses or braces that do not pair up.
    #[error("{script}:{line}: unbalanced '{delimiter}'")]
    UnbalancedDelimiter {
        script: String,
        line: usize,
        delimiter: char,
    },

    /// An expression that could not be compiled.
    #[error("{script}:{line}: invalid expression: {reason}")]
    Expression {
        script: String,
        line: usize,
        reason: ExprError,
    },

    /// A script that includes itself, directly or indirectly.
    #[error("{script}: include cycle through '{include}'")]
    IncludeCycle { script: String, include: String },
}

impl LoadError {
    /// Short kind name, used as the label of error reports.
    pub fn label(&self) -> &'static str {
        match self {
            LoadError::Source { .. } => "missing_script",
            LoadError::UnmatchedCloser { .. } => "unmatched_closer",
            LoadError::MismatchedCloser { .. } => "mismatched_closer",
            LoadError::Unclosed { .. } => "unclosed_block",
            LoadError::InfiniteLoop { .. } => "infinite_loop",
            LoadError::NestedFunction { .. } => "nested_function",
            LoadError::BranchAfterElse { .. } => "branch_after_else",
            LoadError::MissingOperand { .. } => "missing_operand",
            LoadError::UnbalancedDelimiter { .. } => "unbalanced_delimiter",
            LoadError::Expression { .. } => "invalid_expression",
            LoadError::IncludeCycle { .. } => "include_cycle",
        }
    }

    /// The script the error was raised in.
    pub fn script(&self) -> &str {
        match self {
            LoadError::Source { script, .. }
            | LoadError::UnmatchedCloser { script, .. }
            | LoadError::MismatchedCloser { script, .. }
            | LoadError::Unclosed { script, .. }
            | LoadError::InfiniteLoop { script, .. }
            | LoadError::NestedFunction { script, .. }
            | LoadError::BranchAfterElse { script, .. }
            | LoadError::MissingOperand { script, .. }
            | LoadError::UnbalancedDelimiter { script, .. }
            | LoadError::Expression { script, .. }
            | LoadError::IncludeCycle { script, .. } => script,
        }
    }
}
