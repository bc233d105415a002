//! Runtime errors for the Patchlang VM.
//!
//! A runtime error halts only the playhead that raised it. The world
//! turns it into an [`ErrorReport`](crate::report::ErrorReport) and routes
//! its [`label`](RuntimeError::label) to the entity's `trap` hats.

use patchlang_common::{EntityId, ValueError};
use patchlang_compiler::LoadError;
use thiserror::Error;

/// Errors that occur while executing a playhead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// A name is bound in no scope: local, attribute or global.
    #[error("variable '{name}' does not exist in locals, attributes or globals")]
    UndefinedVariable { name: String },

    /// `getattribute` on a name the entity does not carry.
    #[error("entity {entity} has no attribute '{name}'")]
    AttributeNotFound { entity: EntityId, name: String },

    /// `getglob` on an unset global.
    #[error("no global named '{name}'")]
    GlobalNotFound { name: String },

    /// A value could not be coerced to the type an operation needs.
    #[error(transparent)]
    Conversion(#[from] ValueError),

    /// An operator or command applied to operands of the wrong type.
    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: String,
        left: &'static str,
        right: &'static str,
    },

    /// A prefix operator or command applied to a value of the wrong type.
    #[error("cannot apply '{op}' to {kind}")]
    UnsupportedOperand { op: String, kind: &'static str },

    /// List or string index outside `0..len`.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    /// Integer or float division (or modulo) by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Integer result does not fit in 64 bits, or a float became infinite.
    #[error("arithmetic overflow in '{op}'")]
    Overflow { op: String },

    /// A maths function evaluated outside its domain.
    #[error("'{op}' is undefined for {value}")]
    MathDomain { op: String, value: String },

    /// An operator found fewer operands than it takes.
    #[error("expression stack underflow at '{op}'")]
    StackUnderflow { op: String },

    /// A postfix expression did not reduce to exactly one value.
    #[error("expression left {count} values on the stack")]
    InvalidExpression { count: usize },

    /// Head word is neither a built-in command nor a defined function.
    #[error("'{name}' is not a built-in command or user-defined function")]
    UnknownCommand { name: String },

    /// Function call argument not of the form `name=value`.
    #[error("'{arg}' is not a valid call argument; arguments use the form <name>=<value>")]
    MalformedCall { arg: String },

    /// A command was given too few operands.
    #[error("'{command}' is missing an operand")]
    MissingOperand { command: String },

    /// An operand that must name a variable is a literal.
    #[error("'{word}' is not a variable name")]
    InvalidTarget { word: String },

    /// A subcommand word the command does not know.
    #[error("'{command}' has no subcommand '{word}'")]
    UnknownSubcommand { command: String, word: String },

    /// An entity handle that does not resolve.
    #[error("no entity with id {id}")]
    EntityNotFound { id: EntityId },

    /// `adopt` of the root, of the adopter, or of one of its ancestors.
    #[error("entity {adopter} cannot adopt {target} (the root, itself or an ancestor)")]
    InvalidAdoption { adopter: EntityId, target: EntityId },

    /// `delete` of the root entity.
    #[error("cannot delete the root entity")]
    InvalidDelete,

    /// `changelayer` on an entity that is not a child of the caller.
    #[error("entity {id} is not a child of {parent}")]
    NotAChild { id: EntityId, parent: EntityId },

    /// Nested calls deeper than the configured limit.
    #[error("call depth exceeded limit {limit}")]
    CallDepthExceeded { limit: usize },

    /// A playhead ran more instructions in one tick than the configured budget.
    #[error("step budget of {limit} instructions exceeded in one tick")]
    StepBudgetExceeded { limit: usize },

    /// A jump or fork whose target is not an address.
    #[error("jump target '{target}' does not resolve to an address")]
    UnresolvedJump { target: String },

    /// The stage refused a presentation verb.
    #[error("'{verb}' failed: {message}")]
    Stage { verb: String, message: String },

    /// A script loaded at runtime (by `instance`) failed to compile.
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl RuntimeError {
    /// Short snake_case kind, bound to `_error_type` in trap playheads.
    pub fn label(&self) -> &'static str {
        match self {
            RuntimeError::UndefinedVariable { .. } => "undefined_variable",
            RuntimeError::AttributeNotFound { .. } => "attribute_not_found",
            RuntimeError::GlobalNotFound { .. } => "global_not_found",
            RuntimeError::Conversion(_) => "conversion_error",
            RuntimeError::TypeMismatch { .. } | RuntimeError::UnsupportedOperand { .. } => {
                "type_mismatch"
            }
            RuntimeError::IndexOutOfRange { .. } => "index_out_of_range",
            RuntimeError::DivisionByZero => "division_by_zero",
            RuntimeError::Overflow { .. } => "overflow",
            RuntimeError::MathDomain { .. } => "math_domain",
            RuntimeError::StackUnderflow { .. } => "stack_underflow",
            RuntimeError::InvalidExpression { .. } => "invalid_expression",
            RuntimeError::UnknownCommand { .. } => "unknown_command",
            RuntimeError::MalformedCall { .. } => "malformed_call",
            RuntimeError::MissingOperand { .. } => "missing_operand",
            RuntimeError::InvalidTarget { .. } => "invalid_target",
            RuntimeError::UnknownSubcommand { .. } => "unknown_subcommand",
            RuntimeError::EntityNotFound { .. } => "entity_not_found",
            RuntimeError::InvalidAdoption { .. } => "invalid_adoption",
            RuntimeError::InvalidDelete => "invalid_delete",
            RuntimeError::NotAChild { .. } => "not_a_child",
            RuntimeError::CallDepthExceeded { .. } => "call_depth_exceeded",
            RuntimeError::StepBudgetExceeded { .. } => "step_budget_exceeded",
            RuntimeError::UnresolvedJump { .. } => "unresolved_jump",
            RuntimeError::Stage { .. } => "stage_error",
            RuntimeError::Load(e) => e.label(),
        }
    }

    /// True for errors that end the world rather than one playhead.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RuntimeError::Load(_))
    }
}
