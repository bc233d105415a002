//! Value conversion errors.

use thiserror::Error;

/// Errors that occur when coercing a [`Value`](crate::Value) to another type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// The value has no representation in the requested type.
    #[error("cannot convert '{value}' to {target}")]
    Conversion { value: String, target: &'static str },
}
