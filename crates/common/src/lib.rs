//! Patchlang common types.
//!
//! This crate provides the data structures shared by the compiler and
//! the virtual machine:
//!
//! - [`Value`]: tagged runtime value (integer, float, string, list, reference)
//! - [`Token`] and [`Operator`]: classified instruction words
//! - [`Opcode`]: the instruction set, with source mnemonics
//! - [`Instruction`]: one compiled line with its jump target
//! - [`Program`]: a compiled script with its hat, label and function index
//! - [`StaticTable`]: interned raw string literals
//! - [`ValueError`]: value conversion failures

pub mod error;
pub mod instruction;
pub mod opcode;
pub mod program;
pub mod statics;
pub mod token;
pub mod value;

// Re-export commonly used types at the crate root.
pub use error::ValueError;
pub use instruction::{Instruction, JumpTarget};
pub use opcode::Opcode;
pub use program::{FunctionDef, Hat, HatKind, IncludeSpan, Param, Program};
pub use statics::StaticTable;
pub use token::{is_temporary, Operator, Token};
pub use value::{EntityId, Value};
