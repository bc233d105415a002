//! Patchlang compiler: script text to addressed instruction lists.
//!
//! Compilation is single-pass and line-oriented. Each line is case-folded,
//! has awkward string literals lifted into the static table, has its
//! parenthesized sub-expressions and braced inline commands hoisted into
//! preceding instructions, and is then either a structured directive
//! (lowered to back-patched jumps) or a verbatim command.
//!
//! # Usage
//!
//! ```
//! use patchlang_compiler::{MemorySource, ProgramStore};
//!
//! let mut store = ProgramStore::new(
//!     MemorySource::new().with("hello", "start\nlog \"Hello World\"\nend"),
//! );
//! let program = store.get_or_compile("hello").unwrap();
//! assert_eq!(program.len(), 3);
//! assert_eq!(program.instructions[1].to_string(), "log '0");
//! assert_eq!(store.statics().get(0), Some("Hello World"));
//! ```

pub mod error;
pub mod expr;
pub mod store;

mod lexer;
mod lower;

pub use error::{ExprError, LoadError};
pub use expr::to_postfix;
pub use store::{FsSource, MemorySource, ProgramStore, ScriptSource};
