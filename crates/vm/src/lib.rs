//! Patchlang virtual machine: entities, script systems and playheads.
//!
//! A [`World`] holds a tree of [`Entity`] nodes. Each entity runs one
//! compiled script through its [`ScriptSystem`], a set of cooperative
//! [`Playhead`]s that each advance until they wait, finish or fault. A
//! frame ticks every entity depth first, then delivers the frame's
//! messages so that `receive` handlers start on the next frame.
//!
//! Presentation verbs (drawing, audio, input) go to a [`Stage`]; the VM
//! itself never renders.
//!
//! # Usage
//!
//! ```
//! use patchlang_compiler::MemorySource;
//! use patchlang_vm::{RecordingStage, RuntimeConfig, World};
//!
//! let source = MemorySource::new().with("main", "start\nsetvar x (2 + 3 * 4)\nlog x\nend");
//! let mut world = World::with_stage(source, RuntimeConfig::default(), RecordingStage::new());
//! world.spawn_root("main").unwrap();
//! world.tick().unwrap();
//! assert_eq!(world.stage().lines(), vec!["14"]);
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod eval;
pub mod playhead;
pub mod report;
pub mod scope;
pub mod stage;
pub mod system;
pub mod world;

mod execute;

pub use config::RuntimeConfig;
pub use entity::Entity;
pub use error::RuntimeError;
pub use eval::evaluate;
pub use playhead::{Frame, Playhead, PlayheadState};
pub use report::{ErrorClass, ErrorReport, Reporter};
pub use scope::ScopeChain;
pub use stage::{ConsoleStage, Operand, RecordingStage, Stage, StageCall};
pub use system::ScriptSystem;
pub use world::{Message, World, WorldState};
