//! The presentation boundary.
//!
//! Drawing, sprites, collision, audio, input and file I/O live outside the
//! VM. Their opcodes resolve operands and hand them to a [`Stage`], which
//! may answer with a value bound to `_return`.

use log::debug;
use patchlang_common::{EntityId, Opcode, Value};
use std::collections::HashMap;
use std::fmt;

/// A resolved operand of a presentation verb.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    /// A word that names no variable, passed through as written.
    Word(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(value) => write!(f, "{value}"),
            Operand::Word(word) => write!(f, "{word}"),
        }
    }
}

/// Side-effecting verb dispatch.
pub trait Stage {
    /// Perform a presentation verb on behalf of `entity`.
    ///
    /// `Ok(Some(v))` binds `v` to the caller's `_return`. An `Err` becomes
    /// a runtime error on the calling playhead.
    fn perform(
        &mut self,
        entity: EntityId,
        verb: Opcode,
        operands: &[Operand],
    ) -> Result<Option<Value>, String>;

    /// Output of the `log` command.
    fn print(&mut self, entity: EntityId, text: &str);
}

/// Headless stage: `log` goes to stdout, verbs go to the debug log.
#[derive(Debug, Default)]
pub struct ConsoleStage;

impl Stage for ConsoleStage {
    fn perform(
        &mut self,
        entity: EntityId,
        verb: Opcode,
        operands: &[Operand],
    ) -> Result<Option<Value>, String> {
        debug!("entity {entity}: {verb} {}", join(operands));
        match verb {
            Opcode::Collide | Opcode::MaskCollide | Opcode::GetKey => {
                Ok(Some(Value::Integer(0)))
            }
            _ => Ok(None),
        }
    }

    fn print(&mut self, _entity: EntityId, text: &str) {
        println!("{text}");
    }
}

/// One recorded verb.
#[derive(Debug, Clone, PartialEq)]
pub struct StageCall {
    pub entity: EntityId,
    pub verb: Opcode,
    pub operands: Vec<Operand>,
}

/// A stage that records everything, for tests and tooling.
#[derive(Debug, Default)]
pub struct RecordingStage {
    pub calls: Vec<StageCall>,
    pub printed: Vec<(EntityId, String)>,
    responses: HashMap<Opcode, Result<Value, String>>,
}

impl RecordingStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every `verb` with `value`.
    pub fn respond_with(mut self, verb: Opcode, value: Value) -> Self {
        self.responses.insert(verb, Ok(value));
        self
    }

    /// Fail every `verb` with `message`.
    pub fn fail_with(mut self, verb: Opcode, message: &str) -> Self {
        self.responses.insert(verb, Err(message.to_string()));
        self
    }

    /// Every line passed to `log`, in order.
    pub fn lines(&self) -> Vec<&str> {
        self.printed.iter().map(|(_, text)| text.as_str()).collect()
    }

    /// Recorded calls of one verb.
    pub fn calls_of(&self, verb: Opcode) -> impl Iterator<Item = &StageCall> {
        self.calls.iter().filter(move |call| call.verb == verb)
    }
}

impl Stage for RecordingStage {
    fn perform(
        &mut self,
        entity: EntityId,
        verb: Opcode,
        operands: &[Operand],
    ) -> Result<Option<Value>, String> {
        self.calls.push(StageCall {
            entity,
            verb,
            operands: operands.to_vec(),
        });
        match self.responses.get(&verb) {
            Some(Ok(value)) => Ok(Some(value.clone())),
            Some(Err(message)) => Err(message.clone()),
            None => Ok(None),
        }
    }

    fn print(&mut self, entity: EntityId, text: &str) {
        self.printed.push((entity, text.to_string()));
    }
}

fn join(operands: &[Operand]) -> String {
    operands
        .iter()
        .map(Operand::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
