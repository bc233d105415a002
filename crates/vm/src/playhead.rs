//! Playheads: cooperative execution contexts.
//!
//! A playhead is one instruction stream inside an entity. It owns a call
//! stack of [`Frame`]s and a wait counter; the innermost frame is last.

use patchlang_common::Value;
use std::collections::HashMap;

/// One level of the call stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Address of the next instruction to execute.
    pub pc: usize,
    pub locals: HashMap<String, Value>,
}

impl Frame {
    pub fn new(pc: usize) -> Self {
        Self {
            pc,
            locals: HashMap::new(),
        }
    }
}

/// Lifecycle of a playhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayheadState {
    Running,
    /// Reached `end`, a hat, the end of the program, or a return at depth zero.
    Finished,
    /// Halted by a runtime error.
    Errored,
    /// Halted by `stopscripts`, `delete` or its entity going away.
    Stopped,
}

/// A cooperative execution context.
#[derive(Debug, Clone, PartialEq)]
pub struct Playhead {
    pub(crate) frames: Vec<Frame>,
    pub(crate) wait: u64,
    pub(crate) state: PlayheadState,
    /// Spawned by a `trap` hat. Its own errors are reported but not trapped.
    pub(crate) trapped: bool,
}

impl Playhead {
    /// A running playhead whose first instruction is `pc`.
    pub fn new(pc: usize) -> Self {
        Self {
            frames: vec![Frame::new(pc)],
            wait: 0,
            state: PlayheadState::Running,
            trapped: false,
        }
    }

    /// Bind a local in the base frame before the playhead starts.
    pub fn with_local(mut self, name: &str, value: Value) -> Self {
        self.frames[0].locals.insert(name.to_string(), value);
        self
    }

    pub(crate) fn for_trap(mut self) -> Self {
        self.trapped = true;
        self
    }

    pub fn state(&self) -> PlayheadState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PlayheadState::Running
    }

    /// Remaining frames to wait before the next instruction.
    pub fn wait(&self) -> u64 {
        self.wait
    }

    /// Call depth; zero outside any function.
    pub fn depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    /// Program counter of the innermost frame.
    pub fn pc(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.pc)
    }

    /// Program counters from the base frame outward.
    pub fn pc_stack(&self) -> Vec<usize> {
        self.frames.iter().map(|frame| frame.pc).collect()
    }

    /// Look up a local in the innermost frame, then the base frame.
    pub fn local(&self, name: &str) -> Option<&Value> {
        let current = self.frames.last()?;
        current
            .locals
            .get(name)
            .or_else(|| self.frames.first().and_then(|base| base.locals.get(name)))
    }

    pub(crate) fn advance(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.pc += 1;
        }
    }

    pub(crate) fn jump(&mut self, address: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.pc = address;
        }
    }

    pub(crate) fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Return from the innermost frame. Returning from the base frame
    /// finishes the playhead.
    pub(crate) fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        } else {
            self.state = PlayheadState::Finished;
        }
    }

    pub(crate) fn finish(&mut self) {
        self.state = PlayheadState::Finished;
    }

    pub(crate) fn fail(&mut self) {
        self.state = PlayheadState::Errored;
    }

    pub(crate) fn stop(&mut self) {
        if self.is_running() {
            self.state = PlayheadState::Stopped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_playhead_is_running_at_depth_zero() {
        let ph = Playhead::new(4);
        assert!(ph.is_running());
        assert_eq!(ph.pc(), 4);
        assert_eq!(ph.depth(), 0);
        assert_eq!(ph.wait(), 0);
    }

    #[test]
    fn frames_push_and_pop() {
        let mut ph = Playhead::new(1);
        ph.advance();
        ph.push_frame(Frame::new(10));
        assert_eq!(ph.depth(), 1);
        assert_eq!(ph.pc_stack(), vec![2, 10]);
        ph.jump(12);
        assert_eq!(ph.pc(), 12);
        ph.pop_frame();
        assert_eq!(ph.pc(), 2);
        assert!(ph.is_running());
        ph.pop_frame();
        assert_eq!(ph.state(), PlayheadState::Finished);
    }

    #[test]
    fn locals_fall_back_to_base_frame() {
        let mut ph = Playhead::new(0).with_local("_message_data", Value::Integer(7));
        let mut inner = Frame::new(5);
        inner.locals.insert("n".into(), Value::Integer(1));
        ph.push_frame(inner);
        assert_eq!(ph.local("n"), Some(&Value::Integer(1)));
        assert_eq!(ph.local("_message_data"), Some(&Value::Integer(7)));
        assert_eq!(ph.local("missing"), None);
    }

    #[test]
    fn stop_does_not_overwrite_terminal_state() {
        let mut ph = Playhead::new(0);
        ph.fail();
        ph.stop();
        assert_eq!(ph.state(), PlayheadState::Errored);
    }
}
