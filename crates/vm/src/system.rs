//! Per-entity script system: hats, functions and the playhead set.

use crate::error::RuntimeError;
use crate::execute::Exec;
use crate::playhead::Playhead;
use crate::report::ErrorReport;
use crate::stage::Stage;
use crate::world::WorldState;
use log::debug;
use patchlang_common::{EntityId, FunctionDef, Program, Value};
use std::collections::HashMap;
use std::rc::Rc;

/// Owns one entity's compiled program, its function table and its
/// running playheads.
#[derive(Debug, Default)]
pub struct ScriptSystem {
    program: Option<Rc<Program>>,
    functions: HashMap<String, FunctionDef>,
    playheads: Vec<Playhead>,
}

impl ScriptSystem {
    /// Index the program and spawn one playhead per `start` hat.
    pub fn new(program: Rc<Program>) -> Self {
        let functions = program
            .functions()
            .iter()
            .map(|function| (function.name.clone(), function.clone()))
            .collect();
        let playheads = program
            .start_hats()
            .map(|hat| Playhead::new(hat + 1))
            .collect();
        Self {
            program: Some(program),
            functions,
            playheads,
        }
    }

    pub fn program(&self) -> Option<&Rc<Program>> {
        self.program.as_ref()
    }

    pub fn playheads(&self) -> &[Playhead] {
        &self.playheads
    }

    /// Number of live playheads.
    pub fn len(&self) -> usize {
        self.playheads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playheads.is_empty()
    }

    /// Spawn a playhead for every `receive` hat matching `message`,
    /// ignoring case. Returns how many were spawned.
    pub fn respond(&mut self, message: &str, payload: &Value) -> usize {
        let Some(program) = &self.program else {
            return 0;
        };
        let before = self.playheads.len();
        for hat in program.receive_hats(message) {
            self.playheads
                .push(Playhead::new(hat + 1).with_local("_message_data", payload.clone()));
        }
        self.playheads.len() - before
    }

    /// Spawn a playhead for every `trap` hat, with `_error_type` bound to
    /// `label`. Returns how many were spawned.
    pub fn trap(&mut self, label: &str) -> usize {
        let Some(program) = &self.program else {
            return 0;
        };
        let before = self.playheads.len();
        for hat in program.trap_hats() {
            self.playheads.push(
                Playhead::new(hat + 1)
                    .with_local("_error_type", Value::from(label))
                    .for_trap(),
            );
        }
        self.playheads.len() - before
    }

    /// Stop every playhead.
    pub fn stop_all(&mut self) {
        self.playheads.iter_mut().for_each(Playhead::stop);
    }

    /// Advance every playhead once, in creation order.
    ///
    /// Playheads spawned during the pass run in the same pass. Terminated
    /// playheads are dropped only once the pass completes.
    pub(crate) fn tick(&mut self, state: &mut WorldState, stage: &mut dyn Stage, entity: EntityId) {
        let Some(program) = self.program.clone() else {
            return;
        };

        let mut i = 0;
        while i < self.playheads.len() {
            if !self.playheads[i].is_running() {
                i += 1;
                continue;
            }

            let mut exec = Exec::new(state, stage, entity, &program, &self.functions);
            let ph = &mut self.playheads[i];
            let result = exec.run(ph);
            let fault = exec.fault();
            let effects = exec.into_effects();

            if let Err(err) = result {
                ph.fail();
                let trapped = ph.trapped;
                let mut pc_stack = ph.pc_stack();
                if let Some(top) = pc_stack.last_mut() {
                    *top = fault;
                }
                let code = program
                    .get(fault)
                    .map(ToString::to_string)
                    .unwrap_or_default();
                let report = ErrorReport::runtime(&err, entity, &program.name, pc_stack, code);
                let hidden = state
                    .entities
                    .get(&entity)
                    .is_some_and(|e| e.hides_errors());
                state.reporter.report(report, hidden);

                match err {
                    RuntimeError::Load(load) => state.fatal = Some(load),
                    other if !trapped => {
                        let spawned = self.trap(other.label());
                        if spawned > 0 {
                            debug!("entity {entity}: trapped {}", other.label());
                        }
                    }
                    _ => {}
                }
            }

            if effects.halt_all {
                self.stop_all();
                break;
            }
            if effects.stop_others {
                for (j, other) in self.playheads.iter_mut().enumerate() {
                    if j != i {
                        other.stop();
                    }
                }
            }
            self.playheads
                .extend(effects.forks.into_iter().map(Playhead::new));
            if state.fatal.is_some() || state.finished {
                break;
            }
            i += 1;
        }

        self.playheads.retain(Playhead::is_running);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchlang_compiler::{MemorySource, ProgramStore};

    fn system(text: &str) -> ScriptSystem {
        let mut store = ProgramStore::new(MemorySource::new());
        ScriptSystem::new(store.compile_text("s", text).unwrap())
    }

    #[test]
    fn respond_matches_case_insensitively() {
        let mut scripts = system("receive \"Go Left\"\nend\nreceive \"other\"\nend\n");
        assert!(scripts.is_empty());
        assert_eq!(scripts.respond("GO LEFT", &Value::Integer(2)), 1);
        assert_eq!(scripts.respond("nothing", &Value::Integer(0)), 0);
        let ph = &scripts.playheads()[0];
        assert_eq!(ph.pc(), 1);
        assert_eq!(ph.local("_message_data"), Some(&Value::Integer(2)));
    }

    #[test]
    fn trap_binds_error_type() {
        let mut scripts = system("start\nend\ntrap\nend\n");
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts.trap("division_by_zero"), 1);
        let ph = &scripts.playheads()[1];
        assert!(ph.trapped);
        assert_eq!(ph.local("_error_type"), Some(&Value::from("division_by_zero")));
    }

    #[test]
    fn stop_all_halts_everything() {
        let mut scripts = system("start\nwait 1\nend\nstart\nwait 1\nend\n");
        scripts.stop_all();
        assert!(scripts.playheads().iter().all(|ph| !ph.is_running()));
    }

    #[test]
    fn default_system_is_inert() {
        let mut scripts = ScriptSystem::default();
        assert_eq!(scripts.respond("go", &Value::Integer(0)), 0);
        assert_eq!(scripts.trap("x"), 0);
        assert!(scripts.program().is_none());
    }
}
