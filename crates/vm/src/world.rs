//! The world: scene tree, shared tables and the frame loop.
//!
//! [`WorldState`] is everything a playhead may touch. [`World`] pairs it
//! with a [`Stage`] and drives ticks: every entity depth first, then the
//! respond pass that delivers this frame's messages, then reaping.

use crate::config::RuntimeConfig;
use crate::entity::Entity;
use crate::error::RuntimeError;
use crate::report::{ErrorReport, Reporter};
use crate::stage::{ConsoleStage, Stage};
use log::debug;
use patchlang_common::{EntityId, Value};
use patchlang_compiler::{LoadError, ProgramStore, ScriptSource};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};

/// A queued broadcast or unicast.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub text: String,
    pub payload: Value,
    /// `None` for broadcasts.
    pub target: Option<EntityId>,
}

/// Globals every world starts with.
pub fn default_globals() -> HashMap<String, Value> {
    [
        ("_sfx_vol", Value::Integer(100)),
        ("_music_vol", Value::Integer(100)),
        ("_music", Value::from("silence")),
        ("_paused", Value::Integer(0)),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect()
}

/// Shared state visible to running scripts.
pub struct WorldState {
    pub(crate) config: RuntimeConfig,
    pub(crate) programs: ProgramStore,
    pub(crate) entities: BTreeMap<EntityId, Entity>,
    pub(crate) globals: HashMap<String, Value>,
    pub(crate) messages: Vec<Message>,
    pub(crate) root: Option<EntityId>,
    pub(crate) rng: StdRng,
    /// Set by `stopall`.
    pub(crate) finished: bool,
    /// A load error raised mid-tick, handed back by [`World::tick`].
    pub(crate) fatal: Option<LoadError>,
    pub(crate) reporter: Reporter,
    next_id: u64,
    frame: u64,
}

impl WorldState {
    fn new(programs: ProgramStore, config: RuntimeConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            programs,
            entities: BTreeMap::new(),
            globals: default_globals(),
            messages: Vec::new(),
            root: None,
            rng,
            finished: false,
            fatal: None,
            reporter: Reporter::new(),
            next_id: 0,
            frame: 0,
        }
    }

    /// Look up a live entity.
    pub fn resolve_entity(&self, id: EntityId) -> Result<&Entity, RuntimeError> {
        self.entities
            .get(&id)
            .filter(|entity| !entity.is_dead())
            .ok_or(RuntimeError::EntityNotFound { id })
    }

    pub(crate) fn is_live(&self, id: EntityId) -> bool {
        self.resolve_entity(id).is_ok()
    }

    fn paused(&self) -> bool {
        self.globals.get("_paused").is_some_and(Value::is_truthy)
    }

    /// Compile (or reuse) `script` and create an entity running it.
    pub(crate) fn spawn(
        &mut self,
        script: &str,
        parent: Option<EntityId>,
        attributes: Vec<(String, Value)>,
    ) -> Result<EntityId, LoadError> {
        let program = self.programs.get_or_compile(script)?;
        let id = EntityId(self.next_id);
        self.next_id += 1;

        let entity = Entity::new(id, program, parent, attributes);
        debug!(
            "spawned entity {id} running '{}' with {} playhead(s)",
            entity.script,
            entity.scripts().len()
        );
        self.entities.insert(id, entity);
        if let Some(parent) = parent.and_then(|p| self.entities.get_mut(&p)) {
            parent.children.push(id);
        }
        Ok(id)
    }

    /// Mark `id` and its subtree dead and stop their playheads. Returns
    /// the entities newly marked.
    pub(crate) fn mark_dead(&mut self, id: EntityId) -> Vec<EntityId> {
        let mut doomed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(entity) = self.entities.get_mut(&next) else {
                continue;
            };
            if entity.dead {
                continue;
            }
            entity.dead = true;
            entity.scripts.stop_all();
            stack.extend(entity.children.iter().copied());
            doomed.push(next);
        }
        doomed
    }

    /// True if `ancestor` is on the parent chain of `id`.
    pub(crate) fn is_ancestor(&self, ancestor: EntityId, id: EntityId) -> bool {
        let mut cursor = self.entities.get(&id).and_then(|e| e.parent);
        while let Some(next) = cursor {
            if next == ancestor {
                return true;
            }
            cursor = self.entities.get(&next).and_then(|e| e.parent);
        }
        false
    }

    /// Move `child` to the front layer of `parent`.
    pub(crate) fn reparent(&mut self, child: EntityId, parent: EntityId) {
        let old = self.entities.get(&child).and_then(|e| e.parent);
        if let Some(old) = old.and_then(|p| self.entities.get_mut(&p)) {
            old.children.retain(|c| *c != child);
        }
        if let Some(entity) = self.entities.get_mut(&parent) {
            entity.children.push(child);
        }
        if let Some(entity) = self.entities.get_mut(&child) {
            entity.parent = Some(parent);
        }
    }

    /// Live entities in tree order: depth first, parents before children,
    /// children back to front.
    pub fn preorder(&self) -> Vec<EntityId> {
        let mut order = Vec::new();
        let mut stack: Vec<EntityId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            let Some(entity) = self.entities.get(&id) else {
                continue;
            };
            if entity.dead {
                continue;
            }
            order.push(id);
            stack.extend(entity.children.iter().rev());
        }
        order
    }

    fn reap(&mut self) {
        let dead: Vec<EntityId> = self
            .entities
            .values()
            .filter(|entity| entity.dead)
            .map(|entity| entity.id)
            .collect();
        for id in dead {
            if let Some(entity) = self.entities.remove(&id) {
                debug!("reaped entity {id}");
                if let Some(parent) = entity.parent.and_then(|p| self.entities.get_mut(&p)) {
                    parent.children.retain(|c| *c != id);
                }
            }
        }
    }
}

/// A running world and the stage it presents to.
pub struct World<S: Stage = ConsoleStage> {
    state: WorldState,
    stage: S,
}

impl World {
    /// A headless world reading scripts from `source`.
    pub fn new(source: impl ScriptSource + 'static, config: RuntimeConfig) -> Self {
        World::with_stage(source, config, ConsoleStage)
    }
}

impl<S: Stage> World<S> {
    pub fn with_stage(source: impl ScriptSource + 'static, config: RuntimeConfig, stage: S) -> Self {
        Self {
            state: WorldState::new(ProgramStore::new(source), config),
            stage,
        }
    }

    // ---- Entities ----

    /// Create the scene root from `script`.
    ///
    /// # Errors
    ///
    /// Returns the [`LoadError`] if the script does not compile. The error
    /// is also recorded in [`errors`](Self::errors).
    pub fn spawn_root(&mut self, script: &str) -> Result<EntityId, LoadError> {
        match self.state.spawn(script, None, Vec::new()) {
            Ok(id) => {
                self.state.root = Some(id);
                Ok(id)
            }
            Err(err) => {
                self.state.reporter.report(ErrorReport::load(&err, None), false);
                Err(err)
            }
        }
    }

    /// Create an entity under `parent`, as the `instance` command does.
    pub fn instance(
        &mut self,
        script: &str,
        parent: EntityId,
        attributes: Vec<(String, Value)>,
    ) -> Result<EntityId, RuntimeError> {
        self.state.resolve_entity(parent)?;
        match self.state.spawn(script, Some(parent), attributes) {
            Ok(id) => Ok(id),
            Err(err) => {
                self.state
                    .reporter
                    .report(ErrorReport::load(&err, Some(parent)), false);
                Err(err.into())
            }
        }
    }

    pub fn root(&self) -> Option<EntityId> {
        self.state.root
    }

    pub fn entity(&self, id: EntityId) -> Result<&Entity, RuntimeError> {
        self.state.resolve_entity(id)
    }

    /// Number of entities in the tree, including any awaiting reaping.
    pub fn entity_count(&self) -> usize {
        self.state.entities.len()
    }

    pub fn preorder(&self) -> Vec<EntityId> {
        self.state.preorder()
    }

    pub fn attribute(&self, id: EntityId, name: &str) -> Option<&Value> {
        self.state.resolve_entity(id).ok()?.attribute(name)
    }

    pub fn set_attribute(
        &mut self,
        id: EntityId,
        name: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        self.state.resolve_entity(id)?;
        if let Some(entity) = self.state.entities.get_mut(&id) {
            entity.attributes.insert(name.to_string(), value);
        }
        Ok(())
    }

    // ---- Globals and messages ----

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.state.globals.get(name)
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.state.globals.insert(name.to_string(), value);
    }

    /// Queue a message for every entity. Delivered in the next respond pass.
    pub fn broadcast(&mut self, text: &str, payload: Value) {
        self.state.messages.push(Message {
            text: text.to_string(),
            payload,
            target: None,
        });
    }

    /// Queue a message for one entity. Delivered in the next respond pass.
    pub fn unicast(&mut self, target: EntityId, text: &str, payload: Value) {
        self.state.messages.push(Message {
            text: text.to_string(),
            payload,
            target: Some(target),
        });
    }

    // ---- Frame loop ----

    /// Advance the world by one frame.
    ///
    /// # Errors
    ///
    /// Returns the [`LoadError`] of a script that failed to compile during
    /// the frame. The world is finished afterwards.
    pub fn tick(&mut self) -> Result<(), LoadError> {
        if self.state.finished {
            return Ok(());
        }
        if let Some(root) = self.state.root {
            self.tick_subtree(root);
        }
        if let Some(err) = self.state.fatal.take() {
            self.state.finished = true;
            return Err(err);
        }
        self.respond();
        self.state.reap();
        self.state.frame += 1;
        Ok(())
    }

    /// Tick until `stopall` or `max_frames` frames. Returns the number of
    /// frames run.
    pub fn run(&mut self, max_frames: u64) -> Result<u64, LoadError> {
        let start = self.state.frame;
        while !self.state.finished && self.state.frame - start < max_frames {
            self.tick()?;
        }
        Ok(self.state.frame - start)
    }

    fn tick_subtree(&mut self, id: EntityId) {
        match self.state.entities.get(&id) {
            Some(entity) if !entity.dead => {
                if self.state.paused() && !entity.ignores_pause() {
                    return;
                }
            }
            _ => return,
        }
        self.tick_entity(id);

        // Children are re-read each step so entities created this frame
        // also tick this frame.
        let mut i = 0;
        loop {
            if self.state.fatal.is_some() || self.state.finished {
                return;
            }
            let child = match self.state.entities.get(&id).and_then(|e| e.children.get(i)) {
                Some(child) => *child,
                None => return,
            };
            self.tick_subtree(child);
            i += 1;
        }
    }

    fn tick_entity(&mut self, id: EntityId) {
        let Some(entity) = self.state.entities.get_mut(&id) else {
            return;
        };
        let mut scripts = std::mem::take(&mut entity.scripts);
        scripts.tick(&mut self.state, &mut self.stage, id);
        if let Some(entity) = self.state.entities.get_mut(&id) {
            entity.scripts = scripts;
        }
    }

    fn respond(&mut self) {
        let messages = std::mem::take(&mut self.state.messages);
        if messages.is_empty() {
            return;
        }
        let order = self.state.preorder();
        for message in &messages {
            for id in &order {
                if message.target.is_some_and(|target| target != *id) {
                    continue;
                }
                let Some(entity) = self.state.entities.get_mut(id) else {
                    continue;
                };
                let spawned = entity.scripts.respond(&message.text, &message.payload);
                if spawned > 0 {
                    debug!("entity {id}: '{}' spawned {spawned} playhead(s)", message.text);
                }
            }
        }
    }

    // ---- Inspection ----

    pub fn is_finished(&self) -> bool {
        self.state.finished
    }

    /// Every error reported so far, oldest first.
    pub fn errors(&self) -> &[ErrorReport] {
        self.state.reporter.reports()
    }

    /// Frames completed.
    pub fn frame(&self) -> u64 {
        self.state.frame
    }

    pub fn programs(&self) -> &ProgramStore {
        &self.state.programs
    }

    pub fn programs_mut(&mut self) -> &mut ProgramStore {
        &mut self.state.programs
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut S {
        &mut self.stage
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::RecordingStage;
    use patchlang_compiler::MemorySource;

    fn world(scripts: &[(&str, &str)]) -> World<RecordingStage> {
        let source = scripts
            .iter()
            .fold(MemorySource::new(), |source, (name, text)| source.with(name, text));
        World::with_stage(source, RuntimeConfig::default(), RecordingStage::new())
    }

    #[test]
    fn default_globals_are_set() {
        let w = world(&[]);
        assert_eq!(w.global("_sfx_vol"), Some(&Value::Integer(100)));
        assert_eq!(w.global("_music"), Some(&Value::from("silence")));
        assert_eq!(w.global("_paused"), Some(&Value::Integer(0)));
    }

    #[test]
    fn tree_order_and_reaping() {
        let mut w = world(&[("root", "start\nend\n"), ("leaf", "start\nwait 1\nend\n")]);
        let root = w.spawn_root("root").unwrap();
        let a = w.instance("leaf", root, vec![]).unwrap();
        let b = w.instance("leaf", root, vec![]).unwrap();
        let c = w.instance("leaf", a, vec![]).unwrap();
        assert_eq!(w.preorder(), vec![root, a, c, b]);

        let doomed = w.state.mark_dead(a);
        assert_eq!(doomed.len(), 2);
        assert!(w.entity(c).is_err());
        w.tick().unwrap();
        assert_eq!(w.preorder(), vec![root, b]);
        assert_eq!(w.entity_count(), 2);
    }

    #[test]
    fn ancestry_and_reparenting() {
        let mut w = world(&[("root", "start\nend\n"), ("leaf", "start\nend\n")]);
        let root = w.spawn_root("root").unwrap();
        let a = w.instance("leaf", root, vec![]).unwrap();
        let b = w.instance("leaf", a, vec![]).unwrap();
        assert!(w.state.is_ancestor(root, b));
        assert!(w.state.is_ancestor(a, b));
        assert!(!w.state.is_ancestor(b, a));

        w.state.reparent(b, root);
        assert_eq!(w.entity(root).unwrap().children, vec![a, b]);
        assert!(w.entity(a).unwrap().children.is_empty());
        assert_eq!(w.entity(b).unwrap().parent, Some(root));
    }

    #[test]
    fn missing_root_script_is_reported() {
        let mut w = world(&[]);
        assert!(w.spawn_root("nothing").is_err());
        assert_eq!(w.errors().len(), 1);
        assert_eq!(w.root(), None);
    }

    #[test]
    fn instance_under_unknown_parent_fails() {
        let mut w = world(&[("root", "start\nend\n")]);
        w.spawn_root("root").unwrap();
        assert_eq!(
            w.instance("root", EntityId(42), vec![]),
            Err(RuntimeError::EntityNotFound { id: EntityId(42) })
        );
    }

    #[test]
    fn run_stops_at_frame_limit() {
        let mut w = world(&[("root", "start\nloop\nwait 1\nendloop\n")]);
        w.spawn_root("root").unwrap();
        assert_eq!(w.run(5), Ok(5));
        assert_eq!(w.frame(), 5);
        assert!(!w.is_finished());
    }
}
