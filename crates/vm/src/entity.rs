//! Scene-tree entities.

use crate::system::ScriptSystem;
use patchlang_common::{EntityId, Program, Value};
use std::collections::HashMap;
use std::rc::Rc;

/// Attributes every new entity starts with.
pub fn default_attributes() -> Vec<(&'static str, Value)> {
    let zero = || Value::Integer(0);
    vec![
        ("_x", zero()),
        ("_y", zero()),
        ("_global_x", zero()),
        ("_global_y", zero()),
        ("_rotation", zero()),
        ("_fliph", zero()),
        ("_flipv", zero()),
        ("_sprite", Value::Integer(-1)),
        ("_width", zero()),
        ("_height", zero()),
        ("_draw_r", zero()),
        ("_draw_g", zero()),
        ("_draw_b", zero()),
        ("_draw_a", Value::Integer(-1)),
        ("_draw_stroke", zero()),
        ("_draw_centered", Value::Integer(1)),
        ("_draw_font", Value::from("default")),
        ("_draw_antialiased", zero()),
        ("_ignore_pause", zero()),
        ("_hide_errors", zero()),
        ("_transform_children", zero()),
    ]
}

/// A node of the scene tree: one script, its attributes and its playheads.
#[derive(Debug)]
pub struct Entity {
    pub id: EntityId,
    /// Name of the script the entity runs.
    pub script: String,
    pub parent: Option<EntityId>,
    /// Children in layer order, back to front.
    pub children: Vec<EntityId>,
    pub attributes: HashMap<String, Value>,
    pub(crate) scripts: ScriptSystem,
    pub(crate) dead: bool,
}

impl Entity {
    /// Build an entity and spawn its `start` playheads.
    ///
    /// Attributes are layered: defaults, `_self`, one per label, then
    /// `supplied` in order, each overriding the last.
    pub fn new(
        id: EntityId,
        program: Rc<Program>,
        parent: Option<EntityId>,
        supplied: Vec<(String, Value)>,
    ) -> Self {
        let mut attributes: HashMap<String, Value> = default_attributes()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        if parent.is_none() {
            attributes.insert("_ignore_pause".into(), Value::Integer(1));
        }
        attributes.insert("_self".into(), Value::Reference(id));
        for (label, address) in program.labels() {
            attributes.insert(label.clone(), Value::Integer(*address as i64));
        }
        attributes.extend(supplied);

        Self {
            id,
            script: program.name.clone(),
            parent,
            children: Vec::new(),
            attributes,
            scripts: ScriptSystem::new(program),
            dead: false,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    fn flag(&self, name: &str) -> bool {
        self.attributes.get(name).is_some_and(Value::is_truthy)
    }

    /// Keeps ticking while the world is paused.
    pub fn ignores_pause(&self) -> bool {
        self.flag("_ignore_pause")
    }

    /// Errors are reported quietly.
    pub fn hides_errors(&self) -> bool {
        self.flag("_hide_errors")
    }

    /// The entity's script system.
    pub fn scripts(&self) -> &ScriptSystem {
        &self.scripts
    }
}
