//! Three-tier variable scoping.
//!
//! A name resolves through an ordered chain: the playhead's innermost
//! frame, its base frame, the entity's attributes, then the globals.
//! Writes take the first tier that already binds the name and otherwise
//! create a local in the innermost frame. `_return` always lives in the
//! base frame, so a caller at any depth can read what a callee returned.
//! Compiler temporaries never write through from a call to the base frame.

use crate::error::RuntimeError;
use crate::playhead::Frame;
use patchlang_common::{is_temporary, StaticTable, Token, Value};
use std::collections::HashMap;

/// Name of the reserved return slot.
pub const RETURN: &str = "_return";

/// A borrowed view of every scope visible to one playhead.
pub struct ScopeChain<'a> {
    frames: &'a mut [Frame],
    attributes: Option<&'a mut HashMap<String, Value>>,
    globals: &'a mut HashMap<String, Value>,
    statics: &'a StaticTable,
}

impl<'a> ScopeChain<'a> {
    pub fn new(
        frames: &'a mut [Frame],
        attributes: Option<&'a mut HashMap<String, Value>>,
        globals: &'a mut HashMap<String, Value>,
        statics: &'a StaticTable,
    ) -> Self {
        Self {
            frames,
            attributes,
            globals,
            statics,
        }
    }

    /// The value bound to `name` in the first tier that has it.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let current = self.frames.last().and_then(|f| f.locals.get(name));
        let base = || self.frames.first().and_then(|f| f.locals.get(name));
        let attribute = || self.attributes.as_ref().and_then(|a| a.get(name));
        current
            .or_else(base)
            .or_else(attribute)
            .or_else(|| self.globals.get(name))
    }

    /// Like [`get`](Self::get), but an unbound name is an error.
    pub fn lookup(&self, name: &str) -> Result<Value, RuntimeError> {
        self.get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedVariable {
                name: name.to_string(),
            })
    }

    /// Resolve an operand token to a value. Statics bypass scoping.
    pub fn resolve(&self, token: &Token) -> Result<Value, RuntimeError> {
        match token {
            Token::Literal(value) => Ok(value.clone()),
            Token::Static(index) => self
                .statics
                .get(*index)
                .map(Value::from)
                .ok_or_else(|| RuntimeError::UndefinedVariable {
                    name: token.to_string(),
                }),
            Token::Array(items) => items
                .iter()
                .map(|item| self.resolve(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Token::Name(name) => self.lookup(name),
            Token::Assign { .. } => Err(RuntimeError::MalformedCall {
                arg: token.to_string(),
            }),
            Token::Op(op) => Err(RuntimeError::UndefinedVariable {
                name: op.symbol().to_string(),
            }),
        }
    }

    /// Scoped write: update the first tier that binds `name`, or create a
    /// local in the innermost frame.
    pub fn set(&mut self, name: &str, value: Value) {
        if name != RETURN {
            if let Some(slot) = self.local_slot(name) {
                *slot = value;
                return;
            }
            if let Some(slot) = self
                .attributes
                .as_deref_mut()
                .and_then(|attributes| attributes.get_mut(name))
            {
                *slot = value;
                return;
            }
            if let Some(slot) = self.globals.get_mut(name) {
                *slot = value;
                return;
            }
        }
        self.bind(name, value);
    }

    /// Local write: update an existing local or create one, never
    /// touching attributes or globals.
    pub fn set_local(&mut self, name: &str, value: Value) {
        if name != RETURN {
            if let Some(slot) = self.local_slot(name) {
                *slot = value;
                return;
            }
        }
        self.bind(name, value);
    }

    /// Bind directly in the innermost frame (`_return` in the base frame).
    pub fn bind(&mut self, name: &str, value: Value) {
        let frame = if name == RETURN {
            self.frames.first_mut()
        } else {
            self.frames.last_mut()
        };
        if let Some(frame) = frame {
            frame.locals.insert(name.to_string(), value);
        }
    }

    /// Inside a call, compiler temporaries bind only in the innermost frame.
    fn local_slot(&mut self, name: &str) -> Option<&mut Value> {
        let (base, rest) = self.frames.split_first_mut()?;
        if let Some(current) = rest.last_mut() {
            if current.locals.contains_key(name) || is_temporary(name) {
                return current.locals.get_mut(name);
            }
        }
        base.locals.get_mut(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        frames: Vec<Frame>,
        attributes: HashMap<String, Value>,
        globals: HashMap<String, Value>,
        statics: StaticTable,
    }

    impl Fixture {
        fn new(depth: usize) -> Self {
            Self {
                frames: (0..=depth).map(|i| Frame::new(i * 10)).collect(),
                attributes: HashMap::new(),
                globals: HashMap::new(),
                statics: StaticTable::new(),
            }
        }

        fn chain(&mut self) -> ScopeChain<'_> {
            ScopeChain::new(
                &mut self.frames,
                Some(&mut self.attributes),
                &mut self.globals,
                &self.statics,
            )
        }
    }

    #[test]
    fn local_shadows_attribute_and_global() {
        let mut fx = Fixture::new(0);
        fx.frames[0].locals.insert("hp".into(), Value::Integer(1));
        fx.attributes.insert("hp".into(), Value::Integer(2));
        fx.globals.insert("hp".into(), Value::Integer(3));

        let mut chain = fx.chain();
        assert_eq!(chain.lookup("hp").unwrap(), Value::Integer(1));
        chain.set("hp", Value::Integer(10));
        assert_eq!(chain.lookup("hp").unwrap(), Value::Integer(10));

        assert_eq!(fx.attributes["hp"], Value::Integer(2));
        assert_eq!(fx.globals["hp"], Value::Integer(3));
    }

    #[test]
    fn writes_reach_attributes_then_globals() {
        let mut fx = Fixture::new(0);
        fx.attributes.insert("_x".into(), Value::Integer(0));
        fx.globals.insert("score".into(), Value::Integer(0));

        let mut chain = fx.chain();
        chain.set("_x", Value::Integer(5));
        chain.set("score", Value::Integer(7));
        chain.set("fresh", Value::Integer(1));

        assert_eq!(fx.attributes["_x"], Value::Integer(5));
        assert_eq!(fx.globals["score"], Value::Integer(7));
        assert_eq!(fx.frames[0].locals["fresh"], Value::Integer(1));
    }

    #[test]
    fn set_local_never_touches_outer_tiers() {
        let mut fx = Fixture::new(0);
        fx.attributes.insert("speed".into(), Value::Integer(1));
        fx.chain().set_local("speed", Value::Integer(9));
        assert_eq!(fx.attributes["speed"], Value::Integer(1));
        assert_eq!(fx.frames[0].locals["speed"], Value::Integer(9));
    }

    #[test]
    fn new_locals_go_to_the_innermost_frame() {
        let mut fx = Fixture::new(2);
        fx.chain().set("tmp", Value::Integer(4));
        assert!(fx.frames[2].locals.contains_key("tmp"));
        assert!(!fx.frames[0].locals.contains_key("tmp"));
    }

    #[test]
    fn base_frame_is_visible_from_calls() {
        let mut fx = Fixture::new(2);
        fx.frames[0].locals.insert("_message_data".into(), Value::Integer(3));
        fx.frames[1].locals.insert("hidden".into(), Value::Integer(1));
        let mut chain = fx.chain();
        assert_eq!(chain.lookup("_message_data").unwrap(), Value::Integer(3));
        assert!(chain.lookup("hidden").is_err());
        chain.set("_message_data", Value::Integer(4));
        assert_eq!(fx.frames[0].locals["_message_data"], Value::Integer(4));
    }

    #[test]
    fn temporaries_stay_in_the_call_frame() {
        let mut fx = Fixture::new(1);
        fx.frames[0].locals.insert("_t0_".into(), Value::Integer(11));
        fx.frames[0].locals.insert("_r0__main_".into(), Value::Integer(2));
        let mut chain = fx.chain();
        chain.set("_t0_", Value::Integer(5));
        chain.set_local("_r0__main_", Value::Integer(3));
        assert_eq!(fx.frames[0].locals["_t0_"], Value::Integer(11));
        assert_eq!(fx.frames[0].locals["_r0__main_"], Value::Integer(2));
        assert_eq!(fx.frames[1].locals["_t0_"], Value::Integer(5));
        assert_eq!(fx.frames[1].locals["_r0__main_"], Value::Integer(3));
    }

    #[test]
    fn return_slot_is_the_base_frame() {
        let mut fx = Fixture::new(1);
        fx.globals.insert(RETURN.into(), Value::Integer(0));
        fx.chain().set(RETURN, Value::Integer(42));
        assert_eq!(fx.frames[0].locals[RETURN], Value::Integer(42));
        assert!(!fx.frames[1].locals.contains_key(RETURN));
        assert_eq!(fx.globals[RETURN], Value::Integer(0));
    }

    #[test]
    fn resolve_tokens() {
        let mut fx = Fixture::new(0);
        let index = fx.statics.intern("Hello World");
        fx.globals.insert("n".into(), Value::Integer(2));
        let chain = fx.chain();

        assert_eq!(
            chain.resolve(&Token::Static(index)).unwrap(),
            Value::from("Hello World")
        );
        assert_eq!(
            chain.resolve(&Token::value("[1,n,\"a\"]")).unwrap(),
            Value::List(vec![Value::Integer(1), Value::Integer(2), Value::from("a")])
        );
        assert_eq!(
            chain.resolve(&Token::Name("ghost".into())),
            Err(RuntimeError::UndefinedVariable {
                name: "ghost".into()
            })
        );
        assert!(matches!(
            chain.resolve(&Token::operand("a=1")),
            Err(RuntimeError::MalformedCall { .. })
        ));
    }
}
