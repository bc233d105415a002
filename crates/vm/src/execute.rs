//! Instruction dispatch for one playhead.
//!
//! [`Exec`] borrows the world for the duration of one playhead's turn.
//! Effects that belong to the script system rather than the playhead
//! (forks, `stopscripts`, self-deletion) are collected in [`Effects`] and
//! applied by the caller once the turn ends.

use crate::error::RuntimeError;
use crate::eval;
use crate::playhead::{Frame, Playhead};
use crate::scope::{ScopeChain, RETURN};
use crate::stage::{Operand, Stage};
use crate::world::{Message, WorldState};
use log::debug;
use patchlang_common::{
    EntityId, FunctionDef, Instruction, JumpTarget, Opcode, Operator, Program, Token, Value,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Side effects on the owning script system.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    /// Addresses to start new playheads at.
    pub forks: Vec<usize>,
    /// `stopscripts`: halt every other playhead of the entity.
    pub stop_others: bool,
    /// The entity deleted itself: halt all of its playheads.
    pub halt_all: bool,
}

pub(crate) struct Exec<'w> {
    state: &'w mut WorldState,
    stage: &'w mut dyn Stage,
    entity: EntityId,
    program: &'w Program,
    functions: &'w HashMap<String, FunctionDef>,
    effects: Effects,
    /// Address of the instruction being executed.
    fault: usize,
}

impl<'w> Exec<'w> {
    pub(crate) fn new(
        state: &'w mut WorldState,
        stage: &'w mut dyn Stage,
        entity: EntityId,
        program: &'w Program,
        functions: &'w HashMap<String, FunctionDef>,
    ) -> Self {
        Self {
            state,
            stage,
            entity,
            program,
            functions,
            effects: Effects::default(),
            fault: 0,
        }
    }

    /// Address of the last instruction fetched.
    pub(crate) fn fault(&self) -> usize {
        self.fault
    }

    pub(crate) fn into_effects(self) -> Effects {
        self.effects
    }

    /// Give `ph` its turn: count down a pending wait, then execute until
    /// the playhead waits again or stops.
    pub(crate) fn run(&mut self, ph: &mut Playhead) -> Result<(), RuntimeError> {
        if ph.wait > 0 {
            ph.wait -= 1;
            if ph.wait > 0 {
                return Ok(());
            }
        }

        let program = self.program;
        let limit = self.state.config.max_steps_per_tick;
        let mut steps = 0usize;
        while ph.is_running() && ph.wait == 0 && !self.state.finished {
            let pc = ph.pc();
            let Some(instr) = program.get(pc) else {
                ph.finish();
                break;
            };
            self.fault = pc;
            ph.advance();
            self.step(ph, instr)?;

            steps += 1;
            if steps >= limit && ph.is_running() && ph.wait == 0 {
                return Err(RuntimeError::StepBudgetExceeded { limit });
            }
        }
        Ok(())
    }

    fn step(&mut self, ph: &mut Playhead, instr: &Instruction) -> Result<(), RuntimeError> {
        match instr.opcode {
            // Hats and structure
            Opcode::Start | Opcode::Receive | Opcode::Trap => ph.finish(),
            Opcode::Label => {}
            Opcode::Def => {
                let address = self.address(ph, instr.target.as_ref())?;
                ph.jump(address);
            }

            // Control
            Opcode::Return => self.exec_return(ph, instr)?,
            Opcode::End => ph.finish(),
            Opcode::Jump => self.exec_jump(ph, instr)?,
            Opcode::Wait => {
                let frames = self.int(ph, arg(instr, 0)?)?;
                ph.wait = u64::try_from(frames).unwrap_or(0);
            }
            Opcode::Fork => {
                let value = self.resolve(ph, arg(instr, 0)?)?;
                let address = to_address(&value, arg(instr, 0)?)?;
                self.effects.forks.push(address);
            }
            Opcode::CallStack => {
                let stack = ph
                    .pc_stack()
                    .into_iter()
                    .map(|pc| Value::Integer(pc as i64))
                    .collect();
                self.store(ph, instr, 0, Value::List(stack))?;
            }
            Opcode::StopScripts => self.effects.stop_others = true,
            Opcode::StopAll => {
                debug!("entity {}: stopall", self.entity);
                self.state.finished = true;
            }
            Opcode::Call => self.exec_call(ph, instr)?,

            // Variables
            Opcode::SetVar => {
                let name = target(arg(instr, 0)?)?;
                let value = self.resolve(ph, arg(instr, 1)?)?;
                self.scope(ph).set_local(name, value);
            }
            Opcode::Set => self.exec_set(ph, instr)?,
            Opcode::Eval => {
                let name = target(arg(instr, 0)?)?;
                let value = self.evaluate(ph, &instr.args[1..])?;
                self.scope(ph).set(name, value);
            }
            Opcode::SetAttribute => self.exec_set_attribute(ph, instr)?,
            Opcode::GetAttribute => self.exec_get_attribute(ph, instr)?,
            Opcode::SetGlob => {
                let name = target(arg(instr, 0)?)?;
                let value = self.resolve(ph, arg(instr, 1)?)?;
                self.state.globals.insert(name.to_string(), value);
            }
            Opcode::GetGlob => {
                let name = target(arg(instr, 0)?)?;
                let value = self.state.globals.get(name).cloned().ok_or_else(|| {
                    RuntimeError::GlobalNotFound {
                        name: name.to_string(),
                    }
                })?;
                self.store(ph, instr, 1, value)?;
            }

            // Messaging
            Opcode::Broadcast => {
                let text = self.text(ph, arg(instr, 0)?)?;
                let payload = self.optional(ph, instr, 1)?;
                self.post(text, payload, None);
            }
            Opcode::Unicast => {
                let to = self.entity_arg(ph, arg(instr, 0)?)?;
                let text = self.text(ph, arg(instr, 1)?)?;
                let payload = self.optional(ph, instr, 2)?;
                self.post(text, payload, Some(to));
            }

            // Entities
            Opcode::Instance => self.exec_instance(ph, instr)?,
            Opcode::Delete => self.exec_delete(ph, instr)?,
            Opcode::Adopt => self.exec_adopt(ph, instr)?,
            Opcode::ChangeLayer => self.exec_change_layer(ph, instr)?,

            // Collections
            Opcode::Append => self.exec_append(ph, instr)?,
            Opcode::Remove => self.exec_remove(ph, instr)?,
            Opcode::Insert => self.exec_insert(ph, instr)?,
            Opcode::Count => {
                let list = self.resolve(ph, arg(instr, 0)?)?.into_list();
                let needle = self.resolve(ph, arg(instr, 1)?)?;
                let count = list.iter().filter(|item| **item == needle).count();
                self.store(ph, instr, 2, Value::Integer(count as i64))?;
            }
            Opcode::Copy => {
                let list = self.resolve(ph, arg(instr, 0)?)?.into_list();
                self.store(ph, instr, 1, Value::List(list))?;
            }
            Opcode::GetIndex => {
                let list = self.resolve(ph, arg(instr, 0)?)?.into_list();
                let index = checked_index(self.int(ph, arg(instr, 1)?)?, list.len())?;
                let item = list[index].clone();
                self.store(ph, instr, 2, item)?;
            }
            Opcode::SetIndex => self.exec_set_index(ph, instr)?,
            Opcode::Merge => {
                let name = target(arg(instr, 0)?)?;
                let mut merged = self.resolve(ph, arg(instr, 0)?)?.into_list();
                for token in &instr.args[1..] {
                    merged.extend(self.resolve(ph, token)?.into_list());
                }
                self.scope(ph).set(name, Value::List(merged));
            }
            Opcode::String => self.exec_string(ph, instr)?,

            // Maths and movement
            Opcode::Log => {
                let words = instr
                    .args
                    .iter()
                    .map(|token| self.operand(ph, token).map(|op| op.to_string()))
                    .collect::<Result<Vec<_>, _>>()?;
                self.stage.print(self.entity, &words.join(" "));
            }
            Opcode::Random => self.exec_random(ph, instr)?,
            Opcode::Angle => {
                let [x1, y1, x2, y2] = self.four_numbers(ph, instr)?;
                let degrees = heading(x2 - x1, y2 - y1);
                self.store(ph, instr, 4, Value::Float(degrees).normalized())?;
            }
            Opcode::Distance => {
                let [x1, y1, x2, y2] = self.four_numbers(ph, instr)?;
                let distance = (x2 - x1).hypot(y2 - y1);
                self.store(ph, instr, 4, Value::Float(distance).normalized())?;
            }
            Opcode::Move => {
                let direction = self.number(ph, arg(instr, 0)?)?.to_radians();
                let magnitude = self.number(ph, arg(instr, 1)?)?;
                self.translate(direction.cos() * magnitude, direction.sin() * magnitude)?;
            }
            Opcode::Translate => {
                let dx = self.number(ph, arg(instr, 0)?)?;
                let dy = self.number(ph, arg(instr, 1)?)?;
                self.translate(dx, dy)?;
            }
            Opcode::SetPosition => {
                let x = self.number(ph, arg(instr, 0)?)?;
                let y = self.number(ph, arg(instr, 1)?)?;
                let dx = x - self.attribute_number("_x")?;
                let dy = y - self.attribute_number("_y")?;
                self.set_own_attribute("_x", Value::Float(x).normalized());
                self.set_own_attribute("_y", Value::Float(y).normalized());
                self.shift_attribute("_global_x", dx)?;
                self.shift_attribute("_global_y", dy)?;
            }

            // Presentation
            Opcode::Draw
            | Opcode::Stamp
            | Opcode::SetSprite
            | Opcode::UpdateSprite
            | Opcode::ColorShift
            | Opcode::SetCollider
            | Opcode::Collide
            | Opcode::SetMask
            | Opcode::MaskCollide
            | Opcode::Load
            | Opcode::Save
            | Opcode::Unload
            | Opcode::Music
            | Opcode::Sound
            | Opcode::GetKey
            | Opcode::Configure => self.exec_stage(ph, instr)?,
        }
        Ok(())
    }

    // ---- Control ----

    fn exec_return(&mut self, ph: &mut Playhead, instr: &Instruction) -> Result<(), RuntimeError> {
        if let Some(token) = instr.args.first() {
            let value = self.resolve(ph, token)?;
            self.scope(ph).bind(RETURN, value);
        }
        ph.pop_frame();
        Ok(())
    }

    fn exec_jump(&mut self, ph: &mut Playhead, instr: &Instruction) -> Result<(), RuntimeError> {
        if !instr.args.is_empty() && !self.evaluate(ph, &instr.args)?.is_truthy() {
            return Ok(());
        }
        let address = self.address(ph, instr.target.as_ref())?;
        ph.jump(address);
        Ok(())
    }

    fn address(
        &mut self,
        ph: &mut Playhead,
        target: Option<&JumpTarget>,
    ) -> Result<usize, RuntimeError> {
        match target {
            Some(JumpTarget::Address(address)) => Ok(*address),
            Some(JumpTarget::Named(name)) => {
                let token = Token::Name(name.clone());
                let value = self.scope(ph).lookup(name)?;
                to_address(&value, &token)
            }
            Some(JumpTarget::Pending) | None => Err(RuntimeError::UnresolvedJump {
                target: "?".to_string(),
            }),
        }
    }

    fn exec_call(&mut self, ph: &mut Playhead, instr: &Instruction) -> Result<(), RuntimeError> {
        let functions = self.functions;
        let function = functions
            .get(&instr.name)
            .ok_or_else(|| RuntimeError::UnknownCommand {
                name: instr.name.clone(),
            })?;
        let limit = self.state.config.max_call_depth;
        if ph.depth() >= limit {
            return Err(RuntimeError::CallDepthExceeded { limit });
        }

        let mut supplied: Vec<(&str, Value)> = Vec::with_capacity(instr.args.len());
        for token in &instr.args {
            match token {
                Token::Assign { name, value } => {
                    supplied.push((name.as_str(), self.resolve(ph, value)?))
                }
                other => {
                    return Err(RuntimeError::MalformedCall {
                        arg: other.to_string(),
                    })
                }
            }
        }

        let mut frame = Frame::new(function.entry());
        for param in &function.params {
            let value = match supplied.iter().position(|(name, _)| *name == param.name) {
                Some(at) => supplied.remove(at).1,
                None => match &param.default {
                    Some(default) => self.resolve(ph, default)?,
                    None => Value::Integer(0),
                },
            };
            frame.locals.insert(param.local.clone(), value);
        }
        for (name, value) in supplied {
            frame
                .locals
                .insert(format!("{}_{}", function.name, name), value);
        }
        ph.push_frame(frame);
        Ok(())
    }

    // ---- Variables ----

    fn exec_set(&mut self, ph: &mut Playhead, instr: &Instruction) -> Result<(), RuntimeError> {
        let name = target(arg(instr, 0)?)?;
        let value = match modifier(arg(instr, 1)?) {
            Some(op) => {
                let current = self.scope(ph).lookup(name)?;
                self.modify(ph, instr, op, current, 2)?
            }
            None => self.resolve(ph, arg(instr, 1)?)?,
        };
        self.scope(ph).set(name, value);
        Ok(())
    }

    /// Apply an in-place modifier to `current`. `++` and `--` take no
    /// operand; the others read it from `args[at]`.
    fn modify(
        &mut self,
        ph: &mut Playhead,
        instr: &Instruction,
        op: Operator,
        current: Value,
        at: usize,
    ) -> Result<Value, RuntimeError> {
        let step = match arg(instr, at - 1)?.as_name() {
            Some("++" | "--") => Value::Integer(1),
            _ => self.resolve(ph, arg(instr, at)?)?,
        };
        eval::binary(op, current, step)
    }

    fn exec_set_attribute(
        &mut self,
        ph: &mut Playhead,
        instr: &Instruction,
    ) -> Result<(), RuntimeError> {
        let (owner, rest) = if instr.args.len() >= 3 {
            (self.entity_arg(ph, arg(instr, 0)?)?, 1)
        } else {
            (self.entity, 0)
        };
        let name = target(arg(instr, rest)?)?;
        let value = self.resolve(ph, arg(instr, rest + 1)?)?;
        if let Some(entity) = self.state.entities.get_mut(&owner) {
            entity.attributes.insert(name.to_string(), value);
        }
        Ok(())
    }

    fn exec_get_attribute(
        &mut self,
        ph: &mut Playhead,
        instr: &Instruction,
    ) -> Result<(), RuntimeError> {
        let owner = self.entity_arg(ph, arg(instr, 0)?)?;
        let name = target(arg(instr, 1)?)?;
        let value = self
            .state
            .entities
            .get(&owner)
            .and_then(|entity| entity.attributes.get(name))
            .cloned()
            .ok_or_else(|| RuntimeError::AttributeNotFound {
                entity: owner,
                name: name.to_string(),
            })?;
        self.store(ph, instr, 2, value)
    }

    // ---- Messaging ----

    fn post(&mut self, text: String, payload: Value, target: Option<EntityId>) {
        debug!("entity {}: post '{text}' to {target:?}", self.entity);
        self.state.messages.push(Message {
            text,
            payload,
            target,
        });
    }

    // ---- Entities ----

    fn exec_instance(&mut self, ph: &mut Playhead, instr: &Instruction) -> Result<(), RuntimeError> {
        let script = self.text(ph, arg(instr, 0)?)?;
        let parent = self.entity_arg(ph, arg(instr, 1)?)?;
        let (result, first_attribute) = match instr.args.get(2) {
            None | Some(Token::Assign { .. }) => (Some(RETURN), 2),
            Some(Token::Name(name)) if name == "_" => (None, 3),
            Some(Token::Name(name)) => (Some(name.as_str()), 3),
            Some(other) => {
                return Err(RuntimeError::InvalidTarget {
                    word: other.to_string(),
                })
            }
        };

        let inherited = self
            .scope(ph)
            .get("_transform_children")
            .cloned()
            .unwrap_or(Value::Integer(0));
        let mut attributes = vec![("_transform_children".to_string(), inherited)];
        for token in instr.args.iter().skip(first_attribute) {
            match token {
                Token::Assign { name, value } => {
                    attributes.push((name.clone(), self.resolve(ph, value)?))
                }
                other => {
                    return Err(RuntimeError::MalformedCall {
                        arg: other.to_string(),
                    })
                }
            }
        }

        let id = self.state.spawn(&script, Some(parent), attributes)?;
        if let Some(name) = result {
            self.scope(ph).set(name, Value::Reference(id));
        }
        Ok(())
    }

    fn exec_delete(&mut self, ph: &mut Playhead, instr: &Instruction) -> Result<(), RuntimeError> {
        let doomed = match instr.args.first() {
            Some(token) => self.entity_arg(ph, token)?,
            None => self.entity,
        };
        if Some(doomed) == self.state.root {
            return Err(RuntimeError::InvalidDelete);
        }
        let removed = self.state.mark_dead(doomed);
        if removed.contains(&self.entity) {
            ph.stop();
            self.effects.halt_all = true;
        }
        Ok(())
    }

    fn exec_adopt(&mut self, ph: &mut Playhead, instr: &Instruction) -> Result<(), RuntimeError> {
        let child = self.entity_arg(ph, arg(instr, 0)?)?;
        if Some(child) == self.state.root
            || child == self.entity
            || self.state.is_ancestor(child, self.entity)
        {
            return Err(RuntimeError::InvalidAdoption {
                adopter: self.entity,
                target: child,
            });
        }
        self.state.reparent(child, self.entity);
        Ok(())
    }

    fn exec_change_layer(
        &mut self,
        ph: &mut Playhead,
        instr: &Instruction,
    ) -> Result<(), RuntimeError> {
        enum Layer {
            Front,
            Back,
            By(i64),
        }

        let child = self.entity_arg(ph, arg(instr, 0)?)?;
        let mode = arg(instr, 1)?;
        let layer = match mode.as_name() {
            Some("front") => Layer::Front,
            Some("back") => Layer::Back,
            _ => Layer::By(self.int(ph, mode)?),
        };

        let parent = self.entity;
        let not_a_child = RuntimeError::NotAChild { id: child, parent };
        let children = match self.state.entities.get_mut(&parent) {
            Some(entity) => &mut entity.children,
            None => return Err(not_a_child),
        };
        let Some(current) = children.iter().position(|id| *id == child) else {
            return Err(not_a_child);
        };
        let len = children.len();
        children.remove(current);
        match layer {
            Layer::Front => children.push(child),
            Layer::Back => children.insert(0, child),
            Layer::By(shift) => {
                let len = len as i64;
                let to = ((current as i64) + shift.rem_euclid(len)).rem_euclid(len) as usize;
                children.insert(to.min(children.len()), child);
            }
        }
        Ok(())
    }

    // ---- Collections ----

    fn exec_append(&mut self, ph: &mut Playhead, instr: &Instruction) -> Result<(), RuntimeError> {
        let name = target(arg(instr, 0)?)?;
        let mut list = self
            .scope(ph)
            .get(name)
            .cloned()
            .map(Value::into_list)
            .unwrap_or_default();
        if instr.args.len() < 2 {
            return Err(missing(instr));
        }
        for token in &instr.args[1..] {
            list.push(self.resolve(ph, token)?);
        }
        self.scope(ph).set(name, Value::List(list));
        Ok(())
    }

    fn exec_remove(&mut self, ph: &mut Playhead, instr: &Instruction) -> Result<(), RuntimeError> {
        let name = target(arg(instr, 0)?)?;
        let mut list = self.resolve(ph, arg(instr, 0)?)?.into_list();
        let index = checked_index(self.int(ph, arg(instr, 1)?)?, list.len())?;
        let removed = list.remove(index);
        self.scope(ph).set(name, Value::List(list));
        self.store(ph, instr, 2, removed)
    }

    fn exec_insert(&mut self, ph: &mut Playhead, instr: &Instruction) -> Result<(), RuntimeError> {
        let name = target(arg(instr, 0)?)?;
        let mut list = self.resolve(ph, arg(instr, 0)?)?.into_list();
        let index = self.int(ph, arg(instr, 1)?)?;
        let item = self.resolve(ph, arg(instr, 2)?)?;
        let len = list.len();
        let at = checked_index(index, len + 1)
            .map_err(|_| RuntimeError::IndexOutOfRange { index, len })?;
        list.insert(at, item);
        self.scope(ph).set(name, Value::List(list));
        Ok(())
    }

    fn exec_set_index(&mut self, ph: &mut Playhead, instr: &Instruction) -> Result<(), RuntimeError> {
        let name = target(arg(instr, 0)?)?;
        let mut list = self.resolve(ph, arg(instr, 0)?)?.into_list();
        let index = checked_index(self.int(ph, arg(instr, 1)?)?, list.len())?;
        let value = match modifier(arg(instr, 2)?) {
            Some(op) => self.modify(ph, instr, op, list[index].clone(), 3)?,
            None => self.resolve(ph, arg(instr, 2)?)?,
        };
        list[index] = value;
        self.scope(ph).set(name, Value::List(list));
        Ok(())
    }

    fn exec_string(&mut self, ph: &mut Playhead, instr: &Instruction) -> Result<(), RuntimeError> {
        let sub = arg(instr, 0)?;
        match sub.as_name() {
            Some("join") => {
                let name = target(arg(instr, 1)?)?;
                let mut joined = String::new();
                for token in instr.args.iter().skip(2) {
                    joined.push_str(&self.text(ph, token)?);
                }
                self.scope(ph).set(name, Value::String(joined));
                Ok(())
            }
            Some("split") => {
                let text = self.text(ph, arg(instr, 1)?)?;
                let delimiter = self.text(ph, arg(instr, 2)?)?;
                if delimiter.is_empty() {
                    return Err(RuntimeError::UnsupportedOperand {
                        op: "string split".to_string(),
                        kind: "empty delimiter",
                    });
                }
                let parts = text.split(delimiter.as_str()).map(Value::from).collect();
                self.store(ph, instr, 3, Value::List(parts))
            }
            _ => Err(RuntimeError::UnknownSubcommand {
                command: instr.name.clone(),
                word: sub.to_string(),
            }),
        }
    }

    // ---- Maths and movement ----

    fn exec_random(&mut self, ph: &mut Playhead, instr: &Instruction) -> Result<(), RuntimeError> {
        if arg(instr, 0)?.as_name() == Some("seed") {
            let seed = self.int(ph, arg(instr, 1)?)?;
            self.state.rng = StdRng::seed_from_u64(seed as u64);
            return Ok(());
        }
        let a = self.int(ph, arg(instr, 0)?)?;
        let b = self.int(ph, arg(instr, 1)?)?;
        let value = self.state.rng.gen_range(a.min(b)..=a.max(b));
        self.store(ph, instr, 2, Value::Integer(value))
    }

    fn four_numbers(
        &mut self,
        ph: &mut Playhead,
        instr: &Instruction,
    ) -> Result<[f64; 4], RuntimeError> {
        let mut out = [0.0; 4];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.number(ph, arg(instr, i)?)?;
        }
        Ok(out)
    }

    fn translate(&mut self, dx: f64, dy: f64) -> Result<(), RuntimeError> {
        self.shift_attribute("_x", dx)?;
        self.shift_attribute("_y", dy)?;
        self.shift_attribute("_global_x", dx)?;
        self.shift_attribute("_global_y", dy)
    }

    fn attribute_number(&self, name: &str) -> Result<f64, RuntimeError> {
        let value = self
            .state
            .entities
            .get(&self.entity)
            .and_then(|entity| entity.attributes.get(name))
            .ok_or_else(|| RuntimeError::AttributeNotFound {
                entity: self.entity,
                name: name.to_string(),
            })?;
        Ok(value.as_float()?)
    }

    fn shift_attribute(&mut self, name: &str, delta: f64) -> Result<(), RuntimeError> {
        let value = self.attribute_number(name)? + delta;
        self.set_own_attribute(name, Value::Float(value).normalized());
        Ok(())
    }

    fn set_own_attribute(&mut self, name: &str, value: Value) {
        if let Some(entity) = self.state.entities.get_mut(&self.entity) {
            entity.attributes.insert(name.to_string(), value);
        }
    }

    // ---- Presentation ----

    fn exec_stage(&mut self, ph: &mut Playhead, instr: &Instruction) -> Result<(), RuntimeError> {
        let operands = instr
            .args
            .iter()
            .map(|token| self.operand(ph, token))
            .collect::<Result<Vec<_>, _>>()?;
        match self.stage.perform(self.entity, instr.opcode, &operands) {
            Ok(Some(value)) => self.scope(ph).bind(RETURN, value),
            Ok(None) => {}
            Err(message) => {
                return Err(RuntimeError::Stage {
                    verb: instr.name.clone(),
                    message,
                })
            }
        }
        Ok(())
    }

    // ---- Operand helpers ----

    fn scope<'s>(&'s mut self, ph: &'s mut Playhead) -> ScopeChain<'s> {
        let state = &mut *self.state;
        let attributes = state
            .entities
            .get_mut(&self.entity)
            .map(|entity| &mut entity.attributes);
        ScopeChain::new(
            &mut ph.frames,
            attributes,
            &mut state.globals,
            state.programs.statics(),
        )
    }

    fn resolve(&mut self, ph: &mut Playhead, token: &Token) -> Result<Value, RuntimeError> {
        self.scope(ph).resolve(token)
    }

    fn evaluate(&mut self, ph: &mut Playhead, postfix: &[Token]) -> Result<Value, RuntimeError> {
        let scope = self.scope(ph);
        eval::evaluate(postfix, |token| scope.resolve(token))
    }

    /// Resolve for output: an unbound name passes through as a bare word.
    fn operand(&mut self, ph: &mut Playhead, token: &Token) -> Result<Operand, RuntimeError> {
        let scope = self.scope(ph);
        match token {
            Token::Name(name) => Ok(scope
                .get(name)
                .cloned()
                .map_or_else(|| Operand::Word(name.clone()), Operand::Value)),
            Token::Assign { .. } => Ok(Operand::Word(token.to_string())),
            other => scope.resolve(other).map(Operand::Value),
        }
    }

    fn text(&mut self, ph: &mut Playhead, token: &Token) -> Result<String, RuntimeError> {
        Ok(self.operand(ph, token)?.to_string())
    }

    fn int(&mut self, ph: &mut Playhead, token: &Token) -> Result<i64, RuntimeError> {
        Ok(self.resolve(ph, token)?.normalized().as_int()?)
    }

    fn number(&mut self, ph: &mut Playhead, token: &Token) -> Result<f64, RuntimeError> {
        Ok(self.resolve(ph, token)?.as_float()?)
    }

    fn optional(
        &mut self,
        ph: &mut Playhead,
        instr: &Instruction,
        n: usize,
    ) -> Result<Value, RuntimeError> {
        match instr.args.get(n) {
            Some(token) => self.resolve(ph, token),
            None => Ok(Value::Integer(0)),
        }
    }

    fn entity_arg(&mut self, ph: &mut Playhead, token: &Token) -> Result<EntityId, RuntimeError> {
        let id = self.resolve(ph, token)?.as_entity()?;
        if self.state.is_live(id) {
            Ok(id)
        } else {
            Err(RuntimeError::EntityNotFound { id })
        }
    }

    /// Write a result to the variable named by `args[n]`, or to `_return`.
    fn store(
        &mut self,
        ph: &mut Playhead,
        instr: &Instruction,
        n: usize,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let name = match instr.args.get(n) {
            Some(token) => target(token)?,
            None => RETURN,
        };
        self.scope(ph).set(name, value);
        Ok(())
    }
}

fn arg(instr: &Instruction, n: usize) -> Result<&Token, RuntimeError> {
    instr.args.get(n).ok_or_else(|| missing(instr))
}

fn missing(instr: &Instruction) -> RuntimeError {
    RuntimeError::MissingOperand {
        command: instr.name.clone(),
    }
}

fn target(token: &Token) -> Result<&str, RuntimeError> {
    token.as_name().ok_or_else(|| RuntimeError::InvalidTarget {
        word: token.to_string(),
    })
}

/// The operator behind an in-place modifier word.
fn modifier(token: &Token) -> Option<Operator> {
    match token.as_name()? {
        "++" | "+=" => Some(Operator::Add),
        "--" | "-=" => Some(Operator::Sub),
        "*=" => Some(Operator::Mul),
        "/=" => Some(Operator::Div),
        "//=" => Some(Operator::FloorDiv),
        _ => None,
    }
}

fn to_address(value: &Value, token: &Token) -> Result<usize, RuntimeError> {
    value
        .clone()
        .normalized()
        .as_int()
        .ok()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| RuntimeError::UnresolvedJump {
            target: token.to_string(),
        })
}

fn checked_index(index: i64, len: usize) -> Result<usize, RuntimeError> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or(RuntimeError::IndexOutOfRange { index, len })
}

/// Direction in degrees from the origin to `(dx, dy)`, in `[0, 360)`.
fn heading(dx: f64, dy: f64) -> f64 {
    if dx == 0.0 {
        return if dy > 0.0 { 90.0 } else { 270.0 };
    }
    let mut degrees = (dy / dx).atan().to_degrees();
    if dx < 0.0 {
        degrees += 180.0;
    }
    degrees.rem_euclid(360.0)
}
