//! Opcode definitions for Patchlang.
//!
//! Each opcode is the head word of one compiled instruction line. Lines
//! whose head word is not a mnemonic compile to [`Opcode::Call`].

use std::fmt;

/// Patchlang opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ---- Hats and structure ----
    /// Entry point run when the entity is created.
    Start,
    /// Entry point run when a matching message is delivered.
    Receive,
    /// Entry point run when a runtime error hits the entity.
    Trap,
    /// Named address, exposed as an entity attribute.
    Label,
    /// Function header. Jumps over the body when reached in sequence.
    Def,

    // ---- Control ----
    Return,
    End,
    Jump,
    Wait,
    Fork,
    CallStack,
    StopScripts,
    StopAll,
    /// Invocation of a user-defined function.
    Call,

    // ---- Variables ----
    SetVar,
    Set,
    Eval,
    SetAttribute,
    GetAttribute,
    SetGlob,
    GetGlob,

    // ---- Messaging ----
    Broadcast,
    Unicast,

    // ---- Entities ----
    Instance,
    Delete,
    Adopt,
    ChangeLayer,

    // ---- Collections ----
    Append,
    Remove,
    Insert,
    Count,
    Copy,
    GetIndex,
    SetIndex,
    Merge,
    String,

    // ---- Maths and movement ----
    Log,
    Random,
    Angle,
    Distance,
    Move,
    Translate,
    SetPosition,

    // ---- Presentation, delegated to the stage ----
    Draw,
    Stamp,
    SetSprite,
    UpdateSprite,
    ColorShift,
    SetCollider,
    Collide,
    SetMask,
    MaskCollide,
    Load,
    Save,
    Unload,
    Music,
    Sound,
    GetKey,
    Configure,
}

/// All opcodes that have a source mnemonic (everything except `Call`).
pub const ALL_OPCODES: [Opcode; 58] = [
    Opcode::Start,
    Opcode::Receive,
    Opcode::Trap,
    Opcode::Label,
    Opcode::Def,
    Opcode::Return,
    Opcode::End,
    Opcode::Jump,
    Opcode::Wait,
    Opcode::Fork,
    Opcode::CallStack,
    Opcode::StopScripts,
    Opcode::StopAll,
    Opcode::SetVar,
    Opcode::Set,
    Opcode::Eval,
    Opcode::SetAttribute,
    Opcode::GetAttribute,
    Opcode::SetGlob,
    Opcode::GetGlob,
    Opcode::Broadcast,
    Opcode::Unicast,
    Opcode::Instance,
    Opcode::Delete,
    Opcode::Adopt,
    Opcode::ChangeLayer,
    Opcode::Append,
    Opcode::Remove,
    Opcode::Insert,
    Opcode::Count,
    Opcode::Copy,
    Opcode::GetIndex,
    Opcode::SetIndex,
    Opcode::Merge,
    Opcode::String,
    Opcode::Log,
    Opcode::Random,
    Opcode::Angle,
    Opcode::Distance,
    Opcode::Move,
    Opcode::Translate,
    Opcode::SetPosition,
    Opcode::Draw,
    Opcode::Stamp,
    Opcode::SetSprite,
    Opcode::UpdateSprite,
    Opcode::ColorShift,
    Opcode::SetCollider,
    Opcode::Collide,
    Opcode::SetMask,
    Opcode::MaskCollide,
    Opcode::Load,
    Opcode::Save,
    Opcode::Unload,
    Opcode::Music,
    Opcode::Sound,
    Opcode::GetKey,
    Opcode::Configure,
];

impl Opcode {
    /// The lowercase source mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Start => "start",
            Opcode::Receive => "receive",
            Opcode::Trap => "trap",
            Opcode::Label => "label",
            Opcode::Def => "def",
            Opcode::Return => "return",
            Opcode::End => "end",
            Opcode::Jump => "jump",
            Opcode::Wait => "wait",
            Opcode::Fork => "fork",
            Opcode::CallStack => "callstack",
            Opcode::StopScripts => "stopscripts",
            Opcode::StopAll => "stopall",
            Opcode::Call => "call",
            Opcode::SetVar => "setvar",
            Opcode::Set => "set",
            Opcode::Eval => "eval",
            Opcode::SetAttribute => "setattribute",
            Opcode::GetAttribute => "getattribute",
            Opcode::SetGlob => "setglob",
            Opcode::GetGlob => "getglob",
            Opcode::Broadcast => "broadcast",
            Opcode::Unicast => "unicast",
            Opcode::Instance => "instance",
            Opcode::Delete => "delete",
            Opcode::Adopt => "adopt",
            Opcode::ChangeLayer => "changelayer",
            Opcode::Append => "append",
            Opcode::Remove => "remove",
            Opcode::Insert => "insert",
            Opcode::Count => "count",
            Opcode::Copy => "copy",
            Opcode::GetIndex => "getindex",
            Opcode::SetIndex => "setindex",
            Opcode::Merge => "merge",
            Opcode::String => "string",
            Opcode::Log => "log",
            Opcode::Random => "random",
            Opcode::Angle => "angle",
            Opcode::Distance => "distance",
            Opcode::Move => "move",
            Opcode::Translate => "translate",
            Opcode::SetPosition => "setposition",
            Opcode::Draw => "draw",
            Opcode::Stamp => "stamp",
            Opcode::SetSprite => "setsprite",
            Opcode::UpdateSprite => "updatesprite",
            Opcode::ColorShift => "colorshift",
            Opcode::SetCollider => "setcollider",
            Opcode::Collide => "collide",
            Opcode::SetMask => "setmask",
            Opcode::MaskCollide => "maskcollide",
            Opcode::Load => "load",
            Opcode::Save => "save",
            Opcode::Unload => "unload",
            Opcode::Music => "music",
            Opcode::Sound => "sound",
            Opcode::GetKey => "getkey",
            Opcode::Configure => "configure",
        }
    }

    /// Look up an opcode by mnemonic. `kidnap` is accepted for `adopt`.
    /// Unknown words return `None`; the compiler treats them as calls.
    pub fn from_mnemonic(word: &str) -> Option<Opcode> {
        if word == "kidnap" {
            return Some(Opcode::Adopt);
        }
        ALL_OPCODES.iter().copied().find(|op| op.mnemonic() == word)
    }

    /// True for the three entry-point opcodes.
    pub fn is_hat(self) -> bool {
        matches!(self, Opcode::Start | Opcode::Receive | Opcode::Trap)
    }

    /// True for verbs whose effect lives outside the VM.
    pub fn is_presentation(self) -> bool {
        matches!(
            self,
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
                | Opcode::Configure
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
