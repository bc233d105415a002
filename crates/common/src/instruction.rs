//! Compiled instruction records.

use crate::opcode::Opcode;
use crate::token::Token;
use std::fmt;

/// Destination of a `jump` or the end of a `def` body.
#[derive(Debug, Clone, PartialEq)]
pub enum JumpTarget {
    /// Absolute address within the program.
    Address(usize),
    /// Variable holding an address, usually a label attribute.
    Named(String),
    /// Not yet back-patched. Never present in a finished program.
    Pending,
}

impl fmt::Display for JumpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JumpTarget::Address(address) => write!(f, "{address}"),
            JumpTarget::Named(name) => write!(f, "{name}"),
            JumpTarget::Pending => write!(f, "?"),
        }
    }
}

/// One compiled line. Its address is its index in the program.
///
/// For `jump`, `args` holds the postfix condition (empty when
/// unconditional). For `eval`, `args[0]` is the destination variable and
/// the rest is postfix. For `def`, `args` lists the parameters and
/// `target` points past the function body.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    /// Head word as written: the mnemonic, or the function name for calls.
    pub name: String,
    pub args: Vec<Token>,
    pub target: Option<JumpTarget>,
    /// 1-based line in the script that produced this instruction.
    pub line: usize,
}

impl Instruction {
    /// Create an instruction named after its opcode's mnemonic.
    pub fn new(opcode: Opcode, args: Vec<Token>, line: usize) -> Self {
        Self {
            opcode,
            name: opcode.mnemonic().to_string(),
            args,
            target: None,
            line,
        }
    }

    /// Create a call to a user function.
    pub fn call(name: &str, args: Vec<Token>, line: usize) -> Self {
        Self {
            opcode: Opcode::Call,
            name: name.to_string(),
            args,
            target: None,
            line,
        }
    }

    /// Create a jump. An empty `condition` means unconditional.
    pub fn jump(target: JumpTarget, condition: Vec<Token>, line: usize) -> Self {
        Self {
            target: Some(target),
            ..Self::new(Opcode::Jump, condition, line)
        }
    }

    /// Shift an absolute target by `offset`. Used when splicing an include.
    pub fn rebase(&mut self, offset: usize) {
        if let Some(JumpTarget::Address(address)) = &mut self.target {
            *address += offset;
        }
    }

    /// True if this instruction still has an unpatched target.
    pub fn is_pending(&self) -> bool {
        matches!(self.target, Some(JumpTarget::Pending))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let (Opcode::Jump, Some(target)) = (self.opcode, &self.target) {
            write!(f, " {target}")?;
            if !self.args.is_empty() {
                write!(f, " if")?;
            }
        }
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        if let (Opcode::Def, Some(target)) = (self.opcode, &self.target) {
            write!(f, " -> {target}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Operator;
    use crate::value::Value;

    #[test]
    fn display_plain_instruction() {
        let instr = Instruction::new(
            Opcode::SetVar,
            vec![Token::Name("x".into()), Token::Literal(Value::Integer(3))],
            1,
        );
        assert_eq!(instr.to_string(), "setvar x 3");
    }

    #[test]
    fn display_conditional_jump() {
        let instr = Instruction::jump(
            JumpTarget::Address(9),
            vec![
                Token::Name("x".into()),
                Token::Literal(Value::Integer(0)),
                Token::Op(Operator::Le),
            ],
            4,
        );
        assert_eq!(instr.to_string(), "jump 9 if x 0 <=");
    }

    #[test]
    fn display_unconditional_and_pending() {
        let instr = Instruction::jump(JumpTarget::Pending, vec![], 2);
        assert_eq!(instr.to_string(), "jump ?");
        assert!(instr.is_pending());
    }

    #[test]
    fn display_def_with_body_end() {
        let mut instr = Instruction::new(
            Opcode::Def,
            vec![
                Token::Name("sum".into()),
                Token::Assign {
                    name: "n".into(),
                    value: Box::new(Token::Literal(Value::Integer(0))),
                },
            ],
            1,
        );
        instr.target = Some(JumpTarget::Address(7));
        assert_eq!(instr.to_string(), "def sum n=0 -> 7");
    }

    #[test]
    fn rebase_only_moves_addresses() {
        let mut a = Instruction::jump(JumpTarget::Address(3), vec![], 1);
        a.rebase(10);
        assert_eq!(a.target, Some(JumpTarget::Address(13)));

        let mut b = Instruction::jump(JumpTarget::Named("top".into()), vec![], 1);
        b.rebase(10);
        assert_eq!(b.target, Some(JumpTarget::Named("top".into())));

        let mut c = Instruction::new(Opcode::Log, vec![], 1);
        c.rebase(10);
        assert_eq!(c.target, None);
    }

    #[test]
    fn call_keeps_function_name() {
        let instr = Instruction::call("shoot", vec![], 5);
        assert_eq!(instr.opcode, Opcode::Call);
        assert_eq!(instr.to_string(), "shoot");
    }
}
