//! Compiled programs and their entry-point index.

use crate::instruction::Instruction;
use crate::opcode::Opcode;
use crate::token::Token;
use crate::value::Value;
use std::fmt::Write;

/// The kind of an entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HatKind {
    Start,
    /// Lowercased message text the hat listens for.
    Receive(String),
    Trap,
}

/// A compiled entry point. Playheads spawned from it begin at `address + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hat {
    pub kind: HatKind,
    pub address: usize,
}

/// A declared function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Name as written in the `def` line and at call sites.
    pub name: String,
    /// Function-namespaced local the body refers to (`func_param`).
    pub local: String,
    pub default: Option<Token>,
}

/// A function discovered by scanning `def` instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    /// Address of the `def` instruction.
    pub address: usize,
    pub params: Vec<Param>,
}

impl FunctionDef {
    /// First instruction of the body.
    pub fn entry(&self) -> usize {
        self.address + 1
    }
}

/// Address range `[start, end)` spliced in from another script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeSpan {
    pub script: String,
    pub start: usize,
    pub end: usize,
}

/// An immutable instruction sequence for one script, with includes spliced.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub name: String,
    pub instructions: Vec<Instruction>,
    pub includes: Vec<IncludeSpan>,
    hats: Vec<Hat>,
    labels: Vec<(String, usize)>,
    functions: Vec<FunctionDef>,
}

impl Program {
    /// Build a program and index its hats, labels and functions.
    pub fn new(name: &str, instructions: Vec<Instruction>, includes: Vec<IncludeSpan>) -> Self {
        let mut hats = Vec::new();
        let mut labels = Vec::new();
        let mut functions = Vec::new();

        for (address, instr) in instructions.iter().enumerate() {
            match instr.opcode {
                Opcode::Start => hats.push(Hat {
                    kind: HatKind::Start,
                    address,
                }),
                Opcode::Trap => hats.push(Hat {
                    kind: HatKind::Trap,
                    address,
                }),
                Opcode::Receive => {
                    let text = match instr.args.first() {
                        Some(Token::Literal(Value::String(text))) => text.to_lowercase(),
                        Some(other) => other.to_string(),
                        None => String::new(),
                    };
                    hats.push(Hat {
                        kind: HatKind::Receive(text),
                        address,
                    });
                }
                Opcode::Label => {
                    if let Some(name) = instr.args.first().and_then(Token::as_name) {
                        labels.push((name.to_string(), address));
                    }
                }
                Opcode::Def => {
                    if let Some(function) = scan_def(instr, address) {
                        functions.push(function);
                    }
                }
                _ => {}
            }
        }

        Self {
            name: name.to_string(),
            instructions,
            includes,
            hats,
            labels,
            functions,
        }
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if the program has no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, address: usize) -> Option<&Instruction> {
        self.instructions.get(address)
    }

    pub fn hats(&self) -> &[Hat] {
        &self.hats
    }

    pub fn labels(&self) -> &[(String, usize)] {
        &self.labels
    }

    pub fn functions(&self) -> &[FunctionDef] {
        &self.functions
    }

    /// Addresses of `start` hats in program order.
    pub fn start_hats(&self) -> impl Iterator<Item = usize> + '_ {
        self.hats
            .iter()
            .filter(|hat| hat.kind == HatKind::Start)
            .map(|hat| hat.address)
    }

    /// Addresses of `trap` hats in program order.
    pub fn trap_hats(&self) -> impl Iterator<Item = usize> + '_ {
        self.hats
            .iter()
            .filter(|hat| hat.kind == HatKind::Trap)
            .map(|hat| hat.address)
    }

    /// Addresses of `receive` hats whose text equals `message`, ignoring case.
    pub fn receive_hats(&self, message: &str) -> impl Iterator<Item = usize> + '_ {
        let message = message.to_lowercase();
        self.hats.iter().filter_map(move |hat| match &hat.kind {
            HatKind::Receive(text) if *text == message => Some(hat.address),
            _ => None,
        })
    }

    /// Human-readable listing of the lowered instructions with include
    /// provenance.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "script {} ({} instructions)", self.name, self.len());
        for (address, instr) in self.instructions.iter().enumerate() {
            for span in self.includes.iter().filter(|s| s.start == address) {
                let _ = writeln!(
                    out,
                    "      >> include {} [{}, {})",
                    span.script, span.start, span.end
                );
            }
            let _ = writeln!(out, "{address:>5}  {instr}");
            for span in self.includes.iter().rev().filter(|s| s.end == address + 1) {
                let _ = writeln!(out, "      << end {}", span.script);
            }
        }
        out
    }
}

fn scan_def(instr: &Instruction, address: usize) -> Option<FunctionDef> {
    let (head, params) = instr.args.split_first()?;
    let function = head.as_name()?.to_string();
    let params = params
        .iter()
        .filter_map(|param| {
            let (param_name, default) = match param {
                Token::Name(n) => (n.clone(), None),
                Token::Assign { name, value } => (name.clone(), Some((**value).clone())),
                _ => return None,
            };
            Some(Param {
                local: format!("{function}_{param_name}"),
                name: param_name,
                default,
            })
        })
        .collect();
    Some(FunctionDef {
        name: function,
        address,
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::JumpTarget;

    fn receive(text: &str) -> Instruction {
        Instruction::new(
            Opcode::Receive,
            vec![Token::Literal(Value::from(text))],
            1,
        )
    }

    #[test]
    fn empty_program() {
        let program = Program::new("empty", vec![], vec![]);
        assert!(program.is_empty());
        assert_eq!(program.len(), 0);
        assert!(program.hats().is_empty());
    }

    #[test]
    fn indexes_hats_in_order() {
        let program = Program::new(
            "hats",
            vec![
                Instruction::new(Opcode::Start, vec![], 1),
                Instruction::new(Opcode::End, vec![], 2),
                receive("ping"),
                Instruction::new(Opcode::End, vec![], 4),
                Instruction::new(Opcode::Trap, vec![], 5),
                Instruction::new(Opcode::Start, vec![], 6),
            ],
            vec![],
        );
        assert_eq!(program.start_hats().collect::<Vec<_>>(), vec![0, 5]);
        assert_eq!(program.trap_hats().collect::<Vec<_>>(), vec![4]);
        assert_eq!(program.receive_hats("PING").collect::<Vec<_>>(), vec![2]);
        assert_eq!(program.receive_hats("pong").count(), 0);
    }

    #[test]
    fn indexes_labels_and_functions() {
        let mut def = Instruction::new(
            Opcode::Def,
            vec![
                Token::Name("add".into()),
                Token::Name("a".into()),
                Token::Assign {
                    name: "b".into(),
                    value: Box::new(Token::Literal(Value::Integer(1))),
                },
            ],
            2,
        );
        def.target = Some(JumpTarget::Address(3));
        let program = Program::new(
            "funcs",
            vec![
                Instruction::new(Opcode::Label, vec![Token::Name("top".into())], 1),
                def,
                Instruction::new(Opcode::Return, vec![], 3),
            ],
            vec![],
        );
        assert_eq!(program.labels(), &[("top".to_string(), 0)]);
        let function = &program.functions()[0];
        assert_eq!(function.name, "add");
        assert_eq!(function.entry(), 2);
        assert_eq!(function.params[0].local, "add_a");
        assert_eq!(function.params[0].default, None);
        assert_eq!(function.params[1].name, "b");
        assert_eq!(
            function.params[1].default,
            Some(Token::Literal(Value::Integer(1)))
        );
    }

    #[test]
    fn transcript_marks_includes() {
        let program = Program::new(
            "main",
            vec![
                Instruction::new(Opcode::Start, vec![], 1),
                Instruction::new(Opcode::Wait, vec![Token::Literal(Value::Integer(1))], 1),
                Instruction::new(Opcode::End, vec![], 2),
            ],
            vec![IncludeSpan {
                script: "util".into(),
                start: 1,
                end: 2,
            }],
        );
        let text = program.transcript();
        assert!(text.starts_with("script main (3 instructions)"));
        assert!(text.contains(">> include util [1, 2)"));
        assert!(text.contains("    1  wait 1"));
        assert!(text.contains("<< end util"));
    }
}
