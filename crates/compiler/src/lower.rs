//! Line-oriented lowering of script text into an addressed instruction list.
//!
//! Structured directives (`repeat`, `while`, `loop`, `if`, `def`) never
//! appear in the output. They open a [`Block`] that records the addresses
//! of jumps whose targets are not yet known; the matching closer
//! back-patches them.

use crate::error::{ExprError, LoadError};
use crate::expr::to_postfix;
use crate::lexer::{extract_strings, remainder, strip_array_spaces};
use crate::store::ProgramStore;
use patchlang_common::{
    IncludeSpan, Instruction, JumpTarget, Opcode, Operator, Program, Token, Value,
};
use std::collections::HashSet;

/// An open structured block and its back-patch worklist.
#[derive(Debug)]
enum Block {
    Repeat {
        counter: String,
        /// Address of the exit test, which is also the loop-back target.
        head: usize,
        line: usize,
    },
    While {
        head: usize,
        exit: usize,
        line: usize,
    },
    Loop {
        head: usize,
        waits: usize,
        line: usize,
    },
    If {
        /// Conditional jump of the current branch; `None` once in `else`.
        pending: Option<usize>,
        /// Unconditional jumps to `endif` at the end of finished branches.
        exits: Vec<usize>,
        line: usize,
    },
    Def {
        at: usize,
        line: usize,
    },
}

impl Block {
    fn keyword(&self) -> &'static str {
        match self {
            Block::Repeat { .. } => "repeat",
            Block::While { .. } => "while",
            Block::Loop { .. } => "loop",
            Block::If { .. } => "if",
            Block::Def { .. } => "def",
        }
    }

    fn line(&self) -> usize {
        match self {
            Block::Repeat { line, .. }
            | Block::While { line, .. }
            | Block::Loop { line, .. }
            | Block::If { line, .. }
            | Block::Def { line, .. } => *line,
        }
    }
}

/// Parameter renaming for the body of the function being compiled.
struct FunctionScope {
    name: String,
    params: HashSet<String>,
}

impl FunctionScope {
    fn local(&self, param: &str) -> String {
        format!("{}_{}", self.name, param)
    }

    fn rename(&self, token: &mut Token) {
        match token {
            Token::Name(name) if self.params.contains(name.as_str()) => *name = self.local(name),
            Token::Assign { value, .. } => self.rename(value),
            Token::Array(items) => items.iter_mut().for_each(|item| self.rename(item)),
            _ => {}
        }
    }
}

pub(crate) struct Lowering<'s> {
    store: &'s mut ProgramStore,
    script: String,
    out: Vec<Instruction>,
    includes: Vec<IncludeSpan>,
    blocks: Vec<Block>,
    function: Option<FunctionScope>,
    comment_depth: usize,
    temps: usize,
}

impl<'s> Lowering<'s> {
    pub(crate) fn new(store: &'s mut ProgramStore, script: &str) -> Self {
        Self {
            store,
            script: script.to_string(),
            out: Vec::new(),
            includes: Vec::new(),
            blocks: Vec::new(),
            function: None,
            comment_depth: 0,
            temps: 0,
        }
    }

    /// Lower every line of `text` and seal the program.
    pub(crate) fn run(mut self, text: &str) -> Result<Program, LoadError> {
        for (idx, raw) in text.lines().enumerate() {
            self.lower_line(idx + 1, raw)?;
        }
        if let Some(block) = self.blocks.last() {
            return Err(LoadError::Unclosed {
                script: self.script.clone(),
                line: block.line(),
                construct: block.keyword(),
            });
        }
        Ok(Program::new(&self.script, self.out, self.includes))
    }

    fn lower_line(&mut self, line: usize, raw: &str) -> Result<(), LoadError> {
        let trimmed = raw.trim();
        let head = trimmed
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_lowercase();

        if head.starts_with("#=") || head == "ignore" {
            self.comment_depth += 1;
        }
        if self.comment_depth > 0 {
            if head.starts_with("=#") || head == "endignore" {
                self.comment_depth -= 1;
            }
            return Ok(());
        }
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(());
        }

        if head == "receive" {
            let message = remainder(trimmed).trim_matches('"').to_lowercase();
            self.emit(Instruction::new(
                Opcode::Receive,
                vec![Token::Literal(Value::String(message))],
                line,
            ));
            return Ok(());
        }

        let text = extract_strings(trimmed, self.store.statics_mut()).to_lowercase();
        let text = strip_array_spaces(&text);
        self.temps = 0;
        let (prelude, text, produced) = self.extract_subexpressions(&text, line)?;
        let words: Vec<&str> = text.split_whitespace().collect();

        let Some((&head, rest)) = words.split_first() else {
            self.emit_all(prelude);
            return Ok(());
        };
        if rest.is_empty() && produced.iter().any(|temp| temp == head) {
            // The whole line was a braced command.
            self.emit_all(prelude);
            return Ok(());
        }

        match head {
            "include" => {
                self.emit_all(prelude);
                self.include(rest, line)
            }
            "repeat" => self.open_repeat(prelude, rest, line),
            "endrepeat" => self.close_repeat(line),
            "while" => self.open_while(prelude, rest, line),
            "endwhile" => self.close_while(line),
            "loop" => {
                self.emit_all(prelude);
                self.blocks.push(Block::Loop {
                    head: self.out.len(),
                    waits: 0,
                    line,
                });
                Ok(())
            }
            "endloop" => self.close_loop(line),
            "if" => self.open_if(prelude, rest, line),
            "elif" => self.elif(prelude, rest, line),
            "else" => self.else_branch(line),
            "endif" => self.close_if(line),
            "def" => self.open_def(rest, line),
            "return" => {
                self.emit_all(prelude);
                self.close_def(rest, line);
                Ok(())
            }
            "label" => {
                let name = rest.first().ok_or_else(|| self.missing("label", line))?;
                self.emit(Instruction::new(
                    Opcode::Label,
                    vec![Token::Name(name.to_string())],
                    line,
                ));
                Ok(())
            }
            _ => {
                self.emit_all(prelude);
                let instr = self.command(head, rest, line)?;
                if instr.opcode == Opcode::Wait {
                    self.count_wait();
                }
                self.emit(instr);
                Ok(())
            }
        }
    }

    // ---- Sub-expressions and inline commands ----

    /// Replace every `( … )` expression and `{ … }` command with a
    /// temporary, returning the instructions that compute the temporaries
    /// in evaluation order.
    ///
    /// A `(` at the top level or directly inside braces starts an
    /// expression; a `(` inside an expression is ordinary grouping.
    fn extract_subexpressions(
        &mut self,
        text: &str,
        line: usize,
    ) -> Result<(Vec<Instruction>, String, Vec<String>), LoadError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Open {
            Expr,
            Group,
            Brace,
        }

        let mut chars: Vec<char> = text.chars().collect();
        let mut prelude = Vec::new();
        let mut produced = Vec::new();
        let mut stack: Vec<(usize, Open)> = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '(' => {
                    let kind = match stack.last() {
                        None | Some((_, Open::Brace)) => Open::Expr,
                        Some(_) => Open::Group,
                    };
                    stack.push((i, kind));
                }
                ')' => match stack.pop() {
                    Some((_, Open::Group)) => {}
                    Some((start, Open::Expr)) => {
                        let inner: String = chars[start + 1..i].iter().collect();
                        let postfix = to_postfix(&inner).map_err(|e| self.expr_error(e, line))?;
                        let temp = self.temp();
                        let mut args = vec![Token::Name(temp.clone())];
                        args.extend(postfix);
                        prelude.push(Instruction::new(Opcode::Eval, args, line));
                        i = splice(&mut chars, start, i, &temp);
                        produced.push(temp);
                    }
                    _ => return Err(self.unbalanced(')', line)),
                },
                '{' => stack.push((i, Open::Brace)),
                '}' => match stack.pop() {
                    Some((start, Open::Brace)) => {
                        let inner: String = chars[start + 1..i].iter().collect();
                        let words: Vec<&str> = inner.split_whitespace().collect();
                        let (head, rest) = words
                            .split_first()
                            .ok_or_else(|| self.unbalanced('{', line))?;
                        prelude.push(self.command(head, rest, line)?);
                        let temp = self.temp();
                        prelude.push(Instruction::new(
                            Opcode::SetVar,
                            vec![Token::Name(temp.clone()), Token::Name("_return".into())],
                            line,
                        ));
                        i = splice(&mut chars, start, i, &temp);
                        produced.push(temp);
                    }
                    _ => return Err(self.unbalanced('}', line)),
                },
                _ => {}
            }
            i += 1;
        }

        if let Some(&(start, _)) = stack.last() {
            return Err(self.unbalanced(chars[start], line));
        }
        Ok((prelude, chars.into_iter().collect(), produced))
    }

    fn temp(&mut self) -> String {
        let name = format!("_t{}_", self.temps);
        self.temps += 1;
        name
    }

    // ---- Directives ----

    fn include(&mut self, rest: &[&str], line: usize) -> Result<(), LoadError> {
        let word = rest.first().ok_or_else(|| self.missing("include", line))?;
        let name = self.literal_text(word);
        let program = self.store.get_or_compile(&name)?;
        let offset = self.out.len();

        self.includes.push(IncludeSpan {
            script: name,
            start: offset,
            end: offset + program.len(),
        });
        self.includes
            .extend(program.includes.iter().map(|span| IncludeSpan {
                script: span.script.clone(),
                start: span.start + offset,
                end: span.end + offset,
            }));
        for instr in &program.instructions {
            let mut instr = instr.clone();
            instr.rebase(offset);
            self.out.push(instr);
        }
        Ok(())
    }

    fn open_repeat(
        &mut self,
        prelude: Vec<Instruction>,
        rest: &[&str],
        line: usize,
    ) -> Result<(), LoadError> {
        let count = rest.first().ok_or_else(|| self.missing("repeat", line))?;
        self.emit_all(prelude);
        let owner = self.function.as_ref().map_or("", |f| f.name.as_str());
        let counter = format!("_r{}{}_{}_", self.blocks.len(), owner, self.script);
        self.emit(Instruction::new(
            Opcode::SetVar,
            vec![Token::Name(counter.clone()), Token::operand(count)],
            line,
        ));
        let head = self.out.len();
        self.emit(Instruction::jump(
            JumpTarget::Pending,
            vec![
                Token::Name(counter.clone()),
                Token::Literal(Value::Integer(0)),
                Token::Op(Operator::Le),
            ],
            line,
        ));
        self.blocks.push(Block::Repeat {
            counter,
            head,
            line,
        });
        Ok(())
    }

    fn close_repeat(&mut self, line: usize) -> Result<(), LoadError> {
        match self.blocks.pop() {
            Some(Block::Repeat { counter, head, .. }) => {
                self.emit(Instruction::new(
                    Opcode::Set,
                    vec![Token::Name(counter), Token::Name("--".into())],
                    line,
                ));
                self.emit(Instruction::jump(JumpTarget::Address(head), vec![], line));
                self.patch(head, self.out.len());
                Ok(())
            }
            other => Err(self.misplaced("endrepeat", other, line)),
        }
    }

    fn open_while(
        &mut self,
        prelude: Vec<Instruction>,
        rest: &[&str],
        line: usize,
    ) -> Result<(), LoadError> {
        let mut condition = self.condition("while", rest, line)?;
        condition.push(Token::Op(Operator::Not));
        let head = self.out.len();
        self.emit_all(prelude);
        let exit = self.out.len();
        self.emit(Instruction::jump(JumpTarget::Pending, condition, line));
        self.blocks.push(Block::While { head, exit, line });
        Ok(())
    }

    fn close_while(&mut self, line: usize) -> Result<(), LoadError> {
        match self.blocks.pop() {
            Some(Block::While { head, exit, .. }) => {
                self.emit(Instruction::jump(JumpTarget::Address(head), vec![], line));
                self.patch(exit, self.out.len());
                Ok(())
            }
            other => Err(self.misplaced("endwhile", other, line)),
        }
    }

    fn close_loop(&mut self, line: usize) -> Result<(), LoadError> {
        match self.blocks.pop() {
            Some(Block::Loop { waits: 0, line: opened, .. }) => Err(LoadError::InfiniteLoop {
                script: self.script.clone(),
                line: opened,
            }),
            Some(Block::Loop { head, .. }) => {
                self.emit(Instruction::jump(JumpTarget::Address(head), vec![], line));
                Ok(())
            }
            other => Err(self.misplaced("endloop", other, line)),
        }
    }

    fn count_wait(&mut self) {
        for block in &mut self.blocks {
            if let Block::Loop { waits, .. } = block {
                *waits += 1;
            }
        }
    }

    fn open_if(
        &mut self,
        prelude: Vec<Instruction>,
        rest: &[&str],
        line: usize,
    ) -> Result<(), LoadError> {
        let mut condition = self.condition("if", rest, line)?;
        condition.push(Token::Op(Operator::Not));
        self.emit_all(prelude);
        let pending = self.out.len();
        self.emit(Instruction::jump(JumpTarget::Pending, condition, line));
        self.blocks.push(Block::If {
            pending: Some(pending),
            exits: Vec::new(),
            line,
        });
        Ok(())
    }

    fn elif(
        &mut self,
        prelude: Vec<Instruction>,
        rest: &[&str],
        line: usize,
    ) -> Result<(), LoadError> {
        let pending = self.open_branch("elif", line)?;
        let mut condition = self.condition("elif", rest, line)?;
        condition.push(Token::Op(Operator::Not));

        let exit = self.out.len();
        self.emit(Instruction::jump(JumpTarget::Pending, vec![], line));
        self.patch(pending, self.out.len());
        self.emit_all(prelude);
        let next = self.out.len();
        self.emit(Instruction::jump(JumpTarget::Pending, condition, line));

        if let Some(Block::If { pending, exits, .. }) = self.blocks.last_mut() {
            exits.push(exit);
            *pending = Some(next);
        }
        Ok(())
    }

    fn else_branch(&mut self, line: usize) -> Result<(), LoadError> {
        let pending = self.open_branch("else", line)?;
        let exit = self.out.len();
        self.emit(Instruction::jump(JumpTarget::Pending, vec![], line));
        self.patch(pending, self.out.len());

        if let Some(Block::If { pending, exits, .. }) = self.blocks.last_mut() {
            exits.push(exit);
            *pending = None;
        }
        Ok(())
    }

    /// Address of the innermost `if`'s open conditional jump.
    fn open_branch(&self, keyword: &str, line: usize) -> Result<usize, LoadError> {
        match self.blocks.last() {
            Some(Block::If {
                pending: Some(pending),
                ..
            }) => Ok(*pending),
            Some(Block::If { pending: None, .. }) => Err(LoadError::BranchAfterElse {
                script: self.script.clone(),
                line,
                keyword: keyword.to_string(),
            }),
            Some(block) => Err(LoadError::MismatchedCloser {
                script: self.script.clone(),
                line,
                keyword: keyword.to_string(),
                open: block.keyword(),
                opened: block.line(),
            }),
            None => Err(LoadError::UnmatchedCloser {
                script: self.script.clone(),
                line,
                keyword: keyword.to_string(),
            }),
        }
    }

    fn close_if(&mut self, line: usize) -> Result<(), LoadError> {
        match self.blocks.pop() {
            Some(Block::If { pending, exits, .. }) => {
                let end = self.out.len();
                for at in pending.into_iter().chain(exits) {
                    self.patch(at, end);
                }
                Ok(())
            }
            other => Err(self.misplaced("endif", other, line)),
        }
    }

    fn open_def(&mut self, rest: &[&str], line: usize) -> Result<(), LoadError> {
        if self.function.is_some() {
            return Err(LoadError::NestedFunction {
                script: self.script.clone(),
                line,
            });
        }
        let (name, params) = rest
            .split_first()
            .ok_or_else(|| self.missing("def", line))?;

        let mut args = vec![Token::Name(name.to_string())];
        args.extend(params.iter().map(|param| Token::operand(param)));
        let names = args[1..]
            .iter()
            .filter_map(|param| match param {
                Token::Name(n) | Token::Assign { name: n, .. } => Some(n.clone()),
                _ => None,
            })
            .collect();

        let at = self.out.len();
        let mut def = Instruction::new(Opcode::Def, args, line);
        def.target = Some(JumpTarget::Pending);
        self.out.push(def);

        self.function = Some(FunctionScope {
            name: name.to_string(),
            params: names,
        });
        self.blocks.push(Block::Def { at, line });
        Ok(())
    }

    /// Emit a `return`. When the innermost block is the function body, the
    /// return also closes the definition.
    fn close_def(&mut self, rest: &[&str], line: usize) {
        let args = rest.iter().map(|word| Token::operand(word)).collect();
        self.emit(Instruction::new(Opcode::Return, args, line));
        if let Some(Block::Def { at, .. }) = self.blocks.last() {
            let at = *at;
            self.blocks.pop();
            self.patch(at, self.out.len());
            self.function = None;
        }
    }

    // ---- Verbatim commands ----

    /// Build the instruction for a command line that is not a directive.
    fn command(&self, head: &str, rest: &[&str], line: usize) -> Result<Instruction, LoadError> {
        let instr = match Opcode::from_mnemonic(head) {
            Some(Opcode::Jump) => {
                let (target, tail) = rest
                    .split_first()
                    .ok_or_else(|| self.missing("jump", line))?;
                let target = match target.parse() {
                    Ok(address) => JumpTarget::Address(address),
                    Err(_) => JumpTarget::Named(target.to_string()),
                };
                let condition = match tail.split_first() {
                    Some((&"if", condition)) => {
                        let condition: Vec<Token> =
                            condition.iter().map(|word| Token::postfix(word)).collect();
                        if condition.is_empty() {
                            return Err(self.missing("jump", line));
                        }
                        condition
                    }
                    _ => Vec::new(),
                };
                Instruction::jump(target, condition, line)
            }
            Some(Opcode::Eval) => {
                let (target, postfix) = rest
                    .split_first()
                    .ok_or_else(|| self.missing("eval", line))?;
                let mut args = vec![Token::operand(target)];
                args.extend(postfix.iter().map(|word| Token::postfix(word)));
                Instruction::new(Opcode::Eval, args, line)
            }
            Some(opcode) => Instruction::new(
                opcode,
                rest.iter().map(|word| Token::operand(word)).collect(),
                line,
            ),
            None => Instruction::call(
                head,
                rest.iter().map(|word| Token::operand(word)).collect(),
                line,
            ),
        };
        Ok(instr)
    }

    // ---- Emission and patching ----

    fn emit(&mut self, mut instr: Instruction) {
        if let Some(function) = &self.function {
            instr.args.iter_mut().for_each(|arg| function.rename(arg));
            if let Some(JumpTarget::Named(name)) = &mut instr.target {
                if function.params.contains(name.as_str()) {
                    *name = function.local(name);
                }
            }
        }
        self.out.push(instr);
    }

    fn emit_all(&mut self, instrs: Vec<Instruction>) {
        for instr in instrs {
            self.emit(instr);
        }
    }

    fn patch(&mut self, at: usize, target: usize) {
        if let Some(instr) = self.out.get_mut(at) {
            instr.target = Some(JumpTarget::Address(target));
        }
    }

    // ---- Helpers ----

    fn condition(
        &self,
        directive: &'static str,
        rest: &[&str],
        line: usize,
    ) -> Result<Vec<Token>, LoadError> {
        if rest.is_empty() {
            return Err(self.missing(directive, line));
        }
        to_postfix(&rest.join(" ")).map_err(|e| self.expr_error(e, line))
    }

    /// The text of a word that names a script: a quoted or static string,
    /// or the bare word itself.
    fn literal_text(&self, word: &str) -> String {
        match Token::operand(word) {
            Token::Literal(Value::String(text)) => text,
            Token::Static(index) => self
                .store
                .statics()
                .get(index)
                .map_or_else(|| word.to_string(), str::to_string),
            _ => word.to_string(),
        }
    }

    fn misplaced(&self, keyword: &str, open: Option<Block>, line: usize) -> LoadError {
        match open {
            Some(block) => LoadError::MismatchedCloser {
                script: self.script.clone(),
                line,
                keyword: keyword.to_string(),
                open: block.keyword(),
                opened: block.line(),
            },
            None => LoadError::UnmatchedCloser {
                script: self.script.clone(),
                line,
                keyword: keyword.to_string(),
            },
        }
    }

    fn missing(&self, directive: &'static str, line: usize) -> LoadError {
        LoadError::MissingOperand {
            script: self.script.clone(),
            line,
            directive,
        }
    }

    fn unbalanced(&self, delimiter: char, line: usize) -> LoadError {
        LoadError::UnbalancedDelimiter {
            script: self.script.clone(),
            line,
            delimiter,
        }
    }

    fn expr_error(&self, reason: ExprError, line: usize) -> LoadError {
        LoadError::Expression {
            script: self.script.clone(),
            line,
            reason,
        }
    }
}

/// Replace `chars[start..=end]` with `name`; returns the index of the last
/// replacement character.
fn splice(chars: &mut Vec<char>, start: usize, end: usize, name: &str) -> usize {
    let len = name.chars().count();
    chars.splice(start..=end, name.chars());
    start + len - 1
}
