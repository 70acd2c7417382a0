// This module implements the instruction emitter: the single sink through which code
// generation appends abstract instructions, labels and directives for one compilation unit.
// Items are kept as plain data and rendered to text only at the end by the architecture's
// InstructionRenderer, so nothing upstream ever sees a mnemonic. The emitter tracks the
// runtime stack depth in words so that every call site can be padded to the 16-byte
// alignment the calling convention requires (a push/pop pair around the call when the depth
// is odd), and so that popping an empty stack or returning with words still pushed is
// caught as an internal defect instead of corrupting the caller's frame. Labels are
// allocated per base name with a monotonically increasing suffix, which keeps them unique
// within the unit. Prologue and epilogue are the fixed frame-pointer idioms; the saved
// frame pointer is not counted in the tracked depth.

//! Linear instruction stream with stack-depth tracking.

use crate::core::error::{CompileError, CompileResult};
use crate::isa::{
    Directive, Instruction, InstructionRenderer, Memory, Operand, Operation, Register,
};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Indentation of instructions and directives.
const INDENT: usize = 4;
/// Width the mnemonic is padded to.
const MNEMONIC_WIDTH: usize = 8;
/// Column trailing comments start at.
const COMMENT_COLUMN: usize = 32;

/// One item of the emitted stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmItem {
    Instr(Instruction),
    Label(String),
    Directive(Directive),
    Blank,
}

/// Counters the session reports once the unit is done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitterCounters {
    pub instructions: usize,
    pub labels_allocated: usize,
    pub alignment_pads: usize,
}

/// Instruction emitter for one compilation unit.
#[derive(Debug, Default)]
pub struct Emitter {
    items: Vec<AsmItem>,
    /// Words pushed since the current prologue.
    depth: usize,
    label_counters: HashMap<String, usize>,
    counters: EmitterCounters,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tracked stack depth in words.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn counters(&self) -> EmitterCounters {
        self.counters
    }

    pub fn items(&self) -> &[AsmItem] {
        &self.items
    }

    /// Append an instruction. Stack and control-transfer operations are routed through
    /// their tracked counterparts so the depth counter always matches the stream.
    pub fn emit(&mut self, instr: Instruction) -> CompileResult<()> {
        use crate::isa::Operands;
        match (instr.op, &instr.operands) {
            (Operation::Push, Operands::Unary(_)) => {
                self.depth += 1;
            }
            (Operation::Pop, Operands::Unary(_)) => {
                self.depth = self
                    .depth
                    .checked_sub(1)
                    .ok_or(CompileError::StackUnderflow)?;
            }
            (Operation::Call, Operands::Unary(target)) if self.depth % 2 == 1 => {
                let target = target.clone();
                return self.call_operand(target, instr.comment);
            }
            _ => {}
        }
        log::trace!("emit {:?}", instr);
        self.counters.instructions += 1;
        self.items.push(AsmItem::Instr(instr));
        Ok(())
    }

    pub fn nullary(&mut self, op: Operation) -> CompileResult<()> {
        self.emit(Instruction::nullary(op))
    }

    pub fn unary(&mut self, op: Operation, operand: impl Into<Operand>) -> CompileResult<()> {
        self.emit(Instruction::unary(op, operand.into()))
    }

    pub fn binary(
        &mut self,
        op: Operation,
        src: impl Into<Operand>,
        dst: impl Into<Operand>,
    ) -> CompileResult<()> {
        self.emit(Instruction::binary(op, src.into(), dst.into()))
    }

    /// Attach a trailing comment to the most recent instruction.
    pub fn annotate(&mut self, comment: impl Into<String>) {
        if let Some(AsmItem::Instr(instr)) = self.items.last_mut() {
            instr.comment = Some(comment.into());
        }
    }

    pub fn push(&mut self, operand: impl Into<Operand>) -> CompileResult<()> {
        self.unary(Operation::Push, operand)
    }

    pub fn pop(&mut self, operand: impl Into<Operand>) -> CompileResult<()> {
        self.unary(Operation::Pop, operand)
    }

    /// Call a label, padding the stack when the tracked depth is odd.
    pub fn call(&mut self, label: &str) -> CompileResult<()> {
        self.call_operand(Operand::label(label), None)
    }

    /// Call through a memory slot, e.g. a dispatch table entry, commenting the call itself.
    pub fn call_indirect(
        &mut self,
        slot: Memory,
        comment: impl Into<String>,
    ) -> CompileResult<()> {
        self.call_operand(Operand::Mem(slot), Some(comment.into()))
    }

    fn call_operand(&mut self, target: Operand, comment: Option<String>) -> CompileResult<()> {
        let pad = self.depth % 2 == 1;
        if pad {
            self.counters.alignment_pads += 1;
            self.push(Register::Arg3)?;
            self.annotate("align call");
        }
        let mut instr = Instruction::unary(Operation::Call, target);
        instr.comment = comment;
        self.counters.instructions += 1;
        self.items.push(AsmItem::Instr(instr));
        if pad {
            self.pop(Register::Arg3)?;
        }
        Ok(())
    }

    /// Allocate a fresh label for `base`, unique within this unit.
    pub fn next_label(&mut self, base: &str) -> String {
        let counter = self.label_counters.entry(base.to_string()).or_insert(0);
        let label = format!(".L{base}_{counter}");
        *counter += 1;
        self.counters.labels_allocated += 1;
        label
    }

    /// Place a label at the current position.
    pub fn label(&mut self, name: impl Into<String>) {
        self.items.push(AsmItem::Label(name.into()));
    }

    pub fn directive(&mut self, directive: Directive) {
        self.items.push(AsmItem::Directive(directive));
    }

    pub fn blank(&mut self) {
        self.items.push(AsmItem::Blank);
    }

    /// Save the caller's frame pointer and establish a new frame.
    ///
    /// Resets the tracked depth: the saved frame pointer is not counted.
    pub fn prologue(&mut self) -> CompileResult<()> {
        self.counters.instructions += 2;
        self.items.push(AsmItem::Instr(Instruction::unary(
            Operation::Push,
            Register::Fp.into(),
        )));
        self.items.push(AsmItem::Instr(Instruction::binary(
            Operation::Mov,
            Register::Sp.into(),
            Register::Fp.into(),
        )));
        self.depth = 0;
        Ok(())
    }

    /// Fail unless every push since the prologue has been popped.
    pub fn check_balanced(&self) -> CompileResult<()> {
        if self.depth != 0 {
            return Err(CompileError::UnbalancedStack { depth: self.depth });
        }
        Ok(())
    }

    /// Tear down the frame and return.
    pub fn epilogue(&mut self) -> CompileResult<()> {
        self.check_balanced()?;
        self.counters.instructions += 3;
        self.items.push(AsmItem::Instr(Instruction::binary(
            Operation::Mov,
            Register::Fp.into(),
            Register::Sp.into(),
        )));
        self.items.push(AsmItem::Instr(Instruction::unary(
            Operation::Pop,
            Register::Fp.into(),
        )));
        self.items.push(AsmItem::Instr(Instruction::nullary(Operation::Ret)));
        Ok(())
    }

    /// Render the stream to assembly text.
    pub fn render(
        &self,
        renderer: &dyn InstructionRenderer,
        comments: bool,
    ) -> CompileResult<String> {
        let mut out = String::new();
        let indent = " ".repeat(INDENT);
        for item in &self.items {
            match item {
                AsmItem::Label(label) => {
                    out.push_str(&renderer.render_label(label));
                    out.push('\n');
                }
                AsmItem::Directive(directive) => {
                    out.push_str(&indent);
                    out.push_str(&renderer.render_directive(directive)?);
                    out.push('\n');
                }
                AsmItem::Blank => out.push('\n'),
                AsmItem::Instr(instr) => {
                    let lines = renderer.render_instruction(instr)?;
                    for (i, line) in lines.iter().enumerate() {
                        let mut text = format!(
                            "{indent}{:<width$}{}",
                            line.mnemonic,
                            line.operands.join(", "),
                            width = MNEMONIC_WIDTH
                        );
                        let text_len = text.trim_end().len();
                        text.truncate(text_len);
                        if let (Some(comment), true) = (&instr.comment, i == 0 && comments) {
                            let pad = COMMENT_COLUMN.saturating_sub(text.len()).max(1);
                            let _ = write!(
                                text,
                                "{:pad$}{} {}",
                                "",
                                renderer.comment_marker(),
                                comment
                            );
                        }
                        out.push_str(&text);
                        out.push('\n');
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::x86_64::X86Renderer;

    fn render(emitter: &Emitter) -> String {
        let renderer = X86Renderer::new().unwrap();
        emitter.render(&renderer, true).unwrap()
    }

    #[test]
    fn test_push_pop_tracking() {
        let mut e = Emitter::new();
        e.prologue().unwrap();
        e.push(Register::Acc).unwrap();
        e.push(Register::Acc).unwrap();
        assert_eq!(e.depth(), 2);
        e.pop(Register::Arg2).unwrap();
        e.pop(Register::Arg2).unwrap();
        assert_eq!(e.depth(), 0);
        assert!(matches!(
            e.pop(Register::Arg2),
            Err(CompileError::StackUnderflow)
        ));
    }

    #[test]
    fn test_call_padding() {
        let mut e = Emitter::new();
        e.prologue().unwrap();
        e.call("put").unwrap();
        assert_eq!(e.counters().alignment_pads, 0);

        e.push(Register::Acc).unwrap();
        e.call("put").unwrap();
        assert_eq!(e.counters().alignment_pads, 1);
        assert_eq!(e.depth(), 1);
        e.pop(Register::Acc).unwrap();

        let text = render(&e);
        let calls: Vec<&str> = text.lines().filter(|l| l.contains("call")).collect();
        assert_eq!(calls.len(), 2);
        assert!(text.contains("pushq   %rcx"));
        assert!(text.contains("popq    %rcx"));
    }

    #[test]
    fn test_unary_call_is_padded_too() {
        let mut e = Emitter::new();
        e.push(Register::Acc).unwrap();
        e.unary(Operation::Call, Operand::label("put")).unwrap();
        assert_eq!(e.counters().alignment_pads, 1);
        assert_eq!(e.depth(), 1);
    }

    #[test]
    fn test_padded_indirect_call_keeps_comment() {
        let mut e = Emitter::new();
        e.prologue().unwrap();
        e.push(Register::Acc).unwrap();
        e.call_indirect(
            Memory {
                base: Register::Tmp0,
                offset: 8,
            },
            "method.A.f",
        )
        .unwrap();
        e.pop(Register::Acc).unwrap();

        let text = render(&e);
        let call = text.lines().find(|l| l.contains("call")).unwrap();
        assert!(call.contains("*8(%r10)"));
        assert!(call.ends_with("# method.A.f"), "{call}");
        let pad_pop = text.lines().find(|l| l.contains("popq    %rcx")).unwrap();
        assert!(!pad_pop.contains('#'), "{pad_pop}");
    }

    #[test]
    fn test_epilogue_requires_balance() {
        let mut e = Emitter::new();
        e.prologue().unwrap();
        e.push(Register::Acc).unwrap();
        assert!(matches!(
            e.epilogue(),
            Err(CompileError::UnbalancedStack { depth: 1 })
        ));
        e.pop(Register::Acc).unwrap();
        e.epilogue().unwrap();
    }

    #[test]
    fn test_label_uniqueness() {
        let mut e = Emitter::new();
        let labels: Vec<String> = (0..100).map(|_| e.next_label("loop")).collect();
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), 100);
        assert_eq!(labels[0], ".Lloop_0");
        assert_eq!(e.next_label("end"), ".Lend_0");
    }

    #[test]
    fn test_render_layout() {
        let mut e = Emitter::new();
        e.label("f");
        e.binary(Operation::Mov, 1i64, Register::Acc).unwrap();
        e.annotate("one");
        e.nullary(Operation::Ret).unwrap();
        let text = render(&e);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "f:");
        assert_eq!(lines[1], format!("{:<32}# one", "    movq    $1, %rax"));
        assert_eq!(lines[2], "    ret");
    }

    #[test]
    fn test_render_without_comments() {
        let mut e = Emitter::new();
        e.binary(Operation::Mov, 1i64, Register::Acc).unwrap();
        e.annotate("one");
        let renderer = X86Renderer::new().unwrap();
        let text = e.render(&renderer, false).unwrap();
        assert_eq!(text, "    movq    $1, %rax\n");
    }
}
