// This module renders abstract instructions as x86-64 assembly in AT&T syntax for the GNU
// assembler. The abstract registers map onto the System V convention: rax is the
// accumulator and return register, rdi/rsi/rdx/rcx/r8/r9 carry arguments in order, r10 and
// r11 are caller-saved temporaries, and rsp/rbp are the stack and frame pointers. Because
// the abstract instruction set is itself two-address with x86 operand order, rendering is
// almost entirely table lookup; the exceptions are shift counts held in a register (always
// rendered as %cl), 64-bit immediates on moves (movabsq), indirect calls (`call *`), and
// label operands of lea, which become rip-relative so the output links as position-
// independent code.

//! x86-64 (AT&T syntax) instruction rendering.

use super::{
    Arch, AsmLine, DataWord, Directive, DirectiveKind, Instruction, InstructionRenderer,
    MappingTable, Operand, Operands, Operation, Register, ScaledIndex,
};
use crate::core::error::{CompileError, CompileResult};

const ARCH: &str = "x86-64";

/// AT&T-syntax renderer for x86-64.
#[derive(Debug)]
pub struct X86Renderer {
    ops: MappingTable<Operation>,
    regs: MappingTable<Register>,
    directives: MappingTable<DirectiveKind>,
}

impl X86Renderer {
    pub fn new() -> CompileResult<Self> {
        use Operation::*;
        let ops = MappingTable::build(
            ARCH,
            &[
                (Mov, "movq"),
                (Lea, "leaq"),
                (Add, "addq"),
                (Sub, "subq"),
                (Imul, "imulq"),
                (Idiv, "idivq"),
                (Cqto, "cqto"),
                (Neg, "negq"),
                (Not, "notq"),
                (And, "andq"),
                (Or, "orq"),
                (Xor, "xorq"),
                (Shl, "shlq"),
                (Shr, "shrq"),
                (Sar, "sarq"),
                (Cmp, "cmpq"),
                (Test, "testq"),
                (Push, "pushq"),
                (Pop, "popq"),
                (Call, "call"),
                (Ret, "ret"),
                (Jmp, "jmp"),
                (Je, "je"),
                (Jne, "jne"),
                (Jl, "jl"),
                (Jle, "jle"),
                (Jg, "jg"),
                (Jge, "jge"),
            ],
            &Operation::ALL,
        )?;

        let regs = MappingTable::build(
            ARCH,
            &[
                (Register::Acc, "%rax"),
                (Register::Arg0, "%rdi"),
                (Register::Arg1, "%rsi"),
                (Register::Arg2, "%rdx"),
                (Register::Arg3, "%rcx"),
                (Register::Arg4, "%r8"),
                (Register::Arg5, "%r9"),
                (Register::Tmp0, "%r10"),
                (Register::Tmp1, "%r11"),
                (Register::Sp, "%rsp"),
                (Register::Fp, "%rbp"),
            ],
            &Register::ALL,
        )?;

        let directives = MappingTable::build(
            ARCH,
            &[
                (DirectiveKind::Text, ".text"),
                (DirectiveKind::Data, ".data"),
                (DirectiveKind::Global, ".globl"),
                (DirectiveKind::Quad, ".quad"),
                (DirectiveKind::Align, ".p2align"),
            ],
            &DirectiveKind::ALL,
        )?;

        Ok(Self {
            ops,
            regs,
            directives,
        })
    }

    fn reg(&self, reg: Register) -> CompileResult<String> {
        Ok(self.regs.get(reg)?.to_string())
    }

    fn operand(&self, operand: &Operand) -> CompileResult<String> {
        match operand {
            Operand::Reg(reg) => self.reg(*reg),
            Operand::Imm(value) => Ok(format!("${value}")),
            Operand::Mem(mem) => Ok(format!("{}({})", mem.offset, self.reg(mem.base)?)),
            Operand::Indexed(idx) => self.indexed(idx),
            Operand::Label(label) => Ok(label.clone()),
        }
    }

    fn indexed(&self, idx: &ScaledIndex) -> CompileResult<String> {
        if !matches!(idx.scale, 1 | 2 | 4 | 8) {
            return Err(CompileError::InvalidOperand {
                arch: ARCH,
                reason: format!("scale {} is not 1, 2, 4 or 8", idx.scale),
            });
        }
        Ok(format!(
            "{}({},{},{})",
            idx.offset,
            self.reg(idx.base)?,
            self.reg(idx.index)?,
            idx.scale
        ))
    }

    fn check_imm32(op: Operation, value: i64) -> CompileResult<()> {
        if i32::try_from(value).is_err() {
            return Err(CompileError::InvalidOperand {
                arch: ARCH,
                reason: format!("{op:?} immediate {value} does not fit in 32 bits"),
            });
        }
        Ok(())
    }

    fn render_binary(
        &self,
        op: Operation,
        src: &Operand,
        dst: &Operand,
    ) -> CompileResult<AsmLine> {
        if matches!(dst, Operand::Imm(_) | Operand::Label(_)) {
            return Err(CompileError::InvalidOperand {
                arch: ARCH,
                reason: format!("{op:?} destination must be a register or memory"),
            });
        }
        if src.is_memory() && dst.is_memory() {
            return Err(CompileError::InvalidOperand {
                arch: ARCH,
                reason: format!("{op:?} cannot take two memory operands"),
            });
        }

        let src_text = match (op, src) {
            (Operation::Mov, Operand::Imm(value)) if i32::try_from(*value).is_err() => {
                if !matches!(dst, Operand::Reg(_)) {
                    return Err(CompileError::InvalidOperand {
                        arch: ARCH,
                        reason: format!("64-bit immediate {value} stored to memory"),
                    });
                }
                return Ok(AsmLine::new(
                    "movabsq",
                    vec![format!("${value}"), self.operand(dst)?],
                ));
            }
            (_, Operand::Imm(value)) => {
                Self::check_imm32(op, *value)?;
                format!("${value}")
            }
            (_, Operand::Reg(Register::Arg3)) if op.is_shift() => "%cl".to_string(),
            (_, Operand::Reg(_)) if op.is_shift() => {
                return Err(CompileError::InvalidOperand {
                    arch: ARCH,
                    reason: "register shift count must live in the Arg3 register".into(),
                });
            }
            (Operation::Lea, Operand::Label(label)) => format!("{label}(%rip)"),
            (Operation::Lea, operand) if operand.is_memory() => self.operand(operand)?,
            (Operation::Lea, _) => {
                return Err(CompileError::InvalidOperand {
                    arch: ARCH,
                    reason: "lea source must be memory or a label".into(),
                });
            }
            (_, Operand::Label(label)) => format!("{label}(%rip)"),
            (_, operand) => self.operand(operand)?,
        };

        Ok(AsmLine::new(
            self.ops.get(op)?,
            vec![src_text, self.operand(dst)?],
        ))
    }

    fn render_unary(&self, op: Operation, operand: &Operand) -> CompileResult<AsmLine> {
        let mnemonic = self.ops.get(op)?;
        let text = match (op, operand) {
            (Operation::Call, Operand::Label(label)) => label.clone(),
            (Operation::Call, Operand::Reg(_)) | (Operation::Call, Operand::Mem(_)) => {
                format!("*{}", self.operand(operand)?)
            }
            (_, Operand::Label(label)) if op.is_jump() => label.clone(),
            (_, _) if op.is_jump() || op == Operation::Call => {
                return Err(CompileError::InvalidOperand {
                    arch: ARCH,
                    reason: format!("{op:?} target must be a label"),
                });
            }
            (Operation::Push, Operand::Imm(value)) => {
                Self::check_imm32(op, *value)?;
                format!("${value}")
            }
            (_, Operand::Imm(_)) | (_, Operand::Label(_)) => {
                return Err(CompileError::InvalidOperand {
                    arch: ARCH,
                    reason: format!("{op:?} needs a register or memory operand"),
                });
            }
            (_, operand) => self.operand(operand)?,
        };
        Ok(AsmLine::new(mnemonic, vec![text]))
    }
}

impl InstructionRenderer for X86Renderer {
    fn arch(&self) -> Arch {
        Arch::X86_64
    }

    fn render_instruction(&self, instr: &Instruction) -> CompileResult<Vec<AsmLine>> {
        let line = match &instr.operands {
            Operands::Nullary => AsmLine::new(self.ops.get(instr.op)?, Vec::new()),
            Operands::Unary(operand) => self.render_unary(instr.op, operand)?,
            Operands::Binary { src, dst } => self.render_binary(instr.op, src, dst)?,
        };
        Ok(vec![line])
    }

    fn render_directive(&self, directive: &Directive) -> CompileResult<String> {
        let keyword = self.directives.get(directive.kind())?;
        Ok(match directive {
            Directive::Section(_) => keyword.to_string(),
            Directive::Global(symbol) => format!("{keyword} {symbol}"),
            Directive::Align(log2) => format!("{keyword} {log2}"),
            Directive::Quad(words) => {
                let words: Vec<String> = words
                    .iter()
                    .map(|w| match w {
                        DataWord::Int(v) => v.to_string(),
                        DataWord::Label(l) => l.clone(),
                    })
                    .collect();
                format!("{keyword} {}", words.join(", "))
            }
        })
    }

    fn comment_marker(&self) -> &'static str {
        "#"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Section;

    fn render(instr: Instruction) -> String {
        let renderer = X86Renderer::new().unwrap();
        let lines = renderer.render_instruction(&instr).unwrap();
        assert_eq!(lines.len(), 1);
        format!("{} {}", lines[0].mnemonic, lines[0].operands.join(", "))
            .trim_end()
            .to_string()
    }

    #[test]
    fn test_basic_operands() {
        assert_eq!(
            render(Instruction::binary(
                Operation::Mov,
                Operand::Imm(5),
                Register::Acc.into()
            )),
            "movq $5, %rax"
        );
        assert_eq!(
            render(Instruction::binary(
                Operation::Mov,
                Operand::mem(Register::Fp, -16),
                Register::Acc.into()
            )),
            "movq -16(%rbp), %rax"
        );
        assert_eq!(
            render(Instruction::binary(
                Operation::Lea,
                Operand::indexed(Register::Arg2, Register::Acc, 8, 8),
                Register::Acc.into()
            )),
            "leaq 8(%rdx,%rax,8), %rax"
        );
        assert_eq!(render(Instruction::nullary(Operation::Cqto)), "cqto");
    }

    #[test]
    fn test_special_forms() {
        assert_eq!(
            render(Instruction::binary(
                Operation::Shl,
                Register::Arg3.into(),
                Register::Acc.into()
            )),
            "shlq %cl, %rax"
        );
        assert_eq!(
            render(Instruction::binary(
                Operation::Mov,
                Operand::Imm(1 << 40),
                Register::Acc.into()
            )),
            "movabsq $1099511627776, %rax"
        );
        assert_eq!(
            render(Instruction::unary(
                Operation::Call,
                Operand::mem(Register::Tmp0, 16)
            )),
            "call *16(%r10)"
        );
        assert_eq!(
            render(Instruction::binary(
                Operation::Lea,
                Operand::label("vtable.A"),
                Register::Tmp0.into()
            )),
            "leaq vtable.A(%rip), %r10"
        );
    }

    #[test]
    fn test_rejects_unencodable_operands() {
        let renderer = X86Renderer::new().unwrap();
        let two_mem = Instruction::binary(
            Operation::Add,
            Operand::mem(Register::Fp, -8),
            Operand::mem(Register::Fp, -16),
        );
        assert!(renderer.render_instruction(&two_mem).is_err());

        let wide = Instruction::binary(Operation::Add, Operand::Imm(1 << 40), Register::Acc.into());
        assert!(renderer.render_instruction(&wide).is_err());

        let bad_shift =
            Instruction::binary(Operation::Shl, Register::Arg2.into(), Register::Acc.into());
        assert!(renderer.render_instruction(&bad_shift).is_err());
    }

    #[test]
    fn test_directives() {
        let renderer = X86Renderer::new().unwrap();
        assert_eq!(
            renderer
                .render_directive(&Directive::Section(Section::Data))
                .unwrap(),
            ".data"
        );
        assert_eq!(
            renderer
                .render_directive(&Directive::Quad(vec![
                    DataWord::Int(0),
                    DataWord::Label("method.A.f".into())
                ]))
                .unwrap(),
            ".quad 0, method.A.f"
        );
    }
}
