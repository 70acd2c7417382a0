// This module renders abstract instructions as AArch64 assembly for the GNU/LLVM
// assemblers. AArch64 is a load/store architecture, so an abstract two-address instruction
// with a memory or wide immediate operand expands into a short sequence that stages the
// operand through reserved scratch registers: x12/x13 for computed addresses and x16/x17
// (the intra-procedure-call scratch pair) for values. Register mapping: x9 is the
// accumulator, x0-x5 carry arguments, x10/x11 are temporaries, x29 is the frame pointer.
// Keeping the accumulator out of x0 lets argument setup and the accumulator coexist; calls
// copy x0 into the accumulator afterwards and returns copy it back. The stack pointer must
// stay 16-byte aligned, so every push and pop moves it by 16 bytes, and saving the frame
// pointer always saves the link register alongside it (stp/ldp). cqto has no counterpart:
// idiv lowers to sdiv + msub, producing the quotient in the accumulator and the remainder
// in the Arg2 register exactly like x86 idiv does.

//! AArch64 instruction rendering.

use super::{
    Arch, AsmLine, DataWord, Directive, DirectiveKind, Instruction, InstructionRenderer,
    MappingTable, Operand, Operands, Operation, Register,
};
use crate::core::error::{CompileError, CompileResult};

const ARCH: &str = "arm64";

/// Scratch register for computed addresses.
const ADDR: &str = "x12";
/// Second address scratch, for offsets too wide for an immediate.
const ADDR_OFFSET: &str = "x13";
/// Scratch register for staged source values.
const VAL: &str = "x16";
/// Scratch register for staged destination values.
const VAL_DST: &str = "x17";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Load,
    Store,
}

/// Renderer for AArch64.
#[derive(Debug)]
pub struct Arm64Renderer {
    ops: MappingTable<Operation>,
    regs: MappingTable<Register>,
    directives: MappingTable<DirectiveKind>,
}

impl Arm64Renderer {
    pub fn new() -> CompileResult<Self> {
        use Operation::*;
        let ops = MappingTable::build(
            ARCH,
            &[
                (Mov, "mov"),
                (Lea, "add"),
                (Add, "add"),
                (Sub, "sub"),
                (Imul, "mul"),
                (Idiv, "sdiv"),
                // Folded into the sdiv/msub pair.
                (Cqto, ""),
                (Neg, "neg"),
                (Not, "mvn"),
                (And, "and"),
                (Or, "orr"),
                (Xor, "eor"),
                (Shl, "lsl"),
                (Shr, "lsr"),
                (Sar, "asr"),
                (Cmp, "cmp"),
                (Test, "tst"),
                (Push, "str"),
                (Pop, "ldr"),
                (Call, "bl"),
                (Ret, "ret"),
                (Jmp, "b"),
                (Je, "b.eq"),
                (Jne, "b.ne"),
                (Jl, "b.lt"),
                (Jle, "b.le"),
                (Jg, "b.gt"),
                (Jge, "b.ge"),
            ],
            &Operation::ALL,
        )?;

        let regs = MappingTable::build(
            ARCH,
            &[
                (Register::Acc, "x9"),
                (Register::Arg0, "x0"),
                (Register::Arg1, "x1"),
                (Register::Arg2, "x2"),
                (Register::Arg3, "x3"),
                (Register::Arg4, "x4"),
                (Register::Arg5, "x5"),
                (Register::Tmp0, "x10"),
                (Register::Tmp1, "x11"),
                (Register::Sp, "sp"),
                (Register::Fp, "x29"),
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

    fn invalid(reason: impl Into<String>) -> CompileError {
        CompileError::InvalidOperand {
            arch: ARCH,
            reason: reason.into(),
        }
    }

    fn line(mnemonic: &str, operands: &[&str]) -> AsmLine {
        AsmLine::new(mnemonic, operands.iter().map(|s| s.to_string()).collect())
    }

    /// Materialize an arbitrary 64-bit constant into `dst`.
    fn load_imm(dst: &str, value: i64, out: &mut Vec<AsmLine>) {
        if (-65536..=65535).contains(&value) {
            out.push(Self::line("mov", &[dst, &format!("#{value}")]));
            return;
        }
        let bits = value as u64;
        out.push(Self::line("movz", &[dst, &format!("#{}", bits & 0xffff)]));
        for shift in [16u32, 32, 48] {
            let chunk = (bits >> shift) & 0xffff;
            if chunk != 0 {
                out.push(Self::line(
                    "movk",
                    &[dst, &format!("#{chunk}"), &format!("lsl #{shift}")],
                ));
            }
        }
    }

    /// Load the address of `label` into `dst`.
    fn load_label(dst: &str, label: &str, out: &mut Vec<AsmLine>) {
        out.push(Self::line("adrp", &[dst, label]));
        out.push(Self::line("add", &[dst, dst, &format!(":lo12:{label}")]));
    }

    /// Reduce a memory operand to a base register and a byte offset, emitting the
    /// index computation for scaled-index operands.
    fn address_parts(
        &self,
        operand: &Operand,
        out: &mut Vec<AsmLine>,
    ) -> CompileResult<(String, i64)> {
        match operand {
            Operand::Mem(mem) => Ok((self.reg(mem.base)?, mem.offset)),
            Operand::Indexed(idx) => {
                let shift = match idx.scale {
                    1 => 0,
                    2 => 1,
                    4 => 2,
                    8 => 3,
                    other => return Err(Self::invalid(format!("scale {other} is not a power of two up to 8"))),
                };
                if idx.base == Register::Sp || idx.index == Register::Sp {
                    return Err(Self::invalid("sp cannot take part in a scaled index"));
                }
                let base = self.reg(idx.base)?;
                let index = self.reg(idx.index)?;
                if shift == 0 {
                    out.push(Self::line("add", &[ADDR, &base, &index]));
                } else {
                    out.push(Self::line(
                        "add",
                        &[ADDR, &base, &index, &format!("lsl #{shift}")],
                    ));
                }
                Ok((ADDR.to_string(), idx.offset))
            }
            other => Err(Self::invalid(format!("{other:?} is not a memory operand"))),
        }
    }

    fn mem_access(
        &self,
        access: Access,
        reg: &str,
        operand: &Operand,
        out: &mut Vec<AsmLine>,
    ) -> CompileResult<()> {
        let (base, offset) = self.address_parts(operand, out)?;
        let (unscaled, scaled) = match access {
            Access::Load => ("ldur", "ldr"),
            Access::Store => ("stur", "str"),
        };
        if (-256..=255).contains(&offset) {
            out.push(Self::line(unscaled, &[reg, &format!("[{base}, #{offset}]")]));
        } else if offset > 0 && offset % 8 == 0 && offset / 8 < 4096 {
            out.push(Self::line(scaled, &[reg, &format!("[{base}, #{offset}]")]));
        } else {
            Self::load_imm(ADDR_OFFSET, offset, out);
            out.push(Self::line("add", &[ADDR, &base, ADDR_OFFSET]));
            out.push(Self::line(scaled, &[reg, &format!("[{ADDR}]")]));
        }
        Ok(())
    }

    /// Name a register holding the value of `operand`, staging it through `scratch`
    /// when it is not already in a register.
    fn value_reg(
        &self,
        operand: &Operand,
        scratch: &str,
        out: &mut Vec<AsmLine>,
    ) -> CompileResult<String> {
        match operand {
            Operand::Reg(reg) => self.reg(*reg),
            Operand::Imm(value) => {
                Self::load_imm(scratch, *value, out);
                Ok(scratch.to_string())
            }
            Operand::Mem(_) | Operand::Indexed(_) => {
                self.mem_access(Access::Load, scratch, operand, out)?;
                Ok(scratch.to_string())
            }
            Operand::Label(label) => {
                Self::load_label(scratch, label, out);
                Ok(scratch.to_string())
            }
        }
    }

    /// `dst = base + offset` for an address computation.
    fn add_offset(
        dst: &str,
        base: &str,
        offset: i64,
        out: &mut Vec<AsmLine>,
    ) {
        if (0..=4095).contains(&offset) {
            out.push(Self::line("add", &[dst, base, &format!("#{offset}")]));
        } else if (-4095..0).contains(&offset) {
            out.push(Self::line("sub", &[dst, base, &format!("#{}", -offset)]));
        } else {
            Self::load_imm(ADDR_OFFSET, offset, out);
            out.push(Self::line("add", &[dst, base, ADDR_OFFSET]));
        }
    }

    fn render_mov(
        &self,
        src: &Operand,
        dst: &Operand,
        out: &mut Vec<AsmLine>,
    ) -> CompileResult<()> {
        match dst {
            Operand::Reg(reg) => {
                let d = self.reg(*reg)?;
                match src {
                    Operand::Reg(s) => out.push(Self::line("mov", &[&d, &self.reg(*s)?])),
                    Operand::Imm(value) => Self::load_imm(&d, *value, out),
                    Operand::Mem(_) | Operand::Indexed(_) => {
                        self.mem_access(Access::Load, &d, src, out)?
                    }
                    Operand::Label(label) => Self::load_label(&d, label, out),
                }
            }
            Operand::Mem(_) | Operand::Indexed(_) => {
                if src.is_memory() {
                    return Err(Self::invalid("mov cannot take two memory operands"));
                }
                let v = self.value_reg(src, VAL, out)?;
                self.mem_access(Access::Store, &v, dst, out)?;
            }
            _ => return Err(Self::invalid("mov destination must be a register or memory")),
        }
        Ok(())
    }

    fn render_lea(
        &self,
        src: &Operand,
        dst: &Operand,
        out: &mut Vec<AsmLine>,
    ) -> CompileResult<()> {
        let Operand::Reg(reg) = dst else {
            return Err(Self::invalid("lea destination must be a register"));
        };
        let d = self.reg(*reg)?;
        match src {
            Operand::Label(label) => Self::load_label(&d, label, out),
            Operand::Mem(_) | Operand::Indexed(_) => {
                let (base, offset) = self.address_parts(src, out)?;
                Self::add_offset(&d, &base, offset, out);
            }
            _ => return Err(Self::invalid("lea source must be memory or a label")),
        }
        Ok(())
    }

    /// Run `body` with the destination in a register, loading and storing it back when
    /// the destination lives in memory.
    fn with_dst(
        &self,
        dst: &Operand,
        out: &mut Vec<AsmLine>,
        body: impl FnOnce(&str, &mut Vec<AsmLine>) -> CompileResult<()>,
    ) -> CompileResult<()> {
        match dst {
            Operand::Reg(reg) => body(&self.reg(*reg)?, out),
            Operand::Mem(_) | Operand::Indexed(_) => {
                self.mem_access(Access::Load, VAL_DST, dst, out)?;
                body(VAL_DST, out)?;
                self.mem_access(Access::Store, VAL_DST, dst, out)
            }
            _ => Err(Self::invalid("destination must be a register or memory")),
        }
    }

    fn render_arith(
        &self,
        op: Operation,
        src: &Operand,
        dst: &Operand,
        out: &mut Vec<AsmLine>,
    ) -> CompileResult<()> {
        let mnemonic = self.ops.get(op)?;
        self.with_dst(dst, out, |d, out| {
            match (op, src) {
                (Operation::Add | Operation::Sub, Operand::Imm(value))
                    if (-4095..=4095).contains(value) =>
                {
                    let flipped = *value < 0;
                    let mnemonic = match (op, flipped) {
                        (Operation::Add, false) | (Operation::Sub, true) => "add",
                        _ => "sub",
                    };
                    out.push(Self::line(mnemonic, &[d, d, &format!("#{}", value.abs())]));
                }
                (_, Operand::Imm(value)) if op.is_shift() => {
                    if !(0..64).contains(value) {
                        return Err(Self::invalid(format!("shift amount {value} out of range")));
                    }
                    out.push(Self::line(mnemonic, &[d, d, &format!("#{value}")]));
                }
                _ => {
                    let s = self.value_reg(src, VAL, out)?;
                    out.push(Self::line(mnemonic, &[d, d, &s]));
                }
            }
            Ok(())
        })
    }

    fn render_compare(
        &self,
        op: Operation,
        src: &Operand,
        dst: &Operand,
        out: &mut Vec<AsmLine>,
    ) -> CompileResult<()> {
        let d = match dst {
            Operand::Reg(reg) => self.reg(*reg)?,
            Operand::Mem(_) | Operand::Indexed(_) => {
                self.mem_access(Access::Load, VAL_DST, dst, out)?;
                VAL_DST.to_string()
            }
            _ => return Err(Self::invalid("compare destination must be a register or memory")),
        };
        match (op, src) {
            (Operation::Cmp, Operand::Imm(value)) if (0..=4095).contains(value) => {
                out.push(Self::line("cmp", &[&d, &format!("#{value}")]));
            }
            (Operation::Cmp, Operand::Imm(value)) if (-4095..0).contains(value) => {
                out.push(Self::line("cmn", &[&d, &format!("#{}", -value)]));
            }
            _ => {
                let s = self.value_reg(src, VAL, out)?;
                out.push(Self::line(self.ops.get(op)?, &[&d, &s]));
            }
        }
        Ok(())
    }

    fn render_push(&self, operand: &Operand, out: &mut Vec<AsmLine>) -> CompileResult<()> {
        match operand {
            Operand::Reg(Register::Fp) => {
                out.push(Self::line("stp", &["x29", "x30", "[sp, #-16]!"]));
            }
            _ => {
                let v = self.value_reg(operand, VAL, out)?;
                out.push(Self::line("str", &[&v, "[sp, #-16]!"]));
            }
        }
        Ok(())
    }

    fn render_pop(&self, operand: &Operand, out: &mut Vec<AsmLine>) -> CompileResult<()> {
        match operand {
            Operand::Reg(Register::Fp) => {
                out.push(Self::line("ldp", &["x29", "x30", "[sp]", "#16"]));
            }
            Operand::Reg(reg) => {
                out.push(Self::line("ldr", &[&self.reg(*reg)?, "[sp]", "#16"]));
            }
            Operand::Mem(_) | Operand::Indexed(_) => {
                out.push(Self::line("ldr", &[VAL, "[sp]", "#16"]));
                self.mem_access(Access::Store, VAL, operand, out)?;
            }
            _ => return Err(Self::invalid("pop destination must be a register or memory")),
        }
        Ok(())
    }

    fn render_call(&self, target: &Operand, out: &mut Vec<AsmLine>) -> CompileResult<()> {
        match target {
            Operand::Label(label) => out.push(Self::line("bl", &[label])),
            Operand::Reg(reg) => out.push(Self::line("blr", &[&self.reg(*reg)?])),
            Operand::Mem(_) | Operand::Indexed(_) => {
                self.mem_access(Access::Load, VAL, target, out)?;
                out.push(Self::line("blr", &[VAL]));
            }
            Operand::Imm(_) => return Err(Self::invalid("call target cannot be an immediate")),
        }
        let acc = self.reg(Register::Acc)?;
        out.push(Self::line("mov", &[&acc, "x0"]));
        Ok(())
    }

    fn render_idiv(&self, divisor: &Operand, out: &mut Vec<AsmLine>) -> CompileResult<()> {
        let acc = self.reg(Register::Acc)?;
        let rem = self.reg(Register::Arg2)?;
        let s = self.value_reg(divisor, VAL_DST, out)?;
        out.push(Self::line("sdiv", &[VAL, &acc, &s]));
        out.push(Self::line("msub", &[&rem, VAL, &s, &acc]));
        out.push(Self::line("mov", &[&acc, VAL]));
        Ok(())
    }

    fn render_unary_arith(
        &self,
        op: Operation,
        operand: &Operand,
        out: &mut Vec<AsmLine>,
    ) -> CompileResult<()> {
        let mnemonic = self.ops.get(op)?;
        self.with_dst(operand, out, |d, out| {
            out.push(Self::line(mnemonic, &[d, d]));
            Ok(())
        })
    }
}

impl InstructionRenderer for Arm64Renderer {
    fn arch(&self) -> Arch {
        Arch::Arm64
    }

    fn render_instruction(&self, instr: &Instruction) -> CompileResult<Vec<AsmLine>> {
        let mut out = Vec::new();
        let op = instr.op;
        match &instr.operands {
            Operands::Nullary => match op {
                Operation::Cqto => {}
                Operation::Ret => {
                    let acc = self.reg(Register::Acc)?;
                    out.push(Self::line("mov", &["x0", &acc]));
                    out.push(Self::line(self.ops.get(op)?, &[]));
                }
                _ => return Err(Self::invalid(format!("{op:?} needs operands"))),
            },
            Operands::Unary(operand) => match op {
                Operation::Push => self.render_push(operand, &mut out)?,
                Operation::Pop => self.render_pop(operand, &mut out)?,
                Operation::Call => self.render_call(operand, &mut out)?,
                Operation::Idiv => self.render_idiv(operand, &mut out)?,
                Operation::Neg | Operation::Not => {
                    self.render_unary_arith(op, operand, &mut out)?
                }
                _ if op.is_jump() => {
                    let Operand::Label(label) = operand else {
                        return Err(Self::invalid(format!("{op:?} target must be a label")));
                    };
                    out.push(Self::line(self.ops.get(op)?, &[label]));
                }
                _ => return Err(Self::invalid(format!("{op:?} is not a unary operation"))),
            },
            Operands::Binary { src, dst } => match op {
                Operation::Mov => self.render_mov(src, dst, &mut out)?,
                Operation::Lea => self.render_lea(src, dst, &mut out)?,
                Operation::Cmp | Operation::Test => {
                    self.render_compare(op, src, dst, &mut out)?
                }
                Operation::Add
                | Operation::Sub
                | Operation::Imul
                | Operation::And
                | Operation::Or
                | Operation::Xor
                | Operation::Shl
                | Operation::Shr
                | Operation::Sar => self.render_arith(op, src, dst, &mut out)?,
                _ => return Err(Self::invalid(format!("{op:?} is not a binary operation"))),
            },
        }
        Ok(out)
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
        "//"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(instr: Instruction) -> Vec<String> {
        let renderer = Arm64Renderer::new().unwrap();
        renderer
            .render_instruction(&instr)
            .unwrap()
            .into_iter()
            .map(|l| format!("{} {}", l.mnemonic, l.operands.join(", ")).trim_end().to_string())
            .collect()
    }

    #[test]
    fn test_frame_idioms() {
        assert_eq!(
            render(Instruction::unary(Operation::Push, Register::Fp.into())),
            vec!["stp x29, x30, [sp, #-16]!"]
        );
        assert_eq!(
            render(Instruction::unary(Operation::Pop, Register::Fp.into())),
            vec!["ldp x29, x30, [sp], #16"]
        );
        assert_eq!(
            render(Instruction::binary(
                Operation::Mov,
                Register::Sp.into(),
                Register::Fp.into()
            )),
            vec!["mov x29, sp"]
        );
        assert_eq!(
            render(Instruction::nullary(Operation::Ret)),
            vec!["mov x0, x9", "ret"]
        );
    }

    #[test]
    fn test_memory_operands_are_staged() {
        assert_eq!(
            render(Instruction::binary(
                Operation::Mov,
                Operand::mem(Register::Fp, -16),
                Register::Acc.into()
            )),
            vec!["ldur x9, [x29, #-16]"]
        );
        assert_eq!(
            render(Instruction::binary(
                Operation::Add,
                Operand::mem(Register::Arg2, 0),
                Register::Acc.into()
            )),
            vec!["ldur x16, [x2, #0]", "add x9, x9, x16"]
        );
        assert_eq!(
            render(Instruction::binary(
                Operation::Mov,
                Register::Acc.into(),
                Operand::indexed(Register::Arg2, Register::Tmp0, 8, 8)
            )),
            vec!["add x12, x2, x10, lsl #3", "stur x9, [x12, #8]"]
        );
        assert_eq!(
            render(Instruction::binary(
                Operation::Mov,
                Operand::mem(Register::Acc, 4096),
                Register::Acc.into()
            )),
            vec!["ldr x9, [x9, #4096]"]
        );
    }

    #[test]
    fn test_immediates() {
        assert_eq!(
            render(Instruction::binary(
                Operation::Sub,
                Operand::Imm(-8),
                Register::Acc.into()
            )),
            vec!["add x9, x9, #8"]
        );
        assert_eq!(
            render(Instruction::binary(
                Operation::Cmp,
                Operand::Imm(-1),
                Register::Acc.into()
            )),
            vec!["cmn x9, #1"]
        );
        assert_eq!(
            render(Instruction::binary(
                Operation::Mov,
                Operand::Imm(0x1_0000_0005),
                Register::Acc.into()
            )),
            vec!["movz x9, #5", "movk x9, #1, lsl #32"]
        );
    }

    #[test]
    fn test_calls_and_division() {
        assert_eq!(
            render(Instruction::unary(Operation::Call, Operand::label("put"))),
            vec!["bl put", "mov x9, x0"]
        );
        assert_eq!(
            render(Instruction::unary(
                Operation::Call,
                Operand::mem(Register::Tmp0, 8)
            )),
            vec!["ldur x16, [x10, #8]", "blr x16", "mov x9, x0"]
        );
        assert!(render(Instruction::nullary(Operation::Cqto)).is_empty());
        assert_eq!(
            render(Instruction::unary(Operation::Idiv, Register::Tmp0.into())),
            vec!["sdiv x16, x9, x10", "msub x2, x16, x10, x9", "mov x9, x16"]
        );
    }

    #[test]
    fn test_label_addresses() {
        assert_eq!(
            render(Instruction::binary(
                Operation::Lea,
                Operand::label("vtable.A"),
                Register::Tmp0.into()
            )),
            vec!["adrp x10, vtable.A", "add x10, x10, :lo12:vtable.A"]
        );
    }
}
