// This module defines the target-independent instruction vocabulary used by every other
// part of the backend: operations, abstract registers, operands (register, immediate,
// base-plus-offset memory, base-plus-scaled-index memory, label), data directives, and the
// Instruction value type that carries them. Instructions are plain data; turning them into
// text is the job of an InstructionRenderer, implemented once per target architecture and
// selected by renderer_for() before any code is emitted. Each renderer builds lookup tables
// for operations, registers and directive keywords in its constructor and checks them
// against the complete vocabulary lists exported here, so a missing mapping surfaces as a
// construction-time UnregisteredMapping error. Operand order follows the two-address
// source/destination convention: binary instructions compute `dst = dst op src`, and Cmp
// sets flags from `dst - src`. Nothing outside isa/ knows a mnemonic.

//! Target-independent instruction vocabulary and the rendering strategy interface.
//!
//! # Components
//!
//! - [`Operation`], [`Register`], [`Operand`], [`Instruction`] - abstract instructions
//! - [`Directive`] - section, symbol and data directives
//! - [`InstructionRenderer`] - per-architecture text rendering
//! - [`x86_64`] and [`arm64`] - the two supported targets

pub mod arm64;
pub mod x86_64;

use crate::core::error::{CompileError, CompileResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Size of one machine word in bytes. Every value the language manipulates is one word.
pub const WORD_SIZE: i64 = 8;

/// Target instruction set architecture.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum, Serialize, Deserialize,
)]
pub enum Arch {
    /// x86-64, AT&T syntax, System V calling convention.
    #[default]
    #[value(name = "x86-64", alias = "x86_64")]
    #[serde(rename = "x86-64", alias = "x86_64")]
    X86_64,
    /// AArch64, GNU assembler syntax, AAPCS64 calling convention.
    #[value(name = "arm64", alias = "aarch64")]
    #[serde(rename = "arm64", alias = "aarch64")]
    Arm64,
}

impl Arch {
    pub const ALL: [Arch; 2] = [Arch::X86_64, Arch::Arm64];

    /// Short name used in diagnostics and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86-64",
            Arch::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86-64" | "x86_64" | "amd64" => Ok(Arch::X86_64),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            other => Err(format!("unknown target architecture `{other}`")),
        }
    }
}

/// Abstract operation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Mov,
    Lea,
    Add,
    Sub,
    Imul,
    /// Signed division of the accumulator; quotient to the accumulator, remainder to `Arg2`.
    Idiv,
    /// Sign-extends the accumulator ahead of `Idiv`.
    Cqto,
    Neg,
    Not,
    And,
    Or,
    Xor,
    Shl,
    /// Logical right shift.
    Shr,
    /// Arithmetic right shift.
    Sar,
    Cmp,
    Test,
    Push,
    Pop,
    Call,
    Ret,
    Jmp,
    Je,
    Jne,
    Jl,
    Jle,
    Jg,
    Jge,
}

impl Operation {
    pub const ALL: [Operation; 28] = [
        Operation::Mov,
        Operation::Lea,
        Operation::Add,
        Operation::Sub,
        Operation::Imul,
        Operation::Idiv,
        Operation::Cqto,
        Operation::Neg,
        Operation::Not,
        Operation::And,
        Operation::Or,
        Operation::Xor,
        Operation::Shl,
        Operation::Shr,
        Operation::Sar,
        Operation::Cmp,
        Operation::Test,
        Operation::Push,
        Operation::Pop,
        Operation::Call,
        Operation::Ret,
        Operation::Jmp,
        Operation::Je,
        Operation::Jne,
        Operation::Jl,
        Operation::Jle,
        Operation::Jg,
        Operation::Jge,
    ];

    /// Whether this is a jump (conditional or not) taking a label operand.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Operation::Jmp
                | Operation::Je
                | Operation::Jne
                | Operation::Jl
                | Operation::Jle
                | Operation::Jg
                | Operation::Jge
        )
    }

    /// Whether this is one of the shift family.
    pub fn is_shift(self) -> bool {
        matches!(self, Operation::Shl | Operation::Shr | Operation::Sar)
    }
}

/// Abstract register.
///
/// The backend needs an accumulator, six argument registers, two caller-saved temporaries,
/// and the stack and frame pointers. Each renderer maps these onto real registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Holds the result of the expression evaluated last, and return values.
    Acc,
    Arg0,
    Arg1,
    Arg2,
    /// Also the shift-count register.
    Arg3,
    Arg4,
    Arg5,
    Tmp0,
    Tmp1,
    Sp,
    Fp,
}

impl Register {
    pub const ALL: [Register; 11] = [
        Register::Acc,
        Register::Arg0,
        Register::Arg1,
        Register::Arg2,
        Register::Arg3,
        Register::Arg4,
        Register::Arg5,
        Register::Tmp0,
        Register::Tmp1,
        Register::Sp,
        Register::Fp,
    ];

    /// Argument-passing registers in calling-convention order.
    pub const ARGS: [Register; 6] = [
        Register::Arg0,
        Register::Arg1,
        Register::Arg2,
        Register::Arg3,
        Register::Arg4,
        Register::Arg5,
    ];

    /// The `n`th argument register, if the convention has one.
    pub fn arg(n: usize) -> Option<Register> {
        Self::ARGS.get(n).copied()
    }
}

/// Memory at `offset(base)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Memory {
    pub base: Register,
    pub offset: i64,
}

/// Memory at `offset(base,index,scale)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaledIndex {
    pub base: Register,
    pub index: Register,
    pub scale: u8,
    pub offset: i64,
}

/// Instruction operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg(Register),
    Imm(i64),
    Mem(Memory),
    Indexed(ScaledIndex),
    Label(String),
}

impl Operand {
    /// Memory operand at `offset(base)`.
    pub fn mem(base: Register, offset: i64) -> Self {
        Operand::Mem(Memory { base, offset })
    }

    /// Memory operand at `offset(base,index,scale)`.
    pub fn indexed(base: Register, index: Register, scale: u8, offset: i64) -> Self {
        Operand::Indexed(ScaledIndex {
            base,
            index,
            scale,
            offset,
        })
    }

    pub fn label(name: impl Into<String>) -> Self {
        Operand::Label(name.into())
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Operand::Mem(_) | Operand::Indexed(_))
    }
}

impl From<Register> for Operand {
    fn from(reg: Register) -> Self {
        Operand::Reg(reg)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Imm(value)
    }
}

impl From<Memory> for Operand {
    fn from(mem: Memory) -> Self {
        Operand::Mem(mem)
    }
}

/// Operand shape of an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operands {
    Nullary,
    Unary(Operand),
    /// Two-address form: `dst = dst op src`.
    Binary { src: Operand, dst: Operand },
}

/// An abstract instruction: an operation, its operands, and an optional trailing comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub op: Operation,
    pub operands: Operands,
    pub comment: Option<String>,
}

impl Instruction {
    pub fn nullary(op: Operation) -> Self {
        Self {
            op,
            operands: Operands::Nullary,
            comment: None,
        }
    }

    pub fn unary(op: Operation, operand: Operand) -> Self {
        Self {
            op,
            operands: Operands::Unary(operand),
            comment: None,
        }
    }

    pub fn binary(op: Operation, src: Operand, dst: Operand) -> Self {
        Self {
            op,
            operands: Operands::Binary { src, dst },
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Output section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Text,
    Data,
}

/// One word of static data: an integer or the address of a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataWord {
    Int(i64),
    Label(String),
}

/// Assembler directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Section(Section),
    Global(String),
    Quad(Vec<DataWord>),
    /// Align to `2^n` bytes.
    Align(u32),
}

/// Directive keyword, the unit the per-architecture tables map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Text,
    Data,
    Global,
    Quad,
    Align,
}

impl DirectiveKind {
    pub const ALL: [DirectiveKind; 5] = [
        DirectiveKind::Text,
        DirectiveKind::Data,
        DirectiveKind::Global,
        DirectiveKind::Quad,
        DirectiveKind::Align,
    ];
}

impl Directive {
    pub fn kind(&self) -> DirectiveKind {
        match self {
            Directive::Section(Section::Text) => DirectiveKind::Text,
            Directive::Section(Section::Data) => DirectiveKind::Data,
            Directive::Global(_) => DirectiveKind::Global,
            Directive::Quad(_) => DirectiveKind::Quad,
            Directive::Align(_) => DirectiveKind::Align,
        }
    }
}

/// One rendered machine instruction: a mnemonic and its operand texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmLine {
    pub mnemonic: String,
    pub operands: Vec<String>,
}

impl AsmLine {
    pub fn new(mnemonic: impl Into<String>, operands: Vec<String>) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            operands,
        }
    }
}

/// Per-architecture rendering strategy.
///
/// An abstract instruction may expand to several machine instructions (ARM64 has no
/// memory operands on arithmetic, for instance) or to none.
pub trait InstructionRenderer {
    /// The architecture this renderer targets.
    fn arch(&self) -> Arch;

    /// Render one abstract instruction.
    fn render_instruction(&self, instr: &Instruction) -> CompileResult<Vec<AsmLine>>;

    /// Render one directive, without indentation.
    fn render_directive(&self, directive: &Directive) -> CompileResult<String>;

    /// Line comment marker.
    fn comment_marker(&self) -> &'static str;

    /// Render a label definition.
    fn render_label(&self, label: &str) -> String {
        format!("{label}:")
    }
}

/// Create the renderer for `arch`. Fails if its mapping tables are incomplete.
pub fn renderer_for(arch: Arch) -> CompileResult<Box<dyn InstructionRenderer>> {
    let renderer: Box<dyn InstructionRenderer> = match arch {
        Arch::X86_64 => Box::new(x86_64::X86Renderer::new()?),
        Arch::Arm64 => Box::new(arm64::Arm64Renderer::new()?),
    };
    log::debug!("bound instruction renderer for {arch}");
    Ok(renderer)
}

/// Lookup table from an abstract vocabulary item to its text on one architecture.
///
/// Construction checks that every item in `all` is present.
#[derive(Debug)]
pub(crate) struct MappingTable<K: Copy + Eq + std::hash::Hash + fmt::Debug> {
    arch: &'static str,
    entries: HashMap<K, &'static str>,
}

impl<K: Copy + Eq + std::hash::Hash + fmt::Debug> MappingTable<K> {
    pub(crate) fn build(
        arch: &'static str,
        entries: &[(K, &'static str)],
        all: &[K],
    ) -> CompileResult<Self> {
        let entries: HashMap<K, &'static str> = entries.iter().copied().collect();
        if let Some(missing) = all.iter().find(|k| !entries.contains_key(k)) {
            return Err(CompileError::UnregisteredMapping {
                arch,
                item: format!("{missing:?}"),
            });
        }
        Ok(Self { arch, entries })
    }

    pub(crate) fn get(&self, key: K) -> CompileResult<&'static str> {
        self.entries
            .get(&key)
            .copied()
            .ok_or_else(|| CompileError::UnregisteredMapping {
                arch: self.arch,
                item: format!("{key:?}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_parsing() {
        assert_eq!("x86-64".parse::<Arch>().unwrap(), Arch::X86_64);
        assert_eq!("aarch64".parse::<Arch>().unwrap(), Arch::Arm64);
        assert!("mips".parse::<Arch>().is_err());
        assert_eq!(Arch::Arm64.to_string(), "arm64");
    }

    #[test]
    fn test_mapping_table_rejects_missing_entries() {
        let entries = [(Register::Acc, "rax")];
        let err = MappingTable::build("test", &entries, &Register::ALL).unwrap_err();
        assert!(matches!(err, CompileError::UnregisteredMapping { .. }));
    }

    #[test]
    fn test_renderers_are_complete() {
        for arch in Arch::ALL {
            let renderer = renderer_for(arch).unwrap();
            assert_eq!(renderer.arch(), arch);
        }
    }

    #[test]
    fn test_argument_registers() {
        assert_eq!(Register::arg(0), Some(Register::Arg0));
        assert_eq!(Register::arg(5), Some(Register::Arg5));
        assert_eq!(Register::arg(6), None);
    }
}
