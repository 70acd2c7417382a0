// This module drives one compilation unit from syntax tree to assembly text. A
// CodegenSession is created from CodegenOptions, which fix the target before anything is
// emitted: the renderer for the chosen architecture is built first, so a renderer whose
// mapping tables are incomplete fails before any work is done. compile() then collects the
// symbol table from the tree, lays out every class (dispatch tables, then field offsets),
// runs the instruction selector over the entry routine and every method, lets the
// synthetic library emit the helpers that were referenced, appends the data section and
// finally renders the item stream. Each unit gets fresh state; nothing is shared between
// units, so independent units may compile on different threads. SessionStats gathers the
// counters of the finished unit (classes, methods, instructions, labels, alignment pads,
// helpers) and is logged at info level and returned with the assembly.

//! Compilation session for one unit.

use crate::ast::Program;
use crate::codegen::CodeGenerator;
use crate::config::CodegenOptions;
use crate::core::error::CompileResult;
use crate::isa::{renderer_for, InstructionRenderer};
use crate::layout::{layout_classes, SymbolTable};
use std::fmt;

/// Counters of one compiled unit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Classes laid out, the entry class included.
    pub classes: usize,

    /// Methods compiled, the entry routine included.
    pub methods: usize,

    /// Abstract instructions emitted.
    pub instructions: usize,

    /// Local labels allocated.
    pub labels: usize,

    /// Calls that needed a stack alignment pad.
    pub alignment_pads: usize,

    /// Synthetic helpers emitted.
    pub helpers: usize,

    /// Distinct string literals in the data section.
    pub strings: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Classes laid out: {}", self.classes)?;
        writeln!(f, "  Methods compiled: {}", self.methods)?;
        writeln!(f, "  Instructions emitted: {}", self.instructions)?;
        writeln!(f, "  Labels allocated: {}", self.labels)?;
        writeln!(f, "  Alignment pads: {}", self.alignment_pads)?;
        writeln!(f, "  Helpers emitted: {}", self.helpers)?;
        writeln!(f, "  String literals: {}", self.strings)?;
        Ok(())
    }
}

/// Assembly text of a unit together with its counters.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub assembly: String,
    pub stats: SessionStats,
}

/// Compiles units for one fixed target.
pub struct CodegenSession {
    options: CodegenOptions,
    renderer: Box<dyn InstructionRenderer>,
}

impl CodegenSession {
    /// Build the renderer for `options.arch`; fails if its mapping tables are incomplete.
    pub fn new(options: CodegenOptions) -> CompileResult<Self> {
        let renderer = renderer_for(options.arch)?;
        Ok(Self { options, renderer })
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    /// Compile `program` to assembly text.
    pub fn compile(&self, program: &Program) -> CompileResult<CompiledUnit> {
        let mut table = SymbolTable::from_program(program)?;
        layout_classes(&mut table)?;

        let code = CodeGenerator::new(program, table).generate()?;
        let assembly = code
            .emitter
            .render(self.renderer.as_ref(), self.options.comments)?;

        let counters = code.emitter.counters();
        let stats = SessionStats {
            classes: code.classes,
            methods: code.methods,
            instructions: counters.instructions,
            labels: counters.labels_allocated,
            alignment_pads: counters.alignment_pads,
            helpers: code.helpers,
            strings: code.strings,
        };
        log::info!(
            "compiled {} for {}: {} classes, {} methods, {} instructions, {} helpers",
            program.main.name,
            self.options.arch,
            stats.classes,
            stats.methods,
            stats.instructions,
            stats.helpers
        );
        log::debug!("\n{stats}");

        Ok(CompiledUnit { assembly, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::Type;
    use crate::isa::Arch;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn sample() -> Program {
        program(
            vec![],
            vec![print(binary(
                crate::ast::BinaryOp::Add,
                int(1),
                binary(crate::ast::BinaryOp::Mul, int(2), int(3)),
            ))],
            vec![class(
                "A",
                None,
                vec![decl("x", Type::Int)],
                vec![method("get", Type::Int, vec![], vec![], vec![ret(ident("x", Type::Int))])],
            )],
        )
    }

    #[test]
    fn test_compile_both_targets() {
        init();
        for arch in Arch::ALL {
            let session = CodegenSession::new(CodegenOptions::for_arch(arch)).unwrap();
            let unit = session.compile(&sample()).unwrap();
            assert!(unit.assembly.contains("asm_main:"));
            assert!(unit.assembly.contains("method.A.get:"));
            assert!(unit.assembly.contains("vtable.A:"));
            assert_eq!(unit.stats.methods, 2);
            assert_eq!(unit.stats.classes, 2);
        }
    }

    #[test]
    fn test_statistics_display() {
        init();
        let session = CodegenSession::new(CodegenOptions::default()).unwrap();
        let unit = session.compile(&sample()).unwrap();
        let output = unit.stats.to_string();
        assert!(output.contains("Methods compiled: 2"));
        assert!(output.contains(&format!("Instructions emitted: {}", unit.stats.instructions)));
    }

    #[test]
    fn test_comments_toggle() {
        let with = CodegenSession::new(CodegenOptions::default())
            .unwrap()
            .compile(&sample())
            .unwrap();
        let without = CodegenSession::new(CodegenOptions::default().without_comments())
            .unwrap()
            .compile(&sample())
            .unwrap();
        assert!(with.assembly.contains("# "));
        assert!(!without.assembly.contains("# "));
    }
}
