// This module is the instruction selector: a single walk over the typed syntax tree that
// emits, for every method, a label, the prologue, the body and the epilogue through the
// Emitter, consulting the symbol table for every name it meets. Expression code follows a
// fixed accumulator/stack discipline: every expression leaves its result in the
// accumulator, and a binary operation evaluates its left operand, pushes it, evaluates the
// right operand and pops the left one into a scratch register before combining. Whether an
// expression should produce its value or the address of its storage, and whether a boolean
// should be materialised or turned into a jump, are explicit arguments (EvalMode and
// Option<BranchTarget>) of the recursive call rather than flags set on shared state, so
// neither can leak into an unrelated visit. The generator owns every piece of per-unit state
// (symbol table, scope stack, emitter, helper library, string pool); a fresh generator is
// built for each unit. expr.rs holds expression lowering, stmt.rs statements, data.rs the
// data section, flow.rs the argument types.

//! Tree-walking instruction selector.

pub mod data;
pub mod expr;
pub mod flow;
pub mod stmt;

pub use flow::{BranchTarget, EvalMode};

use crate::ast::{Program, Statement};
use crate::core::emitter::Emitter;
use crate::core::error::{CompileError, CompileResult};
use crate::isa::{Directive, Operand, Operation, Register, Section};
use crate::layout::{assign_frame, FrameLayout, MethodId, SymbolContext, SymbolTable, ENTRY_LABEL};
use crate::synth::SyntheticLibrary;
use data::StringPool;

/// Parameters a method may declare; the receiver occupies the first argument register.
pub const MAX_PARAMS: usize = 5;

/// State of the method currently being generated.
#[derive(Debug)]
pub(crate) struct MethodFrame {
    pub(crate) method: MethodId,
    pub(crate) layout: FrameLayout,
    pub(crate) return_label: String,
}

/// Everything produced for one unit, ready to render.
#[derive(Debug)]
pub struct GeneratedCode {
    pub emitter: Emitter,
    pub classes: usize,
    pub methods: usize,
    pub helpers: usize,
    pub strings: usize,
}

/// Instruction selector for one compilation unit.
pub struct CodeGenerator<'p> {
    program: &'p Program,
    pub(crate) table: SymbolTable,
    pub(crate) context: SymbolContext,
    pub(crate) emitter: Emitter,
    pub(crate) synth: SyntheticLibrary,
    pub(crate) strings: StringPool,
    pub(crate) frame: Option<MethodFrame>,
    methods: usize,
}

impl<'p> CodeGenerator<'p> {
    /// `table` must already be laid out.
    pub fn new(program: &'p Program, table: SymbolTable) -> Self {
        let context = SymbolContext::new(&table);
        Self {
            program,
            table,
            context,
            emitter: Emitter::new(),
            synth: SyntheticLibrary::new(),
            strings: StringPool::new(),
            frame: None,
            methods: 0,
        }
    }

    /// Generate the whole unit: entry routine, every method, the referenced helpers and the
    /// data section.
    pub fn generate(mut self) -> CompileResult<GeneratedCode> {
        let program = self.program;

        self.emitter.directive(Directive::Section(Section::Text));
        self.emitter.directive(Directive::Global(ENTRY_LABEL.to_string()));

        let main_class = self.table.main_class();
        let main_method = self.table.main_method();
        self.context.enter_class(&self.table, main_class);
        self.method(main_method, &program.main.body)?;
        self.context.exit()?;

        for decl in &program.classes {
            let class = self.table.class_id(&decl.name)?;
            let methods = self.table.class(class).methods.clone();
            self.context.enter_class(&self.table, class);
            for (&method, decl) in methods.iter().zip(&decl.methods) {
                self.method(method, &decl.body)?;
            }
            self.context.exit()?;
        }

        let helpers = self
            .synth
            .emit_referenced(&mut self.emitter, &mut self.strings)?;
        data::emit_data_section(&self.table, &self.strings, &mut self.emitter)?;

        Ok(GeneratedCode {
            classes: self.table.class_ids().count(),
            methods: self.methods,
            helpers,
            strings: self.strings.len(),
            emitter: self.emitter,
        })
    }

    fn method(&mut self, method: MethodId, body: &[Statement]) -> CompileResult<()> {
        let label = self.table.method_label(method);
        let entry = self.table.method(method);
        if entry.params.len() > MAX_PARAMS {
            return Err(CompileError::Limit {
                reason: format!(
                    "`{label}` declares {} parameters, at most {MAX_PARAMS} are supported",
                    entry.params.len()
                ),
            });
        }
        let is_static = entry.is_static;
        let params = entry.params.clone();

        let layout = assign_frame(&mut self.table, method)?;
        log::debug!("generating {label}");

        let e = &mut self.emitter;
        e.blank();
        e.label(label.clone());
        e.prologue()?;
        if layout.bytes() > 0 {
            e.binary(Operation::Sub, layout.bytes(), Register::Sp)?;
            e.annotate(format!("frame: {} words", layout.words));
        }
        if !is_static {
            e.binary(
                Operation::Mov,
                Register::Arg0,
                Operand::mem(Register::Fp, FrameLayout::self_offset()),
            )?;
            e.annotate("this");
        }
        for (i, &param) in params.iter().enumerate() {
            let reg = Register::arg(i + 1).ok_or_else(|| CompileError::Limit {
                reason: format!("no argument register for parameter {i} of `{label}`"),
            })?;
            let var = self.table.var(param);
            e.binary(
                Operation::Mov,
                reg,
                Operand::mem(Register::Fp, var.byte_offset()?),
            )?;
            e.annotate(var.name.clone());
        }

        let return_label = e.next_label("return");
        self.frame = Some(MethodFrame {
            method,
            layout,
            return_label: return_label.clone(),
        });
        self.context.enter_method(&self.table, method);

        for statement in body {
            self.statement(statement)?;
        }

        self.emitter.label(return_label);
        self.emitter.epilogue()?;
        self.context.exit()?;
        self.frame = None;
        self.methods += 1;
        Ok(())
    }

    pub(crate) fn frame_mut(&mut self) -> CompileResult<&mut MethodFrame> {
        self.frame.as_mut().ok_or_else(|| CompileError::UnsupportedNode {
            node: "statement outside of a method body".into(),
        })
    }

    pub(crate) fn current_method(&self) -> CompileResult<MethodId> {
        self.frame
            .as_ref()
            .map(|f| f.method)
            .ok_or_else(|| CompileError::UnsupportedNode {
                node: "expression outside of a method body".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::Type;
    use crate::layout::layout_classes;

    fn generate(program: &Program) -> CompileResult<GeneratedCode> {
        let mut table = SymbolTable::from_program(program)?;
        layout_classes(&mut table)?;
        CodeGenerator::new(program, table).generate()
    }

    #[test]
    fn test_counts() {
        let program = program(
            vec![],
            vec![print(int(1))],
            vec![class(
                "A",
                None,
                vec![],
                vec![method("f", Type::Int, vec![], vec![], vec![ret(int(1))])],
            )],
        );
        let code = generate(&program).unwrap();
        assert_eq!(code.methods, 2);
        assert_eq!(code.classes, 2);
        assert_eq!(code.helpers, 0);
    }

    #[test]
    fn test_too_many_parameters() {
        let params = (0..6).map(|i| decl(&format!("p{i}"), Type::Int)).collect();
        let program = program(
            vec![],
            vec![],
            vec![class(
                "A",
                None,
                vec![],
                vec![method("f", Type::Int, params, vec![], vec![ret(int(1))])],
            )],
        );
        assert!(matches!(
            generate(&program),
            Err(CompileError::Limit { .. })
        ));
    }
}
