//! Statement lowering.

use super::{BranchTarget, CodeGenerator};
use crate::ast::{AssignOp, BinaryOp, CaseLabel, Expr, Statement, SwitchCase, Type};
use crate::core::error::{CompileError, CompileResult};
use crate::isa::{Operand, Operation, Register};
use crate::layout::{VarEntry, VarKind};
use crate::runtime;

use Operation::*;
use Register::*;

/// Arithmetic behind a compound assignment, `None` for plain `=`.
fn compound_op(op: AssignOp) -> Option<BinaryOp> {
    match op {
        AssignOp::Assign => None,
        AssignOp::Add => Some(BinaryOp::Add),
        AssignOp::Sub => Some(BinaryOp::Sub),
        AssignOp::Mul => Some(BinaryOp::Mul),
        AssignOp::Div => Some(BinaryOp::Div),
        AssignOp::Mod => Some(BinaryOp::Mod),
        AssignOp::And => Some(BinaryOp::BitAnd),
        AssignOp::Or => Some(BinaryOp::BitOr),
        AssignOp::Xor => Some(BinaryOp::BitXor),
        AssignOp::Shl => Some(BinaryOp::Shl),
        AssignOp::Shr => Some(BinaryOp::Shr),
        AssignOp::UShr => Some(BinaryOp::UShr),
    }
}

impl CodeGenerator<'_> {
    pub fn statement(&mut self, statement: &Statement) -> CompileResult<()> {
        match statement {
            Statement::Block { body } => {
                self.context.enter_block();
                for s in body {
                    self.statement(s)?;
                }
                self.context.exit()
            }
            Statement::VarInit { name, ty, init } => self.var_init(name, ty, init),
            Statement::If {
                cond,
                then,
                otherwise,
            } => self.if_else(cond, then, otherwise.as_deref()),
            Statement::While { cond, body } => {
                let top = self.emitter.next_label("while_body");
                let test = self.emitter.next_label("while_test");
                self.emitter.unary(Jmp, Operand::label(&test))?;
                self.emitter.label(top.clone());
                self.statement(body)?;
                self.emitter.label(test);
                self.condition(cond, BranchTarget::if_true(&top))
            }
            Statement::For {
                init,
                cond,
                update,
                body,
            } => self.for_loop(init.as_deref(), cond.as_ref(), update.as_deref(), body),
            Statement::Switch { scrutinee, cases } => self.switch(scrutinee, cases),
            Statement::Print { value } => self.print(value),
            Statement::Assign { target, op, value } => self.assign(target, *op, value),
            Statement::Return { value } => {
                if let Some(value) = value {
                    self.value(value)?;
                }
                self.emitter.check_balanced()?;
                let label = self.frame_mut()?.return_label.clone();
                self.emitter.unary(Jmp, Operand::label(label))
            }
            Statement::Expr { expr } => self.value(expr),
        }
    }

    fn var_init(&mut self, name: &str, ty: &Type, init: &Expr) -> CompileResult<()> {
        self.value(init)?;
        let slot = self.frame_mut()?.layout.allocate_block_local()?;
        let var = self.table.add_var(VarEntry::new(name, ty.clone(), VarKind::Local));
        self.table.var_mut(var).assign_offset(slot)?;
        let offset = self.table.var(var).byte_offset()?;
        self.context.declare(name, var);
        self.emitter.binary(Mov, Acc, Operand::mem(Fp, offset))?;
        self.emitter.annotate(name);
        Ok(())
    }

    fn if_else(
        &mut self,
        cond: &Expr,
        then: &Statement,
        otherwise: Option<&Statement>,
    ) -> CompileResult<()> {
        let else_label = self.emitter.next_label("else");
        self.condition(cond, BranchTarget::if_false(&else_label))?;
        self.statement(then)?;
        match otherwise {
            Some(otherwise) => {
                let end = self.emitter.next_label("end_if");
                self.emitter.unary(Jmp, Operand::label(&end))?;
                self.emitter.label(else_label);
                self.statement(otherwise)?;
                self.emitter.label(end);
            }
            None => self.emitter.label(else_label),
        }
        Ok(())
    }

    fn for_loop(
        &mut self,
        init: Option<&Statement>,
        cond: Option<&Expr>,
        update: Option<&Statement>,
        body: &Statement,
    ) -> CompileResult<()> {
        // The header's declarations are scoped to the loop.
        self.context.enter_block();
        if let Some(init) = init {
            self.statement(init)?;
        }
        let top = self.emitter.next_label("for_body");
        let test = self.emitter.next_label("for_test");
        self.emitter.unary(Jmp, Operand::label(&test))?;
        self.emitter.label(top.clone());
        self.statement(body)?;
        if let Some(update) = update {
            self.statement(update)?;
        }
        self.emitter.label(test);
        match cond {
            Some(cond) => self.condition(cond, BranchTarget::if_true(&top))?,
            None => self.emitter.unary(Jmp, Operand::label(&top))?,
        }
        self.context.exit()
    }

    /// Compare the scrutinee against each case value in order, then lay the arm bodies out
    /// in source order so arms without `break` fall through into the next one.
    fn switch(&mut self, scrutinee: &Expr, cases: &[SwitchCase]) -> CompileResult<()> {
        self.context.enter_block();
        self.value(scrutinee)?;
        let end = self.emitter.next_label("switch_end");
        let labels: Vec<String> = cases
            .iter()
            .map(|_| self.emitter.next_label("case"))
            .collect();

        let mut default = None;
        for (case, label) in cases.iter().zip(&labels) {
            match case.label {
                CaseLabel::Value(value) => {
                    if i32::try_from(value).is_ok() {
                        self.emitter.binary(Cmp, value, Acc)?;
                    } else {
                        self.emitter.binary(Mov, value, Tmp0)?;
                        self.emitter.binary(Cmp, Tmp0, Acc)?;
                    }
                    self.emitter.unary(Je, Operand::label(label))?;
                }
                CaseLabel::Default => {
                    if default.is_some() {
                        return Err(CompileError::UnsupportedNode {
                            node: "switch with more than one default arm".into(),
                        });
                    }
                    default = Some(label.clone());
                }
            }
        }
        let fallback = default.unwrap_or_else(|| end.clone());
        self.emitter.unary(Jmp, Operand::label(fallback))?;

        for (case, label) in cases.iter().zip(labels) {
            self.emitter.label(label);
            for s in &case.body {
                self.statement(s)?;
            }
            if case.breaks {
                self.emitter.unary(Jmp, Operand::label(&end))?;
            }
        }
        self.emitter.label(end);
        self.context.exit()
    }

    fn print(&mut self, value: &Expr) -> CompileResult<()> {
        let routine = match value.ty {
            Type::Int => runtime::PUT,
            Type::Boolean => runtime::PUT_BOOL,
            Type::String => runtime::PUT_STRING,
            ref other => {
                return Err(CompileError::TypeMismatch {
                    reason: format!("cannot print a value of type {other}"),
                })
            }
        };
        self.value(value)?;
        self.emitter.binary(Mov, Acc, Arg0)?;
        self.emitter.call(routine)
    }

    fn assign(&mut self, target: &Expr, op: AssignOp, value: &Expr) -> CompileResult<()> {
        self.address(target)?;
        self.emitter.push(Acc)?;
        self.value(value)?;
        self.emitter.pop(Arg2)?;
        match compound_op(op) {
            None => {}
            Some(BinaryOp::Add) if target.ty == Type::String => {
                self.concat_in_place(&value.ty)?;
            }
            Some(op) => self.combine(op, Operand::mem(Arg2, 0), value.line)?,
        }
        self.emitter.binary(Mov, Acc, Operand::mem(Arg2, 0))
    }
}
