//! Expression lowering.
//!
//! Every visit leaves its result in the accumulator. Binary operations evaluate the left
//! operand, push it, evaluate the right operand and pop the left one into `Arg2`, so the
//! emitter's depth tracking sees every intermediate value. Boolean expressions visited with a
//! branch target jump instead of materialising 0 or 1, which is how `&&` and `||`
//! short-circuit.

use super::{BranchTarget, CodeGenerator, EvalMode};
use crate::ast::{BinaryOp, Expr, ExprKind, IncrementOp, Type, UnaryOp};
use crate::core::error::{CompileError, CompileResult};
use crate::isa::{Memory, Operand, Operation, Register, WORD_SIZE};
use crate::layout::{vtable_label, ClassId, FrameLayout};
use crate::runtime;
use crate::synth::SyntheticFunction;

use Operation::*;
use Register::*;

/// Dimensions `alloc_nested_array` accepts.
pub const MAX_ARRAY_DIMS: usize = 4;

/// Method arguments a call site may pass.
pub const MAX_CALL_ARGS: usize = 5;

fn is_storage(kind: &ExprKind) -> bool {
    matches!(
        kind,
        ExprKind::Identifier { .. } | ExprKind::Field { .. } | ExprKind::ArrayLookup { .. }
    )
}

/// Conditional jump for a comparison, taken when the comparison is `when_true`.
fn comparison_jump(op: BinaryOp, when_true: bool) -> CompileResult<Operation> {
    let (taken, not_taken) = match op {
        BinaryOp::Lt => (Jl, Jge),
        BinaryOp::Le => (Jle, Jg),
        BinaryOp::Gt => (Jg, Jle),
        BinaryOp::Ge => (Jge, Jl),
        BinaryOp::Eq => (Je, Jne),
        BinaryOp::Ne => (Jne, Je),
        _ => {
            return Err(CompileError::TypeMismatch {
                reason: format!("{op:?} is not a comparison"),
            })
        }
    };
    Ok(if when_true { taken } else { not_taken })
}

/// Helper concatenating operands of the given types.
fn concat_helper(lhs: &Type, rhs: &Type) -> CompileResult<SyntheticFunction> {
    match (lhs, rhs) {
        (Type::String, Type::String) => Ok(SyntheticFunction::ConcatStrings),
        (Type::String, Type::Boolean) => Ok(SyntheticFunction::ConcatStringBool),
        (Type::Boolean, Type::String) => Ok(SyntheticFunction::ConcatBoolString),
        (Type::String, Type::Int) => Ok(SyntheticFunction::ConcatStringInt),
        (Type::Int, Type::String) => Ok(SyntheticFunction::ConcatIntString),
        _ => Err(CompileError::TypeMismatch {
            reason: format!("cannot concatenate {lhs} and {rhs}"),
        }),
    }
}

impl CodeGenerator<'_> {
    /// Generate `e`.
    ///
    /// With a branch target the expression must be boolean and control transfers to the
    /// target's label when the condition matches its polarity; nothing useful is left in
    /// the accumulator.
    pub fn expr(
        &mut self,
        e: &Expr,
        mode: EvalMode,
        target: Option<BranchTarget>,
    ) -> CompileResult<()> {
        if mode == EvalMode::Address && !is_storage(&e.kind) {
            return Err(CompileError::UnsupportedNode {
                node: format!("{} used as an assignment target", e.kind.name()),
            });
        }
        match target {
            Some(target) => self.branch(e, target),
            None => self.lower(e, mode),
        }
    }

    pub(crate) fn value(&mut self, e: &Expr) -> CompileResult<()> {
        self.expr(e, EvalMode::Value, None)
    }

    pub(crate) fn address(&mut self, e: &Expr) -> CompileResult<()> {
        self.expr(e, EvalMode::Address, None)
    }

    pub(crate) fn condition(&mut self, e: &Expr, target: BranchTarget) -> CompileResult<()> {
        self.expr(e, EvalMode::Value, Some(target))
    }

    fn jump(&mut self, op: Operation, label: &str) -> CompileResult<()> {
        self.emitter.unary(op, Operand::label(label))
    }

    fn branch(&mut self, e: &Expr, target: BranchTarget) -> CompileResult<()> {
        if e.ty != Type::Boolean {
            return Err(CompileError::TypeMismatch {
                reason: format!("{} of type {} used as a condition", e.kind.name(), e.ty),
            });
        }
        match &e.kind {
            ExprKind::BoolLiteral { value } => {
                if *value == target.when_true {
                    self.jump(Jmp, &target.label)?;
                }
                Ok(())
            }
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => self.condition(operand, target.negated()),
            ExprKind::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                lhs,
                rhs,
            } => {
                // `a && b` jumps on false as soon as either side is false; `a || b` jumps on
                // true as soon as either side is true. The other polarity needs a skip.
                let eager = (*op == BinaryOp::Or) == target.when_true;
                if eager {
                    self.condition(lhs, target.clone())?;
                    self.condition(rhs, target)
                } else {
                    let skip = self.emitter.next_label("skip");
                    let short = if target.when_true {
                        BranchTarget::if_false(&skip)
                    } else {
                        BranchTarget::if_true(&skip)
                    };
                    self.condition(lhs, short)?;
                    self.condition(rhs, target)?;
                    self.emitter.label(skip);
                    Ok(())
                }
            }
            ExprKind::Binary { op, lhs, rhs } if op.is_comparison() => {
                self.compare(lhs, rhs)?;
                self.jump(comparison_jump(*op, target.when_true)?, &target.label)
            }
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                let else_label = self.emitter.next_label("cond_else");
                let end = self.emitter.next_label("cond_end");
                self.condition(cond, BranchTarget::if_false(&else_label))?;
                self.condition(then, target.clone())?;
                self.jump(Jmp, &end)?;
                self.emitter.label(else_label);
                self.condition(otherwise, target)?;
                self.emitter.label(end);
                Ok(())
            }
            _ => {
                self.value(e)?;
                self.emitter.binary(Cmp, 0i64, Acc)?;
                self.jump(if target.when_true { Jne } else { Je }, &target.label)
            }
        }
    }

    /// Set the flags from `lhs - rhs`.
    fn compare(&mut self, lhs: &Expr, rhs: &Expr) -> CompileResult<()> {
        self.value(lhs)?;
        self.emitter.push(Acc)?;
        self.value(rhs)?;
        self.emitter.pop(Arg2)?;
        self.emitter.binary(Cmp, Acc, Arg2)
    }

    /// Produce 0 or 1 for a boolean built from comparisons or logical operators.
    fn materialize(&mut self, e: &Expr) -> CompileResult<()> {
        let is_false = self.emitter.next_label("false");
        let end = self.emitter.next_label("bool_end");
        self.condition(e, BranchTarget::if_false(&is_false))?;
        self.emitter.binary(Mov, 1i64, Acc)?;
        self.jump(Jmp, &end)?;
        self.emitter.label(is_false);
        self.emitter.binary(Mov, 0i64, Acc)?;
        self.emitter.label(end);
        Ok(())
    }

    fn lower(&mut self, e: &Expr, mode: EvalMode) -> CompileResult<()> {
        match &e.kind {
            ExprKind::IntLiteral { value } => self.emitter.binary(Mov, *value, Acc),
            ExprKind::BoolLiteral { value } => self.emitter.binary(Mov, i64::from(*value), Acc),
            ExprKind::StringLiteral { value } => {
                let label = self.strings.intern(value);
                self.emitter.binary(Lea, Operand::label(label), Acc)
            }
            ExprKind::This => self.load_this(),
            ExprKind::Identifier { name } => self.variable(name, mode),
            ExprKind::Binary { op, lhs, rhs } => self.binary(e, *op, lhs, rhs),
            ExprKind::Unary { op, operand } => self.unary(*op, operand),
            ExprKind::ArrayLookup { array, index } => {
                self.array_element(array, index, mode, e.line)
            }
            ExprKind::ArrayLength { array } => self.array_length(array),
            ExprKind::Field { object, name } => self.field(object, name, mode),
            ExprKind::Call {
                receiver,
                method,
                args,
            } => self.call(receiver, method, args),
            ExprKind::NewObject { class } => self.new_object(class),
            ExprKind::NewArray { dims, .. } => self.new_array(dims, e.line),
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                let else_label = self.emitter.next_label("cond_else");
                let end = self.emitter.next_label("cond_end");
                self.condition(cond, BranchTarget::if_false(&else_label))?;
                self.value(then)?;
                self.jump(Jmp, &end)?;
                self.emitter.label(else_label);
                self.value(otherwise)?;
                self.emitter.label(end);
                Ok(())
            }
            ExprKind::InstanceOf { object, class } => self.instance_of(object, class),
            ExprKind::Increment { op, target } => self.increment(*op, target),
        }
    }

    fn load_this(&mut self) -> CompileResult<()> {
        let method = self.current_method()?;
        if self.table.method(method).is_static {
            return Err(CompileError::UnsupportedNode {
                node: "`this` in the static entry method".into(),
            });
        }
        self.emitter.binary(
            Mov,
            Operand::mem(Fp, FrameLayout::self_offset()),
            Acc,
        )
    }

    fn access(&mut self, at: Operand, mode: EvalMode) -> CompileResult<()> {
        match mode {
            EvalMode::Value => self.emitter.binary(Mov, at, Acc),
            EvalMode::Address => self.emitter.binary(Lea, at, Acc),
        }
    }

    fn variable(&mut self, name: &str, mode: EvalMode) -> CompileResult<()> {
        let var = self.context.lookup_var(name)?;
        let entry = self.table.var(var);
        let offset = entry.byte_offset()?;
        if entry.is_field() {
            // Fields live in the receiver.
            self.load_this()?;
            self.access(Operand::mem(Acc, offset), mode)
        } else {
            self.access(Operand::mem(Fp, offset), mode)
        }
    }

    fn binary(&mut self, e: &Expr, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> CompileResult<()> {
        if op.is_comparison() || op.is_logical() {
            return self.materialize(e);
        }
        if op == BinaryOp::Add && e.ty == Type::String {
            return self.concat(lhs, rhs);
        }
        self.value(lhs)?;
        self.emitter.push(Acc)?;
        self.value(rhs)?;
        self.emitter.pop(Arg2)?;
        self.combine(op, Operand::Reg(Arg2), e.line)
    }

    /// Compute `left op Acc` into the accumulator. `Arg2` survives.
    pub(crate) fn combine(&mut self, op: BinaryOp, left: Operand, line: u32) -> CompileResult<()> {
        let e = &mut self.emitter;
        match op {
            BinaryOp::Add => e.binary(Add, left, Acc),
            BinaryOp::Mul => e.binary(Imul, left, Acc),
            BinaryOp::BitAnd => e.binary(And, left, Acc),
            BinaryOp::BitOr => e.binary(Or, left, Acc),
            BinaryOp::BitXor => e.binary(Xor, left, Acc),
            BinaryOp::Sub => {
                e.binary(Mov, Acc, Tmp0)?;
                e.binary(Mov, left, Acc)?;
                e.binary(Sub, Tmp0, Acc)
            }
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => {
                let shift = match op {
                    BinaryOp::Shl => Shl,
                    BinaryOp::Shr => Sar,
                    _ => Shr,
                };
                e.binary(Mov, Acc, Arg3)?;
                e.binary(Mov, left, Acc)?;
                e.binary(shift, Arg3, Acc)
            }
            BinaryOp::Div | BinaryOp::Mod => {
                e.binary(Mov, Acc, Tmp0)?;
                e.binary(Mov, left, Acc)?;
                let ok = e.next_label("div_ok");
                e.binary(Cmp, 0i64, Tmp0)?;
                e.unary(Jne, Operand::label(&ok))?;
                e.binary(Mov, i64::from(line), Arg0)?;
                e.call(runtime::EXCEPTION_DIVISION)?;
                e.label(ok);
                e.push(Arg2)?;
                e.nullary(Cqto)?;
                e.unary(Idiv, Tmp0)?;
                if op == BinaryOp::Mod {
                    e.binary(Mov, Arg2, Acc)?;
                }
                e.pop(Arg2)
            }
            _ => Err(CompileError::TypeMismatch {
                reason: format!("{op:?} is not an arithmetic operator"),
            }),
        }
    }

    /// Concatenate two operands, at least one of them a string.
    fn concat(&mut self, lhs: &Expr, rhs: &Expr) -> CompileResult<()> {
        let helper = concat_helper(&lhs.ty, &rhs.ty)?;
        let label = self.synth.reference(helper);
        self.value(lhs)?;
        self.emitter.push(Acc)?;
        self.value(rhs)?;
        self.emitter.binary(Mov, Acc, Arg1)?;
        self.emitter.pop(Arg0)?;
        self.emitter.call(label)
    }

    /// `Acc = left + right` for a compound string assignment whose target address is in
    /// `Arg2`; `Arg2` survives.
    pub(crate) fn concat_in_place(&mut self, right: &Type) -> CompileResult<()> {
        let label = self.synth.reference(concat_helper(&Type::String, right)?);
        let e = &mut self.emitter;
        e.binary(Mov, Acc, Arg1)?;
        e.push(Arg2)?;
        e.binary(Mov, Operand::mem(Arg2, 0), Arg0)?;
        e.call(label)?;
        e.pop(Arg2)
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expr) -> CompileResult<()> {
        self.value(operand)?;
        match op {
            UnaryOp::Plus => Ok(()),
            UnaryOp::Neg => self.emitter.unary(Neg, Acc),
            UnaryOp::BitNot => self.emitter.unary(Not, Acc),
            UnaryOp::Not => self.emitter.binary(Xor, 1i64, Acc),
        }
    }

    fn array_element(
        &mut self,
        array: &Expr,
        index: &Expr,
        mode: EvalMode,
        line: u32,
    ) -> CompileResult<()> {
        self.value(array)?;
        self.emitter.push(Acc)?;
        self.value(index)?;
        self.emitter.pop(Arg2)?;
        self.bounds_check(line)?;
        self.access(Operand::indexed(Arg2, Acc, WORD_SIZE as u8, WORD_SIZE), mode)
    }

    /// Index in `Acc`, array in `Arg2`. Reports and exits when out of bounds.
    fn bounds_check(&mut self, line: u32) -> CompileResult<()> {
        let e = &mut self.emitter;
        let fail = e.next_label("out_of_bounds");
        let ok = e.next_label("in_bounds");
        e.binary(Cmp, 0i64, Acc)?;
        e.unary(Jl, Operand::label(&fail))?;
        e.binary(Cmp, Operand::mem(Arg2, 0), Acc)?;
        e.unary(Jl, Operand::label(&ok))?;
        e.label(fail);
        e.binary(Mov, Acc, Arg0)?;
        e.binary(Mov, Operand::mem(Arg2, 0), Arg1)?;
        e.binary(Mov, i64::from(line), Arg2)?;
        e.call(runtime::EXCEPTION_ARRAY)?;
        e.label(ok);
        Ok(())
    }

    fn array_length(&mut self, array: &Expr) -> CompileResult<()> {
        self.value(array)?;
        self.emitter.binary(Mov, Operand::mem(Acc, 0), Acc)?;
        self.emitter.annotate("length");
        Ok(())
    }

    fn class_of(&self, ty: &Type) -> CompileResult<ClassId> {
        let name = ty.class_name().ok_or_else(|| CompileError::TypeMismatch {
            reason: format!("expected an object, found {ty}"),
        })?;
        self.table.class_id(name)
    }

    fn field(&mut self, object: &Expr, name: &str, mode: EvalMode) -> CompileResult<()> {
        if matches!(object.ty, Type::Array(_)) && name == "length" {
            if mode == EvalMode::Address {
                return Err(CompileError::UnsupportedNode {
                    node: "array length used as an assignment target".into(),
                });
            }
            return self.array_length(object);
        }
        let class = self.class_of(&object.ty)?;
        let field = self.table.find_field(class, name)?;
        let offset = self.table.var(field).byte_offset()?;
        self.value(object)?;
        self.access(Operand::mem(Acc, offset), mode)?;
        self.emitter.annotate(name);
        Ok(())
    }

    fn call(&mut self, receiver: &Expr, method: &str, args: &[Expr]) -> CompileResult<()> {
        if args.len() > MAX_CALL_ARGS {
            return Err(CompileError::Limit {
                reason: format!(
                    "call to `{method}` passes {} arguments, at most {MAX_CALL_ARGS} are supported",
                    args.len()
                ),
            });
        }
        let class = self.class_of(&receiver.ty)?;
        let callee = self.table.find_method(class, method)?;
        let slot = self.table.method(callee).vtable_index()? as i64;
        let callee_label = self.table.method_label(callee);

        self.value(receiver)?;
        self.emitter.push(Acc)?;
        self.emitter.annotate("receiver");
        for arg in args {
            self.value(arg)?;
            self.emitter.push(Acc)?;
        }
        for n in (1..=args.len()).rev() {
            let reg = Register::arg(n).ok_or_else(|| CompileError::Limit {
                reason: format!("no argument register {n}"),
            })?;
            self.emitter.pop(reg)?;
        }
        self.emitter.pop(Arg0)?;
        self.emitter.binary(Mov, Operand::mem(Arg0, 0), Tmp0)?;
        self.emitter.annotate("dispatch table");
        self.emitter.call_indirect(
            Memory {
                base: Tmp0,
                offset: slot * WORD_SIZE,
            },
            callee_label,
        )
    }

    fn new_object(&mut self, class: &str) -> CompileResult<()> {
        let id = self.context.lookup_class(class)?;
        let bytes = self.table.class(id).instance_words()? as i64 * WORD_SIZE;
        let e = &mut self.emitter;
        e.binary(Mov, bytes, Arg0)?;
        e.call(runtime::CALLOC)?;
        e.binary(Lea, Operand::label(vtable_label(class)), Tmp0)?;
        e.binary(Mov, Tmp0, Operand::mem(Acc, 0))?;
        e.annotate("vptr");
        Ok(())
    }

    fn new_array(&mut self, dims: &[Expr], line: u32) -> CompileResult<()> {
        match dims.len() {
            0 => Err(CompileError::UnsupportedNode {
                node: "array allocation without dimensions".into(),
            }),
            1 => {
                let helper = self.synth.reference(SyntheticFunction::AllocArray);
                self.value(&dims[0])?;
                self.emitter.binary(Mov, Acc, Arg0)?;
                self.emitter.binary(Mov, i64::from(line), Arg1)?;
                self.emitter.call(helper)
            }
            n if n <= MAX_ARRAY_DIMS => {
                let helper = self.synth.reference(SyntheticFunction::AllocNestedArray);
                for dim in dims {
                    self.value(dim)?;
                    self.emitter.push(Acc)?;
                }
                for k in (1..=n).rev() {
                    let reg = Register::arg(k).ok_or_else(|| CompileError::Limit {
                        reason: format!("no argument register {k}"),
                    })?;
                    self.emitter.pop(reg)?;
                }
                self.emitter.binary(Mov, n as i64, Arg0)?;
                self.emitter.binary(Mov, i64::from(line), Arg5)?;
                self.emitter.call(helper)
            }
            n => Err(CompileError::Limit {
                reason: format!("{n}-dimensional array, at most {MAX_ARRAY_DIMS} are supported"),
            }),
        }
    }

    /// Walk the parent links of the object's dispatch table looking for `class`.
    fn instance_of(&mut self, object: &Expr, class: &str) -> CompileResult<()> {
        self.context.lookup_class(class)?;
        self.value(object)?;
        let e = &mut self.emitter;
        let is_false = e.next_label("instanceof_false");
        let is_true = e.next_label("instanceof_true");
        let walk = e.next_label("instanceof_walk");
        let end = e.next_label("instanceof_end");

        e.binary(Cmp, 0i64, Acc)?;
        e.unary(Je, Operand::label(&is_false))?;
        e.annotate("null");
        e.binary(Mov, Operand::mem(Acc, 0), Acc)?;
        e.binary(Lea, Operand::label(vtable_label(class)), Tmp0)?;
        e.label(walk.clone());
        e.binary(Cmp, Tmp0, Acc)?;
        e.unary(Je, Operand::label(&is_true))?;
        e.binary(Mov, Operand::mem(Acc, 0), Acc)?;
        e.annotate("parent table");
        e.binary(Cmp, 0i64, Acc)?;
        e.unary(Jne, Operand::label(&walk))?;
        e.label(is_false);
        e.binary(Mov, 0i64, Acc)?;
        e.unary(Jmp, Operand::label(&end))?;
        e.label(is_true);
        e.binary(Mov, 1i64, Acc)?;
        e.label(end);
        Ok(())
    }

    fn increment(&mut self, op: IncrementOp, target: &Expr) -> CompileResult<()> {
        self.address(target)?;
        let e = &mut self.emitter;
        e.binary(Mov, Acc, Arg2)?;
        e.binary(Mov, Operand::mem(Arg2, 0), Acc)?;
        let step = match op {
            IncrementOp::PreInc | IncrementOp::PostInc => Add,
            IncrementOp::PreDec | IncrementOp::PostDec => Sub,
        };
        match op {
            IncrementOp::PreInc | IncrementOp::PreDec => {
                e.binary(step, 1i64, Acc)?;
                e.binary(Mov, Acc, Operand::mem(Arg2, 0))
            }
            IncrementOp::PostInc | IncrementOp::PostDec => {
                e.binary(Mov, Acc, Tmp0)?;
                e.binary(step, 1i64, Tmp0)?;
                e.binary(Mov, Tmp0, Operand::mem(Arg2, 0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_jumps() {
        assert_eq!(comparison_jump(BinaryOp::Lt, true).unwrap(), Jl);
        assert_eq!(comparison_jump(BinaryOp::Lt, false).unwrap(), Jge);
        assert_eq!(comparison_jump(BinaryOp::Ne, false).unwrap(), Je);
        assert!(comparison_jump(BinaryOp::Add, true).is_err());
    }

    #[test]
    fn test_concat_helper_selection() {
        assert_eq!(
            concat_helper(&Type::Int, &Type::String).unwrap(),
            SyntheticFunction::ConcatIntString
        );
        assert_eq!(
            concat_helper(&Type::String, &Type::Boolean).unwrap(),
            SyntheticFunction::ConcatStringBool
        );
        assert!(concat_helper(&Type::Int, &Type::Int).is_err());
    }
}
