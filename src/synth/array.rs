//! Array allocation helpers.
//!
//! An array is a length word followed by one word per element, zero-initialised.

use super::{SyntheticFunction, SyntheticLibrary};
use crate::core::emitter::Emitter;
use crate::core::error::CompileResult;
use crate::isa::{Operand, Operation, Register};
use crate::runtime;

use Operation::*;
use Register::*;

fn fp(offset: i64) -> Operand {
    Operand::mem(Fp, offset)
}

/// Body of `alloc_array(length, line)`.
pub fn alloc_array(e: &mut Emitter) -> CompileResult<()> {
    let ok = e.next_label("alloc_ok");
    e.binary(Cmp, 0i64, Arg0)?;
    e.unary(Jge, Operand::label(&ok))?;
    // Length and line are already in place.
    e.call(runtime::EXCEPTION_ARRAY_SIZE)?;
    e.label(ok);

    e.push(Arg0)?;
    e.binary(Add, 1i64, Arg0)?;
    e.binary(Shl, 3i64, Arg0)?;
    e.annotate("bytes for length word and elements");
    e.call(runtime::CALLOC)?;
    e.pop(Arg0)?;
    e.binary(Mov, Arg0, Operand::mem(Acc, 0))?;
    e.annotate("store length");
    Ok(())
}

/// Body of `alloc_nested_array(count, d1, d2, d3, d4, line)`.
///
/// Allocates the outermost level with `d1` elements and, while dimensions remain, fills
/// each element by calling itself with the argument window shifted left by one.
pub fn alloc_nested_array(lib: &mut SyntheticLibrary, e: &mut Emitter) -> CompileResult<()> {
    const COUNT: i64 = -8;
    const LINE: i64 = -48;
    const OUTER: i64 = -56;
    const INDEX: i64 = -64;

    e.binary(Sub, 64i64, Sp)?;
    for (i, arg) in Register::ARGS.iter().enumerate() {
        e.binary(Mov, *arg, fp(-8 * (i as i64 + 1)))?;
    }

    let alloc = lib.reference(SyntheticFunction::AllocArray);
    e.binary(Mov, Arg1, Arg0)?;
    e.binary(Mov, Arg5, Arg1)?;
    e.call(alloc)?;
    e.binary(Mov, Acc, fp(OUTER))?;

    let done = e.next_label("nested_done");
    let top = e.next_label("nested_loop");
    e.binary(Mov, fp(COUNT), Acc)?;
    e.binary(Sub, 1i64, Acc)?;
    e.binary(Cmp, 0i64, Acc)?;
    e.unary(Je, Operand::label(&done))?;
    e.annotate("innermost level");

    e.binary(Mov, 1i64, fp(INDEX))?;
    e.label(top.clone());
    e.binary(Mov, fp(OUTER), Tmp0)?;
    e.binary(Mov, fp(INDEX), Acc)?;
    e.binary(Cmp, Operand::mem(Tmp0, 0), Acc)?;
    e.unary(Jg, Operand::label(&done))?;

    e.binary(Mov, fp(COUNT), Arg0)?;
    e.binary(Sub, 1i64, Arg0)?;
    e.binary(Mov, fp(-24), Arg1)?;
    e.binary(Mov, fp(-32), Arg2)?;
    e.binary(Mov, fp(-40), Arg3)?;
    e.binary(Mov, 0i64, Arg4)?;
    e.binary(Mov, fp(LINE), Arg5)?;
    e.call(SyntheticFunction::AllocNestedArray.label())?;

    e.binary(Mov, fp(OUTER), Tmp0)?;
    e.binary(Mov, fp(INDEX), Tmp1)?;
    e.binary(Mov, Acc, Operand::indexed(Tmp0, Tmp1, 8, 0))?;
    e.binary(Add, 1i64, Tmp1)?;
    e.binary(Mov, Tmp1, fp(INDEX))?;
    e.unary(Jmp, Operand::label(&top))?;

    e.label(done);
    e.binary(Mov, fp(OUTER), Acc)?;
    Ok(())
}
