//! String helpers: concatenation and conversion of booleans and integers to strings.
//!
//! Strings share the array layout with one UTF-8 byte per word, so concatenation is
//! two word-granular copies into a fresh allocation.

use super::{SyntheticFunction, SyntheticLibrary};
use crate::codegen::data::StringPool;
use crate::core::emitter::Emitter;
use crate::core::error::CompileResult;
use crate::isa::{Operand, Operation, Register};
use crate::runtime;

use Operation::*;
use Register::*;

fn fp(offset: i64) -> Operand {
    Operand::mem(Fp, offset)
}

/// Body of `concat_strings(lhs, rhs)`.
pub fn concat_strings(e: &mut Emitter) -> CompileResult<()> {
    const LHS: i64 = -8;
    const RHS: i64 = -16;
    const TOTAL: i64 = -24;
    const RESULT: i64 = -32;

    e.binary(Sub, 32i64, Sp)?;
    e.binary(Mov, Arg0, fp(LHS))?;
    e.binary(Mov, Arg1, fp(RHS))?;
    e.binary(Mov, Operand::mem(Arg0, 0), Acc)?;
    e.binary(Add, Operand::mem(Arg1, 0), Acc)?;
    e.annotate("combined length");
    e.binary(Mov, Acc, fp(TOTAL))?;

    e.binary(Mov, Acc, Arg0)?;
    e.binary(Add, 1i64, Arg0)?;
    e.binary(Shl, 3i64, Arg0)?;
    e.call(runtime::CALLOC)?;
    e.binary(Mov, Acc, fp(RESULT))?;
    e.binary(Mov, fp(TOTAL), Tmp0)?;
    e.binary(Mov, Tmp0, Operand::mem(Acc, 0))?;

    // Left characters go right after the length word.
    e.binary(Lea, Operand::mem(Acc, 8), Arg0)?;
    copy_chars_args(e, LHS)?;
    e.call(runtime::MEMCPY)?;

    // Right characters follow the left ones.
    e.binary(Mov, fp(LHS), Tmp0)?;
    e.binary(Mov, Operand::mem(Tmp0, 0), Tmp0)?;
    e.binary(Shl, 3i64, Tmp0)?;
    e.binary(Mov, fp(RESULT), Arg0)?;
    e.binary(Add, 8i64, Arg0)?;
    e.binary(Add, Tmp0, Arg0)?;
    copy_chars_args(e, RHS)?;
    e.call(runtime::MEMCPY)?;

    e.binary(Mov, fp(RESULT), Acc)?;
    Ok(())
}

/// Load source address and byte count of the characters of the string saved at `slot`.
fn copy_chars_args(e: &mut Emitter, slot: i64) -> CompileResult<()> {
    e.binary(Mov, fp(slot), Arg1)?;
    e.binary(Mov, Operand::mem(Arg1, 0), Arg2)?;
    e.binary(Shl, 3i64, Arg2)?;
    e.binary(Add, 8i64, Arg1)?;
    Ok(())
}

/// Body of `bool_to_string(b)`: the pooled `"true"` or `"false"` literal.
pub fn bool_to_string(e: &mut Emitter, strings: &mut StringPool) -> CompileResult<()> {
    let is_false = e.next_label("bool_false");
    let done = e.next_label("bool_done");
    e.binary(Cmp, 0i64, Arg0)?;
    e.unary(Je, Operand::label(&is_false))?;
    e.binary(Lea, Operand::label(strings.intern("true")), Acc)?;
    e.unary(Jmp, Operand::label(&done))?;
    e.label(is_false);
    e.binary(Lea, Operand::label(strings.intern("false")), Acc)?;
    e.label(done);
    Ok(())
}

/// Body of `int_to_string(n)`.
///
/// Counts the characters first (digits plus a sign), allocates once, then writes the
/// digits from the last position backwards. Remainders of a negative dividend are
/// negative, so each digit is taken by magnitude, which also covers the most negative
/// integer.
pub fn int_to_string(e: &mut Emitter) -> CompileResult<()> {
    const VALUE: i64 = -8;
    const LENGTH: i64 = -16;
    const RESULT: i64 = -24;

    e.binary(Sub, 32i64, Sp)?;
    e.binary(Mov, Arg0, fp(VALUE))?;

    let non_negative = e.next_label("itoa_pos");
    let count = e.next_label("itoa_count");
    e.binary(Mov, 0i64, Tmp1)?;
    e.binary(Cmp, 0i64, Arg0)?;
    e.unary(Jge, Operand::label(&non_negative))?;
    e.binary(Mov, 1i64, Tmp1)?;
    e.annotate("sign");
    e.label(non_negative);
    e.binary(Mov, Arg0, Acc)?;
    e.binary(Mov, 10i64, Arg4)?;
    e.label(count.clone());
    e.nullary(Cqto)?;
    e.unary(Idiv, Arg4)?;
    e.binary(Add, 1i64, Tmp1)?;
    e.binary(Cmp, 0i64, Acc)?;
    e.unary(Jne, Operand::label(&count))?;
    e.binary(Mov, Tmp1, fp(LENGTH))?;

    e.binary(Mov, Tmp1, Arg0)?;
    e.binary(Add, 1i64, Arg0)?;
    e.binary(Shl, 3i64, Arg0)?;
    e.call(runtime::CALLOC)?;
    e.binary(Mov, Acc, fp(RESULT))?;
    e.binary(Mov, fp(LENGTH), Tmp1)?;
    e.binary(Mov, Tmp1, Operand::mem(Acc, 0))?;

    let fill = e.next_label("itoa_fill");
    e.binary(Mov, fp(VALUE), Acc)?;
    e.binary(Cmp, 0i64, Acc)?;
    e.unary(Jge, Operand::label(&fill))?;
    e.binary(Mov, fp(RESULT), Tmp0)?;
    e.binary(Mov, '-' as i64, Operand::mem(Tmp0, 8))?;
    e.label(fill);

    let digit = e.next_label("itoa_digit");
    let positive_digit = e.next_label("itoa_abs");
    e.binary(Mov, fp(RESULT), Tmp0)?;
    e.binary(Mov, fp(LENGTH), Arg3)?;
    e.binary(Mov, 10i64, Arg4)?;
    e.label(digit.clone());
    e.nullary(Cqto)?;
    e.unary(Idiv, Arg4)?;
    e.binary(Cmp, 0i64, Arg2)?;
    e.unary(Jge, Operand::label(&positive_digit))?;
    e.unary(Neg, Arg2)?;
    e.label(positive_digit);
    e.binary(Add, '0' as i64, Arg2)?;
    e.binary(Mov, Arg2, Operand::indexed(Tmp0, Arg3, 8, 0))?;
    e.binary(Sub, 1i64, Arg3)?;
    e.binary(Cmp, 0i64, Acc)?;
    e.unary(Jne, Operand::label(&digit))?;

    e.binary(Mov, Tmp0, Acc)?;
    Ok(())
}

/// Body of a concatenation with one converted operand.
///
/// `convert` turns the non-string operand into a string. With `converted_first` the
/// converted operand is the left one (`Arg0`), otherwise the right one (`Arg1`).
pub fn concat_converted(
    lib: &mut SyntheticLibrary,
    e: &mut Emitter,
    convert: SyntheticFunction,
    converted_first: bool,
) -> CompileResult<()> {
    const SAVED: i64 = -8;
    let convert = lib.reference(convert);
    let concat = lib.reference(SyntheticFunction::ConcatStrings);

    e.binary(Sub, 16i64, Sp)?;
    if converted_first {
        e.binary(Mov, Arg1, fp(SAVED))?;
    } else {
        e.binary(Mov, Arg0, fp(SAVED))?;
        e.binary(Mov, Arg1, Arg0)?;
    }
    e.call(convert)?;
    if converted_first {
        e.binary(Mov, Acc, Arg0)?;
        e.binary(Mov, fp(SAVED), Arg1)?;
    } else {
        e.binary(Mov, Acc, Arg1)?;
        e.binary(Mov, fp(SAVED), Arg0)?;
    }
    e.call(concat)?;
    Ok(())
}
