//! Per-method activation record layout.
//!
//! Frames are addressed from the frame pointer. Word -1 holds the receiver, parameters
//! follow at -2, -3, ..., then method-level locals, then slots reserved for block-scoped
//! declarations, which are handed out while the body is generated. The frame is rounded up
//! to an even number of words so the stack stays 16-byte aligned after the prologue.

use super::{MethodId, SymbolTable};
use crate::core::error::{CompileError, CompileResult};
use crate::isa::WORD_SIZE;

/// Word offset of the receiver slot.
pub const SELF_SLOT: i64 = -1;

/// Layout of one method activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Frame size in words, even.
    pub words: usize,
    next_slot: i64,
    lowest_slot: i64,
}

impl FrameLayout {
    /// Bytes to reserve below the frame pointer.
    pub fn bytes(&self) -> i64 {
        self.words as i64 * WORD_SIZE
    }

    /// Byte offset of the receiver slot.
    pub fn self_offset() -> i64 {
        SELF_SLOT * WORD_SIZE
    }

    /// Hand out the next reserved block-local slot, as a word offset.
    pub fn allocate_block_local(&mut self) -> CompileResult<i64> {
        if self.next_slot < self.lowest_slot {
            return Err(CompileError::Layout {
                reason: "more block-scoped locals than frame slots reserved".into(),
            });
        }
        let slot = self.next_slot;
        self.next_slot -= 1;
        Ok(slot)
    }
}

/// Assign offsets to the parameters and locals of `method` and compute its frame size.
pub fn assign_frame(table: &mut SymbolTable, method: MethodId) -> CompileResult<FrameLayout> {
    let entry = table.method(method);
    if entry.frame_words.is_some() {
        return Err(CompileError::Layout {
            reason: format!("frame of `{}` computed twice", table.method_label(method)),
        });
    }

    let vars: Vec<_> = entry.params.iter().chain(&entry.locals).copied().collect();
    let block_locals = entry.block_locals;

    let mut slot = SELF_SLOT - 1;
    for var in vars.iter().copied() {
        table.var_mut(var).assign_offset(slot)?;
        slot -= 1;
    }

    let used = 1 + vars.len() + block_locals;
    let words = used + used % 2;
    table.method_mut(method).frame_words = Some(words);
    log::debug!(
        "frame of `{}`: {} word(s), {} block local(s)",
        table.method_label(method),
        words,
        block_locals
    );

    Ok(FrameLayout {
        words,
        next_slot: slot,
        lowest_slot: -(used as i64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::Type;
    use crate::layout::layout_classes;

    #[test]
    fn test_frame_offsets() {
        let program = program(
            vec![],
            vec![],
            vec![class(
                "A",
                None,
                vec![],
                vec![method(
                    "f",
                    Type::Int,
                    vec![decl("p", Type::Int), decl("q", Type::Int)],
                    vec![decl("l", Type::Boolean)],
                    vec![
                        var_init("b", Type::Int, int(1)),
                        ret(ident("b", Type::Int)),
                    ],
                )],
            )],
        );
        let mut table = SymbolTable::from_program(&program).unwrap();
        layout_classes(&mut table).unwrap();
        let a = table.class_id("A").unwrap();
        let f = table.find_method(a, "f").unwrap();

        let mut frame = assign_frame(&mut table, f).unwrap();
        // self + 2 params + 1 local + 1 block local = 5, rounded to 6.
        assert_eq!(frame.words, 6);
        assert_eq!(frame.bytes(), 48);

        let entry = table.method(f);
        let offsets: Vec<i64> = entry
            .params
            .iter()
            .chain(&entry.locals)
            .map(|&v| table.var(v).offset().unwrap())
            .collect();
        assert_eq!(offsets, vec![-2, -3, -4]);

        assert_eq!(frame.allocate_block_local().unwrap(), -5);
        assert!(frame.allocate_block_local().is_err());
        assert!(assign_frame(&mut table, f).is_err());
    }
}
