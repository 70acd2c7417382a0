// This module implements the two class layout passes. build_dispatch_table() gives a class
// its dispatch table: the parent's table is copied slot for slot, a method that redeclares
// an inherited name replaces that slot (keeping the parent's index and recording the
// overridden method), and genuinely new methods are appended after the last inherited slot.
// Index 0 is reserved, since word 0 of the emitted table holds the parent's table address,
// so a base class's first method gets index 1. assign_field_offsets() does the same for
// instance fields: word 0 of an object is its dispatch pointer, inherited fields keep the
// parent's offsets, and the class's own fields continue after them. Both passes refuse to
// run for a class whose parent has not been processed, and refuse to run twice; the field
// pass also refuses to run before the dispatch-table pass, which fixes the pass order.

//! Dispatch-table construction and field offset assignment.

use super::{ClassId, SymbolTable};
use crate::core::error::{CompileError, CompileResult};

/// Build the dispatch table of `class`. Its parent's table must already exist.
pub fn build_dispatch_table(table: &mut SymbolTable, class: ClassId) -> CompileResult<()> {
    let entry = table.class(class);
    if entry.vtable.is_some() {
        return Err(CompileError::Layout {
            reason: format!("dispatch table of `{}` built twice", entry.name),
        });
    }

    let mut slots = match entry.parent {
        Some(parent) => {
            let parent = table.class(parent);
            parent.vtable.clone().ok_or_else(|| CompileError::Layout {
                reason: format!(
                    "dispatch table of `{}` requested before its parent `{}`",
                    entry.name, parent.name
                ),
            })?
        }
        None => Vec::new(),
    };

    let own = entry.methods.clone();
    for method in own {
        let name = table.method(method).name.clone();
        let inherited = slots.iter().position(|&m| table.method(m).name == name);
        let index = match inherited {
            Some(pos) => {
                let overridden = slots[pos];
                slots[pos] = method;
                table.method_mut(method).overrides = Some(overridden);
                pos + 1
            }
            None => {
                slots.push(method);
                slots.len()
            }
        };
        let entry = table.method_mut(method);
        if entry.vtable_index != 0 {
            return Err(CompileError::Layout {
                reason: format!("dispatch index of `{}` assigned twice", entry.name),
            });
        }
        entry.vtable_index = index;
        log::trace!("slot {index}: {name}");
    }

    log::debug!(
        "dispatch table for `{}`: {} slot(s)",
        table.class(class).name,
        slots.len()
    );
    table.class_mut(class).vtable = Some(slots);
    Ok(())
}

/// Assign offsets to the fields declared by `class` and fix its instance size.
pub fn assign_field_offsets(table: &mut SymbolTable, class: ClassId) -> CompileResult<()> {
    let entry = table.class(class);
    if entry.vtable.is_none() {
        return Err(CompileError::Layout {
            reason: format!(
                "field offsets of `{}` requested before its dispatch table",
                entry.name
            ),
        });
    }
    if entry.instance_words.is_some() {
        return Err(CompileError::Layout {
            reason: format!("field offsets of `{}` assigned twice", entry.name),
        });
    }

    // Word 0 is the dispatch pointer.
    let start = match entry.parent {
        Some(parent) => {
            let parent = table.class(parent);
            parent.instance_words.ok_or_else(|| CompileError::Layout {
                reason: format!(
                    "field offsets of `{}` requested before its parent `{}`",
                    entry.name, parent.name
                ),
            })?
        }
        None => 1,
    };

    let fields = entry.fields.clone();
    for (i, &field) in fields.iter().enumerate() {
        table.var_mut(field).assign_offset((start + i) as i64)?;
    }
    let words = start + fields.len();
    log::debug!("instance of `{}`: {} word(s)", table.class(class).name, words);
    table.class_mut(class).instance_words = Some(words);
    Ok(())
}
