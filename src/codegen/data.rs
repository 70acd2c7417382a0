//! Static data: dispatch tables and pooled string literals.
//!
//! A dispatch table's first word is the parent's table address (or 0 for a root class),
//! followed by one method label per slot. String literals use the heap string layout, a
//! length word followed by one word per UTF-8 byte, so the helpers and the runtime never
//! distinguish literals from computed strings and the runtime prints them byte by byte.

use crate::core::emitter::Emitter;
use crate::core::error::CompileResult;
use crate::isa::{DataWord, Directive, Section};
use crate::layout::SymbolTable;
use std::collections::HashMap;

/// Interned string literals, emitted once each.
#[derive(Debug, Default)]
pub struct StringPool {
    labels: HashMap<String, String>,
    entries: Vec<(String, String)>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label of the pooled copy of `value`.
    pub fn intern(&mut self, value: &str) -> String {
        if let Some(label) = self.labels.get(value) {
            return label.clone();
        }
        let label = format!(".Lstr_{}", self.entries.len());
        self.labels.insert(value.to_string(), label.clone());
        self.entries.push((label.clone(), value.to_string()));
        label
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Emit every pooled literal.
    pub fn emit(&self, e: &mut Emitter) {
        for (label, value) in &self.entries {
            e.label(label.clone());
            let mut words = vec![DataWord::Int(value.len() as i64)];
            words.extend(value.bytes().map(|b| DataWord::Int(i64::from(b))));
            e.directive(Directive::Quad(words));
        }
    }
}

/// Emit the dispatch table of every class, in declaration order.
pub fn emit_dispatch_tables(table: &SymbolTable, e: &mut Emitter) -> CompileResult<()> {
    for class in table.class_ids() {
        let entry = table.class(class);
        let parent = match entry.parent {
            Some(parent) => DataWord::Label(table.class(parent).vtable_label()),
            None => DataWord::Int(0),
        };
        let mut words = vec![parent];
        for &method in entry.dispatch_table()? {
            words.push(DataWord::Label(table.method_label(method)));
        }
        e.label(entry.vtable_label());
        e.directive(Directive::Quad(words));
    }
    Ok(())
}

/// Emit the whole data section.
pub fn emit_data_section(
    table: &SymbolTable,
    strings: &StringPool,
    e: &mut Emitter,
) -> CompileResult<()> {
    e.blank();
    e.directive(Directive::Section(Section::Data));
    e.directive(Directive::Align(3));
    emit_dispatch_tables(table, e)?;
    strings.emit(e);
    Ok(())
}
