// This module implements the synthetic function library: the fixed catalogue of runtime
// helper routines that compiled code calls for heap arrays and strings. Code generation
// never emits a helper directly. It asks the library for the helper's label, which marks
// the helper as referenced, and after all methods are generated emit_referenced() runs a
// closure pass: it repeatedly emits every helper that is referenced but not yet emitted
// until nothing new shows up. Helpers reference each other through the same call (the
// string-and-int concatenation references both the int conversion and the plain
// concatenation), so a helper appears in the output exactly once if anything reaches it,
// and not at all otherwise. The generators themselves live in array.rs and string.rs and
// are written against the abstract instruction set like all other code.

//! Lazily emitted runtime helpers with transitive-reference closure.

pub mod array;
pub mod string;

use crate::codegen::data::StringPool;
use crate::core::emitter::Emitter;
use crate::core::error::CompileResult;
use std::collections::HashSet;

/// One helper routine of the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SyntheticFunction {
    /// `(length, line) -> array`; fails at runtime on a negative length.
    AllocArray,
    /// `(dimension count, d1, d2, d3, d4, line) -> array` of nested arrays.
    AllocNestedArray,
    /// `(string, string) -> string`.
    ConcatStrings,
    /// `(boolean) -> string`.
    BoolToString,
    /// `(int) -> string`.
    IntToString,
    /// `(string, boolean) -> string`.
    ConcatStringBool,
    /// `(boolean, string) -> string`.
    ConcatBoolString,
    /// `(string, int) -> string`.
    ConcatStringInt,
    /// `(int, string) -> string`.
    ConcatIntString,
}

impl SyntheticFunction {
    pub const ALL: [SyntheticFunction; 9] = [
        SyntheticFunction::AllocArray,
        SyntheticFunction::AllocNestedArray,
        SyntheticFunction::ConcatStrings,
        SyntheticFunction::BoolToString,
        SyntheticFunction::IntToString,
        SyntheticFunction::ConcatStringBool,
        SyntheticFunction::ConcatBoolString,
        SyntheticFunction::ConcatStringInt,
        SyntheticFunction::ConcatIntString,
    ];

    /// Code label of the helper.
    pub fn label(self) -> &'static str {
        match self {
            SyntheticFunction::AllocArray => "synth.alloc_array",
            SyntheticFunction::AllocNestedArray => "synth.alloc_nested_array",
            SyntheticFunction::ConcatStrings => "synth.concat_strings",
            SyntheticFunction::BoolToString => "synth.bool_to_string",
            SyntheticFunction::IntToString => "synth.int_to_string",
            SyntheticFunction::ConcatStringBool => "synth.concat_string_bool",
            SyntheticFunction::ConcatBoolString => "synth.concat_bool_string",
            SyntheticFunction::ConcatStringInt => "synth.concat_string_int",
            SyntheticFunction::ConcatIntString => "synth.concat_int_string",
        }
    }
}

/// Referenced/emitted bookkeeping for one compilation unit.
#[derive(Debug, Default)]
pub struct SyntheticLibrary {
    referenced: HashSet<SyntheticFunction>,
    emitted: HashSet<SyntheticFunction>,
}

impl SyntheticLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `function` as needed and return its label.
    pub fn reference(&mut self, function: SyntheticFunction) -> &'static str {
        if self.referenced.insert(function) {
            log::debug!("helper {} referenced", function.label());
        }
        function.label()
    }

    pub fn is_referenced(&self, function: SyntheticFunction) -> bool {
        self.referenced.contains(&function)
    }

    pub fn is_emitted(&self, function: SyntheticFunction) -> bool {
        self.emitted.contains(&function)
    }

    /// Emit every referenced helper, and everything they reference in turn, exactly once.
    /// Returns the number of helpers emitted by this call.
    pub fn emit_referenced(
        &mut self,
        e: &mut Emitter,
        strings: &mut StringPool,
    ) -> CompileResult<usize> {
        let mut count = 0;
        loop {
            let pending: Vec<SyntheticFunction> = SyntheticFunction::ALL
                .iter()
                .copied()
                .filter(|f| self.is_referenced(*f) && !self.is_emitted(*f))
                .collect();
            if pending.is_empty() {
                break;
            }
            for function in pending {
                self.emitted.insert(function);
                self.generate(function, e, strings)?;
                count += 1;
            }
        }
        log::debug!("emitted {count} helper(s)");
        Ok(count)
    }

    fn generate(
        &mut self,
        function: SyntheticFunction,
        e: &mut Emitter,
        strings: &mut StringPool,
    ) -> CompileResult<()> {
        log::debug!("emitting helper {}", function.label());
        e.blank();
        e.label(function.label());
        e.prologue()?;
        match function {
            SyntheticFunction::AllocArray => array::alloc_array(e)?,
            SyntheticFunction::AllocNestedArray => array::alloc_nested_array(self, e)?,
            SyntheticFunction::ConcatStrings => string::concat_strings(e)?,
            SyntheticFunction::BoolToString => string::bool_to_string(e, strings)?,
            SyntheticFunction::IntToString => string::int_to_string(e)?,
            SyntheticFunction::ConcatStringBool => {
                string::concat_converted(self, e, SyntheticFunction::BoolToString, false)?
            }
            SyntheticFunction::ConcatBoolString => {
                string::concat_converted(self, e, SyntheticFunction::BoolToString, true)?
            }
            SyntheticFunction::ConcatStringInt => {
                string::concat_converted(self, e, SyntheticFunction::IntToString, false)?
            }
            SyntheticFunction::ConcatIntString => {
                string::concat_converted(self, e, SyntheticFunction::IntToString, true)?
            }
        }
        e.epilogue()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::emitter::AsmItem;

    fn labels(e: &Emitter) -> Vec<String> {
        e.items()
            .iter()
            .filter_map(|item| match item {
                AsmItem::Label(l) if l.starts_with("synth.") => Some(l.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_nothing_referenced_nothing_emitted() {
        let mut lib = SyntheticLibrary::new();
        let mut e = Emitter::new();
        let mut strings = StringPool::new();
        assert_eq!(lib.emit_referenced(&mut e, &mut strings).unwrap(), 0);
        assert!(e.items().is_empty());
    }

    #[test]
    fn test_transitive_closure() {
        let mut lib = SyntheticLibrary::new();
        let mut e = Emitter::new();
        let mut strings = StringPool::new();
        assert_eq!(
            lib.reference(SyntheticFunction::ConcatStringInt),
            "synth.concat_string_int"
        );
        assert_eq!(lib.emit_referenced(&mut e, &mut strings).unwrap(), 3);

        let mut emitted = labels(&e);
        emitted.sort();
        assert_eq!(
            emitted,
            vec![
                "synth.concat_string_int",
                "synth.concat_strings",
                "synth.int_to_string"
            ]
        );
        assert!(!lib.is_emitted(SyntheticFunction::BoolToString));

        // A second closure pass finds nothing new.
        assert_eq!(lib.emit_referenced(&mut e, &mut strings).unwrap(), 0);
    }

    #[test]
    fn test_each_helper_emitted_once() {
        let mut lib = SyntheticLibrary::new();
        let mut e = Emitter::new();
        let mut strings = StringPool::new();
        for f in SyntheticFunction::ALL {
            lib.reference(f);
        }
        assert_eq!(
            lib.emit_referenced(&mut e, &mut strings).unwrap(),
            SyntheticFunction::ALL.len()
        );
        let emitted = labels(&e);
        let unique: HashSet<_> = emitted.iter().collect();
        assert_eq!(unique.len(), emitted.len());
        assert_eq!(strings.len(), 2);
    }
}
