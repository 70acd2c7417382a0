// This module defines error types for the minijc backend using the thiserror crate for
// idiomatic Rust error handling. CompileError is the single error enum covering every way a
// compilation unit can abort: layout ordering violations, unresolved symbols, offsets read
// before assignment, stack imbalance detected by the emitter, missing per-architecture
// mappings, operand shapes a renderer cannot express, backend limits, and the resource
// errors raised while reading the syntax tree or writing the instruction stream. Each
// variant carries the context needed to locate the defect. The enum splits into two
// classes via is_internal(): internal-compiler defects that indicate a bug in an earlier
// phase or in code generation itself, and resource errors that the driver reports as an
// ordinary non-zero exit status. CompileResult<T> is the usual alias.

//! Error types for the minijc backend.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

/// Main error type for code generation.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Layout ordering violation: {reason}")]
    Layout {
        reason: String,
    },

    #[error("Unresolved symbol: {name}")]
    UnresolvedSymbol {
        name: String,
    },

    #[error("Offset of `{name}` read before it was assigned")]
    UnassignedOffset {
        name: String,
    },

    #[error("Stack underflow: pop with an empty tracked stack")]
    StackUnderflow,

    #[error("Unbalanced stack at return: {depth} word(s) still pushed")]
    UnbalancedStack {
        depth: usize,
    },

    #[error("No {arch} rendering registered for {item}")]
    UnregisteredMapping {
        arch: &'static str,
        item: String,
    },

    #[error("Operand not encodable on {arch}: {reason}")]
    InvalidOperand {
        arch: &'static str,
        reason: String,
    },

    #[error("Node cannot be lowered here: {node}")]
    UnsupportedNode {
        node: String,
    },

    #[error("Type mismatch: {reason}")]
    TypeMismatch {
        reason: String,
    },

    #[error("Backend limit exceeded: {reason}")]
    Limit {
        reason: String,
    },

    #[error("Invalid syntax tree input: {0}")]
    InvalidInput(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    /// Whether this error is an internal-compiler defect rather than a resource failure.
    ///
    /// Internal defects mean an earlier phase handed over an inconsistent tree or the
    /// backend itself is wrong; they are never presented as language diagnostics.
    pub fn is_internal(&self) -> bool {
        !matches!(self, CompileError::InvalidInput(_) | CompileError::Io(_))
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(CompileError::StackUnderflow.is_internal());
        assert!(CompileError::UnbalancedStack { depth: 2 }.is_internal());
        assert!(CompileError::Layout { reason: "x".into() }.is_internal());

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert!(!CompileError::from(io).is_internal());

        let json = serde_json::from_str::<u32>("not json").unwrap_err();
        assert!(!CompileError::from(json).is_internal());
    }

    #[test]
    fn test_error_messages() {
        let err = CompileError::UnbalancedStack { depth: 3 };
        assert_eq!(
            err.to_string(),
            "Unbalanced stack at return: 3 word(s) still pushed"
        );

        let err = CompileError::UnresolvedSymbol { name: "A.f".into() };
        assert_eq!(err.to_string(), "Unresolved symbol: A.f");
    }
}
