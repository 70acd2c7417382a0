//! Code generation options.
//!
//! The target is fixed here, once, before any code is emitted; nothing downstream switches
//! on it except the renderer chosen from it.

use crate::isa::Arch;
use serde::{Deserialize, Serialize};

/// Options for one compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenOptions {
    /// Target instruction set.
    pub arch: Arch,
    /// Render trailing comments next to annotated instructions.
    pub comments: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            arch: Arch::default(),
            comments: true,
        }
    }
}

impl CodegenOptions {
    pub fn for_arch(arch: Arch) -> Self {
        Self {
            arch,
            ..Self::default()
        }
    }

    pub fn without_comments(mut self) -> Self {
        self.comments = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CodegenOptions::default();
        assert_eq!(options.arch, Arch::X86_64);
        assert!(options.comments);

        let arm = CodegenOptions::for_arch(Arch::Arm64).without_comments();
        assert_eq!(arm.arch, Arch::Arm64);
        assert!(!arm.comments);
    }

    #[test]
    fn test_partial_json() {
        let options: CodegenOptions = serde_json::from_str(r#"{"arch": "arm64"}"#).unwrap();
        assert_eq!(options, CodegenOptions::for_arch(Arch::Arm64));
    }
}
