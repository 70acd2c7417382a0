//! minijc - assembly backend for a MiniJava-like language.
//!
//! Takes a type-checked syntax tree and produces textual assembly for x86-64 (AT&T syntax)
//! or ARM64. The output is linked against the small C runtime in `runtime/boot.c`.
//!
//! # Primary Usage
//!
//! ```ignore
//! use minijc::{compile_program, CodegenOptions};
//!
//! let program = serde_json::from_str(&json)?;
//! let unit = compile_program(&program, &CodegenOptions::default())?;
//! println!("{}", unit.assembly);
//! ```
//!
//! # Architecture
//!
//! - [`ast`] - typed syntax tree, the input boundary
//! - [`layout`] - symbol table, dispatch tables, field and frame offsets
//! - [`codegen`] - instruction selection
//! - [`synth`] - helper routines emitted on demand
//! - [`isa`] - abstract instructions and the per-architecture renderers
//! - [`core`] - errors, emitter, session
//! - [`filecheck`] - FileCheck-style assertions on generated assembly

pub mod ast;
pub mod codegen;
pub mod config;
pub mod core;
pub mod filecheck;
pub mod isa;
pub mod layout;
pub mod runtime;
pub mod synth;

pub use crate::core::{CodegenSession, CompileError, CompileResult, CompiledUnit, SessionStats};
pub use config::CodegenOptions;
pub use isa::Arch;

/// Compile `program` for the target in `options`.
pub fn compile_program(
    program: &ast::Program,
    options: &CodegenOptions,
) -> CompileResult<CompiledUnit> {
    CodegenSession::new(*options)?.compile(program)
}
