// This module collects the infrastructure shared by every stage of the backend: the error
// type all fallible operations return, the instruction emitter that owns the item stream of
// a unit and tracks stack depth, and the session that wires layout, instruction selection
// and rendering together for one unit and reports its statistics.

//! Core infrastructure.
//!
//! # Key Components
//!
//! ## Errors (`error`)
//! - One error enum for the whole crate, split into internal defects and resource failures
//!
//! ## Emitter (`emitter`)
//! - Linear stream of abstract instructions, labels and directives
//! - Stack-depth tracking and call-site alignment
//!
//! ## Session (`session`)
//! - Runs one unit from syntax tree to assembly text
//! - Compilation statistics

pub mod emitter;
pub mod error;
pub mod session;

pub use emitter::{AsmItem, Emitter, EmitterCounters};
pub use error::{CompileError, CompileResult};
pub use session::{CodegenSession, CompiledUnit, SessionStats};
