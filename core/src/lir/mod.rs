//! Low-level IR and its commit pipeline.
//!
//! Functions are built as [`LirFunction`]s, queued in a [`LirCompiler`] and
//! committed into one contiguous bytecode buffer, which becomes a
//! [`CodeEnv`](crate::codeenv::CodeEnv).

mod compiler;
mod function;
mod instr;
mod lower;
pub mod regalloc;

pub use compiler::{CommitError, CompilerOptions, LirCompiler, PROLOGUE_WORDS};
pub use function::LirFunction;
pub use instr::*;
