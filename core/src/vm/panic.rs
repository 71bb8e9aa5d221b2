use thiserror::Error;

use crate::codeenv::CodeAddress;

/// Fatal runtime faults. They point at a compiler or embedding bug, never at
/// a script-level error, and end in a panic once state has been synced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmPanic {
    #[error("bad opcode in word {word:#010x} at {addr}")]
    BadOpcode { addr: CodeAddress, word: u32 },
    #[error("stack overflow: {requested} slots exceed the limit of {limit}")]
    StackOverflow { requested: usize, limit: usize },
    #[error("bad callstack at {addr}: expected {expected}, found {found}")]
    BadCallstack {
        addr: CodeAddress,
        expected: &'static str,
        found: &'static str,
    },
    #[error("no code environment contains {addr}")]
    CodeEnvNotFound { addr: CodeAddress },
    #[error("type mismatch in `{op}`: {lhs}, {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("integer division by zero in `{op}`")]
    DivisionByZero { op: &'static str },
    #[error("`{mode}` cannot call a value of type {found}")]
    NotCallable { mode: &'static str, found: &'static str },
}

impl VmPanic {
    pub fn reason_key(&self) -> &'static str {
        match self {
            VmPanic::BadOpcode { .. } => "bad_opcode",
            VmPanic::StackOverflow { .. } => "stack_overflow",
            VmPanic::BadCallstack { .. } => "bad_callstack",
            VmPanic::CodeEnvNotFound { .. } => "codeenv_not_found",
            VmPanic::TypeMismatch { .. } => "type_mismatch",
            VmPanic::DivisionByZero { .. } => "division_by_zero",
            VmPanic::NotCallable { .. } => "not_callable",
        }
    }
}
