//! Helpers for native and JIT functions called from bytecode.

use tracing::trace;

use super::frame::RETURN_VALUE_OFFSET;
use super::runtime::{Runtime, TRACE_TARGET};
use crate::codeenv::{CodeAddress, CodeEnv};
use crate::value::Value;

/// Argument window of a native call.
///
/// The window is located relative to the end of the stack so it stays valid
/// when the native grows the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeArgs {
    pub(super) frame_from_end: usize,
    pub(super) argc: usize,
}

impl NativeArgs {
    /// Arguments plus closure captures visible to the callee.
    pub fn len(&self) -> usize {
        self.argc
    }

    pub fn is_empty(&self) -> bool {
        self.argc == 0
    }
}

impl Runtime {
    fn frame_base(&self, args: NativeArgs) -> usize {
        self.stack.len() - args.frame_from_end
    }

    /// Argument `index` of the current native call (captures come first).
    pub fn argument(&self, args: NativeArgs, index: usize) -> Option<&Value> {
        if index >= args.argc {
            return None;
        }
        self.stack.get(self.frame_base(args) + 4 + index)
    }

    pub fn set_return(&mut self, args: NativeArgs, value: Value) {
        let slot = (self.frame_base(args) as isize - RETURN_VALUE_OFFSET as isize) as usize;
        self.stack[slot] = value;
    }

    /// Points the interpreter at `target`; return `CallStatus::Resync`
    /// afterwards so the dispatch loop reloads its state. The target runs in
    /// the caller's frame and returns through it.
    pub fn redirect(&mut self, target: CodeAddress) -> bool {
        match CodeEnv::find(target) {
            Some(env) => {
                trace!(target: TRACE_TARGET, target = %target, "runtime.redirect");
                self.ip = Some(target);
                self.env = Some(env);
                true
            }
            None => false,
        }
    }
}
