use tracing::{debug, error, warn};

use super::frame::{CallKind, FRAME_SLOTS, FrameLink};
use super::VmPanic;
use crate::codeenv::{CodeAddress, CodeEnv};
use crate::value::{CallStatus, Value};

pub(super) const TRACE_TARGET: &str = "woort::vm";

pub const DEFAULT_INITIAL_STACK_SLOTS: usize = 32;
pub const DEFAULT_MAX_STACK_SLOTS: usize = (1 << 30) / 8;

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub initial_stack_slots: usize,
    /// Hard cap for stack growth; exceeding it is fatal.
    pub max_stack_slots: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            initial_stack_slots: DEFAULT_INITIAL_STACK_SLOTS,
            max_stack_slots: DEFAULT_MAX_STACK_SLOTS,
        }
    }
}

/// How the dispatch loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RunExit {
    /// The `FromNative` frame returned.
    Returned,
    Yielded,
    Aborted,
}

/// State saved by `invoke`, used to roll back on `Aborted`.
#[derive(Debug, Clone)]
pub(super) struct Snapshot {
    sp_from_end: usize,
    sb_from_end: usize,
    ip: Option<CodeAddress>,
    env: Option<CodeEnv>,
}

/// One execution context: a downward-growing value stack plus the registers
/// of the interpreter.
///
/// `sp` is the index of the next free slot; `sb` is the base of the current
/// frame. Both are only authoritative here while no dispatch loop is running
/// or after the loop synced them.
pub struct Runtime {
    pub(super) stack: Vec<Value>,
    pub(super) sp: usize,
    pub(super) sb: usize,
    pub(super) ip: Option<CodeAddress>,
    pub(super) env: Option<CodeEnv>,
    pub(super) stack_realloc_version: u64,
    pub(super) dispatch_budget: Option<u64>,
    suspended: Option<Snapshot>,
    options: RuntimeOptions,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeOptions::default())
    }
}

impl Runtime {
    pub fn new(options: RuntimeOptions) -> Self {
        let slots = options.initial_stack_slots.max(FRAME_SLOTS + 1);
        let top = slots - 1;
        Self {
            stack: vec![Value::Nil; slots],
            sp: top,
            sb: top,
            ip: None,
            env: None,
            stack_realloc_version: 0,
            dispatch_budget: None,
            suspended: None,
            options,
        }
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Bumped every time the stack is relocated.
    pub fn stack_realloc_version(&self) -> u64 {
        self.stack_realloc_version
    }

    /// Distance of `sp` from the end of the stack; stable across growth.
    pub fn sp_from_end(&self) -> usize {
        self.stack.len() - self.sp
    }

    pub fn sb_from_end(&self) -> usize {
        self.stack.len() - self.sb
    }

    pub fn ip(&self) -> Option<CodeAddress> {
        self.ip
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.is_some()
    }

    /// Limits how many instructions run before the loop yields. `None` runs
    /// without limit.
    pub fn set_dispatch_budget(&mut self, budget: Option<u64>) {
        self.dispatch_budget = budget;
    }

    pub fn dispatch_budget(&self) -> Option<u64> {
        self.dispatch_budget
    }

    /// Guarantees room for `slots` pushes below `sp`, growing the stack when
    /// needed. Growth bumps [`Self::stack_realloc_version`].
    pub fn reserve_stack(&mut self, slots: usize) {
        if self.sp < slots {
            self.grow(slots);
        }
    }

    pub fn push(&mut self, value: Value) {
        self.reserve_stack(1);
        self.stack[self.sp] = value;
        self.sp -= 1;
    }

    /// Collects the value returned by the last completed call and drops its
    /// frame remnant and `argc` arguments.
    pub fn pop_result(&mut self, argc: usize) -> Value {
        let value = std::mem::take(&mut self.stack[self.sp + FRAME_SLOTS]);
        self.sp += FRAME_SLOTS + argc;
        value
    }

    /// Runs the function at `entry` as if called from native code. Arguments
    /// must already be pushed, last argument first.
    pub fn invoke(&mut self, entry: CodeAddress) -> CallStatus {
        let Some(env) = CodeEnv::find(entry) else {
            warn!(target: TRACE_TARGET, entry = %entry, "runtime.invoke_unknown_entry");
            return CallStatus::Aborted;
        };
        let snapshot = self.snapshot();
        debug!(target: TRACE_TARGET, entry = %entry, sp_from_end = snapshot.sp_from_end, "runtime.invoke");

        self.reserve_stack(FRAME_SLOTS);
        let caller_sb_from_end = self.stack.len() - self.sb;
        self.sp -= FRAME_SLOTS;
        self.sb = self.sp;
        self.stack[self.sb + 1] = Value::Frame(FrameLink {
            kind: CallKind::FromNative,
            caller_sb_from_end,
        });
        self.stack[self.sb + 2] = Value::ReturnAddress(self.ip);
        self.stack[self.sb + 3] = Value::Nil;
        self.ip = Some(entry);
        self.env = Some(env);

        let exit = self.run();
        self.settle(exit, snapshot)
    }

    /// Continues after a `Yield`.
    pub fn resume(&mut self) -> CallStatus {
        let Some(snapshot) = self.suspended.take() else {
            warn!(target: TRACE_TARGET, "runtime.resume_without_yield");
            return CallStatus::Aborted;
        };
        let exit = self.run();
        self.settle(exit, snapshot)
    }

    /// Pushes `args`, invokes `entry` and collects its result. Any status other
    /// than `Normal` is returned as the error.
    pub fn call(&mut self, entry: CodeAddress, args: &[Value]) -> Result<Value, CallStatus> {
        for arg in args.iter().rev() {
            self.push(arg.clone());
        }
        match self.invoke(entry) {
            CallStatus::Normal => Ok(self.pop_result(args.len())),
            CallStatus::Aborted => {
                self.sp += args.len();
                Err(CallStatus::Aborted)
            }
            status => Err(status),
        }
    }

    fn settle(&mut self, exit: RunExit, snapshot: Snapshot) -> CallStatus {
        match exit {
            RunExit::Returned => CallStatus::Normal,
            RunExit::Yielded => {
                self.suspended = Some(snapshot);
                CallStatus::Yield
            }
            RunExit::Aborted => {
                warn!(target: TRACE_TARGET, "runtime.aborted");
                self.restore(snapshot);
                CallStatus::Aborted
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            sp_from_end: self.stack.len() - self.sp,
            sb_from_end: self.stack.len() - self.sb,
            ip: self.ip,
            env: self.env.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.sp = self.stack.len() - snapshot.sp_from_end;
        self.sb = self.stack.len() - snapshot.sb_from_end;
        self.ip = snapshot.ip;
        self.env = snapshot.env;
    }

    /// Doubles the stack until `slots` more pushes fit, moving the contents to
    /// the tail of the new buffer.
    pub(super) fn grow(&mut self, slots: usize) {
        let len = self.stack.len();
        let needed = len - self.sp + slots;
        let limit = self.options.max_stack_slots;
        let mut new_len = len.max(1);
        while new_len < needed {
            new_len = new_len.saturating_mul(2);
        }
        if new_len > limit {
            if needed > limit {
                self.fatal(VmPanic::StackOverflow {
                    requested: needed,
                    limit,
                });
            }
            new_len = limit;
        }

        let delta = new_len - len;
        let mut grown = Vec::with_capacity(new_len);
        grown.resize(delta, Value::Nil);
        grown.append(&mut self.stack);
        self.stack = grown;
        self.sp += delta;
        self.sb += delta;
        self.stack_realloc_version += 1;
        debug!(
            target: TRACE_TARGET,
            from = len,
            to = new_len,
            version = self.stack_realloc_version,
            "runtime.stack_grow"
        );
    }

    /// Logs the fault with the synced state and panics.
    pub(super) fn fatal(&self, reason: VmPanic) -> ! {
        error!(
            target: TRACE_TARGET,
            reason = reason.reason_key(),
            ip = ?self.ip,
            sp = self.sp,
            sb = self.sb,
            stack_len = self.stack.len(),
            "runtime.panic: {reason}"
        );
        panic!("woort runtime panic: {reason}");
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("stack_len", &self.stack.len())
            .field("sp", &self.sp)
            .field("sb", &self.sb)
            .field("ip", &self.ip)
            .field("stack_realloc_version", &self.stack_realloc_version)
            .finish()
    }
}
