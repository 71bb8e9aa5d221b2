//! The interpreter loop.
//!
//! `ip`, `sp` and `sb` live in a [`Hot`] copy while the loop runs. They are
//! synced back into the [`Runtime`] before anything outside the loop can
//! observe them (native calls, yields, returns to the embedder, panics) and
//! reloaded after anything that may have changed them.

use std::sync::Arc;

use tracing::trace;

use super::frame::{CallKind, FRAME_SLOTS, FrameLink, slot_index};
use super::native::NativeArgs;
use super::ops;
use super::runtime::{RunExit, Runtime, TRACE_TARGET};
use super::VmPanic;
use crate::bytecode::formal::*;
use crate::bytecode::*;
use crate::codeenv::{CodeAddress, CodeEnv};
use crate::value::{CallStatus, Closure, FunctionRef, NativeFunction, Value};

#[derive(Debug, Clone, Copy)]
struct Hot {
    /// Word index inside the active environment.
    ip: usize,
    sp: usize,
    sb: usize,
}

enum Flow {
    Next,
    /// Shared state changed; reload everything, environment included.
    Reload,
    Exit(RunExit),
}

#[inline]
fn reg(code: &[u32], field: i8, cursor: &mut usize) -> i16 {
    if field == WIDE_REG {
        let value = decode_ext_i16(code[*cursor]);
        *cursor += 1;
        value
    } else {
        field as i16
    }
}

#[inline]
fn ext(code: &[u32], cursor: &mut usize) -> u32 {
    let value = decode_ext(code[*cursor]);
    *cursor += 1;
    value
}

/// Argument count of the `RESULT` that follows a call, if any.
fn result_argc(code: &[u32], at: usize) -> usize {
    match code.get(at) {
        Some(&word) if opcode_bits(word) == Opcode::Result.as_u6() => decode_op6m2_i8_u16(word).1 as usize,
        _ => 0,
    }
}

impl Runtime {
    #[inline]
    fn get(&self, sb: usize, offset: i16) -> &Value {
        &self.stack[slot_index(sb, offset)]
    }

    #[inline]
    fn set(&mut self, sb: usize, offset: i16, value: Value) {
        self.stack[slot_index(sb, offset)] = value;
    }

    fn sync(&mut self, hot: &Hot, env: &CodeEnv) {
        self.ip = Some(env.base().offset(hot.ip as u64));
        self.sp = hot.sp;
        self.sb = hot.sb;
        if !self.env.as_ref().is_some_and(|current| current.ptr_eq(env)) {
            self.env = Some(env.clone());
        }
    }

    fn resync(&self, env: &CodeEnv) -> Hot {
        let ip = self.ip.map_or(0, |ip| (ip.0 - env.base().0) as usize);
        Hot {
            ip,
            sp: self.sp,
            sb: self.sb,
        }
    }

    fn fault(&mut self, hot: &Hot, env: &CodeEnv, reason: VmPanic) -> ! {
        self.sync(hot, env);
        self.fatal(reason)
    }

    fn ensure_hot(&mut self, hot: &mut Hot, slots: usize, env: &CodeEnv) {
        if hot.sp < slots {
            self.sync(hot, env);
            self.grow(slots);
            hot.sp = self.sp;
            hot.sb = self.sb;
        }
    }

    fn frame_link(&self, sb: usize) -> Result<(FrameLink, Option<CodeAddress>), &'static str> {
        let link = match &self.stack[sb + 1] {
            Value::Frame(link) => *link,
            other => return Err(other.type_name()),
        };
        match &self.stack[sb + 2] {
            Value::ReturnAddress(addr) => Ok((link, *addr)),
            other => Err(other.type_name()),
        }
    }

    /// Active environment for `self.ip`, looked up again when the cached one
    /// does not contain it.
    fn current_env(&mut self) -> CodeEnv {
        let ip = self.ip;
        if let Some(env) = self.env.as_ref().filter(|env| ip.is_some_and(|ip| env.contains(ip))) {
            return env.clone();
        }
        let Some(addr) = ip else {
            self.fatal(VmPanic::BadCallstack {
                addr: CodeAddress(0),
                expected: "instruction pointer",
                found: "nothing",
            });
        };
        match CodeEnv::find(addr) {
            Some(env) => {
                trace!(target: TRACE_TARGET, addr = %addr, base = %env.base(), "runtime.env_switch");
                self.env = Some(env.clone());
                env
            }
            None => self.fatal(VmPanic::CodeEnvNotFound { addr }),
        }
    }

    /// Pushes a call frame below `hot.sp`; the caller ensured room.
    fn write_frame(&mut self, hot: &mut Hot, kind: CallKind, ret: Option<CodeAddress>) {
        let caller_sb_from_end = self.stack.len() - hot.sb;
        hot.sp -= FRAME_SLOTS;
        let sb = hot.sp;
        self.stack[sb + 1] = Value::Frame(FrameLink {
            kind,
            caller_sb_from_end,
        });
        self.stack[sb + 2] = Value::ReturnAddress(ret);
        self.stack[sb + 3] = Value::Nil;
        hot.sb = sb;
    }

    pub(super) fn run(&mut self) -> RunExit {
        'env: loop {
            let env = self.current_env();
            let code = env.code();
            let base = env.base();
            let mut hot = self.resync(&env);

            loop {
                if let Some(budget) = self.dispatch_budget.as_mut() {
                    if *budget == 0 {
                        self.sync(&hot, &env);
                        return RunExit::Yielded;
                    }
                    *budget -= 1;
                }

                let at = hot.ip;
                let Some(&word) = code.get(at) else {
                    self.fault(
                        &hot,
                        &env,
                        VmPanic::BadOpcode {
                            addr: base.offset(at as u64),
                            word: 0,
                        },
                    );
                };
                let bad_opcode = VmPanic::BadOpcode {
                    addr: base.offset(at as u64),
                    word,
                };
                let Some(opcode) = Opcode::from_u6(opcode_bits(word)) else {
                    self.fault(&hot, &env, bad_opcode);
                };
                let mode = mode_bits(word);
                let mut cursor = at + 1;

                match opcode {
                    Opcode::Nop => hot.ip = cursor,
                    Opcode::Load | Opcode::LoadEx => {
                        let (low, field) = decode_op6_u18_i8(word);
                        let dst = reg(code, field, &mut cursor);
                        let index = if opcode == Opcode::LoadEx {
                            low | (ext(code, &mut cursor) << 18)
                        } else {
                            low
                        };
                        let value = env.load(index as usize);
                        self.set(hot.sb, dst, value);
                        hot.ip = cursor;
                    }
                    Opcode::Store | Opcode::StoreEx => {
                        let (low, field) = decode_op6_u18_i8(word);
                        let src = reg(code, field, &mut cursor);
                        let index = if opcode == Opcode::StoreEx {
                            low | (ext(code, &mut cursor) << 18)
                        } else {
                            low
                        };
                        env.store(index as usize, self.get(hot.sb, src).clone());
                        hot.ip = cursor;
                    }
                    Opcode::Push => {
                        match mode {
                            MODE_PUSH_RESERVE => {
                                let slots = decode_op6m2_u24(word) as usize;
                                self.ensure_hot(&mut hot, slots, &env);
                                hot.sp -= slots;
                            }
                            MODE_PUSH_REG => {
                                let value = self.get(hot.sb, decode_op6m2_8_i16(word)).clone();
                                self.ensure_hot(&mut hot, 1, &env);
                                self.stack[hot.sp] = value;
                                hot.sp -= 1;
                            }
                            _ => {
                                let mut index = decode_op6m2_u24(word);
                                if mode == MODE_PUSH_CONST_EX {
                                    index |= ext(code, &mut cursor) << 24;
                                }
                                self.ensure_hot(&mut hot, 1, &env);
                                self.stack[hot.sp] = env.load(index as usize);
                                hot.sp -= 1;
                            }
                        }
                        hot.ip = cursor;
                    }
                    Opcode::Pop => {
                        match mode {
                            MODE_POP_N => hot.sp += decode_op6m2_u24(word) as usize,
                            MODE_POP_REG => {
                                hot.sp += 1;
                                let value = std::mem::take(&mut self.stack[hot.sp]);
                                self.set(hot.sb, decode_op6m2_8_i16(word), value);
                            }
                            _ => {
                                let mut index = decode_op6m2_u24(word);
                                if mode == MODE_POP_STATIC_EX {
                                    index |= ext(code, &mut cursor) << 24;
                                }
                                hot.sp += 1;
                                let value = std::mem::take(&mut self.stack[hot.sp]);
                                env.store(index as usize, value);
                            }
                        }
                        hot.ip = cursor;
                    }
                    Opcode::Mov => {
                        let (a, b) = decode_op6m2_i8_i16(word);
                        let (dst, src) = match mode {
                            MODE_MOV_LOAD => (reg(code, a, &mut cursor), b),
                            MODE_MOV_STORE => (b, a as i16),
                            _ => self.fault(&hot, &env, bad_opcode),
                        };
                        let value = self.get(hot.sb, src).clone();
                        self.set(hot.sb, dst, value);
                        hot.ip = cursor;
                    }
                    Opcode::Cast => {
                        let (a, b) = decode_op6m2_i8_i8_8(word);
                        let dst = reg(code, a, &mut cursor);
                        let src = reg(code, b, &mut cursor);
                        let result = ops::cast(CastKind::from_mode(mode), self.get(hot.sb, src));
                        match result {
                            Ok(value) => self.set(hot.sb, dst, value),
                            Err(reason) => self.fault(&hot, &env, reason),
                        }
                        hot.ip = cursor;
                    }
                    Opcode::Jmp => hot.ip = at + decode_op6_u26(word) as usize,
                    Opcode::JmpGc => hot.ip = at - decode_op6_u26(word) as usize,
                    Opcode::JCond | Opcode::JCondGc | Opcode::JCondX | Opcode::JCondGcX => {
                        let cond = CondKind::from_mode(mode);
                        let (taken, fast) = if cond.is_binary() {
                            let (a, b, c) = decode_op6m2_i8_i8_u8(word);
                            let lhs = reg(code, a, &mut cursor);
                            let rhs = reg(code, b, &mut cursor);
                            let equal = self.get(hot.sb, lhs) == self.get(hot.sb, rhs);
                            (equal == (cond == CondKind::Equal), c as usize)
                        } else {
                            let (a, d) = decode_op6m2_i8_u16(word);
                            let lhs = reg(code, a, &mut cursor);
                            let truthy = self.get(hot.sb, lhs).is_truthy();
                            (truthy == (cond == CondKind::NotZero), d as usize)
                        };
                        let distance = if matches!(opcode, Opcode::JCondX | Opcode::JCondGcX) {
                            ext(code, &mut cursor) as usize
                        } else {
                            fast
                        };
                        hot.ip = match (taken, matches!(opcode, Opcode::JCondGc | Opcode::JCondGcX)) {
                            (false, _) => cursor,
                            (true, false) => at + distance,
                            (true, true) => at - distance,
                        };
                    }
                    Opcode::Call => {
                        let target = reg(code, decode_op6m2_i8_16(word), &mut cursor);
                        let callee = self.get(hot.sb, target).clone();
                        match self.dispatch_call(CallMode::from_mode(mode), callee, &mut hot, &env, cursor) {
                            Flow::Next => {}
                            Flow::Reload => continue 'env,
                            Flow::Exit(status) => return status,
                        }
                    }
                    Opcode::Ret => {
                        let (src, captures) = match mode {
                            MODE_RET => (reg(code, decode_op6m2_i8_16(word), &mut cursor), 0usize),
                            MODE_RET_N => {
                                let (a, n) = decode_op6m2_i8_u16(word);
                                (reg(code, a, &mut cursor), n as usize)
                            }
                            _ => self.fault(&hot, &env, bad_opcode),
                        };
                        let sb = hot.sb;
                        let value = self.get(sb, src).clone();
                        let (link, ret) = match self.frame_link(sb) {
                            Ok(frame) => frame,
                            Err(found) => self.fault(
                                &hot,
                                &env,
                                VmPanic::BadCallstack {
                                    addr: base.offset(at as u64),
                                    expected: "frame link",
                                    found,
                                },
                            ),
                        };
                        self.stack[sb + FRAME_SLOTS + captures] = value;
                        hot.sp = sb + captures;
                        hot.sb = self.stack.len() - link.caller_sb_from_end;

                        match (link.kind, ret) {
                            (CallKind::Near, Some(addr)) if env.contains(addr) => {
                                hot.ip = (addr.0 - base.0) as usize;
                            }
                            (CallKind::FromNative, ret) => {
                                self.sp = hot.sp;
                                self.sb = hot.sb;
                                self.ip = ret;
                                return RunExit::Returned;
                            }
                            (CallKind::Far, Some(addr)) => {
                                self.sp = hot.sp;
                                self.sb = hot.sb;
                                self.ip = Some(addr);
                                trace!(target: TRACE_TARGET, ret = %addr, "runtime.far_return");
                                continue 'env;
                            }
                            (_, ret) => self.fault(
                                &hot,
                                &env,
                                VmPanic::BadCallstack {
                                    addr: base.offset(at as u64),
                                    expected: "return address",
                                    found: if ret.is_some() { "foreign address" } else { "nothing" },
                                },
                            ),
                        }
                    }
                    Opcode::Result => {
                        let (a, argc) = decode_op6m2_i8_u16(word);
                        let dst = reg(code, a, &mut cursor);
                        let value = std::mem::take(&mut self.stack[hot.sp + FRAME_SLOTS]);
                        hot.sp += FRAME_SLOTS + argc as usize;
                        self.set(hot.sb, dst, value);
                        hot.ip = cursor;
                    }
                    Opcode::Cons => {
                        let Some(kind) = ConsKind::from_mode(mode) else {
                            self.fault(&hot, &env, bad_opcode);
                        };
                        let (a, count) = decode_op6m2_i8_u16(word);
                        let dst = reg(code, a, &mut cursor);
                        let count = count as usize;
                        let value = match kind {
                            ConsKind::Array | ConsKind::Struct => {
                                let items: Arc<[Value]> = (0..count)
                                    .map(|i| std::mem::take(&mut self.stack[hot.sp + 1 + i]))
                                    .collect();
                                hot.sp += count;
                                if kind == ConsKind::Array {
                                    Value::Array(items)
                                } else {
                                    Value::Struct(items)
                                }
                            }
                            ConsKind::Map => {
                                let pairs: Arc<[(Value, Value)]> = (0..count)
                                    .map(|i| {
                                        let at = hot.sp + 1 + 2 * i;
                                        (
                                            std::mem::take(&mut self.stack[at]),
                                            std::mem::take(&mut self.stack[at + 1]),
                                        )
                                    })
                                    .collect();
                                hot.sp += 2 * count;
                                Value::Map(pairs)
                            }
                        };
                        self.set(hot.sb, dst, value);
                        hot.ip = cursor;
                    }
                    Opcode::MkClos => {
                        let (dst, func, count) = match mode {
                            MODE_MKCLOS => {
                                let (a, b, c) = decode_op6m2_i8_i8_u8(word);
                                let dst = reg(code, a, &mut cursor);
                                let func = reg(code, b, &mut cursor);
                                (dst, func, c as usize)
                            }
                            MODE_MKCLOS_EX => {
                                let (a, b) = decode_op6m2_i8_i8_8(word);
                                let dst = reg(code, a, &mut cursor);
                                let func = reg(code, b, &mut cursor);
                                (dst, func, ext(code, &mut cursor) as usize)
                            }
                            _ => self.fault(&hot, &env, bad_opcode),
                        };
                        let function = match self.get(hot.sb, func) {
                            Value::Function(function) => *function,
                            other => {
                                let found = other.type_name();
                                self.fault(&hot, &env, VmPanic::NotCallable { mode: "mkclos", found })
                            }
                        };
                        let captures: Box<[Value]> = (0..count)
                            .map(|i| std::mem::take(&mut self.stack[hot.sp + 1 + i]))
                            .collect();
                        hot.sp += count;
                        self.set(hot.sb, dst, Value::Closure(Arc::new(Closure { function, captures })));
                        hot.ip = cursor;
                    }
                    Opcode::OpIAsmd
                    | Opcode::OpIOnlg
                    | Opcode::OpISren
                    | Opcode::OpRAsmd
                    | Opcode::OpROnlg
                    | Opcode::OpRSren
                    | Opcode::OpSAlgs
                    | Opcode::OpSRen
                    | Opcode::OpLAon => {
                        let Some(op) = Operator::from_encoding(opcode, mode) else {
                            self.fault(&hot, &env, bad_opcode);
                        };
                        let (a, b, c) = decode_op6m2_i8_i8_i8(word);
                        let dst = reg(code, a, &mut cursor);
                        let lhs = reg(code, b, &mut cursor);
                        let result = if op.is_unary() {
                            ops::unary(op, self.get(hot.sb, lhs))
                        } else {
                            let rhs = reg(code, c, &mut cursor);
                            ops::binary(op, self.get(hot.sb, lhs), self.get(hot.sb, rhs))
                        };
                        match result {
                            Ok(value) => self.set(hot.sb, dst, value),
                            Err(reason) => self.fault(&hot, &env, reason),
                        }
                        hot.ip = cursor;
                    }
                }
            }
        }
    }

    fn dispatch_call(&mut self, mode: CallMode, callee: Value, hot: &mut Hot, env: &CodeEnv, next: usize) -> Flow {
        let mut captures = 0;
        let function = match callee {
            Value::Function(function) => function,
            Value::Closure(closure) if mode == CallMode::Dynamic => {
                captures = closure.captures.len();
                self.ensure_hot(hot, captures, env);
                for value in closure.captures.iter().rev() {
                    self.stack[hot.sp] = value.clone();
                    hot.sp -= 1;
                }
                closure.function
            }
            other => {
                let found = other.type_name();
                self.fault(hot, env, VmPanic::NotCallable { mode: mode.mnemonic(), found })
            }
        };

        match (mode, function) {
            (CallMode::Script | CallMode::Dynamic, FunctionRef::Script(addr)) => {
                self.ensure_hot(hot, FRAME_SLOTS, env);
                let ret = Some(env.base().offset(next as u64));
                if env.contains(addr) {
                    self.write_frame(hot, CallKind::Near, ret);
                    hot.ip = (addr.0 - env.base().0) as usize;
                    Flow::Next
                } else {
                    self.write_frame(hot, CallKind::Far, ret);
                    self.sync(hot, env);
                    self.ip = Some(addr);
                    trace!(target: TRACE_TARGET, target = %addr, "runtime.far_call");
                    Flow::Reload
                }
            }
            (CallMode::Native | CallMode::Dynamic, FunctionRef::Native(native)) => {
                self.call_native(native, CallKind::Near, captures, hot, env, next)
            }
            (CallMode::Jit | CallMode::Dynamic, FunctionRef::Jit(jit)) => {
                self.call_native(jit, CallKind::Far, captures, hot, env, next)
            }
            (mode, function) => {
                let found = match function {
                    FunctionRef::Script(_) => "script function",
                    FunctionRef::Native(_) => "native function",
                    FunctionRef::Jit(_) => "jit function",
                };
                self.fault(hot, env, VmPanic::NotCallable { mode: mode.mnemonic(), found })
            }
        }
    }

    fn call_native(
        &mut self,
        function: NativeFunction,
        kind: CallKind,
        captures: usize,
        hot: &mut Hot,
        env: &CodeEnv,
        next: usize,
    ) -> Flow {
        let argc = captures + result_argc(env.code(), next);
        self.ensure_hot(hot, FRAME_SLOTS, env);
        self.write_frame(hot, kind, Some(env.base().offset(next as u64)));
        hot.ip = next;
        self.sync(hot, env);

        let len = self.stack.len();
        let (sp_from_end, sb_from_end) = (len - hot.sp, len - hot.sb);
        let version = self.stack_realloc_version;
        let args = NativeArgs {
            frame_from_end: sb_from_end,
            argc,
        };
        trace!(target: TRACE_TARGET, ?kind, argc, "runtime.native_call");

        let status = function(self, args);
        if self.stack_realloc_version != version {
            let len = self.stack.len();
            hot.sp = len - sp_from_end;
            hot.sb = len - sb_from_end;
            trace!(target: TRACE_TARGET, version = self.stack_realloc_version, "runtime.native_rebase");
        }
        match status {
            CallStatus::Normal | CallStatus::Yield => {
                self.pop_native_frame(captures, hot, env, next);
                if status == CallStatus::Yield {
                    self.sync(hot, env);
                    return Flow::Exit(RunExit::Yielded);
                }
                Flow::Next
            }
            CallStatus::Aborted => Flow::Exit(RunExit::Aborted),
            CallStatus::Resync => {
                let resume_at = Some(env.base().offset(next as u64));
                match (self.ip == resume_at, self.sb == hot.sb) {
                    // Not redirected: the callee only touched the stack.
                    (true, true) => {
                        self.pop_native_frame(captures, hot, env, next);
                        Flow::Next
                    }
                    (true, false) => self.fault(
                        hot,
                        env,
                        VmPanic::BadCallstack {
                            addr: env.base().offset(next as u64),
                            expected: "native frame base",
                            found: "moved frame base",
                        },
                    ),
                    (false, _) => {
                        trace!(target: TRACE_TARGET, ip = ?self.ip, "runtime.native_takeover");
                        Flow::Reload
                    }
                }
            }
        }
    }

    /// Drops the frame of a finished native call, moving the return value
    /// above its captures, and returns to the caller's frame.
    fn pop_native_frame(&mut self, captures: usize, hot: &mut Hot, env: &CodeEnv, next: usize) {
        let frame_sb = hot.sb;
        let link = match self.frame_link(frame_sb) {
            Ok((link, _)) => link,
            Err(found) => self.fault(
                hot,
                env,
                VmPanic::BadCallstack {
                    addr: env.base().offset(next as u64),
                    expected: "native frame link",
                    found,
                },
            ),
        };
        if captures > 0 {
            let value = std::mem::take(&mut self.stack[frame_sb + FRAME_SLOTS]);
            self.stack[frame_sb + FRAME_SLOTS + captures] = value;
        }
        hot.sp = frame_sb + captures;
        hot.sb = self.stack.len() - link.caller_sb_from_end;
    }
}
