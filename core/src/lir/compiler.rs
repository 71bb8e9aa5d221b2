use std::collections::VecDeque;

use thiserror::Error;
use tracing::{debug, trace, warn};

use super::function::LirFunction;
use super::instr::*;
use super::lower::{self, Jump};
use super::regalloc;
use crate::bytecode::Instruction;
use crate::bytecode::formal::U26_MAX;
use crate::codeenv::{CodeEnv, DataSlot};
use crate::metrics::{self, CommitStats};
use crate::value::Value;

const TRACE_TARGET: &str = "woort::lir::commit";

/// Words of the `RESERVE` prologue in front of every function.
pub const PROLOGUE_WORDS: u32 = 1;

#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Frame slots available to register allocation, at most `i16::MAX`.
    pub frame_slot_limit: u32,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            frame_slot_limit: i16::MAX as u32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    #[error("out of memory while appending bytecode")]
    OutOfMemory,
    #[error("label {label} in `{function}` is not bound to an instruction")]
    UnboundLabel { function: String, label: Label },
    #[error("jump at instruction {at} in `{function}` spans {distance} words")]
    LabelTooFar { function: String, at: usize, distance: u32 },
    #[error("`{function}` needs {live} live registers but only {limit} frame slots exist")]
    RegisterAllocationFailed { function: String, live: usize, limit: u32 },
    #[error("function #{id} is declared but never defined")]
    UndefinedFunction { id: u32 },
}

impl CommitError {
    pub fn reason_key(&self) -> &'static str {
        match self {
            CommitError::OutOfMemory => "out_of_memory",
            CommitError::UnboundLabel { .. } => "unbound_label",
            CommitError::LabelTooFar { .. } => "label_too_far",
            CommitError::RegisterAllocationFailed { .. } => "register_allocation_failed",
            CommitError::UndefinedFunction { .. } => "undefined_function",
        }
    }
}

/// One function's final words, prologue included.
#[derive(Debug, Clone)]
pub(crate) struct Assembled {
    pub(crate) words: Vec<u32>,
    pub(crate) frame_size: u32,
    pub(crate) widened_jumps: u64,
    pub(crate) layout_passes: u64,
}

/// Lays out and encodes one function, filling in each instruction's
/// `fact_bytecode_offset` (relative to the function entry).
pub(crate) fn assemble(func: &mut LirFunction, options: &CompilerOptions) -> Result<Assembled, CommitError> {
    for instr in func.instrs() {
        if let Some(label) = instr.operands.label()
            && func.label_target(label).is_none()
        {
            return Err(CommitError::UnboundLabel {
                function: func.name().to_string(),
                label,
            });
        }
    }

    let alloc = regalloc::allocate(func, options.frame_slot_limit).map_err(|failure| {
        CommitError::RegisterAllocationFailed {
            function: func.name().to_string(),
            live: failure.live,
            limit: failure.limit,
        }
    })?;

    for instr in func.instrs_mut() {
        instr.operands.set_externed(false);
    }
    let conditionals = func
        .instrs()
        .iter()
        .filter(|instr| matches!(instr.opcode, LirOpcode::JCond(_)))
        .count();

    let mut scratch = Vec::new();
    let mut offsets: Vec<u32> = Vec::with_capacity(func.instrs().len() + 1);
    let mut widened_jumps = 0;
    let mut layout_passes = 0;
    // Widening only ever lengthens code, so every conditional is widened at
    // most once and the layout settles within `conditionals + 1` passes.
    for _ in 0..=conditionals {
        layout_passes += 1;
        offsets.clear();
        let mut at = PROLOGUE_WORDS;
        for instr in func.instrs() {
            offsets.push(at);
            at += lower::word_len(instr, &alloc, &mut scratch);
        }
        offsets.push(at);

        let overflow = func.instrs().iter().enumerate().position(|(index, instr)| match instr.opcode {
            LirOpcode::JCond(cond) if !instr.operands.is_externed() => {
                jump_of(func, &offsets, index).distance > cond.compact_limit()
            }
            _ => false,
        });
        let Some(index) = overflow else { break };
        trace!(
            target: TRACE_TARGET,
            function = func.name(),
            at = index,
            distance = jump_of(func, &offsets, index).distance,
            "commit.widen_jump"
        );
        func.instrs_mut()[index].operands.set_externed(true);
        widened_jumps += 1;
    }

    let mut words = Vec::with_capacity(*offsets.last().unwrap_or(&PROLOGUE_WORDS) as usize);
    Instruction::Reserve {
        slots: alloc.frame_size,
    }
    .encode(&mut words);

    for (index, offset) in offsets.iter().take(func.instrs().len()).enumerate() {
        func.instrs_mut()[index].fact_bytecode_offset = *offset;
    }
    for (index, instr) in func.instrs().iter().enumerate() {
        let jump = match instr.operands.label() {
            Some(_) => jump_of(func, &offsets, index),
            None => Jump::default(),
        };
        if jump.distance > U26_MAX {
            return Err(CommitError::LabelTooFar {
                function: func.name().to_string(),
                at: index,
                distance: jump.distance,
            });
        }
        scratch.clear();
        lower::lower(instr, &alloc, jump, &mut scratch);
        for lowered in &scratch {
            lowered.encode(&mut words);
        }
        debug_assert_eq!(words.len() as u32, offsets[index + 1], "layout drift at {index}");
    }

    Ok(Assembled {
        words,
        frame_size: alloc.frame_size,
        widened_jumps,
        layout_passes,
    })
}

/// Distance from instruction `index` to its label target. Forward when the
/// target does not precede the jump.
fn jump_of(func: &LirFunction, offsets: &[u32], index: usize) -> Jump {
    let target = func.instrs()[index]
        .operands
        .label()
        .and_then(|label| func.label_target(label))
        .map_or(offsets[index], |at| offsets[at]);
    let own = offsets[index];
    if target >= own {
        Jump {
            backward: false,
            distance: target - own,
        }
    } else {
        Jump {
            backward: true,
            distance: own - target,
        }
    }
}

/// Translation unit: data segment, queued functions and the shared code
/// buffer they are committed into.
#[derive(Debug, Default)]
pub struct LirCompiler {
    code: Vec<u32>,
    data: Vec<DataSlot>,
    pending: VecDeque<(FunctionId, LirFunction)>,
    entries: Vec<Option<u32>>,
    options: CompilerOptions,
    stats: CommitStats,
}

impl LirCompiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn stats(&self) -> &CommitStats {
        &self.stats
    }

    /// Words committed so far and not yet handed to an environment.
    pub fn code(&self) -> &[u32] {
        &self.code
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn entry_offset(&self, id: FunctionId) -> Option<u32> {
        self.entries.get(id.index()).copied().flatten()
    }

    pub fn constant(&mut self, value: Value) -> DataRef {
        DataRef::Const(self.push_data(DataSlot::Constant(value)))
    }

    /// Constant holding the script function `id`, resolved when the
    /// environment is built.
    pub fn function_constant(&mut self, id: FunctionId) -> DataRef {
        DataRef::Const(self.push_data(DataSlot::FunctionEntry(id.index())))
    }

    pub fn static_slot(&mut self) -> StaticSlot {
        StaticSlot(self.push_data(DataSlot::Static))
    }

    fn push_data(&mut self, slot: DataSlot) -> u32 {
        self.data.push(slot);
        (self.data.len() - 1) as u32
    }

    /// Reserves an id so functions can reference each other before their
    /// bodies exist.
    pub fn declare(&mut self) -> FunctionId {
        self.entries.push(None);
        FunctionId((self.entries.len() - 1) as u32)
    }

    /// Queues the body of a declared function.
    pub fn define(&mut self, id: FunctionId, func: LirFunction) {
        self.pending.push_back((id, func));
    }

    pub fn add_function(&mut self, func: LirFunction) -> FunctionId {
        let id = self.declare();
        self.define(id, func);
        id
    }

    /// Removes the function at the head of the queue, normally the one the
    /// last [`Self::commit`] failed on. Its id stays declared: define it again
    /// before committing, or the commit fails with
    /// [`CommitError::UndefinedFunction`].
    pub fn discard_pending(&mut self) -> Option<(FunctionId, LirFunction)> {
        let (id, func) = self.pending.pop_front()?;
        debug!(target: TRACE_TARGET, function = func.name(), id = id.index(), "commit.discard");
        Some((id, func))
    }

    /// Commits every queued function, in order, then builds the code
    /// environment.
    ///
    /// A failing function stays at the head of the queue and the words of
    /// the functions committed before it are kept; see
    /// [`Self::discard_pending`].
    pub fn commit(&mut self) -> Result<CodeEnv, CommitError> {
        while let Some((id, func)) = self.pending.front_mut() {
            let id = *id;
            let assembled = match assemble(func, &self.options) {
                Ok(assembled) => assembled,
                Err(err) => {
                    warn!(target: TRACE_TARGET, function = func.name(), reason = err.reason_key(), "commit.failed: {err}");
                    metrics::record_failure(err.reason_key());
                    self.stats.failed_functions += 1;
                    return Err(err);
                }
            };
            if self.code.try_reserve(assembled.words.len()).is_err() {
                metrics::record_failure(CommitError::OutOfMemory.reason_key());
                self.stats.failed_functions += 1;
                return Err(CommitError::OutOfMemory);
            }

            let entry = self.code.len() as u32;
            self.code.extend_from_slice(&assembled.words);
            self.entries[id.index()] = Some(entry);

            let lir_instrs = func.instrs().len();
            self.stats.functions += 1;
            self.stats.lir_instrs += lir_instrs as u64;
            self.stats.words += assembled.words.len() as u64;
            self.stats.widened_jumps += assembled.widened_jumps;
            self.stats.layout_passes += assembled.layout_passes;
            self.stats.max_frame_size = self.stats.max_frame_size.max(assembled.frame_size);
            metrics::record_function(lir_instrs, assembled.words.len(), assembled.widened_jumps);
            debug!(
                target: TRACE_TARGET,
                function = func.name(),
                entry,
                words = assembled.words.len(),
                frame_size = assembled.frame_size,
                widened = assembled.widened_jumps,
                "commit.function"
            );
            self.pending.pop_front();
        }

        let mut entries = Vec::with_capacity(self.entries.len());
        for (id, entry) in self.entries.iter().enumerate() {
            match entry {
                Some(offset) => entries.push(*offset),
                None => {
                    let err = CommitError::UndefinedFunction { id: id as u32 };
                    metrics::record_rejection(err.reason_key());
                    return Err(err);
                }
            }
        }

        let code = std::mem::take(&mut self.code);
        let data = std::mem::take(&mut self.data);
        self.entries.clear();
        metrics::record_environment();
        Ok(CodeEnv::create(code, data, entries))
    }
}
