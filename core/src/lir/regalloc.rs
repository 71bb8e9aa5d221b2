//! Linear-scan register allocation onto frame slots.
//!
//! Registers are visited by `(live_start, creation index)` and each takes the
//! lowest frame slot not held by a still-live register. There is no spilling:
//! running out of slots fails the function.

use tracing::{debug, trace};

use super::function::LirFunction;
use super::instr::Reg;
use crate::vm::{MAX_ARGUMENT_INDEX, argument_offset};

const TRACE_TARGET: &str = "woort::lir::regalloc";

/// Inclusive instruction-index interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRange {
    pub start: u32,
    pub end: u32,
}

impl LiveRange {
    pub fn overlaps(&self, other: &LiveRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    fn cover(&mut self, at: u32) {
        self.start = self.start.min(at);
        self.end = self.end.max(at);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Highest claimed slot + 1.
    pub frame_size: u32,
    offsets: Vec<i16>,
}

impl Allocation {
    pub fn offset(&self, reg: Reg) -> i16 {
        self.offsets[reg.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationFailure {
    pub register: Reg,
    /// Registers live at the failing point, the failing one included. For an
    /// argument past the frame's reach, the arguments up to and including it.
    pub live: usize,
    pub limit: u32,
}

/// Live ranges of every register; `None` for argument registers and
/// registers no instruction references.
pub fn live_ranges(func: &LirFunction) -> Vec<Option<LiveRange>> {
    let mut ranges: Vec<Option<LiveRange>> = vec![None; func.register_count()];
    for (at, instr) in func.instrs().iter().enumerate() {
        for reg in instr.operands.registers() {
            if func.register_info(reg).argument.is_some() {
                continue;
            }
            let at = at as u32;
            ranges[reg.index()]
                .get_or_insert(LiveRange { start: at, end: at })
                .cover(at);
        }
    }

    // A value live anywhere inside a loop may be read again on the next
    // iteration, so it keeps its slot for the whole loop.
    let loops: Vec<LiveRange> = func
        .instrs()
        .iter()
        .enumerate()
        .filter_map(|(at, instr)| {
            let target = func.label_target(instr.operands.label()?)?;
            (target <= at).then_some(LiveRange {
                start: target as u32,
                end: at as u32,
            })
        })
        .collect();
    let mut changed = !loops.is_empty();
    while changed {
        changed = false;
        for range in ranges.iter_mut().flatten() {
            for body in &loops {
                if range.overlaps(body) && (range.start > body.start || range.end < body.end) {
                    range.cover(body.start);
                    range.cover(body.end);
                    changed = true;
                }
            }
        }
    }
    ranges
}

struct SlotSet {
    words: Vec<u64>,
    limit: u32,
}

impl SlotSet {
    fn new(limit: u32) -> Self {
        Self {
            words: vec![0; (limit as usize).div_ceil(64)],
            limit,
        }
    }

    fn claim_lowest(&mut self) -> Option<u32> {
        for (i, word) in self.words.iter_mut().enumerate() {
            if *word != u64::MAX {
                let bit = word.trailing_ones();
                let slot = i as u32 * 64 + bit;
                if slot >= self.limit {
                    return None;
                }
                *word |= 1 << bit;
                return Some(slot);
            }
        }
        None
    }

    fn release(&mut self, slot: u32) {
        self.words[slot as usize / 64] &= !(1 << (slot % 64));
    }
}

pub fn allocate(func: &LirFunction, frame_slot_limit: u32) -> Result<Allocation, AllocationFailure> {
    let limit = frame_slot_limit.min(i16::MAX as u32);
    let ranges = live_ranges(func);

    let mut offsets = vec![0i16; func.register_count()];
    for (index, offset) in offsets.iter_mut().enumerate() {
        let reg = Reg(index as u32);
        let Some(arg) = func.argument_index(reg) else {
            continue;
        };
        match argument_offset(arg) {
            Some(at) => *offset = at,
            None => {
                debug!(target: TRACE_TARGET, function = func.name(), register = %reg, arg, "regalloc.argument_out_of_range");
                return Err(AllocationFailure {
                    register: reg,
                    live: arg as usize + 1,
                    limit: MAX_ARGUMENT_INDEX as u32 + 1,
                });
            }
        }
    }

    let mut order: Vec<(LiveRange, Reg)> = ranges
        .iter()
        .enumerate()
        .filter_map(|(index, range)| range.map(|range| (range, Reg(index as u32))))
        .collect();
    order.sort_by_key(|(range, reg)| (range.start, reg.0));

    let mut slots = SlotSet::new(limit);
    let mut active: Vec<(u32, u32)> = Vec::new();
    let mut frame_size = 0;
    for (range, reg) in order {
        active.retain(|&(end, slot)| {
            let live = end >= range.start;
            if !live {
                slots.release(slot);
            }
            live
        });
        let Some(slot) = slots.claim_lowest() else {
            debug!(
                target: TRACE_TARGET,
                function = func.name(),
                register = %reg,
                live = active.len() + 1,
                limit,
                "regalloc.exhausted"
            );
            return Err(AllocationFailure {
                register: reg,
                live: active.len() + 1,
                limit,
            });
        };
        trace!(target: TRACE_TARGET, register = %reg, slot, start = range.start, end = range.end, "regalloc.assign");
        active.push((range.end, slot));
        offsets[reg.index()] = slot as i16;
        frame_size = frame_size.max(slot + 1);
    }

    Ok(Allocation { frame_size, offsets })
}
