//! LIR to typed [`Instruction`]s, once registers have frame offsets.

use super::instr::*;
use super::regalloc::Allocation;
use crate::bytecode::{CondKind, Instruction};

/// Resolved jump operand; zero for instructions that do not jump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Jump {
    pub(crate) backward: bool,
    pub(crate) distance: u32,
}

/// Appends the instructions `instr` lowers to. Calls produce the call word
/// and the `RESULT` that collects the return value.
pub(crate) fn lower(instr: &LirInstr, alloc: &Allocation, jump: Jump, out: &mut Vec<Instruction>) {
    let r = |reg: Reg| alloc.offset(reg);
    let lowered = match (instr.opcode, instr.operands) {
        (LirOpcode::Load, Operands::CsR(data, dst)) => Instruction::Load {
            dst: r(dst),
            index: data.index(),
        },
        (LirOpcode::Store, Operands::SR(slot, src)) => Instruction::Store {
            src: r(src),
            index: slot.index(),
        },
        (LirOpcode::Push, Operands::R(src)) => Instruction::PushReg { src: r(src) },
        (LirOpcode::PushCs, Operands::Cs(data)) => Instruction::PushData { index: data.index() },
        (LirOpcode::Pop, Operands::R(dst)) => Instruction::PopReg { dst: r(dst) },
        (LirOpcode::PopCs, Operands::Cs(data)) => Instruction::PopData { index: data.index() },
        (LirOpcode::Mov, Operands::RR(dst, src)) => Instruction::Mov {
            dst: r(dst),
            src: r(src),
        },
        (LirOpcode::Cast(kind), Operands::RR(dst, src)) => Instruction::Cast {
            kind,
            dst: r(dst),
            src: r(src),
        },
        (LirOpcode::Jmp, Operands::Label(_)) => Instruction::Jmp {
            backward: jump.backward,
            distance: jump.distance,
        },
        (LirOpcode::JCond(cond), Operands::RLabel { reg, externed, .. }) => {
            jump_if(cond, r(reg), 0, jump, externed)
        }
        (LirOpcode::JCond(cond), Operands::RRLabel { lhs, rhs, externed, .. }) => {
            jump_if(cond, r(lhs), r(rhs), jump, externed)
        }
        (LirOpcode::Call(mode), Operands::RRCount16(target, dst, argc)) => {
            out.push(Instruction::Call { mode, target: r(target) });
            Instruction::Result { dst: r(dst), argc }
        }
        (LirOpcode::Ret, Operands::RCount16(src, 0)) => Instruction::Ret { src: r(src) },
        (LirOpcode::Ret, Operands::RCount16(src, captures)) => Instruction::RetN { src: r(src), captures },
        (LirOpcode::Cons(kind), Operands::RCount16(dst, count)) => Instruction::Cons {
            kind,
            dst: r(dst),
            count,
        },
        (LirOpcode::MkClosure, Operands::RRCount16(dst, func, captures)) => Instruction::MkClosure {
            dst: r(dst),
            func: r(func),
            captures: captures as u32,
        },
        (LirOpcode::Op(op), Operands::RRR(dst, lhs, rhs)) => Instruction::Binary {
            op,
            dst: r(dst),
            lhs: r(lhs),
            rhs: r(rhs),
        },
        (LirOpcode::Op(op), Operands::RR(dst, src)) => Instruction::Unary {
            op,
            dst: r(dst),
            src: r(src),
        },
        (opcode, operands) => unreachable!("{opcode:?} cannot take {operands:?}"),
    };
    out.push(lowered);
}

fn jump_if(cond: CondKind, lhs: i16, rhs: i16, jump: Jump, extended: bool) -> Instruction {
    Instruction::JumpIf {
        cond,
        lhs,
        rhs,
        backward: jump.backward,
        distance: jump.distance,
        extended,
    }
}

/// Words `instr` occupies. Jump distances never change the length; only the
/// `externed` flag does.
pub(crate) fn word_len(instr: &LirInstr, alloc: &Allocation, scratch: &mut Vec<Instruction>) -> u32 {
    scratch.clear();
    lower(instr, alloc, Jump::default(), scratch);
    scratch.iter().map(|lowered| lowered.word_len() as u32).sum()
}
