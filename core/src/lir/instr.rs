use std::fmt;

use crate::bytecode::{CallMode, CastKind, CondKind, ConsKind, Operator};

/// Virtual register, local to one [`LirFunction`](super::LirFunction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub(crate) u32);

impl Reg {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub(crate) u32);

impl Label {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Function declared in a [`LirCompiler`](super::LirCompiler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub(crate) u32);

impl FunctionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Slot of the data segment. Constants and statics share one index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataRef {
    Const(u32),
    Static(u32),
}

impl DataRef {
    pub fn index(self) -> u32 {
        match self {
            DataRef::Const(index) | DataRef::Static(index) => index,
        }
    }
}

/// Writable data slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticSlot(pub(crate) u32);

impl StaticSlot {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl From<StaticSlot> for DataRef {
    fn from(slot: StaticSlot) -> Self {
        DataRef::Static(slot.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LirOpcode {
    Load,
    Store,
    Push,
    PushCs,
    Pop,
    PopCs,
    Mov,
    Cast(CastKind),
    Jmp,
    JCond(CondKind),
    Call(CallMode),
    Ret,
    Cons(ConsKind),
    MkClosure,
    Op(Operator),
}

/// Operand formal of an LIR opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandShape {
    Cs,
    CsR,
    SR,
    R,
    RR,
    RRR,
    RRCount16,
    RCount16,
    RRLabel,
    RLabel,
    Label,
}

impl LirOpcode {
    pub fn shape(self) -> OperandShape {
        match self {
            LirOpcode::Load => OperandShape::CsR,
            LirOpcode::Store => OperandShape::SR,
            LirOpcode::Push | LirOpcode::Pop => OperandShape::R,
            LirOpcode::PushCs | LirOpcode::PopCs => OperandShape::Cs,
            LirOpcode::Mov | LirOpcode::Cast(_) => OperandShape::RR,
            LirOpcode::Jmp => OperandShape::Label,
            LirOpcode::JCond(cond) if cond.is_binary() => OperandShape::RRLabel,
            LirOpcode::JCond(_) => OperandShape::RLabel,
            LirOpcode::Call(_) | LirOpcode::MkClosure => OperandShape::RRCount16,
            LirOpcode::Ret | LirOpcode::Cons(_) => OperandShape::RCount16,
            LirOpcode::Op(op) if op.is_unary() => OperandShape::RR,
            LirOpcode::Op(_) => OperandShape::RRR,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            LirOpcode::Load => "load",
            LirOpcode::Store => "store",
            LirOpcode::Push => "push",
            LirOpcode::PushCs => "pushcs",
            LirOpcode::Pop => "pop",
            LirOpcode::PopCs => "popcs",
            LirOpcode::Mov => "mov",
            LirOpcode::Cast(kind) => kind.mnemonic(),
            LirOpcode::Jmp => "jmp",
            LirOpcode::JCond(cond) => cond.mnemonic(),
            LirOpcode::Call(mode) => mode.mnemonic(),
            LirOpcode::Ret => "ret",
            LirOpcode::Cons(kind) => kind.mnemonic(),
            LirOpcode::MkClosure => "mkclosure",
            LirOpcode::Op(op) => op.mnemonic(),
        }
    }
}

/// Operand payload. The variant always matches [`LirOpcode::shape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    Cs(DataRef),
    CsR(DataRef, Reg),
    SR(StaticSlot, Reg),
    R(Reg),
    RR(Reg, Reg),
    RRR(Reg, Reg, Reg),
    RRCount16(Reg, Reg, u16),
    RCount16(Reg, u16),
    RRLabel { lhs: Reg, rhs: Reg, label: Label, externed: bool },
    RLabel { reg: Reg, label: Label, externed: bool },
    Label(Label),
}

impl Operands {
    pub fn shape(&self) -> OperandShape {
        match self {
            Operands::Cs(_) => OperandShape::Cs,
            Operands::CsR(..) => OperandShape::CsR,
            Operands::SR(..) => OperandShape::SR,
            Operands::R(_) => OperandShape::R,
            Operands::RR(..) => OperandShape::RR,
            Operands::RRR(..) => OperandShape::RRR,
            Operands::RRCount16(..) => OperandShape::RRCount16,
            Operands::RCount16(..) => OperandShape::RCount16,
            Operands::RRLabel { .. } => OperandShape::RRLabel,
            Operands::RLabel { .. } => OperandShape::RLabel,
            Operands::Label(_) => OperandShape::Label,
        }
    }

    /// Registers referenced by the operands, in field order.
    pub fn registers(&self) -> impl Iterator<Item = Reg> {
        let regs = match *self {
            Operands::Cs(_) | Operands::Label(_) => [None, None, None],
            Operands::CsR(_, r) | Operands::SR(_, r) | Operands::R(r) | Operands::RCount16(r, _) => {
                [Some(r), None, None]
            }
            Operands::RLabel { reg, .. } => [Some(reg), None, None],
            Operands::RR(a, b) | Operands::RRCount16(a, b, _) => [Some(a), Some(b), None],
            Operands::RRLabel { lhs, rhs, .. } => [Some(lhs), Some(rhs), None],
            Operands::RRR(a, b, c) => [Some(a), Some(b), Some(c)],
        };
        regs.into_iter().flatten()
    }

    pub fn label(&self) -> Option<Label> {
        match *self {
            Operands::RRLabel { label, .. } | Operands::RLabel { label, .. } | Operands::Label(label) => Some(label),
            _ => None,
        }
    }

    pub fn is_externed(&self) -> bool {
        matches!(
            self,
            Operands::RRLabel { externed: true, .. } | Operands::RLabel { externed: true, .. }
        )
    }

    pub(crate) fn set_externed(&mut self, value: bool) {
        if let Operands::RRLabel { externed, .. } | Operands::RLabel { externed, .. } = self {
            *externed = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LirInstr {
    pub opcode: LirOpcode,
    pub operands: Operands,
    /// Word offset from the function's entry, filled in during commit.
    pub fact_bytecode_offset: u32,
}

impl fmt::Display for LirInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.mnemonic())?;
        match self.operands {
            Operands::Cs(data) | Operands::CsR(data, _) => write!(f, " data[{}]", data.index())?,
            Operands::SR(slot, _) => write!(f, " data[{}]", slot.index())?,
            _ => {}
        }
        let mut first = !matches!(self.operands, Operands::Cs(_) | Operands::CsR(..) | Operands::SR(..));
        for reg in self.operands.registers() {
            f.write_str(if first { " " } else { ", " })?;
            write!(f, "{reg}")?;
            first = false;
        }
        match self.operands {
            Operands::RRCount16(_, _, n) | Operands::RCount16(_, n) => write!(f, ", {n}"),
            Operands::RRLabel { label, .. } | Operands::RLabel { label, .. } => write!(f, ", {label}"),
            Operands::Label(label) => write!(f, " {label}"),
            _ => Ok(()),
        }
    }
}
