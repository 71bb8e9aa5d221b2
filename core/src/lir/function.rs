use super::instr::*;
use crate::bytecode::{CallMode, CastKind, CondKind, ConsKind, Operator};

#[derive(Debug, Clone)]
pub(crate) struct RegisterInfo {
    /// Fixed argument (or capture) index; such registers are not allocated.
    pub(crate) argument: Option<u16>,
}

/// One function's LIR, built front to back.
///
/// Labels bind to the next instruction emitted after [`LirFunction::bind`];
/// several labels may bind to the same instruction. A label bound after the
/// last instruction stays unbound and fails the commit.
#[derive(Debug, Clone)]
pub struct LirFunction {
    name: String,
    instrs: Vec<LirInstr>,
    registers: Vec<RegisterInfo>,
    labels: Vec<Option<u32>>,
    arguments: Vec<Reg>,
}

impl LirFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instrs: Vec::new(),
            registers: Vec::new(),
            labels: Vec::new(),
            arguments: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instrs(&self) -> &[LirInstr] {
        &self.instrs
    }

    pub(crate) fn instrs_mut(&mut self) -> &mut [LirInstr] {
        &mut self.instrs
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    pub(crate) fn register_info(&self, reg: Reg) -> &RegisterInfo {
        &self.registers[reg.index()]
    }

    /// Fresh allocatable register.
    pub fn register(&mut self) -> Reg {
        let reg = Reg(self.registers.len() as u32);
        self.registers.push(RegisterInfo { argument: None });
        reg
    }

    /// Register bound to argument `index`; the same register is returned for
    /// repeated requests. Closure captures come before the declared arguments.
    pub fn argument(&mut self, index: u16) -> Reg {
        let slot = index as usize;
        if let Some(reg) = self.arguments.get(slot).copied().filter(|reg| reg.0 != u32::MAX) {
            return reg;
        }
        if self.arguments.len() <= slot {
            self.arguments.resize(slot + 1, Reg(u32::MAX));
        }
        let reg = Reg(self.registers.len() as u32);
        self.registers.push(RegisterInfo { argument: Some(index) });
        self.arguments[slot] = reg;
        reg
    }

    /// Argument index of `reg`, `None` for allocatable registers.
    pub fn argument_index(&self, reg: Reg) -> Option<u16> {
        self.register_info(reg).argument
    }

    pub fn label(&mut self) -> Label {
        let label = Label(self.labels.len() as u32);
        self.labels.push(None);
        label
    }

    /// Binds `label` to the next emitted instruction.
    ///
    /// # Panics
    ///
    /// If the label is already bound.
    pub fn bind(&mut self, label: Label) {
        let slot = &mut self.labels[label.index()];
        assert!(slot.is_none(), "label {label} of `{}` bound twice", self.name);
        *slot = Some(self.instrs.len() as u32);
    }

    /// Instruction index a label points at, if it is bound to one.
    pub fn label_target(&self, label: Label) -> Option<usize> {
        self.labels
            .get(label.index())
            .copied()
            .flatten()
            .map(|at| at as usize)
            .filter(|at| *at < self.instrs.len())
    }

    fn emit(&mut self, opcode: LirOpcode, operands: Operands) {
        debug_assert_eq!(opcode.shape(), operands.shape(), "{opcode:?} with {operands:?}");
        self.instrs.push(LirInstr {
            opcode,
            operands,
            fact_bytecode_offset: 0,
        });
    }

    pub fn load(&mut self, dst: Reg, data: DataRef) {
        self.emit(LirOpcode::Load, Operands::CsR(data, dst));
    }

    pub fn store(&mut self, slot: StaticSlot, src: Reg) {
        self.emit(LirOpcode::Store, Operands::SR(slot, src));
    }

    pub fn push(&mut self, src: Reg) {
        self.emit(LirOpcode::Push, Operands::R(src));
    }

    pub fn push_data(&mut self, data: DataRef) {
        self.emit(LirOpcode::PushCs, Operands::Cs(data));
    }

    pub fn pop(&mut self, dst: Reg) {
        self.emit(LirOpcode::Pop, Operands::R(dst));
    }

    pub fn pop_static(&mut self, slot: StaticSlot) {
        self.emit(LirOpcode::PopCs, Operands::Cs(slot.into()));
    }

    pub fn mov(&mut self, dst: Reg, src: Reg) {
        self.emit(LirOpcode::Mov, Operands::RR(dst, src));
    }

    pub fn cast(&mut self, kind: CastKind, dst: Reg, src: Reg) {
        self.emit(LirOpcode::Cast(kind), Operands::RR(dst, src));
    }

    pub fn jmp(&mut self, label: Label) {
        self.emit(LirOpcode::Jmp, Operands::Label(label));
    }

    pub fn jnz(&mut self, reg: Reg, label: Label) {
        self.jump_if(CondKind::NotZero, reg, label);
    }

    pub fn jz(&mut self, reg: Reg, label: Label) {
        self.jump_if(CondKind::Zero, reg, label);
    }

    pub fn jeq(&mut self, lhs: Reg, rhs: Reg, label: Label) {
        self.jump_if_cmp(CondKind::Equal, lhs, rhs, label);
    }

    pub fn jneq(&mut self, lhs: Reg, rhs: Reg, label: Label) {
        self.jump_if_cmp(CondKind::NotEqual, lhs, rhs, label);
    }

    fn jump_if(&mut self, cond: CondKind, reg: Reg, label: Label) {
        self.emit(
            LirOpcode::JCond(cond),
            Operands::RLabel {
                reg,
                label,
                externed: false,
            },
        );
    }

    fn jump_if_cmp(&mut self, cond: CondKind, lhs: Reg, rhs: Reg, label: Label) {
        self.emit(
            LirOpcode::JCond(cond),
            Operands::RRLabel {
                lhs,
                rhs,
                label,
                externed: false,
            },
        );
    }

    /// Calls the callable in `target` with `argc` arguments already pushed
    /// (last argument first) and stores the result in `dst`.
    pub fn call(&mut self, mode: CallMode, target: Reg, dst: Reg, argc: u16) {
        self.emit(LirOpcode::Call(mode), Operands::RRCount16(target, dst, argc));
    }

    pub fn ret(&mut self, src: Reg) {
        self.emit(LirOpcode::Ret, Operands::RCount16(src, 0));
    }

    /// Returns from a closure body, discarding its `captures`.
    pub fn ret_closure(&mut self, src: Reg, captures: u16) {
        self.emit(LirOpcode::Ret, Operands::RCount16(src, captures));
    }

    /// Builds a container from the `count` values on top of the stack (pairs
    /// for maps), the first element pushed last.
    pub fn cons(&mut self, kind: ConsKind, dst: Reg, count: u16) {
        self.emit(LirOpcode::Cons(kind), Operands::RCount16(dst, count));
    }

    pub fn mk_closure(&mut self, dst: Reg, func: Reg, captures: u16) {
        self.emit(LirOpcode::MkClosure, Operands::RRCount16(dst, func, captures));
    }

    pub fn op(&mut self, op: Operator, dst: Reg, lhs: Reg, rhs: Reg) {
        debug_assert!(!op.is_unary(), "{op:?} takes one operand");
        self.emit(LirOpcode::Op(op), Operands::RRR(dst, lhs, rhs));
    }

    pub fn unary(&mut self, op: Operator, dst: Reg, src: Reg) {
        debug_assert!(op.is_unary(), "{op:?} takes two operands");
        self.emit(LirOpcode::Op(op), Operands::RR(dst, src));
    }
}
