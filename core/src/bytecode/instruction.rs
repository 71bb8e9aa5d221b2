//! Typed view of one bytecode instruction (1 to 4 words).
//!
//! Wide operands are split across trailing extension words: every register
//! field outside `-127..=127` holds [`WIDE_REG`] and gets one extension word,
//! in field order, followed by at most one extension word for an immediate
//! that overflowed its fast field.

use std::fmt;

use thiserror::Error;

use super::formal::*;
use super::opcode::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Load { dst: i16, index: u32 },
    Store { src: i16, index: u32 },
    Reserve { slots: u32 },
    PushData { index: u32 },
    PushReg { src: i16 },
    PopN { count: u32 },
    PopData { index: u32 },
    PopReg { dst: i16 },
    Mov { dst: i16, src: i16 },
    Cast { kind: CastKind, dst: i16, src: i16 },
    Jmp { backward: bool, distance: u32 },
    JumpIf { cond: CondKind, lhs: i16, rhs: i16, backward: bool, distance: u32, extended: bool },
    Call { mode: CallMode, target: i16 },
    Ret { src: i16 },
    RetN { src: i16, captures: u16 },
    Result { dst: i16, argc: u16 },
    Cons { kind: ConsKind, dst: i16, count: u16 },
    MkClosure { dst: i16, func: i16, captures: u32 },
    Binary { op: Operator, dst: i16, lhs: i16, rhs: i16 },
    Unary { op: Operator, dst: i16, src: i16 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode {opcode} at word {offset}")]
    UnknownOpcode { offset: usize, opcode: u8 },
    #[error("opcode `{opcode}` has no submode {mode} (word {offset})")]
    BadSubmode { offset: usize, opcode: &'static str, mode: u8 },
    #[error("instruction at word {offset} is truncated")]
    Truncated { offset: usize },
}

/// Extension words trailing the head word.
#[derive(Default)]
struct Tail {
    words: [u32; 3],
    len: usize,
}

impl Tail {
    fn reg(&mut self, offset: i16) -> i8 {
        if fits_reg8(offset) {
            offset as i8
        } else {
            self.push(encode_ext_i16(offset));
            WIDE_REG
        }
    }

    fn imm(&mut self, payload: u32) {
        self.push(encode_ext(payload));
    }

    fn push(&mut self, word: u32) {
        debug_assert!(self.len < self.words.len(), "instruction exceeds 4 words");
        self.words[self.len] = word;
        self.len += 1;
    }

    fn as_slice(&self) -> &[u32] {
        &self.words[..self.len]
    }
}

struct Reader<'a> {
    words: &'a [u32],
    at: usize,
    cursor: usize,
}

impl Reader<'_> {
    fn reg(&mut self, field: i8) -> Result<i16, DecodeError> {
        if field == WIDE_REG {
            Ok(self.next()? as u16 as i16)
        } else {
            Ok(field as i16)
        }
    }

    fn next(&mut self) -> Result<u32, DecodeError> {
        let word = *self.words.get(self.cursor).ok_or(DecodeError::Truncated { offset: self.at })?;
        self.cursor += 1;
        Ok(decode_ext(word))
    }
}

impl Instruction {
    /// Number of words this instruction occupies once encoded.
    pub fn word_len(&self) -> usize {
        let wide = |offs: &[i16]| offs.iter().filter(|o| !fits_reg8(**o)).count();
        1 + match *self {
            Instruction::Nop
            | Instruction::Reserve { .. }
            | Instruction::PushReg { .. }
            | Instruction::PopN { .. }
            | Instruction::PopReg { .. }
            | Instruction::Jmp { .. } => 0,
            Instruction::Load { dst: reg, index } | Instruction::Store { src: reg, index } => {
                wide(&[reg]) + usize::from(index > U18_MAX)
            }
            Instruction::PushData { index } | Instruction::PopData { index } => usize::from(index > U24_MAX),
            Instruction::Mov { dst, src } => usize::from(!fits_reg8(dst) && !fits_reg8(src)),
            Instruction::Cast { dst, src, .. } | Instruction::Unary { dst, src, .. } => wide(&[dst, src]),
            Instruction::JumpIf { cond, lhs, rhs, extended, .. } => {
                let regs = if cond.is_binary() { wide(&[lhs, rhs]) } else { wide(&[lhs]) };
                regs + usize::from(extended)
            }
            Instruction::Call { target: reg, .. }
            | Instruction::Ret { src: reg }
            | Instruction::RetN { src: reg, .. }
            | Instruction::Result { dst: reg, .. }
            | Instruction::Cons { dst: reg, .. } => wide(&[reg]),
            Instruction::MkClosure { dst, func, captures } => wide(&[dst, func]) + usize::from(captures > u8::MAX as u32),
            Instruction::Binary { dst, lhs, rhs, .. } => wide(&[dst, lhs, rhs]),
        }
    }

    pub fn encode(&self, out: &mut Vec<u32>) {
        let mut tail = Tail::default();
        let head = match *self {
            Instruction::Nop => encode_op6_26(Opcode::Nop),
            Instruction::Load { dst, index } => {
                let r = tail.reg(dst);
                if index > U18_MAX {
                    tail.imm(index >> 18);
                    encode_op6_u18_i8(Opcode::LoadEx, index & U18_MAX, r)
                } else {
                    encode_op6_u18_i8(Opcode::Load, index, r)
                }
            }
            Instruction::Store { src, index } => {
                let r = tail.reg(src);
                if index > U18_MAX {
                    tail.imm(index >> 18);
                    encode_op6_u18_i8(Opcode::StoreEx, index & U18_MAX, r)
                } else {
                    encode_op6_u18_i8(Opcode::Store, index, r)
                }
            }
            Instruction::Reserve { slots } => encode_op6m2_u24(Opcode::Push, MODE_PUSH_RESERVE, slots),
            Instruction::PushData { index } => {
                if index > U24_MAX {
                    tail.imm(index >> 24);
                    encode_op6m2_u24(Opcode::Push, MODE_PUSH_CONST_EX, index & U24_MAX)
                } else {
                    encode_op6m2_u24(Opcode::Push, MODE_PUSH_CONST, index)
                }
            }
            Instruction::PushReg { src } => encode_op6m2_8_i16(Opcode::Push, MODE_PUSH_REG, src),
            Instruction::PopN { count } => encode_op6m2_u24(Opcode::Pop, MODE_POP_N, count),
            Instruction::PopData { index } => {
                if index > U24_MAX {
                    tail.imm(index >> 24);
                    encode_op6m2_u24(Opcode::Pop, MODE_POP_STATIC_EX, index & U24_MAX)
                } else {
                    encode_op6m2_u24(Opcode::Pop, MODE_POP_STATIC, index)
                }
            }
            Instruction::PopReg { dst } => encode_op6m2_8_i16(Opcode::Pop, MODE_POP_REG, dst),
            Instruction::Mov { dst, src } => {
                if fits_reg8(dst) || !fits_reg8(src) {
                    let a = tail.reg(dst);
                    encode_op6m2_i8_i16(Opcode::Mov, MODE_MOV_LOAD, a, src)
                } else {
                    encode_op6m2_i8_i16(Opcode::Mov, MODE_MOV_STORE, src as i8, dst)
                }
            }
            Instruction::Cast { kind, dst, src } => {
                let a = tail.reg(dst);
                let b = tail.reg(src);
                encode_op6m2_i8_i8_8(Opcode::Cast, kind.mode(), a, b)
            }
            Instruction::Jmp { backward, distance } => {
                encode_op6_u26(if backward { Opcode::JmpGc } else { Opcode::Jmp }, distance)
            }
            Instruction::JumpIf { cond, lhs, rhs, backward, distance, extended } => {
                let opcode = match (extended, backward) {
                    (false, false) => Opcode::JCond,
                    (false, true) => Opcode::JCondGc,
                    (true, false) => Opcode::JCondX,
                    (true, true) => Opcode::JCondGcX,
                };
                let a = tail.reg(lhs);
                let fast = if extended { 0 } else { distance };
                let word = if cond.is_binary() {
                    let b = tail.reg(rhs);
                    encode_op6m2_i8_i8_u8(opcode, cond.mode(), a, b, fast as u8)
                } else {
                    encode_op6m2_i8_u16(opcode, cond.mode(), a, fast as u16)
                };
                if extended {
                    tail.imm(distance);
                }
                word
            }
            Instruction::Call { mode, target } => {
                let a = tail.reg(target);
                encode_op6m2_i8_16(Opcode::Call, mode.mode(), a)
            }
            Instruction::Ret { src } => {
                let a = tail.reg(src);
                encode_op6m2_i8_16(Opcode::Ret, MODE_RET, a)
            }
            Instruction::RetN { src, captures } => {
                let a = tail.reg(src);
                encode_op6m2_i8_u16(Opcode::Ret, MODE_RET_N, a, captures)
            }
            Instruction::Result { dst, argc } => {
                let a = tail.reg(dst);
                encode_op6m2_i8_u16(Opcode::Result, 0, a, argc)
            }
            Instruction::Cons { kind, dst, count } => {
                let a = tail.reg(dst);
                encode_op6m2_i8_u16(Opcode::Cons, kind.mode(), a, count)
            }
            Instruction::MkClosure { dst, func, captures } => {
                let a = tail.reg(dst);
                let b = tail.reg(func);
                if captures > u8::MAX as u32 {
                    tail.imm(captures);
                    encode_op6m2_i8_i8_8(Opcode::MkClos, MODE_MKCLOS_EX, a, b)
                } else {
                    encode_op6m2_i8_i8_u8(Opcode::MkClos, MODE_MKCLOS, a, b, captures as u8)
                }
            }
            Instruction::Binary { op, dst, lhs, rhs } => {
                let (opcode, mode) = op.encoding();
                let a = tail.reg(dst);
                let b = tail.reg(lhs);
                let c = tail.reg(rhs);
                encode_op6m2_i8_i8_i8(opcode, mode, a, b, c)
            }
            Instruction::Unary { op, dst, src } => {
                let (opcode, mode) = op.encoding();
                let a = tail.reg(dst);
                let b = tail.reg(src);
                encode_op6m2_i8_i8_i8(opcode, mode, a, b, 0)
            }
        };
        out.push(head);
        out.extend_from_slice(tail.as_slice());
    }

    /// Decodes the instruction starting at `words[at]`, returning it with its
    /// length in words.
    pub fn decode(words: &[u32], at: usize) -> Result<(Instruction, usize), DecodeError> {
        let word = *words.get(at).ok_or(DecodeError::Truncated { offset: at })?;
        let raw = opcode_bits(word);
        let mode = mode_bits(word);
        let opcode = Opcode::from_u6(raw).ok_or(DecodeError::UnknownOpcode { offset: at, opcode: raw })?;
        let bad_mode = || DecodeError::BadSubmode {
            offset: at,
            opcode: opcode.name(),
            mode,
        };
        let mut r = Reader {
            words,
            at,
            cursor: at + 1,
        };

        let instr = match opcode {
            Opcode::Nop => Instruction::Nop,
            Opcode::Load | Opcode::LoadEx | Opcode::Store | Opcode::StoreEx => {
                let (low, field) = decode_op6_u18_i8(word);
                let reg = r.reg(field)?;
                let index = if matches!(opcode, Opcode::LoadEx | Opcode::StoreEx) {
                    low | (r.next()? << 18)
                } else {
                    low
                };
                if matches!(opcode, Opcode::Load | Opcode::LoadEx) {
                    Instruction::Load { dst: reg, index }
                } else {
                    Instruction::Store { src: reg, index }
                }
            }
            Opcode::Push => match mode {
                MODE_PUSH_RESERVE => Instruction::Reserve {
                    slots: decode_op6m2_u24(word),
                },
                MODE_PUSH_CONST => Instruction::PushData {
                    index: decode_op6m2_u24(word),
                },
                MODE_PUSH_REG => Instruction::PushReg {
                    src: decode_op6m2_8_i16(word),
                },
                _ => Instruction::PushData {
                    index: decode_op6m2_u24(word) | (r.next()? << 24),
                },
            },
            Opcode::Pop => match mode {
                MODE_POP_N => Instruction::PopN {
                    count: decode_op6m2_u24(word),
                },
                MODE_POP_STATIC => Instruction::PopData {
                    index: decode_op6m2_u24(word),
                },
                MODE_POP_REG => Instruction::PopReg {
                    dst: decode_op6m2_8_i16(word),
                },
                _ => Instruction::PopData {
                    index: decode_op6m2_u24(word) | (r.next()? << 24),
                },
            },
            Opcode::Mov => {
                let (a, b) = decode_op6m2_i8_i16(word);
                match mode {
                    MODE_MOV_LOAD => Instruction::Mov { dst: r.reg(a)?, src: b },
                    MODE_MOV_STORE => Instruction::Mov { dst: b, src: r.reg(a)? },
                    _ => return Err(bad_mode()),
                }
            }
            Opcode::Cast => {
                let (a, b) = decode_op6m2_i8_i8_8(word);
                Instruction::Cast {
                    kind: CastKind::from_mode(mode),
                    dst: r.reg(a)?,
                    src: r.reg(b)?,
                }
            }
            Opcode::Jmp | Opcode::JmpGc => Instruction::Jmp {
                backward: opcode == Opcode::JmpGc,
                distance: decode_op6_u26(word),
            },
            Opcode::JCond | Opcode::JCondGc | Opcode::JCondX | Opcode::JCondGcX => {
                let cond = CondKind::from_mode(mode);
                let extended = matches!(opcode, Opcode::JCondX | Opcode::JCondGcX);
                let backward = matches!(opcode, Opcode::JCondGc | Opcode::JCondGcX);
                let (lhs, rhs, fast) = if cond.is_binary() {
                    let (a, b, c) = decode_op6m2_i8_i8_u8(word);
                    (r.reg(a)?, r.reg(b)?, c as u32)
                } else {
                    let (a, d) = decode_op6m2_i8_u16(word);
                    (r.reg(a)?, 0, d as u32)
                };
                let distance = if extended { r.next()? } else { fast };
                Instruction::JumpIf {
                    cond,
                    lhs,
                    rhs,
                    backward,
                    distance,
                    extended,
                }
            }
            Opcode::Call => Instruction::Call {
                mode: CallMode::from_mode(mode),
                target: r.reg(decode_op6m2_i8_16(word))?,
            },
            Opcode::Ret => match mode {
                MODE_RET => Instruction::Ret {
                    src: r.reg(decode_op6m2_i8_16(word))?,
                },
                MODE_RET_N => {
                    let (a, captures) = decode_op6m2_i8_u16(word);
                    Instruction::RetN {
                        src: r.reg(a)?,
                        captures,
                    }
                }
                _ => return Err(bad_mode()),
            },
            Opcode::Result => {
                let (a, argc) = decode_op6m2_i8_u16(word);
                Instruction::Result { dst: r.reg(a)?, argc }
            }
            Opcode::Cons => {
                let kind = ConsKind::from_mode(mode).ok_or_else(bad_mode)?;
                let (a, count) = decode_op6m2_i8_u16(word);
                Instruction::Cons {
                    kind,
                    dst: r.reg(a)?,
                    count,
                }
            }
            Opcode::MkClos => match mode {
                MODE_MKCLOS => {
                    let (a, b, c) = decode_op6m2_i8_i8_u8(word);
                    Instruction::MkClosure {
                        dst: r.reg(a)?,
                        func: r.reg(b)?,
                        captures: c as u32,
                    }
                }
                MODE_MKCLOS_EX => {
                    let (a, b) = decode_op6m2_i8_i8_8(word);
                    let dst = r.reg(a)?;
                    let func = r.reg(b)?;
                    Instruction::MkClosure {
                        dst,
                        func,
                        captures: r.next()?,
                    }
                }
                _ => return Err(bad_mode()),
            },
            Opcode::OpIAsmd
            | Opcode::OpIOnlg
            | Opcode::OpISren
            | Opcode::OpRAsmd
            | Opcode::OpROnlg
            | Opcode::OpRSren
            | Opcode::OpSAlgs
            | Opcode::OpSRen
            | Opcode::OpLAon => {
                let op = Operator::from_encoding(opcode, mode).ok_or_else(bad_mode)?;
                let (a, b, c) = decode_op6m2_i8_i8_i8(word);
                if op.is_unary() {
                    Instruction::Unary {
                        op,
                        dst: r.reg(a)?,
                        src: r.reg(b)?,
                    }
                } else {
                    Instruction::Binary {
                        op,
                        dst: r.reg(a)?,
                        lhs: r.reg(b)?,
                        rhs: r.reg(c)?,
                    }
                }
            }
        };
        Ok((instr, r.cursor - at))
    }
}

struct Reg(i16);

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

fn signed_distance(backward: bool, distance: u32) -> i64 {
    if backward { -(distance as i64) } else { distance as i64 }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Instruction::Nop => f.write_str("nop"),
            Instruction::Load { dst, index } => write!(f, "load {}, data[{index}]", Reg(dst)),
            Instruction::Store { src, index } => write!(f, "store data[{index}], {}", Reg(src)),
            Instruction::Reserve { slots } => write!(f, "reserve {slots}"),
            Instruction::PushData { index } => write!(f, "pushc data[{index}]"),
            Instruction::PushReg { src } => write!(f, "push {}", Reg(src)),
            Instruction::PopN { count } => write!(f, "popn {count}"),
            Instruction::PopData { index } => write!(f, "popc data[{index}]"),
            Instruction::PopReg { dst } => write!(f, "pop {}", Reg(dst)),
            Instruction::Mov { dst, src } => write!(f, "mov {}, {}", Reg(dst), Reg(src)),
            Instruction::Cast { kind, dst, src } => write!(f, "{} {}, {}", kind.mnemonic(), Reg(dst), Reg(src)),
            Instruction::Jmp { backward, distance } => {
                write!(f, "jmp {:+}", signed_distance(backward, distance))
            }
            Instruction::JumpIf {
                cond,
                lhs,
                rhs,
                backward,
                distance,
                extended,
            } => {
                let suffix = if extended { ".x" } else { "" };
                if cond.is_binary() {
                    write!(
                        f,
                        "{}{suffix} {}, {}, {:+}",
                        cond.mnemonic(),
                        Reg(lhs),
                        Reg(rhs),
                        signed_distance(backward, distance)
                    )
                } else {
                    write!(
                        f,
                        "{}{suffix} {}, {:+}",
                        cond.mnemonic(),
                        Reg(lhs),
                        signed_distance(backward, distance)
                    )
                }
            }
            Instruction::Call { mode, target } => write!(f, "{} {}", mode.mnemonic(), Reg(target)),
            Instruction::Ret { src } => write!(f, "ret {}", Reg(src)),
            Instruction::RetN { src, captures } => write!(f, "retn {}, {captures}", Reg(src)),
            Instruction::Result { dst, argc } => write!(f, "result {}, {argc}", Reg(dst)),
            Instruction::Cons { kind, dst, count } => write!(f, "{} {}, {count}", kind.mnemonic(), Reg(dst)),
            Instruction::MkClosure { dst, func, captures } => {
                write!(f, "mkclos {}, {}, {captures}", Reg(dst), Reg(func))
            }
            Instruction::Binary { op, dst, lhs, rhs } => {
                write!(f, "{} {}, {}, {}", op.mnemonic(), Reg(dst), Reg(lhs), Reg(rhs))
            }
            Instruction::Unary { op, dst, src } => write!(f, "{} {}, {}", op.mnemonic(), Reg(dst), Reg(src)),
        }
    }
}

/// Decodes a whole buffer into `(word offset, instruction)` pairs.
pub fn disassemble(words: &[u32]) -> Result<Vec<(usize, Instruction)>, DecodeError> {
    let mut out = Vec::new();
    let mut at = 0;
    while at < words.len() {
        let (instr, len) = Instruction::decode(words, at)?;
        out.push((at, instr));
        at += len;
    }
    Ok(out)
}

/// Listing with one instruction per line, prefixed by its word offset.
pub fn disassemble_to_string(words: &[u32]) -> Result<String, DecodeError> {
    use std::fmt::Write;

    let mut text = String::new();
    for (at, instr) in disassemble(words)? {
        let _ = writeln!(text, "{at:>6}  {instr}");
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(instr: Instruction) {
        let mut words = Vec::new();
        instr.encode(&mut words);
        assert_eq!(words.len(), instr.word_len(), "word_len mismatch for {instr:?}");
        let (decoded, len) = Instruction::decode(&words, 0).expect("decodes");
        assert_eq!(len, words.len());
        assert_eq!(decoded, instr);
    }

    #[test]
    fn test_instruction_roundtrip_narrow_operands() {
        roundtrip(Instruction::Nop);
        roundtrip(Instruction::Load { dst: 3, index: 7 });
        roundtrip(Instruction::Store { src: -4, index: U18_MAX });
        roundtrip(Instruction::Reserve { slots: 12 });
        roundtrip(Instruction::PushData { index: U24_MAX });
        roundtrip(Instruction::PushReg { src: i16::MIN });
        roundtrip(Instruction::PopN { count: 3 });
        roundtrip(Instruction::PopData { index: 9 });
        roundtrip(Instruction::PopReg { dst: 300 });
        roundtrip(Instruction::Mov { dst: 1, src: -700 });
        roundtrip(Instruction::Cast {
            kind: CastKind::RealToStr,
            dst: 0,
            src: 127,
        });
        roundtrip(Instruction::Jmp {
            backward: true,
            distance: U26_MAX,
        });
        roundtrip(Instruction::Call {
            mode: CallMode::Jit,
            target: -5,
        });
        roundtrip(Instruction::Ret { src: 2 });
        roundtrip(Instruction::RetN { src: 2, captures: 3 });
        roundtrip(Instruction::Result { dst: 1, argc: 2 });
        roundtrip(Instruction::Cons {
            kind: ConsKind::Map,
            dst: 4,
            count: 2,
        });
        roundtrip(Instruction::MkClosure {
            dst: 0,
            func: 1,
            captures: 255,
        });
        for op in Operator::ALL {
            if op.is_unary() {
                roundtrip(Instruction::Unary { op, dst: 1, src: -127 });
            } else {
                roundtrip(Instruction::Binary {
                    op,
                    dst: 1,
                    lhs: 2,
                    rhs: -127,
                });
            }
        }
    }

    #[test]
    fn test_instruction_roundtrip_wide_operands() {
        roundtrip(Instruction::Load {
            dst: 128,
            index: U18_MAX + 1,
        });
        roundtrip(Instruction::Store {
            src: -128,
            index: u32::MAX >> 6,
        });
        roundtrip(Instruction::PushData { index: U24_MAX + 5 });
        roundtrip(Instruction::PopData { index: 1 << 30 });
        roundtrip(Instruction::Mov { dst: 500, src: 3 });
        roundtrip(Instruction::Mov { dst: 500, src: -600 });
        roundtrip(Instruction::Binary {
            op: Operator::AddI,
            dst: i16::MAX,
            lhs: i16::MIN,
            rhs: 200,
        });
        roundtrip(Instruction::MkClosure {
            dst: 400,
            func: -400,
            captures: 256,
        });
        roundtrip(Instruction::Result { dst: -1000, argc: 9 });
    }

    #[test]
    fn test_instruction_word_len_covers_four_words() {
        let instr = Instruction::Binary {
            op: Operator::MulR,
            dst: 1000,
            lhs: 1001,
            rhs: 1002,
        };
        assert_eq!(instr.word_len(), 4);
        roundtrip(instr);
    }

    #[test]
    fn test_conditional_jumps_roundtrip() {
        for cond in [CondKind::NotZero, CondKind::Zero, CondKind::Equal, CondKind::NotEqual] {
            for backward in [false, true] {
                let limit = cond.compact_limit();
                let rhs = if cond.is_binary() { 6 } else { 0 };
                roundtrip(Instruction::JumpIf {
                    cond,
                    lhs: 5,
                    rhs,
                    backward,
                    distance: limit,
                    extended: false,
                });
                roundtrip(Instruction::JumpIf {
                    cond,
                    lhs: 5,
                    rhs,
                    backward,
                    distance: U26_MAX,
                    extended: true,
                });
            }
        }
    }

    #[test]
    fn test_decode_rejects_unknown_and_truncated() {
        let bogus = 63u32 << 2;
        assert_eq!(
            Instruction::decode(&[bogus], 0),
            Err(DecodeError::UnknownOpcode { offset: 0, opcode: 63 })
        );

        let mut words = Vec::new();
        Instruction::Load {
            dst: 1,
            index: U18_MAX + 1,
        }
        .encode(&mut words);
        words.pop();
        assert_eq!(
            Instruction::decode(&words, 0),
            Err(DecodeError::Truncated { offset: 0 })
        );
    }

    #[test]
    fn test_disassemble_listing() {
        let mut words = Vec::new();
        Instruction::Reserve { slots: 1 }.encode(&mut words);
        Instruction::Load { dst: 0, index: 0 }.encode(&mut words);
        Instruction::Jmp {
            backward: true,
            distance: 1,
        }
        .encode(&mut words);
        let text = disassemble_to_string(&words).expect("valid");
        assert!(text.contains("reserve 1"));
        assert!(text.contains("load %0, data[0]"));
        assert!(text.contains("jmp -1"));
    }
}
