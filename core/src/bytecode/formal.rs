//! Bit layouts ("formals") of a single 32-bit bytecode word.
//!
//! Field placement, low bit first:
//!
//! ```text
//!  bits 0..2   submode (or low bits of a wide unsigned field)
//!  bits 2..8   opcode
//!  bits 8..16  a8
//!  bits 16..32 b16 (or b8 = bits 16..24, c8 = bits 24..32)
//! ```
//!
//! Nothing here validates field ranges: callers are expected to pass values
//! that fit, anything wider is truncated.

use super::opcode::Opcode;

pub const U18_MAX: u32 = (1 << 18) - 1;
pub const U24_MAX: u32 = (1 << 24) - 1;
pub const U26_MAX: u32 = (1 << 26) - 1;

/// Sentinel placed in a signed 8-bit register field whose real offset lives in
/// an extension word.
pub const WIDE_REG: i8 = i8::MIN;

#[inline]
const fn head(op: Opcode, mode: u8) -> u32 {
    ((op.as_u6() as u32) << 2) | (mode as u32 & 0b11)
}

#[inline]
pub const fn opcode_bits(word: u32) -> u8 {
    ((word & 0xFF) as u8) >> 2
}

#[inline]
pub const fn mode_bits(word: u32) -> u8 {
    (word & 0b11) as u8
}

#[inline]
const fn a8(word: u32) -> u8 {
    ((word >> 8) & 0xFF) as u8
}

#[inline]
const fn b8(word: u32) -> u8 {
    ((word >> 16) & 0xFF) as u8
}

#[inline]
const fn c8(word: u32) -> u8 {
    ((word >> 24) & 0xFF) as u8
}

#[inline]
const fn b16(word: u32) -> u16 {
    ((word >> 16) & 0xFFFF) as u16
}

// OP6_26

pub const fn encode_op6_26(op: Opcode) -> u32 {
    head(op, 0)
}

// OP6_U26

pub const fn encode_op6_u26(op: Opcode, value: u32) -> u32 {
    ((op.as_u6() as u32) << 2)
        | (value & 0b11)
        | (((value >> 18) & 0xFF) << 8)
        | (((value >> 2) & 0xFFFF) << 16)
}

pub const fn decode_op6_u26(word: u32) -> u32 {
    (word & 0b11) | ((b16(word) as u32) << 2) | ((a8(word) as u32) << 18)
}

/// Extension words are `NOP`s carrying a 26-bit payload.
pub const fn encode_ext(payload: u32) -> u32 {
    encode_op6_u26(Opcode::Nop, payload)
}

pub const fn decode_ext(word: u32) -> u32 {
    decode_op6_u26(word)
}

pub const fn encode_ext_i16(value: i16) -> u32 {
    encode_ext(value as u16 as u32)
}

pub const fn decode_ext_i16(word: u32) -> i16 {
    decode_ext(word) as u16 as i16
}

// OP6_U18_I8

pub const fn encode_op6_u18_i8(op: Opcode, index: u32, reg: i8) -> u32 {
    ((op.as_u6() as u32) << 2) | ((index >> 16) & 0b11) | ((reg as u8 as u32) << 8) | ((index & 0xFFFF) << 16)
}

pub const fn decode_op6_u18_i8(word: u32) -> (u32, i8) {
    let index = (((word & 0b11) as u32) << 16) | b16(word) as u32;
    (index, a8(word) as i8)
}

// OP6M2_U24

pub const fn encode_op6m2_u24(op: Opcode, mode: u8, value: u32) -> u32 {
    head(op, mode) | (((value >> 16) & 0xFF) << 8) | ((value & 0xFFFF) << 16)
}

pub const fn decode_op6m2_u24(word: u32) -> u32 {
    ((a8(word) as u32) << 16) | b16(word) as u32
}

// OP6M2_I8_16

pub const fn encode_op6m2_i8_16(op: Opcode, mode: u8, a: i8) -> u32 {
    head(op, mode) | ((a as u8 as u32) << 8)
}

pub const fn decode_op6m2_i8_16(word: u32) -> i8 {
    a8(word) as i8
}

// OP6M2_8_I16

pub const fn encode_op6m2_8_i16(op: Opcode, mode: u8, b: i16) -> u32 {
    head(op, mode) | ((b as u16 as u32) << 16)
}

pub const fn decode_op6m2_8_i16(word: u32) -> i16 {
    b16(word) as i16
}

// OP6M2_I8_I16

pub const fn encode_op6m2_i8_i16(op: Opcode, mode: u8, a: i8, b: i16) -> u32 {
    head(op, mode) | ((a as u8 as u32) << 8) | ((b as u16 as u32) << 16)
}

pub const fn decode_op6m2_i8_i16(word: u32) -> (i8, i16) {
    (a8(word) as i8, b16(word) as i16)
}

// OP6M2_I8_U16

pub const fn encode_op6m2_i8_u16(op: Opcode, mode: u8, a: i8, b: u16) -> u32 {
    head(op, mode) | ((a as u8 as u32) << 8) | ((b as u32) << 16)
}

pub const fn decode_op6m2_i8_u16(word: u32) -> (i8, u16) {
    (a8(word) as i8, b16(word))
}

// OP6M2_I8_I8_8

pub const fn encode_op6m2_i8_i8_8(op: Opcode, mode: u8, a: i8, b: i8) -> u32 {
    head(op, mode) | ((a as u8 as u32) << 8) | ((b as u8 as u32) << 16)
}

pub const fn decode_op6m2_i8_i8_8(word: u32) -> (i8, i8) {
    (a8(word) as i8, b8(word) as i8)
}

// OP6M2_I8_I8_U8

pub const fn encode_op6m2_i8_i8_u8(op: Opcode, mode: u8, a: i8, b: i8, c: u8) -> u32 {
    head(op, mode) | ((a as u8 as u32) << 8) | ((b as u8 as u32) << 16) | ((c as u32) << 24)
}

pub const fn decode_op6m2_i8_i8_u8(word: u32) -> (i8, i8, u8) {
    (a8(word) as i8, b8(word) as i8, c8(word))
}

// OP6M2_I8_I8_I8

pub const fn encode_op6m2_i8_i8_i8(op: Opcode, mode: u8, a: i8, b: i8, c: i8) -> u32 {
    head(op, mode) | ((a as u8 as u32) << 8) | ((b as u8 as u32) << 16) | ((c as u8 as u32) << 24)
}

pub const fn decode_op6m2_i8_i8_i8(word: u32) -> (i8, i8, i8) {
    (a8(word) as i8, b8(word) as i8, c8(word) as i8)
}

/// Whether a register offset fits a signed 8-bit field without colliding with
/// [`WIDE_REG`].
#[inline]
pub const fn fits_reg8(offset: i16) -> bool {
    offset > WIDE_REG as i16 && offset <= i8::MAX as i16
}
