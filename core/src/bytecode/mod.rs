//! Packed 32-bit bytecode: opcode palette, word layouts and the typed
//! instruction model used by the compiler and the disassembler.

pub mod formal;
mod instruction;
mod opcode;

pub use instruction::*;
pub use opcode::*;
