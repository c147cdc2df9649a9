use std::fmt::Debug;

mod riscv;
mod stream;

pub use riscv::Rv32Decoder;
pub use stream::{InstructionStream, InstructionStreamError, ReaderInstructionStream};

/// Raw bits of one instruction word
pub type InstructionBits = u32;

/// Width of an instruction word in bytes
pub const INSTRUCTION_SIZE: u32 = size_of::<InstructionBits>() as u32;

/// Fields pulled out of an instruction word
///
/// Register fields an encoding does not use are zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub mnemonic: &'static str,
    pub rd: u8,
    pub rs1: u8,
    pub rs2: u8,
    pub rs3: u8,
    pub imm: i32,
}

/// Represents a decoder for instruction words
pub trait InstructionDecoder: Debug {
    /// [None] for encodings this decoder does not know
    fn decode(&self, bits: InstructionBits) -> Option<DecodedInstruction>;
}
