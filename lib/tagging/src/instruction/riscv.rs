use bitvec::{field::BitField, prelude::Lsb0, view::BitView};
use strum::FromRepr;

use super::{DecodedInstruction, InstructionBits, InstructionDecoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
enum Opcode {
    Load = 0b000_0011,
    MiscMem = 0b000_1111,
    OpImm = 0b001_0011,
    Auipc = 0b001_0111,
    Store = 0b010_0011,
    Op = 0b011_0011,
    Lui = 0b011_0111,
    Branch = 0b110_0011,
    Jalr = 0b110_0111,
    Jal = 0b110_1111,
    System = 0b111_0011,
}

/// Decoder for the 32 bit base integer set plus multiply/divide, CSR access and the privileged
/// system instructions
#[derive(Debug, Default, Clone, Copy)]
pub struct Rv32Decoder;

impl InstructionDecoder for Rv32Decoder {
    fn decode(&self, bits: InstructionBits) -> Option<DecodedInstruction> {
        let view = bits.view_bits::<Lsb0>();

        let opcode = Opcode::from_repr(view[0..7].load::<u8>())?;
        let rd = view[7..12].load::<u8>();
        let funct3 = view[12..15].load::<u8>();
        let rs1 = view[15..20].load::<u8>();
        let rs2 = view[20..25].load::<u8>();
        let funct7 = view[25..32].load::<u8>();

        let instruction =
            |mnemonic: &'static str, rd: u8, rs1: u8, rs2: u8, imm: i32| DecodedInstruction {
                mnemonic,
                rd,
                rs1,
                rs2,
                rs3: 0,
                imm,
            };

        Some(match opcode {
            Opcode::Lui => instruction("lui", rd, 0, 0, u_immediate(bits)),
            Opcode::Auipc => instruction("auipc", rd, 0, 0, u_immediate(bits)),
            Opcode::Jal => instruction("jal", rd, 0, 0, j_immediate(bits)),
            Opcode::Jalr if funct3 == 0 => instruction("jalr", rd, rs1, 0, i_immediate(bits)),
            Opcode::Jalr => return None,
            Opcode::Branch => {
                let mnemonic = match funct3 {
                    0b000 => "beq",
                    0b001 => "bne",
                    0b100 => "blt",
                    0b101 => "bge",
                    0b110 => "bltu",
                    0b111 => "bgeu",
                    _ => return None,
                };

                instruction(mnemonic, 0, rs1, rs2, b_immediate(bits))
            }
            Opcode::Load => {
                let mnemonic = match funct3 {
                    0b000 => "lb",
                    0b001 => "lh",
                    0b010 => "lw",
                    0b100 => "lbu",
                    0b101 => "lhu",
                    _ => return None,
                };

                instruction(mnemonic, rd, rs1, 0, i_immediate(bits))
            }
            Opcode::Store => {
                let mnemonic = match funct3 {
                    0b000 => "sb",
                    0b001 => "sh",
                    0b010 => "sw",
                    _ => return None,
                };

                instruction(mnemonic, 0, rs1, rs2, s_immediate(bits))
            }
            Opcode::OpImm => match funct3 {
                0b001 | 0b101 => {
                    let mnemonic = match (funct3, funct7) {
                        (0b001, 0b000_0000) => "slli",
                        (0b101, 0b000_0000) => "srli",
                        (0b101, 0b010_0000) => "srai",
                        _ => return None,
                    };

                    // The shift amount sits where rs2 would be
                    instruction(mnemonic, rd, rs1, 0, i32::from(rs2))
                }
                _ => {
                    let mnemonic = match funct3 {
                        0b000 => "addi",
                        0b010 => "slti",
                        0b011 => "sltiu",
                        0b100 => "xori",
                        0b110 => "ori",
                        0b111 => "andi",
                        _ => return None,
                    };

                    instruction(mnemonic, rd, rs1, 0, i_immediate(bits))
                }
            },
            Opcode::Op => {
                let mnemonic = match (funct7, funct3) {
                    (0b000_0000, 0b000) => "add",
                    (0b010_0000, 0b000) => "sub",
                    (0b000_0000, 0b001) => "sll",
                    (0b000_0000, 0b010) => "slt",
                    (0b000_0000, 0b011) => "sltu",
                    (0b000_0000, 0b100) => "xor",
                    (0b000_0000, 0b101) => "srl",
                    (0b010_0000, 0b101) => "sra",
                    (0b000_0000, 0b110) => "or",
                    (0b000_0000, 0b111) => "and",
                    (0b000_0001, 0b000) => "mul",
                    (0b000_0001, 0b001) => "mulh",
                    (0b000_0001, 0b010) => "mulhsu",
                    (0b000_0001, 0b011) => "mulhu",
                    (0b000_0001, 0b100) => "div",
                    (0b000_0001, 0b101) => "divu",
                    (0b000_0001, 0b110) => "rem",
                    (0b000_0001, 0b111) => "remu",
                    _ => return None,
                };

                instruction(mnemonic, rd, rs1, rs2, 0)
            }
            Opcode::MiscMem => match funct3 {
                0b000 => instruction("fence", rd, rs1, 0, i_immediate(bits)),
                0b001 => instruction("fence_i", rd, rs1, 0, i_immediate(bits)),
                _ => return None,
            },
            Opcode::System => {
                if funct3 == 0 {
                    let mnemonic = match (bits >> 20, rs1, rd) {
                        (0x000, 0, 0) => "ecall",
                        (0x001, 0, 0) => "ebreak",
                        (0x002, 0, 0) => "uret",
                        (0x102, 0, 0) => "sret",
                        (0x302, 0, 0) => "mret",
                        (0x105, 0, 0) => "wfi",
                        // sfence.vma carries two registers
                        _ if funct7 == 0b000_1001 && rd == 0 => {
                            return Some(instruction("sfence_vma", 0, rs1, rs2, 0));
                        }
                        _ => return None,
                    };

                    instruction(mnemonic, 0, 0, 0, 0)
                } else {
                    let mnemonic = match funct3 {
                        0b001 => "csrrw",
                        0b010 => "csrrs",
                        0b011 => "csrrc",
                        0b101 => "csrrwi",
                        0b110 => "csrrsi",
                        0b111 => "csrrci",
                        _ => return None,
                    };

                    // The CSR number is reported as the immediate, unsigned
                    instruction(mnemonic, rd, rs1, 0, (bits >> 20) as i32)
                }
            }
        })
    }
}

fn i_immediate(bits: InstructionBits) -> i32 {
    (bits as i32) >> 20
}

fn s_immediate(bits: InstructionBits) -> i32 {
    (((bits as i32) >> 25) << 5) | ((bits >> 7) & 0x1f) as i32
}

fn b_immediate(bits: InstructionBits) -> i32 {
    (((bits as i32) >> 31) << 12)
        | (((bits >> 7) & 0b1) << 11) as i32
        | (((bits >> 25) & 0x3f) << 5) as i32
        | (((bits >> 8) & 0xf) << 1) as i32
}

fn u_immediate(bits: InstructionBits) -> i32 {
    (bits & 0xffff_f000) as i32
}

fn j_immediate(bits: InstructionBits) -> i32 {
    (((bits as i32) >> 31) << 20)
        | (bits & 0x000f_f000) as i32
        | (((bits >> 20) & 0b1) << 11) as i32
        | (((bits >> 21) & 0x3ff) << 1) as i32
}
