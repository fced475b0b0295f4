//! Instruction decoding
//!
//! This is where a u32 instruction word is converted into the Instr
//! struct that holds the register indices, function codes, format and
//! sign-extended immediate in a form ready for execution. Sign
//! extension happens exactly once, here; the execute stage uses the
//! immediate as-is.

use crate::utils::{extract_field, sign_extend};

use super::opcodes::*;

/// The six RV32I encoding formats, distinguished by how the immediate
/// is packed, plus Unknown for any opcode outside the implemented
/// subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    R,
    I,
    S,
    B,
    U,
    J,
    Unknown,
}

impl Format {
    pub fn from_opcode(opcode: u32) -> Self {
        match opcode {
            OP => Self::R,
            OP_IMM | OP_LOAD | OP_JALR => Self::I,
            OP_STORE => Self::S,
            OP_BRANCH => Self::B,
            OP_LUI | OP_AUIPC => Self::U,
            OP_JAL => Self::J,
            _ => Self::Unknown,
        }
    }
}

/// A decoded instruction
///
/// All fixed-position fields are extracted unconditionally; which of
/// them are meaningful depends on the format. The immediate is the
/// fully sign-extended value prescribed by the format (zero for R and
/// Unknown, which carry none).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    pub word: u32,
    pub opcode: u32,
    pub rd: u8,
    pub funct3: u32,
    pub rs1: u8,
    pub rs2: u8,
    pub funct7: u32,
    pub format: Format,
    pub imm: i32,
}

/// Decode a 32-bit instruction word
pub fn decode(word: u32) -> Instr {
    let opcode = extract_field(word, 6, 0);
    let format = Format::from_opcode(opcode);
    let imm = match format {
        Format::I => i_immediate(word),
        Format::S => s_immediate(word),
        Format::B => b_immediate(word),
        Format::U => u_immediate(word),
        Format::J => j_immediate(word),
        Format::R | Format::Unknown => 0,
    };
    Instr {
        word,
        opcode,
        rd: extract_field(word, 11, 7) as u8,
        funct3: extract_field(word, 14, 12),
        rs1: extract_field(word, 19, 15) as u8,
        rs2: extract_field(word, 24, 20) as u8,
        funct7: extract_field(word, 31, 25),
        format,
        imm,
    }
}

/// I-type: imm[11:0] = word[31:20]
fn i_immediate(word: u32) -> i32 {
    sign_extend(extract_field(word, 31, 20), 11)
}

/// S-type: imm[11:5] = word[31:25], imm[4:0] = word[11:7]
fn s_immediate(word: u32) -> i32 {
    let upper = extract_field(word, 31, 25);
    let lower = extract_field(word, 11, 7);
    sign_extend(upper << 5 | lower, 11)
}

/// B-type: imm[12|11|10:5|4:1] = word[31|7|30:25|11:8], imm[0] = 0
fn b_immediate(word: u32) -> i32 {
    let imm12 = extract_field(word, 31, 31);
    let imm11 = extract_field(word, 7, 7);
    let imm10_5 = extract_field(word, 30, 25);
    let imm4_1 = extract_field(word, 11, 8);
    sign_extend(imm12 << 12 | imm11 << 11 | imm10_5 << 5 | imm4_1 << 1, 12)
}

/// U-type: imm[31:12] = word[31:12], low 12 bits zero
fn u_immediate(word: u32) -> i32 {
    (word & 0xffff_f000) as i32
}

/// J-type: imm[20|19:12|11|10:1] = word[31|19:12|20|30:21], imm[0] = 0
fn j_immediate(word: u32) -> i32 {
    let imm20 = extract_field(word, 31, 31);
    let imm19_12 = extract_field(word, 19, 12);
    let imm11 = extract_field(word, 20, 20);
    let imm10_1 = extract_field(word, 30, 21);
    sign_extend(imm20 << 20 | imm19_12 << 12 | imm11 << 11 | imm10_1 << 1, 20)
}

impl Instr {
    /// Mnemonic for trace output and diagnostics. Purely cosmetic;
    /// execution never consults it.
    pub fn mnemonic(&self) -> &'static str {
        match (self.opcode, self.funct3, self.funct7) {
            (OP, FUNCT3_ADD, FUNCT7_BASE) => "ADD",
            (OP, FUNCT3_SUB, FUNCT7_SUB) => "SUB",
            (OP, FUNCT3_SLL, _) => "SLL",
            (OP, FUNCT3_SLT, _) => "SLT",
            (OP, FUNCT3_SLTU, _) => "SLTU",
            (OP, FUNCT3_XOR, _) => "XOR",
            (OP, FUNCT3_SRL, FUNCT7_BASE) => "SRL",
            (OP, FUNCT3_SRA, FUNCT7_SRA) => "SRA",
            (OP, FUNCT3_OR, _) => "OR",
            (OP, FUNCT3_AND, _) => "AND",
            (OP_IMM, FUNCT3_ADDI, _) => "ADDI",
            (OP_IMM, FUNCT3_SLLI, _) => "SLLI",
            (OP_IMM, FUNCT3_XORI, _) => "XORI",
            (OP_IMM, FUNCT3_SRLI, _) => {
                if self.word >> 30 & 1 == 0 {
                    "SRLI"
                } else {
                    "SRAI"
                }
            }
            (OP_IMM, FUNCT3_ORI, _) => "ORI",
            (OP_IMM, FUNCT3_ANDI, _) => "ANDI",
            (OP_LOAD, FUNCT3_W, _) => "LW",
            (OP_STORE, FUNCT3_W, _) => "SW",
            (OP_BRANCH, FUNCT3_BEQ, _) => "BEQ",
            (OP_BRANCH, FUNCT3_BNE, _) => "BNE",
            (OP_BRANCH, FUNCT3_BLT, _) => "BLT",
            (OP_BRANCH, FUNCT3_BGE, _) => "BGE",
            (OP_JAL, _, _) => "JAL",
            (OP_JALR, _, _) => "JALR",
            (OP_LUI, _, _) => "LUI",
            (OP_AUIPC, _, _) => "AUIPC",
            _ => "UNKNOWN",
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    // Hand encoders for checking that decode inverts each packing
    // exactly. Offsets are passed already masked to field width.

    fn rtype(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        funct7 << 25 | rs2 << 20 | rs1 << 15 | funct3 << 12 | rd << 7 | opcode
    }

    fn itype(imm: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        (imm & 0xfff) << 20 | rs1 << 15 | funct3 << 12 | rd << 7 | opcode
    }

    fn stype(imm: u32, rs2: u32, rs1: u32, funct3: u32, opcode: u32) -> u32 {
        let upper = imm >> 5 & 0x7f;
        let lower = imm & 0x1f;
        upper << 25 | rs2 << 20 | rs1 << 15 | funct3 << 12 | lower << 7 | opcode
    }

    fn btype(imm: u32, rs2: u32, rs1: u32, funct3: u32, opcode: u32) -> u32 {
        let imm12 = imm >> 12 & 1;
        let imm11 = imm >> 11 & 1;
        let imm10_5 = imm >> 5 & 0x3f;
        let imm4_1 = imm >> 1 & 0xf;
        imm12 << 31
            | imm10_5 << 25
            | rs2 << 20
            | rs1 << 15
            | funct3 << 12
            | imm4_1 << 8
            | imm11 << 7
            | opcode
    }

    fn utype(imm: u32, rd: u32, opcode: u32) -> u32 {
        imm & 0xffff_f000 | rd << 7 | opcode
    }

    fn jtype(imm: u32, rd: u32, opcode: u32) -> u32 {
        let imm20 = imm >> 20 & 1;
        let imm19_12 = imm >> 12 & 0xff;
        let imm11 = imm >> 11 & 1;
        let imm10_1 = imm >> 1 & 0x3ff;
        imm20 << 31 | imm10_1 << 21 | imm11 << 20 | imm19_12 << 12 | rd << 7 | opcode
    }

    #[test]
    fn check_fields() {
        // add x3, x1, x2
        let instr = decode(0x0020_81b3);
        assert_eq!(instr.opcode, OP);
        assert_eq!(instr.rd, 3);
        assert_eq!(instr.funct3, 0);
        assert_eq!(instr.rs1, 1);
        assert_eq!(instr.rs2, 2);
        assert_eq!(instr.funct7, 0);
        assert_eq!(instr.format, Format::R);
        assert_eq!(instr.word, 0x0020_81b3);
    }

    #[test]
    fn check_format_assignment() {
        assert_eq!(Format::from_opcode(OP), Format::R);
        assert_eq!(Format::from_opcode(OP_IMM), Format::I);
        assert_eq!(Format::from_opcode(OP_LOAD), Format::I);
        assert_eq!(Format::from_opcode(OP_JALR), Format::I);
        assert_eq!(Format::from_opcode(OP_STORE), Format::S);
        assert_eq!(Format::from_opcode(OP_BRANCH), Format::B);
        assert_eq!(Format::from_opcode(OP_LUI), Format::U);
        assert_eq!(Format::from_opcode(OP_AUIPC), Format::U);
        assert_eq!(Format::from_opcode(OP_JAL), Format::J);
        assert_eq!(Format::from_opcode(0b1110011), Format::Unknown);
    }

    #[test]
    fn check_i_immediate_positive() {
        // addi x1, x0, 5
        let instr = decode(itype(5, 0, FUNCT3_ADDI, 1, OP_IMM));
        assert_eq!(instr.imm, 5);
        assert_eq!(instr.format, Format::I);
    }

    #[test]
    fn check_i_immediate_negative() {
        // All-ones 12-bit field decodes to -1
        let instr = decode(itype(0xfff, 2, FUNCT3_ADDI, 1, OP_IMM));
        assert_eq!(instr.imm, -1);
        // addi x1, x2, -23
        let instr = decode(itype((-23i32) as u32, 2, FUNCT3_ADDI, 1, OP_IMM));
        assert_eq!(instr.imm, -23);
    }

    #[test]
    fn check_s_immediate() {
        let instr = decode(stype(20, 1, 2, FUNCT3_W, OP_STORE));
        assert_eq!(instr.imm, 20);
        assert_eq!(instr.rs1, 2);
        assert_eq!(instr.rs2, 1);

        let instr = decode(stype((-15i32) as u32, 1, 2, FUNCT3_W, OP_STORE));
        assert_eq!(instr.imm, -15);
    }

    #[test]
    fn check_b_immediate() {
        let instr = decode(btype(8, 2, 1, FUNCT3_BEQ, OP_BRANCH));
        assert_eq!(instr.imm, 8);
        assert_eq!(instr.imm & 1, 0);

        let instr = decode(btype((-16i32) as u32, 2, 1, FUNCT3_BNE, OP_BRANCH));
        assert_eq!(instr.imm, -16);
    }

    #[test]
    fn check_u_immediate_low_bits_zero() {
        // lui x2, 0x10
        let instr = decode(utype(0x10 << 12, 2, OP_LUI));
        assert_eq!(instr.imm, 0x0001_0000);
        assert_eq!(instr.imm & 0xfff, 0);

        // Top bit set gives a negative immediate whose bit pattern is
        // the raw upper 20 bits
        let instr = decode(utype(0x8000_0000, 2, OP_LUI));
        assert_eq!(instr.imm as u32, 0x8000_0000);
    }

    #[test]
    fn check_j_immediate() {
        let instr = decode(jtype(2048, 1, OP_JAL));
        assert_eq!(instr.imm, 2048);
        assert_eq!(instr.imm & 1, 0);

        let instr = decode(jtype((-4i32) as u32, 1, OP_JAL));
        assert_eq!(instr.imm, -4);

        // jal x0, 0 (the halt idiom)
        let instr = decode(0x0000_006f);
        assert_eq!(instr.imm, 0);
        assert_eq!(instr.rd, 0);
    }

    #[test]
    fn check_decode_inverts_encoding() {
        let instr = decode(rtype(FUNCT7_SUB, 1, 2, FUNCT3_SUB, 4, OP));
        assert_eq!(instr.word, 0x4011_0233); // sub x4, x2, x1
        assert_eq!((instr.rd, instr.rs1, instr.rs2), (4, 2, 1));
        assert_eq!(instr.funct7, FUNCT7_SUB);

        let instr = decode(itype(0, 2, FUNCT3_W, 4, OP_LOAD));
        assert_eq!(instr.word, 0x0001_2203); // lw x4, 0(x2)
        assert_eq!(instr.format, Format::I);
    }

    #[test]
    fn check_unknown_opcode() {
        let instr = decode(0x0000_0073); // ecall, outside the subset
        assert_eq!(instr.format, Format::Unknown);
        assert_eq!(instr.imm, 0);
        assert_eq!(instr.mnemonic(), "UNKNOWN");
    }

    #[test]
    fn check_mnemonics() {
        let cases = [
            (0x0020_81b3, "ADD"),  // add x3, x1, x2
            (0x4011_0233, "SUB"),  // sub x4, x2, x1
            (0x0050_0093, "ADDI"), // addi x1, x0, 5
            (0x0001_2183, "LW"),   // lw x3, 0(x2)
            (0x0011_2023, "SW"),   // sw x1, 0(x2)
            (0x0020_8463, "BEQ"),  // beq x1, x2, 8
            (0x0001_0137, "LUI"),  // lui x2, 0x10
            (0x0000_006f, "JAL"),  // jal x0, 0
        ];
        for (word, name) in cases {
            assert_eq!(decode(word).mnemonic(), name);
        }
    }

    #[test]
    fn check_shift_immediate_mnemonics() {
        let srli = itype(4, 2, FUNCT3_SRLI, 1, OP_IMM);
        let srai = itype(0x400 | 4, 2, FUNCT3_SRLI, 1, OP_IMM);
        assert_eq!(decode(srli).mnemonic(), "SRLI");
        assert_eq!(decode(srai).mnemonic(), "SRAI");
        assert_eq!(decode(itype(2, 2, FUNCT3_SLLI, 1, OP_IMM)).mnemonic(), "SLLI");
    }
}
