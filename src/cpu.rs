//! CPU core
//!
//! Owns one register file, one memory, the program counter, a cycle
//! counter and the halted flag, and drives the fetch/decode/execute
//! loop. The ALU lives inside the core as its evaluator for
//! primitive operations.
//!
//! No instruction-level anomaly is fatal: unknown opcodes and unknown
//! sub-function codes are reported and skipped with the PC advanced
//! by 4. Execution ends only on one of the two halt words or when
//! the cycle budget runs out.

use std::fmt::Write;

use log::warn;

use crate::instr::decode::{decode, Instr};
use crate::instr::opcodes::*;
use crate::loader::{load_hex_file, LoadError};

use self::alu::{Alu, AluOp};
use self::memory::Memory;
use self::registers::Registers;

pub mod alu;
pub mod memory;
pub mod registers;

/// Encoding of `jal x0, 0`, an infinite self-loop. Programs use it
/// as their termination sentinel.
pub const HALT_WORD: u32 = 0x0000_006f;

/// RV32I interpreter core
///
/// The default core sits at pc = 0 with zeroed registers and empty
/// memory, fetching whatever the loader (or a test) has placed there.
/// Each step() retires one instruction atomically: operand reads,
/// then the register and/or memory write, then the PC update, before
/// the next fetch.
#[derive(Debug)]
pub struct Cpu {
    pub pc: u32,
    pub registers: Registers,
    pub memory: Memory,
    alu: Alu,
    cycles: u64,
    halted: bool,
    halt_on_zero_word: bool,
    trace: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute a register-register operation
///
/// The ALU operation is selected by funct3 together with funct7 where
/// the encoding reuses a funct3 slot (add/sub and the right shifts).
fn execute_reg_reg(cpu: &mut Cpu, instr: &Instr) {
    let a = cpu.registers.read(instr.rs1);
    let b = cpu.registers.read(instr.rs2);
    let op = match (instr.funct3, instr.funct7) {
        (FUNCT3_ADD, FUNCT7_BASE) => AluOp::Add,
        (FUNCT3_SUB, FUNCT7_SUB) => AluOp::Sub,
        (FUNCT3_SLL, _) => AluOp::Sll,
        (FUNCT3_SLT, _) => AluOp::Slt,
        (FUNCT3_SLTU, _) => AluOp::Sltu,
        (FUNCT3_XOR, _) => AluOp::Xor,
        (FUNCT3_SRL, FUNCT7_BASE) => AluOp::Srl,
        (FUNCT3_SRA, FUNCT7_SRA) => AluOp::Sra,
        (FUNCT3_OR, _) => AluOp::Or,
        (FUNCT3_AND, _) => AluOp::And,
        _ => {
            warn!(
                "unknown register-register instruction 0x{:08X} (funct3={}, funct7=0x{:02X}) at PC=0x{:08X}",
                instr.word, instr.funct3, instr.funct7, cpu.pc
            );
            cpu.advance_pc();
            return;
        }
    };
    let value = cpu.alu.execute(op, a, b);
    cpu.registers.write(instr.rd, value);
    cpu.advance_pc();
}

/// Execute a register-immediate operation
///
/// The immediate is used as an unsigned bit pattern; for the shifts
/// only its low five bits are the shift amount, and bit 10 of the
/// 12-bit field distinguishes the logical from the arithmetic right
/// shift.
fn execute_reg_imm(cpu: &mut Cpu, instr: &Instr) {
    let a = cpu.registers.read(instr.rs1);
    let b = instr.imm as u32;
    let value = match instr.funct3 {
        FUNCT3_ADDI => cpu.alu.execute(AluOp::Add, a, b),
        FUNCT3_ANDI => cpu.alu.execute(AluOp::And, a, b),
        FUNCT3_ORI => cpu.alu.execute(AluOp::Or, a, b),
        FUNCT3_XORI => cpu.alu.execute(AluOp::Xor, a, b),
        FUNCT3_SLLI => cpu.alu.execute(AluOp::Sll, a, b & 0x1f),
        FUNCT3_SRLI => {
            if instr.imm >> 10 & 1 == 0 {
                cpu.alu.execute(AluOp::Srl, a, b & 0x1f)
            } else {
                cpu.alu.execute(AluOp::Sra, a, b & 0x1f)
            }
        }
        _ => {
            warn!(
                "unknown register-immediate instruction 0x{:08X} (funct3={}) at PC=0x{:08X}",
                instr.word, instr.funct3, cpu.pc
            );
            cpu.advance_pc();
            return;
        }
    };
    cpu.registers.write(instr.rd, value);
    cpu.advance_pc();
}

/// Execute a load
///
/// Only the word width is implemented; the narrower widths are
/// decoded, reported and skipped without touching rd.
fn execute_load(cpu: &mut Cpu, instr: &Instr) {
    let base = cpu.registers.read(instr.rs1);
    let address = base.wrapping_add(instr.imm as u32);
    if instr.funct3 == FUNCT3_W {
        let value = cpu.memory.read_word(address);
        cpu.registers.write(instr.rd, value);
    } else {
        warn!(
            "unimplemented load width (funct3={}) at PC=0x{:08X}",
            instr.funct3, cpu.pc
        );
    }
    cpu.advance_pc();
}

/// Execute a store
///
/// Only the word width is implemented; the narrower widths are
/// decoded, reported and skipped without touching memory.
fn execute_store(cpu: &mut Cpu, instr: &Instr) {
    let base = cpu.registers.read(instr.rs1);
    let address = base.wrapping_add(instr.imm as u32);
    if instr.funct3 == FUNCT3_W {
        cpu.memory.write_word(address, cpu.registers.read(instr.rs2));
    } else {
        warn!(
            "unimplemented store width (funct3={}) at PC=0x{:08X}",
            instr.funct3, cpu.pc
        );
    }
    cpu.advance_pc();
}

/// Execute a conditional branch
///
/// blt/bge compare as two's complement; beq/bne compare the raw bit
/// patterns. A taken branch adds the immediate to the PC of the
/// branch itself.
fn execute_branch(cpu: &mut Cpu, instr: &Instr) {
    let a = cpu.registers.read(instr.rs1);
    let b = cpu.registers.read(instr.rs2);
    let taken = match instr.funct3 {
        FUNCT3_BEQ => a == b,
        FUNCT3_BNE => a != b,
        FUNCT3_BLT => (a as i32) < (b as i32),
        FUNCT3_BGE => (a as i32) >= (b as i32),
        _ => {
            warn!(
                "unknown branch condition (funct3={}) at PC=0x{:08X}",
                instr.funct3, cpu.pc
            );
            false
        }
    };
    if taken {
        cpu.pc = cpu.pc.wrapping_add(instr.imm as u32);
    } else {
        cpu.advance_pc();
    }
}

/// Jump and link: store pc + 4 in rd, then jump relative to the PC
fn execute_jal(cpu: &mut Cpu, instr: &Instr) {
    cpu.registers.write(instr.rd, cpu.pc.wrapping_add(4));
    cpu.pc = cpu.pc.wrapping_add(instr.imm as u32);
}

/// Jump and link register
///
/// The target comes from rs1 before rd is written, so
/// `jalr x1, x1, imm` is well defined. Only bit 0 of the target is
/// cleared (2-byte alignment), not bit 1.
fn execute_jalr(cpu: &mut Cpu, instr: &Instr) {
    let base = cpu.registers.read(instr.rs1);
    let target = base.wrapping_add(instr.imm as u32) & 0xffff_fffe;
    cpu.registers.write(instr.rd, cpu.pc.wrapping_add(4));
    cpu.pc = target;
}

/// Load upper immediate: the U immediate already has its low 12 bits
/// zero, so it is stored as-is
fn execute_lui(cpu: &mut Cpu, instr: &Instr) {
    cpu.registers.write(instr.rd, instr.imm as u32);
    cpu.advance_pc();
}

/// Add upper immediate to PC
fn execute_auipc(cpu: &mut Cpu, instr: &Instr) {
    let value = cpu.pc.wrapping_add(instr.imm as u32);
    cpu.registers.write(instr.rd, value);
    cpu.advance_pc();
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            pc: 0,
            registers: Registers::default(),
            memory: Memory::default(),
            alu: Alu::default(),
            cycles: 0,
            halted: false,
            halt_on_zero_word: true,
            trace: false,
        }
    }

    /// Number of instructions retired since the last reset
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Whether an all-zero fetch halts the core (default) or is
    /// executed as an ordinary unknown instruction
    pub fn set_halt_on_zero_word(&mut self, enabled: bool) {
        self.halt_on_zero_word = enabled;
    }

    /// Print a trace line for every retired instruction
    pub fn set_trace(&mut self, enabled: bool) {
        self.trace = enabled;
    }

    /// Return to the initial state: pc = 0, no cycles retired,
    /// registers zeroed, memory empty
    pub fn reset(&mut self) {
        self.pc = 0;
        self.cycles = 0;
        self.halted = false;
        self.registers.reset();
        self.memory.clear();
    }

    /// Load a hex program image into memory at address 0, returning
    /// the number of instructions loaded
    pub fn load_program(&mut self, path: &str) -> Result<u32, LoadError> {
        load_hex_file(path, &mut self.memory, 0)
    }

    /// The instruction word at the current PC
    pub fn fetch(&self) -> u32 {
        self.memory.read_word(self.pc)
    }

    fn advance_pc(&mut self) {
        self.pc = self.pc.wrapping_add(4);
    }

    /// Execute one decoded instruction, including its PC update
    pub fn execute(&mut self, instr: &Instr) {
        match instr.opcode {
            OP => execute_reg_reg(self, instr),
            OP_IMM => execute_reg_imm(self, instr),
            OP_LOAD => execute_load(self, instr),
            OP_STORE => execute_store(self, instr),
            OP_BRANCH => execute_branch(self, instr),
            OP_JAL => execute_jal(self, instr),
            OP_JALR => execute_jalr(self, instr),
            OP_LUI => execute_lui(self, instr),
            OP_AUIPC => execute_auipc(self, instr),
            _ => {
                warn!(
                    "unknown opcode 0x{:02X} at PC=0x{:08X}",
                    instr.opcode, self.pc
                );
                self.advance_pc();
            }
        }
    }

    /// Fetch, halt-check, decode and execute a single instruction
    ///
    /// Returns false once a halt condition has been met (the halt
    /// word, a zero word when that check is enabled, or an earlier
    /// halt); the halting fetch itself does not count as a cycle.
    pub fn step(&mut self) -> bool {
        if self.halted {
            return false;
        }
        let word = self.fetch();
        if word == HALT_WORD {
            println!("Halt detected at cycle {}", self.cycles);
            self.halted = true;
            return false;
        }
        if word == 0 && self.halt_on_zero_word {
            println!("Reached uninitialized memory at PC=0x{:08X}", self.pc);
            self.halted = true;
            return false;
        }
        let instr = decode(word);
        if self.trace {
            println!(
                "[{}] PC=0x{:08X} | {:08X} | {}",
                self.cycles,
                self.pc,
                word,
                instr.mnemonic()
            );
        }
        self.execute(&instr);
        self.cycles += 1;
        true
    }

    /// Run until halt or until max_cycles instructions have retired
    pub fn run(&mut self, max_cycles: u64, verbose: bool) {
        self.trace = verbose;
        while !self.halted && self.cycles < max_cycles {
            if !self.step() {
                break;
            }
        }
    }

    /// Render the architectural state after a run: cycle count, final
    /// PC, all registers, and every non-zero memory word in ascending
    /// address order
    pub fn final_state_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Cycles: {}", self.cycles);
        let _ = writeln!(out, "Final PC: 0x{:08X}", self.pc);
        out.push_str(&self.registers.dump());
        let _ = writeln!(out, "\nMemory (non-zero):");
        let mut empty = true;
        for (address, word) in self.memory.nonzero_words() {
            let _ = writeln!(out, "  [0x{address:08X}] = 0x{word:08X} ({word})");
            empty = false;
        }
        if empty {
            let _ = writeln!(out, "  (nothing written)");
        }
        out
    }
}
