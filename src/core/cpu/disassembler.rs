// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! MIPS instruction disassembler for debugging
//!
//! Branch and jump targets are printed as absolute addresses computed from
//! the instruction's own address.

use super::decode::Instruction;

/// Instruction disassembler
///
/// # Example
/// ```
/// use psrx_core::core::cpu::Disassembler;
///
/// let disasm = Disassembler::disassemble(0x00000000, 0xBFC00000);
/// assert_eq!(disasm, "nop");
/// ```
pub struct Disassembler;

impl Disassembler {
    /// Disassemble a single instruction to human-readable format
    ///
    /// # Arguments
    ///
    /// * `instruction` - The 32-bit instruction to disassemble
    /// * `pc` - Address of the instruction (used for branch/jump targets)
    ///
    /// # Example
    /// ```
    /// use psrx_core::core::cpu::Disassembler;
    ///
    /// assert_eq!(Disassembler::disassemble(0x3C011234, 0xBFC00000), "lui r1, 0x1234");
    /// assert_eq!(Disassembler::disassemble(0x1000FFFF, 0x80001000), "beq r0, r0, 0x80001000");
    /// ```
    pub fn disassemble(instruction: u32, pc: u32) -> String {
        let i = Instruction(instruction);
        let branch_target = pc.wrapping_add(4).wrapping_add(i.branch_offset());
        let jump_target = (pc.wrapping_add(4) & 0xF000_0000) | (i.target() << 2);

        let imm_signed = i.imm_se() as i32;
        let arith_imm = |name: &str| format!("{} r{}, r{}, {}", name, i.rt(), i.rs(), imm_signed);
        let logic_imm =
            |name: &str| format!("{} r{}, r{}, 0x{:04X}", name, i.rt(), i.rs(), i.imm());
        let memory = |name: &str| format!("{} r{}, {}(r{})", name, i.rt(), imm_signed, i.rs());
        let cop_memory = |name: &str| {
            format!(
                "{}{} cop{}r{}, {}(r{})",
                name,
                i.coprocessor(),
                i.coprocessor(),
                i.rt(),
                imm_signed,
                i.rs()
            )
        };

        match i.opcode() {
            0x00 => Self::disasm_special(i),
            0x01 => Self::disasm_regimm(i, branch_target),
            0x02 => format!("j 0x{:08X}", jump_target),
            0x03 => format!("jal 0x{:08X}", jump_target),
            0x04 => format!("beq r{}, r{}, 0x{:08X}", i.rs(), i.rt(), branch_target),
            0x05 => format!("bne r{}, r{}, 0x{:08X}", i.rs(), i.rt(), branch_target),
            0x06 => format!("blez r{}, 0x{:08X}", i.rs(), branch_target),
            0x07 => format!("bgtz r{}, 0x{:08X}", i.rs(), branch_target),
            0x08 => arith_imm("addi"),
            0x09 => arith_imm("addiu"),
            0x0A => arith_imm("slti"),
            0x0B => arith_imm("sltiu"),
            0x0C => logic_imm("andi"),
            0x0D => logic_imm("ori"),
            0x0E => logic_imm("xori"),
            0x0F => format!("lui r{}, 0x{:04X}", i.rt(), i.imm()),
            0x10..=0x13 => Self::disasm_cop(i),
            0x20 => memory("lb"),
            0x21 => memory("lh"),
            0x22 => memory("lwl"),
            0x23 => memory("lw"),
            0x24 => memory("lbu"),
            0x25 => memory("lhu"),
            0x26 => memory("lwr"),
            0x28 => memory("sb"),
            0x29 => memory("sh"),
            0x2A => memory("swl"),
            0x2B => memory("sw"),
            0x2E => memory("swr"),
            0x30..=0x33 => cop_memory("lwc"),
            0x38..=0x3B => cop_memory("swc"),
            _ => Self::unknown(i),
        }
    }

    fn unknown(i: Instruction) -> String {
        format!("??? 0x{:08X}", i.0)
    }

    /// SPECIAL (opcode 0x00)
    fn disasm_special(i: Instruction) -> String {
        let (rs, rt, rd, shamt) = (i.rs(), i.rt(), i.rd(), i.shamt());
        let three = |name: &str| format!("{} r{}, r{}, r{}", name, rd, rs, rt);
        let shift = |name: &str| format!("{} r{}, r{}, {}", name, rd, rt, shamt);
        let shift_var = |name: &str| format!("{} r{}, r{}, r{}", name, rd, rt, rs);
        let muldiv = |name: &str| format!("{} r{}, r{}", name, rs, rt);

        match i.funct() {
            0x00 if i.0 == 0 => "nop".to_string(),
            0x00 => shift("sll"),
            0x02 => shift("srl"),
            0x03 => shift("sra"),
            0x04 => shift_var("sllv"),
            0x06 => shift_var("srlv"),
            0x07 => shift_var("srav"),
            0x08 => format!("jr r{}", rs),
            0x09 if rd == 31 => format!("jalr r{}", rs),
            0x09 => format!("jalr r{}, r{}", rd, rs),
            0x0C => "syscall".to_string(),
            0x0D => "break".to_string(),
            0x10 => format!("mfhi r{}", rd),
            0x11 => format!("mthi r{}", rs),
            0x12 => format!("mflo r{}", rd),
            0x13 => format!("mtlo r{}", rs),
            0x18 => muldiv("mult"),
            0x19 => muldiv("multu"),
            0x1A => muldiv("div"),
            0x1B => muldiv("divu"),
            0x20 => three("add"),
            0x21 => three("addu"),
            0x22 => three("sub"),
            0x23 => three("subu"),
            0x24 => three("and"),
            0x25 => three("or"),
            0x26 => three("xor"),
            0x27 => three("nor"),
            0x2A => three("slt"),
            0x2B => three("sltu"),
            _ => Self::unknown(i),
        }
    }

    /// REGIMM (opcode 0x01), named by the variant the CPU executes
    fn disasm_regimm(i: Instruction, target: u32) -> String {
        let link = i.rt() & 0x1E == 0x10;
        let name = match (i.rt() & 1 != 0, link) {
            (false, false) => "bltz",
            (true, false) => "bgez",
            (false, true) => "bltzal",
            (true, true) => "bgezal",
        };
        format!("{} r{}, 0x{:08X}", name, i.rs(), target)
    }

    /// COP0-COP3 (opcodes 0x10-0x13)
    fn disasm_cop(i: Instruction) -> String {
        let n = i.coprocessor();

        if i.is_cop_command() {
            return match (n, i.funct()) {
                (0, 0x10) => "rfe".to_string(),
                (2, _) => format!("cop2 0x{:07X}", i.0 & 0x01FF_FFFF),
                _ => Self::unknown(i),
            };
        }

        let name = match i.cop_op() {
            0x00 => "mfc",
            0x02 => "cfc",
            0x04 => "mtc",
            0x06 => "ctc",
            _ => return Self::unknown(i),
        };
        format!("{}{} r{}, cop{}r{}", name, n, i.rt(), n, i.rd())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disassemble_special() {
        assert_eq!(Disassembler::disassemble(0x0000_0000, 0), "nop");
        assert_eq!(Disassembler::disassemble(0x0022_1820, 0), "add r3, r1, r2");
        assert_eq!(Disassembler::disassemble(0x0005_2200, 0), "sll r4, r5, 8");
        assert_eq!(Disassembler::disassemble(0x03E0_0008, 0), "jr r31");
        assert_eq!(Disassembler::disassemble(0x0040_F809, 0), "jalr r2");
        assert_eq!(Disassembler::disassemble(0x00A6_0018, 0), "mult r5, r6");
        assert_eq!(Disassembler::disassemble(0x0000_000C, 0), "syscall");
    }

    #[test]
    fn test_disassemble_immediates_and_memory() {
        assert_eq!(
            Disassembler::disassemble(0x2401_FFFF, 0),
            "addiu r1, r0, -1"
        );
        assert_eq!(
            Disassembler::disassemble(0x3421_00FF, 0),
            "ori r1, r1, 0x00FF"
        );
        assert_eq!(
            Disassembler::disassemble(0x8C62_FFFC, 0),
            "lw r2, -4(r3)"
        );
        assert_eq!(Disassembler::disassemble(0xAC62_0010, 0), "sw r2, 16(r3)");
    }

    #[test]
    fn test_disassemble_branch_targets() {
        assert_eq!(
            Disassembler::disassemble(0x1022_0004, 0x8000_0100),
            "beq r1, r2, 0x80000114"
        );
        assert_eq!(
            Disassembler::disassemble(0x0411_0002, 0x8000_0100),
            "bgezal r0, 0x8000010C"
        );
        assert_eq!(
            Disassembler::disassemble(0x0800_0040, 0x8000_0100),
            "j 0x80000100"
        );
    }

    #[test]
    fn test_disassemble_coprocessors() {
        assert_eq!(
            Disassembler::disassemble(0x408C_6000, 0),
            "mtc0 r12, cop0r12"
        );
        assert_eq!(Disassembler::disassemble(0x4200_0010, 0), "rfe");
        assert_eq!(
            Disassembler::disassemble(0x4801_2800, 0),
            "mfc2 r1, cop2r5"
        );
        assert_eq!(
            Disassembler::disassemble(0xC843_0008, 0),
            "lwc2 cop2r3, 8(r2)"
        );
    }

    #[test]
    fn test_disassemble_unknown() {
        assert_eq!(
            Disassembler::disassemble(0xFC00_0000, 0),
            "??? 0xFC000000"
        );
    }
}
