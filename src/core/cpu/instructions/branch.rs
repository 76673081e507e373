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

use super::super::decode::Instruction;
use super::super::CPU;

impl CPU {
    // === Branch Instructions ===

    /// Handle BCONDZ instructions (opcode 0x01)
    ///
    /// The rt field selects the variant:
    /// - Bit 0: BGEZ (1) vs BLTZ (0)
    /// - Bits 1-4 == 0b1000: link (BLTZAL / BGEZAL)
    ///
    /// Every other rt value behaves as plain BLTZ/BGEZ. The link register is
    /// written whether or not the branch is taken.
    pub(crate) fn execute_bcondz(&mut self, instruction: Instruction) {
        let rt = instruction.rt();
        let is_bgez = rt & 0x01 != 0;
        let is_link = rt & 0x1E == 0x10;

        let test = (self.reg(instruction.rs()) as i32) >= 0;
        let should_branch = if is_bgez { test } else { !test };

        if is_link {
            self.set_reg(31, self.current_pc.wrapping_add(8));
        }

        self.branch_if(should_branch, instruction.branch_offset());
    }

    /// BEQ: Branch on Equal
    pub(crate) fn op_beq(&mut self, instruction: Instruction) {
        let taken = self.reg(instruction.rs()) == self.reg(instruction.rt());
        self.branch_if(taken, instruction.branch_offset());
    }

    /// BNE: Branch on Not Equal
    pub(crate) fn op_bne(&mut self, instruction: Instruction) {
        let taken = self.reg(instruction.rs()) != self.reg(instruction.rt());
        self.branch_if(taken, instruction.branch_offset());
    }

    /// BLEZ: Branch on Less Than or Equal to Zero (signed)
    pub(crate) fn op_blez(&mut self, instruction: Instruction) {
        let taken = (self.reg(instruction.rs()) as i32) <= 0;
        self.branch_if(taken, instruction.branch_offset());
    }

    /// BGTZ: Branch on Greater Than Zero (signed)
    pub(crate) fn op_bgtz(&mut self, instruction: Instruction) {
        let taken = (self.reg(instruction.rs()) as i32) > 0;
        self.branch_if(taken, instruction.branch_offset());
    }

    /// Mark a branch and, if taken, redirect the instruction after the delay
    /// slot
    ///
    /// # Arguments
    ///
    /// * `taken` - Branch condition result
    /// * `offset` - Branch offset in bytes (already shifted)
    ///
    /// # Note
    ///
    /// The target is (B + 4) + offset, where B is the address of the branch
    /// itself. A branch executed in a delay slot therefore computes its
    /// target from its own address, and its target takes effect after one
    /// instruction at the first branch's target.
    pub(crate) fn branch_if(&mut self, taken: bool, offset: u32) {
        self.branch = true;
        if taken {
            let base = self.current_pc.wrapping_add(4);
            self.next_pc = base.wrapping_add(offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_cpu() -> CPU {
        let mut cpu = CPU::new();
        // Pretend the branch was fetched at 0x80001000
        cpu.current_pc = 0x8000_1000;
        cpu.pc = 0x8000_1004;
        cpu.next_pc = 0x8000_1008;
        cpu
    }

    fn i_type(op: u32, rs: u8, rt: u8, imm: u16) -> Instruction {
        Instruction((op << 26) | ((rs as u32) << 21) | ((rt as u32) << 16) | imm as u32)
    }

    // ========== BEQ / BNE Tests ==========

    #[test]
    fn test_beq_taken() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(1, 7);
        cpu.set_reg(2, 7);

        cpu.op_beq(i_type(0x04, 1, 2, 4));

        assert_eq!(cpu.next_pc(), 0x8000_1004 + 16);
        assert_eq!(cpu.pc(), 0x8000_1004, "delay slot still runs first");
        assert!(cpu.branch);
    }

    #[test]
    fn test_bne_not_taken_still_marks_branch() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(1, 7);
        cpu.set_reg(2, 7);

        cpu.op_bne(i_type(0x05, 1, 2, 4));

        assert_eq!(cpu.next_pc(), 0x8000_1008);
        assert!(cpu.branch);
    }

    #[test]
    fn test_backward_branch() {
        let mut cpu = create_test_cpu();

        cpu.op_beq(i_type(0x04, 0, 0, 0xFFFF));

        assert_eq!(cpu.next_pc(), 0x8000_1000);
    }

    // ========== Compare-with-zero Tests ==========

    #[test]
    fn test_blez_bgtz() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(1, (-1i32) as u32);

        cpu.op_blez(i_type(0x06, 1, 0, 8));
        assert_eq!(cpu.next_pc(), 0x8000_1004 + 32);

        let mut cpu = create_test_cpu();
        cpu.set_reg(1, (-1i32) as u32);
        cpu.op_bgtz(i_type(0x07, 1, 0, 8));
        assert_eq!(cpu.next_pc(), 0x8000_1008);
    }

    #[test]
    fn test_bltzal_links_even_when_not_taken() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(1, 5);

        cpu.execute_bcondz(i_type(0x01, 1, 0x10, 8));

        assert_eq!(cpu.reg(31), 0x8000_1008);
        assert_eq!(cpu.next_pc(), 0x8000_1008);
    }

    #[test]
    fn test_bgezal_taken() {
        let mut cpu = create_test_cpu();

        cpu.execute_bcondz(i_type(0x01, 0, 0x11, 2));

        assert_eq!(cpu.reg(31), 0x8000_1008);
        assert_eq!(cpu.next_pc(), 0x8000_100C);
    }

    #[test]
    fn test_bcondz_odd_rt_values_do_not_link() {
        let mut cpu = create_test_cpu();

        // rt = 0x03: behaves like BGEZ without link
        cpu.execute_bcondz(i_type(0x01, 0, 0x03, 2));

        assert_eq!(cpu.reg(31), 0);
        assert_eq!(cpu.next_pc(), 0x8000_100C);
    }
}
