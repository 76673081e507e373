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
    // === Jump Instructions ===

    /// J: Jump
    ///
    /// Target = upper 4 bits of the delay slot address | (target << 2)
    pub(crate) fn op_j(&mut self, instruction: Instruction) {
        let pc_high = self.current_pc.wrapping_add(4) & 0xF000_0000;
        self.jump_to(pc_high | (instruction.target() << 2));
    }

    /// JAL: Jump And Link
    ///
    /// r31 receives the address after the delay slot.
    pub(crate) fn op_jal(&mut self, instruction: Instruction) {
        self.set_reg(31, self.current_pc.wrapping_add(8));
        self.op_j(instruction);
    }

    /// JR: Jump Register
    ///
    /// A misaligned target is not checked here; the fetch at the target
    /// raises the address error.
    pub(crate) fn op_jr(&mut self, rs: u8) {
        self.jump_to(self.reg(rs));
    }

    /// JALR: Jump And Link Register
    ///
    /// The target is read before rd is written, so `jalr r31, r31` jumps to
    /// the old r31.
    pub(crate) fn op_jalr(&mut self, rs: u8, rd: u8) {
        let target = self.reg(rs);
        self.set_reg(rd, self.current_pc.wrapping_add(8));
        self.jump_to(target);
    }

    fn jump_to(&mut self, target: u32) {
        self.next_pc = target;
        self.branch = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_cpu() -> CPU {
        let mut cpu = CPU::new();
        cpu.current_pc = 0x8000_2000;
        cpu.pc = 0x8000_2004;
        cpu.next_pc = 0x8000_2008;
        cpu
    }

    #[test]
    fn test_j_keeps_region_bits() {
        let mut cpu = create_test_cpu();
        cpu.op_j(Instruction((0x02 << 26) | (0x0004_0000 >> 2)));
        assert_eq!(cpu.next_pc(), 0x8004_0000);
        assert!(cpu.branch);
    }

    #[test]
    fn test_jal_links_past_delay_slot() {
        let mut cpu = create_test_cpu();
        cpu.op_jal(Instruction((0x03 << 26) | (0x0000_0100 >> 2)));
        assert_eq!(cpu.reg(31), 0x8000_2008);
        assert_eq!(cpu.next_pc(), 0x8000_0100);
    }

    #[test]
    fn test_jr() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(4, 0xBFC0_0500);
        cpu.op_jr(4);
        assert_eq!(cpu.next_pc(), 0xBFC0_0500);
        assert_eq!(cpu.pc(), 0x8000_2004);
    }

    #[test]
    fn test_jalr_same_register_uses_old_target() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(31, 0x8000_3000);
        cpu.op_jalr(31, 31);
        assert_eq!(cpu.next_pc(), 0x8000_3000);
        assert_eq!(cpu.reg(31), 0x8000_2008);
    }
}
