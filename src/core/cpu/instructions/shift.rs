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

use super::super::CPU;

impl CPU {
    // === Shift Instructions ===

    /// SLL: Shift Left Logical
    ///
    /// Format: sll rd, rt, shamt
    ///
    /// `sll r0, r0, 0` is the canonical NOP.
    pub(crate) fn op_sll(&mut self, rt: u8, rd: u8, shamt: u32) {
        self.set_reg(rd, self.reg(rt) << shamt);
    }

    /// SRL: Shift Right Logical (zero-fill)
    pub(crate) fn op_srl(&mut self, rt: u8, rd: u8, shamt: u32) {
        self.set_reg(rd, self.reg(rt) >> shamt);
    }

    /// SRA: Shift Right Arithmetic (sign-fill)
    pub(crate) fn op_sra(&mut self, rt: u8, rd: u8, shamt: u32) {
        self.set_reg(rd, ((self.reg(rt) as i32) >> shamt) as u32);
    }

    /// SLLV: Shift Left Logical Variable
    ///
    /// Only the low five bits of rs are used as the shift amount.
    pub(crate) fn op_sllv(&mut self, rs: u8, rt: u8, rd: u8) {
        let shift = self.reg(rs) & 0x1F;
        self.set_reg(rd, self.reg(rt) << shift);
    }

    /// SRLV: Shift Right Logical Variable
    pub(crate) fn op_srlv(&mut self, rs: u8, rt: u8, rd: u8) {
        let shift = self.reg(rs) & 0x1F;
        self.set_reg(rd, self.reg(rt) >> shift);
    }

    /// SRAV: Shift Right Arithmetic Variable
    pub(crate) fn op_srav(&mut self, rs: u8, rt: u8, rd: u8) {
        let shift = self.reg(rs) & 0x1F;
        self.set_reg(rd, ((self.reg(rt) as i32) >> shift) as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_shifts() {
        let mut cpu = CPU::new();
        cpu.set_reg(1, 0x8000_00F0);

        cpu.op_sll(1, 2, 4);
        cpu.op_srl(1, 3, 4);
        cpu.op_sra(1, 4, 4);

        assert_eq!(cpu.reg(2), 0x0000_0F00);
        assert_eq!(cpu.reg(3), 0x0800_000F);
        assert_eq!(cpu.reg(4), 0xF800_000F);
    }

    #[test]
    fn test_variable_shift_masks_amount() {
        let mut cpu = CPU::new();
        cpu.set_reg(1, 33);
        cpu.set_reg(2, 0x0000_0001);

        cpu.op_sllv(1, 2, 3);

        assert_eq!(cpu.reg(3), 2, "shift amount 33 & 31 = 1");
    }

    #[test]
    fn test_srav_keeps_sign() {
        let mut cpu = CPU::new();
        cpu.set_reg(1, 31);
        cpu.set_reg(2, 0x8000_0000);

        cpu.op_srav(1, 2, 3);
        cpu.op_srlv(1, 2, 4);

        assert_eq!(cpu.reg(3), 0xFFFF_FFFF);
        assert_eq!(cpu.reg(4), 1);
    }

    #[test]
    fn test_nop_is_harmless() {
        let mut cpu = CPU::new();
        cpu.op_sll(0, 0, 0);
        assert_eq!(cpu.reg(0), 0);
    }
}
