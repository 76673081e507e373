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
use super::super::{ExceptionCause, CPU};

impl CPU {
    // === Arithmetic Instructions ===

    /// ADD: Add (with overflow exception)
    ///
    /// Format: add rd, rs, rt
    /// Operation: rd = rs + rt
    ///
    /// On signed overflow rd is left untouched and an Overflow exception is
    /// raised.
    pub(crate) fn op_add(&mut self, rs: u8, rt: u8, rd: u8) {
        let a = self.reg(rs) as i32;
        let b = self.reg(rt) as i32;

        match a.checked_add(b) {
            Some(result) => self.set_reg(rd, result as u32),
            None => self.exception(ExceptionCause::Overflow),
        }
    }

    /// ADDU: Add Unsigned (no overflow exception)
    ///
    /// Format: addu rd, rs, rt
    pub(crate) fn op_addu(&mut self, rs: u8, rt: u8, rd: u8) {
        let result = self.reg(rs).wrapping_add(self.reg(rt));
        self.set_reg(rd, result);
    }

    /// ADDI: Add Immediate (with overflow exception)
    ///
    /// Format: addi rt, rs, imm
    /// Operation: rt = rs + sign_extend(imm)
    pub(crate) fn op_addi(&mut self, instruction: Instruction) {
        let a = self.reg(instruction.rs()) as i32;
        let b = instruction.imm_se() as i32;

        match a.checked_add(b) {
            Some(result) => self.set_reg(instruction.rt(), result as u32),
            None => self.exception(ExceptionCause::Overflow),
        }
    }

    /// ADDIU: Add Immediate Unsigned
    ///
    /// The immediate is still sign-extended; "unsigned" only means no trap.
    pub(crate) fn op_addiu(&mut self, instruction: Instruction) {
        let result = self.reg(instruction.rs()).wrapping_add(instruction.imm_se());
        self.set_reg(instruction.rt(), result);
    }

    /// SUB: Subtract (with overflow exception)
    ///
    /// Format: sub rd, rs, rt
    pub(crate) fn op_sub(&mut self, rs: u8, rt: u8, rd: u8) {
        let a = self.reg(rs) as i32;
        let b = self.reg(rt) as i32;

        match a.checked_sub(b) {
            Some(result) => self.set_reg(rd, result as u32),
            None => self.exception(ExceptionCause::Overflow),
        }
    }

    /// SUBU: Subtract Unsigned
    pub(crate) fn op_subu(&mut self, rs: u8, rt: u8, rd: u8) {
        let result = self.reg(rs).wrapping_sub(self.reg(rt));
        self.set_reg(rd, result);
    }

    // === Comparison Instructions ===

    /// SLT: Set on Less Than (signed)
    pub(crate) fn op_slt(&mut self, rs: u8, rt: u8, rd: u8) {
        let result = (self.reg(rs) as i32) < (self.reg(rt) as i32);
        self.set_reg(rd, result as u32);
    }

    /// SLTU: Set on Less Than Unsigned
    pub(crate) fn op_sltu(&mut self, rs: u8, rt: u8, rd: u8) {
        let result = self.reg(rs) < self.reg(rt);
        self.set_reg(rd, result as u32);
    }

    /// SLTI: Set on Less Than Immediate (signed)
    pub(crate) fn op_slti(&mut self, instruction: Instruction) {
        let result = (self.reg(instruction.rs()) as i32) < (instruction.imm_se() as i32);
        self.set_reg(instruction.rt(), result as u32);
    }

    /// SLTIU: Set on Less Than Immediate Unsigned
    ///
    /// The immediate is sign-extended, then compared unsigned.
    pub(crate) fn op_sltiu(&mut self, instruction: Instruction) {
        let result = self.reg(instruction.rs()) < instruction.imm_se();
        self.set_reg(instruction.rt(), result as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cpu::cop0::COP0;

    /// Helper function to create a CPU instance for testing
    fn create_test_cpu() -> CPU {
        CPU::new()
    }

    fn i_type(op: u32, rs: u8, rt: u8, imm: u16) -> Instruction {
        Instruction((op << 26) | ((rs as u32) << 21) | ((rt as u32) << 16) | imm as u32)
    }

    fn exception_code(cpu: &CPU) -> u32 {
        (cpu.cop0.regs[COP0::CAUSE] >> 2) & 0x1F
    }

    // ========== ADD Tests ==========

    #[test]
    fn test_add_basic() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(1, 10);
        cpu.set_reg(2, 20);

        cpu.op_add(1, 2, 3);

        assert_eq!(cpu.reg(3), 30);
        assert_eq!(cpu.reg(1), 10, "Source register r1 should not change");
    }

    #[test]
    fn test_add_positive_overflow_traps() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(1, 0x7FFF_FFFF);
        cpu.set_reg(2, 1);
        cpu.set_reg(3, 0xAAAA);

        cpu.op_add(1, 2, 3);

        assert_eq!(exception_code(&cpu), ExceptionCause::Overflow as u32);
        assert_eq!(cpu.reg(3), 0xAAAA, "destination must not be written");
        assert_eq!(cpu.pc(), 0xBFC0_0180);
    }

    #[test]
    fn test_add_negative_overflow_traps() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(1, 0x8000_0000);
        cpu.set_reg(2, (-1i32) as u32);

        cpu.op_add(1, 2, 3);

        assert_eq!(exception_code(&cpu), ExceptionCause::Overflow as u32);
    }

    #[test]
    fn test_add_zero_register_destination() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(1, 42);
        cpu.set_reg(2, 100);

        cpu.op_add(1, 2, 0);

        assert_eq!(cpu.reg(0), 0, "Register r0 must always be zero");
    }

    // ========== ADDU / ADDIU Tests ==========

    #[test]
    fn test_addu_wraps_without_exception() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(1, 0xFFFF_FFFF);
        cpu.set_reg(2, 1);

        cpu.op_addu(1, 2, 3);

        assert_eq!(cpu.reg(3), 0);
        assert_eq!(exception_code(&cpu), 0);
        assert_eq!(cpu.pc(), 0xBFC0_0000);
    }

    #[test]
    fn test_addiu_sign_extends() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(1, 10);

        cpu.op_addiu(i_type(0x09, 1, 2, 0xFFFF));

        assert_eq!(cpu.reg(2), 9);
    }

    #[test]
    fn test_addi_overflow_traps() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(1, 0x7FFF_FFFF);

        cpu.op_addi(i_type(0x08, 1, 2, 1));

        assert_eq!(exception_code(&cpu), ExceptionCause::Overflow as u32);
        assert_eq!(cpu.reg(2), 0);
    }

    // ========== SUB Tests ==========

    #[test]
    fn test_sub_basic() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(1, 50);
        cpu.set_reg(2, 8);

        cpu.op_sub(1, 2, 3);

        assert_eq!(cpu.reg(3), 42);
    }

    #[test]
    fn test_sub_overflow_traps() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(1, 0x8000_0000);
        cpu.set_reg(2, 1);

        cpu.op_sub(1, 2, 3);

        assert_eq!(exception_code(&cpu), ExceptionCause::Overflow as u32);
    }

    #[test]
    fn test_subu_wraps() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(2, 1);

        cpu.op_subu(0, 2, 3);

        assert_eq!(cpu.reg(3), 0xFFFF_FFFF);
    }

    // ========== Comparison Tests ==========

    #[test]
    fn test_slt_signed_vs_unsigned() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(1, (-1i32) as u32);
        cpu.set_reg(2, 1);

        cpu.op_slt(1, 2, 3);
        cpu.op_sltu(1, 2, 4);

        assert_eq!(cpu.reg(3), 1, "-1 < 1 signed");
        assert_eq!(cpu.reg(4), 0, "0xFFFFFFFF > 1 unsigned");
    }

    #[test]
    fn test_sltiu_compares_sign_extended_immediate_unsigned() {
        let mut cpu = create_test_cpu();
        cpu.set_reg(1, 0x7FFF_FFFF);

        cpu.op_sltiu(i_type(0x0B, 1, 2, 0xFFFF));
        cpu.op_slti(i_type(0x0A, 1, 3, 0xFFFF));

        assert_eq!(cpu.reg(2), 1);
        assert_eq!(cpu.reg(3), 0);
    }
}
