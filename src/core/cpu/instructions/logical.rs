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
    // === Logical Instructions ===

    /// LUI: Load Upper Immediate
    ///
    /// Format: lui rt, imm
    /// Operation: rt = imm << 16
    pub(crate) fn op_lui(&mut self, instruction: Instruction) {
        self.set_reg(instruction.rt(), instruction.imm() << 16);
    }

    /// AND: Bitwise AND
    pub(crate) fn op_and(&mut self, rs: u8, rt: u8, rd: u8) {
        self.set_reg(rd, self.reg(rs) & self.reg(rt));
    }

    /// ANDI: Bitwise AND Immediate
    ///
    /// Logical immediates are zero-extended.
    pub(crate) fn op_andi(&mut self, instruction: Instruction) {
        self.set_reg(instruction.rt(), self.reg(instruction.rs()) & instruction.imm());
    }

    /// OR: Bitwise OR
    pub(crate) fn op_or(&mut self, rs: u8, rt: u8, rd: u8) {
        self.set_reg(rd, self.reg(rs) | self.reg(rt));
    }

    /// ORI: Bitwise OR Immediate
    pub(crate) fn op_ori(&mut self, instruction: Instruction) {
        self.set_reg(instruction.rt(), self.reg(instruction.rs()) | instruction.imm());
    }

    /// XOR: Bitwise Exclusive OR
    pub(crate) fn op_xor(&mut self, rs: u8, rt: u8, rd: u8) {
        self.set_reg(rd, self.reg(rs) ^ self.reg(rt));
    }

    /// XORI: Bitwise Exclusive OR Immediate
    pub(crate) fn op_xori(&mut self, instruction: Instruction) {
        self.set_reg(instruction.rt(), self.reg(instruction.rs()) ^ instruction.imm());
    }

    /// NOR: Bitwise NOR
    pub(crate) fn op_nor(&mut self, rs: u8, rt: u8, rd: u8) {
        self.set_reg(rd, !(self.reg(rs) | self.reg(rt)));
    }
}
