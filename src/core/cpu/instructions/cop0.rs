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

//! Coprocessor instructions
//!
//! COP0 (System Control) moves and RFE, plus the coprocessor slots the
//! machine does not emulate: COP1 and COP3 do not exist, and COP2 (the
//! geometry unit) is accepted when enabled but does nothing.

use super::super::decode::Instruction;
use super::super::CPU;

impl CPU {
    /// COP0 dispatch (opcode 0x10)
    ///
    /// In user mode COP0 requires SR.CU0.
    pub(crate) fn execute_cop0(&mut self, instruction: Instruction) {
        if !self.cop0.coprocessor_usable(0) {
            self.coprocessor_unusable(0);
            return;
        }

        if instruction.is_cop_command() {
            match instruction.funct() {
                0x10 => self.op_rfe(instruction),
                _ => self.op_reserved(instruction),
            }
            return;
        }

        match instruction.cop_op() {
            0x00 => self.op_mfc0(instruction),
            0x04 => self.op_mtc0(instruction),
            _ => self.op_reserved(instruction),
        }
    }

    /// MFC0: Move From Coprocessor 0
    ///
    /// Format: mfc0 rt, rd
    ///
    /// The result goes through the load delay like a memory load.
    /// Registers 16-31 do not exist and raise ReservedInstruction.
    pub(crate) fn op_mfc0(&mut self, instruction: Instruction) {
        match self.cop0.read(instruction.rd() as usize) {
            Some(value) => self.set_reg_delayed(instruction.rt(), value),
            None => self.op_reserved(instruction),
        }
    }

    /// MTC0: Move To Coprocessor 0
    ///
    /// Format: mtc0 rt, rd
    pub(crate) fn op_mtc0(&mut self, instruction: Instruction) {
        let value = self.reg(instruction.rt());
        self.cop0.write(instruction.rd() as usize, value);
    }

    /// RFE: Return From Exception
    ///
    /// Pops the KU/IE stack in SR:
    /// - Bits [1:0]: Current mode (KUc, IEc)
    /// - Bits [3:2]: Previous mode (KUp, IEp)
    /// - Bits [5:4]: Old mode (KUo, IEo), left unchanged
    pub(crate) fn op_rfe(&mut self, _instruction: Instruction) {
        self.cop0.leave_exception();
    }

    /// COP2 dispatch (opcode 0x12)
    ///
    /// With SR.CU2 set the geometry unit is treated as present but inert:
    /// MFC2/CFC2 load zero, MTC2/CTC2 and commands are ignored.
    pub(crate) fn execute_cop2(&mut self, instruction: Instruction) {
        if !self.cop0.coprocessor_usable(2) {
            self.coprocessor_unusable(2);
            return;
        }

        if instruction.is_cop_command() {
            log::trace!("COP2 command 0x{:07X} ignored", instruction.0 & 0x01FF_FFFF);
            return;
        }

        match instruction.cop_op() {
            0x00 | 0x02 => self.set_reg_delayed(instruction.rt(), 0),
            0x04 | 0x06 => {}
            _ => self.op_reserved(instruction),
        }
    }

    /// COP1 / COP3: no such coprocessor
    pub(crate) fn op_cop_unusable(&mut self, instruction: Instruction) {
        self.coprocessor_unusable(instruction.coprocessor());
    }
}
