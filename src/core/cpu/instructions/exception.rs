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

//! Exception-triggering instructions

use super::super::decode::Instruction;
use super::super::{ExceptionCause, CPU};

impl CPU {
    /// SYSCALL: System Call
    ///
    /// The 20-bit code field is ignored by the CPU; handlers read it back
    /// from the instruction at EPC.
    pub(crate) fn op_syscall(&mut self, _instruction: Instruction) {
        self.exception(ExceptionCause::Syscall);
    }

    /// BREAK: Breakpoint
    pub(crate) fn op_break(&mut self, _instruction: Instruction) {
        self.exception(ExceptionCause::Breakpoint);
    }

    /// Any encoding with no defined instruction
    pub(crate) fn op_reserved(&mut self, instruction: Instruction) {
        log::debug!(
            "Reserved instruction 0x{:08X} at 0x{:08X}",
            instruction.0,
            self.current_pc
        );
        self.exception(ExceptionCause::ReservedInstruction);
    }
}
