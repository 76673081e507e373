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

use serde::{Deserialize, Serialize};

/// Coprocessor 0 (System Control)
///
/// COP0 holds the status and cause registers that drive exception entry and
/// interrupt gating, plus the debug/breakpoint registers, which are stored
/// but have no effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct COP0 {
    /// COP0 registers (32 registers)
    pub(super) regs: [u32; 32],
}

impl COP0 {
    /// Breakpoint PC
    pub const BPC: usize = 3;
    /// Breakpoint Data Address
    pub const BDA: usize = 5;
    /// Target Address
    pub const TAR: usize = 6;
    /// Debug and cache isolation control
    pub const DCIC: usize = 7;
    /// Bad Virtual Address
    pub const BADA: usize = 8;
    /// Data Address Mask
    pub const BDAM: usize = 9;
    /// PC Mask
    pub const BPCM: usize = 11;
    /// Status Register
    pub const SR: usize = 12;
    /// Cause Register
    pub const CAUSE: usize = 13;
    /// Exception PC
    pub const EPC: usize = 14;
    /// Processor ID
    pub const PRID: usize = 15;

    /// SR: current interrupt enable
    pub const SR_IEC: u32 = 1 << 0;
    /// SR: current kernel/user mode (1 = user)
    pub const SR_KUC: u32 = 1 << 1;
    /// SR: isolate cache
    pub const SR_ISC: u32 = 1 << 16;
    /// SR: boot exception vectors
    pub const SR_BEV: u32 = 1 << 22;
    /// SR: COP0 usable in user mode
    pub const SR_CU0: u32 = 1 << 28;
    /// SR: COP2 usable
    pub const SR_CU2: u32 = 1 << 30;

    /// CAUSE: hardware interrupt line 2 (interrupt controller)
    pub const CAUSE_IP2: u32 = 1 << 10;
    /// CAUSE: software interrupt bits, the only writable ones
    const CAUSE_SW_MASK: u32 = 0x0000_0300;
    /// CAUSE: branch delay flag
    const CAUSE_BD: u32 = 1 << 31;

    const SR_WRITE_MASK: u32 = 0xF27F_FF3F;

    /// Status register value after reset: boot vectors, kernel mode,
    /// interrupts off
    const SR_RESET: u32 = Self::SR_BEV;
    const PRID_R3000A: u32 = 0x0000_0002;

    /// Create a new COP0 instance
    ///
    /// # Returns
    /// Initialized COP0 instance with reset values
    pub(super) fn new() -> Self {
        let mut regs = [0u32; 32];
        regs[Self::SR] = Self::SR_RESET;
        regs[Self::PRID] = Self::PRID_R3000A;

        Self { regs }
    }

    /// Reset COP0 registers to initial state
    pub(super) fn reset(&mut self) {
        *self = Self::new();
    }

    pub(super) fn sr(&self) -> u32 {
        self.regs[Self::SR]
    }

    pub(super) fn cause(&self) -> u32 {
        self.regs[Self::CAUSE]
    }

    /// True while the CPU runs in user mode
    pub(super) fn user_mode(&self) -> bool {
        self.sr() & Self::SR_KUC != 0
    }

    pub(super) fn cache_isolated(&self) -> bool {
        self.sr() & Self::SR_ISC != 0
    }

    /// Check whether coprocessor `n` may be used in the current mode
    ///
    /// COP0 is always usable in kernel mode.
    pub(super) fn coprocessor_usable(&self, n: u32) -> bool {
        let enabled = self.sr() & (1 << (28 + n)) != 0;
        match n {
            0 => enabled || !self.user_mode(),
            _ => enabled,
        }
    }

    /// Mirror the interrupt controller line into CAUSE.IP2
    pub(super) fn set_hardware_interrupt(&mut self, asserted: bool) {
        if asserted {
            self.regs[Self::CAUSE] |= Self::CAUSE_IP2;
        } else {
            self.regs[Self::CAUSE] &= !Self::CAUSE_IP2;
        }
    }

    /// An enabled interrupt is waiting to be taken
    pub(super) fn interrupt_pending(&self) -> bool {
        let sr = self.sr();
        let ip = (self.cause() >> 8) & 0xFF;
        let im = (sr >> 8) & 0xFF;
        sr & Self::SR_IEC != 0 && ip & im != 0
    }

    /// Register read as seen by MFC0
    ///
    /// Registers 16-31 do not exist and return `None`; the unused slots below
    /// 16 read as zero.
    pub(super) fn read(&self, index: usize) -> Option<u32> {
        match index {
            Self::BPC
            | Self::BDA
            | Self::TAR
            | Self::DCIC
            | Self::BADA
            | Self::BDAM
            | Self::BPCM
            | Self::SR
            | Self::CAUSE
            | Self::EPC
            | Self::PRID => Some(self.regs[index]),
            0..=15 => Some(0),
            _ => None,
        }
    }

    /// Register write as performed by MTC0
    ///
    /// Read-only registers ignore the write, CAUSE only takes the software
    /// interrupt bits.
    pub(super) fn write(&mut self, index: usize, value: u32) {
        match index {
            Self::BPC | Self::BDA | Self::DCIC | Self::BDAM | Self::BPCM => {
                self.regs[index] = value;
            }
            Self::SR => {
                self.regs[Self::SR] = value & Self::SR_WRITE_MASK;
            }
            Self::CAUSE => {
                let cause = self.regs[Self::CAUSE] & !Self::CAUSE_SW_MASK;
                self.regs[Self::CAUSE] = cause | (value & Self::CAUSE_SW_MASK);
            }
            _ => log::trace!("MTC0 to read-only cop0r{} ignored", index),
        }
    }

    /// Record exception entry and return the handler address
    ///
    /// Pushes the KU/IE stack, stores the exception code and branch delay
    /// flag, and latches EPC.
    pub(super) fn enter_exception(&mut self, cause: ExceptionCause, epc: u32, in_delay: bool) -> u32 {
        let sr = self.sr();
        let mode = sr & 0x3F;
        self.regs[Self::SR] = (sr & !0x3F) | ((mode << 2) & 0x3F);

        let mut value = self.cause() & !(Self::CAUSE_BD | (3 << 28) | 0x7C);
        value |= (cause as u32) << 2;
        if in_delay {
            value |= Self::CAUSE_BD;
        }
        self.regs[Self::CAUSE] = value;
        self.regs[Self::EPC] = epc;

        if sr & Self::SR_BEV != 0 {
            0xBFC0_0180
        } else {
            0x8000_0080
        }
    }

    /// Pop the KU/IE stack (RFE)
    ///
    /// The old pair (bits 4-5) is left in place.
    pub(super) fn leave_exception(&mut self) {
        let sr = self.sr();
        self.regs[Self::SR] = (sr & !0x0F) | ((sr >> 2) & 0x0F);
    }

    /// Store the coprocessor number of a CoprocessorUnusable exception
    pub(super) fn set_coprocessor_error(&mut self, n: u32) {
        self.regs[Self::CAUSE] = (self.cause() & !(3 << 28)) | ((n & 3) << 28);
    }
}

/// Exception cause codes for MIPS R3000A
///
/// These correspond to the exception codes stored in the CAUSE register
/// when a CPU exception occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ExceptionCause {
    /// Interrupt (external or internal)
    Interrupt = 0,
    /// Address error on load
    AddressErrorLoad = 4,
    /// Address error on store
    AddressErrorStore = 5,
    /// Bus error on instruction fetch
    BusErrorInstruction = 6,
    /// Bus error on data access
    BusErrorData = 7,
    /// Syscall instruction executed
    Syscall = 8,
    /// Breakpoint instruction executed
    Breakpoint = 9,
    /// Reserved or illegal instruction
    ReservedInstruction = 10,
    /// Coprocessor unusable
    CoprocessorUnusable = 11,
    /// Arithmetic overflow
    Overflow = 12,
}
