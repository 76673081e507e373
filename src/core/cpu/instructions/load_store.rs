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

//! Load and store instructions
//!
//! Loads go through the load delay slot. Misaligned addresses and kernel
//! addresses touched from user mode raise AddressErrorLoad/Store with the
//! address in BADA; the bus is not accessed. Every access adds the bus
//! region cost to the instruction.
//!
//! While SR.IsC is set, loads and stores to KUSEG and KSEG0 reach the
//! instruction cache's data store instead of memory.

use super::super::decode::Instruction;
use super::super::{ExceptionCause, CPU};
use crate::core::memory::{AccessKind, AccessWidth, Bus, CacheControl, Segment};

impl CPU {
    /// Effective address: rs + sign_extend(imm)
    #[inline(always)]
    fn data_address(&self, instruction: Instruction) -> u32 {
        self.reg(instruction.rs()).wrapping_add(instruction.imm_se())
    }

    fn data_address_valid(&self, address: u32, width: AccessWidth) -> bool {
        address & (width.bytes() - 1) == 0 && self.address_allowed(address)
    }

    /// Access to `address` is diverted to the isolated cache
    #[inline(always)]
    fn isolated(&self, address: u32) -> bool {
        self.cop0.cache_isolated() && Segment::of(address).is_cached()
    }

    /// Checked bus read; `None` once an address error has been raised
    fn load(&mut self, bus: &mut Bus, address: u32, width: AccessWidth) -> Option<u32> {
        if !self.data_address_valid(address, width) {
            self.address_error(ExceptionCause::AddressErrorLoad, address);
            return None;
        }
        if self.isolated(address) {
            return Some(self.icache.read_isolated(address, width));
        }
        self.access_cycles += bus.access_cycles(address, AccessKind::Read);
        Some(bus.read(address, width))
    }

    /// Checked bus write
    fn store(&mut self, bus: &mut Bus, address: u32, width: AccessWidth, value: u32) {
        if !self.data_address_valid(address, width) {
            self.address_error(ExceptionCause::AddressErrorStore, address);
            return;
        }
        if !self.isolated(address) {
            self.access_cycles += bus.access_cycles(address, AccessKind::Write);
        }
        self.write_unchecked(bus, address, width, value);
    }

    fn write_unchecked(&mut self, bus: &mut Bus, address: u32, width: AccessWidth, value: u32) {
        if self.isolated(address) {
            let tag_test = bus.cache_control().contains(CacheControl::TAG_TEST);
            log::trace!(
                "Isolated store to 0x{:08X} = 0x{:08X} (tag test: {})",
                address,
                value,
                tag_test
            );
            self.icache.write_isolated(address, width, value, tag_test);
            return;
        }
        bus.write(address, width, value);
    }

    /// Store byte lanes `first..=last` of `word` into the aligned word
    ///
    /// Only the addressed bytes are written, widest aligned chunk first, so a
    /// device register never sees a read it did not ask for. One write cost
    /// is charged.
    fn store_lanes(&mut self, bus: &mut Bus, aligned: u32, first: u32, last: u32, word: u32) {
        if !self.isolated(aligned) {
            self.access_cycles += bus.access_cycles(aligned, AccessKind::Write);
        }
        let mut lane = first;
        while lane <= last {
            let width = if lane == 0 && last == 3 {
                AccessWidth::Word
            } else if lane % 2 == 0 && lane < last {
                AccessWidth::Half
            } else {
                AccessWidth::Byte
            };
            self.write_unchecked(bus, aligned + lane, width, word >> (lane * 8));
            lane += width.bytes();
        }
    }

    // === Loads ===

    /// LB: Load Byte (sign-extended)
    pub(crate) fn op_lb(&mut self, instruction: Instruction, bus: &mut Bus) {
        let address = self.data_address(instruction);
        if let Some(value) = self.load(bus, address, AccessWidth::Byte) {
            self.set_reg_delayed(instruction.rt(), value as u8 as i8 as i32 as u32);
        }
    }

    /// LBU: Load Byte Unsigned
    pub(crate) fn op_lbu(&mut self, instruction: Instruction, bus: &mut Bus) {
        let address = self.data_address(instruction);
        if let Some(value) = self.load(bus, address, AccessWidth::Byte) {
            self.set_reg_delayed(instruction.rt(), value);
        }
    }

    /// LH: Load Halfword (sign-extended)
    pub(crate) fn op_lh(&mut self, instruction: Instruction, bus: &mut Bus) {
        let address = self.data_address(instruction);
        if let Some(value) = self.load(bus, address, AccessWidth::Half) {
            self.set_reg_delayed(instruction.rt(), value as u16 as i16 as i32 as u32);
        }
    }

    /// LHU: Load Halfword Unsigned
    pub(crate) fn op_lhu(&mut self, instruction: Instruction, bus: &mut Bus) {
        let address = self.data_address(instruction);
        if let Some(value) = self.load(bus, address, AccessWidth::Half) {
            self.set_reg_delayed(instruction.rt(), value);
        }
    }

    /// LW: Load Word
    pub(crate) fn op_lw(&mut self, instruction: Instruction, bus: &mut Bus) {
        let address = self.data_address(instruction);
        if let Some(value) = self.load(bus, address, AccessWidth::Word) {
            self.set_reg_delayed(instruction.rt(), value);
        }
    }

    /// LWL: Load Word Left
    ///
    /// Merges the high-order bytes of the unaligned word into rt. The merge
    /// base is the value of a load to rt still in flight, if there is one,
    /// so an LWL/LWR pair assembles the whole word.
    ///
    /// ```text
    /// addr & 3:   0          1          2          3
    /// result:   M0 R R R   M1 M0 R R  M2 M1 M0 R  M3 M2 M1 M0   (MSB first)
    /// ```
    pub(crate) fn op_lwl(&mut self, instruction: Instruction, bus: &mut Bus) {
        let address = self.data_address(instruction);
        let aligned = address & !3;
        if !self.address_allowed(aligned) {
            self.address_error(ExceptionCause::AddressErrorLoad, address);
            return;
        }
        let Some(word) = self.load(bus, aligned, AccessWidth::Word) else {
            return;
        };

        let current = self.reg_for_merge(instruction.rt());
        let value = match address & 3 {
            0 => (current & 0x00FF_FFFF) | (word << 24),
            1 => (current & 0x0000_FFFF) | (word << 16),
            2 => (current & 0x0000_00FF) | (word << 8),
            _ => word,
        };
        self.set_reg_delayed(instruction.rt(), value);
    }

    /// LWR: Load Word Right
    ///
    /// Counterpart of LWL for the low-order bytes.
    pub(crate) fn op_lwr(&mut self, instruction: Instruction, bus: &mut Bus) {
        let address = self.data_address(instruction);
        let aligned = address & !3;
        if !self.address_allowed(aligned) {
            self.address_error(ExceptionCause::AddressErrorLoad, address);
            return;
        }
        let Some(word) = self.load(bus, aligned, AccessWidth::Word) else {
            return;
        };

        let current = self.reg_for_merge(instruction.rt());
        let value = match address & 3 {
            0 => word,
            1 => (current & 0xFF00_0000) | (word >> 8),
            2 => (current & 0xFFFF_0000) | (word >> 16),
            _ => (current & 0xFFFF_FF00) | (word >> 24),
        };
        self.set_reg_delayed(instruction.rt(), value);
    }

    // === Stores ===

    /// SB: Store Byte
    pub(crate) fn op_sb(&mut self, instruction: Instruction, bus: &mut Bus) {
        let address = self.data_address(instruction);
        let value = self.reg(instruction.rt());
        self.store(bus, address, AccessWidth::Byte, value);
    }

    /// SH: Store Halfword
    pub(crate) fn op_sh(&mut self, instruction: Instruction, bus: &mut Bus) {
        let address = self.data_address(instruction);
        let value = self.reg(instruction.rt());
        self.store(bus, address, AccessWidth::Half, value);
    }

    /// SW: Store Word
    pub(crate) fn op_sw(&mut self, instruction: Instruction, bus: &mut Bus) {
        let address = self.data_address(instruction);
        let value = self.reg(instruction.rt());
        self.store(bus, address, AccessWidth::Word, value);
    }

    /// SWL: Store Word Left
    ///
    /// Writes the high-order bytes of rt into bytes `0..=addr & 3` of the
    /// containing aligned word.
    ///
    /// ```text
    /// addr & 3:   0          1          2          3
    /// memory:   m m m R3   m m R3 R2  m R3 R2 R1  R3 R2 R1 R0   (MSB first)
    /// ```
    pub(crate) fn op_swl(&mut self, instruction: Instruction, bus: &mut Bus) {
        let address = self.data_address(instruction);
        let aligned = address & !3;
        if !self.address_allowed(aligned) {
            self.address_error(ExceptionCause::AddressErrorStore, address);
            return;
        }

        let value = self.reg(instruction.rt());
        let last = address & 3;
        self.store_lanes(bus, aligned, 0, last, value >> ((3 - last) * 8));
    }

    /// SWR: Store Word Right
    ///
    /// Counterpart of SWL: the low-order bytes of rt go to bytes
    /// `addr & 3..=3`.
    pub(crate) fn op_swr(&mut self, instruction: Instruction, bus: &mut Bus) {
        let address = self.data_address(instruction);
        let aligned = address & !3;
        if !self.address_allowed(aligned) {
            self.address_error(ExceptionCause::AddressErrorStore, address);
            return;
        }

        let value = self.reg(instruction.rt());
        let first = address & 3;
        self.store_lanes(bus, aligned, first, 3, value << (first * 8));
    }

    // === Coprocessor Loads/Stores ===

    /// LWCn: Load Word to Coprocessor n
    ///
    /// Only COP2 accepts the transfer (when enabled); the loaded word is
    /// discarded.
    pub(crate) fn op_lwc(&mut self, instruction: Instruction, bus: &mut Bus) {
        let cop = instruction.coprocessor();
        if cop != 2 || !self.cop0.coprocessor_usable(2) {
            self.coprocessor_unusable(cop);
            return;
        }
        let address = self.data_address(instruction);
        let _ = self.load(bus, address, AccessWidth::Word);
    }

    /// SWCn: Store Word from Coprocessor n
    ///
    /// COP2 registers read as zero, so an enabled SWC2 stores zero.
    pub(crate) fn op_swc(&mut self, instruction: Instruction, bus: &mut Bus) {
        let cop = instruction.coprocessor();
        if cop != 2 || !self.cop0.coprocessor_usable(2) {
            self.coprocessor_unusable(cop);
            return;
        }
        let address = self.data_address(instruction);
        self.store(bus, address, AccessWidth::Word, 0);
    }
}
