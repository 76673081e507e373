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

//! Memory control registers and expansion region 2
//!
//! Neither block changes how the core decodes memory. The BIOS programs the
//! memory control registers during boot and reads them back, so they are
//! stored verbatim. Expansion region 2 carries the boot status (POST) port and
//! a debug UART that the BIOS and homebrew write progress to.

use super::{decode_state, encode_state, read_lane, write_lane, AccessWidth, IODevice};
use crate::core::error::Result;
use serde::{Deserialize, Serialize};

/// Memory control block base (0x1F801000)
pub const MEMORY_CONTROL_BASE: u32 = 0x1F80_1000;
/// Memory control block size (Exp1 base through COM_DELAY)
pub const MEMORY_CONTROL_SIZE: u32 = 0x24;
/// RAM_SIZE register (0x1F801060)
pub const RAM_SIZE_ADDR: u32 = 0x1F80_1060;

/// Expansion region 2 base (0x1F802000)
pub const EXPANSION2_BASE: u32 = 0x1F80_2000;
/// Expansion region 2 size
pub const EXPANSION2_SIZE: u32 = 0x2000;

const RAM_SIZE_OFFSET: u32 = 0x60;

/// Power-on values of the nine delay/size registers, as left by the BIOS
const CONTROL_DEFAULTS: [u32; 9] = [
    0x1F00_0000, // Expansion 1 base
    0x1F80_2000, // Expansion 2 base
    0x0013_243F, // Expansion 1 delay/size
    0x0000_3022, // Expansion 3 delay/size
    0x0013_243F, // BIOS ROM delay/size
    0x2009_31E1, // SPU delay/size
    0x0002_0843, // CD-ROM delay/size
    0x0007_0777, // Expansion 2 delay/size
    0x0003_1125, // COM_DELAY
];

const RAM_SIZE_DEFAULT: u32 = 0x0000_0B88;

/// Memory control registers (0x1F801000-0x1F801023, 0x1F801060)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryControl {
    registers: [u32; 9],
    ram_size: u32,
}

impl MemoryControl {
    /// Create the block with its power-on values
    pub fn new() -> Self {
        Self {
            registers: CONTROL_DEFAULTS,
            ram_size: RAM_SIZE_DEFAULT,
        }
    }

    /// RAM_SIZE register value
    pub fn ram_size(&self) -> u32 {
        self.ram_size
    }

    /// Register at `index` (0 = Expansion 1 base, 8 = COM_DELAY)
    pub fn register(&self, index: usize) -> Option<u32> {
        self.registers.get(index).copied()
    }
}

impl Default for MemoryControl {
    fn default() -> Self {
        Self::new()
    }
}

impl IODevice for MemoryControl {
    fn name(&self) -> &str {
        "MemoryControl"
    }

    fn handle_read(&mut self, offset: u32, width: AccessWidth) -> u32 {
        if offset & !3 == RAM_SIZE_OFFSET {
            return read_lane(self.ram_size, offset, width);
        }
        match self.registers.get((offset / 4) as usize) {
            Some(&value) => read_lane(value, offset, width),
            None => 0,
        }
    }

    fn handle_write(&mut self, offset: u32, width: AccessWidth, value: u32) {
        if offset & !3 == RAM_SIZE_OFFSET {
            self.ram_size = write_lane(self.ram_size, offset, width, value);
            log::debug!("RAM_SIZE = 0x{:08X}", self.ram_size);
            return;
        }
        let index = (offset / 4) as usize;
        if let Some(register) = self.registers.get_mut(index) {
            *register = write_lane(*register, offset, width, value);
            log::debug!(
                "Memory control 0x{:08X} = 0x{:08X}",
                MEMORY_CONTROL_BASE + offset,
                *register
            );
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        encode_state(self)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        *self = decode_state(data)?;
        Ok(())
    }
}

/// Offset of the boot status (POST) register
const POST_OFFSET: u32 = 0x41;
/// Offset of the debug UART transmit register
const DUART_TX_OFFSET: u32 = 0x23;

/// Expansion region 2 (0x1F802000-0x1F803FFF)
///
/// Reads of unused registers return 0xFF on byte lanes as on hardware with
/// no expansion board fitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expansion2 {
    /// Last value written to the POST register
    post: u8,
    /// Characters written to the debug UART since the last newline
    line: String,
}

impl Expansion2 {
    /// Create the block with no POST code and an empty UART line
    pub fn new() -> Self {
        Self::default()
    }

    /// Last boot status code written by the BIOS
    pub fn post_code(&self) -> u8 {
        self.post
    }

    /// Debug UART characters not yet terminated by a newline
    pub fn pending_line(&self) -> &str {
        &self.line
    }
}

impl IODevice for Expansion2 {
    fn name(&self) -> &str {
        "Expansion2"
    }

    fn handle_read(&mut self, offset: u32, width: AccessWidth) -> u32 {
        match offset {
            POST_OFFSET => self.post as u32,
            // DUART status: transmitter always ready
            0x21 => 0x04 | 0x08,
            _ => width.mask(),
        }
    }

    fn handle_write(&mut self, offset: u32, _width: AccessWidth, value: u32) {
        match offset {
            POST_OFFSET => {
                self.post = value as u8;
                log::info!("BIOS POST code 0x{:02X}", self.post);
            }
            DUART_TX_OFFSET => {
                let ch = value as u8 as char;
                if ch == '\n' {
                    log::info!("TTY: {}", self.line);
                    self.line.clear();
                } else if ch != '\r' {
                    self.line.push(ch);
                }
            }
            _ => log::trace!(
                "Expansion 2 write +0x{:X} = 0x{:08X} ignored",
                offset,
                value
            ),
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        encode_state(self)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        *self = decode_state(data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::Bus;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn create_test_bus() -> (Bus, Rc<RefCell<MemoryControl>>, Rc<RefCell<Expansion2>>) {
        let mut bus = Bus::new();
        let control = Rc::new(RefCell::new(MemoryControl::new()));
        let index = bus
            .register_device(MEMORY_CONTROL_BASE, MEMORY_CONTROL_SIZE, control.clone())
            .unwrap();
        bus.map_window(index, RAM_SIZE_ADDR, 4).unwrap();

        let expansion = Rc::new(RefCell::new(Expansion2::new()));
        bus.register_device(EXPANSION2_BASE, EXPANSION2_SIZE, expansion.clone())
            .unwrap();
        (bus, control, expansion)
    }

    // ========== Memory Control Tests ==========

    #[test]
    fn test_memory_control_defaults() {
        let (mut bus, _, _) = create_test_bus();
        assert_eq!(bus.read32(0x1F80_1000), 0x1F00_0000);
        assert_eq!(bus.read32(0x1F80_1004), 0x1F80_2000);
        assert_eq!(bus.read32(0x1F80_1020), 0x0003_1125);
        assert_eq!(bus.read32(0x1F80_1060), 0x0000_0B88);
    }

    #[test]
    fn test_memory_control_write_read_back() {
        let (mut bus, control, _) = create_test_bus();
        bus.write32(0xBF80_1010, 0x0013_243F);
        bus.write32(0xBF80_1060, 0x0000_0888);
        bus.write16(0x1F80_1008, 0xABCD);
        assert_eq!(bus.read32(0x1F80_1060), 0x0000_0888);
        assert_eq!(control.borrow().ram_size(), 0x0000_0888);
        assert_eq!(bus.read32(0x1F80_1008), 0x0013_ABCD);
    }

    #[test]
    fn test_memory_control_gap_is_open_bus() {
        let (mut bus, _, _) = create_test_bus();
        assert_eq!(bus.read32(0x1F80_1030), 0xFFFF_FFFF);
    }

    #[test]
    fn test_memory_control_reset() {
        let mut control = MemoryControl::new();
        control.handle_write(0x60, AccessWidth::Word, 0);
        control.reset();
        assert_eq!(control.ram_size(), RAM_SIZE_DEFAULT);
        assert_eq!(control.register(8), Some(0x0003_1125));
    }

    // ========== Expansion 2 Tests ==========

    #[test]
    fn test_post_register() {
        let (mut bus, _, expansion) = create_test_bus();
        bus.write8(0x1F80_2041, 0x0F);
        assert_eq!(expansion.borrow().post_code(), 0x0F);
        assert_eq!(bus.read8(0x1F80_2041), 0x0F);
    }

    #[test]
    fn test_duart_line_buffer() {
        let mut expansion = Expansion2::new();
        for &byte in b"OK\r\n" {
            expansion.handle_write(DUART_TX_OFFSET, AccessWidth::Byte, byte as u32);
        }
        assert_eq!(expansion.pending_line(), "");
        expansion.handle_write(DUART_TX_OFFSET, AccessWidth::Byte, b'A' as u32);
        assert_eq!(expansion.pending_line(), "A");
    }

    #[test]
    fn test_expansion2_unused_reads() {
        let (mut bus, _, _) = create_test_bus();
        assert_eq!(bus.read8(0x1F80_2000), 0xFF);
    }

    #[test]
    fn test_state_roundtrip() {
        let mut expansion = Expansion2::new();
        expansion.handle_write(POST_OFFSET, AccessWidth::Byte, 7);
        let blob = expansion.save_state().unwrap();
        let mut restored = Expansion2::new();
        restored.load_state(&blob).unwrap();
        assert_eq!(restored, expansion);
    }
}
