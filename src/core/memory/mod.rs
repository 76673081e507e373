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

//! Memory bus implementation for PlayStation 1 emulator
//!
//! The Bus is the single routing point for every load and store, whether it
//! comes from the CPU or from a DMA channel. It translates addresses, resolves
//! RAM mirrors and forwards hardware register accesses through its decode table.
//!
//! # Memory Map
//!
//! | Physical Address Range | Region       | Size   | Access          |
//! |------------------------|--------------|--------|-----------------|
//! | 0x00000000-0x007FFFFF  | RAM          | 2MB x4 | R/W (mirrored)  |
//! | 0x1F000000-0x1F7FFFFF  | Expansion 1  | 8MB    | device slot     |
//! | 0x1F800000-0x1F8003FF  | Scratchpad   | 1KB    | R/W             |
//! | 0x1F801000-0x1F801FFF  | I/O Ports    | 4KB    | decode table    |
//! | 0x1F802000-0x1F803FFF  | Expansion 2  | 8KB    | decode table    |
//! | 0x1FA00000-0x1FBFFFFF  | Expansion 3  | 2MB    | open bus        |
//! | 0x1FC00000-0x1FC7FFFF  | BIOS ROM     | 512KB  | R only          |
//! | 0xFFFE0130             | Cache control| 4B     | R/W             |
//!
//! Decoding is total. Anything not listed above, and any gap in the decode
//! table, is open bus: reads return the configured open-bus value and writes
//! are dropped. No access ever fails.
//!
//! # Example
//!
//! ```
//! use psrx_core::core::memory::Bus;
//!
//! let mut bus = Bus::new();
//!
//! // Write to RAM via KSEG0
//! bus.write32(0x80000000, 0x12345678);
//!
//! // Read from same location via different segment (should mirror)
//! assert_eq!(bus.read32(0x00000000), 0x12345678);
//! assert_eq!(bus.read32(0xA0600000), 0x12345678);
//! ```

use crate::core::config::{BusTiming, SessionConfig};
use crate::core::error::{EmulatorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// Sub-modules
mod cache;
mod control;
mod io_device;
mod io_ports;
mod region;

// Re-export public types
pub use cache::CacheControl;
pub use control::{
    Expansion2, MemoryControl, EXPANSION2_BASE, EXPANSION2_SIZE, MEMORY_CONTROL_BASE,
    MEMORY_CONTROL_SIZE, RAM_SIZE_ADDR,
};
pub use io_device::{
    decode_state, encode_state, read_lane, write_lane, AccessWidth, DeviceLink, IODevice,
};
pub use io_ports::{PeripheralSlot, SharedDevice};
pub use region::{AccessKind, MemoryRegion, Segment};

use io_ports::{DeviceEntry, Window};

/// Volatile memory contents captured in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryState {
    pub ram: Vec<u8>,
    pub scratchpad: Vec<u8>,
    pub bios: Vec<u8>,
    pub cache_control: CacheControl,
}

/// Memory bus managing all memory accesses
pub struct Bus {
    /// Main RAM (2MB)
    ///
    /// Physical address: 0x00000000-0x001FFFFF, mirrored up to 0x007FFFFF
    ram: Vec<u8>,

    /// Scratchpad (1KB fast RAM)
    ///
    /// Physical address: 0x1F800000-0x1F8003FF
    scratchpad: Vec<u8>,

    /// BIOS ROM (512KB)
    ///
    /// Physical address: 0x1FC00000-0x1FC7FFFF
    bios: Vec<u8>,

    /// Cache Control register (0xFFFE0130)
    cache_control: CacheControl,

    /// Registered register blocks, in registration order
    devices: Vec<DeviceEntry>,

    /// Decode table: windows sorted by start address
    windows: Vec<Window>,

    /// Device answering each DMA channel
    dma_routes: [Option<usize>; 7],

    /// Per-region access costs
    timing: BusTiming,

    /// Value read from unmapped addresses
    open_bus_value: u32,
}

impl Bus {
    /// RAM size (2MB)
    pub const RAM_SIZE: usize = 2 * 1024 * 1024;

    /// Scratchpad size (1KB)
    pub const SCRATCHPAD_SIZE: usize = 1024;

    /// BIOS size (512KB)
    pub const BIOS_SIZE: usize = 512 * 1024;

    /// RAM physical address range, including the three mirrors
    const RAM_START: u32 = 0x0000_0000;
    const RAM_MIRROR_END: u32 = 0x007F_FFFF;
    const RAM_MASK: u32 = 0x001F_FFFF;

    /// Expansion Region 1
    pub const EXP1_START: u32 = 0x1F00_0000;
    pub const EXP1_END: u32 = 0x1F7F_FFFF;

    /// Scratchpad physical address range
    const SCRATCHPAD_START: u32 = 0x1F80_0000;
    const SCRATCHPAD_END: u32 = 0x1F80_03FF;

    /// Hardware register window
    pub const IO_START: u32 = 0x1F80_1000;
    pub const IO_END: u32 = 0x1F80_1FFF;

    /// Expansion Region 2
    pub const EXP2_START: u32 = 0x1F80_2000;
    pub const EXP2_END: u32 = 0x1F80_3FFF;

    /// Expansion Region 3
    const EXP3_START: u32 = 0x1FA0_0000;
    const EXP3_END: u32 = 0x1FBF_FFFF;

    /// BIOS ROM physical address range
    const BIOS_START: u32 = 0x1FC0_0000;
    const BIOS_END: u32 = 0x1FC7_FFFF;

    /// Cache Control register address (KSEG2)
    const CACHE_CONTROL: u32 = 0xFFFE_0130;

    /// Create a new Bus with default timing
    ///
    /// RAM, scratchpad and BIOS start zeroed and the decode table is empty.
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::memory::Bus;
    ///
    /// let bus = Bus::new();
    /// assert_eq!(bus.device_count(), 0);
    /// ```
    pub fn new() -> Self {
        Self::with_config(&SessionConfig::default())
    }

    /// Create a Bus using the timing and open-bus value of `config`
    pub fn with_config(config: &SessionConfig) -> Self {
        Self {
            ram: vec![0u8; Self::RAM_SIZE],
            scratchpad: vec![0u8; Self::SCRATCHPAD_SIZE],
            bios: vec![0u8; Self::BIOS_SIZE],
            cache_control: CacheControl::default(),
            devices: Vec::new(),
            windows: Vec::new(),
            dma_routes: [None; 7],
            timing: config.timing,
            open_bus_value: config.open_bus_value,
        }
    }

    /// Reset the bus to initial state
    ///
    /// Clears RAM and scratchpad and resets every registered device. BIOS
    /// contents are preserved as they represent read-only ROM.
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::memory::Bus;
    ///
    /// let mut bus = Bus::new();
    /// bus.write32(0x80000000, 0x12345678);
    /// bus.reset();
    /// assert_eq!(bus.read32(0x80000000), 0x00000000);
    /// ```
    pub fn reset(&mut self) {
        self.ram.fill(0);
        self.scratchpad.fill(0);
        self.cache_control = CacheControl::default();
        for entry in &self.devices {
            entry.device.borrow_mut().reset();
        }
    }

    /// Install a BIOS image
    ///
    /// # Errors
    ///
    /// Returns `EmulatorError::InvalidBiosSize` unless `image` is exactly 512KB
    pub fn load_bios(&mut self, image: &[u8]) -> Result<()> {
        if image.len() != Self::BIOS_SIZE {
            return Err(EmulatorError::InvalidBiosSize {
                expected: Self::BIOS_SIZE,
                got: image.len(),
            });
        }
        self.bios.copy_from_slice(image);
        Ok(())
    }

    /// Load BIOS from file
    ///
    /// # Errors
    ///
    /// - `EmulatorError::BiosNotFound` if the file does not exist
    /// - `EmulatorError::InvalidBiosSize` if the file is not 512KB
    /// - `EmulatorError::Io` for any other read failure
    ///
    /// # Example
    ///
    /// ```no_run
    /// use psrx_core::core::memory::Bus;
    ///
    /// let mut bus = Bus::new();
    /// bus.load_bios_file("SCPH1001.BIN").unwrap();
    /// ```
    pub fn load_bios_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EmulatorError::BiosNotFound(path.display().to_string()));
        }
        let image = fs::read(path)?;
        self.load_bios(&image)?;
        log::info!("Loaded BIOS from {}", path.display());
        Ok(())
    }

    /// Read a value of `width` from `vaddr`
    ///
    /// Misaligned addresses are aligned down; the CPU raises its own address
    /// error before it ever issues one.
    ///
    /// # Returns
    ///
    /// The value, right-aligned and masked to `width`
    pub fn read(&mut self, vaddr: u32, width: AccessWidth) -> u32 {
        let vaddr = width.align(vaddr);
        let paddr = self.translate_address(vaddr);

        match self.identify_region(vaddr) {
            MemoryRegion::RAM => read_le(&self.ram, (paddr & Self::RAM_MASK) as usize, width),
            MemoryRegion::Scratchpad => read_le(
                &self.scratchpad,
                (paddr - Self::SCRATCHPAD_START) as usize,
                width,
            ),
            MemoryRegion::BIOS => read_le(&self.bios, (paddr - Self::BIOS_START) as usize, width),
            MemoryRegion::CacheControl => read_lane(self.cache_control.bits(), 0, width),
            MemoryRegion::IO | MemoryRegion::Expansion1 | MemoryRegion::Expansion2 => {
                match self.device_read(paddr, width) {
                    Some(value) => value,
                    None => self.open_bus(vaddr, width),
                }
            }
            MemoryRegion::Expansion3 | MemoryRegion::Unmapped => self.open_bus(vaddr, width),
        }
    }

    /// Write a value of `width` to `vaddr`
    ///
    /// Writes to BIOS ROM and to unmapped addresses are dropped.
    pub fn write(&mut self, vaddr: u32, width: AccessWidth, value: u32) {
        let vaddr = width.align(vaddr);
        let paddr = self.translate_address(vaddr);
        let value = value & width.mask();

        match self.identify_region(vaddr) {
            MemoryRegion::RAM => {
                write_le(&mut self.ram, (paddr & Self::RAM_MASK) as usize, width, value)
            }
            MemoryRegion::Scratchpad => write_le(
                &mut self.scratchpad,
                (paddr - Self::SCRATCHPAD_START) as usize,
                width,
                value,
            ),
            MemoryRegion::CacheControl => {
                let merged = write_lane(self.cache_control.bits(), 0, width, value);
                self.cache_control = CacheControl::from_bits_retain(merged);
                log::debug!("Cache control = 0x{:08X}", merged);
            }
            MemoryRegion::BIOS => {
                log::warn!("Write to BIOS ROM at 0x{:08X} ignored", vaddr);
            }
            MemoryRegion::IO | MemoryRegion::Expansion1 | MemoryRegion::Expansion2 => {
                if !self.device_write(paddr, width, value) {
                    log::trace!(
                        "Open bus write at 0x{:08X} = 0x{:08X} dropped",
                        vaddr,
                        value
                    );
                }
            }
            MemoryRegion::Expansion3 | MemoryRegion::Unmapped => {
                log::trace!(
                    "Open bus write at 0x{:08X} = 0x{:08X} dropped",
                    vaddr,
                    value
                );
            }
        }
    }

    fn open_bus(&self, vaddr: u32, width: AccessWidth) -> u32 {
        log::trace!("Open bus read at 0x{:08X}", vaddr);
        self.open_bus_value & width.mask()
    }

    /// Read 8-bit value from memory
    pub fn read8(&mut self, vaddr: u32) -> u8 {
        self.read(vaddr, AccessWidth::Byte) as u8
    }

    /// Read 16-bit value from memory
    pub fn read16(&mut self, vaddr: u32) -> u16 {
        self.read(vaddr, AccessWidth::Half) as u16
    }

    /// Read 32-bit value from memory
    pub fn read32(&mut self, vaddr: u32) -> u32 {
        self.read(vaddr, AccessWidth::Word)
    }

    /// Write 8-bit value to memory
    pub fn write8(&mut self, vaddr: u32, value: u8) {
        self.write(vaddr, AccessWidth::Byte, value as u32);
    }

    /// Write 16-bit value to memory
    pub fn write16(&mut self, vaddr: u32, value: u16) {
        self.write(vaddr, AccessWidth::Half, value as u32);
    }

    /// Write 32-bit value to memory
    pub fn write32(&mut self, vaddr: u32, value: u32) {
        self.write(vaddr, AccessWidth::Word, value);
    }

    /// Value returned by reads that hit nothing
    pub fn open_bus_value(&self) -> u32 {
        self.open_bus_value
    }

    /// Capture RAM, scratchpad, BIOS and cache control
    pub fn memory_state(&self) -> MemoryState {
        MemoryState {
            ram: self.ram.clone(),
            scratchpad: self.scratchpad.clone(),
            bios: self.bios.clone(),
            cache_control: self.cache_control,
        }
    }

    /// Check that `state` fits this bus before [`Bus::load_memory_state`]
    pub fn validate_memory_state(state: &MemoryState) -> Result<()> {
        if state.ram.len() != Self::RAM_SIZE
            || state.scratchpad.len() != Self::SCRATCHPAD_SIZE
            || state.bios.len() != Self::BIOS_SIZE
        {
            return Err(EmulatorError::SnapshotMismatch(
                "memory image sizes do not match".to_string(),
            ));
        }
        Ok(())
    }

    /// Restore memory captured by [`Bus::memory_state`]
    pub fn load_memory_state(&mut self, state: MemoryState) -> Result<()> {
        Self::validate_memory_state(&state)?;
        self.ram = state.ram;
        self.scratchpad = state.scratchpad;
        self.bios = state.bios;
        self.cache_control = state.cache_control;
        Ok(())
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

#[inline(always)]
fn read_le(memory: &[u8], offset: usize, width: AccessWidth) -> u32 {
    match width {
        AccessWidth::Byte => memory[offset] as u32,
        AccessWidth::Half => u16::from_le_bytes([memory[offset], memory[offset + 1]]) as u32,
        AccessWidth::Word => u32::from_le_bytes([
            memory[offset],
            memory[offset + 1],
            memory[offset + 2],
            memory[offset + 3],
        ]),
    }
}

#[inline(always)]
fn write_le(memory: &mut [u8], offset: usize, width: AccessWidth, value: u32) {
    let bytes = value.to_le_bytes();
    let len = width.bytes() as usize;
    memory[offset..offset + len].copy_from_slice(&bytes[..len]);
}
