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

//! I/O Device trait for memory-mapped peripherals
//!
//! Every register block on the bus, internal (interrupt controller, timers, DMA)
//! or external (CD-ROM, SPU, MDEC, controller ports), implements [`IODevice`] and is
//! registered once into the bus decode table when the session is built.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Memory Bus                     │
//! ├─────────────────────────────────────────────┤
//! │  windows: sorted (start, end, index)        │
//! │  devices: Vec<Rc<RefCell<dyn IODevice>>>    │
//! │                                             │
//! │  read(addr) {                               │
//! │    let (index, offset) = lookup(addr);      │
//! │    devices[index].handle_read(offset, w)    │
//! │  }                                          │
//! └─────────────────────────────────────────────┘
//!           ▲                   ▲
//!           │                   │
//!    ┌──────┴──────┐    ┌──────┴──────┐
//!    │   GPU port  │    │  Timers     │
//!    │ (IODevice)  │    │ (IODevice)  │
//!    └─────────────┘    └─────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use psrx_core::core::memory::{read_lane, write_lane, AccessWidth, IODevice};
//!
//! struct Latch {
//!     value: u32,
//! }
//!
//! impl IODevice for Latch {
//!     fn name(&self) -> &str {
//!         "Latch"
//!     }
//!
//!     fn handle_read(&mut self, offset: u32, width: AccessWidth) -> u32 {
//!         read_lane(self.value, offset, width)
//!     }
//!
//!     fn handle_write(&mut self, offset: u32, width: AccessWidth, value: u32) {
//!         self.value = write_lane(self.value, offset, width, value);
//!     }
//! }
//!
//! let mut latch = Latch { value: 0 };
//! latch.handle_write(2, AccessWidth::Half, 0xBEEF);
//! assert_eq!(latch.handle_read(0, AccessWidth::Word), 0xBEEF_0000);
//! ```

use crate::core::error::Result;
use crate::core::interrupt::InterruptLine;
use crate::core::timer::TimerSync;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Width of a bus access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessWidth {
    /// 8-bit access
    Byte,
    /// 16-bit access
    Half,
    /// 32-bit access
    Word,
}

impl AccessWidth {
    /// Number of bytes moved by this access
    #[inline(always)]
    pub fn bytes(self) -> u32 {
        match self {
            AccessWidth::Byte => 1,
            AccessWidth::Half => 2,
            AccessWidth::Word => 4,
        }
    }

    /// Value mask for this width
    #[inline(always)]
    pub fn mask(self) -> u32 {
        match self {
            AccessWidth::Byte => 0xFF,
            AccessWidth::Half => 0xFFFF,
            AccessWidth::Word => 0xFFFF_FFFF,
        }
    }

    /// Clear the low address bits so the access is naturally aligned
    #[inline(always)]
    pub fn align(self, addr: u32) -> u32 {
        addr & !(self.bytes() - 1)
    }
}

/// Extract the lane addressed by `offset` out of a 32-bit register
///
/// Used by devices whose registers are 32 bits wide but which must answer
/// byte and halfword reads at any lane.
#[inline(always)]
pub fn read_lane(register: u32, offset: u32, width: AccessWidth) -> u32 {
    let shift = (offset & 0x03) * 8;
    (register >> shift) & width.mask()
}

/// Merge a narrow write into the lane addressed by `offset`
///
/// Returns `current` with only the addressed lane replaced by `value`.
#[inline(always)]
pub fn write_lane(current: u32, offset: u32, width: AccessWidth, value: u32) -> u32 {
    let shift = (offset & 0x03) * 8;
    let mask = width.mask() << shift;
    (current & !mask) | ((value & width.mask()) << shift)
}

/// Encode a device's state blob
pub fn encode_state<T: Serialize>(state: &T) -> Result<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(
        state,
        bincode::config::standard(),
    )?)
}

/// Decode a device's state blob produced by [`encode_state`]
pub fn decode_state<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    let (state, _) = bincode::serde::decode_from_slice(data, bincode::config::standard())?;
    Ok(state)
}

/// Handles a device receives when it is wired into a session
#[derive(Debug, Clone, Default)]
pub struct DeviceLink {
    /// Latches interrupts into the session's interrupt controller
    pub irq: InterruptLine,
    /// Delivers blanking pulses to the timers
    pub timers: TimerSync,
}

/// Trait for memory-mapped I/O devices
///
/// # Address Translation
///
/// The Bus translates physical addresses to device-relative offsets before
/// calling trait methods. For example:
///
/// - Device window: `0x1F801810 - 0x1F801817`
/// - Physical address: `0x1F801814`
/// - Offset passed to device: `0x04`
///
/// Offsets are naturally aligned for the access width. Values are passed and
/// returned right-aligned: a byte read at offset 1 returns the byte in bits 0-7.
///
/// # Time
///
/// Devices never keep a clock of their own. The scheduler hands them elapsed
/// cycles through [`IODevice::advance`] and asks [`IODevice::cycles_until_event`]
/// so that a slice boundary lands exactly where the device has something to do.
///
/// # Thread Safety
///
/// IODevice implementations do not need to be `Send` or `Sync` as the Bus
/// is not shared across threads.
pub trait IODevice {
    /// Device name for logging and snapshot validation
    fn name(&self) -> &str {
        "Unknown Device"
    }

    /// Read a register
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset from the device's base address
    /// * `width` - Access width
    ///
    /// # Returns
    ///
    /// The register value, right-aligned and masked to `width`
    fn handle_read(&mut self, offset: u32, width: AccessWidth) -> u32;

    /// Write a register
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset from the device's base address
    /// * `width` - Access width
    /// * `value` - Value to write, right-aligned
    fn handle_write(&mut self, offset: u32, width: AccessWidth, value: u32);

    /// Accept one word from a memory-to-device DMA transfer
    fn consume_dma_word(&mut self, channel: usize, word: u32) {
        log::warn!(
            "{} ignored DMA{} word 0x{:08X}",
            self.name(),
            channel,
            word
        );
    }

    /// Supply one word for a device-to-memory DMA transfer
    fn produce_dma_word(&mut self, channel: usize) -> u32 {
        log::warn!("{} has no DMA{} data", self.name(), channel);
        0
    }

    /// Receive the session's interrupt and timer handles
    fn connect(&mut self, _link: DeviceLink) {}

    /// Advance the device by `cycles` CPU cycles
    fn advance(&mut self, _cycles: u32) {}

    /// CPU cycles until the device next needs to run, if it has anything queued
    fn cycles_until_event(&self) -> Option<u32> {
        None
    }

    /// Return to the power-on state
    fn reset(&mut self) {}

    /// Serialize the complete device state
    fn save_state(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    /// Restore a state produced by [`IODevice::save_state`]
    fn load_state(&mut self, _data: &[u8]) -> Result<()> {
        Ok(())
    }
}
