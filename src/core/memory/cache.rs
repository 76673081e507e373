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

//! Cache control register and bulk RAM access
//!
//! The CPU consults the instruction cache enable and tag-test bits of the
//! cache control register at 0xFFFE0130; every other bit is only stored so
//! the BIOS reads back what it wrote. Bulk RAM helpers are used to preload test
//! programs and executables without going through the per-word bus path.

use super::Bus;
use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Cache control register (0xFFFE0130)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct CacheControl: u32 {
        const LOCK_MODE = 1 << 0;
        const INVALIDATE_MODE = 1 << 1;
        const TAG_TEST = 1 << 2;
        const SCRATCHPAD_ENABLE_1 = 1 << 3;
        const SCRATCHPAD_ENABLE_2 = 1 << 7;
        const CRASH = 1 << 9;
        const ICACHE_ENABLE = 1 << 11;
        const _ = !0;
    }
}

impl CacheControl {
    /// Whether the instruction cache is switched on
    pub fn icache_enabled(self) -> bool {
        self.contains(Self::ICACHE_ENABLE)
    }
}

impl Bus {
    /// Current cache control value
    pub fn cache_control(&self) -> CacheControl {
        self.cache_control
    }

    /// Read-only view of main RAM (2MB)
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    /// Copy `data` into RAM starting at `vaddr`
    ///
    /// The address goes through the RAM mirror mask; bytes past the end of the
    /// 2MB image wrap around to the start.
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::memory::Bus;
    ///
    /// let mut bus = Bus::new();
    /// bus.write_ram_slice(0x80001000, &[0x78, 0x56, 0x34, 0x12]);
    /// assert_eq!(bus.read32(0x00001000), 0x12345678);
    /// ```
    pub fn write_ram_slice(&mut self, vaddr: u32, data: &[u8]) {
        let start = self.translate_address(vaddr) & Self::RAM_MASK;
        for (i, &byte) in data.iter().enumerate() {
            let offset = (start as usize + i) & Self::RAM_MASK as usize;
            self.ram[offset] = byte;
        }
        log::debug!(
            "Loaded {} bytes into RAM at 0x{:08X}",
            data.len(),
            start
        );
    }

    /// Copy little-endian words into RAM starting at `vaddr`
    pub fn write_ram_words(&mut self, vaddr: u32, words: &[u32]) {
        let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
        self.write_ram_slice(vaddr, &bytes);
    }
}
