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

//! Memory region identification and address translation
//!
//! The PSX uses MIPS memory segments with different caching behaviors. Every
//! 32-bit address classifies to exactly one [`MemoryRegion`]; addresses that
//! belong to nothing are [`MemoryRegion::Unmapped`] and behave as open bus.

use super::Bus;
use crate::core::config::AccessCost;

/// Memory region identification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRegion {
    /// Main RAM (2MB, mirrored through 0x007FFFFF)
    RAM,
    /// Scratchpad (1KB)
    Scratchpad,
    /// Hardware register window, routed through the decode table
    IO,
    /// BIOS ROM
    BIOS,
    /// Cache Control register (0xFFFE0130)
    CacheControl,
    /// Expansion region 1 (0x1F000000-0x1F7FFFFF)
    Expansion1,
    /// Expansion region 2 (0x1F802000-0x1F803FFF)
    Expansion2,
    /// Expansion region 3 (0x1FA00000-0x1FBFFFFF)
    Expansion3,
    /// Nothing answers here
    Unmapped,
}

/// MIPS address segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// 0x00000000-0x7FFFFFFF, user space, cached
    Kuseg,
    /// 0x80000000-0x9FFFFFFF, kernel space, cached
    Kseg0,
    /// 0xA0000000-0xBFFFFFFF, kernel space, uncached
    Kseg1,
    /// 0xC0000000-0xFFFFFFFF, kernel space, only cache control is mapped
    Kseg2,
}

impl Segment {
    /// Segment containing `vaddr`
    pub fn of(vaddr: u32) -> Self {
        match vaddr >> 29 {
            0..=3 => Segment::Kuseg,
            4 => Segment::Kseg0,
            5 => Segment::Kseg1,
            _ => Segment::Kseg2,
        }
    }

    /// KUSEG and KSEG0 go through the caches
    pub fn is_cached(self) -> bool {
        matches!(self, Segment::Kuseg | Segment::Kseg0)
    }
}

/// Direction of a timed bus access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

impl Bus {
    /// Translate virtual address to physical address
    ///
    /// KUSEG, KSEG0 and KSEG1 mirror the same 512MB physical space; KSEG2
    /// addresses are returned unchanged.
    ///
    /// # Arguments
    ///
    /// * `vaddr` - Virtual address to translate
    pub fn translate_address(&self, vaddr: u32) -> u32 {
        match Segment::of(vaddr) {
            Segment::Kseg2 => vaddr,
            _ => vaddr & 0x1FFF_FFFF,
        }
    }

    /// Identify memory region for an address
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::memory::{Bus, MemoryRegion};
    ///
    /// let bus = Bus::new();
    ///
    /// assert_eq!(bus.identify_region(0x00000000), MemoryRegion::RAM);
    /// assert_eq!(bus.identify_region(0x80600000), MemoryRegion::RAM);
    /// assert_eq!(bus.identify_region(0x1F800000), MemoryRegion::Scratchpad);
    /// assert_eq!(bus.identify_region(0xBF800000), MemoryRegion::Unmapped);
    /// assert_eq!(bus.identify_region(0x1F801000), MemoryRegion::IO);
    /// assert_eq!(bus.identify_region(0xBFC00000), MemoryRegion::BIOS);
    /// assert_eq!(bus.identify_region(0xFFFE0130), MemoryRegion::CacheControl);
    /// assert_eq!(bus.identify_region(0x1FFFFFFF), MemoryRegion::Unmapped);
    /// ```
    pub fn identify_region(&self, vaddr: u32) -> MemoryRegion {
        let segment = Segment::of(vaddr);
        if segment == Segment::Kseg2 {
            return if vaddr == Self::CACHE_CONTROL {
                MemoryRegion::CacheControl
            } else {
                MemoryRegion::Unmapped
            };
        }

        let paddr = vaddr & 0x1FFF_FFFF;
        match paddr {
            Self::RAM_START..=Self::RAM_MIRROR_END => MemoryRegion::RAM,
            Self::EXP1_START..=Self::EXP1_END => MemoryRegion::Expansion1,
            Self::SCRATCHPAD_START..=Self::SCRATCHPAD_END => {
                // The scratchpad is a data cache in disguise and has no uncached alias
                if segment == Segment::Kseg1 {
                    MemoryRegion::Unmapped
                } else {
                    MemoryRegion::Scratchpad
                }
            }
            Self::IO_START..=Self::IO_END => MemoryRegion::IO,
            Self::EXP2_START..=Self::EXP2_END => MemoryRegion::Expansion2,
            Self::EXP3_START..=Self::EXP3_END => MemoryRegion::Expansion3,
            Self::BIOS_START..=Self::BIOS_END => MemoryRegion::BIOS,
            _ => MemoryRegion::Unmapped,
        }
    }

    /// Cost pair charged for accesses to `vaddr`
    fn region_cost(&self, vaddr: u32) -> AccessCost {
        match self.identify_region(vaddr) {
            MemoryRegion::RAM => self.timing.ram,
            MemoryRegion::Scratchpad => self.timing.scratchpad,
            MemoryRegion::BIOS => self.timing.bios,
            MemoryRegion::IO | MemoryRegion::CacheControl => self.timing.io,
            MemoryRegion::Expansion1
            | MemoryRegion::Expansion2
            | MemoryRegion::Expansion3
            | MemoryRegion::Unmapped => self.timing.expansion,
        }
    }

    /// Extra CPU cycles charged for a load or store at `vaddr`
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::memory::{AccessKind, Bus};
    ///
    /// let bus = Bus::new();
    /// assert_eq!(bus.access_cycles(0x1F800000, AccessKind::Read), 0);
    /// assert!(bus.access_cycles(0xBFC00000, AccessKind::Read) > bus.access_cycles(0x80000000, AccessKind::Read));
    /// ```
    pub fn access_cycles(&self, vaddr: u32, kind: AccessKind) -> u32 {
        let cost = self.region_cost(vaddr);
        match kind {
            AccessKind::Read => cost.read,
            AccessKind::Write => cost.write,
        }
    }

    /// Extra CPU cycles charged for fetching an instruction from the bus
    ///
    /// Paid by every uncached fetch and by instruction cache misses; a cache
    /// hit never reaches the bus.
    pub fn fetch_cycles(&self, vaddr: u32) -> u32 {
        self.region_cost(vaddr).read
    }

    /// Base cost of one instruction
    pub fn instruction_cycles(&self) -> u32 {
        self.timing.instruction_cycles
    }
}
