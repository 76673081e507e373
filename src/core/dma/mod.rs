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

//! DMA (Direct Memory Access) Controller
//!
//! This module implements the PlayStation's DMA controller, which moves words
//! between RAM and peripherals while the CPU is stalled.
//!
//! # DMA Channels
//!
//! The PSX has 7 DMA channels, each dedicated to a specific peripheral:
//!
//! | Channel | Device      | Base Address |
//! |---------|-------------|--------------|
//! | 0       | MDEC In     | 0x1F801080   |
//! | 1       | MDEC Out    | 0x1F801090   |
//! | 2       | GPU         | 0x1F8010A0   |
//! | 3       | CD-ROM      | 0x1F8010B0   |
//! | 4       | SPU         | 0x1F8010C0   |
//! | 5       | PIO         | 0x1F8010D0   |
//! | 6       | OTC         | 0x1F8010E0   |
//!
//! # Channel Registers
//!
//! Each channel has three 32-bit registers:
//! - **MADR** (+0x00): Memory address register
//! - **BCR** (+0x04): Block control register
//! - **CHCR** (+0x08): Channel control register
//!
//! # Global Registers
//!
//! - **DPCR** (0x1F8010F0): DMA control register (channel priorities and enables)
//! - **DICR** (0x1F8010F4): DMA interrupt register
//!
//! # Slices
//!
//! A transfer never runs to completion inside a single call. The system loop
//! calls [`DMA::run_slice`] at scheduled cycles; each call moves one slice of
//! the highest priority runnable channel and reports how many words it moved
//! (the cycles stolen from the CPU) and how long the CPU runs before the next
//! slice:
//!
//! - **Mode 0** (Manual): the whole transfer in one slice
//! - **Mode 1** (Block): one block per slice
//! - **Mode 2** (Linked-list): one node (header and payload) per slice
//!
//! With chopping enabled a slice is cut to 2^n words and followed by a 2^m
//! cycle CPU window taken from CHCR.
//!
//! # References
//!
//! - [PSX-SPX: DMA Controller](http://problemkaputt.de/psx-spx.htm#dmacontroller)

use crate::core::config::DmaTiming;
use crate::core::error::{EmulatorError, Result};
use crate::core::interrupt::{InterruptLine, InterruptSource};
use crate::core::memory::{
    decode_state, encode_state, read_lane, write_lane, AccessWidth, Bus, DeviceLink, IODevice,
};
use serde::{Deserialize, Serialize};

/// DMA register block base (0x1F801080)
pub const DMA_BASE: u32 = 0x1F80_1080;

/// DMA register block size (channel registers, DPCR and DICR)
pub const DMA_SIZE: u32 = 0x78;

/// Word-aligned RAM address mask applied to every DMA memory access
const RAM_WORD_MASK: u32 = 0x001F_FFFC;

/// Linked-list terminator (any pointer with bit 23 set ends the list)
const END_OF_LIST: u32 = 0x0080_0000;

const CHCR_START: u32 = 1 << 24;
const CHCR_TRIGGER: u32 = 1 << 28;
const CHCR_CHOPPING: u32 = 1 << 8;
const CHCR_STEP_BACKWARD: u32 = 1 << 1;
const CHCR_WRITABLE: u32 = 0x7177_0703;

const DICR_FORCE: u32 = 1 << 15;
const DICR_MASTER_ENABLE: u32 = 1 << 23;
const DICR_MASTER_FLAG: u32 = 1 << 31;

/// Transfer direction (CHCR bit 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Device to RAM
    ToRam,
    /// RAM to device
    FromRam,
}

/// Synchronization mode (CHCR bits 9-10)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Transfer the whole word count at once
    Manual,
    /// Transfer block by block as the device requests data
    Block,
    /// Follow a chain of nodes in RAM
    LinkedList,
}

/// Amount of data a channel transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferSize {
    /// Manual mode: `n` words (0 means 0x10000)
    Words(u16),
    /// Block mode: `count` blocks of `size` words
    Blocks { size: u16, count: u16 },
    /// Linked-list mode: the node chain decides
    LinkedList,
}

/// Result of one transfer slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaSlice {
    /// Channel that ran
    pub channel: usize,
    /// Words moved, one bus cycle each, stolen from the CPU
    pub words: u32,
    /// CPU cycles to grant before the next slice
    pub gap: u32,
    /// Whether the channel finished its transfer
    pub completed: bool,
}

/// In-flight state of a started transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Progress {
    /// Manual and block modes
    Blocks { words_left: u32, blocks_left: u32 },
    /// Linked-list mode, MADR points at the next header
    LinkedList,
    /// Ordering table clear (channel 6)
    OrderingTable { entries: u32 },
}

/// Single DMA channel
///
/// Each channel manages transfers for one specific peripheral device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DMAChannel {
    /// Memory Address Register (MADR)
    ///
    /// Advances as the transfer proceeds.
    base_address: u32,

    /// Block Control Register (BCR)
    ///
    /// - Bits 0-15: Block size (words)
    /// - Bits 16-31: Block count, decremented per finished block
    block_control: u32,

    /// Channel Control Register (CHCR)
    ///
    /// - Bit 0: Direction (0=to RAM, 1=from RAM)
    /// - Bit 1: Address step (0=forward, 1=backward)
    /// - Bit 8: Chopping enable
    /// - Bits 9-10: Sync mode (0=manual, 1=block, 2=linked-list)
    /// - Bits 16-18: Chopping DMA window (2^n words)
    /// - Bits 20-22: Chopping CPU window (2^n cycles)
    /// - Bit 24: Start/busy flag
    /// - Bit 28: Manual trigger
    channel_control: u32,

    /// Channel ID (0-6)
    channel_id: u8,

    progress: Option<Progress>,
}

impl DMAChannel {
    fn new(channel_id: u8) -> Self {
        Self {
            base_address: 0,
            block_control: 0,
            channel_control: if channel_id == 6 { CHCR_STEP_BACKWARD } else { 0 },
            channel_id,
            progress: None,
        }
    }

    /// Whether a transfer is in flight
    #[inline(always)]
    pub fn is_busy(&self) -> bool {
        self.progress.is_some()
    }

    /// Transfer direction
    #[inline(always)]
    pub fn direction(&self) -> Direction {
        if self.channel_control & 1 != 0 {
            Direction::FromRam
        } else {
            Direction::ToRam
        }
    }

    /// Synchronization mode
    ///
    /// The reserved mode 3 behaves as linked-list.
    #[inline(always)]
    pub fn sync_mode(&self) -> SyncMode {
        match (self.channel_control >> 9) & 3 {
            0 => SyncMode::Manual,
            1 => SyncMode::Block,
            _ => SyncMode::LinkedList,
        }
    }

    /// Manual trigger bit (CHCR bit 28)
    #[inline(always)]
    pub fn trigger(&self) -> bool {
        self.channel_control & CHCR_TRIGGER != 0
    }

    /// Words per slice when chopping is enabled
    fn chop_words(&self) -> Option<u32> {
        (self.channel_control & CHCR_CHOPPING != 0)
            .then(|| 1 << ((self.channel_control >> 16) & 7))
    }

    /// CPU cycles between chopped slices
    fn chop_cycles(&self) -> Option<u32> {
        (self.channel_control & CHCR_CHOPPING != 0)
            .then(|| 1 << ((self.channel_control >> 20) & 7))
    }

    fn step_address(&mut self) {
        self.base_address = if self.channel_control & CHCR_STEP_BACKWARD != 0 {
            self.base_address.wrapping_sub(4)
        } else {
            self.base_address.wrapping_add(4)
        } & 0x00FF_FFFF;
    }

    /// Whether the start conditions in CHCR are met
    fn wants_start(&self) -> bool {
        self.channel_control & CHCR_START != 0
            && (self.sync_mode() != SyncMode::Manual || self.trigger())
    }

    fn start(&mut self) {
        let block_size = match self.block_control & 0xFFFF {
            0 => 0x1_0000,
            size => size,
        };
        let block_count = match self.block_control >> 16 {
            0 => 0x1_0000,
            count => count,
        };
        self.progress = Some(match (self.channel_id, self.sync_mode()) {
            (6, _) => Progress::OrderingTable {
                entries: block_size,
            },
            (_, SyncMode::Manual) => Progress::Blocks {
                words_left: block_size,
                blocks_left: 1,
            },
            (_, SyncMode::Block) => Progress::Blocks {
                words_left: block_size,
                blocks_left: block_count,
            },
            (_, SyncMode::LinkedList) => Progress::LinkedList,
        });
        log::debug!(
            "DMA{} started: addr=0x{:08X} bcr=0x{:08X} mode={:?}",
            self.channel_id,
            self.base_address,
            self.block_control,
            self.sync_mode()
        );
    }

    /// Clear busy and trigger bits
    fn finish(&mut self) {
        self.progress = None;
        self.channel_control &= !(CHCR_START | CHCR_TRIGGER);
    }
}

/// DMA Controller with 7 channels
///
/// # Examples
///
/// ```
/// use psrx_core::core::dma::DMA;
///
/// let dma = DMA::new();
/// assert_eq!(dma.read_control(), 0x07654321);
/// assert!(!dma.has_pending_work());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DMA {
    /// 7 DMA channels (MDEC In/Out, GPU, CD-ROM, SPU, PIO, OTC)
    channels: [DMAChannel; 7],

    /// DMA Control Register (DPCR) at 0x1F8010F0
    ///
    /// Default: 0x07654321 (every channel disabled, priorities in order)
    control: u32,

    /// DMA Interrupt Register (DICR) at 0x1F8010F4
    interrupt: u32,

    /// CPU cycles between unchopped slices
    slice_gap: u32,

    #[serde(skip)]
    irq: InterruptLine,
}

impl DMA {
    /// Channel 0: MDEC In (compression input)
    pub const CH_MDEC_IN: usize = 0;

    /// Channel 1: MDEC Out (decompression output)
    pub const CH_MDEC_OUT: usize = 1;

    /// Channel 2: GPU (graphics)
    pub const CH_GPU: usize = 2;

    /// Channel 3: CD-ROM (disc drive)
    pub const CH_CDROM: usize = 3;

    /// Channel 4: SPU (sound)
    pub const CH_SPU: usize = 4;

    /// Channel 5: PIO (expansion port)
    pub const CH_PIO: usize = 5;

    /// Channel 6: OTC (ordering table clear)
    pub const CH_OTC: usize = 6;

    /// Create a new DMA controller with default pacing
    pub fn new() -> Self {
        Self::with_timing(DmaTiming::default())
    }

    /// Create a DMA controller using `timing` for slice pacing
    pub fn with_timing(timing: DmaTiming) -> Self {
        Self {
            channels: [
                DMAChannel::new(0),
                DMAChannel::new(1),
                DMAChannel::new(2),
                DMAChannel::new(3),
                DMAChannel::new(4),
                DMAChannel::new(5),
                DMAChannel::new(6),
            ],
            control: 0x0765_4321,
            interrupt: 0,
            slice_gap: timing.slice_gap_cycles.max(1),
            irq: InterruptLine::default(),
        }
    }

    /// Get a reference to a channel
    ///
    /// # Panics
    ///
    /// Panics if `channel` is not 0-6
    pub fn channel(&self, channel: usize) -> &DMAChannel {
        &self.channels[channel]
    }

    /// Program a channel for a transfer without starting it
    ///
    /// Sets MADR, BCR and the direction and sync mode bits of CHCR, and enables
    /// the channel in DPCR. Call [`DMA::trigger`] to start it.
    ///
    /// # Errors
    ///
    /// `EmulatorError::InvalidDmaChannel` for channels above 6
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::dma::{Direction, TransferSize, DMA};
    ///
    /// let mut dma = DMA::new();
    /// dma.configure(4, Direction::FromRam, 0x1000, TransferSize::Blocks { size: 4, count: 4 })
    ///     .unwrap();
    /// assert!(dma.trigger(4));
    /// assert!(!dma.trigger(4)); // already busy
    /// ```
    pub fn configure(
        &mut self,
        channel: usize,
        direction: Direction,
        address: u32,
        size: TransferSize,
    ) -> Result<()> {
        if channel >= 7 {
            return Err(EmulatorError::InvalidDmaChannel(channel));
        }
        let (bcr, mode) = match size {
            TransferSize::Words(n) => (n as u32, 0),
            TransferSize::Blocks { size, count } => (((count as u32) << 16) | size as u32, 1),
            TransferSize::LinkedList => (0, 2),
        };

        let ch = &mut self.channels[channel];
        ch.base_address = address & 0x00FF_FFFF;
        ch.block_control = bcr;
        if !ch.is_busy() {
            let dir = match direction {
                Direction::ToRam => 0,
                Direction::FromRam => 1,
            };
            let keep = ch.channel_control & !(0x0000_0601 | CHCR_START | CHCR_TRIGGER);
            ch.channel_control = keep | (mode << 9) | dir;
        }
        self.control |= 0x8 << (channel * 4);
        log::debug!(
            "DMA{} configured: {:?} addr=0x{:08X} {:?}",
            channel,
            direction,
            address,
            size
        );
        Ok(())
    }

    /// Start the configured transfer on `channel`
    ///
    /// # Returns
    ///
    /// `false` and no change at all if the channel is already busy or does
    /// not exist
    pub fn trigger(&mut self, channel: usize) -> bool {
        let Some(ch) = self.channels.get_mut(channel) else {
            log::warn!("Trigger of nonexistent DMA{} ignored", channel);
            return false;
        };
        if ch.is_busy() {
            log::warn!("DMA{} trigger ignored: transfer already in flight", channel);
            return false;
        }
        ch.channel_control |= CHCR_START | CHCR_TRIGGER;
        ch.start();
        true
    }

    /// Whether any enabled channel has a transfer in flight
    pub fn has_pending_work(&self) -> bool {
        self.next_channel().is_some()
    }

    /// Runnable channel with the best DPCR priority
    ///
    /// The lowest priority value wins; ties go to the higher channel number.
    fn next_channel(&self) -> Option<usize> {
        (0..7)
            .filter(|&ch| self.is_channel_enabled(ch) && self.channels[ch].is_busy())
            .min_by_key(|&ch| (self.channel_priority(ch), std::cmp::Reverse(ch)))
    }

    /// Move one slice of the highest priority runnable channel
    ///
    /// Memory is accessed through `bus` at word-aligned RAM addresses; device
    /// words go through [`Bus::dma_consume`] and [`Bus::dma_produce`].
    ///
    /// # Returns
    ///
    /// `None` when no channel is runnable
    pub fn run_slice(&mut self, bus: &mut Bus) -> Option<DmaSlice> {
        let channel = self.next_channel()?;
        let progress = self.channels[channel].progress?;

        let (words, completed) = match progress {
            Progress::Blocks {
                words_left,
                blocks_left,
            } => self.block_slice(channel, words_left, blocks_left, bus),
            Progress::LinkedList => self.linked_list_slice(channel, bus),
            Progress::OrderingTable { entries } => self.ordering_table_slice(channel, entries, bus),
        };

        let gap = self.channels[channel].chop_cycles().unwrap_or(self.slice_gap);
        if completed {
            self.complete(channel);
        }
        log::trace!("DMA{} slice: {} words", channel, words);

        Some(DmaSlice {
            channel,
            words,
            gap,
            completed,
        })
    }

    fn block_slice(
        &mut self,
        channel: usize,
        words_left: u32,
        blocks_left: u32,
        bus: &mut Bus,
    ) -> (u32, bool) {
        let ch = &self.channels[channel];
        let chunk = ch.chop_words().map_or(words_left, |limit| words_left.min(limit));
        let direction = ch.direction();

        if !bus.has_dma_route(channel) {
            log::warn!("DMA{} has no device attached", channel);
        }

        for _ in 0..chunk {
            let addr = self.channels[channel].base_address & RAM_WORD_MASK;
            match direction {
                Direction::FromRam => {
                    let word = bus.read(addr, AccessWidth::Word);
                    bus.dma_consume(channel, word);
                }
                Direction::ToRam => {
                    let word = bus.dma_produce(channel);
                    bus.write(addr, AccessWidth::Word, word);
                }
            }
            self.channels[channel].step_address();
        }

        let ch = &mut self.channels[channel];
        let block_mode = ch.sync_mode() == SyncMode::Block;
        let mut words_left = words_left - chunk;
        let mut blocks_left = blocks_left;
        if words_left == 0 {
            blocks_left -= 1;
            if block_mode {
                ch.block_control = (ch.block_control & 0xFFFF) | ((blocks_left & 0xFFFF) << 16);
            }
            if blocks_left > 0 {
                words_left = match ch.block_control & 0xFFFF {
                    0 => 0x1_0000,
                    size => size,
                };
            }
        }

        if blocks_left == 0 {
            (chunk, true)
        } else {
            ch.progress = Some(Progress::Blocks {
                words_left,
                blocks_left,
            });
            (chunk, false)
        }
    }

    fn linked_list_slice(&mut self, channel: usize, bus: &mut Bus) -> (u32, bool) {
        let node = self.channels[channel].base_address & RAM_WORD_MASK;
        let header = bus.read(node, AccessWidth::Word);
        let count = header >> 24;

        for i in 0..count {
            let addr = node.wrapping_add(4 * (i + 1)) & RAM_WORD_MASK;
            let word = bus.read(addr, AccessWidth::Word);
            bus.dma_consume(channel, word);
        }

        let next = header & 0x00FF_FFFF;
        self.channels[channel].base_address = next;
        log::trace!(
            "DMA{} node 0x{:06X}: {} words, next 0x{:06X}",
            channel,
            node,
            count,
            next
        );
        (count + 1, next & END_OF_LIST != 0)
    }

    fn ordering_table_slice(&mut self, channel: usize, entries: u32, bus: &mut Bus) -> (u32, bool) {
        let mut addr = self.channels[channel].base_address & RAM_WORD_MASK;
        for i in 0..entries {
            let value = if i == entries - 1 {
                0x00FF_FFFF
            } else {
                addr.wrapping_sub(4) & RAM_WORD_MASK
            };
            bus.write(addr, AccessWidth::Word, value);
            addr = addr.wrapping_sub(4) & RAM_WORD_MASK;
        }
        self.channels[channel].base_address = addr;
        (entries, true)
    }

    /// Finish a transfer: clear busy, set the DICR flag and raise the IRQ edge
    fn complete(&mut self, channel: usize) {
        self.channels[channel].finish();
        if self.interrupt & (1 << (16 + channel)) != 0 {
            self.interrupt |= 1 << (24 + channel);
        }
        self.update_master_flag();
        log::debug!("DMA{} transfer complete", channel);
    }

    // DPCR and DICR helper methods

    /// Check if a channel is enabled in DPCR
    ///
    /// Each channel's enable bit is bit 3 of its 4-bit nibble in DPCR.
    #[inline(always)]
    fn is_channel_enabled(&self, channel: usize) -> bool {
        (self.control & (0x8 << (channel * 4))) != 0
    }

    /// Get the priority of a channel from DPCR
    #[inline(always)]
    fn channel_priority(&self, channel: usize) -> u32 {
        (self.control >> (channel * 4)) & 0x7
    }

    /// Recompute DICR bit 31 and raise the DMA interrupt on a 0→1 edge
    ///
    /// The master flag is set when the force bit (15) is set, or when master
    /// enable (23) is set and some channel has both its enable (16+N) and
    /// flag (24+N) bits set.
    fn update_master_flag(&mut self) {
        let was_set = self.interrupt & DICR_MASTER_FLAG != 0;
        let force = self.interrupt & DICR_FORCE != 0;
        let master_enable = self.interrupt & DICR_MASTER_ENABLE != 0;
        let enabled = (self.interrupt >> 16) & 0x7F;
        let flags = (self.interrupt >> 24) & 0x7F;

        let master_flag = force || (master_enable && enabled & flags != 0);
        if master_flag {
            self.interrupt |= DICR_MASTER_FLAG;
            if !was_set {
                log::trace!("DICR master flag set");
                self.irq.raise(InterruptSource::Dma);
            }
        } else {
            self.interrupt &= !DICR_MASTER_FLAG;
        }
    }

    // Register access methods

    /// Read channel MADR register
    pub fn read_madr(&self, channel: usize) -> u32 {
        self.channels[channel].base_address
    }

    /// Write channel MADR register
    pub fn write_madr(&mut self, channel: usize, value: u32) {
        self.channels[channel].base_address = value & 0x00FF_FFFF;
        log::trace!("DMA{} MADR = 0x{:08X}", channel, value);
    }

    /// Read channel BCR register
    pub fn read_bcr(&self, channel: usize) -> u32 {
        self.channels[channel].block_control
    }

    /// Write channel BCR register
    pub fn write_bcr(&mut self, channel: usize, value: u32) {
        self.channels[channel].block_control = value;
        log::trace!("DMA{} BCR = 0x{:08X}", channel, value);
    }

    /// Read channel CHCR register
    pub fn read_chcr(&self, channel: usize) -> u32 {
        self.channels[channel].channel_control
    }

    /// Write channel CHCR register
    ///
    /// While a transfer is in flight, a write clearing bit 24 aborts it without
    /// completion; any other write is ignored.
    pub fn write_chcr(&mut self, channel: usize, value: u32) {
        let ch = &mut self.channels[channel];
        let value = if channel == Self::CH_OTC {
            (value & 0x5100_0000) | CHCR_STEP_BACKWARD
        } else {
            value & CHCR_WRITABLE
        };

        if ch.is_busy() {
            if value & CHCR_START == 0 {
                ch.progress = None;
                ch.channel_control = value & !CHCR_TRIGGER;
                log::debug!("DMA{} transfer aborted", channel);
            } else {
                log::warn!(
                    "DMA{} CHCR write 0x{:08X} ignored while busy",
                    channel,
                    value
                );
            }
            return;
        }

        ch.channel_control = value;
        log::trace!("DMA{} CHCR = 0x{:08X}", channel, value);
        if ch.wants_start() {
            ch.start();
        }
    }

    /// Read DMA Control Register (DPCR)
    pub fn read_control(&self) -> u32 {
        self.control
    }

    /// Write DMA Control Register (DPCR)
    pub fn write_control(&mut self, value: u32) {
        self.control = value;
        log::trace!("DPCR = 0x{:08X}", value);
    }

    /// Read DMA Interrupt Register (DICR)
    pub fn read_interrupt(&self) -> u32 {
        self.interrupt
    }

    /// Write DMA Interrupt Register (DICR)
    ///
    /// Bits 0-5 read as zero, bits 6-23 are writable and the flags in bits
    /// 24-30 are cleared by writing 1.
    pub fn write_interrupt(&mut self, value: u32) {
        let flags = self.interrupt & 0x7F00_0000 & !(value & 0x7F00_0000);
        let master = self.interrupt & DICR_MASTER_FLAG;
        self.interrupt = master | flags | (value & 0x00FF_FFC0);
        self.update_master_flag();
        log::trace!("DICR = 0x{:08X}", self.interrupt);
    }

    /// Return to the power-on state, keeping pacing and interrupt wiring
    pub fn reset(&mut self) {
        let irq = self.irq.clone();
        let slice_gap = self.slice_gap;
        *self = Self::new();
        self.irq = irq;
        self.slice_gap = slice_gap;
    }
}

impl Default for DMA {
    fn default() -> Self {
        Self::new()
    }
}

impl IODevice for DMA {
    fn name(&self) -> &str {
        "DMA"
    }

    fn handle_read(&mut self, offset: u32, width: AccessWidth) -> u32 {
        let register = match offset & !3 {
            0x70 => self.control,
            0x74 => self.interrupt,
            reg if reg < 0x70 => {
                let channel = (reg >> 4) as usize;
                match reg & 0x0C {
                    0x00 => self.read_madr(channel),
                    0x04 => self.read_bcr(channel),
                    0x08 => self.read_chcr(channel),
                    _ => 0,
                }
            }
            _ => 0,
        };
        read_lane(register, offset, width)
    }

    fn handle_write(&mut self, offset: u32, width: AccessWidth, value: u32) {
        match offset & !3 {
            0x70 => {
                let merged = write_lane(self.control, offset, width, value);
                self.write_control(merged);
            }
            0x74 => {
                // Narrow writes must not clear flags on lanes they do not touch
                let current = self.interrupt & 0x00FF_FFFF;
                let merged = write_lane(current, offset, width, value);
                self.write_interrupt(merged);
            }
            reg if reg < 0x70 => {
                let channel = (reg >> 4) as usize;
                match reg & 0x0C {
                    0x00 => {
                        let merged = write_lane(self.read_madr(channel), offset, width, value);
                        self.write_madr(channel, merged);
                    }
                    0x04 => {
                        let merged = write_lane(self.read_bcr(channel), offset, width, value);
                        self.write_bcr(channel, merged);
                    }
                    0x08 => {
                        let merged = write_lane(self.read_chcr(channel), offset, width, value);
                        self.write_chcr(channel, merged);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn connect(&mut self, link: DeviceLink) {
        self.irq = link.irq;
    }

    fn reset(&mut self) {
        DMA::reset(self);
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        encode_state(self)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        let mut state: DMA = decode_state(data)?;
        state.irq = self.irq.clone();
        *self = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::interrupt::InterruptController;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Device that records consumed words and produces a counting sequence
    #[derive(Default)]
    struct Recorder {
        consumed: Vec<u32>,
        next: u32,
    }

    impl IODevice for Recorder {
        fn name(&self) -> &str {
            "Recorder"
        }

        fn handle_read(&mut self, _offset: u32, _width: AccessWidth) -> u32 {
            0
        }

        fn handle_write(&mut self, _offset: u32, _width: AccessWidth, _value: u32) {}

        fn consume_dma_word(&mut self, _channel: usize, word: u32) {
            self.consumed.push(word);
        }

        fn produce_dma_word(&mut self, _channel: usize) -> u32 {
            self.next += 1;
            0xA000_0000 | self.next
        }
    }

    /// Helper function to create test DMA controller
    fn create_test_dma() -> DMA {
        DMA::new()
    }

    /// DMA wired to an interrupt controller, plus a bus with a recorder on `channel`
    fn create_test_setup(
        channel: usize,
    ) -> (
        DMA,
        Bus,
        Rc<RefCell<Recorder>>,
        Rc<RefCell<InterruptController>>,
    ) {
        let controller = Rc::new(RefCell::new(InterruptController::new()));
        let mut dma = DMA::new();
        dma.connect(DeviceLink {
            irq: InterruptLine::new(controller.clone()),
            ..DeviceLink::default()
        });

        let mut bus = Bus::new();
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let index = bus
            .register_device(0x1F80_1C00, 0x400, recorder.clone())
            .unwrap();
        bus.route_dma(channel, index).unwrap();
        (dma, bus, recorder, controller)
    }

    fn run_to_completion(dma: &mut DMA, bus: &mut Bus) -> Vec<DmaSlice> {
        let mut slices = Vec::new();
        while let Some(slice) = dma.run_slice(bus) {
            slices.push(slice);
            assert!(slices.len() < 10_000, "transfer never finished");
        }
        slices
    }

    // ========== Initialization Tests ==========

    #[test]
    fn test_dma_initialization() {
        let dma = create_test_dma();
        assert_eq!(dma.read_control(), 0x07654321);
        assert_eq!(dma.read_interrupt(), 0);
        for ch in 0..7 {
            assert!(!dma.channel(ch).is_busy(), "Channel {} should be idle", ch);
            assert_eq!(dma.read_madr(ch), 0);
            assert_eq!(dma.read_bcr(ch), 0);
        }
        assert_eq!(dma.read_chcr(DMA::CH_OTC), 0x0000_0002);
        assert!(!dma.has_pending_work());
    }

    // ========== Register Tests ==========

    #[test]
    fn test_madr_address_masking() {
        let mut dma = create_test_dma();
        dma.write_madr(DMA::CH_GPU, 0xFFFF_FFFF);
        assert_eq!(dma.read_madr(DMA::CH_GPU), 0x00FF_FFFF);
    }

    #[test]
    fn test_chcr_fields() {
        let mut dma = create_test_dma();
        dma.write_chcr(DMA::CH_GPU, 0x0000_0401);
        let ch = dma.channel(DMA::CH_GPU);
        assert_eq!(ch.direction(), Direction::FromRam);
        assert_eq!(ch.sync_mode(), SyncMode::LinkedList);
        assert!(!ch.is_busy());

        dma.write_chcr(DMA::CH_GPU, 0x0000_0200);
        assert_eq!(dma.channel(DMA::CH_GPU).sync_mode(), SyncMode::Block);
        assert_eq!(dma.channel(DMA::CH_GPU).direction(), Direction::ToRam);
    }

    #[test]
    fn test_manual_mode_needs_trigger_bit() {
        let mut dma = create_test_dma();
        dma.write_bcr(DMA::CH_SPU, 4);
        dma.write_chcr(DMA::CH_SPU, 0x0100_0001);
        assert!(!dma.channel(DMA::CH_SPU).is_busy());
        dma.write_chcr(DMA::CH_SPU, 0x1100_0001);
        assert!(dma.channel(DMA::CH_SPU).is_busy());
    }

    #[test]
    fn test_register_access_through_io_device() {
        let mut dma = create_test_dma();
        dma.handle_write(0x20, AccessWidth::Word, 0x0012_3454);
        dma.handle_write(0x24, AccessWidth::Half, 0x0010);
        dma.handle_write(0x26, AccessWidth::Half, 0x0002);
        assert_eq!(dma.read_madr(DMA::CH_GPU), 0x0012_3454);
        assert_eq!(dma.handle_read(0x24, AccessWidth::Word), 0x0002_0010);
        assert_eq!(dma.handle_read(0x70, AccessWidth::Word), 0x0765_4321);
        assert_eq!(dma.handle_read(0x72, AccessWidth::Half), 0x0765);
    }

    // ========== DPCR Tests ==========

    #[test]
    fn test_disabled_channel_does_not_run() {
        let (mut dma, mut bus, recorder, _) = create_test_setup(DMA::CH_SPU);
        dma.write_bcr(DMA::CH_SPU, 2);
        dma.write_chcr(DMA::CH_SPU, 0x1100_0001);
        assert!(dma.channel(DMA::CH_SPU).is_busy());
        assert!(!dma.has_pending_work());
        assert!(dma.run_slice(&mut bus).is_none());

        dma.write_control(0x0765_4321 | (0x8 << 16));
        assert!(dma.has_pending_work());
        assert_eq!(dma.run_slice(&mut bus).unwrap().words, 2);
        assert_eq!(recorder.borrow().consumed.len(), 2);
    }

    #[test]
    fn test_priority_lowest_value_wins() {
        let mut dma = create_test_dma();
        // Channel 2 priority 1, channels 3 and 4 priority 0
        dma.write_control(0x0008_8900);
        for ch in [2, 3, 4] {
            dma.write_bcr(ch, 1);
            dma.write_chcr(ch, 0x1100_0000);
        }
        assert_eq!(dma.next_channel(), Some(4));
    }

    // ========== DICR Tests ==========

    #[test]
    fn test_dicr_reserved_and_writable_bits() {
        let mut dma = create_test_dma();
        dma.write_interrupt(0x00FF_FFFF);
        assert_eq!(dma.read_interrupt() & 0x3F, 0);
        assert_eq!(dma.read_interrupt() & 0x00FF_FFC0, 0x00FF_FFC0);
    }

    #[test]
    fn test_dicr_force_bit_raises_once() {
        let (mut dma, _, _, controller) = create_test_setup(DMA::CH_SPU);
        dma.write_interrupt(DICR_FORCE);
        assert_ne!(dma.read_interrupt() & DICR_MASTER_FLAG, 0);
        assert!(controller.borrow().is_raised(InterruptSource::Dma));

        controller.borrow_mut().acknowledge(InterruptSource::Dma.bit());
        dma.write_interrupt(DICR_FORCE);
        assert!(!controller.borrow().is_raised(InterruptSource::Dma));
    }

    #[test]
    fn test_dicr_write_1_to_clear_flags() {
        let (mut dma, mut bus, _, _) = create_test_setup(DMA::CH_SPU);
        dma.write_interrupt(DICR_MASTER_ENABLE | (1 << (16 + DMA::CH_SPU)));
        dma.configure(DMA::CH_SPU, Direction::FromRam, 0, TransferSize::Words(1))
            .unwrap();
        dma.trigger(DMA::CH_SPU);
        run_to_completion(&mut dma, &mut bus);
        assert_ne!(dma.read_interrupt() & (1 << 28), 0);
        assert_ne!(dma.read_interrupt() & DICR_MASTER_FLAG, 0);

        dma.write_interrupt(DICR_MASTER_ENABLE | (1 << (16 + DMA::CH_SPU)) | (1 << 28));
        assert_eq!(dma.read_interrupt() & (1 << 28), 0);
        assert_eq!(dma.read_interrupt() & DICR_MASTER_FLAG, 0);
    }

    #[test]
    fn test_completion_without_enable_sets_no_flag() {
        let (mut dma, mut bus, _, controller) = create_test_setup(DMA::CH_SPU);
        dma.configure(DMA::CH_SPU, Direction::FromRam, 0, TransferSize::Words(1))
            .unwrap();
        dma.trigger(DMA::CH_SPU);
        run_to_completion(&mut dma, &mut bus);
        assert_eq!(dma.read_interrupt(), 0);
        assert!(!controller.borrow().is_raised(InterruptSource::Dma));
    }

    // ========== Block Mode Tests ==========

    #[test]
    fn test_block_mode_one_block_per_slice() {
        let (mut dma, mut bus, recorder, controller) = create_test_setup(DMA::CH_SPU);
        for i in 0..16u32 {
            bus.write32(0x1000 + i * 4, 0x100 + i);
        }
        dma.write_interrupt(DICR_MASTER_ENABLE | (1 << (16 + DMA::CH_SPU)));
        dma.configure(
            DMA::CH_SPU,
            Direction::FromRam,
            0x1000,
            TransferSize::Blocks { size: 4, count: 4 },
        )
        .unwrap();
        assert!(dma.trigger(DMA::CH_SPU));

        let first = dma.run_slice(&mut bus).unwrap();
        assert_eq!(first.words, 4);
        assert!(!first.completed);
        assert_eq!(dma.read_bcr(DMA::CH_SPU) >> 16, 3);
        assert_eq!(dma.read_madr(DMA::CH_SPU), 0x1010);

        let rest = run_to_completion(&mut dma, &mut bus);
        assert_eq!(rest.len(), 3);
        assert!(rest[2].completed);

        let expected: Vec<u32> = (0..16).map(|i| 0x100 + i).collect();
        assert_eq!(recorder.borrow().consumed, expected);
        assert!(controller.borrow().is_raised(InterruptSource::Dma));
        assert_eq!(dma.read_chcr(DMA::CH_SPU) & (CHCR_START | CHCR_TRIGGER), 0);
    }

    #[test]
    fn test_device_to_ram_transfer() {
        let (mut dma, mut bus, _, _) = create_test_setup(DMA::CH_CDROM);
        dma.configure(
            DMA::CH_CDROM,
            Direction::ToRam,
            0x2000,
            TransferSize::Blocks { size: 2, count: 2 },
        )
        .unwrap();
        dma.trigger(DMA::CH_CDROM);
        run_to_completion(&mut dma, &mut bus);
        assert_eq!(bus.read32(0x2000), 0xA000_0001);
        assert_eq!(bus.read32(0x200C), 0xA000_0004);
    }

    #[test]
    fn test_backward_step() {
        let (mut dma, mut bus, recorder, _) = create_test_setup(DMA::CH_SPU);
        bus.write32(0x100, 1);
        bus.write32(0x0FC, 2);
        dma.write_control(0x0765_4321 | (0x8 << 16));
        dma.write_madr(DMA::CH_SPU, 0x100);
        dma.write_bcr(DMA::CH_SPU, 2);
        dma.write_chcr(DMA::CH_SPU, 0x1100_0003);
        run_to_completion(&mut dma, &mut bus);
        assert_eq!(recorder.borrow().consumed, vec![1, 2]);
    }

    #[test]
    fn test_chopping_limits_slice_and_sets_gap() {
        let (mut dma, mut bus, recorder, _) = create_test_setup(DMA::CH_SPU);
        dma.write_control(0x0765_4321 | (0x8 << 16));
        dma.write_bcr(DMA::CH_SPU, 10);
        // Chopping, 2^2 words per slice, 2^5 cycle CPU window
        dma.write_chcr(DMA::CH_SPU, 0x1152_0101);
        let slices = run_to_completion(&mut dma, &mut bus);
        let words: Vec<u32> = slices.iter().map(|s| s.words).collect();
        assert_eq!(words, vec![4, 4, 2]);
        assert!(slices.iter().all(|s| s.gap == 32));
        assert_eq!(recorder.borrow().consumed.len(), 10);
    }

    // ========== Busy / Abort Tests ==========

    #[test]
    fn test_trigger_while_busy_is_noop() {
        let (mut dma, mut bus, _, _) = create_test_setup(DMA::CH_SPU);
        dma.configure(
            DMA::CH_SPU,
            Direction::FromRam,
            0x1000,
            TransferSize::Blocks { size: 4, count: 2 },
        )
        .unwrap();
        assert!(dma.trigger(DMA::CH_SPU));
        dma.run_slice(&mut bus);
        let madr = dma.read_madr(DMA::CH_SPU);
        let bcr = dma.read_bcr(DMA::CH_SPU);

        assert!(!dma.trigger(DMA::CH_SPU));
        dma.write_chcr(DMA::CH_SPU, 0x0100_0201);
        assert_eq!(dma.read_madr(DMA::CH_SPU), madr);
        assert_eq!(dma.read_bcr(DMA::CH_SPU), bcr);
        assert_eq!(run_to_completion(&mut dma, &mut bus).len(), 1);
    }

    #[test]
    fn test_abort_clears_busy_without_completion() {
        let (mut dma, mut bus, _, controller) = create_test_setup(DMA::CH_SPU);
        dma.write_interrupt(DICR_MASTER_ENABLE | (1 << (16 + DMA::CH_SPU)));
        dma.configure(
            DMA::CH_SPU,
            Direction::FromRam,
            0,
            TransferSize::Blocks { size: 1, count: 5 },
        )
        .unwrap();
        dma.trigger(DMA::CH_SPU);
        dma.run_slice(&mut bus);
        dma.write_chcr(DMA::CH_SPU, 0x0000_0201);
        assert!(!dma.channel(DMA::CH_SPU).is_busy());
        assert!(dma.run_slice(&mut bus).is_none());
        assert!(!controller.borrow().is_raised(InterruptSource::Dma));
    }

    #[test]
    fn test_configure_invalid_channel() {
        let mut dma = create_test_dma();
        assert!(matches!(
            dma.configure(7, Direction::FromRam, 0, TransferSize::Words(1)),
            Err(EmulatorError::InvalidDmaChannel(7))
        ));
        assert!(!dma.trigger(9));
    }

    // ========== Linked List Tests ==========

    #[test]
    fn test_linked_list_one_node_per_slice() {
        let (mut dma, mut bus, recorder, _) = create_test_setup(DMA::CH_GPU);
        // Node at 0x100: 2 words, next 0x200
        bus.write32(0x100, 0x0200_0200);
        bus.write32(0x104, 0xAAAA_0001);
        bus.write32(0x108, 0xAAAA_0002);
        // Node at 0x200: 1 word, end of list
        bus.write32(0x200, 0x01FF_FFFF);
        bus.write32(0x204, 0xBBBB_0001);

        dma.configure(DMA::CH_GPU, Direction::FromRam, 0x100, TransferSize::LinkedList)
            .unwrap();
        dma.trigger(DMA::CH_GPU);

        let slices = run_to_completion(&mut dma, &mut bus);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].words, 3);
        assert_eq!(slices[1].words, 2);
        assert!(slices[1].completed);
        assert_eq!(
            recorder.borrow().consumed,
            vec![0xAAAA_0001, 0xAAAA_0002, 0xBBBB_0001]
        );
        assert_eq!(dma.read_madr(DMA::CH_GPU), 0x00FF_FFFF);
    }

    #[test]
    fn test_linked_list_empty_terminal_node() {
        let (mut dma, mut bus, recorder, _) = create_test_setup(DMA::CH_GPU);
        bus.write32(0x300, 0x0080_0000);
        dma.configure(DMA::CH_GPU, Direction::FromRam, 0x300, TransferSize::LinkedList)
            .unwrap();
        dma.trigger(DMA::CH_GPU);
        let slices = run_to_completion(&mut dma, &mut bus);
        assert_eq!(slices.len(), 1);
        assert!(recorder.borrow().consumed.is_empty());
    }

    // ========== OTC Tests ==========

    #[test]
    fn test_ordering_table_clear() {
        let mut dma = create_test_dma();
        let mut bus = Bus::new();
        dma.write_control(0x0800_0000);
        dma.write_madr(DMA::CH_OTC, 0x100C);
        dma.write_bcr(DMA::CH_OTC, 4);
        dma.write_chcr(DMA::CH_OTC, 0x1100_0000);
        assert_eq!(dma.read_chcr(DMA::CH_OTC) & 2, 2);

        let slices = run_to_completion(&mut dma, &mut bus);
        assert_eq!(slices.len(), 1);
        assert_eq!(bus.read32(0x100C), 0x1008);
        assert_eq!(bus.read32(0x1008), 0x1004);
        assert_eq!(bus.read32(0x1004), 0x1000);
        assert_eq!(bus.read32(0x1000), 0x00FF_FFFF);
    }

    // ========== State Tests ==========

    #[test]
    fn test_state_roundtrip_mid_transfer() {
        let (mut dma, mut bus, recorder, _) = create_test_setup(DMA::CH_SPU);
        dma.configure(
            DMA::CH_SPU,
            Direction::FromRam,
            0,
            TransferSize::Blocks { size: 2, count: 3 },
        )
        .unwrap();
        dma.trigger(DMA::CH_SPU);
        dma.run_slice(&mut bus);
        let blob = dma.save_state().unwrap();

        run_to_completion(&mut dma, &mut bus);
        assert!(!dma.channel(DMA::CH_SPU).is_busy());

        dma.load_state(&blob).unwrap();
        assert!(dma.channel(DMA::CH_SPU).is_busy());
        assert_eq!(run_to_completion(&mut dma, &mut bus).len(), 2);
        assert_eq!(recorder.borrow().consumed.len(), 10);
    }

    #[test]
    fn test_reset_keeps_gap() {
        let mut dma = DMA::with_timing(DmaTiming {
            slice_gap_cycles: 64,
        });
        dma.write_control(0);
        dma.reset();
        assert_eq!(dma.read_control(), 0x0765_4321);
        assert_eq!(dma.slice_gap, 64);
    }
}
