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

//! GPU port
//!
//! This module implements the bus-facing half of the CXD8561 graphics unit.
//! Drawing is left to the host: every GP0 word is captured in a bounded queue
//! that a renderer drains with [`GPU::drain_commands`]. The port itself owns
//! what the rest of the machine can observe:
//! - GPUSTAT and GPUREAD at 0x1F801814 / 0x1F801810
//! - GP0 packet framing (environment commands, IRQ, image transfer lengths)
//! - GP1 control and display configuration
//! - DMA channel 2 (words in through GP0, words out through GPUREAD)
//! - The scanline clock: hblank and vblank pulses to the timers and the
//!   VBlank interrupt
//!
//! # Video Timing
//!
//! | Standard | Cycles/line | Lines/frame | VBlank from line |
//! |----------|-------------|-------------|------------------|
//! | NTSC     | 2146        | 263         | 240              |
//! | PAL      | 2157        | 314         | 256              |
//!
//! Horizontal blank starts part-way through each line and ends with the line.
//! The port reports the distance to its next pulse through
//! [`IODevice::cycles_until_event`], so every pulse lands on its exact cycle.
//!
//! # References
//!
//! - [PSX-SPX: GPU](http://problemkaputt.de/psx-spx.htm#gpu)
//! - [PSX-SPX: GPU Timings](http://problemkaputt.de/psx-spx.htm#gputimings)

use std::collections::VecDeque;

use crate::core::config::{SessionConfig, VideoStandard};
use crate::core::error::Result;
use crate::core::interrupt::{InterruptLine, InterruptSource};
use crate::core::memory::{decode_state, encode_state, read_lane, AccessWidth, DeviceLink, IODevice};
use crate::core::timer::TimerSync;
use serde::{Deserialize, Serialize};

// Module declarations
mod gp0;
mod gp1;
mod registers;

// Public re-exports
pub use gp0::DrawingEnvironment;
pub use registers::*;

use gp0::Packet;

/// GPU register block base (GP0/GPUREAD)
pub const GPU_BASE: u32 = 0x1F80_1810;
/// GPU register block size
pub const GPU_SIZE: u32 = 8;

/// Default GP0 capture queue capacity in words
const DEFAULT_FIFO_CAPACITY: usize = 4096;

/// Position of the beam within the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct VideoClock {
    standard: VideoStandard,
    scanline: u16,
    line_cycle: u32,
    frames: u64,
    in_hblank: bool,
    in_vblank: bool,
}

impl VideoClock {
    fn new(standard: VideoStandard) -> Self {
        Self {
            standard,
            scanline: 0,
            line_cycle: 0,
            frames: 0,
            in_hblank: false,
            in_vblank: false,
        }
    }
}

/// GPU port state
///
/// # Examples
///
/// ```
/// use psrx_core::core::gpu::GPU;
///
/// let mut gpu = GPU::new();
/// gpu.write_gp0(0xE100_0000);
/// gpu.write_gp0(0x0000_0000);
///
/// assert_eq!(gpu.drain_commands(), vec![0xE100_0000, 0x0000_0000]);
/// assert_eq!(gpu.pending_words(), 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GPU {
    /// Stored GPUSTAT fields
    pub(crate) status: GPUStatus,

    /// GP1(05)-GP1(07) display configuration
    pub(crate) display: DisplayArea,

    /// GP0(E2)-GP0(E5) parameters
    pub(crate) environment: DrawingEnvironment,

    /// Captured GP0 words not yet drained by the renderer
    pub(crate) fifo: VecDeque<u32>,

    /// Maximum number of captured words kept
    fifo_capacity: usize,

    /// Words discarded because the renderer fell behind
    dropped_words: u64,

    /// GP0 packet framing state
    pub(crate) packet: Packet,

    /// GPUREAD latch
    pub(crate) gpuread: u32,

    /// Words left in a VRAM-to-CPU transfer
    pub(crate) vram_read_words: u32,

    /// Standard selected at power-on
    power_on_standard: VideoStandard,

    /// Scanline clock
    video: VideoClock,

    #[serde(skip)]
    irq: InterruptLine,

    #[serde(skip)]
    timers: TimerSync,
}

impl GPU {
    /// Create an NTSC port with the default capture capacity
    ///
    /// # Returns
    ///
    /// A port with the display disabled and the beam at line 0
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FIFO_CAPACITY, VideoStandard::Ntsc)
    }

    /// Create a port from the session configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Supplies the capture capacity and the power-on video standard
    pub fn with_config(config: &SessionConfig) -> Self {
        Self::with_capacity(config.gpu_fifo_capacity, config.video)
    }

    fn with_capacity(fifo_capacity: usize, standard: VideoStandard) -> Self {
        let status = GPUStatus {
            video_mode: standard == VideoStandard::Pal,
            ..GPUStatus::default()
        };
        Self {
            status,
            display: DisplayArea::default(),
            environment: DrawingEnvironment::default(),
            fifo: VecDeque::with_capacity(fifo_capacity.min(DEFAULT_FIFO_CAPACITY)),
            fifo_capacity: fifo_capacity.max(1),
            dropped_words: 0,
            packet: Packet::Idle,
            gpuread: 0,
            vram_read_words: 0,
            power_on_standard: standard,
            video: VideoClock::new(standard),
            irq: InterruptLine::default(),
            timers: TimerSync::default(),
        }
    }

    /// Get current GPU status register value
    ///
    /// Packs the stored fields together with the live flags:
    /// - Bit 25: DMA request, as selected by GP1(04)
    /// - Bit 26/28: always ready for commands and DMA blocks
    /// - Bit 27: ready to send VRAM to CPU
    /// - Bit 31: odd scanline outside vertical blank
    pub fn status(&self) -> u32 {
        let mut status = self.status.bits();
        let vram_ready = self.vram_read_words > 0;

        let dma_request = match self.status.dma_direction {
            0 => false,
            1 => self.fifo.len() < self.fifo_capacity,
            2 => true,
            _ => vram_ready,
        };

        status |= (dma_request as u32) << 25;
        status |= 1 << 26;
        status |= (vram_ready as u32) << 27;
        status |= 1 << 28;

        if !self.video.in_vblank && self.video.scanline & 1 != 0 {
            status |= 1 << 31;
        }

        status
    }

    /// Stored status fields
    pub fn status_register(&self) -> &GPUStatus {
        &self.status
    }

    /// Display area configuration from GP1(05)-GP1(07)
    pub fn display_area(&self) -> DisplayArea {
        self.display
    }

    /// Drawing environment from GP0(E2)-GP0(E5)
    pub fn environment(&self) -> &DrawingEnvironment {
        &self.environment
    }

    /// Video standard currently driving the scanline clock
    pub fn video_standard(&self) -> VideoStandard {
        self.video.standard
    }

    /// Current scanline (0-262 NTSC, 0-313 PAL)
    pub fn scanline(&self) -> u16 {
        self.video.scanline
    }

    /// Whether the beam is in vertical blank
    pub fn is_in_vblank(&self) -> bool {
        self.video.in_vblank
    }

    /// Whether the beam is in horizontal blank
    pub fn is_in_hblank(&self) -> bool {
        self.video.in_hblank
    }

    /// Number of vertical blanks started since power-on
    pub fn frame_count(&self) -> u64 {
        self.video.frames
    }

    /// Write a GP0 word (drawing commands and VRAM transfers)
    ///
    /// The word is captured for the renderer and then framed. When the queue
    /// is full the oldest captured word is discarded.
    ///
    /// # Arguments
    ///
    /// * `value` - 32-bit GP0 command or parameter word
    pub fn write_gp0(&mut self, value: u32) {
        if self.fifo.len() >= self.fifo_capacity {
            self.fifo.pop_front();
            self.dropped_words += 1;
            if self.dropped_words == 1 {
                log::warn!(
                    "GP0 capture queue full ({} words), dropping oldest",
                    self.fifo_capacity
                );
            }
        }
        self.fifo.push_back(value);

        log::trace!("GP0 write 0x{:08X}", value);
        self.frame_gp0_word(value);
    }

    /// Write a GP1 control word
    pub fn write_gp1(&mut self, value: u32) {
        let command = (value >> 24) & 0x3F;

        match command {
            0x00 => self.gp1_reset_gpu(),
            0x01 => self.gp1_reset_command_buffer(),
            0x02 => self.gp1_acknowledge_interrupt(),
            0x03 => self.gp1_display_enable(value),
            0x04 => self.gp1_dma_direction(value),
            0x05 => self.gp1_display_area_start(value),
            0x06 => self.gp1_horizontal_display_range(value),
            0x07 => self.gp1_vertical_display_range(value),
            0x08 => self.gp1_display_mode(value),
            0x10..=0x1F => self.gp1_get_gpu_info(value),
            _ => {
                log::warn!("Unknown GP1 command: 0x{:02X}", command);
            }
        }
    }

    /// Read the GPUREAD register (0x1F801810)
    ///
    /// During a VRAM-to-CPU transfer each read consumes one word. No VRAM is
    /// kept behind the port, so transfer words read as zero. Otherwise the
    /// latch set by GP1(10h) is returned.
    pub fn read_gpuread(&mut self) -> u32 {
        if self.vram_read_words > 0 {
            self.vram_read_words -= 1;
            self.gpuread = 0;
            if self.vram_read_words == 0 {
                log::debug!("VRAM→CPU transfer complete");
            }
        }
        self.gpuread
    }

    /// Take every captured GP0 word, oldest first
    pub fn drain_commands(&mut self) -> Vec<u32> {
        self.fifo.drain(..).collect()
    }

    /// Number of captured words waiting for the renderer
    pub fn pending_words(&self) -> usize {
        self.fifo.len()
    }

    /// Number of captured words discarded because the queue was full
    pub fn dropped_words(&self) -> u64 {
        self.dropped_words
    }

    /// Scanline timing of the current standard
    fn timing(&self) -> VideoTiming {
        VideoTiming::for_standard(self.video.standard)
    }

    /// Follow the video mode bit in the status register
    ///
    /// The beam is clamped into the new frame geometry; its position within
    /// the line and frame is otherwise kept.
    pub(crate) fn apply_video_standard(&mut self) {
        let standard = self.status.video_standard();
        if standard == self.video.standard {
            return;
        }

        self.video.standard = standard;
        let timing = self.timing();
        if self.video.line_cycle >= timing.cycles_per_line {
            self.video.line_cycle = timing.cycles_per_line - 1;
        }
        if self.video.scanline >= timing.lines_per_frame {
            self.video.scanline = timing.lines_per_frame - 1;
        }
        log::info!("GPU video standard: {:?}", standard);
    }

    /// Send the dot clock divider of the current resolution to the timers
    pub(crate) fn apply_dot_clock(&self) {
        self.timers
            .set_dot_clock_divider(self.status.horizontal_res().dot_clock_divider());
    }

    /// CPU cycles until the next hblank or line-end pulse
    fn cycles_to_pulse(&self) -> u32 {
        let timing = self.timing();
        if !self.video.in_hblank && self.video.line_cycle < timing.hblank_start {
            timing.hblank_start - self.video.line_cycle
        } else {
            timing.cycles_per_line.saturating_sub(self.video.line_cycle)
        }
    }

    /// Emit every pulse due at the current beam position
    fn fire_pulses(&mut self) {
        let timing = self.timing();

        if !self.video.in_hblank && self.video.line_cycle >= timing.hblank_start {
            self.video.in_hblank = true;
            self.timers.hblank_begin();
        }

        if self.video.line_cycle < timing.cycles_per_line {
            return;
        }

        self.video.line_cycle -= timing.cycles_per_line;
        self.video.in_hblank = false;
        self.timers.hblank_end();
        self.video.scanline += 1;

        if self.video.scanline >= timing.lines_per_frame {
            self.video.scanline = 0;
            if self.video.in_vblank {
                self.video.in_vblank = false;
                self.timers.vblank_end();
            }
        } else if self.video.scanline == timing.vblank_start && !self.video.in_vblank {
            self.video.in_vblank = true;
            self.video.frames += 1;
            self.timers.vblank_begin();
            self.irq.raise(InterruptSource::VBlank);
            log::trace!("GPU: VBlank (frame {})", self.video.frames);
        }
    }

    /// Move the beam forward by `cycles` CPU cycles
    fn advance_video(&mut self, mut cycles: u32) {
        while cycles > 0 {
            let step = cycles.min(self.cycles_to_pulse());
            self.video.line_cycle += step;
            cycles -= step;
            self.fire_pulses();
        }
    }
}

impl Default for GPU {
    fn default() -> Self {
        Self::new()
    }
}

impl IODevice for GPU {
    fn name(&self) -> &str {
        "GPU"
    }

    fn handle_read(&mut self, offset: u32, width: AccessWidth) -> u32 {
        match offset & !3 {
            0x00 => {
                let value = self.read_gpuread();
                read_lane(value, offset, width)
            }
            _ => read_lane(self.status(), offset, width),
        }
    }

    fn handle_write(&mut self, offset: u32, width: AccessWidth, value: u32) {
        if width != AccessWidth::Word {
            log::warn!(
                "GPU {:?} write at offset 0x{:02X} = 0x{:08X}",
                width,
                offset,
                value
            );
        }
        match offset & !3 {
            0x00 => self.write_gp0(value),
            _ => self.write_gp1(value),
        }
    }

    fn consume_dma_word(&mut self, _channel: usize, word: u32) {
        self.write_gp0(word);
    }

    fn produce_dma_word(&mut self, _channel: usize) -> u32 {
        self.read_gpuread()
    }

    fn connect(&mut self, link: DeviceLink) {
        self.irq = link.irq;
        self.timers = link.timers;
        self.apply_dot_clock();
    }

    fn advance(&mut self, cycles: u32) {
        self.advance_video(cycles);
    }

    fn cycles_until_event(&self) -> Option<u32> {
        Some(self.cycles_to_pulse().max(1))
    }

    fn reset(&mut self) {
        let irq = self.irq.clone();
        let timers = self.timers.clone();
        *self = Self::with_capacity(self.fifo_capacity, self.power_on_standard);
        self.irq = irq;
        self.timers = timers;
        self.apply_dot_clock();
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        encode_state(self)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        let mut state: GPU = decode_state(data)?;
        state.irq = self.irq.clone();
        state.timers = self.timers.clone();
        *self = state;
        self.apply_dot_clock();
        Ok(())
    }
}
