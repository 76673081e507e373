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

//! GP1 control commands
//!
//! Reset, command buffer, interrupt, DMA direction and info requests.

use super::super::gp0::{DrawingEnvironment, Packet};
use super::super::{DisplayArea, GPUStatus, GPU};

impl GPU {
    /// GP1(00h) - Reset GPU
    ///
    /// Clears the command buffer, acknowledges the interrupt, disables the
    /// display and returns every GP1/E1-E6 setting to zero. The scanline
    /// clock keeps running, but in NTSC mode.
    pub(crate) fn gp1_reset_gpu(&mut self) {
        self.gp1_reset_command_buffer();
        self.status = GPUStatus::default();
        self.display = DisplayArea::default();
        self.environment = DrawingEnvironment::default();
        self.apply_video_standard();
        self.apply_dot_clock();

        log::debug!("GPU reset");
    }

    /// GP1(01h) - Reset Command Buffer
    ///
    /// Drops captured words the renderer has not drained yet and abandons any
    /// packet or image transfer in progress.
    pub(crate) fn gp1_reset_command_buffer(&mut self) {
        self.fifo.clear();
        self.packet = Packet::Idle;
        self.vram_read_words = 0;

        log::debug!("Command buffer reset");
    }

    /// GP1(02h) - Acknowledge GPU Interrupt
    pub(crate) fn gp1_acknowledge_interrupt(&mut self) {
        self.status.interrupt_request = false;
        log::debug!("GPU interrupt acknowledged");
    }

    /// GP1(04h) - DMA Direction / Data Request
    ///
    /// ```text
    ///   0=Off, 1=FIFO, 2=CPUtoGP0, 3=GPUREADtoCPU
    /// ```
    pub(crate) fn gp1_dma_direction(&mut self, value: u32) {
        let direction = (value & 3) as u8;
        self.status.dma_direction = direction;

        match direction {
            0 => log::debug!("DMA off"),
            1 => log::debug!("DMA FIFO"),
            2 => log::debug!("DMA CPU→GP0"),
            _ => log::debug!("DMA GPUREAD→CPU"),
        }
    }

    /// GP1(10h) - Get GPU Info
    ///
    /// Latches the requested value into GPUREAD. Unknown indices leave the
    /// latch unchanged.
    ///
    /// ```text
    ///   0x02 - Texture window
    ///   0x03 - Draw area top left
    ///   0x04 - Draw area bottom right
    ///   0x05 - Draw offset
    ///   0x07 - GPU version (2)
    /// ```
    pub(crate) fn gp1_get_gpu_info(&mut self, value: u32) {
        let info_type = value & 0x0F;

        let info = match info_type {
            0x02 => Some(self.environment.texture_window),
            0x03 => Some(self.environment.area_top_left),
            0x04 => Some(self.environment.area_bottom_right),
            0x05 => Some(self.environment.offset),
            0x07 => Some(2),
            _ => None,
        };

        if let Some(info) = info {
            self.gpuread = info;
        }
        log::debug!("GPU info request: type {} -> 0x{:08X}", info_type, self.gpuread);
    }
}
