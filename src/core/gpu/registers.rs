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

//! GPU register definitions
//!
//! Status register fields and display configuration written through GP1,
//! plus the scanline timing of each video standard.

use crate::core::config::VideoStandard;
use serde::{Deserialize, Serialize};

/// Horizontal display resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HorizontalRes {
    /// 256 pixels
    R256,
    /// 320 pixels
    #[default]
    R320,
    /// 368 pixels
    R368,
    /// 512 pixels
    R512,
    /// 640 pixels
    R640,
}

impl HorizontalRes {
    /// Decode GP1(08) bits 0-1 and 6
    pub fn from_bits(hr1: u8, hr2: bool) -> Self {
        if hr2 {
            return HorizontalRes::R368;
        }
        match hr1 & 3 {
            0 => HorizontalRes::R256,
            1 => HorizontalRes::R320,
            2 => HorizontalRes::R512,
            _ => HorizontalRes::R640,
        }
    }

    /// GPU video clocks per pixel, the timer 0 dot clock divider
    pub fn dot_clock_divider(self) -> u32 {
        match self {
            HorizontalRes::R256 => 10,
            HorizontalRes::R320 => 8,
            HorizontalRes::R368 => 7,
            HorizontalRes::R512 => 5,
            HorizontalRes::R640 => 4,
        }
    }
}

/// GPU status register flags
///
/// Represents the stored status bits returned by the GPUSTAT register
/// (0x1F801814). Ready flags and the line parity are computed on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GPUStatus {
    /// GP0(E1) bits 0-10: texture page, semi-transparency, depth, dither,
    /// draw-to-display
    pub draw_mode: u16,

    /// GP0(E1) bit 11: texture disable (GPUSTAT bit 15)
    pub texture_disable: bool,

    /// GP0(E6) bit 0: set mask bit when drawing
    pub set_mask_bit: bool,

    /// GP0(E6) bit 1: check mask bit before drawing
    pub check_mask: bool,

    /// GP1(08) bits 0-1
    pub horizontal_res_1: u8,

    /// GP1(08) bit 6 (368 mode)
    pub horizontal_res_2: bool,

    /// Vertical resolution (0=240, 1=480)
    pub vertical_res: bool,

    /// Video mode (0=NTSC, 1=PAL)
    pub video_mode: bool,

    /// Display area color depth (0=15bit, 1=24bit)
    pub display_area_color_depth: bool,

    /// Vertical interlace enabled
    pub vertical_interlace: bool,

    /// Reverse flag
    pub reverse_flag: bool,

    /// Display disabled
    pub display_disabled: bool,

    /// Interrupt request (GP0(1F), cleared by GP1(02))
    pub interrupt_request: bool,

    /// DMA direction (0=Off, 1=FIFO, 2=CPUtoGP0, 3=GPUREADtoCPU)
    pub dma_direction: u8,
}

impl Default for GPUStatus {
    fn default() -> Self {
        Self {
            draw_mode: 0,
            texture_disable: false,
            set_mask_bit: false,
            check_mask: false,
            horizontal_res_1: 0,
            horizontal_res_2: false,
            vertical_res: false,
            video_mode: false,
            display_area_color_depth: false,
            vertical_interlace: false,
            reverse_flag: false,
            display_disabled: true,
            interrupt_request: false,
            dma_direction: 0,
        }
    }
}

impl GPUStatus {
    /// Pack the stored fields into their GPUSTAT bit positions
    ///
    /// Bits 25-28 and 31 are not stored and read as zero here.
    pub fn bits(&self) -> u32 {
        let mut status = (self.draw_mode as u32) & 0x07FF;
        status |= (self.set_mask_bit as u32) << 11;
        status |= (self.check_mask as u32) << 12;
        // Bit 13 reads 1 while interlace is off
        status |= (!self.vertical_interlace as u32) << 13;
        status |= (self.reverse_flag as u32) << 14;
        status |= (self.texture_disable as u32) << 15;
        status |= (self.horizontal_res_2 as u32) << 16;
        status |= ((self.horizontal_res_1 as u32) & 0x03) << 17;
        status |= (self.vertical_res as u32) << 19;
        status |= (self.video_mode as u32) << 20;
        status |= (self.display_area_color_depth as u32) << 21;
        status |= (self.vertical_interlace as u32) << 22;
        status |= (self.display_disabled as u32) << 23;
        status |= (self.interrupt_request as u32) << 24;
        status |= ((self.dma_direction as u32) & 0x03) << 29;
        status
    }

    /// Video standard selected by the status register
    pub fn video_standard(&self) -> VideoStandard {
        if self.video_mode {
            VideoStandard::Pal
        } else {
            VideoStandard::Ntsc
        }
    }

    /// Horizontal resolution selected by GP1(08)
    pub fn horizontal_res(&self) -> HorizontalRes {
        HorizontalRes::from_bits(self.horizontal_res_1, self.horizontal_res_2)
    }
}

/// Display configuration from GP1(05)-GP1(07)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplayArea {
    /// VRAM X of the top-left displayed pixel
    pub x: u16,
    /// VRAM Y of the top-left displayed pixel
    pub y: u16,
    /// Horizontal display range start (video clock)
    pub x1: u16,
    /// Horizontal display range end (video clock)
    pub x2: u16,
    /// Vertical display range start (scanline)
    pub y1: u16,
    /// Vertical display range end (scanline)
    pub y2: u16,
}

/// Scanline timing of a video standard, in CPU cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTiming {
    /// CPU cycles per scanline
    pub cycles_per_line: u32,
    /// Scanlines per frame
    pub lines_per_frame: u16,
    /// First scanline of vertical blank
    pub vblank_start: u16,
    /// Cycle within a line at which horizontal blank starts
    pub hblank_start: u32,
}

impl VideoTiming {
    /// Timing for `standard`
    pub const fn for_standard(standard: VideoStandard) -> Self {
        match standard {
            VideoStandard::Ntsc => Self {
                cycles_per_line: 2146,
                lines_per_frame: 263,
                vblank_start: 240,
                hblank_start: 1610,
            },
            VideoStandard::Pal => Self {
                cycles_per_line: 2157,
                lines_per_frame: 314,
                vblank_start: 256,
                hblank_start: 1618,
            },
        }
    }

    /// CPU cycles per frame
    pub const fn cycles_per_frame(&self) -> u32 {
        self.cycles_per_line * self.lines_per_frame as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_status_default() {
        let status = GPUStatus::default();
        let bits = status.bits();
        assert_ne!(bits & (1 << 23), 0, "display starts disabled");
        assert_ne!(bits & (1 << 13), 0, "field bit set while not interlaced");
        assert_eq!(bits & (1 << 24), 0);
    }

    #[test]
    fn test_gpu_status_packing() {
        let status = GPUStatus {
            draw_mode: 0x7FF,
            horizontal_res_1: 1,
            video_mode: true,
            dma_direction: 2,
            interrupt_request: true,
            display_disabled: false,
            ..GPUStatus::default()
        };
        let bits = status.bits();
        assert_eq!(bits & 0x7FF, 0x7FF);
        assert_eq!((bits >> 17) & 3, 1);
        assert_ne!(bits & (1 << 20), 0);
        assert_eq!((bits >> 29) & 3, 2);
        assert_ne!(bits & (1 << 24), 0);
        assert_eq!(bits & (1 << 23), 0);
    }

    #[test]
    fn test_horizontal_res_values() {
        assert_eq!(HorizontalRes::from_bits(0, false), HorizontalRes::R256);
        assert_eq!(HorizontalRes::from_bits(1, false), HorizontalRes::R320);
        assert_eq!(HorizontalRes::from_bits(2, false), HorizontalRes::R512);
        assert_eq!(HorizontalRes::from_bits(3, false), HorizontalRes::R640);
        assert_eq!(HorizontalRes::from_bits(2, true), HorizontalRes::R368);
        assert_eq!(HorizontalRes::R320.dot_clock_divider(), 8);
        assert_eq!(HorizontalRes::R640.dot_clock_divider(), 4);
    }

    #[test]
    fn test_video_timing() {
        let ntsc = VideoTiming::for_standard(VideoStandard::Ntsc);
        assert_eq!(ntsc.cycles_per_frame(), 2146 * 263);
        let pal = VideoTiming::for_standard(VideoStandard::Pal);
        assert_eq!(pal.lines_per_frame, 314);
        assert!(pal.hblank_start < pal.cycles_per_line);
    }
}
