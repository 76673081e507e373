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

//! GP0 Drawing Environment Commands
//!
//! The renderer consumes these commands from the captured stream like any
//! other, but the port also keeps them: E1 and E6 are mirrored in GPUSTAT and
//! E2-E5 are read back through GP1(10h).
//!
//! # Commands
//!
//! - 0xE1: Draw Mode Setting (texture page, transparency, dithering, etc.)
//! - 0xE2: Texture Window Setting
//! - 0xE3: Set Drawing Area Top-Left
//! - 0xE4: Set Drawing Area Bottom-Right
//! - 0xE5: Set Drawing Offset
//! - 0xE6: Mask Bit Setting
//!
//! # References
//!
//! - [PSX-SPX: GP0 Drawing Settings](http://problemkaputt.de/psx-spx.htm#gpurenderattributes)

use crate::core::gpu::GPU;
use serde::{Deserialize, Serialize};

/// Raw E2-E5 parameters as last written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DrawingEnvironment {
    /// GP0(E2h) bits 0-19
    pub texture_window: u32,
    /// GP0(E3h) bits 0-18
    pub area_top_left: u32,
    /// GP0(E4h) bits 0-18
    pub area_bottom_right: u32,
    /// GP0(E5h) bits 0-21
    pub offset: u32,
}

impl DrawingEnvironment {
    /// Drawing offset sign-extended from its two 11-bit fields
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::gpu::DrawingEnvironment;
    ///
    /// let env = DrawingEnvironment {
    ///     offset: 10 | (0x7EC << 11),
    ///     ..Default::default()
    /// };
    /// assert_eq!(env.drawing_offset(), (10, -20));
    /// ```
    pub fn drawing_offset(&self) -> (i16, i16) {
        let x = ((self.offset & 0x7FF) as i16) << 5 >> 5;
        let y = (((self.offset >> 11) & 0x7FF) as i16) << 5 >> 5;
        (x, y)
    }

    /// Drawing area as (left, top, right, bottom)
    pub fn drawing_area(&self) -> (u16, u16, u16, u16) {
        (
            (self.area_top_left & 0x3FF) as u16,
            ((self.area_top_left >> 10) & 0x1FF) as u16,
            (self.area_bottom_right & 0x3FF) as u16,
            ((self.area_bottom_right >> 10) & 0x1FF) as u16,
        )
    }
}

impl GPU {
    /// GP0(E1h) - Draw Mode Setting (aka "Texpage")
    ///
    /// # Command Format
    ///
    /// ```text
    /// 0xE1000000 | params
    ///   Bit 0-3:   Texture page X Base   (N*64)
    ///   Bit 4:     Texture page Y Base   (N*256, 0=0, 1=256)
    ///   Bit 5-6:   Semi Transparency     (0=B/2+F/2, 1=B+F, 2=B-F, 3=B+F/4)
    ///   Bit 7-8:   Texture page colors   (0=4bit, 1=8bit, 2=15bit)
    ///   Bit 9:     Dithering enabled     (0=Off, 1=On)
    ///   Bit 10:    Drawing to display    (0=Prohibited, 1=Allowed)
    ///   Bit 11:    Texture disable       (0=Normal, 1=Disable)
    /// ```
    ///
    /// Bits 0-10 land in GPUSTAT bits 0-10 and bit 11 in GPUSTAT bit 15.
    pub(crate) fn gp0_draw_mode(&mut self, cmd: u32) {
        self.status.draw_mode = (cmd & 0x7FF) as u16;
        self.status.texture_disable = (cmd >> 11) & 1 != 0;

        log::debug!(
            "Draw mode: page=({}, {}) depth={} semi={} dither={} tex_disable={}",
            (cmd & 0xF) * 64,
            ((cmd >> 4) & 1) * 256,
            (cmd >> 7) & 3,
            (cmd >> 5) & 3,
            (cmd >> 9) & 1,
            self.status.texture_disable
        );
    }

    /// GP0(E2h) - Texture Window Setting
    pub(crate) fn gp0_texture_window(&mut self, cmd: u32) {
        self.environment.texture_window = cmd & 0x000F_FFFF;
        log::debug!(
            "Texture window: mask=({}, {}) offset=({}, {})",
            cmd & 0x1F,
            (cmd >> 5) & 0x1F,
            (cmd >> 10) & 0x1F,
            (cmd >> 15) & 0x1F
        );
    }

    /// GP0(E3h) - Set Drawing Area Top-Left
    ///
    /// ```text
    ///   Bit 0-9:   X-coordinate (0-1023)
    ///   Bit 10-18: Y-coordinate (0-511)
    /// ```
    pub(crate) fn gp0_drawing_area_top_left(&mut self, cmd: u32) {
        self.environment.area_top_left = cmd & 0x0007_FFFF;
        log::debug!(
            "Draw area top-left: ({}, {})",
            cmd & 0x3FF,
            (cmd >> 10) & 0x1FF
        );
    }

    /// GP0(E4h) - Set Drawing Area Bottom-Right
    pub(crate) fn gp0_drawing_area_bottom_right(&mut self, cmd: u32) {
        self.environment.area_bottom_right = cmd & 0x0007_FFFF;
        log::debug!(
            "Draw area bottom-right: ({}, {})",
            cmd & 0x3FF,
            (cmd >> 10) & 0x1FF
        );
    }

    /// GP0(E5h) - Set Drawing Offset
    ///
    /// ```text
    ///   Bit 0-10:  X-offset (signed 11-bit, -1024 to +1023)
    ///   Bit 11-21: Y-offset (signed 11-bit, -1024 to +1023)
    /// ```
    pub(crate) fn gp0_drawing_offset(&mut self, cmd: u32) {
        self.environment.offset = cmd & 0x003F_FFFF;
        let (x, y) = self.environment.drawing_offset();
        log::debug!("Draw offset: ({}, {})", x, y);
    }

    /// GP0(E6h) - Mask Bit Setting
    ///
    /// ```text
    ///   Bit 0: Set mask bit while drawing       (0=No, 1=Yes/Bit15)
    ///   Bit 1: Check mask bit before draw       (0=Draw Always, 1=Draw only if Bit15=0)
    /// ```
    pub(crate) fn gp0_mask_bit(&mut self, cmd: u32) {
        self.status.set_mask_bit = cmd & 1 != 0;
        self.status.check_mask = cmd & 2 != 0;
        log::debug!(
            "Mask bit: set={} check={}",
            self.status.set_mask_bit,
            self.status.check_mask
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_mode_mirrors_status() {
        let mut gpu = GPU::new();
        gpu.write_gp0(0xE100_0A12);
        assert_eq!(gpu.status() & 0x7FF, 0x212);
        assert_ne!(gpu.status() & (1 << 15), 0);
    }

    #[test]
    fn test_mask_bit_setting() {
        let mut gpu = GPU::new();
        gpu.write_gp0(0xE600_0003);
        assert_ne!(gpu.status() & (1 << 11), 0);
        assert_ne!(gpu.status() & (1 << 12), 0);
        gpu.write_gp0(0xE600_0000);
        assert_eq!(gpu.status() & (3 << 11), 0);
    }

    #[test]
    fn test_drawing_area() {
        let mut gpu = GPU::new();
        gpu.write_gp0(0xE300_0000 | (100 << 10) | 100);
        gpu.write_gp0(0xE400_0000 | (239 << 10) | 319);
        assert_eq!(gpu.environment().drawing_area(), (100, 100, 319, 239));
    }

    #[test]
    fn test_drawing_offset_sign_extension() {
        let mut gpu = GPU::new();
        let y = ((-20i16) as u16 as u32) & 0x7FF;
        gpu.write_gp0(0xE500_0000 | 10 | (y << 11));
        assert_eq!(gpu.environment().drawing_offset(), (10, -20));
    }
}
