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

//! GP1 display configuration commands
//!
//! Display enable, display area and range, and the display mode that selects
//! the video standard driving the scanline clock.

use super::super::GPU;

impl GPU {
    /// GP1(03h) - Display Enable
    ///
    /// Bit 0: 0=Enable, 1=Disable
    pub(crate) fn gp1_display_enable(&mut self, value: u32) {
        self.status.display_disabled = value & 1 != 0;
        log::debug!(
            "Display {}",
            if self.status.display_disabled {
                "disabled"
            } else {
                "enabled"
            }
        );
    }

    /// GP1(05h) - Start of Display Area (in VRAM)
    ///
    /// ```text
    ///   Bit 0-9:   X (0-1023)
    ///   Bit 10-18: Y (0-511)
    /// ```
    pub(crate) fn gp1_display_area_start(&mut self, value: u32) {
        self.display.x = (value & 0x3FF) as u16;
        self.display.y = ((value >> 10) & 0x1FF) as u16;
        log::debug!("Display area start: ({}, {})", self.display.x, self.display.y);
    }

    /// GP1(06h) - Horizontal Display Range (on screen)
    pub(crate) fn gp1_horizontal_display_range(&mut self, value: u32) {
        self.display.x1 = (value & 0xFFF) as u16;
        self.display.x2 = ((value >> 12) & 0xFFF) as u16;
        log::debug!(
            "Horizontal display range: {} to {}",
            self.display.x1,
            self.display.x2
        );
    }

    /// GP1(07h) - Vertical Display Range (on screen)
    pub(crate) fn gp1_vertical_display_range(&mut self, value: u32) {
        self.display.y1 = (value & 0x3FF) as u16;
        self.display.y2 = ((value >> 10) & 0x3FF) as u16;
        log::debug!(
            "Vertical display range: {} to {}",
            self.display.y1,
            self.display.y2
        );
    }

    /// GP1(08h) - Display Mode
    ///
    /// ```text
    ///   Bit 0-1: Horizontal Resolution 1  (0=256, 1=320, 2=512, 3=640)
    ///   Bit 2:   Vertical Resolution      (0=240, 1=480 when interlaced)
    ///   Bit 3:   Video Mode               (0=NTSC, 1=PAL)
    ///   Bit 4:   Display Area Color Depth (0=15bit, 1=24bit)
    ///   Bit 5:   Vertical Interlace       (0=Off, 1=On)
    ///   Bit 6:   Horizontal Resolution 2  (0=256/320/512/640, 1=368)
    ///   Bit 7:   Reverse Flag
    /// ```
    ///
    /// A change of video standard switches the scanline clock; a change of
    /// horizontal resolution changes the timer 0 dot clock.
    pub(crate) fn gp1_display_mode(&mut self, value: u32) {
        self.status.horizontal_res_1 = (value & 3) as u8;
        self.status.vertical_res = (value >> 2) & 1 != 0;
        self.status.video_mode = (value >> 3) & 1 != 0;
        self.status.display_area_color_depth = (value >> 4) & 1 != 0;
        self.status.vertical_interlace = (value >> 5) & 1 != 0;
        self.status.horizontal_res_2 = (value >> 6) & 1 != 0;
        self.status.reverse_flag = (value >> 7) & 1 != 0;

        self.apply_video_standard();
        self.apply_dot_clock();

        log::debug!(
            "Display mode: {:?} {:?} 24bit={} interlaced={}",
            self.status.horizontal_res(),
            self.status.video_standard(),
            self.status.display_area_color_depth,
            self.status.vertical_interlace
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::core::config::VideoStandard;
    use crate::core::gpu::{HorizontalRes, GPU};
    use crate::core::memory::{DeviceLink, IODevice};
    use crate::core::timer::{TimerSync, Timers};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_gp1_display_enable() {
        let mut gpu = GPU::new();

        gpu.write_gp1(0x0300_0000);
        assert_eq!(gpu.status() & (1 << 23), 0);

        gpu.write_gp1(0x0300_0001);
        assert_ne!(gpu.status() & (1 << 23), 0);
    }

    #[test]
    fn test_gp1_display_area_start_coordinate_masking() {
        let mut gpu = GPU::new();

        gpu.write_gp1(0x05FF_FFFF);
        assert_eq!(gpu.display_area().x, 0x3FF);
        assert_eq!(gpu.display_area().y, 0x1FF);
    }

    #[test]
    fn test_gp1_display_ranges() {
        let mut gpu = GPU::new();

        let x1 = 0x260;
        let x2 = 0x260 + 320 * 8;
        gpu.write_gp1(0x0600_0000 | x1 | (x2 << 12));
        gpu.write_gp1(0x0700_0000 | 16 | (256 << 10));

        let area = gpu.display_area();
        assert_eq!(area.x1, x1 as u16);
        assert_eq!(area.x2, x2 as u16);
        assert_eq!(area.y1, 16);
        assert_eq!(area.y2, 256);
    }

    #[test]
    fn test_gp1_display_mode_status_bits() {
        let mut gpu = GPU::new();

        gpu.write_gp1(0x0800_0000 | 0x01 | 0x04 | 0x10 | 0x20 | 0x80);

        let status = gpu.status();
        assert_eq!((status >> 17) & 3, 1);
        assert_ne!(status & (1 << 19), 0);
        assert_ne!(status & (1 << 21), 0);
        assert_ne!(status & (1 << 22), 0);
        assert_ne!(status & (1 << 14), 0);
        assert_eq!(status & (1 << 20), 0);
    }

    #[test]
    fn test_gp1_display_mode_switches_standard() {
        let mut gpu = GPU::new();
        assert_eq!(gpu.video_standard(), VideoStandard::Ntsc);

        gpu.write_gp1(0x0800_0008);
        assert_eq!(gpu.video_standard(), VideoStandard::Pal);
        assert_ne!(gpu.status() & (1 << 20), 0);
    }

    #[test]
    fn test_gp1_display_mode_sets_dot_clock() {
        let timers = Rc::new(RefCell::new(Timers::new()));
        let mut gpu = GPU::new();
        gpu.connect(DeviceLink {
            timers: TimerSync::new(timers.clone()),
            ..Default::default()
        });

        // 640 pixels: divider 4
        gpu.write_gp1(0x0800_0003);
        assert_eq!(gpu.status_register().horizontal_res(), HorizontalRes::R640);

        // 28 CPU cycles = 44 video clocks = 11 dots at divider 4
        timers.borrow_mut().channel_mut(0).write_mode(0x0100);
        timers.borrow_mut().advance(28);
        assert_eq!(timers.borrow().channel(0).read_counter(), 11);
    }
}
