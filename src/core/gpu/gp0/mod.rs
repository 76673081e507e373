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

//! GP0 packet framing
//!
//! Every GP0 word is captured for the host renderer. The port itself only
//! tracks packet boundaries so that it can recognise the handful of commands
//! with side effects visible on the bus: draw environment settings (E1-E6),
//! the interrupt request (1F) and the length of CPU-to-VRAM and VRAM-to-CPU
//! image transfers.
//!
//! # Packet lengths
//!
//! | Opcode    | Command                  | Words                          |
//! |-----------|--------------------------|--------------------------------|
//! | 0x02      | Fill rectangle           | 3                              |
//! | 0x20-0x3F | Polygon                  | by vertex count/shading/texture|
//! | 0x40-0x5F | Line / polyline          | 3-4, polyline until 0x5555_5555|
//! | 0x60-0x7F | Rectangle                | 2-4                            |
//! | 0x80-0x9F | VRAM to VRAM copy        | 4                              |
//! | 0xA0-0xBF | CPU to VRAM              | 3 + image data                 |
//! | 0xC0-0xDF | VRAM to CPU              | 3                              |
//! | others    | Environment, NOP, IRQ    | 1                              |

mod environment;

pub use environment::DrawingEnvironment;

use super::GPU;
use crate::core::interrupt::InterruptSource;
use serde::{Deserialize, Serialize};

/// Length of a GP0 packet as announced by its first word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PacketLength {
    /// Fixed number of words including the command word
    Words(u32),
    /// Polyline: the given number of words must follow before a terminator
    /// word may end the packet
    Polyline { mandatory: u32 },
}

/// Framing state between GP0 writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub(crate) enum Packet {
    /// Waiting for a command word
    #[default]
    Idle,
    /// Collecting the parameters of a fixed-length command
    Command { opcode: u8, remaining: u32 },
    /// Collecting polyline vertices
    Polyline { mandatory: u32 },
    /// Collecting CPU-to-VRAM image data
    ImageData { remaining: u32 },
}

/// Polyline terminator test (any word of the form 0x5xxx5xxx)
fn is_polyline_terminator(word: u32) -> bool {
    word & 0xF000_F000 == 0x5000_5000
}

/// Number of data words moved by an image transfer with the given size word
///
/// Width and height wrap the way hardware does: a width of 0 means 1024 and a
/// height of 0 means 512. Pixels are 16 bits, two per word.
pub(crate) fn image_words(size: u32) -> u32 {
    let width = ((size & 0xFFFF).wrapping_sub(1) & 0x3FF) + 1;
    let height = ((size >> 16).wrapping_sub(1) & 0x1FF) + 1;
    (width * height).div_ceil(2)
}

/// Packet length announced by `opcode`
pub(crate) fn packet_length(opcode: u8) -> PacketLength {
    match opcode {
        0x02 => PacketLength::Words(3),
        0x20..=0x3F => {
            let vertices = if opcode & 0x08 != 0 { 4 } else { 3 };
            let textured = opcode & 0x04 != 0;
            let shaded = opcode & 0x10 != 0;
            let per_vertex = 1 + textured as u32;
            let colors = if shaded { vertices - 1 } else { 0 };
            PacketLength::Words(1 + vertices * per_vertex + colors)
        }
        0x40..=0x5F => {
            let shaded = opcode & 0x10 != 0;
            let polyline = opcode & 0x08 != 0;
            match (polyline, shaded) {
                (false, false) => PacketLength::Words(3),
                (false, true) => PacketLength::Words(4),
                (true, false) => PacketLength::Polyline { mandatory: 2 },
                (true, true) => PacketLength::Polyline { mandatory: 3 },
            }
        }
        0x60..=0x7F => {
            let textured = opcode & 0x04 != 0;
            let variable_size = (opcode >> 3) & 3 == 0;
            PacketLength::Words(2 + textured as u32 + variable_size as u32)
        }
        0x80..=0x9F => PacketLength::Words(4),
        0xA0..=0xDF => PacketLength::Words(3),
        _ => PacketLength::Words(1),
    }
}

impl GPU {
    /// Advance the packet framer by one GP0 word
    pub(crate) fn frame_gp0_word(&mut self, word: u32) {
        self.packet = match self.packet {
            Packet::Idle => {
                let opcode = (word >> 24) as u8;
                match packet_length(opcode) {
                    PacketLength::Words(1) => {
                        self.execute_single_word(opcode, word);
                        Packet::Idle
                    }
                    PacketLength::Words(words) => Packet::Command {
                        opcode,
                        remaining: words - 1,
                    },
                    PacketLength::Polyline { mandatory } => Packet::Polyline { mandatory },
                }
            }
            Packet::Command { opcode, remaining } => {
                if remaining > 1 {
                    Packet::Command {
                        opcode,
                        remaining: remaining - 1,
                    }
                } else {
                    self.complete_command(opcode, word)
                }
            }
            Packet::Polyline { mandatory } => {
                if mandatory > 0 {
                    Packet::Polyline {
                        mandatory: mandatory - 1,
                    }
                } else if is_polyline_terminator(word) {
                    Packet::Idle
                } else {
                    Packet::Polyline { mandatory: 0 }
                }
            }
            Packet::ImageData { remaining } => {
                if remaining > 1 {
                    Packet::ImageData {
                        remaining: remaining - 1,
                    }
                } else {
                    log::trace!("GP0 image load complete");
                    Packet::Idle
                }
            }
        };
    }

    /// Whether the framer is waiting for a command word
    pub fn is_idle(&self) -> bool {
        self.packet == Packet::Idle
    }

    /// Handle the final word of a multi-word command
    fn complete_command(&mut self, opcode: u8, last: u32) -> Packet {
        match opcode {
            0xA0..=0xBF => {
                let remaining = image_words(last);
                log::debug!("GP0 CPU->VRAM transfer of {} words", remaining);
                Packet::ImageData { remaining }
            }
            0xC0..=0xDF => {
                self.vram_read_words = image_words(last);
                log::debug!("GP0 VRAM->CPU transfer of {} words", self.vram_read_words);
                Packet::Idle
            }
            _ => Packet::Idle,
        }
    }

    /// Execute a command that fits in one word
    fn execute_single_word(&mut self, opcode: u8, word: u32) {
        match opcode {
            0x1F => {
                if !self.status.interrupt_request {
                    self.status.interrupt_request = true;
                    self.irq.raise(InterruptSource::Gpu);
                }
            }
            0xE1 => self.gp0_draw_mode(word),
            0xE2 => self.gp0_texture_window(word),
            0xE3 => self.gp0_drawing_area_top_left(word),
            0xE4 => self.gp0_drawing_area_bottom_right(word),
            0xE5 => self.gp0_drawing_offset(word),
            0xE6 => self.gp0_mask_bit(word),
            _ => log::trace!("GP0 command 0x{:02X} (no port side effect)", opcode),
        }
    }
}
