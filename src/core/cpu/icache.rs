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

//! Instruction cache for the R3000A
//!
//! 4KB, direct-mapped, one instruction per line.
//!
//! ```text
//! [31:12] tag    [11:2] line index    [1:0] byte lane
//! ```
//!
//! Fetches through KUSEG and KSEG0 use the cache once the cache control
//! register enables it. While SR.IsC is set, loads and stores to those
//! segments reach the cache's data store instead of memory; in tag-test mode
//! a store invalidates the addressed line. The BIOS relies on both when it
//! flushes the cache.

use crate::core::memory::{read_lane, write_lane, AccessWidth};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct CacheLine {
    /// Upper 20 address bits
    tag: u32,
    data: u32,
    valid: bool,
}

/// Direct-mapped instruction cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct InstructionCache {
    lines: Vec<CacheLine>,
}

impl InstructionCache {
    const LINE_COUNT: usize = 1024;
    const INDEX_MASK: u32 = 0x3FF;
    const INDEX_SHIFT: u32 = 2;
    const TAG_SHIFT: u32 = 12;

    /// Empty cache, every line invalid
    pub(crate) fn new() -> Self {
        Self {
            lines: vec![CacheLine::default(); Self::LINE_COUNT],
        }
    }

    #[inline(always)]
    fn index(addr: u32) -> usize {
        ((addr >> Self::INDEX_SHIFT) & Self::INDEX_MASK) as usize
    }

    #[inline(always)]
    fn tag(addr: u32) -> u32 {
        addr >> Self::TAG_SHIFT
    }

    /// Cached instruction at `addr`, or `None` on a miss
    #[inline(always)]
    pub(crate) fn fetch(&self, addr: u32) -> Option<u32> {
        let line = &self.lines[Self::index(addr)];
        (line.valid && line.tag == Self::tag(addr)).then_some(line.data)
    }

    /// Fill the line for `addr` after a miss
    pub(crate) fn fill(&mut self, addr: u32, instruction: u32) {
        self.lines[Self::index(addr)] = CacheLine {
            tag: Self::tag(addr),
            data: instruction,
            valid: true,
        };
    }

    /// Isolated load: reads the data store regardless of tag and valid bit
    pub(crate) fn read_isolated(&self, addr: u32, width: AccessWidth) -> u32 {
        read_lane(self.lines[Self::index(addr)].data, addr, width)
    }

    /// Isolated store
    ///
    /// In tag-test mode the line is invalidated; otherwise the addressed
    /// lanes of the data store are replaced.
    pub(crate) fn write_isolated(
        &mut self,
        addr: u32,
        width: AccessWidth,
        value: u32,
        tag_test: bool,
    ) {
        let line = &mut self.lines[Self::index(addr)];
        if tag_test {
            line.valid = false;
        } else {
            line.data = write_lane(line.data, addr, width, value);
        }
    }
}
