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

//! Session configuration
//!
//! A [`SessionConfig`] is read once when a session is created. Every field has a
//! default, so a TOML file only needs to list what it changes:
//!
//! ```toml
//! bios_path = "SCPH1001.BIN"
//! video = "pal"
//!
//! [timing.bios]
//! read = 24
//! write = 0
//! ```

use crate::core::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Video standard driving the scanline clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStandard {
    /// 263 lines per frame, ~60 Hz
    #[default]
    Ntsc,
    /// 314 lines per frame, ~50 Hz
    Pal,
}

/// Extra CPU cycles charged for one access to a memory region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCost {
    /// Cycles charged for a load (or an uncached instruction fetch)
    pub read: u32,
    /// Cycles charged for a store
    pub write: u32,
}

impl AccessCost {
    /// Build a cost pair
    pub const fn new(read: u32, write: u32) -> Self {
        Self { read, write }
    }
}

/// Per-region bus timing
///
/// Stores to RAM go through the write buffer and are cheap; loads stall the
/// pipeline. The BIOS sits on an 8-bit bus and is by far the slowest region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusTiming {
    /// Base cost of every instruction
    pub instruction_cycles: u32,
    /// Main RAM (all mirrors)
    pub ram: AccessCost,
    /// 1 KiB scratchpad
    pub scratchpad: AccessCost,
    /// BIOS ROM
    pub bios: AccessCost,
    /// Hardware register window
    pub io: AccessCost,
    /// Expansion regions and open bus
    pub expansion: AccessCost,
}

impl Default for BusTiming {
    fn default() -> Self {
        Self {
            instruction_cycles: 1,
            ram: AccessCost::new(4, 1),
            scratchpad: AccessCost::new(0, 0),
            bios: AccessCost::new(22, 0),
            io: AccessCost::new(2, 1),
            expansion: AccessCost::new(10, 5),
        }
    }
}

/// DMA slice pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmaTiming {
    /// CPU cycles granted between two slices of an unchopped block or
    /// linked-list transfer
    pub slice_gap_cycles: u32,
}

impl Default for DmaTiming {
    fn default() -> Self {
        Self {
            slice_gap_cycles: 16,
        }
    }
}

/// Complete configuration of an emulation session
///
/// # Example
///
/// ```
/// use psrx_core::core::config::{SessionConfig, VideoStandard};
///
/// let config = SessionConfig::from_toml_str("video = \"pal\"").unwrap();
/// assert_eq!(config.video, VideoStandard::Pal);
/// assert_eq!(config.open_bus_value, 0xFFFF_FFFF);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// BIOS image loaded by [`crate::core::system::System::with_config`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bios_path: Option<PathBuf>,
    /// Scanline timing
    pub video: VideoStandard,
    /// Value returned by reads that hit no device
    pub open_bus_value: u32,
    /// Capacity of the GP0 capture queue
    pub gpu_fifo_capacity: usize,
    /// Bus access costs
    pub timing: BusTiming,
    /// DMA pacing
    pub dma: DmaTiming,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bios_path: None,
            video: VideoStandard::default(),
            open_bus_value: 0xFFFF_FFFF,
            gpu_fifo_capacity: 4096,
            timing: BusTiming::default(),
            dma: DmaTiming::default(),
        }
    }
}

impl SessionConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded session config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
