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

//! psrx-core: PlayStation (PSX) system emulation core
//!
//! This crate emulates the machine's processor, bus, interrupt controller,
//! timers and DMA engine, kept in step by a single cycle scheduler.
//! Peripherals such as the CD-ROM drive or the sound unit plug into fixed
//! register windows through the [`core::memory::IODevice`] trait.
//!
//! # Architecture
//!
//! - [`core::cpu`]: MIPS R3000A interpreter with delayed loads and branches
//! - [`core::memory`]: Memory bus, address decoding and the device registry
//! - [`core::interrupt`]: Interrupt controller
//! - [`core::timer`]: The three root counters
//! - [`core::dma`]: DMA controller
//! - [`core::gpu`]: Bus-facing graphics port and video timing
//! - [`core::timing`]: Session clock and event scheduler
//! - [`core::system`]: System integration, run control and save states
//!
//! # Example
//!
//! ```
//! use psrx_core::core::system::{RunOutcome, System};
//!
//! let mut system = System::new();
//! let outcome = system.run_until(10_000, |system| system.cycles() >= 5_000);
//! assert!(matches!(outcome, RunOutcome::ConditionMet { .. }));
//! # Ok::<(), psrx_core::EmulatorError>(())
//! ```
//!
//! # Error Handling
//!
//! Host-level failures (file I/O, configuration, save states) return
//! [`core::error::Result<T>`], an alias for `Result<T, EmulatorError>`.
//! Faults of the emulated program are handled inside the emulation.

pub mod core;

// Re-export commonly used types
pub use core::error::{EmulatorError, Result};
