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

//! CPU execution tracer for debugging
//!
//! Writes one line per executed instruction to any [`Write`] sink:
//!
//! ```text
//! PC=0xBFC00000 [0x3C080013] lui r8, 0x0013
//! ```

use super::{Disassembler, CPU};
use crate::core::error::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// CPU execution tracer
///
/// Call [`CpuTracer::trace`] after each [`CPU::step`]; the line describes
/// the instruction that step executed. An optional line limit turns the
/// tracer off once reached, so long runs do not fill the disk.
///
/// # Example
/// ```
/// use psrx_core::core::cpu::{CpuTracer, CPU};
/// use psrx_core::core::memory::Bus;
///
/// let mut cpu = CPU::new();
/// let mut bus = Bus::new();
/// let mut tracer = CpuTracer::from_writer(Vec::new());
///
/// cpu.step(&mut bus);
/// tracer.trace(&cpu).unwrap();
/// assert_eq!(tracer.lines_written(), 1);
/// ```
pub struct CpuTracer {
    /// Enable/disable tracing
    enabled: bool,
    /// Trace sink
    output: Box<dyn Write>,
    /// Maximum number of lines, if any
    limit: Option<u64>,
    /// Lines written so far
    written: u64,
}

impl CpuTracer {
    /// Create a tracer writing to a file
    ///
    /// If the file exists, it will be overwritten.
    ///
    /// # Errors
    ///
    /// Returns `EmulatorError::Io` if the file cannot be created
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    /// Create a tracer writing to an arbitrary sink
    pub fn from_writer<W: Write + 'static>(writer: W) -> Self {
        Self {
            enabled: true,
            output: Box::new(writer),
            limit: None,
            written: 0,
        }
    }

    /// Stop tracing after `limit` lines
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Enable or disable tracing
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Check if tracing is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of lines written so far
    pub fn lines_written(&self) -> u64 {
        self.written
    }

    /// Trace the instruction executed by the CPU's latest step
    ///
    /// Does nothing while disabled or once the line limit is reached.
    pub fn trace(&mut self, cpu: &CPU) -> Result<()> {
        self.trace_with_regs(cpu, &[])
    }

    /// Like [`CpuTracer::trace`], followed by the values of `regs`
    ///
    /// At most eight registers are printed; indices above 31 are skipped.
    pub fn trace_with_regs(&mut self, cpu: &CPU, regs: &[u8]) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.limit.is_some_and(|limit| self.written >= limit) {
            log::info!("CPU trace limit of {} lines reached", self.written);
            self.enabled = false;
            return Ok(());
        }

        let pc = cpu.current_pc();
        let instruction = cpu.current_instruction();
        let disasm = Disassembler::disassemble(instruction, pc);

        write!(self.output, "PC=0x{:08X} [0x{:08X}] {}", pc, instruction, disasm)?;
        for &reg in regs.iter().filter(|&&reg| reg < 32).take(8) {
            write!(self.output, " r{}={:08X}", reg, cpu.reg(reg))?;
        }
        writeln!(self.output)?;

        self.written += 1;
        Ok(())
    }

    /// Flush the output buffer
    pub fn flush(&mut self) -> Result<()> {
        self.output.flush()?;
        Ok(())
    }
}

impl Drop for CpuTracer {
    fn drop(&mut self) {
        // Flush any remaining data when tracer is dropped
        let _ = self.output.flush();
    }
}
