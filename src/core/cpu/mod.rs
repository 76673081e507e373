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

use crate::core::interrupt::InterruptLine;
use crate::core::memory::{Bus, Segment};
use serde::{Deserialize, Serialize};

/// CPU (MIPS R3000A) emulation implementation
///
/// # Specifications
/// - Architecture: MIPS I (32-bit)
/// - Clock frequency: 33.8688 MHz
/// - Registers: 32 general-purpose registers + special registers
///
/// Emulated exceptions (overflow, address errors, reserved instructions,
/// interrupts) are handled entirely inside [`CPU::step`] through the COP0
/// exception vector; they never surface as host errors.
///
/// # Example
/// ```
/// use psrx_core::core::cpu::CPU;
///
/// let mut cpu = CPU::new();
/// cpu.reset();
/// assert_eq!(cpu.reg(0), 0); // r0 is always 0
/// assert_eq!(cpu.pc(), 0xBFC00000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CPU {
    /// General purpose registers (r0-r31)
    ///
    /// r0 is hardwired to always return 0
    regs: [u32; 32],

    /// Address of the next instruction to fetch
    pc: u32,

    /// Address fetched after `pc` (differs from pc+4 after a branch)
    next_pc: u32,

    /// Address of the instruction executed by the latest step
    current_pc: u32,

    /// HI register (multiplication/division result upper 32 bits)
    hi: u32,

    /// LO register (multiplication/division result lower 32 bits)
    lo: u32,

    /// Coprocessor 0 (System Control Unit)
    cop0: COP0,

    /// Instruction cache, also the target of isolated loads and stores
    icache: InstructionCache,

    /// Load waiting to retire after the next instruction
    load_delay: Option<LoadDelay>,

    /// Load issued by the instruction currently executing
    #[serde(skip)]
    next_load: Option<LoadDelay>,

    /// Register written directly by the instruction currently executing
    #[serde(skip)]
    written_reg: u8,

    /// Data access cycles accumulated by the instruction currently executing
    #[serde(skip)]
    access_cycles: u32,

    /// The last executed instruction was a branch or jump
    branch: bool,

    /// The current instruction sits in a branch delay slot
    in_branch_delay: bool,

    /// Current instruction (for debugging)
    current_instruction: u32,

    /// Line sampled for CAUSE.IP2
    #[serde(skip)]
    irq: InterruptLine,
}

/// Load delay management structure
///
/// The MIPS R3000A has a load delay slot - the result of a load instruction
/// cannot be used in the immediately following instruction. This structure
/// holds the value until it retires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadDelay {
    /// Target register
    reg: u8,
    /// Value to load
    value: u32,
}

// Module declarations
mod cop0;
mod decode;
mod disassembler;
mod icache;
mod instructions;
mod tracer;

// Re-exports
pub use cop0::ExceptionCause;
use cop0::COP0;
pub use decode::Instruction;
pub use disassembler::Disassembler;
use icache::InstructionCache;
pub use tracer::CpuTracer;

/// Reset vector in the boot ROM
const RESET_VECTOR: u32 = 0xBFC0_0000;

impl CPU {
    /// Create a new CPU instance with initial state
    ///
    /// The CPU is initialized with the following state:
    /// - All general purpose registers: 0
    /// - PC: 0xBFC00000 (BIOS entry point)
    /// - next_pc: 0xBFC00004
    /// - COP0 SR: BEV set, kernel mode, interrupts disabled
    /// - COP0 PRID: 0x00000002
    ///
    /// # Returns
    /// Initialized CPU instance
    pub fn new() -> Self {
        Self {
            regs: [0u32; 32],
            pc: RESET_VECTOR,
            next_pc: RESET_VECTOR.wrapping_add(4),
            current_pc: RESET_VECTOR,
            hi: 0,
            lo: 0,
            cop0: COP0::new(),
            icache: InstructionCache::new(),
            load_delay: None,
            next_load: None,
            written_reg: 0,
            access_cycles: 0,
            branch: false,
            in_branch_delay: false,
            current_instruction: 0,
            irq: InterruptLine::default(),
        }
    }

    /// Reset CPU to initial state
    ///
    /// Resets all registers and state to initial values. The interrupt line
    /// stays connected.
    pub fn reset(&mut self) {
        let irq = self.irq.clone();
        *self = Self::new();
        self.irq = irq;
    }

    /// Attach the interrupt line sampled before every instruction
    pub fn connect(&mut self, irq: InterruptLine) {
        self.irq = irq;
    }

    /// Replace the architectural state with `other`, keeping the interrupt
    /// line of `self`
    pub fn restore_from(&mut self, other: CPU) {
        let irq = self.irq.clone();
        *self = other;
        self.irq = irq;
    }

    /// Read from general purpose register
    ///
    /// # Arguments
    /// - `index`: Register number (0-31)
    ///
    /// # Returns
    /// Register value. r0 always returns 0.
    #[inline(always)]
    pub fn reg(&self, index: u8) -> u32 {
        if index == 0 {
            0
        } else {
            self.regs[index as usize]
        }
    }

    /// Write to general purpose register
    ///
    /// # Arguments
    /// - `index`: Register number (0-31)
    /// - `value`: Value to write
    ///
    /// # Note
    /// Writes to r0 are ignored (r0 is always 0). A direct write wins over a
    /// load to the same register retiring in the same instruction.
    ///
    /// # Example
    /// ```
    /// use psrx_core::core::cpu::CPU;
    ///
    /// let mut cpu = CPU::new();
    /// cpu.set_reg(1, 0x12345678);
    /// assert_eq!(cpu.reg(1), 0x12345678);
    ///
    /// // Writes to r0 are ignored
    /// cpu.set_reg(0, 0xDEADBEEF);
    /// assert_eq!(cpu.reg(0), 0);
    /// ```
    #[inline(always)]
    pub fn set_reg(&mut self, index: u8, value: u32) {
        if index != 0 {
            self.regs[index as usize] = value;
            self.written_reg = index;
        }
    }

    /// Write to register with load delay
    ///
    /// The value becomes visible once the following instruction has executed.
    /// Loads to r0 are dropped.
    pub(crate) fn set_reg_delayed(&mut self, index: u8, value: u32) {
        if index != 0 {
            self.next_load = Some(LoadDelay { reg: index, value });
        }
    }

    /// Value of `index` as seen by LWL/LWR, which merge with a load still in
    /// flight to the same register
    pub(crate) fn reg_for_merge(&self, index: u8) -> u32 {
        match self.load_delay {
            Some(delay) if delay.reg == index => delay.value,
            _ => self.reg(index),
        }
    }

    /// Execute one instruction
    ///
    /// Order of work within a step:
    /// 1. Sample the interrupt line into CAUSE.IP2; an enabled interrupt is
    ///    taken instead of fetching
    /// 2. Fetch at `pc` and advance `pc`/`next_pc` (delay slot handling)
    /// 3. Execute
    /// 4. Retire the load issued by the previous instruction, unless this
    ///    instruction wrote the same register or issued a new load to it
    ///
    /// # Arguments
    ///
    /// * `bus` - Memory bus for reading instructions and data
    ///
    /// # Returns
    ///
    /// Number of cycles consumed: the base instruction cost, plus the fetch
    /// cost unless the instruction cache hit, plus the cost of any data access
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::cpu::CPU;
    /// use psrx_core::core::memory::Bus;
    ///
    /// let mut cpu = CPU::new();
    /// let mut bus = Bus::new();
    /// bus.write32(0x80000000, 0x24010005); // addiu r1, r0, 5
    /// cpu.set_pc(0x80000000);
    ///
    /// // The instruction cache is off at power-on, so the fetch pays the RAM cost
    /// let cycles = cpu.step(&mut bus);
    /// assert_eq!(cycles, 1 + bus.fetch_cycles(0x80000000));
    /// assert_eq!(cpu.reg(1), 5);
    /// ```
    pub fn step(&mut self, bus: &mut Bus) -> u32 {
        self.access_cycles = 0;
        self.written_reg = 0;
        self.in_branch_delay = self.branch;
        self.branch = false;

        self.cop0.set_hardware_interrupt(self.irq.pending());
        if self.cop0.interrupt_pending() {
            self.retire_load();
            self.current_pc = self.pc;
            self.exception(ExceptionCause::Interrupt);
            return bus.instruction_cycles();
        }

        let pc = self.pc;
        self.current_pc = pc;

        if pc & 3 != 0 || !self.address_allowed(pc) {
            self.current_instruction = 0;
            self.retire_load();
            self.address_error(ExceptionCause::AddressErrorLoad, pc);
            return bus.instruction_cycles();
        }

        let (instruction, fetch_cycles) = self.fetch(bus, pc);
        self.current_instruction = instruction;

        self.pc = self.next_pc;
        self.next_pc = self.next_pc.wrapping_add(4);

        self.execute_instruction(Instruction(instruction), bus);

        let superseded = self.next_load.map(|load| load.reg);
        if let Some(delay) = self.load_delay.take() {
            if delay.reg != self.written_reg && Some(delay.reg) != superseded {
                self.regs[delay.reg as usize] = delay.value;
            }
        }
        self.load_delay = self.next_load.take();

        bus.instruction_cycles() + fetch_cycles + self.access_cycles
    }

    /// Instruction word at `pc` and the cycles its fetch cost
    ///
    /// KUSEG and KSEG0 fetches go through the instruction cache when the
    /// cache control register enables it: a hit is free, a miss pays the bus
    /// read and fills the line.
    fn fetch(&mut self, bus: &mut Bus, pc: u32) -> (u32, u32) {
        if Segment::of(pc).is_cached() && bus.cache_control().icache_enabled() {
            if let Some(instruction) = self.icache.fetch(pc) {
                return (instruction, 0);
            }
            let instruction = bus.read32(pc);
            self.icache.fill(pc, instruction);
            return (instruction, bus.fetch_cycles(pc));
        }
        (bus.read32(pc), bus.fetch_cycles(pc))
    }

    /// Commit a pending load immediately
    fn retire_load(&mut self) {
        if let Some(delay) = self.load_delay.take() {
            self.regs[delay.reg as usize] = delay.value;
        }
    }

    /// Enter the exception handler
    ///
    /// Pushes the KU/IE mode stack, records the cause and EPC (the branch
    /// address when the faulting instruction sits in a delay slot, so the
    /// branch is re-executed on return), and jumps to the vector.
    pub(crate) fn exception(&mut self, cause: ExceptionCause) {
        let epc = if self.in_branch_delay {
            self.current_pc.wrapping_sub(4)
        } else {
            self.current_pc
        };
        let handler = self.cop0.enter_exception(cause, epc, self.in_branch_delay);

        match cause {
            ExceptionCause::Interrupt | ExceptionCause::Syscall => log::trace!(
                "Exception {:?}: EPC=0x{:08X} handler=0x{:08X}",
                cause,
                epc,
                handler
            ),
            _ => log::debug!(
                "Exception {:?}: EPC=0x{:08X} handler=0x{:08X} in_delay={} instruction=0x{:08X}",
                cause,
                epc,
                handler,
                self.in_branch_delay,
                self.current_instruction
            ),
        }

        self.pc = handler;
        self.next_pc = handler.wrapping_add(4);
        self.branch = false;
    }

    /// Raise an address error and latch the offending address in BADA
    pub(crate) fn address_error(&mut self, cause: ExceptionCause, address: u32) {
        self.cop0.regs[COP0::BADA] = address;
        self.exception(cause);
    }

    /// Raise CoprocessorUnusable for coprocessor `n`
    pub(crate) fn coprocessor_unusable(&mut self, n: u32) {
        self.exception(ExceptionCause::CoprocessorUnusable);
        self.cop0.set_coprocessor_error(n);
    }

    /// User mode may only touch KUSEG
    #[inline(always)]
    pub(crate) fn address_allowed(&self, address: u32) -> bool {
        !self.cop0.user_mode() || address & 0x8000_0000 == 0
    }

    /// Check if currently in branch delay slot
    ///
    /// # Returns
    ///
    /// true if the last executed instruction sat in a branch delay slot
    pub fn in_delay_slot(&self) -> bool {
        self.in_branch_delay
    }

    /// Get current PC value
    ///
    /// # Returns
    ///
    /// The address of the next instruction to fetch
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Address fetched after [`CPU::pc`]
    pub fn next_pc(&self) -> u32 {
        self.next_pc
    }

    /// Address of the instruction executed by the latest step
    pub fn current_pc(&self) -> u32 {
        self.current_pc
    }

    /// Instruction word executed by the latest step
    pub fn current_instruction(&self) -> u32 {
        self.current_instruction
    }

    /// Get HI register value
    pub fn hi(&self) -> u32 {
        self.hi
    }

    /// Get LO register value
    pub fn lo(&self) -> u32 {
        self.lo
    }

    /// Load still waiting to retire, as (register, value)
    pub fn pending_load(&self) -> Option<(u8, u32)> {
        self.load_delay.map(|delay| (delay.reg, delay.value))
    }

    /// Read a COP0 register as MFC0 would
    pub fn cop0_reg(&self, index: usize) -> u32 {
        self.cop0.read(index).unwrap_or(0)
    }

    /// Write a COP0 register as MTC0 would
    pub fn set_cop0_reg(&mut self, index: usize, value: u32) {
        self.cop0.write(index, value);
    }

    /// Set program counter value
    ///
    /// Sets the PC and next_PC to specified value. This is used when
    /// loading executables that specify the entry point.
    ///
    /// # Arguments
    ///
    /// * `pc` - New program counter value
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::cpu::CPU;
    ///
    /// let mut cpu = CPU::new();
    /// cpu.set_pc(0x80010000); // Set PC to executable entry point
    /// assert_eq!(cpu.pc(), 0x80010000);
    /// ```
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
        self.next_pc = pc.wrapping_add(4);
        self.branch = false;
    }
}

impl Default for CPU {
    fn default() -> Self {
        Self::new()
    }
}
