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

//! System integration module
//!
//! This module ties together all emulator components (CPU, Bus, interrupt
//! controller, timers, DMA, graphics port) and provides the main emulation loop.
//!
//! # Timing
//!
//! The [`Scheduler`] owns the only clock. Each [`System::step`] executes one
//! instruction and then advances every device by its cost, in sub-slices that
//! end at the next scheduled event. DMA transfers run as slices at their own
//! event and steal their word count from the CPU, so software polling a
//! channel sees the transfer progress between its instructions.

mod snapshot;

pub use snapshot::SNAPSHOT_VERSION;

use super::config::SessionConfig;
use super::cpu::{CpuTracer, CPU};
use super::dma::{DMA, DMA_BASE, DMA_SIZE};
use super::error::{EmulatorError, Result};
use super::gpu::{VideoTiming, GPU, GPU_BASE, GPU_SIZE};
use super::interrupt::{InterruptController, InterruptLine, INTERRUPT_BASE, INTERRUPT_SIZE};
use super::memory::{
    Bus, DeviceLink, Expansion2, MemoryControl, PeripheralSlot, SharedDevice, EXPANSION2_BASE,
    EXPANSION2_SIZE, MEMORY_CONTROL_BASE, MEMORY_CONTROL_SIZE, RAM_SIZE_ADDR,
};
use super::timer::{TimerSync, Timers, TIMER_BASE, TIMER_SIZE};
use super::timing::{EventHandle, Scheduler};
use snapshot::SystemState;
use std::cell::RefCell;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

/// How a bounded run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The condition held after `cycles` cycles
    ConditionMet { cycles: u64 },
    /// `cycles` (at least the budget) elapsed without the condition holding
    BudgetExhausted { cycles: u64 },
}

impl RunOutcome {
    /// Cycles the run consumed
    pub fn cycles(self) -> u64 {
        match self {
            RunOutcome::ConditionMet { cycles } | RunOutcome::BudgetExhausted { cycles } => cycles,
        }
    }

    /// Whether the run stopped because its condition held
    pub fn condition_met(self) -> bool {
        matches!(self, RunOutcome::ConditionMet { .. })
    }
}

/// PlayStation System
///
/// Integrates all hardware components and manages the emulation loop.
///
/// # Components
/// - CPU: MIPS R3000A processor
/// - Bus: Memory bus for RAM, BIOS, and I/O
/// - Interrupt controller
/// - Timers: 3 timer/counter channels
/// - DMA: Direct Memory Access controller
/// - GPU: bus-facing graphics port and video timing
///
/// Other peripherals are plugged in with [`System::attach_peripheral`].
///
/// # Example
/// ```
/// use psrx_core::core::system::System;
///
/// let mut system = System::new();
/// let cycles = system.step();
/// assert!(cycles > 0);
/// assert_eq!(system.cycles(), cycles as u64);
/// ```
pub struct System {
    /// CPU instance
    cpu: CPU,
    /// Memory bus
    bus: Bus,
    /// Session clock and events
    scheduler: Scheduler,
    /// Interrupt controller (shared via Rc<RefCell> for memory-mapped access)
    interrupt_controller: Rc<RefCell<InterruptController>>,
    /// Timers (shared via Rc<RefCell> for memory-mapped access)
    timers: Rc<RefCell<Timers>>,
    /// DMA controller (shared via Rc<RefCell> for memory-mapped access)
    dma: Rc<RefCell<DMA>>,
    /// GPU port (shared via Rc<RefCell> for memory-mapped access)
    gpu: Rc<RefCell<GPU>>,
    /// Memory control registers
    memory_control: Rc<RefCell<MemoryControl>>,
    /// Expansion region 2 (boot status port)
    expansion2: Rc<RefCell<Expansion2>>,
    /// Next DMA slice
    dma_event: EventHandle,
    /// Earliest cycle a device asked to be advanced to
    device_event: EventHandle,
    /// Instruction tracer
    tracer: Option<CpuTracer>,
    /// Configuration the session was built from
    config: SessionConfig,
}

impl System {
    /// Create a new System with the default configuration
    ///
    /// # Returns
    /// Initialized System instance, with an empty (zeroed) BIOS
    pub fn new() -> Self {
        match Self::build(SessionConfig::default()) {
            Ok(system) => system,
            Err(e) => unreachable!("core devices occupy fixed, disjoint windows: {}", e),
        }
    }

    /// Create a System from `config`, loading the BIOS if one is configured
    ///
    /// # Errors
    ///
    /// - `EmulatorError::BiosNotFound` / `EmulatorError::InvalidBiosSize` for a
    ///   bad BIOS path or image
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::config::{SessionConfig, VideoStandard};
    /// use psrx_core::core::system::System;
    ///
    /// let config = SessionConfig {
    ///     video: VideoStandard::Pal,
    ///     ..SessionConfig::default()
    /// };
    /// let system = System::with_config(config).unwrap();
    /// assert_eq!(system.gpu().borrow().video_standard(), VideoStandard::Pal);
    /// ```
    pub fn with_config(config: SessionConfig) -> Result<Self> {
        let bios_path = config.bios_path.clone();
        let mut system = Self::build(config)?;
        if let Some(path) = bios_path {
            system.load_bios(path)?;
        }
        Ok(system)
    }

    fn build(config: SessionConfig) -> Result<Self> {
        let interrupt_controller = Rc::new(RefCell::new(InterruptController::new()));
        let timers = Rc::new(RefCell::new(Timers::new()));
        let dma = Rc::new(RefCell::new(DMA::with_timing(config.dma)));
        let gpu = Rc::new(RefCell::new(GPU::with_config(&config)));
        let memory_control = Rc::new(RefCell::new(MemoryControl::new()));
        let expansion2 = Rc::new(RefCell::new(Expansion2::new()));

        let mut bus = Bus::with_config(&config);
        Self::register_core_devices(
            &mut bus,
            &interrupt_controller,
            &timers,
            &dma,
            &gpu,
            &memory_control,
            &expansion2,
        )?;

        let link = DeviceLink {
            irq: InterruptLine::new(interrupt_controller.clone()),
            timers: TimerSync::new(timers.clone()),
        };
        bus.connect_devices(&link);

        let mut cpu = CPU::new();
        cpu.connect(link.irq.clone());

        let mut scheduler = Scheduler::new();
        let dma_event = scheduler.register_event("dma");
        let device_event = scheduler.register_event("devices");

        log::info!(
            "System: {} devices registered, {:?} video",
            bus.device_count(),
            config.video
        );

        Ok(Self {
            cpu,
            bus,
            scheduler,
            interrupt_controller,
            timers,
            dma,
            gpu,
            memory_control,
            expansion2,
            dma_event,
            device_event,
            tracer: None,
            config,
        })
    }

    /// Registration order is also the order devices are advanced in
    fn register_core_devices(
        bus: &mut Bus,
        interrupt_controller: &Rc<RefCell<InterruptController>>,
        timers: &Rc<RefCell<Timers>>,
        dma: &Rc<RefCell<DMA>>,
        gpu: &Rc<RefCell<GPU>>,
        memory_control: &Rc<RefCell<MemoryControl>>,
        expansion2: &Rc<RefCell<Expansion2>>,
    ) -> Result<()> {
        bus.register_device(INTERRUPT_BASE, INTERRUPT_SIZE, interrupt_controller.clone())?;
        bus.register_device(TIMER_BASE, TIMER_SIZE, timers.clone())?;
        bus.register_device(DMA_BASE, DMA_SIZE, dma.clone())?;

        let control = bus.register_device(
            MEMORY_CONTROL_BASE,
            MEMORY_CONTROL_SIZE,
            memory_control.clone(),
        )?;
        bus.map_window(control, RAM_SIZE_ADDR, 4)?;
        bus.register_device(EXPANSION2_BASE, EXPANSION2_SIZE, expansion2.clone())?;

        let gpu_index = bus.register_device(GPU_BASE, GPU_SIZE, gpu.clone())?;
        bus.route_dma(DMA::CH_GPU, gpu_index)?;
        Ok(())
    }

    /// Handles given to every device wired into this session
    fn device_link(&self) -> DeviceLink {
        DeviceLink {
            irq: InterruptLine::new(self.interrupt_controller.clone()),
            timers: TimerSync::new(self.timers.clone()),
        }
    }

    /// Load BIOS from file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to a 512KB BIOS image
    ///
    /// # Example
    ///
    /// ```no_run
    /// use psrx_core::core::system::System;
    ///
    /// let mut system = System::new();
    /// system.load_bios("SCPH1001.BIN").unwrap();
    /// ```
    pub fn load_bios<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.bus.load_bios_file(path)
    }

    /// Plug an external peripheral into one of the fixed slots
    ///
    /// The device is registered over the slot's register window, answers the
    /// slot's DMA channels and receives the session's interrupt and timer
    /// handles.
    ///
    /// # Returns
    ///
    /// The device's bus index
    ///
    /// # Errors
    ///
    /// `EmulatorError::AddressConflict` if the slot is already occupied
    pub fn attach_peripheral(&mut self, slot: PeripheralSlot, device: SharedDevice) -> Result<usize> {
        let index = self
            .bus
            .register_device(slot.base(), slot.size(), device.clone())?;
        for &channel in slot.dma_channels() {
            self.bus.route_dma(channel, index)?;
        }
        device.borrow_mut().connect(self.device_link());
        log::info!(
            "Attached {} to {:?} slot",
            device.borrow().name(),
            slot
        );
        Ok(index)
    }

    /// Reset the system to initial state
    ///
    /// Resets all components as if the console was power-cycled. RAM and
    /// scratchpad are cleared, the BIOS is kept. The session clock keeps
    /// running; every pending event is cancelled and the video timing starts
    /// over from the current cycle.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.scheduler.deactivate_all();
        log::info!(
            "System reset at cycle {}",
            self.scheduler.global_tick_counter()
        );
    }

    /// Execute one CPU instruction
    ///
    /// Advances every device by the instruction's cost, running any DMA
    /// slices that fall due on the way.
    ///
    /// # Returns
    /// Number of cycles consumed, including cycles stolen by DMA
    pub fn step(&mut self) -> u32 {
        let cost = self.cpu.step(&mut self.bus);
        self.trace_instruction();

        if !self.scheduler.is_active(self.dma_event) && self.dma.borrow().has_pending_work() {
            self.scheduler.schedule(self.dma_event, cost as u64);
        }

        cost + self.advance_components(cost)
    }

    /// Advance devices by `cycles`, cutting at every due event
    ///
    /// Returns the extra cycles stolen by DMA slices.
    fn advance_components(&mut self, cycles: u32) -> u32 {
        let mut target = self.scheduler.global_tick_counter() + cycles as u64;
        let mut stolen = 0;

        loop {
            self.refresh_device_event();
            let now = self.scheduler.global_tick_counter();
            let boundary = self.scheduler.next_boundary(target);

            self.bus.advance_devices((boundary - now) as u32);
            self.scheduler.advance_to(boundary);

            for event in self.scheduler.take_due_events() {
                if event == self.dma_event {
                    let words = self.run_dma_slice();
                    target += words as u64;
                    stolen += words;
                }
            }

            if boundary >= target {
                break;
            }
        }

        stolen
    }

    fn refresh_device_event(&mut self) {
        match self.bus.next_device_event() {
            Some(cycles) => self
                .scheduler
                .schedule(self.device_event, cycles.max(1) as u64),
            None => self.scheduler.deactivate(self.device_event),
        }
    }

    /// Run one DMA slice and schedule the next one
    fn run_dma_slice(&mut self) -> u32 {
        let slice = self.dma.borrow_mut().run_slice(&mut self.bus);
        let Some(slice) = slice else {
            return 0;
        };
        if self.dma.borrow().has_pending_work() {
            self.scheduler
                .schedule(self.dma_event, (slice.words + slice.gap) as u64);
        }
        slice.words
    }

    fn trace_instruction(&mut self) {
        if let Some(tracer) = self.tracer.as_mut() {
            if let Err(e) = tracer.trace(&self.cpu) {
                log::warn!("Failed to write trace: {}", e);
            }
        }
    }

    /// Execute `n` instructions
    ///
    /// # Returns
    ///
    /// Total cycles consumed
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::system::System;
    ///
    /// let mut system = System::new();
    /// let cycles = system.step_n(100);
    /// assert_eq!(system.cycles(), cycles);
    /// ```
    pub fn step_n(&mut self, n: usize) -> u64 {
        (0..n).map(|_| self.step() as u64).sum()
    }

    /// Run until `condition` holds or at least `budget` cycles have elapsed
    ///
    /// The condition is checked before every instruction, so a condition that
    /// already holds returns immediately with zero cycles.
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::system::{RunOutcome, System};
    ///
    /// let mut system = System::new();
    /// let outcome = system.run_until(1000, |_| false);
    /// assert!(matches!(outcome, RunOutcome::BudgetExhausted { cycles } if cycles >= 1000));
    /// ```
    pub fn run_until<F>(&mut self, budget: u64, mut condition: F) -> RunOutcome
    where
        F: FnMut(&System) -> bool,
    {
        let mut cycles = 0u64;
        loop {
            if condition(self) {
                return RunOutcome::ConditionMet { cycles };
            }
            if cycles >= budget {
                return RunOutcome::BudgetExhausted { cycles };
            }
            cycles += self.step() as u64;
        }
    }

    /// Run until the next vertical blank starts
    ///
    /// The budget is two frames of the current video standard.
    pub fn run_frame(&mut self) -> RunOutcome {
        let (frame, standard) = {
            let gpu = self.gpu.borrow();
            (gpu.frame_count(), gpu.video_standard())
        };
        let budget = 2 * VideoTiming::for_standard(standard).cycles_per_frame() as u64;
        self.run_until(budget, |system| system.gpu.borrow().frame_count() > frame)
    }

    /// Capture the complete session state
    ///
    /// # Errors
    ///
    /// `EmulatorError::SnapshotEncode` if a device cannot serialize its state
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::system::System;
    ///
    /// let mut system = System::new();
    /// let blob = system.snapshot().unwrap();
    /// system.step_n(10);
    /// system.restore(&blob).unwrap();
    /// assert_eq!(system.cycles(), 0);
    /// ```
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let data = snapshot::encode(&self.capture_state()?)?;
        log::info!(
            "Snapshot taken at cycle {} ({} bytes)",
            self.scheduler.global_tick_counter(),
            data.len()
        );
        Ok(data)
    }

    /// Restore a state captured by [`System::snapshot`]
    ///
    /// The blob is decoded and checked against this session's layout before
    /// anything changes. If a device still rejects its state, the session is
    /// rolled back to where it was.
    ///
    /// # Errors
    ///
    /// - `EmulatorError::SnapshotDecode` for a malformed blob
    /// - `EmulatorError::SnapshotVersion` for another format revision
    /// - `EmulatorError::SnapshotMismatch` for a different device layout
    pub fn restore(&mut self, data: &[u8]) -> Result<()> {
        let state = snapshot::decode(data)?;
        self.validate_state(&state)?;

        let backup = self.capture_state()?;
        if let Err(e) = self.apply_state(state) {
            log::warn!("Snapshot restore failed, rolling back: {}", e);
            if let Err(rollback) = self.apply_state(backup) {
                log::error!("Rollback after failed restore also failed: {}", rollback);
            }
            return Err(e);
        }

        log::info!(
            "Snapshot restored at cycle {}",
            self.scheduler.global_tick_counter()
        );
        Ok(())
    }

    fn capture_state(&self) -> Result<SystemState> {
        Ok(SystemState {
            version: SNAPSHOT_VERSION,
            cpu: self.cpu.clone(),
            memory: self.bus.memory_state(),
            scheduler: self.scheduler.clone(),
            devices: self.bus.save_device_states()?,
        })
    }

    fn validate_state(&self, state: &SystemState) -> Result<()> {
        Bus::validate_memory_state(&state.memory)?;
        self.bus.validate_device_states(&state.devices)?;
        if state.scheduler.event_count() != self.scheduler.event_count() {
            return Err(EmulatorError::SnapshotMismatch(format!(
                "snapshot has {} timing events, session has {}",
                state.scheduler.event_count(),
                self.scheduler.event_count()
            )));
        }
        Ok(())
    }

    fn apply_state(&mut self, state: SystemState) -> Result<()> {
        self.bus.load_device_states(&state.devices)?;
        self.bus.load_memory_state(state.memory)?;
        self.cpu.restore_from(state.cpu);
        self.scheduler = state.scheduler;
        Ok(())
    }

    /// Trace every executed instruction to `writer`
    ///
    /// # Arguments
    ///
    /// * `writer` - Trace sink
    /// * `limit` - Stop after this many lines, if set
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::system::System;
    ///
    /// let mut system = System::new();
    /// system.enable_tracing(std::io::sink(), Some(5000));
    /// assert!(system.is_tracing());
    /// ```
    pub fn enable_tracing<W: Write + 'static>(&mut self, writer: W, limit: Option<u64>) {
        let tracer = CpuTracer::from_writer(writer);
        self.tracer = Some(match limit {
            Some(limit) => tracer.with_limit(limit),
            None => tracer,
        });
        log::info!(
            "CPU tracing enabled (limit: {})",
            limit.map_or_else(|| "unlimited".to_string(), |limit| limit.to_string())
        );
    }

    /// Disable CPU execution tracing, flushing the sink
    pub fn disable_tracing(&mut self) {
        if let Some(mut tracer) = self.tracer.take() {
            if let Err(e) = tracer.flush() {
                log::warn!("Failed to flush trace: {}", e);
            }
            log::info!(
                "CPU tracing disabled (traced {} instructions)",
                tracer.lines_written()
            );
        }
    }

    /// Check if tracing is currently enabled
    pub fn is_tracing(&self) -> bool {
        self.tracer.as_ref().is_some_and(CpuTracer::is_enabled)
    }

    /// Number of instructions traced so far
    pub fn trace_count(&self) -> u64 {
        self.tracer.as_ref().map_or(0, CpuTracer::lines_written)
    }

    /// Get current PC value
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::system::System;
    ///
    /// let system = System::new();
    /// assert_eq!(system.pc(), 0xBFC00000);
    /// ```
    pub fn pc(&self) -> u32 {
        self.cpu.pc()
    }

    /// Cycles elapsed since the session was created
    pub fn cycles(&self) -> u64 {
        self.scheduler.global_tick_counter()
    }

    /// Get reference to CPU
    pub fn cpu(&self) -> &CPU {
        &self.cpu
    }

    /// Get mutable reference to CPU
    pub fn cpu_mut(&mut self) -> &mut CPU {
        &mut self.cpu
    }

    /// Get reference to the memory bus
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Get mutable reference to the memory bus
    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    /// Session clock and events
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Shared handle to the interrupt controller
    pub fn interrupt_controller(&self) -> Rc<RefCell<InterruptController>> {
        Rc::clone(&self.interrupt_controller)
    }

    /// Shared handle to the timers
    pub fn timers(&self) -> Rc<RefCell<Timers>> {
        Rc::clone(&self.timers)
    }

    /// Shared handle to the DMA controller
    pub fn dma(&self) -> Rc<RefCell<DMA>> {
        Rc::clone(&self.dma)
    }

    /// Shared handle to the GPU port
    pub fn gpu(&self) -> Rc<RefCell<GPU>> {
        Rc::clone(&self.gpu)
    }

    /// Shared handle to the memory control registers
    pub fn memory_control(&self) -> Rc<RefCell<MemoryControl>> {
        Rc::clone(&self.memory_control)
    }

    /// Shared handle to expansion region 2
    pub fn expansion2(&self) -> Rc<RefCell<Expansion2>> {
        Rc::clone(&self.expansion2)
    }

    /// Configuration the session was built from
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}
