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

//! PSX Timer/Counter Implementation
//!
//! The PlayStation has 3 timer channels that can count based on different clock sources
//! and generate interrupts when reaching target values or overflow.
//!
//! ## Timer Channels
//!
//! - **Timer 0**: System clock or pixel clock (GPU dot clock), syncs to hblank
//! - **Timer 1**: System clock or horizontal blank pulses, syncs to vblank
//! - **Timer 2**: System clock or system clock / 8
//!
//! ## Register Layout
//!
//! Each timer has 3 registers at 16-byte intervals:
//! - `0x1F801100 + (n * 0x10)`: Counter value (R/W)
//! - `0x1F801104 + (n * 0x10)`: Mode register (R/W)
//! - `0x1F801108 + (n * 0x10)`: Target value (R/W)
//!
//! ## Mode Register Format (16 bits)
//!
//! ```text
//! 15-13: Not used (always 0)
//! 12:    Reached max value (0xFFFF) - Read-only, reset on read
//! 11:    Reached target value - Read-only, reset on read
//! 10:    Interrupt request (0=yes, 1=no) - Read-only, set on mode write
//! 9:     Clock source bit 1 (Timer 2 only, other timers: 0)
//! 8:     Clock source bit 0
//! 7:     IRQ pulse mode (0=pulse, 1=toggle)
//! 6:     IRQ repeat mode (0=one-shot, 1=repeat)
//! 5:     IRQ on max value (0xFFFF)
//! 4:     IRQ on target
//! 3:     Reset counter to 0 when target reached
//! 2-1:   Sync mode (meaning depends on timer)
//! 0:     Sync enable
//! ```
//!
//! ## Counting
//!
//! Counters never run cycle by cycle. [`Timers::advance`] converts elapsed CPU
//! cycles into ticks for each channel and moves the counter in closed form, so a
//! single call may cross the target or 0xFFFF several times. The counter still
//! lands on the exact post-wrap value, and the channel raises its interrupt at
//! most once per call.
//!
//! With reset-on-target the counter runs `0..=target` and the tick after the
//! target value returns it to 0, giving a period of `target + 1` ticks.
//!
//! ## References
//!
//! - [PSX-SPX: Timers](http://problemkaputt.de/psx-spx.htm#timers)

use crate::core::error::Result;
use crate::core::interrupt::{InterruptLine, InterruptSource};
use crate::core::memory::{decode_state, encode_state, read_lane, write_lane};
use crate::core::memory::{AccessWidth, DeviceLink, IODevice};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Physical base address of the timer register block
pub const TIMER_BASE: u32 = 0x1F80_1100;

/// Size of the timer register block in bytes
pub const TIMER_SIZE: u32 = 0x30;

/// GPU clock is 11/7 of the CPU clock
const GPU_CLOCK_NUM: u64 = 11;
const GPU_CLOCK_DEN: u64 = 7;

/// Timer mode control register
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerMode {
    /// Sync enable (bit 0)
    pub sync_enable: bool,

    /// Sync mode (bits 1-2, meaning depends on timer)
    pub sync_mode: u8,

    /// Reset counter to 0 when target reached (bit 3)
    pub reset_on_target: bool,

    /// IRQ when target reached (bit 4)
    pub irq_on_target: bool,

    /// IRQ when max value (0xFFFF) reached (bit 5)
    pub irq_on_max: bool,

    /// IRQ repeat mode (bit 6)
    pub irq_repeat: bool,

    /// IRQ toggle mode (bit 7) - 0=pulse, 1=toggle
    pub irq_toggle: bool,

    /// Clock source (bits 8-9)
    /// - Timer 0: values 0,2=system clock, 1,3=dot clock
    /// - Timer 1: values 0,2=system clock, 1,3=hblank
    /// - Timer 2: values 0,1=system clock, 2,3=system clock / 8
    pub clock_source: u8,
}

impl TimerMode {
    /// Decode the writable bits 0-9 of a mode register value
    pub fn from_bits(value: u16) -> Self {
        Self {
            sync_enable: value & 0x0001 != 0,
            sync_mode: ((value >> 1) & 0x03) as u8,
            reset_on_target: value & 0x0008 != 0,
            irq_on_target: value & 0x0010 != 0,
            irq_on_max: value & 0x0020 != 0,
            irq_repeat: value & 0x0040 != 0,
            irq_toggle: value & 0x0080 != 0,
            clock_source: ((value >> 8) & 0x03) as u8,
        }
    }

    /// Encode back into bits 0-9
    pub fn bits(&self) -> u16 {
        (self.sync_enable as u16)
            | ((self.sync_mode as u16) << 1)
            | ((self.reset_on_target as u16) << 3)
            | ((self.irq_on_target as u16) << 4)
            | ((self.irq_on_max as u16) << 5)
            | ((self.irq_repeat as u16) << 6)
            | ((self.irq_toggle as u16) << 7)
            | ((self.clock_source as u16) << 8)
    }
}

/// What a channel is clocked by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    /// CPU clock
    System,
    /// CPU clock / 8
    SystemDiv8,
    /// GPU dot clock
    DotClock,
    /// One tick per hblank pulse
    Hblank,
}

/// Target / 0xFFFF crossings produced by one counter advance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Crossings {
    target: u64,
    max: u64,
}

/// Number of times a counter `distance` ticks away from a value reaches it
/// within `ticks`, when it comes back every `period` ticks.
fn passes(distance: u64, period: u64, ticks: u64) -> u64 {
    let first = if distance == 0 { period } else { distance };
    if ticks < first {
        0
    } else {
        1 + (ticks - first) / period
    }
}

/// A single timer channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerChannel {
    /// Current counter value
    counter: u16,

    /// Counter mode/control
    mode: TimerMode,

    /// Target value (for compare interrupt)
    target: u16,

    /// Channel number (0-2)
    channel_id: u8,

    /// Mode bit 10, active low
    irq_line: bool,

    /// Mode bit 11
    reached_target: bool,

    /// Mode bit 12
    reached_max: bool,

    /// One-shot interrupt already delivered since the last mode write
    irq_fired: bool,

    /// Inside the blanking period this channel syncs to
    in_blank: bool,

    /// Sync mode 3 latch (set on first blank, cleared on mode write)
    sync_latched: bool,

    /// Fractional clock remainder for the divided clock sources
    prescale: u64,
}

impl TimerChannel {
    /// Create a new timer channel
    ///
    /// # Arguments
    ///
    /// * `channel_id` - The timer channel number (0-2)
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::timer::TimerChannel;
    ///
    /// let timer = TimerChannel::new(0);
    /// assert_eq!(timer.read_counter(), 0);
    /// ```
    pub fn new(channel_id: u8) -> Self {
        Self {
            counter: 0,
            mode: TimerMode::default(),
            target: 0,
            channel_id,
            irq_line: true,
            reached_target: false,
            reached_max: false,
            irq_fired: false,
            in_blank: false,
            sync_latched: false,
            prescale: 0,
        }
    }

    /// Read counter value
    #[inline(always)]
    pub fn read_counter(&self) -> u16 {
        self.counter
    }

    /// Write counter value
    pub fn write_counter(&mut self, value: u16) {
        self.counter = value;
        log::trace!("Timer {} counter = 0x{:04X}", self.channel_id, value);
    }

    /// Read mode register
    ///
    /// Reading clears the reached-target and reached-max flags. In pulse mode
    /// the request bit goes back to 1.
    pub fn read_mode(&mut self) -> u16 {
        let value = self.peek_mode();

        self.reached_target = false;
        self.reached_max = false;
        if !self.mode.irq_toggle {
            self.irq_line = true;
        }

        value
    }

    /// Mode register value without the read side effects
    pub fn peek_mode(&self) -> u16 {
        self.mode.bits()
            | ((self.irq_line as u16) << 10)
            | ((self.reached_target as u16) << 11)
            | ((self.reached_max as u16) << 12)
    }

    /// Write mode register
    ///
    /// Resets the counter, sets the request bit and re-arms a one-shot IRQ.
    pub fn write_mode(&mut self, value: u16) {
        self.mode = TimerMode::from_bits(value);

        self.counter = 0;
        self.irq_line = true;
        self.irq_fired = false;
        self.sync_latched = false;
        self.prescale = 0;

        log::debug!(
            "Timer {} mode: sync={}/{} source={} target_irq={} max_irq={} reset={}",
            self.channel_id,
            self.mode.sync_enable,
            self.mode.sync_mode,
            self.mode.clock_source,
            self.mode.irq_on_target,
            self.mode.irq_on_max,
            self.mode.reset_on_target
        );
    }

    /// Read target value
    #[inline(always)]
    pub fn read_target(&self) -> u16 {
        self.target
    }

    /// Write target value
    pub fn write_target(&mut self, value: u16) {
        self.target = value;
        log::trace!("Timer {} target = 0x{:04X}", self.channel_id, value);
    }

    /// Decoded mode
    pub fn mode(&self) -> &TimerMode {
        &self.mode
    }

    /// Clock source selected by the mode register
    pub fn clock_source(&self) -> ClockSource {
        match (self.channel_id, self.mode.clock_source) {
            (0, 1) | (0, 3) => ClockSource::DotClock,
            (1, 1) | (1, 3) => ClockSource::Hblank,
            (2, 2) | (2, 3) => ClockSource::SystemDiv8,
            _ => ClockSource::System,
        }
    }

    /// Whether the sync mode currently lets the counter run
    ///
    /// Timer 0 syncs to hblank and timer 1 to vblank:
    /// - Mode 0: pause during blank
    /// - Mode 1: free-run, reset at blank start
    /// - Mode 2: reset at blank start, pause outside blank
    /// - Mode 3: pause until the first blank, then free-run
    ///
    /// Timer 2 stops in modes 0 and 3 and free-runs in modes 1 and 2.
    pub fn is_counting(&self) -> bool {
        if !self.mode.sync_enable {
            return true;
        }

        if self.channel_id == 2 {
            return matches!(self.mode.sync_mode, 1 | 2);
        }

        match self.mode.sync_mode {
            0 => !self.in_blank,
            1 => true,
            2 => self.in_blank,
            _ => self.sync_latched,
        }
    }

    /// Convert elapsed CPU cycles into counter ticks
    fn ticks_for(&mut self, cycles: u32, dot_divider: u32) -> u64 {
        if !self.is_counting() {
            return 0;
        }

        let cycles = cycles as u64;
        match self.clock_source() {
            ClockSource::System => cycles,
            ClockSource::Hblank => 0,
            ClockSource::SystemDiv8 => {
                self.prescale += cycles;
                let ticks = self.prescale / 8;
                self.prescale %= 8;
                ticks
            }
            ClockSource::DotClock => {
                let den = GPU_CLOCK_DEN * dot_divider.max(1) as u64;
                self.prescale += cycles * GPU_CLOCK_NUM;
                let ticks = self.prescale / den;
                self.prescale %= den;
                ticks
            }
        }
    }

    /// Move the counter forward by `ticks` in closed form
    fn advance_counter(&mut self, ticks: u64) -> Crossings {
        let mut hits = Crossings::default();
        let mut c = self.counter as u64;
        let mut remaining = ticks;
        let target = self.target as u64;

        if self.mode.reset_on_target && c > target {
            // Past the target: the counter has to wrap through 0xFFFF first
            let to_wrap = 0x1_0000 - c;
            if remaining < to_wrap {
                if c < 0xFFFF && c + remaining >= 0xFFFF {
                    hits.max += 1;
                }
                self.counter = (c + remaining) as u16;
                return hits;
            }
            if c < 0xFFFF {
                hits.max += 1;
            }
            if target == 0 {
                hits.target += 1;
            }
            remaining -= to_wrap;
            c = 0;
        }

        if self.mode.reset_on_target {
            let period = target + 1;
            hits.target += passes(target - c, period, remaining);
            if target == 0xFFFF {
                hits.max += hits.target;
            }
            self.counter = ((c + remaining) % period) as u16;
        } else {
            let period = 0x1_0000;
            hits.target += passes((target + period - c) % period, period, remaining);
            hits.max += passes((0xFFFF + period - c) % period, period, remaining);
            self.counter = ((c + remaining) % period) as u16;
        }

        hits
    }

    /// Count `ticks` and decide whether the channel raises its interrupt
    ///
    /// # Returns
    ///
    /// `true` if the interrupt controller should latch this timer's source
    fn count(&mut self, ticks: u64) -> bool {
        if ticks == 0 {
            return false;
        }

        let hits = self.advance_counter(ticks);
        if hits.target > 0 {
            self.reached_target = true;
        }
        if hits.max > 0 {
            self.reached_max = true;
        }

        let events = if self.mode.irq_on_target { hits.target } else { 0 }
            + if self.mode.irq_on_max { hits.max } else { 0 };
        if events == 0 {
            return false;
        }

        self.signal_irq(events)
    }

    /// Apply `events` interrupt conditions to the request bit
    fn signal_irq(&mut self, events: u64) -> bool {
        if !self.mode.irq_repeat && self.irq_fired {
            return false;
        }
        self.irq_fired = true;

        if self.mode.irq_toggle {
            let flips = if self.mode.irq_repeat { events } else { 1 };
            let started_high = self.irq_line;
            if flips % 2 == 1 {
                self.irq_line = !self.irq_line;
            }
            // Only a 1 -> 0 edge requests an interrupt
            let raise = started_high || flips >= 2;
            if raise {
                log::trace!("Timer {} IRQ (toggle)", self.channel_id);
            }
            raise
        } else {
            self.irq_line = false;
            log::trace!("Timer {} IRQ", self.channel_id);
            true
        }
    }

    /// Start of the blanking period this channel syncs to
    fn blank_begin(&mut self) {
        self.in_blank = true;
        if !self.mode.sync_enable || self.channel_id == 2 {
            return;
        }
        match self.mode.sync_mode {
            1 | 2 => self.counter = 0,
            3 => self.sync_latched = true,
            _ => {}
        }
    }

    /// End of the blanking period this channel syncs to
    fn blank_end(&mut self) {
        self.in_blank = false;
    }

    /// Return to the power-on state
    pub fn reset(&mut self) {
        *self = Self::new(self.channel_id);
    }
}

/// Timer system managing all 3 timer channels
///
/// # Example
///
/// ```
/// use psrx_core::core::timer::Timers;
///
/// let mut timers = Timers::new();
/// timers.channel_mut(2).write_target(100);
/// timers.advance(40);
/// assert_eq!(timers.channel(2).read_counter(), 40);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timers {
    /// The 3 timer channels
    channels: [TimerChannel; 3],

    /// GPU clock cycles per dot for the current horizontal resolution
    dot_divider: u32,

    #[serde(skip)]
    irq: InterruptLine,
}

impl Timers {
    /// Create a new timer system
    pub fn new() -> Self {
        Self {
            channels: [TimerChannel::new(0), TimerChannel::new(1), TimerChannel::new(2)],
            dot_divider: 8,
            irq: InterruptLine::default(),
        }
    }

    /// Create a timer system raising interrupts on `irq`
    pub fn with_interrupt_line(irq: InterruptLine) -> Self {
        Self {
            irq,
            ..Self::new()
        }
    }

    /// Get a reference to a timer channel
    ///
    /// # Panics
    ///
    /// Panics if `index` is not 0-2
    pub fn channel(&self, index: usize) -> &TimerChannel {
        &self.channels[index]
    }

    /// Get a mutable reference to a timer channel
    ///
    /// # Panics
    ///
    /// Panics if `index` is not 0-2
    pub fn channel_mut(&mut self, index: usize) -> &mut TimerChannel {
        &mut self.channels[index]
    }

    /// Advance every channel by `cycles` CPU cycles
    ///
    /// # Arguments
    ///
    /// * `cycles` - Elapsed CPU cycles since the previous call
    pub fn advance(&mut self, cycles: u32) {
        for index in 0..3 {
            let ticks = self.channels[index].ticks_for(cycles, self.dot_divider);
            if self.channels[index].count(ticks) {
                self.irq.raise(InterruptSource::timer(index));
            }
        }
    }

    /// Horizontal blank started
    ///
    /// Clocks timer 1 when it counts hblanks and drives timer 0's sync mode.
    pub fn hblank_begin(&mut self) {
        self.channels[0].blank_begin();

        let timer1 = &mut self.channels[1];
        if timer1.clock_source() == ClockSource::Hblank && timer1.is_counting() && timer1.count(1)
        {
            self.irq.raise(InterruptSource::Timer1);
        }
    }

    /// Horizontal blank ended
    pub fn hblank_end(&mut self) {
        self.channels[0].blank_end();
    }

    /// Vertical blank started
    pub fn vblank_begin(&mut self) {
        self.channels[1].blank_begin();
    }

    /// Vertical blank ended
    pub fn vblank_end(&mut self) {
        self.channels[1].blank_end();
    }

    /// Set the GPU clocks per dot used by timer 0's dot clock source
    pub fn set_dot_clock_divider(&mut self, divider: u32) {
        self.dot_divider = divider.max(1);
    }

    /// Return every channel to the power-on state
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
        self.dot_divider = 8;
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}

impl IODevice for Timers {
    fn name(&self) -> &str {
        "Timers"
    }

    fn handle_read(&mut self, offset: u32, width: AccessWidth) -> u32 {
        let index = (offset >> 4) as usize;
        if index > 2 {
            return 0;
        }
        let channel = &mut self.channels[index];
        let register = match offset & 0x0C {
            0x00 => channel.read_counter(),
            0x04 => channel.read_mode(),
            0x08 => channel.read_target(),
            _ => 0,
        };
        read_lane(register as u32, offset, width)
    }

    fn handle_write(&mut self, offset: u32, width: AccessWidth, value: u32) {
        let index = (offset >> 4) as usize;
        if index > 2 {
            return;
        }
        let channel = &mut self.channels[index];
        match offset & 0x0C {
            0x00 => {
                let merged = write_lane(channel.read_counter() as u32, offset, width, value);
                channel.write_counter(merged as u16);
            }
            0x04 => {
                let merged = write_lane(channel.mode().bits() as u32, offset, width, value);
                channel.write_mode(merged as u16);
            }
            0x08 => {
                let merged = write_lane(channel.read_target() as u32, offset, width, value);
                channel.write_target(merged as u16);
            }
            _ => {}
        }
    }

    fn connect(&mut self, link: DeviceLink) {
        self.irq = link.irq;
    }

    fn advance(&mut self, cycles: u32) {
        Timers::advance(self, cycles);
    }

    fn reset(&mut self) {
        Timers::reset(self);
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        encode_state(self)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        let mut state: Timers = decode_state(data)?;
        state.irq = self.irq.clone();
        *self = state;
        Ok(())
    }
}

/// Handle through which the graphics unit delivers blanking pulses
///
/// A default handle drives a private timer block of its own.
#[derive(Debug, Clone, Default)]
pub struct TimerSync {
    timers: Rc<RefCell<Timers>>,
}

impl TimerSync {
    /// Build a handle driving `timers`
    pub fn new(timers: Rc<RefCell<Timers>>) -> Self {
        Self { timers }
    }

    pub fn hblank_begin(&self) {
        self.timers.borrow_mut().hblank_begin();
    }

    pub fn hblank_end(&self) {
        self.timers.borrow_mut().hblank_end();
    }

    pub fn vblank_begin(&self) {
        self.timers.borrow_mut().vblank_begin();
    }

    pub fn vblank_end(&self) {
        self.timers.borrow_mut().vblank_end();
    }

    pub fn set_dot_clock_divider(&self, divider: u32) {
        self.timers.borrow_mut().set_dot_clock_divider(divider);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::interrupt::InterruptController;
    use proptest::prelude::*;

    fn create_test_timers() -> (Timers, Rc<RefCell<InterruptController>>) {
        let controller = Rc::new(RefCell::new(InterruptController::new()));
        let timers = Timers::with_interrupt_line(InterruptLine::new(controller.clone()));
        (timers, controller)
    }

    /// Tick-by-tick model of the counter used to check the closed form
    fn reference_count(counter: u16, target: u16, reset: bool, ticks: u64) -> (u16, u64, u64) {
        let (mut c, mut t, mut m) = (counter, 0, 0);
        for _ in 0..ticks {
            c = if reset && c == target { 0 } else { c.wrapping_add(1) };
            if c == target {
                t += 1;
            }
            if c == 0xFFFF {
                m += 1;
            }
        }
        (c, t, m)
    }

    // ========== Register Tests ==========

    #[test]
    fn test_timer_channel_default() {
        let timer = TimerChannel::new(1);
        assert_eq!(timer.read_counter(), 0);
        assert_eq!(timer.read_target(), 0);
        assert_eq!(timer.peek_mode(), 1 << 10);
    }

    #[test]
    fn test_mode_bits_roundtrip() {
        let mode = TimerMode::from_bits(0x03FF);
        assert!(mode.sync_enable);
        assert_eq!(mode.sync_mode, 3);
        assert!(mode.reset_on_target && mode.irq_on_target && mode.irq_on_max);
        assert!(mode.irq_repeat && mode.irq_toggle);
        assert_eq!(mode.clock_source, 3);
        assert_eq!(mode.bits(), 0x03FF);
    }

    #[test]
    fn test_mode_write_resets_counter() {
        let mut timer = TimerChannel::new(0);
        timer.write_counter(1234);
        timer.write_mode(0x0008);
        assert_eq!(timer.read_counter(), 0);
        assert_eq!(timer.peek_mode() & (1 << 10), 1 << 10);
    }

    #[test]
    fn test_mode_read_clears_reached_flags() {
        let mut timer = TimerChannel::new(2);
        timer.write_target(5);
        timer.count(10);

        let mode = timer.read_mode();
        assert_ne!(mode & (1 << 11), 0);
        let mode = timer.read_mode();
        assert_eq!(mode & (3 << 11), 0);
    }

    // ========== Counting Tests ==========

    #[test]
    fn test_count_free_running() {
        let mut timer = TimerChannel::new(2);
        timer.count(100);
        assert_eq!(timer.read_counter(), 100);
    }

    #[test]
    fn test_counter_wraps_at_ffff() {
        let mut timer = TimerChannel::new(2);
        timer.write_counter(0xFFFE);
        timer.count(3);
        assert_eq!(timer.read_counter(), 1);
        assert_ne!(timer.peek_mode() & (1 << 12), 0);
    }

    #[test]
    fn test_reset_on_target_holds_target_for_one_tick() {
        let mut timer = TimerChannel::new(2);
        timer.write_mode(0x0008);
        timer.write_target(4);
        timer.count(4);
        assert_eq!(timer.read_counter(), 4);
        timer.count(1);
        assert_eq!(timer.read_counter(), 0);
    }

    #[test]
    fn test_multi_wrap_counter_value() {
        let mut timer = TimerChannel::new(0);
        timer.write_mode(0x0008);
        timer.write_target(10);
        let hits = timer.advance_counter(25);
        assert_eq!(timer.read_counter(), 3);
        assert_eq!(hits.target, 2);
    }

    #[test]
    fn test_reset_mode_counter_above_target_wraps_first() {
        let mut timer = TimerChannel::new(2);
        timer.write_mode(0x0008);
        timer.write_target(10);
        timer.write_counter(0xFFF0);
        let hits = timer.advance_counter(0x20);
        assert_eq!(hits.max, 1);
        // 16 ticks to wrap, then 16 more on a period of 11
        assert_eq!(timer.read_counter(), 5);
        assert_eq!(hits.target, 1);
    }

    // ========== Interrupt Tests ==========

    #[test]
    fn test_multi_wrap_raises_once() {
        let (mut timers, controller) = create_test_timers();
        // Reset on target, IRQ on target, repeat
        timers.channel_mut(0).write_mode(0x0058);
        timers.channel_mut(0).write_target(10);

        timers.advance(25);
        assert_eq!(timers.channel(0).read_counter(), 3);
        assert!(controller.borrow().is_raised(InterruptSource::Timer0));
        assert_eq!(controller.borrow().read_status(), 1 << 4);
    }

    #[test]
    fn test_one_shot_raises_only_once_until_mode_write() {
        let (mut timers, controller) = create_test_timers();
        timers.channel_mut(2).write_mode(0x0018);
        timers.channel_mut(2).write_target(5);

        timers.advance(6);
        assert!(controller.borrow().is_raised(InterruptSource::Timer2));
        controller.borrow_mut().acknowledge(0xFFFF);

        timers.advance(6);
        assert!(!controller.borrow().is_raised(InterruptSource::Timer2));

        timers.channel_mut(2).write_mode(0x0018);
        timers.advance(5);
        assert!(controller.borrow().is_raised(InterruptSource::Timer2));
    }

    #[test]
    fn test_repeat_raises_every_crossing_call() {
        let (mut timers, controller) = create_test_timers();
        timers.channel_mut(2).write_mode(0x0058);
        timers.channel_mut(2).write_target(3);

        for _ in 0..3 {
            timers.advance(4);
            assert!(controller.borrow().is_raised(InterruptSource::Timer2));
            controller.borrow_mut().acknowledge(0xFFFF);
        }
    }

    #[test]
    fn test_pulse_mode_request_bit() {
        let mut timer = TimerChannel::new(2);
        timer.write_mode(0x0058);
        timer.write_target(2);
        assert!(timer.count(3));
        assert_eq!(timer.peek_mode() & (1 << 10), 0);
        timer.read_mode();
        assert_eq!(timer.peek_mode() & (1 << 10), 1 << 10);
    }

    #[test]
    fn test_toggle_mode_flips_request_bit() {
        let mut timer = TimerChannel::new(2);
        // Reset on target, IRQ on target, repeat, toggle
        timer.write_mode(0x00D8);
        timer.write_target(1);

        // First crossing: 1 -> 0 raises
        assert!(timer.count(1));
        assert_eq!(timer.peek_mode() & (1 << 10), 0);
        // Second crossing: 0 -> 1 does not
        assert!(!timer.count(2));
        assert_eq!(timer.peek_mode() & (1 << 10), 1 << 10);
        // Two crossings in one call include a falling edge
        assert!(timer.count(4));
        assert_eq!(timer.peek_mode() & (1 << 10), 1 << 10);
    }

    #[test]
    fn test_irq_on_max() {
        let (mut timers, controller) = create_test_timers();
        timers.channel_mut(1).write_mode(0x0020);
        timers.channel_mut(1).write_counter(0xFFF0);
        timers.advance(0x0F);
        assert!(controller.borrow().is_raised(InterruptSource::Timer1));
    }

    // ========== Clock Source Tests ==========

    #[test]
    fn test_timer2_divide_by_8_accumulates() {
        let (mut timers, _) = create_test_timers();
        timers.channel_mut(2).write_mode(0x0200);
        timers.advance(5);
        assert_eq!(timers.channel(2).read_counter(), 0);
        timers.advance(5);
        assert_eq!(timers.channel(2).read_counter(), 1);
        timers.advance(70);
        assert_eq!(timers.channel(2).read_counter(), 10);
    }

    #[test]
    fn test_timer0_dot_clock() {
        let (mut timers, _) = create_test_timers();
        timers.channel_mut(0).write_mode(0x0100);
        // 56 CPU cycles = 11 dots at divider 8
        timers.advance(56);
        assert_eq!(timers.channel(0).read_counter(), 11);

        timers.set_dot_clock_divider(4);
        timers.advance(28);
        assert_eq!(timers.channel(0).read_counter(), 22);
    }

    #[test]
    fn test_timer1_hblank_clock() {
        let (mut timers, _) = create_test_timers();
        timers.channel_mut(1).write_mode(0x0100);
        timers.advance(10_000);
        assert_eq!(timers.channel(1).read_counter(), 0);
        for _ in 0..5 {
            timers.hblank_begin();
            timers.hblank_end();
        }
        assert_eq!(timers.channel(1).read_counter(), 5);
    }

    // ========== Sync Mode Tests ==========

    #[test]
    fn test_sync_mode_0_pauses_during_blank() {
        let (mut timers, _) = create_test_timers();
        timers.channel_mut(0).write_mode(0x0001);
        timers.advance(10);
        timers.hblank_begin();
        timers.advance(10);
        assert_eq!(timers.channel(0).read_counter(), 10);
        timers.hblank_end();
        timers.advance(10);
        assert_eq!(timers.channel(0).read_counter(), 20);
    }

    #[test]
    fn test_sync_mode_1_resets_at_blank() {
        let (mut timers, _) = create_test_timers();
        timers.channel_mut(1).write_mode(0x0003);
        timers.advance(50);
        timers.vblank_begin();
        assert_eq!(timers.channel(1).read_counter(), 0);
        timers.advance(7);
        assert_eq!(timers.channel(1).read_counter(), 7);
    }

    #[test]
    fn test_sync_mode_2_counts_only_in_blank() {
        let (mut timers, _) = create_test_timers();
        timers.channel_mut(0).write_mode(0x0005);
        timers.advance(50);
        assert_eq!(timers.channel(0).read_counter(), 0);
        timers.hblank_begin();
        timers.advance(9);
        timers.hblank_end();
        timers.advance(9);
        assert_eq!(timers.channel(0).read_counter(), 9);
    }

    #[test]
    fn test_sync_mode_3_waits_for_first_blank() {
        let (mut timers, _) = create_test_timers();
        timers.channel_mut(1).write_mode(0x0007);
        timers.advance(30);
        assert_eq!(timers.channel(1).read_counter(), 0);
        timers.vblank_begin();
        timers.vblank_end();
        timers.advance(30);
        assert_eq!(timers.channel(1).read_counter(), 30);
    }

    #[test]
    fn test_timer2_sync_modes() {
        let (mut timers, _) = create_test_timers();
        timers.channel_mut(2).write_mode(0x0001);
        timers.advance(10);
        assert_eq!(timers.channel(2).read_counter(), 0);
        timers.channel_mut(2).write_mode(0x0003);
        timers.advance(10);
        assert_eq!(timers.channel(2).read_counter(), 10);
    }

    // ========== Bus Interface Tests ==========

    #[test]
    fn test_register_access_through_bus_interface() {
        let (mut timers, _) = create_test_timers();
        timers.handle_write(0x18, AccessWidth::Word, 0x1234);
        timers.handle_write(0x10, AccessWidth::Half, 0x0042);
        assert_eq!(timers.handle_read(0x18, AccessWidth::Word), 0x1234);
        assert_eq!(timers.handle_read(0x10, AccessWidth::Half), 0x0042);

        timers.handle_write(0x14, AccessWidth::Word, 0x0008);
        assert_eq!(timers.channel(1).read_counter(), 0);
        assert_eq!(timers.handle_read(0x14, AccessWidth::Word) & 0x3FF, 0x0008);
    }

    #[test]
    fn test_state_roundtrip_keeps_line() {
        let (mut timers, controller) = create_test_timers();
        timers.channel_mut(2).write_mode(0x0018);
        timers.channel_mut(2).write_target(100);
        timers.advance(60);
        let blob = timers.save_state().unwrap();

        timers.advance(20);
        timers.load_state(&blob).unwrap();
        assert_eq!(timers.channel(2).read_counter(), 60);

        timers.advance(40);
        assert!(controller.borrow().is_raised(InterruptSource::Timer2));
    }

    #[test]
    fn test_sync_handle_drives_timers() {
        let timers = Rc::new(RefCell::new(Timers::new()));
        timers.borrow_mut().channel_mut(1).write_mode(0x0100);
        let sync = TimerSync::new(timers.clone());
        sync.hblank_begin();
        sync.hblank_end();
        assert_eq!(timers.borrow().channel(1).read_counter(), 1);
    }

    proptest! {
        #[test]
        fn prop_closed_form_matches_reference(
            counter in any::<u16>(),
            target in any::<u16>(),
            reset in any::<bool>(),
            ticks in 0u64..140_000,
        ) {
            let mut timer = TimerChannel::new(2);
            timer.write_mode(if reset { 0x0008 } else { 0 });
            timer.write_target(target);
            timer.write_counter(counter);

            let hits = timer.advance_counter(ticks);
            let (expected, target_hits, max_hits) = reference_count(counter, target, reset, ticks);
            prop_assert_eq!(timer.read_counter(), expected);
            prop_assert_eq!(hits.target, target_hits);
            prop_assert_eq!(hits.max, max_hits);
        }
    }
}
