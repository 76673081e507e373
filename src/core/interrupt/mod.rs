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

//! PSX Interrupt Controller Implementation
//!
//! The interrupt controller latches interrupt requests from every hardware
//! component and drives the single interrupt line into the CPU (COP0 CAUSE.IP2).
//!
//! ## Registers
//!
//! - **I_STAT** (0x1F801070): Interrupt status register (R/W)
//!   - Reading returns current interrupt flags
//!   - Writing 0 to a bit acknowledges that interrupt (clears the bit)
//!   - Writing 1 to a bit has no effect
//!
//! - **I_MASK** (0x1F801074): Interrupt mask register (R/W)
//!   - Controls which interrupts can reach the CPU
//!   - 1 = interrupt enabled, 0 = interrupt masked
//!
//! ## Interrupt Sources (Bit Positions)
//!
//! ```text
//! Bit  | Source        | Description
//! -----|---------------|----------------------------------
//! 0    | VBLANK        | Vertical blank interrupt
//! 1    | GPU           | GPU command/transfer complete
//! 2    | CDROM         | CD-ROM controller
//! 3    | DMA           | DMA transfer complete
//! 4    | TIMER0        | Timer 0 interrupt
//! 5    | TIMER1        | Timer 1 interrupt
//! 6    | TIMER2        | Timer 2 interrupt
//! 7    | CONTROLLER    | Controller/memory card
//! 8    | SIO           | Serial I/O
//! 9    | SPU           | Sound processing unit
//! 10   | LIGHTPEN      | Lightpen/IRQ10 (PIO)
//! 11-15| -             | Not used
//! ```
//!
//! Status bits are only ever cleared by an explicit acknowledge. Peripherals
//! reach the controller through an [`InterruptLine`] handle rather than a
//! direct reference, so no component needs to know who else shares it.
//!
//! ## References
//!
//! - [PSX-SPX: Interrupt Control](http://problemkaputt.de/psx-spx.htm#interruptcontrol)

use crate::core::error::Result;
use crate::core::memory::{decode_state, encode_state, read_lane, write_lane};
use crate::core::memory::{AccessWidth, IODevice};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Interrupt source bit flags
///
/// These constants represent the bit positions in I_STAT and I_MASK registers
/// for each interrupt source.
pub mod interrupts {
    /// Vertical blank interrupt (bit 0)
    pub const VBLANK: u16 = 1 << 0;

    /// GPU command/transfer complete interrupt (bit 1)
    pub const GPU: u16 = 1 << 1;

    /// CD-ROM controller interrupt (bit 2)
    pub const CDROM: u16 = 1 << 2;

    /// DMA transfer complete interrupt (bit 3)
    pub const DMA: u16 = 1 << 3;

    /// Timer 0 interrupt (bit 4)
    pub const TIMER0: u16 = 1 << 4;

    /// Timer 1 interrupt (bit 5)
    pub const TIMER1: u16 = 1 << 5;

    /// Timer 2 interrupt (bit 6)
    pub const TIMER2: u16 = 1 << 6;

    /// Controller/memory card interrupt (bit 7)
    pub const CONTROLLER: u16 = 1 << 7;

    /// Serial I/O interrupt (bit 8)
    pub const SIO: u16 = 1 << 8;

    /// Sound processing unit interrupt (bit 9)
    pub const SPU: u16 = 1 << 9;

    /// Lightpen/IRQ10 (PIO) interrupt (bit 10)
    pub const LIGHTPEN: u16 = 1 << 10;

    /// Every implemented source bit
    pub const ALL: u16 = 0x07FF;
}

/// Physical base address of the controller's register block
pub const INTERRUPT_BASE: u32 = 0x1F80_1070;

/// Size of the controller's register block in bytes
pub const INTERRUPT_SIZE: u32 = 8;

/// A hardware interrupt source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterruptSource {
    VBlank = 0,
    Gpu = 1,
    Cdrom = 2,
    Dma = 3,
    Timer0 = 4,
    Timer1 = 5,
    Timer2 = 6,
    Controller = 7,
    Sio = 8,
    Spu = 9,
    Lightpen = 10,
}

impl InterruptSource {
    /// I_STAT / I_MASK bit belonging to this source
    #[inline(always)]
    pub fn bit(self) -> u16 {
        1 << (self as u16)
    }

    /// Source for a bit index, `None` for the unused bits 11-15
    pub fn from_index(index: u32) -> Option<Self> {
        use InterruptSource::*;
        Some(match index {
            0 => VBlank,
            1 => Gpu,
            2 => Cdrom,
            3 => Dma,
            4 => Timer0,
            5 => Timer1,
            6 => Timer2,
            7 => Controller,
            8 => Sio,
            9 => Spu,
            10 => Lightpen,
            _ => return None,
        })
    }

    /// Source of timer `index` (0-2)
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::interrupt::InterruptSource;
    ///
    /// assert_eq!(InterruptSource::timer(2), InterruptSource::Timer2);
    /// ```
    pub fn timer(index: usize) -> Self {
        match index {
            0 => InterruptSource::Timer0,
            1 => InterruptSource::Timer1,
            _ => InterruptSource::Timer2,
        }
    }
}

/// PlayStation Interrupt Controller
///
/// Manages interrupt requests from all hardware components and determines
/// which interrupts reach the CPU based on the mask register.
///
/// # Example
///
/// ```
/// use psrx_core::core::interrupt::{InterruptController, InterruptSource};
///
/// let mut ic = InterruptController::new();
///
/// ic.raise(InterruptSource::VBlank);
/// assert!(!ic.pending());
///
/// ic.write_mask(InterruptSource::VBlank.bit() as u32);
/// assert!(ic.pending());
///
/// ic.acknowledge(InterruptSource::VBlank.bit());
/// assert!(!ic.pending());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptController {
    /// I_STAT (0x1F801070) - Interrupt status register
    status: u16,

    /// I_MASK (0x1F801074) - Interrupt mask register
    mask: u16,
}

impl InterruptController {
    /// Create a new interrupt controller
    ///
    /// Initializes with all interrupts cleared and masked.
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::interrupt::InterruptController;
    ///
    /// let ic = InterruptController::new();
    /// assert_eq!(ic.read_status(), 0);
    /// assert_eq!(ic.read_mask(), 0);
    /// ```
    pub fn new() -> Self {
        Self { status: 0, mask: 0 }
    }

    /// Latch an interrupt from `source`
    ///
    /// Raising a source that is already pending leaves the status unchanged.
    pub fn raise(&mut self, source: InterruptSource) {
        self.request(source.bit());
    }

    /// Latch raw interrupt bit(s)
    ///
    /// Bits outside the implemented sources are ignored.
    ///
    /// # Arguments
    ///
    /// * `bits` - Interrupt bit(s) to set (can be multiple ORed together)
    pub fn request(&mut self, bits: u16) {
        let bits = bits & interrupts::ALL;
        if self.status & bits != bits {
            self.status |= bits;
            log::trace!("IRQ requested: 0x{:04X}, status=0x{:04X}", bits, self.status);
        }
    }

    /// Acknowledge the interrupts selected by `mask`
    ///
    /// Clears exactly the status bits that are set in `mask`; every other bit
    /// keeps its value.
    ///
    /// # Arguments
    ///
    /// * `mask` - Bits to clear
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::interrupt::{InterruptController, interrupts};
    ///
    /// let mut ic = InterruptController::new();
    /// ic.request(interrupts::VBLANK | interrupts::TIMER0);
    /// ic.acknowledge(interrupts::VBLANK);
    /// assert_eq!(ic.read_status(), interrupts::TIMER0 as u32);
    /// ```
    pub fn acknowledge(&mut self, mask: u16) {
        self.status &= !mask;
        log::trace!("IRQ acknowledged, status=0x{:04X}", self.status);
    }

    /// Check whether the CPU interrupt line is asserted
    ///
    /// # Returns
    ///
    /// true if (status & mask) != 0, false otherwise
    #[inline(always)]
    pub fn pending(&self) -> bool {
        (self.status & self.mask) != 0
    }

    /// Check whether `source` is latched, regardless of the mask
    pub fn is_raised(&self, source: InterruptSource) -> bool {
        self.status & source.bit() != 0
    }

    /// Read I_STAT register
    pub fn read_status(&self) -> u32 {
        self.status as u32
    }

    /// Write I_STAT register
    ///
    /// Writing 0 to a bit acknowledges that interrupt, writing 1 leaves it.
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::interrupt::{InterruptController, interrupts};
    ///
    /// let mut ic = InterruptController::new();
    /// ic.request(interrupts::VBLANK);
    /// ic.write_status(!interrupts::VBLANK as u32);
    /// assert_eq!(ic.read_status(), 0);
    /// ```
    pub fn write_status(&mut self, value: u32) {
        self.acknowledge(!(value as u16));
    }

    /// Read I_MASK register
    pub fn read_mask(&self) -> u32 {
        self.mask as u32
    }

    /// Write I_MASK register
    ///
    /// Bits 11-15 are not implemented and read back as 0.
    ///
    /// # Arguments
    ///
    /// * `value` - Mask value to set (lower 11 bits used)
    pub fn write_mask(&mut self, value: u32) {
        self.mask = (value as u16) & interrupts::ALL;
        log::debug!("IRQ mask set: 0x{:04X}", self.mask);
    }

    /// Return to the power-on state
    pub fn reset(&mut self) {
        self.status = 0;
        self.mask = 0;
    }
}

impl IODevice for InterruptController {
    fn name(&self) -> &str {
        "Interrupt Controller"
    }

    fn handle_read(&mut self, offset: u32, width: AccessWidth) -> u32 {
        let register = match offset & !0x03 {
            0x00 => self.read_status(),
            0x04 => self.read_mask(),
            _ => 0,
        };
        read_lane(register, offset, width)
    }

    fn handle_write(&mut self, offset: u32, width: AccessWidth, value: u32) {
        match offset & !0x03 {
            // Unwritten lanes must read as 1 so they do not acknowledge anything
            0x00 => self.write_status(write_lane(0xFFFF_FFFF, offset, width, value)),
            0x04 => self.write_mask(write_lane(self.read_mask(), offset, width, value)),
            _ => {}
        }
    }

    fn reset(&mut self) {
        InterruptController::reset(self);
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        encode_state(self)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        *self = decode_state(data)?;
        Ok(())
    }
}

/// Shared handle through which components raise interrupts
///
/// Cloning the line yields another handle to the same controller. A line
/// created with [`Default`] is attached to a private controller of its own,
/// which is what a component sees before it is wired into a session.
#[derive(Debug, Clone, Default)]
pub struct InterruptLine {
    controller: Rc<RefCell<InterruptController>>,
}

impl InterruptLine {
    /// Build a line feeding `controller`
    pub fn new(controller: Rc<RefCell<InterruptController>>) -> Self {
        Self { controller }
    }

    /// Latch `source` into the controller
    pub fn raise(&self, source: InterruptSource) {
        self.controller.borrow_mut().raise(source);
    }

    /// Check whether `source` is latched in the controller
    pub fn is_raised(&self, source: InterruptSource) -> bool {
        self.controller.borrow().is_raised(source)
    }

    /// State of the CPU-visible interrupt line
    pub fn pending(&self) -> bool {
        self.controller.borrow().pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ========== Register Tests ==========

    #[test]
    fn test_new_initializes_to_zero() {
        let ic = InterruptController::new();
        assert_eq!(ic.read_status(), 0, "Status should be 0 on initialization");
        assert_eq!(ic.read_mask(), 0, "Mask should be 0 on initialization");
        assert!(!ic.pending(), "No interrupts should be pending");
    }

    #[test]
    fn test_mask_unused_bits_read_zero() {
        let mut ic = InterruptController::new();
        ic.write_mask(0xFFFF_FFFF);
        assert_eq!(ic.read_mask(), 0x07FF);
    }

    #[test]
    fn test_request_ignores_unused_bits() {
        let mut ic = InterruptController::new();
        ic.request(0xF800);
        assert_eq!(ic.read_status(), 0);
    }

    // ========== Raise / Acknowledge Tests ==========

    #[test]
    fn test_raise_sets_source_bit() {
        let mut ic = InterruptController::new();
        ic.raise(InterruptSource::Dma);
        assert_eq!(ic.read_status(), interrupts::DMA as u32);
        assert!(ic.is_raised(InterruptSource::Dma));
        assert!(!ic.is_raised(InterruptSource::Gpu));
    }

    #[test]
    fn test_raise_is_idempotent() {
        let mut ic = InterruptController::new();
        ic.raise(InterruptSource::Timer1);
        let once = ic.clone();
        ic.raise(InterruptSource::Timer1);
        ic.raise(InterruptSource::Timer1);
        assert_eq!(ic, once);
    }

    #[test]
    fn test_acknowledge_clears_exactly_mask_bits() {
        let mut ic = InterruptController::new();
        ic.request(interrupts::VBLANK | interrupts::GPU | interrupts::TIMER0);
        ic.acknowledge(interrupts::GPU);
        assert_eq!(
            ic.read_status(),
            (interrupts::VBLANK | interrupts::TIMER0) as u32
        );
    }

    #[test]
    fn test_write_status_zero_bits_acknowledge() {
        let mut ic = InterruptController::new();
        ic.request(interrupts::VBLANK | interrupts::CDROM);
        ic.write_status(!(interrupts::CDROM as u32));
        assert_eq!(ic.read_status(), interrupts::VBLANK as u32);
    }

    #[test]
    fn test_write_one_does_not_set() {
        let mut ic = InterruptController::new();
        ic.write_status(0xFFFF);
        assert_eq!(ic.read_status(), 0);
    }

    // ========== Pending Line Tests ==========

    #[test]
    fn test_pending_requires_status_and_mask() {
        let mut ic = InterruptController::new();
        ic.raise(InterruptSource::Spu);
        assert!(!ic.pending());
        ic.write_mask(interrupts::VBLANK as u32);
        assert!(!ic.pending());
        ic.write_mask(interrupts::SPU as u32);
        assert!(ic.pending());
    }

    #[test]
    fn test_raised_bit_stays_until_acknowledged() {
        let mut ic = InterruptController::new();
        ic.write_mask(interrupts::ALL as u32);
        ic.raise(InterruptSource::Timer2);
        for _ in 0..100 {
            assert!(ic.pending());
        }
        ic.acknowledge(interrupts::TIMER2);
        assert!(!ic.pending());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut ic = InterruptController::new();
        ic.write_mask(0x7FF);
        ic.request(0x7FF);
        ic.reset();
        assert_eq!(ic, InterruptController::new());
    }

    // ========== Source Tests ==========

    #[test]
    fn test_source_bits_match_constants() {
        assert_eq!(InterruptSource::VBlank.bit(), interrupts::VBLANK);
        assert_eq!(InterruptSource::Dma.bit(), interrupts::DMA);
        assert_eq!(InterruptSource::Lightpen.bit(), interrupts::LIGHTPEN);
        for index in 0..11 {
            let source = InterruptSource::from_index(index).unwrap();
            assert_eq!(source.bit(), 1 << index);
        }
        assert_eq!(InterruptSource::from_index(11), None);
    }

    // ========== Bus Interface Tests ==========

    #[test]
    fn test_bus_word_access() {
        let mut ic = InterruptController::new();
        ic.handle_write(0x04, AccessWidth::Word, 0x0009);
        assert_eq!(ic.handle_read(0x04, AccessWidth::Word), 0x0009);

        ic.request(interrupts::VBLANK | interrupts::DMA);
        ic.handle_write(0x00, AccessWidth::Word, !(interrupts::DMA as u32));
        assert_eq!(ic.handle_read(0x00, AccessWidth::Word), 0x0001);
    }

    #[test]
    fn test_bus_halfword_status_write() {
        let mut ic = InterruptController::new();
        ic.request(interrupts::VBLANK | interrupts::GPU);
        ic.handle_write(0x00, AccessWidth::Half, 0xFFFE);
        assert_eq!(ic.read_status(), interrupts::GPU as u32);
    }

    #[test]
    fn test_bus_upper_byte_write_keeps_low_bits() {
        let mut ic = InterruptController::new();
        ic.request(interrupts::VBLANK | interrupts::SPU);
        // Acknowledge SPU (bit 9) through the second byte lane
        ic.handle_write(0x01, AccessWidth::Byte, 0xFD);
        assert_eq!(ic.read_status(), interrupts::VBLANK as u32);
    }

    #[test]
    fn test_state_roundtrip() {
        let mut ic = InterruptController::new();
        ic.write_mask(0x55);
        ic.request(0x0F);
        let blob = ic.save_state().unwrap();

        let mut restored = InterruptController::new();
        restored.load_state(&blob).unwrap();
        assert_eq!(restored, ic);
    }

    // ========== Interrupt Line Tests ==========

    #[test]
    fn test_line_raises_into_shared_controller() {
        let controller = Rc::new(RefCell::new(InterruptController::new()));
        let line = InterruptLine::new(controller.clone());
        let other = line.clone();

        line.raise(InterruptSource::Cdrom);
        other.raise(InterruptSource::Cdrom);
        assert_eq!(controller.borrow().read_status(), interrupts::CDROM as u32);
        assert!(other.is_raised(InterruptSource::Cdrom));
    }

    proptest! {
        #[test]
        fn prop_raise_n_times_equals_once(index in 0u32..11, n in 2usize..20, initial in any::<u16>()) {
            let source = InterruptSource::from_index(index).unwrap();
            let mut once = InterruptController::new();
            once.request(initial);
            let mut many = once.clone();

            once.raise(source);
            for _ in 0..n {
                many.raise(source);
            }
            prop_assert_eq!(once, many);
        }

        #[test]
        fn prop_acknowledge_clears_only_masked_bits(status in any::<u16>(), ack in any::<u16>()) {
            let mut ic = InterruptController::new();
            ic.request(status);
            ic.acknowledge(ack);
            prop_assert_eq!(ic.read_status() as u16, status & interrupts::ALL & !ack);
        }
    }
}
