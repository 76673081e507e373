// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut

//! I/O Port Decode Table
//!
//! Hardware registers are not matched by a hand-written address switch. Each
//! register block registers itself once into a sorted table of windows, and
//! the bus looks an address up with a binary search:
//!
//! - **Interrupts**: I_STAT / I_MASK (0x1F801070)
//! - **DMA**: channel registers, DPCR and DICR (0x1F801080)
//! - **Timers**: three root counters (0x1F801100)
//! - **GPU**: GP0 / GP1 (0x1F801810)
//! - **Peripherals**: CD-ROM, MDEC, SPU, controller and serial ports, PIO
//!
//! A miss in the table is open bus. The same table serves DMA: a channel is
//! routed to one registered device, and DMA words flow through
//! [`IODevice::consume_dma_word`] and [`IODevice::produce_dma_word`].

use super::{AccessWidth, Bus, DeviceLink, IODevice};
use crate::core::error::{EmulatorError, Result};
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to a registered device
pub type SharedDevice = Rc<RefCell<dyn IODevice>>;

/// Number of DMA channels that can be routed
const DMA_CHANNELS: usize = 7;

pub(super) struct DeviceEntry {
    pub(super) name: String,
    /// Physical address that maps to offset 0
    pub(super) base: u32,
    pub(super) device: SharedDevice,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct Window {
    pub(super) start: u32,
    /// Inclusive end
    pub(super) end: u32,
    pub(super) index: usize,
}

/// Fixed attachment points for peripherals outside the core
///
/// Each slot names the register window the hardware decodes for that
/// peripheral and the DMA channels wired to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeripheralSlot {
    /// CD-ROM controller (DMA3)
    Cdrom,
    /// Macroblock decoder (DMA0 in, DMA1 out)
    Mdec,
    /// Sound processing unit (DMA4)
    Spu,
    /// Controller and memory card ports
    Pad,
    /// Serial port
    Sio,
    /// Parallel port expansion (DMA5)
    Pio,
}

impl PeripheralSlot {
    /// Every slot
    pub const ALL: [PeripheralSlot; 6] = [
        PeripheralSlot::Cdrom,
        PeripheralSlot::Mdec,
        PeripheralSlot::Spu,
        PeripheralSlot::Pad,
        PeripheralSlot::Sio,
        PeripheralSlot::Pio,
    ];

    /// Physical base address of the slot's register window
    pub fn base(self) -> u32 {
        match self {
            PeripheralSlot::Cdrom => 0x1F80_1800,
            PeripheralSlot::Mdec => 0x1F80_1820,
            PeripheralSlot::Spu => 0x1F80_1C00,
            PeripheralSlot::Pad => 0x1F80_1040,
            PeripheralSlot::Sio => 0x1F80_1050,
            PeripheralSlot::Pio => Bus::EXP1_START,
        }
    }

    /// Size in bytes of the slot's register window
    pub fn size(self) -> u32 {
        match self {
            PeripheralSlot::Cdrom => 4,
            PeripheralSlot::Mdec => 8,
            PeripheralSlot::Spu => 0x400,
            PeripheralSlot::Pad | PeripheralSlot::Sio => 0x10,
            PeripheralSlot::Pio => Bus::EXP1_END - Bus::EXP1_START + 1,
        }
    }

    /// DMA channels served by the slot
    pub fn dma_channels(self) -> &'static [usize] {
        match self {
            PeripheralSlot::Cdrom => &[3],
            PeripheralSlot::Mdec => &[0, 1],
            PeripheralSlot::Spu => &[4],
            PeripheralSlot::Pio => &[5],
            PeripheralSlot::Pad | PeripheralSlot::Sio => &[],
        }
    }
}

impl Bus {
    /// Register a device over `size` bytes starting at physical `start`
    ///
    /// Accesses inside the window reach the device with an offset relative
    /// to `start`.
    ///
    /// # Returns
    ///
    /// The device index, used by [`Bus::map_window`] and [`Bus::route_dma`]
    ///
    /// # Errors
    ///
    /// - `EmulatorError::AddressConflict` if the window overlaps RAM, the
    ///   scratchpad, BIOS or an already registered window
    /// - `EmulatorError::Config` if `size` is zero or the window wraps
    ///
    /// # Example
    ///
    /// ```
    /// use psrx_core::core::interrupt::{InterruptController, INTERRUPT_BASE, INTERRUPT_SIZE};
    /// use psrx_core::core::memory::Bus;
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let mut bus = Bus::new();
    /// let controller = Rc::new(RefCell::new(InterruptController::new()));
    /// bus.register_device(INTERRUPT_BASE, INTERRUPT_SIZE, controller).unwrap();
    ///
    /// bus.write32(0x1F801074, 0x0001);
    /// assert_eq!(bus.read32(0x1F801074), 0x0001);
    /// ```
    pub fn register_device(
        &mut self,
        start: u32,
        size: u32,
        device: SharedDevice,
    ) -> Result<usize> {
        let index = self.devices.len();
        let name = device.borrow().name().to_string();
        self.insert_window(start, size, index, &name)?;
        log::debug!(
            "Registered {} at 0x{:08X}-0x{:08X}",
            name,
            start,
            start + size - 1
        );
        self.devices.push(DeviceEntry {
            name,
            base: start,
            device,
        });
        Ok(index)
    }

    /// Map an additional window onto an already registered device
    ///
    /// Offsets inside the extra window are still measured from the device's
    /// primary base, so a device registered at 0x1F801000 and mapped again at
    /// 0x1F801060 sees offset 0x60.
    pub fn map_window(&mut self, index: usize, start: u32, size: u32) -> Result<()> {
        let name = match self.devices.get(index) {
            Some(entry) => entry.name.clone(),
            None => {
                return Err(EmulatorError::Config(format!(
                    "no device registered at index {}",
                    index
                )))
            }
        };
        if start < self.devices[index].base {
            return Err(EmulatorError::Config(format!(
                "window 0x{:08X} lies below the base of {}",
                start, name
            )));
        }
        self.insert_window(start, size, index, &name)
    }

    fn insert_window(&mut self, start: u32, size: u32, index: usize, name: &str) -> Result<()> {
        if size == 0 {
            return Err(EmulatorError::Config(format!(
                "{} registered with an empty window",
                name
            )));
        }
        let end = start.checked_add(size - 1).ok_or_else(|| {
            EmulatorError::Config(format!("{} window at 0x{:08X} wraps", name, start))
        })?;

        let fixed = [
            (Self::RAM_START, Self::RAM_MIRROR_END, "RAM"),
            (Self::SCRATCHPAD_START, Self::SCRATCHPAD_END, "Scratchpad"),
            (Self::BIOS_START, Self::BIOS_END, "BIOS"),
        ];
        for (fixed_start, fixed_end, fixed_name) in fixed {
            if start <= fixed_end && fixed_start <= end {
                return Err(EmulatorError::AddressConflict {
                    start,
                    end,
                    existing: fixed_name.to_string(),
                });
            }
        }

        let position = self.windows.partition_point(|window| window.start < start);
        let neighbours = [position.checked_sub(1), Some(position)];
        for neighbour in neighbours.into_iter().flatten() {
            if let Some(window) = self.windows.get(neighbour) {
                if start <= window.end && window.start <= end {
                    return Err(EmulatorError::AddressConflict {
                        start,
                        end,
                        existing: self.devices[window.index].name.clone(),
                    });
                }
            }
        }

        self.windows.insert(position, Window { start, end, index });
        Ok(())
    }

    /// Route DMA `channel` to the device at `index`
    ///
    /// # Errors
    ///
    /// `EmulatorError::InvalidDmaChannel` for channels above 6, or
    /// `EmulatorError::Config` if no such device is registered
    pub fn route_dma(&mut self, channel: usize, index: usize) -> Result<()> {
        if channel >= DMA_CHANNELS {
            return Err(EmulatorError::InvalidDmaChannel(channel));
        }
        let name = match self.devices.get(index) {
            Some(entry) => entry.name.clone(),
            None => {
                return Err(EmulatorError::Config(format!(
                    "no device registered at index {}",
                    index
                )))
            }
        };
        self.dma_routes[channel] = Some(index);
        log::debug!("DMA{} routed to {}", channel, name);
        Ok(())
    }

    /// Whether a device answers DMA `channel`
    pub fn has_dma_route(&self, channel: usize) -> bool {
        self.dma_routes.get(channel).copied().flatten().is_some()
    }

    /// Hand one memory-to-device DMA word to the device routed to `channel`
    pub fn dma_consume(&mut self, channel: usize, word: u32) {
        match self.dma_device(channel) {
            Some(device) => device.borrow_mut().consume_dma_word(channel, word),
            None => log::warn!(
                "DMA{} word 0x{:08X} dropped: no device routed",
                channel,
                word
            ),
        }
    }

    /// Fetch one device-to-memory DMA word from the device routed to `channel`
    ///
    /// Returns the open-bus value when nothing is routed.
    pub fn dma_produce(&mut self, channel: usize) -> u32 {
        match self.dma_device(channel) {
            Some(device) => device.borrow_mut().produce_dma_word(channel),
            None => {
                log::warn!("DMA{} read with no device routed", channel);
                self.open_bus_value
            }
        }
    }

    fn dma_device(&self, channel: usize) -> Option<SharedDevice> {
        let index = self.dma_routes.get(channel).copied().flatten()?;
        self.devices.get(index).map(|entry| Rc::clone(&entry.device))
    }

    /// Find the device window containing physical `paddr`
    fn lookup(&self, paddr: u32) -> Option<(usize, u32)> {
        let position = self.windows.partition_point(|window| window.start <= paddr);
        let window = self.windows.get(position.checked_sub(1)?)?;
        if paddr > window.end {
            return None;
        }
        let entry = &self.devices[window.index];
        Some((window.index, paddr - entry.base))
    }

    pub(super) fn device_read(&mut self, paddr: u32, width: AccessWidth) -> Option<u32> {
        let (index, offset) = self.lookup(paddr)?;
        let entry = &self.devices[index];
        let value = entry.device.borrow_mut().handle_read(offset, width) & width.mask();
        log::trace!(
            "{} read at 0x{:08X} (+0x{:X}) -> 0x{:08X}",
            entry.name,
            paddr,
            offset,
            value
        );
        Some(value)
    }

    pub(super) fn device_write(&mut self, paddr: u32, width: AccessWidth, value: u32) -> bool {
        let Some((index, offset)) = self.lookup(paddr) else {
            return false;
        };
        let entry = &self.devices[index];
        log::trace!(
            "{} write at 0x{:08X} (+0x{:X}) = 0x{:08X}",
            entry.name,
            paddr,
            offset,
            value
        );
        entry.device.borrow_mut().handle_write(offset, width, value);
        true
    }

    /// Hand every device its interrupt and timer handles
    pub fn connect_devices(&self, link: &DeviceLink) {
        for entry in &self.devices {
            entry.device.borrow_mut().connect(link.clone());
        }
    }

    /// Advance every registered device by `cycles`
    ///
    /// Devices run in registration order.
    pub fn advance_devices(&mut self, cycles: u32) {
        if cycles == 0 {
            return;
        }
        for entry in &self.devices {
            entry.device.borrow_mut().advance(cycles);
        }
    }

    /// Cycles until the earliest device event, if any device has one queued
    pub fn next_device_event(&self) -> Option<u32> {
        self.devices
            .iter()
            .filter_map(|entry| entry.device.borrow().cycles_until_event())
            .min()
    }

    /// Number of registered devices
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Names of registered devices, in registration order
    pub fn device_names(&self) -> Vec<String> {
        self.devices.iter().map(|entry| entry.name.clone()).collect()
    }

    /// Shared handle to the device at `index`
    pub fn device(&self, index: usize) -> Option<SharedDevice> {
        self.devices.get(index).map(|entry| Rc::clone(&entry.device))
    }

    /// Serialize every device's state, tagged with its name
    pub fn save_device_states(&self) -> Result<Vec<(String, Vec<u8>)>> {
        self.devices
            .iter()
            .map(|entry| Ok((entry.name.clone(), entry.device.borrow().save_state()?)))
            .collect()
    }

    /// Check that `states` was saved from a bus with the same device layout
    pub fn validate_device_states(&self, states: &[(String, Vec<u8>)]) -> Result<()> {
        if states.len() != self.devices.len() {
            return Err(EmulatorError::SnapshotMismatch(format!(
                "snapshot has {} devices, session has {}",
                states.len(),
                self.devices.len()
            )));
        }
        for ((name, _), entry) in states.iter().zip(&self.devices) {
            if *name != entry.name {
                return Err(EmulatorError::SnapshotMismatch(format!(
                    "snapshot device '{}' where session has '{}'",
                    name, entry.name
                )));
            }
        }
        Ok(())
    }

    /// Restore device states saved by [`Bus::save_device_states`]
    ///
    /// Stops at the first device that rejects its blob; callers wanting an
    /// all-or-nothing restore keep their own copy to roll back to.
    pub fn load_device_states(&mut self, states: &[(String, Vec<u8>)]) -> Result<()> {
        self.validate_device_states(states)?;
        for ((_, blob), entry) in states.iter().zip(&self.devices) {
            entry.device.borrow_mut().load_state(blob)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::{read_lane, write_lane};

    /// Register file that remembers the last DMA words it saw
    #[derive(Default)]
    struct TestDevice {
        name: &'static str,
        registers: [u32; 4],
        received: Vec<(usize, u32)>,
        next_word: u32,
        advanced: u32,
    }

    impl TestDevice {
        fn shared(name: &'static str) -> Rc<RefCell<TestDevice>> {
            Rc::new(RefCell::new(TestDevice {
                name,
                ..TestDevice::default()
            }))
        }
    }

    impl IODevice for TestDevice {
        fn name(&self) -> &str {
            self.name
        }

        fn handle_read(&mut self, offset: u32, width: AccessWidth) -> u32 {
            read_lane(self.registers[(offset as usize / 4) % 4], offset, width)
        }

        fn handle_write(&mut self, offset: u32, width: AccessWidth, value: u32) {
            let index = (offset as usize / 4) % 4;
            self.registers[index] = write_lane(self.registers[index], offset, width, value);
        }

        fn consume_dma_word(&mut self, channel: usize, word: u32) {
            self.received.push((channel, word));
        }

        fn produce_dma_word(&mut self, _channel: usize) -> u32 {
            self.next_word += 1;
            self.next_word
        }

        fn advance(&mut self, cycles: u32) {
            self.advanced += cycles;
        }

        fn cycles_until_event(&self) -> Option<u32> {
            Some(100 - self.advanced.min(99))
        }

        fn save_state(&self) -> Result<Vec<u8>> {
            crate::core::memory::encode_state(&self.registers)
        }

        fn load_state(&mut self, data: &[u8]) -> Result<()> {
            self.registers = crate::core::memory::decode_state(data)?;
            Ok(())
        }
    }

    // ========== Registration Tests ==========

    #[test]
    fn test_register_and_access_device() {
        let mut bus = Bus::new();
        let device = TestDevice::shared("Test");
        bus.register_device(0x1F80_1800, 0x10, device.clone()).unwrap();

        bus.write32(0xBF80_1804, 0xDEAD_BEEF);
        assert_eq!(device.borrow().registers[1], 0xDEAD_BEEF);
        assert_eq!(bus.read16(0x1F80_1806), 0xDEAD);
        assert_eq!(bus.read8(0x9F80_1805), 0xBE);
    }

    #[test]
    fn test_gap_in_table_is_open_bus() {
        let mut bus = Bus::new();
        bus.register_device(0x1F80_1800, 4, TestDevice::shared("Test"))
            .unwrap();
        assert_eq!(bus.read32(0x1F80_1804), 0xFFFF_FFFF);
        assert_eq!(bus.read32(0x1F80_17FC), 0xFFFF_FFFF);
    }

    #[test]
    fn test_overlapping_registration_rejected() {
        let mut bus = Bus::new();
        bus.register_device(0x1F80_1800, 0x10, TestDevice::shared("First"))
            .unwrap();
        let err = bus
            .register_device(0x1F80_180C, 0x10, TestDevice::shared("Second"))
            .unwrap_err();
        match err {
            EmulatorError::AddressConflict { existing, .. } => assert_eq!(existing, "First"),
            other => panic!("unexpected error {:?}", other),
        }
        // Adjacent windows are fine
        bus.register_device(0x1F80_1810, 0x10, TestDevice::shared("Third"))
            .unwrap();
        assert_eq!(bus.device_count(), 2);
    }

    #[test]
    fn test_overlap_with_fixed_region_rejected() {
        let mut bus = Bus::new();
        let err = bus
            .register_device(0x0000_1000, 0x10, TestDevice::shared("Bad"))
            .unwrap_err();
        assert!(matches!(err, EmulatorError::AddressConflict { .. }));
    }

    #[test]
    fn test_empty_window_rejected() {
        let mut bus = Bus::new();
        let err = bus
            .register_device(0x1F80_1800, 0, TestDevice::shared("Empty"))
            .unwrap_err();
        assert!(matches!(err, EmulatorError::Config(_)));
    }

    #[test]
    fn test_map_window_keeps_primary_base() {
        let mut bus = Bus::new();
        let device = TestDevice::shared("Control");
        let index = bus.register_device(0x1F80_1000, 0x8, device.clone()).unwrap();
        bus.map_window(index, 0x1F80_100C, 4).unwrap();

        bus.write32(0x1F80_100C, 0x55);
        assert_eq!(device.borrow().registers[3], 0x55);
    }

    // ========== DMA Routing Tests ==========

    #[test]
    fn test_dma_routing() {
        let mut bus = Bus::new();
        let device = TestDevice::shared("Spu");
        let index = bus.register_device(0x1F80_1C00, 0x400, device.clone()).unwrap();
        bus.route_dma(4, index).unwrap();

        assert!(bus.has_dma_route(4));
        assert!(!bus.has_dma_route(2));
        bus.dma_consume(4, 0x1234);
        assert_eq!(device.borrow().received, vec![(4, 0x1234)]);
        assert_eq!(bus.dma_produce(4), 1);
    }

    #[test]
    fn test_unrouted_dma() {
        let mut bus = Bus::new();
        bus.dma_consume(3, 0x1234);
        assert_eq!(bus.dma_produce(3), 0xFFFF_FFFF);
    }

    #[test]
    fn test_route_invalid_channel() {
        let mut bus = Bus::new();
        let index = bus
            .register_device(0x1F80_1C00, 0x400, TestDevice::shared("Spu"))
            .unwrap();
        assert!(matches!(
            bus.route_dma(7, index),
            Err(EmulatorError::InvalidDmaChannel(7))
        ));
        assert!(matches!(bus.route_dma(4, 9), Err(EmulatorError::Config(_))));
    }

    // ========== Time Tests ==========

    #[test]
    fn test_advance_devices_and_next_event() {
        let mut bus = Bus::new();
        assert_eq!(bus.next_device_event(), None);

        let a = TestDevice::shared("A");
        let b = TestDevice::shared("B");
        bus.register_device(0x1F80_1800, 4, a.clone()).unwrap();
        bus.register_device(0x1F80_1810, 4, b.clone()).unwrap();

        bus.advance_devices(30);
        bus.advance_devices(0);
        assert_eq!(a.borrow().advanced, 30);
        assert_eq!(b.borrow().advanced, 30);
        assert_eq!(bus.next_device_event(), Some(70));
    }

    // ========== State Tests ==========

    #[test]
    fn test_device_states_roundtrip() {
        let mut bus = Bus::new();
        let device = TestDevice::shared("Test");
        bus.register_device(0x1F80_1800, 0x10, device.clone()).unwrap();
        bus.write32(0x1F80_1800, 7);

        let states = bus.save_device_states().unwrap();
        bus.write32(0x1F80_1800, 9);
        bus.load_device_states(&states).unwrap();
        assert_eq!(bus.read32(0x1F80_1800), 7);
    }

    #[test]
    fn test_device_states_layout_mismatch() {
        let mut bus = Bus::new();
        bus.register_device(0x1F80_1800, 0x10, TestDevice::shared("Test"))
            .unwrap();
        let renamed = vec![("Other".to_string(), Vec::new())];
        assert!(matches!(
            bus.load_device_states(&renamed),
            Err(EmulatorError::SnapshotMismatch(_))
        ));
        assert!(matches!(
            bus.load_device_states(&[]),
            Err(EmulatorError::SnapshotMismatch(_))
        ));
    }

    // ========== Slot Tests ==========

    #[test]
    fn test_peripheral_slots_do_not_overlap() {
        let mut bus = Bus::new();
        for slot in PeripheralSlot::ALL {
            bus.register_device(slot.base(), slot.size(), TestDevice::shared("Slot"))
                .unwrap();
        }
        assert_eq!(bus.device_count(), PeripheralSlot::ALL.len());
        assert_eq!(PeripheralSlot::Mdec.dma_channels(), &[0, 1]);
    }
}
