//! Pin access collaborator.
//!
//! Mapping a [`PinId`] onto real port registers belongs to the board
//! support layer. [`SimulatedIo`] models the usual 8-bit port layout with a
//! separate input register and output latch per port, which is all the host
//! needs to run the controller.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Bits, PinId};

/// Number of 8-bit ports, `A` through `H`.
pub const PORT_COUNT: usize = 8;

pub trait DigitalIo {
    fn read_pin(&mut self, pin: PinId) -> bool;
    fn write_pin(&mut self, pin: PinId, high: bool);

    /// Samples `pins` into consecutive bits, in one pass. Backends that can
    /// latch every port at once override this so the frame is never torn.
    fn read_pins(&mut self, pins: &mut dyn Iterator<Item = PinId>) -> Bits {
        let mut frame = Bits::EMPTY;
        for (index, pin) in pins.enumerate() {
            frame.set(index, self.read_pin(pin));
        }
        frame
    }
}

impl<T: DigitalIo + ?Sized> DigitalIo for &mut T {
    fn read_pin(&mut self, pin: PinId) -> bool {
        (**self).read_pin(pin)
    }

    fn read_pins(&mut self, pins: &mut dyn Iterator<Item = PinId>) -> Bits {
        (**self).read_pins(pins)
    }

    fn write_pin(&mut self, pin: PinId, high: bool) {
        (**self).write_pin(pin, high);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedIo {
    /// Externally driven levels, one register per port.
    pins: [u8; PORT_COUNT],
    /// Levels written by the controller.
    latches: [u8; PORT_COUNT],
    writes: u64,
}

impl SimulatedIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drives an input pin from outside. Invalid pins are ignored.
    pub fn set_input(&mut self, pin: PinId, high: bool) {
        if let Some(register) = Self::register(&mut self.pins, pin) {
            Self::apply(register, pin.bit, high);
        }
    }

    /// Level last written to an output pin.
    pub fn output_level(&self, pin: PinId) -> bool {
        pin.port_index()
            .filter(|_| pin.bit < 8)
            .is_some_and(|port| self.latches[port] & (1 << pin.bit) != 0)
    }

    pub fn input_level(&self, pin: PinId) -> bool {
        pin.port_index()
            .filter(|_| pin.bit < 8)
            .is_some_and(|port| self.pins[port] & (1 << pin.bit) != 0)
    }

    /// Raw output latch of one port.
    pub fn latch(&self, port: char) -> u8 {
        PinId::new(port, 0)
            .port_index()
            .map_or(0, |index| self.latches[index])
    }

    /// Total pin writes, for checking when outputs were driven.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    fn register(registers: &mut [u8; PORT_COUNT], pin: PinId) -> Option<&mut u8> {
        if pin.bit >= 8 {
            return None;
        }
        registers.get_mut(pin.port_index()?)
    }

    fn apply(register: &mut u8, bit: u8, high: bool) {
        if high {
            *register |= 1 << bit;
        } else {
            *register &= !(1 << bit);
        }
    }
}

impl DigitalIo for SimulatedIo {
    fn read_pin(&mut self, pin: PinId) -> bool {
        self.input_level(pin)
    }

    fn write_pin(&mut self, pin: PinId, high: bool) {
        if let Some(register) = Self::register(&mut self.latches, pin) {
            Self::apply(register, pin.bit, high);
            self.writes += 1;
        }
    }
}

/// Cloneable handle so a panel task can drive inputs while the control
/// loop owns the pins.
#[derive(Debug, Clone, Default)]
pub struct SharedIo {
    inner: Arc<Mutex<SimulatedIo>>,
}

impl SharedIo {
    pub fn new(io: SimulatedIo) -> Self {
        Self {
            inner: Arc::new(Mutex::new(io)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SimulatedIo> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_input(&self, pin: PinId, high: bool) {
        self.lock().set_input(pin, high);
    }

    pub fn input_level(&self, pin: PinId) -> bool {
        self.lock().input_level(pin)
    }

    pub fn output_level(&self, pin: PinId) -> bool {
        self.lock().output_level(pin)
    }
}

impl DigitalIo for SharedIo {
    fn read_pin(&mut self, pin: PinId) -> bool {
        self.lock().read_pin(pin)
    }

    /// One lock for the whole frame, so a panel update lands entirely
    /// before or after it.
    fn read_pins(&mut self, pins: &mut dyn Iterator<Item = PinId>) -> Bits {
        self.lock().read_pins(pins)
    }

    fn write_pin(&mut self, pin: PinId, high: bool) {
        self.lock().write_pin(pin, high);
    }
}
