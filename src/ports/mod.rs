//! Named bitfields over the discrete inputs and outputs.
//!
//! A [`PortMap`] is declared once at startup: one record per signal with
//! its name, an optional alias and the physical pin. Names are resolved to
//! [`InputId`]/[`OutputId`] indices there, and from then on every signal is
//! a single bit in a [`Bits`] word.

pub mod io;

pub use io::{DigitalIo, SharedIo, SimulatedIo, PORT_COUNT};

use core::fmt::{self, Write as _};

use arrayvec::ArrayString;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use thiserror::Error;

/// Upper bound on signals per direction; one bit each in a `u32`.
pub const MAX_SIGNALS: usize = 32;

const_assert!(MAX_SIGNALS <= u32::BITS as usize);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("duplicate name `{0}`")]
    DuplicateName(String),
    #[error("unknown {kind} `{name}`")]
    UnknownName { kind: &'static str, name: String },
    #[error("invalid pin {port}{bit}")]
    InvalidPin { port: char, bit: u8 },
    #[error("pin {0} assigned twice")]
    PinInUse(PinId),
    #[error("too many {0}")]
    CapacityExceeded(&'static str),
    #[error("table declares no states")]
    NoStates,
}

/// Packed boolean flags, one per declared signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bits(u32);

impl Bits {
    pub const EMPTY: Bits = Bits(0);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn get(self, index: usize) -> bool {
        index < MAX_SIGNALS && self.0 & (1 << index) != 0
    }

    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < MAX_SIGNALS, "bit index {index} out of range");
        if index >= MAX_SIGNALS {
            return;
        }
        if value {
            self.0 |= 1 << index;
        } else {
            self.0 &= !(1 << index);
        }
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InputId(u8);

impl InputId {
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputId(u8);

impl OutputId {
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Physical pin: port letter `A`..`H`, bit `0..8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinId {
    pub port: char,
    pub bit: u8,
}

impl PinId {
    pub const fn new(port: char, bit: u8) -> Self {
        Self { port, bit }
    }

    /// Index of the port register, if the letter names one.
    pub fn port_index(self) -> Option<usize> {
        let index = (self.port as u32).checked_sub('A' as u32)? as usize;
        (index < PORT_COUNT).then_some(index)
    }

    pub fn is_valid(self) -> bool {
        self.port_index().is_some() && self.bit < 8
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut label = ArrayString::<8>::new();
        write!(label, "{}{}", self.port, self.bit)?;
        f.pad(&label)
    }
}

/// One declared signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    pub name: &'static str,
    pub alias: Option<&'static str>,
    pub pin: PinId,
    /// Output only: the pin is driven low for a logical `true`.
    pub active_low: bool,
}

impl PortSpec {
    pub const fn input(name: &'static str, port: char, bit: u8) -> Self {
        Self {
            name,
            alias: None,
            pin: PinId::new(port, bit),
            active_low: false,
        }
    }

    pub const fn output(name: &'static str, port: char, bit: u8) -> Self {
        Self::input(name, port, bit)
    }

    pub const fn alias(mut self, alias: &'static str) -> Self {
        self.alias = Some(alias);
        self
    }

    pub const fn active_low(mut self) -> Self {
        self.active_low = true;
        self
    }

    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.alias == Some(name)
    }

    /// Pin level for a logical value.
    pub const fn level(&self, value: bool) -> bool {
        value != self.active_low
    }
}

/// The deployment's declared inputs and outputs.
#[derive(Debug, Clone, Default)]
pub struct PortMap {
    inputs: Vec<PortSpec, MAX_SIGNALS>,
    outputs: Vec<PortSpec, MAX_SIGNALS>,
}

impl PortMap {
    pub fn new(inputs: &[PortSpec], outputs: &[PortSpec]) -> Result<Self, TableError> {
        let mut map = Self::default();

        for spec in inputs.iter().chain(outputs) {
            if !spec.pin.is_valid() {
                return Err(TableError::InvalidPin {
                    port: spec.pin.port,
                    bit: spec.pin.bit,
                });
            }
        }

        for spec in inputs {
            map.check_unique(spec)?;
            map.inputs
                .push(*spec)
                .map_err(|_| TableError::CapacityExceeded("inputs"))?;
        }
        for spec in outputs {
            map.check_unique(spec)?;
            map.outputs
                .push(*spec)
                .map_err(|_| TableError::CapacityExceeded("outputs"))?;
        }

        Ok(map)
    }

    pub fn inputs(&self) -> &[PortSpec] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }

    /// Resolves an input by name or alias.
    pub fn input(&self, name: &str) -> Option<InputId> {
        self.inputs
            .iter()
            .position(|spec| spec.answers_to(name))
            .map(|index| InputId(index as u8))
    }

    /// Resolves an output by name or alias.
    pub fn output(&self, name: &str) -> Option<OutputId> {
        self.outputs
            .iter()
            .position(|spec| spec.answers_to(name))
            .map(|index| OutputId(index as u8))
    }

    pub fn input_spec(&self, id: InputId) -> Option<&PortSpec> {
        self.inputs.get(id.index())
    }

    pub fn output_spec(&self, id: OutputId) -> Option<&PortSpec> {
        self.outputs.get(id.index())
    }

    fn check_unique(&self, spec: &PortSpec) -> Result<(), TableError> {
        let declared = self.inputs.iter().chain(self.outputs.iter());
        for existing in declared {
            let names = [Some(spec.name), spec.alias];
            if let Some(clash) = names.into_iter().flatten().find(|n| existing.answers_to(n)) {
                return Err(TableError::DuplicateName(clash.to_string()));
            }
            if existing.pin == spec.pin {
                return Err(TableError::PinInUse(spec.pin));
            }
        }
        Ok(())
    }
}

/// Detects a false→true change of one signal between two consecutive reads.
pub const fn rising_edge(previous: Bits, current: Bits, id: InputId) -> bool {
    !previous.get(id.index()) && current.get(id.index())
}

pub const fn falling_edge(previous: Bits, current: Bits, id: InputId) -> bool {
    previous.get(id.index()) && !current.get(id.index())
}

/// Current and previous input reads. `previous` is always exactly what
/// `current` held before the most recent capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSnapshot {
    current: Bits,
    previous: Bits,
}

impl InputSnapshot {
    pub const fn new(previous: Bits, current: Bits) -> Self {
        Self { current, previous }
    }

    /// Shifts `current` into `previous` and stores the fresh read.
    pub fn capture(&mut self, fresh: Bits) {
        self.previous = self.current;
        self.current = fresh;
    }

    pub const fn current(&self) -> Bits {
        self.current
    }

    pub const fn previous(&self) -> Bits {
        self.previous
    }

    pub const fn get(&self, id: InputId) -> bool {
        self.current.get(id.index())
    }

    pub const fn rose(&self, id: InputId) -> bool {
        rising_edge(self.previous, self.current, id)
    }

    pub const fn fell(&self, id: InputId) -> bool {
        falling_edge(self.previous, self.current, id)
    }
}

/// Logical output values; `false` everywhere is the safe configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSet {
    bits: Bits,
}

impl OutputSet {
    pub const fn from_bits(bits: Bits) -> Self {
        Self { bits }
    }

    pub const fn bits(&self) -> Bits {
        self.bits
    }

    pub const fn get(&self, id: OutputId) -> bool {
        self.bits.get(id.index())
    }

    pub fn set(&mut self, id: OutputId, value: bool) {
        self.bits.set(id.index(), value);
    }

    pub fn clear(&mut self) {
        self.bits.clear();
    }

    pub const fn is_cleared(&self) -> bool {
        self.bits.raw() == 0
    }
}

/// Port map plus the live snapshot and output set.
#[derive(Debug, Clone)]
pub struct Ports {
    map: PortMap,
    inputs: InputSnapshot,
    outputs: OutputSet,
}

impl Ports {
    pub fn new(map: PortMap) -> Self {
        Self {
            map,
            inputs: InputSnapshot::default(),
            outputs: OutputSet::default(),
        }
    }

    pub fn map(&self) -> &PortMap {
        &self.map
    }

    pub fn inputs(&self) -> &InputSnapshot {
        &self.inputs
    }

    pub fn outputs(&self) -> &OutputSet {
        &self.outputs
    }

    pub fn outputs_mut(&mut self) -> &mut OutputSet {
        &mut self.outputs
    }

    /// Split borrow for the state machine: inputs read-only, outputs mutable.
    pub fn cycle_view(&mut self) -> (&InputSnapshot, &mut OutputSet) {
        (&self.inputs, &mut self.outputs)
    }

    /// Captures every declared input in one pass, with no output write in
    /// between.
    pub fn read_inputs<I: DigitalIo + ?Sized>(&mut self, io: &mut I) -> &InputSnapshot {
        let fresh = io.read_pins(&mut self.map.inputs.iter().map(|spec| spec.pin));
        self.inputs.capture(fresh);
        &self.inputs
    }

    /// Drives every declared output pin from the logical set.
    pub fn write_outputs<I: DigitalIo + ?Sized>(&self, io: &mut I) {
        for (index, spec) in self.map.outputs.iter().enumerate() {
            io.write_pin(spec.pin, spec.level(self.outputs.bits.get(index)));
        }
    }

    /// Clears the logical set and immediately drives the physically-safe
    /// levels, disengaging every interlock.
    pub fn reset_outputs<I: DigitalIo + ?Sized>(&mut self, io: &mut I) {
        self.outputs.clear();
        self.write_outputs(io);
    }
}
