//! The single mutable context of the controller.
//!
//! Mode, state, snapshots, outputs and counters live here and are threaded
//! through the control loop and the console instead of being globals.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::counters::{Counter, Counters};
use crate::fsm::{FsmEngine, StateChange, StateId, TransitionTable};
use crate::ports::{DigitalIo, InputSnapshot, OutputSet, PortMap, Ports};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Automatic,
    Manual,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Automatic => f.write_str("automatic"),
            Mode::Manual => f.write_str("manual"),
        }
    }
}

impl FromStr for Mode {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a" | "auto" | "automatic" => Ok(Mode::Automatic),
            "m" | "manual" => Ok(Mode::Manual),
            other => Err(ControlError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("Enable manual mode first!")]
    NotManual,
    #[error("Unknown port: {0}")]
    UnknownPort(String),
    #[error("Unknown mode: {0}")]
    UnknownMode(String),
}

/// What the console may do to the core.
pub trait OperatorInterface {
    fn mode(&self) -> Mode;

    /// Entering automatic mode resets the state and the outputs.
    fn set_mode(&mut self, mode: Mode);

    fn port_map(&self) -> &PortMap;

    fn inputs(&self) -> &InputSnapshot;

    fn outputs(&self) -> &OutputSet;

    /// Manual mode only.
    fn set_output(&mut self, name: &str, on: bool) -> Result<(), ControlError>;

    /// Manual mode only.
    fn reset_outputs(&mut self) -> Result<(), ControlError>;

    fn state_name(&self) -> &'static str;

    fn counters(&self) -> &[Counter];
}

pub struct ControlContext<I: DigitalIo> {
    mode: Mode,
    ports: Ports,
    engine: FsmEngine,
    counters: Counters,
    io: I,
}

impl<I: DigitalIo> ControlContext<I> {
    /// Boots into the safe default: outputs physically reset, initial
    /// state, `mode`.
    pub fn new(map: PortMap, table: TransitionTable, counters: Counters, io: I, mode: Mode) -> Self {
        let mut context = Self {
            mode,
            ports: Ports::new(map),
            engine: FsmEngine::new(table),
            counters,
            io,
        };
        context.ports.reset_outputs(&mut context.io);
        context
    }

    pub fn read_inputs(&mut self) -> &InputSnapshot {
        self.ports.read_inputs(&mut self.io)
    }

    /// Runs the state machine for this cycle and counts entries into
    /// counted states.
    pub fn step(&mut self) -> Option<StateChange> {
        let (inputs, outputs) = self.ports.cycle_view();
        let change = self.engine.step(self.mode, inputs, outputs)?;

        if let Some(counter) = self.engine.table().state(change.to).and_then(|s| s.counter) {
            self.counters.increment(counter);
        }
        Some(change)
    }

    pub fn write_outputs(&mut self) {
        self.ports.write_outputs(&mut self.io);
    }

    /// Full return to the safe default after a fault: outputs cleared and
    /// driven, initial state, `mode`.
    pub fn reinitialize(&mut self, mode: Mode) {
        self.engine.reset();
        self.ports.reset_outputs(&mut self.io);
        self.mode = mode;
    }

    pub fn state(&self) -> StateId {
        self.engine.state()
    }

    pub fn engine(&self) -> &FsmEngine {
        &self.engine
    }

    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    pub fn counter_store(&self) -> &Counters {
        &self.counters
    }

    pub fn counter_store_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    pub fn io(&self) -> &I {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut I {
        &mut self.io
    }

    fn require_manual(&self) -> Result<(), ControlError> {
        match self.mode {
            Mode::Manual => Ok(()),
            Mode::Automatic => Err(ControlError::NotManual),
        }
    }
}

impl<I: DigitalIo> OperatorInterface for ControlContext<I> {
    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        if mode == Mode::Automatic {
            self.engine.reset();
            self.ports.reset_outputs(&mut self.io);
        }
        if mode != self.mode {
            info!(%mode, "mode changed");
        }
        self.mode = mode;
    }

    fn port_map(&self) -> &PortMap {
        self.ports.map()
    }

    fn inputs(&self) -> &InputSnapshot {
        self.ports.inputs()
    }

    fn outputs(&self) -> &OutputSet {
        self.ports.outputs()
    }

    fn set_output(&mut self, name: &str, on: bool) -> Result<(), ControlError> {
        self.require_manual()?;
        let id = self
            .ports
            .map()
            .output(name)
            .ok_or_else(|| ControlError::UnknownPort(name.to_string()))?;
        self.ports.outputs_mut().set(id, on);
        Ok(())
    }

    fn reset_outputs(&mut self) -> Result<(), ControlError> {
        self.require_manual()?;
        self.ports.reset_outputs(&mut self.io);
        Ok(())
    }

    fn state_name(&self) -> &'static str {
        self.engine.current_state_name()
    }

    fn counters(&self) -> &[Counter] {
        self.counters.entries()
    }
}

impl<I: DigitalIo + fmt::Debug> fmt::Debug for ControlContext<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlContext")
            .field("mode", &self.mode)
            .field("state", &self.engine.current_state_name())
            .field("inputs", self.ports.inputs())
            .field("outputs", self.ports.outputs())
            .field("counters", &self.counters)
            .field("io", &self.io)
            .finish()
    }
}
