//! # Winch Controller
//!
//! Control core for a powered winch: it reads operator switches and machine
//! sensors, drives clutches, brakes and indicators, and arbitrates between an
//! automatic sequence and manual operator override on a serial console.
//!
//! ## Features
//!
//! - **Lock-free serial transport**: SPSC ring buffers between the byte
//!   events and the foreground, CR LF translation, watchdog-fed backpressure
//! - **Named bitfields**: declared port map, one-pass input capture with
//!   edge detection, bulk output writes, physically-safe reset
//! - **Declarative state machine**: events, actions, continuous outputs and
//!   an ordered transition list evaluated once per cycle
//! - **Operator console**: line editing and a registered command table
//! - **Persisted counters**: restored at boot, committed only on change
//! - **Embedded-friendly**: fixed-capacity tables, no allocation per cycle
//!
//! ## Quick Start
//!
//! ```rust
//! use winchctl::{winch, ControlLoop, Counters, Mode, SerialTransport, SharedIo, SoftwareWatchdog};
//! use std::time::Duration;
//!
//! let transport: SerialTransport<32, 1024> = SerialTransport::new();
//! let watchdog = SoftwareWatchdog::new(Duration::from_secs(2));
//! let io = SharedIo::default();
//!
//! let context = winch::context(io.clone(), Counters::volatile(), Mode::Manual).unwrap();
//! let mut control = ControlLoop::new(context, &transport, &watchdog);
//! control.boot();
//! control.run_cycle();
//! ```
//!
//! ## Architecture
//!
//! - [`ringbuf`] - SPSC byte queue
//! - [`transport`] - Serial byte events and blocking/non-blocking I/O
//! - [`ports`] - Port map, input snapshots, output sets, pin access
//! - [`fsm`] - Transition table and engine
//! - [`context`] - Mode and the single mutable controller context
//! - [`console`] - Operator console
//! - [`counters`] - Persisted counters
//! - [`control`] - The control cycle
//! - [`winch`] - AFK-3 deployment table

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::new_without_default)]

pub mod config;
pub mod console;
pub mod context;
pub mod control;
pub mod counters;
pub mod fsm;
pub mod ports;
pub mod ringbuf;
pub mod transport;
pub mod watchdog;
pub mod winch;

pub use config::{ConfigError, ControllerConfig};
pub use console::{Console, ConsoleError};
pub use context::{ControlContext, ControlError, Mode, OperatorInterface};
pub use control::ControlLoop;
pub use counters::{Counter, CounterStore, Counters, JsonFileStore, MemoryStore, StoreError};
pub use fsm::{FsmEngine, StateChange, StateId, TransitionTable};
pub use ports::{
    DigitalIo, InputSnapshot, OutputSet, PortMap, PortSpec, SharedIo, SimulatedIo, TableError,
};
pub use ringbuf::RingBuffer;
pub use transport::{SerialTransport, TransportWriter};
pub use watchdog::{SoftwareWatchdog, Watchdog};
