//! The foreground control loop.
//!
//! One cycle, always in this order:
//!
//! 1. capture inputs
//! 2. step the state machine (automatic mode only)
//! 3. drive outputs
//! 4. announce a state change, if any
//! 5. service the console (at most one line)
//! 6. commit counters that changed
//! 7. acknowledge the watchdog
//!
//! Outputs driven in step 3 therefore always reflect this cycle's inputs and
//! this cycle's transition.

use tracing::{debug, info, warn};

use crate::console::{write_banner, Console};
use crate::context::{ControlContext, Mode, OperatorInterface};
use crate::fsm::StateChange;
use crate::ports::DigitalIo;
use crate::transport::{SerialTransport, TransportWriter, RX_BUFFER_SIZE, TX_BUFFER_SIZE};
use crate::watchdog::Watchdog;

pub struct ControlLoop<
    't,
    I: DigitalIo,
    W: Watchdog,
    const RX: usize = RX_BUFFER_SIZE,
    const TX: usize = TX_BUFFER_SIZE,
> {
    context: ControlContext<I>,
    console: Console,
    transport: &'t SerialTransport<RX, TX>,
    watchdog: W,
    boot_mode: Mode,
    cycles: u64,
}

impl<'t, I: DigitalIo, W: Watchdog, const RX: usize, const TX: usize> ControlLoop<'t, I, W, RX, TX> {
    /// The context's current mode becomes the boot mode that
    /// [`reinitialize`](Self::reinitialize) returns to.
    pub fn new(context: ControlContext<I>, transport: &'t SerialTransport<RX, TX>, watchdog: W) -> Self {
        let boot_mode = context.mode();
        Self {
            context,
            console: Console::new(),
            transport,
            watchdog,
            boot_mode,
            cycles: 0,
        }
    }

    /// Restores persisted counters and prints the banner. Call once before
    /// the first cycle.
    pub fn boot(&mut self) {
        if let Err(e) = self.context.counter_store_mut().restore() {
            warn!(error = %e, "counter restore failed, retrying before the first commit");
        }

        let mut out = TransportWriter::new(self.transport, &self.watchdog);
        if write_banner(&mut out).is_err() {
            warn!("banner output failed");
        }
        info!(mode = %self.context.mode(), state = self.context.state_name(), "controller booted");
        self.watchdog.acknowledge();
    }

    pub fn run_cycle(&mut self) -> Option<StateChange> {
        self.context.read_inputs();
        let change = self.context.step();
        self.context.write_outputs();

        let mut out = TransportWriter::new(self.transport, &self.watchdog);

        if let Some(change) = change {
            let engine = self.context.engine();
            let to = engine.state_name(change.to);
            info!(from = engine.state_name(change.from), to, "state changed");
            if self.console.announce_state(to, &mut out).is_err() {
                warn!("state notice output failed");
            }
        }

        if self.console.poll(self.transport, &mut out, &mut self.context).is_err() {
            warn!("console output failed");
        }

        match self.context.counter_store_mut().commit_if_dirty() {
            Ok(true) => debug!("counters persisted"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "counter commit failed, will retry"),
        }

        self.watchdog.acknowledge();
        self.cycles = self.cycles.wrapping_add(1);
        change
    }

    /// Back to the safe default after a watchdog expiry: outputs cleared and
    /// driven, initial state, boot mode, fresh console line.
    pub fn reinitialize(&mut self) {
        warn!(mode = %self.boot_mode, "reinitialising to safe default");
        self.context.reinitialize(self.boot_mode);
        self.console = Console::new();
        self.watchdog.acknowledge();
    }

    pub fn context(&self) -> &ControlContext<I> {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ControlContext<I> {
        &mut self.context
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn transport(&self) -> &'t SerialTransport<RX, TX> {
        self.transport
    }

    pub fn watchdog(&self) -> &W {
        &self.watchdog
    }

    pub fn boot_mode(&self) -> Mode {
        self.boot_mode
    }

    /// Completed cycles since construction.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}
