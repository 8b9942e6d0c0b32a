//! Declarative state machine.
//!
//! The machine is a plain data table: states, named events (pure
//! predicates), named actions (output mutators), continuous output
//! assignments and an ordered transition list. [`FsmEngine::step`] evaluates
//! one control cycle against it:
//!
//! ```text
//!   inputs ─┐
//!  outputs ─┼─▶ events ─▶ continuous outputs ─▶ first matching transition
//!    state ─┘                                   ├─ action(outputs)
//!                                               └─ state = to
//! ```
//!
//! Order in the transition list is significant. When several transitions
//! leave the current state on events that are true in the same cycle, only
//! the one declared first fires.

pub mod engine;
pub mod table;

pub use engine::{FsmEngine, StateChange};
pub use table::{
    ActionDef, Assignment, EventDef, StateDef, Transition, TransitionTable, TransitionTableBuilder,
};

use serde::{Deserialize, Serialize};

use crate::ports::{Bits, InputId, InputSnapshot, OutputId, OutputSet};

pub const MAX_STATES: usize = 16;
pub const MAX_EVENTS: usize = 32;
pub const MAX_ACTIONS: usize = 16;
pub const MAX_ASSIGNMENTS: usize = 16;
pub const MAX_TRANSITIONS: usize = 64;

static_assertions::const_assert!(MAX_EVENTS <= crate::ports::MAX_SIGNALS);

/// Index of a declared state. The first declared state is the initial one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateId(u8);

impl StateId {
    pub const INITIAL: StateId = StateId(0);

    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(u8);

impl EventId {
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionId(u8);

impl ActionId {
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Read-only view handed to event predicates and continuous assignments.
#[derive(Debug, Clone, Copy)]
pub struct Cycle<'a> {
    inputs: &'a InputSnapshot,
    outputs: &'a OutputSet,
    state: StateId,
    events: Bits,
}

impl<'a> Cycle<'a> {
    pub const fn new(
        inputs: &'a InputSnapshot,
        outputs: &'a OutputSet,
        state: StateId,
        events: Bits,
    ) -> Self {
        Self {
            inputs,
            outputs,
            state,
            events,
        }
    }

    pub const fn input(&self, id: InputId) -> bool {
        self.inputs.get(id)
    }

    pub const fn rose(&self, id: InputId) -> bool {
        self.inputs.rose(id)
    }

    pub const fn fell(&self, id: InputId) -> bool {
        self.inputs.fell(id)
    }

    pub const fn output(&self, id: OutputId) -> bool {
        self.outputs.get(id)
    }

    pub const fn state(&self) -> StateId {
        self.state
    }

    pub fn in_state(&self, state: StateId) -> bool {
        self.state == state
    }

    /// Value of an event computed earlier in this cycle. Events are
    /// evaluated in declaration order, so a predicate only sees the events
    /// declared before it.
    pub const fn event(&self, id: EventId) -> bool {
        self.events.get(id.index())
    }

    pub const fn inputs(&self) -> &'a InputSnapshot {
        self.inputs
    }
}

/// Event predicate. Must be free of side effects.
pub type EventFn = fn(&Cycle<'_>) -> bool;

/// Transition action. Its only permitted effect is on the output set.
pub type ActionFn = fn(&mut OutputSet);

/// Continuous output assignment, recomputed every automatic cycle.
pub type AssignFn = fn(&Cycle<'_>) -> bool;
