use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Cycle, StateId, TransitionTable};
use crate::context::Mode;
use crate::ports::{Bits, InputSnapshot, OutputSet};

/// A transition that moved the machine to a different state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: StateId,
    pub to: StateId,
    /// Index of the transition that fired.
    pub transition: usize,
}

#[derive(Debug, Clone)]
pub struct FsmEngine {
    table: TransitionTable,
    state: StateId,
    events: Bits,
    steps: u64,
}

impl FsmEngine {
    pub fn new(table: TransitionTable) -> Self {
        let state = table.initial_state();
        Self {
            table,
            state,
            events: Bits::EMPTY,
            steps: 0,
        }
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn state_name(&self, state: StateId) -> &'static str {
        self.table.state_name(state)
    }

    pub fn current_state_name(&self) -> &'static str {
        self.table.state_name(self.state)
    }

    /// Event values from the most recent automatic step.
    pub fn last_events(&self) -> Bits {
        self.events
    }

    /// Automatic steps evaluated since construction.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Back to the initial state. Outputs are the caller's business.
    pub fn reset(&mut self) {
        self.state = self.table.initial_state();
        self.events = Bits::EMPTY;
    }

    /// Evaluates one control cycle.
    ///
    /// Does nothing in [`Mode::Manual`]. Otherwise recomputes every event,
    /// then every continuous assignment, then fires at most one transition:
    /// the first in table order leaving the current state whose event holds.
    /// Returns the change only when the state actually differs afterwards;
    /// a self-transition runs its action silently.
    pub fn step(
        &mut self,
        mode: Mode,
        inputs: &InputSnapshot,
        outputs: &mut OutputSet,
    ) -> Option<StateChange> {
        if mode == Mode::Manual {
            return None;
        }
        self.steps = self.steps.wrapping_add(1);

        self.events = self.evaluate_events(inputs, outputs);
        self.apply_assignments(inputs, outputs);

        let from = self.state;
        let (index, transition) = self
            .table
            .transitions()
            .iter()
            .enumerate()
            .find(|(_, t)| t.from == from && self.events.get(t.event.index()))?;
        let transition = *transition;

        if let Some(action) = transition.action.and_then(|id| self.table.action(id)) {
            (action.run)(outputs);
        }
        self.state = transition.to;

        if transition.to == from {
            return None;
        }

        debug!(
            from = self.table.state_name(from),
            to = self.table.state_name(transition.to),
            event = self.table.event_name(transition.event),
            "transition"
        );
        Some(StateChange {
            from,
            to: transition.to,
            transition: index,
        })
    }

    fn evaluate_events(&self, inputs: &InputSnapshot, outputs: &OutputSet) -> Bits {
        let mut events = Bits::EMPTY;
        for (index, event) in self.table.events().iter().enumerate() {
            let cycle = Cycle::new(inputs, outputs, self.state, events);
            events.set(index, (event.predicate)(&cycle));
        }
        events
    }

    fn apply_assignments(&self, inputs: &InputSnapshot, outputs: &mut OutputSet) {
        for assignment in self.table.assignments() {
            let value = {
                let cycle = Cycle::new(inputs, outputs, self.state, self.events);
                (assignment.value)(&cycle)
            };
            outputs.set(assignment.output, value);
        }
    }
}
