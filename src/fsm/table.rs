use heapless::Vec;

use super::{
    ActionFn, ActionId, AssignFn, EventFn, EventId, StateId, MAX_ACTIONS, MAX_ASSIGNMENTS,
    MAX_EVENTS, MAX_STATES, MAX_TRANSITIONS,
};
use crate::ports::{OutputId, PortMap, TableError};

#[derive(Debug, Clone, Copy)]
pub struct StateDef {
    pub name: &'static str,
    /// Persisted counter bumped whenever a transition enters this state.
    pub counter: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct EventDef {
    pub name: &'static str,
    pub predicate: EventFn,
}

#[derive(Debug, Clone, Copy)]
pub struct ActionDef {
    pub name: &'static str,
    pub run: ActionFn,
}

#[derive(Debug, Clone, Copy)]
pub struct Assignment {
    pub output: OutputId,
    pub value: AssignFn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: StateId,
    pub event: EventId,
    pub to: StateId,
    pub action: Option<ActionId>,
}

/// Immutable, index-resolved machine description.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    states: Vec<StateDef, MAX_STATES>,
    events: Vec<EventDef, MAX_EVENTS>,
    actions: Vec<ActionDef, MAX_ACTIONS>,
    assignments: Vec<Assignment, MAX_ASSIGNMENTS>,
    transitions: Vec<Transition, MAX_TRANSITIONS>,
}

impl TransitionTable {
    pub fn builder(ports: &PortMap) -> TransitionTableBuilder<'_> {
        TransitionTableBuilder::new(ports)
    }

    pub fn initial_state(&self) -> StateId {
        StateId::INITIAL
    }

    pub fn states(&self) -> &[StateDef] {
        &self.states
    }

    pub fn events(&self) -> &[EventDef] {
        &self.events
    }

    pub fn actions(&self) -> &[ActionDef] {
        &self.actions
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn state(&self, id: StateId) -> Option<&StateDef> {
        self.states.get(id.index())
    }

    pub fn state_name(&self, id: StateId) -> &'static str {
        self.state(id).map_or("invalid", |state| state.name)
    }

    pub fn state_by_name(&self, name: &str) -> Option<StateId> {
        self.states
            .iter()
            .position(|state| state.name == name)
            .map(|index| StateId::new(index as u8))
    }

    pub fn event_by_name(&self, name: &str) -> Option<EventId> {
        self.events
            .iter()
            .position(|event| event.name == name)
            .map(|index| EventId::new(index as u8))
    }

    pub fn event_name(&self, id: EventId) -> &'static str {
        self.events.get(id.index()).map_or("invalid", |event| event.name)
    }

    pub fn action(&self, id: ActionId) -> Option<&ActionDef> {
        self.actions.get(id.index())
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingTransition {
    from: &'static str,
    event: &'static str,
    to: &'static str,
    action: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
struct PendingAssignment {
    output: &'static str,
    value: AssignFn,
}

/// Collects a table by name; [`build`](Self::build) resolves every name to
/// its index once and reports the first inconsistency.
#[derive(Debug)]
pub struct TransitionTableBuilder<'p> {
    ports: &'p PortMap,
    states: Vec<StateDef, MAX_STATES>,
    events: Vec<EventDef, MAX_EVENTS>,
    actions: Vec<ActionDef, MAX_ACTIONS>,
    assignments: Vec<PendingAssignment, MAX_ASSIGNMENTS>,
    transitions: Vec<PendingTransition, MAX_TRANSITIONS>,
    overflow: Option<&'static str>,
}

impl<'p> TransitionTableBuilder<'p> {
    fn new(ports: &'p PortMap) -> Self {
        Self {
            ports,
            states: Vec::new(),
            events: Vec::new(),
            actions: Vec::new(),
            assignments: Vec::new(),
            transitions: Vec::new(),
            overflow: None,
        }
    }

    pub fn state(self, name: &'static str) -> Self {
        self.push_state(StateDef { name, counter: None })
    }

    pub fn counted_state(self, name: &'static str, counter: &'static str) -> Self {
        self.push_state(StateDef {
            name,
            counter: Some(counter),
        })
    }

    pub fn event(mut self, name: &'static str, predicate: EventFn) -> Self {
        if self.events.push(EventDef { name, predicate }).is_err() {
            self.overflow.get_or_insert("events");
        }
        self
    }

    pub fn action(mut self, name: &'static str, run: ActionFn) -> Self {
        if self.actions.push(ActionDef { name, run }).is_err() {
            self.overflow.get_or_insert("actions");
        }
        self
    }

    pub fn continuous(mut self, output: &'static str, value: AssignFn) -> Self {
        if self.assignments.push(PendingAssignment { output, value }).is_err() {
            self.overflow.get_or_insert("continuous assignments");
        }
        self
    }

    pub fn transition(self, from: &'static str, event: &'static str, to: &'static str) -> Self {
        self.push_transition(PendingTransition {
            from,
            event,
            to,
            action: None,
        })
    }

    pub fn transition_with(
        self,
        from: &'static str,
        event: &'static str,
        to: &'static str,
        action: &'static str,
    ) -> Self {
        self.push_transition(PendingTransition {
            from,
            event,
            to,
            action: Some(action),
        })
    }

    pub fn build(self) -> Result<TransitionTable, TableError> {
        if let Some(what) = self.overflow {
            return Err(TableError::CapacityExceeded(what));
        }
        if self.states.is_empty() {
            return Err(TableError::NoStates);
        }

        check_unique(self.states.iter().map(|s| s.name))?;
        check_unique(self.events.iter().map(|e| e.name))?;
        check_unique(self.actions.iter().map(|a| a.name))?;

        let mut assignments = Vec::new();
        for pending in &self.assignments {
            let output = self
                .ports
                .output(pending.output)
                .ok_or_else(|| unknown("output", pending.output))?;
            // Capacities match, so this cannot fail.
            let _ = assignments.push(Assignment {
                output,
                value: pending.value,
            });
        }

        let mut transitions = Vec::new();
        for pending in &self.transitions {
            let transition = Transition {
                from: self.resolve_state(pending.from)?,
                event: self.resolve_event(pending.event)?,
                to: self.resolve_state(pending.to)?,
                action: pending
                    .action
                    .map(|name| self.resolve_action(name))
                    .transpose()?,
            };
            let _ = transitions.push(transition);
        }

        Ok(TransitionTable {
            states: self.states,
            events: self.events,
            actions: self.actions,
            assignments,
            transitions,
        })
    }

    fn push_state(mut self, state: StateDef) -> Self {
        if self.states.push(state).is_err() {
            self.overflow.get_or_insert("states");
        }
        self
    }

    fn push_transition(mut self, transition: PendingTransition) -> Self {
        if self.transitions.push(transition).is_err() {
            self.overflow.get_or_insert("transitions");
        }
        self
    }

    fn resolve_state(&self, name: &str) -> Result<StateId, TableError> {
        self.states
            .iter()
            .position(|s| s.name == name)
            .map(|index| StateId::new(index as u8))
            .ok_or_else(|| unknown("state", name))
    }

    fn resolve_event(&self, name: &str) -> Result<EventId, TableError> {
        self.events
            .iter()
            .position(|e| e.name == name)
            .map(|index| EventId::new(index as u8))
            .ok_or_else(|| unknown("event", name))
    }

    fn resolve_action(&self, name: &str) -> Result<ActionId, TableError> {
        self.actions
            .iter()
            .position(|a| a.name == name)
            .map(|index| ActionId::new(index as u8))
            .ok_or_else(|| unknown("action", name))
    }
}

fn unknown(kind: &'static str, name: &str) -> TableError {
    TableError::UnknownName {
        kind,
        name: name.to_string(),
    }
}

fn check_unique<'a>(names: impl Iterator<Item = &'a str> + Clone) -> Result<(), TableError> {
    for (index, name) in names.clone().enumerate() {
        if names.clone().skip(index + 1).any(|other| other == name) {
            return Err(TableError::DuplicateName(name.to_string()));
        }
    }
    Ok(())
}
