//! The AFK-3 winch: port map and transition table.
//!
//! ```text
//!                 brake_down                clutch_left_pressed
//!   ┌───────┐ ─────────────▶ ┌──────────────┐ ─────────────▶ left_engaged ──┐
//!   │ ready │                │ brake_pressed│ ─────────────▶ right_engaged ─┤
//!   └───────┘ ◀───────────── └──────────────┘ clutch_right_pressed          │
//!     │  ▲ ▲      brake_up                                                  │
//!     │  │ └──────────────────── declutch_pressed ◀─────────────────────────┘
//!     │  │ payout_closed
//!     ▼  │
//!   payout_open        any state ── overheat ──▶ overheated ── fault_cleared ──▶ ready
//! ```
//!
//! The fault transition is declared first for every state, so an overheat
//! wins over any operator event in the same cycle. Engaging either clutch
//! counts a tow.

use crate::context::{ControlContext, Mode};
use crate::counters::Counters;
use crate::fsm::{Cycle, EventId, TransitionTable};
use crate::ports::{DigitalIo, OutputSet, PortMap, PortSpec, TableError};

pub mod input {
    use crate::ports::InputId;

    pub const HANDBRAKE_ENGAGED: InputId = InputId::new(0);
    pub const CUTTER_ARMED: InputId = InputId::new(1);
    pub const TEMPERATURE_OK: InputId = InputId::new(2);
    pub const BRAKE_PEDAL: InputId = InputId::new(3);
    pub const SWITCH_CLUTCH_LEFT: InputId = InputId::new(4);
    pub const SWITCH_CLUTCH_RIGHT: InputId = InputId::new(5);
    pub const SWITCH_DECLUTCH: InputId = InputId::new(6);
    pub const SWITCH_PAYOUT_BRAKE: InputId = InputId::new(7);
}

pub mod output {
    use crate::ports::OutputId;

    pub const CLUTCH_LEFT: OutputId = OutputId::new(0);
    pub const CLUTCH_RIGHT: OutputId = OutputId::new(1);
    pub const PAYOUT_BRAKE_RELEASE: OutputId = OutputId::new(2);
    pub const LED_POWER: OutputId = OutputId::new(3);
    pub const LED_HANDBRAKE: OutputId = OutputId::new(4);
    pub const LED_CUTTER: OutputId = OutputId::new(5);
    pub const LED_TEMPERATURE: OutputId = OutputId::new(6);
    pub const BUZZER: OutputId = OutputId::new(7);
}

pub mod state {
    use crate::fsm::StateId;

    pub const READY: StateId = StateId::new(0);
    pub const BRAKE_PRESSED: StateId = StateId::new(1);
    pub const LEFT_ENGAGED: StateId = StateId::new(2);
    pub const RIGHT_ENGAGED: StateId = StateId::new(3);
    pub const PAYOUT_OPEN: StateId = StateId::new(4);
    pub const OVERHEATED: StateId = StateId::new(5);
}

pub const TOWS_LEFT: &str = "tows_left";
pub const TOWS_RIGHT: &str = "tows_right";

const TEMP_OK: EventId = EventId::new(0);

const INPUTS: [PortSpec; 8] = [
    PortSpec::input("handbrake_engaged", 'D', 2).alias("handbremse"),
    PortSpec::input("cutter_armed", 'D', 3).alias("kappung"),
    PortSpec::input("temperature_ok", 'D', 4).alias("temp"),
    PortSpec::input("brake_pedal", 'D', 5).alias("bremse"),
    PortSpec::input("switch_clutch_left", 'C', 0).alias("einkuppeln_links"),
    PortSpec::input("switch_clutch_right", 'C', 1).alias("einkuppeln_rechts"),
    PortSpec::input("switch_declutch", 'C', 2).alias("auskuppeln"),
    PortSpec::input("switch_payout_brake", 'C', 3).alias("auszugsbremse"),
];

const OUTPUTS: [PortSpec; 8] = [
    PortSpec::output("clutch_left", 'B', 0).alias("kupplung_links"),
    PortSpec::output("clutch_right", 'B', 1).alias("kupplung_rechts"),
    PortSpec::output("payout_brake_release", 'B', 2)
        .alias("auszugsbremse_auf")
        .active_low(),
    PortSpec::output("led_power", 'B', 3),
    PortSpec::output("led_handbrake", 'B', 4),
    PortSpec::output("led_cutter", 'B', 5),
    PortSpec::output("led_temperature", 'B', 6),
    PortSpec::output("buzzer", 'B', 7),
];

pub fn port_map() -> Result<PortMap, TableError> {
    PortMap::new(&INPUTS, &OUTPUTS)
}

pub fn transition_table(ports: &PortMap) -> Result<TransitionTable, TableError> {
    TransitionTable::builder(ports)
        .state("ready")
        .state("brake_pressed")
        .counted_state("left_engaged", TOWS_LEFT)
        .counted_state("right_engaged", TOWS_RIGHT)
        .state("payout_open")
        .state("overheated")
        .event("temp_ok", temp_ok)
        .event("overheat", overheat)
        .event("brake_down", brake_down)
        .event("brake_up", brake_up)
        .event("clutch_left_pressed", clutch_left_pressed)
        .event("clutch_right_pressed", clutch_right_pressed)
        .event("declutch_pressed", declutch_pressed)
        .event("payout_opened", payout_opened)
        .event("payout_closed", payout_closed)
        .event("fault_cleared", fault_cleared)
        .action("engage_left", engage_left)
        .action("engage_right", engage_right)
        .action("declutch", declutch)
        .action("open_payout", open_payout)
        .action("close_payout", close_payout)
        .action("safe_stop", safe_stop)
        .continuous("led_power", |_| true)
        .continuous("led_handbrake", |c| c.input(input::HANDBRAKE_ENGAGED))
        .continuous("led_cutter", |c| c.input(input::CUTTER_ARMED))
        .continuous("led_temperature", |c| !c.event(TEMP_OK))
        .continuous("buzzer", buzzer)
        .transition_with("ready", "overheat", "overheated", "safe_stop")
        .transition("ready", "brake_down", "brake_pressed")
        .transition_with("ready", "payout_opened", "payout_open", "open_payout")
        .transition_with("brake_pressed", "overheat", "overheated", "safe_stop")
        .transition_with("brake_pressed", "clutch_left_pressed", "left_engaged", "engage_left")
        .transition_with("brake_pressed", "clutch_right_pressed", "right_engaged", "engage_right")
        .transition("brake_pressed", "brake_up", "ready")
        .transition_with("left_engaged", "overheat", "overheated", "safe_stop")
        .transition_with("left_engaged", "declutch_pressed", "ready", "declutch")
        .transition_with("right_engaged", "overheat", "overheated", "safe_stop")
        .transition_with("right_engaged", "declutch_pressed", "ready", "declutch")
        .transition_with("payout_open", "overheat", "overheated", "safe_stop")
        .transition_with("payout_open", "payout_closed", "ready", "close_payout")
        .transition_with("overheated", "fault_cleared", "ready", "safe_stop")
        .build()
}

/// The winch controller context: port map, table, outputs physically reset.
pub fn context<I: DigitalIo>(
    io: I,
    counters: Counters,
    mode: Mode,
) -> Result<ControlContext<I>, TableError> {
    let ports = port_map()?;
    let table = transition_table(&ports)?;
    Ok(ControlContext::new(ports, table, counters, io, mode))
}

fn temp_ok(c: &Cycle<'_>) -> bool {
    c.input(input::TEMPERATURE_OK)
}

fn overheat(c: &Cycle<'_>) -> bool {
    !c.event(TEMP_OK)
}

fn brake_down(c: &Cycle<'_>) -> bool {
    c.input(input::BRAKE_PEDAL)
}

fn brake_up(c: &Cycle<'_>) -> bool {
    !c.input(input::BRAKE_PEDAL)
}

fn clutch_left_pressed(c: &Cycle<'_>) -> bool {
    c.rose(input::SWITCH_CLUTCH_LEFT) && c.input(input::BRAKE_PEDAL)
}

fn clutch_right_pressed(c: &Cycle<'_>) -> bool {
    c.rose(input::SWITCH_CLUTCH_RIGHT) && c.input(input::BRAKE_PEDAL)
}

fn declutch_pressed(c: &Cycle<'_>) -> bool {
    c.rose(input::SWITCH_DECLUTCH)
}

fn payout_opened(c: &Cycle<'_>) -> bool {
    c.rose(input::SWITCH_PAYOUT_BRAKE)
}

fn payout_closed(c: &Cycle<'_>) -> bool {
    c.fell(input::SWITCH_PAYOUT_BRAKE)
}

/// The operator may only leave the fault state with the handbrake on.
fn fault_cleared(c: &Cycle<'_>) -> bool {
    c.event(TEMP_OK) && c.input(input::HANDBRAKE_ENGAGED)
}

/// Sounds while a switch is held that means nothing in the current state.
fn buzzer(c: &Cycle<'_>) -> bool {
    let clutch_held =
        c.input(input::SWITCH_CLUTCH_LEFT) || c.input(input::SWITCH_CLUTCH_RIGHT);
    let engaged = c.in_state(state::LEFT_ENGAGED) || c.in_state(state::RIGHT_ENGAGED);

    (clutch_held && !c.in_state(state::BRAKE_PRESSED))
        || (c.input(input::SWITCH_PAYOUT_BRAKE)
            && !c.in_state(state::READY)
            && !c.in_state(state::PAYOUT_OPEN))
        || (c.input(input::SWITCH_DECLUTCH) && !engaged)
}

fn engage_left(outputs: &mut OutputSet) {
    outputs.set(output::CLUTCH_RIGHT, false);
    outputs.set(output::CLUTCH_LEFT, true);
}

fn engage_right(outputs: &mut OutputSet) {
    outputs.set(output::CLUTCH_LEFT, false);
    outputs.set(output::CLUTCH_RIGHT, true);
}

fn declutch(outputs: &mut OutputSet) {
    outputs.set(output::CLUTCH_LEFT, false);
    outputs.set(output::CLUTCH_RIGHT, false);
}

fn open_payout(outputs: &mut OutputSet) {
    outputs.set(output::PAYOUT_BRAKE_RELEASE, true);
}

fn close_payout(outputs: &mut OutputSet) {
    outputs.set(output::PAYOUT_BRAKE_RELEASE, false);
}

fn safe_stop(outputs: &mut OutputSet) {
    declutch(outputs);
    close_payout(outputs);
}
