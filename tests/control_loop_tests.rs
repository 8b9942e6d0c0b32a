use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use winchctl::counters::{Counter, CounterStore, StoreError};
use winchctl::ports::PinId;
use winchctl::winch::{output, state, TOWS_LEFT};
use winchctl::*;

type Transport = SerialTransport<64, 16384>;
type Controller<'t> = ControlLoop<'t, SimulatedIo, &'t SoftwareWatchdog, 64, 16384>;

const HANDBRAKE: PinId = PinId::new('D', 2);
const TEMPERATURE_OK: PinId = PinId::new('D', 4);
const BRAKE_PEDAL: PinId = PinId::new('D', 5);
const SWITCH_CLUTCH_LEFT: PinId = PinId::new('C', 0);
const CLUTCH_LEFT: PinId = PinId::new('B', 0);
const PAYOUT_BRAKE_RELEASE: PinId = PinId::new('B', 2);

/// Shares its image and commit count with the test after being boxed.
/// The next `failing_loads` loads and `failing_commits` commits fail.
#[derive(Clone, Default)]
struct RecordingStore {
    image: Arc<Mutex<Vec<Counter>>>,
    commits: Arc<AtomicUsize>,
    failing_loads: Arc<AtomicUsize>,
    failing_commits: Arc<AtomicUsize>,
}

impl RecordingStore {
    fn holding(name: &str, value: u32) -> Self {
        let store = Self::default();
        store.image.lock().unwrap().push(Counter {
            name: name.into(),
            value,
        });
        store
    }

    fn persisted(&self, name: &str) -> Option<u32> {
        let image = self.image.lock().unwrap();
        image.iter().find(|c| c.name == name).map(|c| c.value)
    }
}

fn take_failure(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl CounterStore for RecordingStore {
    fn load(&mut self) -> Result<Vec<Counter>, StoreError> {
        if take_failure(&self.failing_loads) {
            return Err(io::Error::other("medium not ready").into());
        }
        Ok(self.image.lock().unwrap().clone())
    }

    fn commit(&mut self, counters: &[Counter]) -> Result<(), StoreError> {
        if take_failure(&self.failing_commits) {
            return Err(io::Error::other("medium not ready").into());
        }
        *self.image.lock().unwrap() = counters.to_vec();
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn controller<'t>(
    transport: &'t Transport,
    watchdog: &'t SoftwareWatchdog,
    mode: Mode,
    counters: Counters,
) -> Controller<'t> {
    let context = winch::context(SimulatedIo::new(), counters, mode).unwrap();
    let mut control = ControlLoop::new(context, transport, watchdog);
    control.boot();
    control
}

fn watchdog() -> SoftwareWatchdog {
    SoftwareWatchdog::new(Duration::from_secs(60))
}

fn drain(transport: &Transport) -> String {
    let mut line = Vec::new();
    while let Some(byte) = transport.on_transmit_ready() {
        line.push(byte);
    }
    String::from_utf8(line).unwrap()
}

fn type_line(transport: &Transport, line: &str) {
    for byte in line.bytes().chain([b'\r']) {
        assert!(transport.on_receive(byte));
    }
}

fn set_input(control: &mut Controller<'_>, pin: PinId, high: bool) {
    control.context_mut().io_mut().set_input(pin, high);
}

fn output_level(control: &Controller<'_>, pin: PinId) -> bool {
    control.context().io().output_level(pin)
}

/// Runs the line and the following cycle, which reprints the prompt.
fn command(control: &mut Controller<'_>, transport: &Transport, line: &str) -> String {
    drain(transport);
    type_line(transport, line);
    control.run_cycle();
    control.run_cycle();
    drain(transport)
}

#[test]
fn test_boot_prints_banner_then_prompt() {
    let transport = Transport::new();
    let watchdog = watchdog();
    let mut control = controller(&transport, &watchdog, Mode::Manual, Counters::volatile());

    control.run_cycle();
    let text = drain(&transport);
    assert!(text.contains("Winch controller AFK-3\r\n"));
    assert!(text.contains(env!("CARGO_PKG_VERSION")));
    assert!(text.ends_with("manual> "));
}

#[test]
fn test_boot_leaves_outputs_physically_safe() {
    let transport = Transport::new();
    let watchdog = watchdog();
    let control = controller(&transport, &watchdog, Mode::Manual, Counters::volatile());

    assert!(control.context().outputs().is_cleared());
    assert!(!output_level(&control, CLUTCH_LEFT));
    assert!(output_level(&control, PAYOUT_BRAKE_RELEASE));
}

#[test]
fn test_transition_drives_outputs_in_same_cycle() {
    let transport = Transport::new();
    let watchdog = watchdog();
    let mut control = controller(&transport, &watchdog, Mode::Automatic, Counters::volatile());

    set_input(&mut control, TEMPERATURE_OK, true);
    set_input(&mut control, BRAKE_PEDAL, true);
    control.run_cycle();
    assert_eq!(control.context().state(), state::BRAKE_PRESSED);

    set_input(&mut control, SWITCH_CLUTCH_LEFT, true);
    let change = control.run_cycle().unwrap();
    assert_eq!(change.to, state::LEFT_ENGAGED);
    assert!(output_level(&control, CLUTCH_LEFT));
}

#[test]
fn test_state_notice_once_per_change() {
    let transport = Transport::new();
    let watchdog = watchdog();
    let mut control = controller(&transport, &watchdog, Mode::Automatic, Counters::volatile());

    set_input(&mut control, TEMPERATURE_OK, true);
    control.run_cycle();
    assert!(drain(&transport).ends_with("ready> "));

    set_input(&mut control, BRAKE_PEDAL, true);
    for _ in 0..5 {
        control.run_cycle();
    }
    let text = drain(&transport);
    assert_eq!(text.matches("State brake_pressed").count(), 1);
    assert_eq!(text, "\r\nState brake_pressed\r\nbrake_pressed> ");
}

#[test]
fn test_switch_to_automatic_resets_state_and_outputs() {
    let transport = Transport::new();
    let watchdog = watchdog();
    let mut control = controller(&transport, &watchdog, Mode::Automatic, Counters::volatile());

    // Leave the initial state with continuous outputs lit.
    set_input(&mut control, TEMPERATURE_OK, true);
    set_input(&mut control, HANDBRAKE, true);
    set_input(&mut control, BRAKE_PEDAL, true);
    control.run_cycle();
    assert_eq!(control.context().state(), state::BRAKE_PRESSED);
    assert!(control.context().outputs().get(output::LED_POWER));
    assert!(control.context().outputs().get(output::LED_HANDBRAKE));

    command(&mut control, &transport, "mode m");
    for port in ["clutch_left", "kupplung_rechts", "auszugsbremse_auf", "buzzer"] {
        command(&mut control, &transport, &format!("on {port}"));
    }
    assert!(output_level(&control, CLUTCH_LEFT));
    assert!(!output_level(&control, PAYOUT_BRAKE_RELEASE));
    assert!(control.context().outputs().bits().count() >= 6);

    drain(&transport);
    type_line(&transport, "mode a");
    control.run_cycle();

    assert_eq!(control.context().mode(), Mode::Automatic);
    assert_eq!(control.context().state(), state::READY);
    assert!(control.context().outputs().is_cleared());
    // Everything released; only the active-low payout line sits high.
    assert_eq!(control.context().io().latch('B'), 0b0000_0100);
    assert!(output_level(&control, PAYOUT_BRAKE_RELEASE));
}

#[test]
fn test_manual_mode_freezes_state_machine() {
    let transport = Transport::new();
    let watchdog = watchdog();
    let mut control = controller(&transport, &watchdog, Mode::Automatic, Counters::volatile());
    set_input(&mut control, TEMPERATURE_OK, true);
    control.run_cycle();

    command(&mut control, &transport, "mode m");
    let frozen = *control.context().outputs();
    assert!(frozen.get(output::LED_POWER));

    set_input(&mut control, BRAKE_PEDAL, true);
    set_input(&mut control, HANDBRAKE, true);
    for _ in 0..3 {
        assert_eq!(control.run_cycle(), None);
    }
    assert_eq!(control.context().state(), state::READY);
    // Continuous outputs stop updating too.
    assert_eq!(*control.context().outputs(), frozen);
}

#[test]
fn test_console_rejections() {
    let transport = Transport::new();
    let watchdog = watchdog();
    let mut control = controller(&transport, &watchdog, Mode::Automatic, Counters::volatile());
    set_input(&mut control, TEMPERATURE_OK, true);
    control.run_cycle();

    let text = command(&mut control, &transport, "on clutch_left");
    assert!(text.contains("Enable manual mode first!\r\n"));
    assert!(!output_level(&control, CLUTCH_LEFT));

    let text = command(&mut control, &transport, "reset");
    assert!(text.contains("Enable manual mode first!\r\n"));

    let text = command(&mut control, &transport, "frobnicate now");
    assert!(text.contains("Command not found: frobnicate\r\n"));

    let text = command(&mut control, &transport, "on");
    assert!(text.contains("Usage: on <port>\r\n"));

    let text = command(&mut control, &transport, "mode x");
    assert!(text.contains("Usage: mode [a|m]\r\n"));

    command(&mut control, &transport, "mode m");
    let text = command(&mut control, &transport, "on nope");
    assert!(text.contains("Unknown port: nope\r\n"));
    assert!(text.ends_with("manual> "));
}

#[test]
fn test_console_listings() {
    let transport = Transport::new();
    let watchdog = watchdog();
    let mut control = controller(&transport, &watchdog, Mode::Manual, Counters::volatile());
    set_input(&mut control, HANDBRAKE, true);
    control.run_cycle();

    let text = command(&mut control, &transport, "in");
    assert!(text.contains("Inputs:\r\n"));
    assert!(text.contains(&format!(
        "{:<20} | {:<24} | {:<4} | {}\r\n",
        "handbrake_engaged", "handbremse", "D2", "X"
    )));
    assert!(text.contains(&format!(
        "{:<20} | {:<24} | {:<4} | \r\n",
        "brake_pedal", "bremse", "D5"
    )));

    let text = command(&mut control, &transport, "out");
    assert!(text.contains("Outputs:\r\n"));
    assert!(text.contains("Name"));
    assert!(text.contains("payout_brake_release"));

    let text = command(&mut control, &transport, "mode");
    assert!(text.contains("Mode: manual\r\n"));

    let text = command(&mut control, &transport, "help on");
    assert!(text.contains("Usage: on <port>\r\nSet port on\r\n"));

    let text = command(&mut control, &transport, "help");
    assert!(text.contains("List of commands:\r\n"));
    assert!(text.contains("version Print version"));
}

#[test]
fn test_one_line_per_cycle() {
    let transport = Transport::new();
    let watchdog = watchdog();
    let mut control = controller(&transport, &watchdog, Mode::Manual, Counters::volatile());
    control.run_cycle();

    type_line(&transport, "on clutch_left");
    type_line(&transport, "on clutch_right");
    control.run_cycle();
    assert!(control.context().outputs().get(output::CLUTCH_LEFT));
    assert!(!control.context().outputs().get(output::CLUTCH_RIGHT));

    control.run_cycle();
    assert!(control.context().outputs().get(output::CLUTCH_RIGHT));
}

#[test]
fn test_counters_restored_and_committed_only_on_change() {
    let store = RecordingStore::holding(TOWS_LEFT, 41);
    let commits = Arc::clone(&store.commits);
    let image = Arc::clone(&store.image);

    let transport = Transport::new();
    let watchdog = watchdog();
    let counters = Counters::new(Box::new(store));
    let mut control = controller(&transport, &watchdog, Mode::Automatic, counters);

    set_input(&mut control, TEMPERATURE_OK, true);
    set_input(&mut control, BRAKE_PEDAL, true);
    control.run_cycle();
    control.run_cycle();
    assert_eq!(commits.load(Ordering::SeqCst), 0);

    set_input(&mut control, SWITCH_CLUTCH_LEFT, true);
    control.run_cycle();
    for _ in 0..10 {
        control.run_cycle();
    }

    assert_eq!(control.context().counter_store().get(TOWS_LEFT), 42);
    assert_eq!(commits.load(Ordering::SeqCst), 1);
    assert_eq!(image.lock().unwrap()[0].value, 42);

    let text = command(&mut control, &transport, "counters");
    assert!(text.contains("tows_left"));
    assert!(text.contains("42"));
}

/// Engages the left clutch from `ready`: one counted tow.
fn tow_left(control: &mut Controller<'_>) {
    set_input(control, BRAKE_PEDAL, true);
    control.run_cycle();
    set_input(control, SWITCH_CLUTCH_LEFT, true);
    assert_eq!(control.run_cycle().map(|c| c.to), Some(state::LEFT_ENGAGED));
}

#[test]
fn test_failed_restore_keeps_persisted_counts() {
    let store = RecordingStore::holding(TOWS_LEFT, 41);
    store.failing_loads.store(1, Ordering::SeqCst);

    let transport = Transport::new();
    let watchdog = watchdog();
    let counters = Counters::new(Box::new(store.clone()));
    let mut control = controller(&transport, &watchdog, Mode::Automatic, counters);
    assert!(!control.context().counter_store().is_restored());

    set_input(&mut control, TEMPERATURE_OK, true);
    control.run_cycle();
    tow_left(&mut control);

    assert_eq!(store.persisted(TOWS_LEFT), Some(42));
    assert_eq!(store.commits.load(Ordering::SeqCst), 1);
    assert_eq!(control.context().counter_store().get(TOWS_LEFT), 42);
}

#[test]
fn test_failed_commit_retried_next_cycle() {
    let store = RecordingStore::holding(TOWS_LEFT, 9);
    store.failing_commits.store(1, Ordering::SeqCst);

    let transport = Transport::new();
    let watchdog = watchdog();
    let counters = Counters::new(Box::new(store.clone()));
    let mut control = controller(&transport, &watchdog, Mode::Automatic, counters);

    set_input(&mut control, TEMPERATURE_OK, true);
    control.run_cycle();
    tow_left(&mut control);

    assert!(control.context().counter_store().is_dirty());
    assert_eq!(store.persisted(TOWS_LEFT), Some(9));
    assert_eq!(store.commits.load(Ordering::SeqCst), 0);

    control.run_cycle();
    assert!(!control.context().counter_store().is_dirty());
    assert_eq!(store.persisted(TOWS_LEFT), Some(10));
    assert_eq!(store.commits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_reinitialize_restores_safe_default() {
    let transport = Transport::new();
    let watchdog = watchdog();
    let mut control = controller(&transport, &watchdog, Mode::Manual, Counters::volatile());

    set_input(&mut control, TEMPERATURE_OK, true);
    command(&mut control, &transport, "mode a");
    assert_eq!(control.context().state(), state::READY);
    set_input(&mut control, BRAKE_PEDAL, true);
    control.run_cycle();
    set_input(&mut control, SWITCH_CLUTCH_LEFT, true);
    control.run_cycle();
    assert_eq!(control.context().state(), state::LEFT_ENGAGED);
    assert!(output_level(&control, CLUTCH_LEFT));

    control.reinitialize();
    assert_eq!(control.context().mode(), Mode::Manual);
    assert_eq!(control.context().state(), state::READY);
    assert!(control.context().outputs().is_cleared());
    assert!(!output_level(&control, CLUTCH_LEFT));
    assert!(output_level(&control, PAYOUT_BRAKE_RELEASE));
}

#[test]
fn test_watchdog_acknowledged_every_cycle() {
    let transport = Transport::new();
    let watchdog = watchdog();
    let mut control = controller(&transport, &watchdog, Mode::Manual, Counters::volatile());
    let after_boot = watchdog.acknowledgements();

    for _ in 0..20 {
        control.run_cycle();
    }
    assert!(watchdog.acknowledgements() >= after_boot + 20);
    assert_eq!(control.cycles(), 20);
}
