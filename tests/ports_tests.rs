use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use winchctl::ports::*;

fn map() -> PortMap {
    PortMap::new(
        &[
            PortSpec::input("start", 'D', 0).alias("go"),
            PortSpec::input("stop", 'D', 1),
        ],
        &[
            PortSpec::output("motor", 'B', 0).alias("drive"),
            PortSpec::output("brake_release", 'B', 1).active_low(),
        ],
    )
    .unwrap()
}

#[test]
fn test_rising_edge_fires_once_per_transition() {
    let map = map();
    let start = map.input("start").unwrap();
    let mut ports = Ports::new(map);
    let mut io = SimulatedIo::new();
    let pin = PinId::new('D', 0);

    let levels = [false, true, true, true, false, false, true, false];
    let mut edges = Vec::new();
    for level in levels {
        io.set_input(pin, level);
        edges.push(ports.read_inputs(&mut io).rose(start));
    }

    assert_eq!(
        edges,
        [false, true, false, false, false, false, true, false]
    );
}

#[test]
fn test_previous_is_exactly_last_current() {
    let map = map();
    let mut ports = Ports::new(map);
    let mut io = SimulatedIo::new();

    io.set_input(PinId::new('D', 1), true);
    let first = ports.read_inputs(&mut io).current();
    io.set_input(PinId::new('D', 0), true);
    let second = *ports.read_inputs(&mut io);

    assert_eq!(second.previous(), first);
    assert_eq!(second.current().raw(), 0b11);
}

#[test]
fn test_edge_helpers_on_raw_bits() {
    let id = InputId::new(3);
    let low = Bits::EMPTY;
    let high = Bits::from_raw(1 << 3);

    assert!(rising_edge(low, high, id));
    assert!(!rising_edge(high, high, id));
    assert!(!rising_edge(low, low, id));
    assert!(falling_edge(high, low, id));
    assert!(!falling_edge(low, low, id));
}

#[test]
fn test_aliases_resolve_to_same_signal() {
    let map = map();
    assert_eq!(map.input("go"), map.input("start"));
    assert_eq!(map.output("drive"), map.output("motor"));
    assert_eq!(map.output("missing"), None);
    assert_eq!(map.input("motor"), None);
}

#[test]
fn test_reset_drives_physically_safe_levels() {
    let map = map();
    let motor = map.output("motor").unwrap();
    let release = map.output("brake_release").unwrap();
    let mut ports = Ports::new(map);
    let mut io = SimulatedIo::new();

    ports.outputs_mut().set(motor, true);
    ports.outputs_mut().set(release, true);
    ports.write_outputs(&mut io);
    assert!(io.output_level(PinId::new('B', 0)));
    assert!(!io.output_level(PinId::new('B', 1)));

    ports.reset_outputs(&mut io);
    assert!(ports.outputs().is_cleared());
    assert!(!io.output_level(PinId::new('B', 0)));
    // Active-low: released is low, so the safe state is high.
    assert!(io.output_level(PinId::new('B', 1)));
}

#[test]
fn test_write_outputs_touches_every_declared_pin() {
    let map = map();
    let ports = Ports::new(map);
    let mut io = SimulatedIo::new();

    ports.write_outputs(&mut io);
    assert_eq!(io.writes(), 2);
    assert_eq!(io.latch('B'), 0b10);
}

#[test]
fn test_port_map_rejects_bad_declarations() {
    assert_eq!(
        PortMap::new(&[PortSpec::input("x", 'Z', 0)], &[]).unwrap_err(),
        TableError::InvalidPin { port: 'Z', bit: 0 }
    );
    assert_eq!(
        PortMap::new(
            &[PortSpec::input("a", 'D', 0)],
            &[PortSpec::output("b", 'D', 0)]
        )
        .unwrap_err(),
        TableError::PinInUse(PinId::new('D', 0))
    );
    assert_eq!(
        PortMap::new(
            &[PortSpec::input("a", 'D', 0)],
            &[PortSpec::output("b", 'B', 0).alias("a")]
        )
        .unwrap_err(),
        TableError::DuplicateName("a".into())
    );
}

/// Port D latched as a whole; single-pin reads are only counted.
struct LatchedPortD {
    latched: u8,
    single_reads: usize,
}

impl DigitalIo for LatchedPortD {
    fn read_pin(&mut self, pin: PinId) -> bool {
        self.single_reads += 1;
        pin.port == 'D' && self.latched & (1 << pin.bit) != 0
    }

    fn write_pin(&mut self, _pin: PinId, _high: bool) {}

    fn read_pins(&mut self, pins: &mut dyn Iterator<Item = PinId>) -> Bits {
        let frame = self.latched;
        let mut bits = Bits::EMPTY;
        for (index, pin) in pins.enumerate() {
            bits.set(index, pin.port == 'D' && frame & (1 << pin.bit) != 0);
        }
        bits
    }
}

#[test]
fn test_inputs_captured_through_batch_read() {
    let mut ports = Ports::new(map());
    let mut io = LatchedPortD {
        latched: 0b10,
        single_reads: 0,
    };

    let snapshot = *ports.read_inputs(&mut io);
    assert_eq!(snapshot.current().raw(), 0b10);
    assert_eq!(io.single_reads, 0);
}

#[test]
fn test_shared_io_frame_never_torn() {
    let shared = SharedIo::default();
    let mut reader = shared.clone();
    let mut ports = Ports::new(map());
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            let mut high = false;
            while !done.load(Ordering::Relaxed) {
                high = !high;
                // Both pins change under one lock, like one register write.
                let mut pins = shared.lock();
                pins.set_input(PinId::new('D', 0), high);
                pins.set_input(PinId::new('D', 1), high);
            }
        });

        for _ in 0..20_000 {
            let raw = ports.read_inputs(&mut reader).current().raw();
            assert!(raw == 0b00 || raw == 0b11, "torn frame {raw:#04b}");
        }
        done.store(true, Ordering::Relaxed);
    });
}
