use clap::{App, Arg};
use colored::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tracing::{error, info, warn};
use winchctl::{
    winch, ControlLoop, ControllerConfig, Counters, JsonFileStore, Mode, PortMap, SerialTransport,
    SharedIo, SoftwareWatchdog,
};

/// The single serial line. Its receive event is fed by one task and its
/// transmit-ready event drained by another, as on the target.
static TRANSPORT: SerialTransport = SerialTransport::new();

/// Process exit code for a watchdog reset.
const EXIT_WATCHDOG: i32 = 3;
/// 9600 baud, 8N1.
const BYTE_TIME: Duration = Duration::from_micros(1042);
const LINE_BROADCAST_BUFFER_SIZE: usize = 256;
const SUPERVISOR_PERIOD: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("winch-sim")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Winch Control Team")
        .about("Host simulator for the AFK-3 winch controller")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("serial-port")
                .short("s")
                .long("serial-port")
                .value_name("PORT")
                .help("TCP port of the simulated serial line")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("panel-port")
                .short("p")
                .long("panel-port")
                .value_name("PORT")
                .help("TCP port of the input panel")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("mode")
                .short("m")
                .long("mode")
                .value_name("MODE")
                .help("Boot mode")
                .possible_values(&["a", "m", "automatic", "manual"])
                .takes_value(true),
        )
        .get_matches();

    let mut config = match matches.value_of("config") {
        Some(path) => ControllerConfig::load(path)?,
        None => ControllerConfig::default(),
    };
    if let Some(port) = matches.value_of("serial-port") {
        config.serial_port = port.parse()?;
    }
    if let Some(port) = matches.value_of("panel-port") {
        config.panel_port = port.parse()?;
    }
    if let Some(mode) = matches.value_of("mode") {
        config.boot_mode = mode.parse::<Mode>()?;
    }
    config.validate()?;

    println!("{}", "Winch Controller Simulator".bold().cyan());
    println!("{}", "==========================".cyan());
    println!("  Serial line: {}", format!("127.0.0.1:{}", config.serial_port).yellow());
    println!("  Input panel: {}", format!("127.0.0.1:{}", config.panel_port).yellow());
    println!("  Boot mode:   {}", config.boot_mode.to_string().green());
    println!(
        "  Cycle:       {} ms, watchdog {} ms",
        config.cycle_period_ms, config.watchdog_timeout_ms
    );

    let io = SharedIo::default();
    let watchdog = Arc::new(SoftwareWatchdog::new(config.watchdog_timeout()));
    let counters = match &config.counters_path {
        Some(path) => Counters::new(Box::new(JsonFileStore::new(path.clone()))),
        None => Counters::volatile(),
    };
    let context = winch::context(io.clone(), counters, config.boot_mode)?;
    let port_map = Arc::new(winch::port_map()?);

    let running = Arc::new(AtomicBool::new(true));
    let control_thread = {
        let running = Arc::clone(&running);
        let watchdog = Arc::clone(&watchdog);
        let period = config.cycle_period();
        thread::Builder::new()
            .name("control".into())
            .spawn(move || {
                let mut control = ControlLoop::new(context, &TRANSPORT, watchdog);
                control.boot();
                while running.load(Ordering::Acquire) {
                    let started = Instant::now();
                    control.run_cycle();
                    thread::sleep(period.saturating_sub(started.elapsed()));
                }
                control.reinitialize();
                info!(cycles = control.cycles(), "control loop stopped");
            })?
    };

    let (line_tx, _) = broadcast::channel::<Vec<u8>>(LINE_BROADCAST_BUFFER_SIZE);
    let (rx_sender, rx_receiver) = mpsc::channel::<Vec<u8>>(64);

    let receive_event = tokio::spawn(run_receive_event(rx_receiver));
    let transmit_event = tokio::spawn(run_transmit_event(line_tx.clone()));

    let serial_port = config.serial_port;
    let serial_server = tokio::spawn(async move {
        if let Err(e) = start_serial_server(serial_port, rx_sender, line_tx).await {
            error!("Serial server error: {}", e);
        }
    });

    let panel_port = config.panel_port;
    let panel_io = io.clone();
    let panel_server = tokio::spawn(async move {
        if let Err(e) = start_panel_server(panel_port, panel_io, port_map).await {
            error!("Panel server error: {}", e);
        }
    });

    let mut supervisor = time::interval(SUPERVISOR_PERIOD);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = supervisor.tick() => {
                if watchdog.is_expired() {
                    error!(idle_ms = watchdog.idle_for().as_millis() as u64, "watchdog expired");
                    eprintln!("{}", "Watchdog reset".red().bold());
                    std::process::exit(EXIT_WATCHDOG);
                }
            }
            _ = &mut shutdown => {
                info!("Ctrl-C received, stopping");
                break;
            }
        }
    }

    running.store(false, Ordering::Release);
    serial_server.abort();
    panel_server.abort();
    receive_event.abort();

    // Keep draining until the control thread has written its last byte.
    let joined = tokio::task::spawn_blocking(move || control_thread.join()).await?;
    transmit_event.abort();
    if joined.is_err() {
        error!("control thread panicked");
    }

    println!("{}", "Winch Controller Simulator stopped".cyan());
    Ok(())
}

/// Sole producer of the receive buffer, paced at the line rate.
async fn run_receive_event(mut chunks: mpsc::Receiver<Vec<u8>>) {
    while let Some(chunk) = chunks.recv().await {
        for byte in chunk {
            TRANSPORT.on_receive(byte);
            time::sleep(BYTE_TIME).await;
        }
    }
}

/// Sole consumer of the transmit buffer. Bytes nobody listens to are lost,
/// like a serial line with nothing attached.
async fn run_transmit_event(line: broadcast::Sender<Vec<u8>>) {
    let mut tick = time::interval(Duration::from_millis(1));
    loop {
        tick.tick().await;
        if !TRANSPORT.is_transmit_armed() {
            continue;
        }
        let mut bytes = Vec::new();
        while let Some(byte) = TRANSPORT.on_transmit_ready() {
            bytes.push(byte);
        }
        if !bytes.is_empty() {
            let _ = line.send(bytes);
        }
    }
}

async fn start_serial_server(
    port: u16,
    received: mpsc::Sender<Vec<u8>>,
    line: broadcast::Sender<Vec<u8>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("Serial line listening on port {}", port);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("Serial client connected: {}", addr);
                let received = received.clone();
                let outbound = line.subscribe();
                tokio::spawn(async move {
                    if let Err(e) = handle_serial_client(stream, received, outbound).await {
                        warn!("Serial client {} error: {}", addr, e);
                    }
                    info!("Serial client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("Failed to accept serial connection: {}", e);
            }
        }
    }
}

async fn handle_serial_client(
    stream: TcpStream,
    received: mpsc::Sender<Vec<u8>>,
    mut outbound: broadcast::Receiver<Vec<u8>>,
) -> std::io::Result<()> {
    let (mut reader, mut writer) = stream.into_split();

    let forward = tokio::spawn(async move {
        loop {
            match outbound.recv().await {
                Ok(bytes) => {
                    if writer.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "serial client lagging, output lost");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut buf = [0u8; 64];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 || received.send(buf[..n].to_vec()).await.is_err() {
            break;
        }
    }

    forward.abort();
    Ok(())
}

async fn start_panel_server(
    port: u16,
    io: SharedIo,
    map: Arc<PortMap>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("Input panel listening on port {}", port);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("Panel client connected: {}", addr);
                let io = io.clone();
                let map = Arc::clone(&map);
                tokio::spawn(async move {
                    if let Err(e) = handle_panel_client(stream, io, map).await {
                        warn!("Panel client {} error: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept panel connection: {}", e);
            }
        }
    }
}

async fn handle_panel_client(
    stream: TcpStream,
    io: SharedIo,
    map: Arc<PortMap>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let reply = panel_command(line.trim(), &io, &map);
        writer.write_all(reply.as_bytes()).await?;
    }
    Ok(())
}

fn panel_command(line: &str, io: &SharedIo, map: &PortMap) -> String {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] => String::new(),
        ["set", name, level] => {
            let high = match *level {
                "0" => false,
                "1" => true,
                _ => return "error: level must be 0 or 1\n".into(),
            };
            match input_pin(map, name) {
                Some(pin) => {
                    io.set_input(pin, high);
                    "ok\n".into()
                }
                None => format!("error: unknown input {}\n", name),
            }
        }
        ["toggle", name] => match input_pin(map, name) {
            Some(pin) => {
                let high = !io.input_level(pin);
                io.set_input(pin, high);
                format!("ok {}={}\n", name, u8::from(high))
            }
            None => format!("error: unknown input {}\n", name),
        },
        ["show"] => render_panel(io, map),
        _ => "error: expected `set <input> 0|1`, `toggle <input>` or `show`\n".into(),
    }
}

fn input_pin(map: &PortMap, name: &str) -> Option<winchctl::ports::PinId> {
    let id = map.input(name)?;
    map.input_spec(id).map(|spec| spec.pin)
}

fn render_panel(io: &SharedIo, map: &PortMap) -> String {
    let mut text = String::from("inputs:\n");
    for spec in map.inputs() {
        let level = io.input_level(spec.pin);
        text.push_str(&format!("  {:<20} {} {}\n", spec.name, spec.pin, u8::from(level)));
    }
    text.push_str("outputs:\n");
    for spec in map.outputs() {
        let on = io.output_level(spec.pin) == spec.level(true);
        text.push_str(&format!("  {:<20} {} {}\n", spec.name, spec.pin, u8::from(on)));
    }
    text
}
