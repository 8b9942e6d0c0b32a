//! Interrupt-driven serial byte transport.
//!
//! ```text
//!  line ──▶ on_receive() ──▶ [ rx ] ──▶ read_byte()   (console)
//!  line ◀── on_transmit_ready() ◀── [ tx ] ◀── write_byte() (foreground)
//! ```
//!
//! The receive and transmit-ready events run in interrupt context: they
//! never block and never call into port or state-machine logic. The
//! foreground is the consumer of `rx` and the producer of `tx`; the events
//! are the producer of `rx` and the consumer of `tx`.

use core::convert::Infallible;
use core::sync::atomic::{fence, AtomicBool, AtomicU32, Ordering};

use static_assertions::const_assert;
use tracing::trace;

use crate::ringbuf::RingBuffer;
use crate::watchdog::Watchdog;

pub const RX_BUFFER_SIZE: usize = 32;
pub const TX_BUFFER_SIZE: usize = 32;

const_assert!(RX_BUFFER_SIZE >= 2);
const_assert!(TX_BUFFER_SIZE >= 2);

pub struct SerialTransport<const RX: usize = RX_BUFFER_SIZE, const TX: usize = TX_BUFFER_SIZE> {
    rx: RingBuffer<RX>,
    tx: RingBuffer<TX>,
    /// Transmit-ready event enabled. Set by the foreground, cleared by the
    /// transmit-ready event once `tx` runs dry.
    tx_armed: AtomicBool,
    /// Exclusive writer: receive event.
    rx_dropped: AtomicU32,
}

impl<const RX: usize, const TX: usize> SerialTransport<RX, TX> {
    pub const fn new() -> Self {
        Self {
            rx: RingBuffer::new(),
            tx: RingBuffer::new(),
            tx_armed: AtomicBool::new(false),
            rx_dropped: AtomicU32::new(0),
        }
    }

    /// Receive event: one inbound byte from the line.
    ///
    /// A full receive buffer drops the byte. Returns whether it was queued.
    pub fn on_receive(&self, byte: u8) -> bool {
        if self.rx.push(byte) {
            return true;
        }

        let dropped = self.rx_dropped.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(byte, dropped, "rx buffer full, byte dropped");
        false
    }

    /// Transmit-ready event: the line can accept one byte.
    ///
    /// Returns the byte to put on the line, or `None` after disabling the
    /// event because nothing is queued.
    pub fn on_transmit_ready(&self) -> Option<u8> {
        if let Some(byte) = self.tx.pop() {
            return Some(byte);
        }

        self.tx_armed.store(false, Ordering::Relaxed);
        // Pairs with the fence in `arm_transmit`: either the foreground sees
        // the disarm and re-arms, or we see its byte here.
        fence(Ordering::SeqCst);
        if !self.tx.is_empty() {
            self.tx_armed.store(true, Ordering::Relaxed);
        }
        None
    }

    /// Whether the transmit-ready event is currently enabled.
    pub fn is_transmit_armed(&self) -> bool {
        self.tx_armed.load(Ordering::Acquire)
    }

    /// Non-blocking read for the console.
    pub fn read_byte(&self) -> Option<u8> {
        self.rx.pop()
    }

    /// Queues one raw byte without line translation.
    pub fn try_write_byte(&self, byte: u8) -> nb::Result<(), Infallible> {
        let queued = self.tx.push(byte);
        self.arm_transmit();

        if queued {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Blocking write. A line feed goes out as CR LF.
    ///
    /// Spins while the transmit buffer is full, acknowledging `watchdog` on
    /// every iteration. A stalled line blocks here until the watchdog
    /// collaborator gives up on us.
    pub fn write_byte<W: Watchdog + ?Sized>(&self, byte: u8, watchdog: &W) {
        if byte == b'\n' {
            self.write_raw(b'\r', watchdog);
        }
        self.write_raw(byte, watchdog);
    }

    pub fn write_bytes<W: Watchdog + ?Sized>(&self, bytes: &[u8], watchdog: &W) {
        for &byte in bytes {
            self.write_byte(byte, watchdog);
        }
    }

    pub fn rx_dropped(&self) -> u32 {
        self.rx_dropped.load(Ordering::Relaxed)
    }

    pub fn rx_pending(&self) -> usize {
        self.rx.len()
    }

    pub fn tx_pending(&self) -> usize {
        self.tx.len()
    }

    fn write_raw<W: Watchdog + ?Sized>(&self, byte: u8, watchdog: &W) {
        loop {
            match self.try_write_byte(byte) {
                Ok(()) => return,
                Err(nb::Error::WouldBlock) => {
                    watchdog.acknowledge();
                    core::hint::spin_loop();
                }
                Err(nb::Error::Other(never)) => match never {},
            }
        }
    }

    fn arm_transmit(&self) {
        fence(Ordering::SeqCst);
        self.tx_armed.store(true, Ordering::Release);
    }
}

impl<const RX: usize, const TX: usize> Default for SerialTransport<RX, TX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const RX: usize, const TX: usize> core::fmt::Debug for SerialTransport<RX, TX> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("rx_pending", &self.rx_pending())
            .field("tx_pending", &self.tx_pending())
            .field("tx_armed", &self.is_transmit_armed())
            .field("rx_dropped", &self.rx_dropped())
            .finish()
    }
}

/// `core::fmt::Write` adapter over the blocking write path.
pub struct TransportWriter<'a, const RX: usize, const TX: usize, W: Watchdog + ?Sized> {
    transport: &'a SerialTransport<RX, TX>,
    watchdog: &'a W,
}

impl<'a, const RX: usize, const TX: usize, W: Watchdog + ?Sized> TransportWriter<'a, RX, TX, W> {
    pub fn new(transport: &'a SerialTransport<RX, TX>, watchdog: &'a W) -> Self {
        Self { transport, watchdog }
    }
}

impl<const RX: usize, const TX: usize, W: Watchdog + ?Sized> core::fmt::Write
    for TransportWriter<'_, RX, TX, W>
{
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.transport.write_bytes(s.as_bytes(), self.watchdog);
        Ok(())
    }
}
