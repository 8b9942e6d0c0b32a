//! Watchdog collaborator.
//!
//! The core only ever acknowledges the watchdog: once per completed control
//! cycle and on every iteration of a bounded busy-wait. What happens on
//! expiry (an uncontrolled reset) is outside the core.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub trait Watchdog {
    fn acknowledge(&self);
}

impl<W: Watchdog + ?Sized> Watchdog for &W {
    fn acknowledge(&self) {
        (**self).acknowledge();
    }
}

impl<W: Watchdog + ?Sized> Watchdog for std::sync::Arc<W> {
    fn acknowledge(&self) {
        (**self).acknowledge();
    }
}

/// Host stand-in for the hardware timer. Acknowledgements are lock-free so
/// the supervisor can poll `is_expired` from another thread.
#[derive(Debug)]
pub struct SoftwareWatchdog {
    epoch: Instant,
    timeout: Duration,
    last_ack_ms: AtomicU64,
    acknowledgements: AtomicU64,
}

impl SoftwareWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            timeout,
            last_ack_ms: AtomicU64::new(0),
            acknowledgements: AtomicU64::new(0),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time since the last acknowledgement (or since creation).
    pub fn idle_for(&self) -> Duration {
        let now_ms = self.elapsed_ms();
        let last_ms = self.last_ack_ms.load(Ordering::Acquire);
        Duration::from_millis(now_ms.saturating_sub(last_ms))
    }

    pub fn is_expired(&self) -> bool {
        self.idle_for() > self.timeout
    }

    pub fn acknowledgements(&self) -> u64 {
        self.acknowledgements.load(Ordering::Relaxed)
    }

    fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

impl Watchdog for SoftwareWatchdog {
    fn acknowledge(&self) {
        self.last_ack_ms.store(self.elapsed_ms(), Ordering::Release);
        self.acknowledgements.fetch_add(1, Ordering::Relaxed);
    }
}
