//! Fixed-capacity single-producer / single-consumer byte queue.
//!
//! The classic sentinel scheme is used: one slot always stays empty so that
//! `read == write` unambiguously means "empty" and `read == write + 1`
//! means "full". A buffer of `N` slots therefore holds at most `N - 1`
//! bytes.
//!
//! # Memory ordering
//!
//! Each index has exactly one writer:
//!
//! - `write`: written only by the producer
//! - `read`: written only by the consumer
//!
//! The producer stores the byte into its slot *before* publishing the new
//! write index with `Release`; the consumer loads the write index with
//! `Acquire` before touching the slot. The same holds mirrored for the read
//! index, so a slot is never reused while the consumer may still read it.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

pub struct RingBuffer<const N: usize> {
    slots: UnsafeCell<[u8; N]>,
    /// Exclusive writer: consumer.
    read: AtomicUsize,
    /// Exclusive writer: producer.
    write: AtomicUsize,
}

// SAFETY: the producer only writes the slot at `write` and the consumer only
// reads the slot at `read`; both slots are distinct whenever either side
// accesses them, and ownership of a slot is handed over through the
// Release/Acquire pair on the corresponding index.
unsafe impl<const N: usize> Sync for RingBuffer<N> {}
unsafe impl<const N: usize> Send for RingBuffer<N> {}

impl<const N: usize> RingBuffer<N> {
    const VALID_SIZE: () = assert!(N >= 2, "ring buffer needs at least two slots");

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_SIZE;

        Self {
            slots: UnsafeCell::new([0; N]),
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
        }
    }

    /// Number of bytes the buffer can hold at once.
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Producer side. Returns `false` without touching any state when full.
    pub fn push(&self, byte: u8) -> bool {
        let write = self.write.load(Ordering::Relaxed);
        let next = Self::advance(write);

        if next == self.read.load(Ordering::Acquire) {
            return false;
        }

        // SAFETY: `write` is owned by the producer until the index below is
        // published, and the consumer never reads at an index equal to `write`.
        unsafe {
            self.slots.get().cast::<u8>().add(write).write(byte);
        }
        self.write.store(next, Ordering::Release);
        true
    }

    /// Consumer side. Returns `None` when empty.
    pub fn pop(&self) -> Option<u8> {
        let read = self.read.load(Ordering::Relaxed);

        if read == self.write.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: the Acquire load above observed the producer's publish of
        // this slot, and the producer will not write it again until the read
        // index moves past it.
        let byte = unsafe { self.slots.get().cast::<u8>().add(read).read() };
        self.read.store(Self::advance(read), Ordering::Release);
        Some(byte)
    }

    pub fn is_empty(&self) -> bool {
        self.read.load(Ordering::Acquire) == self.write.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        self.read.load(Ordering::Acquire) == Self::advance(self.write.load(Ordering::Acquire))
    }

    /// Bytes currently queued. Only a snapshot when the other side is active.
    pub fn len(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        (write + N - read) % N
    }

    /// Drops all queued bytes. Requires exclusive access, so neither the
    /// producer nor the consumer can be running concurrently.
    pub fn clear(&mut self) {
        *self.read.get_mut() = 0;
        *self.write.get_mut() = 0;
        *self.slots.get_mut() = [0; N];
    }

    #[inline]
    const fn advance(index: usize) -> usize {
        if index + 1 == N {
            0
        } else {
            index + 1
        }
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for RingBuffer<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_wrap_at_slot_count() {
        let buffer = RingBuffer::<4>::new();

        for round in 0..10u8 {
            assert!(buffer.push(round));
            assert!(buffer.push(round.wrapping_add(100)));
            assert_eq!(buffer.len(), 2);
            assert_eq!(buffer.pop(), Some(round));
            assert_eq!(buffer.pop(), Some(round.wrapping_add(100)));
            assert!(buffer.is_empty());
        }
    }

    #[test]
    fn test_full_push_leaves_state_untouched() {
        let buffer = RingBuffer::<3>::new();
        assert!(buffer.push(1));
        assert!(buffer.push(2));
        assert!(buffer.is_full());

        assert!(!buffer.push(3));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.pop(), Some(1));
        assert_eq!(buffer.pop(), Some(2));
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn test_clear_resets_indices() {
        let mut buffer = RingBuffer::<8>::new();
        for byte in 0..5 {
            buffer.push(byte);
        }
        buffer.pop();

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.len(), 0);
        assert!(buffer.push(42));
        assert_eq!(buffer.pop(), Some(42));
    }
}
