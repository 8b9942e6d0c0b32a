use std::thread;

use winchctl::RingBuffer;

#[test]
fn test_holds_capacity_minus_one() {
    let buffer: RingBuffer<8> = RingBuffer::new();
    assert_eq!(buffer.capacity(), 7);

    for byte in 0..7 {
        assert!(buffer.push(byte), "push {byte} should fit");
    }
    assert!(buffer.is_full());
    assert_eq!(buffer.len(), 7);

    // A failed push leaves the contents untouched.
    assert!(!buffer.push(99));
    assert_eq!(buffer.len(), 7);

    for byte in 0..7 {
        assert_eq!(buffer.pop(), Some(byte));
    }
    assert!(buffer.is_empty());
    assert_eq!(buffer.pop(), None);
}

#[test]
fn test_spsc_threads_preserve_order() {
    const TOTAL: usize = 20_000;
    let buffer: RingBuffer<16> = RingBuffer::new();

    let received = thread::scope(|s| {
        s.spawn(|| {
            for i in 0..TOTAL {
                let byte = (i % 251) as u8;
                while !buffer.push(byte) {
                    thread::yield_now();
                }
            }
        });

        let consumer = s.spawn(|| {
            let mut received = Vec::with_capacity(TOTAL);
            while received.len() < TOTAL {
                match buffer.pop() {
                    Some(byte) => received.push(byte),
                    None => thread::yield_now(),
                }
            }
            received
        });

        consumer.join().unwrap()
    });

    for (i, byte) in received.iter().enumerate() {
        assert_eq!(*byte, (i % 251) as u8, "byte {i} out of order");
    }
    assert!(buffer.is_empty());
}

#[test]
fn test_never_exceeds_capacity_under_contention() {
    const TOTAL: usize = 20_000;
    let buffer: RingBuffer<8> = RingBuffer::new();

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..TOTAL {
                while !buffer.push(i as u8) {
                    thread::yield_now();
                }
            }
        });

        s.spawn(|| {
            let mut seen = 0;
            while seen < TOTAL {
                assert!(buffer.len() <= buffer.capacity());
                if buffer.pop().is_some() {
                    seen += 1;
                } else {
                    thread::yield_now();
                }
            }
        });
    });
}
