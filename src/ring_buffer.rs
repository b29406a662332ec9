//! # Ring Buffer
//!
//! Fixed-capacity circular byte buffer shared between exactly one producer
//! and one consumer, either of which may run in interrupt context. No lock
//! and no critical section is taken on the hot path.
//!
//! One slot is always left empty so that a single index comparison tells
//! full from empty: `start == end` is empty, `end + 1 == start` is full,
//! and the usable capacity is `N - 1`.
//!
//! ## Ordering
//!
//! The producer writes the data byte before publishing the new `end`
//! (release store); the consumer loads `end` (acquire) before reading the
//! byte it guards. `start` is advanced with compare-exchange on both sides
//! because an overwriting insert also moves it when the buffer is full.
//!
//! ## Full-buffer policy
//!
//! A non-blocking insert into a full buffer drops the oldest byte. This is
//! the intended behaviour for lossy streams, not an error. A blocking
//! insert spins until the other side makes room; it is a busy-wait and
//! never yields to the scheduler.

use core::hint;
use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Single-producer, single-consumer byte ring.
pub struct RingBuffer<const N: usize> {
    buffer: [AtomicU8; N],
    start: AtomicUsize,
    end: AtomicUsize,
}

impl<const N: usize> RingBuffer<N> {
    const CHECK: () = assert!(N >= 2, "ring buffer needs at least two slots");

    /// Create an empty ring buffer.
    pub const fn new() -> Self {
        let () = Self::CHECK;
        Self {
            buffer: [const { AtomicU8::new(0) }; N],
            start: AtomicUsize::new(0),
            end: AtomicUsize::new(0),
        }
    }

    #[inline]
    const fn advance(index: usize) -> usize {
        (index + 1) % N
    }

    /// Usable capacity (`N - 1`).
    #[inline]
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// True if no byte is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start.load(Ordering::Acquire) == self.end.load(Ordering::Acquire)
    }

    /// True if the next insert would have to block or overwrite.
    #[inline]
    pub fn is_full(&self) -> bool {
        Self::advance(self.end.load(Ordering::Acquire)) == self.start.load(Ordering::Acquire)
    }

    /// Number of stored bytes.
    ///
    /// A snapshot taken while `start` did not move. Against a concurrent
    /// overwriting insert it may read one below capacity for the instant
    /// between the drop of the oldest byte and the publish of the new one.
    pub fn len(&self) -> usize {
        loop {
            let start = self.start.load(Ordering::Acquire);
            let end = self.end.load(Ordering::Acquire);
            if self.start.load(Ordering::Acquire) == start {
                return (N + end - start) % N;
            }
            hint::spin_loop();
        }
    }

    /// Number of free slots.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.len()
    }

    /// True when `threshold` or fewer free slots remain. Drives flow
    /// control before the buffer starts dropping data.
    #[inline]
    pub fn almost_full(&self, threshold: usize) -> bool {
        self.remaining() <= threshold
    }

    /// Producer side: append `byte`.
    ///
    /// With `block` set, spins while the buffer is full. Without it, a full
    /// buffer loses its oldest byte to make room.
    pub fn insert(&self, byte: u8, block: bool) {
        if block {
            while self.is_full() {
                hint::spin_loop();
            }
        }

        let end = self.end.load(Ordering::Relaxed);
        self.buffer[end].store(byte, Ordering::Relaxed);

        let next = Self::advance(end);
        let start = self.start.load(Ordering::Acquire);
        if next == start {
            // a racing consumer may already have moved start past this byte
            let _ = self.start.compare_exchange(
                start,
                Self::advance(start),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }

        self.end.store(next, Ordering::Release);
    }

    /// Producer side: append every byte of `bytes`, blocking when full.
    pub fn insert_slice(&self, bytes: &[u8]) {
        for &byte in bytes {
            self.insert(byte, true);
        }
    }

    /// Consumer side: take the oldest byte, or `None` if empty.
    pub fn remove(&self) -> Option<u8> {
        loop {
            let start = self.start.load(Ordering::Acquire);
            if start == self.end.load(Ordering::Acquire) {
                return None;
            }
            let byte = self.buffer[start].load(Ordering::Relaxed);
            if self
                .start
                .compare_exchange(start, Self::advance(start), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(byte);
            }
            // an overwriting insert dropped this byte; retry from the new start
        }
    }

    /// Discard all contents. Requires exclusive access, so neither side can
    /// be mid-operation.
    pub fn clear(&mut self) {
        *self.start.get_mut() = 0;
        *self.end.get_mut() = 0;
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;
    use std::vec::Vec;

    #[test]
    fn test_new_is_empty() {
        let rb = RingBuffer::<8>::new();
        assert!(rb.is_empty());
        assert!(!rb.is_full());
        assert_eq!(rb.len(), 0);
        assert_eq!(rb.capacity(), 7);
        assert_eq!(rb.remaining(), 7);
        assert_eq!(rb.remove(), None);
    }

    #[test]
    fn test_fill_to_capacity() {
        let rb = RingBuffer::<128>::new();
        for i in 0..127u8 {
            rb.insert(i, false);
        }
        assert!(rb.is_full());
        assert_eq!(rb.len(), 127);
        assert_eq!(rb.remaining(), 0);
    }

    #[test]
    fn test_overwrite_drops_oldest() {
        let rb = RingBuffer::<128>::new();
        for i in 0..127u8 {
            rb.insert(i, false);
        }
        rb.insert(200, false);
        assert!(rb.is_full());
        assert_eq!(rb.len(), 127);

        // byte 0 is gone, the rest follow in order, new byte last
        assert_eq!(rb.remove(), Some(1));
        let rest: Vec<u8> = core::iter::from_fn(|| rb.remove()).collect();
        assert_eq!(rest.len(), 126);
        assert_eq!(rest[..125], (2..127u8).collect::<Vec<_>>()[..]);
        assert_eq!(rest[125], 200);
    }

    #[test]
    fn test_fifo_round_trip() {
        let rb = RingBuffer::<16>::new();
        let data = b"hello, ring";
        for &b in data {
            rb.insert(b, false);
        }
        assert_eq!(rb.len(), data.len());
        let out: Vec<u8> = core::iter::from_fn(|| rb.remove()).collect();
        assert_eq!(out, data);
        assert!(rb.is_empty());
    }

    #[test]
    fn test_wraparound() {
        let rb = RingBuffer::<4>::new();
        for round in 0..10u8 {
            for i in 0..3 {
                rb.insert(round * 10 + i, false);
            }
            assert!(rb.is_full());
            for i in 0..3 {
                assert_eq!(rb.remove(), Some(round * 10 + i));
            }
            assert!(rb.is_empty());
        }
    }

    #[test]
    fn test_almost_full() {
        let rb = RingBuffer::<32>::new();
        for i in 0..14u8 {
            rb.insert(i, false);
        }
        assert_eq!(rb.remaining(), 17);
        assert!(!rb.almost_full(16));
        rb.insert(14, false);
        assert!(rb.almost_full(16));
    }

    #[test]
    fn test_clear() {
        let mut rb = RingBuffer::<8>::new();
        rb.insert_slice(b"abc");
        rb.clear();
        assert!(rb.is_empty());
        assert_eq!(rb.remove(), None);
    }

    #[test]
    fn test_blocking_producer_with_concurrent_consumer() {
        const TOTAL: usize = 10_000;
        let rb = Arc::new(RingBuffer::<16>::new());

        let producer = {
            let rb = Arc::clone(&rb);
            thread::spawn(move || {
                for i in 0..TOTAL {
                    rb.insert((i % 251) as u8, true);
                }
            })
        };

        let mut received = Vec::with_capacity(TOTAL);
        while received.len() < TOTAL {
            match rb.remove() {
                Some(b) => received.push(b),
                None => thread::yield_now(),
            }
        }
        producer.join().unwrap();

        assert!(rb.is_empty());
        for (i, &b) in received.iter().enumerate() {
            assert_eq!(b, (i % 251) as u8);
        }
    }

    #[test]
    fn test_overwriting_producer_with_concurrent_consumer() {
        for _ in 0..200 {
            let rb = Arc::new(RingBuffer::<16>::new());
            let done = Arc::new(AtomicBool::new(false));

            let producer = {
                let rb = Arc::clone(&rb);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    for seq in 0..=254u8 {
                        rb.insert(seq, false);
                    }
                    done.store(true, Ordering::Release);
                })
            };

            let mut received = Vec::new();
            loop {
                assert!(rb.len() <= rb.capacity());
                match rb.remove() {
                    Some(b) => received.push(b),
                    None if done.load(Ordering::Acquire) => break,
                    None => thread::yield_now(),
                }
            }
            producer.join().unwrap();
            received.extend(core::iter::from_fn(|| rb.remove()));

            // drops are fine, reordering and duplicates are not
            assert!(
                received.windows(2).all(|w| w[0] < w[1]),
                "out of order: {:?}",
                received
            );
            assert_eq!(received.last(), Some(&254));
        }
    }

    #[test]
    fn test_len_of_full_buffer_under_overwrite() {
        // fewer overwrites than slots, so `start` never laps back
        const N: usize = 4096;
        for _ in 0..50 {
            let rb = Arc::new(RingBuffer::<N>::new());
            for i in 0..N - 1 {
                rb.insert(i as u8, false);
            }
            let done = Arc::new(AtomicBool::new(false));

            let producer = {
                let rb = Arc::clone(&rb);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    for i in 0..N - 2 {
                        rb.insert(i as u8, false);
                    }
                    done.store(true, Ordering::Release);
                })
            };

            while !done.load(Ordering::Acquire) {
                let len = rb.len();
                assert!(len >= rb.capacity() - 1, "full buffer reported {}", len);
            }
            producer.join().unwrap();
            assert_eq!(rb.len(), rb.capacity());
        }
    }
}
