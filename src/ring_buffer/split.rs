//! Producer and consumer halves of a [`RingBuffer`].
//!
//! Neither half is `Clone`, and the data path takes `&mut self`, so a split
//! ring has exactly one writer and one reader. Both halves share the ring
//! through an `Arc` so lifecycle code can still reset or mute it.

use std::sync::Arc;

use super::{RingBuffer, RingStats};

pub(super) fn split(ring: RingBuffer) -> (RingProducer, RingConsumer) {
    let ring = Arc::new(ring);
    (
        RingProducer {
            ring: Arc::clone(&ring),
        },
        RingConsumer { ring },
    )
}

/// Writing half, owned by the emulator core's audio thread
#[derive(Debug)]
pub struct RingProducer {
    ring: Arc<RingBuffer>,
}

impl RingProducer {
    /// Write bytes; see [`RingBuffer::write`]
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.ring.write(data)
    }

    /// Bytes that fit without triggering the overflow policy
    pub fn available_bytes_for_writing(&self) -> usize {
        self.ring.available_bytes_for_writing()
    }

    /// Usable size in bytes
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Health counters of the shared ring
    pub fn stats(&self) -> RingStats {
        self.ring.stats()
    }

    /// Shared ring, for reset and enable control
    pub fn ring(&self) -> &Arc<RingBuffer> {
        &self.ring
    }
}

/// Reading half, owned by the platform audio render callback
#[derive(Debug)]
pub struct RingConsumer {
    ring: Arc<RingBuffer>,
}

impl RingConsumer {
    /// Fill `dst` completely, padding with silence; see [`RingBuffer::read`]
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        self.ring.read(dst)
    }

    /// Copy only real bytes; see [`RingBuffer::read_available`]
    pub fn read_available(&mut self, dst: &mut [u8]) -> usize {
        self.ring.read_available(dst)
    }

    /// Buffered bytes ready to read
    pub fn available_bytes_for_reading(&self) -> usize {
        self.ring.available_bytes_for_reading()
    }

    /// Usable size in bytes
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Shared ring, for reset and enable control
    pub fn ring(&self) -> &Arc<RingBuffer> {
        &self.ring
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OverflowPolicy;
    use std::thread;

    #[test]
    fn test_split_halves_share_ring() {
        let (mut producer, mut consumer) = RingBuffer::new(256).unwrap().split();
        assert!(Arc::ptr_eq(producer.ring(), consumer.ring()));

        producer.write(b"hello");
        assert_eq!(consumer.available_bytes_for_reading(), 5);
        assert_eq!(producer.available_bytes_for_writing(), 251);

        let mut out = [0u8; 5];
        consumer.read(&mut out);
        assert_eq!(&out, b"hello");
        assert_eq!(producer.stats().bytes_read, 5);
    }

    #[test]
    fn test_lifecycle_reset_through_shared_ring() {
        let (mut producer, mut consumer) =
            RingBuffer::with_policy(128, OverflowPolicy::OverwriteOldest)
                .unwrap()
                .split();
        producer.write(&[3u8; 100]);

        let lifecycle = Arc::clone(consumer.ring());
        lifecycle.reset();

        let mut out = [0xFFu8; 16];
        assert_eq!(consumer.read(&mut out), 16);
        assert_eq!(out, [0u8; 16]);
    }

    #[test]
    fn test_halves_move_to_threads() {
        let (mut producer, mut consumer) = RingBuffer::new(1024).unwrap().split();

        let writer = thread::spawn(move || {
            let mut written = 0;
            while written < 4096 {
                let chunk = producer.available_bytes_for_writing().min(4096 - written);
                let data: Vec<u8> = (written..written + chunk).map(|i| (i % 256) as u8).collect();
                written += producer.write(&data);
                thread::yield_now();
            }
        });

        let mut received = Vec::with_capacity(4096);
        let mut block = [0u8; 97];
        while received.len() < 4096 {
            let n = consumer.read_available(&mut block);
            received.extend_from_slice(&block[..n]);
            if n == 0 {
                thread::yield_now();
            }
        }
        writer.join().unwrap();

        let expected: Vec<u8> = (0..4096).map(|i| (i % 256) as u8).collect();
        assert_eq!(received, expected);
    }
}
