//! Concurrent producer/consumer harness
//!
//! Runs one writer thread and one reader thread against a split ring with
//! randomly sized chunks. The payload is a sequence-numbered byte stream
//! (`1..=251`, never 0) so the reader can tell real bytes from silence and
//! detect every discontinuity in what it receives.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::ring_buffer::{OverflowPolicy, RingBuffer, RingStats};
use crate::Result;

/// Payload period; prime so wrap-induced false matches are rare
const SEQUENCE_PERIOD: u64 = 251;

/// Parameters of a stress run
#[derive(Debug, Clone, Copy)]
pub struct StressConfig {
    /// Requested ring capacity in bytes
    pub capacity: usize,
    /// Number of chunks the producer writes
    pub iterations: usize,
    /// Overflow policy of the ring under test
    pub policy: OverflowPolicy,
    /// Largest chunk either side moves at once (capped at the ring capacity)
    pub max_chunk: usize,
    /// When false the producer waits for space and overflow never happens
    pub allow_overflow: bool,
    /// Seed for the chunk size generators
    pub seed: u64,
    /// When set, a third thread calls `reset` at this interval while the stream runs
    pub reset_interval: Option<Duration>,
}

impl Default for StressConfig {
    fn default() -> Self {
        StressConfig {
            capacity: 4096,
            iterations: 10_000,
            policy: OverflowPolicy::default(),
            max_chunk: 512,
            allow_overflow: false,
            seed: 0x5EED,
            reset_interval: None,
        }
    }
}

/// Outcome of a stress run
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StressReport {
    /// Bytes handed to `write`
    pub bytes_produced: u64,
    /// Real bytes delivered to the reader
    pub bytes_delivered: u64,
    /// Silence bytes delivered to the reader
    pub silence_bytes: u64,
    /// Reads that returned less than requested (must be 0)
    pub short_reads: u64,
    /// Delivered bytes that did not continue the sequence
    pub discontinuities: u64,
    /// Silence that appeared before real data inside one read (must be 0)
    pub interleaved_silence: u64,
    /// Availability observations outside `[0, capacity]` (must be 0)
    pub invariant_violations: u64,
    /// Highest fill level observed by any thread
    pub max_observed_fill: usize,
    /// Resets issued by the lifecycle thread
    pub lifecycle_resets: u64,
    /// Final ring counters
    pub ring: RingStats,
}

impl StressReport {
    /// True when every property held: no short reads, no misplaced
    /// silence, no invariant violation, and no more discontinuities than
    /// overflow events and lifecycle resets could explain
    pub fn is_clean(&self) -> bool {
        self.short_reads == 0
            && self.interleaved_silence == 0
            && self.invariant_violations == 0
            && self.discontinuities <= self.ring.overruns + self.lifecycle_resets
    }
}

fn sequence_byte(index: u64) -> u8 {
    (index % SEQUENCE_PERIOD + 1) as u8
}

/// Run one writer and one reader concurrently and check the ring's contract
///
/// With [`StressConfig::reset_interval`] set, a lifecycle thread resets the
/// ring from outside both halves until the writer finishes.
pub fn run_stress(config: StressConfig) -> Result<StressReport> {
    let ring = RingBuffer::with_policy(config.capacity, config.policy)?;
    let capacity = ring.capacity();
    let max_chunk = config.max_chunk.clamp(1, capacity);
    let (mut producer, mut consumer) = ring.split();
    let shared = Arc::clone(producer.ring());

    let done = AtomicBool::new(false);
    let violations = AtomicUsize::new(0);
    let max_fill = AtomicUsize::new(0);

    let observe = |fill: usize| {
        if fill > capacity {
            violations.fetch_add(1, Ordering::Relaxed);
        }
        max_fill.fetch_max(fill, Ordering::Relaxed);
    };

    let (produced, reader_report, lifecycle_resets) = thread::scope(|scope| {
        let lifecycle = scope.spawn(|| {
            let Some(interval) = config.reset_interval else {
                return 0;
            };
            let mut resets = 0u64;
            loop {
                shared.reset();
                resets += 1;
                observe(shared.available_bytes_for_reading());
                if done.load(Ordering::Acquire) {
                    break resets;
                }
                thread::sleep(interval);
            }
        });

        let writer = scope.spawn(|| {
            let mut rng = StdRng::seed_from_u64(config.seed);
            let mut next_index = 0u64;
            let mut chunk = vec![0u8; max_chunk];
            let mut produced = 0u64;

            for _ in 0..config.iterations {
                let len = rng.gen_range(1..=max_chunk);
                if !config.allow_overflow {
                    while producer.available_bytes_for_writing() < len {
                        thread::yield_now();
                    }
                }
                for byte in &mut chunk[..len] {
                    *byte = sequence_byte(next_index);
                    next_index += 1;
                }
                producer.write(&chunk[..len]);
                produced += len as u64;
                observe(producer.ring().available_bytes_for_reading());
            }

            done.store(true, Ordering::Release);
            produced
        });

        let reader = scope.spawn(|| {
            let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
            let mut block = vec![0u8; max_chunk];
            let mut report = StressReport::default();
            let mut expected: Option<u8> = None;

            loop {
                let finished = done.load(Ordering::Acquire);
                let fill = consumer.available_bytes_for_reading();
                observe(fill);
                if finished && fill == 0 {
                    break;
                }

                let len = rng.gen_range(1..=max_chunk);
                let block = &mut block[..len];
                if consumer.read(block) != len {
                    report.short_reads += 1;
                }

                let real = block.iter().take_while(|&&b| b != 0).count();
                if block[real..].iter().any(|&b| b != 0) {
                    report.interleaved_silence += 1;
                }

                for &byte in &block[..real] {
                    if let Some(want) = expected {
                        if byte != want {
                            report.discontinuities += 1;
                        }
                    }
                    expected = Some(byte % SEQUENCE_PERIOD as u8 + 1);
                }
                report.bytes_delivered += real as u64;
                report.silence_bytes += (len - real) as u64;

                if real == 0 {
                    thread::yield_now();
                }
            }

            report
        });

        (
            writer.join().unwrap_or_else(|e| std::panic::resume_unwind(e)),
            reader.join().unwrap_or_else(|e| std::panic::resume_unwind(e)),
            lifecycle.join().unwrap_or_else(|e| std::panic::resume_unwind(e)),
        )
    });

    let mut report = reader_report;
    report.bytes_produced = produced;
    report.invariant_violations = violations.load(Ordering::Relaxed) as u64;
    report.max_observed_fill = max_fill.load(Ordering::Relaxed);
    report.lifecycle_resets = lifecycle_resets;
    report.ring = shared.stats();

    debug!(
        "Stress run finished: produced={} delivered={} silence={} discontinuities={} overruns={} resets={}",
        report.bytes_produced,
        report.bytes_delivered,
        report.silence_bytes,
        report.discontinuities,
        report.ring.overruns,
        report.lifecycle_resets
    );

    Ok(report)
}
