//! Ring buffer for handing audio bytes from an emulator core to the audio callback
//!
//! A ring buffer (circular buffer) lets two threads work concurrently:
//! - Producer thread: the core's audio output, writing rendered chunks
//! - Consumer thread: the platform render callback, reading fixed-size blocks
//!
//! Memory consumption is fixed at construction. Neither side ever blocks:
//! - Overflow is resolved by the buffer's [`OverflowPolicy`]
//! - Underrun is resolved by padding the caller's block with silence
//!
//! # Cursors
//!
//! Read and write positions are monotonically increasing byte counters; the
//! storage offset is `pos & mask`. The number of buffered bytes is
//! `write_pos - read_pos`, which is always in `[0, capacity]`:
//! - only the producer stores `write_pos`
//! - `read_pos` only moves forward, and only by compare-and-swap, so the
//!   consumer committing a read, the producer evicting under overflow and
//!   `reset` from a lifecycle thread never lose each other's updates

mod split;
mod storage;

pub use split::{RingConsumer, RingProducer};
pub use storage::STORAGE_ALIGN;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{AudioRingError, Result};
use storage::Storage;

/// Smallest capacity handed out; requests below it are rounded up
pub const MIN_CAPACITY: usize = STORAGE_ALIGN;

/// Largest capacity accepted (512 MiB)
pub const MAX_CAPACITY: usize = 512 * 1024 * 1024;

/// Attempts a read makes when its window is evicted mid-copy before giving up with silence
const MAX_READ_ATTEMPTS: usize = 4;

/// What `write` does when the incoming chunk does not fit in the free space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Discard everything buffered, then write as much of the new chunk as fits.
    ///
    /// Favors freshness: the latest samples win, at the cost of an audible resync.
    #[default]
    ResetOnOverflow,
    /// Evict just enough of the oldest unread bytes to accept the whole chunk.
    ///
    /// Favors producer data: the stream stays continuous but loses old samples.
    OverwriteOldest,
}

impl OverflowPolicy {
    /// Short name used in configuration files and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::ResetOnOverflow => "reset-on-overflow",
            OverflowPolicy::OverwriteOldest => "overwrite-oldest",
        }
    }
}

impl std::fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a ring buffer's health counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RingStats {
    /// Bytes copied into storage
    pub bytes_written: u64,
    /// Real (non-silence) bytes delivered to readers
    pub bytes_read: u64,
    /// Writes that hit the overflow policy
    pub overruns: u64,
    /// Reads that had to be padded with silence
    pub underruns: u64,
    /// Silence bytes delivered by padded reads
    pub silence_bytes: u64,
    /// Resets, explicit or triggered by overflow
    pub resets: u64,
}

#[derive(Debug, Default)]
struct RingCounters {
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
    overruns: AtomicU64,
    underruns: AtomicU64,
    silence_bytes: AtomicU64,
    resets: AtomicU64,
}

impl RingCounters {
    fn add(counter: &AtomicU64, value: usize) {
        counter.fetch_add(value as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RingStats {
        RingStats {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            silence_bytes: self.silence_bytes.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }
}

/// Lock-free single-producer/single-consumer byte ring
///
/// # Thread Safety
/// - One producer thread calls [`write`](Self::write)
/// - One consumer thread calls [`read`](Self::read)
/// - [`reset`](Self::reset), [`set_enabled`](Self::set_enabled) and the
///   availability queries are safe from any thread
///
/// [`split`](Self::split) enforces the single-producer/single-consumer
/// contract by ownership. Writing or reading from extra threads through a
/// shared reference is memory-safe but delivers unspecified bytes.
pub struct RingBuffer {
    storage: Storage,
    /// Capacity (power of 2 for efficient modulo operation)
    capacity: usize,
    /// Capacity mask for fast modulo: `pos & mask == pos % capacity`
    mask: usize,
    policy: OverflowPolicy,
    /// Write position (producer)
    write_pos: CachePadded<AtomicUsize>,
    /// Read position (consumer, or producer when evicting)
    read_pos: CachePadded<AtomicUsize>,
    enabled: AtomicBool,
    counters: RingCounters,
}

impl RingBuffer {
    /// Create a ring buffer with the default [`OverflowPolicy`]
    ///
    /// See [`with_policy`](Self::with_policy) for rounding and errors.
    pub fn new(requested_capacity: usize) -> Result<Self> {
        Self::with_policy(requested_capacity, OverflowPolicy::default())
    }

    /// Create a ring buffer
    /// Capacity is rounded up to [`MIN_CAPACITY`] and then to the next power of 2
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Requested capacity is 0
    /// - Requested capacity exceeds [`MAX_CAPACITY`]
    /// - The storage allocation fails
    pub fn with_policy(requested_capacity: usize, policy: OverflowPolicy) -> Result<Self> {
        if requested_capacity == 0 {
            return Err(AudioRingError::InvalidCapacity(
                "Ring buffer capacity must be greater than 0".into(),
            ));
        }
        if requested_capacity > MAX_CAPACITY {
            return Err(AudioRingError::InvalidCapacity(format!(
                "Ring buffer capacity {requested_capacity} exceeds maximum safe size {MAX_CAPACITY}"
            )));
        }

        let capacity = requested_capacity.max(MIN_CAPACITY).next_power_of_two();
        let storage = Storage::zeroed(capacity)?;
        debug_assert_eq!(storage.len(), capacity);

        debug!(
            "Ring buffer allocated: requested={requested_capacity} capacity={capacity} policy={policy}"
        );

        Ok(RingBuffer {
            storage,
            capacity,
            mask: capacity - 1,
            policy,
            write_pos: CachePadded::new(AtomicUsize::new(0)),
            read_pos: CachePadded::new(AtomicUsize::new(0)),
            enabled: AtomicBool::new(true),
            counters: RingCounters::default(),
        })
    }

    /// Usable size in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Overflow policy fixed at construction
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Number of buffered bytes a reader can take
    pub fn available_bytes_for_reading(&self) -> usize {
        // Load read first: read_pos never passes write_pos, so this cannot go negative.
        let read = self.read_pos.load(Ordering::Acquire);
        let write = self.write_pos.load(Ordering::Acquire);
        write.wrapping_sub(read).min(self.capacity)
    }

    /// Number of bytes a writer can add without triggering the overflow policy
    pub fn available_bytes_for_writing(&self) -> usize {
        self.capacity - self.available_bytes_for_reading()
    }

    /// Check if there is nothing to read
    pub fn is_empty(&self) -> bool {
        self.available_bytes_for_reading() == 0
    }

    /// Check if the next non-empty write overflows
    pub fn is_full(&self) -> bool {
        self.available_bytes_for_reading() == self.capacity
    }

    /// Get fill percentage (0.0 to 1.0)
    pub fn fill_percentage(&self) -> f32 {
        (self.available_bytes_for_reading() as f32) / (self.capacity as f32)
    }

    /// Enable or mute the buffer; while disabled reads and writes return 0
    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            debug!("Ring buffer {}", if enabled { "enabled" } else { "disabled" });
        }
    }

    /// Check whether reads and writes are live
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Snapshot the health counters
    pub fn stats(&self) -> RingStats {
        self.counters.snapshot()
    }

    /// Write bytes (producer)
    ///
    /// Returns the number of bytes accepted:
    /// - `data.len()` when the chunk fits
    /// - `min(data.len(), capacity)` after a reset under [`OverflowPolicy::ResetOnOverflow`]
    /// - `data.len()` under [`OverflowPolicy::OverwriteOldest`]; if the chunk is
    ///   larger than the whole buffer only its trailing `capacity` bytes are kept
    /// - 0 when disabled or `data` is empty
    pub fn write(&self, data: &[u8]) -> usize {
        if data.is_empty() || !self.is_enabled() {
            return 0;
        }

        // Only the producer stores write_pos.
        let write = self.write_pos.load(Ordering::Relaxed);
        let read = self.read_pos.load(Ordering::Acquire);
        let free = self.capacity - write.wrapping_sub(read).min(self.capacity);

        let (chunk, accepted) = if data.len() <= free {
            (data, data.len())
        } else {
            self.counters.overruns.fetch_add(1, Ordering::Relaxed);
            match self.policy {
                OverflowPolicy::ResetOnOverflow => {
                    let discarded = self.advance_read_to(write);
                    self.counters.resets.fetch_add(1, Ordering::Relaxed);
                    let kept = data.len().min(self.capacity);
                    warn!(
                        "Ring buffer capacity reached ({} bytes incoming, {free} free), discarding {discarded} buffered bytes",
                        data.len()
                    );
                    (&data[..kept], kept)
                }
                OverflowPolicy::OverwriteOldest => {
                    let kept = data.len().min(self.capacity);
                    let target = write.wrapping_add(kept).wrapping_sub(self.capacity);
                    let evicted = self.advance_read_to(target);
                    warn!(
                        "Ring buffer overflow, overwriting oldest {evicted} bytes ({} bytes incoming dropped)",
                        data.len() - kept
                    );
                    (&data[data.len() - kept..], data.len())
                }
            }
        };

        self.storage.copy_in(write & self.mask, chunk);

        // Release: a reader that sees the new write_pos sees the bytes.
        self.write_pos
            .store(write.wrapping_add(chunk.len()), Ordering::Release);
        RingCounters::add(&self.counters.bytes_written, chunk.len());

        accepted
    }

    /// Read exactly `dst.len()` bytes (consumer)
    ///
    /// Real data comes first; whatever could not be satisfied is zero-filled.
    /// Returns `dst.len()`, or 0 when disabled or `dst` is empty (in which
    /// case `dst` is left untouched).
    pub fn read(&self, dst: &mut [u8]) -> usize {
        if dst.is_empty() || !self.is_enabled() {
            return 0;
        }

        let copied = self.pop_into(dst);
        if copied < dst.len() {
            dst[copied..].fill(0);
            self.counters.underruns.fetch_add(1, Ordering::Relaxed);
            RingCounters::add(&self.counters.silence_bytes, dst.len() - copied);
        }

        dst.len()
    }

    /// Read up to `dst.len()` bytes without padding (consumer)
    ///
    /// Returns the number of real bytes copied; 0 when empty or disabled.
    pub fn read_available(&self, dst: &mut [u8]) -> usize {
        if dst.is_empty() || !self.is_enabled() {
            return 0;
        }
        self.pop_into(dst)
    }

    /// Discard all buffered bytes without reallocating
    pub fn reset(&self) {
        let write = self.write_pos.load(Ordering::Acquire);
        let discarded = self.advance_read_to(write);
        self.counters.resets.fetch_add(1, Ordering::Relaxed);
        debug!("Ring buffer reset, discarded {discarded} bytes");
    }

    /// Split into ownership-enforced producer and consumer handles
    pub fn split(self) -> (RingProducer, RingConsumer) {
        split::split(self)
    }

    fn pop_into(&self, dst: &mut [u8]) -> usize {
        self.pop_into_with(dst, || {})
    }

    /// `before_commit` runs between the copy and the commit of each attempt.
    #[inline]
    fn pop_into_with(&self, dst: &mut [u8], mut before_commit: impl FnMut()) -> usize {
        for _ in 0..MAX_READ_ATTEMPTS {
            let read = self.read_pos.load(Ordering::Acquire);
            let write = self.write_pos.load(Ordering::Acquire);

            let available = write.wrapping_sub(read);
            if available > self.capacity {
                // Evicted between the two loads
                continue;
            }

            let count = dst.len().min(available);
            if count == 0 {
                return 0;
            }

            self.storage.copy_out(read & self.mask, &mut dst[..count]);
            before_commit();

            // A failed commit means the writer evicted or a reset ran while we
            // copied, so the bytes may be stale: start over from the new position.
            if self
                .read_pos
                .compare_exchange(
                    read,
                    read.wrapping_add(count),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                RingCounters::add(&self.counters.bytes_read, count);
                return count;
            }
        }

        0
    }

    /// Move read_pos forward to `target`; never backwards.
    /// Returns the number of bytes skipped.
    fn advance_read_to(&self, target: usize) -> usize {
        let mut read = self.read_pos.load(Ordering::Acquire);
        loop {
            let behind = target.wrapping_sub(read);
            // 0: already there. > capacity: read is already past target.
            if behind == 0 || behind > self.capacity {
                return 0;
            }
            match self.read_pos.compare_exchange_weak(
                read,
                target,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return behind,
                Err(current) => read = current,
            }
        }
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("storage", &self.storage)
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("write_pos", &self.write_pos.load(Ordering::Relaxed))
            .field("read_pos", &self.read_pos.load(Ordering::Relaxed))
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
