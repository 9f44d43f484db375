//! Per-core audio session
//!
//! Owns the rings of one emulation core instance for the life of its audio
//! session. The core writes through the session; each ring's consumer half is
//! handed once to the audio callback.

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;

use super::{StreamConfig, BUFFER_BACKOFF_MICROS};
use crate::ring_buffer::{RingBuffer, RingConsumer, RingProducer};
use crate::Result;

/// Session playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Rings muted and empty (initial state)
    #[default]
    Stopped,
    /// Rings live
    Playing,
    /// Rings muted and empty, core expected to resume
    Paused,
}

/// Lifecycle control around pause, seek and state-load boundaries
pub trait SessionControl {
    /// Unmute every ring
    fn play(&mut self);

    /// Mute and drain every ring; stale audio must not play on resume
    fn pause(&mut self);

    /// Mute and drain every ring
    fn stop(&mut self);

    /// Get current state
    fn state(&self) -> SessionState;

    /// Check if currently playing
    fn is_playing(&self) -> bool {
        self.state() == SessionState::Playing
    }
}

/// Producer-side statistics for monitoring overruns and buffer health
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    /// Bytes the core handed to the session
    pub bytes_pushed: u64,
    /// Bytes the rings reported as accepted
    pub bytes_accepted: u64,
    /// Number of writes that hit the overflow policy
    pub overrun_count: u64,
    /// Number of explicit buffer resets
    pub resets: u64,
    /// Fill of the most recently written ring (0.0 to 1.0)
    pub fill_percentage: f32,
}

/// Audio session of one emulation core
pub struct AudioSession {
    config: StreamConfig,
    producers: Vec<RingProducer>,
    consumers: Vec<Option<RingConsumer>>,
    stats: Arc<Mutex<SessionStats>>,
    state: SessionState,
}

impl AudioSession {
    /// Create `config.buffer_count` rings sized from the stream configuration
    ///
    /// The session starts [`SessionState::Stopped`] with its rings muted.
    pub fn new(config: StreamConfig) -> Result<Self> {
        config.validate()?;

        let mut producers = Vec::with_capacity(config.buffer_count);
        let mut consumers = Vec::with_capacity(config.buffer_count);
        for _ in 0..config.buffer_count {
            let ring = config.build_ring()?;
            ring.set_enabled(false);
            let (producer, consumer) = ring.split();
            producers.push(producer);
            consumers.push(Some(consumer));
        }

        debug!(
            "Audio session created: {} buffer(s) of {} bytes, {}Hz x{} {:?}, {}",
            config.buffer_count,
            producers.first().map_or(0, |p| p.capacity()),
            config.sample_rate,
            config.channels,
            config.sample_format,
            config.overflow_policy
        );

        Ok(AudioSession {
            config,
            producers,
            consumers,
            stats: Arc::new(Mutex::new(SessionStats::default())),
            state: SessionState::Stopped,
        })
    }

    /// Get the stream configuration
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Number of rings in this session
    pub fn buffer_count(&self) -> usize {
        self.producers.len()
    }

    /// Shared ring at `index`, for availability queries and resets
    pub fn buffer(&self, index: usize) -> Option<Arc<RingBuffer>> {
        self.producers.get(index).map(|p| Arc::clone(p.ring()))
    }

    /// Take the consumer half of ring `index` for the audio callback
    ///
    /// Returns `None` if the index is out of range or the consumer was already taken.
    pub fn take_consumer(&mut self, index: usize) -> Option<RingConsumer> {
        self.consumers.get_mut(index).and_then(Option::take)
    }

    /// Write raw bytes into ring `index`
    /// Returns the number of bytes the ring accepted (0 while stopped or paused)
    pub fn push_bytes(&mut self, index: usize, data: &[u8]) -> usize {
        let Some(producer) = self.producers.get_mut(index) else {
            warn!("Audio buffer {index} does not exist ({} configured)", self.config.buffer_count);
            return 0;
        };

        let overruns_before = producer.stats().overruns;
        let accepted = producer.write(data);
        let overruns_after = producer.stats().overruns;
        let fill = producer.ring().fill_percentage();

        let mut stats = self.stats.lock();
        stats.bytes_pushed += data.len() as u64;
        stats.bytes_accepted += accepted as u64;
        stats.overrun_count += overruns_after - overruns_before;
        stats.fill_percentage = fill;

        accepted
    }

    /// Write typed samples into ring `index`
    /// Returns the number of bytes accepted
    pub fn push_samples<T: bytemuck::Pod>(&mut self, index: usize, samples: &[T]) -> usize {
        self.push_bytes(index, bytemuck::cast_slice(samples))
    }

    /// Write bytes into ring `index`, waiting for space instead of overflowing
    /// Backs off until all bytes are written or max retries exceeded.
    /// Returns number of bytes actually written.
    ///
    /// Only for the producer thread; the ring itself never blocks.
    pub fn push_blocking(&mut self, index: usize, data: &[u8]) -> usize {
        const MAX_RETRIES: u32 = 1000; // ~100ms max wait at 100µs backoff

        let Some(ring) = self.buffer(index) else {
            return 0;
        };

        let mut total_written = 0;
        let mut remaining = data;
        let mut retry_count = 0;

        while !remaining.is_empty() && retry_count < MAX_RETRIES {
            if !ring.is_enabled() {
                break;
            }

            let room = ring.available_bytes_for_writing().min(remaining.len());
            let written = if room > 0 {
                self.push_bytes(index, &remaining[..room])
            } else {
                0
            };
            total_written += written;

            if written == 0 {
                // Buffer is full, back off and retry
                std::thread::sleep(std::time::Duration::from_micros(BUFFER_BACKOFF_MICROS));
                retry_count += 1;
            } else {
                remaining = &remaining[written..];
                retry_count = 0;
            }
        }

        total_written
    }

    /// Discard buffered audio in every ring (seek, state load)
    pub fn reset_buffers(&mut self) {
        for producer in &self.producers {
            producer.ring().reset();
        }
        let mut stats = self.stats.lock();
        stats.resets += 1;
        stats.fill_percentage = 0.0;
    }

    /// Get buffer fill percentage of ring `index` (0.0 to 1.0)
    pub fn fill_percentage(&self, index: usize) -> Option<f32> {
        self.producers.get(index).map(|p| p.ring().fill_percentage())
    }

    /// Get current session statistics
    pub fn stats(&self) -> SessionStats {
        *self.stats.lock()
    }

    /// Shared statistics, for monitoring from another thread
    pub fn stats_handle(&self) -> Arc<Mutex<SessionStats>> {
        Arc::clone(&self.stats)
    }

    /// Log fill level and ring counters of every buffer at debug level
    pub fn log_health(&self) {
        for (index, producer) in self.producers.iter().enumerate() {
            let ring = producer.ring();
            let counters = ring.stats();
            debug!(
                "Audio buffer {index}: fill={:.1}% written={} read={} overruns={} underruns={} silence={}",
                ring.fill_percentage() * 100.0,
                counters.bytes_written,
                counters.bytes_read,
                counters.overruns,
                counters.underruns,
                counters.silence_bytes
            );
        }
    }

    fn set_rings_enabled(&self, enabled: bool) {
        for producer in &self.producers {
            producer.ring().set_enabled(enabled);
        }
    }
}

impl SessionControl for AudioSession {
    fn play(&mut self) {
        self.set_rings_enabled(true);
        self.state = SessionState::Playing;
    }

    fn pause(&mut self) {
        if self.state == SessionState::Playing {
            self.set_rings_enabled(false);
            self.reset_buffers();
            self.state = SessionState::Paused;
        }
    }

    fn stop(&mut self) {
        self.set_rings_enabled(false);
        self.reset_buffers();
        self.state = SessionState::Stopped;
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        let stats = self.stats.lock();
        let underruns: u64 = self
            .producers
            .iter()
            .map(|p| p.ring().stats().underruns)
            .sum();
        info!(
            "Audio session closed: {} bytes pushed, {} overruns, {} underruns",
            stats.bytes_pushed, stats.overrun_count, underruns
        );
    }
}
