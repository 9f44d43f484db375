//! Stream configuration and per-core audio sessions
//!
//! A core declares its sample rate, channel count and sample format; this
//! module turns that into ring capacities and owns the rings for the life of
//! the core's session.

#[cfg(feature = "playback")]
pub mod audio_device;
pub mod realtime;

#[cfg(feature = "playback")]
pub use audio_device::AudioDevice;
pub use realtime::{AudioSession, SessionControl, SessionState, SessionStats};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ring_buffer::{OverflowPolicy, RingBuffer, MAX_CAPACITY, MIN_CAPACITY};
use crate::{AudioRingError, Result};

/// Default sample rate (44.1 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Producer backoff while waiting for ring space, in microseconds
pub const BUFFER_BACKOFF_MICROS: u64 = 100;

/// Encoding of the samples a core writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Signed 16-bit PCM
    #[default]
    I16,
    /// 32-bit float PCM
    F32,
}

impl SampleFormat {
    /// Size of one sample in bytes
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::I16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

/// Configuration for a core's audio stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of interleaved channels
    pub channels: u16,

    /// Encoding of each sample
    pub sample_format: SampleFormat,

    /// Milliseconds of audio the ring should absorb
    /// Larger = more latency but less chance of underrun.
    /// Cover at least one or two render callback periods.
    pub buffered_ms: u32,

    /// What happens when the core outruns the audio callback
    pub overflow_policy: OverflowPolicy,

    /// Number of independent audio buffers the core exposes
    pub buffer_count: usize,
}

impl StreamConfig {
    /// Create a streaming configuration optimized for low latency
    /// ~50ms of stereo 16-bit audio
    pub fn low_latency(sample_rate: u32) -> Self {
        StreamConfig {
            sample_rate,
            channels: 2,
            sample_format: SampleFormat::I16,
            buffered_ms: 50,
            overflow_policy: OverflowPolicy::ResetOnOverflow,
            buffer_count: 1,
        }
    }

    /// Create a streaming configuration optimized for stability
    /// ~200ms of stereo 16-bit audio
    pub fn stable(sample_rate: u32) -> Self {
        StreamConfig {
            buffered_ms: 200,
            ..Self::low_latency(sample_rate)
        }
    }

    /// Size of one interleaved frame in bytes
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.sample_format.bytes_per_sample()
    }

    /// Requested ring capacity in bytes before power-of-two rounding
    ///
    /// `sample_rate × channels × bytes_per_sample × buffered_ms / 1000`
    ///
    /// # Errors
    ///
    /// Returns [`AudioRingError::ConfigError`] if the product does not fit in `usize`.
    pub fn ring_capacity_bytes(&self) -> Result<usize> {
        let bytes = (self.sample_rate as u64)
            .checked_mul(self.bytes_per_frame() as u64)
            .and_then(|bytes_per_second| bytes_per_second.checked_mul(self.buffered_ms as u64))
            .map(|bytes| bytes / 1000)
            .ok_or_else(|| self.too_large())?;
        usize::try_from(bytes).map_err(|_| self.too_large())
    }

    /// Get latency in milliseconds of the rounded ring capacity
    pub fn latency_ms(&self) -> Result<f32> {
        let requested = self.ring_capacity_bytes()?.max(1);
        let capacity = requested
            .max(MIN_CAPACITY)
            .checked_next_power_of_two()
            .ok_or_else(|| self.too_large())?;
        let bytes_per_second = self.sample_rate as f64 * self.bytes_per_frame() as f64;
        if bytes_per_second == 0.0 {
            return Ok(0.0);
        }
        Ok((capacity as f64 / bytes_per_second * 1000.0) as f32)
    }

    fn too_large(&self) -> AudioRingError {
        AudioRingError::ConfigError(format!(
            "{}ms of {}Hz x{} {:?} audio does not fit in memory",
            self.buffered_ms, self.sample_rate, self.channels, self.sample_format
        ))
    }

    /// Check the configuration describes a usable stream
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AudioRingError::ConfigError(
                "sample_rate must be greater than 0".into(),
            ));
        }
        if self.channels == 0 {
            return Err(AudioRingError::ConfigError(
                "channels must be greater than 0".into(),
            ));
        }
        if self.buffered_ms == 0 {
            return Err(AudioRingError::ConfigError(
                "buffered_ms must be greater than 0".into(),
            ));
        }
        if self.buffer_count == 0 {
            return Err(AudioRingError::ConfigError(
                "buffer_count must be greater than 0".into(),
            ));
        }
        let capacity = self.ring_capacity_bytes()?;
        if capacity > MAX_CAPACITY {
            return Err(AudioRingError::ConfigError(format!(
                "{}ms of audio needs {capacity} bytes, above the {MAX_CAPACITY} byte limit",
                self.buffered_ms
            )));
        }
        Ok(())
    }

    /// Build one ring buffer sized and configured for this stream
    pub fn build_ring(&self) -> Result<RingBuffer> {
        self.validate()?;
        RingBuffer::with_policy(self.ring_capacity_bytes()?.max(1), self.overflow_policy)
    }

    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: StreamConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::stable(DEFAULT_SAMPLE_RATE)
    }
}

impl RingBuffer {
    /// Build a ring from a stream configuration; the configured
    /// [`OverflowPolicy`] selects the variant
    pub fn from_config(config: &StreamConfig) -> Result<Self> {
        config.build_ring()
    }
}
