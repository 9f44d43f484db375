//! Lock-free audio transport for emulator cores
//!
//! An emulation core renders audio on its own thread while the platform audio
//! callback pulls samples on a real-time thread. This crate provides the
//! hand-off between the two: a fixed-capacity circular byte buffer that never
//! blocks either side.
//!
//! # Features
//! - Single-producer/single-consumer ring over a zeroed, 64-byte aligned region
//! - Capacity rounded up to a power of two so wraparound is a bitmask
//! - Explicit overflow policies: reset-on-overflow or overwrite-oldest
//! - Never-short reads: underruns are padded with silence
//! - Relaxed atomic health counters that are safe to bump on the audio thread
//! - Session layer sizing one or more rings from a core's sample rate and channels
//! - Optional playback through the system audio device
//!
//! # Crate feature flags
//! - `playback` (opt-in): Real-time audio output (enables optional `rodio` dep)
//!
//! # Quick start
//! ## Ring only
//! ```
//! use emu_audio_ring::{OverflowPolicy, RingBuffer};
//!
//! let ring = RingBuffer::with_policy(4096, OverflowPolicy::ResetOnOverflow).unwrap();
//! let (mut producer, mut consumer) = ring.split();
//!
//! producer.write(&[1, 2, 3, 4]);
//!
//! let mut out = [0xFFu8; 8];
//! assert_eq!(consumer.read(&mut out), 8);
//! assert_eq!(out, [1, 2, 3, 4, 0, 0, 0, 0]);
//! ```
//!
//! ## Core session
//! ```
//! use emu_audio_ring::{AudioSession, SessionControl, StreamConfig};
//!
//! let mut session = AudioSession::new(StreamConfig::low_latency(48_000)).unwrap();
//! let consumer = session.take_consumer(0).unwrap(); // hand this to the audio callback
//! session.play();
//! session.push_samples(0, &[0i16; 960]);
//! assert_eq!(consumer.available_bytes_for_reading(), 1920);
//! ```

#![warn(missing_docs)]

pub mod ring_buffer; // Lock-free byte ring
pub mod streaming; // Stream configuration & core sessions
pub mod stress; // Concurrent producer/consumer harness

/// Error types for audio ring operations
///
/// Only construction and configuration can fail. Reads and writes handle
/// overflow and underrun by policy and never return errors.
#[derive(thiserror::Error, Debug)]
pub enum AudioRingError {
    /// Requested capacity is zero or too large
    #[error("Invalid ring buffer capacity: {0}")]
    InvalidCapacity(String),

    /// The zeroed storage allocation failed
    #[error("Failed to allocate {bytes} bytes of ring buffer storage")]
    AllocationFailed {
        /// Rounded size of the failed allocation
        bytes: usize,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// IO error from filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed or serialized
    #[error("Configuration format error: {0}")]
    Json(#[from] serde_json::Error),

    /// Audio device error
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for AudioRingError {
    /// Converts a String into `AudioRingError::Other`.
    ///
    /// Prefer the specific variants where the failure has a known category.
    fn from(msg: String) -> Self {
        AudioRingError::Other(msg)
    }
}

impl From<&str> for AudioRingError {
    fn from(msg: &str) -> Self {
        AudioRingError::Other(msg.to_string())
    }
}

/// Result type for audio ring operations
pub type Result<T> = std::result::Result<T, AudioRingError>;

// Public API exports
pub use ring_buffer::{
    OverflowPolicy, RingBuffer, RingConsumer, RingProducer, RingStats, MAX_CAPACITY,
    MIN_CAPACITY,
};
pub use streaming::{AudioSession, SampleFormat, SessionControl, SessionState, StreamConfig};
pub use stress::{run_stress, StressConfig, StressReport};

#[cfg(feature = "playback")]
pub use streaming::AudioDevice;
