//! Audio device integration using rodio
//!
//! Plays a ring's consumer half on the system audio device. The rodio mixer
//! thread is the real-time consumer: it pulls fixed blocks and always gets a
//! full block back, silence included.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rodio::{OutputStream, Sink, Source};

use super::{SampleFormat, StreamConfig};
use crate::ring_buffer::RingConsumer;
use crate::{AudioRingError, Result};

/// Samples pulled from the ring per refill
const SOURCE_BLOCK_SAMPLES: usize = 1024;

/// Audio source that reads from the ring buffer
struct RingBufferSource<S> {
    consumer: RingConsumer,
    sample_rate: u32,
    channels: u16,
    finished: Arc<AtomicBool>,
    /// Internal block for batch reading
    block: Vec<S>,
    /// Current position in the internal block
    block_pos: usize,
}

impl<S> RingBufferSource<S>
where
    S: rodio::Sample + bytemuck::Pod,
{
    fn new(
        consumer: RingConsumer,
        sample_rate: u32,
        channels: u16,
        finished: Arc<AtomicBool>,
    ) -> Self {
        RingBufferSource {
            consumer,
            sample_rate,
            channels,
            finished,
            block: vec![S::zero_value(); SOURCE_BLOCK_SAMPLES],
            block_pos: SOURCE_BLOCK_SAMPLES, // Start by reading a new block
        }
    }

    fn refill(&mut self) {
        // Never-short read: underruns come back as zeroed samples
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(self.block.as_mut_slice());
        if self.consumer.read(bytes) == 0 {
            // Ring muted
            self.block.fill(S::zero_value());
        }
        self.block_pos = 0;
    }
}

impl<S> Source for RingBufferSource<S>
where
    S: rodio::Sample + bytemuck::Pod,
{
    fn current_frame_len(&self) -> Option<usize> {
        let remaining = self.block.len().saturating_sub(self.block_pos);
        Some(if remaining == 0 { self.block.len() } else { remaining })
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        // Stream length is unknown upfront
        None
    }
}

impl<S> Iterator for RingBufferSource<S>
where
    S: rodio::Sample + bytemuck::Pod,
{
    type Item = S;

    fn next(&mut self) -> Option<S> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }

        if self.block_pos >= self.block.len() {
            self.refill();
        }

        let sample = self.block[self.block_pos];
        self.block_pos += 1;
        Some(sample)
    }
}

/// Audio playback device using rodio
pub struct AudioDevice {
    _stream: OutputStream,
    sink: Sink,
    finished: Arc<AtomicBool>,
}

impl AudioDevice {
    /// Create a new audio device and start playback
    ///
    /// # Arguments
    /// * `config` - Stream configuration; its sample format picks the decoder
    /// * `consumer` - Consumer half of the ring the core writes into
    pub fn new(config: &StreamConfig, consumer: RingConsumer) -> Result<Self> {
        config.validate()?;

        let (stream, stream_handle) = OutputStream::try_default().map_err(|e| {
            AudioRingError::AudioDeviceError(format!("Failed to create audio stream: {e}"))
        })?;

        let sink = Sink::try_new(&stream_handle).map_err(|e| {
            AudioRingError::AudioDeviceError(format!("Failed to create audio sink: {e}"))
        })?;

        let finished = Arc::new(AtomicBool::new(false));

        match config.sample_format {
            SampleFormat::I16 => sink.append(RingBufferSource::<i16>::new(
                consumer,
                config.sample_rate,
                config.channels,
                Arc::clone(&finished),
            )),
            SampleFormat::F32 => sink.append(RingBufferSource::<f32>::new(
                consumer,
                config.sample_rate,
                config.channels,
                Arc::clone(&finished),
            )),
        }

        log::debug!(
            "Audio device started at {}Hz x{} {:?}",
            config.sample_rate,
            config.channels,
            config.sample_format
        );

        Ok(AudioDevice {
            _stream: stream,
            sink,
            finished,
        })
    }

    /// Pause playback
    pub fn pause(&self) {
        self.sink.pause();
    }

    /// Resume playback
    pub fn play(&self) {
        self.sink.play();
    }

    /// Check if audio device is running: not paused and not finished
    pub fn is_running(&self) -> bool {
        !self.finished.load(Ordering::Relaxed) && !self.sink.is_paused()
    }

    /// Signal that no more samples will be produced
    /// Ends the stream instead of playing silence forever
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.pause();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RingBuffer;

    fn source_with_data<S>(data: &[S]) -> RingBufferSource<S>
    where
        S: rodio::Sample + bytemuck::Pod,
    {
        let (mut producer, consumer) = RingBuffer::new(8192).unwrap().split();
        producer.write(bytemuck::cast_slice(data));
        RingBufferSource::new(consumer, 44100, 2, Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn test_ring_buffer_source_creation() {
        let source = source_with_data::<i16>(&[]);
        assert_eq!(source.sample_rate(), 44100);
        assert_eq!(source.channels(), 2);
        assert!(source.current_frame_len().is_some());
        assert!(source.total_duration().is_none());
    }

    #[test]
    fn test_source_plays_data_then_silence() {
        let mut source = source_with_data::<i16>(&[10, -10, 20]);
        assert_eq!(source.next(), Some(10));
        assert_eq!(source.next(), Some(-10));
        assert_eq!(source.next(), Some(20));
        // Underrun keeps the stream alive with silence
        assert_eq!(source.next(), Some(0));
    }

    #[test]
    fn test_source_decodes_f32() {
        let mut source = source_with_data::<f32>(&[0.5, -0.25]);
        assert_eq!(source.next(), Some(0.5));
        assert_eq!(source.next(), Some(-0.25));
        assert_eq!(source.next(), Some(0.0));
    }

    #[test]
    fn test_source_finished_signal() {
        let (_producer, consumer) = RingBuffer::new(4096).unwrap().split();
        let finished = Arc::new(AtomicBool::new(false));
        let mut source = RingBufferSource::<i16>::new(consumer, 44100, 1, Arc::clone(&finished));

        assert!(source.next().is_some());
        finished.store(true, Ordering::Relaxed);
        assert_eq!(source.next(), None);
    }

    #[test]
    fn test_audio_device_creation() {
        let (_producer, consumer) = RingBuffer::new(4096).unwrap().split();
        let device = match AudioDevice::new(&StreamConfig::low_latency(44100), consumer) {
            Ok(device) => device,
            Err(err) => {
                eprintln!("Skipping audio_device test (audio backend unavailable): {err}");
                return;
            }
        };
        assert!(device.is_running());
        device.pause();
        assert!(!device.is_running());
        device.play();
        assert!(device.is_running());
        device.finish();
        assert!(!device.is_running());
    }
}
