use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use emu_audio_ring::{run_stress, OverflowPolicy, RingBuffer, StressConfig, StreamConfig};

#[derive(Parser, Debug)]
#[command(name = "emu-ring", version, about = "Emulator audio ring buffer tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hammer a ring with one writer and one reader thread and check the stream
    Stress {
        /// Requested capacity in bytes (rounded up to a power of two)
        #[arg(long, default_value_t = 4096)]
        capacity: usize,
        /// Number of chunks the writer produces
        #[arg(long, default_value_t = 100_000)]
        iterations: usize,
        /// Overflow policy of the ring under test
        #[arg(long, value_enum, default_value_t = PolicyArg::Reset)]
        policy: PolicyArg,
        /// Seed for the chunk size generators
        #[arg(long, default_value_t = 0x5EED)]
        seed: u64,
        /// Largest chunk either side moves at once
        #[arg(long, default_value_t = 512)]
        max_chunk: usize,
        /// Let the writer outrun the reader instead of waiting for space
        #[arg(long)]
        allow_overflow: bool,
        /// Reset the ring from a third thread every N microseconds
        #[arg(long)]
        reset_every_micros: Option<u64>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stream configuration and the ring it produces
    Config {
        #[arg(long, value_enum, default_value_t = Preset::LowLatency)]
        preset: Preset,
        #[arg(long, default_value_t = emu_audio_ring::streaming::DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,
        /// Load this JSON file instead of a preset
        #[arg(long)]
        file: Option<std::path::PathBuf>,
    },
    /// Play a sine tone through the ring on the default audio device
    #[cfg(feature = "playback")]
    Tone {
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,
        #[arg(long, default_value_t = 2.0)]
        seconds: f32,
        #[arg(long, default_value_t = emu_audio_ring::streaming::DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    Reset,
    Overwrite,
}

impl From<PolicyArg> for OverflowPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Reset => OverflowPolicy::ResetOnOverflow,
            PolicyArg::Overwrite => OverflowPolicy::OverwriteOldest,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Preset {
    LowLatency,
    Stable,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<ExitCode> {
    match command {
        Command::Stress {
            capacity,
            iterations,
            policy,
            seed,
            max_chunk,
            allow_overflow,
            reset_every_micros,
            json,
        } => stress(
            StressConfig {
                capacity,
                iterations,
                policy: policy.into(),
                max_chunk,
                allow_overflow,
                seed,
                reset_interval: reset_every_micros.map(Duration::from_micros),
            },
            json,
        ),
        Command::Config {
            preset,
            sample_rate,
            file,
        } => {
            let config = match file {
                Some(path) => StreamConfig::from_json_file(&path)
                    .with_context(|| format!("Failed to load {}", path.display()))?,
                None => match preset {
                    Preset::LowLatency => StreamConfig::low_latency(sample_rate),
                    Preset::Stable => StreamConfig::stable(sample_rate),
                },
            };
            print_config(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        #[cfg(feature = "playback")]
        Command::Tone {
            frequency,
            seconds,
            sample_rate,
        } => {
            tone::play(frequency, seconds, sample_rate)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn stress(config: StressConfig, json: bool) -> Result<ExitCode> {
    info!(
        "Stress: capacity={} iterations={} policy={} overflow={}",
        config.capacity, config.iterations, config.policy, config.allow_overflow
    );
    let report = run_stress(config).context("Stress run failed to start")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Produced:           {} bytes", report.bytes_produced);
        println!("Delivered:          {} bytes", report.bytes_delivered);
        println!("Silence:            {} bytes", report.silence_bytes);
        println!("Max fill:           {} bytes", report.max_observed_fill);
        println!("Overruns:           {}", report.ring.overruns);
        println!("Lifecycle resets:   {}", report.lifecycle_resets);
        println!("Underruns:          {}", report.ring.underruns);
        println!("Discontinuities:    {}", report.discontinuities);
        println!("Short reads:        {}", report.short_reads);
        println!("Misplaced silence:  {}", report.interleaved_silence);
        println!("Invariant breaches: {}", report.invariant_violations);
    }

    if report.is_clean() {
        println!("OK");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("CORRUPTED");
        Ok(ExitCode::FAILURE)
    }
}

fn print_config(config: &StreamConfig) -> Result<()> {
    let ring = RingBuffer::from_config(config)?;
    println!("{}", config.to_json_string()?);
    println!(
        "Ring: {} bytes requested, {} bytes allocated, {:.1} ms latency",
        config.ring_capacity_bytes()?,
        ring.capacity(),
        config.latency_ms()?
    );
    Ok(())
}

#[cfg(feature = "playback")]
mod tone {
    use std::f32::consts::TAU;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use log::{info, warn};

    use emu_audio_ring::{AudioDevice, AudioSession, SessionControl, StreamConfig};

    /// Frames rendered per push, roughly one emulated video frame
    const FRAMES_PER_PUSH: usize = 735;

    pub fn play(frequency: f32, seconds: f32, sample_rate: u32) -> Result<()> {
        let mut session = AudioSession::new(StreamConfig::low_latency(sample_rate))?;
        let consumer = session
            .take_consumer(0)
            .context("Session has no audio buffer")?;
        let device = AudioDevice::new(session.config(), consumer)?;
        session.play();

        let total_frames = (seconds.max(0.0) * sample_rate as f32) as usize;
        let step = TAU * frequency / sample_rate as f32;
        let mut phase = 0.0f32;
        let mut block = Vec::with_capacity(FRAMES_PER_PUSH * 2);
        let mut rendered = 0;

        info!("Playing {frequency}Hz for {seconds}s at {sample_rate}Hz");

        while rendered < total_frames {
            let frames = FRAMES_PER_PUSH.min(total_frames - rendered);
            block.clear();
            for _ in 0..frames {
                let sample = (phase.sin() * 0.25 * i16::MAX as f32) as i16;
                block.push(sample);
                block.push(sample);
                phase = (phase + step) % TAU;
            }

            let bytes: &[u8] = bytemuck::cast_slice(block.as_slice());
            if session.push_blocking(0, bytes) < bytes.len() {
                warn!("Audio device stalled; dropping the rest of the tone");
                break;
            }
            rendered += frames;
        }

        // Let the device drain what is still buffered
        let drain_ms = session.config().latency_ms()?.ceil() as u64;
        std::thread::sleep(Duration::from_millis(drain_ms));

        session.log_health();
        device.finish();
        session.stop();
        Ok(())
    }
}
