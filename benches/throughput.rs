//! Benchmarks for the ring buffer hot path
//!
//! Run with: cargo bench --bench throughput

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use emu_audio_ring::{OverflowPolicy, RingBuffer, StreamConfig};
use std::hint::black_box;

fn bench_write_read_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_read");

    // One video frame of stereo i16 at 44.1kHz / 60Hz is 2940 bytes
    for chunk in [64usize, 512, 2940, 8192].iter() {
        let ring = RingBuffer::new(16384).unwrap();
        let data = vec![0x5Au8; *chunk];
        let mut out = vec![0u8; *chunk];

        group.throughput(Throughput::Bytes(*chunk as u64));
        group.bench_with_input(BenchmarkId::from_parameter(chunk), chunk, |b, _| {
            b.iter(|| {
                ring.write(black_box(&data));
                black_box(ring.read(&mut out));
            });
        });
    }

    group.finish();
}

fn bench_wrapping_reads(c: &mut Criterion) {
    let ring = RingBuffer::new(4096).unwrap();
    let data = [1u8; 1000];
    let mut out = [0u8; 1000];

    // 1000 does not divide 4096, so most iterations straddle the end
    c.bench_function("wrapping_1000_in_4096", |b| {
        b.iter(|| {
            ring.write(black_box(&data));
            black_box(ring.read(&mut out));
        });
    });
}

fn bench_underrun_read(c: &mut Criterion) {
    let ring = RingBuffer::new(4096).unwrap();
    let mut out = [0u8; 1024];

    c.bench_function("underrun_silence_1024", |b| {
        b.iter(|| {
            black_box(ring.read(&mut out));
        });
    });
}

fn bench_overflow_policies(c: &mut Criterion) {
    let mut group = c.benchmark_group("overflow");
    let data = [7u8; 3000];

    for policy in [
        OverflowPolicy::ResetOnOverflow,
        OverflowPolicy::OverwriteOldest,
    ] {
        let ring = RingBuffer::with_policy(4096, policy).unwrap();
        group.bench_function(policy.as_str(), |b| {
            b.iter(|| {
                // Never drained: every second write overflows
                black_box(ring.write(black_box(&data)));
            });
        });
    }

    group.finish();
}

fn bench_split_halves(c: &mut Criterion) {
    let config = StreamConfig::low_latency(44100);
    let (mut producer, mut consumer) = RingBuffer::from_config(&config).unwrap().split();
    let frame = vec![0u8; 735 * config.bytes_per_frame()];
    let mut out = vec![0u8; 1024];

    c.bench_function("split_frame_then_callbacks", |b| {
        b.iter(|| {
            producer.write(black_box(&frame));
            while consumer.available_bytes_for_reading() >= out.len() {
                black_box(consumer.read(&mut out));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_write_read_pairs,
    bench_wrapping_reads,
    bench_underrun_read,
    bench_overflow_policies,
    bench_split_halves
);
criterion_main!(benches);
