use emu_audio_ring::{
    AudioSession, OverflowPolicy, SampleFormat, SessionControl, SessionState, StreamConfig,
};

fn mono_config(policy: OverflowPolicy) -> StreamConfig {
    // 8000Hz mono i16 for 16ms = 256 bytes
    StreamConfig {
        sample_rate: 8000,
        channels: 1,
        sample_format: SampleFormat::I16,
        buffered_ms: 16,
        overflow_policy: policy,
        buffer_count: 2,
    }
}

#[test]
fn core_to_callback_through_session() {
    let mut session = AudioSession::new(mono_config(OverflowPolicy::ResetOnOverflow)).unwrap();
    let mut consumer = session.take_consumer(1).unwrap();
    assert!(session.take_consumer(1).is_none());

    // Muted until played
    assert_eq!(session.push_samples(1, &[1i16, 2, 3]), 0);

    session.play();
    assert!(session.is_playing());
    assert_eq!(session.push_samples(1, &[1i16, 2, 3]), 6);
    assert_eq!(session.buffer(0).unwrap().available_bytes_for_reading(), 0);

    let mut samples = [0i16; 4];
    assert_eq!(consumer.read(bytemuck::cast_slice_mut(&mut samples)), 8);
    assert_eq!(samples, [1, 2, 3, 0]);
}

#[test]
fn pause_discards_stale_audio() {
    let mut session = AudioSession::new(mono_config(OverflowPolicy::OverwriteOldest)).unwrap();
    let mut consumer = session.take_consumer(0).unwrap();
    session.play();
    session.push_bytes(0, &[5u8; 100]);

    session.pause();
    assert_eq!(session.state(), SessionState::Paused);
    assert_eq!(session.fill_percentage(0), Some(0.0));

    session.play();
    let mut out = [0xFFu8; 16];
    consumer.read(&mut out);
    assert_eq!(out, [0u8; 16]);
    assert_eq!(session.stats().resets, 1);
}

#[test]
fn overruns_are_counted() {
    let mut session = AudioSession::new(mono_config(OverflowPolicy::ResetOnOverflow)).unwrap();
    session.play();
    for _ in 0..3 {
        session.push_bytes(0, &[1u8; 200]);
    }
    let stats = session.stats();
    assert_eq!(stats.bytes_pushed, 600);
    assert_eq!(stats.overrun_count, 2);
    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stream.json");

    let config = StreamConfig {
        overflow_policy: OverflowPolicy::OverwriteOldest,
        ..StreamConfig::low_latency(48000)
    };
    std::fs::write(&path, config.to_json_string().unwrap()).unwrap();

    let loaded = StreamConfig::from_json_file(&path).unwrap();
    assert_eq!(loaded, config);

    let session = AudioSession::new(loaded).unwrap();
    assert_eq!(session.buffer_count(), 1);
    assert_eq!(
        session.buffer(0).unwrap().policy(),
        OverflowPolicy::OverwriteOldest
    );
}

#[test]
fn missing_config_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = StreamConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, emu_audio_ring::AudioRingError::Io(_)));
}
