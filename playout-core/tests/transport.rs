//! Transport behavior of the output stage, driven through a manual clock.

use playout_core::*;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn manual_stage<S>(format: AudioFormat, source: Arc<Mutex<S>>) -> (OutputStage, ManualClock)
where
    S: SampleSource + 'static,
{
    let backend = ManualBackend::new();
    let clock = backend.clock();
    let stage = OutputStage::new(
        OutputStageDesc::default().format(format),
        source,
        Box::new(backend),
    )
    .expect("stage");
    (stage, clock)
}

fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} ± {tolerance}, got {actual}"
    );
}

#[test]
fn play_pause_seek_stop_scenario() {
    init_logging();
    let format = AudioFormat::mono(44_100);
    let source = MemorySource::sine(format, 440.0, 0.5, 3.0).shared();
    let (mut output, clock) = manual_stage(format, source);

    assert_eq!(output.state(), PlaybackState::Stopped);
    assert!(!output.is_ready_to_play());

    output.resume().expect("resume");
    assert_eq!(output.state(), PlaybackState::Processing);
    assert!(output.is_processing());

    // One second at 44.1 kHz, in device-sized blocks
    let mut block = vec![0.0f32; 441];
    let mut heard_signal = false;
    for _ in 0..100 {
        assert!(clock.render(&mut block));
        heard_signal |= block.iter().any(|s| *s != 0.0);
    }
    assert!(heard_signal);
    assert!(output.is_ready_to_play());
    assert_close(output.amount_played(), 1.0, 1e-9);

    output.pause();
    assert_eq!(output.state(), PlaybackState::Paused);
    for _ in 0..10 {
        clock.render(&mut block);
        assert!(block.iter().all(|s| *s == 0.0));
    }
    assert_close(output.amount_played(), 1.0, 1e-9);

    output.seek(0.5);
    assert_close(output.amount_played(), 0.5, 1.0 / 44_100.0);

    output.stop();
    assert_eq!(output.state(), PlaybackState::Stopped);
    assert!(!output.is_ready_to_play());
    assert!(!clock.is_running());
}

#[test]
fn transitions_are_idempotent() {
    init_logging();
    let format = AudioFormat::mono(1_000);
    let source = MemorySource::constant(format, 1.0, 10_000).shared();
    let (mut output, clock) = manual_stage(format, source);

    output.stop();
    output.pause();
    assert_eq!(output.state(), PlaybackState::Stopped);

    output.resume().unwrap();
    clock.render_frames(100);
    output.resume().unwrap();
    assert_eq!(output.state(), PlaybackState::Processing);
    assert_close(output.amount_played(), 0.1, 1e-9);

    output.pause();
    output.pause();
    assert_eq!(output.state(), PlaybackState::Paused);
    assert!(clock.is_running());

    output.resume().unwrap();
    output.stop();
    output.stop();
    assert_eq!(output.state(), PlaybackState::Stopped);
    assert_eq!(output.amount_played(), 0.0);
}

#[test]
fn frames_to_seconds_uses_the_current_rate() {
    let format = AudioFormat::stereo(48_000);
    let source = MemorySource::constant(format, 0.0, 10).shared();
    let (output, _) = manual_stage(format, source);

    for frames in [0.0, 1.0, 480.0, 48_000.0, 1_234_567.0] {
        assert_eq!(output.frames_to_seconds(frames), frames / 48_000.0);
    }
}

#[test]
fn volume_is_clamped_and_applied() {
    init_logging();
    let format = AudioFormat::stereo(8_000);
    let source = MemorySource::constant(format, 0.8, 8_000).shared();
    let (mut output, clock) = manual_stage(format, source);

    output.set_volume(-0.5);
    assert_eq!(output.volume(), 0.0);
    output.set_volume(1.7);
    assert_eq!(output.volume(), 1.0);

    output.resume().unwrap();
    output.set_volume(0.5);
    let out = clock.render_frames(64);
    assert_eq!(out.len(), 128);
    assert!(out.iter().all(|s| (*s - 0.4).abs() < 1e-6));
}

#[test]
fn start_failure_is_reported_and_state_stays_stopped() {
    init_logging();
    let format = AudioFormat::mono(44_100);
    let source = MemorySource::constant(format, 1.0, 100).shared();
    let mut output = OutputStage::new(
        OutputStageDesc::default().format(format),
        source,
        Box::new(ManualBackend::failing("no output device")),
    )
    .unwrap();

    let err = output.resume().unwrap_err();
    assert!(matches!(err, OutputError::AudioDevice(_)));
    assert_eq!(output.state(), PlaybackState::Stopped);
    assert!(!output.is_ready_to_play());
}

#[test]
fn underruns_pad_with_silence_and_count_only_real_frames() {
    init_logging();
    let format = AudioFormat::mono(1_000);
    let (source, mut feeder) = ring_source(format, 1_024);
    let (mut output, clock) = manual_stage(format, Arc::new(Mutex::new(source)));

    assert_eq!(feeder.push(&[1.0; 100]), FeedStatus::Written(100));
    output.resume().unwrap();

    let out = clock.render_frames(256);
    assert!(out[..100].iter().all(|s| *s == 1.0));
    assert!(out[100..].iter().all(|s| *s == 0.0));
    assert_eq!(output.underrun_count(), 1);
    assert_eq!(output.underrun_frames(), 156);
    assert_close(output.amount_played(), 0.1, 1e-9);

    // A live stream with nothing buffered can still supply data later
    assert!(output.is_ready_to_play());
}

#[test]
fn end_of_stream_clears_readiness_without_an_underrun() {
    init_logging();
    let format = AudioFormat::mono(1_000);
    let source = MemorySource::constant(format, 1.0, 100).shared();
    let (mut output, clock) = manual_stage(format, source);

    output.resume().unwrap();
    assert!(output.is_ready_to_play());

    clock.render_frames(256);
    assert_eq!(output.underrun_count(), 0);
    assert!(!output.is_ready_to_play());
    assert_close(output.amount_played(), 0.1, 1e-9);

    output.seek(0.05);
    assert!(output.is_ready_to_play());
    let out = clock.render_frames(10);
    assert!(out.iter().all(|s| *s == 1.0));
}

#[test]
fn sample_rate_change_is_applied_between_callbacks() {
    init_logging();
    let format = AudioFormat::mono(1_000);
    let source = MemorySource::constant(format, 1.0, 10_000).shared();
    let (mut output, clock) = manual_stage(format, source);

    output.resume().unwrap();
    clock.render_frames(1_000);
    assert_close(output.amount_played(), 1.0, 1e-9);

    output.set_sample_rate(2_000).unwrap();
    assert!(output.is_processing());
    assert!(clock.is_running());

    // Consumed at the top of the next callback
    clock.render(&mut []);
    assert_eq!(output.format().sample_rate, 2_000);
    assert_close(output.amount_played(), 1.0, 1e-9);

    clock.render_frames(1_000);
    assert_close(output.amount_played(), 1.5, 1e-9);
}

#[test]
fn paused_stage_picks_up_a_rate_change_without_rendering() {
    let format = AudioFormat::mono(1_000);
    let source = MemorySource::constant(format, 1.0, 10_000).shared();
    let (mut output, clock) = manual_stage(format, source);

    output.resume().unwrap();
    output.pause();
    output.set_sample_rate(500).unwrap();
    assert_eq!(output.state(), PlaybackState::Paused);

    let out = clock.render_frames(16);
    assert!(out.iter().all(|s| *s == 0.0));
    assert_eq!(output.format().sample_rate, 500);
}

#[test]
fn refresh_format_adopts_the_source_layout() {
    let format = AudioFormat::mono(1_000);
    let source = MemorySource::constant(format.with_channels(2), 1.0, 100).shared();
    let (mut output, _) = manual_stage(format, source);
    assert_eq!(output.format().channels, 1);

    output.refresh_format().unwrap();
    assert_eq!(output.format().channels, 2);
    assert_eq!(output.format().sample_rate, 1_000);
}

#[test]
fn refresh_format_rejects_an_unusable_source_format() {
    let format = AudioFormat::mono(1_000);
    let broken = AudioFormat::new(0, 1, SampleFormat::F32);
    let source = MemorySource::constant(broken, 1.0, 100).shared();
    let (mut output, _) = manual_stage(format, source);

    let err = output.refresh_format().unwrap_err();
    assert!(matches!(err, OutputError::AudioFormat(_)));
    assert_eq!(output.format(), format);
}

#[test]
fn hooks_see_samples_before_and_after_gain() {
    init_logging();
    let format = AudioFormat::mono(1_000);
    let source = MemorySource::constant(format, 1.0, 1_000).shared();
    let (mut output, clock) = manual_stage(format, source);

    let converted = Arc::new(AtomicU32::new(0));
    let rendered = Arc::new(AtomicU32::new(0));
    let sample_time = Arc::new(AtomicU64::new(u64::MAX));
    let order_ok = Arc::new(AtomicBool::new(false));

    {
        let converted = converted.clone();
        let sample_time = sample_time.clone();
        output.set_did_convert_hook(move |info, samples| {
            converted.store(samples[0].to_bits(), Ordering::Relaxed);
            sample_time.store(info.sample_time, Ordering::Relaxed);
        });
    }
    {
        let rendered = rendered.clone();
        let converted = converted.clone();
        let order_ok = order_ok.clone();
        output.set_did_render_hook(move |info, samples| {
            assert_eq!(info.frames, info.provided_frames);
            rendered.store(samples[0].to_bits(), Ordering::Relaxed);
            order_ok.store(converted.load(Ordering::Relaxed) != 0, Ordering::Relaxed);
        });
    }

    output.resume().unwrap();
    output.set_volume(0.25);
    clock.render_frames(100);
    clock.render_frames(100);

    assert_eq!(f32::from_bits(converted.load(Ordering::Relaxed)), 1.0);
    assert_eq!(f32::from_bits(rendered.load(Ordering::Relaxed)), 0.25);
    assert_eq!(sample_time.load(Ordering::Relaxed), 100);
    assert!(order_ok.load(Ordering::Relaxed));

    output.clear_render_hooks();
    sample_time.store(u64::MAX, Ordering::Relaxed);
    clock.render_frames(100);
    assert_eq!(sample_time.load(Ordering::Relaxed), u64::MAX);
}

#[test]
fn seek_is_atomic_against_concurrent_rendering() {
    init_logging();
    let format = AudioFormat::mono(10_000);
    let source = MemorySource::constant(format, 1.0, 600_000).shared();
    let (mut output, clock) = manual_stage(format, source);
    output.resume().unwrap();

    const BLOCK: usize = 64;
    let running = Arc::new(AtomicBool::new(true));
    let renderer = {
        let running = running.clone();
        let clock = clock.clone();
        std::thread::spawn(move || {
            let mut block = [0.0f32; BLOCK];
            while running.load(Ordering::Relaxed) {
                clock.render(&mut block);
            }
        })
    };

    for step in 0..200 {
        let target = (step % 50) as f64;
        output.seek(target);
        // Callbacks may land between the seek and the query, but never a stale position
        let played = output.amount_played();
        assert!(
            played >= target && played < target + 0.5,
            "seek to {target} reported {played}"
        );
    }

    running.store(false, Ordering::Relaxed);
    renderer.join().unwrap();
    output.stop();
}

#[test]
fn configured_sample_format_survives_source_adoption() {
    let format = AudioFormat::mono(1_000).with_sample_format(SampleFormat::I16);
    let source = MemorySource::constant(AudioFormat::mono(1_000), 0.5, 100).shared();
    let backend = ManualBackend::new();
    let mut output =
        OutputStage::new(OutputStageDesc::default().format(format), source, Box::new(backend))
            .unwrap();
    output.resume().unwrap();
    assert_eq!(output.format().sample_format, SampleFormat::I16);
}

#[test]
fn seek_past_the_end_keeps_the_stage_not_ready() {
    init_logging();
    let format = AudioFormat::mono(1_000);
    let source = MemorySource::constant(format, 1.0, 1_000).shared();
    let (mut output, clock) = manual_stage(format, source);
    let events = Arc::new(EventQueue::new());
    output.set_observer(&events);

    output.resume().unwrap();
    clock.render_frames(1_100);
    assert!(!output.is_ready_to_play());

    output.seek(50.0);
    assert_close(output.amount_played(), 50.0, 1e-9);
    assert!(!output.is_ready_to_play());

    let out = clock.render_frames(64);
    assert!(out.iter().all(|s| *s == 0.0));
    assert!(!output.is_ready_to_play());
    assert_eq!(output.underrun_count(), 0);

    // Only the start and the end of the stream flipped readiness
    let mut received = Vec::new();
    while let Some(event) = events.recv_timeout(Duration::from_millis(200)) {
        received.push(event);
    }
    assert_eq!(
        received,
        vec![
            OutputEvent::ReadyToPlayChanged(true),
            OutputEvent::ReadyToPlayChanged(false)
        ]
    );

    output.seek(0.5);
    assert!(output.is_ready_to_play());
}

#[test]
fn stop_is_safe_while_callbacks_are_running() {
    init_logging();
    let format = AudioFormat::stereo(8_000);
    let source = MemorySource::sine(format, 220.0, 0.5, 60.0).shared();
    let (mut output, clock) = manual_stage(format, source);

    let running = Arc::new(AtomicBool::new(true));
    let renderer = {
        let running = running.clone();
        let clock = clock.clone();
        std::thread::spawn(move || {
            let mut block = [0.0f32; 128];
            let mut callbacks = 0u64;
            while running.load(Ordering::Relaxed) {
                clock.render(&mut block);
                callbacks += 1;
            }
            callbacks
        })
    };

    for _ in 0..300 {
        output.resume().unwrap();
        std::thread::yield_now();
        output.stop();
        assert_eq!(output.state(), PlaybackState::Stopped);
        assert_eq!(output.played_frames(), 0);
        assert!(!clock.is_running());
    }

    running.store(false, Ordering::Relaxed);
    assert!(renderer.join().unwrap() > 0);
    assert!(!output.is_ready_to_play());
}
