use playout_core::{AudioFormat, FeedStatus, RingFeeder};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Stands in for a decoder: feeds a sine tone of fixed length into a ring source.
pub struct ToneFeeder {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ToneFeeder {
    pub fn spawn(mut feeder: RingFeeder, frequency: f32, duration_secs: f64) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = std::thread::Builder::new()
            .name("tone-feeder".into())
            .spawn(move || feed(&mut feeder, &flag, frequency, duration_secs))?;
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }
}

impl Drop for ToneFeeder {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn feed(feeder: &mut RingFeeder, running: &AtomicBool, frequency: f32, duration_secs: f64) {
    let format = feeder.format();
    let channels = format.channels as usize;
    let total_frames = format.seconds_to_frames(duration_secs);
    let mut frame = 0u64;
    let mut chunk = Vec::with_capacity(1024 * channels);

    while running.load(Ordering::Relaxed) {
        if frame >= total_frames {
            if !feeder.is_finished() {
                feeder.finish();
                log::info!("Tone fully buffered");
            }
            // Keep polling so a seek after the end is still honored
            if let FeedStatus::Reposition(target) = feeder.push(&[]) {
                log::debug!("Feeder repositioned to frame {}", target);
                frame = target;
            }
            std::thread::sleep(Duration::from_millis(10));
            continue;
        }

        let frames = feeder
            .vacant_frames()
            .min(1024)
            .min((total_frames - frame) as usize);
        if frames == 0 {
            std::thread::sleep(Duration::from_millis(5));
            continue;
        }

        chunk.clear();
        for offset in 0..frames as u64 {
            let sample = tone_sample(format, frequency, frame + offset);
            chunk.extend(std::iter::repeat_n(sample, channels));
        }

        match feeder.push(&chunk) {
            FeedStatus::Written(samples) => frame += (samples / channels) as u64,
            FeedStatus::Reposition(target) => {
                log::debug!("Feeder repositioned to frame {}", target);
                frame = target;
            }
            FeedStatus::Waiting => std::thread::sleep(Duration::from_millis(1)),
        }
    }
}

fn tone_sample(format: AudioFormat, frequency: f32, frame: u64) -> f32 {
    let t = frame as f64 / format.sample_rate as f64;
    ((t * frequency as f64 * std::f64::consts::TAU).sin() * 0.2) as f32
}
