//! Render callback.
//!
//! A [`Renderer`] is what a backend's hardware callback invokes once per device buffer. It
//! runs on the real-time thread, so the whole path is allocation free and lock free apart
//! from a `try_lock` on the source; when that lock is contended the pass renders silence.

use crate::hooks::RenderInfo;
use crate::source::{SharedSource, source_ready};
use crate::state::{PlaybackState, Shared};
use cpal::{FromSample, Sample, SizedSample};
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Real-time entry point handed to an [`AudioBackend`](crate::AudioBackend).
pub struct Renderer {
    shared: Arc<Shared>,
    source: SharedSource,
    channels: u16,
    scratch: Vec<f32>,
}

impl Renderer {
    pub(crate) fn new(
        shared: Arc<Shared>,
        source: SharedSource,
        channels: u16,
        max_block_frames: usize,
    ) -> Self {
        Self {
            shared,
            source,
            channels,
            scratch: vec![0.0; max_block_frames * channels as usize],
        }
    }

    /// Samples per frame this renderer writes.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Fills `out` (interleaved, `channels()` samples per frame) with the next block.
    pub fn render<T>(&mut self, out: &mut [T])
    where
        T: SizedSample + FromSample<f32>,
    {
        let shared = &*self.shared;
        let _active = shared.activity.enter();

        if shared.state.load() != PlaybackState::Processing {
            if shared.pending_format.is_occupied() {
                if let Ok(source) = self.source.try_lock() {
                    shared.take_pending_format(&source);
                }
            }
            fill_silence(out);
            return;
        }

        // Contended by a seek or a stop in progress.
        let Ok(mut source) = self.source.try_lock() else {
            fill_silence(out);
            return;
        };
        shared.take_pending_format(&source);

        let channels = self.channels as usize;
        let mut end_of_stream = shared.end_of_stream.load(Ordering::Acquire);

        for chunk in out.chunks_mut(self.scratch.len()) {
            let frames = chunk.len() / channels;
            let scratch = &mut self.scratch[..chunk.len()];

            let provided = if end_of_stream {
                0
            } else {
                let pull = source.pull(&mut scratch[..frames * channels]);
                end_of_stream = pull.end_of_stream;
                pull.frames.min(frames)
            };
            scratch[provided * channels..].fill(0.0);

            if provided < frames && !end_of_stream {
                shared.record_underrun(frames - provided);
            }

            let info = RenderInfo {
                frames,
                provided_frames: provided,
                channels: self.channels,
                sample_time: shared.timing.played_frames(&source),
            };
            shared.hooks.did_convert(&info, scratch);

            let gain = shared.volume.load();
            if gain != 1.0 {
                scratch.iter_mut().for_each(|sample| *sample *= gain);
            }
            for (dst, &src) in chunk.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src);
            }

            shared.hooks.did_render(&info, scratch);
            shared.timing.advance(&source, provided as u64);
        }

        if end_of_stream {
            shared.end_of_stream.store(true, Ordering::Release);
        }
        shared.publish_readiness(source_ready(&*source, end_of_stream));
    }
}

fn fill_silence<T: Sample>(out: &mut [T]) {
    out.fill(T::EQUILIBRIUM);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::AudioFormat;
    use crate::source::MemorySource;
    use crossbeam_channel::bounded;
    use std::sync::Mutex;

    fn renderer(source: MemorySource, max_block_frames: usize) -> (Renderer, Arc<Shared>) {
        let format = AudioFormat::mono(1_000);
        let (doorbell, _) = bounded(1);
        let shared = Arc::new(Shared::new(format, 1.0, doorbell));
        let source: SharedSource = Arc::new(Mutex::new(source));
        let renderer = Renderer::new(shared.clone(), source, 1, max_block_frames);
        (renderer, shared)
    }

    #[test]
    fn stopped_renderer_writes_equilibrium() {
        let (mut renderer, shared) = renderer(MemorySource::constant(AudioFormat::mono(1_000), 1.0, 10), 8);
        let mut out = [7u16; 4];
        renderer.render(&mut out);
        assert_eq!(out, [u16::EQUILIBRIUM; 4]);

        let (frames, _) = shared.timing.snapshot();
        assert_eq!(frames, 0);
    }

    #[test]
    fn converts_to_the_device_sample_type() {
        let (mut renderer, shared) = renderer(MemorySource::constant(AudioFormat::mono(1_000), 0.5, 10), 8);
        shared.state.store(PlaybackState::Processing);

        let mut out = [0i16; 4];
        renderer.render(&mut out);
        assert!(out.iter().all(|s| *s == i16::from_sample(0.5f32)));
    }

    #[test]
    fn large_buffers_render_in_chunks() {
        let (mut renderer, shared) = renderer(MemorySource::constant(AudioFormat::mono(1_000), 1.0, 100), 16);
        shared.state.store(PlaybackState::Processing);

        let mut out = [0.0f32; 50];
        renderer.render(&mut out);
        assert!(out.iter().all(|s| *s == 1.0));
        assert_eq!(shared.timing.snapshot().0, 50);
    }

    #[test]
    fn contended_source_renders_silence() {
        let source = MemorySource::constant(AudioFormat::mono(1_000), 1.0, 100);
        let (mut renderer, shared) = renderer(source, 16);
        shared.state.store(PlaybackState::Processing);

        let held = renderer.source.clone();
        let _guard = held.lock().unwrap();
        let mut out = [1.0f32; 8];
        renderer.render(&mut out);
        assert_eq!(out, [0.0; 8]);
    }
}
