//! Sample source interface consumed by the output stage.
//!
//! The source is the upstream converter: it already delivers interleaved `f32` PCM in the
//! output format, so the output stage never decodes or resamples. Everything the render
//! thread calls on a source ([`pull`](SampleSource::pull),
//! [`buffered_frames`](SampleSource::buffered_frames), [`format`](SampleSource::format))
//! must be real-time safe: no allocation, no blocking, bounded time.

use crate::format::AudioFormat;
use std::sync::{Arc, Mutex, MutexGuard};

/// Outcome of one [`SampleSource::pull`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pull {
    /// Frames written to the front of the buffer
    pub frames: usize,
    /// The source has nothing more to give until it is repositioned
    pub end_of_stream: bool,
}

impl Pull {
    pub fn frames(frames: usize) -> Self {
        Self {
            frames,
            end_of_stream: false,
        }
    }

    pub fn end_of_stream(frames: usize) -> Self {
        Self {
            frames,
            end_of_stream: true,
        }
    }
}

/// Pull interface of the upstream converter.
pub trait SampleSource: Send {
    /// Format of the samples `pull` produces, or `None` while it is not known yet.
    fn format(&self) -> Option<AudioFormat>;

    /// Fills up to `buffer.len() / channels` interleaved frames from the front of `buffer`.
    ///
    /// Returning fewer frames than requested without `end_of_stream` is an underrun.
    fn pull(&mut self, buffer: &mut [f32]) -> Pull;

    /// Moves the read position to `frame` (in output-format frames).
    fn reposition(&mut self, frame: u64);

    /// Frames that a `pull` could return right now.
    fn buffered_frames(&self) -> usize;

    /// Whether the source has nothing left to give from its current position, even later.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Source handle shared between its creator and the output stage.
pub type SharedSource = Arc<Mutex<dyn SampleSource>>;

pub(crate) type SourceGuard<'a> = MutexGuard<'a, dyn SampleSource + 'static>;

/// Whether a source can currently feed real samples.
pub(crate) fn source_ready(source: &dyn SampleSource, end_of_stream: bool) -> bool {
    source.format().is_some_and(|format| format.is_valid())
        && (source.buffered_frames() > 0 || !end_of_stream)
}

/// Fully buffered interleaved PCM.
#[derive(Debug, Clone)]
pub struct MemorySource {
    samples: Arc<[f32]>,
    format: AudioFormat,
    total_frames: usize,
    position: usize,
}

impl MemorySource {
    /// `samples` are interleaved in `format`'s channel layout; a trailing partial frame is
    /// ignored.
    pub fn new(format: AudioFormat, samples: impl Into<Arc<[f32]>>) -> Self {
        let samples = samples.into();
        let total_frames = samples.len() / format.channels.max(1) as usize;
        Self {
            samples,
            format,
            total_frames,
            position: 0,
        }
    }

    /// Sine tone of `frequency` Hz at amplitude `amplitude`, identical on every channel.
    pub fn sine(format: AudioFormat, frequency: f32, amplitude: f32, duration_secs: f64) -> Self {
        let frames = format.seconds_to_frames(duration_secs) as usize;
        let channels = format.channels as usize;
        let step = frequency / format.sample_rate.max(1) as f32;
        let mut samples = Vec::with_capacity(frames * channels);
        let mut phase = 0.0f32;
        for _ in 0..frames {
            let sample = (phase * std::f32::consts::TAU).sin() * amplitude;
            samples.extend(std::iter::repeat_n(sample, channels));
            phase = (phase + step).fract();
        }
        Self::new(format, samples)
    }

    /// Constant `value` on every sample, handy for checking gain.
    pub fn constant(format: AudioFormat, value: f32, frames: usize) -> Self {
        Self::new(format, vec![value; frames * format.channels as usize])
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Wraps the source for handing to an output stage.
    pub fn shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }
}

impl SampleSource for MemorySource {
    fn format(&self) -> Option<AudioFormat> {
        Some(self.format)
    }

    fn pull(&mut self, buffer: &mut [f32]) -> Pull {
        let channels = self.format.channels as usize;
        let requested = buffer.len() / channels;
        let frames = requested.min(self.total_frames - self.position);

        let start = self.position * channels;
        let len = frames * channels;
        buffer[..len].copy_from_slice(&self.samples[start..start + len]);
        self.position += frames;

        Pull {
            frames,
            end_of_stream: self.position >= self.total_frames,
        }
    }

    fn reposition(&mut self, frame: u64) {
        self.position = (frame.min(self.total_frames as u64)) as usize;
    }

    fn buffered_frames(&self) -> usize {
        self.total_frames - self.position
    }

    fn is_exhausted(&self) -> bool {
        self.position >= self.total_frames
    }
}
