//! Audio format descriptor.
//!
//! An [`AudioFormat`] is immutable: a sample-rate or layout change produces a new value that
//! replaces the old one wholesale. To let the render thread read it without locks, a format
//! packs into a single `u64`, which is what [`FormatSlot`] stores.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sample type written to the output device.
///
/// Samples are always processed as `f32` internally and converted to this type at the very
/// end of the render callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// 32-bit float
    #[default]
    F32,
    /// Signed 16-bit integer
    I16,
    /// Unsigned 16-bit integer
    U16,
}

impl SampleFormat {
    fn code(self) -> u64 {
        match self {
            Self::F32 => 0,
            Self::I16 => 1,
            Self::U16 => 2,
        }
    }

    fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::F32),
            1 => Some(Self::I16),
            2 => Some(Self::U16),
            _ => None,
        }
    }
}

/// Interleaved PCM layout of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Frames per second
    pub sample_rate: u32,
    /// Samples per frame
    pub channels: u16,
    /// Sample type handed to the device
    pub sample_format: SampleFormat,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            sample_format: SampleFormat::F32,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {:?}",
            self.sample_rate, self.channels, self.sample_format
        )
    }
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    /// Mono `f32` at the given rate.
    pub fn mono(sample_rate: u32) -> Self {
        Self::new(sample_rate, 1, SampleFormat::F32)
    }

    /// Stereo `f32` at the given rate.
    pub fn stereo(sample_rate: u32) -> Self {
        Self::new(sample_rate, 2, SampleFormat::F32)
    }

    /// A format can drive rendering only with a non-zero rate and at least one channel.
    pub fn is_valid(&self) -> bool {
        self.sample_rate > 0 && self.channels > 0
    }

    pub fn with_sample_rate(self, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..self
        }
    }

    pub fn with_channels(self, channels: u16) -> Self {
        Self { channels, ..self }
    }

    pub fn with_sample_format(self, sample_format: SampleFormat) -> Self {
        Self {
            sample_format,
            ..self
        }
    }

    /// `frames / sample_rate`. An invalid (zero-rate) format yields 0.
    pub fn frames_to_seconds(&self, frames: f64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames / self.sample_rate as f64
    }

    /// Nearest frame for a time offset. Negative and non-finite times map to frame 0.
    pub fn seconds_to_frames(&self, seconds: f64) -> u64 {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        (seconds * self.sample_rate as f64).round() as u64
    }

    pub(crate) fn pack(self) -> u64 {
        self.sample_rate as u64
            | (self.channels as u64) << 32
            | self.sample_format.code() << 48
    }

    pub(crate) fn unpack(bits: u64) -> Option<Self> {
        let format = Self {
            sample_rate: bits as u32,
            channels: (bits >> 32) as u16,
            sample_format: SampleFormat::from_code((bits >> 48) & 0xff)?,
        };
        format.is_valid().then_some(format)
    }
}

/// Lock-free single-value slot holding a packed [`AudioFormat`].
///
/// Used two ways: as the holder of the current format, and as a one-shot handoff where the
/// control thread publishes a format and the render thread takes it at the top of a callback.
/// `0` never packs a valid format, so it doubles as the "empty" marker.
#[derive(Debug, Default)]
pub(crate) struct FormatSlot(AtomicU64);

impl FormatSlot {
    pub(crate) fn new(format: Option<AudioFormat>) -> Self {
        Self(AtomicU64::new(format.map_or(0, AudioFormat::pack)))
    }

    pub(crate) fn load(&self, order: Ordering) -> Option<AudioFormat> {
        AudioFormat::unpack(self.0.load(order))
    }

    pub(crate) fn store(&self, format: AudioFormat, order: Ordering) {
        self.0.store(format.pack(), order);
    }

    pub(crate) fn is_occupied(&self) -> bool {
        self.0.load(Ordering::Acquire) != 0
    }

    pub(crate) fn take(&self) -> Option<AudioFormat> {
        AudioFormat::unpack(self.0.swap(0, Ordering::AcqRel))
    }

    pub(crate) fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_to_seconds_divides_by_rate() {
        let format = AudioFormat::mono(44100);
        assert_eq!(format.frames_to_seconds(0.0), 0.0);
        assert_eq!(format.frames_to_seconds(44100.0), 1.0);
        assert_eq!(format.frames_to_seconds(22050.0), 0.5);

        let format = AudioFormat::stereo(48000);
        assert_eq!(format.frames_to_seconds(12000.0), 0.25);
    }

    #[test]
    fn seconds_to_frames_clamps_invalid_times() {
        let format = AudioFormat::mono(44100);
        assert_eq!(format.seconds_to_frames(0.5), 22050);
        assert_eq!(format.seconds_to_frames(-2.0), 0);
        assert_eq!(format.seconds_to_frames(f64::NAN), 0);
        assert_eq!(format.seconds_to_frames(f64::NEG_INFINITY), 0);
    }

    #[test]
    fn packing_preserves_every_field() {
        let format = AudioFormat::new(96000, 6, SampleFormat::I16);
        assert_eq!(AudioFormat::unpack(format.pack()), Some(format));
        assert_eq!(AudioFormat::unpack(0), None);
    }

    #[test]
    fn slot_take_empties_it() {
        let slot = FormatSlot::new(None);
        assert!(!slot.is_occupied());
        assert_eq!(slot.take(), None);

        slot.store(AudioFormat::stereo(48000), Ordering::Release);
        assert!(slot.is_occupied());
        assert_eq!(slot.take(), Some(AudioFormat::stereo(48000)));
        assert!(!slot.is_occupied());
    }
}
