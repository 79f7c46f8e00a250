//! State shared between the control thread and the render callback.
//!
//! Everything here is either a plain atomic or built from atomics, so the render thread can
//! read and update it without taking a lock.

use crate::format::{AudioFormat, FormatSlot};
use crate::hooks::RenderHooks;
use crate::source::SourceGuard;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, AtomicUsize, Ordering, fence};

/// Transport state of the output stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// No render unit is held; the initial state
    #[default]
    Stopped,
    /// Pulling from the source and producing real samples
    Processing,
    /// Render unit kept alive but emitting silence; position retained
    Paused,
}

impl PlaybackState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Processing,
            2 => Self::Paused,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Processing => 1,
            Self::Paused => 2,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct AtomicPlaybackState(AtomicU8);

impl AtomicPlaybackState {
    pub(crate) fn load(&self) -> PlaybackState {
        PlaybackState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: PlaybackState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

/// Linear gain stored as `f32` bits.
#[derive(Debug)]
pub(crate) struct AtomicGain(AtomicU32);

impl AtomicGain {
    pub(crate) fn new(gain: f32) -> Self {
        Self(AtomicU32::new(gain.to_bits()))
    }

    pub(crate) fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn store(&self, gain: f32) {
        self.0.store(gain.to_bits(), Ordering::Relaxed);
    }
}

/// Clamps a requested volume into `[0, 1]`; NaN has no meaningful clamp and is rejected.
pub(crate) fn clamp_volume(volume: f32) -> Option<f32> {
    (!volume.is_nan()).then(|| volume.clamp(0.0, 1.0))
}

/// Readiness flag packed with a flip counter: bit 0 is the value, the rest counts flips.
///
/// Flips alternate the value, so anyone who knows the last `(flips, value)` they saw can
/// replay every flip in between from a single later snapshot.
#[derive(Debug, Default)]
pub(crate) struct ReadinessCell(AtomicU64);

impl ReadinessCell {
    pub(crate) fn get(&self) -> bool {
        self.0.load(Ordering::Acquire) & 1 == 1
    }

    /// `(flip count, value)`
    pub(crate) fn snapshot(&self) -> (u64, bool) {
        let bits = self.0.load(Ordering::Acquire);
        (bits >> 1, bits & 1 == 1)
    }

    /// Returns `true` if this call flipped the value.
    pub(crate) fn set(&self, ready: bool) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if (current & 1 == 1) == ready {
                return false;
            }
            let next = (((current >> 1) + 1) << 1) | ready as u64;
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Played-frame counter and current format behind a sequence lock.
///
/// Writers must hold the source lock, which serializes them; the guard parameter on every
/// writer makes that a compile-time requirement. Readers never block writers and always see a
/// matching `(frames, format)` pair.
#[derive(Debug)]
pub(crate) struct TimingCell {
    sequence: AtomicU64,
    played_frames: AtomicU64,
    format: FormatSlot,
}

impl TimingCell {
    pub(crate) fn new(format: AudioFormat) -> Self {
        Self {
            sequence: AtomicU64::new(0),
            played_frames: AtomicU64::new(0),
            format: FormatSlot::new(Some(format)),
        }
    }

    pub(crate) fn snapshot(&self) -> (u64, AudioFormat) {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let frames = self.played_frames.load(Ordering::Relaxed);
            let format = self.format.load(Ordering::Relaxed);
            fence(Ordering::Acquire);
            if self.sequence.load(Ordering::Relaxed) == before {
                if let Some(format) = format {
                    return (frames, format);
                }
            }
        }
    }

    /// Counter value as seen by the current writer.
    pub(crate) fn played_frames(&self, _source: &SourceGuard<'_>) -> u64 {
        self.played_frames.load(Ordering::Relaxed)
    }

    pub(crate) fn advance(&self, _source: &SourceGuard<'_>, frames: u64) {
        if frames == 0 {
            return;
        }
        self.write(|| {
            self.played_frames.fetch_add(frames, Ordering::Relaxed);
        });
    }

    pub(crate) fn set_played_frames(&self, _source: &SourceGuard<'_>, frames: u64) {
        self.write(|| self.played_frames.store(frames, Ordering::Relaxed));
    }

    /// Installs `next` and rescales the counter so the played time stays continuous.
    pub(crate) fn commit_format(&self, _source: &SourceGuard<'_>, next: AudioFormat) {
        let previous = self.format.load(Ordering::Relaxed);
        self.write(|| {
            if let Some(previous) = previous {
                if previous.sample_rate != next.sample_rate {
                    let ratio = next.sample_rate as f64 / previous.sample_rate as f64;
                    let frames = self.played_frames.load(Ordering::Relaxed);
                    self.played_frames
                        .store((frames as f64 * ratio).round() as u64, Ordering::Relaxed);
                }
            }
            self.format.store(next, Ordering::Relaxed);
        });
    }

    fn write(&self, update: impl FnOnce()) {
        let sequence = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(sequence + 1, Ordering::Relaxed);
        fence(Ordering::Release);
        update();
        self.sequence.store(sequence + 2, Ordering::Release);
    }
}

/// Counts render callbacks currently executing, for drain-then-release.
#[derive(Debug, Default)]
pub(crate) struct RenderActivity(AtomicUsize);

impl RenderActivity {
    pub(crate) fn enter(&self) -> ActiveRender<'_> {
        self.0.fetch_add(1, Ordering::AcqRel);
        ActiveRender(&self.0)
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.0.load(Ordering::Acquire) == 0
    }

    /// Spins until no render callback is running.
    pub(crate) fn drain(&self) {
        while !self.is_idle() {
            std::thread::yield_now();
        }
    }
}

pub(crate) struct ActiveRender<'a>(&'a AtomicUsize);

impl Drop for ActiveRender<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Everything the render callback shares with the control side.
pub(crate) struct Shared {
    pub(crate) state: AtomicPlaybackState,
    pub(crate) volume: AtomicGain,
    pub(crate) timing: TimingCell,
    /// Format published by the control thread, consumed at the top of a render callback
    pub(crate) pending_format: FormatSlot,
    pub(crate) end_of_stream: AtomicBool,
    pub(crate) readiness: ReadinessCell,
    pub(crate) underruns: AtomicU64,
    pub(crate) underrun_frames: AtomicU64,
    pub(crate) activity: RenderActivity,
    pub(crate) hooks: RenderHooks,
    /// Wakes the notifier; bounded(1), so a full channel means a wake is already queued
    doorbell: Sender<()>,
}

impl Shared {
    pub(crate) fn new(format: AudioFormat, volume: f32, doorbell: Sender<()>) -> Self {
        Self {
            state: AtomicPlaybackState::default(),
            volume: AtomicGain::new(volume),
            timing: TimingCell::new(format),
            pending_format: FormatSlot::new(None),
            end_of_stream: AtomicBool::new(false),
            readiness: ReadinessCell::default(),
            underruns: AtomicU64::new(0),
            underrun_frames: AtomicU64::new(0),
            activity: RenderActivity::default(),
            hooks: RenderHooks::default(),
            doorbell,
        }
    }

    pub(crate) fn ring_doorbell(&self) {
        let _ = self.doorbell.try_send(());
    }

    /// Applies a pending format, if any. Called with the source locked.
    pub(crate) fn take_pending_format(&self, source: &SourceGuard<'_>) {
        if let Some(format) = self.pending_format.take() {
            self.timing.commit_format(source, format);
        }
    }

    /// Stores the derived readiness and wakes the notifier when it flipped.
    pub(crate) fn publish_readiness(&self, ready: bool) {
        if self.readiness.set(ready) {
            self.ring_doorbell();
        }
    }

    pub(crate) fn record_underrun(&self, missing_frames: usize) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
        self.underrun_frames
            .fetch_add(missing_frames as u64, Ordering::Relaxed);
        self.ring_doorbell();
    }
}
