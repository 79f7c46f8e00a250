use crate::backend::{AudioBackend, RenderUnit};
use crate::config::OutputStageDesc;
use crate::error::{OutputError, Result};
use crate::events::OutputObserver;
use crate::format::AudioFormat;
use crate::hooks::{RenderHook, RenderInfo};
use crate::notifier::{self, Notice, ObserverSlot};
use crate::render::Renderer;
use crate::source::{SampleSource, SharedSource, SourceGuard, source_ready};
use crate::state::{PlaybackState, Shared, clamp_volume};
use crossbeam_channel::{Sender, bounded, unbounded};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;

/// Output stage: owns playback state, volume, timing and the render unit, and mediates
/// between the control thread and the real-time render callback.
///
/// Transport operations take `&mut self`, so concurrent commands from several threads need
/// an external lock; each transition is atomic with respect to the render callback. Use
/// [`monitor`](Self::monitor) to query the stage from other threads.
pub struct OutputStage {
    desc: OutputStageDesc,
    shared: Arc<Shared>,
    source: SharedSource,
    backend: Box<dyn AudioBackend>,
    unit: Option<Box<dyn RenderUnit>>,
    observer: ObserverSlot,
    notices: Sender<Notice>,
    notifier: Option<JoinHandle<()>>,
}

impl OutputStage {
    /// Creates a stopped output stage pulling from `source`.
    ///
    /// The caller keeps ownership of the source; the stage only holds a shared handle.
    pub fn new<S>(
        desc: OutputStageDesc,
        source: Arc<Mutex<S>>,
        backend: Box<dyn AudioBackend>,
    ) -> Result<Self>
    where
        S: SampleSource + 'static,
    {
        desc.validate()?;
        let source: SharedSource = source;
        let volume = clamp_volume(desc.initial_volume).unwrap_or(1.0);

        let (doorbell_tx, doorbell_rx) = bounded(1);
        let (notices, notices_rx) = unbounded();
        let shared = Arc::new(Shared::new(desc.format, volume, doorbell_tx));
        let observer = ObserverSlot::default();
        let notifier = notifier::spawn(shared.clone(), observer.clone(), doorbell_rx, notices_rx)?;

        log::debug!(
            "Output stage created ({}, backend: {})",
            desc.format,
            backend.name()
        );

        Ok(Self {
            desc,
            shared,
            source,
            backend,
            unit: None,
            observer,
            notices,
            notifier: Some(notifier),
        })
    }

    /// Pauses rendering. The render unit keeps running and emits silence; the played-frame
    /// counter is frozen. No-op unless processing.
    pub fn pause(&mut self) {
        if self.state() != PlaybackState::Processing {
            return;
        }
        self.shared.state.store(PlaybackState::Paused);
        log::debug!("Output paused at {:.3}s", self.amount_played());
        self.refresh_readiness();
    }

    /// Starts or resumes rendering. No-op if already processing.
    ///
    /// From `Stopped` this acquires a render unit; if that fails the error is returned and the
    /// stage stays stopped.
    pub fn resume(&mut self) -> Result<()> {
        match self.state() {
            PlaybackState::Processing => return Ok(()),
            PlaybackState::Paused => {
                self.shared.state.store(PlaybackState::Processing);
                log::debug!("Output resumed at {:.3}s", self.amount_played());
            }
            PlaybackState::Stopped => self.start()?,
        }
        self.refresh_readiness();
        Ok(())
    }

    /// Stops rendering and releases the render unit once no callback is using it. Rewinds the
    /// source and resets the played-frame counter. No-op if already stopped.
    pub fn stop(&mut self) {
        if self.state() == PlaybackState::Stopped {
            return;
        }
        self.shared.state.store(PlaybackState::Stopped);
        self.release_unit();

        {
            let mut source = lock_source(&self.source);
            self.shared.take_pending_format(&source);
            source.reposition(0);
            self.shared.timing.set_played_frames(&source, 0);
            self.shared
                .end_of_stream
                .store(source.is_exhausted(), Ordering::Release);
        }
        log::debug!("Output stopped");
        self.refresh_readiness();
    }

    /// Moves playback to `seconds` from the start of the stream.
    ///
    /// Negative or non-finite times seek to 0. The source is repositioned and the played-frame
    /// counter set while the source is locked, so a render callback sees either the old or
    /// the new position, never a mix. Seeking at or past the end of a finished source leaves
    /// the stage not ready.
    pub fn seek(&mut self, seconds: f64) {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        let frame = {
            let mut source = lock_source(&self.source);
            self.shared.take_pending_format(&source);
            let (_, format) = self.shared.timing.snapshot();
            let frame = format.seconds_to_frames(seconds);
            source.reposition(frame);
            self.shared.timing.set_played_frames(&source, frame);
            self.shared
                .end_of_stream
                .store(source.is_exhausted(), Ordering::Release);
            frame
        };
        log::debug!("Seek to {:.3}s (frame {})", seconds, frame);
        self.refresh_readiness();
    }

    /// Sets the linear output gain, clamped to `[0, 1]`. NaN is ignored.
    ///
    /// Visible to the next render callback on a best-effort basis.
    pub fn set_volume(&self, volume: f32) {
        match clamp_volume(volume) {
            Some(gain) => self.shared.volume.store(gain),
            None => log::warn!("Ignoring NaN volume"),
        }
    }

    /// Changes the output sample rate. A rate of 0 is ignored.
    ///
    /// While a render unit is open the new format reaches the render callback through a
    /// handoff slot consumed at the top of the next callback, and the unit is reopened at the
    /// new rate. An error means the new unit could not be acquired; the stage is then stopped
    /// and keeps its previous format.
    ///
    /// While stopped the rate is committed right away, but the next [`resume`](Self::resume)
    /// adopts the source's reported rate again.
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<()> {
        if sample_rate == 0 {
            log::warn!("Ignoring sample rate of 0 Hz");
            return Ok(());
        }
        let next = self.effective_format().with_sample_rate(sample_rate);
        self.reconfigure(next)
    }

    /// Re-reads the source's format after an upstream format change and applies its rate and
    /// channel count. A source without a format yet is left alone; one reporting a zero rate
    /// or channel count is an [`OutputError::AudioFormat`].
    pub fn refresh_format(&mut self) -> Result<()> {
        let reported = lock_source(&self.source).format();
        match reported {
            Some(format) if !format.is_valid() => Err(OutputError::AudioFormat(format!(
                "source reported an unusable format: {}",
                format
            ))),
            Some(format) => {
                let next = format.with_sample_format(self.desc.format.sample_format);
                self.reconfigure(next)
            }
            None => {
                log::debug!("Source reports no format yet");
                self.refresh_readiness();
                Ok(())
            }
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state.load()
    }

    pub fn is_processing(&self) -> bool {
        self.state() == PlaybackState::Processing
    }

    pub fn is_ready_to_play(&self) -> bool {
        self.shared.readiness.get()
    }

    /// Current output format.
    pub fn format(&self) -> AudioFormat {
        self.shared.timing.snapshot().1
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume.load()
    }

    pub fn frames_to_seconds(&self, frames: f64) -> f64 {
        self.format().frames_to_seconds(frames)
    }

    /// Seconds of real (non-padding) audio rendered since the last start, seek or stop.
    pub fn amount_played(&self) -> f64 {
        let (frames, format) = self.shared.timing.snapshot();
        format.frames_to_seconds(frames as f64)
    }

    pub fn played_frames(&self) -> u64 {
        self.shared.timing.snapshot().0
    }

    /// Render passes that came up short while the source was not at end of stream.
    pub fn underrun_count(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }

    /// Silence frames padded in for underruns.
    pub fn underrun_frames(&self) -> u64 {
        self.shared.underrun_frames.load(Ordering::Relaxed)
    }

    /// The source this stage pulls from.
    pub fn source(&self) -> SharedSource {
        self.source.clone()
    }

    /// Cloneable read-only view usable from any thread.
    pub fn monitor(&self) -> OutputMonitor {
        OutputMonitor {
            shared: self.shared.clone(),
        }
    }

    /// Installs the observer. The stage keeps only a weak reference; once the observer is
    /// dropped, notifications are discarded.
    pub fn set_observer<O>(&self, observer: &Arc<O>)
    where
        O: OutputObserver + 'static,
    {
        let observer: Weak<O> = Arc::downgrade(observer);
        let observer: Weak<dyn OutputObserver> = observer;
        *self.observer.lock().unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    pub fn clear_observer(&self) {
        *self.observer.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Hook run on the render thread after samples are pulled, before gain and device write.
    pub fn set_did_convert_hook<F>(&self, hook: F)
    where
        F: Fn(&RenderInfo, &mut [f32]) + Send + Sync + 'static,
    {
        self.shared.hooks.set_did_convert(Some(RenderHook::new(hook)));
    }

    /// Hook run on the render thread after the device buffer was written.
    pub fn set_did_render_hook<F>(&self, hook: F)
    where
        F: Fn(&RenderInfo, &mut [f32]) + Send + Sync + 'static,
    {
        self.shared.hooks.set_did_render(Some(RenderHook::new(hook)));
    }

    pub fn clear_render_hooks(&self) {
        self.shared.hooks.set_did_convert(None);
        self.shared.hooks.set_did_render(None);
    }

    /// Format the render path will use next: a pending update if one is waiting.
    fn effective_format(&self) -> AudioFormat {
        self.shared
            .pending_format
            .load(Ordering::Acquire)
            .unwrap_or_else(|| self.format())
    }

    fn start(&mut self) -> Result<()> {
        let previous_rate = self.effective_format().sample_rate;
        let format = {
            let source = lock_source(&self.source);
            self.shared.take_pending_format(&source);
            let current = self.shared.timing.snapshot().1;
            let adopted = source
                .format()
                .filter(AudioFormat::is_valid)
                .map(|f| f.with_sample_format(self.desc.format.sample_format))
                .unwrap_or(current);
            if adopted != current {
                self.shared.timing.commit_format(&source, adopted);
            }
            self.shared
                .end_of_stream
                .store(source.is_exhausted(), Ordering::Release);
            adopted
        };
        if format.sample_rate != previous_rate {
            log::debug!("Adopted source format {}", format);
            self.notify(Notice::SampleRateChanged(format.sample_rate));
        }

        let unit = self.open_unit(format)?;
        self.unit = Some(unit);
        self.shared.state.store(PlaybackState::Processing);
        log::info!("Output started ({})", format);
        Ok(())
    }

    fn open_unit(&mut self, format: AudioFormat) -> Result<Box<dyn RenderUnit>> {
        let renderer = Renderer::new(
            self.shared.clone(),
            self.source.clone(),
            format.channels,
            self.desc.max_block_frames,
        );
        let mut unit = self.backend.open(&format, renderer).map_err(|e| {
            log::error!("Failed to acquire render unit on {}: {}", self.backend.name(), e);
            e
        })?;
        unit.start().map_err(|e| {
            log::error!("Failed to start render unit on {}: {}", self.backend.name(), e);
            e
        })?;
        Ok(unit)
    }

    /// Drops the render unit, then waits until no callback is still inside the renderer.
    fn release_unit(&mut self) {
        if let Some(unit) = self.unit.take() {
            drop(unit);
            self.shared.activity.drain();
            log::debug!("Render unit released");
        }
    }

    fn reconfigure(&mut self, next: AudioFormat) -> Result<()> {
        let previous = self.effective_format();
        if next == previous {
            return Ok(());
        }

        if self.unit.is_none() {
            let source = lock_source(&self.source);
            self.shared.pending_format.clear();
            self.shared.timing.commit_format(&source, next);
        } else {
            self.release_unit();
            self.shared.pending_format.store(next, Ordering::Release);
            match self.open_unit(next) {
                Ok(unit) => self.unit = Some(unit),
                Err(e) => {
                    self.shared.pending_format.clear();
                    self.stop();
                    return Err(e);
                }
            }
        }

        log::info!("Output format changed: {} -> {}", previous, next);
        if next.sample_rate != previous.sample_rate {
            self.notify(Notice::SampleRateChanged(next.sample_rate));
        }
        self.refresh_readiness();
        Ok(())
    }

    fn refresh_readiness(&self) {
        let ready = self.state() != PlaybackState::Stopped && {
            let source = lock_source(&self.source);
            source_ready(&*source, self.shared.end_of_stream.load(Ordering::Acquire))
        };
        self.shared.publish_readiness(ready);
    }

    fn notify(&self, notice: Notice) {
        if self.notices.send(notice).is_err() {
            log::warn!("Notifier thread is gone; dropping notification");
        }
    }
}

impl Drop for OutputStage {
    fn drop(&mut self) {
        self.stop();
        let _ = self.notices.send(Notice::Shutdown);
        if let Some(notifier) = self.notifier.take() {
            if notifier.join().is_err() {
                log::error!("Notifier thread panicked");
            }
        }
    }
}

/// Read-only, thread-safe view of an [`OutputStage`].
#[derive(Clone)]
pub struct OutputMonitor {
    shared: Arc<Shared>,
}

impl OutputMonitor {
    pub fn state(&self) -> PlaybackState {
        self.shared.state.load()
    }

    pub fn is_processing(&self) -> bool {
        self.state() == PlaybackState::Processing
    }

    pub fn is_ready_to_play(&self) -> bool {
        self.shared.readiness.get()
    }

    pub fn format(&self) -> AudioFormat {
        self.shared.timing.snapshot().1
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume.load()
    }

    pub fn frames_to_seconds(&self, frames: f64) -> f64 {
        self.format().frames_to_seconds(frames)
    }

    pub fn amount_played(&self) -> f64 {
        let (frames, format) = self.shared.timing.snapshot();
        format.frames_to_seconds(frames as f64)
    }

    pub fn underrun_count(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }
}

fn lock_source(source: &SharedSource) -> SourceGuard<'_> {
    source.lock().unwrap_or_else(PoisonError::into_inner)
}
