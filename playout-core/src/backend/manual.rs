//! Backend whose clock is driven by the caller.
//!
//! Useful for offline rendering and for exercising the output stage deterministically: every
//! [`ManualClock::render`] call is one hardware callback.

use super::{AudioBackend, RenderUnit};
use crate::error::{OutputError, Result};
use crate::format::AudioFormat;
use crate::render::Renderer;
use std::sync::{Arc, Mutex, PoisonError};

type RendererSlot = Arc<Mutex<Option<Renderer>>>;

#[derive(Default)]
pub struct ManualBackend {
    slot: RendererSlot,
    failure: Option<String>,
}

impl ManualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose render unit can never be acquired.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            slot: RendererSlot::default(),
            failure: Some(reason.into()),
        }
    }

    /// Handle for issuing callbacks; stays valid across reopened units.
    pub fn clock(&self) -> ManualClock {
        ManualClock {
            slot: self.slot.clone(),
        }
    }
}

impl AudioBackend for ManualBackend {
    fn name(&self) -> &str {
        "manual"
    }

    fn open(&mut self, format: &AudioFormat, renderer: Renderer) -> Result<Box<dyn RenderUnit>> {
        if let Some(reason) = &self.failure {
            return Err(OutputError::AudioDevice(reason.clone()));
        }
        log::debug!("Manual render unit opened ({})", format);
        Ok(Box::new(ManualUnit {
            slot: self.slot.clone(),
            renderer: Some(renderer),
        }))
    }
}

struct ManualUnit {
    slot: RendererSlot,
    renderer: Option<Renderer>,
}

impl RenderUnit for ManualUnit {
    fn start(&mut self) -> Result<()> {
        if let Some(renderer) = self.renderer.take() {
            *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(renderer);
        }
        Ok(())
    }
}

impl Drop for ManualUnit {
    fn drop(&mut self) {
        // Blocks until an in-flight `ManualClock::render` returns.
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Caller-side hardware clock of a [`ManualBackend`].
#[derive(Clone)]
pub struct ManualClock {
    slot: RendererSlot,
}

impl ManualClock {
    /// Runs one render callback into `out`. Returns `false` (and writes silence) when no
    /// unit is running.
    pub fn render(&self, out: &mut [f32]) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_mut() {
            Some(renderer) => {
                renderer.render(out);
                true
            }
            None => {
                out.fill(0.0);
                false
            }
        }
    }

    /// Renders `frames` frames into a fresh buffer.
    pub fn render_frames(&self, frames: usize) -> Vec<f32> {
        let channels = self.channels().unwrap_or(1) as usize;
        let mut out = vec![0.0; frames * channels];
        self.render(&mut out);
        out
    }

    pub fn is_running(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Channel count of the running unit.
    pub fn channels(&self) -> Option<u16> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Renderer::channels)
    }
}
