//! Platform audio abstraction.
//!
//! A backend owns the hardware clock: given a [`Renderer`] it opens a render unit whose
//! callback invokes [`Renderer::render`] once per device buffer. Dropping the unit releases
//! the hardware; it must not return while a callback is still executing on a renderer it
//! owns, or the output stage's drain step waits for it instead.

mod cpal_backend;
mod manual;

pub use cpal_backend::CpalBackend;
pub use manual::{ManualBackend, ManualClock};

use crate::error::Result;
use crate::format::AudioFormat;
use crate::render::Renderer;

pub trait AudioBackend {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Acquires a render unit for `format` that will drive `renderer`.
    fn open(&mut self, format: &AudioFormat, renderer: Renderer) -> Result<Box<dyn RenderUnit>>;
}

/// An acquired hardware render unit.
pub trait RenderUnit {
    /// Starts the hardware clock.
    fn start(&mut self) -> Result<()>;
}
