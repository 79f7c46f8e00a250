//! # Playout Core
//!
//! A real-time safe PCM output stage: it pulls converted samples from an upstream source,
//! feeds them to the audio hardware's render callback and exposes transport controls
//! (pause, resume, stop, seek, volume, sample rate) plus readiness notifications.
//!
//! The control thread owns an [`OutputStage`]; the hardware clock drives a [`Renderer`] on a
//! real-time thread. The render path never allocates and never blocks: shared state lives in
//! atomics, and the source is only ever `try_lock`ed there, with silence as the fallback.
//!
//! ## Quick Start
//!
//! ```no_run
//! use playout_core::*;
//! use std::time::Duration;
//!
//! let format = AudioFormat::stereo(48_000);
//! let source = MemorySource::sine(format, 440.0, 0.2, 5.0).shared();
//!
//! let desc = OutputStageDesc::default().format(format);
//! let mut output = OutputStage::new(desc, source, Box::new(CpalBackend::new()))?;
//!
//! // Notifications arrive on a background thread, never on the audio thread
//! let events = std::sync::Arc::new(EventQueue::new());
//! output.set_observer(&events);
//!
//! output.resume()?;
//! output.set_volume(0.8);
//! std::thread::sleep(Duration::from_secs(1));
//!
//! output.seek(3.0);
//! println!("played {:.2}s", output.amount_played());
//!
//! for event in events.poll_events() {
//!     if let OutputEvent::ReadyToPlayChanged(ready) = event {
//!         println!("ready to play: {}", ready);
//!     }
//! }
//!
//! output.stop();
//! # Ok::<(), OutputError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`OutputStage`]**: state machine, transport API and timing queries
//! - **[`SampleSource`]**: pull interface of the upstream converter ([`MemorySource`],
//!   [`RingSource`](ring_source::RingSource))
//! - **[`AudioBackend`]**: acquires render units ([`CpalBackend`], [`ManualBackend`])
//! - **[`OutputObserver`]**: readiness and sample-rate notifications ([`EventQueue`])
//! - **[`RenderHook`]**: real-time callouts around the device write

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod format;
pub mod hooks;
mod notifier;
pub mod render;
pub mod ring_source;
pub mod source;
pub mod state;
pub mod transport;

pub use backend::{AudioBackend, CpalBackend, ManualBackend, ManualClock, RenderUnit};
pub use config::OutputStageDesc;
pub use engine::{OutputMonitor, OutputStage};
pub use error::{OutputError, Result};
pub use events::{EventQueue, OutputEvent, OutputObserver};
pub use format::{AudioFormat, SampleFormat};
pub use hooks::{RenderHook, RenderInfo};
pub use render::Renderer;
pub use ring_source::{FeedStatus, RingFeeder, RingSource, ring_source};
pub use source::{MemorySource, Pull, SampleSource, SharedSource};
pub use state::PlaybackState;
pub use transport::TransportCommand;
