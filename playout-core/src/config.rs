//! Configuration for the output stage

use crate::error::{OutputError, Result};
use crate::format::AudioFormat;

/// Configuration descriptor for an [`OutputStage`](crate::OutputStage)
#[derive(Debug, Clone)]
pub struct OutputStageDesc {
    /// Output format used until the sample source reports its own.
    ///
    /// `sample_format` is the sample type handed to the device and is kept even when the
    /// source's format is adopted on start.
    pub format: AudioFormat,
    /// Largest number of frames rendered in one pass. Hardware buffers larger than this are
    /// rendered in several passes; the scratch buffer is sized from it up front.
    pub max_block_frames: usize,
    /// Gain applied from the first render, clamped to `[0, 1]`
    pub initial_volume: f32,
}

impl Default for OutputStageDesc {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            max_block_frames: 4096,
            initial_volume: 1.0,
        }
    }
}

impl OutputStageDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    pub fn max_block_frames(mut self, frames: usize) -> Self {
        self.max_block_frames = frames;
        self
    }

    pub fn initial_volume(mut self, volume: f32) -> Self {
        self.initial_volume = volume;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.format.is_valid() {
            return Err(OutputError::Configuration(format!(
                "invalid output format: {}",
                self.format
            )));
        }
        if self.max_block_frames == 0 {
            return Err(OutputError::Configuration(
                "max_block_frames must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
