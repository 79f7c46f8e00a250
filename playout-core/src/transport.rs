use crate::engine::OutputStage;
use crate::error::Result;

/// Transport commands in message form, for hosts that route control through a queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportCommand {
    Pause,
    Resume,
    Stop,
    /// Seconds from the start of the stream
    Seek(f64),
    SetVolume(f32),
    SetSampleRate(u32),
}

impl OutputStage {
    /// Applies one transport command. Only `Resume` and `SetSampleRate` can fail, and only
    /// when a render unit cannot be acquired.
    pub fn execute(&mut self, command: TransportCommand) -> Result<()> {
        log::trace!("Transport command: {:?}", command);
        match command {
            TransportCommand::Pause => self.pause(),
            TransportCommand::Resume => self.resume()?,
            TransportCommand::Stop => self.stop(),
            TransportCommand::Seek(seconds) => self.seek(seconds),
            TransportCommand::SetVolume(volume) => self.set_volume(volume),
            TransportCommand::SetSampleRate(rate) => self.set_sample_rate(rate)?,
        }
        Ok(())
    }
}
