//! Notifications delivered to the host.
//!
//! The output stage holds its observer weakly and calls it only from the notifier thread,
//! never from the render callback. Hosts that prefer polling can install an [`EventQueue`].

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::time::Duration;

/// Receives derived-state changes from an [`OutputStage`](crate::OutputStage).
///
/// Both methods default to doing nothing, so implementors override only what they need.
pub trait OutputObserver: Send + Sync {
    /// Called once per flip of [`is_ready_to_play`](crate::OutputStage::is_ready_to_play).
    fn ready_to_play_changed(&self, ready: bool) {
        let _ = ready;
    }

    /// Called after the output sample rate was changed.
    fn sample_rate_changed(&self, sample_rate: u32) {
        let _ = sample_rate;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    ReadyToPlayChanged(bool),
    SampleRateChanged(u32),
}

impl OutputEvent {
    pub fn is_readiness(&self) -> bool {
        matches!(self, Self::ReadyToPlayChanged(_))
    }
}

/// Observer that queues every notification for the host to poll.
#[derive(Debug)]
pub struct EventQueue {
    sender: Sender<OutputEvent>,
    receiver: Receiver<OutputEvent>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Drains everything queued so far.
    pub fn poll_events(&self) -> Vec<OutputEvent> {
        self.receiver.try_iter().collect()
    }

    /// Waits up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<OutputEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    fn push(&self, event: OutputEvent) {
        // The queue owns its receiver, so the send cannot fail.
        let _ = self.sender.send(event);
    }
}

impl OutputObserver for EventQueue {
    fn ready_to_play_changed(&self, ready: bool) {
        self.push(OutputEvent::ReadyToPlayChanged(ready));
    }

    fn sample_rate_changed(&self, sample_rate: u32) {
        self.push(OutputEvent::SampleRateChanged(sample_rate));
    }
}
