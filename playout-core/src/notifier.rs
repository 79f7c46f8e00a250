//! Notifier thread.
//!
//! Bridges state changes to the host's observer off the real-time thread. The render
//! callback only flips atomics and rings a bounded(1) doorbell with `try_send`; this thread
//! wakes up, replays readiness flips in order and forwards control-side notices.

use crate::events::OutputObserver;
use crate::state::Shared;
use crossbeam_channel::{Receiver, select};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;

/// Weakly held observer slot shared by the stage and the notifier thread.
pub(crate) type ObserverSlot = Arc<Mutex<Option<Weak<dyn OutputObserver>>>>;

/// Messages from the control thread.
#[derive(Debug)]
pub(crate) enum Notice {
    SampleRateChanged(u32),
    Shutdown,
}

pub(crate) fn spawn(
    shared: Arc<Shared>,
    observer: ObserverSlot,
    doorbell: Receiver<()>,
    notices: Receiver<Notice>,
) -> std::io::Result<JoinHandle<()>> {
    // Snapshot readiness now so flips before the thread runs are still delivered.
    let notifier = Notifier::new(shared, observer);
    std::thread::Builder::new()
        .name("playout-notifier".into())
        .spawn(move || notifier.run(doorbell, notices))
}

struct Notifier {
    shared: Arc<Shared>,
    observer: ObserverSlot,
    delivered_flips: u64,
    delivered_ready: bool,
    reported_underruns: u64,
}

impl Notifier {
    fn new(shared: Arc<Shared>, observer: ObserverSlot) -> Self {
        let (delivered_flips, delivered_ready) = shared.readiness.snapshot();
        Self {
            shared,
            observer,
            delivered_flips,
            delivered_ready,
            reported_underruns: 0,
        }
    }

    fn run(mut self, doorbell: Receiver<()>, notices: Receiver<Notice>) {
        log::debug!("Notifier thread started");
        loop {
            select! {
                recv(doorbell) -> _ => {}
                recv(notices) -> notice => match notice {
                    Ok(Notice::SampleRateChanged(rate)) => {
                        self.dispatch(|observer| observer.sample_rate_changed(rate));
                    }
                    Ok(Notice::Shutdown) | Err(_) => {
                        self.deliver_readiness();
                        break;
                    }
                },
            }
            self.deliver_readiness();
            self.report_underruns();
        }
        log::debug!("Notifier thread stopped");
    }

    fn deliver_readiness(&mut self) {
        let (flips, _) = self.shared.readiness.snapshot();
        while self.delivered_flips < flips {
            self.delivered_flips += 1;
            self.delivered_ready = !self.delivered_ready;
            let ready = self.delivered_ready;
            log::debug!("Ready to play: {}", ready);
            self.dispatch(|observer| observer.ready_to_play_changed(ready));
        }
    }

    fn report_underruns(&mut self) {
        let underruns = self.shared.underruns.load(Ordering::Relaxed);
        if underruns > self.reported_underruns {
            log::warn!(
                "{} underrun(s) since last report ({} frames of silence in total)",
                underruns - self.reported_underruns,
                self.shared.underrun_frames.load(Ordering::Relaxed)
            );
            self.reported_underruns = underruns;
        }
    }

    fn dispatch(&self, notify: impl FnOnce(&dyn OutputObserver)) {
        let observer = self
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade);
        if let Some(observer) = observer {
            notify(&*observer);
        }
    }
}
