//! Streaming sample source backed by a lock-free SPSC ring buffer.
//!
//! [`RingSource`] is the consumer half and is handed to the output stage; [`RingFeeder`] is
//! the producer half and lives on the upstream decoder/converter thread.
//!
//! Repositioning crosses threads, so it runs as a three-step handshake over generation
//! counters:
//!
//! 1. `reposition` (consumer) drops what is buffered and bumps the requested generation.
//! 2. The feeder's next [`push`](RingFeeder::push) returns [`FeedStatus::Reposition`] instead
//!    of writing, acknowledging the request. It must not write until confirmed.
//! 3. The consumer's next `pull` sees the acknowledgement, drops anything pushed before it and
//!    confirms. From then on every buffered sample comes from the new position.

use crate::format::AudioFormat;
use crate::source::{Pull, SampleSource};
use ringbuf::traits::{Consumer as _, Observer as _, Producer as _, Split as _};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Handshake {
    requested: AtomicU64,
    acknowledged: AtomicU64,
    confirmed: AtomicU64,
    target_frame: AtomicU64,
    finished: AtomicBool,
}

impl Handshake {
    fn settled(&self) -> bool {
        self.confirmed.load(Ordering::Acquire) == self.requested.load(Ordering::Acquire)
    }
}

/// What happened to a [`RingFeeder::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// This many samples were written (may be short when the ring is full)
    Written(usize),
    /// The consumer asked for a new position; produce from this frame next
    Reposition(u64),
    /// A reposition is still being confirmed by the consumer; retry later
    Waiting,
}

/// Creates a ring holding `capacity_frames` frames of `format`.
pub fn ring_source(format: AudioFormat, capacity_frames: usize) -> (RingSource, RingFeeder) {
    let channels = format.channels.max(1) as usize;
    let rb = HeapRb::<f32>::new(capacity_frames.max(1) * channels);
    let (producer, consumer) = rb.split();
    let handshake = Arc::new(Handshake::default());

    (
        RingSource {
            consumer,
            format,
            handshake: handshake.clone(),
        },
        RingFeeder {
            producer,
            format,
            handshake,
        },
    )
}

/// Consumer half; implements [`SampleSource`].
pub struct RingSource {
    consumer: HeapCons<f32>,
    format: AudioFormat,
    handshake: Arc<Handshake>,
}

impl RingSource {
    fn channels(&self) -> usize {
        self.format.channels as usize
    }

    fn drop_buffered(&mut self) {
        self.consumer.clear();
    }
}

impl SampleSource for RingSource {
    fn format(&self) -> Option<AudioFormat> {
        Some(self.format)
    }

    fn pull(&mut self, buffer: &mut [f32]) -> Pull {
        let handshake = &self.handshake;
        if !handshake.settled() {
            let requested = handshake.requested.load(Ordering::Acquire);
            if handshake.acknowledged.load(Ordering::Acquire) == requested {
                // Everything pushed before the acknowledgement predates the seek.
                self.drop_buffered();
                self.handshake.confirmed.store(requested, Ordering::Release);
            }
            return Pull::frames(0);
        }

        let channels = self.channels();
        let wanted = (buffer.len() / channels) * channels;
        let whole = (self.consumer.occupied_len() / channels) * channels;
        let popped = self.consumer.pop_slice(&mut buffer[..wanted.min(whole)]);
        let frames = popped / channels;

        let drained = self.consumer.occupied_len() < channels;
        let finished = self.handshake.finished.load(Ordering::Acquire);
        Pull {
            frames,
            end_of_stream: finished && drained,
        }
    }

    fn reposition(&mut self, frame: u64) {
        self.drop_buffered();
        self.handshake.target_frame.store(frame, Ordering::Release);
        self.handshake.finished.store(false, Ordering::Release);
        self.handshake.requested.fetch_add(1, Ordering::AcqRel);
    }

    fn buffered_frames(&self) -> usize {
        if !self.handshake.settled() {
            return 0;
        }
        self.consumer.occupied_len() / self.channels()
    }

    fn is_exhausted(&self) -> bool {
        self.handshake.settled()
            && self.handshake.finished.load(Ordering::Acquire)
            && self.consumer.occupied_len() < self.channels()
    }
}

/// Producer half, owned by the thread that decodes or converts samples.
pub struct RingFeeder {
    producer: HeapProd<f32>,
    format: AudioFormat,
    handshake: Arc<Handshake>,
}

impl RingFeeder {
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Free space in whole frames.
    pub fn vacant_frames(&self) -> usize {
        self.producer.vacant_len() / self.format.channels.max(1) as usize
    }

    /// Writes as many whole frames of `samples` as fit.
    pub fn push(&mut self, samples: &[f32]) -> FeedStatus {
        let requested = self.handshake.requested.load(Ordering::Acquire);
        if self.handshake.confirmed.load(Ordering::Acquire) != requested {
            if self.handshake.acknowledged.load(Ordering::Acquire) != requested {
                let frame = self.handshake.target_frame.load(Ordering::Acquire);
                self.handshake.acknowledged.store(requested, Ordering::Release);
                log::debug!("Feeder acknowledged reposition to frame {}", frame);
                return FeedStatus::Reposition(frame);
            }
            return FeedStatus::Waiting;
        }

        let channels = self.format.channels.max(1) as usize;
        let fit = (self.producer.vacant_len() / channels) * channels;
        let whole = (samples.len() / channels) * channels;
        FeedStatus::Written(self.producer.push_slice(&samples[..whole.min(fit)]))
    }

    /// Marks that no samples follow the ones already pushed. Cleared by a reposition.
    pub fn finish(&self) {
        self.handshake.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.handshake.finished.load(Ordering::Acquire)
    }
}
