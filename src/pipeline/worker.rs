//! Frame ingestion: id assignment, bounded buffering and queue notifications

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;
use flume::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::queue::FrameQueue;
use crate::capture::{EncodedImage, Frame, Roi};

/// Broadcast to every subscriber, fire-and-forget.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    FrameQueued(Frame),
    QueueSizeChanged(usize),
    FrameEvicted { id: u64 },
    /// Capture-loop failure; the loop keeps running
    CaptureFailed(String),
}

struct WorkerState {
    queue: FrameQueue,
    next_id: u64,
    session: u64,
}

struct Pushed {
    frame: Frame,
    evicted: Option<Frame>,
    size: usize,
    grew: bool,
}

impl WorkerState {
    fn push(&mut self, image: EncodedImage, roi: Option<Roi>, timestamp: Instant) -> Pushed {
        let id = self.next_id;
        self.next_id += 1;

        let frame = Frame::new(id, self.session, image, roi, timestamp);
        let before = self.queue.len();
        let evicted = self.queue.push(frame.clone());
        let size = self.queue.len();
        Pushed {
            frame,
            evicted,
            size,
            grew: size != before,
        }
    }
}

#[derive(Default)]
struct Stats {
    frames_evicted: AtomicU64,
}

/// Owns the frame queue for one pipeline instance.
pub struct IngestionWorker {
    state: Mutex<WorkerState>,
    subscribers: Mutex<Vec<Sender<QueueEvent>>>,
    subscriber_capacity: usize,
    stats: CachePadded<Stats>,
}

impl IngestionWorker {
    pub fn new(max_size: usize, subscriber_capacity: usize) -> Self {
        Self {
            state: Mutex::new(WorkerState {
                queue: FrameQueue::new(max_size),
                next_id: 0,
                session: 0,
            }),
            subscribers: Mutex::new(Vec::new()),
            subscriber_capacity: subscriber_capacity.max(1),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Assign the next id and append the frame, evicting the oldest one when
    /// the queue is over capacity. Never blocks on subscribers.
    pub fn enqueue(&self, image: EncodedImage, roi: Option<Roi>, timestamp: Instant) -> Frame {
        let pushed = {
            let mut state = self.state.lock();
            state.push(image, roi, timestamp)
        };
        self.announce(pushed)
    }

    /// Like [`enqueue`](Self::enqueue), but only while `session` is still the
    /// current one. A capture that started before a `clear()` is dropped.
    pub fn enqueue_in(
        &self,
        session: u64,
        image: EncodedImage,
        roi: Option<Roi>,
        timestamp: Instant,
    ) -> Option<Frame> {
        let pushed = {
            let mut state = self.state.lock();
            if state.session != session {
                trace!(session, current = state.session, "capture from a cleared session dropped");
                return None;
            }
            state.push(image, roi, timestamp)
        };
        Some(self.announce(pushed))
    }

    fn announce(&self, pushed: Pushed) -> Frame {
        let Pushed {
            frame,
            evicted,
            size,
            grew,
        } = pushed;

        metrics::counter!("frames_captured_total").increment(1);
        metrics::gauge!("queue_size").set(size as f64);

        if let Some(old) = evicted {
            self.stats.frames_evicted.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("frames_evicted_total").increment(1);
            debug!(evicted = old.id(), queued = frame.id(), "queue full, dropped oldest frame");
            self.broadcast(QueueEvent::FrameEvicted { id: old.id() });
        }

        trace!(id = frame.id(), size, "frame queued");
        self.broadcast(QueueEvent::FrameQueued(frame.clone()));
        if grew {
            self.broadcast(QueueEvent::QueueSizeChanged(size));
        }
        frame
    }

    /// Drop a frame that reached its terminal outcome. Frames from an older
    /// session or already evicted are ignored.
    pub fn complete(&self, frame: &Frame) -> bool {
        let size = {
            let mut state = self.state.lock();
            if frame.session() != state.session || state.queue.remove(frame.id()).is_none() {
                return false;
            }
            state.queue.len()
        };

        metrics::gauge!("queue_size").set(size as f64);
        self.broadcast(QueueEvent::QueueSizeChanged(size));
        true
    }

    /// Whether the frame is still buffered in the current session.
    pub fn contains(&self, frame: &Frame) -> bool {
        let state = self.state.lock();
        frame.session() == state.session && state.queue.contains(frame.id())
    }

    /// Empty the queue, restart ids from 0 and zero the queue statistics.
    /// Returns the new session.
    pub fn clear(&self) -> u64 {
        let (session, dropped) = {
            let mut state = self.state.lock();
            let dropped = state.queue.clear();
            state.next_id = 0;
            state.session += 1;
            (state.session, dropped)
        };
        self.stats.frames_evicted.store(0, Ordering::Relaxed);

        debug!(session, dropped, "queue cleared");
        metrics::gauge!("queue_size").set(0.0);
        if dropped > 0 {
            self.broadcast(QueueEvent::QueueSizeChanged(0));
        }
        session
    }

    pub fn size(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().queue.capacity()
    }

    pub fn session(&self) -> u64 {
        self.state.lock().session
    }

    /// Ids currently buffered, oldest first.
    pub fn queued_ids(&self) -> Vec<u64> {
        self.state.lock().queue.ids()
    }

    pub fn frames_evicted(&self) -> u64 {
        self.stats.frames_evicted.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> Receiver<QueueEvent> {
        let (tx, rx) = flume::bounded(self.subscriber_capacity);
        self.subscribers.lock().push(tx);
        rx
    }

    pub(crate) fn report_capture_failure(&self, reason: String) {
        self.broadcast(QueueEvent::CaptureFailed(reason));
    }

    fn broadcast(&self, event: QueueEvent) {
        let mut subscribers = self.subscribers.lock();
        // Slow observers lose events, gone observers are pruned
        subscribers.retain(|tx| {
            !matches!(
                tx.try_send(event.clone()),
                Err(TrySendError::Disconnected(_))
            )
        });
    }
}
