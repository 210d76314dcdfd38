//! Running state, outcome counters and capture throughput

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Status exposed for external polling, also returned by the remote engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub is_running: bool,
    pub processed_frames: u64,
    pub queue_size: usize,
    pub current_fps: f64,
}

/// Overload diagnostics on top of [`EngineStatus`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub captured_frames: u64,
    pub evicted_frames: u64,
    pub failed_frames: u64,
    pub in_flight: usize,
}

/// Frame rate over a trailing window of capture instants.
#[derive(Debug)]
pub struct FpsMeter {
    window: Duration,
    ticks: VecDeque<Instant>,
}

impl FpsMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            ticks: VecDeque::new(),
        }
    }

    pub fn record(&mut self, at: Instant) {
        self.ticks.push_back(at);
        self.prune(at);
    }

    /// Average rate across the ticks still inside the window at `now`.
    pub fn current(&mut self, now: Instant) -> f64 {
        self.prune(now);
        let (Some(first), Some(last)) = (self.ticks.front(), self.ticks.back()) else {
            return 0.0;
        };
        let span = last.duration_since(*first).as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }
        (self.ticks.len() - 1) as f64 / span
    }

    pub fn reset(&mut self) {
        self.ticks.clear();
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.ticks.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.ticks.pop_front();
            } else {
                break;
            }
        }
    }
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
    captured: AtomicU64,
}

/// Aggregates the state written by the scheduler and the submission tasks.
pub struct StatusReporter {
    running: AtomicBool,
    /// Session whose outcomes are currently counted
    session: AtomicU64,
    counters: CachePadded<Counters>,
    in_flight: AtomicUsize,
    fps: Mutex<FpsMeter>,
}

impl StatusReporter {
    pub fn new(fps_window: Duration) -> Self {
        Self {
            running: AtomicBool::new(false),
            session: AtomicU64::new(0),
            counters: CachePadded::new(Counters::default()),
            in_flight: AtomicUsize::new(0),
            fps: Mutex::new(FpsMeter::new(fps_window)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Zero every counter and start counting outcomes for `session`.
    pub(crate) fn reset(&self, session: u64) {
        self.session.store(session, Ordering::Release);
        self.counters.processed.store(0, Ordering::Relaxed);
        self.counters.failed.store(0, Ordering::Relaxed);
        self.counters.captured.store(0, Ordering::Relaxed);
        self.fps.lock().reset();
    }

    /// Count one capture. Captures from an older session are ignored.
    pub(crate) fn record_capture(&self, session: u64, at: Instant) -> bool {
        if session != self.session.load(Ordering::Acquire) {
            return false;
        }
        self.counters.captured.fetch_add(1, Ordering::Relaxed);
        self.fps.lock().record(at);
        true
    }

    /// Count one terminal outcome. Outcomes from an older session are ignored.
    pub(crate) fn record_outcome(&self, session: u64, success: bool) -> bool {
        if session != self.session.load(Ordering::Acquire) {
            return false;
        }
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    pub(crate) fn submission_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        metrics::gauge!("submissions_in_flight").increment(1.0);
    }

    pub(crate) fn submission_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        metrics::gauge!("submissions_in_flight").decrement(1.0);
    }

    pub fn processed_frames(&self) -> u64 {
        self.counters.processed.load(Ordering::Relaxed)
    }

    pub fn current_fps(&self) -> f64 {
        self.fps.lock().current(Instant::now())
    }

    pub fn status(&self, queue_size: usize) -> EngineStatus {
        EngineStatus {
            is_running: self.is_running(),
            processed_frames: self.processed_frames(),
            queue_size,
            current_fps: self.current_fps(),
        }
    }

    pub fn stats(&self, evicted_frames: u64) -> PipelineStats {
        PipelineStats {
            captured_frames: self.counters.captured.load(Ordering::Relaxed),
            evicted_frames,
            failed_frames: self.counters.failed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}
