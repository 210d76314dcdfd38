//! In-process stand-in for the recognition engine

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use super::{FramePayload, RecognitionBoundary};
use crate::error::BoundaryError;
use crate::status::{EngineStatus, FpsMeter};

/// Engine that needs `warmup` before accepting frames and then spends
/// `latency` on each one. Every `reject_every`-th accepted frame is rejected.
pub struct SimulatedEngine {
    started_at: Instant,
    warmup: Duration,
    latency: Duration,
    reject_every: Option<u64>,
    received: AtomicU64,
    processed: AtomicU64,
    in_progress: AtomicUsize,
    fps: Mutex<FpsMeter>,
}

impl SimulatedEngine {
    pub fn new(warmup: Duration, latency: Duration) -> Self {
        Self {
            started_at: Instant::now(),
            warmup,
            latency,
            reject_every: None,
            received: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            in_progress: AtomicUsize::new(0),
            fps: Mutex::new(FpsMeter::new(Duration::from_secs(1))),
        }
    }

    pub fn with_reject_every(mut self, n: u64) -> Self {
        self.reject_every = (n > 0).then_some(n);
        self
    }

    pub fn is_started(&self) -> bool {
        self.started_at.elapsed() >= self.warmup
    }

    pub fn processed_frames(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

/// Counts a frame as in progress until dropped, even if the call is cancelled.
struct Busy<'a>(&'a AtomicUsize);

impl<'a> Busy<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl RecognitionBoundary for SimulatedEngine {
    async fn submit_frame(&self, payload: FramePayload) -> Result<(), BoundaryError> {
        if !self.is_started() {
            return Err(BoundaryError::EngineNotStarted);
        }
        if payload.image.is_empty() || payload.width == 0 || payload.height == 0 {
            return Err(BoundaryError::Rejected("empty frame".into()));
        }

        let n = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let _busy = Busy::enter(&self.in_progress);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
        }
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.fps.lock().record(Instant::now());

        trace!(n, bytes = payload.image.len(), "simulated recognition done");
        match self.reject_every {
            Some(every) if n % every == 0 => Err(BoundaryError::Rejected(format!(
                "simulated rejection of frame #{n}"
            ))),
            _ => Ok(()),
        }
    }

    async fn engine_status(&self) -> Result<EngineStatus, BoundaryError> {
        Ok(EngineStatus {
            is_running: self.is_started(),
            processed_frames: self.processed.load(Ordering::Relaxed),
            queue_size: self.in_progress.load(Ordering::Relaxed),
            current_fps: self.fps.lock().current(Instant::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TransferEncoding;
    use bytes::Bytes;

    fn payload() -> FramePayload {
        FramePayload {
            image: Bytes::from_static(&[0, 0, 0, 255]),
            timestamp: Instant::now(),
            width: 1,
            height: 1,
            encoding: TransferEncoding::Raw,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_started_during_warmup() {
        let engine = SimulatedEngine::new(Duration::from_millis(150), Duration::ZERO);

        assert_eq!(
            engine.submit_frame(payload()).await,
            Err(BoundaryError::EngineNotStarted)
        );
        assert!(!engine.engine_status().await.unwrap().is_running);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(engine.submit_frame(payload()).await, Ok(()));

        let status = engine.engine_status().await.unwrap();
        assert!(status.is_running);
        assert_eq!(status.processed_frames, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_every_nth_frame() {
        let engine = SimulatedEngine::new(Duration::ZERO, Duration::ZERO).with_reject_every(2);

        assert!(engine.submit_frame(payload()).await.is_ok());
        assert!(matches!(
            engine.submit_frame(payload()).await,
            Err(BoundaryError::Rejected(_))
        ));
        assert!(engine.submit_frame(payload()).await.is_ok());
        assert_eq!(engine.processed_frames(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_submission_leaves_no_work_in_progress() {
        let engine = SimulatedEngine::new(Duration::ZERO, Duration::from_millis(500));

        let cancelled =
            tokio::time::timeout(Duration::from_millis(100), engine.submit_frame(payload())).await;
        assert!(cancelled.is_err());

        let status = engine.engine_status().await.unwrap();
        assert_eq!(status.queue_size, 0);
        assert_eq!(status.processed_frames, 0);
    }

    #[tokio::test]
    async fn test_empty_frame_rejected() {
        let engine = SimulatedEngine::new(Duration::ZERO, Duration::ZERO);
        let mut empty = payload();
        empty.image = Bytes::new();

        assert!(matches!(
            engine.submit_frame(empty).await,
            Err(BoundaryError::Rejected(_))
        ));
    }
}
