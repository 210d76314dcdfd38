//! Periodic capture loop

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn, Instrument};

use super::worker::IngestionWorker;
use crate::capture::{encode_snapshot, Frame, VisualSource};
use crate::error::{BoundaryError, CaptureError};
use crate::recognition::{Submission, SubmissionClient};
use crate::status::StatusReporter;
use crate::CaptureConfig;

/// Everything a tick and its submission need, shared with spawned tasks.
#[derive(Clone)]
pub(crate) struct CaptureContext {
    pub source: Arc<dyn VisualSource>,
    pub worker: Arc<IngestionWorker>,
    pub reporter: Arc<StatusReporter>,
    pub client: SubmissionClient,
    pub limiter: Option<Arc<Semaphore>>,
    pub capture: CaptureConfig,
}

/// Decrements the in-flight gauge however the submission task ends.
struct InFlight(Arc<StatusReporter>);

impl InFlight {
    fn begin(reporter: &Arc<StatusReporter>) -> Self {
        reporter.submission_started();
        Self(reporter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.submission_finished();
    }
}

pub(crate) fn period_for(target_fps: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(target_fps.max(1)))
}

/// Spawn the tick loop. The caller aborts the handle to stop it.
pub(crate) fn spawn(ctx: CaptureContext, target_fps: u32) -> JoinHandle<()> {
    let period = period_for(target_fps);
    info!(target_fps, period_ms = period.as_millis() as u64, "capture loop starting");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // Slow ticks lower the effective rate instead of bursting to catch up
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if !ctx.reporter.is_running() {
                continue;
            }
            if let Some(frame) = ctx.tick() {
                ctx.spawn_submission(frame);
            }
        }
    })
}

impl CaptureContext {
    /// Synchronous part of a tick: snapshot, encode, enqueue.
    ///
    /// A `stop()` landing mid-capture clears the queue first; the frame then
    /// belongs to a dead session and is dropped instead of queued.
    pub(crate) fn tick(&self) -> Option<Frame> {
        let session = self.worker.session();
        let (width, height) = self.source.dimensions();
        if width == 0 || height == 0 {
            trace!("source not ready, skipping tick");
            return None;
        }

        let started = Instant::now();
        let image = match self
            .source
            .snapshot()
            .and_then(|snapshot| {
                encode_snapshot(snapshot, self.capture.encoding, self.capture.jpeg_quality)
            })
        {
            Ok(image) => image,
            Err(CaptureError::NotReady) => {
                trace!("source went away during snapshot, skipping tick");
                return None;
            }
            Err(err) => {
                warn!(%err, "capture failed");
                self.worker.report_capture_failure(err.to_string());
                return None;
            }
        };

        let roi = self
            .capture
            .roi
            .and_then(|roi| roi.clamp_to(image.width, image.height));
        let frame = self.worker.enqueue_in(session, image, roi, started)?;
        self.reporter.record_capture(session, started);
        metrics::histogram!("capture_time_us").record(started.elapsed().as_micros() as f64);
        Some(frame)
    }

    /// Hand the frame to an independent task; the tick never waits on it.
    pub(crate) fn spawn_submission(&self, frame: Frame) {
        let ctx = self.clone();
        let span = tracing::debug_span!("submission", frame_id = frame.id());
        let in_flight = InFlight::begin(&self.reporter);

        tokio::spawn(
            async move {
                let _in_flight = in_flight;
                let _permit = match &ctx.limiter {
                    Some(limiter) => match limiter.clone().acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return,
                    },
                    None => None,
                };

                // While waiting for a permit the frame may have been evicted
                if ctx.limiter.is_some() && !ctx.worker.contains(&frame) {
                    debug!("frame evicted before submission, dropping");
                    return;
                }

                let result = ctx.client.submit(&frame).await;
                ctx.settle(&frame, &result);
            }
            .instrument(span),
        );
    }

    /// Record a terminal outcome exactly once.
    fn settle(&self, frame: &Frame, result: &Result<Submission, BoundaryError>) {
        if !frame.mark_processed() {
            return;
        }
        self.worker.complete(frame);
        if !self.reporter.record_outcome(frame.session(), result.is_ok()) {
            trace!("outcome belongs to a stopped session, not counted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_from_fps() {
        assert_eq!(period_for(10), Duration::from_millis(100));
        assert_eq!(period_for(20), Duration::from_millis(50));
        assert_eq!(period_for(1), Duration::from_secs(1));
    }
}
