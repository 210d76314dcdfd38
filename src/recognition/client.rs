use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::{FramePayload, RecognitionBoundary};
use crate::capture::Frame;
use crate::error::BoundaryError;
use crate::SubmissionConfig;

/// Bounded retry for the engine-not-started signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(100),
        }
    }
}

impl From<&SubmissionConfig> for RetryPolicy {
    fn from(config: &SubmissionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// Successful delivery of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub frame_id: u64,
    pub attempts: u32,
}

/// Delivers frames to the recognition boundary.
#[derive(Clone)]
pub struct SubmissionClient {
    boundary: Arc<dyn RecognitionBoundary>,
    policy: RetryPolicy,
}

impl SubmissionClient {
    pub fn new(boundary: Arc<dyn RecognitionBoundary>, policy: RetryPolicy) -> Self {
        Self { boundary, policy }
    }

    pub fn boundary(&self) -> &Arc<dyn RecognitionBoundary> {
        &self.boundary
    }

    /// Submit one frame, retrying only while the engine reports it has not
    /// started. Any other error is returned after the first attempt.
    #[instrument(skip(self, frame), fields(frame_id = frame.id()))]
    pub async fn submit(&self, frame: &Frame) -> Result<Submission, BoundaryError> {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            metrics::counter!("submission_attempts_total").increment(1);

            let result = self.boundary.submit_frame(FramePayload::from(frame)).await;

            match result {
                Ok(()) => {
                    metrics::counter!("submissions_total", "outcome" => "success").increment(1);
                    metrics::histogram!("submission_latency_ms")
                        .record(started.elapsed().as_secs_f64() * 1_000.0);
                    debug!(attempt, "frame submitted");
                    return Ok(Submission {
                        frame_id: frame.id(),
                        attempts: attempt,
                    });
                }
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    debug!(
                        attempt,
                        delay_ms = self.policy.delay.as_millis() as u64,
                        "{err}, retrying"
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(err) => {
                    let outcome = if err.is_retryable() {
                        "exhausted"
                    } else {
                        "rejected"
                    };
                    metrics::counter!("submissions_total", "outcome" => outcome).increment(1);
                    warn!(attempt, %err, "frame submission failed");
                    return Err(err);
                }
            }
        }
    }
}
