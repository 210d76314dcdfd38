//! Frame pipeline: one explicit instance per capture session owner

pub mod queue;
mod scheduler;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use flume::Receiver;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::capture::VisualSource;
use crate::error::{BoundaryError, PipelineError};
use crate::recognition::{RecognitionBoundary, RetryPolicy, SubmissionClient};
use crate::status::{EngineStatus, PipelineStats, StatusReporter};
use crate::Config;

pub use queue::FrameQueue;
pub use worker::{IngestionWorker, QueueEvent};

use scheduler::CaptureContext;

/// Capture → queue → submit pipeline.
///
/// Owns its queue, counters and scheduler handle. Dropping the pipeline
/// stops the capture loop; submissions already spawned run to completion.
pub struct Pipeline {
    config: Config,
    ctx: CaptureContext,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        source: Arc<dyn VisualSource>,
        boundary: Arc<dyn RecognitionBoundary>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let worker = Arc::new(IngestionWorker::new(
            config.pipeline.max_queue_size,
            config.pipeline.subscriber_capacity,
        ));
        let reporter = Arc::new(StatusReporter::new(Duration::from_millis(
            config.pipeline.fps_window_ms,
        )));
        reporter.reset(worker.session());

        let ctx = CaptureContext {
            source,
            worker,
            reporter,
            client: SubmissionClient::new(boundary, RetryPolicy::from(&config.submission)),
            limiter: config
                .pipeline
                .max_in_flight
                .map(|limit| Arc::new(Semaphore::new(limit))),
            capture: config.capture.clone(),
        };

        Ok(Self {
            config,
            ctx,
            task: Mutex::new(None),
        })
    }

    /// Start capturing at the configured rate.
    pub fn start(&self) -> Result<(), PipelineError> {
        self.start_with_fps(self.config.capture.target_fps)
    }

    /// Start capturing at `target_fps`. Must be called inside a tokio runtime.
    #[instrument(skip(self))]
    pub fn start_with_fps(&self, target_fps: u32) -> Result<(), PipelineError> {
        if target_fps == 0 {
            return Err(PipelineError::InvalidConfig(
                "target_fps must be greater than zero".into(),
            ));
        }
        tokio::runtime::Handle::try_current().map_err(|_| PipelineError::NoRuntime)?;

        let mut task = self.task.lock();
        if task.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }

        self.ctx.reporter.set_running(true);
        *task = Some(scheduler::spawn(self.ctx.clone(), target_fps));
        Ok(())
    }

    /// Cancel the capture loop and reset queue and counters. Idempotent.
    ///
    /// In-flight submissions are not aborted; their outcomes are no longer
    /// counted once the session has been reset.
    #[instrument(skip(self))]
    pub fn stop(&self) {
        let Some(task) = self.task.lock().take() else {
            return;
        };
        task.abort();
        self.ctx.reporter.set_running(false);

        let session = self.ctx.worker.clear();
        self.ctx.reporter.reset(session);
        info!(session, "capture loop stopped");
    }

    pub fn is_running(&self) -> bool {
        self.ctx.reporter.is_running()
    }

    /// Local view: running flag, processed count, queue depth and capture rate.
    pub fn status(&self) -> EngineStatus {
        self.ctx.reporter.status(self.ctx.worker.size())
    }

    pub fn stats(&self) -> PipelineStats {
        self.ctx.reporter.stats(self.ctx.worker.frames_evicted())
    }

    /// Ask the recognition engine for its own status.
    pub async fn engine_status(&self) -> Result<EngineStatus, BoundaryError> {
        self.ctx.client.boundary().engine_status().await
    }

    pub fn subscribe(&self) -> Receiver<QueueEvent> {
        self.ctx.worker.subscribe()
    }

    pub fn worker(&self) -> &IngestionWorker {
        &self.ctx.worker
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}
