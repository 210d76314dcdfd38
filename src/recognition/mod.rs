//! Boundary to the out-of-process recognition engine

pub mod client;
pub mod simulated;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use crate::capture::{Frame, TransferEncoding};
use crate::error::BoundaryError;
use crate::status::EngineStatus;

pub use client::{RetryPolicy, Submission, SubmissionClient};
pub use simulated::SimulatedEngine;

/// One frame as sent across the boundary
#[derive(Debug, Clone)]
pub struct FramePayload {
    pub image: Bytes,
    pub timestamp: Instant,
    pub width: u32,
    pub height: u32,
    pub encoding: TransferEncoding,
}

impl From<&Frame> for FramePayload {
    fn from(frame: &Frame) -> Self {
        Self {
            image: frame.data.clone(),
            timestamp: frame.timestamp,
            width: frame.meta.width,
            height: frame.meta.height,
            encoding: frame.meta.encoding,
        }
    }
}

/// Remote recognition engine.
///
/// `submit_frame` answers [`BoundaryError::EngineNotStarted`] while the
/// engine is still initialising; every other error is permanent.
#[async_trait]
pub trait RecognitionBoundary: Send + Sync + 'static {
    async fn submit_frame(&self, payload: FramePayload) -> Result<(), BoundaryError>;

    async fn engine_status(&self) -> Result<EngineStatus, BoundaryError>;
}
