use thiserror::Error;

/// Failures reported by the recognition boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundaryError {
    /// The engine is still initialising. The only retryable cause.
    #[error("recognition task not started yet")]
    EngineNotStarted,

    #[error("recognition engine rejected the frame: {0}")]
    Rejected(String),

    #[error("recognition engine unavailable: {0}")]
    Unavailable(String),
}

impl BoundaryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BoundaryError::EngineNotStarted)
    }
}

/// Failures while turning the live source into a transfer buffer
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("visual source has no frame yet")]
    NotReady,

    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("snapshot failed: {0}")]
    Snapshot(String),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("pipeline is already running")]
    AlreadyRunning,

    #[error("pipeline must be started from within a tokio runtime")]
    NoRuntime,
}
