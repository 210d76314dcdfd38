pub mod capture;
pub mod error;
pub mod pipeline;
pub mod recognition;
pub mod status;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use capture::{Frame, Roi, TransferEncoding};
pub use error::{BoundaryError, CaptureError, PipelineError};
pub use pipeline::{Pipeline, QueueEvent};
pub use recognition::{RecognitionBoundary, SubmissionClient};
pub use status::{EngineStatus, PipelineStats};

/// Environment variables override file values, e.g. `FRAMEFEED__CAPTURE__TARGET_FPS=15`.
pub const ENV_PREFIX: &str = "FRAMEFEED";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
    pub submission: SubmissionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub target_fps: u32,
    pub encoding: TransferEncoding,
    pub jpeg_quality: u8,
    /// Region of interest attached to every captured frame
    pub roi: Option<Roi>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_queue_size: usize,
    /// Cap on concurrently outstanding submissions. `None` leaves them unbounded.
    pub max_in_flight: Option<usize>,
    pub fps_window_ms: u64,
    /// Per-observer event backlog before events are dropped for that observer
    pub subscriber_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_fps: 10,
            encoding: TransferEncoding::Raw,
            jpeg_quality: 85,
            roi: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10,
            max_in_flight: None,
            fps_window_ms: 1_000,
            subscriber_capacity: 64,
        }
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 100,
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `FRAMEFEED__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.capture.target_fps == 0 {
            return Err(PipelineError::InvalidConfig(
                "capture.target_fps must be greater than zero".into(),
            ));
        }
        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err(PipelineError::InvalidConfig(
                "capture.jpeg_quality must be within 1..=100".into(),
            ));
        }
        if self.pipeline.max_queue_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "pipeline.max_queue_size must be greater than zero".into(),
            ));
        }
        if self.pipeline.max_in_flight == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "pipeline.max_in_flight must be greater than zero when set".into(),
            ));
        }
        if self.pipeline.fps_window_ms == 0 {
            return Err(PipelineError::InvalidConfig(
                "pipeline.fps_window_ms must be greater than zero".into(),
            ));
        }
        if self.submission.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "submission.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file() -> NamedTempFile {
        tempfile::Builder::new().suffix(".toml").tempfile().unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.pipeline.max_queue_size, 10);
        assert!(config.pipeline.max_in_flight.is_none());
        assert_eq!(config.submission.max_attempts, 3);
        assert_eq!(config.submission.retry_delay_ms, 100);
        assert_eq!(config.capture.encoding, TransferEncoding::Raw);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.capture.target_fps, 10);
        assert_eq!(config.pipeline.fps_window_ms, 1_000);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = toml_file();
        writeln!(
            file,
            r#"
[capture]
target_fps = 24
encoding = "png"

[capture.roi]
x = 4
y = 8
width = 100
height = 50

[pipeline]
max_queue_size = 4
max_in_flight = 2
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.capture.target_fps, 24);
        assert_eq!(config.capture.encoding, TransferEncoding::Png);
        assert_eq!(
            config.capture.roi,
            Some(Roi {
                x: 4,
                y: 8,
                width: 100,
                height: 50
            })
        );
        assert_eq!(config.pipeline.max_queue_size, 4);
        assert_eq!(config.pipeline.max_in_flight, Some(2));
        // untouched sections keep their defaults
        assert_eq!(config.submission.max_attempts, 3);
    }

    #[test]
    fn test_load_rejects_zero_fps() {
        let mut file = toml_file();
        writeln!(file, "[capture]\ntarget_fps = 0").unwrap();

        let result = Config::load(Some(file.path()));
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Some(Path::new("/nonexistent/framefeed.toml")));
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_queue() {
        let mut config = Config::default();
        config.pipeline.max_queue_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.max_in_flight = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.submission.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
