//! Error types for the export pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while preparing or running an export.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("Missing export configuration: {0}")]
    MissingConfig(String),

    #[error("Failed to load source clip: {0}")]
    SourceLoad(String),

    #[error("Transcode failed: {message}")]
    EngineFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Overlay rendering failed: {0}")]
    OverlayRender(String),

    #[error("Invalid staged file name: {0}")]
    InvalidInputName(String),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Failed to decode overlay image: {0}")]
    ImageDecode(String),

    #[error("No usable overlay font; searched {0:?}")]
    FontUnavailable(Vec<PathBuf>),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an engine failure error.
    pub fn engine_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::EngineFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a missing-configuration error.
    pub fn missing_config(what: impl Into<String>) -> Self {
        Self::MissingConfig(what.into())
    }

    /// Create a source load error.
    pub fn source_load(message: impl Into<String>) -> Self {
        Self::SourceLoad(message.into())
    }

    /// Create an overlay render error.
    pub fn overlay_render(message: impl Into<String>) -> Self {
        Self::OverlayRender(message.into())
    }
}
