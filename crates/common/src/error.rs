//! Error types shared across Skewbot crates.

use std::time::Duration;

/// Top-level error type for Skewbot operations.
#[derive(Debug, thiserror::Error)]
pub enum SkewError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Palette generation failed: {message}")]
    PaletteGenerationFailed { message: String },

    #[error("Encoding failed: {message}")]
    EncodingFailed { message: String },

    #[error("Render timed out after {:.2}s", .deadline.as_secs_f64())]
    Timeout { deadline: Duration },

    #[error("Render cancelled")]
    Cancelled,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using SkewError.
pub type SkewResult<T> = Result<T, SkewError>;

/// Coarse failure classification handed to the command layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidInput,
    PaletteGenerationFailed,
    EncodingFailed,
    Timeout,
    Cancelled,
    Internal,
}

impl SkewError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn palette(msg: impl Into<String>) -> Self {
        Self::PaletteGenerationFailed {
            message: msg.into(),
        }
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Classify this error for user-facing handling.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidInput { .. } => FailureKind::InvalidInput,
            Self::PaletteGenerationFailed { .. } => FailureKind::PaletteGenerationFailed,
            Self::EncodingFailed { .. } => FailureKind::EncodingFailed,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Config { .. } | Self::Io(_) | Self::Json(_) | Self::Other(_) => {
                FailureKind::Internal
            }
        }
    }

    /// Whether the caller can reasonably fix the request and try again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), FailureKind::InvalidInput | FailureKind::Timeout)
    }
}
