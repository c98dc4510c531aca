//! Error types for cuebank.

use thiserror::Error;

/// Result type alias using cuebank's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cuebank.
#[derive(Error, Debug)]
pub enum Error {
    // Caller errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Call ordering violated: {0}")]
    OrderingViolation(String),

    // Content errors
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported RPC parameter: {0}")]
    UnsupportedParameter(String),

    // Output errors
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Audio output error: {0}")]
    AudioOutput(String),

    #[error("Voice {0} does not exist")]
    VoiceNotFound(u64),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if this error should stop the cue that raised it.
    ///
    /// Curve-level failures only skip the offending curve, and a voice that
    /// has already been released is expected while a stream winds down.
    pub const fn is_playback_fatal(&self) -> bool {
        !matches!(
            self,
            Self::UnsupportedParameter(_) | Self::VoiceNotFound(_)
        )
    }
}
