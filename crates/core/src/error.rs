use std::path::PathBuf;

/// Result alias that carries the custom [`StageError`] type.
pub type Result<T> = std::result::Result<T, StageError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Free-form failure surfaced to the user as-is.
    #[error("{0}")]
    Message(String),
    /// The requested audio file does not exist.
    #[error("audio file not found: {}", .0.display())]
    InputNotFound(PathBuf),
    /// Arguments or data that cannot be processed by the pipeline.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// The decoder could not turn the file into a waveform.
    #[error("failed to decode audio: {0}")]
    Decode(#[from] symphonia::core::errors::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialisation errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Failure while rendering a text document.
    #[error("{0}")]
    Fmt(#[from] std::fmt::Error),
}

impl StageError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<realfft::FftError> for StageError {
    fn from(value: realfft::FftError) -> Self {
        Self::msg(format!("fft failed: {value}"))
    }
}
