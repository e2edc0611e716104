/// Result alias that carries the custom [`CantusError`] type.
pub type Result<T> = std::result::Result<T, CantusError>;

/// Common error type for the core crate.
///
/// Most of these never reach callers of [`crate::NotationLayoutEngine::render`]
/// or [`crate::PlaybackScheduler::play`], which log and carry on instead. They
/// exist so the stages underneath can use `?` freely.
#[derive(Debug, thiserror::Error)]
pub enum CantusError {
    /// Free-form message for failures that have no dedicated variant.
    #[error("{0}")]
    Message(String),
    /// A MIDI value outside the notation table.
    #[error("MIDI value {0} is outside the notated range 0..=127")]
    InvalidPitch(i32),
    /// The sound-producing resource could not be created or driven.
    #[error("audio unavailable: {0}")]
    Audio(String),
    /// A drawing surface rejected a draw call.
    #[error("drawing surface error: {0}")]
    Surface(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("WAV export failed: {0}")]
    Wav(#[from] hound::Error),
}

impl CantusError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for CantusError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for CantusError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<std::fmt::Error> for CantusError {
    fn from(_: std::fmt::Error) -> Self {
        Self::Surface("formatting into the output buffer failed".to_string())
    }
}
