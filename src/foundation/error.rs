/// Convenience result type used across Stagecast.
pub type StagecastResult<T> = Result<T, StagecastError>;

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum StagecastError {
    /// Canvas or encoder reset failed. Fatal during bring-up.
    #[error("video init error: {0}")]
    VideoInit(String),

    /// Unknown source type tag or rejected source settings.
    #[error("source creation error: {0}")]
    SourceCreation(String),

    /// Service or encoder configuration is incompatible with the output.
    #[error("setup error: {0}")]
    Setup(String),

    /// The underlying connection could not be started.
    #[error("stream start error ({code}): {message}")]
    StreamStart {
        /// Output stop code (see [`crate::StopCode`]).
        code: i32,
        /// Human readable description from the backend.
        message: String,
    },

    /// A lifecycle action was requested from a state that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Invalid user-provided data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Errors when serializing or deserializing configuration documents.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StagecastError {
    /// Build a [`StagecastError::VideoInit`] value.
    pub fn video_init(msg: impl Into<String>) -> Self {
        Self::VideoInit(msg.into())
    }

    /// Build a [`StagecastError::SourceCreation`] value.
    pub fn source_creation(msg: impl Into<String>) -> Self {
        Self::SourceCreation(msg.into())
    }

    /// Build a [`StagecastError::Setup`] value.
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    /// Build a [`StagecastError::StreamStart`] value.
    pub fn stream_start(code: i32, msg: impl Into<String>) -> Self {
        Self::StreamStart {
            code,
            message: msg.into(),
        }
    }

    /// Build a [`StagecastError::InvalidState`] value.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Build a [`StagecastError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`StagecastError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
