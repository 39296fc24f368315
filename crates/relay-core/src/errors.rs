use std::time::Duration;

/// Core error type for the relay.
///
/// Adapter crates map their specific errors into this type so the pipeline can
/// tell retryable upstream failures apart from permanent ones.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("completion failed: {0}")]
    Completion(String),

    #[error("file retrieval failed: {0}")]
    FileRetrieval(String),

    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Whether a retry of the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Which inbound payload a size ceiling applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Voice,
}

/// Per-message failure taxonomy.
///
/// Every variant is caught at the pipeline boundary and turned into a user-facing
/// reply; none of them terminate the process.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("rate limit exceeded")]
    Throttled,

    #[error("{input:?} input too large: {actual} > {limit}")]
    InputTooLarge {
        input: InputKind,
        actual: u64,
        limit: u64,
    },

    #[error("transcription contained no speech")]
    EmptyTranscription,

    #[error("upstream failure: {0}")]
    Upstream(#[from] Error),
}

/// Fieldless discriminant of [`MessageError`], used to pick reply templates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageErrorKind {
    Throttled,
    InputTooLarge,
    EmptyTranscription,
    Upstream,
}

impl MessageError {
    pub fn kind(&self) -> MessageErrorKind {
        match self {
            MessageError::Throttled => MessageErrorKind::Throttled,
            MessageError::InputTooLarge { .. } => MessageErrorKind::InputTooLarge,
            MessageError::EmptyTranscription => MessageErrorKind::EmptyTranscription,
            MessageError::Upstream(_) => MessageErrorKind::Upstream,
        }
    }
}
