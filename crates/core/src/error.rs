//! Error types shared across the dialer

use thiserror::Error;

/// Result alias using the core error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not owned by caller: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Concurrency limit near saturation: active={active}, requested limit={requested}")]
    NearSaturation { active: u64, requested: u32 },

    #[error("Illegal state transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Coordination error: {0}")]
    Coordination(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Telephony error: {0}")]
    Telephony(String),

    #[error("Speech-to-text error: {0}")]
    Stt(String),

    #[error("Text-to-speech error: {0}")]
    Tts(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Errors a caller may retry without changing the request
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Coordination(_)
                | Error::Telephony(_)
                | Error::Stt(_)
                | Error::Tts(_)
                | Error::Llm(_)
        )
    }
}
