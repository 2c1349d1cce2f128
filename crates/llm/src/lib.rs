//! LLM integration for voice turns
//!
//! Features:
//! - Streaming token generation over an OpenAI-compatible chat API
//! - Prompt composition: global rules + agent persona + retrieved context
//!   + active-language directive
//! - Sentence chunking of the token stream for incremental TTS

pub mod backend;
pub mod prompt;
pub mod sentence;

pub use backend::{ChatBackend, ChatRequest, HttpChatBackend, HttpChatConfig, TokenChunk};
pub use prompt::{Message, PromptBuilder, Role};
pub use sentence::SentenceChunker;

use thiserror::Error;

/// Spoken when generation fails mid-call; the session keeps listening
pub const FALLBACK_APOLOGY: &str =
    "I'm sorry, I didn't catch that. Could you please repeat?";

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for outdial_core::Error {
    fn from(err: LlmError) -> Self {
        outdial_core::Error::Llm(err.to_string())
    }
}
