//! Speech pipeline
//!
//! Everything between the telephony audio stream and the LLM:
//! - Streaming STT clients (Deepgram-style and Sarvam-style websockets)
//!   with a batch fallback, behind a process-wide connection pool
//! - TTS provider clients producing telephony-rate PCM
//! - Outbound frame rechunking to the gateway's 3200-byte contract
//! - End-of-speech endpointing, voicemail detection, language tracking

pub mod endpoint;
pub mod language;
pub mod stt;
pub mod tts;
pub mod voicemail;

pub use endpoint::Endpointer;
pub use language::LanguageTracker;
pub use stt::pool::{ConnectionPool, PoolConfig, PoolError, PoolMetricsSnapshot};
pub use stt::{SttEvent, SttHandle, SttSession};
pub use tts::rechunk::FrameRechunker;
pub use tts::{TtsClient, TtsRequest};
pub use voicemail::VoicemailDetector;

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("STT error: {0}")]
    Stt(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Audio decode error: {0}")]
    AudioDecode(String),

    #[error("Provider connection error: {0}")]
    Connection(String),

    #[error("Pool exhausted: {0}")]
    Pool(String),
}

impl From<PipelineError> for outdial_core::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Tts(msg) => outdial_core::Error::Tts(msg),
            other => outdial_core::Error::Stt(other.to_string()),
        }
    }
}
