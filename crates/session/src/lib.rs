//! Per-call real-time voice session
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Gateway   │────▶│     STT     │────▶│     LLM     │────▶│     TTS     │
//! │ (websocket) │     │ (streaming) │     │ (streaming) │     │  (per sent.)│
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!       ▲                                                            │
//!       │                3200-byte frames, monotonic seq             │
//!       └────────────────────────────────────────────────────────────┘
//! ```
//!
//! One cooperative task per call drives the turn loop:
//! listening → accumulating → (speculative LLM) → finalizing → speaking →
//! cooldown → listening. Caller audio keeps flowing to STT in every phase;
//! final transcripts arriving while a turn is processing are dropped
//! (barge-in rule), and a cooldown window after the assistant finishes
//! suppresses echo of its own voice.

pub mod phrases;
pub mod registry;
pub mod session;
pub mod turn;

pub use phrases::matches_end_phrase;
pub use registry::{SessionRegistry, SessionHandle};
pub use session::{InboundEvent, SessionDeps, SessionOutput, VoiceSession, VoiceSessionConfig};
pub use turn::{EarlyLlm, TurnPhase};

use async_trait::async_trait;
use outdial_core::CallStatus;
use thiserror::Error;

/// Terminal hook implemented by the call orchestrator. Used when the audio
/// stream closes (or the session ends the call) before a webhook arrives;
/// must be idempotent against webhook-driven transitions.
#[async_trait]
pub trait CallTerminator: Send + Sync {
    async fn mark_ended(
        &self,
        session_id: &str,
        status: CallStatus,
        failure_reason: Option<&str>,
    );
}

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session setup failed: {0}")]
    Setup(String),

    #[error("Audio stream closed")]
    StreamClosed,

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<SessionError> for outdial_core::Error {
    fn from(err: SessionError) -> Self {
        outdial_core::Error::Session(err.to_string())
    }
}
