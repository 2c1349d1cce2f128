//! Streaming speech-to-text
//!
//! Provider selection follows the agent configuration with a fallback
//! matrix:
//! - `sarvam` + Indic language: Sarvam live streaming (VAD + end-of-speech
//!   events)
//! - `deepgram` (or fallback): Deepgram live streaming (VAD, endpointing,
//!   optional multilingual auto-detect), obtained through the pooled
//!   connection
//! - neither reachable: batch transcription over the buffered turn audio

pub mod batch;
pub mod deepgram;
pub mod pool;
pub mod sarvam;

use tokio::sync::mpsc;

use outdial_core::{AgentProfile, Language, SttProvider};

use crate::PipelineError;

/// Events surfaced by a live STT stream
#[derive(Debug, Clone)]
pub enum SttEvent {
    /// Interim transcript; may be revised
    Partial { text: String },
    /// Final transcript fragment for a span of audio
    Final {
        text: String,
        confidence: f32,
        language: Option<(String, f32)>,
    },
    /// Provider end-of-utterance signal
    UtteranceEnd,
    /// Provider voice-activity onset signal
    SpeechStarted,
    /// Stream closed by the provider
    Closed,
    /// Provider-side error; caller falls back to batch transcription
    Error(String),
}

/// Write side of a live STT stream
#[derive(Clone)]
pub struct SttHandle {
    audio_tx: mpsc::Sender<Vec<u8>>,
    close_tx: mpsc::Sender<()>,
}

impl SttHandle {
    pub(crate) fn new(audio_tx: mpsc::Sender<Vec<u8>>, close_tx: mpsc::Sender<()>) -> Self {
        Self { audio_tx, close_tx }
    }

    /// Forward PCM16 telephony audio to the provider
    pub async fn send_audio(&self, pcm: Vec<u8>) -> Result<(), PipelineError> {
        self.audio_tx
            .send(pcm)
            .await
            .map_err(|_| PipelineError::Connection("STT stream closed".to_string()))
    }

    /// Ask the provider to flush and close
    pub async fn finish(&self) {
        let _ = self.close_tx.send(()).await;
    }
}

/// A live STT stream: write handle plus event feed
pub struct SttSession {
    pub handle: SttHandle,
    pub events: mpsc::Receiver<SttEvent>,
    pub provider: SttProvider,
}

/// Pool-resident wrapper: the event receiver is taken exactly once by the
/// owning voice session; re-acquires for the same client share the handle.
pub struct PooledStt {
    handle: SttHandle,
    provider: SttProvider,
    events: parking_lot::Mutex<Option<mpsc::Receiver<SttEvent>>>,
}

impl PooledStt {
    pub fn new(session: SttSession) -> Self {
        Self {
            handle: session.handle,
            provider: session.provider,
            events: parking_lot::Mutex::new(Some(session.events)),
        }
    }

    pub fn handle(&self) -> SttHandle {
        self.handle.clone()
    }

    pub fn provider(&self) -> SttProvider {
        self.provider
    }

    /// Take the event feed; `None` after the first call
    pub fn take_events(&self) -> Option<mpsc::Receiver<SttEvent>> {
        self.events.lock().take()
    }
}

/// Configuration resolved from agent profile + settings
#[derive(Debug, Clone)]
pub struct SttSessionConfig {
    pub deepgram_url: String,
    pub deepgram_api_key: String,
    pub sarvam_url: String,
    pub sarvam_api_key: String,
    pub language: Language,
    pub detect_language: bool,
}

/// Open a live stream per the fallback matrix
pub async fn connect(
    profile: &AgentProfile,
    config: &SttSessionConfig,
) -> Result<SttSession, PipelineError> {
    let language = Language::new(&profile.language);

    match profile.stt_provider {
        SttProvider::Sarvam if language.is_indic() => {
            match sarvam::connect(config).await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    tracing::warn!("Sarvam STT unavailable, falling back to Deepgram: {}", e);
                },
            }
            deepgram::connect(config).await
        },
        SttProvider::Whisper => Err(PipelineError::Connection(
            "batch provider has no live stream".to_string(),
        )),
        _ => deepgram::connect(config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_reports_closed_stream() {
        let (audio_tx, audio_rx) = mpsc::channel(1);
        let (close_tx, _close_rx) = mpsc::channel(1);
        let handle = SttHandle::new(audio_tx, close_tx);

        drop(audio_rx);
        assert!(handle.send_audio(vec![0u8; 320]).await.is_err());
    }
}
