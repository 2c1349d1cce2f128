//! Sarvam-style live streaming STT client for Indic languages
//!
//! Same shape as the Deepgram client: binary PCM up, JSON envelopes down.
//! The provider emits explicit VAD signals (`speech_start`, `speech_end`)
//! and transcript frames tagged partial/final.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use outdial_core::SttProvider;

use super::{SttEvent, SttHandle, SttSession, SttSessionConfig};
use crate::PipelineError;

#[derive(Deserialize)]
struct SarvamEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    language_code: Option<String>,
}

/// Open a live Sarvam stream
pub async fn connect(config: &SttSessionConfig) -> Result<SttSession, PipelineError> {
    let mut request = config
        .sarvam_url
        .clone()
        .into_client_request()
        .map_err(|e| PipelineError::Connection(e.to_string()))?;
    request.headers_mut().insert(
        "api-subscription-key",
        config
            .sarvam_api_key
            .parse()
            .map_err(|_| PipelineError::Connection("bad api key header".to_string()))?,
    );

    let (ws, _) = connect_async(request)
        .await
        .map_err(|e| PipelineError::Connection(format!("sarvam connect: {}", e)))?;
    let (mut sink, mut source) = ws.split();

    // Stream configuration frame precedes audio
    let setup = json!({
        "type": "config",
        "language_code": config.language.code(),
        "sample_rate": 8000,
        "encoding": "linear16",
        "vad_signals": true,
    });
    sink.send(Message::Text(setup.to_string()))
        .await
        .map_err(|e| PipelineError::Connection(format!("sarvam config frame: {}", e)))?;

    let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(64);
    let (close_tx, mut close_rx) = mpsc::channel::<()>(1);
    let (event_tx, event_rx) = mpsc::channel::<SttEvent>(64);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(pcm) = audio_rx.recv() => {
                    let frame = json!({
                        "type": "audio",
                        "data": BASE64.encode(&pcm),
                    });
                    if sink.send(Message::Text(frame.to_string())).await.is_err() {
                        break;
                    }
                }
                _ = close_rx.recv() => {
                    let _ = sink
                        .send(Message::Text(r#"{"type":"flush"}"#.to_string()))
                        .await;
                    break;
                }
                else => break,
            }
        }
    });

    tokio::spawn(async move {
        while let Some(message) = source.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => break,
                _ => continue,
            };

            let envelope: SarvamEnvelope = match serde_json::from_str(&text) {
                Ok(envelope) => envelope,
                Err(_) => continue,
            };

            let event = match envelope.kind.as_str() {
                "transcript" => {
                    let Some(transcript) = envelope.transcript else {
                        continue;
                    };
                    if transcript.is_empty() {
                        continue;
                    }
                    let language = envelope.language_code.map(|code| (code, 1.0));
                    if envelope.is_final {
                        SttEvent::Final {
                            text: transcript,
                            confidence: envelope.confidence.unwrap_or(0.0),
                            language,
                        }
                    } else {
                        SttEvent::Partial { text: transcript }
                    }
                },
                "speech_start" => SttEvent::SpeechStarted,
                "speech_end" => SttEvent::UtteranceEnd,
                "error" => SttEvent::Error("provider error frame".to_string()),
                _ => continue,
            };

            if event_tx.send(event).await.is_err() {
                break;
            }
        }
        let _ = event_tx.send(SttEvent::Closed).await;
    });

    Ok(SttSession {
        handle: SttHandle::new(audio_tx, close_tx),
        events: event_rx,
        provider: SttProvider::Sarvam,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parsing() {
        let envelope: SarvamEnvelope = serde_json::from_str(
            r#"{"type": "transcript", "transcript": "नमस्ते", "is_final": true, "confidence": 0.9, "language_code": "hi"}"#,
        )
        .unwrap();
        assert_eq!(envelope.kind, "transcript");
        assert!(envelope.is_final);
        assert_eq!(envelope.language_code.as_deref(), Some("hi"));

        let vad: SarvamEnvelope = serde_json::from_str(r#"{"type": "speech_end"}"#).unwrap();
        assert_eq!(vad.kind, "speech_end");
    }
}
